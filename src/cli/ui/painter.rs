use owo_colors::{OwoColorize, Style as OwoStyle};

/// Colours terminal text when stdout is a terminal.
#[derive(Debug)]
pub(crate) struct Painter {
    use_colour: bool,
}

impl Painter {
    pub(crate) fn new(use_colour: bool) -> Self {
        Self { use_colour }
    }

    pub(crate) fn heading<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().cyan())
    }

    pub(crate) fn success<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().green())
    }

    pub(crate) fn warning<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold().yellow())
    }

    pub(crate) fn muted<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().dimmed())
    }

    pub(crate) fn value<T: AsRef<str>>(&self, text: T) -> String {
        self.paint(text.as_ref(), OwoStyle::new().bold())
    }

    /// `yes` in green or `no` in yellow.
    pub(crate) fn yes_no(&self, flag: bool) -> String {
        if flag {
            self.success("yes")
        } else {
            self.warning("no")
        }
    }

    fn paint(&self, text: &str, style: OwoStyle) -> String {
        if self.use_colour {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn apply(painter: &Painter, style: &str, text: &str) -> String {
        match style {
            "heading" => painter.heading(text),
            "success" => painter.success(text),
            "warning" => painter.warning(text),
            "muted" => painter.muted(text),
            "value" => painter.value(text),
            other => panic!("unknown style: {other}"),
        }
    }

    #[rstest]
    fn plain_painter_leaves_text_alone(
        #[values("heading", "success", "warning", "muted", "value")] style: &str,
    ) {
        let painter = Painter::new(false);
        assert_eq!("Lambcar", apply(&painter, style, "Lambcar"));
    }

    #[rstest]
    fn colour_painter_wraps_text(
        #[values("heading", "success", "warning", "muted", "value")] style: &str,
    ) {
        let painter = Painter::new(true);
        let styled = apply(&painter, style, "Lambcar");
        assert_ne!("Lambcar", styled);
        assert!(styled.contains("Lambcar"));
    }

    #[test]
    fn yes_no_without_colour() {
        let painter = Painter::new(false);
        assert_eq!("yes", painter.yes_no(true));
        assert_eq!("no", painter.yes_no(false));
    }
}
