use std::time::Duration;

use clap::Parser;
use clap::error::ErrorKind;
use insta::assert_snapshot;
use pretty_assertions::assert_eq;
use serde_json::Value;

const CAR_AND_SPEAKER: &str = "hci0|AA:BB:CC|Lambcar|-43;hci0|00:11:22|Speaker|-65|-";

#[derive(Debug, Default)]
struct FakeTerminalClient;

impl lambcar::TerminalClient for FakeTerminalClient {
    fn stdout_is_terminal(&self) -> bool {
        false
    }

    fn stderr_is_terminal(&self) -> bool {
        false
    }
}

async fn run_with_fake(
    argv: &[&str],
    fake: lambcar::FakeArgs,
    output_format: lambcar::OutputFormat,
) -> anyhow::Result<String> {
    let args = lambcar::Args::try_parse_from(std::iter::once("lambcar").chain(argv.iter().copied()))?;
    let options = lambcar::RunOptions::builder()
        .output_format(output_format)
        .scan_timeout(args.scan_timeout())
        .build();
    let (command, _no_fake_flags) = args.into_command_and_fake_args()?;

    let mut output = Vec::new();
    lambcar::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        lambcar::fake_hardware_client(fake),
        options,
    )
    .await?;
    Ok(String::from_utf8(output)?)
}

fn fake(fixture: &str) -> lambcar::FakeArgs {
    lambcar::FakeArgs::builder()
        .scan(fixture)
        .expect("fixture should parse")
        .build()
}

fn fake_with_log(fixture: &str, write_log: &lambcar::WriteLog) -> lambcar::FakeArgs {
    lambcar::FakeArgs::builder()
        .scan(fixture)
        .expect("fixture should parse")
        .write_log(write_log.clone())
        .build()
}

#[tokio::test(start_paused = true)]
async fn scan_lists_only_cars_by_default() -> anyhow::Result<()> {
    let stdout = run_with_fake(
        &["scan", "--duration", "1s"],
        fake(CAR_AND_SPEAKER),
        lambcar::OutputFormat::Json,
    )
    .await?;

    assert_snapshot!(stdout.trim_end(), @r#"{"devices":[{"adapter_name":"hci0","device_id":"AA:BB:CC","local_name":"Lambcar","rssi":-43,"advertised_services":["39d50000-9668-4b22-927c-f57eb67f8a77"]}]}"#);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scan_all_devices_includes_other_peripherals() -> anyhow::Result<()> {
    let stdout = run_with_fake(
        &["scan", "--duration", "1s", "--all-devices"],
        fake(CAR_AND_SPEAKER),
        lambcar::OutputFormat::Pretty,
    )
    .await?;

    assert_snapshot!(stdout.trim_end(), @r"
    Found 2 device(s):
    ╭───────────┬─────────┬──────┬─────────┬─────╮
    │ device_id │ name    │ rssi │ adapter │ car │
    ├───────────┼─────────┼──────┼─────────┼─────┤
    │ AA:BB:CC  │ Lambcar │ -43  │ hci0    │ yes │
    │ 00:11:22  │ Speaker │ -65  │ hci0    │ no  │
    ╰───────────┴─────────┴──────┴─────────┴─────╯
    ");
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scan_reports_nothing_before_discovery_delay() -> anyhow::Result<()> {
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)?
        .discovery_delay(Duration::from_secs(10))
        .build();

    let stdout = run_with_fake(
        &["scan", "--duration", "1s"],
        fake,
        lambcar::OutputFormat::Pretty,
    )
    .await?;

    assert_eq!("No devices found.", stdout.trim_end());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inspect_reports_capability_map() -> anyhow::Result<()> {
    let stdout = run_with_fake(&["inspect"], fake(CAR_AND_SPEAKER), lambcar::OutputFormat::Json)
        .await?;
    let report: Value = serde_json::from_str(stdout.trim_end())?;

    assert_eq!("AA:BB:CC", report["device"]["device_id"]);
    assert_eq!(true, report["is_connected"]);
    assert_eq!("ready", report["readiness"]);
    assert_eq!(
        serde_json::json!([
            "39d50001-9668-4b22-927c-f57eb67f8a77",
            "39d50002-9668-4b22-927c-f57eb67f8a77",
            "39d50003-9668-4b22-927c-f57eb67f8a77",
        ]),
        report["discovered_characteristics"]["39d50000-9668-4b22-927c-f57eb67f8a77"]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn inspect_shows_refused_connection_without_failing() -> anyhow::Result<()> {
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)?
        .refuse_connect(true)
        .build();

    let stdout = run_with_fake(&["inspect"], fake, lambcar::OutputFormat::Json).await?;
    let report: Value = serde_json::from_str(stdout.trim_end())?;

    assert_eq!(false, report["is_connected"]);
    assert_eq!("not_connected", report["readiness"]);
    assert_eq!(serde_json::json!({}), report["discovered_characteristics"]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drive_speed_writes_one_byte() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();

    let stdout = run_with_fake(
        &["drive", "speed", "120"],
        fake_with_log(CAR_AND_SPEAKER, &write_log),
        lambcar::OutputFormat::Json,
    )
    .await?;

    assert_snapshot!(stdout.trim_end(), @r#"{"action":"speed","speed":120}"#);
    assert_eq!(
        vec![vec![120u8]],
        write_log.accepted_payloads(lambcar::EndpointId::Speed)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drive_direction_targets_selected_device() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();
    let fixture = "hci0|AA:BB:CC|Lambcar|-43;hci1|DD:EE:FF|Lambcar 2|-50";

    let stdout = run_with_fake(
        &["drive", "--device", "DD:EE:FF", "direction", "reverse"],
        fake_with_log(fixture, &write_log),
        lambcar::OutputFormat::Pretty,
    )
    .await?;

    assert_eq!("✓ Sent direction reverse (1)", stdout.trim_end());
    assert_eq!(
        vec![vec![1u8]],
        write_log.accepted_payloads(lambcar::EndpointId::Direction)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn drive_reports_unable_to_connect() {
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)
        .expect("fixture should parse")
        .refuse_connect(true)
        .build();

    let error = run_with_fake(&["drive", "turn", "45"], fake, lambcar::OutputFormat::Json)
        .await
        .expect_err("refused connection should fail the command");

    assert_eq!(
        "unable to connect to `AA:BB:CC`, try again",
        format!("{error:#}")
    );
}

#[tokio::test(start_paused = true)]
async fn drive_reports_missing_car_service() {
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)
        .expect("fixture should parse")
        .missing_service(true)
        .build();

    let error = run_with_fake(&["drive", "speed", "1"], fake, lambcar::OutputFormat::Json)
        .await
        .expect_err("missing service should fail the command");

    assert_eq!(
        "connected to `AA:BB:CC` but it does not expose the car service",
        format!("{error:#}")
    );
}

#[tokio::test(start_paused = true)]
async fn drive_fails_when_no_car_is_found() {
    let error = run_with_fake(
        &["--scan-timeout", "1s", "drive", "speed", "1"],
        fake("hci0|00:11:22|Speaker|-65|-"),
        lambcar::OutputFormat::Json,
    )
    .await
    .expect_err("no car should fail the command");

    assert_eq!("no car was found within 1s", format!("{error:#}"));
}

#[tokio::test(start_paused = true)]
async fn reset_turn_survives_transient_failures() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)?
        .failing_writes(4)
        .write_log(write_log.clone())
        .build();

    let stdout = run_with_fake(&["drive", "reset-turn"], fake, lambcar::OutputFormat::Json).await?;

    assert_snapshot!(stdout.trim_end(), @r#"{"action":"reset_turn","turn":90}"#);
    assert_eq!(5, write_log.entries().len());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn reset_turn_gives_up_after_five_attempts() {
    let write_log = lambcar::WriteLog::default();
    let fake = lambcar::FakeArgs::builder()
        .scan(CAR_AND_SPEAKER)
        .expect("fixture should parse")
        .failing_writes(usize::MAX)
        .write_log(write_log.clone())
        .build();

    let error = run_with_fake(&["drive", "reset-turn"], fake, lambcar::OutputFormat::Json)
        .await
        .expect_err("exhausted retries should fail the command");

    assert_eq!(
        "`AA:BB:CC` did not accept the turn reset after 5 attempts",
        format!("{error:#}")
    );
    assert_eq!(lambcar::RESET_TURN_ATTEMPTS as usize, write_log.entries().len());
}

#[tokio::test(start_paused = true)]
async fn steer_stream_writes_every_step_then_centres() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();

    let stdout = run_with_fake(
        &["steer", "--stream", "50", "50", "-25"],
        fake_with_log(CAR_AND_SPEAKER, &write_log),
        lambcar::OutputFormat::Json,
    )
    .await?;

    assert_snapshot!(stdout.trim_end(), @r#"{"steps":3,"turns_written":[100,110,105],"final_angle":15.0,"reset_turn":90}"#);
    assert_eq!(
        vec![vec![100u8], vec![110], vec![105], vec![90]],
        write_log.accepted_payloads(lambcar::EndpointId::Turn)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn steer_debounce_drops_updates_inside_interval() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();

    run_with_fake(
        &["steer", "--debounce", "20ms", "--step-interval", "16ms", "50", "50", "-25"],
        fake_with_log(CAR_AND_SPEAKER, &write_log),
        lambcar::OutputFormat::Json,
    )
    .await?;

    assert_eq!(
        vec![vec![100u8], vec![105], vec![90]],
        write_log.accepted_payloads(lambcar::EndpointId::Turn)
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn steer_clamps_large_drags() -> anyhow::Result<()> {
    let write_log = lambcar::WriteLog::default();
    let args = lambcar::Args::new(lambcar::Command::Steer(
        lambcar::SteerArgs::new(vec![-10_000.0, 25.0])
            .with_mode(lambcar::SteerMode::Stream)
            .with_step_interval(Duration::from_millis(5)),
    ));
    let (command, _fake) = args.into_command_and_fake_args()?;

    let mut output = Vec::new();
    lambcar::run_with_clients(
        command,
        &mut output,
        &FakeTerminalClient,
        lambcar::fake_hardware_client(fake_with_log(CAR_AND_SPEAKER, &write_log)),
        lambcar::RunOptions::builder()
            .output_format(lambcar::OutputFormat::Json)
            .build(),
    )
    .await?;

    assert_eq!(
        vec![vec![0u8], vec![5], vec![90]],
        write_log.accepted_payloads(lambcar::EndpointId::Turn)
    );
    Ok(())
}

#[test]
fn drive_turn_rejects_out_of_range_values() {
    let result = lambcar::Args::try_parse_from(["lambcar", "drive", "turn", "181"]);

    let error = result.expect_err("turn above 180 should fail argument parsing");
    assert_eq!(ErrorKind::ValueValidation, error.kind());
}

#[test]
fn fake_fixture_errors_surface_from_builder() {
    let result = lambcar::FakeArgs::builder().scan("invalid-record");
    assert!(matches!(
        result,
        Err(lambcar::FixtureError::InvalidRecordFieldCount)
    ));
}
