use std::collections::HashMap;
use std::sync::LazyLock;

use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use uuid::Uuid;

/// Turn byte written when the wheel is centred.
pub const NEUTRAL_TURN: u8 = 90;

/// Known car GATT endpoints.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, EnumIter, Display)]
pub enum EndpointId {
    /// Car control service.
    #[strum(to_string = "car_service")]
    CarService,
    /// Drive direction (forward / reverse).
    #[strum(to_string = "direction")]
    Direction,
    /// Motor speed.
    #[strum(to_string = "speed")]
    Speed,
    /// Steering turn byte.
    #[strum(to_string = "turn")]
    Turn,
}

/// Descriptive metadata for one protocol endpoint.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) struct EndpointMetadata {
    uuid: Uuid,
}

impl EndpointMetadata {
    pub(crate) fn uuid(self) -> Uuid {
        self.uuid
    }
}

static ENDPOINTS_BY_ID: LazyLock<HashMap<EndpointId, EndpointMetadata>> = LazyLock::new(|| {
    EndpointId::iter()
        .map(|endpoint| (endpoint, metadata_for(endpoint)))
        .collect()
});

/// Returns metadata for one endpoint.
pub(crate) fn endpoint_metadata(endpoint: EndpointId) -> EndpointMetadata {
    *ENDPOINTS_BY_ID
        .get(&endpoint)
        .unwrap_or(&metadata_for(endpoint))
}

/// Returns the UUID of the car control service.
#[must_use]
pub fn car_service_uuid() -> Uuid {
    endpoint_metadata(EndpointId::CarService).uuid()
}

/// Returns the endpoint a UUID belongs to, if it is one of ours.
pub(crate) fn endpoint_for_uuid(uuid: &Uuid) -> Option<EndpointId> {
    EndpointId::iter().find(|endpoint| endpoint_metadata(*endpoint).uuid() == *uuid)
}

fn metadata_for(endpoint: EndpointId) -> EndpointMetadata {
    match endpoint {
        EndpointId::CarService => EndpointMetadata {
            uuid: Uuid::from_u128(0x39d5_0000_9668_4b22_927c_f57e_b67f_8a77),
        },
        EndpointId::Direction => EndpointMetadata {
            uuid: Uuid::from_u128(0x39d5_0001_9668_4b22_927c_f57e_b67f_8a77),
        },
        EndpointId::Speed => EndpointMetadata {
            uuid: Uuid::from_u128(0x39d5_0002_9668_4b22_927c_f57e_b67f_8a77),
        },
        EndpointId::Turn => EndpointMetadata {
            uuid: Uuid::from_u128(0x39d5_0003_9668_4b22_927c_f57e_b67f_8a77),
        },
    }
}
