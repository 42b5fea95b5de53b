// Consumer-facing types and stream adapters
//
// The web transport, the export subsystem, and the CLI all consume the
// engine through these serde-ready types and the broadcast stream adapters.

pub mod streams;
pub mod types;

pub use streams::broadcast_stream;
pub use types::{
    AcquisitionEvent, AcquisitionEventKind, AcquisitionStats, CalibrationStatus, ChannelBounds,
    FaultKind, MeasurementPoint,
};
