// Acquisition module - windowed averaging and the streaming worker
//
// Data flow: serial bytes -> LineBuffer -> parse_line -> RawFrame ->
// calibration convert -> AveragingAccumulator -> MeasurementPoint ->
// history + broadcast. The worker owns the open connection for the
// lifetime of one streaming session; the raw sampler reuses the same
// read/parse path for fixed-duration captures.

pub mod accumulator;
pub mod session;
pub mod worker;

pub use accumulator::{AveragingAccumulator, DecodedSample};
pub use session::SessionState;
pub use worker::{sample_raw_average, spawn_stream_worker, SamplerSettings, WorkerContext};
