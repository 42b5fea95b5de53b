// Test doubles for the serial seam
//
// Exposed as a regular module (not cfg(test)) so integration tests and
// consumers embedding the engine can drive it without hardware.

pub mod scripted_port;

pub use scripted_port::{FailingOpener, ScriptedOpener, ScriptedPort};
