// Wire protocol for the two-channel analog sensor
//
// The sensor streams ASCII text lines over the serial link. Each line may
// carry zero or more frames of the form `<TAG> 0x<hex> 0x<hex>` where TAG is
// one of three fixed markers. This module provides:
// 1. RawFrame / FrameTag: the decoded frame types
// 2. parse_line: extraction of all frames from one line
// 3. LineBuffer: reassembly of lines from raw byte chunks

pub mod frame;
pub mod line_buffer;
pub mod parser;

pub use frame::{FrameTag, RawFrame, RAW_VALUE_MAX};
pub use line_buffer::LineBuffer;
pub use parser::parse_line;
