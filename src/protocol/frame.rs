// Frame types decoded from the sensor's line protocol

use serde::{Deserialize, Serialize};

/// Largest raw value the wire protocol can represent (four hex digits).
pub const RAW_VALUE_MAX: u32 = 0xFFFF;

/// The three fixed textual markers that precede a value pair on a line.
///
/// The protocol does not assign the tags distinct semantics beyond
/// triggering a match; they are carried through for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameTag {
    VeTiMa,
    IMa,
    Ta,
}

impl FrameTag {
    /// All tags, ordered longest token first.
    ///
    /// Ordering matters to the scanner: `iMa` is a substring of `VeTiMa`,
    /// and the longest tag must win at any given position so a single
    /// `VeTiMa` frame yields exactly one RawFrame.
    pub const ALL: [FrameTag; 3] = [FrameTag::VeTiMa, FrameTag::IMa, FrameTag::Ta];

    /// The literal token as it appears on the wire.
    pub fn token(&self) -> &'static str {
        match self {
            FrameTag::VeTiMa => "VeTiMa",
            FrameTag::IMa => "iMa",
            FrameTag::Ta => "Ta",
        }
    }
}

/// One decoded sample from the serial stream.
///
/// Channel assignment is protocol-fixed: the SECOND captured hex value is
/// the angle channel and the FIRST is the force channel. This mapping was
/// corrected in the field against an earlier inverted convention and must
/// not be re-derived from the capture order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFrame {
    pub tag: FrameTag,
    pub raw_angle: u32,
    pub raw_force: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_tokens() {
        assert_eq!(FrameTag::VeTiMa.token(), "VeTiMa");
        assert_eq!(FrameTag::IMa.token(), "iMa");
        assert_eq!(FrameTag::Ta.token(), "Ta");
    }

    #[test]
    fn test_tag_order_longest_first() {
        let lengths: Vec<usize> = FrameTag::ALL.iter().map(|t| t.token().len()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }
}
