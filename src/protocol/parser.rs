// Line parser for the sensor's frame protocol
//
// A frame is `<TAG>` followed by two `0x`-prefixed hex values of 1-4 digits,
// with optional whitespace between the three parts. Matches are collected
// left to right and never overlap; at any position the longest tag wins.
// Anything that fails to complete a frame is skipped silently - a line with
// no frames is a normal outcome, not an error.

use crate::protocol::frame::{FrameTag, RawFrame, RAW_VALUE_MAX};

/// Extract all frames from one line of text.
///
/// The line must already be stripped of its terminator; surrounding
/// whitespace is ignored. Returns an empty vector for lines without any
/// well-formed frame.
///
/// Channel assignment follows the protocol's corrected convention: the
/// first hex value feeds `raw_force`, the second feeds `raw_angle`.
pub fn parse_line(line: &str) -> Vec<RawFrame> {
    let line = line.trim();
    let mut frames = Vec::new();
    if line.is_empty() {
        return frames;
    }

    let mut pos = 0;
    while pos < line.len() {
        let rest = &line[pos..];
        if let Some((frame, consumed)) = match_frame_at(rest) {
            frames.push(frame);
            pos += consumed;
        } else {
            // Advance one character so tags embedded later in the line
            // (including a short tag inside a longer, malformed one) still
            // get their chance to match.
            pos += rest.chars().next().map(char::len_utf8).unwrap_or(1);
        }
    }

    frames
}

/// Try to match one complete frame at the start of `rest`.
///
/// Returns the decoded frame and the number of bytes consumed.
fn match_frame_at(rest: &str) -> Option<(RawFrame, usize)> {
    for tag in FrameTag::ALL {
        let token = tag.token();
        if let Some(after_tag) = rest.strip_prefix(token) {
            if let Some((val1, val2, consumed)) = match_value_pair(after_tag) {
                // Both values must fit the protocol's raw range.
                if val1 <= RAW_VALUE_MAX && val2 <= RAW_VALUE_MAX {
                    let frame = RawFrame {
                        tag,
                        // Second value is angle, first is force (corrected mapping).
                        raw_angle: val2,
                        raw_force: val1,
                    };
                    return Some((frame, token.len() + consumed));
                }
            }
            // Tags never prefix-collide (distinct first characters), so a
            // failed value match at this tag means no frame starts here.
            return None;
        }
    }
    None
}

/// Match `\s* 0x<1-4 hex> \s* 0x<1-4 hex>` and decode both values.
fn match_value_pair(s: &str) -> Option<(u32, u32, usize)> {
    let mut pos = skip_whitespace(s, 0);
    let (val1, len1) = match_hex_literal(&s[pos..])?;
    pos += len1;
    pos = skip_whitespace(s, pos);
    let (val2, len2) = match_hex_literal(&s[pos..])?;
    pos += len2;
    Some((val1, val2, pos))
}

/// Match a `0x`-prefixed hex literal of 1-4 digits at the start of `s`.
fn match_hex_literal(s: &str) -> Option<(u32, usize)> {
    let digits = s.strip_prefix("0x")?;
    let count = digits
        .bytes()
        .take(4)
        .take_while(|b| b.is_ascii_hexdigit())
        .count();
    if count == 0 {
        return None;
    }
    let value = u32::from_str_radix(&digits[..count], 16).ok()?;
    Some((value, 2 + count))
}

fn skip_whitespace(s: &str, from: usize) -> usize {
    s[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map(|(i, _)| from + i)
        .unwrap_or(s.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame_channel_swap() {
        let frames = parse_line("VeTiMa 0x17 0x3FB");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tag, FrameTag::VeTiMa);
        // First hex value is force, second is angle.
        assert_eq!(frames[0].raw_force, 0x17);
        assert_eq!(frames[0].raw_angle, 0x3FB);
    }

    #[test]
    fn test_vetima_does_not_double_match_embedded_ima() {
        // "iMa" is a substring of "VeTiMa"; the longer tag must consume
        // the value pair so exactly one frame comes out.
        let frames = parse_line("VeTiMa 0x17 0x3FB");
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_all_three_tags_match() {
        assert_eq!(parse_line("VeTiMa 0x1 0x2").len(), 1);
        assert_eq!(parse_line("iMa 0x1 0x2").len(), 1);
        assert_eq!(parse_line("Ta 0x1 0x2").len(), 1);
        assert_eq!(parse_line("iMa 0x1 0x2")[0].tag, FrameTag::IMa);
        assert_eq!(parse_line("Ta 0x1 0x2")[0].tag, FrameTag::Ta);
    }

    #[test]
    fn test_multiple_frames_per_line() {
        let frames = parse_line("VeTiMa 0x10 0x20 iMa 0x30 0x40 Ta 0x50 0x60");
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].raw_force, 0x10);
        assert_eq!(frames[0].raw_angle, 0x20);
        assert_eq!(frames[1].tag, FrameTag::IMa);
        assert_eq!(frames[2].tag, FrameTag::Ta);
        assert_eq!(frames[2].raw_angle, 0x60);
    }

    #[test]
    fn test_whitespace_between_parts_is_optional() {
        let frames = parse_line("VeTiMa0x17 0x3FB");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw_force, 0x17);

        let frames = parse_line("Ta  0xA\t0xB");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw_force, 0xA);
        assert_eq!(frames[0].raw_angle, 0xB);
    }

    #[test]
    fn test_no_tag_yields_empty() {
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
        assert!(parse_line("garbage 0x12 0x34").is_empty());
        assert!(parse_line("0x12 0x34").is_empty());
    }

    #[test]
    fn test_malformed_hex_yields_empty() {
        assert!(parse_line("VeTiMa 0xZZ 0x10").is_empty());
        assert!(parse_line("VeTiMa 0x 0x10").is_empty());
        assert!(parse_line("VeTiMa 17 3FB").is_empty());
    }

    #[test]
    fn test_five_digit_literal_never_matches() {
        // Four digits match greedily, then the dangling fifth digit breaks
        // the second literal, so no frame is produced for this line.
        assert!(parse_line("VeTiMa 0x12345 0x10").is_empty());
    }

    #[test]
    fn test_four_digit_boundary_value_accepted() {
        let frames = parse_line("Ta 0xFFFF 0x0");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw_force, 0xFFFF);
        assert_eq!(frames[0].raw_angle, 0);
    }

    #[test]
    fn test_malformed_match_does_not_abort_line() {
        // A broken frame followed by a valid one: only the valid one decodes.
        let frames = parse_line("VeTiMa 0xZZ 0x10 Ta 0x1 0x2");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].tag, FrameTag::Ta);
    }

    #[test]
    fn test_lowercase_hex_digits_accepted() {
        let frames = parse_line("iMa 0xab 0xcd");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].raw_force, 0xAB);
        assert_eq!(frames[0].raw_angle, 0xCD);
    }

    #[test]
    fn test_carriage_return_stripped_by_trim() {
        let frames = parse_line("VeTiMa 0x17 0x3FB\r");
        assert_eq!(frames.len(), 1);
    }
}
