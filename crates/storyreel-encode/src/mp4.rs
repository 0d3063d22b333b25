//! Minimal ISO-BMFF inspection, enough to reject output that is not an MP4.

use storyreel_core::{RenderError, RenderResult};

/// Fail unless `bytes` starts with an `ftyp` box.
pub fn check_container(bytes: &[u8]) -> RenderResult<()> {
    if bytes.is_empty() {
        return Err(RenderError::Encoding("encoder produced an empty file".into()));
    }
    if bytes.len() < 8 || &bytes[4..8] != b"ftyp" {
        return Err(RenderError::Encoding(format!(
            "encoder output is not an MP4 container ({} bytes, no ftyp box)",
            bytes.len()
        )));
    }
    Ok(())
}

/// Four-character codes of the top-level boxes, in file order.
///
/// Stops at the first malformed header instead of failing.
pub fn top_level_boxes(bytes: &[u8]) -> Vec<String> {
    child_boxes(bytes)
        .into_iter()
        .map(|(kind, _)| String::from_utf8_lossy(kind).into_owned())
        .collect()
}

/// Display size of the first visual track, read from `moov/trak/tkhd`.
///
/// `None` when the file has no movie box or no track with a non-zero size.
pub fn video_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    child_boxes(bytes)
        .into_iter()
        .filter(|(kind, _)| *kind == b"moov")
        .flat_map(|(_, moov)| child_boxes(moov))
        .filter(|(kind, _)| *kind == b"trak")
        .flat_map(|(_, trak)| child_boxes(trak))
        .filter(|(kind, _)| *kind == b"tkhd")
        .filter_map(|(_, tkhd)| track_header_size(tkhd))
        .find(|&(width, height)| width > 0 && height > 0)
}

/// Width and height from a `tkhd` payload. Both are 16.16 fixed point and
/// sit after the version-dependent times, the reserved/layer/volume fields
/// and the 3x3 matrix.
fn track_header_size(payload: &[u8]) -> Option<(u32, u32)> {
    let times = match *payload.first()? {
        0 => 20,
        1 => 32,
        _ => return None,
    };
    let at = 4 + times + 16 + 36;
    let width = read_u32(payload, at)?;
    let height = read_u32(payload, at + 4)?;
    Some((width >> 16, height >> 16))
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(4)?)?;
    Some(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// `(type, payload)` of every box directly inside `bytes`.
///
/// Stops at the first malformed header instead of failing.
fn child_boxes(bytes: &[u8]) -> Vec<(&[u8], &[u8])> {
    let mut boxes = Vec::new();
    let mut offset = 0usize;
    while offset + 8 <= bytes.len() {
        let Some(size) = read_u32(bytes, offset) else {
            break;
        };
        let kind = &bytes[offset + 4..offset + 8];
        let (size, header) = match size {
            // Box runs to end of file.
            0 => ((bytes.len() - offset) as u64, 8),
            // 64-bit largesize follows the type.
            1 => match bytes.get(offset + 8..offset + 16) {
                Some(raw) => {
                    let mut large = [0u8; 8];
                    large.copy_from_slice(raw);
                    (u64::from_be_bytes(large), 16)
                }
                None => break,
            },
            n => (n as u64, 8),
        };
        if size < header as u64 {
            break;
        }
        let end = match usize::try_from(size).ok().and_then(|size| offset.checked_add(size)) {
            Some(end) => end,
            None => break,
        };
        // A truncated last box still reports its type; its payload is cut short.
        let payload = &bytes[offset + header..end.min(bytes.len())];
        boxes.push((kind, payload));
        offset = end;
    }
    boxes
}
