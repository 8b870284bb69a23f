//! Byte-exact layout of a storage file (§6.1):
//!
//! ```text
//! HEADER  -- fixed magic bytes identifying the format version
//! BLOCK*  -- compressed event payload, repeated; no intra-block index
//! FOOTER  -- self-describing record: block index + global stats + final-state map
//! TRAILER -- {footer_byte_length, magic} at a fixed offset from end-of-file
//! ```
//!
//! The header and trailer are the only byte-exact parts; the footer itself
//! is an opaque, length-prefixed JSON document so its shape can grow without
//! a format version bump (mirrors the corpus's own preference for a
//! self-describing record over a packed struct for anything that isn't on
//! the hot per-record path).

use std::mem::size_of;

/// Identifies both "this is one of ours" and the format version. Bumped
/// only on a breaking change to the header/trailer byte layout.
pub const MAGIC: [u8; 8] = *b"CTRACE01";

/// Written once, at offset 0, when a file is opened for writing.
pub const HEADER_LEN: usize = MAGIC.len();

/// `{footer_byte_length: u64, magic: [u8; 8]}`, written as the last
/// [`TRAILER_LEN`] bytes of a sealed file.
pub const TRAILER_LEN: usize = size_of::<u64>() + MAGIC.len();

pub fn encode_header() -> [u8; HEADER_LEN] {
    MAGIC
}

pub fn encode_trailer(footer_byte_length: u64) -> [u8; TRAILER_LEN] {
    let mut buf = [0u8; TRAILER_LEN];
    buf[..8].copy_from_slice(&footer_byte_length.to_le_bytes());
    buf[8..].copy_from_slice(&MAGIC);
    buf
}

/// Parses a [`TRAILER_LEN`]-byte buffer read from the end of a file.
/// Returns `None` on magic mismatch; the caller distinguishes
/// "wrong/foreign file" from "ours but incomplete" at a higher level.
pub fn decode_trailer(buf: &[u8; TRAILER_LEN]) -> Option<u64> {
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&buf[8..]);
    if magic != MAGIC {
        return None;
    }
    let mut len_bytes = [0u8; 8];
    len_bytes.copy_from_slice(&buf[..8]);
    Some(u64::from_le_bytes(len_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailer_round_trips() {
        let trailer = encode_trailer(12345);
        let len = decode_trailer(&trailer).expect("magic should match");
        assert_eq!(len, 12345);
    }

    #[test]
    fn trailer_with_wrong_magic_is_rejected() {
        let mut trailer = encode_trailer(12345);
        trailer[8] ^= 0xFF;
        assert_eq!(decode_trailer(&trailer), None);
    }
}
