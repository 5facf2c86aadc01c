//! How many leading bytes of a non-first input the concatenator drops.
//!
//! The default assumes every fragment after the first starts with a 128 byte
//! header. That only holds for fixed-size headers; [`Id3v2HeaderSkip`] reads the
//! tag length from the file instead.

use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Fixed header length assumed for MP3 fragments.
pub const DEFAULT_HEADER_SKIP: u64 = 128;

const ID3V2_HEADER_LEN: u64 = 10;
const ID3V2_FOOTER_FLAG: u8 = 0x10;

pub trait HeaderSkipPolicy: Send + Sync + std::fmt::Debug {
    /// Bytes to skip at the start of `path`, a non-first input of `file_len` bytes.
    fn skip_len(&self, path: &Path, file_len: u64) -> std::io::Result<u64>;
}

/// Skip a constant number of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeaderSkip(pub u64);

impl Default for FixedHeaderSkip {
    fn default() -> Self {
        Self(DEFAULT_HEADER_SKIP)
    }
}

impl HeaderSkipPolicy for FixedHeaderSkip {
    fn skip_len(&self, _path: &Path, file_len: u64) -> std::io::Result<u64> {
        Ok(self.0.min(file_len))
    }
}

/// Copy every input in full.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHeaderSkip;

impl HeaderSkipPolicy for NoHeaderSkip {
    fn skip_len(&self, _path: &Path, _file_len: u64) -> std::io::Result<u64> {
        Ok(0)
    }
}

/// Skip a leading ID3v2 tag, whatever its size. Files without one are copied whole.
#[derive(Debug, Clone, Copy, Default)]
pub struct Id3v2HeaderSkip;

impl HeaderSkipPolicy for Id3v2HeaderSkip {
    fn skip_len(&self, path: &Path, file_len: u64) -> std::io::Result<u64> {
        if file_len < ID3V2_HEADER_LEN {
            return Ok(0);
        }
        let mut header = [0u8; ID3V2_HEADER_LEN as usize];
        File::open(path)?.read_exact(&mut header)?;
        Ok(id3v2_tag_len(&header).map_or(0, |len| len.min(file_len)))
    }
}

/// Total tag length (header + body + optional footer) from a 10 byte ID3v2 header.
fn id3v2_tag_len(header: &[u8; 10]) -> Option<u64> {
    if &header[0..3] != b"ID3" {
        return None;
    }
    let size_bytes = &header[6..10];
    // Syncsafe integer: the high bit of every byte must be clear.
    if size_bytes.iter().any(|b| b & 0x80 != 0) {
        return None;
    }
    let body = size_bytes
        .iter()
        .fold(0u64, |acc, b| (acc << 7) | u64::from(*b));
    let footer = if header[5] & ID3V2_FOOTER_FLAG != 0 {
        ID3V2_HEADER_LEN
    } else {
        0
    };
    Some(ID3V2_HEADER_LEN + body + footer)
}
