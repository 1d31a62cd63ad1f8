use std::fs;
use std::path::Path;

use crate::dump_file::DumpFile;
use crate::dump_snapshot::DumpSnapshot;
use crate::error::FrameError;
use crate::xyz_file::parse_xyz;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Dump,
    Xyz,
}

impl FrameFormat {
    /// Guesses the format from the first line that is not a `#` comment.
    pub fn detect(text: &str) -> Option<Self> {
        let first = text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))?;
        if first.starts_with("ITEM:") {
            Some(Self::Dump)
        } else if first.parse::<usize>().is_ok() {
            Some(Self::Xyz)
        } else {
            None
        }
    }
}

/// First snapshot of `text`, or the first of `timesteps` present in a dump.
/// XYZ files hold a single frame and ignore `timesteps`.
pub fn parse_frame(text: &str, timesteps: &[u64]) -> Result<DumpSnapshot, FrameError> {
    match FrameFormat::detect(text).ok_or(FrameError::UnknownFormat)? {
        FrameFormat::Dump => DumpFile::parse(text, timesteps)?
            .into_first()
            .ok_or(FrameError::UnknownFormat),
        FrameFormat::Xyz => Ok(parse_xyz(text)?),
    }
}

/// Only failing to read `path` is an I/O error; bad bytes are a content error.
pub fn read_frame(path: &Path, timesteps: &[u64]) -> Result<DumpSnapshot, FrameError> {
    let text = String::from_utf8(fs::read(path)?)?;
    parse_frame(&text, timesteps)
}
