use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

use crate::dump_file::DumpParsingError;

/// Reasons a single frame could not be analyzed.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] DumpParsingError),
    #[error("frame is not valid UTF-8: {0}")]
    Encoding(#[from] FromUtf8Error),
    #[error("unrecognized file format")]
    UnknownFormat,
    #[error("missing property '{0}'")]
    MissingProperty(String),
    #[error("no line matches the time/dose header pattern")]
    MissingHeader,
    #[error("invalid number in header: {0}")]
    InvalidHeader(String),
}

impl FrameError {
    /// Content errors are local to one frame; the loop warns and moves on.
    /// Everything else aborts the run.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}
