use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::FrameError;

/// Matches e.g. `t= 3600.5 s, dose : 0.0012 dpa` anywhere in a line.
pub const HEADER_PATTERN: &str = r"t=\s*([\d.]+(?:[eE][-+]?\d+)?).*dose\s*:\s*([\d.]+(?:[eE][-+]?\d+)?)";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeDose {
    /// Seconds.
    pub time: f64,
    /// Displacements per atom.
    pub dose: f64,
}

/// Extracts simulated time and dose from the free-form header line of a
/// snapshot file.
#[derive(Debug, Clone)]
pub struct HeaderParser {
    pattern: Regex,
}

impl HeaderParser {
    pub fn new() -> Self {
        Self::with_pattern(HEADER_PATTERN).expect("HEADER_PATTERN is a valid regex")
    }

    /// `pattern` must have two capture groups: time, then dose.
    pub fn with_pattern(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    fn parse_number(text: &str) -> Result<f64, FrameError> {
        text.parse::<f64>()
            .map_err(|_| FrameError::InvalidHeader(text.to_string()))
    }

    /// `None` when the line does not match.
    pub fn parse_line(&self, line: &str) -> Option<Result<TimeDose, FrameError>> {
        let captures = self.pattern.captures(line)?;
        let group = |i| captures.get(i).map_or("", |m| m.as_str());
        Some(Self::parse_number(group(1)).and_then(|time| {
            Self::parse_number(group(2)).map(|dose| TimeDose { time, dose })
        }))
    }

    /// Time and dose from the first matching line, later matches are
    /// ignored. `Ok(None)` when no line matches. Invalid UTF-8 is replaced
    /// rather than rejected.
    pub fn find<R: BufRead>(&self, reader: R) -> Result<Option<TimeDose>, FrameError> {
        for line in reader.split(b'\n') {
            if let Some(found) = self.parse_line(&String::from_utf8_lossy(&line?)) {
                return found.map(Some);
            }
        }
        Ok(None)
    }

    pub fn read(&self, path: &Path) -> Result<Option<TimeDose>, FrameError> {
        let file = File::open(path)?;
        self.find(BufReader::new(file))
    }
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}
