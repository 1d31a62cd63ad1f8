use anyhow::{bail, Context, Result};
use glob::glob;
use itertools::Itertools;
use log::{debug, info};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Number(u64),
    Text(String),
}

fn natural_key(s: &str) -> Vec<Chunk> {
    s.chars()
        .chunk_by(char::is_ascii_digit)
        .into_iter()
        .map(|(is_digit, chars)| {
            let text = chars.collect::<String>();
            if is_digit {
                text.parse().map(Chunk::Number).unwrap_or_else(|_| Chunk::Text(text))
            } else {
                Chunk::Text(text)
            }
        })
        .collect()
}

/// Sorts paths so that embedded numbers compare by value.
pub fn sort_naturally(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| natural_key(&p.to_string_lossy()));
}

/// Ordered list of snapshot files, one frame per file.
#[derive(Debug, Clone)]
pub struct FileSequence {
    files: Vec<PathBuf>,
}

impl FileSequence {
    pub fn new(mut files: Vec<PathBuf>) -> Self {
        sort_naturally(&mut files);
        Self { files }
    }

    /// Expands a glob pattern. A plain path selects a single file.
    pub fn resolve(pattern: &str) -> Result<Self> {
        let files = glob(pattern)
            .context(format!("Invalid input pattern: {pattern}"))?
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        if files.is_empty() {
            bail!("No files match the input pattern: {pattern}");
        }
        let sequence = Self::new(files);
        info!("Found {} frames matching {}", sequence.len(), pattern);
        for (frame, path) in sequence.files.iter().enumerate() {
            debug!("frame {frame}: {}", path.to_string_lossy());
        }
        Ok(sequence)
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
