use std::collections::HashMap;
use thiserror::Error;

use crate::dump_snapshot::{DumpSnapshot, HEADER_NUM_OF_ATOMS, HEADER_TIMESTEP};

pub struct DumpFile {
    snapshots: HashMap<u64, DumpSnapshot>,
}

/// Problems with the content of a snapshot file. Values are line numbers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DumpParsingError {
    #[error("line {0}: invalid or missing timestep")]
    InvalidOrMissingTimestep(usize),
    #[error("line {0}: invalid or missing number of atoms")]
    InvalidOrMissingNumberOfAtoms(usize),
    #[error("line {0}: missing box bounds")]
    MissingSymBox(usize),
    #[error("line {0}: invalid box bounds")]
    InvalidSymBox(usize),
    #[error("line {0}: missing atom keys")]
    MissingAtomKeys(usize),
    #[error("line {0}: duplicate atom keys")]
    DuplicateAtomKeys(usize),
    #[error("duplicate snapshots for timestep {0}")]
    DuplicateSnapshots(u64),
    #[error("line {0}: invalid or missing atom row")]
    InvalidOrMissingAtomRow(usize),
    #[error("no snapshots found")]
    NoSnapshots,
}

impl DumpFile {
    /// Parses a LAMMPS text dump. Only `timesteps` are kept unless the slice
    /// is empty. Leading `#` lines are skipped.
    pub fn parse(text: &str, timesteps: &[u64]) -> Result<Self, DumpParsingError> {
        let mut lines = (1..)
            .zip(text.lines())
            .skip_while(|(_, l)| l.trim_start().starts_with('#'))
            .peekable();
        let mut timesteps = timesteps.to_vec();
        timesteps.sort_unstable();

        let mut dump = Self {
            snapshots: HashMap::new(),
        };

        loop {
            while lines.next_if(|(_, l)| l.trim().is_empty()).is_some() {}
            let Some((line_number, header)) = lines.next() else {
                break;
            };
            let timestep = match (
                Some(header).filter(|s| s.trim_end() == HEADER_TIMESTEP),
                lines.next().map(|(_, s)| s.trim().parse::<u64>()),
            ) {
                (Some(_), Some(Ok(n))) => n,
                _ => return Err(DumpParsingError::InvalidOrMissingTimestep(line_number)),
            };
            let number_of_atoms = match lines
                .next()
                .filter(|(_, s)| s.trim_end() == HEADER_NUM_OF_ATOMS)
                .zip(lines.next().map(|(_, s)| s.trim().parse::<usize>()))
            {
                Some((_, Ok(n))) => n,
                _ => return Err(DumpParsingError::InvalidOrMissingNumberOfAtoms(line_number + 2)),
            };
            if !timesteps.is_empty() {
                if &timestep > timesteps.last().unwrap_or(&u64::MAX) {
                    break;
                } else if !timesteps.contains(&timestep) {
                    // box item, 3 bounds, atoms item, atom rows
                    for _ in 0..number_of_atoms.saturating_add(5) {
                        if lines.next().is_none() {
                            break;
                        }
                    }
                    continue;
                }
            }
            if dump.snapshots.contains_key(&timestep) {
                return Err(DumpParsingError::DuplicateSnapshots(timestep));
            }
            let snapshot = DumpSnapshot::read(&mut lines, timestep, number_of_atoms)?;
            dump.snapshots.insert(snapshot.step, snapshot);
        }

        if dump.snapshots.is_empty() {
            return Err(DumpParsingError::NoSnapshots);
        }
        Ok(dump)
    }

    /// Takes ownership of the snapshot with the lowest timestep.
    #[must_use]
    pub fn into_first(self) -> Option<DumpSnapshot> {
        self.snapshots
            .into_iter()
            .min_by_key(|(step, _)| *step)
            .map(|(_, snapshot)| snapshot)
    }
}
