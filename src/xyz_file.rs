use std::collections::HashMap;

use crate::dump_file::DumpParsingError;
use crate::dump_snapshot::{DumpSnapshot, SymBox};

const XYZ_KEYS: [&str; 5] = ["id", "type", "x", "y", "z"];

/// Reads the first frame of an XYZ file: atom count, comment line, then one
/// `species x y z ...` row per atom. Species are numbered in order of first
/// appearance, starting at 1.
pub fn parse_xyz(text: &str) -> Result<DumpSnapshot, DumpParsingError> {
    let mut lines = (1..)
        .zip(text.lines())
        .skip_while(|(_, l)| l.trim().is_empty() || l.trim_start().starts_with('#'));
    let (count_line, atoms_count) = match lines.next() {
        Some((n, l)) => (
            n,
            l.trim()
                .parse::<usize>()
                .map_err(|_| DumpParsingError::InvalidOrMissingNumberOfAtoms(n))?,
        ),
        None => return Err(DumpParsingError::NoSnapshots),
    };
    // comment line, may hold anything
    lines.next();

    let keys = XYZ_KEYS
        .iter()
        .enumerate()
        .map(|(j, key)| (key.to_string(), j))
        .collect::<HashMap<_, _>>();
    let mut rows = Vec::new();
    let mut species = HashMap::<String, usize>::new();
    let mut last_line_number = count_line + 1;
    for i in 0..atoms_count {
        let (line_number, line) = lines
            .next()
            .ok_or(DumpParsingError::InvalidOrMissingAtomRow(last_line_number + 1))?;
        last_line_number = line_number;
        let mut fields = line.split_whitespace();
        let name = fields
            .next()
            .ok_or(DumpParsingError::InvalidOrMissingAtomRow(line_number))?;
        let next_type = species.len() + 1;
        let atom_type = *species.entry(name.to_string()).or_insert(next_type);
        let position = fields
            .take(3)
            .map(str::parse::<f64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| DumpParsingError::InvalidOrMissingAtomRow(line_number))?;
        let [x, y, z] = position[..] else {
            return Err(DumpParsingError::InvalidOrMissingAtomRow(line_number));
        };
        rows.extend([(i + 1) as f64, atom_type as f64, x, y, z]);
    }
    let mut snapshot = DumpSnapshot::from_rows(keys, 0, atoms_count, SymBox::default(), &rows);
    snapshot.sym_box = SymBox::enclosing(&snapshot.get_coordinates());
    Ok(snapshot)
}
