use std::collections::HashMap;
use std::fmt;

use crate::dump_file::DumpParsingError;
use crate::xyz::XYZ;

pub(crate) const HEADER_TIMESTEP: &str = "ITEM: TIMESTEP";
pub(crate) const HEADER_NUM_OF_ATOMS: &str = "ITEM: NUMBER OF ATOMS";
const HEADER_SYM_BOX: &str = "ITEM: BOX BOUNDS";
const HEADER_ATOMS: &str = "ITEM: ATOMS";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymBox {
    pub boundaries: String,
    pub xlo: f64,
    pub xhi: f64,
    pub ylo: f64,
    pub yhi: f64,
    pub zlo: f64,
    pub zhi: f64,
}

impl SymBox {
    /// Tight bounding box around `coords`, used for formats without cell data.
    pub fn enclosing(coords: &[XYZ]) -> Self {
        let fold = |f: fn(&XYZ) -> f64| {
            coords
                .iter()
                .map(f)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                    (lo.min(v), hi.max(v))
                })
        };
        let (xlo, xhi) = fold(XYZ::x);
        let (ylo, yhi) = fold(XYZ::y);
        let (zlo, zhi) = fold(XYZ::z);
        if coords.is_empty() {
            return Self::default();
        }
        Self {
            boundaries: "ff ff ff".to_string(),
            xlo,
            xhi,
            ylo,
            yhi,
            zlo,
            zhi,
        }
    }
}

/// One snapshot of a simulation, stored column by column.
#[derive(Clone)]
pub struct DumpSnapshot {
    pub step: u64,
    pub atoms_count: usize,
    pub sym_box: SymBox,
    keys: HashMap<String, usize>,
    atoms: Vec<f64>,
}

fn parse_bounds(line: Option<(usize, &str)>, after: usize) -> Result<(f64, f64), DumpParsingError> {
    let (line_number, line) = line.ok_or(DumpParsingError::InvalidSymBox(after + 1))?;
    let values = line
        .split_whitespace()
        .take(2)
        .map(str::parse::<f64>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| DumpParsingError::InvalidSymBox(line_number))?;
    match values[..] {
        [lo, hi] => Ok((lo, hi)),
        _ => Err(DumpParsingError::InvalidSymBox(line_number)),
    }
}

impl DumpSnapshot {
    pub fn new(keys: HashMap<String, usize>, step: u64, atoms_count: usize, sym_box: SymBox) -> Self {
        Self {
            step,
            atoms_count,
            atoms: vec![0.0; atoms_count * keys.len()],
            keys,
            sym_box,
        }
    }

    /// Reads the box and atom sections following the `NUMBER OF ATOMS` item.
    /// `lines` yields `(line_number, line)` pairs.
    pub fn read<'a, I>(lines: &mut I, step: u64, atoms_count: usize) -> Result<Self, DumpParsingError>
    where
        I: Iterator<Item = (usize, &'a str)>,
    {
        let (box_line_number, box_line) = lines.next().ok_or(DumpParsingError::MissingSymBox(0))?;
        let sym_box = match box_line.split_at_checked(HEADER_SYM_BOX.len()) {
            Some((HEADER_SYM_BOX, boundaries)) => {
                let (xlo, xhi) = parse_bounds(lines.next(), box_line_number)?;
                let (ylo, yhi) = parse_bounds(lines.next(), box_line_number + 1)?;
                let (zlo, zhi) = parse_bounds(lines.next(), box_line_number + 2)?;
                SymBox {
                    boundaries: boundaries.trim().to_string(),
                    xlo,
                    xhi,
                    ylo,
                    yhi,
                    zlo,
                    zhi,
                }
            }
            _ => return Err(DumpParsingError::MissingSymBox(box_line_number)),
        };

        let (keys_line_number, keys_line) = lines
            .next()
            .ok_or(DumpParsingError::MissingAtomKeys(box_line_number + 4))?;
        let mut keys = HashMap::new();
        match keys_line.split_at_checked(HEADER_ATOMS.len()) {
            Some((HEADER_ATOMS, names)) => {
                for key in names.split_whitespace() {
                    if keys.insert(key.to_string(), keys.len()).is_some() {
                        return Err(DumpParsingError::DuplicateAtomKeys(keys_line_number));
                    }
                }
            }
            _ => return Err(DumpParsingError::MissingAtomKeys(keys_line_number)),
        }

        let keys_count = keys.len();
        // grows with the rows actually present, not with the declared count
        let mut rows = Vec::new();
        let mut last_line_number = keys_line_number;
        for _ in 0..atoms_count {
            let (line_number, line) = lines
                .next()
                .ok_or(DumpParsingError::InvalidOrMissingAtomRow(last_line_number + 1))?;
            last_line_number = line_number;
            let values = line
                .split_whitespace()
                .map(str::parse::<f64>)
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| DumpParsingError::InvalidOrMissingAtomRow(line_number))?;
            if values.len() != keys_count {
                return Err(DumpParsingError::InvalidOrMissingAtomRow(line_number));
            }
            rows.extend(values);
        }
        Ok(Self::from_rows(keys, step, atoms_count, sym_box, &rows))
    }

    /// Snapshot from row-major values, `keys.len()` per atom.
    pub(crate) fn from_rows(
        keys: HashMap<String, usize>,
        step: u64,
        atoms_count: usize,
        sym_box: SymBox,
        rows: &[f64],
    ) -> Self {
        let keys_count = keys.len();
        debug_assert_eq!(rows.len(), atoms_count * keys_count);
        let mut snapshot = Self::new(keys, step, atoms_count, sym_box);
        if keys_count > 0 {
            for (i, row) in rows.chunks_exact(keys_count).enumerate() {
                for (j, &value) in row.iter().enumerate() {
                    snapshot.set_atom_value(j, i, value);
                }
            }
        }
        snapshot
    }

    pub fn get_keys(&self) -> Vec<&String> {
        let mut entries: Vec<(&String, &usize)> = self.keys.iter().collect();
        entries.sort_by(|a, b| a.1.cmp(b.1));
        entries.into_iter().map(|i| i.0).collect()
    }

    #[inline]
    pub fn has_property(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn get_property(&self, key: &str) -> &[f64] {
        self.try_get_property(key)
            .unwrap_or_else(|| panic!("snapshot has no property '{key}'"))
    }

    pub fn try_get_property(&self, key: &str) -> Option<&[f64]> {
        let start = *self.keys.get(key)? * self.atoms_count;
        let end = start + self.atoms_count;
        Some(&self.atoms[start..end])
    }

    #[inline]
    pub fn get_atom_value(&self, property_index: usize, atom_index: usize) -> f64 {
        self.atoms[self.atoms_count * property_index + atom_index]
    }

    #[inline]
    pub fn set_atom_value(&mut self, property_index: usize, atom_index: usize, value: f64) {
        self.atoms[self.atoms_count * property_index + atom_index] = value;
    }

    /// Adds a new column or overwrites an existing one.
    pub fn set_property(&mut self, key: &str, values: &[f64]) {
        assert_eq!(values.len(), self.atoms_count);
        let j = match self.keys.get(key) {
            Some(&j) => j,
            None => {
                let j = self.keys.len();
                self.keys.insert(key.to_string(), j);
                self.atoms.resize(self.atoms.len() + self.atoms_count, 0.0);
                j
            }
        };
        let start = j * self.atoms_count;
        self.atoms[start..start + self.atoms_count].copy_from_slice(values);
    }

    /// Positions from the `x`, `y` and `z` columns.
    pub fn get_coordinates(&self) -> Vec<XYZ> {
        let x = self.get_property("x");
        let y = self.get_property("y");
        let z = self.get_property("z");
        (0..self.atoms_count)
            .map(|i| XYZ::from([x[i], y[i], z[i]], i))
            .collect()
    }

    /// New snapshot holding only the atoms at `indices`, in that order.
    pub fn copy_with_indices(&self, indices: impl IntoIterator<Item = usize>) -> Self {
        let indices = indices.into_iter().collect::<Vec<_>>();
        let mut snapshot = Self::new(
            self.keys.clone(),
            self.step,
            indices.len(),
            self.sym_box.clone(),
        );
        for j in 0..self.keys.len() {
            for (new_i, &i) in indices.iter().enumerate() {
                snapshot.set_atom_value(j, new_i, self.get_atom_value(j, i));
            }
        }
        snapshot
    }
}

impl fmt::Debug for DumpSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumpSnapshot")
            .field("step", &self.step)
            .field("atoms_count", &self.atoms_count)
            .field("keys", &self.get_keys())
            .finish()
    }
}
