use itertools::Itertools;
use kd_tree::KdTree;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::{fmt, str::FromStr};

use crate::xyz::XYZ;

/// Local crystal structure of an atom. Discriminants are the values stored in
/// the `StructureType` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StructureType {
    Other = 0,
    FCC = 1,
    HCP = 2,
    BCC = 3,
    ICO = 4,
    SC = 5,
    CubicDiamond = 6,
    HexDiamond = 7,
    Graphene = 8,
}

impl StructureType {
    pub const MATCHABLE: [StructureType; 8] = [
        Self::FCC,
        Self::HCP,
        Self::BCC,
        Self::ICO,
        Self::SC,
        Self::CubicDiamond,
        Self::HexDiamond,
        Self::Graphene,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Other => "OTHER",
            Self::FCC => "FCC",
            Self::HCP => "HCP",
            Self::BCC => "BCC",
            Self::ICO => "ICO",
            Self::SC => "SC",
            Self::CubicDiamond => "CUBIC_DIAMOND",
            Self::HexDiamond => "HEX_DIAMOND",
            Self::Graphene => "GRAPHENE",
        }
    }

    /// Neighbour vectors of the ideal structure, in arbitrary units.
    fn template(&self) -> Vec<Vector3<f64>> {
        match self {
            Self::Other => Vec::new(),
            Self::SC => axis_vectors(1.0),
            Self::FCC => signs2()
                .flat_map(|(a, b)| {
                    [
                        Vector3::new(a, b, 0.0),
                        Vector3::new(a, 0.0, b),
                        Vector3::new(0.0, a, b),
                    ]
                })
                .collect(),
            Self::HCP => {
                let r = 1.0 / 3.0_f64.sqrt();
                let h = (2.0 / 3.0_f64).sqrt();
                let plane = (0..6).map(|k| polar(1.0, 60.0 * k as f64, 0.0));
                let layers = [h, -h]
                    .into_iter()
                    .flat_map(|z| (0..3).map(move |k| polar(r, 30.0 + 120.0 * k as f64, z)));
                plane.chain(layers).collect()
            }
            Self::ICO => {
                let phi = (1.0 + 5.0_f64.sqrt()) / 2.0;
                signs2()
                    .flat_map(|(a, b)| {
                        [
                            Vector3::new(0.0, a, b * phi),
                            Vector3::new(a, b * phi, 0.0),
                            Vector3::new(b * phi, 0.0, a),
                        ]
                    })
                    .collect()
            }
            Self::BCC => {
                let corners = signs2().flat_map(|(a, b)| [Vector3::new(a, b, 1.0), Vector3::new(a, b, -1.0)]);
                corners.chain(axis_vectors(2.0)).collect()
            }
            Self::CubicDiamond => {
                let bonds = [
                    Vector3::new(1.0, 1.0, 1.0),
                    Vector3::new(1.0, -1.0, -1.0),
                    Vector3::new(-1.0, 1.0, -1.0),
                    Vector3::new(-1.0, -1.0, 1.0),
                ];
                with_second_shell(&bonds, &[0, 1, 2, 3], &[])
            }
            Self::HexDiamond => {
                let s = 8.0_f64.sqrt() / 3.0;
                let lower = (0..3).map(|k| polar(s, 120.0 * k as f64, -1.0 / 3.0));
                let bonds = std::iter::once(Vector3::z()).chain(lower).collect::<Vec<_>>();
                // the bond along c is eclipsed
                let eclipsed = (0..3)
                    .map(|k| Vector3::z() + polar(s, 120.0 * k as f64, 1.0 / 3.0))
                    .collect::<Vec<_>>();
                with_second_shell(&bonds, &[1, 2, 3], &eclipsed)
            }
            Self::Graphene => {
                let bonds = (0..3)
                    .map(|k| polar(1.0, 90.0 + 120.0 * k as f64, 0.0))
                    .collect::<Vec<_>>();
                with_second_shell(&bonds, &[0, 1, 2], &[])
            }
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StructureType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_uppercase();
        [Self::Other]
            .into_iter()
            .chain(Self::MATCHABLE)
            .find(|t| t.name() == s)
            .ok_or_else(|| format!("unknown structure type '{s}'"))
    }
}

fn signs2() -> impl Iterator<Item = (f64, f64)> + Clone {
    [(1.0, 1.0), (1.0, -1.0), (-1.0, 1.0), (-1.0, -1.0)].into_iter()
}

fn axis_vectors(length: f64) -> Vec<Vector3<f64>> {
    (0..3)
        .flat_map(|i| {
            [length, -length].map(|l| {
                let mut v = Vector3::zeros();
                v[i] = l;
                v
            })
        })
        .collect()
}

fn polar(r: f64, degrees: f64, z: f64) -> Vector3<f64> {
    let a = degrees.to_radians();
    Vector3::new(r * a.cos(), r * a.sin(), z)
}

/// First shell `bonds` followed by the second shell reached through the bonds
/// listed in `staggered` (whose neighbours point along `-bonds`), plus any
/// `extra` second shell vectors.
fn with_second_shell(bonds: &[Vector3<f64>], staggered: &[usize], extra: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
    let second = staggered.iter().flat_map(|&i| {
        bonds
            .iter()
            .enumerate()
            .filter(move |(j, _)| *j != i)
            .map(move |(_, b)| bonds[i] - b)
    });
    bonds.iter().copied().chain(second).chain(extra.iter().copied()).collect()
}

/// Rotation and permutation invariant description of a neighbourhood: sorted
/// radial distances followed by sorted pairwise distances, all scaled by the
/// mean radial distance.
fn fingerprint(neighbours: &[Vector3<f64>]) -> Option<Vec<f64>> {
    let count = neighbours.len();
    if count == 0 {
        return None;
    }
    let scale = neighbours.iter().map(|v| v.norm()).sum::<f64>() / count as f64;
    if !scale.is_normal() {
        return None;
    }
    let radial = neighbours.iter().map(|v| v.norm() / scale).sorted_by(f64::total_cmp);
    let pairs = neighbours
        .iter()
        .tuple_combinations()
        .map(|(a, b)| (a - b).norm() / scale)
        .sorted_by(f64::total_cmp);
    Some(radial.chain(pairs).collect())
}

/// Deviation between two fingerprints, normalized per neighbour rather than
/// per entry so that pairwise terms are not diluted.
fn rmsd(a: &[f64], b: &[f64], neighbours: usize) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let sum = a.iter().zip(b).map(|(a, b)| (a - b).powi(2)).sum::<f64>();
    (sum / neighbours as f64).sqrt()
}

struct Template {
    structure: StructureType,
    neighbours: usize,
    fingerprint: Vec<f64>,
}

/// Per-atom structure identification by comparing each neighbourhood against
/// ideal templates of the enabled structure types.
pub struct StructureMatcher {
    rmsd_cutoff: f64,
    templates: Vec<Template>,
}

impl StructureMatcher {
    /// An `rmsd_cutoff` of zero accepts any best match.
    pub fn new(rmsd_cutoff: f64, enabled: &[StructureType]) -> Self {
        let templates = enabled
            .iter()
            .copied()
            .filter(|t| *t != StructureType::Other)
            .sorted()
            .dedup()
            .filter_map(|structure| {
                let template = structure.template();
                fingerprint(&template).map(|fingerprint| Template {
                    structure,
                    neighbours: template.len(),
                    fingerprint,
                })
            })
            .collect();
        Self {
            rmsd_cutoff,
            templates,
        }
    }

    pub fn enabled(&self) -> Vec<StructureType> {
        self.templates.iter().map(|t| t.structure).collect()
    }

    fn max_neighbours(&self) -> usize {
        self.templates.iter().map(|t| t.neighbours).max().unwrap_or(0)
    }

    /// Best match for an atom given its neighbour vectors sorted by distance.
    fn match_neighbours(&self, neighbours: &[Vector3<f64>]) -> (StructureType, f64) {
        let best = self
            .templates
            .iter()
            .filter(|t| t.neighbours <= neighbours.len())
            .filter_map(|t| {
                let fp = fingerprint(&neighbours[..t.neighbours])?;
                Some((t.structure, rmsd(&fp, &t.fingerprint, t.neighbours)))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((structure, score)) if self.rmsd_cutoff <= 0.0 || score <= self.rmsd_cutoff => {
                (structure, score)
            }
            Some((_, score)) => (StructureType::Other, score),
            None => (StructureType::Other, f64::NAN),
        }
    }

    /// Structure type and match score for every atom, in input order.
    pub fn classify(&self, coords: &[XYZ]) -> Vec<(StructureType, f64)> {
        let max_neighbours = self.max_neighbours();
        if max_neighbours == 0 || coords.len() < 2 {
            return vec![(StructureType::Other, f64::NAN); coords.len()];
        }
        let tree = KdTree::build_by_ordered_float(coords.to_vec());
        coords
            .par_iter()
            .map(|atom| {
                let center = atom.vector();
                let neighbours = tree
                    .nearests(atom, max_neighbours + 1)
                    .into_iter()
                    .filter(|n| n.item.index() != atom.index())
                    .sorted_by(|a, b| a.squared_distance.total_cmp(&b.squared_distance))
                    .take(max_neighbours)
                    .map(|n| n.item.vector() - center)
                    .collect::<Vec<_>>();
                self.match_neighbours(&neighbours)
            })
            .collect()
    }
}
