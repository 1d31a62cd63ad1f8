use kd_tree::KdTree;
use std::collections::VecDeque;

use crate::dump_snapshot::DumpSnapshot;
use crate::xyz::XYZ;

#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    /// Starts at 1.
    pub id: usize,
    pub size: usize,
    pub center_of_mass: Option<[f64; 3]>,
}

/// Result of a cluster analysis, one row per cluster.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTable {
    clusters: Vec<Cluster>,
}

impl ClusterTable {
    pub fn from_sizes(sizes: &[usize]) -> Self {
        let clusters = sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| Cluster {
                id: i + 1,
                size,
                center_of_mass: None,
            })
            .collect();
        Self { clusters }
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.clusters.iter().map(|c| c.size)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Groups atoms into connected components: two atoms belong to the same
/// cluster when a chain of neighbours closer than `cutoff` links them.
#[derive(Debug, Clone)]
pub struct Clusterizer {
    cutoff: f64,
    sort_by_size: bool,
    compute_com: bool,
}

impl Clusterizer {
    pub fn new(cutoff: f64) -> Self {
        Self {
            cutoff,
            sort_by_size: false,
            compute_com: false,
        }
    }

    /// Number clusters by decreasing size, ties by their lowest atom index.
    pub fn sort_by_size(mut self, sort_by_size: bool) -> Self {
        self.sort_by_size = sort_by_size;
        self
    }

    pub fn compute_com(mut self, compute_com: bool) -> Self {
        self.compute_com = compute_com;
        self
    }

    fn components(&self, coords: &[XYZ]) -> Vec<Vec<usize>> {
        if coords.is_empty() {
            return Vec::new();
        }
        let tree = KdTree::build_by_ordered_float(coords.to_vec());
        let mut visited = vec![false; coords.len()];
        let mut components = Vec::new();
        for start in 0..coords.len() {
            if visited[start] {
                continue;
            }
            visited[start] = true;
            let mut members = vec![start];
            let mut queue = VecDeque::from([start]);
            while let Some(atom_i) = queue.pop_front() {
                for neighbour in tree.within_radius(&coords[atom_i], self.cutoff) {
                    let j = neighbour.index();
                    if !visited[j] {
                        visited[j] = true;
                        members.push(j);
                        queue.push_back(j);
                    }
                }
            }
            components.push(members);
        }
        components
    }

    fn center_of_mass(members: &[usize], coords: &[XYZ], mass: Option<&[f64]>) -> [f64; 3] {
        let (sum, total) = members.iter().fold(([0.0; 3], 0.0), |(mut sum, total), &i| {
            let m = mass.map_or(1.0, |mass| mass[i]);
            sum[0] += m * coords[i].x();
            sum[1] += m * coords[i].y();
            sum[2] += m * coords[i].z();
            (sum, total + m)
        });
        sum.map(|s| s / total)
    }

    pub fn clusterize(&self, snapshot: &DumpSnapshot) -> ClusterTable {
        let coords = snapshot.get_coordinates();
        let mut components = self.components(&coords);
        if self.sort_by_size {
            // stable, components are already ordered by lowest member
            components.sort_by(|a, b| b.len().cmp(&a.len()));
        }
        let mass = snapshot.try_get_property("mass");
        let clusters = components
            .iter()
            .enumerate()
            .map(|(i, members)| Cluster {
                id: i + 1,
                size: members.len(),
                center_of_mass: self
                    .compute_com
                    .then(|| Self::center_of_mass(members, &coords, mass)),
            })
            .collect();
        ClusterTable { clusters }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dump_snapshot::SymBox;
    use assert_float_eq::assert_f64_near;

    fn snapshot(positions: &[[f64; 3]], mass: Option<&[f64]>) -> DumpSnapshot {
        let mut keys = vec!["x", "y", "z"];
        if mass.is_some() {
            keys.push("mass");
        }
        let keys = keys
            .into_iter()
            .enumerate()
            .map(|(j, k)| (k.to_string(), j))
            .collect();
        let mut snapshot = DumpSnapshot::new(keys, 0, positions.len(), SymBox::default());
        for (j, key) in ["x", "y", "z"].iter().enumerate() {
            let column = positions.iter().map(|p| p[j]).collect::<Vec<_>>();
            snapshot.set_property(key, &column);
        }
        if let Some(mass) = mass {
            snapshot.set_property("mass", mass);
        }
        snapshot
    }

    #[test]
    fn test_chain_is_one_cluster() {
        let positions = [[0.0, 0.0, 0.0], [2.5, 0.0, 0.0], [5.0, 0.0, 0.0], [20.0, 0.0, 0.0]];
        let table = Clusterizer::new(3.0).clusterize(&snapshot(&positions, None));
        assert_eq!(table.sizes().collect::<Vec<_>>(), vec![3, 1]);
        assert_eq!(table.clusters()[1].id, 2);
    }

    #[test]
    fn test_sort_by_size_and_com() {
        let positions = [
            [50.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [30.0, 0.0, 0.0],
            [31.0, 0.0, 0.0],
        ];
        let mass = [1.0, 1.0, 2.0, 1.0, 1.0, 3.0];
        let table = Clusterizer::new(1.5)
            .sort_by_size(true)
            .compute_com(true)
            .clusterize(&snapshot(&positions, Some(&mass)));
        assert_eq!(table.sizes().collect::<Vec<_>>(), vec![3, 2, 1]);
        let com = table.clusters()[1].center_of_mass.unwrap();
        assert_f64_near!(com[0], 30.75);
        let com = table.clusters()[0].center_of_mass.unwrap();
        assert_f64_near!(com[0], 0.5);
        assert_f64_near!(com[1], 0.25);
    }

    #[test]
    fn test_empty_snapshot() {
        let table = Clusterizer::new(10.0).clusterize(&snapshot(&[], None));
        assert!(table.is_empty());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn test_from_sizes() {
        let table = ClusterTable::from_sizes(&[5, 12, 20]);
        assert_eq!(table.clusters()[2].id, 3);
        assert_eq!(table.sizes().sum::<usize>(), 37);
    }
}
