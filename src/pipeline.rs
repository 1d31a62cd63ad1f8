use log::{debug, warn};
use std::path::{Path, PathBuf};

use crate::clusterizer::{ClusterTable, Clusterizer};
use crate::dump_snapshot::DumpSnapshot;
use crate::error::FrameError;
use crate::expression::{Expression, ExpressionError};
use crate::frame_reader::read_frame;
use crate::structure::{StructureMatcher, StructureType};

pub const STRUCTURE_TYPE_PROPERTY: &str = "StructureType";
pub const RMSD_PROPERTY: &str = "RMSD";

/// Everything the analysis needs, fixed before the first frame is read.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// File or glob pattern, one frame per matching file.
    pub input_pattern: String,
    /// Snapshot analyzed in multi-snapshot dumps, the first one when `None`.
    pub timestep: Option<u64>,
    pub rmsd_cutoff: f64,
    pub structures_enabled: Vec<StructureType>,
    /// Atoms for which this evaluates to true are deleted before clustering.
    /// Empty keeps every atom.
    pub delete_expression: String,
    pub cluster_cutoff: f64,
    pub sort_by_size: bool,
    pub compute_com: bool,
    pub min_precipitate_size: usize,
    pub num_error_bars: usize,
    pub output_plot_file: PathBuf,
    pub threads: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_pattern: "example/conf_*.txt".to_string(),
            timestep: None,
            rmsd_cutoff: 0.15,
            structures_enabled: vec![StructureType::BCC],
            delete_expression: "StructureType == 0".to_string(),
            cluster_cutoff: 10.0,
            sort_by_size: true,
            compute_com: true,
            min_precipitate_size: 10,
            num_error_bars: 10,
            output_plot_file: PathBuf::from("clusters.svg"),
            threads: 1,
        }
    }
}

/// Turns one snapshot file into its cluster table.
pub trait FrameAnalyzer: Sync {
    fn analyze(&self, path: &Path) -> Result<ClusterTable, FrameError>;
}

/// Structure matching, deletion of selected atoms, then cluster analysis.
pub struct Pipeline {
    timesteps: Vec<u64>,
    matcher: StructureMatcher,
    delete: Option<Expression>,
    clusterizer: Clusterizer,
}

impl Pipeline {
    pub fn new(config: &PipelineConfig) -> Result<Self, ExpressionError> {
        let delete = match config.delete_expression.trim() {
            "" => None,
            expression => Some(expression.parse::<Expression>()?),
        };
        let matcher = StructureMatcher::new(config.rmsd_cutoff, &config.structures_enabled);
        if matcher.enabled().is_empty() {
            warn!("No structure types enabled, every atom is classified as Other");
        }
        Ok(Self {
            timesteps: config.timestep.into_iter().collect(),
            matcher,
            delete,
            clusterizer: Clusterizer::new(config.cluster_cutoff)
                .sort_by_size(config.sort_by_size)
                .compute_com(config.compute_com),
        })
    }

    /// Adds the `StructureType` and `RMSD` columns.
    pub fn match_structures(&self, snapshot: &mut DumpSnapshot) -> Result<(), FrameError> {
        for key in ["x", "y", "z"] {
            if !snapshot.has_property(key) {
                return Err(FrameError::MissingProperty(key.to_string()));
            }
        }
        let (types, rmsd): (Vec<f64>, Vec<f64>) = self
            .matcher
            .classify(&snapshot.get_coordinates())
            .into_iter()
            .map(|(structure, rmsd)| (structure as u8 as f64, rmsd))
            .unzip();
        snapshot.set_property(STRUCTURE_TYPE_PROPERTY, &types);
        snapshot.set_property(RMSD_PROPERTY, &rmsd);
        Ok(())
    }

    /// Drops the atoms selected by the delete expression.
    pub fn delete_selected(&self, snapshot: DumpSnapshot) -> Result<DumpSnapshot, FrameError> {
        let Some(expression) = &self.delete else {
            return Ok(snapshot);
        };
        let selected = expression.select(&snapshot)?;
        let kept = selected
            .iter()
            .enumerate()
            .filter(|(_, selected)| !**selected)
            .map(|(i, _)| i);
        let remaining = snapshot.copy_with_indices(kept);
        debug!(
            "deleted {} of {} atoms",
            snapshot.atoms_count - remaining.atoms_count,
            snapshot.atoms_count
        );
        Ok(remaining)
    }

    pub fn analyze_snapshot(&self, mut snapshot: DumpSnapshot) -> Result<ClusterTable, FrameError> {
        self.match_structures(&mut snapshot)?;
        let snapshot = self.delete_selected(snapshot)?;
        let table = self.clusterizer.clusterize(&snapshot);
        if let Some(largest) = table.clusters().first() {
            debug!(
                "{} clusters, largest has {} atoms, center of mass {:?}",
                table.len(),
                largest.size,
                largest.center_of_mass
            );
        }
        Ok(table)
    }
}

impl FrameAnalyzer for Pipeline {
    fn analyze(&self, path: &Path) -> Result<ClusterTable, FrameError> {
        self.analyze_snapshot(read_frame(path, &self.timesteps)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two BCC grains of 4x4x4 cells far apart plus an isolated atom.
    fn bcc_dump() -> String {
        let a = 2.87;
        let mut rows = Vec::new();
        for offset in [0.0, 100.0] {
            for i in 0..4 {
                for j in 0..4 {
                    for k in 0..4 {
                        for b in [0.0, 0.5] {
                            rows.push([
                                offset + (i as f64 + b) * a,
                                (j as f64 + b) * a,
                                (k as f64 + b) * a,
                            ]);
                        }
                    }
                }
            }
        }
        rows.push([50.0, 50.0, 50.0]);
        let atoms = rows
            .iter()
            .enumerate()
            .map(|(i, p)| format!("{} 1 {} {} {}", i + 1, p[0], p[1], p[2]))
            .collect::<Vec<_>>()
            .join("\n");
        format!(
            "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n{}\nITEM: BOX BOUNDS pp pp pp\n0 200\n0 200\n0 200\nITEM: ATOMS id type x y z\n{atoms}\n",
            rows.len()
        )
    }

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.rmsd_cutoff, 0.15);
        assert_eq!(config.structures_enabled, vec![StructureType::BCC]);
        assert_eq!(config.cluster_cutoff, 10.0);
        assert_eq!(config.min_precipitate_size, 10);
        assert_eq!(config.num_error_bars, 10);
    }

    #[test]
    fn test_bad_expression_is_rejected() {
        let config = PipelineConfig {
            delete_expression: "StructureType ==".to_string(),
            ..Default::default()
        };
        assert!(Pipeline::new(&config).is_err());
    }

    #[test]
    fn test_bcc_grains_form_two_clusters() {
        let snapshot = crate::frame_reader::parse_frame(&bcc_dump(), &[]).unwrap();
        let atoms_count = snapshot.atoms_count;
        let pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();

        let mut matched = snapshot.clone();
        pipeline.match_structures(&mut matched).unwrap();
        let types = matched.get_property(STRUCTURE_TYPE_PROPERTY);
        assert_eq!(types.len(), atoms_count);
        // the isolated atom has no neighbours worth matching
        assert_eq!(types[atoms_count - 1], 0.0);
        assert!(types.iter().any(|t| *t == StructureType::BCC as u8 as f64));

        let table = pipeline.analyze_snapshot(snapshot).unwrap();
        // 8 corner and 8 body centre sites per grain are fully coordinated
        assert_eq!(table.sizes().collect::<Vec<_>>(), vec![16, 16]);
    }

    #[test]
    fn test_without_delete_expression_keeps_all_atoms() {
        let config = PipelineConfig {
            delete_expression: String::new(),
            ..Default::default()
        };
        let pipeline = Pipeline::new(&config).unwrap();
        let snapshot = crate::frame_reader::parse_frame(&bcc_dump(), &[]).unwrap();
        let atoms_count = snapshot.atoms_count;
        let table = pipeline.analyze_snapshot(snapshot).unwrap();
        assert_eq!(table.sizes().sum::<usize>(), atoms_count);
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_positions() {
        let pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        let snapshot = crate::frame_reader::parse_frame(
            "ITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n1\nITEM: BOX BOUNDS pp pp pp\n0 1\n0 1\n0 1\nITEM: ATOMS id type\n1 1\n",
            &[],
        )
        .unwrap();
        let err = pipeline.analyze_snapshot(snapshot).unwrap_err();
        assert!(matches!(err, FrameError::MissingProperty(ref key) if key == "x"));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_no_structures_enabled() {
        let config = PipelineConfig {
            structures_enabled: Vec::new(),
            ..Default::default()
        };
        let pipeline = Pipeline::new(&config).unwrap();
        let mut snapshot = crate::frame_reader::parse_frame(&bcc_dump(), &[]).unwrap();
        pipeline.match_structures(&mut snapshot).unwrap();
        assert!(snapshot.get_property(STRUCTURE_TYPE_PROPERTY).iter().all(|t| *t == 0.0));
        assert!(pipeline.delete_selected(snapshot).unwrap().atoms_count == 0);
    }

    #[test]
    fn test_configured_timestep_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf_0.txt");
        let second = bcc_dump().replacen("TIMESTEP\n0\n", "TIMESTEP\n100\n", 1);
        std::fs::write(&path, format!("{}{second}", bcc_dump())).unwrap();
        let config = PipelineConfig {
            timestep: Some(100),
            delete_expression: String::new(),
            ..Default::default()
        };
        let pipeline = Pipeline::new(&config).unwrap();
        assert_eq!(pipeline.analyze(&path).unwrap().len(), 3);
        let config = PipelineConfig {
            timestep: Some(50),
            ..config
        };
        let err = Pipeline::new(&config).unwrap().analyze(&path).unwrap_err();
        assert!(err.is_recoverable());
    }
}
