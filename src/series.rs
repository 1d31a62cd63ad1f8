use anyhow::{Context, Result};
use itertools::{izip, Itertools};
use log::{debug, warn};
use rayon::{prelude::*, ThreadPoolBuilder};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::FrameError;
use crate::header::{HeaderParser, TimeDose};
use crate::math::IteratorAvg;
use crate::pipeline::FrameAnalyzer;
use crate::progress::Progress;

/// Seconds to days, as used for the time axis.
pub const SECONDS_TO_DAYS: f64 = 1.157e-5;

/// Numbers extracted from one successfully analyzed frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub time: f64,
    pub dose: f64,
    /// NaN when no cluster reaches the minimum size.
    pub mean_cluster_size: f64,
    /// Population standard deviation, NaN when no cluster is kept.
    pub std_cluster_size: f64,
    pub num_clusters: usize,
}

impl FrameStats {
    /// Statistics over the clusters with at least `min_size` atoms.
    pub fn new(sizes: impl IntoIterator<Item = usize>, min_size: usize, time_dose: TimeDose) -> Self {
        let kept = sizes
            .into_iter()
            .filter(|size| *size >= min_size)
            .map(|size| size as f64)
            .collect::<Vec<_>>();
        let (mean_cluster_size, std_cluster_size) = kept
            .iter()
            .copied()
            .avg_with_std()
            .unwrap_or((f64::NAN, f64::NAN));
        Self {
            time: time_dose.time,
            dose: time_dose.dose,
            mean_cluster_size,
            std_cluster_size,
            num_clusters: kept.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Success(FrameStats),
    Failed {
        frame: usize,
        path: PathBuf,
        reason: String,
    },
}

impl FrameOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Analyzes one frame. Recoverable errors become `FrameOutcome::Failed`
/// with a warning; anything else is returned as an error.
pub fn process_frame<A: FrameAnalyzer>(
    frame: usize,
    path: &Path,
    analyzer: &A,
    header: &HeaderParser,
    min_size: usize,
) -> Result<FrameOutcome> {
    let outcome = analyzer
        .analyze(path)
        .and_then(|table| {
            let time_dose = header.read(path)?.ok_or(FrameError::MissingHeader)?;
            Ok(FrameStats::new(table.sizes(), min_size, time_dose))
        });
    match outcome {
        Ok(stats) => {
            debug!("frame {frame}: {stats:?}");
            Ok(FrameOutcome::Success(stats))
        }
        Err(err) if err.is_recoverable() => {
            warn!(
                "Error raised for frame {frame} in source file {} with message: {err}. Setting values to NaN",
                path.to_string_lossy()
            );
            Ok(FrameOutcome::Failed {
                frame,
                path: path.to_path_buf(),
                reason: err.to_string(),
            })
        }
        Err(err) => Err(err).context(format!(
            "Processing frame {frame} ({})",
            path.to_string_lossy()
        )),
    }
}

/// Runs every frame through `analyzer`. Outcomes keep the order of `files`.
/// With more than one thread frames are processed on a rayon pool.
pub fn process_frames<A: FrameAnalyzer, P: Progress>(
    files: &[PathBuf],
    analyzer: &A,
    header: &HeaderParser,
    min_size: usize,
    threads: usize,
    progress: &P,
) -> Result<Vec<FrameOutcome>> {
    let total = files.len();
    let done = AtomicUsize::new(0);
    let run = |(frame, path): (usize, &PathBuf)| -> Result<FrameOutcome> {
        let outcome = process_frame(frame, path, analyzer, header, min_size)?;
        progress.update(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        Ok(outcome)
    };
    let outcomes = if threads > 1 {
        let tp = ThreadPoolBuilder::new().num_threads(threads).build()?;
        tp.install(|| {
            files
                .par_iter()
                .enumerate()
                .map(run)
                .collect::<Result<Vec<_>>>()
        })
    } else {
        files.iter().enumerate().map(run).collect::<Result<Vec<_>>>()
    };
    progress.finish();
    outcomes
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Time,
    Dose,
    MeanClusterSize,
    StdClusterSize,
    NumClusters,
}

impl Column {
    pub const ALL: [Column; 5] = [
        Self::Time,
        Self::Dose,
        Self::MeanClusterSize,
        Self::StdClusterSize,
        Self::NumClusters,
    ];
}

/// Per-frame columns, all of the same length. Failed frames are NaN in
/// every column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    pub times: Vec<f64>,
    pub doses: Vec<f64>,
    pub mean_cluster_sizes: Vec<f64>,
    pub std_cluster_sizes: Vec<f64>,
    pub num_clusters: Vec<f64>,
}

impl TimeSeries {
    pub fn from_outcomes(outcomes: &[FrameOutcome]) -> Self {
        outcomes.iter().fold(Self::default(), |mut series, outcome| {
            let row = match outcome {
                FrameOutcome::Success(stats) => [
                    stats.time,
                    stats.dose,
                    stats.mean_cluster_size,
                    stats.std_cluster_size,
                    stats.num_clusters as f64,
                ],
                FrameOutcome::Failed { .. } => [f64::NAN; 5],
            };
            series.push(row);
            series
        })
    }

    fn push(&mut self, [time, dose, mean, std, count]: [f64; 5]) {
        self.times.push(time);
        self.doses.push(dose);
        self.mean_cluster_sizes.push(mean);
        self.std_cluster_sizes.push(std);
        self.num_clusters.push(count);
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, column: Column) -> &[f64] {
        match column {
            Column::Time => &self.times,
            Column::Dose => &self.doses,
            Column::MeanClusterSize => &self.mean_cluster_sizes,
            Column::StdClusterSize => &self.std_cluster_sizes,
            Column::NumClusters => &self.num_clusters,
        }
    }

    /// True for the frames where every one of `columns` is finite.
    pub fn valid_mask(&self, columns: &[Column]) -> Vec<bool> {
        (0..self.len())
            .map(|i| columns.iter().all(|c| self.column(*c)[i].is_finite()))
            .collect()
    }

    /// `columns` restricted to the frames selected by one shared
    /// `valid_mask`, so the returned vectors always have equal lengths.
    pub fn filtered<const N: usize>(&self, columns: [Column; N]) -> [Vec<f64>; N] {
        let mask = self.valid_mask(&columns);
        columns.map(|column| {
            self.column(column)
                .iter()
                .zip(&mask)
                .filter(|(_, valid)| **valid)
                .map(|(v, _)| *v)
                .collect()
        })
    }

    pub fn times_in_days(&self) -> Vec<f64> {
        to_days(&self.times)
    }

    pub fn write_table<W: Write>(&self, mut w: W) -> io::Result<()> {
        writeln!(w, "# time_s time_days dose_dpa mean_cluster_size std_cluster_size num_clusters")?;
        let days = self.times_in_days();
        for row in izip!(
            &self.times,
            &days,
            &self.doses,
            &self.mean_cluster_sizes,
            &self.std_cluster_sizes,
            &self.num_clusters
        ) {
            let (t, days, d, m, s, n) = row;
            let line = [t, days, d, m, s, n].iter().map(|x| format!("{x:.6}")).join("\t");
            writeln!(w, "{line}")?;
        }
        Ok(())
    }
}

pub fn to_days(seconds: &[f64]) -> Vec<f64> {
    seconds.iter().map(|t| t * SECONDS_TO_DAYS).collect()
}

/// Every n-th point gets an error bar so that about `num_error_bars` are drawn.
pub fn error_bar_stride(num_points: usize, num_error_bars: usize) -> usize {
    num_points.checked_div(num_error_bars).unwrap_or(num_points).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusterizer::ClusterTable;
    use crate::dump_file::DumpParsingError;
    use crate::pipeline::{Pipeline, PipelineConfig};
    use assert_float_eq::assert_f64_near;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;

    /// Returns canned results keyed by file name.
    struct CannedAnalyzer {
        results: HashMap<String, Option<Vec<usize>>>,
    }

    impl FrameAnalyzer for CannedAnalyzer {
        fn analyze(&self, path: &Path) -> Result<ClusterTable, FrameError> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            match &self.results[&name] {
                Some(sizes) => Ok(ClusterTable::from_sizes(sizes)),
                None => Err(FrameError::Parse(DumpParsingError::InvalidOrMissingAtomRow(3))),
            }
        }
    }

    struct IoFailure;

    impl FrameAnalyzer for IoFailure {
        fn analyze(&self, _path: &Path) -> Result<ClusterTable, FrameError> {
            Err(FrameError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")))
        }
    }

    #[derive(Default)]
    struct Recorder {
        updates: Mutex<Vec<(usize, usize)>>,
    }

    impl Progress for Recorder {
        fn update(&self, done: usize, total: usize) {
            self.updates.lock().unwrap().push((done, total));
        }
    }

    fn three_frames(dir: &Path) -> (Vec<PathBuf>, CannedAnalyzer) {
        let headers = [
            "# t= 0 s dose: 0\n",
            "# t= 50 s dose: 0.005\n",
            "# t= 100 s dose: 0.01\n# t= 999 s dose: 9\n",
        ];
        let files = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                let path = dir.join(format!("conf_{i}.txt"));
                fs::write(&path, header).unwrap();
                path
            })
            .collect::<Vec<_>>();
        let results = HashMap::from([
            ("conf_0.txt".to_string(), Some(vec![5, 12, 20])),
            ("conf_1.txt".to_string(), None),
            ("conf_2.txt".to_string(), Some(vec![15])),
        ]);
        (files, CannedAnalyzer { results })
    }

    #[test]
    fn test_three_frames_with_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (files, analyzer) = three_frames(dir.path());
        let recorder = Recorder::default();
        let outcomes = process_frames(&files, &analyzer, &HeaderParser::new(), 10, 1, &recorder).unwrap();
        assert_eq!(recorder.updates.lock().unwrap().as_slice(), &[(1, 3), (2, 3), (3, 3)]);
        assert!(outcomes[0].is_success());
        assert!(matches!(&outcomes[1], FrameOutcome::Failed { frame: 1, .. }));

        let series = TimeSeries::from_outcomes(&outcomes);
        assert_eq!(series.len(), 3);
        assert_eq!(series.num_clusters[0], 2.0);
        assert!(series.num_clusters[1].is_nan());
        assert_eq!(series.num_clusters[2], 1.0);
        for column in [
            &series.times,
            &series.doses,
            &series.mean_cluster_sizes,
            &series.std_cluster_sizes,
        ] {
            assert!(column[1].is_nan());
        }
        assert_f64_near!(series.mean_cluster_sizes[0], 16.0);
        assert_f64_near!(series.std_cluster_sizes[0], 4.0);
        assert_f64_near!(series.mean_cluster_sizes[2], 15.0);
        assert_f64_near!(series.std_cluster_sizes[2], 0.0);
        // first header line wins
        assert_f64_near!(series.times[2], 100.0);
        assert_f64_near!(series.doses[2], 0.01);

        assert_eq!(series.valid_mask(&Column::ALL), vec![true, false, true]);
        for column in series.filtered(Column::ALL) {
            assert_eq!(column.len(), 2);
        }
    }

    #[test]
    fn test_invalid_utf8_frame_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let dump = "# t= 10 s dose: 0.1\nITEM: TIMESTEP\n0\nITEM: NUMBER OF ATOMS\n2\nITEM: BOX BOUNDS pp pp pp\n0 10\n0 10\n0 10\nITEM: ATOMS id type x y z\n1 1 1 1 1\n2 1 2 2 2\n";
        let good = dir.path().join("conf_0.txt");
        fs::write(&good, dump).unwrap();
        let bad = dir.path().join("conf_1.txt");
        let mut bytes = dump.as_bytes().to_vec();
        bytes.extend([0xff, 0xfe]);
        fs::write(&bad, bytes).unwrap();

        let pipeline = Pipeline::new(&PipelineConfig::default()).unwrap();
        let outcomes = process_frames(&[good, bad], &pipeline, &HeaderParser::new(), 10, 1, &()).unwrap();
        assert!(outcomes[0].is_success());
        match &outcomes[1] {
            FrameOutcome::Failed { frame, reason, .. } => {
                assert_eq!(*frame, 1);
                assert!(reason.contains("UTF-8"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let (files, analyzer) = three_frames(dir.path());
        let sequential = process_frames(&files, &analyzer, &HeaderParser::new(), 10, 1, &()).unwrap();
        let parallel = process_frames(&files, &analyzer, &HeaderParser::new(), 10, 3, &()).unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_missing_header_fails_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf_0.txt");
        fs::write(&path, "no header here\n").unwrap();
        let analyzer = CannedAnalyzer {
            results: HashMap::from([("conf_0.txt".to_string(), Some(vec![10]))]),
        };
        let outcome = process_frame(0, &path, &analyzer, &HeaderParser::new(), 10).unwrap();
        match outcome {
            FrameOutcome::Failed { reason, .. } => assert!(reason.contains("header")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_io_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let (files, _) = three_frames(dir.path());
        let result = process_frames(&files, &IoFailure, &HeaderParser::new(), 10, 1, &());
        assert!(result.is_err());
    }

    #[test]
    fn test_no_kept_clusters_is_nan_not_error() {
        let time_dose = TimeDose { time: 1.0, dose: 2.0 };
        let stats = FrameStats::new([1, 2, 9], 10, time_dose);
        assert_eq!(stats.num_clusters, 0);
        assert!(stats.mean_cluster_size.is_nan());
        assert!(stats.std_cluster_size.is_nan());
        let series = TimeSeries::from_outcomes(&[FrameOutcome::Success(stats)]);
        assert_eq!(series.valid_mask(&Column::ALL), vec![false]);
        let [times, counts] = series.filtered([Column::Time, Column::NumClusters]);
        assert_eq!(times, vec![1.0]);
        assert_eq!(counts, vec![0.0]);
        let [_, means] = series.filtered([Column::Time, Column::MeanClusterSize]);
        assert!(means.is_empty());
    }

    #[test]
    fn test_mask_is_shared_across_columns() {
        let series = TimeSeries {
            times: vec![0.0, f64::NAN, 2.0, 3.0],
            doses: vec![0.0, 1.0, 2.0, 3.0],
            mean_cluster_sizes: vec![1.0, 1.0, f64::NAN, 1.0],
            std_cluster_sizes: vec![0.0; 4],
            num_clusters: vec![1.0; 4],
        };
        let [times, doses, means] = series.filtered([Column::Time, Column::Dose, Column::MeanClusterSize]);
        assert_eq!(times, vec![0.0, 3.0]);
        assert_eq!(doses, vec![0.0, 3.0]);
        assert_eq!(means.len(), times.len());
        let [times, doses] = series.filtered([Column::Time, Column::Dose]);
        assert_eq!(times, vec![0.0, 2.0, 3.0]);
        assert_eq!(doses.len(), times.len());
    }

    #[test]
    fn test_days_conversion() {
        let series = TimeSeries {
            times: vec![1.0 / SECONDS_TO_DAYS, 0.0],
            ..Default::default()
        };
        let days = series.times_in_days();
        assert_f64_near!(days[0], 1.0);
        assert_eq!(days[1], 0.0);
    }

    #[test]
    fn test_error_bar_stride() {
        assert_eq!(error_bar_stride(100, 10), 10);
        assert_eq!(error_bar_stride(105, 10), 10);
        assert_eq!(error_bar_stride(5, 10), 1);
        assert_eq!(error_bar_stride(5, 0), 5);
        assert_eq!(error_bar_stride(0, 10), 1);
    }

    #[test]
    fn test_write_table() {
        let series = TimeSeries {
            times: vec![86400.0],
            doses: vec![0.5],
            mean_cluster_sizes: vec![12.0],
            std_cluster_sizes: vec![f64::NAN],
            num_clusters: vec![3.0],
        };
        let mut out = Vec::new();
        series.write_table(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines = text.lines().collect::<Vec<_>>();
        assert!(lines[0].starts_with('#'));
        assert_eq!(lines[1], "86400.000000\t0.999648\t0.500000\t12.000000\tNaN\t3.000000");
    }
}
