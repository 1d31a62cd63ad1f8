mod clusterizer;
mod dump_file;
mod dump_snapshot;
mod error;
mod expression;
mod frame_reader;
mod header;
mod math;
mod pipeline;
mod progress;
mod sequence;
mod series;
mod structure;
mod xyz;
mod xyz_file;

pub use clusterizer::{Cluster, ClusterTable, Clusterizer};
pub use dump_file::{DumpFile, DumpParsingError};
pub use dump_snapshot::{DumpSnapshot, SymBox};
pub use error::FrameError;
pub use expression::{CmpOp, Expression, ExpressionError, Operand};
pub use frame_reader::{parse_frame, read_frame, FrameFormat};
pub use header::{HeaderParser, TimeDose, HEADER_PATTERN};
pub use math::{IteratorAvg, LinearFit};
pub use pipeline::{FrameAnalyzer, Pipeline, PipelineConfig, RMSD_PROPERTY, STRUCTURE_TYPE_PROPERTY};
pub use progress::{format_progress, ConsoleProgress, Progress};
pub use sequence::{sort_naturally, FileSequence};
pub use series::{
    error_bar_stride, process_frame, process_frames, to_days, Column, FrameOutcome, FrameStats,
    TimeSeries, SECONDS_TO_DAYS,
};
pub use structure::{StructureMatcher, StructureType};
pub use xyz::XYZ;
pub use xyz_file::parse_xyz;
