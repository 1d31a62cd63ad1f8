use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use lammps_precipitate_util::{
    ConsoleProgress, FileSequence, HeaderParser, Pipeline, PipelineConfig, StructureType,
    TimeSeries, process_frames,
};
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

mod plot;
use plot::{PlotData, plot};

/// Tracks precipitate cluster statistics over a sequence of snapshots
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Snapshot file or glob pattern, one frame per file
    #[arg(default_value = "example/conf_*.txt")]
    input: String,

    /// RMSD cutoff of the structure matching, 0 disables it
    #[arg(short, long, default_value_t = 0.15)]
    rmsd_cutoff: f64,

    /// Dump timestep to analyze in every file, the first snapshot otherwise
    #[arg(long)]
    timestep: Option<u64>,

    /// Structure types to identify
    #[arg(short, long, value_delimiter = ',', default_value = "BCC")]
    structures: Vec<StructureType>,

    /// Atoms selected by this expression are deleted before clustering
    #[arg(short, long, default_value = "StructureType == 0")]
    delete: String,

    /// Cluster analysis cutoff (A)
    #[arg(short, long, default_value_t = 10.0)]
    cutoff: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    sort_by_size: bool,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    compute_com: bool,

    /// Smallest cluster counted as a precipitate (atoms)
    #[arg(short, long, default_value_t = 10)]
    min_size: usize,

    /// Approximate number of error bars on the mean cluster size
    #[arg(short, long, default_value_t = 10)]
    error_bars: usize,

    /// Plot file, .svg or .png
    #[arg(short, long, default_value = "clusters.svg")]
    output: PathBuf,

    /// Also write the per-frame values to this file
    #[arg(long)]
    table: Option<PathBuf>,

    /// Number of frames processed in parallel
    #[arg(short = 'j', long, default_value_t = 1)]
    threads: usize,
}

impl From<Cli> for PipelineConfig {
    fn from(cli: Cli) -> Self {
        Self {
            input_pattern: cli.input,
            timestep: cli.timestep,
            rmsd_cutoff: cli.rmsd_cutoff,
            structures_enabled: cli.structures,
            delete_expression: cli.delete,
            cluster_cutoff: cli.cutoff,
            sort_by_size: cli.sort_by_size,
            compute_com: cli.compute_com,
            min_precipitate_size: cli.min_size,
            num_error_bars: cli.error_bars,
            output_plot_file: cli.output,
            threads: cli.threads,
        }
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let table_path = cli.table.clone();
    let config = PipelineConfig::from(cli);

    let sequence = FileSequence::resolve(&config.input_pattern)?;
    let pipeline = Pipeline::new(&config)
        .with_context(|| format!("Invalid delete expression: {}", config.delete_expression))?;
    info!(
        "Matching {:?} with RMSD cutoff {}, cluster cutoff {}",
        config.structures_enabled, config.rmsd_cutoff, config.cluster_cutoff
    );

    let outcomes = process_frames(
        sequence.files(),
        &pipeline,
        &HeaderParser::new(),
        config.min_precipitate_size,
        config.threads,
        &ConsoleProgress::new(),
    )?;
    let failed = outcomes.iter().filter(|o| !o.is_success()).count();
    info!("{} of {} frames analyzed", outcomes.len() - failed, outcomes.len());

    let series = TimeSeries::from_outcomes(&outcomes);
    if let Some(table_path) = table_path {
        let file = File::create(&table_path)
            .with_context(|| format!("Creating {}", table_path.to_string_lossy()))?;
        series.write_table(BufWriter::new(file))?;
        info!("Table saved to {}", table_path.to_string_lossy());
    }

    let data = PlotData::new(&series, config.num_error_bars)?;
    plot(&data, &config.output_plot_file)?;
    Ok(())
}
