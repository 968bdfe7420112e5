use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use cti_window::integrate::{collapsed_gaps, squeeze_time};
use cti_window::{
    find_windows, read_csv_file, ChannelStats, ErrorKind, IngestOptions, TimeSeries,
    WindowError, WindowParams, WindowSpec, WindowTable, UNITY_CHANNEL,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const SUMMARY_FILE: &str = "windows_summary.csv";

#[derive(Parser, Debug)]
#[command(author, version, about = "Work- and time-based emissions window processor", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute window tables for one or more CSV time series
    Windows(WindowsArgs),
    /// Report channels, time span and collapsed gaps of CSV time series
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct WindowsArgs {
    /// CSV files to process
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Folder for per-file window tables and the run summary
    #[arg(short, long, default_value = "output", value_hint = ValueHint::DirPath)]
    output_dir: PathBuf,

    /// JSON window spec; flags below override its values
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Window-weight channel
    #[arg(long)]
    weight: Option<String>,

    /// Size windows by elapsed (gap-collapsed) time instead of a weight channel
    #[arg(long, action = ArgAction::SetTrue, conflicts_with = "weight")]
    time_based: bool,

    /// Channels to integrate per window (comma separated)
    #[arg(long)]
    integrate: Option<String>,

    /// Channels to summarize per window with MIN/MAX/AVG/SD (comma separated)
    #[arg(long)]
    statistic: Option<String>,

    /// Target window size in weight-channel quantity units
    #[arg(long)]
    window_size: Option<f64>,

    /// Spacing between window start anchors (seconds)
    #[arg(long)]
    window_step: Option<f64>,

    /// Time gaps longer than this are collapsed (seconds)
    #[arg(long)]
    max_dt: Option<f64>,

    /// Name of the time column in the input CSVs
    #[arg(long, default_value = "Time secs")]
    time_channel: String,

    /// Value substituted for empty cells (left as NaN otherwise)
    #[arg(long)]
    fill_missing: Option<f64>,

    /// Keep the source time offset instead of starting at zero
    #[arg(long, action = ArgAction::SetTrue)]
    keep_time_offset: bool,

    /// Drop windows shorter than this many seconds from the written tables
    #[arg(long, default_value_t = 0.0)]
    min_duration: f64,

    /// Window table format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    /// Abort on the first failing file instead of skipping it
    #[arg(long, action = ArgAction::SetTrue)]
    strict: bool,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Log per-stage timings
    #[arg(long, action = ArgAction::SetTrue)]
    profile: bool,
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// CSV files to inspect
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output report path
    #[arg(short, long, default_value = "window_inspect.txt", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Name of the time column in the input CSVs
    #[arg(long, default_value = "Time secs")]
    time_channel: String,

    /// Gap threshold used to report the squeezed time span (seconds)
    #[arg(long, default_value_t = 1.0)]
    max_dt: f64,

    /// Verbose logging
    #[arg(long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

impl OutputFormat {
    fn extension(self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Json => "json",
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Windows(args) => args.verbose,
        Command::Inspect(args) => args.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Windows(args) => handle_windows(args),
        Command::Inspect(args) => handle_inspect(args),
    }
}

/// Everything a worker needs to process one file.
#[derive(Debug)]
struct Job {
    spec: WindowSpec,
    ingest: IngestOptions,
    min_duration: f64,
    output_dir: PathBuf,
    format: OutputFormat,
    profile: bool,
}

#[derive(Debug)]
struct FileRun {
    samples: usize,
    windows: usize,
    partial_windows: usize,
    output: PathBuf,
}

#[derive(Debug)]
struct FileOutcome {
    input: PathBuf,
    result: std::result::Result<FileRun, String>,
}

fn handle_windows(args: WindowsArgs) -> Result<()> {
    if !args.min_duration.is_finite() || args.min_duration < 0.0 {
        return Err(anyhow!("--min-duration must be a finite value >= 0"));
    }
    let spec = build_spec(&args)?;
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("failed to create {}", args.output_dir.display()))?;

    info!(
        "Windowing {} file(s): weight {}, size {}, step {} s, max_dt {} s",
        args.inputs.len(),
        spec.weight_channel,
        spec.params.window_size,
        spec.params.window_step,
        spec.params.max_dt
    );

    let job = Job {
        spec,
        ingest: IngestOptions {
            time_channel: args.time_channel.clone(),
            fill_missing: args.fill_missing,
            zero_base: !args.keep_time_offset,
        },
        min_duration: args.min_duration,
        output_dir: args.output_dir.clone(),
        format: args.format,
        profile: args.profile || args.verbose,
    };

    let t_all = Instant::now();
    let outcomes: Vec<FileOutcome> = if args.strict {
        args.inputs
            .par_iter()
            .map(|path| {
                process_file(path, &job).map(|run| FileOutcome {
                    input: path.clone(),
                    result: Ok(run),
                })
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        args.inputs
            .par_iter()
            .map(|path| {
                let result = process_file(path, &job).map_err(|err| {
                    warn!(
                        "Skipping {} ({} error): {:#}",
                        path.display(),
                        failure_kind(&err),
                        err
                    );
                    format!("{:#}", err)
                });
                FileOutcome {
                    input: path.clone(),
                    result,
                }
            })
            .collect()
    };

    let summary_path = args.output_dir.join(SUMMARY_FILE);
    write_summary(&outcomes, &summary_path)?;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    info!(
        "Processed {} file(s), {} failed, in {:.1} ms; summary: {}",
        outcomes.len(),
        failed,
        t_all.elapsed().as_secs_f64() * 1000.0,
        summary_path.display()
    );

    if !outcomes.is_empty() && failed == outcomes.len() {
        return Err(anyhow!("all {} input file(s) failed", failed));
    }
    Ok(())
}

fn build_spec(args: &WindowsArgs) -> Result<WindowSpec> {
    let mut spec = match args.config.as_ref() {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read window spec {}", path.display()))?;
            WindowSpec::from_json_str(&text)
                .with_context(|| format!("invalid window spec {}", path.display()))?
        }
        None => WindowSpec::new(String::new(), WindowParams::default()),
    };

    if args.time_based {
        spec.weight_channel = UNITY_CHANNEL.to_string();
    } else if let Some(weight) = args.weight.as_ref() {
        spec.weight_channel = weight.clone();
    }
    if let Some(list) = args.integrate.as_ref() {
        spec.integrate_channels = parse_channel_list(list);
    }
    if let Some(list) = args.statistic.as_ref() {
        spec.statistic_channels = parse_channel_list(list);
    }
    if let Some(value) = args.window_size {
        spec.params.window_size = value;
    }
    if let Some(value) = args.window_step {
        spec.params.window_step = value;
    }
    if let Some(value) = args.max_dt {
        spec.params.max_dt = value;
    }

    if spec.weight_channel.is_empty() {
        return Err(anyhow!(
            "no weight channel: pass --weight, --time-based or a --config with weight_channel"
        ));
    }
    spec.validate().context("invalid window configuration")?;
    Ok(spec)
}

fn process_file(path: &Path, job: &Job) -> Result<FileRun> {
    let t_parse = Instant::now();
    let series = read_csv_file(path, &job.ingest)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let series = add_unity_weight(series, &job.spec)
        .with_context(|| format!("failed to prepare {}", path.display()))?;
    let parse_ms = t_parse.elapsed().as_secs_f64() * 1000.0;

    let t_compute = Instant::now();
    let mut table = find_windows(&series, &job.spec)
        .with_context(|| format!("failed to window {}", path.display()))?;
    let found = table.len();
    cull_short_windows(&mut table, job.min_duration);
    let compute_ms = t_compute.elapsed().as_secs_f64() * 1000.0;
    if found != table.len() {
        debug!(
            "{}: dropped {} window(s) shorter than {} s",
            path.display(),
            found - table.len(),
            job.min_duration
        );
    }

    let t_write = Instant::now();
    let output = output_path(&job.output_dir, path, job.format);
    match job.format {
        OutputFormat::Csv => write_table_csv(&table, &output)?,
        OutputFormat::Json => write_table_json(&table, &output)?,
    }
    if job.profile {
        info!(
            "{}: parse {:.1} ms, compute {:.1} ms, write {:.1} ms ({} samples, {} windows)",
            path.display(),
            parse_ms,
            compute_ms,
            t_write.elapsed().as_secs_f64() * 1000.0,
            series.len(),
            table.len()
        );
    }
    info!("Wrote window table: {}", output.display());

    Ok(FileRun {
        samples: series.len(),
        windows: table.len(),
        partial_windows: table.partial_count(),
        output,
    })
}

/// Time-based runs weight by a constant channel; a source column of the same
/// name would shadow it.
fn add_unity_weight(series: TimeSeries, spec: &WindowSpec) -> Result<TimeSeries, WindowError> {
    if !spec.is_time_based() {
        return Ok(series);
    }
    if series.channel(UNITY_CHANNEL).is_some() {
        return Err(WindowError::DuplicateColumn(UNITY_CHANNEL.to_string()));
    }
    Ok(series.with_unity_channel())
}

fn failure_kind(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<WindowError>().map(WindowError::kind) {
        Some(ErrorKind::Config) => "configuration",
        Some(ErrorKind::Data) => "data",
        None => "output",
    }
}

fn cull_short_windows(table: &mut WindowTable, min_duration: f64) {
    if min_duration > 0.0 {
        table.retain(|w| w.duration >= min_duration);
    }
}

fn parse_channel_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn output_path(dir: &Path, input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("series");
    dir.join(format!("{}_windows.{}", stem, format.extension()))
}

fn write_table_csv(table: &WindowTable, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_table_json(table: &WindowTable, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), table)
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn write_summary(outcomes: &[FileOutcome], path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record([
        "file",
        "status",
        "samples",
        "windows",
        "partial_windows",
        "output",
        "error",
    ])?;
    for outcome in outcomes {
        let file = outcome.input.display().to_string();
        match &outcome.result {
            Ok(run) => writer.write_record([
                file,
                "ok".to_string(),
                run.samples.to_string(),
                run.windows.to_string(),
                run.partial_windows.to_string(),
                run.output.display().to_string(),
                String::new(),
            ])?,
            Err(message) => writer.write_record([
                file,
                "failed".to_string(),
                String::new(),
                String::new(),
                String::new(),
                String::new(),
                message.clone(),
            ])?,
        }
    }
    writer.flush()?;
    Ok(())
}

fn handle_inspect(args: InspectArgs) -> Result<()> {
    if !args.max_dt.is_finite() || args.max_dt <= 0.0 {
        return Err(anyhow!("--max-dt must be finite and > 0"));
    }
    let options = IngestOptions {
        time_channel: args.time_channel.clone(),
        fill_missing: None,
        zero_base: false,
    };

    let mut report = String::new();
    for path in &args.inputs {
        let series = read_csv_file(path, &options)
            .with_context(|| format!("failed to read {}", path.display()))?;
        report.push_str(&inspect_report(path, &series, args.max_dt));
        report.push('\n');
    }

    fs::write(&args.output, report)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("Inspection report written: {}", args.output.display());
    Ok(())
}

fn inspect_report(path: &Path, series: &TimeSeries, max_dt: f64) -> String {
    let time = series.time();
    let mut report = format!("FILE: {}\n", path.display());
    report.push_str(&format!("  samples: {}\n", series.len()));
    if let (Some(first), Some(last)) = (time.first(), time.last()) {
        report.push_str(&format!("  timespan_s: {:.3}\n", last - first));
        let squeezed = squeeze_time(time, max_dt);
        let span = squeezed[squeezed.len() - 1] - squeezed[0];
        report.push_str(&format!("  squeezed_span_s: {:.3} (max_dt={})\n", span, max_dt));
        report.push_str(&format!(
            "  gaps_collapsed: {}\n",
            collapsed_gaps(time, max_dt)
        ));
    }

    report.push_str("  channels:\n");
    for name in series.channel_names() {
        let values = series.channel(name).unwrap_or_default();
        let missing = values.iter().filter(|v| v.is_nan()).count();
        let stats = ChannelStats::from_values(values);
        report.push_str(&format!(
            "    - {}: numeric={}, missing={}, min={}, max={}\n",
            name,
            values.len() - missing,
            missing,
            format_stat(stats.min),
            format_stat(stats.max)
        ));
    }
    report
}

fn format_stat(value: f64) -> String {
    if value.is_nan() {
        "n/a".into()
    } else {
        format!("{:.3}", value)
    }
}
