//! Command-line renderer for column-store point dumps.
//!
//! Loads configuration from (in precedence order): defaults, config file, environment variables
//! (`POINTGRID_*`), and CLI flags. Reads tab-separated `metric_id, time, value, timestamp` rows,
//! normalizes every metric onto the requested grid and writes one `metric_id\ttime\tvalue` line
//! per slot (`null` for gaps).

use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use config::{Config, Environment, File};
use pointgrid::source::parse_point_rows;
use pointgrid::telemetry::noop_event_listener;
use pointgrid::{NormalizeEvent, NormalizeEventListener, Normalizer, NormalizerConfig, Slot, Time, Window};

// ---------- CLI ----------

/// Render time-series points onto a fixed-step grid.
#[derive(Parser, Debug)]
#[command(name = "pointgrid", version, about)]
pub struct Cli {
    /// Path to config file (TOML). If omitted, `pointgrid.toml` is loaded when present.
    #[arg(long, env = "POINTGRID_CONFIG")]
    pub config: Option<PathBuf>,

    /// Do not load any config file; use defaults + env + CLI only.
    #[arg(long, default_value_t = false)]
    pub no_config: bool,

    /// Input file with tab-separated rows, or `-` for stdin.
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Window start (inclusive).
    #[arg(long)]
    pub from: Option<Time>,

    /// Window end (inclusive).
    #[arg(long)]
    pub until: Option<Time>,

    /// Grid step. Overrides the config file.
    #[arg(long)]
    pub step: Option<Time>,

    /// Floor the window start and drop the trailing step.
    #[arg(long, default_value_t = false)]
    pub approximate: bool,

    /// Sort input rows instead of trusting their order.
    #[arg(long, default_value_t = false)]
    pub sort_input: bool,

    /// Report per-series events on stderr.
    #[arg(long, short, default_value_t = false)]
    pub verbose: bool,

    /// Load and validate config (file + env + CLI), print effective settings, then exit.
    #[arg(long, default_value_t = false)]
    pub validate_config: bool,
}

// ---------- File/env config (all optional for partial config) ----------

/// Top-level config as read from file + env. Every field optional for layering.
#[derive(Debug, Default, serde::Deserialize)]
pub struct FileConfig {
    pub step: Option<Time>,
    pub approximate_aggregate: Option<bool>,
    pub dedup: Option<bool>,
    pub sort_input: Option<bool>,
    pub parallel_threshold: Option<usize>,
}

/// Effective settings after layering.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub normalizer: NormalizerConfig,
    pub step: Option<Time>,
}

/// Load merged config. CLI overrides file/env.
fn load_config(cli: &Cli) -> Result<RenderOptions, String> {
    let mut builder = Config::builder();

    if !cli.no_config {
        if let Some(ref path) = cli.config {
            if !path.exists() {
                return Err(format!("config file not found: {}", path.display()));
            }
            builder = builder.add_source(File::from(path.as_path()).required(false));
        } else {
            let default_path = PathBuf::from("pointgrid.toml");
            if default_path.exists() {
                builder = builder.add_source(File::from(default_path.as_path()).required(false));
            }
        }
    }

    builder = builder.add_source(
        Environment::with_prefix("POINTGRID")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
            .ignore_empty(true),
    );

    let merged = builder.build().map_err(|e| e.to_string())?;
    let partial: FileConfig = merged.try_deserialize().map_err(|e| e.to_string())?;

    let mut normalizer = NormalizerConfig {
        event_listener: noop_event_listener(),
        ..NormalizerConfig::default()
    };
    merge_into_normalizer_config(&mut normalizer, &partial)?;

    if cli.approximate {
        normalizer.approximate_aggregate = true;
    }
    if cli.sort_input {
        normalizer.sort_input = true;
    }
    if cli.verbose {
        normalizer.event_listener = Arc::new(StderrEventListener);
    }

    let step = cli.step.or(partial.step);
    if step == Some(0) {
        return Err("step must be greater than zero".to_string());
    }

    Ok(RenderOptions { normalizer, step })
}

/// Merge file/env partial config onto `NormalizerConfig`. Only overwrites fields that are `Some`.
fn merge_into_normalizer_config(base: &mut NormalizerConfig, partial: &FileConfig) -> Result<(), String> {
    if let Some(b) = partial.approximate_aggregate {
        base.approximate_aggregate = b;
    }
    if let Some(b) = partial.dedup {
        base.dedup = b;
    }
    if let Some(b) = partial.sort_input {
        base.sort_input = b;
    }
    if let Some(n) = partial.parallel_threshold {
        if n == 0 {
            return Err("parallel_threshold must be at least 1".to_string());
        }
        base.parallel_threshold = n;
    }
    Ok(())
}

#[derive(Debug)]
struct StderrEventListener;

impl NormalizeEventListener for StderrEventListener {
    fn on_event(&self, event: NormalizeEvent) {
        match event {
            NormalizeEvent::BatchDeduplicated { input, output } => {
                eprintln!("dedup: {} points in, {} kept", input, output)
            }
            NormalizeEvent::SeriesRendered { metric_id, slots, gaps } => {
                eprintln!("series {}: {} slots, {} gaps", metric_id, slots, gaps)
            }
            NormalizeEvent::SeriesRejected { metric_id, error } => {
                eprintln!("series {} rejected: {}", metric_id, error)
            }
        }
    }
}

fn read_input(path: &Path) -> Result<String, String> {
    let mut body = String::new();
    if path.as_os_str() == "-" {
        std::io::stdin()
            .read_to_string(&mut body)
            .map_err(|e| format!("failed to read stdin: {}", e))?;
    } else {
        body = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    }
    Ok(body)
}

// ---------- Main ----------

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let options = load_config(&cli).map_err(|e| {
        eprintln!("config error: {}", e);
        e
    })?;

    if cli.validate_config {
        let step = options.step.map_or_else(|| "unset".to_string(), |s| s.to_string());
        println!("step={}", step);
        println!("approximate_aggregate={}", options.normalizer.approximate_aggregate);
        println!("dedup={}", options.normalizer.dedup);
        println!("sort_input={}", options.normalizer.sort_input);
        println!("parallel_threshold={}", options.normalizer.parallel_threshold);
        return Ok(());
    }

    let (input, from, until, step) = match (cli.input.as_ref(), cli.from, cli.until, options.step) {
        (Some(input), Some(from), Some(until), Some(step)) => (input, from, until, step),
        _ => {
            let msg = "--input, --from, --until and a step (flag, file or env) are required";
            eprintln!("usage error: {}", msg);
            return Err(msg.into());
        }
    };

    let body = read_input(input)?;
    let points = parse_point_rows(&body).map_err(|e| {
        eprintln!("input error: {}", e);
        e
    })?;

    let normalizer = Normalizer::with_config(options.normalizer);
    let results = normalizer.normalize_batch(points, &Window::new(from, until, step))?;

    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    let mut failed = 0usize;
    for series in &results {
        match &series.result {
            Ok(rendered) => {
                for (time, slot) in rendered.timed_slots() {
                    match slot {
                        Slot::Value(v) => writeln!(out, "{}\t{}\t{}", series.metric_id, time, v)?,
                        Slot::Gap => writeln!(out, "{}\t{}\tnull", series.metric_id, time)?,
                    }
                }
            }
            Err(e) => {
                failed += 1;
                eprintln!("series {} failed: {}", series.metric_id, e);
            }
        }
    }
    out.flush()?;

    if failed > 0 {
        return Err(format!("{} of {} series failed", failed, results.len()).into());
    }
    Ok(())
}
