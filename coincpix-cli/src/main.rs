//! coincpix CLI
//!
//! Batch front end over the coincidence filtering pipeline.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use coincpix_algorithms::{
    beam_quality, correlation_trace, dt_histogram, spatial_histogram, HotBins, Orientation,
    Session, TraceRequest,
};
use coincpix_core::{Channel, CoincidenceEvents, Field, SessionConfig, SpatialAxis, TimeWindow};
use coincpix_io::{
    load_config, load_session_reference, read_events, read_legacy_recall, save_config,
    write_events, EventCsvWriter, DEFAULT_CONFIG_FILE, LEGACY_RECALL_FILE,
};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    CoincpixIo(#[from] coincpix_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] coincpix_core::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Spatial axis selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Axis {
    X,
    Y,
}

impl Axis {
    fn spatial(self) -> SpatialAxis {
        match self {
            Axis::X => SpatialAxis::X,
            Axis::Y => SpatialAxis::Y,
        }
    }

    fn orientation(self) -> Orientation {
        match self {
            Axis::X => Orientation::X,
            Axis::Y => Orientation::Y,
        }
    }
}

/// Detector channel selection.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelArg {
    Idler,
    Signal,
}

impl From<ChannelArg> for Channel {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Idler => Channel::Idler,
            ChannelArg::Signal => Channel::Signal,
        }
    }
}

/// Filtering and analysis of photon-coincidence datasets.
#[derive(Parser)]
#[command(name = "coincpix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show record count, coordinate ranges and the dt distribution
    Info {
        /// Coincidence array (.npy, shape (2, 3, N))
        input: PathBuf,

        /// Lowest dt bin of the summary histogram
        #[arg(long, default_value = "-200", allow_hyphen_values = true)]
        dt_min: i64,

        /// Highest dt bin of the summary histogram
        #[arg(long, default_value = "200", allow_hyphen_values = true)]
        dt_max: i64,
    },

    /// Apply the time filter, the space filter and rebinning
    Filter {
        /// Coincidence array (.npy)
        input: PathBuf,

        /// Output file (.npy, or .csv for a table)
        #[arg(short, long)]
        output: PathBuf,

        /// Session config; its time window is used when no bounds are given
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Lower dt bound
        #[arg(long, requires = "time_max", allow_hyphen_values = true)]
        time_min: Option<i64>,

        /// Upper dt bound
        #[arg(long, requires = "time_min", allow_hyphen_values = true)]
        time_max: Option<i64>,

        /// Hot-bin threshold of the space filter, in (0, 1]
        #[arg(long)]
        space_threshold: Option<f64>,

        /// Bin factor along x
        #[arg(long, default_value = "1")]
        xbin: i64,

        /// Bin factor along y
        #[arg(long, default_value = "1")]
        ybin: i64,

        /// Write the resulting session config here
        #[arg(long)]
        save_config: Option<PathBuf>,
    },

    /// Cut a correlation histogram and report its widths
    Trace {
        /// Coincidence array (.npy)
        input: PathBuf,

        /// Correlation histogram to cut
        #[arg(short, long, value_enum, default_value = "x")]
        axis: Axis,

        /// Trace a column (x) or a row (y)
        #[arg(long, value_enum, default_value = "x")]
        orientation: Axis,

        /// Traced column or row; defaults to the middle of the signal extent
        #[arg(long)]
        loc: Option<usize>,

        /// First index of the trace range
        #[arg(long)]
        from: Option<usize>,

        /// Last index of the trace range
        #[arg(long)]
        to: Option<usize>,
    },

    /// Report the peak and widths of one channel's spatial image
    Beam {
        /// Coincidence array (.npy)
        input: PathBuf,

        /// Channel to image
        #[arg(long, value_enum, default_value = "idler")]
        channel: ChannelArg,
    },

    /// Score the time-filtered data against the reference
    Fidelity {
        /// Coincidence array (.npy)
        input: PathBuf,

        /// Session config with the time window and reference parameters
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Reference array; overrides the config's reference file
        #[arg(short, long)]
        reference: Option<PathBuf>,
    },

    /// Create, migrate or print session configs
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Write every record as a CSV row
    Export {
        /// Coincidence array (.npy)
        input: PathBuf,

        /// Output CSV file
        output: PathBuf,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config with default values
    Init {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Convert a version 3 recall file
    Migrate {
        #[arg(default_value = LEGACY_RECALL_FILE)]
        input: PathBuf,

        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Print a config as JSON
    Show {
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        input: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn config_or_default(path: Option<&Path>) -> Result<SessionConfig> {
    match path {
        Some(path) => Ok(load_config(path)?),
        None => Ok(SessionConfig::new()),
    }
}

/// Histogram clicks for the requested bounds; `(0, 0)` recalls the saved window.
fn time_clicks(time_min: Option<i64>, time_max: Option<i64>) -> Result<(i64, i64)> {
    match (time_min, time_max) {
        (Some(lo), Some(hi)) => Ok((lo, hi)),
        (None, None) => Ok((0, 0)),
        _ => Err(CliError::Usage(
            "--time-min and --time-max must be given together".into(),
        )),
    }
}

fn write_output(path: &Path, events: &CoincidenceEvents) -> Result<()> {
    let is_csv = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        let mut writer = EventCsvWriter::create(path)?;
        writer.write_events(events)?;
        writer.flush()?;
    } else {
        write_events(path, events)?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info {
            input,
            dt_min,
            dt_max,
        } => {
            let events = read_events(&input)?;
            println!("File: {}", input.display());
            println!("Coincidences: {}", events.len());

            for channel in Channel::ALL {
                for (field, name) in [(Field::X, "x"), (Field::Y, "y"), (Field::T, "t")] {
                    if let Some((lo, hi)) = events.range(channel, field) {
                        println!("{:?} {} range: {} - {}", channel, name, lo, hi);
                    }
                }
            }

            let dts = events.time_differences();
            if let (Some(lo), Some(hi)) = (dts.iter().min(), dts.iter().max()) {
                println!("dt range: {} - {}", lo, hi);
            }

            let counts = dt_histogram(&events, dt_min, dt_max)?;
            let inside: u64 = counts.iter().sum();
            println!("dt in [{}, {}]: {}", dt_min, dt_max, inside);
            if let Some((offset, peak)) = counts
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
                .filter(|(_, c)| **c > 0)
            {
                let at = dt_min.saturating_add(i64::try_from(offset).unwrap_or(i64::MAX));
                println!("dt peak: {} ({} records)", at, peak);
            }
        }

        Commands::Filter {
            input,
            output,
            config,
            time_min,
            time_max,
            space_threshold,
            xbin,
            ybin,
            save_config: save_to,
        } => {
            let start = Instant::now();
            let clicks = time_clicks(time_min, time_max)?;
            let mut session = Session::new(config_or_default(config.as_deref())?)?;
            session.load_raw(read_events(&input)?)?;

            let window = session.apply_time_filter(clicks)?;
            println!(
                "Time filter [{}, {}]: {} of {} records",
                window.min,
                window.max,
                session.filtered().len(),
                session.raw().len()
            );

            if let Some(threshold) = space_threshold {
                let kept = session.apply_space_filter(threshold)?;
                println!("Space filter (threshold {}): {} records", threshold, kept);
                if let Some(diag) = session.space_diagnostics() {
                    let hot = |bins: &HotBins| {
                        bins.signal
                            .iter()
                            .zip(bins.idler.iter())
                            .filter(|(s, i)| **s && **i)
                            .count()
                    };
                    println!(
                        "  hot bins: x {}, y {}",
                        hot(&diag.x_hot),
                        hot(&diag.y_hot)
                    );
                }
            }

            if (xbin, ybin) != (1, 1) {
                session.set_binning(xbin, ybin)?;
                println!("Binned by ({}, {})", xbin, ybin);
            }

            write_output(&output, session.filtered())?;
            println!(
                "Wrote {} records to {} in {:.2}s",
                session.filtered().len(),
                output.display(),
                start.elapsed().as_secs_f64()
            );

            if let Some(path) = save_to {
                save_config(&path, &session.config_snapshot())?;
                println!("Saved config to {}", path.display());
            }
        }

        Commands::Trace {
            input,
            axis,
            orientation,
            loc,
            from,
            to,
        } => {
            let events = read_events(&input)?;
            let mut request =
                TraceRequest::centered(&events, axis.spatial(), orientation.orientation());
            if let Some(loc) = loc {
                request.loc = loc;
            }
            request.range = (
                from.unwrap_or(request.range.0),
                to.unwrap_or(request.range.1),
            );

            let trace = correlation_trace(&events, request)?;
            let (lo, hi) = trace.request.range;
            println!(
                "{:?} correlation, {} trace at {} over [{}, {}]",
                trace.request.axis, trace.request.orientation, trace.request.loc, lo, hi
            );
            println!("Profile length: {}", trace.profile.len());
            println!("Profile counts: {}", trace.profile.sum());

            let summary = trace.fwhm()?;
            println!(
                "FWHM min/max/mean: {} / {} / {:.2}",
                summary.min, summary.max, summary.mean
            );
        }

        Commands::Beam { input, channel } => {
            let events = read_events(&input)?;
            let image = spatial_histogram(&events, channel.into())?;
            let quality = beam_quality(image.to_f64().view())?;
            let (row, col) = quality.peak;
            println!(
                "Peak: x {} y {}",
                image.col_origin() + i64::try_from(col).unwrap_or(i64::MAX),
                image.row_origin() + i64::try_from(row).unwrap_or(i64::MAX)
            );
            println!("FWHM x: {} px", quality.fwhm_x);
            println!("FWHM y: {} px", quality.fwhm_y);
        }

        Commands::Fidelity {
            input,
            config,
            reference,
        } => {
            let mut config = config_or_default(config.as_deref())?;
            if reference.is_some() {
                config.reference.file = reference;
            }
            let prepared = load_session_reference(&config)?.ok_or_else(|| {
                CliError::Usage("no reference file in the config or on the command line".into())
            })?;

            let mut session = Session::replay(read_events(&input)?, config)?;
            session.set_reference(Some(prepared));
            let window: TimeWindow = session.time_window();
            let (direct, ghost) = session
                .fidelities()
                .map(|f| f.as_percent())
                .unwrap_or_default();
            println!(
                "Records in [{}, {}]: {}",
                window.min,
                window.max,
                session.filtered().len()
            );
            println!("Direct fidelity: {:.1}%", direct);
            println!("Ghost fidelity: {:.1}%", ghost);
        }

        Commands::Config { action } => match action {
            ConfigAction::Init { output } => {
                save_config(&output, &SessionConfig::new())?;
                println!("Wrote default config to {}", output.display());
            }
            ConfigAction::Migrate { input, output } => {
                let legacy = read_legacy_recall(&input)?;
                let config = SessionConfig::migrate_legacy(&legacy)?;
                save_config(&output, &config)?;
                println!(
                    "Migrated {} to {} (version {})",
                    input.display(),
                    output.display(),
                    config.version
                );
            }
            ConfigAction::Show { input } => {
                let config = load_config(&input)?;
                println!("{}", serde_json::to_string_pretty(&config)?);
            }
        },

        Commands::Export { input, output } => {
            let events = read_events(&input)?;
            let mut writer = EventCsvWriter::create(&output)?;
            let rows = writer.write_events(&events)?;
            writer.flush()?;
            println!("Exported {} rows to {}", rows, output.display());
        }
    }

    Ok(())
}
