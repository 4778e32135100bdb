//! Command-line interface for the waveform filter.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::config::{CorroborationScope, FilterConfig};
use crate::core::loaders::load_snapshot;
use crate::core::writers::{write_decisions_csv, write_excluded_ids};
use crate::processors::wave_filter::{FilterOutcome, WaveFilter};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "lidar-wave-filter")]
#[command(about = "Waveform and cross-line consensus filter for lidar soundings", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one filter pass over a survey snapshot
    Filter {
        /// Point CSV (id, line, x|lon, y|lat, z, verr, herr, ...)
        #[arg(short, long)]
        points: PathBuf,
        /// Waveform CSV (id, channel, ac_zero_offset, samples...)
        #[arg(short, long)]
        waveforms: PathBuf,
        /// Output decision CSV (id, exclude, state)
        #[arg(short, long)]
        output: PathBuf,
        /// Also write the excluded ids, one per line
        #[arg(long)]
        excluded: Option<PathBuf>,
        /// Search radius in meters
        #[arg(long)]
        radius: Option<f64>,
        /// Half-width of the corroboration scan window (samples)
        #[arg(long)]
        search_width: Option<usize>,
        /// Rising samples needed to corroborate
        #[arg(long)]
        rise_threshold: Option<usize>,
        /// Enable the trailing-slope check
        #[arg(long)]
        backslope: bool,
        /// Scan both neighbour channels during corroboration
        #[arg(long)]
        both_channels: bool,
    },

    /// Print the effective configuration as YAML, or write it to a file
    DumpConfig {
        /// Output YAML file (prints to stdout if omitted)
        path: Option<PathBuf>,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    if let Err(e) = dispatch(cli) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

/// Load the `--config` file, or the defaults when none is given.
fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => {
            let config = PipelineConfig::from_yaml(path)
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Filter {
            points,
            waveforms,
            output,
            excluded,
            radius,
            search_width,
            rise_threshold,
            backslope,
            both_channels,
        } => {
            let overrides = Overrides {
                radius,
                search_width,
                rise_threshold,
                backslope,
                both_channels,
            };
            cmd_filter(&points, &waveforms, &output, excluded.as_deref(), overrides.apply(&config.filter))
        }
        Commands::DumpConfig { path } => cmd_dump_config(path.as_deref(), &config),
    }
}

/// Flags that override individual config fields.
struct Overrides {
    radius: Option<f64>,
    search_width: Option<usize>,
    rise_threshold: Option<usize>,
    backslope: bool,
    both_channels: bool,
}

impl Overrides {
    fn apply(&self, base: &FilterConfig) -> FilterConfig {
        let mut config = base.clone();
        if let Some(radius) = self.radius {
            config.search_radius_m = radius;
        }
        if let Some(width) = self.search_width {
            config.search_width = width;
        }
        if let Some(threshold) = self.rise_threshold {
            config.rise_threshold = threshold;
        }
        if self.backslope {
            config.enable_backslope_check = true;
        }
        if self.both_channels {
            config.corroboration_scope = CorroborationScope::Both;
        }
        config
    }
}

fn cmd_filter(
    points: &Path,
    waveforms: &Path,
    output: &Path,
    excluded: Option<&Path>,
    filter_config: FilterConfig,
) -> Result<()> {
    let start = Instant::now();

    let filter = WaveFilter::new(filter_config).context("Invalid filter configuration")?;

    let spinner = create_spinner("Loading soundings and waveforms...");
    let snapshot = load_snapshot(points, waveforms).with_context(|| {
        format!(
            "Failed to load snapshot from {} and {}",
            points.display(),
            waveforms.display()
        )
    });
    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(e) => {
            spinner.finish_and_clear();
            return Err(e);
        }
    };

    spinner.set_message(format!("Filtering {} soundings...", snapshot.len()));
    let outcome = filter.run(&snapshot).context("Filter pass failed");
    spinner.finish_and_clear();
    let outcome = outcome?;

    write_decisions_csv(output, &snapshot, &outcome)
        .with_context(|| format!("Failed to write decisions to {}", output.display()))?;
    if let Some(path) = excluded {
        write_excluded_ids(path, &snapshot, &outcome)
            .with_context(|| format!("Failed to write excluded ids to {}", path.display()))?;
    }

    print_filter_summary(output, filter.config(), &outcome, start);
    Ok(())
}

fn print_filter_summary(output: &Path, config: &FilterConfig, outcome: &FilterOutcome, start: Instant) {
    let stats = &outcome.stats;
    print_summary(
        "Filter Pass Complete",
        &[
            ("Output", output.display().to_string()),
            ("Soundings", stats.total.to_string()),
            ("Excluded", stats.excluded().to_string()),
            ("  by slope", stats.excluded_by_slope.to_string()),
            ("  by waveform", stats.excluded_by_waveform.to_string()),
            ("Corroborated", stats.corroborated.to_string()),
            ("Confirmed", stats.confirmed.to_string()),
            ("Single line only", stats.single_line_only.to_string()),
            ("Exempt", stats.exempt.to_string()),
            ("Invalid", stats.invalid.to_string()),
            ("Search radius", format!("{} m", config.search_radius_m)),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
}

fn cmd_dump_config(path: Option<&Path>, config: &PipelineConfig) -> Result<()> {
    match path {
        Some(path) => {
            config
                .to_yaml(path)
                .map_err(|e| anyhow::anyhow!("{}", e))
                .with_context(|| format!("Failed to write config to {}", path.display()))?;
            println!("Wrote config to {}", path.display());
        }
        None => {
            let yaml = serde_yaml::to_string(config).context("Failed to serialize config")?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_filter_flags() {
        let cli = Cli::try_parse_from([
            "lidar-wave-filter",
            "-vv",
            "filter",
            "--points",
            "p.csv",
            "--waveforms",
            "w.csv",
            "--output",
            "out.csv",
            "--radius",
            "7.5",
            "--backslope",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Filter {
                points,
                radius,
                backslope,
                both_channels,
                search_width,
                ..
            } => {
                assert_eq!(points, PathBuf::from("p.csv"));
                assert_eq!(radius, Some(7.5));
                assert!(backslope);
                assert!(!both_channels);
                assert_eq!(search_width, None);
            }
            Commands::DumpConfig { .. } => panic!("expected filter command"),
        }
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let base = FilterConfig {
            search_width: 12,
            ..FilterConfig::default()
        };
        let overrides = Overrides {
            radius: Some(2.5),
            search_width: None,
            rise_threshold: Some(3),
            backslope: false,
            both_channels: true,
        };
        let config = overrides.apply(&base);

        assert_eq!(config.search_radius_m, 2.5);
        assert_eq!(config.search_width, 12);
        assert_eq!(config.rise_threshold, 3);
        assert!(!config.enable_backslope_check);
        assert_eq!(config.corroboration_scope, CorroborationScope::Both);
    }

    #[test]
    fn test_bad_config_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();

        let missing = dir.path().join("missing.yaml");
        let err = load_config(Some(&missing)).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.yaml"));

        let malformed = dir.path().join("bad.yaml");
        std::fs::write(&malformed, "filter:\n  search_radius_m: [not a number\n").unwrap();
        assert!(load_config(Some(&malformed)).is_err());

        let misspelled = dir.path().join("typo.yaml");
        std::fs::write(&misspelled, "filter:\n  search_radus_m: 2.0\n").unwrap();
        assert!(load_config(Some(&misspelled)).is_err());

        let good = dir.path().join("good.yaml");
        std::fs::write(&good, "filter:\n  search_radius_m: 2.0\n").unwrap();
        assert_eq!(load_config(Some(&good)).unwrap().filter.search_radius_m, 2.0);
        assert_eq!(load_config(None).unwrap().filter.search_radius_m, 5.0);
    }

    #[test]
    fn test_dump_config_writes_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        cmd_dump_config(Some(&path), &PipelineConfig::default()).unwrap();

        let loaded = PipelineConfig::from_yaml(&path).unwrap();
        assert_eq!(loaded.filter.search_radius_m, 5.0);
    }
}
