//! Waveform and cross-line consensus filter for bathymetric lidar soundings.
//!
//! This crate provides tools for:
//! - Rejecting bottom returns whose waveform shows no credible leading edge
//! - Bucketing soundings into a uniform search grid
//! - Trusting soundings that agree in depth with another survey line
//! - Corroborating the rest against their neighbours' raw waveforms
//!
//! # Example
//!
//! ```no_run
//! use lidar_wave_filter::{core::loaders::load_snapshot, FilterConfig, WaveFilter};
//!
//! let snapshot = load_snapshot("points.csv", "waveforms.csv").unwrap();
//! let outcome = WaveFilter::new(FilterConfig::default()).unwrap().run(&snapshot).unwrap();
//! println!("{} of {} soundings excluded", outcome.stats.excluded(), snapshot.len());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{CorroborationScope, FilterConfig, PipelineConfig};
pub use core::sounding::{Channel, SoundingPoint, SurveySnapshot, Waveform};
pub use processors::wave_filter::{FilterOutcome, PassError, PointState, WaveFilter};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
