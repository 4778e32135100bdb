//! One complete filter pass over a survey snapshot.
//!
//! The pass runs three stages, each parallelized with rayon and merged on the
//! calling thread:
//!
//! 1. **Return slope filter**: every valid point's bottom return is judged
//!    on its own waveform.
//! 2. **Isolation**: points are bucketed into the search grid and each
//!    surviving point looks for depth agreement on another survey line.
//! 3. **Waveform corroboration**: points with other-line neighbours but no
//!    agreement are kept only if a neighbour's waveform rises near their
//!    bottom bin.
//!
//! Neighbour eligibility in stages 2 and 3 is judged against the exclusions
//! made in stage 1, so the result does not depend on processing order.
//!
//! # Example
//!
//! ```no_run
//! use lidar_wave_filter::{FilterConfig, SurveySnapshot, WaveFilter};
//!
//! let snapshot = SurveySnapshot::default();
//! let filter = WaveFilter::new(FilterConfig::default()).unwrap();
//! let outcome = filter.run(&snapshot).unwrap();
//! assert_eq!(outcome.stats.excluded(), 0);
//! ```

use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::FilterConfig;
use crate::core::sounding::{Channel, SoundingPoint, SurveySnapshot};
use crate::processors::corroboration::corroborate;
use crate::processors::grid::{GridError, SearchGrid};
use crate::processors::isolation::classify;
use crate::processors::return_filter::{evaluate, RejectReason, ReturnDecision};

/// Fatal errors that abort a pass with no result.
#[derive(Debug, Error)]
pub enum PassError {
    #[error("invalid filter configuration: {0}")]
    InvalidConfig(String),

    #[error("point {point_id}: {channel} channel has {found} samples, expected {expected}")]
    ChannelLength {
        point_id: u64,
        channel: Channel,
        expected: usize,
        found: usize,
    },

    #[error("point {point_id}: bottom bin {bin} is outside the {channel} channel ({len} samples)")]
    BinOutOfRange {
        point_id: u64,
        channel: Channel,
        bin: usize,
        len: usize,
    },

    #[error("search grid: {0}")]
    Grid(#[from] GridError),
}

/// Where a point ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointState {
    Unchecked,
    /// Marked invalid upstream; not examined.
    Invalid,
    /// Detection code outside the filter's scope.
    Exempt,
    ExcludedBySlope(RejectReason),
    /// Passed the slope filter; awaiting the isolation test.
    PassedSlopeFilter,
    Corroborated,
    /// Only same-line data nearby; left for the analyst.
    SingleLineOnly,
    QueuedForWaveformCheck,
    ExcludedByWaveform,
    Confirmed,
}

impl PointState {
    pub fn is_excluded(self) -> bool {
        matches!(self, PointState::ExcludedBySlope(_) | PointState::ExcludedByWaveform)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PointState::Unchecked => "unchecked",
            PointState::Invalid => "invalid",
            PointState::Exempt => "exempt",
            PointState::ExcludedBySlope(reason) => reason.as_str(),
            PointState::PassedSlopeFilter => "passed_slope_filter",
            PointState::Corroborated => "corroborated",
            PointState::SingleLineOnly => "single_line_only",
            PointState::QueuedForWaveformCheck => "queued",
            PointState::ExcludedByWaveform => "no_corroboration",
            PointState::Confirmed => "confirmed",
        }
    }
}

/// Exclude flags that can be set but never cleared.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    flags: Vec<bool>,
}

impl ExclusionSet {
    pub fn new(len: usize) -> Self {
        Self {
            flags: vec![false; len],
        }
    }

    /// Mark a point excluded. Returns true if it was not excluded before.
    #[inline]
    pub fn exclude(&mut self, idx: usize) -> bool {
        !std::mem::replace(&mut self.flags[idx], true)
    }

    #[inline]
    pub fn is_excluded(&self, idx: usize) -> bool {
        self.flags[idx]
    }

    pub fn count(&self) -> usize {
        self.flags.iter().filter(|&&f| f).count()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.flags
    }

    pub fn into_vec(self) -> Vec<bool> {
        self.flags
    }
}

/// Point counts per terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    pub total: usize,
    pub invalid: usize,
    pub exempt: usize,
    pub excluded_by_slope: usize,
    pub corroborated: usize,
    pub single_line_only: usize,
    pub confirmed: usize,
    pub excluded_by_waveform: usize,
}

impl PassStats {
    fn from_states(states: &[PointState]) -> Self {
        let mut stats = Self {
            total: states.len(),
            ..Self::default()
        };
        for state in states {
            match state {
                PointState::Invalid => stats.invalid += 1,
                PointState::Exempt => stats.exempt += 1,
                PointState::ExcludedBySlope(_) => stats.excluded_by_slope += 1,
                PointState::Corroborated => stats.corroborated += 1,
                PointState::SingleLineOnly => stats.single_line_only += 1,
                PointState::Confirmed => stats.confirmed += 1,
                PointState::ExcludedByWaveform => stats.excluded_by_waveform += 1,
                PointState::Unchecked | PointState::PassedSlopeFilter | PointState::QueuedForWaveformCheck => {}
            }
        }
        stats
    }

    pub fn excluded(&self) -> usize {
        self.excluded_by_slope + self.excluded_by_waveform
    }
}

/// Result of a successful pass, indexed like the snapshot's points.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub exclude: Vec<bool>,
    pub states: Vec<PointState>,
    pub stats: PassStats,
    /// Set when the pass has finished and the result set should be reloaded
    /// by the caller.
    pub changed: bool,
}

impl FilterOutcome {
    /// Ids of the excluded points, in snapshot order.
    pub fn excluded_ids<'a>(&'a self, snapshot: &'a SurveySnapshot) -> impl Iterator<Item = u64> + 'a {
        snapshot
            .points
            .iter()
            .zip(&self.exclude)
            .filter(|(_, excluded)| **excluded)
            .map(|(point, _)| point.id)
    }
}

/// Reject waveforms whose layout does not match the fixed channel lengths,
/// and bins that fall outside their channel. Bins of invalid and exempt
/// points are never read, so they are not checked.
pub fn validate_snapshot(points: &[SoundingPoint]) -> Result<(), PassError> {
    for point in points {
        for channel in [Channel::Narrow, Channel::Wide] {
            let found = point.waveform.samples(channel).len();
            if found != channel.sample_count() {
                return Err(PassError::ChannelLength {
                    point_id: point.id,
                    channel,
                    expected: channel.sample_count(),
                    found,
                });
            }
        }

        if !point.invalid && !point.is_exempt() {
            let bin = point.bottom_bin();
            let len = point.channel.sample_count();
            if bin >= len {
                return Err(PassError::BinOutOfRange {
                    point_id: point.id,
                    channel: point.channel,
                    bin,
                    len,
                });
            }
        }
    }
    Ok(())
}

/// Configured filter, reusable across passes.
#[derive(Debug, Clone)]
pub struct WaveFilter {
    config: FilterConfig,
}

impl WaveFilter {
    pub fn new(config: FilterConfig) -> Result<Self, PassError> {
        config.validate().map_err(PassError::InvalidConfig)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run a full pass over `snapshot`.
    ///
    /// # Errors
    ///
    /// Returns an error, and no partial result, if any waveform has the wrong
    /// channel lengths, a bottom bin lies outside its channel, or the search
    /// grid cannot be built.
    pub fn run(&self, snapshot: &SurveySnapshot) -> Result<FilterOutcome, PassError> {
        let start = Instant::now();
        let points = &snapshot.points;
        let config = &self.config;

        validate_snapshot(points)?;

        let mut states = vec![PointState::Unchecked; points.len()];
        let mut exclusions = ExclusionSet::new(points.len());

        // Stage 1: return slope filter.
        let decisions: Vec<Option<ReturnDecision>> = points
            .par_iter()
            .map(|point| (!point.invalid).then(|| evaluate(point, config)))
            .collect();

        for (idx, decision) in decisions.into_iter().enumerate() {
            states[idx] = match decision {
                None => PointState::Invalid,
                Some(ReturnDecision::Exempt) => PointState::Exempt,
                Some(ReturnDecision::Keep) => PointState::PassedSlopeFilter,
                Some(ReturnDecision::Exclude(reason)) => {
                    exclusions.exclude(idx);
                    PointState::ExcludedBySlope(reason)
                }
            };
        }
        log::debug!("slope filter excluded {} of {} points", exclusions.count(), points.len());

        // Stage 2: isolation.
        let grid = SearchGrid::build(points, config.cell_side_m())?;
        log::debug!(
            "search grid {} x {} ({} occupied cells, {:.1} m side)",
            grid.rows(),
            grid.cols(),
            grid.occupied_cells(),
            grid.cell_side()
        );

        let report = classify(&grid, points, exclusions.as_slice(), config);
        for &idx in &report.corroborated {
            states[idx] = PointState::Corroborated;
        }
        for &idx in &report.single_line {
            states[idx] = PointState::SingleLineOnly;
        }
        for queued in &report.queued {
            states[queued.index] = PointState::QueuedForWaveformCheck;
        }
        log::debug!(
            "isolation: {} corroborated, {} single-line, {} queued",
            report.corroborated.len(),
            report.single_line.len(),
            report.queued.len()
        );

        // Stage 3: waveform corroboration.
        let verdicts: Vec<(usize, bool)> = report
            .queued
            .par_iter()
            .map(|queued| {
                let neighbors = queued.neighbors.iter().map(|&j| &points[j]);
                (queued.index, corroborate(&points[queued.index], neighbors, config))
            })
            .collect();

        for (idx, supported) in verdicts {
            if supported {
                states[idx] = PointState::Confirmed;
            } else {
                exclusions.exclude(idx);
                states[idx] = PointState::ExcludedByWaveform;
            }
        }

        let stats = PassStats::from_states(&states);
        log::info!(
            "filter pass: {} points, {} excluded ({} slope, {} waveform), {} corroborated, {} single-line, {} confirmed in {:.2?}",
            stats.total,
            stats.excluded(),
            stats.excluded_by_slope,
            stats.excluded_by_waveform,
            stats.corroborated,
            stats.single_line_only,
            stats.confirmed,
            start.elapsed()
        );

        Ok(FilterOutcome {
            exclude: exclusions.into_vec(),
            states,
            stats,
            changed: true,
        })
    }
}
