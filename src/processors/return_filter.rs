//! Leading-edge shape filter for a single bottom return.
//!
//! A bottom return is kept only if the waveform around its bin shows a real
//! pulse: it must sit past the surface return, stand above the AC zero offset,
//! and rise for long enough and steeply enough. Everything here is a pure
//! function of the samples and the parameters.
//!
//! # Example
//!
//! ```
//! use lidar_wave_filter::processors::return_filter::{evaluate_samples, SlopeParams};
//!
//! let flat = vec![10u8; 201];
//! let params = SlopeParams::default();
//! assert!(evaluate_samples(&flat, 50, 0, &params).is_exclude());
//! ```

use crate::config::FilterConfig;
use crate::core::sounding::{Channel, SoundingPoint, SURFACE_GUARD_BIN};

/// Consecutive non-rising samples that mark the end of the surface return.
const SURFACE_DROP_RUN: u32 = 5;

/// Consecutive samples that terminate the leading-edge and peak scans.
const EDGE_RUN: u32 = 2;

/// Why a return was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Bin amplitude too close to the AC zero offset.
    AcOffset,
    /// Bin lies inside the surface return.
    SurfaceClutter,
    /// Leading edge shorter than the required run.
    ShortRun,
    /// Leading edge flatter than the required slope.
    LowSlope,
    /// Trailing edge flatter than the required slope.
    LowBackslope,
    /// Bin does not address a sample of the channel.
    BinOutOfRange,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::AcOffset => "ac_offset",
            RejectReason::SurfaceClutter => "surface_clutter",
            RejectReason::ShortRun => "short_run",
            RejectReason::LowSlope => "low_slope",
            RejectReason::LowBackslope => "low_backslope",
            RejectReason::BinOutOfRange => "bin_out_of_range",
        }
    }
}

/// Outcome of the return filter for one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnDecision {
    Keep,
    /// Detection code is out of scope for this filter.
    Exempt,
    Exclude(RejectReason),
}

impl ReturnDecision {
    #[inline]
    pub fn is_exclude(self) -> bool {
        matches!(self, ReturnDecision::Exclude(_))
    }
}

/// Thresholds for one channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlopeParams {
    /// Required amplitude above the AC zero offset; 0 disables the gate.
    pub ac_offset_required: i32,
    pub run_required: i32,
    pub slope_required: f32,
    pub edge_window: usize,
    pub enable_backslope_check: bool,
}

impl Default for SlopeParams {
    fn default() -> Self {
        let config = FilterConfig::default();
        Self {
            ac_offset_required: 0,
            run_required: config.narrow_run_required,
            slope_required: config.slope_required,
            edge_window: config.edge_window,
            enable_backslope_check: config.enable_backslope_check,
        }
    }
}

impl SlopeParams {
    /// Thresholds for a point's selected channel.
    pub fn for_point(point: &SoundingPoint, config: &FilterConfig) -> Self {
        let ac_offset_required = match point.channel {
            Channel::Narrow => config.narrow_ac_offset_required,
            Channel::Wide => config.wide_ac_offset_required,
        };
        Self {
            ac_offset_required,
            run_required: point.run_required(config.narrow_run_required, config.wide_run_required),
            slope_required: config.slope_required,
            edge_window: config.edge_window,
            enable_backslope_check: config.enable_backslope_check,
        }
    }
}

/// Leading and trailing edge measurements around a bottom bin.
///
/// Positions use 0 for "not found", matching the scan semantics: no scan
/// ever reports a position below the surface guard except by failing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnShape {
    pub start: usize,
    pub peak: usize,
    pub end: usize,
    /// `peak - start`; may be zero or negative when a scan failed.
    pub run: i32,
    pub slope: f32,
    /// `None` when too few trailing samples exist to judge the backslope.
    pub backslope: Option<f32>,
}

impl ReturnShape {
    /// Measure the pulse around `bin`.
    pub fn measure(samples: &[u8], bin: usize, edge_window: usize) -> Self {
        let start = leading_edge_start(samples, bin);
        let peak = find_peak(samples, bin, edge_window);

        let run = peak as i32 - start as i32;
        let slope = if run > 0 {
            (amp(samples, peak) - amp(samples, start)) as f32 / run as f32
        } else {
            0.0
        };

        let end = backslope_end(samples, peak, edge_window);
        let back_run = end as i32 - peak as i32;
        let backslope = if back_run < run || back_run <= 0 {
            None
        } else {
            Some((amp(samples, peak) - amp(samples, end)) as f32 / back_run as f32)
        };

        Self {
            start,
            peak,
            end,
            run,
            slope,
            backslope,
        }
    }
}

#[inline]
fn amp(samples: &[u8], i: usize) -> i32 {
    samples[i] as i32
}

#[inline]
fn diff(samples: &[u8], i: usize) -> i32 {
    amp(samples, i) - amp(samples, i - 1)
}

/// End of the surface return: the first sample where five successive
/// non-rising steps accumulate. A flat stretch (no net change over three
/// steps) resets the count. Returns 0 if the surface never drops.
pub fn first_drop(samples: &[u8]) -> usize {
    let mut drop = 0;
    for i in SURFACE_GUARD_BIN..samples.len() {
        if amp(samples, i) - amp(samples, i - 3) == 0 {
            drop = 0;
        }

        if diff(samples, i) <= 0 {
            drop += 1;
            if drop >= SURFACE_DROP_RUN {
                return i;
            }
        } else {
            drop = 0;
        }
    }
    0
}

/// Walk back from `bin` to the foot of the leading edge: the first of two
/// consecutive non-rising steps.
pub fn leading_edge_start(samples: &[u8], bin: usize) -> usize {
    if bin < SURFACE_GUARD_BIN {
        return 0;
    }

    let mut rise = 0;
    let mut start = 0;
    for i in (SURFACE_GUARD_BIN..=bin).rev() {
        if diff(samples, i) <= 0 {
            if start == 0 {
                start = i;
            }
            rise += 1;
            if rise >= EDGE_RUN {
                break;
            }
        } else {
            rise = 0;
            start = 0;
        }
    }
    start
}

/// Walk forward from `bin` (at most `window` samples) to the first of two
/// consecutive falling steps.
pub fn find_peak(samples: &[u8], bin: usize, window: usize) -> usize {
    let end = bin.saturating_add(window).min(samples.len().saturating_sub(1));

    let mut drop = 0;
    let mut peak = 0;
    for i in bin.max(1)..end {
        if diff(samples, i) < 0 {
            if peak == 0 {
                peak = i;
            }
            drop += 1;
            if drop >= EDGE_RUN {
                break;
            }
        } else {
            drop = 0;
            peak = 0;
        }
    }
    peak
}

/// First sample after `peak` (within `window`) that rises by more than one
/// count, ending the trailing edge. Returns 0 if there is none.
pub fn backslope_end(samples: &[u8], peak: usize, window: usize) -> usize {
    let end = peak.saturating_add(window).min(samples.len().saturating_sub(1));
    (peak.max(1)..end)
        .find(|&i| diff(samples, i) > 1)
        .unwrap_or(0)
}

/// Judge one channel's samples around `bin`.
///
/// `BinOutOfRange` is only reachable by direct callers; a filter pass rejects
/// such bins before evaluating anything.
pub fn evaluate_samples(samples: &[u8], bin: usize, ac_zero_offset: i32, params: &SlopeParams) -> ReturnDecision {
    let Some(&at_bin) = samples.get(bin) else {
        return ReturnDecision::Exclude(RejectReason::BinOutOfRange);
    };

    if params.ac_offset_required != 0 && at_bin as i32 - ac_zero_offset < params.ac_offset_required {
        return ReturnDecision::Exclude(RejectReason::AcOffset);
    }

    if bin < first_drop(samples) {
        return ReturnDecision::Exclude(RejectReason::SurfaceClutter);
    }

    let shape = ReturnShape::measure(samples, bin, params.edge_window);

    if shape.run < params.run_required {
        return ReturnDecision::Exclude(RejectReason::ShortRun);
    }
    if shape.slope < params.slope_required {
        return ReturnDecision::Exclude(RejectReason::LowSlope);
    }
    if params.enable_backslope_check {
        if let Some(backslope) = shape.backslope {
            if backslope < params.slope_required {
                return ReturnDecision::Exclude(RejectReason::LowBackslope);
            }
        }
    }

    ReturnDecision::Keep
}

/// Judge a point's selected return on its selected channel.
pub fn evaluate(point: &SoundingPoint, config: &FilterConfig) -> ReturnDecision {
    if point.is_exempt() {
        return ReturnDecision::Exempt;
    }

    let params = SlopeParams::for_point(point, config);
    evaluate_samples(
        point.samples(),
        point.bottom_bin(),
        point.waveform.ac_zero_offset(point.channel),
        &params,
    )
}
