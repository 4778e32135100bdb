//! Sounding points, their waveforms, and the per-pass input snapshot.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Samples in the narrow (APD) channel.
pub const NARROW_LEN: usize = 201;

/// Samples in the wide (PMT) channel.
pub const WIDE_LEN: usize = 501;

/// Waveform scans never look below this sample; everything earlier is
/// pre-surface noise.
pub const SURFACE_GUARD_BIN: usize = 20;

/// Upstream detection codes that are never filtered: land (70), shallow water
/// algorithm (72) and shoreline depth swapped (74).
pub const EXEMPT_DETECTION_CODES: [i32; 3] = [70, 72, 74];

/// Waveform digitizer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Narrow,
    Wide,
}

impl Channel {
    /// Fixed sample count for this channel.
    #[inline]
    pub fn sample_count(self) -> usize {
        match self {
            Channel::Narrow => NARROW_LEN,
            Channel::Wide => WIDE_LEN,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Narrow => "narrow",
            Channel::Wide => "wide",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which return of a shot the sounding represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnKind {
    #[default]
    Primary,
    Secondary,
}

/// Two-channel waveform bound to one sounding.
#[derive(Debug, Clone)]
pub struct Waveform {
    /// Narrow channel amplitudes, nominally `NARROW_LEN` samples.
    pub narrow: Vec<u8>,
    /// Wide channel amplitudes, nominally `WIDE_LEN` samples.
    pub wide: Vec<u8>,
    pub narrow_ac_zero_offset: i32,
    pub wide_ac_zero_offset: i32,
    /// Candidate bottom bin for the primary return.
    pub bottom_bin_first: usize,
    /// Candidate bottom bin for the secondary return.
    pub bottom_bin_second: usize,
}

impl Waveform {
    /// Creates a waveform with zero AC offsets and both bottom bins at `bin`.
    pub fn new(narrow: Vec<u8>, wide: Vec<u8>, bin: usize) -> Self {
        Self {
            narrow,
            wide,
            narrow_ac_zero_offset: 0,
            wide_ac_zero_offset: 0,
            bottom_bin_first: bin,
            bottom_bin_second: bin,
        }
    }

    /// Samples of one channel.
    #[inline]
    pub fn samples(&self, channel: Channel) -> &[u8] {
        match channel {
            Channel::Narrow => &self.narrow,
            Channel::Wide => &self.wide,
        }
    }

    #[inline]
    pub fn ac_zero_offset(&self, channel: Channel) -> i32 {
        match channel {
            Channel::Narrow => self.narrow_ac_zero_offset,
            Channel::Wide => self.wide_ac_zero_offset,
        }
    }

    #[inline]
    pub fn bottom_bin(&self, kind: ReturnKind) -> usize {
        match kind {
            ReturnKind::Primary => self.bottom_bin_first,
            ReturnKind::Secondary => self.bottom_bin_second,
        }
    }
}

/// One lidar sounding with its planar position and bound waveform.
#[derive(Debug, Clone)]
pub struct SoundingPoint {
    pub id: u64,
    /// Survey line the sounding was collected on.
    pub line: u32,
    /// Easting in meters from the survey origin.
    pub x: f64,
    /// Northing in meters from the survey origin.
    pub y: f64,
    pub z: f64,
    /// Vertical error estimate (meters).
    pub verr: f64,
    /// Horizontal error estimate (meters).
    pub herr: f64,
    pub return_kind: ReturnKind,
    /// Set by upstream processing; never modified here.
    pub invalid: bool,
    /// Upstream bottom detection code of the selected return.
    pub detection_code: i32,
    /// Channel that produced the bottom detection of the selected return.
    pub channel: Channel,
    /// Per-record run-length requirement, overriding the configured one.
    pub narrow_run_required: Option<i32>,
    pub wide_run_required: Option<i32>,
    pub waveform: Waveform,
}

impl SoundingPoint {
    /// Creates a valid primary-return sounding with zero error estimates.
    pub fn new(id: u64, line: u32, x: f64, y: f64, z: f64, channel: Channel, waveform: Waveform) -> Self {
        Self {
            id,
            line,
            x,
            y,
            z,
            verr: 0.0,
            herr: 0.0,
            return_kind: ReturnKind::Primary,
            invalid: false,
            detection_code: 0,
            channel,
            narrow_run_required: None,
            wide_run_required: None,
            waveform,
        }
    }

    /// Sets the vertical and horizontal error estimates.
    pub fn with_errors(mut self, verr: f64, herr: f64) -> Self {
        self.verr = verr;
        self.herr = herr;
        self
    }

    /// Bottom bin of the selected return.
    #[inline]
    pub fn bottom_bin(&self) -> usize {
        self.waveform.bottom_bin(self.return_kind)
    }

    /// Selected channel samples.
    #[inline]
    pub fn samples(&self) -> &[u8] {
        self.waveform.samples(self.channel)
    }

    /// True if the upstream detection code puts this return out of scope.
    #[inline]
    pub fn is_exempt(&self) -> bool {
        EXEMPT_DETECTION_CODES.contains(&self.detection_code)
    }

    /// Run-length requirement for the selected channel.
    pub fn run_required(&self, configured_narrow: i32, configured_wide: i32) -> i32 {
        match self.channel {
            Channel::Narrow => self.narrow_run_required.unwrap_or(configured_narrow),
            Channel::Wide => self.wide_run_required.unwrap_or(configured_wide),
        }
    }
}

/// Read-only input to one filter pass.
#[derive(Debug, Clone, Default)]
pub struct SurveySnapshot {
    pub points: Vec<SoundingPoint>,
}

impl SurveySnapshot {
    pub fn new(points: Vec<SoundingPoint>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
