//! Snapshot loaders for sounding and waveform CSV files.
//!
//! A snapshot is read from two files joined by point id:
//!
//! - a point CSV with one row per sounding:
//!   `id, line, x|lon, y|lat, z, verr, herr, return, invalid, code, channel,
//!   bin_first, bin_second[, narrow_run, wide_run]`
//! - a waveform CSV with one row per point and channel:
//!   `id, channel, ac_zero_offset, s0, s1, ..., sN`
//!
//! Columns of the point CSV are located by header name (case-insensitive), so
//! their order does not matter. Positions given as `lat`/`lon` are projected
//! onto a local plane before the snapshot is returned.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use csv::{ReaderBuilder, StringRecord};
use thiserror::Error;

use super::sounding::{Channel, ReturnKind, SoundingPoint, SurveySnapshot, Waveform};
use super::transforms::{project_all, EquirectangularProjector, PlanarProjector};

/// Errors that can occur during snapshot loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error at line {line}, column '{column}': {message}")]
    ParseError {
        line: u64,
        column: String,
        message: String,
    },

    #[error("Point {point_id} has no {channel} waveform")]
    MissingWaveform { point_id: u64, channel: Channel },

    #[error("Point {point_id} has more than one {channel} waveform")]
    DuplicateWaveform { point_id: u64, channel: Channel },

    #[error("Duplicate point id {0}")]
    DuplicatePoint(u64),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// How the point CSV gives horizontal positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionFormat {
    /// `x`, `y` columns in meters.
    Planar,
    /// `lat`, `lon` columns in degrees.
    Geographic,
}

/// One channel of a waveform row.
#[derive(Debug, Clone)]
struct ChannelSamples {
    ac_zero_offset: i32,
    samples: Vec<u8>,
}

#[derive(Debug, Default)]
struct WaveformRows {
    narrow: Option<ChannelSamples>,
    wide: Option<ChannelSamples>,
}

fn line_of(record: &StringRecord) -> u64 {
    record.position().map_or(0, |p| p.line())
}

fn parse_at<T>(record: &StringRecord, idx: usize, column: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = record.get(idx).map(str::trim).unwrap_or("");
    raw.parse().map_err(|e: T::Err| LoaderError::ParseError {
        line: line_of(record),
        column: column.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}

fn parse_channel(record: &StringRecord, idx: usize) -> Result<Channel> {
    let raw = record.get(idx).map(str::trim).unwrap_or("");
    match raw.to_ascii_lowercase().as_str() {
        "narrow" | "apd" | "1" => Ok(Channel::Narrow),
        "wide" | "pmt" | "0" => Ok(Channel::Wide),
        _ => Err(LoaderError::ParseError {
            line: line_of(record),
            column: "channel".to_string(),
            message: format!("'{}' is not a channel (narrow or wide)", raw),
        }),
    }
}

fn parse_return(record: &StringRecord, idx: usize) -> Result<ReturnKind> {
    let raw = record.get(idx).map(str::trim).unwrap_or("");
    match raw.to_ascii_lowercase().as_str() {
        "primary" | "first" | "0" | "" => Ok(ReturnKind::Primary),
        "secondary" | "second" | "1" => Ok(ReturnKind::Secondary),
        _ => Err(LoaderError::ParseError {
            line: line_of(record),
            column: "return".to_string(),
            message: format!("'{}' is not a return (primary or secondary)", raw),
        }),
    }
}

fn parse_flag(record: &StringRecord, idx: usize, column: &str) -> Result<bool> {
    let raw = record.get(idx).map(str::trim).unwrap_or("");
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" | "" => Ok(false),
        _ => Err(LoaderError::ParseError {
            line: line_of(record),
            column: column.to_string(),
            message: format!("'{}' is not a flag", raw),
        }),
    }
}

/// Optional integer column; empty cells read as `None`.
fn parse_optional(record: &StringRecord, idx: Option<usize>, column: &str) -> Result<Option<i32>> {
    let Some(idx) = idx else {
        return Ok(None);
    };
    match record.get(idx).map(str::trim) {
        None | Some("") => Ok(None),
        Some(_) => parse_at(record, idx, column).map(Some),
    }
}

/// Load waveform rows keyed by point id.
fn load_waveform_rows(path: &Path) -> Result<HashMap<u64, WaveformRows>> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let mut rows: HashMap<u64, WaveformRows> = HashMap::new();

    for result in reader.records() {
        let record = result?;
        if record.len() < 3 {
            return Err(LoaderError::ParseError {
                line: line_of(&record),
                column: "ac_zero_offset".to_string(),
                message: "waveform row needs id, channel and ac_zero_offset".to_string(),
            });
        }

        let point_id: u64 = parse_at(&record, 0, "id")?;
        let channel = parse_channel(&record, 1)?;
        let ac_zero_offset: i32 = parse_at(&record, 2, "ac_zero_offset")?;

        let mut samples = Vec::with_capacity(record.len() - 3);
        for idx in 3..record.len() {
            samples.push(parse_at::<u8>(&record, idx, "sample")?);
        }

        let entry = rows.entry(point_id).or_default();
        let slot = match channel {
            Channel::Narrow => &mut entry.narrow,
            Channel::Wide => &mut entry.wide,
        };
        if slot.is_some() {
            return Err(LoaderError::DuplicateWaveform { point_id, channel });
        }
        *slot = Some(ChannelSamples {
            ac_zero_offset,
            samples,
        });
    }

    if rows.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(rows)
}

/// Column indices of the point CSV.
struct PointColumns {
    id: usize,
    line: usize,
    horizontal: (usize, usize),
    format: PositionFormat,
    z: usize,
    verr: usize,
    herr: usize,
    return_kind: usize,
    invalid: usize,
    code: usize,
    channel: usize,
    bin_first: usize,
    bin_second: usize,
    narrow_run: Option<usize>,
    wide_run: Option<usize>,
}

impl PointColumns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let col_map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();

        let mut missing = Vec::new();
        let mut require = |name: &str| match col_map.get(name) {
            Some(&idx) => idx,
            None => {
                missing.push(name.to_string());
                0
            }
        };

        let id = require("id");
        let line = require("line");
        let z = require("z");
        let verr = require("verr");
        let herr = require("herr");
        let return_kind = require("return");
        let invalid = require("invalid");
        let code = require("code");
        let channel = require("channel");
        let bin_first = require("bin_first");
        let bin_second = require("bin_second");

        let (horizontal, format) = match (col_map.get("x"), col_map.get("y")) {
            (Some(&x), Some(&y)) => ((x, y), PositionFormat::Planar),
            _ => {
                let lat = require("lat");
                let lon = require("lon");
                ((lon, lat), PositionFormat::Geographic)
            }
        };

        if !missing.is_empty() {
            return Err(LoaderError::MissingColumns(missing.join(", ")));
        }

        Ok(Self {
            id,
            line,
            horizontal,
            format,
            z,
            verr,
            herr,
            return_kind,
            invalid,
            code,
            channel,
            bin_first,
            bin_second,
            narrow_run: col_map.get("narrow_run").copied(),
            wide_run: col_map.get("wide_run").copied(),
        })
    }
}

fn take_channel(rows: &mut WaveformRows, point_id: u64, channel: Channel) -> Result<ChannelSamples> {
    let slot = match channel {
        Channel::Narrow => rows.narrow.take(),
        Channel::Wide => rows.wide.take(),
    };
    slot.ok_or(LoaderError::MissingWaveform { point_id, channel })
}

/// Load a survey snapshot, projecting geographic positions with an
/// equirectangular projection anchored at the survey's south-west corner.
///
/// # Errors
///
/// Returns an error if either file cannot be read, a required column is
/// missing, a field does not parse, or a point lacks a waveform for either
/// channel.
pub fn load_snapshot<P: AsRef<Path>, Q: AsRef<Path>>(points_path: P, waveforms_path: Q) -> Result<SurveySnapshot> {
    load_snapshot_with(points_path, waveforms_path, None)
}

/// Load a survey snapshot with an explicit projector for geographic
/// positions. `None` picks the default south-west anchored projection.
/// Planar positions are used as they are.
pub fn load_snapshot_with<P: AsRef<Path>, Q: AsRef<Path>>(
    points_path: P,
    waveforms_path: Q,
    projector: Option<&dyn PlanarProjector>,
) -> Result<SurveySnapshot> {
    let points_path = points_path.as_ref();
    let mut waveforms = load_waveform_rows(waveforms_path.as_ref())?;

    let file = File::open(points_path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(BufReader::new(file));

    let columns = PointColumns::from_headers(reader.headers()?)?;

    let mut points = Vec::with_capacity(waveforms.len());
    let mut seen = std::collections::HashSet::with_capacity(waveforms.len());

    for result in reader.records() {
        let record = result?;

        let id: u64 = parse_at(&record, columns.id, "id")?;
        if !seen.insert(id) {
            return Err(LoaderError::DuplicatePoint(id));
        }
        let channel = parse_channel(&record, columns.channel)?;

        let mut rows = waveforms.remove(&id).unwrap_or_default();
        let narrow = take_channel(&mut rows, id, Channel::Narrow)?;
        let wide = take_channel(&mut rows, id, Channel::Wide)?;

        let waveform = Waveform {
            narrow: narrow.samples,
            wide: wide.samples,
            narrow_ac_zero_offset: narrow.ac_zero_offset,
            wide_ac_zero_offset: wide.ac_zero_offset,
            bottom_bin_first: parse_at(&record, columns.bin_first, "bin_first")?,
            bottom_bin_second: parse_at(&record, columns.bin_second, "bin_second")?,
        };

        // Horizontal columns hold (x, y) or (lon, lat); projected below.
        let mut point = SoundingPoint::new(
            id,
            parse_at(&record, columns.line, "line")?,
            parse_at(&record, columns.horizontal.0, "x")?,
            parse_at(&record, columns.horizontal.1, "y")?,
            parse_at(&record, columns.z, "z")?,
            channel,
            waveform,
        )
        .with_errors(
            parse_at(&record, columns.verr, "verr")?,
            parse_at(&record, columns.herr, "herr")?,
        );
        point.return_kind = parse_return(&record, columns.return_kind)?;
        point.invalid = parse_flag(&record, columns.invalid, "invalid")?;
        point.detection_code = parse_at(&record, columns.code, "code")?;
        point.narrow_run_required = parse_optional(&record, columns.narrow_run, "narrow_run")?;
        point.wide_run_required = parse_optional(&record, columns.wide_run, "wide_run")?;

        points.push(point);
    }

    if points.is_empty() {
        return Err(LoaderError::EmptyFile(points_path.to_path_buf()));
    }

    if !waveforms.is_empty() {
        log::warn!("{} waveform ids have no matching point and were ignored", waveforms.len());
    }

    if columns.format == PositionFormat::Geographic {
        project_points(&mut points, projector);
    }

    log::info!("Loaded {} soundings from {}", points.len(), points_path.display());
    Ok(SurveySnapshot::new(points))
}

/// Replace `(lon, lat)` held in `x`/`y` with projected meters.
fn project_points(points: &mut [SoundingPoint], projector: Option<&dyn PlanarProjector>) {
    let positions: Vec<(f64, f64)> = points.iter().map(|p| (p.y, p.x)).collect();

    let default_projector;
    let projector: &dyn PlanarProjector = match projector {
        Some(projector) => projector,
        None => match EquirectangularProjector::from_south_west(positions.iter().copied()) {
            Some(projector) => {
                log::debug!("Projecting about south-west corner {:?}", projector.origin());
                default_projector = projector;
                &default_projector
            }
            // Nothing finite to anchor on; the grid rejects these positions.
            None => return,
        },
    };

    for (point, (x, y)) in points.iter_mut().zip(project_all(projector, &positions)) {
        point.x = x;
        point.y = y;
    }
}
