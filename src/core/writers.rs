//! Writers for filter pass results.
//!
//! - Decision CSV: `id, exclude, state` for every sounding in snapshot order
//! - Exclusion list: one excluded point id per line

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use thiserror::Error;

use super::sounding::SurveySnapshot;
use crate::processors::wave_filter::FilterOutcome;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Outcome was produced for a different snapshot.
    #[error("outcome covers {outcome_len} points but the snapshot has {points_len}")]
    LengthMismatch { points_len: usize, outcome_len: usize },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

fn check_lengths(snapshot: &SurveySnapshot, outcome: &FilterOutcome) -> Result<()> {
    if snapshot.len() != outcome.exclude.len() {
        return Err(WriteError::LengthMismatch {
            points_len: snapshot.len(),
            outcome_len: outcome.exclude.len(),
        });
    }
    Ok(())
}

/// Write one `id, exclude, state` row per sounding.
///
/// `exclude` is written as `0`/`1`; `state` is the terminal state name
/// (for slope exclusions, the rejection reason).
///
/// # Errors
///
/// Returns an error if:
/// - the outcome does not match the snapshot's length
/// - parent directories cannot be created
/// - the file cannot be created or written to
///
/// # Example
///
/// ```no_run
/// use lidar_wave_filter::core::writers::write_decisions_csv;
/// use lidar_wave_filter::{FilterConfig, SurveySnapshot, WaveFilter};
/// use std::path::Path;
///
/// let snapshot = SurveySnapshot::default();
/// let outcome = WaveFilter::new(FilterConfig::default()).unwrap().run(&snapshot).unwrap();
/// write_decisions_csv(Path::new("decisions.csv"), &snapshot, &outcome).unwrap();
/// ```
pub fn write_decisions_csv(path: &Path, snapshot: &SurveySnapshot, outcome: &FilterOutcome) -> Result<()> {
    check_lengths(snapshot, outcome)?;
    ensure_parent_dirs(path)?;

    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();

    csv_writer
        .write_record(["id", "exclude", "state"])
        .map_err(|e| WriteError::CsvError {
            path: path_str.clone(),
            source: e,
        })?;

    for ((point, &exclude), state) in snapshot.points.iter().zip(&outcome.exclude).zip(&outcome.states) {
        csv_writer
            .write_record([
                point.id.to_string().as_str(),
                if exclude { "1" } else { "0" },
                state.as_str(),
            ])
            .map_err(|e| WriteError::CsvError {
                path: path_str.clone(),
                source: e,
            })?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Write the ids of the excluded soundings, one per line.
pub fn write_excluded_ids(path: &Path, snapshot: &SurveySnapshot, outcome: &FilterOutcome) -> Result<()> {
    check_lengths(snapshot, outcome)?;
    ensure_parent_dirs(path)?;

    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for id in outcome.excluded_ids(snapshot) {
        writeln!(writer, "{}", id).map_err(|e| WriteError::WriteFile {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sounding::{Channel, SoundingPoint, Waveform};
    use crate::processors::return_filter::RejectReason;
    use crate::processors::wave_filter::{PassStats, PointState};
    use tempfile::tempdir;

    fn snapshot() -> SurveySnapshot {
        let points = (1..=3)
            .map(|id| {
                SoundingPoint::new(id, 1, 0.0, 0.0, 0.0, Channel::Narrow, Waveform::new(Vec::new(), Vec::new(), 0))
            })
            .collect();
        SurveySnapshot::new(points)
    }

    fn outcome() -> FilterOutcome {
        FilterOutcome {
            exclude: vec![false, true, true],
            states: vec![
                PointState::Corroborated,
                PointState::ExcludedBySlope(RejectReason::LowSlope),
                PointState::ExcludedByWaveform,
            ],
            stats: PassStats::default(),
            changed: true,
        }
    }

    #[test]
    fn test_write_decisions_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("decisions.csv");

        write_decisions_csv(&path, &snapshot(), &outcome()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec!["id,exclude,state", "1,0,corroborated", "2,1,low_slope", "3,1,no_corroboration"]
        );
    }

    #[test]
    fn test_write_excluded_ids() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("excluded.txt");

        write_excluded_ids(&path, &snapshot(), &outcome()).unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "2\n3\n");
    }

    #[test]
    fn test_length_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("decisions.csv");
        let mut short = outcome();
        short.exclude.pop();

        match write_decisions_csv(&path, &snapshot(), &short) {
            Err(WriteError::LengthMismatch {
                points_len,
                outcome_len,
            }) => {
                assert_eq!(points_len, 3);
                assert_eq!(outcome_len, 2);
            }
            other => panic!("Expected LengthMismatch error, got {:?}", other),
        }
        assert!(!path.exists());
    }
}
