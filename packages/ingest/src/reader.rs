//! CSV input adapters for decoded grid samples and district centroids.

use std::collections::BTreeSet;
use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use dustwatch_grid_models::{District, GridSample, SUSPICIOUS_CONCENTRATION, validate_concentration};
use serde::Deserialize;

use crate::IngestError;

/// Columns a grid CSV must carry.
pub const GRID_COLUMNS: [&str; 4] = [
    "timestamp_utc",
    "latitude",
    "longitude",
    "dust_concentration_ugm3",
];

/// Columns a district CSV must carry.
pub const DISTRICT_COLUMNS: [&str; 6] = [
    "id",
    "name",
    "parent_region_id",
    "parent_region_name",
    "centroid_lat",
    "centroid_lon",
];

#[derive(Debug, Deserialize)]
struct GridRow {
    timestamp_utc: String,
    latitude: f64,
    longitude: f64,
    dust_concentration_ugm3: Option<f64>,
    #[serde(default)]
    forecast_hour: Option<u32>,
    #[serde(default)]
    forecast_init: Option<String>,
}

/// Samples parsed from one grid file.
#[derive(Debug, Default)]
pub struct GridRead {
    pub samples: Vec<GridSample>,
    /// Rows dropped as malformed, missing a value, or out of range.
    pub rejected: usize,
}

/// Parses a UTC timestamp in RFC 3339 or `YYYY-MM-DD HH:MM[:SS]` form.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.and_utc())
}

fn parse_init_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(raw).map(|t| t.date_naive()))
}

impl GridRow {
    fn into_sample(self, source_id: &str) -> Option<GridSample> {
        let timestamp = parse_timestamp(&self.timestamp_utc)?;
        if !(-90.0..=90.0).contains(&self.latitude) || !(-180.0..=180.0).contains(&self.longitude) {
            return None;
        }
        let raw = self.dust_concentration_ugm3?;
        let concentration = validate_concentration(raw)?;
        if concentration > SUSPICIOUS_CONCENTRATION {
            log::warn!(
                "Suspicious concentration {concentration} at ({}, {}) {timestamp} in {source_id}",
                self.latitude,
                self.longitude
            );
        }

        let mut sample = GridSample::new(self.latitude, self.longitude, concentration, timestamp, source_id);
        sample.forecast_hour = self.forecast_hour;
        sample.forecast_init = self.forecast_init.as_deref().and_then(parse_init_date);
        Some(sample)
    }
}

fn require_columns(
    reader: &mut csv::Reader<impl Read>,
    required: &[&str],
    source: &str,
) -> Result<(), IngestError> {
    let headers: BTreeSet<String> = reader
        .headers()
        .map_err(|e| IngestError::Csv {
            path: source.to_string(),
            source: e,
        })?
        .iter()
        .map(|h| h.trim().to_owned())
        .collect();

    match required.iter().find(|c| !headers.contains(**c)) {
        Some(column) => Err(IngestError::MissingColumn {
            path: source.to_string(),
            column: (*column).to_string(),
        }),
        None => Ok(()),
    }
}

/// Reads grid samples from any CSV source, tagging each with `source_id`.
///
/// Malformed rows and rows without a finite concentration are counted in
/// [`GridRead::rejected`] and skipped.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] if a required header is absent,
/// or [`IngestError::Csv`] if the header row cannot be read.
pub fn read_grid(reader: impl Read, source_id: &str) -> Result<GridRead, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    require_columns(&mut csv_reader, &GRID_COLUMNS, source_id)?;

    let mut read = GridRead::default();
    for result in csv_reader.deserialize::<GridRow>() {
        let sample = match result {
            Ok(row) => row.into_sample(source_id),
            Err(e) => {
                log::trace!("  skipping malformed row in {source_id}: {e}");
                None
            }
        };
        match sample {
            Some(s) => read.samples.push(s),
            None => read.rejected += 1,
        }
    }

    log::debug!(
        "Read {} samples from {source_id} ({} rejected)",
        read.samples.len(),
        read.rejected
    );
    Ok(read)
}

/// Source identity for a grid file: its file name.
#[must_use]
pub fn source_identity(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

/// Reads a grid CSV file. Samples are tagged with [`source_identity`].
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be opened, otherwise as
/// [`read_grid`].
pub fn read_grid_csv(path: &Path) -> Result<GridRead, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    read_grid(file, &source_identity(path))
}

/// Reads district centroids from any CSV source.
///
/// Rows with a malformed or non-finite centroid are skipped, as are
/// repeated ids after the first.
///
/// # Errors
///
/// Returns [`IngestError::MissingColumn`] or [`IngestError::Csv`] for a
/// bad header.
pub fn read_districts(reader: impl Read, source: &str) -> Result<Vec<District>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    require_columns(&mut csv_reader, &DISTRICT_COLUMNS, source)?;

    let mut seen = BTreeSet::new();
    let mut districts = Vec::new();
    for result in csv_reader.deserialize::<District>() {
        let district = match result {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Skipping malformed district row in {source}: {e}");
                continue;
            }
        };
        if !district.centroid_lat.is_finite() || !district.centroid_lon.is_finite() {
            log::warn!("Skipping district {} without a usable centroid", district.id);
            continue;
        }
        if !seen.insert(district.id.clone()) {
            log::warn!("Skipping repeated district id {}", district.id);
            continue;
        }
        districts.push(district);
    }

    log::info!("Loaded {} districts from {source}", districts.len());
    Ok(districts)
}

/// Reads a district CSV file.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if the file cannot be opened, otherwise as
/// [`read_districts`].
pub fn read_districts_csv(path: &Path) -> Result<Vec<District>, IngestError> {
    let file = std::fs::File::open(path).map_err(|e| IngestError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    read_districts(file, &path.display().to_string())
}
