//! CSV export of the history buffer.
//!
//! Header row matches the reading field names; timestamps are fixed-width UTC
//! `YYYY-MM-DD HH:MM:SS`, so sub-second precision is lost on a round trip.

use crate::envelope::{Classification, LightCondition, SensorReading};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

pub const EXPORT_HEADER: [&str; 6] = [
    "timestamp",
    "temperature",
    "humidity",
    "lightIntensity",
    "lightCondition",
    "mlClassification",
];

const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const FILENAME_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]_[hour][minute][second]");

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timestamp formatting failed: {0}")]
    Format(#[from] time::error::Format),
    #[error("bad timestamp `{value}`: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: time::error::Parse,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExportRow {
    timestamp: String,
    temperature: f64,
    humidity: f64,
    light_intensity: i64,
    light_condition: LightCondition,
    ml_classification: Classification,
}

impl ExportRow {
    fn from_reading(reading: &SensorReading) -> Result<Self, ExportError> {
        Ok(Self {
            timestamp: format_timestamp(reading.received_at)?,
            temperature: reading.temperature,
            humidity: reading.humidity,
            light_intensity: reading.light_intensity,
            light_condition: reading.light_condition,
            ml_classification: reading.classification,
        })
    }

    fn into_reading(self) -> Result<SensorReading, ExportError> {
        let received_at = PrimitiveDateTime::parse(&self.timestamp, TIMESTAMP_FORMAT)
            .map_err(|source| ExportError::Timestamp { value: self.timestamp.clone(), source })?
            .assume_utc();
        Ok(SensorReading {
            temperature: self.temperature,
            humidity: self.humidity,
            light_intensity: self.light_intensity,
            light_condition: self.light_condition,
            classification: self.ml_classification,
            received_at,
        })
    }
}

pub fn format_timestamp(at: OffsetDateTime) -> Result<String, ExportError> {
    Ok(at.to_offset(time::UtcOffset::UTC).format(TIMESTAMP_FORMAT)?)
}

/// Writes the header and one row per reading, in iteration order.
pub fn write_csv<'a, W, I>(writer: W, readings: I) -> Result<(), ExportError>
where
    W: Write,
    I: IntoIterator<Item = &'a SensorReading>,
{
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(EXPORT_HEADER)?;
    for reading in readings {
        wtr.serialize(ExportRow::from_reading(reading)?)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn to_csv_string<'a, I>(readings: I) -> Result<String, ExportError>
where
    I: IntoIterator<Item = &'a SensorReading>,
{
    let mut buf = Vec::new();
    write_csv(&mut buf, readings)?;
    // csv only ever emits what we gave it, which is UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Parses an artifact produced by [`write_csv`].
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<SensorReading>, ExportError> {
    let mut rdr = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
    rdr.deserialize::<ExportRow>()
        .map(|row| row.map_err(ExportError::from).and_then(ExportRow::into_reading))
        .collect()
}

/// `iot_ml_data_YYYYMMDD_HHMMSS.csv`
pub fn export_filename(now: OffsetDateTime) -> Result<String, ExportError> {
    Ok(format!("iot_ml_data_{}.csv", now.format(FILENAME_FORMAT)?))
}

/// Writes the artifact under `dir`, creating it if needed, and returns its path.
pub fn export_to_dir<'a, I>(dir: &Path, readings: I, now: OffsetDateTime) -> Result<PathBuf, ExportError>
where
    I: IntoIterator<Item = &'a SensorReading>,
{
    std::fs::create_dir_all(dir)?;
    let path = dir.join(export_filename(now)?);
    let file = std::fs::File::create(&path)?;
    write_csv(std::io::BufWriter::new(file), readings)?;
    Ok(path)
}
