use crate::error::ExportError;
use crate::reading::StoredReading;
use crate::store::ReadingStore;
use rust_xlsxwriter::{Format, Workbook};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const EXPORT_COLUMNS: [&str; 6] = [
    "Timestamp",
    "Temperature",
    "Wind Direction",
    "Wind Speed",
    "Pressure",
    "Precipitation",
];

const SHEET_NAME: &str = "Weather";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub rows: usize,
    pub path: PathBuf,
}

/// Writes the most recent readings to a spreadsheet, replacing the previous
/// export each time.
#[derive(Debug, Clone)]
pub struct Exporter {
    store: Arc<ReadingStore>,
    path: PathBuf,
}

impl Exporter {
    pub fn new(store: Arc<ReadingStore>, path: PathBuf) -> Self {
        Self { store, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export_recent(&self, limit: usize) -> Result<ExportSummary, ExportError> {
        let readings = self.store.recent(limit)?;
        write_workbook(&readings, &self.path)?;
        Ok(ExportSummary {
            rows: readings.len(),
            path: self.path.clone(),
        })
    }
}

fn write_workbook(readings: &[StoredReading], path: &Path) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;
    for (col, title) in EXPORT_COLUMNS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header_format)?;
    }

    for (idx, stored) in readings.iter().enumerate() {
        let row = idx as u32 + 1;
        let reading = &stored.reading;
        let timestamp = reading.timestamp.format(TIMESTAMP_FORMAT).to_string();
        worksheet.write_string(row, 0, timestamp.as_str())?;
        worksheet.write_number(row, 1, reading.temperature)?;
        worksheet.write_string(row, 2, reading.wind_direction.label())?;
        worksheet.write_number(row, 3, reading.wind_speed)?;
        worksheet.write_number(row, 4, reading.pressure)?;
        worksheet.write_string(row, 5, reading.precipitation.as_str())?;
    }
    worksheet.set_column_width(0, 20)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ExportError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    // Readers of the export never see a half-written workbook.
    let tmp = path.with_extension("xlsx.tmp");
    let replaced = workbook
        .save(&tmp)
        .map_err(ExportError::from)
        .and_then(|()| {
            std::fs::rename(&tmp, path).map_err(|source| ExportError::Io {
                path: path.to_path_buf(),
                source,
            })
        });
    if replaced.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    replaced
}
