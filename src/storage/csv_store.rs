use crate::model::{RawRecord, RawTable, StorageError};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Columnar persistence for listing datasets: one directory of CSV files,
/// the alphabetically first of which is the active dataset.
pub struct CsvStore {
    data_dir: PathBuf,
}

impl CsvStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the dataset that would be loaded, if any CSV file exists.
    pub fn first_csv_path(&self) -> Result<Option<PathBuf>, StorageError> {
        if !self.data_dir.is_dir() {
            return Ok(None);
        }
        let mut paths: Vec<PathBuf> = fs::read_dir(&self.data_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"))
            })
            .collect();
        paths.sort();
        Ok(paths.into_iter().next())
    }

    /// Loads the alphabetically first CSV in the data directory, or None
    /// when the directory holds no CSV at all.
    pub fn load_first(&self) -> Result<Option<RawTable>, StorageError> {
        match self.first_csv_path()? {
            Some(path) => self.load(&path).map(Some),
            None => Ok(None),
        }
    }

    /// Reads one CSV file into a raw table. Header order is preserved and
    /// blank cells stay absent from their record.
    pub fn load(&self, path: &Path) -> Result<RawTable, StorageError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        let mut records = Vec::new();
        for row in reader.records() {
            let row = row?;
            let mut record = RawRecord::new();
            for (column, cell) in columns.iter().zip(row.iter()) {
                if !cell.is_empty() {
                    record.insert(column.clone(), Value::String(cell.to_string()));
                }
            }
            records.push(record);
        }
        info!(path = %path.display(), rows = records.len(), "loaded dataset");
        Ok(RawTable { columns, records })
    }

    /// Writes records under the sorted union of every key present, always
    /// including the coordinate columns so saved datasets stay mappable.
    /// Returns the path written.
    pub fn save_records(
        &self,
        file_name: &str,
        records: &[RawRecord],
    ) -> Result<PathBuf, StorageError> {
        fs::create_dir_all(&self.data_dir)?;
        let mut columns: Vec<String> = vec!["latitude".to_string(), "longitude".to_string()];
        for record in records {
            for key in record.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        columns.sort();

        let path = self.data_dir.join(file_name);
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&columns)?;
        for record in records {
            let row: Vec<String> = columns
                .iter()
                .map(|column| record.get(column).map(render_cell).unwrap_or_default())
                .collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;
        info!(path = %path.display(), rows = records.len(), "saved dataset");
        Ok(path)
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
