use crate::dto::{Dataset, Fields, Record};
use crate::error::DedupError;
use csv::Reader;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::Path;

/// Loads a CSV file with a header row. Record ids come from `id_column`, or
/// from the 0-based row index when no id column is given.
pub fn load_dataset(path: &Path, id_column: Option<&str>) -> Result<Dataset, DedupError> {
    let file = fs::File::open(path).map_err(|err| DedupError::io(path, err))?;
    read_dataset(file, id_column)
}

pub fn read_dataset<R: Read>(source: R, id_column: Option<&str>) -> Result<Dataset, DedupError> {
    let mut reader = Reader::from_reader(source);
    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let id_index = match id_column {
        Some(name) => Some(columns.iter().position(|c| c == name).ok_or_else(|| {
            DedupError::invalid_data(format!("file must contain id column '{}'", name))
        })?),
        None => None,
    };

    let mut seen = HashSet::new();
    let records = reader
        .records()
        .enumerate()
        .map(|(row, record)| {
            let record = record?;
            let id = match id_index {
                Some(idx) => record.get(idx).unwrap_or_default().to_string(),
                None => row.to_string(),
            };
            if !seen.insert(id.clone()) {
                return Err(DedupError::invalid_data(format!(
                    "duplicate record id '{}' on row {}",
                    id,
                    row + 1
                )));
            }
            let fields: Fields = columns
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect();
            Ok(Record { id, fields })
        })
        .collect::<Result<Vec<Record>, DedupError>>()?;

    Ok(Dataset { columns, records })
}

/// Reads a JSON document, or `None` when the file does not exist.
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, DedupError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path).map_err(|err| DedupError::io(path, err))?;
    Ok(Some(serde_json::from_str(&content)?))
}

/// Writes `value` as pretty JSON, replacing any existing file.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), DedupError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| DedupError::io(parent, err))?;
    }
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json).map_err(|err| DedupError::io(path, err))
}
