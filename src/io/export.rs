//! COR CSV import/export.
//!
//! Observations CSV: header `slice,cor`, one observation per row.
//! Table CSV: header `slice,cor`, one row per slice of the dense table.

use std::path::Path;

use csv::StringRecord;

use crate::cor::{CorObservations, CorTable};
use crate::domain::CorObservation;
use crate::error::AppError;

/// Write the dense per-slice table.
pub fn write_cor_table_csv(path: &Path, table: &CorTable) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create COR CSV '{}': {e}", path.display())))?;
    writer
        .write_record(["slice", "cor"])
        .map_err(|e| AppError::new(2, format!("Failed to write COR CSV header: {e}")))?;
    for (slice, cor) in table.iter() {
        writer
            .write_record([slice.to_string(), format!("{cor:.6}")])
            .map_err(|e| AppError::new(2, format!("Failed to write COR CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush COR CSV: {e}")))
}

/// Read `slice,cor` observations. Later rows for the same slice win.
pub fn read_observations_csv(path: &Path) -> Result<CorObservations, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to open observations CSV '{}': {e}", path.display())))?;

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read observations CSV header: {e}")))?
        .clone();
    let slice_col = column(&headers, "slice")?;
    let cor_col = column(&headers, "cor")?;

    let mut out = CorObservations::new();
    for (i, record) in reader.records().enumerate() {
        let line = i + 2;
        let record = record.map_err(|e| AppError::new(2, format!("Bad CSV record on line {line}: {e}")))?;
        let slice = field(&record, slice_col, line)?;
        let cor = field(&record, cor_col, line)?;
        let obs: CorObservation = format!("{slice}={cor}")
            .parse()
            .map_err(|e| AppError::new(2, format!("Line {line}: {e}")))?;
        out.set(obs.slice_index, obs.cor);
    }
    Ok(out)
}

fn column(headers: &StringRecord, name: &str) -> Result<usize, AppError> {
    headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case(name))
        .ok_or_else(|| AppError::new(2, format!("Observations CSV is missing the '{name}' column")))
}

fn field<'r>(record: &'r StringRecord, col: usize, line: usize) -> Result<&'r str, AppError> {
    record
        .get(col)
        .ok_or_else(|| AppError::new(2, format!("Line {line}: missing column {}", col + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("tomo-{name}-{}.csv", std::process::id()))
    }

    #[test]
    fn table_csv_has_one_row_per_slice() {
        let path = temp("table");
        write_cor_table_csv(&path, &CorTable::new(vec![5.0, 5.5, 6.0])).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["slice,cor", "0,5.000000", "1,5.500000", "2,6.000000"]);
    }

    #[test]
    fn observations_csv_parses_and_dedups() {
        let path = temp("obs");
        std::fs::write(&path, "cor, slice\n10.0, 0\n12.5, 4\n11.0, 0\n").unwrap();
        let obs = read_observations_csv(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(obs.len(), 2);
        assert_eq!(obs.get(0), Some(11.0));
        assert_eq!(obs.get(4), Some(12.5));
    }

    #[test]
    fn missing_column_is_reported() {
        let path = temp("bad");
        std::fs::write(&path, "slice,value\n1,2\n").unwrap();
        let err = read_observations_csv(&path).unwrap_err();
        let _ = std::fs::remove_file(&path);
        assert!(err.to_string().contains("cor"));
    }
}
