use std::{fs::File, io::BufWriter, path::Path};

use anyhow::{Context, Result};
use polars::{frame::DataFrame, io::{SerReader, SerWriter}, prelude::{CsvReadOptions, CsvReader, CsvWriter}};

/// Reads a CSV file (with header row) into a Polars DataFrame.
pub(crate) fn read_from_csv_file(path: &Path) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("Failed to read CSV file: {}", path.display()))?;

    let options = CsvReadOptions::default()
        .with_has_header(true);

    CsvReader::new(file)
        .with_options(options)
        .finish()
        .with_context(|| format!("Failed to parse CSV file: {}", path.display()))
}

/// Writes a Polars DataFrame to a CSV file at `path`, replacing any existing file.
pub(crate) fn write_to_csv_file(path: &Path, df: &DataFrame) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create CSV file: {}", path.display()))?;
    let writer = BufWriter::new(file);
    CsvWriter::new(writer)
        .include_header(true)
        .finish(&mut df.clone())
        .with_context(|| format!("Failed to write CSV file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;

    #[test]
    fn csv_file_round_trip_keeps_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pop.csv");

        let df = df![
            "GID" => [1i64, 2, 3],
            "P_2020" => [10.5, 20.0, 0.0],
        ].unwrap();
        write_to_csv_file(&path, &df).unwrap();

        let read = read_from_csv_file(&path).unwrap();
        assert_eq!(read.height(), 3);
        assert_eq!(read.get_column_names(), df.get_column_names());
        assert_eq!(read.column("P_2020").unwrap().f64().unwrap().get(0), Some(10.5));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = read_from_csv_file(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(err.to_string().contains("here.csv"));
    }
}
