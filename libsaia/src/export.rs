use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use super::error::ExportError;
use super::histogram::{SignalHistogram, ThresholdMode};
use super::measurement::MeasurementRecord;

const THRESHOLD_PREFIX: &str = "# threshold=";

/// One row of a saved histogram
#[derive(Debug, Serialize, Deserialize)]
struct HistogramRow {
    file_id: String,
    signal: f64,
    atom_present: bool,
    max_count: f64,
    centroid_x: usize,
    centroid_y: usize,
    background_mean: f64,
    background_std: f64,
}

impl HistogramRow {
    fn new(record: &MeasurementRecord, atom_present: bool) -> Self {
        Self {
            file_id: record.file_id.clone(),
            signal: record.signal,
            atom_present,
            max_count: record.max_count,
            centroid_x: record.centroid_x,
            centroid_y: record.centroid_y,
            background_mean: record.background_mean,
            background_std: record.background_std,
        }
    }

    fn into_record(self) -> MeasurementRecord {
        MeasurementRecord {
            file_id: self.file_id,
            signal: self.signal,
            max_count: self.max_count,
            centroid_x: self.centroid_x,
            centroid_y: self.centroid_y,
            background_mean: self.background_mean,
            background_std: self.background_std,
        }
    }
}

/// Write every record of the histogram to a CSV file.
///
/// The first line is a comment holding the threshold, `# threshold=<value>`, followed by a
/// header row and one row per record. atom_present is evaluated with the current threshold.
pub fn save_histogram(histogram: &SignalHistogram, path: &Path) -> Result<(), ExportError> {
    let mut file = File::create(path)?;
    writeln!(file, "{THRESHOLD_PREFIX}{}", histogram.threshold())?;

    let mut writer = csv::Writer::from_writer(file);
    for (record, atom_present) in histogram.records().iter().zip(histogram.atom_flags()) {
        writer.serialize(HistogramRow::new(record, atom_present))?;
    }
    writer.flush()?;
    spdlog::info!(
        "Saved {} records to {} with threshold {}",
        histogram.len(),
        path.display(),
        histogram.threshold()
    );
    Ok(())
}

/// Append the records of a saved histogram and restore its threshold.
///
/// A threshold pinned on `histogram` is kept. The stored atom_present column is not read
/// back; it is derived again from the threshold. Returns the number of records loaded.
/// If any row fails to parse, `histogram` is left untouched.
pub fn load_histogram(histogram: &mut SignalHistogram, path: &Path) -> Result<usize, ExportError> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut first_line = String::new();
    reader.read_line(&mut first_line)?;
    let threshold = first_line
        .trim()
        .strip_prefix(THRESHOLD_PREFIX)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .ok_or_else(|| ExportError::MissingThreshold(path.to_path_buf()))?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .from_reader(reader);
    let rows: Vec<HistogramRow> = csv_reader.deserialize().collect::<Result<_, _>>()?;
    let n_loaded = rows.len();
    for row in rows {
        histogram.append(row.into_record());
    }

    match histogram.threshold_mode() {
        ThresholdMode::Automatic => histogram.restore_threshold(threshold),
        ThresholdMode::Manual => spdlog::info!(
            "Keeping pinned threshold {} instead of saved threshold {}",
            histogram.threshold(),
            threshold
        ),
    }
    spdlog::info!("Loaded {} records from {}", n_loaded, path.display());
    Ok(n_loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(file_id: &str, signal: f64) -> MeasurementRecord {
        MeasurementRecord {
            file_id: String::from(file_id),
            signal,
            max_count: signal / 3.0,
            centroid_x: 4,
            centroid_y: 7,
            background_mean: 0.1,
            background_std: 1.0 / 3.0,
        }
    }

    fn filled() -> SignalHistogram {
        let mut hist = SignalHistogram::default();
        for (i, s) in [10.0, 12.5, 11.0, 98.25, 101.0, 99.0, 13.1].iter().enumerate() {
            hist.append(record(&format!("{}", i + 40), *s));
        }
        hist.restore_threshold(55.5);
        hist
    }

    #[test]
    fn test_reload_reproduces_fixed_bin_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        let edges = vec![0.0, 25.0, 50.0, 75.0, 100.0, 125.0];

        let mut original = filled();
        original.set_fixed_bins(edges.clone()).unwrap();
        save_histogram(&original, &path).unwrap();

        let mut reloaded = SignalHistogram::default();
        reloaded.set_fixed_bins(edges).unwrap();
        assert_eq!(load_histogram(&mut reloaded, &path).unwrap(), 7);

        assert_eq!(reloaded.threshold(), 55.5);
        assert_eq!(reloaded.records(), original.records());
        assert_eq!(
            reloaded.histogram().unwrap().occupancy,
            original.histogram().unwrap().occupancy
        );
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        save_histogram(&filled(), &path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let mut lines = contents.lines();
        assert_eq!(lines.next(), Some("# threshold=55.5"));
        assert_eq!(
            lines.next(),
            Some("file_id,signal,atom_present,max_count,centroid_x,centroid_y,background_mean,background_std")
        );
        assert!(lines.next().unwrap().starts_with("40,10.0,false,"));
        assert!(lines.nth(2).unwrap().starts_with("43,98.25,true,"));
    }

    #[test]
    fn test_pinned_threshold_is_kept_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.csv");
        save_histogram(&filled(), &path).unwrap();

        let mut reloaded = SignalHistogram::default();
        reloaded.pin_threshold(20.0);
        load_histogram(&mut reloaded, &path).unwrap();
        assert_eq!(reloaded.threshold(), 20.0);
    }

    #[test]
    fn test_missing_threshold_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "file_id,signal\n1,2.0\n").unwrap();
        let mut hist = SignalHistogram::default();
        assert!(matches!(
            load_histogram(&mut hist, &path),
            Err(ExportError::MissingThreshold(_))
        ));
    }

    #[test]
    fn test_bad_row_leaves_histogram_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad_row.csv");
        std::fs::write(
            &path,
            "# threshold=55.5\n\
             file_id,signal,atom_present,max_count,centroid_x,centroid_y,background_mean,background_std\n\
             40,10.0,false,3.0,4,7,0.1,0.3\n\
             41,98.0,true,30.0,4,7,0.1,0.3\n\
             42,notanumber,false,3.0,4,7,0.1,0.3\n",
        )
        .unwrap();

        let mut hist = SignalHistogram::default();
        hist.append(record("1", 3.0));
        hist.append(record("2", 4.0));
        assert!(matches!(
            load_histogram(&mut hist, &path),
            Err(ExportError::CsvError(_))
        ));
        assert_eq!(hist.len(), 2);
        assert_eq!(hist.threshold(), 1.0);
    }
}
