// JSON artifacts for one analyzed video and for a batch.
//
// serde_json writes non-finite floats as `null`, so a flicker with an
// infinite SNR shows up as `null` in `snr_data.json`.

use crate::core_modules::flicker::FlickerSummary;
use crate::core_modules::snr::SnrReport;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub const FLICKER_DATA_FILE: &str = "flicker_data.json";
pub const SNR_DATA_FILE: &str = "snr_data.json";
pub const BATCH_SUMMARY_FILE: &str = "average_snr_per_video.json";

/// One entry of `flicker_data.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlickerRecord {
    pub total_number_of_flickers: usize,
    #[serde(flatten)]
    pub summary: FlickerSummary,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

pub fn write_flicker_data(path: &Path, summaries: &[FlickerSummary]) -> Result<()> {
    let records: Vec<FlickerRecord> = summaries
        .iter()
        .map(|summary| FlickerRecord {
            total_number_of_flickers: summaries.len(),
            summary: summary.clone(),
        })
        .collect();
    write_json(path, &records)
}

pub fn write_snr_data(path: &Path, report: &SnrReport) -> Result<()> {
    write_json(path, report)
}

/// Writes `{video_name: average_snr}` for every video that produced flickers.
pub fn write_batch_summary(path: &Path, averages: &BTreeMap<String, f64>) -> Result<()> {
    write_json(path, averages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::blob::Point;

    fn summary(id: u64) -> FlickerSummary {
        FlickerSummary {
            flicker_id: id,
            duration: 5,
            location: Point::new(12, 30),
            area: 36,
            average_intensity: 180.5,
        }
    }

    #[test]
    fn flicker_records_are_flat_and_counted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(FLICKER_DATA_FILE);
        write_flicker_data(&path, &[summary(1), summary(4)]).unwrap();

        let json: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        let records = json.as_array().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["flicker_id"], 4);
        assert_eq!(records[1]["total_number_of_flickers"], 2);
        assert_eq!(records[0]["location"], serde_json::json!([12, 30]));
        assert_eq!(records[0]["area"], 36);
    }

    #[test]
    fn infinite_snr_is_written_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SNR_DATA_FILE);
        let report = SnrReport {
            individual_snr: vec![2.5, f64::INFINITY],
            average_snr: f64::INFINITY,
        };
        write_snr_data(&path, &report).unwrap();

        let json: serde_json::Value = serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "individual_snr": [2.5, null] }));
    }

    #[cfg(unix)]
    #[test]
    fn full_disk_is_reported() {
        let full = Path::new("/dev/full");
        let report = SnrReport {
            individual_snr: vec![1.0; 8],
            average_snr: 1.0,
        };
        assert!(write_snr_data(full, &report).is_err());
        assert!(write_flicker_data(full, &[summary(1)]).is_err());
        assert!(write_batch_summary(full, &BTreeMap::from([("a.tif".to_string(), 2.0)])).is_err());
    }
}
