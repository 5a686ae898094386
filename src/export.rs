//! CSV export of normalized activity batches.
//!
//! Side output of the batch pipeline for local inspection. Nullable fields
//! render as empty cells, dates as `YYYY-MM-DD`.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::NormalizedActivity;

// ---

/// Serialize a batch as CSV with a header row.
pub fn write_csv<W: Write>(records: &[NormalizedActivity], writer: W) -> Result<()> {
    // ---
    let mut csv_writer = csv::Writer::from_writer(writer);
    for record in records {
        csv_writer
            .serialize(record)
            .context("failed to serialize activity record to CSV")?;
    }
    csv_writer.flush().context("failed to flush CSV output")?;
    Ok(())
}

/// Write a batch to a CSV file at `path`.
pub fn save_to_csv(records: &[NormalizedActivity], path: &Path) -> Result<()> {
    // ---
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    write_csv(records, file)
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> NormalizedActivity {
        // ---
        NormalizedActivity {
            athlete_id: Some(12345),
            activity_id: 1001,
            name: "Morning Run".into(),
            distance: 5.0,
            moving_time: 25.0,
            elapsed_time: 26.67,
            sport: Some("Run".into()),
            date: NaiveDate::from_ymd_opt(2023, 5, 15),
            average_speed: 3.33,
            max_speed: 5.5,
            average_cadence: 85.57,
            calories: 120,
            has_heartrate: true,
            average_heartrate: 145.7,
            max_heartrate: 180.2,
            elev_high: 100.57,
            elev_low: 50.23,
            pace: "5:00/km".into(),
        }
    }

    #[test]
    fn csv_has_header_and_one_row_per_record() {
        // ---
        let mut out = Vec::new();
        write_csv(&[sample()], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("athlete_id,activity_id,name"));
        assert!(lines[1].contains("Morning Run"));
        assert!(lines[1].contains("2023-05-15"));
        assert!(lines[1].contains("5:00/km"));
    }

    #[test]
    fn nullable_fields_render_as_empty_cells() {
        // ---
        let mut record = sample();
        record.athlete_id = None;
        record.sport = None;
        record.date = None;

        let mut out = Vec::new();
        write_csv(&[record], &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let row = text.lines().nth(1).unwrap();
        assert!(row.starts_with(",1001,Morning Run"));
    }
}
