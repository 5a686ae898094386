//! Unit and field transformer for raw activity records.
//!
//! Pure functions, no I/O: one `RawActivity` in, one `NormalizedActivity`
//! out. Null handling follows a single rule — every numeric field that can be
//! null at the source becomes a concrete zero in the output, and the set of
//! fields that were defaulted is logged at `debug` level per record.
//!
//! All rounding here is round-half-to-even (`f64::round_ties_even`), the same
//! tie-breaking rule the upstream data uses. This matters for values like
//! `119.5` kilocalories, which round to `120`, not `119`.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::debug;

use crate::error::TransformError;
use crate::models::{NormalizedActivity, RawActivity};

/// Timestamp layout of `start_date_local` in API responses.
const START_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Kilocalories per kilojoule.
const KCAL_PER_KJ: f64 = 0.239;

// ---

/// Round to `dp` decimal places with half-to-even tie breaking.
fn round_dp(value: f64, dp: u32) -> f64 {
    let factor = 10f64.powi(dp as i32);
    (value * factor).round_ties_even() / factor
}

/// Take an optional metric, recording its name when it has to be defaulted.
fn or_zero(value: Option<f64>, name: &'static str, defaulted: &mut Vec<&'static str>) -> f64 {
    match value {
        Some(v) => v,
        None => {
            defaulted.push(name);
            0.0
        }
    }
}

/// Format a speed in m/s as a `minutes:seconds/km` pace string.
///
/// Returns `"N/A"` for null, zero, negative, or non-finite input — the
/// formatter never fails, it degrades. Seconds that round up to 60 roll over
/// into the minute.
pub fn format_pace(speed_m_per_s: Option<f64>) -> String {
    // ---
    let speed = match speed_m_per_s {
        Some(s) if s > 0.0 && s.is_finite() => s,
        _ => return "N/A".to_string(),
    };

    let speed_km_per_min = speed * 60.0 / 1000.0;
    let minutes_per_km = 1.0 / speed_km_per_min;

    let mut minutes = minutes_per_km.trunc() as i64;
    let mut seconds = ((minutes_per_km - minutes as f64) * 60.0).round_ties_even() as i64;

    if seconds == 60 {
        minutes += 1;
        seconds = 0;
    }

    format!("{minutes}:{seconds:02}/km")
}

/// Parse `start_date_local` and keep only the calendar date (UTC).
///
/// Non-strict: a missing or malformed timestamp yields `None` rather than an
/// error.
fn parse_date(start_date_local: Option<&str>) -> Option<NaiveDate> {
    start_date_local
        .and_then(|s| NaiveDateTime::parse_from_str(s, START_DATE_FORMAT).ok())
        .map(|dt| dt.date())
}

/// Normalize one raw activity record.
fn normalize(raw: &RawActivity) -> NormalizedActivity {
    // ---
    let mut defaulted: Vec<&'static str> = Vec::new();

    let athlete_id = raw.athlete.as_ref().and_then(|a| a.id);

    let distance = round_dp(or_zero(raw.distance, "distance", &mut defaulted) / 1000.0, 2);
    let moving_time = round_dp(or_zero(raw.moving_time, "moving_time", &mut defaulted) / 60.0, 2);
    let elapsed_time =
        round_dp(or_zero(raw.elapsed_time, "elapsed_time", &mut defaulted) / 60.0, 2);

    let average_speed = round_dp(or_zero(raw.average_speed, "average_speed", &mut defaulted), 2);
    let max_speed = round_dp(or_zero(raw.max_speed, "max_speed", &mut defaulted), 2);
    let average_cadence =
        round_dp(or_zero(raw.average_cadence, "average_cadence", &mut defaulted), 2);

    let kilojoules = or_zero(raw.kilojoules, "kilojoules", &mut defaulted);
    let calories = (kilojoules * KCAL_PER_KJ).round_ties_even() as i64;

    let has_heartrate = match raw.has_heartrate {
        Some(v) => v,
        None => {
            defaulted.push("has_heartrate");
            false
        }
    };
    let average_heartrate =
        round_dp(or_zero(raw.average_heartrate, "average_heartrate", &mut defaulted), 1);
    let max_heartrate =
        round_dp(or_zero(raw.max_heartrate, "max_heartrate", &mut defaulted), 1);

    let elev_high = round_dp(or_zero(raw.elev_high, "elev_high", &mut defaulted), 2);
    let elev_low = round_dp(or_zero(raw.elev_low, "elev_low", &mut defaulted), 2);

    // First non-null of sport_type, type.
    let sport = raw.sport_type.clone().or_else(|| raw.activity_type.clone());

    // Pace is derived from the already-rounded average speed so the stored
    // speed and the stored pace always agree.
    let pace = format_pace(Some(average_speed));

    if !defaulted.is_empty() {
        debug!(
            activity_id = raw.id,
            "defaulted null fields to zero: {}",
            defaulted.join(", ")
        );
    }

    NormalizedActivity {
        athlete_id,
        activity_id: raw.id,
        name: raw.name.clone(),
        distance,
        moving_time,
        elapsed_time,
        sport,
        date: parse_date(raw.start_date_local.as_deref()),
        average_speed,
        max_speed,
        average_cadence,
        calories,
        has_heartrate,
        average_heartrate,
        max_heartrate,
        elev_high,
        elev_low,
        pace,
    }
}

/// Transform a batch of raw activities into normalized records.
///
/// Total over well-formed input: per-record missing optionals degrade to
/// defaults and never error. The one fail-fast case is a column required by
/// later steps being structurally absent from every record — `athlete`
/// missing from the whole batch means athlete_id extraction could not even
/// be attempted, and the load step's composite key would be meaningless.
pub fn transform(batch: &[RawActivity]) -> Result<Vec<NormalizedActivity>, TransformError> {
    // ---
    if !batch.is_empty() && batch.iter().all(|r| r.athlete.is_none()) {
        return Err(TransformError::MissingColumn("athlete"));
    }

    Ok(batch.iter().map(normalize).collect())
}
