//! Data models for the activity sync pipeline.
//!
//! `RawActivity` is a read-only serde view of one element of a Strava API
//! response; every field the API may omit or null is an `Option`.
//! `NormalizedActivity` is the fixed-schema output of the transform stage and
//! maps one-to-one onto the `activities` table.
//!
//! The `COLUMNS` metadata and the `ColumnValue` row projection give the
//! schema checker and loader a typed, per-column view of a batch without any
//! runtime inspection of JSON.

use std::hash::{Hash, Hasher};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ---

/// Nested athlete object inside a raw activity.
#[derive(Debug, Clone, Deserialize)]
pub struct RawAthlete {
    pub id: Option<i64>,
}

/// Raw activity record from the Strava API.
///
/// Fields absent from the payload deserialize to `None`; the transform stage
/// is responsible for turning those into concrete defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawActivity {
    // ---
    pub id: i64,
    pub athlete: Option<RawAthlete>,
    #[serde(default)]
    pub name: String,
    pub distance: Option<f64>,
    pub moving_time: Option<f64>,
    pub elapsed_time: Option<f64>,
    pub sport_type: Option<String>,
    #[serde(rename = "type")]
    pub activity_type: Option<String>,
    pub start_date_local: Option<String>,
    pub average_speed: Option<f64>,
    pub max_speed: Option<f64>,
    pub average_cadence: Option<f64>,
    pub kilojoules: Option<f64>,
    pub has_heartrate: Option<bool>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub elev_high: Option<f64>,
    pub elev_low: Option<f64>,
}

/// Normalized activity record, one row of the `activities` table.
///
/// Every numeric field that can be null at the source is a concrete zero
/// here; only `athlete_id`, `sport` and `date` stay nullable.
/// `(athlete_id, activity_id)` is the composite identity.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct NormalizedActivity {
    // ---
    pub athlete_id: Option<i64>,
    pub activity_id: i64,
    pub name: String,
    pub distance: f64,
    pub moving_time: f64,
    pub elapsed_time: f64,
    pub sport: Option<String>,
    pub date: Option<NaiveDate>,
    pub average_speed: f64,
    pub max_speed: f64,
    pub average_cadence: f64,
    pub calories: i64,
    pub has_heartrate: bool,
    pub average_heartrate: f64,
    pub max_heartrate: f64,
    pub elev_high: f64,
    pub elev_low: f64,
    pub pace: String,
}

/// Webhook push event as delivered by the Strava subscription API.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub object_type: String,
    pub aspect_type: String,
    pub object_id: i64,
    pub owner_id: Option<i64>,
}

// ---

/// Semantic type of one output column, used for schema compatibility checks
/// and for choosing the SQL bind type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    BigInt,
    Float,
    Bool,
    Text,
    Date,
}

/// Name and semantic type of one output column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnDef {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnDef {
    ColumnDef { name, kind }
}

/// Column metadata for `NormalizedActivity`, in table order.
pub const COLUMNS: &[ColumnDef] = &[
    col("athlete_id", ColumnKind::BigInt),
    col("activity_id", ColumnKind::BigInt),
    col("name", ColumnKind::Text),
    col("distance", ColumnKind::Float),
    col("moving_time", ColumnKind::Float),
    col("elapsed_time", ColumnKind::Float),
    col("sport", ColumnKind::Text),
    col("date", ColumnKind::Date),
    col("average_speed", ColumnKind::Float),
    col("max_speed", ColumnKind::Float),
    col("average_cadence", ColumnKind::Float),
    col("calories", ColumnKind::BigInt),
    col("has_heartrate", ColumnKind::Bool),
    col("average_heartrate", ColumnKind::Float),
    col("max_heartrate", ColumnKind::Float),
    col("elev_high", ColumnKind::Float),
    col("elev_low", ColumnKind::Float),
    col("pace", ColumnKind::Text),
];

/// One cell of a projected row.
///
/// Equality and hashing are total so composite keys can live in a `HashSet`;
/// floats compare by bit pattern, which is exact for values read back from
/// the same store.
#[derive(Debug, Clone)]
pub enum ColumnValue {
    BigInt(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Null,
}

impl PartialEq for ColumnValue {
    fn eq(&self, other: &Self) -> bool {
        use ColumnValue::*;
        match (self, other) {
            (BigInt(a), BigInt(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Bool(a), Bool(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Null, Null) => true,
            _ => false,
        }
    }
}

impl Eq for ColumnValue {}

impl Hash for ColumnValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use ColumnValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            BigInt(v) => v.hash(state),
            Float(v) => v.to_bits().hash(state),
            Bool(v) => v.hash(state),
            Text(v) => v.hash(state),
            Date(v) => v.hash(state),
            Null => {}
        }
    }
}

impl NormalizedActivity {
    /// Project one named column as a `ColumnValue`.
    ///
    /// Unknown names yield `Null` rather than panicking; the loader only asks
    /// for names taken from `COLUMNS` or a configured composite key.
    pub fn column_value(&self, name: &str) -> ColumnValue {
        // ---
        use ColumnValue::*;
        match name {
            "athlete_id" => self.athlete_id.map_or(Null, BigInt),
            "activity_id" => BigInt(self.activity_id),
            "name" => Text(self.name.clone()),
            "distance" => Float(self.distance),
            "moving_time" => Float(self.moving_time),
            "elapsed_time" => Float(self.elapsed_time),
            "sport" => self.sport.clone().map_or(Null, Text),
            "date" => self.date.map_or(Null, Date),
            "average_speed" => Float(self.average_speed),
            "max_speed" => Float(self.max_speed),
            "average_cadence" => Float(self.average_cadence),
            "calories" => BigInt(self.calories),
            "has_heartrate" => Bool(self.has_heartrate),
            "average_heartrate" => Float(self.average_heartrate),
            "max_heartrate" => Float(self.max_heartrate),
            "elev_high" => Float(self.elev_high),
            "elev_low" => Float(self.elev_low),
            "pace" => Text(self.pace.clone()),
            _ => Null,
        }
    }

    /// Project the whole record as a row in `COLUMNS` order.
    pub fn to_row(&self) -> Vec<ColumnValue> {
        COLUMNS
            .iter()
            .map(|c| self.column_value(c.name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn raw_activity_deserializes_with_missing_optionals() {
        // ---
        // Only `id` and a couple of fields present; everything else omitted.
        let json = r#"{"id": 42, "name": "Lunch Ride", "type": "Ride"}"#;
        let raw: RawActivity = serde_json::from_str(json).unwrap();

        assert_eq!(raw.id, 42);
        assert_eq!(raw.name, "Lunch Ride");
        assert_eq!(raw.activity_type.as_deref(), Some("Ride"));
        assert!(raw.athlete.is_none());
        assert!(raw.distance.is_none());
        assert!(raw.has_heartrate.is_none());
    }

    #[test]
    fn raw_activity_deserializes_explicit_nulls() {
        // ---
        let json = r#"{
            "id": 7,
            "name": "Swim",
            "athlete": {"id": null},
            "distance": null,
            "kilojoules": null
        }"#;
        let raw: RawActivity = serde_json::from_str(json).unwrap();

        assert!(raw.athlete.as_ref().unwrap().id.is_none());
        assert!(raw.distance.is_none());
        assert!(raw.kilojoules.is_none());
    }

    #[test]
    fn webhook_event_decodes_strava_payload() {
        // ---
        let json = r#"{
            "object_type": "activity",
            "aspect_type": "create",
            "object_id": 1001,
            "owner_id": 12345,
            "subscription_id": 99
        }"#;
        let event: WebhookEvent = serde_json::from_str(json).unwrap();

        assert_eq!(event.object_type, "activity");
        assert_eq!(event.aspect_type, "create");
        assert_eq!(event.object_id, 1001);
        assert_eq!(event.owner_id, Some(12345));
    }

    #[test]
    fn row_projection_matches_column_order() {
        // ---
        let rec = NormalizedActivity {
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
        };

        let row = rec.to_row();
        assert_eq!(row.len(), COLUMNS.len());
        assert_eq!(row[0], ColumnValue::BigInt(12345));
        assert_eq!(row[1], ColumnValue::BigInt(1001));
        assert_eq!(row[17], ColumnValue::Text("5:00/km".into()));
    }

    #[test]
    fn column_values_hash_as_composite_keys() {
        // ---
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        seen.insert(vec![ColumnValue::BigInt(1), ColumnValue::BigInt(100)]);

        assert!(seen.contains(&vec![ColumnValue::BigInt(1), ColumnValue::BigInt(100)]));
        assert!(!seen.contains(&vec![ColumnValue::BigInt(2), ColumnValue::BigInt(100)]));
        assert!(!seen.contains(&vec![ColumnValue::Null, ColumnValue::BigInt(100)]));
    }
}
