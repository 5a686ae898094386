//! Deduplicating loader for normalized activity batches.
//!
//! One-shot per call: check schema compatibility, apply the checker's
//! float-to-integer coercions, drop rows whose composite key already exists
//! in the target table (an anti-join done in process over a hash set of
//! existing keys), then append the remainder in chunks. Rows with an existing
//! key are silently skipped — insert-missing-only, never an upsert.
//!
//! Also home to the single-record operations the webhook path uses.

use std::collections::HashSet;

use sqlx::query_builder::Separated;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{info, warn};

use crate::error::LoadError;
use crate::models::{ColumnKind, ColumnValue, NormalizedActivity, COLUMNS};
use crate::schema;

/// Default target table and its composite key.
pub const ACTIVITIES_TABLE: &str = "activities";
pub const ACTIVITIES_KEY: &[&str] = &["athlete_id", "activity_id"];

/// Rows per multi-row INSERT statement. Not observable to callers.
const INSERT_CHUNK_SIZE: usize = 1000;

// ---

/// Load a batch into `table`, writing only rows whose composite key is not
/// already present. Returns the number of rows actually written; zero is a
/// valid success outcome. With no composite key every row is treated as new.
///
/// Aborts with `LoadError::SchemaMismatch` when the checker finds an
/// incompatible column; the table itself is created from the batch's column
/// metadata when absent.
pub async fn load(
    pool: &PgPool,
    batch: &[NormalizedActivity],
    table: &str,
    composite_key: Option<&[&str]>,
) -> Result<u64, LoadError> {
    // ---
    if batch.is_empty() {
        info!("empty batch, nothing to load into {}", table);
        return Ok(0);
    }

    let target = schema::fetch_table_columns(pool, table).await?;
    if target.is_none() {
        info!("table {} does not exist, creating from batch schema", table);
        schema::create_table_from(pool, table, COLUMNS, composite_key).await?;
    }

    let report = schema::check_columns(COLUMNS, target.as_ref());
    if !report.compatible {
        return Err(LoadError::SchemaMismatch(report.mismatches));
    }

    let mut rows: Vec<Vec<ColumnValue>> = batch.iter().map(NormalizedActivity::to_row).collect();
    apply_coercions(&mut rows, &report.coerce_to_int);

    let rows = match composite_key {
        Some(key) if target.is_some() => match key_indexes(key) {
            Some(key_idx) => {
                let existing =
                    fetch_existing_keys(pool, table, key, &report.coerce_to_int).await?;
                filter_new_rows(rows, &key_idx, &existing)
            }
            None => {
                warn!(
                    "composite key {:?} references unknown columns, treating all rows as new",
                    key
                );
                rows
            }
        },
        _ => rows,
    };

    if rows.is_empty() {
        info!("no new records to insert into {}", table);
        return Ok(0);
    }

    let mut written = 0u64;
    for chunk in rows.chunks(INSERT_CHUNK_SIZE) {
        written += insert_chunk(pool, table, chunk).await?;
    }

    info!("loaded {} rows into {}", written, table);
    Ok(written)
}

/// Positions of the key columns within `COLUMNS`, or `None` if any key
/// column is not part of the output schema.
fn key_indexes(key: &[&str]) -> Option<Vec<usize>> {
    key.iter()
        .map(|k| COLUMNS.iter().position(|c| c.name == *k))
        .collect()
}

/// Round-and-cast float cells to integers for the columns the schema checker
/// flagged. Applied to the whole batch before the existence diff so key
/// comparisons see the values that will actually be written.
fn apply_coercions(rows: &mut [Vec<ColumnValue>], coerce_to_int: &[&'static str]) {
    // ---
    let idx: Vec<usize> = coerce_to_int
        .iter()
        .filter_map(|c| COLUMNS.iter().position(|d| d.name == *c))
        .collect();

    for row in rows.iter_mut() {
        for &i in &idx {
            if let ColumnValue::Float(v) = row[i] {
                row[i] = ColumnValue::BigInt(v.round_ties_even() as i64);
            }
        }
    }
}

/// Keep only rows whose key tuple is absent from `existing`.
///
/// A key containing NULL never equals anything in SQL, so such rows are
/// always new.
fn filter_new_rows(
    rows: Vec<Vec<ColumnValue>>,
    key_idx: &[usize],
    existing: &HashSet<Vec<ColumnValue>>,
) -> Vec<Vec<ColumnValue>> {
    // ---
    rows.into_iter()
        .filter(|row| {
            let key: Vec<ColumnValue> = key_idx.iter().map(|&i| row[i].clone()).collect();
            if key.iter().any(|v| matches!(v, ColumnValue::Null)) {
                return true;
            }
            !existing.contains(&key)
        })
        .collect()
}

/// Fetch every composite key currently in the target table.
async fn fetch_existing_keys(
    pool: &PgPool,
    table: &str,
    key: &[&str],
    coerced: &[&'static str],
) -> Result<HashSet<Vec<ColumnValue>>, sqlx::Error> {
    // ---
    let sql = format!("SELECT {} FROM {}", key.join(", "), table);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    // Decode each key column by its batch kind; a column the checker coerced
    // is integer-typed at the store regardless of its batch kind.
    let kinds: Vec<ColumnKind> = key
        .iter()
        .map(|k| {
            if coerced.iter().any(|c| c == k) {
                return ColumnKind::BigInt;
            }
            COLUMNS
                .iter()
                .find(|c| c.name == *k)
                .map(|c| c.kind)
                .unwrap_or(ColumnKind::BigInt)
        })
        .collect();

    let mut existing = HashSet::with_capacity(rows.len());
    for row in rows {
        let mut tuple = Vec::with_capacity(kinds.len());
        for (i, kind) in kinds.iter().enumerate() {
            let value = match kind {
                ColumnKind::BigInt => row
                    .try_get::<Option<i64>, _>(i)?
                    .map_or(ColumnValue::Null, ColumnValue::BigInt),
                ColumnKind::Float => row
                    .try_get::<Option<f64>, _>(i)?
                    .map_or(ColumnValue::Null, ColumnValue::Float),
                ColumnKind::Bool => row
                    .try_get::<Option<bool>, _>(i)?
                    .map_or(ColumnValue::Null, ColumnValue::Bool),
                ColumnKind::Text => row
                    .try_get::<Option<String>, _>(i)?
                    .map_or(ColumnValue::Null, ColumnValue::Text),
                ColumnKind::Date => row
                    .try_get::<Option<chrono::NaiveDate>, _>(i)?
                    .map_or(ColumnValue::Null, ColumnValue::Date),
            };
            tuple.push(value);
        }
        existing.insert(tuple);
    }
    Ok(existing)
}

fn push_value<'qb, 'args>(
    b: &mut Separated<'qb, 'args, Postgres, &'static str>,
    value: &ColumnValue,
    kind: ColumnKind,
) {
    // ---
    match value {
        ColumnValue::BigInt(v) => {
            b.push_bind(*v);
        }
        ColumnValue::Float(v) => {
            b.push_bind(*v);
        }
        ColumnValue::Bool(v) => {
            b.push_bind(*v);
        }
        ColumnValue::Text(v) => {
            b.push_bind(v.clone());
        }
        ColumnValue::Date(v) => {
            b.push_bind(*v);
        }
        ColumnValue::Null => match kind {
            ColumnKind::BigInt => {
                b.push_bind(None::<i64>);
            }
            ColumnKind::Float => {
                b.push_bind(None::<f64>);
            }
            ColumnKind::Bool => {
                b.push_bind(None::<bool>);
            }
            ColumnKind::Text => {
                b.push_bind(None::<String>);
            }
            ColumnKind::Date => {
                b.push_bind(None::<chrono::NaiveDate>);
            }
        },
    }
}

async fn insert_chunk(
    pool: &PgPool,
    table: &str,
    rows: &[Vec<ColumnValue>],
) -> Result<u64, sqlx::Error> {
    // ---
    let col_names: Vec<&str> = COLUMNS.iter().map(|c| c.name).collect();
    let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
        "INSERT INTO {} ({}) ",
        table,
        col_names.join(", ")
    ));

    builder.push_values(rows, |mut b, row| {
        for (value, def) in row.iter().zip(COLUMNS) {
            push_value(&mut b, value, def.kind);
        }
    });
    // The constraint, not the pre-diff, is what makes a concurrent duplicate
    // insert safe; rows_affected reflects what actually landed.
    builder.push(" ON CONFLICT DO NOTHING");

    let result = builder.build().execute(pool).await?;
    Ok(result.rows_affected())
}

// ---
// Single-record operations for the webhook-driven path.

/// True when a row with this `activity_id` already exists.
pub async fn activity_exists(pool: &PgPool, activity_id: i64) -> Result<bool, sqlx::Error> {
    // ---
    let row = sqlx::query("SELECT 1 FROM activities WHERE activity_id = $1 LIMIT 1")
        .bind(activity_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Insert one activity if absent. Returns `true` when the row was written,
/// `false` when the key already existed (including an insert race lost to a
/// concurrent request — the unique constraint resolves it, we just skip).
pub async fn insert_activity(
    pool: &PgPool,
    rec: &NormalizedActivity,
) -> Result<bool, sqlx::Error> {
    // ---
    let result = sqlx::query(
        r#"
        INSERT INTO activities (
            athlete_id, activity_id, name, distance, moving_time, elapsed_time,
            sport, date, average_speed, max_speed, average_cadence, calories,
            has_heartrate, average_heartrate, max_heartrate, elev_high, elev_low, pace
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
        ON CONFLICT DO NOTHING
        "#,
    )
    .bind(rec.athlete_id)
    .bind(rec.activity_id)
    .bind(&rec.name)
    .bind(rec.distance)
    .bind(rec.moving_time)
    .bind(rec.elapsed_time)
    .bind(&rec.sport)
    .bind(rec.date)
    .bind(rec.average_speed)
    .bind(rec.max_speed)
    .bind(rec.average_cadence)
    .bind(rec.calories)
    .bind(rec.has_heartrate)
    .bind(rec.average_heartrate)
    .bind(rec.max_heartrate)
    .bind(rec.elev_high)
    .bind(rec.elev_low)
    .bind(&rec.pace)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Unconditional update by `activity_id`. Returns the affected row count;
/// zero is the caller's non-fatal warning, not an error.
pub async fn update_activity(
    pool: &PgPool,
    rec: &NormalizedActivity,
) -> Result<u64, sqlx::Error> {
    // ---
    let result = sqlx::query(
        r#"
        UPDATE activities SET
            athlete_id = $1, name = $2, distance = $3, moving_time = $4,
            elapsed_time = $5, sport = $6, date = $7, average_speed = $8,
            max_speed = $9, average_cadence = $10, calories = $11,
            has_heartrate = $12, average_heartrate = $13, max_heartrate = $14,
            elev_high = $15, elev_low = $16, pace = $17
        WHERE activity_id = $18
        "#,
    )
    .bind(rec.athlete_id)
    .bind(&rec.name)
    .bind(rec.distance)
    .bind(rec.moving_time)
    .bind(rec.elapsed_time)
    .bind(&rec.sport)
    .bind(rec.date)
    .bind(rec.average_speed)
    .bind(rec.max_speed)
    .bind(rec.average_cadence)
    .bind(rec.calories)
    .bind(rec.has_heartrate)
    .bind(rec.average_heartrate)
    .bind(rec.max_heartrate)
    .bind(rec.elev_high)
    .bind(rec.elev_low)
    .bind(&rec.pace)
    .bind(rec.activity_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Delete by `activity_id`. Zero affected rows follows the same non-fatal
/// policy as updates.
pub async fn delete_activity(pool: &PgPool, activity_id: i64) -> Result<u64, sqlx::Error> {
    // ---
    let result = sqlx::query("DELETE FROM activities WHERE activity_id = $1")
        .bind(activity_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
