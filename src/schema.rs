//! Database schema management and compatibility checking for `fitsync`.
//!
//! Two jobs live here:
//! - startup DDL: create the `activities` table and its indexes if absent,
//!   applied once from `main.rs` (idempotent);
//! - the schema compatibility checker the loader runs before every batch
//!   write, comparing the batch's static column metadata against the live
//!   table's `information_schema` types.
//!
//! The checker itself is a pure function over two column maps so it can be
//! tested without a database.

use std::collections::HashMap;

use anyhow::Result;
use sqlx::{PgPool, Row};

use crate::error::Mismatch;
use crate::models::{ColumnDef, ColumnKind};

// ---

/// Create or update the database schema (idempotent).
///
/// Creates the `activities` table with its composite primary key
/// `(athlete_id, activity_id)`. Safe to call on every startup; no-op if the
/// objects already exist.
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &PgPool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    // Target table for normalized activities; the composite primary key is
    // what makes concurrent duplicate inserts impossible.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS activities (
            athlete_id        BIGINT  NOT NULL,
            activity_id       BIGINT  NOT NULL,
            name              TEXT    NOT NULL,
            distance          DOUBLE PRECISION NOT NULL,
            moving_time       DOUBLE PRECISION NOT NULL,
            elapsed_time      DOUBLE PRECISION NOT NULL,
            sport             TEXT,
            date              DATE,
            average_speed     DOUBLE PRECISION NOT NULL,
            max_speed         DOUBLE PRECISION NOT NULL,
            average_cadence   DOUBLE PRECISION NOT NULL,
            calories          BIGINT  NOT NULL,
            has_heartrate     BOOLEAN NOT NULL,
            average_heartrate DOUBLE PRECISION NOT NULL,
            max_heartrate     DOUBLE PRECISION NOT NULL,
            elev_high         DOUBLE PRECISION NOT NULL,
            elev_low          DOUBLE PRECISION NOT NULL,
            pace              TEXT    NOT NULL,
            PRIMARY KEY (athlete_id, activity_id)
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    // Index for date-range dashboard queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_activities_date
            ON activities (date);
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

// ---

/// Outcome of a compatibility check.
#[derive(Debug, Clone)]
pub struct SchemaReport {
    /// True when every shared column is compatible (after coercion).
    pub compatible: bool,
    /// One entry per incompatible column, observed vs expected.
    pub mismatches: Vec<Mismatch>,
    /// Float batch columns that must be rounded and cast to integer to fit
    /// an integer-typed target column. The one allowed auto-coercion.
    pub coerce_to_int: Vec<&'static str>,
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::BigInt => "integer",
        ColumnKind::Float => "float",
        ColumnKind::Bool => "boolean",
        ColumnKind::Text => "text",
        ColumnKind::Date => "date",
    }
}

fn is_integer_type(pg_type: &str) -> bool {
    matches!(pg_type, "smallint" | "integer" | "bigint")
}

/// Allowed target column types for each batch column kind.
fn is_compatible(kind: ColumnKind, pg_type: &str) -> bool {
    match kind {
        ColumnKind::Float => matches!(pg_type, "real" | "double precision" | "numeric"),
        ColumnKind::BigInt => is_integer_type(pg_type),
        ColumnKind::Bool => pg_type == "boolean",
        ColumnKind::Text => matches!(pg_type, "text" | "character varying" | "varchar"),
        ColumnKind::Date => matches!(
            pg_type,
            "date" | "timestamp" | "timestamp without time zone" | "timestamp with time zone"
        ),
    }
}

/// Check a batch's column metadata against a target table's column types.
///
/// `target` is `None` when the table does not exist; the batch is then
/// trivially compatible and the caller creates the table. Only columns
/// present on both sides are checked. A float batch column over an integer
/// target column is recorded for coercion and counts as compatible; every
/// other mismatch is reported, not corrected.
pub fn check_columns(
    batch: &[ColumnDef],
    target: Option<&HashMap<String, String>>,
) -> SchemaReport {
    // ---
    let Some(target) = target else {
        return SchemaReport {
            compatible: true,
            mismatches: Vec::new(),
            coerce_to_int: Vec::new(),
        };
    };

    let mut mismatches = Vec::new();
    let mut coerce_to_int = Vec::new();

    for def in batch {
        let Some(pg_type) = target.get(def.name) else {
            continue;
        };
        let pg_type = pg_type.to_lowercase();

        if def.kind == ColumnKind::Float && is_integer_type(&pg_type) {
            coerce_to_int.push(def.name);
            continue;
        }

        if !is_compatible(def.kind, &pg_type) {
            mismatches.push(Mismatch {
                column: def.name.to_string(),
                reason: format!("{} vs {}", kind_name(def.kind), pg_type),
            });
        }
    }

    SchemaReport {
        compatible: mismatches.is_empty(),
        mismatches,
        coerce_to_int,
    }
}

/// Read the target table's column types from `information_schema`.
///
/// Returns `None` when the table does not exist.
pub async fn fetch_table_columns(
    pool: &PgPool,
    table: &str,
) -> Result<Option<HashMap<String, String>>, sqlx::Error> {
    // ---
    let rows = sqlx::query(
        r#"
        SELECT column_name, data_type
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        "#,
    )
    .bind(table)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = HashMap::with_capacity(rows.len());
    for row in rows {
        let name: String = row.try_get("column_name")?;
        let data_type: String = row.try_get("data_type")?;
        columns.insert(name, data_type.to_lowercase());
    }
    Ok(Some(columns))
}

/// SQL type used when creating a table from batch metadata.
fn pg_type_for(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::BigInt => "BIGINT",
        ColumnKind::Float => "DOUBLE PRECISION",
        ColumnKind::Bool => "BOOLEAN",
        ColumnKind::Text => "TEXT",
        ColumnKind::Date => "DATE",
    }
}

/// Create a target table from batch column metadata (first-write inference).
///
/// Key columns, when given, become the primary key and are forced NOT NULL.
pub async fn create_table_from(
    pool: &PgPool,
    table: &str,
    columns: &[ColumnDef],
    composite_key: Option<&[&str]>,
) -> Result<(), sqlx::Error> {
    // ---
    let key_cols = composite_key.unwrap_or(&[]);
    let mut parts: Vec<String> = columns
        .iter()
        .map(|c| {
            let not_null = if key_cols.contains(&c.name) { " NOT NULL" } else { "" };
            format!("{} {}{}", c.name, pg_type_for(c.kind), not_null)
        })
        .collect();

    if !key_cols.is_empty() {
        parts.push(format!("PRIMARY KEY ({})", key_cols.join(", ")));
    }

    let ddl = format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        table,
        parts.join(", ")
    );
    sqlx::query(&ddl).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use crate::models::COLUMNS;

    fn canonical_target() -> HashMap<String, String> {
        // ---
        let mut t = HashMap::new();
        for def in COLUMNS {
            let pg = match def.kind {
                ColumnKind::BigInt => "bigint",
                ColumnKind::Float => "double precision",
                ColumnKind::Bool => "boolean",
                ColumnKind::Text => "text",
                ColumnKind::Date => "date",
            };
            t.insert(def.name.to_string(), pg.to_string());
        }
        t
    }

    #[test]
    fn missing_table_is_compatible() {
        // ---
        let report = check_columns(COLUMNS, None);
        assert!(report.compatible);
        assert!(report.mismatches.is_empty());
        assert!(report.coerce_to_int.is_empty());
    }

    #[test]
    fn canonical_schema_is_compatible() {
        // ---
        let target = canonical_target();
        let report = check_columns(COLUMNS, Some(&target));
        assert!(report.compatible, "mismatches: {:?}", report.mismatches);
        assert!(report.coerce_to_int.is_empty());
    }

    #[test]
    fn float_over_integer_column_is_coerced_not_rejected() {
        // ---
        let mut target = canonical_target();
        target.insert("distance".to_string(), "integer".to_string());

        let report = check_columns(COLUMNS, Some(&target));
        assert!(report.compatible);
        assert_eq!(report.coerce_to_int, vec!["distance"]);
    }

    #[test]
    fn text_over_integer_column_is_reported() {
        // ---
        let mut target = canonical_target();
        target.insert("pace".to_string(), "integer".to_string());

        let report = check_columns(COLUMNS, Some(&target));
        assert!(!report.compatible);
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(report.mismatches[0].column, "pace");
        assert_eq!(report.mismatches[0].reason, "text vs integer");
    }

    #[test]
    fn every_mismatch_is_listed() {
        // ---
        let mut target = canonical_target();
        target.insert("pace".to_string(), "integer".to_string());
        target.insert("has_heartrate".to_string(), "text".to_string());
        target.insert("date".to_string(), "boolean".to_string());

        let report = check_columns(COLUMNS, Some(&target));
        assert!(!report.compatible);

        let names: Vec<_> = report.mismatches.iter().map(|m| m.column.as_str()).collect();
        assert!(names.contains(&"pace"));
        assert!(names.contains(&"has_heartrate"));
        assert!(names.contains(&"date"));
    }

    #[test]
    fn columns_absent_from_target_are_ignored() {
        // ---
        // Only a subset of columns exists on the target; nothing to check for
        // the rest.
        let mut target = HashMap::new();
        target.insert("activity_id".to_string(), "bigint".to_string());

        let report = check_columns(COLUMNS, Some(&target));
        assert!(report.compatible);
    }

    #[test]
    fn timestamp_columns_accept_dates() {
        // ---
        let mut target = canonical_target();
        target.insert("date".to_string(), "timestamp without time zone".to_string());

        let report = check_columns(COLUMNS, Some(&target));
        assert!(report.compatible, "mismatches: {:?}", report.mismatches);
    }
}
