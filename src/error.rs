//! Typed errors for the core transform and load stages.
//!
//! The application boundary (`main.rs`, config, startup DDL) stays on
//! `anyhow`; these enums exist so the pipeline stages can return results a
//! caller can match on without string inspection. A load aborted by a schema
//! mismatch is fatal to that call only, never to the process.

use thiserror::Error;

// ---

/// A batch column and the reason it failed the compatibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub column: String,
    /// Observed vs expected, e.g. `"text vs integer"`.
    pub reason: String,
}

impl std::fmt::Display for Mismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.column, self.reason)
    }
}

/// Errors from the transform stage.
///
/// Per-record extraction failures degrade to null and are not errors; this
/// only fires when a column required by later steps is structurally absent
/// from the whole batch, so extraction could not even be attempted.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("column `{0}` is absent from every record in the batch")]
    MissingColumn(&'static str),
}

/// Errors from the load stage.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("schema mismatch for columns: {}", format_mismatches(.0))]
    SchemaMismatch(Vec<Mismatch>),

    #[error("database error during load: {0}")]
    Store(#[from] sqlx::Error),
}

fn format_mismatches(mismatches: &[Mismatch]) -> String {
    mismatches
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn schema_mismatch_lists_every_column() {
        // ---
        let err = LoadError::SchemaMismatch(vec![
            Mismatch {
                column: "pace".into(),
                reason: "text vs integer".into(),
            },
            Mismatch {
                column: "date".into(),
                reason: "date vs boolean".into(),
            },
        ]);

        let msg = err.to_string();
        assert!(msg.contains("pace: text vs integer"), "got: {msg}");
        assert!(msg.contains("date: date vs boolean"), "got: {msg}");
    }
}
