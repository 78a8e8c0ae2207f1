use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use polars::prelude::*;
use tracing::{debug, warn};

use crate::aggregation::{absolute_counts, normalized_percentages, total_counts};
use crate::error::ChargeError;
use crate::normalize::{prepare_sessions, require_columns, NormalizeReport, TimeBucket};
use crate::palette::{assign_colors, distinct_first_seen};
use crate::rollup::{grouped_column_name, rollup_top_n};
use crate::schema::session;

/// Optional top-N rollup over the pipeline's category column.
#[derive(Debug, Clone, Copy)]
pub struct RollupConfig {
    pub top_n: usize,
}

/// One run of the unified pipeline. The three historical dashboard variants
/// differ only in these knobs: bucket granularity, category column, and
/// whether a rollup stage runs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bucket: TimeBucket,
    pub category: String,
    pub rollup: Option<RollupConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bucket: TimeBucket::Month,
            category: session::CAR.to_string(),
            rollup: None,
        }
    }
}

/// The aggregate tables handed to the rendering layer: totals for the
/// pie view, counts and shares for the stacked bars, plus the color map.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub totals: DataFrame,
    pub counts: DataFrame,
    pub shares: DataFrame,
    pub colors: Vec<(String, String)>,
}

/// Per-upload analysis model.
///
/// Holds the prepared session table for the current upload and a parse
/// cache keyed by file content hash. The cache memoizes only the
/// read-and-parse step; normalization always runs fresh and is pure, so a
/// cache hit never changes observable results.
pub struct SessionModel {
    base_path: PathBuf,
    sessions: Option<DataFrame>,
    report: Option<NormalizeReport>,
    parse_cache: HashMap<blake3::Hash, DataFrame>,
}

impl SessionModel {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            sessions: None,
            report: None,
            parse_cache: HashMap::new(),
        }
    }

    // ── Data loading ────────────────────────────────────────────────────────

    /// Load a session CSV, normalize types, and derive the time buckets.
    ///
    /// Replaces any previously loaded table. Fails only on IO problems or
    /// a missing required column; malformed cells and rows are absorbed
    /// into the [`NormalizeReport`].
    pub fn load_sessions(&mut self, filename: &str) -> Result<DataFrame, ChargeError> {
        let raw = self.read_table_cached(filename)?;
        let (prepared, report) = prepare_sessions(raw)?;

        if report.rows_dropped > 0 {
            warn!(
                rows_dropped = report.rows_dropped,
                "dropped sessions without a valid end time"
            );
        }
        if report.cells_coerced > 0 {
            warn!(
                cells_coerced = report.cells_coerced,
                "cells failed type coercion and became null"
            );
        }
        debug!(
            rows_in = report.rows_in,
            rows_kept = report.rows_kept,
            "prepared session table"
        );

        self.sessions = Some(prepared.clone());
        self.report = Some(report);
        Ok(prepared)
    }

    // ── Accessors ───────────────────────────────────────────────────────────

    pub fn sessions_df(&self) -> Result<&DataFrame, ChargeError> {
        self.sessions
            .as_ref()
            .ok_or_else(|| ChargeError::NotLoaded("sessions".into()))
    }

    pub fn report(&self) -> Result<NormalizeReport, ChargeError> {
        self.report
            .ok_or_else(|| ChargeError::NotLoaded("sessions".into()))
    }

    // ── Convenience aggregates (vehicle-type views) ─────────────────────────

    /// Whole-table vehicle frequency, for the pie/donut view.
    pub fn vehicle_totals(&self) -> Result<DataFrame, ChargeError> {
        total_counts(self.sessions_df()?, session::CAR)
    }

    /// Vehicle counts per time bucket, for the stacked absolute bars.
    pub fn counts_by(&self, bucket: TimeBucket) -> Result<DataFrame, ChargeError> {
        absolute_counts(self.sessions_df()?, bucket.column(), session::CAR)
    }

    /// Vehicle share percentages per time bucket, for the normalized bars.
    pub fn shares_by(&self, bucket: TimeBucket) -> Result<DataFrame, ChargeError> {
        normalized_percentages(self.sessions_df()?, bucket.column(), session::CAR)
    }

    /// Category → color mapping for any string column.
    pub fn color_map(&self, column: &str) -> Result<Vec<(String, String)>, ChargeError> {
        let categories = distinct_first_seen(self.sessions_df()?, column)?;
        Ok(assign_colors(&categories))
    }

    // ── Unified pipeline ────────────────────────────────────────────────────

    /// Run the configured pipeline over the loaded table.
    ///
    /// With a rollup configured, ranking and every aggregate use the
    /// relabeled category column; without one the category column is used
    /// as-is. The input table is never mutated.
    pub fn run(&self, config: &PipelineConfig) -> Result<PipelineOutput, ChargeError> {
        let sessions = self.sessions_df()?;
        require_columns(sessions, &[config.category.as_str()])?;

        let (frame, category) = match &config.rollup {
            Some(rollup) => {
                let grouped = grouped_column_name(&config.category);
                let frame = rollup_top_n(sessions, &config.category, rollup.top_n, &grouped)?;
                (frame, grouped)
            }
            None => (sessions.clone(), config.category.clone()),
        };

        let bucket = config.bucket.column();
        let totals = total_counts(&frame, &category)?;
        let counts = absolute_counts(&frame, bucket, &category)?;
        let shares = normalized_percentages(&frame, bucket, &category)?;
        let colors = assign_colors(&distinct_first_seen(&frame, &category)?);

        Ok(PipelineOutput {
            totals,
            counts,
            shares,
            colors,
        })
    }
}

// ── Private helpers ─────────────────────────────────────────────────────────

impl SessionModel {
    /// Read and parse a file, reusing the parsed frame when the exact same
    /// bytes were seen before.
    fn read_table_cached(&mut self, filename: &str) -> Result<DataFrame, ChargeError> {
        let path = self.base_path.join(filename);
        let bytes = std::fs::read(&path)?;
        let key = blake3::hash(&bytes);

        if let Some(df) = self.parse_cache.get(&key) {
            debug!(%filename, "parse cache hit");
            return Ok(df.clone());
        }

        let df = Self::read_csv_as_strings(bytes)?;
        self.parse_cache.insert(key, df.clone());
        Ok(df)
    }

    /// Parse CSV bytes with all columns as String dtype.
    /// Trims whitespace from column names.
    fn read_csv_as_strings(bytes: Vec<u8>) -> Result<DataFrame, ChargeError> {
        let mut df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0)) // all columns as String
            .into_reader_with_file_handle(Cursor::new(bytes))
            .finish()?;

        let trimmed: Vec<String> = df
            .get_column_names_str()
            .iter()
            .map(|c| c.trim().to_string())
            .collect();
        df.set_column_names(trimmed.as_slice())?;

        Ok(df)
    }
}
