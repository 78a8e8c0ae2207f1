//! Charging-session analytics core.
//!
//! Turns one uploaded spreadsheet export of EV charging sessions into the
//! deterministic aggregate tables a chart-rendering layer consumes:
//!
//! - a total frequency table per vehicle type (pie/donut view),
//! - session counts per `(time bucket, vehicle type)` (stacked bars),
//! - percentage shares per bucket, summing to 100 (normalized bars),
//! - a stable category → color mapping.
//!
//! The pipeline is raw strings → typed columns → time buckets →
//! (optional top-N rollup) → aggregates. Malformed cells become nulls and
//! rows without a valid end time are dropped; both are reported as summary
//! counts in [`NormalizeReport`] rather than raised per row. The only
//! fatal input condition is a missing required column.
//!
//! [`SessionModel`] is the per-upload entry point; the stage functions are
//! also exported individually for callers that already hold a
//! [`polars::frame::DataFrame`].

mod aggregation;
mod error;
mod model;
mod normalize;
mod palette;
mod rollup;
pub mod schema;

pub use aggregation::{absolute_counts, normalized_percentages, total_counts};
pub use error::ChargeError;
pub use model::{PipelineConfig, PipelineOutput, RollupConfig, SessionModel};
pub use normalize::{
    derive_time_buckets, normalize_sessions, prepare_sessions, require_columns, NormalizeReport,
    TimeBucket,
};
pub use palette::{assign_colors, distinct_first_seen, PALETTE};
pub use rollup::{grouped_column_name, rollup_top_n};
