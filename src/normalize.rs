use polars::datatypes::TimeUnit;
use polars::prelude::StrptimeOptions;
use polars::prelude::*;

use crate::error::ChargeError;
use crate::schema::{derived, session};

/// Accepted timestamp formats, tried in order. The uploaded files carry
/// either full timestamps or bare dates.
const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Summary counts for the non-fatal anomalies absorbed during preparation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub rows_in: usize,
    pub rows_kept: usize,
    /// Rows excluded because `End Time` failed to parse (or was empty).
    pub rows_dropped: usize,
    /// Cells (outside `End Time`) that failed their type cast and became null.
    pub cells_coerced: usize,
}

/// Time-bucket granularity for the aggregation stage. Each variant maps to
/// one of the columns produced by [`derive_time_buckets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeBucket {
    Year,
    Month,
    Day,
    Hour,
}

impl TimeBucket {
    pub fn column(self) -> &'static str {
        match self {
            Self::Year => derived::YEAR,
            Self::Month => derived::MONTH,
            Self::Day => derived::DAY,
            Self::Hour => derived::HOUR,
        }
    }
}

/// Check that every required column exists, reporting all absent names at once.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<(), ChargeError> {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ChargeError::MissingColumn(missing.join(", ")))
    }
}

/// Parse a string column to Datetime, turning unparseable cells into null.
fn lenient_datetime(column: &str) -> Expr {
    let parse = |format: &str| {
        col(column)
            .str()
            .strip_chars(lit(" \t\r\n"))
            .str()
            .to_datetime(
                Some(TimeUnit::Microseconds),
                None,
                StrptimeOptions {
                    format: Some(format.into()),
                    strict: false,
                    ..Default::default()
                },
                lit("raise"),
            )
    };
    coalesce(&[parse(DATETIME_FORMAT), parse(DATE_FORMAT)]).alias(column)
}

/// Cast raw string columns to their semantic types.
///
/// `Start Time` / `End Time` become Datetime(µs), the measurement columns
/// Float64, `Car` and `Provider` stay as strings. A cell that fails its cast
/// becomes null instead of failing the table; the only fatal condition is a
/// required column missing entirely.
///
/// Returns the typed frame and the number of coerced cells (`End Time`
/// excluded — its failures surface as dropped rows downstream).
pub fn normalize_sessions(raw: DataFrame) -> Result<(DataFrame, usize), ChargeError> {
    require_columns(&raw, &session::REQUIRED)?;

    let mut exprs = vec![
        lenient_datetime(session::START_TIME),
        lenient_datetime(session::END_TIME),
    ];
    for column in session::NUMERIC {
        exprs.push(
            col(column)
                .str()
                .strip_chars(lit(" \t\r\n"))
                .cast(DataType::Float64),
        );
    }

    let typed = raw.clone().lazy().with_columns(exprs).collect()?;

    // Coercion failures are exactly the nulls the raw strings did not have.
    let watched = [
        session::START_TIME,
        session::PEAK_POWER_KW,
        session::AVERAGE_POWER_KW,
        session::AVERAGE_AMP,
    ];
    let mut cells_coerced = 0usize;
    for column in watched {
        let before = raw.column(column)?.null_count();
        let after = typed.column(column)?.null_count();
        cells_coerced += after.saturating_sub(before);
    }

    Ok((typed, cells_coerced))
}

/// Drop rows without a valid `End Time` and derive the calendar buckets.
///
/// `year`, `month` (`YYYY-MM`), `day` and `hour` all decompose `End Time`
/// in its original time reference — no timezone conversion. Returns the
/// surviving frame and the dropped-row count.
pub fn derive_time_buckets(df: DataFrame) -> Result<(DataFrame, usize), ChargeError> {
    let rows_in = df.height();
    let kept = df
        .lazy()
        .filter(col(session::END_TIME).is_not_null())
        .with_columns([
            col(session::END_TIME).dt().year().alias(derived::YEAR),
            col(session::END_TIME)
                .dt()
                .to_string("%Y-%m")
                .alias(derived::MONTH),
            col(session::END_TIME)
                .dt()
                .day()
                .cast(DataType::Int32)
                .alias(derived::DAY),
            col(session::END_TIME)
                .dt()
                .hour()
                .cast(DataType::Int32)
                .alias(derived::HOUR),
        ])
        .collect()?;
    let rows_dropped = rows_in - kept.height();
    Ok((kept, rows_dropped))
}

/// Full preparation step: type normalization followed by time derivation.
pub fn prepare_sessions(raw: DataFrame) -> Result<(DataFrame, NormalizeReport), ChargeError> {
    let rows_in = raw.height();
    let (typed, cells_coerced) = normalize_sessions(raw)?;
    let (bucketed, rows_dropped) = derive_time_buckets(typed)?;
    let report = NormalizeReport {
        rows_in,
        rows_kept: bucketed.height(),
        rows_dropped,
        cells_coerced,
    };
    Ok((bucketed, report))
}
