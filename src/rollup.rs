use polars::prelude::*;

use crate::aggregation::ranked_value_counts;
use crate::error::ChargeError;
use crate::schema::rollup;

/// Name of the relabeled column produced by [`rollup_top_n`].
pub fn grouped_column_name(column: &str) -> String {
    format!("{column} (grouped)")
}

/// Collapse a high-cardinality category into its top `n` values plus "Other".
///
/// Values are ranked by total count descending; ties at the cutoff keep
/// first-seen order, so the result is deterministic. The relabeled values
/// land in `out_column` and the original column is left untouched for
/// traceability. Every row gets exactly one label (null cells fall into
/// "Other"); no row is dropped.
///
/// With `n` or fewer distinct values nothing is relabeled; `out_column`
/// copies the original, with null cells still labeled "Other".
pub fn rollup_top_n(
    df: &DataFrame,
    column: &str,
    n: usize,
    out_column: &str,
) -> Result<DataFrame, ChargeError> {
    let ranked = ranked_value_counts(df, column)?;

    if ranked.len() <= n {
        // No relabeling, but null cells still need a label so the row
        // stays countable downstream, same as on the relabel path.
        let out = df
            .clone()
            .lazy()
            .with_columns([col(column)
                .fill_null(lit(rollup::OTHER))
                .alias(out_column)])
            .collect()?;
        return Ok(out);
    }

    let top: Vec<String> = ranked.into_iter().take(n).map(|(value, _)| value).collect();
    let top_series = Series::new("top".into(), top);

    let out = df
        .clone()
        .lazy()
        .with_columns([when(col(column).is_in(lit(top_series), false))
            .then(col(column))
            .otherwise(lit(rollup::OTHER))
            .alias(out_column)])
        .collect()?;
    Ok(out)
}
