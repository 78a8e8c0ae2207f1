use std::collections::HashMap;

use polars::prelude::*;

use crate::error::ChargeError;
use crate::schema::aggregate;

/// Grouping key for a time-bucket column.
///
/// Month buckets are zero-padded strings and sort lexicographically;
/// year/day/hour buckets are integers and sort numerically. A column is
/// homogeneous, so the cross-variant ordering never matters in practice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum BucketKey {
    Int(i64),
    Str(String),
}

impl BucketKey {
    fn from_any(value: &AnyValue) -> Option<Self> {
        match value {
            AnyValue::String(s) => Some(Self::Str((*s).to_string())),
            AnyValue::StringOwned(s) => Some(Self::Str(s.to_string())),
            AnyValue::Int8(v) => Some(Self::Int(i64::from(*v))),
            AnyValue::Int16(v) => Some(Self::Int(i64::from(*v))),
            AnyValue::Int32(v) => Some(Self::Int(i64::from(*v))),
            AnyValue::Int64(v) => Some(Self::Int(*v)),
            AnyValue::UInt32(v) => Some(Self::Int(i64::from(*v))),
            AnyValue::UInt64(v) => Some(Self::Int(*v as i64)),
            _ => None,
        }
    }
}

/// Count occurrences per `(bucket, category)` pair.
///
/// Rows with a null bucket or category are skipped. Output is sorted by
/// bucket ascending, then by category in first-seen order, so repeated runs
/// over the same input produce identical tables.
fn grouped_counts(
    df: &DataFrame,
    bucket: &str,
    category: &str,
) -> Result<Vec<(BucketKey, String, u32)>, ChargeError> {
    let buckets = df.column(bucket)?.as_materialized_series();
    let categories = df.column(category)?.as_materialized_series().str()?;

    let mut counts: HashMap<(BucketKey, String), u32> = HashMap::new();
    let mut category_rank: HashMap<String, usize> = HashMap::new();

    for i in 0..df.height() {
        let raw = buckets.get(i)?;
        let Some(key) = BucketKey::from_any(&raw) else {
            continue;
        };
        let Some(value) = categories.get(i) else {
            continue;
        };
        let next_rank = category_rank.len();
        category_rank.entry(value.to_string()).or_insert(next_rank);
        *counts.entry((key, value.to_string())).or_insert(0) += 1;
    }

    let mut rows: Vec<(BucketKey, String, u32)> = counts
        .into_iter()
        .map(|((bucket, category), count)| (bucket, category, count))
        .collect();
    rows.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| category_rank[&a.1].cmp(&category_rank[&b.1]))
    });
    Ok(rows)
}

/// Rebuild the bucket column from the collected keys. The output dtype
/// follows the source column's dtype, so an empty input still yields an
/// integer bucket column for integer buckets.
fn bucket_column(name: &str, dtype: &DataType, keys: &[BucketKey]) -> Column {
    if dtype.is_integer() {
        let values: Vec<i32> = keys
            .iter()
            .filter_map(|k| match k {
                BucketKey::Int(v) => Some(*v as i32),
                BucketKey::Str(_) => None,
            })
            .collect();
        Column::new(name.into(), values)
    } else {
        let values: Vec<String> = keys
            .iter()
            .map(|k| match k {
                BucketKey::Str(s) => s.clone(),
                BucketKey::Int(v) => v.to_string(),
            })
            .collect();
        Column::new(name.into(), values)
    }
}

/// Frequency of each distinct value, sorted by count descending with ties
/// kept in first-seen order. Shared by [`total_counts`] and the rollup
/// ranking.
pub(crate) fn ranked_value_counts(
    df: &DataFrame,
    column: &str,
) -> Result<Vec<(String, u32)>, ChargeError> {
    let values = df.column(column)?.as_materialized_series().str()?;

    let mut counts: HashMap<String, u32> = HashMap::new();
    let mut first_seen: Vec<String> = Vec::new();
    for value in values.into_iter().flatten() {
        let entry = counts.entry(value.to_string()).or_insert(0);
        if *entry == 0 {
            first_seen.push(value.to_string());
        }
        *entry += 1;
    }

    let mut ranked: Vec<(String, u32)> = first_seen
        .into_iter()
        .map(|value| {
            let count = counts[&value];
            (value, count)
        })
        .collect();
    // Stable sort keeps first-seen order within equal counts.
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    Ok(ranked)
}

/// Whole-table frequency of `category`, as a `(category, count)` frame.
pub fn total_counts(df: &DataFrame, category: &str) -> Result<DataFrame, ChargeError> {
    let ranked = ranked_value_counts(df, category)?;
    let values: Vec<String> = ranked.iter().map(|(v, _)| v.clone()).collect();
    let counts: Vec<u32> = ranked.iter().map(|(_, n)| *n).collect();

    let columns = vec![
        Column::new(category.into(), values),
        Column::new(aggregate::COUNT.into(), counts),
    ];
    Ok(DataFrame::new(columns)?)
}

/// Session count per `(bucket, category)` pair. Only observed pairs are
/// emitted; there are never zero-count rows.
pub fn absolute_counts(
    df: &DataFrame,
    bucket: &str,
    category: &str,
) -> Result<DataFrame, ChargeError> {
    let rows = grouped_counts(df, bucket, category)?;
    let bucket_dtype = df.column(bucket)?.dtype().clone();
    let keys: Vec<BucketKey> = rows.iter().map(|(b, _, _)| b.clone()).collect();
    let categories: Vec<String> = rows.iter().map(|(_, c, _)| c.clone()).collect();
    let counts: Vec<u32> = rows.iter().map(|(_, _, n)| *n).collect();

    let columns = vec![
        bucket_column(bucket, &bucket_dtype, &keys),
        Column::new(category.into(), categories),
        Column::new(aggregate::COUNT.into(), counts),
    ];
    Ok(DataFrame::new(columns)?)
}

/// Like [`absolute_counts`], but each count is normalized to the percentage
/// of its bucket total. Percentages within a bucket sum to 100.
pub fn normalized_percentages(
    df: &DataFrame,
    bucket: &str,
    category: &str,
) -> Result<DataFrame, ChargeError> {
    let rows = grouped_counts(df, bucket, category)?;
    let bucket_dtype = df.column(bucket)?.dtype().clone();

    let mut bucket_totals: HashMap<BucketKey, u32> = HashMap::new();
    for (key, _, count) in &rows {
        *bucket_totals.entry(key.clone()).or_insert(0) += count;
    }

    let keys: Vec<BucketKey> = rows.iter().map(|(b, _, _)| b.clone()).collect();
    let categories: Vec<String> = rows.iter().map(|(_, c, _)| c.clone()).collect();
    // A bucket only exists because at least one row produced it, so the
    // total is never zero.
    let percentages: Vec<f64> = rows
        .iter()
        .map(|(key, _, count)| 100.0 * f64::from(*count) / f64::from(bucket_totals[key]))
        .collect();

    let columns = vec![
        bucket_column(bucket, &bucket_dtype, &keys),
        Column::new(category.into(), categories),
        Column::new(aggregate::PERCENTAGE.into(), percentages),
    ];
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{derived, session};

    fn monthly_frame() -> DataFrame {
        df!(
            derived::MONTH => ["2024-02", "2024-01", "2024-01", "2024-02", "2024-02"],
            session::CAR => ["Leaf", "Model 3", "Model 3", "Zoe", "Leaf"],
        )
        .unwrap()
    }

    #[test]
    fn absolute_counts_sorted_by_bucket_then_first_seen_category() {
        let out = absolute_counts(&monthly_frame(), derived::MONTH, session::CAR).unwrap();

        let months: Vec<&str> = out
            .column(derived::MONTH)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        let cars: Vec<&str> = out
            .column(session::CAR)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();

        // "Leaf" appeared before "Model 3" in the input, so inside a bucket
        // it comes first.
        assert_eq!(months, ["2024-01", "2024-02", "2024-02"]);
        assert_eq!(cars, ["Model 3", "Leaf", "Zoe"]);

        let counts: Vec<u32> = out
            .column(aggregate::COUNT)
            .unwrap()
            .u32()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(counts, [2, 2, 1]);
    }

    #[test]
    fn percentages_sum_to_100_per_bucket() {
        let out = normalized_percentages(&monthly_frame(), derived::MONTH, session::CAR).unwrap();
        let months: Vec<String> = out
            .column(derived::MONTH)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect();
        let pcts: Vec<f64> = out
            .column(aggregate::PERCENTAGE)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();

        let mut sums: HashMap<&str, f64> = HashMap::new();
        for (month, pct) in months.iter().zip(&pcts) {
            *sums.entry(month).or_insert(0.0) += pct;
        }
        for (_, sum) in sums {
            assert!((sum - 100.0).abs() < 0.01);
        }
    }

    #[test]
    fn single_category_buckets_get_100_percent() {
        // Concrete scenario: one invalid row already dropped upstream.
        let frame = df!(
            derived::MONTH => ["2024-01", "2024-01", "2024-02"],
            session::CAR => ["Model 3", "Model 3", "Leaf"],
        )
        .unwrap();

        let counts = absolute_counts(&frame, derived::MONTH, session::CAR).unwrap();
        assert_eq!(counts.height(), 2);
        let n: Vec<u32> = counts
            .column(aggregate::COUNT)
            .unwrap()
            .u32()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(n, [2, 1]);

        let shares = normalized_percentages(&frame, derived::MONTH, session::CAR).unwrap();
        let pcts: Vec<f64> = shares
            .column(aggregate::PERCENTAGE)
            .unwrap()
            .f64()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(pcts, [100.0, 100.0]);
    }

    #[test]
    fn integer_buckets_sort_numerically() {
        let frame = df!(
            derived::HOUR => [9i32, 10, 9, 2],
            session::CAR => ["Leaf", "Leaf", "Leaf", "Leaf"],
        )
        .unwrap();
        let out = absolute_counts(&frame, derived::HOUR, session::CAR).unwrap();
        let hours: Vec<i32> = out
            .column(derived::HOUR)
            .unwrap()
            .i32()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        assert_eq!(hours, [2, 9, 10]);
    }

    #[test]
    fn empty_input_keeps_the_integer_bucket_dtype() {
        let frame = df!(
            derived::HOUR => Vec::<i32>::new(),
            session::CAR => Vec::<String>::new(),
        )
        .unwrap();
        let out = absolute_counts(&frame, derived::HOUR, session::CAR).unwrap();
        assert_eq!(out.height(), 0);
        assert_eq!(out.column(derived::HOUR).unwrap().dtype(), &DataType::Int32);

        let shares = normalized_percentages(&frame, derived::HOUR, session::CAR).unwrap();
        assert_eq!(
            shares.column(derived::HOUR).unwrap().dtype(),
            &DataType::Int32
        );
    }

    #[test]
    fn total_counts_rank_by_count_then_first_seen() {
        let frame = df!(
            session::CAR => ["Zoe", "Leaf", "Leaf", "Model 3", "Zoe"],
        )
        .unwrap();
        let out = total_counts(&frame, session::CAR).unwrap();
        let cars: Vec<&str> = out
            .column(session::CAR)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .flatten()
            .collect();
        // Zoe and Leaf tie at 2; Zoe was seen first.
        assert_eq!(cars, ["Zoe", "Leaf", "Model 3"]);
    }

    #[test]
    fn null_category_rows_are_skipped() {
        let frame = df!(
            derived::MONTH => ["2024-01", "2024-01"],
            session::CAR => [Some("Leaf"), None],
        )
        .unwrap();
        let out = absolute_counts(&frame, derived::MONTH, session::CAR).unwrap();
        assert_eq!(out.height(), 1);
    }
}
