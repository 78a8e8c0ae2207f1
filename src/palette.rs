use std::collections::HashSet;

use polars::prelude::*;

use crate::error::ChargeError;

/// ColorBrewer Set3 qualitative palette, cycled over category positions.
pub const PALETTE: [&str; 12] = [
    "#8dd3c7", "#ffffb3", "#bebada", "#fb8072", "#80b1d3", "#fdb462", "#b3de69", "#fccde5",
    "#d9d9d9", "#bc80bd", "#ccebc5", "#ffed6f",
];

/// Distinct values of a string column in first-appearance order. This is
/// the deterministic enumeration the color assignment is keyed on.
pub fn distinct_first_seen(df: &DataFrame, column: &str) -> Result<Vec<String>, ChargeError> {
    let values = df.column(column)?.as_materialized_series().str()?;
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for value in values.into_iter().flatten() {
        if seen.insert(value) {
            out.push(value.to_string());
        }
    }
    Ok(out)
}

/// Assign each category the palette color at its position modulo the
/// palette length. Pure: the same ordered sequence always yields the same
/// mapping.
pub fn assign_colors<S: AsRef<str>>(categories: &[S]) -> Vec<(String, String)> {
    categories
        .iter()
        .enumerate()
        .map(|(i, category)| {
            (
                category.as_ref().to_string(),
                PALETTE[i % PALETTE.len()].to_string(),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::session;

    #[test]
    fn colors_follow_first_seen_order_and_cycle() {
        let names: Vec<String> = (0..14).map(|i| format!("car-{i}")).collect();
        let colors = assign_colors(&names);
        assert_eq!(colors[0].1, PALETTE[0]);
        assert_eq!(colors[11].1, PALETTE[11]);
        // 13th category wraps back to the start of the palette.
        assert_eq!(colors[12].1, PALETTE[0]);
        assert_eq!(colors[13].1, PALETTE[1]);
    }

    #[test]
    fn enumeration_is_first_appearance_order() {
        let df = df!(session::CAR => ["Zoe", "Leaf", "Zoe", "Model 3"]).unwrap();
        let distinct = distinct_first_seen(&df, session::CAR).unwrap();
        assert_eq!(distinct, ["Zoe", "Leaf", "Model 3"]);

        // Recomputing yields the identical mapping.
        let a = assign_colors(&distinct);
        let b = assign_colors(&distinct_first_seen(&df, session::CAR).unwrap());
        assert_eq!(a, b);
    }
}
