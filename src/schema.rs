/// Column-name and label constants for the charging-session schema.
/// Single source of truth for every pipeline stage.

// ── Raw session columns (as they appear in the uploaded file) ───────────────
pub mod session {
    pub const START_TIME: &str = "Start Time";
    pub const END_TIME: &str = "End Time";
    pub const PEAK_POWER_KW: &str = "Peak Power (kW)";
    pub const AVERAGE_POWER_KW: &str = "Average Power (kW)";
    pub const AVERAGE_AMP: &str = "Average Amp (A)";
    pub const CAR: &str = "Car";
    pub const PROVIDER: &str = "Provider";

    /// Columns that must be present for the pipeline to run.
    /// `Provider` is only required when a provider rollup is requested.
    pub const REQUIRED: [&str; 6] = [
        START_TIME,
        END_TIME,
        PEAK_POWER_KW,
        AVERAGE_POWER_KW,
        AVERAGE_AMP,
        CAR,
    ];

    /// Measurement columns cast to Float64 during normalization.
    pub const NUMERIC: [&str; 3] = [PEAK_POWER_KW, AVERAGE_POWER_KW, AVERAGE_AMP];
}

// ── Derived time-bucket columns (computed from End Time) ────────────────────
pub mod derived {
    pub const YEAR: &str = "year";
    pub const MONTH: &str = "month";
    pub const DAY: &str = "day";
    pub const HOUR: &str = "hour";
}

// ── Aggregate output columns ────────────────────────────────────────────────
pub mod aggregate {
    pub const COUNT: &str = "count";
    pub const PERCENTAGE: &str = "percentage";
}

// ── Rollup labels ───────────────────────────────────────────────────────────
pub mod rollup {
    /// Label absorbing every category value outside the top N.
    pub const OTHER: &str = "Other";
}
