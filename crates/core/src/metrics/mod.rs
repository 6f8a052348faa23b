//! Performance statistics over daily close series.
//!
//! Percent-valued outputs are expressed in percent units (`10.0` means +10%). Values that cannot
//! be computed (missing history, empty windows, zero denominators) are `None` and render as
//! "N/A"; nothing in here returns an error.

pub mod breakdown;
pub mod curve;
pub mod frame;
pub mod performance;

pub use breakdown::{align_asof, rank_contributions, Breakdown, BreakdownLine, Contribution};
pub use curve::{
    compute_portfolio_curve, correct_splits, cumulative_roi, normalize_to_roi, rebase_pair,
    CurvePoint, EquityCurve, NORMALIZE_TO_ROI_JS,
};
pub use performance::{compute_performance, PerformanceRecord};

/// Daily returns above this (300%) are treated as unadjusted splits.
pub const OUTLIER_RETURN_THRESHOLD: f64 = 3.0;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// `(last - prev) / prev`, or 0 when `prev` is zero.
pub fn pct_change(prev: f64, last: f64) -> f64 {
    if prev == 0.0 {
        return 0.0;
    }
    (last - prev) / prev
}
