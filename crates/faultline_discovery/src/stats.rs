//! Statistical significance testing for slices.
//!
//! The test is a capability so the slice miner can swap implementations
//! (e.g. Fisher's exact for small cells) without touching mining logic.

use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Tests whether a slice's bad/good split differs from the rest of the
/// population.
///
/// The 2×2 contingency table is
/// `[[slice_bad, slice_good], [rest_bad, rest_good]]`; implementations
/// return 1.0 for degenerate tables rather than failing.
pub trait SignificanceTest: Send + Sync {
    /// Returns the p-value for the given contingency table.
    fn p_value(&self, slice_bad: u64, slice_good: u64, rest_bad: u64, rest_good: u64) -> f64;
}

/// Chi-squared test with Yates continuity correction, one degree of freedom.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChiSquaredTest;

impl SignificanceTest for ChiSquaredTest {
    #[allow(clippy::cast_precision_loss)]
    fn p_value(&self, slice_bad: u64, slice_good: u64, rest_bad: u64, rest_good: u64) -> f64 {
        let observed = [
            [slice_bad as f64, slice_good as f64],
            [rest_bad as f64, rest_good as f64],
        ];

        let row_totals = [observed[0][0] + observed[0][1], observed[1][0] + observed[1][1]];
        let col_totals = [observed[0][0] + observed[1][0], observed[0][1] + observed[1][1]];
        let grand_total = row_totals[0] + row_totals[1];

        // A zero marginal gives a zero expected frequency: undefined test.
        if grand_total <= 0.0
            || row_totals.contains(&0.0)
            || col_totals.contains(&0.0)
        {
            return 1.0;
        }

        let mut statistic = 0.0;
        for (i, row) in observed.iter().enumerate() {
            for (j, &obs) in row.iter().enumerate() {
                let expected = row_totals[i] * col_totals[j] / grand_total;
                let deviation = ((obs - expected).abs() - 0.5).max(0.0);
                statistic += deviation * deviation / expected;
            }
        }

        ChiSquared::new(1.0)
            .map(|dist| 1.0 - dist.cdf(statistic))
            .unwrap_or(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn independent_table_is_not_significant() {
        let p = ChiSquaredTest.p_value(10, 10, 10, 10);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn strong_association_is_significant() {
        // All slice members bad, all others good.
        let p = ChiSquaredTest.p_value(20, 0, 0, 40);
        assert!(p < 0.001, "expected p < 0.001, got {p}");
    }

    #[test]
    fn zero_rest_row_is_degenerate() {
        // Slice covers the whole population.
        let p = ChiSquaredTest.p_value(20, 40, 0, 0);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn zero_column_is_degenerate() {
        // Nobody is bad anywhere.
        let p = ChiSquaredTest.p_value(0, 20, 0, 40);
        assert!((p - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_table_is_degenerate() {
        assert!((ChiSquaredTest.p_value(0, 0, 0, 0) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn weak_imbalance_is_not_significant() {
        // 6/20 bad in slice vs 10/40 bad elsewhere.
        let p = ChiSquaredTest.p_value(6, 14, 10, 30);
        assert!(p > 0.05, "expected p > 0.05, got {p}");
    }
}
