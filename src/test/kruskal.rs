//! Kruskal-Wallis H test.

use super::rank::rank_with_ties;
use crate::error::{DivError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ChiSquared, ContinuousCDF};

/// Outcome of a Kruskal-Wallis test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KruskalResult {
    /// Tie-corrected H statistic.
    pub h: f64,
    /// Degrees of freedom, `k - 1`.
    pub df: usize,
    pub p_value: f64,
}

/// Kruskal-Wallis H test across `groups`.
///
/// H is tie-corrected and compared against χ² with `k - 1` degrees of freedom.
///
/// # Errors
/// `InvalidParameter` for fewer than 2 groups or an empty group, `Numerical`
/// when every value is identical.
pub fn kruskal_wallis(groups: &[&[f64]]) -> Result<KruskalResult> {
    if groups.len() < 2 {
        return Err(DivError::InvalidParameter(format!(
            "Kruskal-Wallis needs at least 2 groups, got {}",
            groups.len()
        )));
    }
    if groups.iter().any(|g| g.is_empty()) {
        return Err(DivError::InvalidParameter(
            "Kruskal-Wallis groups must be non-empty".to_string(),
        ));
    }

    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let (ranks, tie_term) = rank_with_ties(&pooled);
    let n = pooled.len() as f64;

    let correction = 1.0 - tie_term / (n * n * n - n);
    if correction <= 0.0 {
        return Err(DivError::Numerical(
            "Kruskal-Wallis is undefined when all values are identical".to_string(),
        ));
    }

    let mut offset = 0;
    let mut rank_term = 0.0;
    for group in groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        rank_term += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }
    let h = (12.0 / (n * (n + 1.0)) * rank_term - 3.0 * (n + 1.0)) / correction;

    let df = groups.len() - 1;
    let chi2 = ChiSquared::new(df as f64)
        .map_err(|e| DivError::Numerical(format!("Chi-squared distribution: {}", e)))?;

    Ok(KruskalResult {
        h,
        df,
        p_value: chi2.sf(h).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_separated_groups() {
        let result = kruskal_wallis(&[&[1.0, 2.0, 3.0], &[4.0, 5.0, 6.0], &[7.0, 8.0, 9.0]]).unwrap();
        assert_eq!(result.df, 2);
        assert_relative_eq!(result.h, 7.2, epsilon = 1e-10);
        // χ²(2) survival is exp(-h/2)
        assert_relative_eq!(result.p_value, (-3.6_f64).exp(), epsilon = 1e-8);
    }

    #[test]
    fn test_tie_correction() {
        let result = kruskal_wallis(&[&[1.0, 2.0, 2.0], &[2.0, 3.0, 4.0], &[5.0, 5.0, 6.0]]).unwrap();
        assert_relative_eq!(result.h, 6.771014492753614, epsilon = 1e-10);
        assert_relative_eq!(result.p_value, 0.03386046239194272, epsilon = 1e-8);
    }

    #[test]
    fn test_degenerate_input() {
        assert!(kruskal_wallis(&[&[1.0, 2.0]]).is_err());
        assert!(kruskal_wallis(&[&[1.0], &[]]).is_err());
        assert!(matches!(
            kruskal_wallis(&[&[3.0, 3.0], &[3.0], &[3.0]]),
            Err(DivError::Numerical(_))
        ));
    }
}
