//! Ranking with ties, shared by the rank-sum tests.

/// Average ranks (1-based) of `values`, and the tie term `Σ (t³ - t)` over
/// groups of `t` tied values.
pub fn rank_with_ties(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && values[order[end + 1]] == values[order[start]] {
            end += 1;
        }
        // positions start..=end share the mean of ranks start+1..=end+1
        let rank = (start + end) as f64 / 2.0 + 1.0;
        for &idx in &order[start..=end] {
            ranks[idx] = rank;
        }
        let t = (end - start + 1) as f64;
        tie_term += t * t * t - t;
        start = end + 1;
    }

    (ranks, tie_term)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_values() {
        let (ranks, ties) = rank_with_ties(&[3.0, 1.0, 2.0]);
        assert_eq!(ranks, vec![3.0, 1.0, 2.0]);
        assert_eq!(ties, 0.0);
    }

    #[test]
    fn test_tied_values() {
        let (ranks, ties) = rank_with_ties(&[2.0, 1.0, 2.0, 2.0, 5.0]);
        assert_eq!(ranks, vec![3.0, 1.0, 3.0, 3.0, 5.0]);
        assert_eq!(ties, 24.0);
    }
}
