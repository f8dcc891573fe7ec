//! Medoid consensus selection.
//!
//! Given the pairwise distances of the images that survived fetching and
//! hashing, pick the most typical image (the medoid), accept everything whose
//! distance to it is within a loose percentile, and never drop below a floor
//! fraction of the set. Output indices are always in input order.

use serde::{Deserialize, Serialize};

use crate::distance::DistanceMatrix;

/// Tunables for the selector. Defaults match the tuned production values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusParams {
    /// Percentile (0..=100) of distances-to-medoid used as the acceptance threshold.
    pub percentile: f64,
    /// Fraction of the set that must always survive.
    pub floor_fraction: f64,
    /// Absolute minimum that must survive once filtering applies.
    pub min_keep: usize,
    /// Sets this small or smaller are passed through untouched.
    pub degenerate_cutoff: usize,
}

impl Default for ConsensusParams {
    fn default() -> Self {
        Self { percentile: 85.0, floor_fraction: 0.7, min_keep: 3, degenerate_cutoff: 2 }
    }
}

impl ConsensusParams {
    /// Number of candidates that must be kept out of `n`.
    pub fn floor(&self, n: usize) -> usize {
        // epsilon absorbs float noise such as 0.7 * 10 = 7.000000000000001
        let fractional = (self.floor_fraction * n as f64 - 1e-9).ceil().max(0.0) as usize;
        fractional.max(self.min_keep).min(n)
    }
}

/// Outcome of one selection pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Kept candidate indices, ascending (input order), already capped.
    pub kept: Vec<usize>,
    /// `None` when the set was too small to filter.
    pub medoid: Option<usize>,
    pub threshold: Option<f64>,
    pub floor_applied: bool,
}

/// Linear-interpolated percentile. `p` is clamped to 0..=100.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = p.clamp(0.0, 100.0) / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

pub fn select(
    matrix: &DistanceMatrix,
    params: &ConsensusParams,
    max_keep: Option<usize>,
) -> Selection {
    let n = matrix.len();
    if n <= params.degenerate_cutoff {
        return Selection {
            kept: capped((0..n).collect(), max_keep),
            medoid: None,
            threshold: None,
            floor_applied: false,
        };
    }
    let Some(medoid) = matrix.medoid() else {
        return Selection { kept: Vec::new(), medoid: None, threshold: None, floor_applied: false };
    };

    let to_medoid = matrix.row(medoid);
    let dists: Vec<f64> = to_medoid.iter().map(|&d| d as f64).collect();
    let threshold = percentile(&dists, params.percentile);

    let mut kept: Vec<usize> = (0..n).filter(|&i| dists[i] <= threshold).collect();

    let floor = params.floor(n);
    let floor_applied = kept.len() < floor;
    if floor_applied {
        let mut closest: Vec<usize> = (0..n).collect();
        closest.sort_by_key(|&i| (to_medoid[i], i));
        closest.truncate(floor);
        closest.sort_unstable();
        kept = closest;
    }

    Selection {
        kept: capped(kept, max_keep),
        medoid: Some(medoid),
        threshold: Some(threshold),
        floor_applied,
    }
}

fn capped(mut kept: Vec<usize>, max_keep: Option<usize>) -> Vec<usize> {
    if let Some(max) = max_keep {
        kept.truncate(max);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::PerceptualHash;

    fn matrix(bits: &[u64]) -> DistanceMatrix {
        let hashes: Vec<PerceptualHash> =
            bits.iter().copied().map(PerceptualHash::from_u64).collect();
        DistanceMatrix::build(&hashes)
    }

    fn run(bits: &[u64], max_keep: Option<usize>) -> Selection {
        select(&matrix(bits), &ConsensusParams::default(), max_keep)
    }

    #[test]
    fn percentile_interpolates_like_numpy() {
        assert!((percentile(&[0.0, 1.0, 2.0, 3.0, 4.0], 85.0) - 3.4).abs() < 1e-9);
        assert_eq!(percentile(&[4.0, 0.0, 2.0], 50.0), 2.0);
        assert_eq!(percentile(&[7.0], 85.0), 7.0);
        assert_eq!(percentile(&[], 85.0), 0.0);
        assert_eq!(percentile(&[1.0, 9.0], 100.0), 9.0);
        assert_eq!(percentile(&[1.0, 9.0], 0.0), 1.0);
    }

    #[test]
    fn floor_rounds_up_and_respects_minimum() {
        let p = ConsensusParams::default();
        assert_eq!(p.floor(3), 3);
        assert_eq!(p.floor(5), 4);
        assert_eq!(p.floor(10), 7);
        assert_eq!(p.floor(11), 8);
        assert_eq!(p.floor(20), 14);
        let strict = ConsensusParams { min_keep: 10, ..p };
        assert_eq!(strict.floor(4), 4);
    }

    #[test]
    fn two_or_fewer_pass_through() {
        let sel = run(&[0, u64::MAX], None);
        assert_eq!(sel.kept, vec![0, 1]);
        assert_eq!(sel.medoid, None);
        assert_eq!(run(&[0, u64::MAX], Some(1)).kept, vec![0]);
        assert!(run(&[], None).kept.is_empty());
    }

    #[test]
    fn single_outlier_is_rejected() {
        // four close hashes, one unrelated sitting in the middle of the list
        let sel = run(&[0, 0b1, 0b10, u64::MAX, 0b100], None);
        assert_eq!(sel.medoid, Some(0));
        assert_eq!(sel.kept, vec![0, 1, 2, 4]);
        assert!(!sel.floor_applied);
    }

    #[test]
    fn floor_keeps_closest_in_input_order() {
        let params = ConsensusParams { percentile: 0.0, ..ConsensusParams::default() };
        // disjoint bit groups around 0; distances to it: 0, 4, 1, 3, 2, 5
        let bits: [u64; 6] = [0, 0b1111, 1 << 4, 0b111 << 5, 0b11 << 8, 0b11111 << 10];
        let sel = select(&matrix(&bits), &params, None);
        assert!(sel.floor_applied);
        assert_eq!(sel.medoid, Some(0));
        // floor of 6 is 5: everything but the farthest
        assert_eq!(sel.kept, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn three_candidates_fall_back_to_floor() {
        let sel = run(&[0, 0b1, u64::MAX], None);
        assert!(sel.floor_applied);
        assert_eq!(sel.kept, vec![0, 1, 2]);
    }

    #[test]
    fn tight_cluster_keeps_everyone() {
        // one centre plus nine single-bit neighbours: pairwise distance <= 2
        let mut bits = vec![0u64];
        bits.extend((0..9).map(|b| 1u64 << b));
        let sel = run(&bits, None);
        assert_eq!(sel.kept, (0..10).collect::<Vec<_>>());
        assert_eq!(run(&bits, Some(4)).kept, vec![0, 1, 2, 3]);
    }

    #[test]
    fn tight_cluster_can_lose_its_far_edge() {
        // pairwise distance <= 2, but the two images two bits from the medoid
        // sit above the 85th percentile of 1.65
        let bits: [u64; 10] = [0, 1, 2, 3, 1, 2, 3, 0, 1, 3];
        let sel = run(&bits, None);
        assert_eq!(sel.medoid, Some(1));
        assert!((sel.threshold.unwrap() - 1.65).abs() < 1e-9);
        assert_eq!(sel.kept, vec![0, 1, 3, 4, 6, 7, 8, 9]);
        assert!(!sel.floor_applied);
    }

    #[test]
    fn cap_uses_input_order_not_similarity() {
        // medoid sits at index 5; everything else is one bit away
        let bits: [u64; 8] = [1 << 0, 1 << 1, 1 << 2, 1 << 3, 1 << 4, 0, 1 << 5, 1 << 6];
        let sel = run(&bits, Some(3));
        assert_eq!(sel.medoid, Some(5));
        assert_eq!(sel.kept, vec![0, 1, 2]);
    }

    #[test]
    fn refiltering_consensus_output_is_stable() {
        let bits: [u64; 5] = [0, 0b1, 0b10, u64::MAX, 0b100];
        let first = run(&bits, None);
        let survivors: Vec<u64> = first.kept.iter().map(|&i| bits[i]).collect();
        let second = run(&survivors, None);
        assert_eq!(second.kept, (0..survivors.len()).collect::<Vec<_>>());
    }

    #[test]
    fn invariants_hold_on_scattered_sets() {
        let params = ConsensusParams::default();
        let mut state = 0x9E37_79B9_7F4A_7C15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for n in 3..=20 {
            let bits: Vec<u64> = (0..n).map(|_| next()).collect();
            let sel = select(&matrix(&bits), &params, None);
            assert!(sel.kept.len() >= params.floor(n), "n={n}");
            assert!(sel.kept.len() <= n);
            assert!(sel.kept.windows(2).all(|w| w[0] < w[1]), "order broken for n={n}");

            let capped = select(&matrix(&bits), &params, Some(2));
            assert!(capped.kept.len() <= 2);
            assert_eq!(capped.kept, sel.kept[..2].to_vec());
        }
    }
}
