use crate::fingerprint::PerceptualHash;

/// Symmetric, zero-diagonal matrix of pairwise Hamming distances.
///
/// Indexed in the same order as the hashes it was built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistanceMatrix {
    n: usize,
    cells: Vec<u32>,
}

impl DistanceMatrix {
    /// Each unordered pair is computed once and mirrored.
    pub fn build(hashes: &[PerceptualHash]) -> Self {
        let n = hashes.len();
        let mut cells = vec![0u32; n * n];
        for i in 0..n {
            for j in (i + 1)..n {
                let d = hashes[i].distance(&hashes[j]);
                cells[i * n + j] = d;
                cells[j * n + i] = d;
            }
        }
        Self { n, cells }
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn get(&self, i: usize, j: usize) -> u32 {
        self.cells[i * self.n + j]
    }

    pub fn row(&self, i: usize) -> &[u32] {
        &self.cells[i * self.n..(i + 1) * self.n]
    }

    /// Mean distance from `i` to every other member. Zero for a singleton.
    pub fn mean_distance(&self, i: usize) -> f64 {
        if self.n < 2 {
            return 0.0;
        }
        let total: u64 = self.row(i).iter().map(|&d| d as u64).sum();
        total as f64 / (self.n - 1) as f64
    }

    /// Member with the smallest mean distance to the rest; earliest wins ties.
    pub fn medoid(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for i in 0..self.n {
            let mean = self.mean_distance(i);
            match best {
                Some((_, b)) if mean >= b => {}
                _ => best = Some((i, mean)),
            }
        }
        best.map(|(i, _)| i)
    }
}
