use img_hash::{HashAlg, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::FingerprintCfg;
use crate::fetch::ImageBitmap;

/// Hash families the fingerprinter can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashAlgorithm {
    /// DCT-preprocessed mean hash (pHash). Most tolerant of recompression.
    #[default]
    Perceptual,
    Mean,
    Gradient,
    DoubleGradient,
    Blockhash,
}

impl HashAlgorithm {
    fn config(self, size: u32) -> HasherConfig {
        let cfg = HasherConfig::new().hash_size(size, size);
        match self {
            HashAlgorithm::Perceptual => cfg.hash_alg(HashAlg::Mean).preproc_dct(),
            HashAlgorithm::Mean => cfg.hash_alg(HashAlg::Mean),
            HashAlgorithm::Gradient => cfg.hash_alg(HashAlg::Gradient),
            HashAlgorithm::DoubleGradient => cfg.hash_alg(HashAlg::DoubleGradient),
            HashAlgorithm::Blockhash => cfg.hash_alg(HashAlg::Blockhash),
        }
    }
}

/// Fixed-length perceptual fingerprint. Only ever compared by Hamming distance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PerceptualHash(Box<[u8]>);

impl PerceptualHash {
    pub fn from_bytes(bytes: impl Into<Box<[u8]>>) -> Self {
        Self(bytes.into())
    }

    /// 64-bit hash from an integer, most significant byte first.
    pub fn from_u64(bits: u64) -> Self {
        Self(bits.to_be_bytes().to_vec().into_boxed_slice())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn bits(&self) -> usize {
        self.0.len() * 8
    }

    /// Number of differing bits. Bytes present in only one hash count as fully different.
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        let common: u32 = self
            .0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum();
        let extra = self.0.len().abs_diff(other.0.len()) as u32 * 8;
        common + extra
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Computes perceptual hashes for decoded bitmaps.
#[derive(Debug, Clone, Copy)]
pub struct PerceptualHasher {
    algorithm: HashAlgorithm,
    /// Side length of the hash grid; 8 gives 64 bits.
    hash_size: u32,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new(HashAlgorithm::Perceptual, 8)
    }
}

impl PerceptualHasher {
    pub fn new(algorithm: HashAlgorithm, hash_size: u32) -> Self {
        Self { algorithm, hash_size: hash_size.max(2) }
    }

    pub fn from_cfg(cfg: &FingerprintCfg) -> Self {
        Self::new(cfg.algorithm, cfg.hash_size)
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Consumes the bitmap so it is released as soon as the hash exists.
    /// Returns `None` for bitmaps that cannot be hashed.
    pub fn hash(&self, bitmap: ImageBitmap) -> Option<PerceptualHash> {
        if bitmap.width() == 0 || bitmap.height() == 0 {
            return None;
        }
        let hasher = self.algorithm.config(self.hash_size).to_hasher();
        let hash = hasher.hash_image(&bitmap.into_dynamic());
        let bytes = hash.as_bytes();
        if bytes.is_empty() {
            return None;
        }
        Some(PerceptualHash::from_bytes(bytes.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::test_images;

    #[test]
    fn distance_counts_differing_bits() {
        let a = PerceptualHash::from_u64(0);
        let b = PerceptualHash::from_u64(0b1011);
        assert_eq!(a.distance(&b), 3);
        assert_eq!(b.distance(&a), 3);
        assert_eq!(a.distance(&a), 0);
        assert_eq!(PerceptualHash::from_u64(0).distance(&PerceptualHash::from_u64(u64::MAX)), 64);
    }

    #[test]
    fn distance_penalises_length_mismatch() {
        let short = PerceptualHash::from_bytes(vec![0u8; 4]);
        let long = PerceptualHash::from_bytes(vec![0u8; 8]);
        assert_eq!(short.distance(&long), 32);
    }

    #[test]
    fn hex_rendering() {
        let h = PerceptualHash::from_u64(0x00ff_0000_0000_0a0b);
        assert_eq!(h.to_string(), "00ff000000000a0b");
    }

    #[test]
    fn default_hash_is_64_bits() {
        let hasher = PerceptualHasher::default();
        let hash = hasher.hash(test_images::landmark(96, 64)).expect("hash");
        assert_eq!(hash.bits(), 64);
    }

    #[test]
    fn identical_bitmaps_hash_identically() {
        let hasher = PerceptualHasher::default();
        let a = hasher.hash(test_images::landmark(96, 64)).expect("hash");
        let b = hasher.hash(test_images::landmark(96, 64)).expect("hash");
        assert_eq!(a.distance(&b), 0);
    }

    #[test]
    fn different_content_is_far_apart() {
        let hasher = PerceptualHasher::default();
        let a = hasher.hash(test_images::landmark(96, 64)).expect("hash");
        let b = hasher.hash(test_images::checkerboard(96, 64)).expect("hash");
        assert!(a.distance(&b) > 0);
    }

    #[test]
    fn empty_bitmap_is_unavailable() {
        let hasher = PerceptualHasher::default();
        assert!(hasher.hash(test_images::solid(0, 0)).is_none());
    }
}
