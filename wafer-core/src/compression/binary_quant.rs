//! Binary quantization: compress each dimension to 1 bit.
//!
//! The bit mapping is sign-based (bit = 1 iff value > 0) and independent of
//! the sampled quantiles. The quantiles exist to drive merge heuristics and
//! to keep the on-disk format compatible with multi-bit quantizers that do
//! calibrate against them.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::compression::bitpack;
use crate::core::errors::{ErrorCode, Result, WaferError};

/// Score correction stored with every 1-bit record. Always zero; the slot is
/// retained for format compatibility with multi-bit variants.
pub const SCORE_CORRECTION: f32 = 0.0;

/// Per-field scalar statistics for 1-bit quantization.
///
/// `lower` and `upper` are the sampled global min/max quantiles. They are
/// always finite and distinct.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BinaryQuantizer {
    lower: f32,
    upper: f32,
}

impl BinaryQuantizer {
    /// Create a quantizer from pre-computed quantiles. Equal quantiles are
    /// nudged apart so downstream range arithmetic never divides by zero.
    pub fn new(lower: f32, upper: f32) -> Self {
        debug_assert!(lower.is_finite() && upper.is_finite());
        if lower == upper {
            BinaryQuantizer {
                lower: lower - 1.0,
                upper: upper + 1.0,
            }
        } else {
            BinaryQuantizer { lower, upper }
        }
    }

    /// One sampling pass over all coordinates of all vectors, tracking the
    /// global min/max. Zero vectors yields the guarded `(-1, 1)` pair.
    pub fn from_sampling<'a, I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a [f32]>,
    {
        let mut lower = f32::INFINITY;
        let mut upper = f32::NEG_INFINITY;
        let mut sampled = 0usize;
        for vector in vectors {
            for &value in vector {
                if value < lower {
                    lower = value;
                }
                if value > upper {
                    upper = value;
                }
            }
            sampled += 1;
        }
        if sampled == 0 || !lower.is_finite() || !upper.is_finite() {
            return BinaryQuantizer::new(0.0, 0.0);
        }
        let quantizer = BinaryQuantizer::new(lower, upper);
        debug!(
            sampled,
            lower = quantizer.lower,
            upper = quantizer.upper,
            "calibrated binary quantizer"
        );
        quantizer
    }

    /// Quantize a raw vector into `packed` (bit = 1 iff value > 0) and return
    /// the score correction, which is always zero at 1 bit.
    pub fn quantize(&self, raw: &[f32], packed: &mut [u8]) -> Result<f32> {
        if packed.len() != bitpack::required_bytes(raw.len()) {
            return Err(WaferError::contract(
                ErrorCode::PackBufferSize,
                format!(
                    "quantize buffer is {} bytes, {} dimensions require {}",
                    packed.len(),
                    raw.len(),
                    bitpack::required_bytes(raw.len())
                ),
            ));
        }
        packed.fill(0);
        for (i, &value) in raw.iter().enumerate() {
            if value > 0.0 {
                packed[i >> 3] |= 0x80 >> (i & 7);
            }
        }
        Ok(SCORE_CORRECTION)
    }

    pub fn lower_quantile(&self) -> f32 {
        self.lower
    }

    pub fn upper_quantile(&self) -> f32 {
        self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::bitpack::{required_bytes, unpack};

    #[test]
    fn degenerate_quantiles_are_nudged_apart() {
        let q = BinaryQuantizer::new(0.5, 0.5);
        assert_eq!(q.lower_quantile(), -0.5);
        assert_eq!(q.upper_quantile(), 1.5);
        assert!(q.lower_quantile() < q.upper_quantile());
    }

    #[test]
    fn sampling_zero_vectors_is_guarded() {
        let q = BinaryQuantizer::from_sampling(std::iter::empty::<&[f32]>());
        assert_eq!(q.lower_quantile(), -1.0);
        assert_eq!(q.upper_quantile(), 1.0);
    }

    #[test]
    fn sampling_tracks_global_min_max() {
        let a = [0.25f32, -3.0, 1.0];
        let b = [7.5f32, 0.0, -0.5];
        let q = BinaryQuantizer::from_sampling([a.as_slice(), b.as_slice()]);
        assert_eq!(q.lower_quantile(), -3.0);
        assert_eq!(q.upper_quantile(), 7.5);
    }

    #[test]
    fn sampling_constant_data_stays_distinct() {
        let a = [2.0f32, 2.0];
        let q = BinaryQuantizer::from_sampling([a.as_slice()]);
        assert_eq!(q.lower_quantile(), 1.0);
        assert_eq!(q.upper_quantile(), 3.0);
    }

    #[test]
    fn quantize_is_sign_based() {
        let q = BinaryQuantizer::new(-10.0, 10.0);
        let raw = [1.0f32, -1.0, 0.5, -0.5, 0.0, 2.0, -2.0, 0.1, -0.1];
        let mut packed = vec![0u8; required_bytes(raw.len())];
        let correction = q.quantize(&raw, &mut packed).unwrap();
        assert_eq!(correction, 0.0);

        let mut floats = vec![0f32; raw.len()];
        unpack(&packed, &mut floats).unwrap();
        for (i, &value) in raw.iter().enumerate() {
            let expected = if value > 0.0 { 1.0 } else { -1.0 };
            assert_eq!(floats[i], expected, "dimension {}", i);
        }
    }

    #[test]
    fn quantize_is_scale_independent() {
        let narrow = BinaryQuantizer::new(-0.1, 0.1);
        let wide = BinaryQuantizer::new(-100.0, 100.0);
        let raw = [0.3f32, -0.7, 4.0, -9.0];
        let mut a = vec![0u8; 1];
        let mut b = vec![0u8; 1];
        narrow.quantize(&raw, &mut a).unwrap();
        wide.quantize(&raw, &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn quantize_rejects_wrong_buffer() {
        let q = BinaryQuantizer::new(-1.0, 1.0);
        let raw = [1.0f32; 9];
        let mut packed = vec![0u8; 1];
        assert!(q.quantize(&raw, &mut packed).is_err());
    }
}
