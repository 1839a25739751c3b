//! IEEE 754 binary16 sample codec used by the AUDI sub-chunk.

use half::f16;

pub const BYTES_PER_SAMPLE: usize = 2;

/// Encode interleaved f32 samples as little-endian binary16.
///
/// Rounds to nearest, ties to even. Values past the binary16 range saturate to
/// infinity and values below half the smallest subnormal flush to signed zero.
pub fn encode_samples(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * BYTES_PER_SAMPLE);
    for &sample in samples {
        out.extend_from_slice(&f16::from_f32(sample).to_le_bytes());
    }
    out
}

/// Decode a little-endian binary16 payload. Widening to f32 is exact.
///
/// The payload must hold a whole number of frames of `channels` samples.
pub fn decode_samples(input: &[u8], channels: u32) -> Option<Vec<f32>> {
    let frame_bytes = channels as usize * BYTES_PER_SAMPLE;
    if frame_bytes == 0 || input.len() % frame_bytes != 0 {
        return None;
    }

    Some(
        input
            .chunks_exact(BYTES_PER_SAMPLE)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: f32) -> f32 {
        decode_samples(&encode_samples(&[value]), 1).unwrap()[0]
    }

    #[test]
    fn test_exact_values_survive() {
        for value in [0.0, 1.0, -1.0, 0.5, -0.25, 0.0999755859375, 65504.0] {
            assert_eq!(round_trip(value), value);
        }
    }

    #[test]
    fn test_known_bit_patterns() {
        assert_eq!(encode_samples(&[1.0]), vec![0x00, 0x3C]);
        assert_eq!(encode_samples(&[-2.0]), vec![0x00, 0xC0]);
        assert_eq!(encode_samples(&[-0.0]), vec![0x00, 0x80]);
        // smallest subnormal
        assert_eq!(decode_samples(&[0x01, 0x00], 1).unwrap()[0], 2f32.powi(-24));
    }

    #[test]
    fn test_round_to_nearest_even() {
        // 1 + 2^-11 sits exactly between 1.0 and the next half (1 + 2^-10).
        assert_eq!(round_trip(1.0 + 2f32.powi(-11)), 1.0);
        // 1 + 3 * 2^-11 ties upward to the even mantissa 1 + 2^-9.
        assert_eq!(round_trip(1.0 + 3.0 * 2f32.powi(-11)), 1.0 + 2f32.powi(-9));
    }

    #[test]
    fn test_saturation_and_underflow() {
        assert_eq!(round_trip(1.0e6), f32::INFINITY);
        assert_eq!(round_trip(-1.0e6), f32::NEG_INFINITY);
        let tiny = round_trip(1.0e-9);
        assert_eq!(tiny, 0.0);
        assert!(round_trip(-1.0e-9).is_sign_negative());
    }

    #[test]
    fn test_quantization_error_within_half_ulp() {
        for i in 0..2000 {
            let value = (i as f32 / 1000.0) - 1.0 + 0.000123;
            let decoded = round_trip(value);
            // binary16 has 11 significant bits
            let ulp = 2f32.powi(value.abs().log2().floor() as i32 - 10);
            assert!((decoded - value).abs() <= ulp / 2.0, "{value} -> {decoded}");
        }
    }

    #[test]
    fn test_decode_rejects_partial_frames() {
        assert!(decode_samples(&[0u8; 3], 1).is_none());
        assert!(decode_samples(&[0u8; 6], 2).is_none());
        assert!(decode_samples(&[0u8; 4], 0).is_none());
        assert_eq!(decode_samples(&[], 2).unwrap(), Vec::<f32>::new());
    }
}
