//! Difficulty arithmetic for cumulative chain weight

/// Shift exponent at which the compact mantissa `0xffff` means difficulty 1
const DIFF1_SHIFT: u32 = 29;

/// DifficultyFromBits: ℕ → ℝ
///
/// Convert the compact `bits` field of a header into the floating-point
/// difficulty used to weigh chains:
/// 1. Let mantissa = bits & 0x00ffffff, shift = bits >> 24
/// 2. Let d = 0xffff / mantissa
/// 3. Scale d by 256 per step until shift reaches 29
/// 4. Return d (a zero mantissa has no meaningful target and weighs 0)
pub fn difficulty_from_bits(bits: u32) -> f64 {
    let mantissa = bits & 0x00ff_ffff;
    if mantissa == 0 {
        return 0.0;
    }

    let mut shift = (bits >> 24) & 0xff;
    let mut diff = 0xffff as f64 / mantissa as f64;

    while shift < DIFF1_SHIFT {
        diff *= 256.0;
        shift += 1;
    }
    while shift > DIFF1_SHIFT {
        diff /= 256.0;
        shift -= 1;
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_one() {
        assert_eq!(difficulty_from_bits(0x1d00ffff), 1.0);
    }

    #[test]
    fn test_difficulty_increases_as_target_shrinks() {
        let easy = difficulty_from_bits(0x1d00ffff);
        let hard = difficulty_from_bits(0x1c00ffff);
        assert_eq!(hard, 256.0);
        assert!(hard > easy);

        // Smaller mantissa at the same exponent is harder too
        assert!(difficulty_from_bits(0x1d007fff) > easy);
    }

    #[test]
    fn test_difficulty_real_header() {
        // Block 32256 retarget: bits 0x1d00d86a
        let d = difficulty_from_bits(0x1d00d86a);
        assert!((d - 1.182899534312841).abs() < 1e-9);
    }

    #[test]
    fn test_difficulty_zero_mantissa() {
        assert_eq!(difficulty_from_bits(0x1d000000), 0.0);
    }
}
