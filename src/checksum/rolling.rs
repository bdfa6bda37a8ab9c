//! O(1)-updatable weak checksum

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Weak checksum over a byte window.
///
/// Two windows with equal contents always produce equal checksums; the
/// converse does not hold, so every hit must be confirmed with the strong
/// hash. Arithmetic wraps so that `roll` and `compute` agree bit-for-bit
/// even on windows large enough to overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RollingChecksum {
    /// Sum of bytes in the window
    pub s1: i64,
    /// Sum of `(window_len - i) * byte[i]`
    pub s2: i64,
}

impl RollingChecksum {
    /// Compute the checksum of a whole window from scratch (O(n)).
    pub fn compute(window: &[u8]) -> Self {
        let len = window.len() as i64;
        let mut s1: i64 = 0;
        let mut s2: i64 = 0;

        for (i, &byte) in window.iter().enumerate() {
            let byte = i64::from(byte);
            s1 = s1.wrapping_add(byte);
            s2 = s2.wrapping_add((len - i as i64).wrapping_mul(byte));
        }

        Self { s1, s2 }
    }

    /// Slide the window right by exactly one byte.
    ///
    /// `leaving` is the first byte of the current window, `entering` the byte
    /// just past its end. Sliding by more than one byte needs `compute`.
    pub fn roll(&self, window_len: i64, leaving: u8, entering: u8) -> Result<Self> {
        if window_len <= 0 {
            return Err(Error::InvalidWindow { length: window_len });
        }

        let leaving = i64::from(leaving);
        let entering = i64::from(entering);

        let s1 = self.s1.wrapping_sub(leaving).wrapping_add(entering);
        let s2 = self
            .s2
            .wrapping_sub(leaving.wrapping_mul(window_len))
            .wrapping_add(s1);

        Ok(Self { s1, s2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_compute_known_values() {
        // s1 = 1 + 2 + 3, s2 = 3*1 + 2*2 + 1*3
        let sum = RollingChecksum::compute(&[1, 2, 3]);
        assert_eq!(sum.s1, 6);
        assert_eq!(sum.s2, 10);
    }

    #[test]
    fn test_compute_empty_window() {
        assert_eq!(RollingChecksum::compute(&[]), RollingChecksum::default());
    }

    #[test]
    fn test_roll_matches_compute() {
        let data = b"abcdefgh";
        let rolled = RollingChecksum::compute(&data[0..4])
            .roll(4, b'a', b'e')
            .unwrap();
        assert_eq!(rolled, RollingChecksum::compute(&data[1..5]));
    }

    #[test]
    fn test_roll_across_whole_buffer() {
        let data: Vec<u8> = (0..2000u32).map(|i| (i * 31 % 251) as u8).collect();
        let window = 100usize;

        let mut sum = RollingChecksum::compute(&data[..window]);
        for start in 1..=data.len() - window {
            sum = sum
                .roll(window as i64, data[start - 1], data[start + window - 1])
                .unwrap();
            assert_eq!(sum, RollingChecksum::compute(&data[start..start + window]));
        }
    }

    #[test]
    fn test_roll_rejects_non_positive_window() {
        let sum = RollingChecksum::compute(b"abc");
        assert!(matches!(
            sum.roll(0, b'a', b'd'),
            Err(Error::InvalidWindow { length: 0 })
        ));
        assert!(matches!(
            sum.roll(-5, b'a', b'd'),
            Err(Error::InvalidWindow { length: -5 })
        ));
    }

    proptest! {
        #[test]
        fn prop_roll_equals_compute(window in proptest::collection::vec(any::<u8>(), 1..512), next in any::<u8>()) {
            let rolled = RollingChecksum::compute(&window)
                .roll(window.len() as i64, window[0], next)
                .unwrap();

            let mut shifted = window[1..].to_vec();
            shifted.push(next);

            prop_assert_eq!(rolled, RollingChecksum::compute(&shifted));
        }
    }
}
