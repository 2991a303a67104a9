//! Helper utilities for appx testing

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Deterministic lowercase ASCII text of `len` bytes
///
/// The last byte is never in `1..=16`, so cipher round trips are exact.
pub fn letters(len: usize) -> Vec<u8> {
    (0..len).map(|i| b'a' + (i % 26) as u8).collect()
}

/// Seeded pseudo-random bytes of `len` bytes
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen()).collect()
}

/// Seeded pseudo-random alphanumeric text of `len` bytes
pub fn random_text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| rng.sample(rand::distributions::Alphanumeric))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letters() {
        assert_eq!(letters(3), b"abc");
        assert_eq!(letters(27)[26], b'a');
    }

    #[test]
    fn test_seeded_data_is_stable() {
        assert_eq!(random_bytes(64, 1), random_bytes(64, 1));
        assert_ne!(random_bytes(64, 1), random_bytes(64, 2));
        assert!(random_text(100, 3).iter().all(|b| b.is_ascii_alphanumeric()));
    }
}
