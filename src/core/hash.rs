//! State Hashing for Verification
//!
//! Provides deterministic hashing of simulation state for:
//! - Save/restore round-trip verification
//! - Regression checks on the tick loop
//!
//! Update order is part of the hash contract; callers must feed fields in a
//! fixed order.

use sha2::{Digest, Sha256};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Deterministic hasher for simulation state.
///
/// Wraps SHA-256 with helpers for the scalar types the core uses. Floats are
/// hashed by bit pattern, so two states that hash equal are bit-identical.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with a domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for train state.
    pub fn for_train_state() -> Self {
        Self::new(b"RAILMOTIVE_STATE_V1")
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an f32 value (bit pattern, little-endian).
    #[inline]
    pub fn update_f32(&mut self, value: f32) {
        self.hasher.update(value.to_bits().to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute a train state hash.
///
/// The closure adds the state-specific fields; the car count is always
/// hashed first so consists of different lengths never collide on a prefix.
pub fn compute_state_hash<F>(car_count: u32, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_train_state();
    hasher.update_u32(car_count);
    add_state(&mut hasher);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_hasher_determinism() {
        let make_hash = || {
            let mut hasher = StateHasher::for_train_state();
            hasher.update_u32(3);
            hasher.update_f32(12.5);
            hasher.update_bool(true);
            hasher.update_u8(2);
            hasher.finalize()
        };

        assert_eq!(make_hash(), make_hash());
    }

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_domain_separation() {
        let hash1 = {
            let mut h = StateHasher::new(b"DOMAIN_A");
            h.update_bytes(&[1, 2, 3]);
            h.finalize()
        };
        let hash2 = {
            let mut h = StateHasher::new(b"DOMAIN_B");
            h.update_bytes(&[1, 2, 3]);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_float_bit_pattern() {
        let hash = |v: f32| {
            let mut h = StateHasher::new(b"f32");
            h.update_f32(v);
            h.finalize()
        };

        assert_ne!(hash(0.0), hash(-0.0));
        assert_eq!(hash(1.5), hash(1.5));
    }

    #[test]
    fn test_compute_state_hash() {
        let hash1 = compute_state_hash(2, |h| h.update_f32(5.0));
        let hash2 = compute_state_hash(2, |h| h.update_f32(5.0));
        let hash3 = compute_state_hash(3, |h| h.update_f32(5.0));

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
    }
}
