//! Content keys and identifiers.

use std::fmt;
use std::hash::Hasher;

use siphasher::sip::SipHasher13;

/// Fixed SipHash keys. Asset keys must be stable across runs and machines.
const KEY_K0: u64 = 0x7465_7373_656c_6173;
const KEY_K1: u64 = 0x7365_745f_6b65_7931;

/// Hash of an asset's identifying string (path or synthetic name).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey(pub u64);

impl AssetKey {
    /// Hashes a path or synthetic asset name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        let mut hasher = SipHasher13::new_with_keys(KEY_K0, KEY_K1);
        hasher.write(name.as_bytes());
        Self(hasher.finish())
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Dense index of a loaded asset inside its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetId(pub u32);

impl AssetId {
    /// Returned by lookups that have no answer.
    pub const INVALID: Self = Self(u32::MAX);

    /// Slot index.
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is [`Self::INVALID`].
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let a = AssetKey::from_name("world/structures/tower.tsas");
        let b = AssetKey::from_name("world/structures/tower.tsas");
        assert_eq!(a, b);
        assert_ne!(a, AssetKey::from_name("world/structures/tower2.tsas"));
        assert_eq!(a.to_string().len(), 16);
    }

    #[test]
    fn test_invalid_id() {
        assert!(!AssetId::INVALID.is_valid());
        assert!(AssetId(0).is_valid());
    }
}
