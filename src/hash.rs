use std::hash::{BuildHasherDefault, Hasher};

const MAX_PRIME: u64 = 11_400_714_819_323_198_549;

/// A hasher optimized for keys that are represented as a u32, such as
/// entity handles and component ids.
#[derive(Default)]
pub struct U32Hasher(u64);

impl Hasher for U32Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        use core::convert::TryInto;
        let seed = u32::from_ne_bytes(bytes.try_into().unwrap()) as u64;
        self.0 = MAX_PRIME.wrapping_mul(seed);
    }
}

/// A hasher optimized for keys that are represented as a u64, such as
/// archetype keys.
#[derive(Default)]
pub struct U64Hasher(u64);

impl Hasher for U64Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        use core::convert::TryInto;
        let seed = u64::from_ne_bytes(bytes.try_into().unwrap());
        self.0 = MAX_PRIME.wrapping_mul(seed);
    }
}

/// A hasher optimized for keys that are represented as a u128, such as
/// transition and query cache keys.
#[derive(Default)]
pub struct U128Hasher(u64);

impl Hasher for U128Hasher {
    fn finish(&self) -> u64 {
        self.0
    }

    fn write(&mut self, bytes: &[u8]) {
        use core::convert::TryInto;
        let seed = u128::from_ne_bytes(bytes.try_into().unwrap());
        self.0 = MAX_PRIME.wrapping_mul(seed as u64 ^ (seed >> 64) as u64);
    }
}

/// A hasher for maps keyed by entity handle.
pub type EntityHasher = BuildHasherDefault<U32Hasher>;

/// A hasher for maps keyed by component id.
pub type ComponentIdHasher = BuildHasherDefault<U32Hasher>;

/// A hasher for maps keyed by archetype key.
pub type ArchetypeKeyHasher = BuildHasherDefault<U64Hasher>;

/// A hasher for the transition and query caches.
pub type CacheKeyHasher = BuildHasherDefault<U128Hasher>;

#[test]
fn hasher() {
    use core::hash::Hash;

    let mut a = U32Hasher::default();
    let mut b = U32Hasher::default();
    17u32.hash(&mut a);
    17u32.hash(&mut b);
    assert_eq!(a.finish(), b.finish());

    let mut c = U32Hasher::default();
    18u32.hash(&mut c);
    assert_ne!(a.finish(), c.finish());
}
