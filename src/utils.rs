use std::hash::{BuildHasher, Hasher};

/// Forwards an already-hashed u64 key straight through as the hash value.
/// Scope ids are seeded xxhash digests, so the registry map would only burn
/// cycles hashing them a second time.
#[derive(Default)]
pub(crate) struct PrehashedId {
    id: u64,
}

impl Hasher for PrehashedId {
    fn finish(&self) -> u64 {
        self.id
    }

    fn write(&mut self, _bytes: &[u8]) {
        debug_assert!(false, "prehashed keys must arrive as u64 digests")
    }

    fn write_u64(&mut self, id: u64) {
        self.id = id;
    }
}

/// [`BuildHasher`] for maps whose keys are pre-hashed scope ids.
#[derive(Default, Debug, Clone, Copy)]
pub(crate) struct BuildPrehashed;

impl BuildHasher for BuildPrehashed {
    type Hasher = PrehashedId;

    fn build_hasher(&self) -> Self::Hasher {
        PrehashedId::default()
    }
}
