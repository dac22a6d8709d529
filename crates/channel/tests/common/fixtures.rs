//! Test fixtures for generating test data.

use bytes::Bytes;
use chanstore_channel::{ChannelId, Credentials, MemoryBackend};

/// Token accepted by [`memory_backend`].
pub const TOKEN: &str = "test-token";

/// Channel created by [`memory_backend`].
pub const CHANNEL: &str = "1000";

/// Generate deterministic test data based on a seed.
#[allow(dead_code)]
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// A memory backend with [`TOKEN`] and [`CHANNEL`] registered.
#[allow(dead_code)]
pub fn memory_backend() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.add_token(TOKEN);
    backend.add_channel(CHANNEL);
    backend
}

/// Credentials for [`TOKEN`].
#[allow(dead_code)]
pub fn credentials() -> Credentials {
    Credentials::new(TOKEN)
}

/// Id of [`CHANNEL`].
#[allow(dead_code)]
pub fn channel() -> ChannelId {
    ChannelId::new(CHANNEL)
}
