//! Deterministic feature-hashing embedder.
//!
//! Each lowercased alphanumeric token is hashed with 64-bit FNV-1a; the low
//! bits pick a bucket and the top bit picks the sign. The resulting term
//! vector is L2-normalized, so inner product between two embeddings is the
//! cosine of their (signed, hashed) term-frequency vectors. No model download
//! and no network: useful offline and in tests.

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub const DEFAULT_DIMS: usize = 384;
pub const MODEL_NAME: &str = "fnv1a-hash";

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Embed one text into `dims` dimensions.
///
/// Text with no tokens embeds to the zero vector.
pub fn embed(text: &str, dims: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; dims];
    if dims == 0 {
        return v;
    }
    for token in tokens(text) {
        let h = fnv1a(token.as_bytes());
        let bucket = (h % dims as u64) as usize;
        let sign = if h >> 63 == 1 { -1.0 } else { 1.0 };
        v[bucket] += sign;
    }
    super::l2_normalize(&mut v);
    v
}
