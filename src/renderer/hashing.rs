// renderer/hashing.rs

/// Boost-style hash mixing. Order sensitive: `combine(combine(s, a), b)`
/// differs from `combine(combine(s, b), a)` for almost every input.
#[inline]
pub const fn hash_combine(seed: u64, value: u64) -> u64 {
    seed ^ value
        .wrapping_add(0x9e37_79b9)
        .wrapping_add(seed << 6)
        .wrapping_add(seed >> 2)
}

/// Hash of an identifier sequence, seeded with its length.
///
/// Used as the program cache key, so `[vert, frag]` and `[frag, vert]`
/// name two different programs. Callers that want one program must always
/// list its stages in the same order.
pub fn hash_identifiers(identifiers: &[u64]) -> u64 {
    identifiers
        .iter()
        .fold(identifiers.len() as u64, |seed, &id| hash_combine(seed, id))
}
