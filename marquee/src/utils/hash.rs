//! Hash utilities.
//!
//! Used to derive stable stand-in identifiers (see
//! [`crate::listing::RawListing::resolve_identifier`]).

/// Simple FNV-1a 64-bit hash
///
/// Non-cryptographic and deterministic across runs and platforms, which is
/// all a synthetic identifier needs. No uniqueness guarantee is implied.
///
/// # Example
/// ```
/// use marquee::utils::hash::fnv1a64;
///
/// let hash = fnv1a64("https://www.airbnb.com/rooms/undefined");
/// assert_ne!(hash, 0);
/// ```
pub fn fnv1a64(s: &str) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET_BASIS;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Short hex digest (8 chars) of `s`, used as the body of synthetic ids.
pub fn short_digest(s: &str) -> String {
    format!("{:08x}", (fnv1a64(s) >> 32) as u32)
}
