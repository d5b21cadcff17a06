//! Deterministic string hashing (FNV-1a, 32 bit)
//!
//! `std::collections::hash_map::DefaultHasher` is randomly seeded per process,
//! which would make fallback motion differ between runs. FNV-1a is stable.

use std::fmt;

/// FNV-1a 32-bit offset basis
pub const FNV_OFFSET_BASIS: u32 = 2_166_136_261;

/// FNV-1a 32-bit prime
pub const FNV_PRIME: u32 = 16_777_619;

/// Hash a string with FNV-1a
pub fn fnv1a(input: &str) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.write_str_chars(input);
    hasher.finish()
}

/// Incremental FNV-1a hasher.
///
/// Implements [`fmt::Write`] so composite keys such as `"{track}{bar}"` can be
/// hashed with `write!` without building an intermediate `String`.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a {
    state: u32,
}

impl Fnv1a {
    /// Create a hasher at the offset basis
    pub fn new() -> Self {
        Self {
            state: FNV_OFFSET_BASIS,
        }
    }

    /// Feed every character of `s` (by Unicode scalar value)
    pub fn write_str_chars(&mut self, s: &str) {
        for ch in s.chars() {
            self.state ^= ch as u32;
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    /// Current hash value
    pub fn finish(&self) -> u32 {
        self.state
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Write for Fnv1a {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_str_chars(s);
        Ok(())
    }
}
