//! FNV-1a hashing for routing keys.
//!
//! The routing key handed to an address resolver is a 32-bit FNV-1a digest of
//! the call's parameter set. Parameters are stored in an ordered map and each
//! value is hashed through its canonical `MsgPack` encoding, so equal parameter
//! sets yield the same key regardless of insertion order, process, or platform.

use std::io;

use crate::messages::Parameters;

/// FNV-1a offset basis (32-bit).
const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;

/// FNV-1a prime (32-bit).
const FNV_PRIME: u32 = 0x0100_0193;

/// Separator mixed in between a key and its value, and between entries, so
/// that `{"ab": 1}` and `{"a": "b1"}`-style concatenations cannot collide
/// trivially.
const FIELD_SEPARATOR: u8 = 0xff;

/// Streaming 32-bit FNV-1a hasher.
///
/// Implements [`io::Write`] so encoders can write straight into it without an
/// intermediate buffer. Writing never fails.
#[derive(Debug, Clone, Copy)]
pub struct Fnv1a(u32);

impl Fnv1a {
    /// Creates a hasher seeded with the FNV offset basis.
    #[must_use]
    pub const fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    /// Feeds bytes into the hash state.
    pub fn update(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.0 ^= u32::from(byte);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    /// Returns the current digest.
    #[must_use]
    pub const fn finish(&self) -> u32 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

impl io::Write for Fnv1a {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Computes a 32-bit FNV-1a hash over a byte slice.
///
/// # Examples
///
/// ```
/// use courier_core::hash::fnv1a_bytes;
///
/// assert_eq!(fnv1a_bytes(b"hello"), 1_335_831_723);
/// assert_eq!(fnv1a_bytes(b""), 2_166_136_261); // FNV offset basis
/// ```
#[must_use]
pub fn fnv1a_bytes(bytes: &[u8]) -> u32 {
    let mut hasher = Fnv1a::new();
    hasher.update(bytes);
    hasher.finish()
}

/// Computes the routing key for a parameter set.
///
/// Entries are visited in key order. For each entry the key's UTF-8 bytes and
/// the value's `MsgPack` encoding are hashed, each followed by a separator
/// byte. Nested `rmpv::Value::Map`s keep their own entry order, so two maps are
/// only guaranteed to hash alike when their nested entries are ordered alike.
#[must_use]
pub fn routing_key(parameters: &Parameters) -> u32 {
    let mut hasher = Fnv1a::new();
    for (name, value) in parameters {
        hasher.update(name.as_bytes());
        hasher.update(&[FIELD_SEPARATOR]);
        // Fnv1a's Write impl never errors, so the encoder cannot fail either.
        let _ = rmpv::encode::write_value(&mut hasher, value);
        hasher.update(&[FIELD_SEPARATOR]);
    }
    hasher.finish()
}
