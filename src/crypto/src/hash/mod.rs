//! BLAKE3 hashing helpers

pub mod blake3;

pub use self::blake3::{fingerprint, Transcript};
