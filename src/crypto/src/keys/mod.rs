pub mod generation;

pub use generation::{verify_signature, SigningKeyPair};
