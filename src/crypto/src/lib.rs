//! # Overlink Cryptography Module
//!
//! Session security for the Overlink overlay protocol.
//!
//! ## Features
//!
//! - **Identity**: long-lived Ed25519 node keys, optionally derived from a seed
//! - **Handshake**: signed offer/reply with ephemeral X25519 key agreement
//! - **Sealing**: AES-GCM or ChaCha20-Poly1305 with per-session keys
//! - **Signatures**: every sealed message is signed with a per-session key
//!
//! ## Module Structure
//!
//! ```text
//! crypto/
//! ├── cipher/     - AEAD suites
//! ├── exchange/   - X25519 agreement and session key derivation
//! ├── hash/       - BLAKE3 transcripts
//! ├── keys/       - Ed25519 key pairs
//! └── security/   - Sessions, handshakes and the security manager
//! ```

pub mod cipher;
pub mod error;
pub mod exchange;
pub mod hash;
pub mod keys;
pub mod security;

pub use cipher::CipherSuite;
pub use error::{CryptoError, Result};
pub use keys::SigningKeyPair;
pub use security::{ExpiryReport, InMemoryHandshake, SecurityManager, SecurityStats, SessionInfo};
