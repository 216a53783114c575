//! Extension points consumed by the Overlink core

pub mod bridge;
pub mod handshake;

// Re-export commonly used traits
pub use bridge::Bridge;
pub use handshake::HandshakeTransport;
