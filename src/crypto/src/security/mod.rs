//! Session security: handshakes, message sealing and signatures

mod handshake;
pub mod manager;
pub mod memory;
pub mod session;

pub use manager::SecurityManager;
pub use memory::InMemoryHandshake;
pub use session::{ExpiryReport, SecurityStats, SessionInfo};
