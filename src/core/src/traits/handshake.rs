//! Handshake transport trait

use crate::error::Result;
use crate::types::{HandshakeOffer, HandshakeReply};
use async_trait::async_trait;

/// Carries a handshake offer to a peer and returns its reply.
///
/// Implementations own the actual socket or stream; the security layer only
/// builds and checks the messages. A peer refusing the session should answer
/// with `CoreError::HandshakeRejected`.
#[async_trait]
pub trait HandshakeTransport: Send + Sync {
    async fn exchange(&self, address: &str, offer: HandshakeOffer) -> Result<HandshakeReply>;
}
