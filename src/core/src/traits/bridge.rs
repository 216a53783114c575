//! Bridge trait for external ecosystems

use crate::error::Result;
use crate::types::BridgeInfo;
use async_trait::async_trait;

/// Adapter exposing an external ecosystem's capabilities to the overlay.
///
/// The core never inspects request or response payloads; it only selects a
/// bridge by capability tag and forwards the bytes.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Static description of the bridge
    fn info(&self) -> BridgeInfo;

    /// Forward a request and wait for the response
    async fn invoke(&self, request: Vec<u8>) -> Result<Vec<u8>>;
}
