//! Handshake and message transcripts
//!
//! Everything signed by the security layer is first reduced to a BLAKE3
//! transcript digest, so signatures cover every header field.

use crate::error::{CryptoError, Result};
use crate::hash::Transcript;
use crate::keys::verify_signature;
use overlink_core::{HandshakeOffer, HandshakeReply, Message, MessageType, SecurityMetadata};

pub(crate) fn offer_digest(offer: &HandshakeOffer) -> [u8; 32] {
    let mut t = Transcript::new("overlink-handshake-offer-v1");
    t.append(b"initiator", offer.initiator.as_str().as_bytes())
        .append(b"responder", offer.responder.as_str().as_bytes())
        .append(b"identity_key", offer.identity_key.as_bytes())
        .append(b"session_key", offer.session_key.as_bytes())
        .append(b"exchange_key", offer.exchange_key.as_bytes())
        .append(b"nonce", &offer.nonce)
        .append_i64(b"timestamp", offer.timestamp.timestamp_micros());
    t.finalize()
}

/// Digest of the full exchange; signed by the responder and fed into the
/// session key derivation on both sides.
pub(crate) fn reply_digest(offer: &HandshakeOffer, reply: &HandshakeReply) -> [u8; 32] {
    let mut t = Transcript::new("overlink-handshake-reply-v1");
    t.append(b"offer", &offer_digest(offer))
        .append(b"offer_signature", offer.signature.as_bytes())
        .append(b"responder", reply.responder.as_str().as_bytes())
        .append(b"identity_key", reply.identity_key.as_bytes())
        .append(b"session_key", reply.session_key.as_bytes())
        .append(b"exchange_key", reply.exchange_key.as_bytes())
        .append_i64(b"timestamp", reply.timestamp.timestamp_micros());
    t.finalize()
}

/// Both peers compute the same id from the transcript
pub(crate) fn session_id(transcript: &[u8; 32]) -> String {
    hex::encode(&transcript[..16])
}

pub(crate) fn verify_offer(offer: &HandshakeOffer) -> Result<()> {
    verify_signature(&offer.identity_key, &offer_digest(offer), &offer.signature)
        .map_err(|e| CryptoError::handshake(&offer.initiator, format!("offer rejected: {}", e)))
}

pub(crate) fn verify_reply(offer: &HandshakeOffer, reply: &HandshakeReply) -> Result<[u8; 32]> {
    let digest = reply_digest(offer, reply);
    verify_signature(&reply.identity_key, &digest, &reply.signature)
        .map_err(|e| CryptoError::handshake(&reply.responder, format!("reply rejected: {}", e)))?;
    Ok(digest)
}

fn type_tag(message_type: MessageType) -> u64 {
    match message_type {
        MessageType::Data => 0,
        MessageType::Control => 1,
        MessageType::Discovery => 2,
        MessageType::Bridge => 3,
    }
}

/// Associated data for the AEAD: the immutable message header
pub(crate) fn message_aad(message: &Message) -> [u8; 32] {
    let mut t = Transcript::new("overlink-message-header-v1");
    t.append(b"id", message.id.as_bytes())
        .append(b"source", message.source.as_str().as_bytes())
        .append(b"target", message.target.as_str().as_bytes())
        .append_u64(b"type", type_tag(message.message_type))
        .append_u64(b"priority", message.priority.level() as u64)
        .append_i64(b"created_at", message.created_at.timestamp_micros());
    t.finalize()
}

/// Digest signed by the sender: header, envelope fields and ciphertext
pub(crate) fn message_digest(message: &Message, metadata: &SecurityMetadata) -> [u8; 32] {
    let mut t = Transcript::new("overlink-message-signature-v1");
    t.append(b"header", &message_aad(message))
        .append(b"algorithm", metadata.algorithm.as_bytes())
        .append(b"key_id", metadata.key_id.as_bytes())
        .append_i64(b"timestamp", metadata.timestamp.timestamp_micros())
        .append(b"nonce", &metadata.nonce)
        .append(b"ciphertext", &message.content);
    t.finalize()
}
