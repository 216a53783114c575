//! Integration tests for session establishment and message sealing
//!
//! Two security managers talk through the in-memory handshake transport,
//! the same way two overlay nodes would over a real link.

use overlink_core::{DeliveryStatus, Message, NodeId, OverlayConfig, SecurityMode};
use overlink_crypto::{CryptoError, InMemoryHandshake, SecurityManager};
use std::sync::Arc;
use std::time::Duration;

fn config(id: &str) -> OverlayConfig {
    OverlayConfig {
        local_node_id: id.to_string(),
        ..Default::default()
    }
}

struct Pair {
    transport: Arc<InMemoryHandshake>,
    a: Arc<SecurityManager>,
    b: Arc<SecurityManager>,
}

fn pair_with(a_config: OverlayConfig, b_config: OverlayConfig) -> Pair {
    let transport = Arc::new(InMemoryHandshake::new());
    let a = Arc::new(SecurityManager::new("a").with_transport(transport.clone()));
    let b = Arc::new(SecurityManager::new("b").with_transport(transport.clone()));
    a.initialize(&a_config).unwrap();
    b.initialize(&b_config).unwrap();
    transport.register_peer(a.clone());
    transport.register_peer(b.clone());
    Pair { transport, a, b }
}

fn pair() -> Pair {
    pair_with(config("a"), config("b"))
}

fn b_id() -> NodeId {
    NodeId::from("b")
}

#[tokio::test]
async fn test_round_trip_between_peers() {
    let p = pair();
    let info = p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    assert!(info.is_active);

    // both sides derive the same session id from the transcript
    let remote = p.b.session_info(&NodeId::from("a")).unwrap();
    assert_eq!(remote.session_id, info.session_id);
    assert_eq!(remote.peer_public_key, info.public_key);

    let sealed = p.a.encrypt(Message::new("a", "b", b"hello overlay".to_vec())).unwrap();
    assert_eq!(sealed.delivery_status, DeliveryStatus::Encrypted);
    assert_ne!(sealed.content, b"hello overlay".to_vec());
    let metadata = sealed.security.as_ref().unwrap();
    assert_eq!(metadata.algorithm, "AES-256-GCM");
    assert_eq!(metadata.key_id, info.session_id);

    let opened = p.b.decrypt(sealed).unwrap();
    assert_eq!(opened.content, b"hello overlay".to_vec());
    assert_eq!(opened.delivery_status, DeliveryStatus::Encrypted);
}

#[tokio::test]
async fn test_reply_direction_uses_same_session() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let sealed = p.b.encrypt(Message::new("b", "a", b"pong".to_vec())).unwrap();
    let opened = p.a.decrypt(sealed).unwrap();
    assert_eq!(opened.content, b"pong".to_vec());
}

#[tokio::test]
async fn test_round_trip_with_each_cipher() {
    for (algorithm, bits) in [("AES-128-GCM", 128), ("ChaCha20-Poly1305", 256)] {
        let cfg = |id: &str| OverlayConfig {
            encryption_algorithm: algorithm.to_string(),
            key_size_bits: bits,
            ..config(id)
        };
        let p = pair_with(cfg("a"), cfg("b"));
        p.a.establish_session(&b_id(), "mem://b").await.unwrap();

        let sealed = p.a.encrypt(Message::new("a", "b", vec![7u8; 100])).unwrap();
        assert_eq!(sealed.security.as_ref().unwrap().algorithm, algorithm);
        assert_eq!(p.b.decrypt(sealed).unwrap().content, vec![7u8; 100]);
    }
}

#[tokio::test]
async fn test_tampered_signature_rejected() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let mut sealed = p.a.encrypt(Message::new("a", "b", b"payload".to_vec())).unwrap();
    sealed.security.as_mut().unwrap().signature.as_bytes_mut()[0] ^= 0xff;

    assert!(matches!(p.b.decrypt(sealed), Err(CryptoError::SignatureInvalid(_))));
}

#[tokio::test]
async fn test_tampered_ciphertext_fails_signature_first() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let mut sealed = p.a.encrypt(Message::new("a", "b", b"payload".to_vec())).unwrap();
    sealed.content[0] ^= 0x01;
    assert!(matches!(p.b.decrypt(sealed), Err(CryptoError::SignatureInvalid(_))));

    let mut sealed = p.a.encrypt(Message::new("a", "b", b"payload".to_vec())).unwrap();
    sealed.target = NodeId::from("c");
    assert!(p.b.decrypt(sealed).is_err());
}

#[tokio::test]
async fn test_missing_metadata_rejected() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let mut sealed = p.a.encrypt(Message::new("a", "b", b"payload".to_vec())).unwrap();
    sealed.security = None;
    assert!(matches!(p.b.decrypt(sealed), Err(CryptoError::SignatureInvalid(_))));
}

#[tokio::test]
async fn test_encrypt_without_session_fails() {
    let p = pair();
    let result = p.a.encrypt(Message::new("a", "b", b"x".to_vec()));
    assert!(matches!(result, Err(CryptoError::NoActiveSession(_))));
}

#[tokio::test]
async fn test_zero_timeout_session_is_never_usable() {
    let cfg = |id: &str| OverlayConfig {
        session_timeout_hours: 0.0,
        ..config(id)
    };
    let p = pair_with(cfg("a"), cfg("b"));

    let info = p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    assert!(!info.is_active);

    let result = p.a.encrypt(Message::new("a", "b", b"late".to_vec()));
    assert!(matches!(result, Err(CryptoError::NoActiveSession(_))));

    let report = p.a.rotate_or_expire_sessions().unwrap();
    assert_eq!(report.expired, 1);
    assert_eq!(p.a.stats().unwrap().active_sessions, 0);
}

#[tokio::test]
async fn test_expiry_scan_keeps_live_sessions() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let report = p.a.rotate_or_expire_sessions().unwrap();
    assert_eq!(report.expired, 0);
    assert_eq!(report.purged, 0);
    assert!(p.a.has_active_session(&b_id()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_establish_creates_one_session() {
    let p = pair();
    // keeps the first handshake in flight while the others queue up
    p.transport.set_delay(Duration::from_millis(30));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let a = p.a.clone();
        handles.push(tokio::spawn(async move {
            a.establish_session(&NodeId::from("b"), "mem://b").await
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().session_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(p.transport.exchange_count(), 1);

    let stats = p.a.stats().unwrap();
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(stats.total_sessions, 1);
}

#[tokio::test]
async fn test_rejected_handshake() {
    let p = pair();
    p.transport.reject("b");

    let result = p.a.establish_session(&b_id(), "mem://b").await;
    assert!(matches!(result, Err(CryptoError::HandshakeFailed { .. })));
    assert!(!p.a.has_active_session(&b_id()));
}

#[tokio::test]
async fn test_handshake_timeout() {
    let p = pair_with(
        OverlayConfig {
            connection_timeout_ms: 20,
            ..config("a")
        },
        config("b"),
    );
    p.transport.set_delay(Duration::from_millis(200));

    match p.a.establish_session(&b_id(), "mem://b").await {
        Err(CryptoError::HandshakeFailed { node, reason }) => {
            assert_eq!(node, "b");
            assert!(reason.contains("timed out"), "{}", reason);
        }
        other => panic!("expected handshake timeout, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_peer_fails_handshake() {
    let p = pair();
    let result = p.a.establish_session(&NodeId::from("nobody"), "mem://x").await;
    assert!(matches!(result, Err(CryptoError::HandshakeFailed { .. })));
}

#[tokio::test]
async fn test_auto_accept_spawns_peer() {
    let transport = Arc::new(InMemoryHandshake::new().with_auto_accept(config("template")));
    let a = SecurityManager::new("a").with_transport(transport.clone());
    a.initialize(&config("a")).unwrap();

    a.establish_session(&NodeId::from("fresh"), "mem://fresh").await.unwrap();
    let peer = transport.peer(&NodeId::from("fresh")).unwrap();
    assert!(peer.has_active_session(&NodeId::from("a")));
}

#[tokio::test]
async fn test_identity_change_is_refused() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    assert!(p.a.close_session(&b_id()));

    let impostor = Arc::new(SecurityManager::new("b"));
    impostor.initialize(&config("b")).unwrap();
    p.transport.register_peer(impostor);

    let result = p.a.establish_session(&b_id(), "mem://b").await;
    assert!(matches!(result, Err(CryptoError::HandshakeFailed { .. })));
}

#[tokio::test]
async fn test_closed_session_blocks_encrypt_but_still_verifies() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    let sealed = p.a.encrypt(Message::new("a", "b", b"in flight".to_vec())).unwrap();

    assert!(p.a.close_session(&b_id()));
    assert!(!p.a.close_session(&b_id()));

    assert!(p.a.verify_signature(&sealed).is_ok());
    assert!(p.b.verify_signature(&sealed).is_ok());
    assert!(matches!(
        p.a.encrypt(Message::new("a", "b", b"next".to_vec())),
        Err(CryptoError::NoActiveSession(_))
    ));
}

#[tokio::test]
async fn test_strict_mode_rejects_replay() {
    let strict = |id: &str| OverlayConfig {
        security_mode: SecurityMode::Strict,
        ..config(id)
    };
    let p = pair_with(strict("a"), strict("b"));
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let sealed = p.a.encrypt(Message::new("a", "b", b"once".to_vec())).unwrap();
    assert!(p.b.decrypt(sealed.clone()).is_ok());
    assert!(matches!(p.b.decrypt(sealed), Err(CryptoError::SignatureInvalid(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_strict_mode_accepts_concurrent_copies_once() {
    let strict = |id: &str| OverlayConfig {
        security_mode: SecurityMode::Strict,
        ..config(id)
    };
    let p = pair_with(strict("a"), strict("b"));
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    let sealed = p.a.encrypt(Message::new("a", "b", b"once".to_vec())).unwrap();

    let barrier = Arc::new(tokio::sync::Barrier::new(8));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let b = p.b.clone();
        let copy = sealed.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            b.decrypt(copy)
        }));
    }

    let mut accepted = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(opened) => {
                assert_eq!(opened.content, b"once".to_vec());
                accepted += 1;
            }
            Err(e) => assert!(matches!(e, CryptoError::SignatureInvalid(_))),
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn test_standard_mode_allows_redelivery() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let sealed = p.a.encrypt(Message::new("a", "b", b"twice".to_vec())).unwrap();
    assert!(p.b.decrypt(sealed.clone()).is_ok());
    assert!(p.b.decrypt(sealed).is_ok());
}

#[tokio::test]
async fn test_encrypt_rejects_sealed_message() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let sealed = p.a.encrypt(Message::new("a", "b", b"x".to_vec())).unwrap();
    assert!(matches!(p.a.encrypt(sealed), Err(CryptoError::InvalidMessage(_))));
}

#[tokio::test]
async fn test_stats_count_pinned_keys() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();

    let stats = p.a.stats().unwrap();
    assert_eq!(stats.known_node_keys, 1);
    assert_eq!(stats.active_sessions, 1);
    assert_eq!(p.b.stats().unwrap().known_node_keys, 1);
}

#[tokio::test]
async fn test_shutdown_invalidates_sessions() {
    let p = pair();
    p.a.establish_session(&b_id(), "mem://b").await.unwrap();
    p.a.shutdown();

    assert!(!p.a.has_active_session(&b_id()));
    assert!(matches!(
        p.a.encrypt(Message::new("a", "b", b"x".to_vec())),
        Err(CryptoError::NotInitialized)
    ));
}
