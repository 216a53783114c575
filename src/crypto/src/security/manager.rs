//! Session-based security manager
//!
//! Owns the node identity key, every session and the pinned identity keys
//! of known peers. Sessions are created by a two-message handshake carried
//! by a [`HandshakeTransport`], and every outbound message is sealed and
//! signed under the target's session.

use super::handshake::{
    message_aad, message_digest, offer_digest, reply_digest, session_id, verify_offer,
    verify_reply,
};
use super::session::{ExpiryReport, SecurityStats, Session, SessionInfo};
use crate::cipher::{generate_nonce, CipherSuite};
use crate::error::{CryptoError, Result};
use crate::exchange::EphemeralExchange;
use crate::hash::fingerprint;
use crate::keys::{verify_signature, SigningKeyPair};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use overlink_core::{
    CoreError, DeliveryStatus, HandshakeOffer, HandshakeReply, HandshakeTransport, Message,
    NodeId, OverlayConfig, PublicKey, SecurityMetadata, SecurityMode, Signature,
};
use parking_lot::RwLock;
use rand::RngCore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Length of the random challenge in a handshake offer
const OFFER_NONCE_LEN: usize = 32;

/// Settings fixed by `initialize`
#[derive(Clone)]
struct SecurityState {
    suite: CipherSuite,
    identity: Arc<SigningKeyPair>,
    session_timeout: chrono::Duration,
    session_timeout_hours: f64,
    connection_timeout: Duration,
    mode: SecurityMode,
    replay_window: chrono::Duration,
}

fn outside_window(timestamp: DateTime<Utc>, window: chrono::Duration) -> bool {
    let skew = Utc::now() - timestamp;
    skew > window || skew < -window
}

fn session_expiry(
    node_id: &NodeId,
    now: DateTime<Utc>,
    timeout: chrono::Duration,
) -> Result<DateTime<Utc>> {
    now.checked_add_signed(timeout)
        .ok_or_else(|| CryptoError::handshake(node_id, "session timeout out of range"))
}

/// Called with the initiator's id after a handshake is accepted
pub type AcceptHook = Arc<dyn Fn(&NodeId) + Send + Sync>;

/// Security manager for one overlay node
pub struct SecurityManager {
    local_id: NodeId,
    transport: Option<Arc<dyn HandshakeTransport>>,
    on_accept: Option<AcceptHook>,
    state: RwLock<Option<SecurityState>>,

    /// All sessions by session id, including inactive ones awaiting purge
    sessions: DashMap<String, Session>,

    /// Current session id per peer
    active: DashMap<NodeId, String>,

    /// Serializes handshakes towards the same peer
    handshake_locks: DashMap<NodeId, Arc<tokio::sync::Mutex<()>>>,

    /// Identity keys pinned on first contact
    peer_identities: DashMap<NodeId, PublicKey>,

    /// Message ids accepted in strict mode, with their seal time
    seen_messages: DashMap<String, DateTime<Utc>>,
}

impl SecurityManager {
    /// Create an uninitialized manager. Handshakes need a transport, see
    /// [`SecurityManager::with_transport`].
    pub fn new(local_id: impl Into<NodeId>) -> Self {
        Self {
            local_id: local_id.into(),
            transport: None,
            on_accept: None,
            state: RwLock::new(None),
            sessions: DashMap::new(),
            active: DashMap::new(),
            handshake_locks: DashMap::new(),
            peer_identities: DashMap::new(),
            seen_messages: DashMap::new(),
        }
    }

    /// Builder: set the transport used to reach peers during handshakes
    pub fn with_transport(mut self, transport: Arc<dyn HandshakeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Builder: run `hook` whenever a peer's handshake offer is accepted
    pub fn on_session_accepted(mut self, hook: AcceptHook) -> Self {
        self.on_accept = Some(hook);
        self
    }

    pub fn local_node_id(&self) -> &NodeId {
        &self.local_id
    }

    pub fn is_initialized(&self) -> bool {
        self.state.read().is_some()
    }

    /// Load keys and cipher settings. Fails if already initialized.
    pub fn initialize(&self, config: &OverlayConfig) -> Result<()> {
        if self.is_initialized() {
            return Err(CryptoError::ConfigInvalid(
                "security manager already initialized".to_string(),
            ));
        }

        config.validate()?;
        if config.local_node_id != self.local_id.as_str() {
            return Err(CryptoError::ConfigInvalid(format!(
                "config is for node {}, manager belongs to {}",
                config.local_node_id, self.local_id
            )));
        }

        let suite = CipherSuite::from_config(&config.encryption_algorithm, config.key_size_bits)?;
        let identity = match &config.master_key_seed {
            Some(seed) => SigningKeyPair::from_hex_seed(seed)
                .map_err(|e| CryptoError::ConfigInvalid(e.to_string()))?,
            None => SigningKeyPair::generate(),
        };
        let identity_fp = fingerprint(identity.public_key().as_bytes());

        let mut state = self.state.write();
        if state.is_some() {
            return Err(CryptoError::ConfigInvalid(
                "security manager already initialized".to_string(),
            ));
        }
        *state = Some(SecurityState {
            suite,
            identity: Arc::new(identity),
            session_timeout: config.session_timeout(),
            session_timeout_hours: config.session_timeout_hours,
            connection_timeout: config.connection_timeout(),
            mode: config.security_mode,
            replay_window: config.replay_window(),
        });

        info!(
            node = %self.local_id,
            algorithm = suite.name(),
            identity = %identity_fp,
            "Security manager initialized"
        );
        Ok(())
    }

    fn settings(&self) -> Result<SecurityState> {
        self.state.read().clone().ok_or(CryptoError::NotInitialized)
    }

    /// Long-lived identity key of this node
    pub fn identity_key(&self) -> Result<PublicKey> {
        Ok(self.settings()?.identity.public_key())
    }

    /// Pin a peer's identity key ahead of the first handshake
    pub fn trust_node_key(&self, node_id: impl Into<NodeId>, key: PublicKey) {
        self.peer_identities.insert(node_id.into(), key);
    }

    fn pin_identity(&self, node_id: &NodeId, key: &PublicKey) -> Result<()> {
        match self.peer_identities.entry(node_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(pinned) => {
                if pinned.get() != key {
                    warn!(node = %node_id, "Peer presented a different identity key");
                    return Err(CryptoError::handshake(node_id, "identity key changed"));
                }
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                debug!(node = %node_id, key = %fingerprint(key.as_bytes()), "Pinned identity key");
                slot.insert(key.clone());
            }
        }
        Ok(())
    }

    /// Establish a session with `node_id`, or return the existing one.
    ///
    /// Concurrent calls for the same node are serialized, so at most one
    /// handshake runs per peer.
    pub async fn establish_session(&self, node_id: &NodeId, address: &str) -> Result<SessionInfo> {
        let settings = self.settings()?;
        if *node_id == self.local_id {
            return Err(CryptoError::handshake(node_id, "cannot open a session with self"));
        }

        let lock = self
            .handshake_locks
            .entry(node_id.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let result = {
            let _guard = lock.lock().await;
            self.handshake(settings, node_id, address).await
        };

        // Only the map still holds the lock once no caller is queued on it
        drop(lock);
        self.handshake_locks
            .remove_if(node_id, |_, lock| Arc::strong_count(lock) == 1);
        result
    }

    async fn handshake(
        &self,
        settings: SecurityState,
        node_id: &NodeId,
        address: &str,
    ) -> Result<SessionInfo> {
        if let Some(existing) = self.session_info(node_id) {
            debug!(node = %node_id, session = %existing.session_id, "Reusing active session");
            return Ok(existing);
        }

        let transport = self
            .transport
            .as_ref()
            .ok_or_else(|| CryptoError::handshake(node_id, "no handshake transport configured"))?;

        let session_signing = SigningKeyPair::generate();
        let exchange = EphemeralExchange::generate();
        let mut nonce = vec![0u8; OFFER_NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut offer = HandshakeOffer {
            initiator: self.local_id.clone(),
            responder: node_id.clone(),
            identity_key: settings.identity.public_key(),
            session_key: session_signing.public_key(),
            exchange_key: exchange.public_key(),
            nonce,
            timestamp: Utc::now(),
            signature: Signature::new(Vec::new()),
        };
        offer.signature = settings.identity.sign(&offer_digest(&offer));

        debug!(node = %node_id, address, "Sending handshake offer");
        let reply = match tokio::time::timeout(
            settings.connection_timeout,
            transport.exchange(address, offer.clone()),
        )
        .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(CoreError::HandshakeRejected(reason))) => {
                return Err(CryptoError::handshake(node_id, format!("rejected: {}", reason)))
            }
            Ok(Err(e)) => return Err(CryptoError::handshake(node_id, e)),
            Err(_) => {
                return Err(CryptoError::handshake(
                    node_id,
                    format!("timed out after {:?}", settings.connection_timeout),
                ))
            }
        };

        if reply.responder != *node_id {
            return Err(CryptoError::handshake(
                node_id,
                format!("reply came from {}", reply.responder),
            ));
        }
        let transcript = verify_reply(&offer, &reply)?;
        self.pin_identity(node_id, &reply.identity_key)?;
        let symmetric_key = exchange
            .agree(&reply.exchange_key, &transcript)
            .map_err(|e| CryptoError::handshake(node_id, e))?;

        // shutdown may have raced the handshake
        let settings = self.settings()?;
        let now = Utc::now();
        let session = Session {
            session_id: session_id(&transcript),
            node_id: node_id.clone(),
            signing_key: session_signing,
            peer_public_key: reply.session_key,
            symmetric_key,
            created_at: now,
            expires_at: session_expiry(node_id, now, settings.session_timeout)?,
            is_active: true,
        };
        let info = session.info();
        self.install(session);

        info!(node = %node_id, session = %info.session_id, "Session established");
        Ok(info)
    }

    /// Answer a peer's handshake offer, creating the responder's half of
    /// the session.
    pub fn accept_handshake(&self, offer: &HandshakeOffer) -> Result<HandshakeReply> {
        let settings = self.settings()?;
        let initiator = &offer.initiator;

        if offer.responder != self.local_id {
            return Err(CryptoError::handshake(
                initiator,
                format!("offer addressed to {}", offer.responder),
            ));
        }
        if *initiator == self.local_id {
            return Err(CryptoError::handshake(initiator, "offer from self"));
        }
        verify_offer(offer)?;

        if settings.mode == SecurityMode::Strict
            && outside_window(offer.timestamp, settings.replay_window)
        {
            return Err(CryptoError::handshake(initiator, "offer outside replay window"));
        }
        self.pin_identity(initiator, &offer.identity_key)?;

        let session_signing = SigningKeyPair::generate();
        let exchange = EphemeralExchange::generate();
        let mut reply = HandshakeReply {
            responder: self.local_id.clone(),
            identity_key: settings.identity.public_key(),
            session_key: session_signing.public_key(),
            exchange_key: exchange.public_key(),
            timestamp: Utc::now(),
            signature: Signature::new(Vec::new()),
        };
        let transcript = reply_digest(offer, &reply);
        reply.signature = settings.identity.sign(&transcript);

        let symmetric_key = exchange
            .agree(&offer.exchange_key, &transcript)
            .map_err(|e| CryptoError::handshake(initiator, e))?;

        let now = Utc::now();
        let session = Session {
            session_id: session_id(&transcript),
            node_id: initiator.clone(),
            signing_key: session_signing,
            peer_public_key: offer.session_key.clone(),
            symmetric_key,
            created_at: now,
            expires_at: session_expiry(initiator, now, settings.session_timeout)?,
            is_active: true,
        };
        let id = session.session_id.clone();
        self.install(session);

        info!(node = %initiator, session = %id, "Accepted handshake");
        if let Some(hook) = &self.on_accept {
            hook(initiator);
        }
        Ok(reply)
    }

    /// Make `session` the current one for its node; the previous session
    /// goes inactive.
    fn install(&self, session: Session) {
        let node_id = session.node_id.clone();
        let id = session.session_id.clone();
        self.sessions.insert(id.clone(), session);

        if let Some(previous) = self.active.insert(node_id, id.clone()) {
            if previous != id {
                if let Some(mut old) = self.sessions.get_mut(&previous) {
                    old.is_active = false;
                }
            }
        }
    }

    /// Usable session for a node, if any
    pub fn session_info(&self, node_id: &NodeId) -> Option<SessionInfo> {
        let id = self.active.get(node_id)?.clone();
        let session = self.sessions.get(&id)?;
        session.is_usable(Utc::now()).then(|| session.info())
    }

    pub fn has_active_session(&self, node_id: &NodeId) -> bool {
        self.session_info(node_id).is_some()
    }

    /// Seal `message` for its target under the target's active session
    pub fn encrypt(&self, mut message: Message) -> Result<Message> {
        let settings = self.settings()?;

        if message.source != self.local_id {
            return Err(CryptoError::InvalidMessage(format!(
                "message {} is not from the local node",
                message.id
            )));
        }
        if message.delivery_status != DeliveryStatus::Pending || message.security.is_some() {
            return Err(CryptoError::InvalidMessage(format!(
                "message {} is already {}",
                message.id, message.delivery_status
            )));
        }

        let target = message.target.clone();
        let no_session = || CryptoError::NoActiveSession(target.to_string());
        let session_id = self.active.get(&target).map(|id| id.clone()).ok_or_else(no_session)?;
        let session = self.sessions.get(&session_id).ok_or_else(no_session)?;
        if !session.is_usable(Utc::now()) {
            return Err(no_session());
        }

        let nonce = generate_nonce();
        let aad = message_aad(&message);
        message.content = settings.suite.seal(
            session.symmetric_key.as_bytes(),
            &nonce,
            &message.content,
            &aad,
        )?;

        let mut metadata = SecurityMetadata {
            algorithm: settings.suite.name().to_string(),
            key_id: session.session_id.clone(),
            timestamp: Utc::now(),
            nonce: nonce.to_vec(),
            signature: Signature::new(Vec::new()),
        };
        metadata.signature = session.signing_key.sign(&message_digest(&message, &metadata));

        message.security = Some(metadata);
        message.delivery_status = DeliveryStatus::Encrypted;
        debug!(message = %message.id, target = %target, "Message encrypted");
        Ok(message)
    }

    /// Verify and open a message sealed by its source.
    ///
    /// The signature is checked before the ciphertext is touched. Delivery
    /// status is left for the caller to update.
    pub fn decrypt(&self, mut message: Message) -> Result<Message> {
        let settings = self.settings()?;
        let metadata = message.security.clone().ok_or_else(|| {
            CryptoError::SignatureInvalid(format!(
                "message {} carries no security metadata",
                message.id
            ))
        })?;

        let source = message.source.clone();
        let session = self
            .sessions
            .get(&metadata.key_id)
            .filter(|s| s.node_id == source && s.is_usable(Utc::now()))
            .ok_or_else(|| CryptoError::NoActiveSession(source.to_string()))?;

        verify_signature(
            &session.peer_public_key,
            &message_digest(&message, &metadata),
            &metadata.signature,
        )
        .map_err(|e| match e {
            CryptoError::SignatureInvalid(reason) => CryptoError::SignatureInvalid(reason),
            other => CryptoError::SignatureInvalid(other.to_string()),
        })?;

        if metadata.algorithm != settings.suite.name() {
            return Err(CryptoError::DecryptionFailed(format!(
                "message sealed with {}, session uses {}",
                metadata.algorithm,
                settings.suite.name()
            )));
        }

        let strict = settings.mode == SecurityMode::Strict;
        if strict {
            if outside_window(metadata.timestamp, settings.replay_window) {
                return Err(CryptoError::SignatureInvalid(format!(
                    "message {} sealed outside the replay window",
                    message.id
                )));
            }
            // Claimed before opening so concurrent copies cannot both pass
            match self.seen_messages.entry(message.id.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(CryptoError::SignatureInvalid(format!(
                        "message {} was already accepted",
                        message.id
                    )));
                }
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(metadata.timestamp);
                }
            }
        }

        let aad = message_aad(&message);
        let opened = settings.suite.open(
            session.symmetric_key.as_bytes(),
            &metadata.nonce,
            &message.content,
            &aad,
        );
        drop(session);
        message.content = match opened {
            Ok(plaintext) => plaintext,
            Err(e) => {
                if strict {
                    self.seen_messages.remove(&message.id);
                }
                return Err(e);
            }
        };
        debug!(message = %message.id, source = %source, "Message decrypted");
        Ok(message)
    }

    /// Check a sealed message's signature without decrypting it.
    ///
    /// Inactive sessions still verify until they are purged, so messages
    /// in flight across an expiry can be checked late.
    pub fn verify_signature(&self, message: &Message) -> Result<()> {
        self.settings()?;
        let metadata = message.security.as_ref().ok_or_else(|| {
            CryptoError::SignatureInvalid(format!(
                "message {} carries no security metadata",
                message.id
            ))
        })?;
        let session = self.sessions.get(&metadata.key_id).ok_or_else(|| {
            CryptoError::SignatureInvalid(format!("unknown key id {}", metadata.key_id))
        })?;

        let key = if message.source == self.local_id && session.node_id == message.target {
            session.signing_key.public_key()
        } else if session.node_id == message.source {
            session.peer_public_key.clone()
        } else {
            return Err(CryptoError::SignatureInvalid(format!(
                "key id {} does not belong to {}",
                metadata.key_id, message.source
            )));
        };

        verify_signature(&key, &message_digest(message, metadata), &metadata.signature).map_err(
            |e| match e {
                CryptoError::SignatureInvalid(reason) => CryptoError::SignatureInvalid(reason),
                other => CryptoError::SignatureInvalid(other.to_string()),
            },
        )
    }

    /// Deactivate expired sessions and purge those inactive for longer than
    /// one more session lifetime.
    pub fn rotate_or_expire_sessions(&self) -> Result<ExpiryReport> {
        let settings = self.settings()?;
        let now = Utc::now();
        let mut report = ExpiryReport::default();

        for mut session in self.sessions.iter_mut() {
            if session.is_active && now >= session.expires_at {
                session.is_active = false;
                report.expired += 1;
                debug!(node = %session.node_id, session = %session.session_id, "Session expired");
            }
        }

        self.sessions.retain(|_, session| {
            let keep = session.is_active
                || session
                    .expires_at
                    .checked_add_signed(settings.session_timeout)
                    .map_or(true, |purge_at| now < purge_at);
            if !keep {
                report.purged += 1;
            }
            keep
        });
        self.active
            .retain(|_, id| self.sessions.get(id.as_str()).map_or(false, |s| s.is_active));
        self.seen_messages
            .retain(|_, sealed| now - *sealed <= settings.replay_window);

        if report.expired > 0 || report.purged > 0 {
            info!(expired = report.expired, purged = report.purged, "Session expiry scan");
        }
        Ok(report)
    }

    /// Deactivate the session with `node_id`. Returns whether one was usable.
    pub fn close_session(&self, node_id: &NodeId) -> bool {
        let was_usable = self.has_active_session(node_id);
        if let Some((_, id)) = self.active.remove(node_id) {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                session.is_active = false;
            }
        }
        if was_usable {
            info!(node = %node_id, "Session closed");
        }
        was_usable
    }

    /// Drop all keys and sessions and return to the uninitialized state
    pub fn shutdown(&self) {
        let was_initialized = self.state.write().take().is_some();
        self.active.clear();
        self.sessions.clear();
        self.handshake_locks.clear();
        self.peer_identities.clear();
        self.seen_messages.clear();
        if was_initialized {
            info!(node = %self.local_id, "Security manager shut down");
        }
    }

    pub fn stats(&self) -> Result<SecurityStats> {
        let settings = self.settings()?;
        let now = Utc::now();
        let active_sessions = self
            .active
            .iter()
            .filter(|entry| {
                self.sessions
                    .get(entry.value().as_str())
                    .map_or(false, |s| s.is_usable(now))
            })
            .count();

        Ok(SecurityStats {
            known_node_keys: self.peer_identities.len(),
            active_sessions,
            total_sessions: self.sessions.len(),
            algorithm: settings.suite.name().to_string(),
            key_size_bits: settings.suite.key_size_bits(),
            session_timeout_hours: settings.session_timeout_hours,
        })
    }
}

impl std::fmt::Debug for SecurityManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityManager")
            .field("local_id", &self.local_id)
            .field("initialized", &self.is_initialized())
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}
