//! Double Ratchet session state machine.
//!
//! Combines two ratchets over the X3DH session secret:
//!
//! 1. **DH ratchet**: whenever a message arrives under a new remote DH
//!    key, both chain keys are replaced through fresh Diffie-Hellman
//!    outputs, giving post-compromise recovery.
//! 2. **Symmetric ratchet**: each chain key advances once per message,
//!    giving per-message forward secrecy.
//!
//! A [`Session`] is exclusively owned by one endpoint of one
//! conversation. Calls never block and never touch I/O; callers that
//! want parallelism hold one session per channel and serialize access
//! to each. A failed [`Session::recv`] leaves the state bit-identical:
//! every mutation is staged against a snapshot and committed only after
//! the AEAD tag verifies.

use crate::crypto::{decrypt, derive_nonce, encrypt, kdf_chain, kdf_root, SymmetricKey};
use crate::error::{Error, Result};
use crate::keys::{PublicKey, SecretKey};
use crate::wire::{RatchetHeader, RatchetMessage};
use crate::x3dh::InitiatorResult;
use rand_core::OsRng;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace};

/// Tuning knobs for a session's skipped-key retention.
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Maximum gap tolerated within one receive chain before the session
    /// fails with [`Error::ChainTooLong`]
    pub max_skip_per_chain: u32,

    /// Number of distinct receive-chain keys whose skipped message keys
    /// are retained; storing keys for one more evicts the oldest chain
    pub max_retained_chains: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skip_per_chain: 1000,
            max_retained_chains: 5,
        }
    }
}

/// Externally observable session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Initiator before the first reply arrives
    SendOnly,
    /// Responder before the first inbound message
    RecvOnly,
    /// Both chains established
    Bidirectional,
}

/// Message keys retained for not-yet-received messages, indexed by
/// `(chain DH key, message number)`.
#[derive(Clone)]
struct SkippedKeyStore {
    keys: HashMap<(PublicKey, u32), SymmetricKey>,
    chains: VecDeque<PublicKey>,
    max_chains: usize,
}

impl SkippedKeyStore {
    fn new(max_chains: usize) -> Self {
        Self {
            keys: HashMap::new(),
            chains: VecDeque::new(),
            max_chains,
        }
    }

    fn insert(&mut self, chain: PublicKey, msg_number: u32, key: SymmetricKey) {
        if !self.chains.contains(&chain) {
            self.chains.push_back(chain);
            while self.chains.len() > self.max_chains {
                if let Some(evicted) = self.chains.pop_front() {
                    self.keys.retain(|(c, _), _| *c != evicted);
                    debug!("evicted skipped keys of oldest retained chain");
                }
            }
        }
        self.keys.insert((chain, msg_number), key);
    }

    fn take(&mut self, chain: &PublicKey, msg_number: u32) -> Option<SymmetricKey> {
        self.keys.remove(&(*chain, msg_number))
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

/// Double Ratchet session state.
pub struct Session {
    /// Root key, replaced on every DH ratchet step
    root_key: SymmetricKey,

    /// Sending chain key (None until the first DH ratchet establishes it)
    send_chain: Option<SymmetricKey>,

    /// Receiving chain key (None until the first inbound message)
    recv_chain: Option<SymmetricKey>,

    /// Our current DH ratchet key pair
    dh_self: SecretKey,

    /// Peer's current DH ratchet public key
    dh_remote: Option<PublicKey>,

    /// Messages sent in the current chain (Ns)
    send_count: u32,

    /// Messages received in the current chain (Nr)
    recv_count: u32,

    /// Length of the previous sending chain (PN)
    prev_chain_len: u32,

    skipped: SkippedKeyStore,
    config: SessionConfig,
}

impl Session {
    /// Initialize the initiator side from an X3DH result.
    ///
    /// The X3DH ephemeral becomes the first sending ratchet key, and one
    /// root half-step runs immediately against the responder's signed
    /// prekey, so the initiator can send before any reply.
    pub fn initiator(
        x3dh: &InitiatorResult,
        remote_signed_prekey: &PublicKey,
        config: SessionConfig,
    ) -> Result<Self> {
        let dh = x3dh.ephemeral.diffie_hellman(remote_signed_prekey)?;
        let (root_key, send_chain) = kdf_root(&x3dh.shared_secret, &dh)?;

        Ok(Self {
            root_key,
            send_chain: Some(send_chain),
            recv_chain: None,
            dh_self: x3dh.ephemeral.clone(),
            dh_remote: Some(*remote_signed_prekey),
            send_count: 0,
            recv_count: 0,
            prev_chain_len: 0,
            skipped: SkippedKeyStore::new(config.max_retained_chains),
            config,
        })
    }

    /// Initialize the responder side from an X3DH secret.
    ///
    /// `ratchet_key` is the signed prekey pair the published bundle
    /// advertised; the first inbound message triggers the DH ratchet
    /// step that establishes both chains.
    #[must_use]
    pub fn responder(
        shared_secret: SymmetricKey,
        ratchet_key: SecretKey,
        config: SessionConfig,
    ) -> Self {
        Self {
            root_key: shared_secret,
            send_chain: None,
            recv_chain: None,
            dh_self: ratchet_key,
            dh_remote: None,
            send_count: 0,
            recv_count: 0,
            prev_chain_len: 0,
            skipped: SkippedKeyStore::new(config.max_retained_chains),
            config,
        }
    }

    /// Current session phase.
    #[must_use]
    pub fn state(&self) -> SessionState {
        match (&self.send_chain, &self.recv_chain) {
            (Some(_), Some(_)) => SessionState::Bidirectional,
            (Some(_), None) => SessionState::SendOnly,
            (None, _) => SessionState::RecvOnly,
        }
    }

    /// Our current ratchet public key (what the next header will carry).
    #[must_use]
    pub fn ratchet_key(&self) -> PublicKey {
        self.dh_self.public_key()
    }

    /// Number of skipped message keys currently retained.
    #[must_use]
    pub fn skipped_key_count(&self) -> usize {
        self.skipped.len()
    }

    /// Encrypt a message in the current sending chain.
    ///
    /// `associated_data` is bound into the AEAD alongside the header;
    /// both peers must pass the same bytes (the X3DH associated data by
    /// convention). The derived message key is erased before returning.
    ///
    /// # Errors
    /// [`Error::DerivationFailed`] if no sending chain exists yet (a
    /// responder that has not received anything cannot send).
    pub fn send(&mut self, associated_data: &[u8], plaintext: &[u8]) -> Result<RatchetMessage> {
        let chain = self.send_chain.as_ref().ok_or(Error::DerivationFailed)?;
        let (next_chain, message_key) = kdf_chain(chain);

        let header = RatchetHeader {
            dh_public: self.dh_self.public_key(),
            prev_chain_len: self.prev_chain_len,
            msg_number: self.send_count,
        };

        let nonce = derive_nonce(&message_key);
        let ciphertext = encrypt(
            &message_key,
            &nonce,
            plaintext,
            &authenticated_data(associated_data, &header),
        )?;

        self.send_chain = Some(next_chain);
        self.send_count += 1;
        trace!(n = header.msg_number, "message encrypted");

        Ok(RatchetMessage { header, ciphertext })
    }

    /// Decrypt a received message.
    ///
    /// Handles out-of-order delivery within a chain (via retained
    /// skipped keys) and across chains (via the DH ratchet). On any
    /// error the session state is unchanged, so a forged packet cannot
    /// desynchronize the ratchet.
    ///
    /// # Errors
    /// [`Error::DecryptFailed`] if the tag does not verify or the
    /// message key was already consumed; [`Error::ChainTooLong`] if the
    /// in-chain gap exceeds the configured maximum, which is fatal and
    /// requires a re-handshake; [`Error::BadPoint`] if the header
    /// carries an invalid DH key.
    pub fn recv(
        &mut self,
        header: &RatchetHeader,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let mut draft = self.snapshot();
        let plaintext = draft.recv_uncommitted(header, ciphertext, associated_data)?;
        *self = draft;
        Ok(plaintext)
    }

    /// Consume the session, zeroizing all secret state.
    pub fn close(self) {
        debug!("session closed");
    }

    fn snapshot(&self) -> Self {
        Self {
            root_key: self.root_key.clone(),
            send_chain: self.send_chain.clone(),
            recv_chain: self.recv_chain.clone(),
            dh_self: self.dh_self.clone(),
            dh_remote: self.dh_remote,
            send_count: self.send_count,
            recv_count: self.recv_count,
            prev_chain_len: self.prev_chain_len,
            skipped: self.skipped.clone(),
            config: self.config,
        }
    }

    /// Receive path run against a snapshot; mutations here are only
    /// committed by the caller on success.
    fn recv_uncommitted(
        &mut self,
        header: &RatchetHeader,
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        // A message from an older position for which we kept a key.
        if let Some(message_key) = self.skipped.take(&header.dh_public, header.msg_number) {
            trace!(n = header.msg_number, "decrypting with skipped key");
            return decrypt_message(&message_key, header, ciphertext, associated_data);
        }

        if Some(header.dh_public) != self.dh_remote {
            // Close out the current receive chain before stepping.
            self.skip_message_keys(header.prev_chain_len)?;
            self.dh_ratchet(&header.dh_public)?;
        }

        self.skip_message_keys(header.msg_number)?;

        let chain = self.recv_chain.as_ref().ok_or(Error::DerivationFailed)?;
        let (next_chain, message_key) = kdf_chain(chain);
        self.recv_chain = Some(next_chain);
        self.recv_count += 1;

        decrypt_message(&message_key, header, ciphertext, associated_data)
    }

    /// One DH ratchet step: new receive chain under the peer's key, then
    /// a fresh key pair and a new sending chain.
    fn dh_ratchet(&mut self, remote: &PublicKey) -> Result<()> {
        self.prev_chain_len = self.send_count;
        self.send_count = 0;
        self.recv_count = 0;
        self.dh_remote = Some(*remote);

        let dh = self.dh_self.diffie_hellman(remote)?;
        let (root_key, recv_chain) = kdf_root(&self.root_key, &dh)?;
        self.recv_chain = Some(recv_chain);

        self.dh_self = SecretKey::generate(&mut OsRng);
        let dh = self.dh_self.diffie_hellman(remote)?;
        let (root_key, send_chain) = kdf_root(&root_key, &dh)?;
        self.root_key = root_key;
        self.send_chain = Some(send_chain);

        debug!(pn = self.prev_chain_len, "DH ratchet step");
        Ok(())
    }

    /// Advance the receive chain to `until`, retaining each intermediate
    /// message key for later out-of-order delivery.
    fn skip_message_keys(&mut self, until: u32) -> Result<()> {
        if until < self.recv_count {
            // The key for this position was consumed and no skipped
            // entry survived.
            return Err(Error::DecryptFailed);
        }
        let to_skip = until - self.recv_count;
        if to_skip == 0 {
            return Ok(());
        }
        if to_skip > self.config.max_skip_per_chain {
            return Err(Error::ChainTooLong);
        }

        let remote = self.dh_remote.ok_or(Error::DerivationFailed)?;
        let mut chain = self.recv_chain.clone().ok_or(Error::DerivationFailed)?;

        for n in self.recv_count..until {
            let (next_chain, message_key) = kdf_chain(&chain);
            self.skipped.insert(remote, n, message_key);
            chain = next_chain;
        }

        trace!(stored = to_skip, "retained skipped message keys");
        self.recv_chain = Some(chain);
        self.recv_count = until;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("send_count", &self.send_count)
            .field("recv_count", &self.recv_count)
            .field("skipped_keys", &self.skipped.len())
            .finish_non_exhaustive()
    }
}

/// AEAD associated data: caller context followed by the header bytes.
fn authenticated_data(associated_data: &[u8], header: &RatchetHeader) -> Vec<u8> {
    let mut aad = Vec::with_capacity(associated_data.len() + RatchetHeader::SIZE);
    aad.extend_from_slice(associated_data);
    aad.extend_from_slice(&header.to_bytes());
    aad
}

fn decrypt_message(
    message_key: &SymmetricKey,
    header: &RatchetHeader,
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let nonce = derive_nonce(message_key);
    decrypt(
        message_key,
        &nonce,
        ciphertext,
        &authenticated_data(associated_data, header),
    )
}
