//! X3DH (Extended Triple Diffie-Hellman) key agreement.
//!
//! Asynchronous handshake between an initiator and a responder who has
//! published a prekey bundle:
//!
//! 1. **Responder** publishes an identity key, a signed prekey (rotated
//!    periodically, signature by the identity key via XEdDSA) and a batch
//!    of one-time prekeys.
//!
//! 2. **Initiator** fetches the bundle and computes:
//!    - DH1 = `DH(IK_A, SPK_B)`
//!    - DH2 = `DH(EK_A, IK_B)`
//!    - DH3 = `DH(EK_A, SPK_B)`
//!    - DH4 = `DH(EK_A, OPK_B)` \[if an OPK was available\]
//!    - SK  = KDF(DH1 || DH2 || DH3 || DH4)
//!
//! 3. **Responder** receives the initial message, deletes the consumed
//!    one-time prekey, and computes the same SK.

use crate::crypto::{derive_session_key, SymmetricKey};
use crate::error::{Error, Result};
use crate::keys::{IdentityKeyPair, PublicKey, SecretKey};
use crate::storage::{InMemoryPreKeyStore, PreKeyStore};
use crate::xeddsa;
use rand_core::CryptoRngCore;
use tracing::debug;

/// Default one-time prekey batch size
const DEFAULT_OPK_COUNT: usize = 100;

/// A medium-lived prekey together with its XEdDSA signature by the
/// owner's identity key.
#[derive(Clone)]
pub struct SignedPreKey {
    secret: SecretKey,
    signature: [u8; xeddsa::SIGNATURE_LENGTH],
}

impl SignedPreKey {
    /// Generates a prekey and signs its public bytes with the identity.
    pub fn generate<R: CryptoRngCore>(rng: &mut R, identity: &IdentityKeyPair) -> Self {
        let secret = SecretKey::generate(rng);
        let signature = xeddsa::sign(identity.secret(), secret.public_key().as_bytes(), rng);
        Self { secret, signature }
    }

    /// Rebuild from a persisted secret and signature.
    #[must_use]
    pub fn from_parts(secret: SecretKey, signature: [u8; xeddsa::SIGNATURE_LENGTH]) -> Self {
        Self { secret, signature }
    }

    /// The prekey public half
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.secret.public_key()
    }

    /// Signature over the public half
    #[must_use]
    pub fn signature(&self) -> &[u8; xeddsa::SIGNATURE_LENGTH] {
        &self.signature
    }

    /// Borrow the secret half (for ratchet initialization)
    #[must_use]
    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl std::fmt::Debug for SignedPreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedPreKey")
            .field("public_key", &self.secret.public_key())
            .finish_non_exhaustive()
    }
}

/// Generates a signed prekey for an identity.
pub fn generate_signed_prekey<R: CryptoRngCore>(
    rng: &mut R,
    identity: &IdentityKeyPair,
) -> SignedPreKey {
    SignedPreKey::generate(rng, identity)
}

/// Generates a batch of one-time prekeys with sequential IDs.
pub fn generate_one_time_prekeys<R: CryptoRngCore>(
    rng: &mut R,
    first_id: u32,
    count: usize,
) -> Vec<(u32, SecretKey)> {
    (0..count)
        .map(|i| {
            let id = first_id.wrapping_add(u32::try_from(i).unwrap_or(u32::MAX));
            (id, SecretKey::generate(rng))
        })
        .collect()
}

/// Prekey bundle published by a responder.
///
/// Contains everything an initiator needs to run the handshake offline.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreKeyBundle {
    /// Responder's identity key (long-term)
    pub identity_key: PublicKey,

    /// Responder's signed prekey (rotated periodically)
    pub signed_prekey: PublicKey,

    /// XEdDSA signature over the signed prekey, by the identity key
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub signed_prekey_signature: [u8; 64],

    /// Optional one-time prekey and its ID (consumed after use)
    pub one_time_prekey: Option<(u32, PublicKey)>,
}

impl PreKeyBundle {
    /// Verify the signed prekey signature under the bundle's identity key.
    ///
    /// # Errors
    /// Returns [`Error::BadPrekeySignature`] if the signature does not
    /// verify, whatever the cause.
    pub fn verify_signature(&self) -> Result<()> {
        xeddsa::verify(
            &self.identity_key,
            self.signed_prekey.as_bytes(),
            &self.signed_prekey_signature,
        )
        .map_err(|_| Error::BadPrekeySignature)
    }
}

/// Secret state a responder keeps between publishing a bundle and
/// answering handshakes against it.
pub struct PreKeyState {
    identity_public: PublicKey,
    signed_prekey: SignedPreKey,
    one_time_prekeys: Box<dyn PreKeyStore>,
    next_prekey_id: u32,
}

impl PreKeyState {
    /// Generate prekey state with the default one-time prekey batch.
    pub fn generate<R: CryptoRngCore>(rng: &mut R, identity: &IdentityKeyPair) -> Self {
        Self::generate_with_count(rng, identity, DEFAULT_OPK_COUNT)
    }

    /// Generate with a specific one-time prekey count.
    pub fn generate_with_count<R: CryptoRngCore>(
        rng: &mut R,
        identity: &IdentityKeyPair,
        opk_count: usize,
    ) -> Self {
        let mut store = InMemoryPreKeyStore::new();
        store.populate(generate_one_time_prekeys(rng, 0, opk_count));

        Self {
            identity_public: identity.public_key(),
            signed_prekey: SignedPreKey::generate(rng, identity),
            one_time_prekeys: Box::new(store),
            next_prekey_id: u32::try_from(opk_count).unwrap_or(u32::MAX),
        }
    }

    /// Rebuild prekey state from caller-persisted parts.
    ///
    /// The crate owns no storage; responders that persist their prekeys
    /// restore them through this constructor.
    #[must_use]
    pub fn from_parts(
        identity_public: PublicKey,
        signed_prekey: SignedPreKey,
        one_time_prekeys: Vec<(u32, SecretKey)>,
    ) -> Self {
        let next_prekey_id = one_time_prekeys
            .iter()
            .map(|(id, _)| id.wrapping_add(1))
            .max()
            .unwrap_or(0);

        let mut store = InMemoryPreKeyStore::new();
        store.populate(one_time_prekeys);

        Self {
            identity_public,
            signed_prekey,
            one_time_prekeys: Box::new(store),
            next_prekey_id,
        }
    }

    /// Create a public bundle for distribution.
    ///
    /// Picks the lowest-numbered unused one-time prekey; the bundle is
    /// published without one when the batch is exhausted.
    #[must_use]
    pub fn public_bundle(&self) -> PreKeyBundle {
        let one_time_prekey = self.one_time_prekeys.ids().into_iter().min().and_then(|id| {
            // The store retains the secret; only the public half leaves.
            self.one_time_prekeys.public_key(id).map(|pk| (id, pk))
        });

        PreKeyBundle {
            identity_key: self.identity_public,
            signed_prekey: self.signed_prekey.public_key(),
            signed_prekey_signature: *self.signed_prekey.signature(),
            one_time_prekey,
        }
    }

    /// Create a bundle, failing when no one-time prekey remains.
    ///
    /// # Errors
    /// Returns [`Error::MissingPrekey`] when the batch is exhausted.
    pub fn bundle_requiring_one_time_prekey(&self) -> Result<PreKeyBundle> {
        let bundle = self.public_bundle();
        if bundle.one_time_prekey.is_none() {
            return Err(Error::MissingPrekey);
        }
        Ok(bundle)
    }

    /// Rotate the signed prekey, invalidating previously published
    /// bundles' SPK field.
    pub fn rotate_signed_prekey<R: CryptoRngCore>(
        &mut self,
        rng: &mut R,
        identity: &IdentityKeyPair,
    ) {
        self.signed_prekey = SignedPreKey::generate(rng, identity);
        debug!("rotated signed prekey");
    }

    /// Top up the one-time prekey batch.
    pub fn add_one_time_prekeys<R: CryptoRngCore>(&mut self, rng: &mut R, count: usize) {
        for (id, key) in generate_one_time_prekeys(rng, self.next_prekey_id, count) {
            self.one_time_prekeys.store(id, key);
            self.next_prekey_id = self.next_prekey_id.wrapping_add(1);
        }
    }

    /// Number of unused one-time prekeys remaining
    #[must_use]
    pub fn one_time_prekey_count(&self) -> usize {
        self.one_time_prekeys.count()
    }

    /// The current signed prekey
    #[must_use]
    pub fn signed_prekey(&self) -> &SignedPreKey {
        &self.signed_prekey
    }
}

impl std::fmt::Debug for PreKeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreKeyState")
            .field("identity_public", &self.identity_public)
            .field("signed_prekey", &self.signed_prekey.public_key())
            .field("one_time_prekey_count", &self.one_time_prekeys.count())
            .finish()
    }
}

/// Initial handshake message sent by the initiator.
///
/// The ciphertext is the initiator's first ratchet message; it binds the
/// handshake because its associated data commits to both identities.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InitialMessage {
    /// Initiator's identity key
    pub identity_key: PublicKey,

    /// Initiator's ephemeral key
    pub ephemeral_key: PublicKey,

    /// ID of the consumed one-time prekey, if any
    pub one_time_prekey_id: Option<u32>,

    /// Serialized first ratchet message
    pub ciphertext: Vec<u8>,
}

/// Result of the initiator's X3DH computation.
pub struct InitiatorResult {
    /// Derived 32-byte session secret
    pub shared_secret: SymmetricKey,

    /// Ephemeral pair, consumed by ratchet initialization
    pub(crate) ephemeral: SecretKey,

    /// Initiator identity public key (goes in the initial message)
    pub identity_key: PublicKey,

    /// Ephemeral public key (goes in the initial message)
    pub ephemeral_key: PublicKey,

    /// Which one-time prekey the handshake consumed
    pub one_time_prekey_id: Option<u32>,

    /// `AD = IK_A || IK_B`, bound into every message AEAD
    pub associated_data: Vec<u8>,
}

impl InitiatorResult {
    /// Assemble the wire-ready initial message around the first ratchet
    /// ciphertext.
    #[must_use]
    pub fn initial_message(&self, ciphertext: Vec<u8>) -> InitialMessage {
        InitialMessage {
            identity_key: self.identity_key,
            ephemeral_key: self.ephemeral_key,
            one_time_prekey_id: self.one_time_prekey_id,
            ciphertext,
        }
    }
}

impl std::fmt::Debug for InitiatorResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitiatorResult")
            .field("identity_key", &self.identity_key)
            .field("one_time_prekey_id", &self.one_time_prekey_id)
            .finish_non_exhaustive()
    }
}

/// Result of the responder's X3DH computation.
pub struct ResponderResult {
    /// Derived 32-byte session secret
    pub shared_secret: SymmetricKey,

    /// `AD = IK_A || IK_B`
    pub associated_data: Vec<u8>,
}

impl std::fmt::Debug for ResponderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponderResult").finish_non_exhaustive()
    }
}

/// Initiator side of the handshake with a fresh ephemeral key.
pub fn initiate<R: CryptoRngCore>(
    rng: &mut R,
    initiator_identity: &IdentityKeyPair,
    bundle: &PreKeyBundle,
) -> Result<InitiatorResult> {
    initiate_with_ephemeral(initiator_identity, SecretKey::generate(rng), bundle)
}

/// Initiator side of the handshake with a caller-supplied ephemeral key.
///
/// Exposed so deterministic tests can pin the ephemeral; production
/// callers use [`initiate`].
pub fn initiate_with_ephemeral(
    initiator_identity: &IdentityKeyPair,
    ephemeral: SecretKey,
    bundle: &PreKeyBundle,
) -> Result<InitiatorResult> {
    bundle.verify_signature()?;

    let dh1 = initiator_identity
        .secret()
        .diffie_hellman(&bundle.signed_prekey)?;
    let dh2 = ephemeral.diffie_hellman(&bundle.identity_key)?;
    let dh3 = ephemeral.diffie_hellman(&bundle.signed_prekey)?;
    let dh4 = bundle
        .one_time_prekey
        .as_ref()
        .map(|(_, opk)| ephemeral.diffie_hellman(opk))
        .transpose()?;

    let shared_secret = derive_session_key(&dh1, &dh2, &dh3, dh4.as_ref())?;

    let identity_key = initiator_identity.public_key();
    let mut associated_data = Vec::with_capacity(64);
    associated_data.extend_from_slice(identity_key.as_bytes());
    associated_data.extend_from_slice(bundle.identity_key.as_bytes());

    Ok(InitiatorResult {
        shared_secret,
        ephemeral_key: ephemeral.public_key(),
        ephemeral,
        identity_key,
        one_time_prekey_id: bundle.one_time_prekey.map(|(id, _)| id),
        associated_data,
    })
}

/// Responder side of the handshake.
///
/// Consumes (and thereby deletes) the referenced one-time prekey before
/// deriving the session secret, so the prekey can never serve a second
/// handshake.
pub fn respond(
    state: &mut PreKeyState,
    identity: &IdentityKeyPair,
    message: &InitialMessage,
) -> Result<ResponderResult> {
    let spk = state.signed_prekey.secret_key();

    let dh1 = spk.diffie_hellman(&message.identity_key)?;
    let dh2 = identity.secret().diffie_hellman(&message.ephemeral_key)?;
    let dh3 = spk.diffie_hellman(&message.ephemeral_key)?;

    let dh4 = match message.one_time_prekey_id {
        Some(id) => {
            let opk = state
                .one_time_prekeys
                .consume(id)
                .ok_or(Error::UnknownOneTimePrekey)?;
            debug!(prekey_id = id, "consumed one-time prekey");
            Some(opk.diffie_hellman(&message.ephemeral_key)?)
        }
        None => None,
    };

    let shared_secret = derive_session_key(&dh1, &dh2, &dh3, dh4.as_ref())?;

    let mut associated_data = Vec::with_capacity(64);
    associated_data.extend_from_slice(message.identity_key.as_bytes());
    associated_data.extend_from_slice(identity.public_key().as_bytes());

    Ok(ResponderResult {
        shared_secret,
        associated_data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_core::OsRng;

    #[test]
    fn test_handshake_with_opk() {
        let responder_identity = IdentityKeyPair::generate(&mut OsRng);
        let mut responder_state = PreKeyState::generate(&mut OsRng, &responder_identity);
        let bundle = responder_state.public_bundle();

        let initiator_identity = IdentityKeyPair::generate(&mut OsRng);
        let init = initiate(&mut OsRng, &initiator_identity, &bundle).unwrap();

        let resp = respond(
            &mut responder_state,
            &responder_identity,
            &init.initial_message(Vec::new()),
        )
        .unwrap();

        assert_eq!(
            init.shared_secret.as_bytes(),
            resp.shared_secret.as_bytes()
        );
        assert_eq!(init.associated_data, resp.associated_data);
    }

    #[test]
    fn test_handshake_without_opk() {
        let responder_identity = IdentityKeyPair::generate(&mut OsRng);
        let mut responder_state =
            PreKeyState::generate_with_count(&mut OsRng, &responder_identity, 0);
        let bundle = responder_state.public_bundle();
        assert!(bundle.one_time_prekey.is_none());

        let initiator_identity = IdentityKeyPair::generate(&mut OsRng);
        let init = initiate(&mut OsRng, &initiator_identity, &bundle).unwrap();
        assert!(init.one_time_prekey_id.is_none());

        let resp = respond(
            &mut responder_state,
            &responder_identity,
            &init.initial_message(Vec::new()),
        )
        .unwrap();

        assert_eq!(
            init.shared_secret.as_bytes(),
            resp.shared_secret.as_bytes()
        );
    }

    #[test]
    fn test_opk_single_use() {
        let responder_identity = IdentityKeyPair::generate(&mut OsRng);
        let mut responder_state =
            PreKeyState::generate_with_count(&mut OsRng, &responder_identity, 1);
        let bundle = responder_state.public_bundle();

        let initiator_identity = IdentityKeyPair::generate(&mut OsRng);
        let init = initiate(&mut OsRng, &initiator_identity, &bundle).unwrap();
        let message = init.initial_message(Vec::new());

        respond(&mut responder_state, &responder_identity, &message).unwrap();

        // Replaying the handshake must fail: the prekey was deleted.
        let result = respond(&mut responder_state, &responder_identity, &message);
        assert!(matches!(result, Err(Error::UnknownOneTimePrekey)));
    }

    #[test]
    fn test_corrupt_signature_rejected() {
        let responder_identity = IdentityKeyPair::generate(&mut OsRng);
        let responder_state = PreKeyState::generate(&mut OsRng, &responder_identity);
        let mut bundle = responder_state.public_bundle();

        bundle.signed_prekey_signature[0] ^= 1;

        let initiator_identity = IdentityKeyPair::generate(&mut OsRng);
        let result = initiate(&mut OsRng, &initiator_identity, &bundle);
        assert!(matches!(result, Err(Error::BadPrekeySignature)));
    }

    #[test]
    fn test_bundle_requiring_opk() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let state = PreKeyState::generate_with_count(&mut OsRng, &identity, 0);

        let result = state.bundle_requiring_one_time_prekey();
        assert!(matches!(result, Err(Error::MissingPrekey)));
    }

    #[test]
    fn test_rotation_changes_bundle() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let mut state = PreKeyState::generate(&mut OsRng, &identity);

        let before = state.public_bundle();
        state.rotate_signed_prekey(&mut OsRng, &identity);
        let after = state.public_bundle();

        assert_ne!(before.signed_prekey.as_bytes(), after.signed_prekey.as_bytes());
        after.verify_signature().unwrap();
    }
}
