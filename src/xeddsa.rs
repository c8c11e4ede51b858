//! XEdDSA signature scheme for X25519 keys.
//!
//! Implements the XEdDSA signature scheme from:
//! "The XEdDSA and VXEdDSA Signature Schemes" by Trevor Perrin
//! Revision 1, 2016-10-20
//!
//! A Montgomery key pair signs by deriving its Edwards twin
//! deterministically, so the same long-term key serves key agreement and
//! signing. Verification converts the Montgomery public key to the
//! canonical Edwards point (sign bit 0) and runs standard Ed25519
//! verification against it.

use crate::error::{Error, Result};
use crate::keys::{PublicKey, SecretKey};
use curve25519_dalek::{
    constants::ED25519_BASEPOINT_TABLE,
    edwards::{CompressedEdwardsY, EdwardsPoint},
    montgomery::MontgomeryPoint,
    scalar::Scalar,
};
use ed25519_dalek::{Signature, VerifyingKey as Ed25519VerifyingKey};
use rand_core::CryptoRngCore;
use sha2::{Digest, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// XEdDSA signature: 64 bytes (R point + s scalar)
pub const SIGNATURE_LENGTH: usize = 64;

/// Length of the random input Z consumed per signature
pub const NONCE_LENGTH: usize = 64;

/// Starts a SHA-512 hash with the domain prefix `(2^256 - 1) - i`,
/// little-endian. Derivations use `i >= 1`; the all-0xFF prefix stays
/// unused.
pub(crate) fn domain_hash(i: u8) -> Sha512 {
    let mut prefix = [0xFFu8; 32];
    prefix[0] = prefix[0].wrapping_sub(i);

    let mut hasher = Sha512::new();
    hasher.update(prefix);
    hasher
}

/// Derives the Edwards scalar and canonical public point from a Montgomery
/// private key.
///
/// Computes `E = kB`; if the compressed `E` carries sign bit 1 the scalar
/// is negated so the resulting public point always compresses with sign
/// bit 0.
pub(crate) fn calculate_key_pair(k_bytes: &[u8; 32]) -> (Scalar, EdwardsPoint) {
    let mut k_clamped = *k_bytes;
    k_clamped[0] &= 248;
    k_clamped[31] &= 127;
    k_clamped[31] |= 64;

    let k_scalar = Scalar::from_bytes_mod_order(k_clamped);
    k_clamped.zeroize();

    let e_point = &k_scalar * ED25519_BASEPOINT_TABLE;
    let sign_bit = (e_point.compress().as_bytes()[31] >> 7) & 1;

    let a = if sign_bit == 1 { -k_scalar } else { k_scalar };
    let a_point = &a * ED25519_BASEPOINT_TABLE;

    (a, a_point)
}

/// Converts a Montgomery u-coordinate into the canonical Edwards point
/// (sign bit 0).
pub(crate) fn convert_mont(u_bytes: &[u8; 32]) -> Result<CompressedEdwardsY> {
    // Mask off the excess high bit (mod 2^|p|).
    let mut u_masked = *u_bytes;
    u_masked[31] &= 0x7F;

    let edwards = MontgomeryPoint(u_masked)
        .to_edwards(0)
        .ok_or(Error::BadPoint)?;

    let mut bytes = *edwards.compress().as_bytes();
    bytes[31] &= 0x7F;
    Ok(CompressedEdwardsY(bytes))
}

/// XEdDSA signing key derived from an X25519 secret
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SigningKey {
    /// Edwards private scalar a (sign-adjusted)
    a: Scalar,
    /// Canonical Edwards public key A = aB
    #[zeroize(skip)]
    public: VerifyingKey,
}

/// XEdDSA public key (canonical Edwards point derived from X25519)
#[derive(Clone, Copy, Debug)]
pub struct VerifyingKey {
    compressed: CompressedEdwardsY,
}

impl SigningKey {
    /// Derives the signing key from an X25519 secret.
    #[must_use]
    pub fn new(secret: &SecretKey) -> Self {
        let mut k_bytes = secret.to_bytes();
        let (a, a_point) = calculate_key_pair(&k_bytes);
        k_bytes.zeroize();

        Self {
            a,
            public: VerifyingKey {
                compressed: a_point.compress(),
            },
        }
    }

    /// Returns the XEdDSA public key.
    #[must_use]
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.public
    }

    /// Signs a message, drawing the 64-byte nonce input from `rng`.
    pub fn sign<R: CryptoRngCore>(&self, message: &[u8], rng: &mut R) -> [u8; SIGNATURE_LENGTH] {
        let mut z = [0u8; NONCE_LENGTH];
        rng.fill_bytes(&mut z);
        let signature = self.sign_with_nonce(message, &z);
        z.zeroize();
        signature
    }

    /// Signs a message with caller-provided nonce bytes.
    ///
    /// A fixed `z` (all zeros, say) makes signing deterministic for a
    /// given `(key, message)` pair.
    #[must_use]
    pub fn sign_with_nonce(&self, message: &[u8], z: &[u8; NONCE_LENGTH]) -> [u8; SIGNATURE_LENGTH] {
        // r = hash1(a || M || Z) (mod q)
        let mut hasher = domain_hash(1);
        hasher.update(self.a.as_bytes());
        hasher.update(message);
        hasher.update(z);
        let r = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());

        // R = rB
        let r_point = (&r * ED25519_BASEPOINT_TABLE).compress();

        // h = SHA-512(R || A || M) (mod q)
        let mut hasher = Sha512::new();
        hasher.update(r_point.as_bytes());
        hasher.update(self.public.compressed.as_bytes());
        hasher.update(message);
        let h = Scalar::from_bytes_mod_order_wide(&hasher.finalize().into());

        // s = r + ha (mod q)
        let s = r + (h * self.a);

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature[..32].copy_from_slice(r_point.as_bytes());
        signature[32..].copy_from_slice(s.as_bytes());
        signature
    }
}

impl VerifyingKey {
    /// Creates the verifying key from an X25519 public key.
    pub fn from_montgomery(public_key: &PublicKey) -> Result<Self> {
        Ok(Self {
            compressed: convert_mont(public_key.as_bytes())?,
        })
    }

    /// Returns the compressed Edwards Y coordinate.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        self.compressed.as_bytes()
    }

    /// Verifies an XEdDSA signature.
    ///
    /// Standard Ed25519 verification against the converted point,
    /// including the scalar-range and small-order checks.
    pub fn verify(&self, message: &[u8], signature: &[u8; SIGNATURE_LENGTH]) -> Result<()> {
        let verifying_key = Ed25519VerifyingKey::from_bytes(self.compressed.as_bytes())
            .map_err(|_| Error::BadPoint)?;

        let signature = Signature::from_bytes(signature);
        verifying_key
            .verify_strict(message, &signature)
            .map_err(|_| Error::BadSignature)
    }
}

impl std::fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SigningKey([REDACTED])")
    }
}

/// Signs `message` with an X25519 secret key.
pub fn sign<R: CryptoRngCore>(
    secret: &SecretKey,
    message: &[u8],
    rng: &mut R,
) -> [u8; SIGNATURE_LENGTH] {
    SigningKey::new(secret).sign(message, rng)
}

/// Verifies an XEdDSA signature under an X25519 public key.
///
/// # Errors
/// `BadLength` if the signature is not 64 bytes, `BadPoint` if the key
/// does not decode, `BadSignature` if verification fails.
pub fn verify(public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<()> {
    let signature: &[u8; SIGNATURE_LENGTH] =
        signature.try_into().map_err(|_| Error::BadLength)?;
    VerifyingKey::from_montgomery(public)?.verify(message, signature)
}
