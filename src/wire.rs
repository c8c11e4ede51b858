//! Byte-exact wire encodings.
//!
//! Everything here is the compatibility contract between peers: fixed
//! layouts, network byte order, no self-describing framing. Public keys
//! are always 32 bytes and signatures 64 bytes.

use crate::crypto::TAG_SIZE;
use crate::error::{Error, Result};
use crate::keys::PublicKey;
use crate::x3dh::{InitialMessage, PreKeyBundle};
use crate::xeddsa::SIGNATURE_LENGTH;

/// Wire value marking "no one-time prekey" in an initial message.
///
/// Real prekey IDs must stay below this value.
pub const ONE_TIME_PREKEY_SENTINEL: u32 = u32::MAX;

/// Ratchet message header: sender's current DH key and chain positions.
///
/// Sent in the clear but authenticated, as part of the AEAD associated
/// data of the message it precedes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatchetHeader {
    /// Sender's current DH ratchet public key
    pub dh_public: PublicKey,

    /// Length of the sender's previous sending chain (PN)
    pub prev_chain_len: u32,

    /// Message number within the current sending chain (N)
    pub msg_number: u32,
}

impl RatchetHeader {
    /// Encoded size: 32-byte key plus two u32 counters
    pub const SIZE: usize = 40;

    /// Serialize to the fixed 40-byte layout.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut bytes = [0u8; Self::SIZE];
        bytes[..32].copy_from_slice(self.dh_public.as_bytes());
        bytes[32..36].copy_from_slice(&self.prev_chain_len.to_be_bytes());
        bytes[36..40].copy_from_slice(&self.msg_number.to_be_bytes());
        bytes
    }

    /// Parse from exactly [`Self::SIZE`] bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let bytes: &[u8; Self::SIZE] = bytes.try_into().map_err(|_| Error::BadLength)?;

        let dh_public =
            PublicKey::from_bytes(bytes[..32].try_into().expect("header split is 32 bytes"));
        let prev_chain_len =
            u32::from_be_bytes(bytes[32..36].try_into().expect("header split is 4 bytes"));
        let msg_number =
            u32::from_be_bytes(bytes[36..40].try_into().expect("header split is 4 bytes"));

        Ok(Self {
            dh_public,
            prev_chain_len,
            msg_number,
        })
    }
}

/// A complete ratchet message: header plus AEAD ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatchetMessage {
    /// Plaintext header, authenticated via associated data
    pub header: RatchetHeader,

    /// AEAD output including the 16-byte tag
    pub ciphertext: Vec<u8>,
}

impl RatchetMessage {
    /// Serialize: header followed by ciphertext.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(RatchetHeader::SIZE + self.ciphertext.len());
        bytes.extend_from_slice(&self.header.to_bytes());
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Parse a serialized message.
    ///
    /// # Errors
    /// `BadLength` when the input cannot hold a header and an AEAD tag.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < RatchetHeader::SIZE + TAG_SIZE {
            return Err(Error::BadLength);
        }

        Ok(Self {
            header: RatchetHeader::from_bytes(&bytes[..RatchetHeader::SIZE])?,
            ciphertext: bytes[RatchetHeader::SIZE..].to_vec(),
        })
    }
}

// Bundle layout:
//   ik[32] || spk[32] || spk_sig[64] || opk_flag u8 || [opk_id u32 || opk[32]]
const BUNDLE_BASE_SIZE: usize = 32 + 32 + SIGNATURE_LENGTH + 1;
const BUNDLE_OPK_SIZE: usize = 4 + 32;

impl PreKeyBundle {
    /// Serialize for publication.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(BUNDLE_BASE_SIZE + BUNDLE_OPK_SIZE);
        bytes.extend_from_slice(self.identity_key.as_bytes());
        bytes.extend_from_slice(self.signed_prekey.as_bytes());
        bytes.extend_from_slice(&self.signed_prekey_signature);

        match &self.one_time_prekey {
            Some((id, opk)) => {
                bytes.push(1);
                bytes.extend_from_slice(&id.to_be_bytes());
                bytes.extend_from_slice(opk.as_bytes());
            }
            None => bytes.push(0),
        }
        bytes
    }

    /// Parse a published bundle.
    ///
    /// Parsing does not verify the prekey signature; callers do that
    /// before use.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BUNDLE_BASE_SIZE {
            return Err(Error::BadLength);
        }

        let identity_key =
            PublicKey::from_bytes(bytes[..32].try_into().expect("bundle split is 32 bytes"));
        let signed_prekey =
            PublicKey::from_bytes(bytes[32..64].try_into().expect("bundle split is 32 bytes"));
        let signed_prekey_signature = bytes[64..64 + SIGNATURE_LENGTH]
            .try_into()
            .expect("bundle split is 64 bytes");

        let one_time_prekey = match bytes[BUNDLE_BASE_SIZE - 1] {
            0 if bytes.len() == BUNDLE_BASE_SIZE => None,
            1 if bytes.len() == BUNDLE_BASE_SIZE + BUNDLE_OPK_SIZE => {
                let id = u32::from_be_bytes(
                    bytes[BUNDLE_BASE_SIZE..BUNDLE_BASE_SIZE + 4]
                        .try_into()
                        .expect("bundle split is 4 bytes"),
                );
                let opk = PublicKey::from_bytes(
                    bytes[BUNDLE_BASE_SIZE + 4..]
                        .try_into()
                        .expect("bundle split is 32 bytes"),
                );
                Some((id, opk))
            }
            _ => return Err(Error::BadLength),
        };

        Ok(Self {
            identity_key,
            signed_prekey,
            signed_prekey_signature,
            one_time_prekey,
        })
    }
}

// Initial message layout:
//   ik[32] || ek[32] || opk_id u32 (sentinel = no OPK) || ct_len u32 || ct
const INITIAL_BASE_SIZE: usize = 32 + 32 + 4 + 4;

impl InitialMessage {
    /// Serialize for transmission.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(INITIAL_BASE_SIZE + self.ciphertext.len());
        bytes.extend_from_slice(self.identity_key.as_bytes());
        bytes.extend_from_slice(self.ephemeral_key.as_bytes());
        bytes.extend_from_slice(
            &self
                .one_time_prekey_id
                .unwrap_or(ONE_TIME_PREKEY_SENTINEL)
                .to_be_bytes(),
        );
        bytes.extend_from_slice(&(self.ciphertext.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Parse a serialized initial message.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < INITIAL_BASE_SIZE {
            return Err(Error::BadLength);
        }

        let identity_key =
            PublicKey::from_bytes(bytes[..32].try_into().expect("message split is 32 bytes"));
        let ephemeral_key =
            PublicKey::from_bytes(bytes[32..64].try_into().expect("message split is 32 bytes"));

        let opk_id = u32::from_be_bytes(
            bytes[64..68].try_into().expect("message split is 4 bytes"),
        );
        let one_time_prekey_id = (opk_id != ONE_TIME_PREKEY_SENTINEL).then_some(opk_id);

        let ct_len = u32::from_be_bytes(
            bytes[68..72].try_into().expect("message split is 4 bytes"),
        ) as usize;
        if bytes.len() != INITIAL_BASE_SIZE + ct_len {
            return Err(Error::BadLength);
        }

        Ok(Self {
            identity_key,
            ephemeral_key,
            one_time_prekey_id,
            ciphertext: bytes[INITIAL_BASE_SIZE..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::SecretKey;
    use rand_core::OsRng;

    fn some_key() -> PublicKey {
        SecretKey::generate(&mut OsRng).public_key()
    }

    #[test]
    fn test_header_roundtrip() {
        let header = RatchetHeader {
            dh_public: some_key(),
            prev_chain_len: 10,
            msg_number: 5,
        };

        let bytes = header.to_bytes();
        assert_eq!(bytes.len(), RatchetHeader::SIZE);
        assert_eq!(RatchetHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_network_byte_order() {
        let header = RatchetHeader {
            dh_public: PublicKey::from_bytes([0u8; 32]),
            prev_chain_len: 0x0102_0304,
            msg_number: 0x0A0B_0C0D,
        };

        let bytes = header.to_bytes();
        assert_eq!(&bytes[32..36], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[36..40], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_header_wrong_length() {
        assert_eq!(
            RatchetHeader::from_bytes(&[0u8; 39]),
            Err(Error::BadLength)
        );
        assert_eq!(
            RatchetHeader::from_bytes(&[0u8; 41]),
            Err(Error::BadLength)
        );
    }

    #[test]
    fn test_message_roundtrip() {
        let message = RatchetMessage {
            header: RatchetHeader {
                dh_public: some_key(),
                prev_chain_len: 3,
                msg_number: 7,
            },
            ciphertext: vec![0xAB; 48],
        };

        let bytes = message.to_bytes();
        assert_eq!(RatchetMessage::from_bytes(&bytes).unwrap(), message);
    }

    #[test]
    fn test_message_too_short() {
        // Header alone, without room for an AEAD tag.
        let result = RatchetMessage::from_bytes(&[0u8; RatchetHeader::SIZE]);
        assert_eq!(result, Err(Error::BadLength));
    }

    #[test]
    fn test_bundle_roundtrip_with_opk() {
        let bundle = PreKeyBundle {
            identity_key: some_key(),
            signed_prekey: some_key(),
            signed_prekey_signature: [7u8; 64],
            one_time_prekey: Some((42, some_key())),
        };

        let bytes = bundle.to_bytes();
        let parsed = PreKeyBundle::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.identity_key, bundle.identity_key);
        assert_eq!(parsed.one_time_prekey, bundle.one_time_prekey);
    }

    #[test]
    fn test_bundle_roundtrip_without_opk() {
        let bundle = PreKeyBundle {
            identity_key: some_key(),
            signed_prekey: some_key(),
            signed_prekey_signature: [9u8; 64],
            one_time_prekey: None,
        };

        let parsed = PreKeyBundle::from_bytes(&bundle.to_bytes()).unwrap();
        assert!(parsed.one_time_prekey.is_none());
    }

    #[test]
    fn test_bundle_bad_flag() {
        let bundle = PreKeyBundle {
            identity_key: some_key(),
            signed_prekey: some_key(),
            signed_prekey_signature: [9u8; 64],
            one_time_prekey: None,
        };
        let mut bytes = bundle.to_bytes();
        bytes[BUNDLE_BASE_SIZE - 1] = 2;

        assert!(matches!(
            PreKeyBundle::from_bytes(&bytes),
            Err(Error::BadLength)
        ));
    }

    #[test]
    fn test_initial_message_roundtrip() {
        let message = InitialMessage {
            identity_key: some_key(),
            ephemeral_key: some_key(),
            one_time_prekey_id: Some(3),
            ciphertext: vec![1, 2, 3, 4],
        };

        let parsed = InitialMessage::from_bytes(&message.to_bytes()).unwrap();
        assert_eq!(parsed.one_time_prekey_id, Some(3));
        assert_eq!(parsed.ciphertext, message.ciphertext);
    }

    #[test]
    fn test_initial_message_sentinel() {
        let message = InitialMessage {
            identity_key: some_key(),
            ephemeral_key: some_key(),
            one_time_prekey_id: None,
            ciphertext: Vec::new(),
        };

        let bytes = message.to_bytes();
        assert_eq!(&bytes[64..68], &[0xFF; 4]);
        let parsed = InitialMessage::from_bytes(&bytes).unwrap();
        assert!(parsed.one_time_prekey_id.is_none());
    }

    #[test]
    fn test_initial_message_length_mismatch() {
        let message = InitialMessage {
            identity_key: some_key(),
            ephemeral_key: some_key(),
            one_time_prekey_id: None,
            ciphertext: vec![0u8; 10],
        };

        let mut bytes = message.to_bytes();
        bytes.pop();
        assert!(matches!(
            InitialMessage::from_bytes(&bytes),
            Err(Error::BadLength)
        ));
    }
}
