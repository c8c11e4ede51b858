//! # Axon Protocol
//!
//! Forward-secret, self-healing authenticated messaging over Curve25519:
//! the X3DH asynchronous key agreement, the Double Ratchet messaging
//! protocol, and the XEdDSA/VXEdDSA signature schemes that let one
//! Montgomery key pair serve agreement, signing and a verifiable random
//! function.
//!
//! ## Security Properties
//!
//! - **Forward Secrecy**: past messages stay secret if current keys leak
//! - **Post-Compromise Security**: one honest round-trip heals a session
//!   after full state compromise
//! - **Asynchronous**: the initiator encrypts before the responder is
//!   online, against a published prekey bundle
//! - **Out-of-order tolerance**: reordered and dropped messages decrypt
//!   via retained skipped keys
//!
//! ## Threat Model
//!
//! The adversary may inject, modify, delay, drop and reorder messages,
//! and may compromise a device and extract all key material. X25519,
//! HKDF-SHA-256 and AES-256-GCM are assumed unbroken. Transport,
//! persistence and peer authentication UX are the caller's problem; the
//! crate consumes random bytes and exposes byte-oriented operations.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use axon_protocol::{IdentityKeyPair, PreKeyState, Session, SessionConfig};
//! use axon_protocol::x3dh;
//! use rand_core::OsRng;
//!
//! // Responder publishes a prekey bundle.
//! let bob_identity = IdentityKeyPair::generate(&mut OsRng);
//! let bob_prekeys = PreKeyState::generate(&mut OsRng, &bob_identity);
//! let bundle = bob_prekeys.public_bundle();
//!
//! // Initiator runs X3DH against it and opens a session.
//! let alice_identity = IdentityKeyPair::generate(&mut OsRng);
//! let handshake = x3dh::initiate(&mut OsRng, &alice_identity, &bundle)?;
//! let mut alice = Session::initiator(
//!     &handshake,
//!     &bundle.signed_prekey,
//!     SessionConfig::default(),
//! )?;
//!
//! // The first ratchet message rides inside the initial message.
//! let first = alice.send(&handshake.associated_data, b"hello")?;
//! let initial = handshake.initial_message(first.to_bytes());
//! let wire_bytes = initial.to_bytes();
//! # let _ = wire_bytes;
//! # Ok::<(), axon_protocol::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![warn(clippy::all, clippy::pedantic, clippy::cargo)]

pub mod crypto;
pub mod error;
pub mod keys;
pub mod session;
pub mod storage;
pub mod vxeddsa;
pub mod wire;
pub mod x3dh;
pub mod xeddsa;

// Re-export main types
pub use error::{Error, Result};
pub use keys::{IdentityKeyPair, PublicKey, SecretKey};
pub use session::{Session, SessionConfig, SessionState};
pub use wire::{RatchetHeader, RatchetMessage};
pub use x3dh::{InitialMessage, InitiatorResult, PreKeyBundle, PreKeyState, ResponderResult};
