//! SRP-6a authentication (RFC 5054 group parameters, SHA-256).
//!
//! The server never sees a password: registration stores a salted verifier
//! `v = g^x mod N`, and the handshake proves knowledge of the password on
//! both sides while deriving a shared key.
//!
//! One deliberate deviation from RFC 5054: operands are hashed in their
//! minimal big-endian encoding, without zero-padding to the group size.
//! This is the wire-compatibility contract of the protocol; both peers must
//! agree on it or every proof comparison fails.

pub mod client;
pub mod server;
mod srp;

pub use client::SrpClient;
pub use server::{ChallengeReply, SrpServer, VerifyReply};
pub use srp::{generate_credentials, UserCredentials, SALT_SIZE, SCALAR_SIZE};
