//! # srpchat
//!
//! A multi-user chat service built around an authenticated key-agreement
//! core: client and server mutually authenticate with SRP-6a — the password
//! never crosses the wire, the server stores only a salted verifier — and
//! chat payloads travel AES-256-GCM encrypted inside a length-prefixed
//! binary framing.
//!
//! ## Layers
//!
//! - [`crypto`]: AES-256-GCM engine, HKDF-SHA256 key derivation, SHA-256,
//!   constant-time comparison
//! - [`auth`]: SRP-6a math plus the client and server handshake state
//!   machines and the credential store
//! - [`protocol`]: 6-byte header framing and the typed message codec
//! - [`server`]: thread-per-connection orchestrator with encrypted broadcast
//!   fan-out
//! - [`client`]: connect/authenticate/receive-loop with pluggable rendering
//!
//! ## Example
//!
//! ```rust,no_run
//! use srpchat::server::Server;
//!
//! # fn main() -> srpchat::Result<()> {
//! let server = Server::bind(8888)?;
//! server.load_users()?;
//! server.run()?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod server;
pub mod types;

pub use error::{ChatError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
