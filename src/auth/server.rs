//! Server side of the SRP-6a handshake: credential store and per-attempt
//! session table.
//!
//! The credential store maps usernames to `(salt, verifier)` records and can
//! persist to a line-oriented text file. In-flight sessions live between
//! `init_authentication` and `verify_authentication` and are dropped on
//! failure or disconnect; there is no timer-based expiry.

use num_bigint::BigUint;
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use tracing::warn;
use zeroize::Zeroizing;

use super::srp::{self, UserCredentials, SALT_SIZE};
use crate::crypto::{bytes_equal, random_array, random_bytes, HASH_SIZE};
use crate::error::{ChatError, Result};

/// Everything the server needs to answer an `SRP_INIT`.
#[derive(Debug)]
pub struct ChallengeReply {
    pub user_id: String,
    pub b_pub: Vec<u8>,
    pub salt: Vec<u8>,
    pub room_salt: Vec<u8>,
}

/// Result of a successful proof verification.
pub struct VerifyReply {
    pub h_amk: [u8; HASH_SIZE],
    /// Fresh random key for the AEAD channel; independent of the SRP key `K`,
    /// which only serves mutual authentication.
    pub session_key: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for VerifyReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyReply")
            .field("h_amk", &hex::encode(self.h_amk))
            .field("session_key", &"<redacted>")
            .finish()
    }
}

struct InFlightSession {
    username: String,
    a_pub: Vec<u8>,
    b: Zeroizing<Vec<u8>>,
    b_pub: Vec<u8>,
    salt: Vec<u8>,
    verifier: Vec<u8>,
    key: Option<Zeroizing<[u8; HASH_SIZE]>>,
    authenticated: bool,
}

/// SRP-6a verifier store and authentication engine.
pub struct SrpServer {
    users: Mutex<HashMap<String, UserCredentials>>,
    sessions: Mutex<HashMap<String, InFlightSession>>,
    room_salt: Vec<u8>,
}

impl SrpServer {
    /// Creates a server with a fresh random room salt.
    pub fn new() -> Self {
        Self::with_room_salt(random_bytes(SALT_SIZE))
    }

    /// Creates a server with a caller-provided room salt.
    pub fn with_room_salt(room_salt: Vec<u8>) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            room_salt,
        }
    }

    /// Registers new credentials. Returns false when the username is taken.
    pub fn register_user(&self, creds: UserCredentials) -> bool {
        let mut users = self.users.lock().expect("credential store poisoned");
        if users.contains_key(&creds.username) {
            return false;
        }
        users.insert(creds.username.clone(), creds);
        true
    }

    pub fn user_exists(&self, username: &str) -> bool {
        self.users
            .lock()
            .expect("credential store poisoned")
            .contains_key(username)
    }

    pub fn remove_user(&self, username: &str) {
        self.users
            .lock()
            .expect("credential store poisoned")
            .remove(username);
    }

    /// Loads credentials from `path`, replacing the in-memory store.
    ///
    /// Missing files are treated as an empty store. Lines are
    /// `username:salt_hex:verifier_hex`; blank lines and `#` comments are
    /// skipped, as are lines that fail to parse.
    pub fn load_users(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = match fs::read_to_string(path.as_ref()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ChatError::storage(format!("failed to read user db: {e}"))),
        };

        let mut users = self.users.lock().expect("credential store poisoned");
        users.clear();

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.splitn(3, ':');
            let parsed = match (fields.next(), fields.next(), fields.next()) {
                (Some(username), Some(salt_hex), Some(verifier_hex)) => {
                    hex::decode(salt_hex).ok().zip(hex::decode(verifier_hex).ok()).map(
                        |(salt, verifier)| UserCredentials {
                            username: username.to_string(),
                            salt,
                            verifier,
                        },
                    )
                }
                _ => None,
            };

            match parsed {
                Some(creds) => {
                    users.insert(creds.username.clone(), creds);
                }
                None => warn!("skipping malformed user db line"),
            }
        }
        Ok(())
    }

    /// Rewrites the credential file with the current store contents.
    pub fn save_users(&self, path: impl AsRef<Path>) -> Result<()> {
        let users = self.users.lock().expect("credential store poisoned");

        let mut file = fs::File::create(path.as_ref())
            .map_err(|e| ChatError::storage(format!("failed to open user db for writing: {e}")))?;
        writeln!(file, "# srpchat user database")?;
        writeln!(file, "# format: username:salt_hex:verifier_hex")?;
        for creds in users.values() {
            writeln!(
                file,
                "{}:{}:{}",
                creds.username,
                hex::encode(&creds.salt),
                hex::encode(&creds.verifier)
            )?;
        }
        Ok(())
    }

    /// Starts an authentication attempt for `username` with client ephemeral
    /// `A`.
    ///
    /// Returns [`ChatError::UserNotFound`] when no credentials exist, so the
    /// caller can offer registration instead of failing the connection.
    pub fn init_authentication(&self, username: &str, a_pub: &[u8]) -> Result<ChallengeReply> {
        let creds = {
            let users = self.users.lock().expect("credential store poisoned");
            users
                .get(username)
                .cloned()
                .ok_or_else(|| ChatError::user_not_found(username))?
        };

        let grp = srp::group();
        let a = BigUint::from_bytes_be(a_pub);
        if srp::is_zero_mod_n(grp, &a) {
            return Err(ChatError::auth("invalid client public ephemeral"));
        }

        let v = BigUint::from_bytes_be(&creds.verifier);
        // regenerate on the vanishingly rare B ≡ 0 (mod N)
        let (b_bytes, b_pub) = loop {
            let (bytes, b) = srp::random_scalar();
            let b_pub = srp::compute_b_pub(grp, &v, &b);
            if !srp::is_zero_mod_n(grp, &b_pub) {
                break (bytes, b_pub);
            }
        };

        let mut sessions = self.sessions.lock().expect("session table poisoned");
        let user_id = loop {
            let candidate = format!("user_{}", hex::encode(random_array::<4>()));
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };

        let b_pub_bytes = b_pub.to_bytes_be();
        sessions.insert(
            user_id.clone(),
            InFlightSession {
                username: username.to_string(),
                a_pub: a.to_bytes_be(),
                b: b_bytes,
                b_pub: b_pub_bytes.clone(),
                salt: creds.salt.clone(),
                verifier: creds.verifier,
                key: None,
                authenticated: false,
            },
        );

        Ok(ChallengeReply {
            user_id,
            b_pub: b_pub_bytes,
            salt: creds.salt,
            room_salt: self.room_salt.clone(),
        })
    }

    /// Verifies the client proof `M` for an in-flight session.
    ///
    /// A mismatch drops the session; the client must reconnect to retry.
    pub fn verify_authentication(&self, user_id: &str, m: &[u8]) -> Result<VerifyReply> {
        let grp = srp::group();

        let (username, a_pub, b, b_pub, salt, verifier) = {
            let sessions = self.sessions.lock().expect("session table poisoned");
            let session = sessions
                .get(user_id)
                .ok_or_else(|| ChatError::auth("invalid session"))?;
            (
                session.username.clone(),
                BigUint::from_bytes_be(&session.a_pub),
                BigUint::from_bytes_be(&session.b),
                BigUint::from_bytes_be(&session.b_pub),
                session.salt.clone(),
                BigUint::from_bytes_be(&session.verifier),
            )
        };

        let u = srp::compute_u(&a_pub, &b_pub);
        let premaster = srp::server_premaster(grp, &a_pub, &verifier, &u, &b);
        let key = Zeroizing::new(srp::session_key(&premaster));
        let expected_m = srp::compute_m(grp, &username, &salt, &a_pub, &b_pub, &key[..]);

        if !bytes_equal(m, &expected_m) {
            self.clear_session(user_id);
            return Err(ChatError::auth("authentication failed"));
        }

        let h_amk = srp::compute_h_amk(&a_pub, &expected_m, &key[..]);
        let session_key = Zeroizing::new(random_array::<32>());

        let mut sessions = self.sessions.lock().expect("session table poisoned");
        if let Some(session) = sessions.get_mut(user_id) {
            session.key = Some(key);
            session.authenticated = true;
        }

        Ok(VerifyReply { h_amk, session_key })
    }

    /// True when `user_id` refers to a verified in-flight session.
    pub fn is_session_valid(&self, user_id: &str) -> bool {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .get(user_id)
            .map(|session| session.authenticated)
            .unwrap_or(false)
    }

    /// Username recorded for an in-flight session, if any.
    pub fn session_username(&self, user_id: &str) -> Option<String> {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .get(user_id)
            .map(|session| session.username.clone())
    }

    /// Drops an in-flight session (disconnect or failed attempt).
    pub fn clear_session(&self, user_id: &str) {
        self.sessions
            .lock()
            .expect("session table poisoned")
            .remove(user_id);
    }
}

impl Default for SrpServer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_credentials;

    #[test]
    fn test_register_rejects_duplicates() {
        let server = SrpServer::new();
        assert!(server.register_user(generate_credentials("alice", "alice-pw")));
        assert!(!server.register_user(generate_credentials("alice", "other")));
        assert!(server.user_exists("alice"));

        server.remove_user("alice");
        assert!(!server.user_exists("alice"));
    }

    #[test]
    fn test_init_unknown_user() {
        let server = SrpServer::new();
        let err = server.init_authentication("ghost", &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, ChatError::UserNotFound(_)));
    }

    #[test]
    fn test_init_rejects_zero_a() {
        let server = SrpServer::new();
        server.register_user(generate_credentials("alice", "alice-pw"));
        assert!(server.init_authentication("alice", &[]).is_err());
        assert!(server.init_authentication("alice", &[0u8]).is_err());
    }

    #[test]
    fn test_verify_unknown_session() {
        let server = SrpServer::new();
        assert!(server.verify_authentication("user_deadbeef", &[0u8; 32]).is_err());
    }

    #[test]
    fn test_user_db_roundtrip() {
        let server = SrpServer::new();
        server.register_user(generate_credentials("alice", "alice-pw"));
        server.register_user(generate_credentials("bob", "bob-pw"));

        let path = std::env::temp_dir().join(format!(
            "srpchat-users-{}.db",
            hex::encode(random_array::<8>())
        ));
        server.save_users(&path).unwrap();

        let restored = SrpServer::new();
        restored.load_users(&path).unwrap();
        assert!(restored.user_exists("alice"));
        assert!(restored.user_exists("bob"));
        assert!(!restored.user_exists("charlie"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_skips_comments_and_garbage() {
        let path = std::env::temp_dir().join(format!(
            "srpchat-users-{}.db",
            hex::encode(random_array::<8>())
        ));
        std::fs::write(
            &path,
            "# header\n\nalice:00ff:abcd\nnot a record\nbob:zz:11\n",
        )
        .unwrap();

        let server = SrpServer::new();
        server.load_users(&path).unwrap();
        assert!(server.user_exists("alice"));
        assert!(!server.user_exists("bob"));
        assert!(!server.user_exists("not a record"));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_empty_store() {
        let server = SrpServer::new();
        server.register_user(generate_credentials("alice", "alice-pw"));
        server
            .load_users("/nonexistent/srpchat-users.db")
            .unwrap();
        // the store is untouched when the file does not exist
        assert!(server.user_exists("alice"));
    }
}
