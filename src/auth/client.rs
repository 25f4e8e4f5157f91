//! Client side of the SRP-6a handshake.
//!
//! The handshake is modelled as explicit tagged states, so each step is only
//! reachable in order: `start` → `process_challenge` → `verify_server`.

use num_bigint::BigUint;
use zeroize::Zeroizing;

use super::srp::{self, SrpGroup};
use crate::crypto::{bytes_equal, HASH_SIZE};
use crate::error::{ChatError, Result};

enum ClientState {
    New,
    AwaitingChallenge {
        a: BigUint,
        a_pub: BigUint,
    },
    AwaitingSuccess {
        a_pub: BigUint,
        proof: [u8; HASH_SIZE],
        key: Zeroizing<[u8; HASH_SIZE]>,
    },
    Authenticated {
        key: Zeroizing<[u8; HASH_SIZE]>,
    },
    Failed,
}

/// One client-side authentication attempt.
pub struct SrpClient {
    username: String,
    state: ClientState,
}

impl SrpClient {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            state: ClientState::New,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Generates the private ephemeral `a` and returns the public `A = g^a mod N`.
    pub fn start(&mut self) -> Result<Vec<u8>> {
        if !matches!(self.state, ClientState::New) {
            return Err(ChatError::auth("handshake already started"));
        }

        let grp = srp::group();
        let (_scalar_bytes, a) = srp::random_scalar();
        let a_pub = grp.g.modpow(&a, &grp.n);
        let a_pub_bytes = a_pub.to_bytes_be();

        self.state = ClientState::AwaitingChallenge { a, a_pub };
        Ok(a_pub_bytes)
    }

    /// Consumes the server challenge `(B, salt)` and returns the proof `M`.
    ///
    /// Rejects `B ≡ 0 (mod N)` outright; accepting it would let an attacker
    /// force a known premaster.
    pub fn process_challenge(
        &mut self,
        b_pub: &[u8],
        salt: &[u8],
        password: &str,
    ) -> Result<[u8; HASH_SIZE]> {
        let (a, a_pub) = match std::mem::replace(&mut self.state, ClientState::Failed) {
            ClientState::AwaitingChallenge { a, a_pub } => (a, a_pub),
            other => {
                self.state = other;
                return Err(ChatError::auth("challenge received before handshake start"));
            }
        };

        let grp: &SrpGroup = srp::group();
        let b_pub = BigUint::from_bytes_be(b_pub);
        if srp::is_zero_mod_n(grp, &b_pub) {
            // state stays Failed
            return Err(ChatError::auth("server sent invalid public ephemeral"));
        }

        let u = srp::compute_u(&a_pub, &b_pub);
        let x = srp::compute_x(salt, &self.username, password);
        let premaster = srp::client_premaster(grp, &b_pub, &x, &a, &u);
        let key = Zeroizing::new(srp::session_key(&premaster));
        let proof = srp::compute_m(grp, &self.username, salt, &a_pub, &b_pub, &key[..]);

        self.state = ClientState::AwaitingSuccess { a_pub, proof, key };
        Ok(proof)
    }

    /// Verifies the server proof `H_AMK` in constant time.
    ///
    /// Returns `true` and enters the authenticated state on match; any
    /// mismatch is terminal for this attempt.
    pub fn verify_server(&mut self, h_amk: &[u8]) -> Result<bool> {
        let (a_pub, proof, key) = match std::mem::replace(&mut self.state, ClientState::Failed) {
            ClientState::AwaitingSuccess { a_pub, proof, key } => (a_pub, proof, key),
            other => {
                self.state = other;
                return Err(ChatError::auth("server proof received out of order"));
            }
        };

        let expected = srp::compute_h_amk(&a_pub, &proof, &key[..]);
        if bytes_equal(h_amk, &expected) {
            self.state = ClientState::Authenticated { key };
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.state, ClientState::Authenticated { .. })
    }

    /// The SRP shared key `K = H(S)`, available after mutual authentication.
    pub fn shared_key(&self) -> Option<&[u8; HASH_SIZE]> {
        match &self.state {
            ClientState::Authenticated { key } => Some(key),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_is_single_shot() {
        let mut client = SrpClient::new("alice");
        let a_pub = client.start().unwrap();
        assert!(!a_pub.is_empty());
        assert!(client.start().is_err());
    }

    #[test]
    fn test_challenge_requires_start() {
        let mut client = SrpClient::new("alice");
        assert!(client
            .process_challenge(&[1, 2, 3], b"salt", "pw")
            .is_err());
    }

    #[test]
    fn test_zero_b_rejected() {
        let mut client = SrpClient::new("alice");
        client.start().unwrap();
        assert!(client.process_challenge(&[0u8], b"salt", "pw").is_err());
        // terminal: a retry on the same attempt is not possible
        assert!(client.process_challenge(&[5u8], b"salt", "pw").is_err());
    }

    #[test]
    fn test_verify_out_of_order() {
        let mut client = SrpClient::new("alice");
        assert!(client.verify_server(&[0u8; 32]).is_err());
        assert!(!client.is_authenticated());
    }
}
