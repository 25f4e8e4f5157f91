//! SRP-6a group parameters and derivations.
//!
//! All hashes are SHA-256 over the concatenation of minimal big-endian
//! encodings. Products and sums that only ever appear as exponents (`u·x`,
//! `a + u·x`) are deliberately not reduced mod N.

use num_bigint::BigUint;
use num_traits::Zero;
use std::sync::OnceLock;
use zeroize::Zeroizing;

use crate::crypto::{random_bytes, sha256_parts, HASH_SIZE};

/// Salt length for new credentials (128 bits).
pub const SALT_SIZE: usize = 16;
/// Private ephemeral scalar length (256 bits).
pub const SCALAR_SIZE: usize = 32;

/// RFC 5054 group 14: 2048-bit safe prime, generator 2.
const N_HEX_2048: &str = "AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050\
                          A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50\
                          E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B8\
                          55F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773B\
                          CA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748\
                          544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6\
                          AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB6\
                          94B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

/// Registered user credentials: the server-side record that replaces the
/// password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    /// Random salt chosen at registration
    pub salt: Vec<u8>,
    /// `v = g^x mod N`, big-endian
    pub verifier: Vec<u8>,
}

/// The SRP group: prime modulus, generator, and multiplier `k = H(N || g)`.
pub(crate) struct SrpGroup {
    pub n: BigUint,
    pub g: BigUint,
    pub k: BigUint,
}

/// Returns the process-wide RFC 5054 group 14 parameters.
pub(crate) fn group() -> &'static SrpGroup {
    static GROUP: OnceLock<SrpGroup> = OnceLock::new();
    GROUP.get_or_init(|| {
        let hex: String = N_HEX_2048.split_whitespace().collect();
        let n = BigUint::parse_bytes(hex.as_bytes(), 16).expect("group modulus constant");
        let g = BigUint::from(2u32);
        let k = compute_k(&n, &g);
        SrpGroup { n, g, k }
    })
}

/// `k = H(N || g)`
fn compute_k(n: &BigUint, g: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha256_parts(&[&n.to_bytes_be(), &g.to_bytes_be()]))
}

/// `u = H(A || B)`
pub(crate) fn compute_u(a_pub: &BigUint, b_pub: &BigUint) -> BigUint {
    BigUint::from_bytes_be(&sha256_parts(&[&a_pub.to_bytes_be(), &b_pub.to_bytes_be()]))
}

/// `x = H(salt || H(username || ":" || password))`
pub(crate) fn compute_x(salt: &[u8], username: &str, password: &str) -> BigUint {
    let identity = sha256_parts(&[username.as_bytes(), b":", password.as_bytes()]);
    BigUint::from_bytes_be(&sha256_parts(&[salt, &identity]))
}

/// `v = g^x mod N`
pub(crate) fn compute_verifier(grp: &SrpGroup, x: &BigUint) -> BigUint {
    grp.g.modpow(x, &grp.n)
}

/// `B = (k·v + g^b) mod N`
pub(crate) fn compute_b_pub(grp: &SrpGroup, v: &BigUint, b: &BigUint) -> BigUint {
    let kv = (&grp.k * v) % &grp.n;
    let gb = grp.g.modpow(b, &grp.n);
    (kv + gb) % &grp.n
}

/// Client premaster: `S = (B − k·g^x)^(a + u·x) mod N`
pub(crate) fn client_premaster(
    grp: &SrpGroup,
    b_pub: &BigUint,
    x: &BigUint,
    a: &BigUint,
    u: &BigUint,
) -> BigUint {
    let gx = grp.g.modpow(x, &grp.n);
    let kgx = (&grp.k * gx) % &grp.n;
    // b_pub and kgx are both already reduced; lift by N before subtracting
    let base = ((b_pub % &grp.n) + &grp.n - kgx) % &grp.n;
    // exponent stays unreduced
    let exponent = a + u * x;
    base.modpow(&exponent, &grp.n)
}

/// Server premaster: `S = (A · v^u)^b mod N`
pub(crate) fn server_premaster(
    grp: &SrpGroup,
    a_pub: &BigUint,
    v: &BigUint,
    u: &BigUint,
    b: &BigUint,
) -> BigUint {
    let vu = v.modpow(u, &grp.n);
    let base = (a_pub * vu) % &grp.n;
    base.modpow(b, &grp.n)
}

/// `K = H(S)`
pub(crate) fn session_key(premaster: &BigUint) -> [u8; HASH_SIZE] {
    sha256_parts(&[&premaster.to_bytes_be()])
}

/// `M = H((H(N) XOR H(g)) || H(username) || salt || A || B || K)`
pub(crate) fn compute_m(
    grp: &SrpGroup,
    username: &str,
    salt: &[u8],
    a_pub: &BigUint,
    b_pub: &BigUint,
    key: &[u8],
) -> [u8; HASH_SIZE] {
    let h_n = sha256_parts(&[&grp.n.to_bytes_be()]);
    let h_g = sha256_parts(&[&grp.g.to_bytes_be()]);
    let mut xored = [0u8; HASH_SIZE];
    for (out, (a, b)) in xored.iter_mut().zip(h_n.iter().zip(h_g.iter())) {
        *out = a ^ b;
    }
    let h_username = sha256_parts(&[username.as_bytes()]);

    sha256_parts(&[
        &xored,
        &h_username,
        salt,
        &a_pub.to_bytes_be(),
        &b_pub.to_bytes_be(),
        key,
    ])
}

/// `H_AMK = H(A || M || K)`
pub(crate) fn compute_h_amk(a_pub: &BigUint, m: &[u8], key: &[u8]) -> [u8; HASH_SIZE] {
    sha256_parts(&[&a_pub.to_bytes_be(), m, key])
}

/// Generates a fresh random private ephemeral and its zeroised byte form.
pub(crate) fn random_scalar() -> (Zeroizing<Vec<u8>>, BigUint) {
    let bytes = Zeroizing::new(random_bytes(SCALAR_SIZE));
    let scalar = BigUint::from_bytes_be(&bytes);
    (bytes, scalar)
}

/// Returns true when `value` reduces to zero mod N.
pub(crate) fn is_zero_mod_n(grp: &SrpGroup, value: &BigUint) -> bool {
    (value % &grp.n).is_zero()
}

/// Generates registration credentials for `(username, password)`.
///
/// Runs entirely client-side; only the salt and verifier ever reach the
/// server.
pub fn generate_credentials(username: &str, password: &str) -> UserCredentials {
    let grp = group();
    let salt = random_bytes(SALT_SIZE);
    let x = compute_x(&salt, username, password);
    let verifier = compute_verifier(grp, &x);

    UserCredentials {
        username: username.to_string(),
        salt,
        verifier: verifier.to_bytes_be(),
    }
}
