//! SRP-6a handshake tests driving the client and server state machines
//! directly, without any network in between.

use srpchat::auth::{generate_credentials, SrpClient, SrpServer};
use srpchat::ChatError;

const USERNAME: &str = "alice";
const PASSWORD: &str = "alice-pw";

fn server_with_alice() -> SrpServer {
    let server = SrpServer::new();
    assert!(server.register_user(generate_credentials(USERNAME, PASSWORD)));
    server
}

#[test]
fn test_full_handshake_succeeds() {
    let server = server_with_alice();
    let mut client = SrpClient::new(USERNAME);

    let a_pub = client.start().unwrap();
    let challenge = server.init_authentication(USERNAME, &a_pub).unwrap();
    assert!(challenge.user_id.starts_with("user_"));
    assert_eq!(challenge.user_id.len(), "user_".len() + 8);
    assert_eq!(challenge.salt.len(), 16);
    assert_eq!(challenge.room_salt.len(), 16);

    let proof = client
        .process_challenge(&challenge.b_pub, &challenge.salt, PASSWORD)
        .unwrap();
    let verify = server
        .verify_authentication(&challenge.user_id, &proof)
        .unwrap();

    assert!(client.verify_server(&verify.h_amk).unwrap());
    assert!(client.is_authenticated());
    assert!(client.shared_key().is_some());
    assert!(server.is_session_valid(&challenge.user_id));

    // the channel key is fresh randomness, not the SRP shared key
    assert_ne!(&verify.session_key[..], &client.shared_key().unwrap()[..]);
}

#[test]
fn test_wrong_password_rejected() {
    let server = server_with_alice();
    let mut client = SrpClient::new(USERNAME);

    let a_pub = client.start().unwrap();
    let challenge = server.init_authentication(USERNAME, &a_pub).unwrap();
    let proof = client
        .process_challenge(&challenge.b_pub, &challenge.salt, "wrong")
        .unwrap();

    let err = server
        .verify_authentication(&challenge.user_id, &proof)
        .unwrap_err();
    assert!(matches!(err, ChatError::Auth(_)));

    // the failed attempt is gone; a retry needs a new handshake
    assert!(!server.is_session_valid(&challenge.user_id));
    assert!(server
        .verify_authentication(&challenge.user_id, &proof)
        .is_err());
}

#[test]
fn test_tampered_proof_rejected() {
    let server = server_with_alice();
    let mut client = SrpClient::new(USERNAME);

    let a_pub = client.start().unwrap();
    let challenge = server.init_authentication(USERNAME, &a_pub).unwrap();
    let mut proof = client
        .process_challenge(&challenge.b_pub, &challenge.salt, PASSWORD)
        .unwrap();
    proof[0] ^= 0x01;

    assert!(server
        .verify_authentication(&challenge.user_id, &proof)
        .is_err());
}

#[test]
fn test_client_rejects_forged_server_proof() {
    let server = server_with_alice();
    let mut client = SrpClient::new(USERNAME);

    let a_pub = client.start().unwrap();
    let challenge = server.init_authentication(USERNAME, &a_pub).unwrap();
    let proof = client
        .process_challenge(&challenge.b_pub, &challenge.salt, PASSWORD)
        .unwrap();
    let verify = server
        .verify_authentication(&challenge.user_id, &proof)
        .unwrap();

    let mut forged = verify.h_amk;
    forged[31] ^= 0x80;
    assert!(!client.verify_server(&forged).unwrap());
    assert!(!client.is_authenticated());
    assert!(client.shared_key().is_none());
}

#[test]
fn test_unknown_user_is_distinguishable() {
    let server = SrpServer::new();
    let mut client = SrpClient::new("ghost");
    let a_pub = client.start().unwrap();

    let err = server.init_authentication("ghost", &a_pub).unwrap_err();
    match err {
        ChatError::UserNotFound(name) => assert_eq!(name, "ghost"),
        other => panic!("expected UserNotFound, got {other}"),
    }
}

#[test]
fn test_zero_client_ephemeral_rejected() {
    let server = server_with_alice();
    // empty and all-zero encodings both decode to A = 0
    assert!(server.init_authentication(USERNAME, &[]).is_err());
    assert!(server.init_authentication(USERNAME, &[0u8; 256]).is_err());
}

#[test]
fn test_independent_sessions_coexist() {
    let server = server_with_alice();
    assert!(server.register_user(generate_credentials("bob", "bob-pw")));

    let mut alice = SrpClient::new("alice");
    let mut bob = SrpClient::new("bob");

    let alice_challenge = server
        .init_authentication("alice", &alice.start().unwrap())
        .unwrap();
    let bob_challenge = server
        .init_authentication("bob", &bob.start().unwrap())
        .unwrap();
    assert_ne!(alice_challenge.user_id, bob_challenge.user_id);

    // verify in the opposite order from initiation
    let bob_proof = bob
        .process_challenge(&bob_challenge.b_pub, &bob_challenge.salt, "bob-pw")
        .unwrap();
    let bob_verify = server
        .verify_authentication(&bob_challenge.user_id, &bob_proof)
        .unwrap();
    assert!(bob.verify_server(&bob_verify.h_amk).unwrap());

    let alice_proof = alice
        .process_challenge(&alice_challenge.b_pub, &alice_challenge.salt, PASSWORD)
        .unwrap();
    let alice_verify = server
        .verify_authentication(&alice_challenge.user_id, &alice_proof)
        .unwrap();
    assert!(alice.verify_server(&alice_verify.h_amk).unwrap());

    assert_ne!(&alice_verify.session_key[..], &bob_verify.session_key[..]);
}

#[test]
fn test_session_cleared_on_disconnect() {
    let server = server_with_alice();
    let mut client = SrpClient::new(USERNAME);

    let a_pub = client.start().unwrap();
    let challenge = server.init_authentication(USERNAME, &a_pub).unwrap();

    server.clear_session(&challenge.user_id);
    let proof = client
        .process_challenge(&challenge.b_pub, &challenge.salt, PASSWORD)
        .unwrap();
    assert!(server
        .verify_authentication(&challenge.user_id, &proof)
        .is_err());
}
