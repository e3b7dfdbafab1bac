//! Client-side introduction (C7, counterpart to §4.5's
//! `IntroduceServer`/`SessionKeyPair`).
//!
//! Builds the signed request body for `/session/init`, then verifies
//! and decrypts the server's response. Two signatures gate trust here:
//! the server's Ed25519 signature over its own X25519 public key, and
//! its signature over the response pack. Either failing is fatal —
//! there is no fallback that trusts an unsigned key or an unsigned
//! pack (§9's resolved open question).
//!
//! The session token itself never appears in plaintext here: the pack
//! carries it still MACE-sealed under a CAPTCHA-derived key, decrypted
//! later by [`crate::captcha::checkout_captcha`].

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use x25519_dalek::PublicKey as X25519PublicKey;
use serde::{Deserialize, Serialize};

use umbra_core::keys;
use umbra_core::mace::{self, Variant};

use crate::error::ClientError;
use crate::keypair::SessionKeypair;

/// Fixed MACE difficulty for the `@RESPONSE-PAYLOAD` pack. A protocol
/// constant, not negotiated at runtime.
const RESPONSE_PAYLOAD_DIFFICULTY: u16 = 8;
const RESPONSE_PAYLOAD_CONTEXT: &str = "@RESPONSE-PAYLOAD";

#[derive(Debug, Serialize)]
pub struct SessionInitRequestBody {
    pub client_ed25519_pubkey: String,
    pub client_x25519_pubkey: String,
    pub signature: String,
}

/// The request body for `/session/init`: the client's two public keys
/// plus a signature proving it holds the Ed25519 half.
pub fn request_body(keypair: &SessionKeypair) -> SessionInitRequestBody {
    let x_pub_bytes = URL_SAFE_NO_PAD
        .decode(keypair.x25519_pubkey_b64())
        .expect("keypair always encodes a valid x25519 pubkey");
    let signature = keypair.sign(&x_pub_bytes);
    SessionInitRequestBody {
        client_ed25519_pubkey: keypair.ed25519_pubkey_b64().to_string(),
        client_x25519_pubkey: keypair.x25519_pubkey_b64().to_string(),
        signature: URL_SAFE_NO_PAD.encode(signature),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionInitResponseBody {
    pub session_id: uuid::Uuid,
    pub server_ed25519_pubkey: String,
    pub server_x25519_pubkey: String,
    pub server_x25519_pubkey_sign: String,
    pub pack: String,
    pub signature: String,
}

/// Decoded, decrypted, and authenticated session-bootstrap payload.
#[derive(Debug, Deserialize)]
pub struct SessionPayload {
    pub pow_challenge: String,
    pub pow_salt: String,
    pub pow_memory_mb: u32,
    pub pow_iterations: u32,
    pub pow_parallelism: u32,
    pub captcha_png: String,
    pub session_token_ciphered: String,
    pub session_token_cipher_key_salt: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub struct IntroducedServer {
    pub session_id: uuid::Uuid,
    pub payload: SessionPayload,
    pub pow_challenge: Vec<u8>,
    pub pow_salt: [u8; umbra_core::pow::SALT_LEN],
    pub captcha_png: Vec<u8>,
    pub session_token_ciphered: Vec<u8>,
    pub session_token_cipher_key_salt: [u8; 12],
}

fn decode(name: &'static str, value: &str) -> Result<Vec<u8>, ClientError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| ClientError::BadEncoding(name))
}

fn decode_array<const N: usize>(name: &'static str, value: &str) -> Result<[u8; N], ClientError> {
    let bytes = decode(name, value)?;
    bytes.try_into().map_err(|_| ClientError::BadWireLength)
}

/// Verify and decrypt a `/session/init` response.
pub fn introduce(
    keypair: &SessionKeypair,
    response: &SessionInitResponseBody,
) -> Result<IntroducedServer, ClientError> {
    let server_ed_bytes = decode("server_ed25519_pubkey", &response.server_ed25519_pubkey)?;
    let server_x_bytes = decode("server_x25519_pubkey", &response.server_x25519_pubkey)?;
    let server_x_sign_bytes = decode(
        "server_x25519_pubkey_sign",
        &response.server_x25519_pubkey_sign,
    )?;
    let pack = decode("pack", &response.pack)?;
    let signature = decode("signature", &response.signature)?;

    // The server's own x25519 pubkey must be signed before it's trusted
    // for ECDH; the pack's signature is a separate, later gate.
    if !keys::verify(&server_ed_bytes, &server_x_bytes, &server_x_sign_bytes) {
        return Err(ClientError::ServerSignatureInvalid);
    }
    if !keys::verify(&server_ed_bytes, &pack, &signature) {
        return Err(ClientError::ServerSignatureInvalid);
    }

    let server_x_arr: [u8; 32] = server_x_bytes
        .try_into()
        .map_err(|_| ClientError::BadWireLength)?;
    let server_x_pub = X25519PublicKey::from(server_x_arr);

    let shared_secret = keys::compute_shared_secret(keypair.soul(), &server_x_pub);
    let shared_key = keys::session_shared_key(&shared_secret);

    let decrypted = mace::decrypt(
        &shared_key,
        &pack,
        RESPONSE_PAYLOAD_DIFFICULTY,
        Variant::Aead,
        RESPONSE_PAYLOAD_CONTEXT,
        None,
    );
    if !decrypted.valid {
        return Err(ClientError::PackNotAuthentic);
    }

    let payload: SessionPayload =
        serde_json::from_slice(&decrypted.plaintext).map_err(ClientError::Transport)?;

    let pow_challenge = decode("pow_challenge", &payload.pow_challenge)?;
    let pow_salt = decode_array("pow_salt", &payload.pow_salt)?;
    let captcha_png = decode("captcha_png", &payload.captcha_png)?;
    let session_token_ciphered = decode("session_token_ciphered", &payload.session_token_ciphered)?;
    let session_token_cipher_key_salt =
        decode_array("session_token_cipher_key_salt", &payload.session_token_cipher_key_salt)?;

    Ok(IntroducedServer {
        session_id: response.session_id,
        payload,
        pow_challenge,
        pow_salt,
        captcha_png,
        session_token_ciphered,
        session_token_cipher_key_salt,
    })
}
