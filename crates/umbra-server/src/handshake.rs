//! Server handshake controller (C6, §4.4).
//!
//! `init` runs the full session-bootstrap exchange and is the only
//! server round trip in scope: verify the client's key-possession
//! signature, mint a fresh server soul, derive the shared key,
//! generate the PoW challenge and CAPTCHA, persist the session, and
//! seal everything but the raw public keys inside a MACE AEAD pack
//! signed by the server's session-scoped Ed25519 key.
//!
//! Solving the PoW and reading the CAPTCHA happen entirely on the
//! client, against fields already in this response — there is no
//! second network leg, and this controller never sees a PoW nonce or
//! a CAPTCHA answer.

use std::sync::Arc;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use x25519_dalek::PublicKey as X25519PublicKey;

use umbra_core::mace::{self, Variant};
use umbra_core::{keys, primitives};

use crate::captcha::CaptchaRenderer;
use crate::config::ServerConfig;
use crate::error::HandshakeError;
use crate::rate_limiter::{Admission, RateLimiter};
use crate::store::{Session, SessionStore};

/// Fixed MACE difficulty for the `@SESSION-TOKEN` pack. A protocol
/// constant, never negotiated or derived from the rate limiter.
const SESSION_TOKEN_DIFFICULTY: u16 = 2;
const SESSION_TOKEN_CONTEXT: &str = "@SESSION-TOKEN";

/// Fixed MACE difficulty for the `@RESPONSE-PAYLOAD` pack.
const RESPONSE_PAYLOAD_DIFFICULTY: u16 = 8;
const RESPONSE_PAYLOAD_CONTEXT: &str = "@RESPONSE-PAYLOAD";

/// Fixed Argon2id parameters for the session-token-cipher-key
/// derivation. Independent of the rate limiter's tuned PoW iteration
/// count and of the PoW challenge's own Argon2id parameters.
const TOKEN_KEY_ITERATIONS: u32 = 24;
const TOKEN_KEY_MEMORY_KIB: u32 = 12 * 1024;
const TOKEN_KEY_PARALLELISM: u32 = 1;
const TOKEN_KEY_OUTPUT_LEN: usize = 32;

/// Shared state threaded through every handshake request.
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<dyn SessionStore>,
    pub rate_limiter: Arc<RateLimiter>,
    pub captcha: Arc<dyn CaptchaRenderer>,
}

#[derive(Debug, Deserialize)]
pub struct SessionInitRequest {
    pub client_ed25519_pubkey: String,
    pub client_x25519_pubkey: String,
    /// Signature, by the client's Ed25519 key, over the raw bytes of
    /// `client_x25519_pubkey` — proves the caller holds both keys.
    pub signature: String,
}

#[derive(Debug, Serialize)]
pub struct SessionInitResponse {
    pub session_id: Uuid,
    pub server_ed25519_pubkey: String,
    pub server_x25519_pubkey: String,
    /// Server signature over the raw bytes of `server_x25519_pubkey`,
    /// verified before the client trusts it for ECDH.
    pub server_x25519_pubkey_sign: String,
    /// Base64url `salt || tag || ciphertext` MACE AEAD pack. Decrypts
    /// to a JSON [`SessionPayload`] under the ECDH-derived shared key
    /// and the fixed `@RESPONSE-PAYLOAD` difficulty.
    pub pack: String,
    /// Server signature, by the same session-scoped Ed25519 key, over
    /// the raw pack bytes.
    pub signature: String,
}

/// Plaintext carried inside the response AEAD pack.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionPayload {
    pub pow_challenge: String,
    pub pow_salt: String,
    pub pow_memory_mb: u32,
    pub pow_iterations: u32,
    pub pow_parallelism: u32,
    pub captcha_png: String,
    /// Still MACE-sealed under the CAPTCHA-derived key; the client
    /// only unseals this locally once it has a solved CAPTCHA.
    pub session_token_ciphered: String,
    pub session_token_cipher_key_salt: String,
    pub expires_at: chrono::DateTime<Utc>,
}

fn decode_field(name: &'static str, value: &str) -> Result<Vec<u8>, HandshakeError> {
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| HandshakeError::BadEncoding(name))
}

fn derive_session_token_cipher_key(
    captcha_solution: u32,
    salt: &[u8; 12],
) -> Result<[u8; TOKEN_KEY_OUTPUT_LEN], HandshakeError> {
    let params = Params::new(
        TOKEN_KEY_MEMORY_KIB,
        TOKEN_KEY_ITERATIONS,
        TOKEN_KEY_PARALLELISM,
        Some(TOKEN_KEY_OUTPUT_LEN),
    )
    .map_err(|e| HandshakeError::Internal(anyhow::anyhow!("argon2 params: {e}")))?;
    let engine = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; TOKEN_KEY_OUTPUT_LEN];
    engine
        .hash_password_into(&(captcha_solution as u64).to_be_bytes(), salt, &mut out)
        .map_err(|e| HandshakeError::Internal(anyhow::anyhow!("session token key derivation: {e}")))?;
    Ok(out)
}

/// Run the full handshake: steps 1-13 of §4.4 in order.
pub async fn init(
    state: &AppState,
    identity: &str,
    req: SessionInitRequest,
) -> Result<SessionInitResponse, HandshakeError> {
    // 1. decode the client's key material and signature
    let client_ed_bytes = decode_field("client_ed25519_pubkey", &req.client_ed25519_pubkey)?;
    let client_x_bytes = decode_field("client_x25519_pubkey", &req.client_x25519_pubkey)?;
    let signature_bytes = decode_field("signature", &req.signature)?;

    // 2. verify the client actually holds the Ed25519 key it claims,
    //    over the X25519 key it's presenting for the exchange
    if !keys::verify(&client_ed_bytes, &client_x_bytes, &signature_bytes) {
        return Err(HandshakeError::BadSignature);
    }
    let client_x_arr: [u8; 32] = client_x_bytes
        .clone()
        .try_into()
        .map_err(|_| HandshakeError::BadClientKey)?;
    let client_x_pub = X25519PublicKey::from(client_x_arr);

    // 3. rate-limit this identity and pick its PoW iteration count
    let admission = state.rate_limiter.admit(identity, Utc::now());
    let iterations = match admission {
        Admission::Limited { retry_after_secs } => {
            return Err(HandshakeError::RateLimited { retry_after_secs })
        }
        Admission::Admitted { iterations, .. } => iterations,
    };

    // 4. mint a fresh server soul and derive its public keys
    let server_soul: [u8; 32] = primitives::random_bytes()?;
    let server_ed_pub = keys::ed25519_public_key(&server_soul);
    let server_x_pub = keys::x25519_public_key(&server_soul);

    // 5. sign the server's own x25519 pubkey so the client can trust
    //    it for ECDH before the pack signature is even computed
    let server_x_pubkey_sign = keys::sign(&server_soul, server_x_pub.as_bytes());

    // 6-7. ECDH against the client's X25519 key, then derive the
    //      session-scoped shared symmetric key
    let shared_secret = keys::compute_shared_secret(&server_soul, &client_x_pub);
    let shared_key = keys::session_shared_key(&shared_secret);

    // 8. mint the session identifier
    let session_id = Uuid::new_v4();

    // 9. generate the PoW challenge and its salt
    let pow_challenge = primitives::random_vec(state.config.pow.challenge_len)?;
    let pow_salt: [u8; 12] = primitives::random_bytes()?;

    // 10. generate the numeric CAPTCHA solution and render it
    let captcha_solution: u32 = rand::thread_rng().gen_range(100_000..1_000_000);
    let captcha_png = state.captcha.render(captcha_solution);

    // 11. derive the session-token-cipher-key from the CAPTCHA
    //     solution and seal a freshly minted session token under it
    let session_token_cipher_key_salt: [u8; 12] = primitives::random_bytes()?;
    let session_token: [u8; 24] = primitives::random_bytes()?;
    let token_cipher_key =
        derive_session_token_cipher_key(captcha_solution, &session_token_cipher_key_salt)?;
    let session_token_pack = mace::encrypt(
        &token_cipher_key,
        &session_token,
        SESSION_TOKEN_DIFFICULTY,
        Variant::MixinAead,
        SESSION_TOKEN_CONTEXT,
        Some(session_id.as_bytes()),
        false,
    )?;

    let now = Utc::now();
    let expires_at = now + Duration::seconds(state.config.session_expiry_secs as i64);

    // 12. persist the session
    let session = Session {
        id: session_id,
        client_ed25519_pubkey: client_ed_bytes
            .clone()
            .try_into()
            .map_err(|_| HandshakeError::BadClientKey)?,
        client_x25519_pubkey: client_x_arr,
        server_soul,
        shared_key,
        session_token,
        session_token_cipher_key_salt,
        captcha_solution,
        pow_challenge: pow_challenge.clone(),
        pow_salt,
        pow_memory_mb: state.config.pow.memory_mb,
        pow_iterations: iterations,
        pow_parallelism: state.config.pow.parallelism,
        last_nonces: std::collections::HashMap::new(),
        last_activity: now,
        created_at: now,
        expires_at,
    };
    state.store.insert(session);

    // 13. seal the payload and sign the pack
    let payload = SessionPayload {
        pow_challenge: URL_SAFE_NO_PAD.encode(&pow_challenge),
        pow_salt: URL_SAFE_NO_PAD.encode(pow_salt),
        pow_memory_mb: state.config.pow.memory_mb,
        pow_iterations: iterations,
        pow_parallelism: state.config.pow.parallelism,
        captcha_png: URL_SAFE_NO_PAD.encode(&captcha_png),
        session_token_ciphered: URL_SAFE_NO_PAD.encode(&session_token_pack.pack),
        session_token_cipher_key_salt: URL_SAFE_NO_PAD.encode(session_token_cipher_key_salt),
        expires_at,
    };
    let payload_bytes = serde_json::to_vec(&payload)
        .map_err(|e| HandshakeError::Internal(anyhow::anyhow!("encoding session payload: {e}")))?;
    let encrypted = mace::encrypt(
        &shared_key,
        &payload_bytes,
        RESPONSE_PAYLOAD_DIFFICULTY,
        Variant::Aead,
        RESPONSE_PAYLOAD_CONTEXT,
        None,
        false,
    )?;
    let pack_signature = keys::sign(&server_soul, &encrypted.pack);

    Ok(SessionInitResponse {
        session_id,
        server_ed25519_pubkey: URL_SAFE_NO_PAD.encode(server_ed_pub.to_bytes()),
        server_x25519_pubkey: URL_SAFE_NO_PAD.encode(server_x_pub.as_bytes()),
        server_x25519_pubkey_sign: URL_SAFE_NO_PAD.encode(server_x_pubkey_sign.to_bytes()),
        pack: URL_SAFE_NO_PAD.encode(&encrypted.pack),
        signature: URL_SAFE_NO_PAD.encode(pack_signature.to_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captcha::DigitGridRenderer;
    use crate::config::{PowConfig, RateLimiterConfig};
    use crate::store::InMemorySessionStore;

    fn test_rate_limiter_config() -> RateLimiterConfig {
        RateLimiterConfig {
            window_secs: 600,
            max_requests: 32,
            tracker_ttl_secs: 1800,
            pow_iterations_min: 1,
            pow_iterations_max: 1,
        }
    }

    fn test_state() -> AppState {
        AppState {
            config: ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
                session_expiry_secs: 300,
                janitor_interval_secs: 60,
                rate_limiter: test_rate_limiter_config(),
                pow: PowConfig {
                    memory_mb: 8,
                    parallelism: 1,
                    challenge_len: 1,
                    target_fail_prob: 1e-4,
                },
                log_dir: std::path::PathBuf::from("logs"),
            },
            store: Arc::new(InMemorySessionStore::new()),
            rate_limiter: Arc::new(RateLimiter::new(test_rate_limiter_config())),
            captcha: Arc::new(DigitGridRenderer),
        }
    }

    fn signed_client_request() -> (keys::Soul, SessionInitRequest) {
        let client_soul: keys::Soul = [3u8; 32];
        let client_ed_pub = keys::ed25519_public_key(&client_soul);
        let client_x_pub = keys::x25519_public_key(&client_soul);
        let sig = keys::sign(&client_soul, client_x_pub.as_bytes());
        let req = SessionInitRequest {
            client_ed25519_pubkey: URL_SAFE_NO_PAD.encode(client_ed_pub.to_bytes()),
            client_x25519_pubkey: URL_SAFE_NO_PAD.encode(client_x_pub.as_bytes()),
            signature: URL_SAFE_NO_PAD.encode(sig.to_bytes()),
        };
        (client_soul, req)
    }

    #[tokio::test]
    async fn happy_path_issues_a_decryptable_session() {
        let state = test_state();
        let (client_soul, req) = signed_client_request();
        let resp = init(&state, "10.0.0.1", req).await.unwrap();

        let server_ed_bytes = URL_SAFE_NO_PAD.decode(&resp.server_ed25519_pubkey).unwrap();
        let server_x_bytes = URL_SAFE_NO_PAD.decode(&resp.server_x25519_pubkey).unwrap();
        let server_x_sign_bytes = URL_SAFE_NO_PAD
            .decode(&resp.server_x25519_pubkey_sign)
            .unwrap();
        assert!(keys::verify(&server_ed_bytes, &server_x_bytes, &server_x_sign_bytes));

        let server_x_arr: [u8; 32] = server_x_bytes.try_into().unwrap();
        let server_x_pub = X25519PublicKey::from(server_x_arr);
        let client_shared = keys::compute_shared_secret(&client_soul, &server_x_pub);
        let shared_key = keys::session_shared_key(&client_shared);

        let pack = URL_SAFE_NO_PAD.decode(&resp.pack).unwrap();
        let sig_bytes = URL_SAFE_NO_PAD.decode(&resp.signature).unwrap();
        assert!(keys::verify(&server_ed_bytes, &pack, &sig_bytes));

        let dec = mace::decrypt(
            &shared_key,
            &pack,
            RESPONSE_PAYLOAD_DIFFICULTY,
            Variant::Aead,
            RESPONSE_PAYLOAD_CONTEXT,
            None,
        );
        assert!(dec.valid);
        let payload: SessionPayload = serde_json::from_slice(&dec.plaintext).unwrap();
        assert!(!payload.pow_challenge.is_empty());

        let session = state.store.get(resp.session_id, Utc::now()).unwrap();
        let token_salt: [u8; 12] = URL_SAFE_NO_PAD
            .decode(&payload.session_token_cipher_key_salt)
            .unwrap()
            .try_into()
            .unwrap();
        let token_key = derive_session_token_cipher_key(session.captcha_solution, &token_salt).unwrap();
        let token_pack = URL_SAFE_NO_PAD
            .decode(&payload.session_token_ciphered)
            .unwrap();
        let token_dec = mace::decrypt(
            &token_key,
            &token_pack,
            SESSION_TOKEN_DIFFICULTY,
            Variant::MixinAead,
            SESSION_TOKEN_CONTEXT,
            Some(resp.session_id.as_bytes()),
        );
        assert!(token_dec.valid);
        assert_eq!(token_dec.plaintext, session.session_token.to_vec());
    }

    #[tokio::test]
    async fn bad_signature_is_rejected() {
        let state = test_state();
        let (_client_soul, mut req) = signed_client_request();
        req.signature = URL_SAFE_NO_PAD.encode([0u8; 64]);
        let result = init(&state, "10.0.0.2", req).await;
        assert!(matches!(result, Err(HandshakeError::BadSignature)));
    }

    #[tokio::test]
    async fn exceeding_the_request_window_rate_limits_the_identity() {
        let rate_limiter_cfg = RateLimiterConfig {
            max_requests: 1,
            ..test_rate_limiter_config()
        };
        let mut state = test_state();
        state.config.rate_limiter = rate_limiter_cfg.clone();
        state.rate_limiter = Arc::new(RateLimiter::new(rate_limiter_cfg));

        let (_soul, req1) = signed_client_request();
        assert!(init(&state, "10.0.0.3", req1).await.is_ok());
        let (_soul, req2) = signed_client_request();
        let result = init(&state, "10.0.0.3", req2).await;
        assert!(matches!(result, Err(HandshakeError::RateLimited { .. })));
    }
}
