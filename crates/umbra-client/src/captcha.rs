//! Client-side CAPTCHA checkout (C7, counterpart to §4.5's
//! `CheckoutCaptcha`).
//!
//! Everything here runs locally against fields already delivered in
//! the `/session/init` response: there is no second network round
//! trip. A human (or whatever stands in for one in a test) reads the
//! CAPTCHA PNG and supplies its six-digit solution; that solution
//! derives the key that unseals the still-MACE-sealed session token.

use argon2::{Algorithm, Argon2, Params, Version};

use umbra_core::mace::{self, Variant};

use crate::error::ClientError;
use crate::introduce::IntroducedServer;

/// Fixed Argon2id parameters for the session-token-cipher-key
/// derivation. Unrelated to the PoW challenge's own, separately-tuned
/// Argon2id parameters in [`crate::pow`].
const DERIVE_ITERATIONS: u32 = 24;
const DERIVE_MEMORY_KIB: u32 = 12 * 1024;
const DERIVE_PARALLELISM: u32 = 1;
const DERIVE_OUTPUT_LEN: usize = 32;

/// Fixed MACE difficulty for the `@SESSION-TOKEN` pack. A protocol
/// constant, not negotiated at runtime.
const SESSION_TOKEN_DIFFICULTY: u16 = 2;
const SESSION_TOKEN_CONTEXT: &str = "@SESSION-TOKEN";
const SESSION_TOKEN_LEN: usize = 24;

/// Raw PNG bytes of the CAPTCHA challenge image for this session.
pub fn captcha_png(introduced: &IntroducedServer) -> &[u8] {
    &introduced.captcha_png
}

fn derive_session_token_cipher_key(
    captcha_solution: u64,
    salt: &[u8; 12],
) -> Result<[u8; DERIVE_OUTPUT_LEN], ClientError> {
    let params = Params::new(
        DERIVE_MEMORY_KIB,
        DERIVE_ITERATIONS,
        DERIVE_PARALLELISM,
        Some(DERIVE_OUTPUT_LEN),
    )
    .map_err(|e| ClientError::Core(umbra_core::CoreError::Argon2Params(e.to_string())))?;
    let engine = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let mut out = [0u8; DERIVE_OUTPUT_LEN];
    engine
        .hash_password_into(&captcha_solution.to_be_bytes(), salt, &mut out)
        .map_err(|e| ClientError::Core(umbra_core::CoreError::Argon2Params(e.to_string())))?;
    Ok(out)
}

/// Unseal the session token from `introduced` given the CAPTCHA
/// `solution` a human read off [`captcha_png`]. Returns
/// [`ClientError::WrongCaptcha`] if the derived key doesn't open the
/// pack (wrong solution), never a partial or best-effort token.
pub fn checkout_captcha(
    introduced: &IntroducedServer,
    solution: u64,
) -> Result<[u8; SESSION_TOKEN_LEN], ClientError> {
    let key = derive_session_token_cipher_key(
        solution,
        &introduced.session_token_cipher_key_salt,
    )?;

    let decrypted = mace::decrypt(
        &key,
        &introduced.session_token_ciphered,
        SESSION_TOKEN_DIFFICULTY,
        Variant::MixinAead,
        SESSION_TOKEN_CONTEXT,
        Some(introduced.session_id.as_bytes()),
    );
    if !decrypted.valid {
        return Err(ClientError::WrongCaptcha);
    }

    let len = decrypted.plaintext.len();
    decrypted
        .plaintext
        .try_into()
        .map_err(|_| ClientError::BadTokenLength(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::introduce::SessionPayload;
    use chrono::Utc;
    use uuid::Uuid;

    fn sealed(session_id: Uuid, solution: u64, salt: [u8; 12]) -> IntroducedServer {
        let key = derive_session_token_cipher_key(solution, &salt).unwrap();
        let token = [9u8; SESSION_TOKEN_LEN];
        let pack = mace::encrypt(
            &key,
            &token,
            SESSION_TOKEN_DIFFICULTY,
            Variant::MixinAead,
            SESSION_TOKEN_CONTEXT,
            Some(session_id.as_bytes()),
            false,
        )
        .unwrap()
        .pack;

        IntroducedServer {
            session_id,
            payload: SessionPayload {
                pow_challenge: String::new(),
                pow_salt: String::new(),
                pow_memory_mb: 12,
                pow_iterations: 2,
                pow_parallelism: 1,
                captcha_png: String::new(),
                session_token_ciphered: String::new(),
                session_token_cipher_key_salt: String::new(),
                expires_at: Utc::now(),
            },
            pow_challenge: vec![0xAB],
            pow_salt: [0u8; umbra_core::pow::SALT_LEN],
            captcha_png: vec![],
            session_token_ciphered: pack,
            session_token_cipher_key_salt: salt,
        }
    }

    #[test]
    fn correct_solution_unseals_the_token() {
        let session_id = Uuid::new_v4();
        let introduced = sealed(session_id, 424242, [3u8; 12]);
        let token = checkout_captcha(&introduced, 424242).unwrap();
        assert_eq!(token, [9u8; SESSION_TOKEN_LEN]);
    }

    #[test]
    fn wrong_solution_is_rejected() {
        let session_id = Uuid::new_v4();
        let introduced = sealed(session_id, 424242, [3u8; 12]);
        let result = checkout_captcha(&introduced, 999999);
        assert!(matches!(result, Err(ClientError::WrongCaptcha)));
    }
}
