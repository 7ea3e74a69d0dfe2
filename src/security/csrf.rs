//! CSRF token helpers.
//!
//! Generation and comparison only; where the token is stored and how it travels
//! (cookie, header, form field) is up to the application.

use rand::RngCore;

/// Random bytes per token. The hex form is twice as long.
pub const TOKEN_BYTES: usize = 32;

/// A fresh random token as lowercase hex.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);

    hex::encode(bytes)
}

/// Compare a presented token with the expected one in constant time.
///
/// Empty tokens never verify.
pub fn verify_token(presented: &str, expected: &str) -> bool {
    if presented.is_empty() || expected.is_empty() || presented.len() != expected.len() {
        return false;
    }

    presented
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_token_decodes_to_random_bytes() {
        let bytes = hex::decode(generate_token()).unwrap();
        assert_eq!(bytes.len(), TOKEN_BYTES);
    }

    #[test]
    fn test_verify_token() {
        let token = generate_token();
        assert!(verify_token(&token, &token.clone()));
        assert!(!verify_token(&token[..63], &token));
        assert!(!verify_token("", ""));

        let mut tampered = token.clone().into_bytes();
        tampered[10] = if tampered[10] == b'a' { b'b' } else { b'a' };
        assert!(!verify_token(&String::from_utf8(tampered).unwrap(), &token));
    }
}
