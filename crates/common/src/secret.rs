//! Secret types for conference join passwords.
//!
//! Re-exports [`secrecy`] so every crate handles passwords the same way:
//! `Debug` output is redacted and the value is zeroized on drop. A join
//! request that derives `Debug` can therefore be logged without leaking the
//! password it carries.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct JoinAttempt {
//!     conference_id: String,
//!     password: Option<SecretString>,
//! }
//!
//! let attempt = JoinAttempt {
//!     conference_id: "weekly-sync".to_string(),
//!     password: Some(SecretString::from("hunter2")),
//! };
//!
//! assert!(!format!("{attempt:?}").contains("hunter2"));
//! assert_eq!(attempt.password.as_ref().map(|p| p.expose_secret()), Some("hunter2"));
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};

/// Compare a provided password against the expected one without
/// short-circuiting on the first differing byte.
///
/// Lengths are compared up front; the length of a conference password is not
/// considered sensitive.
#[must_use]
pub fn passwords_match(expected: &SecretString, provided: &SecretString) -> bool {
    let expected = expected.expose_secret().as_bytes();
    let provided = provided.expose_secret().as_bytes();

    if expected.len() != provided.len() {
        return false;
    }

    expected
        .iter()
        .zip(provided.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn test_debug_is_redacted() {
        let secret = SecretString::from("hunter2");
        let debug_str = format!("{secret:?}");

        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("hunter2"));
    }

    #[test]
    fn test_passwords_match() {
        let expected = SecretString::from("open-sesame");

        assert!(passwords_match(&expected, &SecretString::from("open-sesame")));
        assert!(!passwords_match(&expected, &SecretString::from("open-sesam")));
        assert!(!passwords_match(&expected, &SecretString::from("open-sesamE")));
        assert!(!passwords_match(&expected, &SecretString::from("")));
    }

    #[test]
    fn test_join_payload_password_deserializes_redacted() {
        #[allow(dead_code)]
        #[derive(Debug, Deserialize)]
        struct JoinPayload {
            conference_id: String,
            password: Option<SecretString>,
        }

        let json = r#"{"conference_id": "c-1", "password": "my-secret-value"}"#;
        let payload: JoinPayload = serde_json::from_str(json).expect("deserialize");

        let password = payload.password.as_ref().expect("password present");
        assert_eq!(password.expose_secret(), "my-secret-value");

        let debug = format!("{payload:?}");
        assert!(!debug.contains("my-secret-value"));
        assert!(debug.contains("REDACTED"));
    }
}
