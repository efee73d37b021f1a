//! Random base62 correlation tokens.

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Length of a generated request id.
pub(crate) const REQUEST_ID_LEN: usize = 18;

/// Length of the random part of a generated error id.
pub(crate) const ERROR_ID_LEN: usize = 12;

/// Returns `len` random characters from `[0-9A-Za-z]`.
pub fn base62(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

pub(crate) fn request_id() -> String {
    base62(REQUEST_ID_LEN)
}

/// Error ids carry an `e-` prefix so they are never mistaken for request ids.
pub(crate) fn error_id() -> String {
    format!("e-{}", base62(ERROR_ID_LEN))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base62_has_requested_length_and_alphabet() {
        let token = base62(32);
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn error_ids_are_prefixed() {
        let id = error_id();
        assert!(id.starts_with("e-"));
        assert_eq!(id.len(), 2 + ERROR_ID_LEN);
    }

    #[test]
    fn request_ids_differ() {
        assert_ne!(request_id(), request_id());
    }
}
