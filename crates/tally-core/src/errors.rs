//! Core error types.

use thiserror::Error;

/// A persisted device identifier was not in canonical UUID form.
///
/// Always recovered locally by generating a fresh identity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// The value is not 36 characters long.
    #[error("device identity must be 36 characters, got {len}")]
    WrongLength {
        /// Observed length in characters.
        len: usize,
    },
    /// A separator is missing or a non-hex digit appears.
    #[error("device identity has an invalid character {found:?} at position {position}")]
    BadCharacter {
        /// Zero-based character position.
        position: usize,
        /// The offending character.
        found: char,
    },
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_length_display() {
        let err = IdentityError::WrongLength { len: 12 };
        assert_eq!(err.to_string(), "device identity must be 36 characters, got 12");
    }

    #[test]
    fn bad_character_display() {
        let err = IdentityError::BadCharacter {
            position: 8,
            found: 'x',
        };
        assert!(err.to_string().contains("'x' at position 8"));
    }
}
