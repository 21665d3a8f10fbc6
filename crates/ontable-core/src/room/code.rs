//! Join codes: short, unambiguous room identifiers people can read aloud

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of symbols in a join code
pub const CODE_LENGTH: usize = 6;

/// Uppercase letters and digits without `0`, `1`, `I` and `O`
pub const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    #[error("join code must have {CODE_LENGTH} characters, got {0}")]
    Length(usize),
    #[error("join code contains unsupported character '{0}'")]
    Character(char),
}

/// A six character code identifying an advertised room.
///
/// Only unique among rooms advertised within radio range at the same time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JoinCode(String);

impl JoinCode {
    /// Draw a code uniformly at random
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let code = (0..CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Parse user input.
    ///
    /// Case, surrounding whitespace, and inner spaces or hyphens
    /// (`ab2 3cd`, `AB2-3CD`) are forgiven. Confusable characters are not.
    pub fn parse(input: &str) -> Result<Self, CodeError> {
        let code: String = input
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .map(|c| c.to_ascii_uppercase())
            .collect();

        if let Some(bad) = code
            .chars()
            .find(|c| !u8::try_from(*c).is_ok_and(|b| CODE_ALPHABET.contains(&b)))
        {
            return Err(CodeError::Character(bad));
        }
        let length = code.chars().count();
        if length != CODE_LENGTH {
            return Err(CodeError::Length(length));
        }
        Ok(Self(code))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compare against a code advertised by another device.
    ///
    /// Advertised values that do not parse never match.
    #[must_use]
    pub fn matches(&self, advertised: &str) -> bool {
        Self::parse(advertised).is_ok_and(|code| &code == self)
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JoinCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for JoinCode {
    type Error = CodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<JoinCode> for String {
    fn from(code: JoinCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn alphabet_has_no_confusable_symbols() {
        assert_eq!(CODE_ALPHABET.len(), 32);
        for confusable in [b'0', b'1', b'I', b'O'] {
            assert!(!CODE_ALPHABET.contains(&confusable));
        }
        let unique: HashSet<u8> = CODE_ALPHABET.iter().copied().collect();
        assert_eq!(unique.len(), 32);
    }

    #[test]
    fn generated_codes_are_valid() {
        for _ in 0..200 {
            let code = JoinCode::generate();
            assert_eq!(code.as_str().len(), CODE_LENGTH);
            assert!(code.as_str().bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert_eq!(JoinCode::parse(code.as_str()).unwrap(), code);
        }
    }

    #[test]
    fn generated_codes_vary() {
        let codes: HashSet<JoinCode> = (0..50).map(|_| JoinCode::generate()).collect();
        assert!(codes.len() > 1);
    }

    #[test]
    fn parse_normalizes_user_input() {
        assert_eq!(JoinCode::parse(" ab2-3cd ").unwrap().as_str(), "AB23CD");
        assert_eq!(JoinCode::parse("AB2 3CD").unwrap().as_str(), "AB23CD");
    }

    #[test]
    fn parse_rejects_bad_codes() {
        assert_eq!(JoinCode::parse("AB23C"), Err(CodeError::Length(5)));
        assert_eq!(JoinCode::parse("AB23CDE"), Err(CodeError::Length(7)));
        assert_eq!(JoinCode::parse("AB0CDE"), Err(CodeError::Character('0')));
        assert_eq!(JoinCode::parse("ABIOCD"), Err(CodeError::Character('I')));
        assert_eq!(JoinCode::parse("ABÉ3CD"), Err(CodeError::Character('É')));
    }

    #[test]
    fn matches_compares_normalized_codes() {
        let code = JoinCode::parse("AB23CD").unwrap();
        assert!(code.matches("ab23cd"));
        assert!(!code.matches("AB23CE"));
        assert!(!code.matches("garbage"));
    }

    #[test]
    fn serde_validates_codes() {
        let code: JoinCode = serde_json::from_str("\"XY7K9P\"").unwrap();
        assert_eq!(code.to_string(), "XY7K9P");
        assert!(serde_json::from_str::<JoinCode>("\"XY7K9\"").is_err());
    }
}
