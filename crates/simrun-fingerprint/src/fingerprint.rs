//! Fingerprint values

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseFingerprintError;

/// A fingerprint hash together with the ingredients it was computed over,
/// written `hash/ingredients`, e.g. `53c0-a4d0/tplx`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint {
    hash: String,
    ingredients: String,
}

impl Fingerprint {
    pub fn new(hash: impl Into<String>, ingredients: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            ingredients: ingredients.into(),
        }
    }

    /// Parse `hash/ingredients`
    pub fn parse(text: &str) -> Result<Self, ParseFingerprintError> {
        let text = text.trim();
        match text.rsplit_once('/') {
            Some((hash, ingredients)) if !hash.is_empty() && !hash.contains(char::is_whitespace) => {
                Ok(Self::new(hash, ingredients))
            }
            _ => Err(ParseFingerprintError(text.to_string())),
        }
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn ingredients(&self) -> &str {
        &self.ingredients
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hash, self.ingredients)
    }
}

impl FromStr for Fingerprint {
    type Err = ParseFingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let fp = Fingerprint::parse("53c0-a4d0/tplx").unwrap();
        assert_eq!(fp.hash(), "53c0-a4d0");
        assert_eq!(fp.ingredients(), "tplx");
        assert_eq!(fp.to_string(), "53c0-a4d0/tplx");
        assert_eq!("53c0-a4d0/tplx".parse::<Fingerprint>().unwrap(), fp);
    }

    #[test]
    fn test_equality_includes_ingredients() {
        assert_ne!(
            Fingerprint::parse("53c0-a4d0/tplx").unwrap(),
            Fingerprint::parse("53c0-a4d0/~tNl").unwrap()
        );
    }

    #[test]
    fn test_invalid() {
        assert!(Fingerprint::parse("53c0-a4d0").is_err());
        assert!(Fingerprint::parse("/tplx").is_err());
        assert!(Fingerprint::parse("").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let fp = Fingerprint::new("0000-0000", "tplx");
        assert_eq!(serde_json::to_string(&fp).unwrap(), "\"0000-0000/tplx\"");
        let parsed: Fingerprint = serde_json::from_str("\"1a2b-3c4d/tplx\"").unwrap();
        assert_eq!(parsed, Fingerprint::new("1a2b-3c4d", "tplx"));
    }
}
