//! Canonical string keys for entity identifiers.
//!
//! Entities reach the server with ids in whatever shape the producer used: plain
//! integers, doubles coming out of a JSON payload, or strings. Every lookup table in
//! the engine is keyed by [`IdentityKey`], so all of those shapes are folded into one
//! string form here.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest magnitude a double can hold while every integer up to it is exact (2^53).
const MAX_EXACT_INTEGER_F64: f64 = 9_007_199_254_740_992.0;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalizes a textual id. Returns `None` for blank input.
    pub fn from_text(text: &str) -> Option<Self> {
        normalize(&RawId::Text(text.to_string()))
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for IdentityKey {
    fn from(id: i64) -> Self {
        IdentityKey(id.to_string())
    }
}

/// An entity identifier as it arrived, before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Int(i64),
    /// Unsigned ids past `i64::MAX`; smaller ones deserialize as `Int`.
    UInt(u64),
    Float(f64),
    Text(String),
    Unknown,
}

impl From<i64> for RawId {
    fn from(id: i64) -> Self {
        RawId::Int(id)
    }
}

impl From<u64> for RawId {
    fn from(id: u64) -> Self {
        match i64::try_from(id) {
            Ok(id) => RawId::Int(id),
            Err(_) => RawId::UInt(id),
        }
    }
}

impl From<f64> for RawId {
    fn from(id: f64) -> Self {
        RawId::Float(id)
    }
}

impl From<&str> for RawId {
    fn from(id: &str) -> Self {
        RawId::Text(id.to_string())
    }
}

impl From<String> for RawId {
    fn from(id: String) -> Self {
        RawId::Text(id)
    }
}

/// Folds any id representation into its canonical key.
///
/// Pure and total: unrepresentable inputs give `None`, never an empty key.
/// Integral doubles inside the exact range render like the matching integer, so
/// `7.0` and `7` share a key. Fractional, non-finite or out-of-range doubles have
/// no integer identity and are rejected.
pub fn normalize(raw: &RawId) -> Option<IdentityKey> {
    match raw {
        RawId::Int(id) => Some(IdentityKey(id.to_string())),
        RawId::UInt(id) => Some(IdentityKey(id.to_string())),
        RawId::Float(id) => {
            if !id.is_finite() || id.fract() != 0.0 || id.abs() > MAX_EXACT_INTEGER_F64 {
                return None;
            }
            // -0.0 as i64 is 0, which is what we want.
            Some(IdentityKey((*id as i64).to_string()))
        }
        RawId::Text(text) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(IdentityKey(trimmed.to_string()))
            }
        }
        RawId::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_double_and_string_share_a_key() {
        let a = normalize(&RawId::Int(7));
        let b = normalize(&RawId::Float(7.0));
        let c = normalize(&RawId::Text("7".into()));
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.unwrap().as_str(), "7");
    }

    #[test]
    fn negative_zero_is_zero() {
        assert_eq!(normalize(&RawId::Float(-0.0)).unwrap().as_str(), "0");
    }

    #[test]
    fn unrepresentable_inputs_are_absent() {
        assert_eq!(normalize(&RawId::Float(f64::NAN)), None);
        assert_eq!(normalize(&RawId::Float(f64::INFINITY)), None);
        assert_eq!(normalize(&RawId::Float(1.5)), None);
        assert_eq!(normalize(&RawId::Float(1e300)), None);
        assert_eq!(normalize(&RawId::Text("   ".into())), None);
        assert_eq!(normalize(&RawId::Text(String::new())), None);
        assert_eq!(normalize(&RawId::Unknown), None);
    }

    #[test]
    fn text_is_trimmed() {
        assert_eq!(IdentityKey::from_text("  goblin-3 ").unwrap().as_str(), "goblin-3");
    }

    #[test]
    fn large_unsigned_ids_stay_distinct() {
        let big = normalize(&RawId::from(u64::MAX)).unwrap();
        assert_eq!(big.as_str(), "18446744073709551615");
        assert_ne!(Some(big), normalize(&RawId::Int(-1)));
    }

    #[test]
    fn large_unsigned_ids_from_json_match_the_native_key() {
        let raw: RawId = serde_json::from_str("18446744073709551615").unwrap();
        assert_eq!(raw, RawId::UInt(u64::MAX));
        assert_eq!(normalize(&raw), normalize(&RawId::from(u64::MAX)));
        assert_eq!(normalize(&raw), IdentityKey::from_text("18446744073709551615"));

        let small: RawId = serde_json::from_str("42").unwrap();
        assert_eq!(small, RawId::Int(42));
    }

    #[test]
    fn raw_ids_deserialize_from_mixed_json() {
        let ids: Vec<RawId> = serde_json::from_str(r#"[3, 3.0, "3", null]"#).unwrap();
        let keys: Vec<Option<IdentityKey>> = ids.iter().map(normalize).collect();
        assert_eq!(keys[0], keys[1]);
        assert_eq!(keys[1], keys[2]);
        assert_eq!(keys[3], None);
    }
}
