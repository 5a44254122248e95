//! Domain identifier types with validation
//!
//! This module provides newtype wrappers for the identifiers the engine passes
//! around: step names and the item keys that retry state is cached under.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Step name newtype wrapper
///
/// # Examples
///
/// ```
/// use chunkwise::domain::ids::StepName;
/// use std::str::FromStr;
///
/// let name = StepName::from_str("import-customers").unwrap();
/// assert_eq!(name.as_str(), "import-customers");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepName(String);

impl StepName {
    /// Creates a new StepName from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(StepName)` if the name is valid, `Err` otherwise
    pub fn new(name: impl Into<String>) -> Result<Self, String> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("Step name cannot be empty".to_string());
        }
        if name.chars().any(char::is_whitespace) {
            return Err(format!("Step name cannot contain whitespace: '{name}'"));
        }
        Ok(Self(name))
    }

    /// Returns the step name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StepName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for StepName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identity of an item across transactions
///
/// Items carry no identity of their own, so retry state is keyed by a hash of
/// the item's content. Equal items share a key, and therefore share retry state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey(u64);

impl ItemKey {
    /// Derive the key of an item from its content
    pub fn of<T: Hash + ?Sized>(item: &T) -> Self {
        let mut hasher = DefaultHasher::new();
        item.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// Raw key value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for ItemKey {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_name_valid() {
        let name = StepName::new("load-orders").unwrap();
        assert_eq!(name.as_str(), "load-orders");
        assert_eq!(name.to_string(), "load-orders");
    }

    #[test]
    fn test_step_name_rejects_empty_and_whitespace() {
        assert!(StepName::new("").is_err());
        assert!(StepName::new("   ").is_err());
        assert!(StepName::new("load orders").is_err());
    }

    #[test]
    fn test_item_key_is_content_based() {
        assert_eq!(ItemKey::of("alpha"), ItemKey::of("alpha"));
        assert_ne!(ItemKey::of("alpha"), ItemKey::of("beta"));
        assert_eq!(ItemKey::of(&42_i64), ItemKey::of(&42_i64));
    }

    #[test]
    fn test_item_key_display_is_hex() {
        let key = ItemKey::from(255);
        assert_eq!(key.to_string(), "00000000000000ff");
        assert_eq!(key.value(), 255);
    }
}
