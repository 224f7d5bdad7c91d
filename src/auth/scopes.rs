//! OAuth scope handling for Shopify API.
//!
//! This module provides the [`AuthScopes`] type used to record what a
//! session's access token was granted and to check it against what a call
//! requires.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A set of OAuth scopes for Shopify API access.
///
/// Scopes are kept sorted and deduplicated. Shopify grants implied scopes
/// alongside write scopes, so parsing expands them:
///
/// - `write_products` implies `read_products`
/// - `unauthenticated_write_products` implies `unauthenticated_read_products`
///
/// # Serialization
///
/// `AuthScopes` serializes to and deserializes from a comma-separated string,
/// the same format Shopify returns in a token grant:
///
/// ```rust
/// use shopify_pipeline::AuthScopes;
///
/// let scopes: AuthScopes = "write_orders".parse().unwrap();
/// let json = serde_json::to_string(&scopes).unwrap();
/// assert_eq!(json, r#""read_orders,write_orders""#);
/// ```
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::AuthScopes;
///
/// let granted: AuthScopes = "read_products, write_orders".parse().unwrap();
/// let required: AuthScopes = "read_orders,read_customers".parse().unwrap();
///
/// assert!(!granted.covers(&required));
/// assert_eq!(granted.missing(&required), vec!["read_customers"]);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct AuthScopes {
    scopes: BTreeSet<String>,
}

impl AuthScopes {
    /// Creates an empty scope set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            scopes: BTreeSet::new(),
        }
    }

    /// Returns `true` if the scope set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Returns the number of scopes, implied scopes included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` if the set contains `scope`.
    #[must_use]
    pub fn contains(&self, scope: &str) -> bool {
        self.scopes.contains(scope)
    }

    /// Returns `true` if this scope set is a superset of `required`.
    #[must_use]
    pub fn covers(&self, required: &Self) -> bool {
        required.scopes.is_subset(&self.scopes)
    }

    /// Returns the scopes of `required` that this set lacks, in sorted order.
    #[must_use]
    pub fn missing<'a>(&self, required: &'a Self) -> Vec<&'a str> {
        required
            .scopes
            .iter()
            .filter(|scope| !self.scopes.contains(*scope))
            .map(String::as_str)
            .collect()
    }

    /// Returns an iterator over the scopes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.scopes.iter().map(String::as_str)
    }

    fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut scopes = BTreeSet::new();
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if let Some(implied) = implied_scope(name) {
                scopes.insert(implied);
            }
            scopes.insert(name.to_string());
        }
        Self { scopes }
    }
}

fn implied_scope(scope: &str) -> Option<String> {
    scope
        .strip_prefix("unauthenticated_write_")
        .map(|rest| format!("unauthenticated_read_{rest}"))
        .or_else(|| {
            scope
                .strip_prefix("write_")
                .map(|rest| format!("read_{rest}"))
        })
}

impl FromStr for AuthScopes {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').map(str::trim).collect();

        if let Some(bad) = names
            .iter()
            .find(|name| !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
        {
            return Err(ConfigError::InvalidScopes {
                reason: format!("Invalid characters in scope: '{bad}'"),
            });
        }

        Ok(Self::from_names(names))
    }
}

impl From<Vec<String>> for AuthScopes {
    fn from(scopes: Vec<String>) -> Self {
        Self::from_names(scopes)
    }
}

impl<'a> FromIterator<&'a str> for AuthScopes {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self::from_names(iter)
    }
}

impl fmt::Display for AuthScopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.iter().collect();
        f.write_str(&joined.join(","))
    }
}

impl Serialize for AuthScopes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for AuthScopes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_scopes_parses_comma_separated() {
        let scopes: AuthScopes = "read_products, write_orders".parse().unwrap();
        assert!(scopes.contains("read_products"));
        assert!(scopes.contains("write_orders"));
    }

    #[test]
    fn test_auth_scopes_ignores_empty_entries() {
        let scopes: AuthScopes = "read_products,, ,".parse().unwrap();
        assert_eq!(scopes.len(), 1);

        let empty: AuthScopes = "".parse().unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_auth_scopes_expands_implied_scopes() {
        let scopes: AuthScopes = "write_products,unauthenticated_write_checkouts"
            .parse()
            .unwrap();

        assert!(scopes.contains("read_products"));
        assert!(scopes.contains("unauthenticated_read_checkouts"));
        assert_eq!(scopes.len(), 4);
    }

    #[test]
    fn test_auth_scopes_rejects_invalid_characters() {
        let result: Result<AuthScopes, _> = "read-products".parse();
        assert!(matches!(result, Err(ConfigError::InvalidScopes { .. })));
    }

    #[test]
    fn test_covers_is_superset_check() {
        let granted: AuthScopes = "write_products,read_orders".parse().unwrap();

        assert!(granted.covers(&"read_products".parse().unwrap()));
        assert!(granted.covers(&AuthScopes::new()));
        assert!(!granted.covers(&"read_customers,read_orders".parse().unwrap()));
    }

    #[test]
    fn test_missing_lists_absent_scopes_sorted() {
        let granted: AuthScopes = "read_orders".parse().unwrap();
        let required: AuthScopes = "write_orders,read_customers".parse().unwrap();

        assert_eq!(granted.missing(&required), vec!["read_customers", "write_orders"]);
    }

    #[test]
    fn test_missing_names_outlive_granted_set() {
        let required: AuthScopes = "read_products,write_themes".parse().unwrap();
        let missing = {
            let granted: AuthScopes = "read_themes".parse().unwrap();
            granted.missing(&required)
        };

        assert_eq!(missing, vec!["read_products", "write_themes"]);
    }

    #[test]
    fn test_display_is_sorted_and_comma_joined() {
        let scopes: AuthScopes = "write_orders,read_products".parse().unwrap();
        assert_eq!(scopes.to_string(), "read_orders,read_products,write_orders");
    }

    #[test]
    fn test_from_iterator_of_str() {
        let scopes: AuthScopes = ["read_products", " write_themes "].into_iter().collect();
        assert!(scopes.contains("write_themes"));
        assert!(scopes.contains("read_themes"));
    }

    #[test]
    fn test_deserializes_from_comma_separated_string() {
        let scopes: AuthScopes = serde_json::from_str(r#""read_products,write_orders""#).unwrap();
        assert!(scopes.contains("read_orders"));
    }
}
