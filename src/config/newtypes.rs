//! Validated newtype wrappers for configuration values.
//!
//! This module provides type-safe wrappers around string values that validate
//! their contents on construction, plus the pure [`normalize_shop_domain`]
//! function used to key sessions by shop.

use crate::error::ConfigError;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const MYSHOPIFY_SUFFIX: &str = ".myshopify.com";

/// Normalizes a shop identifier to its bare shop name.
///
/// Trims whitespace, lowercases, strips an `http://` or `https://` scheme,
/// trailing slashes, and the `.myshopify.com` suffix. The function performs
/// no validation; use [`ShopDomain::new`] for that.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::normalize_shop_domain;
///
/// assert_eq!(normalize_shop_domain("https://My-Store.myshopify.com/"), "my-store");
/// assert_eq!(normalize_shop_domain("my-store"), "my-store");
/// ```
#[must_use]
pub fn normalize_shop_domain(shop: &str) -> String {
    let lowered = shop.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let trimmed = without_scheme.trim_end_matches('/');
    trimmed
        .strip_suffix(MYSHOPIFY_SUFFIX)
        .unwrap_or(trimmed)
        .to_string()
}

/// A validated Shopify API key.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::ApiKey;
///
/// let key = ApiKey::new("my-api-key").unwrap();
/// assert_eq!(key.as_ref(), "my-api-key");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Creates a new validated API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiKey`] if the key is empty or whitespace.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ConfigError::EmptyApiKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for ApiKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A validated Shopify API secret key.
///
/// The secret signs session tokens issued to embedded apps, so the `Debug`
/// implementation masks it and prints only `ApiSecretKey(*****)`.
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::ApiSecretKey;
///
/// let secret = ApiSecretKey::new("my-secret").unwrap();
/// assert_eq!(format!("{:?}", secret), "ApiSecretKey(*****)");
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ApiSecretKey(String);

impl ApiSecretKey {
    /// Creates a new validated API secret key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyApiSecretKey`] if the key is empty or whitespace.
    pub fn new(key: impl Into<String>) -> Result<Self, ConfigError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ConfigError::EmptyApiSecretKey);
        }
        Ok(Self(key))
    }
}

impl AsRef<str> for ApiSecretKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiSecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiSecretKey(*****)")
    }
}

/// A validated, normalized Shopify shop.
///
/// Holds the bare shop name (`my-store`). Every accepted spelling of the
/// same shop (`My-Store`, `my-store.myshopify.com`,
/// `https://my-store.myshopify.com/`) produces an equal value, which is what
/// session ids and per-shop lookups are keyed on.
///
/// # Serialization
///
/// Serializes to the bare shop name:
///
/// ```rust
/// use shopify_pipeline::ShopDomain;
///
/// let domain = ShopDomain::new("https://my-store.myshopify.com").unwrap();
/// let json = serde_json::to_string(&domain).unwrap();
/// assert_eq!(json, r#""my-store""#);
/// ```
///
/// # Example
///
/// ```rust
/// use shopify_pipeline::ShopDomain;
///
/// let domain = ShopDomain::new("My-Store.myshopify.com").unwrap();
/// assert_eq!(domain.as_ref(), "my-store");
/// assert_eq!(domain.full_domain(), "my-store.myshopify.com");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShopDomain(String);

impl ShopDomain {
    /// Normalizes and validates a shop identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidShopDomain`] if the normalized name is
    /// empty, contains characters other than lowercase letters, digits and
    /// hyphens, starts or ends with a hyphen, or belongs to another domain.
    pub fn new(domain: impl AsRef<str>) -> Result<Self, ConfigError> {
        let raw = domain.as_ref();
        let name = normalize_shop_domain(raw);

        if !Self::is_valid_shop_name(&name) {
            return Err(ConfigError::InvalidShopDomain {
                domain: raw.to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Returns the `{shop}.myshopify.com` host for this shop.
    #[must_use]
    pub fn full_domain(&self) -> String {
        format!("{}{MYSHOPIFY_SUFFIX}", self.0)
    }

    fn is_valid_shop_name(name: &str) -> bool {
        if name.is_empty() || name.starts_with('-') || name.ends_with('-') {
            return false;
        }

        name.chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    }
}

impl AsRef<str> for ShopDomain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShopDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for ShopDomain {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for ShopDomain {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_scheme_suffix_and_case() {
        assert_eq!(normalize_shop_domain("shop1"), "shop1");
        assert_eq!(normalize_shop_domain("SHOP1.myshopify.com"), "shop1");
        assert_eq!(normalize_shop_domain("https://shop1.myshopify.com"), "shop1");
        assert_eq!(normalize_shop_domain("http://shop1.myshopify.com/"), "shop1");
        assert_eq!(normalize_shop_domain("  Shop1  "), "shop1");
    }

    #[test]
    fn test_api_key_rejects_empty_string() {
        assert!(matches!(ApiKey::new(""), Err(ConfigError::EmptyApiKey)));
        assert!(matches!(ApiKey::new("   "), Err(ConfigError::EmptyApiKey)));
    }

    #[test]
    fn test_api_secret_key_masks_value_in_debug() {
        let secret = ApiSecretKey::new("super-secret-key").unwrap();
        let debug_output = format!("{secret:?}");
        assert_eq!(debug_output, "ApiSecretKey(*****)");
        assert!(!debug_output.contains("super-secret-key"));
    }

    #[test]
    fn test_shop_domain_spellings_are_equal() {
        let short = ShopDomain::new("my-store").unwrap();
        let full = ShopDomain::new("my-store.myshopify.com").unwrap();
        let url = ShopDomain::new("HTTPS://My-Store.myshopify.com/").unwrap();

        assert_eq!(short, full);
        assert_eq!(full, url);
        assert_eq!(short.full_domain(), "my-store.myshopify.com");
    }

    #[test]
    fn test_shop_domain_rejects_invalid_domains() {
        assert!(ShopDomain::new("").is_err());
        assert!(ShopDomain::new("my store").is_err());
        assert!(ShopDomain::new("my_store").is_err());
        assert!(ShopDomain::new("-my-store").is_err());
        assert!(ShopDomain::new("my-store-").is_err());
        assert!(ShopDomain::new("my-store.otherdomain.com").is_err());
    }

    #[test]
    fn test_shop_domain_error_keeps_original_input() {
        let err = ShopDomain::new("bad store").unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidShopDomain {
                domain: "bad store".to_string()
            }
        );
    }

    #[test]
    fn test_shop_domain_deserialize_normalizes() {
        let domain: ShopDomain = serde_json::from_str(r#""shop1.myshopify.com""#).unwrap();
        assert_eq!(domain.as_ref(), "shop1");
    }

    #[test]
    fn test_shop_domain_deserialize_rejects_invalid() {
        let result: Result<ShopDomain, _> = serde_json::from_str(r#""not valid""#);
        assert!(result.is_err());
    }
}
