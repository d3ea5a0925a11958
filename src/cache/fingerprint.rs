use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::CacheError;

/// Arguments of a cacheable call, canonicalised for fingerprinting.
///
/// Positional arguments keep their order; named arguments are kept sorted by
/// name so the order they were supplied in does not matter.
///
/// Every argument must serialize deterministically: scalars, strings, sequences,
/// maps and plain structs of those. Types whose serialized form depends on
/// anything but their value (pointer identity, iteration order of an unordered
/// custom collection, NaN payloads) are outside the contract. Arguments that
/// cannot be serialized at all are rejected with `CacheError::KeyDerivation`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional argument
    pub fn arg<T: Serialize + ?Sized>(mut self, value: &T) -> Result<Self, CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::KeyDerivation {
            argument: format!("#{}", self.positional.len()),
            source,
        })?;
        self.positional.push(value);
        Ok(self)
    }

    /// Set a named argument, replacing any previous value under that name
    pub fn named<T: Serialize + ?Sized>(mut self, name: &str, value: &T) -> Result<Self, CacheError> {
        let value = serde_json::to_value(value).map_err(|source| CacheError::KeyDerivation {
            argument: name.to_string(),
            source,
        })?;
        self.named.insert(name.to_string(), value);
        Ok(self)
    }

    /// SHA-256 over the canonical `(identity, args, sorted kwargs)` encoding, hex encoded
    pub fn fingerprint(&self, identity: &str) -> Result<String, CacheError> {
        let payload = json!({
            "identity": identity,
            "args": self.positional,
            "kwargs": self.named,
        });
        Ok(format!("{:x}", Sha256::digest(payload.to_string().as_bytes())))
    }
}
