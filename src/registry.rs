//! Public keys of the certificate issuers, looked up by key identifier.
//!
//! The registry file is the merged EU and UK trust list, one entry per key,
//! with key components as arrays of byte values:
//! ```text
//! [ { "kid": "JT1eK1Jufjc=", "algo": "EC",  "usage": ["v"], "country": "IT", "x": [..], "y": [..] },
//!   { "kid": "...",          "algo": "RSA", "usage": [],    "country": "FR", "e": [1, 0, 1], "n": [..] } ]
//! ```

use std::collections::HashMap;

#[cfg(feature = "json")]
use serde::Deserialize;

use crate::StatementKind;
#[cfg(feature = "json")]
use crate::{util::gunzip_if_compressed, LoadError};

/// Public key components, big-endian.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// NIST P-256 point.
    Ec { x: Vec<u8>, y: Vec<u8> },
    Rsa { e: Vec<u8>, n: Vec<u8> },
    /// A key this crate cannot verify with, named by its algorithm.
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyRecord {
    /// Key identifier, standard Base64.
    pub kid: String,
    /// Statement kinds the key may sign.
    pub usage: Vec<StatementKind>,
    /// Country the key belongs to, part of the revocation hash.
    pub country: String,
    pub key: KeyMaterial,
}

impl PublicKeyRecord {
    #[must_use]
    pub fn allows(&self, kind: StatementKind) -> bool {
        self.usage.contains(&kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyRegistry {
    by_kid: HashMap<String, Vec<PublicKeyRecord>>,
}

impl KeyRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key. Several keys may share one identifier.
    pub fn insert(&mut self, record: PublicKeyRecord) {
        self.by_kid.entry(record.kid.clone()).or_default().push(record);
    }

    /// Joins two registries, e.g. the EU and UK trust lists.
    #[must_use]
    pub fn merge(mut self, other: KeyRegistry) -> Self {
        for (kid, records) in other.by_kid {
            self.by_kid.entry(kid).or_default().extend(records);
        }
        self
    }

    /// Keys registered under `kid` that may sign a statement of `kind`,
    /// in registry order.
    pub fn candidates<'r>(
        &'r self,
        kid: &str,
        kind: StatementKind,
    ) -> impl Iterator<Item = &'r PublicKeyRecord> + 'r {
        self.by_kid
            .get(kid)
            .into_iter()
            .flatten()
            .filter(move |record| record.allows(kind))
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_kid.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(feature = "json")]
#[derive(Deserialize)]
struct RawKey {
    kid: String,
    algo: String,
    #[serde(default)]
    usage: Vec<String>,
    #[serde(default)]
    country: String,
    x: Option<Vec<u8>>,
    y: Option<Vec<u8>>,
    e: Option<Vec<u8>>,
    n: Option<Vec<u8>>,
}

#[cfg(feature = "json")]
impl From<RawKey> for PublicKeyRecord {
    fn from(raw: RawKey) -> Self {
        let mut usage = Vec::with_capacity(3);
        for letter in &raw.usage {
            match StatementKind::from_letter(letter) {
                Some(kind) if !usage.contains(&kind) => usage.push(kind),
                Some(_) => (),
                None => log::warn!("Key {} has unknown usage {letter:?}", raw.kid),
            }
        }
        if raw.usage.is_empty() {
            usage = vec![
                StatementKind::Vaccination,
                StatementKind::Test,
                StatementKind::Recovery,
            ];
        }

        let key = match (raw.algo.to_ascii_uppercase().as_str(), raw.x, raw.y, raw.e, raw.n) {
            ("EC", Some(x), Some(y), _, _) => KeyMaterial::Ec { x, y },
            ("RSA", _, _, Some(e), Some(n)) => KeyMaterial::Rsa { e, n },
            ("EC" | "RSA", ..) => {
                log::warn!("Key {} lacks its {} components", raw.kid, raw.algo);
                KeyMaterial::Unsupported(format!("incomplete {} key", raw.algo))
            }
            _ => {
                log::warn!("Key {} uses unsupported algorithm {}", raw.kid, raw.algo);
                KeyMaterial::Unsupported(raw.algo)
            }
        };

        PublicKeyRecord {
            kid: raw.kid,
            usage,
            country: raw.country,
            key,
        }
    }
}

#[cfg(feature = "json")]
impl KeyRegistry {
    /// Parses a registry file. An empty usage list allows every statement kind.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Self::from_json_bytes(json.as_bytes())
    }

    /// Like [`KeyRegistry::from_json`], accepting gzip-compressed input too.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let json = gunzip_if_compressed(bytes)?;
        let raw: Vec<RawKey> = serde_json::from_slice(&json)?;
        let mut registry = KeyRegistry::new();
        for key in raw {
            registry.insert(key.into());
        }
        log::trace!("Loaded {} public keys", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kid: &str, usage: &[StatementKind], country: &str) -> PublicKeyRecord {
        PublicKeyRecord {
            kid: kid.into(),
            usage: usage.to_vec(),
            country: country.into(),
            key: KeyMaterial::Unsupported("test".into()),
        }
    }

    #[test]
    fn filters_candidates_by_usage() {
        let mut registry = KeyRegistry::new();
        registry.insert(record("a", &[StatementKind::Vaccination], "IT"));
        registry.insert(record("a", &[StatementKind::Test, StatementKind::Recovery], "FR"));
        registry.insert(record("b", &[StatementKind::Vaccination], "DE"));

        let countries: Vec<_> = registry
            .candidates("a", StatementKind::Vaccination)
            .map(|r| r.country.as_str())
            .collect();
        assert_eq!(countries, ["IT"]);
        assert_eq!(registry.candidates("a", StatementKind::Recovery).count(), 1);
        assert_eq!(registry.candidates("c", StatementKind::Vaccination).count(), 0);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn merges_registries() {
        let mut eu = KeyRegistry::new();
        eu.insert(record("a", &[StatementKind::Vaccination], "IT"));
        let mut uk = KeyRegistry::new();
        uk.insert(record("a", &[StatementKind::Vaccination], "UK"));
        uk.insert(record("b", &[StatementKind::Test], "UK"));

        let merged = eu.merge(uk);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged.candidates("a", StatementKind::Vaccination).count(), 2);
        assert!(!merged.is_empty());
        assert!(KeyRegistry::new().is_empty());
    }

    #[cfg(feature = "json")]
    #[test]
    fn parses_registry_file() {
        let registry = KeyRegistry::from_json(
            r#"[
                {"kid": "ec", "algo": "EC", "usage": ["V", "t"], "country": "IT",
                 "x": [1, 2], "y": [3, 4]},
                {"kid": "rsa", "algo": "RSA", "usage": [], "country": "FR",
                 "e": [1, 0, 1], "n": [255]},
                {"kid": "dsa", "algo": "DSA", "usage": ["v"]},
                {"kid": "half", "algo": "EC", "usage": ["v", "x"], "x": [1]}
            ]"#,
        )
        .unwrap();

        let ec: Vec<_> = registry.candidates("ec", StatementKind::Vaccination).collect();
        assert_eq!(
            ec[0],
            &PublicKeyRecord {
                kid: "ec".into(),
                usage: vec![StatementKind::Vaccination, StatementKind::Test],
                country: "IT".into(),
                key: KeyMaterial::Ec {
                    x: vec![1, 2],
                    y: vec![3, 4]
                },
            }
        );
        assert_eq!(registry.candidates("ec", StatementKind::Recovery).count(), 0);

        let rsa: Vec<_> = registry.candidates("rsa", StatementKind::Recovery).collect();
        assert_eq!(
            rsa[0].key,
            KeyMaterial::Rsa {
                e: vec![1, 0, 1],
                n: vec![255]
            }
        );

        let dsa: Vec<_> = registry.candidates("dsa", StatementKind::Vaccination).collect();
        assert_eq!(dsa[0].key, KeyMaterial::Unsupported("DSA".into()));
        assert_eq!(dsa[0].country, "");

        let half: Vec<_> = registry.candidates("half", StatementKind::Vaccination).collect();
        assert_eq!(half[0].usage, [StatementKind::Vaccination]);
        assert!(matches!(half[0].key, KeyMaterial::Unsupported(_)));
    }

    #[cfg(feature = "json")]
    #[test]
    fn parses_gzipped_registry_file() {
        let json = br#"[{"kid": "k", "algo": "EC", "usage": ["r"], "x": [], "y": []}]"#;
        let registry = KeyRegistry::from_json_bytes(&crate::testing::gzip(json)).unwrap();
        assert_eq!(registry.candidates("k", StatementKind::Recovery).count(), 1);
    }

    #[cfg(feature = "json")]
    #[test]
    fn rejects_malformed_registry_file() {
        assert!(matches!(
            KeyRegistry::from_json(r#"[{"algo": "EC"}]"#),
            Err(LoadError::Json(_))
        ));
        assert!(matches!(
            KeyRegistry::from_json(r#"{"kid": "k"}"#),
            Err(LoadError::Json(_))
        ));
    }
}
