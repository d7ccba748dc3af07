//! Revoked certificates, identified by the SHA-256 of issuing country and
//! unique certificate identifier.

use std::collections::HashSet;

use crate::util::sha256;
#[cfg(feature = "json")]
use crate::{util::gunzip_if_compressed, LoadError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RevocationSet {
    hashes: HashSet<String>,
}

impl RevocationSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowercase hex SHA-256 of `country` followed by `certificate_identifier`.
    #[must_use]
    pub fn identity_hash(country: &str, certificate_identifier: &str) -> String {
        hex::encode(sha256(
            format!("{country}{certificate_identifier}").as_bytes(),
        ))
    }

    pub fn insert(&mut self, hash: impl AsRef<str>) {
        self.hashes.insert(hash.as_ref().to_ascii_lowercase());
    }

    #[must_use]
    pub fn contains(&self, hash: &str) -> bool {
        self.hashes.contains(&hash.to_ascii_lowercase())
    }

    /// The identity hash of the certificate if it is revoked.
    #[must_use]
    pub fn revoked(&self, country: &str, certificate_identifier: &str) -> Option<String> {
        let hash = Self::identity_hash(country, certificate_identifier);
        self.contains(&hash).then_some(hash)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for RevocationSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = RevocationSet::new();
        for hash in iter {
            set.insert(hash);
        }
        set
    }
}

#[cfg(feature = "json")]
impl RevocationSet {
    /// Parses a JSON array of hex hashes.
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        Self::from_json_bytes(json.as_bytes())
    }

    /// Like [`RevocationSet::from_json`], accepting gzip-compressed input too.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, LoadError> {
        let json = gunzip_if_compressed(bytes)?;
        let hashes: Vec<String> = serde_json::from_slice(&json)?;
        let set: RevocationSet = hashes.into_iter().collect();
        log::trace!("Loaded {} revoked certificate hashes", set.len());
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_country_and_identifier() {
        assert_eq!(
            RevocationSet::identity_hash("IT", "01IT0001"),
            hex::encode(sha256(b"IT01IT0001"))
        );
        assert_eq!(
            RevocationSet::identity_hash("", ""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn reports_revoked_certificates() {
        let hash = RevocationSet::identity_hash("IT", "URN:UVCI:01:IT:REVOKED");
        let set: RevocationSet = [hash.to_ascii_uppercase()].into_iter().collect();
        assert_eq!(set.revoked("IT", "URN:UVCI:01:IT:REVOKED"), Some(hash.clone()));
        assert!(set.contains(&hash));
        assert_eq!(set.revoked("FR", "URN:UVCI:01:IT:REVOKED"), None);
        assert_eq!(set.revoked("IT", "URN:UVCI:01:IT:OTHER"), None);
    }

    #[cfg(feature = "json")]
    #[test]
    fn parses_revocation_list() {
        let hash = RevocationSet::identity_hash("FR", "abc");
        let json = format!(r#"["{hash}", "00ff"]"#);
        let set = RevocationSet::from_json(&json).unwrap();
        assert_eq!(set.len(), 2);
        assert!(set.revoked("FR", "abc").is_some());

        let gzipped = RevocationSet::from_json_bytes(&crate::testing::gzip(json.as_bytes())).unwrap();
        assert_eq!(gzipped, set);

        assert!(RevocationSet::from_json("[]").unwrap().is_empty());
        assert!(matches!(
            RevocationSet::from_json("[1, 2]"),
            Err(LoadError::Json(_))
        ));
    }
}
