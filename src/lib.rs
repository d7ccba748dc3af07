#![doc = include_str!("../README.md")]
#![cfg(not(doctest))]

use thiserror::Error;

pub mod base45;
pub mod cbor;
mod decode;
pub mod registry;
pub mod revocation;
mod schema;
pub(crate) mod util;
pub mod value_sets;
#[cfg(feature = "validate")]
mod pipeline;
#[cfg(feature = "validate")]
mod validate;
#[cfg(test)]
mod testing;

pub use base45::Base45Error;
pub use decode::{
    decompress, CborStructureError, DecodeError, ProtectedHeader, SignedMessage, MAX_INFLATED,
};
pub use registry::{KeyMaterial, KeyRegistry, PublicKeyRecord};
pub use revocation::RevocationSet;
pub use schema::{map_payload, StatementPolicy};
pub use value_sets::{ValueSet, ValueSets};
#[cfg(feature = "validate")]
pub use pipeline::{Verification, Verifier, VerifierOptions, HC1_MARKER};
#[cfg(feature = "validate")]
pub use validate::{ecdsa_nist_p256, rsa_pss_sha256, PssRejection, ValidationResult, VerificationError};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Failure to load one of the data files backing a [`Verifier`](crate::Verifier).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading data file failed: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "json")]
    #[error("data file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("data file could not be inflated: {0}")]
    Decompression(String),
}

/// The three kinds of clinical statement an HCERT can carry.
/// Key registries restrict each key to a subset of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum StatementKind {
    Vaccination,
    Test,
    Recovery,
}

impl StatementKind {
    /// The claim key and key-usage letter: `v`, `t` or `r`.
    #[must_use]
    pub fn letter(&self) -> &'static str {
        match self {
            StatementKind::Vaccination => "v",
            StatementKind::Test => "t",
            StatementKind::Recovery => "r",
        }
    }

    /// Parses a key-usage letter, ignoring case.
    #[must_use]
    pub fn from_letter(letter: &str) -> Option<Self> {
        match letter.to_ascii_lowercase().as_str() {
            "v" => Some(StatementKind::Vaccination),
            "t" => Some(StatementKind::Test),
            "r" => Some(StatementKind::Recovery),
            _ => None,
        }
    }
}

/// A decoded health certificate.
///
/// Fields the payload does not carry keep their defaults; a record is
/// returned even when verification fails part way through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct CertificateRecord {
    /// The scanned text, marker included.
    pub raw_data: String,
    /// CBOR tag wrapping the COSE message, 18 for COSE_Sign1.
    pub tag: u64,
    /// Key identifier, standard Base64.
    pub kid: String,
    pub signature: Vec<u8>,
    /// Issuing country, resolved to its display name where known.
    pub issuer: String,
    /// Seconds since the Unix epoch.
    pub issued_at: u64,
    /// Seconds since the Unix epoch.
    pub expires_at: u64,
    /// Schema version of the claims, e.g. `1.3.0`.
    pub version: String,
    pub date_of_birth: String,
    pub person: Person,
    pub statement: Option<Statement>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Person {
    pub family_names: String,
    /// ICAO 9303 transliteration of the family names.
    pub family_names_icao: String,
    pub given_names: String,
    pub given_names_icao: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum Statement {
    Vaccination(Vaccination),
    Test(Test),
    Recovery(Recovery),
}

impl Statement {
    #[must_use]
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::Vaccination(_) => StatementKind::Vaccination,
            Statement::Test(_) => StatementKind::Test,
            Statement::Recovery(_) => StatementKind::Recovery,
        }
    }

    /// The unique certificate identifier (`ci`), the revocation key.
    #[must_use]
    pub fn certificate_identifier(&self) -> &str {
        match self {
            Statement::Vaccination(v) => &v.certificate_identifier,
            Statement::Test(t) => &t.certificate_identifier,
            Statement::Recovery(r) => &r.certificate_identifier,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Vaccination {
    pub agent_targeted: String,
    pub vaccine: String,
    pub medicinal_product: String,
    pub manufacturer: String,
    pub doses_received: u64,
    pub doses_total: u64,
    pub date: String,
    pub country: String,
    pub certificate_issuer: String,
    pub certificate_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Test {
    pub agent_targeted: String,
    pub test_type: String,
    /// NAA test name.
    pub test_name: String,
    /// RAT device identifier, resolved to its manufacturer.
    pub test_device: String,
    pub date_of_collection: String,
    pub result: String,
    pub facility: String,
    pub country: String,
    pub certificate_issuer: String,
    pub certificate_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub struct Recovery {
    pub agent_targeted: String,
    pub date_first_positive: String,
    pub country: String,
    pub certificate_issuer: String,
    pub valid_from: String,
    pub valid_until: String,
    pub certificate_identifier: String,
}
