use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    base45,
    decode::{decompress, CborStructureError, DecodeError, SignedMessage},
    registry::{KeyRegistry, PublicKeyRecord},
    revocation::RevocationSet,
    schema::{map_payload, StatementPolicy},
    validate::{ValidationResult, VerificationError},
    value_sets::ValueSets,
    CertificateRecord, Statement,
};

/// Marker in front of the Base45 text of an EU Digital COVID Certificate.
pub const HC1_MARKER: &str = "HC1:";
const MARKER_LEN: usize = 4;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VerifierOptions {
    /// Marker the scanned text must start with. When unset, the first
    /// four characters are skipped whatever they are.
    pub expected_prefix: Option<String>,
    pub statement_policy: StatementPolicy,
}

impl VerifierOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_expected_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.expected_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn with_statement_policy(mut self, policy: StatementPolicy) -> Self {
        self.statement_policy = policy;
        self
    }
}

/// Outcome of verifying one scanned certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Everything decoded before verification finished, complete on success.
    pub record: CertificateRecord,
    pub result: ValidationResult,
}

impl Verification {
    #[must_use]
    pub fn signature_validity(&self) -> bool {
        self.result.is_success()
    }
}

/// Decodes and verifies scanned certificates against shared snapshots of
/// the issuer keys, the revocation list and the code tables.
///
/// Cloning is cheap. A refreshed key registry is published by building a
/// new [`KeyRegistry`] and swapping it in with [`Verifier::with_registry`].
/// ### Usage
/// ```rust,ignore
/// let verifier = Verifier::new(registry, revocations, value_sets);
/// let verification = verifier.verify("HC1:NCFOXN%TS3DH...");
/// if verification.signature_validity() {
///     println!("{:?}", verification.record.statement);
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Verifier {
    registry: Arc<KeyRegistry>,
    revocations: Arc<RevocationSet>,
    value_sets: Arc<ValueSets>,
    options: VerifierOptions,
}

impl Verifier {
    #[must_use]
    pub fn new(
        registry: Arc<KeyRegistry>,
        revocations: Arc<RevocationSet>,
        value_sets: Arc<ValueSets>,
    ) -> Self {
        Verifier {
            registry,
            revocations,
            value_sets,
            options: VerifierOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: VerifierOptions) -> Self {
        self.options = options;
        self
    }

    /// A verifier using `registry`, sharing everything else with `self`.
    #[must_use]
    pub fn with_registry(&self, registry: Arc<KeyRegistry>) -> Self {
        Verifier {
            registry,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<KeyRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn options(&self) -> &VerifierOptions {
        &self.options
    }

    /// Decodes `scanned` and checks its signature and revocation status.
    ///
    /// Never fails: every problem is reported through
    /// [`Verification::result`], next to whatever part of the record could
    /// be decoded.
    pub fn verify(&self, scanned: &str) -> Verification {
        let mut record = CertificateRecord {
            raw_data: scanned.to_string(),
            ..Default::default()
        };
        let result = match self.run(scanned, &mut record) {
            Ok(()) => ValidationResult::Success,
            Err(reason) => {
                log::debug!("Certificate rejected: {reason}");
                ValidationResult::Failure { reason }
            }
        };
        Verification { record, result }
    }

    fn run(&self, scanned: &str, record: &mut CertificateRecord) -> Result<(), VerificationError> {
        let text = self.strip_marker(scanned)?;
        let compressed = base45::decode(text).map_err(DecodeError::from)?;
        log::trace!("Base45 decoded {} bytes", compressed.len());
        let cose = decompress(&compressed)?;
        log::trace!("Inflated to {} bytes", cose.len());

        let message = SignedMessage::decode(&cose)?;
        record.tag = message.tag;
        record.signature = message.signature.to_vec();
        match message.protected_header() {
            Ok(header) => record.kid = header.kid_base64(),
            Err(e) => log::debug!("Protected header unreadable, continuing without kid: {e}"),
        }
        let digest = message.digest()?;
        log::trace!("Sig_structure digest {}", hex::encode(digest));

        map_payload(
            message.payload,
            &self.value_sets,
            self.options.statement_policy,
            record,
        )?;
        let statement = record
            .statement
            .as_ref()
            .ok_or(CborStructureError::MissingField("v/t/r"))?;

        self.check_signature(&record.kid, statement, &digest, message.signature)
    }

    fn strip_marker<'s>(&self, scanned: &'s str) -> Result<&'s str, VerificationError> {
        match &self.options.expected_prefix {
            Some(prefix) => scanned
                .strip_prefix(prefix.as_str())
                .ok_or_else(|| VerificationError::Prefix {
                    expected: prefix.clone(),
                }),
            None => match scanned.char_indices().nth(MARKER_LEN) {
                Some((start, _)) => Ok(&scanned[start..]),
                None if scanned.chars().count() == MARKER_LEN => Ok(""),
                None => Err(VerificationError::Prefix {
                    expected: HC1_MARKER.into(),
                }),
            },
        }
    }

    /// Every candidate is checked against the revocation list before any
    /// signature is verified; a revoked identity fails even if another
    /// candidate key would verify.
    fn check_signature(
        &self,
        kid: &str,
        statement: &Statement,
        digest: &[u8; 32],
        signature: &[u8],
    ) -> Result<(), VerificationError> {
        let candidates: Vec<&PublicKeyRecord> =
            self.registry.candidates(kid, statement.kind()).collect();
        if candidates.is_empty() {
            return Err(VerificationError::KeyNotFound { kid: kid.into() });
        }
        log::trace!("{} candidate keys for kid {kid}", candidates.len());

        for candidate in &candidates {
            if let Some(hash) = self
                .revocations
                .revoked(&candidate.country, statement.certificate_identifier())
            {
                return Err(VerificationError::Revoked { hash });
            }
        }

        let mut unsupported = Vec::new();
        for candidate in &candidates {
            match candidate.key.verify(digest, signature) {
                Ok(true) => {
                    log::trace!("Signature verified with key of {:?}", candidate.country);
                    return Ok(());
                }
                Ok(false) => (),
                Err(VerificationError::UnsupportedAlgorithm(algo)) => {
                    log::warn!("Skipping key {kid} with unsupported algorithm {algo}");
                    unsupported.push(algo);
                }
                Err(e) => return Err(e),
            }
        }

        if unsupported.len() == candidates.len() {
            Err(VerificationError::UnsupportedAlgorithm(unsupported.join(", ")))
        } else {
            Err(VerificationError::SignatureInvalid)
        }
    }
}
