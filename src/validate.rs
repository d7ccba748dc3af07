use ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};
use num::{BigUint, Zero};
use p256::{EncodedPoint as P256EncodedPoint, NistP256};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::{decode::CborStructureError, registry::KeyMaterial, DecodeError};

/// SHA-256 output length, also the PSS salt length of HCERT signatures.
pub(crate) const H_LEN: usize = 32;
const S_LEN: usize = H_LEN;
pub(crate) const PSS_TRAILER: u8 = 0xbc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    Success,
    Failure { reason: VerificationError },
}

impl ValidationResult {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ValidationResult::Success)
    }
}

/// Why a scanned certificate is not valid.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("payload does not start with {expected:?}")]
    Prefix { expected: String },
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("no candidate key uses a supported algorithm ({0})")]
    UnsupportedAlgorithm(String),
    #[error("signature does not verify against any candidate key")]
    SignatureInvalid,
    #[error("no public key registered for kid {kid:?}")]
    KeyNotFound { kid: String },
    #[error("certificate is revoked (identity hash {hash})")]
    Revoked { hash: String },
}

impl From<CborStructureError> for VerificationError {
    fn from(value: CborStructureError) -> Self {
        VerificationError::Decode(value.into())
    }
}

/// Steps of RSASSA-PSS verification (RFC 8017 §8.1.2, §9.1.2) that can
/// reject a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PssRejection {
    #[error("modulus is zero")]
    ZeroModulus,
    #[error("signature representative is not smaller than the modulus")]
    SignatureOutOfRange,
    #[error("message representative does not fit the encoded message length")]
    MessageTooLong,
    #[error("encoded message is too short for a SHA-256 hash and salt")]
    EncodingTooShort,
    #[error("trailer byte is not 0xbc")]
    BadTrailer,
    #[error("leftmost bits of the masked data block are set")]
    NonZeroLeftmostBits,
    #[error("padding is not a zero string followed by 0x01")]
    BadPadding,
    #[error("recomputed hash does not match")]
    HashMismatch,
}

impl KeyMaterial {
    /// Checks `signature` over the SHA-256 `digest` of a `Sig_structure`.
    pub fn verify(&self, digest: &[u8; 32], signature: &[u8]) -> Result<bool, VerificationError> {
        match self {
            KeyMaterial::Ec { x, y } => Ok(ecdsa_nist_p256(digest, x, y, signature)),
            KeyMaterial::Rsa { e, n } => Ok(rsa_pss_sha256(digest, e, n, signature)),
            KeyMaterial::Unsupported(algo) => {
                Err(VerificationError::UnsupportedAlgorithm(algo.clone()))
            }
        }
    }
}

/// Verifies a raw `r‖s` ECDSA signature over a precomputed SHA-256 digest.
/// `x` and `y` are the big-endian affine coordinates of the public key.
pub fn ecdsa_nist_p256(digest: &[u8; 32], x: &[u8], y: &[u8], signature: &[u8]) -> bool {
    let mut sec1 = Vec::with_capacity(65);
    sec1.push(0x04);
    sec1.extend_from_slice(x);
    sec1.extend_from_slice(y);
    if sec1.len() != 65 {
        log::debug!("P-256 key has {} coordinate bytes, expected 64", sec1.len() - 1);
        return false;
    }

    let verifying_key = match P256EncodedPoint::from_bytes(&sec1)
        .map_err(|e| format!("{e:?}"))
        .and_then(|point| {
            VerifyingKey::<NistP256>::from_encoded_point(&point).map_err(|e| format!("{e:?}"))
        }) {
        Ok(key) => key,
        Err(e) => {
            log::debug!("P-256 key is not a curve point: {e}");
            return false;
        }
    };

    let signature = match ecdsa::Signature::<NistP256>::from_slice(signature) {
        Ok(signature) => signature,
        Err(e) => {
            log::debug!("Malformed P-256 signature: {e:?}");
            return false;
        }
    };

    verifying_key.verify_prehash(digest, &signature).is_ok()
}

/// Verifies an RSASSA-PSS signature with SHA-256, MGF1-SHA-256 and a
/// 32 byte salt over a precomputed digest. `e` and `n` are big-endian.
pub fn rsa_pss_sha256(digest: &[u8; 32], e: &[u8], n: &[u8], signature: &[u8]) -> bool {
    match rsassa_pss_verify(digest, e, n, signature) {
        Ok(()) => true,
        Err(rejection) => {
            log::debug!("RSA-PSS signature rejected: {rejection}");
            false
        }
    }
}

fn rsassa_pss_verify(
    digest: &[u8; 32],
    e: &[u8],
    n: &[u8],
    signature: &[u8],
) -> Result<(), PssRejection> {
    let n = BigUint::from_bytes_be(n);
    let e = BigUint::from_bytes_be(e);
    let s = BigUint::from_bytes_be(signature);
    if n.is_zero() {
        return Err(PssRejection::ZeroModulus);
    }
    if s >= n {
        return Err(PssRejection::SignatureOutOfRange);
    }

    let m = s.modpow(&e, &n);
    let em_bits = n.bits() - 1;
    let em_len = usize::try_from(em_bits.div_ceil(8)).map_err(|_| PssRejection::MessageTooLong)?;
    let em = i2osp(&m, em_len)?;
    emsa_pss_verify(digest, &em, em_bits)
}

/// Big-endian encoding of `value` left-padded to exactly `len` bytes.
fn i2osp(value: &BigUint, len: usize) -> Result<Vec<u8>, PssRejection> {
    let bytes = if value.is_zero() {
        Vec::new()
    } else {
        value.to_bytes_be()
    };
    if bytes.len() > len {
        return Err(PssRejection::MessageTooLong);
    }
    let mut padded = vec![0u8; len - bytes.len()];
    padded.extend_from_slice(&bytes);
    Ok(padded)
}

pub(crate) fn mgf1_sha256(seed: &[u8], len: usize) -> Vec<u8> {
    let mut mask = Vec::with_capacity(len + H_LEN);
    let mut counter: u32 = 0;
    while mask.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        mask.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    mask.truncate(len);
    mask
}

/// EMSA-PSS-VERIFY for SHA-256 with a salt as long as the hash.
/// ```text
/// EM = maskedDB ‖ H ‖ 0xbc,  DB = PS ‖ 0x01 ‖ salt
/// ```
fn emsa_pss_verify(
    m_hash: &[u8; 32],
    em: &[u8],
    em_bits: u64,
) -> Result<(), PssRejection> {
    let em_len = em.len();
    if em_len < H_LEN + S_LEN + 2 {
        return Err(PssRejection::EncodingTooShort);
    }

    let (masked_db, rest) = em.split_at(em_len - H_LEN - 1);
    let (h, trailer) = rest.split_at(H_LEN);
    if trailer != [PSS_TRAILER] {
        return Err(PssRejection::BadTrailer);
    }

    // em_len == ceil(em_bits / 8), so fewer than 8 bits are unused
    let unused_bits = (8 * em_len as u64).saturating_sub(em_bits).min(7);
    let mask = 0xffu8 >> unused_bits;
    if masked_db[0] & !mask != 0 {
        return Err(PssRejection::NonZeroLeftmostBits);
    }

    let mut db: Vec<u8> = masked_db
        .iter()
        .zip(mgf1_sha256(h, masked_db.len()))
        .map(|(masked, mask)| masked ^ mask)
        .collect();
    db[0] &= mask;

    let ps_len = em_len - H_LEN - S_LEN - 2;
    if db[..ps_len].iter().any(|&b| b != 0) || db[ps_len] != 0x01 {
        return Err(PssRejection::BadPadding);
    }
    let salt = &db[db.len() - S_LEN..];

    let mut hasher = Sha256::new();
    hasher.update([0u8; 8]);
    hasher.update(m_hash);
    hasher.update(salt);
    if hasher.finalize().as_slice() != h {
        return Err(PssRejection::HashMismatch);
    }
    Ok(())
}
