//! Fixture builders shared by the unit tests.

use std::{convert::Infallible, io::Write};

use flate2::{
    write::{GzEncoder, ZlibEncoder},
    Compression,
};
use minicbor::{data::Tag, encode::Error, Encoder};
#[cfg(feature = "validate")]
use num::BigUint;
use p256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};
#[cfg(feature = "validate")]
use sha2::{Digest, Sha256};

pub(crate) use crate::util::sha256;
use crate::{
    base45, KeyMaterial, KeyRegistry, PublicKeyRecord, SignedMessage, StatementKind, ValueSet,
    ValueSets,
};

pub(crate) type Build = Result<(), Error<Infallible>>;

pub(crate) const KID: [u8; 8] = [0x25, 0x3d, 0x5e, 0x2b, 0x52, 0x6e, 0x7e, 0x37];
pub(crate) const KID_BASE64: &str = "JT1eK1Jufjc=";
pub(crate) const CERTIFICATE_ID: &str = "URN:UVCI:01:IT:8F2C4A9B1E7D#3";
pub(crate) const ISSUED_AT: u64 = 1_620_000_000;
pub(crate) const EXPIRES_AT: u64 = 1_650_000_000;

pub(crate) fn cbor(build: impl FnOnce(&mut Encoder<Vec<u8>>) -> Build) -> Vec<u8> {
    let mut encoder = Encoder::new(Vec::new());
    build(&mut encoder).unwrap();
    encoder.into_writer()
}

/// `{-260: {1: <claims>}}`
pub(crate) fn payload_with(claims: impl FnOnce(&mut Encoder<Vec<u8>>) -> Build) -> Vec<u8> {
    cbor(|e| {
        e.map(1)?.i64(-260)?.map(1)?.u8(1)?;
        claims(e)
    })
}

/// A complete first-dose vaccination certificate issued by Italy.
pub(crate) fn vaccination_payload() -> Vec<u8> {
    vaccination_payload_for(CERTIFICATE_ID)
}

pub(crate) fn vaccination_payload_for(certificate_identifier: &str) -> Vec<u8> {
    cbor(|e| {
        e.map(4)?
            .u8(1)?.str("IT")?
            .u8(4)?.u64(EXPIRES_AT)?
            .u8(6)?.u64(ISSUED_AT)?
            .i64(-260)?.map(1)?.u8(1)?
            .map(4)?
            .str("v")?.array(1)?.map(10)?
            .str("tg")?.str("840539006")?
            .str("vp")?.str("1119349007")?
            .str("mp")?.str("EU/1/20/1528")?
            .str("ma")?.str("ORG-100030215")?
            .str("dn")?.u8(1)?
            .str("sd")?.u8(2)?
            .str("dt")?.str("2021-05-01")?
            .str("co")?.str("IT")?
            .str("is")?.str("Ministero della Salute")?
            .str("ci")?.str(certificate_identifier)?
            .str("nam")?.map(4)?
            .str("fn")?.str("Rossi")?
            .str("fnt")?.str("ROSSI")?
            .str("gn")?.str("Mario")?
            .str("gnt")?.str("MARIO")?
            .str("dob")?.str("1964-08-12")?
            .str("ver")?.str("1.3.0")?
            .ok()
    })
}

pub(crate) fn value_sets() -> ValueSets {
    let mut sets = ValueSets::new();
    sets.insert(ValueSet::Country, "IT", "Italy");
    sets.insert(ValueSet::DiseaseAgentTargeted, "840539006", "COVID-19");
    sets.insert(ValueSet::VaccineProphylaxis, "1119349007", "SARS-CoV-2 mRNA vaccine");
    sets.insert(ValueSet::VaccineMedicinalProduct, "EU/1/20/1528", "Comirnaty");
    sets.insert(ValueSet::VaccineManufacturer, "ORG-100030215", "Biontech Manufacturing GmbH");
    sets.insert(
        ValueSet::TestType,
        "LP6464-4",
        "Nucleic acid amplification with probe detection",
    );
    sets.insert(ValueSet::TestResult, "260415000", "Not detected");
    sets
}

/// `{1: -7, 4: kid}`, ES256 with a key identifier.
pub(crate) fn protected_header(kid: &[u8]) -> Vec<u8> {
    cbor(|e| e.map(2)?.u8(1)?.i64(-7)?.u8(4)?.bytes(kid)?.ok())
}

/// `18([protected, {}, payload, signature])`
pub(crate) fn cose_message(protected: &[u8], payload: &[u8], signature: &[u8]) -> Vec<u8> {
    cbor(|e| {
        e.tag(Tag::Unassigned(18))?
            .array(4)?
            .bytes(protected)?
            .map(0)?
            .bytes(payload)?
            .bytes(signature)?
            .ok()
    })
}

pub(crate) fn zlib(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub(crate) fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// What a QR scanner hands over for `cose`.
pub(crate) fn hc1(cose: &[u8]) -> String {
    format!("HC1:{}", base45::encode(&zlib(cose)))
}

pub(crate) fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x2a; 32]).unwrap()
}

pub(crate) fn public_coordinates() -> (Vec<u8>, Vec<u8>) {
    let point = signing_key().verifying_key().to_encoded_point(false);
    (point.x().unwrap().to_vec(), point.y().unwrap().to_vec())
}

pub(crate) fn sign_digest(digest: &[u8; 32]) -> Vec<u8> {
    let signature: Signature = signing_key().sign_prehash(digest).unwrap();
    signature.to_bytes().to_vec()
}

/// Signs `payload` under [`KID`] with [`signing_key`].
pub(crate) fn signed_cose(payload: &[u8]) -> Vec<u8> {
    signed_cose_with(payload, sign_digest)
}

/// Signs `payload` under [`KID`], `sign` turning the digest into a signature.
pub(crate) fn signed_cose_with(payload: &[u8], sign: fn(&[u8; 32]) -> Vec<u8>) -> Vec<u8> {
    let protected = protected_header(&KID);
    let unsigned = SignedMessage {
        tag: 18,
        protected: &protected,
        payload,
        signature: &[],
    };
    let signature = sign(&unsigned.digest().unwrap());
    cose_message(&protected, payload, &signature)
}

pub(crate) fn ec_key(country: &str) -> PublicKeyRecord {
    let (x, y) = public_coordinates();
    PublicKeyRecord {
        kid: KID_BASE64.into(),
        usage: vec![
            StatementKind::Vaccination,
            StatementKind::Test,
            StatementKind::Recovery,
        ],
        country: country.into(),
        key: KeyMaterial::Ec { x, y },
    }
}

pub(crate) fn ec_registry() -> KeyRegistry {
    let mut registry = KeyRegistry::new();
    registry.insert(ec_key("IT"));
    registry
}

// RSA-1024 test key, e = 65537
#[cfg(feature = "validate")]
pub(crate) const RSA_TEST_MODULUS: &str = "aaaaf98799bb8d8dae5104dae2613079f5c2da02bbc8102e79098a62c9e5452a3944aff759c3ff308be2f1b887ea6c2d6afb4c6dba412bd3862d0cba4446075de97a7e79725793299917adc092a78fad490396f67c762d24aba8693642887cf0fea62296faae685aa2225cd2557a96e2f7d6438343f1737c758b29137099165b";
#[cfg(feature = "validate")]
const RSA_TEST_PRIVATE_EXPONENT: &str = "6c65c5b12ba26508dcf3968ad387f93b2d2e023c043ad09443ca1c7c1c51a3796b0046676b3b4264fa243d74ffd693b8d11f256ef80296ac75a73d533d33e14ee9a185046ea112dce10fd1394238770c34ea8170e0ee4d7bb5fec2fa02537df947af6ce57f508e5af50b6ed93de7826ee7c4508d8bbced048af2570349ef35e1";

/// EMSA-PSS-ENCODE with a fixed salt.
#[cfg(feature = "validate")]
pub(crate) fn pss_encode(m_hash: &[u8; 32], salt: &[u8; 32], em_bits: u64) -> Vec<u8> {
    use crate::validate::{mgf1_sha256, H_LEN, PSS_TRAILER};

    let em_len = usize::try_from(em_bits.div_ceil(8)).unwrap();
    let mut hasher = Sha256::new();
    hasher.update([0u8; 8]);
    hasher.update(m_hash);
    hasher.update(salt);
    let h = hasher.finalize().to_vec();

    let mut db = vec![0u8; em_len - 2 * H_LEN - 2];
    db.push(0x01);
    db.extend_from_slice(salt);
    for (byte, mask) in db.iter_mut().zip(mgf1_sha256(&h, em_len - H_LEN - 1)) {
        *byte ^= mask;
    }
    db[0] &= 0xffu8 >> (8 * em_len as u64 - em_bits);

    [db, h, vec![PSS_TRAILER]].concat()
}

/// RSASSA-PSS signature over `digest` with the RSA-1024 test key.
#[cfg(feature = "validate")]
pub(crate) fn rsa_sign_digest(digest: &[u8; 32]) -> Vec<u8> {
    let n = BigUint::from_bytes_be(&hex::decode(RSA_TEST_MODULUS).unwrap());
    let d = BigUint::from_bytes_be(&hex::decode(RSA_TEST_PRIVATE_EXPONENT).unwrap());
    let em = pss_encode(digest, &[0x5a; 32], n.bits() - 1);
    let s = BigUint::from_bytes_be(&em).modpow(&d, &n).to_bytes_be();
    let mut signature = vec![0u8; 128 - s.len()];
    signature.extend_from_slice(&s);
    signature
}

#[cfg(feature = "validate")]
pub(crate) fn rsa_key(country: &str) -> PublicKeyRecord {
    PublicKeyRecord {
        key: KeyMaterial::Rsa {
            e: vec![0x01, 0x00, 0x01],
            n: hex::decode(RSA_TEST_MODULUS).unwrap(),
        },
        ..ec_key(country)
    }
}

#[cfg(test)]
mod tests {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    use super::*;

    #[test]
    fn kid_fixture_matches_its_base64() {
        assert_eq!(STANDARD.encode(KID), KID_BASE64);
    }

    #[cfg(feature = "validate")]
    #[test]
    fn rsa_fixture_signs_verifiably() {
        let digest = sha256(b"Sig_structure");
        let signature = rsa_sign_digest(&digest);
        assert_eq!(signature.len(), 128);
        let n = hex::decode(RSA_TEST_MODULUS).unwrap();
        assert!(crate::rsa_pss_sha256(&digest, &[0x01, 0x00, 0x01], &n, &signature));
    }
}
