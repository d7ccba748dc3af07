use base64::{engine::general_purpose::STANDARD, Engine as _};
use flate2::read::{GzDecoder, ZlibDecoder};
use minicbor::{data::Type, Decoder, Encoder};
use thiserror::Error;

use crate::{
    base45::Base45Error,
    cbor,
    util::{read_bounded, sha256},
};

/// Context string of a COSE_Sign1 `Sig_structure`.
pub const SIGNATURE1_CONTEXT: &str = "Signature1";
/// Protected header label carrying the key identifier.
pub const KID_LABEL: i64 = 4;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Upper bound on an inflated COSE message. A QR code holds a few
/// kilobytes of compressed data.
pub const MAX_INFLATED: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CborStructureError {
    #[error("unexpected CBOR structure: {0}")]
    UnexpectedShape(String),
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("malformed CBOR: {0}")]
    Malformed(String),
    #[error("CBOR nesting exceeds {} levels", cbor::MAX_DEPTH)]
    TooDeep,
    #[error("claim set carries more than one clinical statement")]
    MultipleStatements,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error(transparent)]
    Base45(#[from] Base45Error),
    #[error("decompression failed: {0}")]
    Decompression(String),
    #[error(transparent)]
    Structure(#[from] CborStructureError),
}

impl From<minicbor::decode::Error> for CborStructureError {
    fn from(value: minicbor::decode::Error) -> Self {
        CborStructureError::Malformed(value.to_string())
    }
}

/// Inflates a zlib stream. Gzip streams are recognised by their magic
/// bytes and inflated as well. Output beyond [`MAX_INFLATED`] bytes is an
/// error.
pub fn decompress(input: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let result = if input.starts_with(&GZIP_MAGIC) {
        read_bounded(GzDecoder::new(input), MAX_INFLATED)
    } else {
        read_bounded(ZlibDecoder::new(input), MAX_INFLATED)
    };
    result.map_err(DecodeError::Decompression)
}

/// A COSE_Sign1 message borrowed from its decompressed buffer.
/// ```text
/// Tag(18) [ protected: bstr, unprotected: any, payload: bstr, signature: bstr ]
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedMessage<'input> {
    pub tag: u64,
    /// Serialized protected header map, kept verbatim for the `Sig_structure`.
    pub protected: &'input [u8],
    /// Serialized claims map.
    pub payload: &'input [u8],
    /// Raw signature, `r‖s` for ECDSA.
    pub signature: &'input [u8],
}

fn byte_string<'input>(
    decoder: &mut Decoder<'input>,
    what: &str,
) -> Result<&'input [u8], CborStructureError> {
    match decoder.datatype()? {
        Type::Bytes => Ok(decoder.bytes()?),
        other => Err(CborStructureError::UnexpectedShape(format!(
            "{what} must be a byte string, found {other}"
        ))),
    }
}

impl<'input> SignedMessage<'input> {
    /// Splits a tagged four element COSE array into its parts.
    pub fn decode(input: &'input [u8]) -> Result<Self, CborStructureError> {
        let mut decoder = Decoder::new(input);

        let tag = match decoder.datatype()? {
            Type::Tag => cbor::tag_number(decoder.tag()?),
            other => {
                return Err(CborStructureError::UnexpectedShape(format!(
                    "expected a tagged COSE message, found {other}"
                )))
            }
        };

        let len = match decoder.datatype()? {
            Type::Array => decoder.array()?,
            other => {
                return Err(CborStructureError::UnexpectedShape(format!(
                    "expected a COSE array, found {other}"
                )))
            }
        };
        if len != Some(4) {
            return Err(CborStructureError::UnexpectedShape(format!(
                "COSE array must have exactly 4 elements, found {}",
                len.map_or_else(|| "indefinite length".into(), |l| l.to_string())
            )));
        }

        let protected = byte_string(&mut decoder, "protected header")?;
        decoder.skip()?;
        let payload = byte_string(&mut decoder, "payload")?;
        let signature = byte_string(&mut decoder, "signature")?;

        if decoder.position() != input.len() {
            log::debug!(
                "Ignoring {} trailing bytes after COSE message",
                input.len() - decoder.position()
            );
        }

        Ok(SignedMessage {
            tag,
            protected,
            payload,
            signature,
        })
    }

    /// Serializes `["Signature1", protected, h'', payload]`.
    pub fn sig_structure(&self) -> Result<Vec<u8>, CborStructureError> {
        let mut out = Vec::with_capacity(self.protected.len() + self.payload.len() + 16);
        let mut encoder = Encoder::new(&mut out);
        encoder
            .array(4)
            .and_then(|e| e.str(SIGNATURE1_CONTEXT))
            .and_then(|e| e.bytes(self.protected))
            .and_then(|e| e.bytes(&[]))
            .and_then(|e| e.bytes(self.payload))
            .map_err(|e| CborStructureError::Malformed(e.to_string()))?;
        Ok(out)
    }

    /// SHA-256 of the `Sig_structure`, the value both signature schemes verify.
    pub fn digest(&self) -> Result<[u8; 32], CborStructureError> {
        Ok(sha256(&self.sig_structure()?))
    }

    pub fn protected_header(&self) -> Result<ProtectedHeader, CborStructureError> {
        ProtectedHeader::decode(self.protected)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedHeader {
    pub kid: Option<Vec<u8>>,
}

impl ProtectedHeader {
    /// Decodes the serialized protected header map.
    /// An empty byte string stands for an empty map.
    pub fn decode(bytes: &[u8]) -> Result<Self, CborStructureError> {
        if bytes.is_empty() {
            return Ok(ProtectedHeader::default());
        }
        let header = cbor::Value::decode(bytes)?;
        let entries = header.as_map().ok_or_else(|| {
            CborStructureError::UnexpectedShape(format!(
                "protected header must be a map, found {}",
                header.type_name()
            ))
        })?;
        let kid = match entries.iter().find(|(key, _)| key.is_label(KID_LABEL)) {
            None => None,
            Some((_, cbor::Value::Bytes(kid))) => Some(kid.clone()),
            Some((_, other)) => {
                return Err(CborStructureError::UnexpectedShape(format!(
                    "kid must be a byte string, found {}",
                    other.type_name()
                )))
            }
        };
        Ok(ProtectedHeader { kid })
    }

    /// The key identifier as standard Base64 text, the form key registries use.
    #[must_use]
    pub fn kid_base64(&self) -> String {
        self.kid
            .as_deref()
            .map(|kid| STANDARD.encode(kid))
            .unwrap_or_default()
    }
}
