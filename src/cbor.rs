use minicbor::{data::Type, Decoder};

use crate::decode::CborStructureError;

/// Nesting limit for decoded claim trees. HCERT payloads are four levels deep.
pub const MAX_DEPTH: usize = 16;

/// A decoded CBOR data item.
/// Map entries keep their wire order, which decides which clinical
/// statement is seen last when a claim set carries more than one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unsigned(u64),
    Negative(i64),
    Bytes(Vec<u8>),
    Text(String),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Bool(bool),
    Null,
    Tagged(u64, Box<Value>),
    /// Floats, simple values and `undefined`. Skipped, never inspected.
    Other,
}

impl Value {
    /// Decodes exactly one CBOR item from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CborStructureError> {
        let mut decoder = Decoder::new(bytes);
        let value = decode_item(&mut decoder, 0)?;
        if decoder.position() != bytes.len() {
            log::debug!(
                "Ignoring {} trailing bytes after CBOR item",
                bytes.len() - decoder.position()
            );
        }
        Ok(value)
    }

    /// Looks through any tags wrapping the item.
    #[must_use]
    pub fn untagged(&self) -> &Value {
        match self {
            Value::Tagged(_, inner) => inner.untagged(),
            other => other,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self.untagged() {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_unsigned(&self) -> Option<u64> {
        match self.untagged() {
            Value::Unsigned(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self.untagged() {
            Value::Map(entries) => Some(entries),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self.untagged() {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Whether this item is the integer map label `label`.
    #[must_use]
    pub fn is_label(&self, label: i64) -> bool {
        match self {
            Value::Unsigned(n) => i64::try_from(*n).map_or(false, |n| n == label),
            Value::Negative(n) => *n == label,
            _ => false,
        }
    }

    /// Whether this item is the text map key `name`.
    #[must_use]
    pub fn is_name(&self, name: &str) -> bool {
        matches!(self, Value::Text(s) if s == name)
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unsigned(_) => "unsigned integer",
            Value::Negative(_) => "negative integer",
            Value::Bytes(_) => "byte string",
            Value::Text(_) => "text string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::Tagged(_, inner) => inner.type_name(),
            Value::Other => "unsupported item",
        }
    }
}

fn definite(len: Option<u64>, what: &str) -> Result<u64, CborStructureError> {
    len.ok_or_else(|| {
        CborStructureError::UnexpectedShape(format!("indefinite-length {what}s are not supported"))
    })
}

fn decode_item(decoder: &mut Decoder<'_>, depth: usize) -> Result<Value, CborStructureError> {
    if depth > MAX_DEPTH {
        return Err(CborStructureError::TooDeep);
    }
    match decoder.datatype()? {
        Type::U8 | Type::U16 | Type::U32 | Type::U64 => {
            decoder.u64().map(Value::Unsigned).map_err(CborStructureError::from)
        }
        Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::Int => {
            decoder.i64().map(Value::Negative).map_err(CborStructureError::from)
        }
        Type::Bytes => decoder
            .bytes()
            .map(|b| Value::Bytes(b.to_vec()))
            .map_err(CborStructureError::from),
        Type::String => decoder
            .str()
            .map(|s| Value::Text(s.to_string()))
            .map_err(CborStructureError::from),
        Type::Bool => decoder.bool().map(Value::Bool).map_err(CborStructureError::from),
        Type::Null => decoder.null().map(|()| Value::Null).map_err(CborStructureError::from),
        Type::Array => {
            let len = definite(decoder.array()?, "array")?;
            let mut items = Vec::new();
            for _ in 0..len {
                items.push(decode_item(decoder, depth + 1)?);
            }
            Ok(Value::Array(items))
        }
        Type::Map => {
            let len = definite(decoder.map()?, "map")?;
            let mut entries = Vec::new();
            for _ in 0..len {
                let key = decode_item(decoder, depth + 1)?;
                let value = decode_item(decoder, depth + 1)?;
                entries.push((key, value));
            }
            Ok(Value::Map(entries))
        }
        Type::Tag => {
            let tag = tag_number(decoder.tag()?);
            let inner = decode_item(decoder, depth + 1)?;
            Ok(Value::Tagged(tag, Box::new(inner)))
        }
        Type::F16 | Type::F32 | Type::F64 | Type::Simple | Type::Undefined => {
            decoder.skip()?;
            Ok(Value::Other)
        }
        other => Err(CborStructureError::UnexpectedShape(format!(
            "unsupported CBOR item: {other}"
        ))),
    }
}

/// Numeric value of a CBOR tag.
pub(crate) fn tag_number(tag: minicbor::data::Tag) -> u64 {
    use minicbor::data::Tag;
    match tag {
        Tag::DateTime => 0,
        Tag::Timestamp => 1,
        Tag::PosBignum => 2,
        Tag::NegBignum => 3,
        Tag::Decimal => 4,
        Tag::Bigfloat => 5,
        Tag::ToBase64Url => 21,
        Tag::ToBase64 => 22,
        Tag::ToBase16 => 23,
        Tag::Cbor => 24,
        Tag::Uri => 32,
        Tag::Base64Url => 33,
        Tag::Base64 => 34,
        Tag::Regex => 35,
        Tag::Mime => 36,
        Tag::Unassigned(n) => n,
    }
}
