//! Maps an HCERT claims payload onto a [`CertificateRecord`].
//!
//! ```text
//! {
//!   1: issuer, 4: expiration, 6: issued at,
//!   -260: { 1: { "ver", "dob", "nam": {..}, "v" | "t" | "r": [ {..} ] } }
//! }
//! ```
//! Each target type has a schema table pairing a claim key with the CBOR
//! type it expects and the field it fills. Absent keys and values of the
//! wrong type are skipped, so a sparse payload still yields a record.

use crate::{
    cbor::Value,
    decode::CborStructureError,
    util::{format_birth_date, format_day, format_instant},
    value_sets::{ValueSet, ValueSets},
    CertificateRecord, Person, Recovery, Statement, StatementKind, Test, Vaccination,
};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What to do with a claim set carrying more than one of `v`, `t`, `r`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize, Serialize))]
pub enum StatementPolicy {
    /// The statement appearing last in the payload is kept.
    #[default]
    LastWins,
    FirstWins,
    /// The payload is rejected with [`CborStructureError::MultipleStatements`].
    Reject,
}

enum Key {
    Label(i64),
    Name(&'static str),
}

impl Key {
    fn matches(&self, value: &Value) -> bool {
        match self {
            Key::Label(label) => value.is_label(*label),
            Key::Name(name) => value.is_name(name),
        }
    }
}

impl core::fmt::Display for Key {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Key::Label(label) => write!(f, "{label}"),
            Key::Name(name) => f.write_str(name),
        }
    }
}

enum DateStyle {
    Birth,
    Day,
    Instant,
}

enum Slot<T> {
    Text(fn(&mut T, String)),
    Coded(ValueSet, fn(&mut T, String)),
    Date(DateStyle, fn(&mut T, String)),
    Count(fn(&mut T, u64)),
}

struct Field<T> {
    key: Key,
    slot: Slot<T>,
}

const fn field<T>(key: Key, slot: Slot<T>) -> Field<T> {
    Field { key, slot }
}

use DateStyle::*;
use Key::*;
use Slot::*;

const RECORD: &[Field<CertificateRecord>] = &[
    field(Label(1), Coded(ValueSet::Country, |r, v| r.issuer = v)),
    field(Label(4), Count(|r, v| r.expires_at = v)),
    field(Label(6), Count(|r, v| r.issued_at = v)),
];

const CLAIMS: &[Field<CertificateRecord>] = &[
    field(Name("ver"), Text(|r, v| r.version = v)),
    field(Name("dob"), Date(Birth, |r, v| r.date_of_birth = v)),
];

const PERSON: &[Field<Person>] = &[
    field(Name("fn"), Text(|p, v| p.family_names = v)),
    field(Name("fnt"), Text(|p, v| p.family_names_icao = v)),
    field(Name("gn"), Text(|p, v| p.given_names = v)),
    field(Name("gnt"), Text(|p, v| p.given_names_icao = v)),
];

const VACCINATION: &[Field<Vaccination>] = &[
    field(Name("tg"), Coded(ValueSet::DiseaseAgentTargeted, |s, v| s.agent_targeted = v)),
    field(Name("vp"), Coded(ValueSet::VaccineProphylaxis, |s, v| s.vaccine = v)),
    field(Name("mp"), Coded(ValueSet::VaccineMedicinalProduct, |s, v| s.medicinal_product = v)),
    field(Name("ma"), Coded(ValueSet::VaccineManufacturer, |s, v| s.manufacturer = v)),
    field(Name("dn"), Count(|s, v| s.doses_received = v)),
    field(Name("sd"), Count(|s, v| s.doses_total = v)),
    field(Name("dt"), Date(Day, |s, v| s.date = v)),
    field(Name("co"), Coded(ValueSet::Country, |s, v| s.country = v)),
    field(Name("is"), Text(|s, v| s.certificate_issuer = v)),
    field(Name("ci"), Text(|s, v| s.certificate_identifier = v)),
];

const TEST: &[Field<Test>] = &[
    field(Name("tg"), Coded(ValueSet::DiseaseAgentTargeted, |s, v| s.agent_targeted = v)),
    field(Name("tt"), Coded(ValueSet::TestType, |s, v| s.test_type = v)),
    field(Name("nm"), Text(|s, v| s.test_name = v)),
    field(Name("ma"), Coded(ValueSet::TestManufacturer, |s, v| s.test_device = v)),
    field(Name("sc"), Date(Instant, |s, v| s.date_of_collection = v)),
    field(Name("tr"), Coded(ValueSet::TestResult, |s, v| s.result = v)),
    field(Name("tc"), Text(|s, v| s.facility = v)),
    field(Name("co"), Coded(ValueSet::Country, |s, v| s.country = v)),
    field(Name("is"), Text(|s, v| s.certificate_issuer = v)),
    field(Name("ci"), Text(|s, v| s.certificate_identifier = v)),
];

const RECOVERY: &[Field<Recovery>] = &[
    field(Name("tg"), Coded(ValueSet::DiseaseAgentTargeted, |s, v| s.agent_targeted = v)),
    field(Name("fr"), Date(Day, |s, v| s.date_first_positive = v)),
    field(Name("co"), Coded(ValueSet::Country, |s, v| s.country = v)),
    field(Name("is"), Text(|s, v| s.certificate_issuer = v)),
    field(Name("df"), Date(Day, |s, v| s.valid_from = v)),
    field(Name("du"), Date(Day, |s, v| s.valid_until = v)),
    field(Name("ci"), Text(|s, v| s.certificate_identifier = v)),
];

fn apply<T>(schema: &[Field<T>], entries: &[(Value, Value)], sets: &ValueSets, target: &mut T) {
    for field in schema {
        let Some((_, value)) = entries.iter().find(|(key, _)| field.key.matches(key)) else {
            continue;
        };
        match (&field.slot, value.as_text(), value.as_unsigned()) {
            (Text(set), Some(text), _) => set(target, text.to_string()),
            (Coded(table, set), Some(code), _) => set(target, sets.resolve(*table, code)),
            (Date(style, set), Some(text), _) => set(
                target,
                match style {
                    Birth => format_birth_date(text),
                    Day => format_day(text),
                    Instant => format_instant(text),
                },
            ),
            (Count(set), _, Some(count)) => set(target, count),
            _ => log::debug!(
                "Skipping claim {} of unexpected type {}",
                field.key,
                value.type_name()
            ),
        }
    }
}

/// First element of a statement array, as a map. Anything else maps to
/// an empty statement.
fn first_entry(value: &Value) -> &[(Value, Value)] {
    match value.as_array().and_then(|items| items.first()) {
        Some(item) => item.as_map().unwrap_or_else(|| {
            log::debug!("Statement entry is a {}, not a map", item.type_name());
            &[]
        }),
        None => {
            log::debug!("Statement is an empty or non-array {}", value.type_name());
            &[]
        }
    }
}

fn map_statement(kind: StatementKind, value: &Value, sets: &ValueSets) -> Statement {
    let entries = first_entry(value);
    match kind {
        StatementKind::Vaccination => {
            let mut statement = Vaccination::default();
            apply(VACCINATION, entries, sets, &mut statement);
            Statement::Vaccination(statement)
        }
        StatementKind::Test => {
            let mut statement = Test::default();
            apply(TEST, entries, sets, &mut statement);
            Statement::Test(statement)
        }
        StatementKind::Recovery => {
            let mut statement = Recovery::default();
            apply(RECOVERY, entries, sets, &mut statement);
            Statement::Recovery(statement)
        }
    }
}

fn map_claim_set(
    claims: &[(Value, Value)],
    sets: &ValueSets,
    record: &mut CertificateRecord,
    statements: &mut Vec<Statement>,
) {
    apply(CLAIMS, claims, sets, record);
    match claims.iter().find(|(key, _)| key.is_name("nam")) {
        Some((_, names)) => match names.as_map() {
            Some(names) => apply(PERSON, names, sets, &mut record.person),
            None => log::debug!("Skipping nam of unexpected type {}", names.type_name()),
        },
        None => log::debug!("Claim set carries no names"),
    }
    for (key, value) in claims {
        let kind = key.as_text().and_then(|name| match name {
            "v" | "t" | "r" => StatementKind::from_letter(name),
            _ => None,
        });
        if let Some(kind) = kind {
            statements.push(map_statement(kind, value, sets));
        }
    }
}

/// Fills `record` from a serialized claims payload.
///
/// Coded values are resolved through `sets`. When more than one clinical
/// statement is present, `policy` picks the one kept.
pub fn map_payload(
    payload: &[u8],
    sets: &ValueSets,
    policy: StatementPolicy,
    record: &mut CertificateRecord,
) -> Result<(), CborStructureError> {
    let root = Value::decode(payload)?;
    let entries = root.as_map().ok_or_else(|| {
        CborStructureError::UnexpectedShape(format!(
            "claims payload must be a map, found {}",
            root.type_name()
        ))
    })?;

    apply(RECORD, entries, sets, record);

    let mut statements = Vec::new();
    for (key, value) in entries {
        if [1, 4, 6].iter().any(|label| key.is_label(*label)) {
            continue;
        }
        let Some(container) = value.as_map() else {
            continue;
        };
        for (_, claims) in container {
            if let Some(claims) = claims.as_map() {
                map_claim_set(claims, sets, record, &mut statements);
            }
        }
    }

    if statements.len() > 1 {
        log::debug!(
            "Payload carries {} clinical statements, applying {:?}",
            statements.len(),
            policy
        );
    }
    record.statement = match policy {
        StatementPolicy::Reject if statements.len() > 1 => {
            return Err(CborStructureError::MultipleStatements)
        }
        StatementPolicy::FirstWins => statements.into_iter().next(),
        StatementPolicy::LastWins | StatementPolicy::Reject => statements.pop(),
    };
    Ok(())
}
