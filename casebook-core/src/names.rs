//! Student name reconciliation
//!
//! Student rows have been written by several generations of the product, each
//! with its own naming columns. Reconciliation is a pure function over the
//! known input shapes; the order in which source fields are consulted is the
//! explicit [`NAME_PRECEDENCE`] list.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One way a name may be stored on a student row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameRule {
    /// A single column holding the full name.
    Single(&'static str),
    /// Given-name column followed by one or more surname columns.
    Composite(&'static [&'static str]),
}

/// Source fields consulted in order; the first rule yielding a non-empty
/// name wins.
pub const NAME_PRECEDENCE: &[NameRule] = &[
    NameRule::Single("nombre_completo"),
    NameRule::Single("full_name"),
    NameRule::Single("name"),
    NameRule::Composite(&["nombres", "apellidos"]),
    NameRule::Composite(&["first_name", "last_name"]),
    NameRule::Composite(&["nombre", "apellido_paterno", "apellido_materno"]),
];

/// Known input shapes for a student name.
#[derive(Debug, Clone, Copy)]
pub enum NameSource<'a> {
    /// The relation was flattened to a bare string.
    Text(&'a str),
    /// An object with some subset of the legacy name columns.
    Fields(&'a Map<String, Value>),
}

impl<'a> NameSource<'a> {
    /// Classify a JSON value; anything other than a string or object has no name.
    pub fn from_value(value: &'a Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(NameSource::Text(s)),
            Value::Object(map) => Some(NameSource::Fields(map)),
            _ => None,
        }
    }
}

/// Canonical student name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentName {
    /// Display name, whitespace collapsed
    pub full_name: String,
    /// Given names when the source kept them separately
    pub given_names: Option<String>,
    /// Surnames when the source kept them separately
    pub surnames: Option<String>,
}

impl StudentName {
    fn whole(full_name: String) -> Self {
        Self {
            full_name,
            given_names: None,
            surnames: None,
        }
    }
}

/// Reconcile a name source into one canonical name.
///
/// Returns `None` when no rule yields a non-empty name.
pub fn canonical_name(source: NameSource<'_>) -> Option<StudentName> {
    match source {
        NameSource::Text(text) => non_empty(text).map(StudentName::whole),
        NameSource::Fields(fields) => NAME_PRECEDENCE
            .iter()
            .find_map(|rule| apply_rule(*rule, fields)),
    }
}

fn apply_rule(rule: NameRule, fields: &Map<String, Value>) -> Option<StudentName> {
    match rule {
        NameRule::Single(key) => field_text(fields, key).map(StudentName::whole),
        NameRule::Composite(keys) => {
            let (given_key, surname_keys) = keys.split_first()?;
            let given = field_text(fields, given_key);
            let surnames: Vec<String> = surname_keys
                .iter()
                .filter_map(|key| field_text(fields, key))
                .collect();
            let surnames = (!surnames.is_empty()).then(|| surnames.join(" "));

            let full_name = match (&given, &surnames) {
                (Some(g), Some(s)) => format!("{} {}", g, s),
                (Some(g), None) => g.clone(),
                (None, Some(s)) => s.clone(),
                (None, None) => return None,
            };

            Some(StudentName {
                full_name,
                given_names: given,
                surnames,
            })
        }
    }
}

fn field_text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields.get(key).and_then(Value::as_str).and_then(non_empty)
}

fn non_empty(text: &str) -> Option<String> {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name_of(value: Value) -> Option<String> {
        NameSource::from_value(&value)
            .and_then(canonical_name)
            .map(|n| n.full_name)
    }

    #[test]
    fn test_plain_string_is_collapsed() {
        assert_eq!(name_of(json!("  Ana   María ")), Some("Ana María".to_string()));
        assert_eq!(name_of(json!("   ")), None);
    }

    #[test]
    fn test_full_name_column_wins_over_composites() {
        let row = json!({
            "nombre_completo": "Ana Pérez",
            "nombres": "Otro",
            "apellidos": "Nombre",
        });
        assert_eq!(name_of(row), Some("Ana Pérez".to_string()));
    }

    #[test]
    fn test_empty_single_column_falls_through() {
        let row = json!({
            "full_name": "",
            "first_name": "John",
            "last_name": "Doe",
        });
        assert_eq!(name_of(row), Some("John Doe".to_string()));
    }

    #[test]
    fn test_three_part_legacy_name() {
        let row = json!({
            "nombre": "Luis",
            "apellido_paterno": "Soto",
            "apellido_materno": "Rojas",
        });
        let source = NameSource::from_value(&row).unwrap();
        let name = canonical_name(source).unwrap();
        assert_eq!(name.full_name, "Luis Soto Rojas");
        assert_eq!(name.given_names.as_deref(), Some("Luis"));
        assert_eq!(name.surnames.as_deref(), Some("Soto Rojas"));
    }

    #[test]
    fn test_surname_only_composite() {
        let row = json!({ "apellidos": "Muñoz" });
        assert_eq!(name_of(row), Some("Muñoz".to_string()));
    }

    #[test]
    fn test_unrecognised_shapes() {
        assert_eq!(name_of(json!(42)), None);
        assert_eq!(name_of(json!({ "alias": "x" })), None);
        assert_eq!(name_of(Value::Null), None);
    }
}
