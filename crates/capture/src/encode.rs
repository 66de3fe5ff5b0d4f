//! Host record to JSON conversion.
//!
//! Personal fields are dropped at every depth, text is coerced to UTF-8 and
//! each record is rendered at most once per [`Encoder`]: a record reached a
//! second time (a cycle, or a shared child) becomes the missing-value
//! sentinel instead of being walked again.

use bizevent_core::host::{Field, RecordRef};
use bizevent_core::MISSING_VALUE;
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::sync::Arc;

/// Attribute names never allowed into an event.
pub const PERSONAL_FIELDS: [&str; 17] = [
    "email",
    "prefix",
    "firstname",
    "middlename",
    "lastname",
    "suffix",
    "taxvat",
    "password_hash",
    "customer_tax_class_id",
    "customer_email",
    "customer_prefix",
    "customer_firstname",
    "customer_middlename",
    "customer_lastname",
    "customer_suffix",
    "customer_note",
    "customer_taxvat",
];

pub fn is_personal_field(name: &str) -> bool {
    PERSONAL_FIELDS.contains(&name)
}

/// Decode host text. Anything that is not valid UTF-8 is taken as Latin-1,
/// which maps every byte to a code point and so never fails.
pub fn coerce_text(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

#[derive(Debug, Default)]
pub struct Encoder {
    visited: HashSet<usize>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render a record as a JSON object without its personal fields.
    pub fn encode_record(&mut self, record: &RecordRef) -> Value {
        let key = Arc::as_ptr(record) as usize;
        if !self.visited.insert(key) {
            return Value::String(MISSING_VALUE.to_string());
        }

        let mut object = Map::new();
        for (name, field) in record.fields() {
            if is_personal_field(&name) {
                continue;
            }
            let value = self.encode_field(&field);
            object.insert(name, value);
        }
        Value::Object(object)
    }

    pub fn encode_field(&mut self, field: &Field) -> Value {
        match field {
            Field::Null => Value::Null,
            Field::Bool(b) => Value::Bool(*b),
            Field::Int(i) => Value::Number((*i).into()),
            Field::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Field::Text(bytes) => Value::String(coerce_text(bytes)),
            Field::List(items) => Value::Array(items.iter().map(|i| self.encode_field(i)).collect()),
            Field::Record(record) => self.encode_record(record),
        }
    }

    pub fn encode_records(&mut self, records: &[RecordRef]) -> Vec<Value> {
        records.iter().map(|r| self.encode_record(r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizevent_core::host::Record;

    #[test]
    fn test_personal_fields_dropped_at_every_depth() {
        let address = Record::from_fields([
            ("city", Field::from("Leeds")),
            ("lastname", Field::from("Doe")),
        ]);
        let customer = Record::from_fields([
            ("entity_id", Field::Int(7)),
            ("email", Field::from("jane@example.com")),
            ("customer_taxvat", Field::from("GB123")),
            ("address", Field::Record(address)),
        ]);

        let value = Encoder::new().encode_record(&customer);
        assert_eq!(value["entity_id"], 7);
        assert_eq!(value["address"]["city"], "Leeds");
        assert!(value.get("email").is_none());
        assert!(value.get("customer_taxvat").is_none());
        assert!(value["address"].get("lastname").is_none());

        let rendered = value.to_string();
        assert!(!rendered.contains("jane@example.com"));
        assert!(!rendered.contains("Doe"));
    }

    #[test]
    fn test_cycle_terminates_with_sentinel() {
        let quote = Record::from_fields([("entity_id", Field::Int(1))]);
        let item = Record::from_fields([
            ("sku", Field::from("ABC")),
            ("quote", Field::Record(quote.clone())),
        ]);
        quote.set("items", Field::List(vec![Field::Record(item)]));

        let value = Encoder::new().encode_record(&quote);
        assert_eq!(value["items"][0]["sku"], "ABC");
        assert_eq!(value["items"][0]["quote"], MISSING_VALUE);
    }

    #[test]
    fn test_invalid_utf8_read_as_latin1() {
        assert_eq!(coerce_text(b"caf\xe9"), "café");
        assert_eq!(coerce_text("café".as_bytes()), "café");
    }

    #[test]
    fn test_non_finite_float_is_null() {
        let mut encoder = Encoder::new();
        assert_eq!(encoder.encode_field(&Field::Float(f64::NAN)), Value::Null);
        assert_eq!(encoder.encode_field(&Field::Float(1.5)), serde_json::json!(1.5));
    }
}
