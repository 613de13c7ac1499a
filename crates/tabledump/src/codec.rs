//! JSON lines codec for records.
//!
//! A record is encoded as one JSON object whose keys are the field names in
//! descriptor order. Decoding matches keys by name: unknown keys are ignored
//! and missing keys leave the field in its initial state.
//!
//! | Scalar    | JSON                                                        |
//! |-----------|-------------------------------------------------------------|
//! | Bool      | `true` / `false`                                            |
//! | Int64     | integer                                                     |
//! | Float64   | number, or `"NaN"`, `"Infinity"`, `"-Infinity"`             |
//! | String    | string                                                      |
//! | Bytes     | standard base64 string                                      |
//! | Date      | `"YYYY-MM-DD"`                                              |
//! | Timestamp | RFC 3339 string, UTC on output                              |
//! | absent    | `null`                                                      |
//!
//! Dates and timestamps outside years 0000 to 9999 have no four-digit
//! RFC 3339 form and fail to encode.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use serde::ser::{Error as _, SerializeMap, Serializer};
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::core::record::{FieldDescriptor, Record, RecordDescriptor};
use crate::core::value::{ScalarType, Value};
use crate::error::{DumpError, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_YEAR: i32 = 9999;

struct EncodedValue<'a>(&'a Value);

impl Serialize for EncodedValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null(_) => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int64(v) => serializer.serialize_i64(*v),
            Value::Float64(v) if v.is_nan() => serializer.serialize_str("NaN"),
            Value::Float64(v) if v.is_infinite() && *v > 0.0 => {
                serializer.serialize_str("Infinity")
            }
            Value::Float64(v) if v.is_infinite() => serializer.serialize_str("-Infinity"),
            Value::Float64(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Bytes(v) => serializer.serialize_str(&BASE64.encode(v)),
            Value::Date(v) if !(0..=MAX_YEAR).contains(&v.year()) => {
                Err(S::Error::custom(format!("date {} is out of range", v)))
            }
            Value::Date(v) => serializer.serialize_str(&v.format(DATE_FORMAT).to_string()),
            Value::Timestamp(v) if !(0..=MAX_YEAR).contains(&v.year()) => {
                Err(S::Error::custom(format!("timestamp {} is out of range", v)))
            }
            Value::Timestamp(v) => {
                serializer.serialize_str(&v.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        }
    }
}

struct EncodedRecord<'a> {
    record: &'a Record,
    descriptor: &'a RecordDescriptor,
}

impl Serialize for EncodedRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let fields = self.descriptor.fields();
        let mut map = serializer.serialize_map(Some(fields.len()))?;
        for (idx, field) in fields.iter().enumerate() {
            match self.record.get(idx) {
                Some(value) => map.serialize_entry(&field.name, &EncodedValue(value))?,
                None => map.serialize_entry(&field.name, &EncodedValue(&field.repr.initial_value()))?,
            }
        }
        map.end()
    }
}

/// Encode a record as one JSON line (without the trailing newline).
pub fn encode(record: &Record, descriptor: &RecordDescriptor) -> Result<String> {
    Ok(serde_json::to_string(&EncodedRecord { record, descriptor })?)
}

/// Decode one JSON line into a record of `descriptor`.
pub fn decode(line: &str, descriptor: &RecordDescriptor) -> Result<Record> {
    let parsed: JsonValue =
        serde_json::from_str(line).map_err(|e| DumpError::RecordDecode(e.to_string()))?;
    let object = match parsed {
        JsonValue::Object(object) => object,
        other => {
            return Err(DumpError::RecordDecode(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            )))
        }
    };

    let mut record = descriptor.new_record();
    for (idx, field) in descriptor.fields().iter().enumerate() {
        let Some(json) = object.get(&field.name) else {
            continue;
        };
        if json.is_null() {
            // Non-nullable fields keep their zero value.
            if field.repr.optional {
                record.set(idx, Value::Null(field.repr.scalar));
            }
            continue;
        }
        record.set(idx, decode_value(json, field)?);
    }

    Ok(record)
}

fn decode_value(json: &JsonValue, field: &FieldDescriptor) -> Result<Value> {
    let scalar = field.repr.scalar;
    let value = match scalar {
        ScalarType::Bool => json.as_bool().map(Value::Bool),
        ScalarType::Int64 => json.as_i64().map(Value::Int64),
        ScalarType::Float64 => match json {
            JsonValue::Number(n) => n.as_f64().map(Value::Float64),
            JsonValue::String(s) => match s.as_str() {
                "NaN" => Some(Value::Float64(f64::NAN)),
                "Infinity" => Some(Value::Float64(f64::INFINITY)),
                "-Infinity" => Some(Value::Float64(f64::NEG_INFINITY)),
                _ => None,
            },
            _ => None,
        },
        ScalarType::String => json.as_str().map(|s| Value::String(s.to_string())),
        ScalarType::Bytes => match json.as_str() {
            Some(s) => Some(Value::Bytes(BASE64.decode(s).map_err(|e| {
                DumpError::RecordDecode(format!("field {}: invalid base64: {}", field.name, e))
            })?)),
            None => None,
        },
        ScalarType::Date => match json.as_str() {
            Some(s) => Some(Value::Date(NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(
                |e| DumpError::RecordDecode(format!("field {}: invalid date {:?}: {}", field.name, s, e)),
            )?)),
            None => None,
        },
        ScalarType::Timestamp => match json.as_str() {
            Some(s) => Some(Value::Timestamp(
                DateTime::parse_from_rfc3339(s)
                    .map_err(|e| {
                        DumpError::RecordDecode(format!(
                            "field {}: invalid timestamp {:?}: {}",
                            field.name, s, e
                        ))
                    })?
                    .with_timezone(&Utc),
            )),
            None => None,
        },
    };

    value.ok_or_else(|| {
        DumpError::RecordDecode(format!(
            "field {}: expected {}, found {}",
            field.name,
            field.repr,
            json_kind(json)
        ))
    })
}

fn json_kind(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

/// Field names in descriptor order.
pub fn columns_of(descriptor: &RecordDescriptor) -> Vec<String> {
    descriptor.fields().iter().map(|f| f.name.clone()).collect()
}

/// Record values in descriptor order, one per column of [`columns_of`].
pub fn values_of(record: &Record, descriptor: &RecordDescriptor) -> Vec<Value> {
    descriptor
        .fields()
        .iter()
        .enumerate()
        .map(|(idx, field)| {
            record
                .get(idx)
                .cloned()
                .unwrap_or_else(|| field.repr.initial_value())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::FieldRepr;
    use chrono::TimeZone;

    fn field(name: &str, repr: FieldRepr) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            repr,
        }
    }

    fn users() -> RecordDescriptor {
        RecordDescriptor::new(vec![
            field("id", FieldRepr::required(ScalarType::Int64)),
            field("name", FieldRepr::optional(ScalarType::String)),
        ])
    }

    fn everything() -> RecordDescriptor {
        RecordDescriptor::new(vec![
            field("flag", FieldRepr::required(ScalarType::Bool)),
            field("count", FieldRepr::required(ScalarType::Int64)),
            field("ratio", FieldRepr::optional(ScalarType::Float64)),
            field("label", FieldRepr::required(ScalarType::String)),
            field("blob", FieldRepr::optional(ScalarType::Bytes)),
            field("day", FieldRepr::optional(ScalarType::Date)),
            field("at", FieldRepr::optional(ScalarType::Timestamp)),
        ])
    }

    #[test]
    fn test_encode_users_rows() {
        let descriptor = users();
        let a = Record::from_values(vec![Value::Int64(1), Value::from("a")]);
        let b = Record::from_values(vec![Value::Int64(2), Value::Null(ScalarType::String)]);
        assert_eq!(encode(&a, &descriptor).unwrap(), r#"{"id":1,"name":"a"}"#);
        assert_eq!(encode(&b, &descriptor).unwrap(), r#"{"id":2,"name":null}"#);
    }

    #[test]
    fn test_encode_keeps_field_order() {
        let descriptor = RecordDescriptor::new(vec![
            field("zeta", FieldRepr::required(ScalarType::Int64)),
            field("alpha", FieldRepr::required(ScalarType::Int64)),
        ]);
        let record = Record::from_values(vec![Value::Int64(1), Value::Int64(2)]);
        assert_eq!(encode(&record, &descriptor).unwrap(), r#"{"zeta":1,"alpha":2}"#);
    }

    #[test]
    fn test_encode_value_formats() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let record = Record::from_values(vec![
            Value::Bool(true),
            Value::Int64(-5),
            Value::Float64(f64::INFINITY),
            Value::from("x"),
            Value::Bytes(b"hi".to_vec()),
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            Value::Timestamp(at),
        ]);
        assert_eq!(
            encode(&record, &everything()).unwrap(),
            r#"{"flag":true,"count":-5,"ratio":"Infinity","label":"x","blob":"aGk=","day":"2024-03-01","at":"2024-03-01T12:30:00Z"}"#
        );
    }

    #[test]
    fn test_decode_matches_by_name() {
        let record = decode(r#"{"name":"a","extra":[1,2],"id":1}"#, &users()).unwrap();
        assert_eq!(record.values(), &[Value::Int64(1), Value::from("a")]);
    }

    #[test]
    fn test_decode_missing_keys_use_initial_state() {
        let record = decode("{}", &users()).unwrap();
        assert_eq!(
            record.values(),
            &[Value::Int64(0), Value::Null(ScalarType::String)]
        );
    }

    #[test]
    fn test_decode_null_handling() {
        let record = decode(r#"{"id":null,"name":null}"#, &users()).unwrap();
        assert_eq!(
            record.values(),
            &[Value::Int64(0), Value::Null(ScalarType::String)]
        );
    }

    #[test]
    fn test_decode_rejects_wrong_types() {
        assert!(matches!(
            decode(r#"{"id":"one"}"#, &users()),
            Err(DumpError::RecordDecode(_))
        ));
        assert!(matches!(
            decode(r#"{"id":1.5}"#, &users()),
            Err(DumpError::RecordDecode(_))
        ));
        assert!(matches!(
            decode("[1,2]", &users()),
            Err(DumpError::RecordDecode(_))
        ));
        assert!(matches!(
            decode("{\"id\":", &users()),
            Err(DumpError::RecordDecode(_))
        ));
    }

    #[test]
    fn test_decode_timestamp_with_offset() {
        let record = decode(r#"{"at":"2024-03-01T14:30:00+02:00"}"#, &everything()).unwrap();
        assert_eq!(
            record.get(6),
            Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()))
        );
    }

    #[test]
    fn test_round_trip_is_identity() {
        let descriptor = everything();
        let records = vec![
            Record::from_values(vec![
                Value::Bool(false),
                Value::Int64(i64::MAX),
                Value::Float64(0.25),
                Value::from("quote \" and \n newline"),
                Value::Bytes(vec![0, 255, 7]),
                Value::Date(NaiveDate::from_ymd_opt(1999, 12, 31).unwrap()),
                Value::Timestamp(Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap()),
            ]),
            Record::from_values(vec![
                Value::Bool(true),
                Value::Int64(0),
                Value::Null(ScalarType::Float64),
                Value::from(""),
                Value::Bytes(Vec::new()),
                Value::Null(ScalarType::Date),
                Value::Null(ScalarType::Timestamp),
            ]),
        ];

        for record in records {
            let line = encode(&record, &descriptor).unwrap();
            assert_eq!(decode(&line, &descriptor).unwrap(), record);
        }
    }

    #[test]
    fn test_nullable_bytes_null_and_empty() {
        let descriptor = RecordDescriptor::new(vec![field(
            "blob",
            FieldRepr::optional(ScalarType::Bytes),
        )]);

        let absent = Record::from_values(vec![Value::Null(ScalarType::Bytes)]);
        let line = encode(&absent, &descriptor).unwrap();
        assert_eq!(line, r#"{"blob":null}"#);
        assert_eq!(decode(&line, &descriptor).unwrap(), absent);

        let empty = Record::from_values(vec![Value::Bytes(Vec::new())]);
        let line = encode(&empty, &descriptor).unwrap();
        assert_eq!(line, r#"{"blob":""}"#);
        assert_eq!(decode(&line, &descriptor).unwrap(), empty);
    }

    #[test]
    fn test_years_past_9999_fail_to_encode() {
        let descriptor = RecordDescriptor::new(vec![
            field("day", FieldRepr::optional(ScalarType::Date)),
            field("at", FieldRepr::optional(ScalarType::Timestamp)),
        ]);
        let last = Record::from_values(vec![
            Value::Date(NaiveDate::from_ymd_opt(9999, 12, 31).unwrap()),
            Value::Timestamp(Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap()),
        ]);
        let line = encode(&last, &descriptor).unwrap();
        assert_eq!(decode(&line, &descriptor).unwrap(), last);

        let late_day = Record::from_values(vec![
            Value::Date(NaiveDate::from_ymd_opt(10000, 1, 1).unwrap()),
            Value::Null(ScalarType::Timestamp),
        ]);
        assert!(matches!(encode(&late_day, &descriptor), Err(DumpError::Json(_))));

        let late_at = Record::from_values(vec![
            Value::Null(ScalarType::Date),
            Value::Timestamp(Utc.with_ymd_and_hms(10000, 1, 1, 0, 0, 0).unwrap()),
        ]);
        assert!(matches!(encode(&late_at, &descriptor), Err(DumpError::Json(_))));
    }

    #[test]
    fn test_nan_round_trips() {
        let descriptor = RecordDescriptor::new(vec![field(
            "ratio",
            FieldRepr::required(ScalarType::Float64),
        )]);
        let line = encode(&Record::from_values(vec![Value::Float64(f64::NAN)]), &descriptor).unwrap();
        assert_eq!(line, r#"{"ratio":"NaN"}"#);
        match decode(&line, &descriptor).unwrap().get(0) {
            Some(Value::Float64(v)) => assert!(v.is_nan()),
            other => panic!("unexpected value: {other:?}"),
        }
    }

    #[test]
    fn test_columns_and_values_align() {
        let descriptor = users();
        let record = Record::from_values(vec![Value::Int64(3), Value::from("c")]);
        let columns = columns_of(&descriptor);
        let values = values_of(&record, &descriptor);
        assert_eq!(columns, vec!["id", "name"]);
        assert_eq!(columns.len(), values.len());
        assert_eq!(values[1], Value::from("c"));
    }
}
