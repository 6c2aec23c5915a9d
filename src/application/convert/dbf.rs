//! DBF table extraction.

use std::io::Cursor;

use dbase::FieldValue;
use serde_json::{Map, Number, Value};

use super::ConvertError;

/// Reads a DBF table from raw bytes and returns its records as a JSON array
/// of objects, one per record, keyed by field name.
pub fn dbf_to_json(data: &[u8]) -> Result<String, ConvertError> {
    if data.is_empty() {
        return Err(ConvertError::input("DBF file not provided"));
    }

    let mut reader = dbase::Reader::new(Cursor::new(data))?;
    let mut rows = Vec::new();

    for record in reader.read()? {
        let mut row = Map::new();
        for (name, value) in record {
            row.insert(name, field_to_json(value));
        }
        rows.push(Value::Object(row));
    }

    Ok(serde_json::to_string_pretty(&Value::Array(rows))?)
}

fn field_to_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(text) => text.map(Value::String).unwrap_or(Value::Null),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(number) => number.map(float_value).unwrap_or(Value::Null),
        FieldValue::Float(number) => number
            .map(|f| float_value(f64::from(f)))
            .unwrap_or(Value::Null),
        FieldValue::Integer(number) => Value::from(number),
        FieldValue::Currency(number) | FieldValue::Double(number) => float_value(number),
        FieldValue::Logical(flag) => flag.map(Value::Bool).unwrap_or(Value::Null),
        FieldValue::Date(date) => date
            .map(|d| {
                Value::String(format!("{:04}-{:02}-{:02}", d.year(), d.month(), d.day()))
            })
            .unwrap_or(Value::Null),
        FieldValue::DateTime(stamp) => {
            let date = stamp.date();
            let time = stamp.time();
            Value::String(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                date.year(),
                date.month(),
                date.day(),
                time.hours(),
                time.minutes(),
                time.seconds()
            ))
        }
    }
}

fn float_value(number: f64) -> Value {
    Number::from_f64(number).map(Value::Number).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::dbf_to_json;

    #[test]
    fn empty_payload_is_rejected() {
        assert!(dbf_to_json(&[]).is_err());
    }

    #[test]
    fn garbage_bytes_are_a_parse_error() {
        let err = dbf_to_json(b"definitely not a dbf table").unwrap_err();
        assert!(err.is_input_fault());
    }
}
