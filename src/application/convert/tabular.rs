//! CSV and JSON tabular conversions.
//!
//! CSV rows become an array of objects keyed by the header row, with scalar
//! inference so numeric and boolean columns survive the round trip. JSON
//! arrays of objects become CSV with a header built from the union of keys
//! in first-appearance order.

use serde_json::{Map, Value};

use super::ConvertError;

pub fn csv_to_json(content: &str) -> Result<String, ConvertError> {
    if content.trim().is_empty() {
        return Err(ConvertError::input("CSV content is empty"));
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in reader.records() {
        let record = record?;
        let mut row = Map::with_capacity(headers.len());
        for (index, header) in headers.iter().enumerate() {
            let field = record.get(index).unwrap_or_default();
            row.insert(header.to_string(), infer_scalar(field));
        }
        rows.push(Value::Object(row));
    }

    Ok(serde_json::to_string_pretty(&Value::Array(rows))?)
}

pub fn json_to_csv(content: &str) -> Result<String, ConvertError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|err| ConvertError::input(format!("invalid JSON: {err}")))?;

    let rows = match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(ConvertError::input("JSON array is empty"));
            }
            items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(ConvertError::input(format!(
                        "expected an array of objects, found {}",
                        value_kind(&other)
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        Value::Object(map) => vec![map],
        other => {
            return Err(ConvertError::input(format!(
                "expected an object or array of objects, found {}",
                value_kind(&other)
            )));
        }
    };

    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.iter().any(|existing| existing == key) {
                columns.push(key.clone());
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns)?;
    for row in &rows {
        let record: Vec<String> = columns
            .iter()
            .map(|column| row.get(column).map(render_cell).unwrap_or_default())
            .collect();
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| ConvertError::compose(format!("csv writer flush failed: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| ConvertError::compose(format!("csv output was not UTF-8: {err}")))
}

/// Maps a raw CSV field to the narrowest JSON scalar it parses as.
fn infer_scalar(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(int) = field.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = field.parse::<f64>()
        && float.is_finite()
    {
        return Value::from(float);
    }
    match field {
        "true" | "True" | "TRUE" => Value::Bool(true),
        "false" | "False" | "FALSE" => Value::Bool(false),
        other => Value::String(other.to_string()),
    }
}

fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
