//! Row decoding into JSON.
//!
//! Column types are first classified into a [`TypeCategory`], then decoded
//! with the narrowest Rust type the backend accepts for that category.
//! Exact numerics come back as strings so no precision is lost; temporal
//! values come back as ISO-8601 text.

use crate::config::DatabaseType;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Number, Value as JsonValue};
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::types::Uuid;
use sqlx::{Column, Row, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores plain numbers
        if db == DatabaseType::SQLite {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }
    if matches!(lower.as_str(), "date" | "time" | "datetime")
        || lower.starts_with("timestamp")
    {
        return TypeCategory::Temporal;
    }
    if (lower.contains("int") && lower != "interval") || lower.contains("serial") {
        return TypeCategory::Integer;
    }
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }
    if lower.contains("char") || lower.contains("text") || lower == "name" {
        return TypeCategory::Text;
    }
    TypeCategory::Unknown
}

/// Binary columns are returned base64 encoded.
pub fn encode_binary(bytes: &[u8]) -> JsonValue {
    JsonValue::String(STANDARD.encode(bytes))
}

/// Exact numerics keep their full scale as a string.
fn decimal_value(v: Decimal) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn timestamp_tz_value(v: DateTime<Utc>) -> JsonValue {
    JsonValue::String(v.to_rfc3339())
}

fn display_value<T: std::fmt::Display>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

fn float_value(v: f64) -> JsonValue {
    Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn column_names(&self) -> Vec<String>;
    fn to_json_map(&self) -> Map<String, JsonValue>;
}

/// Try each Rust type in turn; the first that decodes wins.
macro_rules! first_decoded {
    ($row:expr, $idx:expr, $($ty:ty => $map:expr),+ $(,)?) => {{
        let mut value = None;
        $(
            if value.is_none() {
                match $row.try_get::<Option<$ty>, _>($idx) {
                    Ok(Some(v)) => value = Some(($map)(v)),
                    Ok(None) => value = Some(JsonValue::Null),
                    Err(_) => {}
                }
            }
        )+
        value.unwrap_or(JsonValue::Null)
    }};
}

macro_rules! impl_row_to_json {
    ($row:ty, $db:expr, $decode:path) => {
        impl RowToJson for $row {
            fn column_names(&self) -> Vec<String> {
                self.columns().iter().map(|c| c.name().to_string()).collect()
            }

            fn to_json_map(&self) -> Map<String, JsonValue> {
                self.columns()
                    .iter()
                    .enumerate()
                    .map(|(idx, col)| {
                        let category = categorize_type(col.type_info().name(), $db);
                        (col.name().to_string(), $decode(self, idx, category))
                    })
                    .collect()
            }
        }
    };
}

impl_row_to_json!(PgRow, DatabaseType::PostgreSQL, postgres::decode_column);
impl_row_to_json!(MySqlRow, DatabaseType::MySQL, mysql::decode_column);
impl_row_to_json!(SqliteRow, DatabaseType::SQLite, sqlite::decode_column);

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => |v: i64| JsonValue::from(v),
                i32 => |v: i32| JsonValue::from(v),
                i16 => |v: i16| JsonValue::from(v),
            ),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => float_value,
                f32 => |v: f32| float_value(f64::from(v)),
            ),
            TypeCategory::Decimal => first_decoded!(row, idx,
                Decimal => decimal_value,
                f64 => float_value,
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => JsonValue::Bool),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => |v| v),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| encode_binary(&v)),
            TypeCategory::Uuid => first_decoded!(row, idx, Uuid => display_value),
            TypeCategory::Temporal => first_decoded!(row, idx,
                DateTime<Utc> => timestamp_tz_value,
                NaiveDateTime => display_value,
                NaiveDate => display_value,
                NaiveTime => display_value,
            ),
            _ => first_decoded!(row, idx, String => JsonValue::String),
        }
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => first_decoded!(row, idx,
                i64 => |v: i64| JsonValue::from(v),
                u64 => |v: u64| JsonValue::from(v),
            ),
            TypeCategory::Float => first_decoded!(row, idx,
                f64 => float_value,
                f32 => |v: f32| float_value(f64::from(v)),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx,
                bool => JsonValue::Bool,
                i8 => |v: i8| JsonValue::Bool(v != 0),
            ),
            TypeCategory::Decimal => first_decoded!(row, idx,
                Decimal => decimal_value,
                String => JsonValue::String,
            ),
            TypeCategory::Json => first_decoded!(row, idx, JsonValue => |v| v),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| encode_binary(&v)),
            // TIMESTAMP is rendered in the session time zone, so it stays naive
            TypeCategory::Temporal => first_decoded!(row, idx,
                NaiveDateTime => display_value,
                NaiveDate => display_value,
                NaiveTime => display_value,
            ),
            _ => first_decoded!(row, idx,
                String => JsonValue::String,
                Vec<u8> => |v: Vec<u8>| match String::from_utf8(v) {
                    Ok(s) => JsonValue::String(s),
                    Err(e) => encode_binary(e.as_bytes()),
                },
            ),
        }
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> JsonValue {
        match category {
            TypeCategory::Integer => first_decoded!(row, idx, i64 => |v: i64| JsonValue::from(v)),
            TypeCategory::Float | TypeCategory::Decimal => first_decoded!(row, idx,
                f64 => float_value,
                i64 => |v: i64| JsonValue::from(v),
            ),
            TypeCategory::Boolean => first_decoded!(row, idx, bool => JsonValue::Bool),
            TypeCategory::Binary => first_decoded!(row, idx, Vec<u8> => |v: Vec<u8>| encode_binary(&v)),
            // Dynamic typing: expression columns carry the value's own type
            _ => first_decoded!(row, idx,
                i64 => |v: i64| JsonValue::from(v),
                f64 => float_value,
                String => JsonValue::String,
                Vec<u8> => |v: Vec<u8>| encode_binary(&v),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT4", DatabaseType::PostgreSQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT UNSIGNED", DatabaseType::MySQL),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::PostgreSQL),
            TypeCategory::Decimal
        );
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_misc() {
        assert_eq!(
            categorize_type("BOOLEAN", DatabaseType::MySQL),
            TypeCategory::Boolean
        );
        assert_eq!(
            categorize_type("jsonb", DatabaseType::PostgreSQL),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("BLOB", DatabaseType::SQLite),
            TypeCategory::Binary
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::MySQL),
            TypeCategory::Text
        );
        assert_eq!(
            categorize_type("NULL", DatabaseType::SQLite),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_uuid_and_temporal() {
        assert_eq!(
            categorize_type("uuid", DatabaseType::PostgreSQL),
            TypeCategory::Uuid
        );
        assert_eq!(
            categorize_type("UUID", DatabaseType::PostgreSQL),
            TypeCategory::Uuid
        );
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::PostgreSQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATETIME", DatabaseType::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::MySQL),
            TypeCategory::Temporal
        );
        assert_eq!(
            categorize_type("INTERVAL", DatabaseType::PostgreSQL),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_decimal_value_keeps_scale() {
        let v: Decimal = "12345.6700".parse().unwrap();
        assert_eq!(decimal_value(v), JsonValue::String("12345.6700".to_string()));
    }

    #[test]
    fn test_temporal_values_render_iso() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(display_value(date), JsonValue::String("2024-02-29".to_string()));

        let ts = date.and_hms_opt(13, 5, 0).unwrap().and_utc();
        assert_eq!(
            timestamp_tz_value(ts),
            JsonValue::String("2024-02-29T13:05:00+00:00".to_string())
        );
    }

    #[test]
    fn test_encode_binary() {
        assert_eq!(encode_binary(b"hi"), JsonValue::String("aGk=".to_string()));
    }

    #[test]
    fn test_float_value_non_finite() {
        assert_eq!(float_value(1.5), serde_json::json!(1.5));
        assert_eq!(float_value(f64::NAN), JsonValue::String("NaN".to_string()));
    }
}
