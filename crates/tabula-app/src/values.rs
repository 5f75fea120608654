// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Conversions between the editor's display strings, the wire strings sent
//! to storage, and typed cell values.

use crate::model::{CellValue, ColumnType};

/// Typed value for raw editor input. Never fails: numeric input that does
/// not parse becomes `Null`.
pub fn validate(raw: &str, column_type: ColumnType) -> CellValue {
    match column_type {
        ColumnType::Number => parse_number(raw).map_or(CellValue::Null, CellValue::Number),
        ColumnType::Text => CellValue::Text(raw.trim().to_owned()),
    }
}

/// Display string for a cell. Numbers in number columns get thousands
/// separators.
pub fn format(value: &CellValue, column_type: ColumnType) -> String {
    match (value, column_type) {
        (CellValue::Number(number), ColumnType::Number) => format_number(*number),
        (CellValue::Number(number), ColumnType::Text) => plain_number(*number),
        (CellValue::Text(text), _) => text.clone(),
        (CellValue::Null, _) => String::new(),
    }
}

/// Re-derive a loaded value after its column changes type.
pub fn coerce(value: &CellValue, from: ColumnType, to: ColumnType) -> CellValue {
    if from == to {
        return value.clone();
    }
    match (value, to) {
        (CellValue::Text(text), ColumnType::Number) => validate(text, ColumnType::Number),
        (CellValue::Number(number), ColumnType::Number) => CellValue::Number(*number),
        (CellValue::Null, ColumnType::Number) => CellValue::Null,
        (CellValue::Null, ColumnType::Text) => CellValue::Text(String::new()),
        (CellValue::Number(number), ColumnType::Text) => CellValue::Text(plain_number(*number)),
        (CellValue::Text(text), ColumnType::Text) => CellValue::Text(text.clone()),
    }
}

pub fn default_value(column_type: ColumnType) -> CellValue {
    match column_type {
        ColumnType::Number => CellValue::Null,
        ColumnType::Text => CellValue::Text(String::new()),
    }
}

pub fn to_wire(value: &CellValue) -> String {
    match value {
        CellValue::Text(text) => text.clone(),
        CellValue::Number(number) => plain_number(*number),
        CellValue::Null => String::new(),
    }
}

pub fn from_wire(raw: Option<&str>, column_type: ColumnType) -> CellValue {
    match (raw, column_type) {
        (None, _) => default_value(column_type),
        (Some(raw), ColumnType::Text) => CellValue::Text(raw.to_owned()),
        (Some(raw), ColumnType::Number) => validate(raw, ColumnType::Number),
    }
}

/// Lenient numeric parse shared by validation, filtering and sorting.
/// Thousands separators are accepted so formatted values re-parse.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned = raw
        .trim()
        .chars()
        .filter(|ch| *ch != ',')
        .collect::<String>();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|value| value.is_finite())
}

pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return String::new();
    }
    let rounded = (value * 1000.0).round() / 1000.0;
    let fixed = format!("{:.3}", rounded.abs());
    let (whole, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');

    let mut output = String::with_capacity(fixed.len() + whole.len() / 3 + 1);
    if rounded < 0.0 {
        output.push('-');
    }
    output.push_str(&comma_format(whole));
    if !fraction.is_empty() {
        output.push('.');
        output.push_str(fraction);
    }
    output
}

pub fn comma_format_count(value: usize) -> String {
    comma_format(&value.to_string())
}

fn plain_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

fn comma_format(digits: &str) -> String {
    let mut output = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, ch) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            output.push(',');
        }
        output.push(ch);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn number_validation_degrades_to_null() {
        assert_eq!(validate("abc", ColumnType::Number), CellValue::Null);
        assert_eq!(validate("42", ColumnType::Number), CellValue::Number(42.0));
        assert_eq!(validate(" 1,234.5 ", ColumnType::Number), CellValue::Number(1234.5));
        assert_eq!(validate("", ColumnType::Number), CellValue::Null);
        assert_eq!(validate("NaN", ColumnType::Number), CellValue::Null);
    }

    #[test]
    fn text_validation_trims() {
        assert_eq!(
            validate("  hello  ", ColumnType::Text),
            CellValue::Text("hello".to_owned())
        );
        assert_eq!(validate("   ", ColumnType::Text), CellValue::Text(String::new()));
    }

    #[test]
    fn formatting_numbers_uses_separators() {
        assert_eq!(format(&CellValue::Number(1234.0), ColumnType::Number), "1,234");
        assert_eq!(format(&CellValue::Null, ColumnType::Number), "");
        assert_eq!(format_number(1_234_567.891), "1,234,567.891");
        assert_eq!(format_number(-9876.5), "-9,876.5");
        assert_eq!(format_number(0.0004), "0");
        assert_eq!(format_number(999.0), "999");
        assert_eq!(format_number(1000.0), "1,000");
    }

    #[test]
    fn formatting_text_is_verbatim() {
        let value = CellValue::Text(" spaced ".to_owned());
        assert_eq!(format(&value, ColumnType::Text), " spaced ");
    }

    #[test]
    fn formatted_numbers_parse_back() {
        let shown = format(&CellValue::Number(12_345.25), ColumnType::Number);
        assert_eq!(validate(&shown, ColumnType::Number), CellValue::Number(12_345.25));
    }

    #[test]
    fn coerce_text_to_number_uses_validation_rule() {
        let text = CellValue::Text("17".to_owned());
        assert_eq!(
            coerce(&text, ColumnType::Text, ColumnType::Number),
            CellValue::Number(17.0)
        );
        let word = CellValue::Text("high".to_owned());
        assert_eq!(
            coerce(&word, ColumnType::Text, ColumnType::Number),
            CellValue::Null
        );
    }

    #[test]
    fn coerce_number_to_text_stringifies() {
        assert_eq!(
            coerce(&CellValue::Number(3.0), ColumnType::Number, ColumnType::Text),
            CellValue::Text("3".to_owned())
        );
        assert_eq!(
            coerce(&CellValue::Number(2.5), ColumnType::Number, ColumnType::Text),
            CellValue::Text("2.5".to_owned())
        );
        assert_eq!(
            coerce(&CellValue::Null, ColumnType::Number, ColumnType::Text),
            CellValue::Text(String::new())
        );
    }

    #[test]
    fn coerce_same_type_is_identity() {
        let value = CellValue::Text("x".to_owned());
        assert_eq!(coerce(&value, ColumnType::Text, ColumnType::Text), value);
    }

    #[test]
    fn wire_strings_round_trip_through_column_types() {
        assert_eq!(to_wire(&CellValue::Null), "");
        assert_eq!(to_wire(&CellValue::Number(42.0)), "42");
        assert_eq!(from_wire(Some("42"), ColumnType::Number), CellValue::Number(42.0));
        assert_eq!(from_wire(None, ColumnType::Number), CellValue::Null);
        assert_eq!(from_wire(None, ColumnType::Text), CellValue::Text(String::new()));
    }

    #[test]
    fn count_formatting() {
        assert_eq!(comma_format_count(0), "0");
        assert_eq!(comma_format_count(100_000), "100,000");
    }
}
