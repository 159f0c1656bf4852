//! Minimal quote-aware CSV records.
//!
//! Response text routinely carries commas, quotes and newlines, so records are
//! split on unquoted delimiters only. Doubled quotes inside a quoted field
//! decode to one quote.

use anyhow::{anyhow, Result};

/// Split `text` into records of fields. Blank lines are skipped.
pub fn parse_records(text: &str) -> Result<Vec<Vec<String>>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut line = 1usize;
    let mut quote_line = 0usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        if in_quotes {
            if c == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(c);
            }
            continue;
        }
        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
                quote_line = line;
            }
            ',' => {
                record.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' | '\n' => {
                if c == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                    line += 1;
                }
                finish_record(&mut records, &mut record, &mut field, field_started);
                field_started = false;
            }
            other => {
                field.push(other);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(anyhow!("unterminated quoted field starting on line {}", quote_line));
    }
    finish_record(&mut records, &mut record, &mut field, field_started);
    Ok(records)
}

fn finish_record(records: &mut Vec<Vec<String>>, record: &mut Vec<String>, field: &mut String, field_started: bool) {
    if record.is_empty() && field.is_empty() && !field_started {
        return;
    }
    record.push(std::mem::take(field));
    records.push(std::mem::take(record));
}

/// Quote a field when it would otherwise break the record.
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// One record terminated by `\n`.
pub fn write_record<S: AsRef<str>>(fields: &[S]) -> String {
    let mut out = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    out.push('\n');
    out
}
