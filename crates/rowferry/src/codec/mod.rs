//! Quoted comma-delimited codec for tabular datasets.
//!
//! Every field, header names included, is wrapped in double quotes; a literal
//! `"` inside a value is escaped by doubling. A null value encodes as an empty
//! quoted field (`""`) and decodes back as an empty *string* — nullability is
//! not round-trippable, callers that care must track it out of band.
//!
//! Fields may contain embedded commas and quotes. Embedded line breaks are not
//! supported by the format: one row per line, so [`encode`] rejects values
//! containing `\n` or `\r` instead of writing a file that cannot be decoded.

use crate::error::{FerryError, Result};

/// An ordered set of column names plus an ordered sequence of rows.
///
/// Invariant: every row has exactly as many fields as there are columns.
/// Decoding relies on positional indexing, so column order is preserved
/// end-to-end.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dataset {
    /// Column names, in on-disk order.
    pub columns: Vec<String>,

    /// Row values, positionally matching `columns`. `None` is a SQL NULL on
    /// the encode side; decoded rows never contain `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns.
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, enforcing the arity invariant.
    pub fn push_row(&mut self, row: Vec<Option<String>>) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(FerryError::MalformedCsv(format!(
                "row has {} fields, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    /// Position of a named column, if present.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

/// Encode a full dataset to quoted comma-delimited text.
pub fn encode(dataset: &Dataset) -> Result<String> {
    let mut out = encode_header(&dataset.columns)?;
    out.push('\n');
    for row in &dataset.rows {
        if row.len() != dataset.columns.len() {
            return Err(FerryError::MalformedCsv(format!(
                "row has {} fields, expected {}",
                row.len(),
                dataset.columns.len()
            )));
        }
        out.push_str(&encode_record(row)?);
        out.push('\n');
    }
    Ok(out)
}

/// Encode the header line. Column names are quoted under the same rule as
/// data fields so the header round-trips.
pub fn encode_header(columns: &[String]) -> Result<String> {
    let fields: Vec<String> = columns
        .iter()
        .map(|c| encode_field(Some(c)))
        .collect::<Result<_>>()?;
    Ok(fields.join(","))
}

/// Encode a single data row (no trailing newline).
pub fn encode_record(row: &[Option<String>]) -> Result<String> {
    let fields: Vec<String> = row
        .iter()
        .map(|v| encode_field(v.as_deref()))
        .collect::<Result<_>>()?;
    Ok(fields.join(","))
}

fn encode_field(value: Option<&str>) -> Result<String> {
    let value = value.unwrap_or("");
    if value.contains('\n') || value.contains('\r') {
        return Err(FerryError::MalformedCsv(
            "field value contains a line break, which the format cannot represent".into(),
        ));
    }
    Ok(format!("\"{}\"", value.replace('"', "\"\"")))
}

/// Decode quoted comma-delimited text back into a dataset.
///
/// The first line is the header. Unquoted fields (as written by older
/// producers that left the header bare) are accepted as-is. Every data row
/// must match the header arity exactly.
pub fn decode(text: &str) -> Result<Dataset> {
    let mut lines = text.lines();
    let header = lines
        .next()
        .ok_or_else(|| FerryError::MalformedCsv("input has no header row".into()))?;

    let mut dataset = Dataset::new(split_fields(header)?);

    for (idx, line) in lines.enumerate() {
        let fields = split_fields(line)?;
        if fields.len() != dataset.columns.len() {
            return Err(FerryError::MalformedCsv(format!(
                "row {} has {} fields, expected {}",
                idx + 1,
                fields.len(),
                dataset.columns.len()
            )));
        }
        dataset.rows.push(fields.into_iter().map(Some).collect());
    }

    Ok(dataset)
}

/// Split one line on unescaped commas, trimming one layer of quotes per field.
fn split_fields(line: &str) -> Result<Vec<String>> {
    let mut fields = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut value = String::new();
            loop {
                match chars.next() {
                    Some('"') => {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            value.push('"');
                        } else {
                            break;
                        }
                    }
                    Some(c) => value.push(c),
                    None => {
                        return Err(FerryError::MalformedCsv(format!(
                            "unterminated quoted field in line {:?}",
                            line
                        )))
                    }
                }
            }
            fields.push(value);
            match chars.next() {
                Some(',') => continue,
                None => break,
                Some(c) => {
                    return Err(FerryError::MalformedCsv(format!(
                        "unexpected {:?} after closing quote in line {:?}",
                        c, line
                    )))
                }
            }
        } else {
            let mut value = String::new();
            let mut more = false;
            for c in chars.by_ref() {
                if c == ',' {
                    more = true;
                    break;
                }
                value.push(c);
            }
            fields.push(value);
            if !more {
                break;
            }
        }
    }

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut d = Dataset::new(vec!["Id".into(), "Name".into(), "Email".into()]);
        d.push_row(vec![
            Some("1".into()),
            Some("Ada".into()),
            Some("ada@example.com".into()),
        ])
        .unwrap();
        d.push_row(vec![Some("2".into()), Some("Bo".into()), None]).unwrap();
        d
    }

    #[test]
    fn test_round_trip_preserves_columns_and_rows() {
        let mut d = Dataset::new(vec!["Name".into(), "City".into()]);
        d.push_row(vec![Some("Ada".into()), Some("London".into())])
            .unwrap();
        d.push_row(vec![Some("Bo".into()), Some("Oslo".into())]).unwrap();

        let decoded = decode(&encode(&d).unwrap()).unwrap();
        assert_eq!(decoded, d);
    }

    #[test]
    fn test_header_is_quoted() {
        let text = encode(&sample()).unwrap();
        assert!(text.starts_with("\"Id\",\"Name\",\"Email\""));
    }

    #[test]
    fn test_null_encodes_as_empty_and_decodes_as_empty_string() {
        let text = encode(&sample()).unwrap();
        assert!(text.lines().nth(2).unwrap().ends_with(",\"\""));

        // Lossy by design: the NULL comes back as an empty string.
        let decoded = decode(&text).unwrap();
        assert_eq!(decoded.rows[1][2], Some(String::new()));
    }

    #[test]
    fn test_embedded_quotes_are_doubled() {
        let mut d = Dataset::new(vec!["Name".into()]);
        d.push_row(vec![Some("An \"odd\" name".into())]).unwrap();

        let text = encode(&d).unwrap();
        assert!(text.contains("\"An \"\"odd\"\" name\""));
        assert_eq!(decode(&text).unwrap(), d);
    }

    #[test]
    fn test_embedded_comma_survives_round_trip() {
        let mut d = Dataset::new(vec!["Name".into(), "Note".into()]);
        d.push_row(vec![Some("Ada".into()), Some("first, of many".into())])
            .unwrap();
        assert_eq!(decode(&encode(&d).unwrap()).unwrap(), d);
    }

    #[test]
    fn test_line_break_in_value_is_rejected() {
        let mut d = Dataset::new(vec!["Note".into()]);
        d.push_row(vec![Some("two\nlines".into())]).unwrap();
        assert!(matches!(encode(&d), Err(FerryError::MalformedCsv(_))));
    }

    #[test]
    fn test_unquoted_legacy_header_is_accepted() {
        let decoded = decode("Id,Name\n\"1\",\"Ada\"\n").unwrap();
        assert_eq!(decoded.columns, vec!["Id".to_string(), "Name".to_string()]);
        assert_eq!(decoded.rows[0][1], Some("Ada".into()));
    }

    #[test]
    fn test_arity_mismatch_is_malformed() {
        let err = decode("\"A\",\"B\"\n\"1\"\n").unwrap_err();
        assert!(matches!(err, FerryError::MalformedCsv(_)));
    }

    #[test]
    fn test_unterminated_quote_is_malformed() {
        let err = decode("\"A\"\n\"oops\n").unwrap_err();
        assert!(matches!(err, FerryError::MalformedCsv(_)));
    }

    #[test]
    fn test_empty_input_is_malformed() {
        assert!(matches!(decode(""), Err(FerryError::MalformedCsv(_))));
    }

    #[test]
    fn test_push_row_enforces_arity() {
        let mut d = Dataset::new(vec!["A".into(), "B".into()]);
        assert!(d.push_row(vec![Some("1".into())]).is_err());
    }
}
