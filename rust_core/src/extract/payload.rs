//! Structured-payload extraction path.
//!
//! The listing page embeds its state as JSON inside inline scripts. The
//! `"matches":[...]` array is cut out with a string-aware bracket scanner
//! and each object becomes a [`MatchRecord`].

use super::slug::slugify;
use super::{ExtractConfig, ExtractError};
use crate::types::{MatchRecord, ScrapeStamp};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Locate every payload array in `text`, returned as raw JSON slices.
/// An unterminated array yields an error for that occurrence only.
pub fn find_payload_arrays<'a>(text: &'a str, key: &str) -> Vec<Result<&'a str, ExtractError>> {
    let mut found = Vec::new();
    if key.is_empty() {
        return found;
    }

    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find(key) {
        let key_start = search_from + rel;
        let after_key = key_start + key.len();
        // the array starts at the first '[' at or after the key's tail
        let open = if key.ends_with('[') {
            Some(after_key - 1)
        } else {
            text[after_key..].find('[').map(|i| after_key + i)
        };

        let Some(open) = open else { break };
        match balanced_end(text, open) {
            Some(close) => {
                found.push(Ok(&text[open..=close]));
                search_from = close + 1;
            }
            None => {
                found.push(Err(ExtractError::UnterminatedPayload(open)));
                break;
            }
        }
    }
    found
}

/// Byte index of the bracket closing the one at `open`, ignoring brackets
/// inside JSON string literals.
fn balanced_end(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[open..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' | b'{' => depth += 1,
            b']' | b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parsed payload objects from one raw array slice.
pub fn parse_payload_array(raw: &str) -> Result<Vec<Value>, ExtractError> {
    let value: Value = serde_json::from_str(raw)?;
    match value {
        Value::Array(items) => Ok(items),
        _ => Err(ExtractError::PayloadObject("payload is not an array".to_string())),
    }
}

fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn match_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Build a record from one payload object.
pub fn record_from_object(obj: &Value, config: &ExtractConfig, stamp: &ScrapeStamp) -> Result<MatchRecord, ExtractError> {
    let contestant = |idx: usize| {
        obj.get("contestants")
            .and_then(|c| c.get(idx))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
    };

    let (Some(a), Some(b)) = (contestant(0), contestant(1)) else {
        return Err(ExtractError::PayloadObject("missing contestant names".to_string()));
    };
    let id = obj
        .get("matchId")
        .and_then(match_id)
        .ok_or_else(|| ExtractError::PayloadObject(format!("{a} vs {b}: missing matchId")))?;

    let tournament = obj
        .get("competition")
        .and_then(|c| c.get("name"))
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();

    let (event_date, event_time) = match obj.get("matchDateUtc").and_then(Value::as_str).and_then(parse_utc) {
        Some(utc) => {
            let local = utc.with_timezone(&config.display_offset);
            (local.format("%d/%m").to_string(), local.format("%H:%M").to_string())
        }
        None => (String::new(), String::new()),
    };

    let competition_slug = if tournament.is_empty() {
        "unknown".to_string()
    } else {
        slugify(tournament)
    };
    let source_url = format!(
        "{}/{}/{}/{}-{}-m{}",
        config.site_base.trim_end_matches('/'),
        config.listing_path.trim_matches('/'),
        competition_slug,
        slugify(a),
        slugify(b),
        id
    );

    Ok(MatchRecord::new(a, b, source_url, stamp)
        .with_schedule(event_date, event_time)
        .with_tournament(tournament))
}

/// Outcome of the payload path over all script blocks.
#[derive(Debug, Default)]
pub struct PayloadExtraction {
    pub records: Vec<MatchRecord>,
    /// Objects seen across all payload arrays
    pub candidates: usize,
}

/// Run the payload path over every script text containing the key.
pub fn extract_payload<'a, I>(scripts: I, config: &ExtractConfig, stamp: &ScrapeStamp) -> PayloadExtraction
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = PayloadExtraction::default();

    for script in scripts {
        if !script.contains(config.payload_key.as_str()) {
            continue;
        }
        for raw in find_payload_arrays(script, &config.payload_key) {
            let objects = match raw.and_then(parse_payload_array) {
                Ok(objects) => objects,
                Err(e) => {
                    debug!("Skipping payload block: {}", e);
                    continue;
                }
            };
            out.candidates += objects.len();
            for obj in &objects {
                match record_from_object(obj, config, stamp) {
                    Ok(record) => out.records.push(record),
                    Err(e) => debug!("{}", e),
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stamp() -> ScrapeStamp {
        ScrapeStamp {
            date: "2024-04-30".to_string(),
            time: "08:00:00".to_string(),
        }
    }

    #[test]
    fn test_scanner_ignores_brackets_in_strings() {
        let script = r#"window.__STATE__ = {"matches":[{"name":"a ] tricky [ \" name"},{"x":[1,2]}],"other":1};"#;
        let arrays = find_payload_arrays(script, r#""matches":["#);
        assert_eq!(arrays.len(), 1);
        let raw = arrays[0].as_ref().unwrap();
        let items = parse_payload_array(raw).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["name"], "a ] tricky [ \" name");
    }

    #[test]
    fn test_scanner_unterminated_array() {
        let arrays = find_payload_arrays(r#"{"matches":[{"a":1}"#, r#""matches":["#);
        assert_eq!(arrays.len(), 1);
        assert!(matches!(arrays[0], Err(ExtractError::UnterminatedPayload(_))));
    }

    #[test]
    fn test_scanner_multiple_occurrences() {
        let script = r#"{"matches":[1]} {"matches":[2,3]}"#;
        let arrays: Vec<&str> = find_payload_arrays(script, r#""matches":["#)
            .into_iter()
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(arrays, vec!["[1]", "[2,3]"]);
    }

    #[test]
    fn test_record_from_object() {
        let obj = json!({
            "matchId": "123",
            "contestants": [{"name": "Jane Doe"}, {"name": "Ann Lee"}],
            "competition": {"name": "Paris Open"},
            "matchDateUtc": "2024-05-01T14:00:00Z"
        });
        let record = record_from_object(&obj, &ExtractConfig::default(), &stamp()).unwrap();
        assert_eq!(record.event_date, "01/05");
        assert_eq!(record.event_time, "14:00");
        assert_eq!(record.tournament, "Paris Open");
        assert_eq!(
            record.source_url,
            "https://www.betclic.fr/tennis-stennis/paris-open/jane-doe-ann-lee-m123"
        );
        assert_eq!(record.scrape_date, "2024-04-30");
    }

    #[test]
    fn test_record_numeric_id_and_missing_fields() {
        let obj = json!({
            "matchId": 77,
            "contestants": [{"name": "A. Smith"}, {"name": "B Jones"}],
            "matchDateUtc": "not a date"
        });
        let record = record_from_object(&obj, &ExtractConfig::default(), &stamp()).unwrap();
        assert_eq!(record.event_date, "");
        assert_eq!(record.event_time, "");
        assert_eq!(record.tournament, "");
        assert!(record.source_url.ends_with("/unknown/a-smith-b-jones-m77"));
    }

    #[test]
    fn test_display_offset_applied() {
        let mut config = ExtractConfig::default();
        config.display_offset = chrono::FixedOffset::east_opt(2 * 3600).unwrap();
        let obj = json!({
            "matchId": "9",
            "contestants": [{"name": "X"}, {"name": "Y"}],
            "matchDateUtc": "2024-05-01T23:30:00Z"
        });
        let record = record_from_object(&obj, &config, &stamp()).unwrap();
        assert_eq!(record.event_date, "02/05");
        assert_eq!(record.event_time, "01:30");
    }

    #[test]
    fn test_objects_without_names_or_id_dropped() {
        let config = ExtractConfig::default();
        let no_id = json!({"contestants": [{"name": "X"}, {"name": "Y"}]});
        let one_name = json!({"matchId": "1", "contestants": [{"name": "X"}]});
        assert!(record_from_object(&no_id, &config, &stamp()).is_err());
        assert!(record_from_object(&one_name, &config, &stamp()).is_err());

        let script = r#"{"matches":[{"matchId":"1","contestants":[{"name":"X"}]},{"matchId":"2","contestants":[{"name":"X"},{"name":"Y"}]}]}"#;
        let out = extract_payload([script], &config, &stamp());
        assert_eq!(out.candidates, 2);
        assert_eq!(out.records.len(), 1);
    }

    #[test]
    fn test_malformed_script_does_not_hide_later_scripts() {
        let config = ExtractConfig::default();
        let broken = r#"window.__A__ = {"matches":[{bad}]};"#;
        let valid = r#"window.__B__ = {"matches":[{"matchId":"7","contestants":[{"name":"Jane Doe"},{"name":"Ann Lee"}]}]};"#;

        let out = extract_payload([broken, valid], &config, &stamp());
        assert_eq!(out.candidates, 1);
        assert_eq!(out.records.len(), 1);
        assert_eq!(out.records[0].participant_a, "Jane Doe");
    }
}
