// SPDX-License-Identifier: MIT OR Apache-2.0

//! Question/answer records read from ingestion files.
//!
//! Input is either a JSON array of records or newline-delimited JSON. A
//! record that fails to decode, or lacks `id`, `question` or `answer`, fails
//! the whole load.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use crate::errors::{RagError, Result};

/// One ingested question/answer unit before chunking.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Record {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Domain-specific fields carried into chunk metadata.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Record {
    /// Text submitted to the chunker.
    pub fn content(&self) -> String {
        format!("Question: {}\nAnswer: {}", self.question, self.answer)
    }

    /// Metadata attached to every chunk of this record.
    pub fn metadata(&self) -> BTreeMap<String, Value> {
        let mut metadata = self.extra.clone();
        metadata.insert("id".to_string(), Value::String(self.id.clone()));
        metadata.insert(
            "tags".to_string(),
            Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
        );
        if let Some(updated_at) = self.updated_at {
            metadata.insert(
                "updated_at".to_string(),
                Value::String(updated_at.to_rfc3339()),
            );
        }
        metadata
    }

    fn validate(&self) -> std::result::Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("record id is empty".to_string());
        }
        if self.question.trim().is_empty() {
            return Err(format!("record '{}' has an empty question", self.id));
        }
        if self.answer.trim().is_empty() {
            return Err(format!("record '{}' has an empty answer", self.id));
        }
        Ok(())
    }
}

/// Reads and parses a record file.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<Record>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| RagError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(&content, &path.display().to_string())
}

/// Parses records from a JSON array or NDJSON string.
///
/// `origin` names the input in error messages.
pub fn parse_records(input: &str, origin: &str) -> Result<Vec<Record>> {
    let records = if input.trim_start().starts_with('[') {
        parse_array(input, origin)?
    } else {
        parse_lines(input, origin)?
    };

    let mut seen = HashSet::new();
    for record in &records {
        if !seen.insert(record.id.as_str()) {
            tracing::warn!("duplicate record id '{}' in {}", record.id, origin);
        }
    }

    tracing::debug!("parsed {} records from {}", records.len(), origin);
    Ok(records)
}

fn parse_array(input: &str, origin: &str) -> Result<Vec<Record>> {
    let elements: Vec<Value> =
        serde_json::from_str(input).map_err(|err| malformed(origin, "array".to_string(), err))?;

    elements
        .into_iter()
        .enumerate()
        .map(|(idx, element)| {
            let location = format!("element {}", idx);
            let record: Record = serde_json::from_value(element)
                .map_err(|err| malformed(origin, location.clone(), err))?;
            record
                .validate()
                .map_err(|reason| malformed(origin, location, reason))?;
            Ok(record)
        })
        .collect()
}

fn parse_lines(input: &str, origin: &str) -> Result<Vec<Record>> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            let location = format!("line {}", idx + 1);
            let record: Record = serde_json::from_str(line)
                .map_err(|err| malformed(origin, location.clone(), err))?;
            record
                .validate()
                .map_err(|reason| malformed(origin, location, reason))?;
            Ok(record)
        })
        .collect()
}

fn malformed(origin: &str, location: String, reason: impl ToString) -> RagError {
    RagError::MalformedInput {
        origin: origin.to_string(),
        location,
        reason: reason.to_string(),
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

fn deserialize_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = raw.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight.and_utc()));
        }
    }

    Err(serde::de::Error::custom(format!(
        "invalid updated_at '{}': expected RFC 3339 or YYYY-MM-DD",
        value
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn parses_ndjson_and_skips_blank_lines() {
        let input = r#"{"id":"1","question":"How do I reset my password?","answer":"Go to settings and click reset."}

{"id":2,"question":"What is the vacation policy?","answer":"Employees get 20 days per year.","tags":["hr","leave"]}
"#;
        let records = parse_records(input, "faqs.jsonl").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "1");
        assert_eq!(records[1].id, "2");
        assert!(records[1].tags.contains("hr"));
    }

    #[test]
    fn parses_json_array_with_timestamps() {
        let input = r#"[
            {"id":"a","question":"q1","answer":"a1","updated_at":"2024-03-01T12:00:00Z"},
            {"id":"b","question":"q2","answer":"a2","updated_at":"2024-03-02"}
        ]"#;
        let records = parse_records(input, "faqs.json").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].updated_at.unwrap().to_rfc3339(),
            "2024-03-02T00:00:00+00:00"
        );
    }

    #[test]
    fn malformed_line_reports_location() {
        let input = "{\"id\":\"1\",\"question\":\"q\",\"answer\":\"a\"}\nnot json\n";
        let err = parse_records(input, "faqs.jsonl").unwrap_err();
        match err {
            RagError::MalformedInput { origin, location, .. } => {
                assert_eq!(origin, "faqs.jsonl");
                assert_eq!(location, "line 2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_answer_is_malformed() {
        let input = r#"[{"id":"1","question":"q"}]"#;
        assert!(matches!(
            parse_records(input, "x"),
            Err(RagError::MalformedInput { .. })
        ));

        let input = r#"[{"id":"1","question":"q","answer":"   "}]"#;
        assert!(matches!(
            parse_records(input, "x"),
            Err(RagError::MalformedInput { .. })
        ));
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let input = r#"{"id":"1","question":"q","answer":"a","updated_at":"yesterday"}"#;
        assert!(matches!(
            parse_records(input, "x"),
            Err(RagError::MalformedInput { .. })
        ));
    }

    #[test]
    fn content_and_metadata() {
        let input = r#"{"id":"7","question":"Where?","answer":"Here.","tags":["b","a"],"team":"ops"}"#;
        let record = parse_records(input, "x").unwrap().remove(0);
        assert_eq!(record.content(), "Question: Where?\nAnswer: Here.");

        let metadata = record.metadata();
        assert_eq!(metadata["id"], Value::String("7".into()));
        assert_eq!(metadata["tags"], serde_json::json!(["a", "b"]));
        assert_eq!(metadata["team"], Value::String("ops".into()));
        assert!(!metadata.contains_key("updated_at"));
    }

    #[test]
    fn load_records_reports_missing_file() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(load_records(&missing), Err(RagError::Io { .. })));

        let present = dir.path().join("faqs.json");
        fs::write(&present, r#"[{"id":"1","question":"q","answer":"a"}]"#).unwrap();
        assert_eq!(load_records(&present).unwrap().len(), 1);
    }
}
