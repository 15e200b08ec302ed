//! Decoding of feedback exports from the dashboard backend.
//!
//! The backend's JSON is loosely typed. Anything that cannot be read as a
//! rating becomes 0 ("unanswered") instead of failing the whole load; only
//! a record without a recognisable feedback type is dropped.

use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

use crate::models::{Answer, AnswerKind, FeedbackRecord, FeedbackType};

pub async fn load_json(path: &Path) -> anyhow::Result<Vec<FeedbackRecord>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_records(&text).with_context(|| format!("failed to decode {}", path.display()))
}

pub fn parse_records(text: &str) -> anyhow::Result<Vec<FeedbackRecord>> {
    let value: Value = serde_json::from_str(text)?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data").or_else(|| map.remove("feedback")) {
            Some(Value::Array(items)) => items,
            _ => bail!("expected a JSON array of feedback records"),
        },
        _ => bail!("expected a JSON array of feedback records"),
    };

    let mut records = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match decode_record(item) {
            Some(record) => records.push(record),
            None => warn!(index, "skipping feedback entry without a valid feedbackType"),
        }
    }
    debug!(decoded = records.len(), total = items.len(), "decoded feedback export");
    Ok(records)
}

/// Reads a rating the way the dashboard pages did with `?? 0`: numbers
/// and numeric strings pass, everything else is unanswered.
pub fn coerce_rating(value: Option<&Value>) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => return parse_rating(s),
        _ => None,
    };
    parsed.filter(|r| r.is_finite()).unwrap_or(0.0)
}

pub fn parse_rating(s: &str) -> f64 {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|r| r.is_finite())
        .unwrap_or(0.0)
}

fn text(item: &Value, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|key| match item.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
        .unwrap_or_default()
}

fn decode_answer(item: &Value) -> Answer {
    let kind = match item.get("type") {
        Some(Value::String(s)) => s.parse().unwrap_or(AnswerKind::Rating),
        _ => AnswerKind::Rating,
    };
    let comment = match item.get("comment") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    };

    match kind {
        AnswerKind::Comment => Answer {
            question: text(item, &["question"]),
            kind,
            rating: 0.0,
            comment: comment.or_else(|| match item.get("answer") {
                Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
                _ => None,
            }),
        },
        AnswerKind::Rating => Answer {
            question: text(item, &["question"]),
            kind,
            rating: coerce_rating(item.get("answer")),
            comment,
        },
    }
}

fn decode_record(item: &Value) -> Option<FeedbackRecord> {
    let feedback_type = match item.get("feedbackType") {
        Some(Value::String(s)) => s.parse::<FeedbackType>().ok()?,
        _ => return None,
    };

    let answers = match item.get("answers") {
        Some(Value::Array(answers)) => answers.iter().map(decode_answer).collect(),
        _ => match item.get("rating") {
            Some(rating) => vec![Answer::rating("Overall rating", coerce_rating(Some(rating)))],
            None => Vec::new(),
        },
    };

    let submitted_raw = text(item, &["submittedAt", "createdAt"]);
    let submitted_at = match DateTime::parse_from_rfc3339(&submitted_raw) {
        Ok(at) => at.with_timezone(&Utc),
        Err(_) => {
            debug!(value = %submitted_raw, "unreadable submittedAt, using epoch");
            DateTime::<Utc>::default()
        }
    };

    let year = coerce_rating(item.get("year"));

    Some(FeedbackRecord {
        student_id: text(item, &["studentId"]),
        student_name: text(item, &["studentName", "name"]),
        student_email: text(item, &["studentEmail", "email"]),
        roll_number: text(item, &["rollNumber"]),
        branch: text(item, &["branch"]),
        year: if year >= 0.0 && year <= f64::from(u16::MAX) {
            year as u16
        } else {
            0
        },
        subject_id: text(item, &["subjectId"]),
        subject_code: text(item, &["subjectCode", "subjectId"]),
        subject_name: text(item, &["subjectName"]),
        instructor: text(item, &["instructor", "facultyName"]),
        feedback_type,
        answers,
        submitted_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn coerces_malformed_answers_to_unanswered() {
        let text = json!([{
            "studentId": "s1",
            "subjectId": "MCA101",
            "feedbackType": "midterm",
            "submittedAt": "2026-02-10T09:30:00Z",
            "answers": [
                {"question": "Clarity", "answer": 4, "type": "rating"},
                {"question": "Pace", "answer": "5", "type": "rating"},
                {"question": "Support", "answer": "n/a", "type": "rating"},
                {"question": "Labs", "answer": null},
                {"question": "Remarks", "type": "comment", "comment": "Good pace"}
            ]
        }])
        .to_string();

        let records = parse_records(&text).unwrap();
        assert_eq!(records.len(), 1);
        let ratings: Vec<f64> = records[0].answers.iter().map(|a| a.rating).collect();
        assert_eq!(ratings, vec![4.0, 5.0, 0.0, 0.0, 0.0]);
        assert_eq!(records[0].answers[4].comment.as_deref(), Some("Good pace"));
        assert_eq!(aggregate::compute_average(&records), 4.5);
    }

    #[test]
    fn missing_answers_become_empty_and_unknown_types_are_skipped() {
        let text = json!([
            {"studentId": "s1", "subjectId": "MCA101", "feedbackType": "ENDTERM"},
            {"studentId": "s2", "subjectId": "MCA101", "feedbackType": "quiz", "answers": []},
            {"studentId": "s3", "subjectId": "MCA101"}
        ])
        .to_string();

        let records = parse_records(&text).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].feedback_type, FeedbackType::Endterm);
        assert!(records[0].answers.is_empty());
        assert_eq!(records[0].submitted_at, DateTime::<Utc>::default());
    }

    #[test]
    fn top_level_rating_becomes_single_answer() {
        let text = json!([
            {"studentId": 17, "subjectId": 4, "feedbackType": "midterm", "rating": 3, "year": "2"}
        ])
        .to_string();
        let records = parse_records(&text).unwrap();
        assert_eq!(records[0].student_id, "17");
        assert_eq!(records[0].year, 2);
        assert_eq!(records[0].answers, vec![Answer::rating("Overall rating", 3.0)]);
    }

    #[test]
    fn accepts_wrapped_data_array_and_rejects_scalars() {
        let wrapped = json!({"data": [{"feedbackType": "midterm"}]}).to_string();
        assert_eq!(parse_records(&wrapped).unwrap().len(), 1);
        assert!(parse_records("42").is_err());
        assert!(parse_records("{\"message\": \"ok\"}").is_err());
    }

    #[tokio::test]
    async fn fixture_export_aggregates_like_the_dashboard() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/feedback-export.json");
        let records = load_json(&path).await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].subject_code, "MCA101");
        assert_eq!(aggregate::compute_average(&records), 4.2);
        assert_eq!(aggregate::compute_distribution(&records).total(), 5);
    }

    #[tokio::test]
    async fn loads_records_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([{"feedbackType": "endterm", "branch": "MCA Regular", "rating": 5}])
        )
        .unwrap();

        let records = load_json(file.path()).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].branch, "MCA Regular");
    }
}
