use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown feedback type `{0}` (expected midterm or endterm)")]
    FeedbackType(String),
    #[error("unknown role `{0}` (expected admin, hod, dean or student)")]
    Role(String),
    #[error("unknown answer type `{0}` (expected rating or comment)")]
    AnswerKind(String),
    #[error("invalid filter value `{value}`: {reason}")]
    Filter { value: String, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackType {
    Midterm,
    Endterm,
}

impl FeedbackType {
    pub const ALL: [FeedbackType; 2] = [FeedbackType::Midterm, FeedbackType::Endterm];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Midterm => "midterm",
            FeedbackType::Endterm => "endterm",
        }
    }
}

impl fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeedbackType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "midterm" | "mid-term" | "mid" => Ok(FeedbackType::Midterm),
            "endterm" | "end-term" | "end" => Ok(FeedbackType::Endterm),
            _ => Err(ParseError::FeedbackType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerKind {
    Rating,
    Comment,
}

impl AnswerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerKind::Rating => "rating",
            AnswerKind::Comment => "comment",
        }
    }
}

impl FromStr for AnswerKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rating" => Ok(AnswerKind::Rating),
            "comment" | "text" => Ok(AnswerKind::Comment),
            _ => Err(ParseError::AnswerKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Hod,
    Dean,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Hod => "hod",
            Role::Dean => "dean",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "hod" => Ok(Role::Hod),
            "dean" => Ok(Role::Dean),
            "student" => Ok(Role::Student),
            _ => Err(ParseError::Role(s.to_string())),
        }
    }
}

/// A single question/answer pair. `rating` is 0 when the question was left
/// unanswered or the upstream value could not be read as a number.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub question: String,
    pub kind: AnswerKind,
    pub rating: f64,
    pub comment: Option<String>,
}

impl Answer {
    pub fn rating(question: &str, rating: f64) -> Self {
        Self {
            question: question.to_string(),
            kind: AnswerKind::Rating,
            rating,
            comment: None,
        }
    }

    pub fn comment(question: &str, text: &str) -> Self {
        Self {
            question: question.to_string(),
            kind: AnswerKind::Comment,
            rating: 0.0,
            comment: Some(text.to_string()),
        }
    }

    /// The rating if this answer counts towards averages and distributions.
    pub fn counted_rating(&self) -> Option<f64> {
        match self.kind {
            AnswerKind::Rating if self.rating.is_finite() && self.rating > 0.0 => {
                Some(self.rating)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRecord {
    pub student_id: String,
    pub student_name: String,
    pub student_email: String,
    pub roll_number: String,
    pub branch: String,
    pub year: u16,
    pub subject_id: String,
    pub subject_code: String,
    pub subject_name: String,
    pub instructor: String,
    pub feedback_type: FeedbackType,
    pub answers: Vec<Answer>,
    pub submitted_at: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn ratings(&self) -> impl Iterator<Item = f64> + '_ {
        self.answers.iter().filter_map(Answer::counted_rating)
    }
}

/// A roster row: someone who is expected to exist whether or not they ever
/// submitted feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub name: String,
    pub email: String,
    pub roll_number: String,
    pub branch: String,
    pub year: u16,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubjectInfo {
    pub code: String,
    pub name: String,
    pub instructor: String,
    pub branch: String,
    pub year: u16,
}

/// Counts per star value. All five buckets are always present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RatingDistribution {
    counts: [usize; 5],
}

impl RatingDistribution {
    #[cfg(test)]
    pub fn from_counts(counts: [usize; 5]) -> Self {
        Self { counts }
    }

    /// Rounds to the nearest star (ties up) and clamps into 1..=5.
    pub fn record(&mut self, rating: f64) {
        if !rating.is_finite() {
            return;
        }
        let star = (rating + 0.5).floor().clamp(1.0, 5.0) as usize;
        self.counts[star - 1] += 1;
    }

    pub fn count(&self, star: u8) -> usize {
        match star {
            1..=5 => self.counts[usize::from(star) - 1],
            _ => 0,
        }
    }

    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }

    pub fn ascending(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        (1u8..=5).map(move |star| (star, self.count(star)))
    }

    pub fn descending(&self) -> impl Iterator<Item = (u8, usize)> + '_ {
        (1u8..=5).rev().map(move |star| (star, self.count(star)))
    }
}

impl Serialize for RatingDistribution {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        for (star, count) in self.ascending() {
            map.serialize_entry(&star.to_string(), &count)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub average_rating: f64,
    pub total_responses: usize,
    pub response_rate: u32,
    pub distribution: RatingDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub summary: AggregateSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub question: String,
    pub average_rating: f64,
    pub answered: usize,
    pub distribution: RatingDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    pub subject_code: String,
    pub feedback_type: FeedbackType,
    pub question: String,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distribution_rounds_ties_up_and_clamps() {
        let mut dist = RatingDistribution::default();
        for rating in [0.2, 2.5, 3.4, 4.5, 7.0] {
            dist.record(rating);
        }
        assert_eq!(dist, RatingDistribution::from_counts([1, 0, 2, 0, 2]));
        assert_eq!(dist.total(), 5);
    }

    #[test]
    fn distribution_serializes_every_bucket() {
        let dist = RatingDistribution::from_counts([0, 0, 1, 2, 2]);
        let json = serde_json::to_value(dist).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"1": 0, "2": 0, "3": 1, "4": 2, "5": 2})
        );
    }

    #[test]
    fn descending_iterates_highest_first() {
        let dist = RatingDistribution::from_counts([1, 2, 3, 4, 5]);
        let stars: Vec<u8> = dist.descending().map(|(star, _)| star).collect();
        assert_eq!(stars, vec![5, 4, 3, 2, 1]);
    }

    #[test]
    fn comment_answers_are_never_counted() {
        assert_eq!(Answer::comment("Remarks", "great").counted_rating(), None);
        assert_eq!(Answer::rating("Clarity", 0.0).counted_rating(), None);
        assert_eq!(Answer::rating("Clarity", 4.0).counted_rating(), Some(4.0));
    }

    #[test]
    fn parses_roles_and_types_case_insensitively() {
        assert_eq!("HOD".parse::<Role>(), Ok(Role::Hod));
        assert_eq!("EndTerm".parse::<FeedbackType>(), Ok(FeedbackType::Endterm));
        assert!("principal".parse::<Role>().is_err());
    }
}
