use std::collections::BTreeMap;

use crate::models::{
    AggregateSummary, AnswerKind, CommentEntry, FeedbackRecord, GroupSummary, QuestionSummary,
    RatingDistribution,
};

/// One-decimal rounding, half up: `floor(10x + 0.5) / 10`.
pub fn round_one_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

fn mean_of<I: IntoIterator<Item = f64>>(ratings: I) -> f64 {
    let (sum, count) = ratings
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), r| (sum + r, count + 1));
    if count == 0 {
        0.0
    } else {
        round_one_decimal(sum / count as f64)
    }
}

pub fn compute_average(records: &[FeedbackRecord]) -> f64 {
    mean_of(records.iter().flat_map(FeedbackRecord::ratings))
}

pub fn compute_distribution(records: &[FeedbackRecord]) -> RatingDistribution {
    let mut distribution = RatingDistribution::default();
    for rating in records.iter().flat_map(FeedbackRecord::ratings) {
        distribution.record(rating);
    }
    distribution
}

pub fn compute_response_rate(submitted: usize, expected: usize) -> u32 {
    if expected == 0 {
        return 0;
    }
    let rate = (submitted as f64 / expected as f64 * 100.0).round();
    rate.clamp(0.0, 100.0) as u32
}

/// `expected` is the roster-derived number of submissions that should
/// exist; `None` when no roster is available.
pub fn summarize(records: &[FeedbackRecord], expected: Option<usize>) -> AggregateSummary {
    AggregateSummary {
        average_rating: compute_average(records),
        total_responses: records.len(),
        response_rate: expected
            .map(|expected| compute_response_rate(records.len(), expected))
            .unwrap_or(0),
        distribution: compute_distribution(records),
    }
}

/// Groups records by `key`, sorted by key, with input order kept inside
/// each group. `expected_for` supplies the per-group roster count.
pub fn group_by<K, E>(records: &[FeedbackRecord], key: K, expected_for: E) -> Vec<GroupSummary>
where
    K: Fn(&FeedbackRecord) -> String,
    E: Fn(&str) -> Option<usize>,
{
    let mut groups: BTreeMap<String, Vec<FeedbackRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(key(record)).or_default().push(record.clone());
    }

    groups
        .into_iter()
        .map(|(key, members)| GroupSummary {
            summary: summarize(&members, expected_for(&key)),
            key,
        })
        .collect()
}

pub fn group_by_term<E>(records: &[FeedbackRecord], expected_for: E) -> Vec<GroupSummary>
where
    E: Fn(&str) -> Option<usize>,
{
    group_by(records, |r| r.feedback_type.to_string(), expected_for)
}

pub fn group_by_branch<E>(records: &[FeedbackRecord], expected_for: E) -> Vec<GroupSummary>
where
    E: Fn(&str) -> Option<usize>,
{
    group_by(records, |r| r.branch.clone(), expected_for)
}

pub fn group_by_subject<E>(records: &[FeedbackRecord], expected_for: E) -> Vec<GroupSummary>
where
    E: Fn(&str) -> Option<usize>,
{
    group_by(records, |r| r.subject_code.clone(), expected_for)
}

/// Highest average first; ties keep key order.
pub fn rank_by_average(mut groups: Vec<GroupSummary>) -> Vec<GroupSummary> {
    groups.sort_by(|a, b| {
        b.summary
            .average_rating
            .partial_cmp(&a.summary.average_rating)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    groups
}

/// Per-question statistics in the order questions are first seen.
pub fn question_breakdown(records: &[FeedbackRecord]) -> Vec<QuestionSummary> {
    let mut order: Vec<String> = Vec::new();
    let mut ratings: std::collections::HashMap<String, Vec<f64>> =
        std::collections::HashMap::new();

    for answer in records.iter().flat_map(|r| r.answers.iter()) {
        if answer.kind != AnswerKind::Rating {
            continue;
        }
        let entry = ratings.entry(answer.question.clone()).or_insert_with(|| {
            order.push(answer.question.clone());
            Vec::new()
        });
        if let Some(rating) = answer.counted_rating() {
            entry.push(rating);
        }
    }

    order
        .into_iter()
        .map(|question| {
            let values = ratings.remove(&question).unwrap_or_default();
            let mut distribution = RatingDistribution::default();
            for rating in &values {
                distribution.record(*rating);
            }
            QuestionSummary {
                average_rating: mean_of(values.iter().copied()),
                answered: values.len(),
                distribution,
                question,
            }
        })
        .collect()
}

/// Non-empty comment answers, newest first.
pub fn recent_comments(records: &[FeedbackRecord], limit: usize) -> Vec<CommentEntry> {
    let mut comments: Vec<CommentEntry> = records
        .iter()
        .flat_map(|record| {
            record.answers.iter().filter_map(move |answer| {
                let text = answer.comment.as_deref()?.trim();
                if text.is_empty() {
                    return None;
                }
                Some(CommentEntry {
                    subject_code: record.subject_code.clone(),
                    feedback_type: record.feedback_type,
                    question: answer.question.clone(),
                    text: text.to_string(),
                    submitted_at: record.submitted_at,
                })
            })
        })
        .collect();

    comments.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
    comments.truncate(limit);
    comments
}
