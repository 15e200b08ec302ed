use std::collections::HashMap;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::aggregate;
use crate::config::{DistributionOrder, ReportConfig};
use crate::filter::{Filter, FilterCriteria};
use crate::models::{
    AggregateSummary, FeedbackRecord, FeedbackType, GroupSummary, RatingDistribution,
};
use crate::roster::Roster;
use crate::session::Session;

/// Everything besides the records that decides what a summary or report
/// covers.
pub struct ReportScope<'a> {
    pub session: &'a Session,
    pub criteria: &'a FilterCriteria,
    pub roster: Option<&'a Roster>,
    /// Overall expected count given on the command line; wins over the
    /// roster for the headline figure. Groups still use the roster.
    pub expected_override: Option<usize>,
    pub since: Option<NaiveDate>,
}

impl ReportScope<'_> {
    fn usable_roster(&self) -> Option<&Roster> {
        self.roster.filter(|roster| !roster.is_empty())
    }

    pub fn expected_overall(&self) -> Option<usize> {
        self.expected_override.or_else(|| {
            self.usable_roster()
                .map(|roster| roster.expected_submissions(self.criteria, self.session))
        })
    }

    fn expected_for_term(&self, key: &str) -> Option<usize> {
        let roster = self.usable_roster()?;
        let term = key.parse::<FeedbackType>().ok()?;
        let criteria = FilterCriteria {
            term: Filter::Value(term),
            ..self.criteria.clone()
        };
        Some(roster.expected_submissions(&criteria, self.session))
    }

    fn expected_for_branch(&self, key: &str) -> Option<usize> {
        let roster = self.usable_roster()?;
        let criteria = FilterCriteria {
            branch: Filter::Value(key.to_string()),
            ..self.criteria.clone()
        };
        Some(roster.expected_submissions(&criteria, self.session))
    }

    fn expected_for_subject(&self, code: &str) -> Option<usize> {
        let roster = self.usable_roster()?;
        Some(roster.expected_for_subject(code, self.criteria, self.session))
    }
}

pub fn distribution_lines(distribution: &RatingDistribution, order: DistributionOrder) -> Vec<String> {
    let total = distribution.total();
    let buckets: Vec<(u8, usize)> = match order {
        DistributionOrder::Ascending => distribution.ascending().collect(),
        DistributionOrder::Descending => distribution.descending().collect(),
    };

    buckets
        .into_iter()
        .map(|(star, count)| {
            let share = aggregate::compute_response_rate(count, total);
            let label = if star == 1 { "star" } else { "stars" };
            format!("{star} {label}: {count} ({share}%)")
        })
        .collect()
}

pub fn rate_label(summary: &AggregateSummary, expected: Option<usize>) -> String {
    match expected {
        Some(expected) => format!("{}% of {} expected", summary.response_rate, expected),
        None => "no roster available".to_string(),
    }
}

pub fn build_report(
    scope: &ReportScope<'_>,
    records: &[FeedbackRecord],
    settings: &ReportConfig,
) -> String {
    let expected = scope.expected_overall();
    let summary = aggregate::summarize(records, expected);

    let mut output = String::new();
    let _ = writeln!(output, "# Course Feedback Report");
    match scope.since {
        Some(since) => {
            let _ = writeln!(
                output,
                "Generated for {} covering {} (submissions since {})",
                scope.session.label(),
                scope.criteria.describe(),
                since
            );
        }
        None => {
            let _ = writeln!(
                output,
                "Generated for {} covering {}",
                scope.session.label(),
                scope.criteria.describe()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Overall");
    let _ = writeln!(output, "- Responses: {}", summary.total_responses);
    let _ = writeln!(output, "- Average rating: {:.1} / 5", summary.average_rating);
    let _ = writeln!(output, "- Response rate: {}", rate_label(&summary, expected));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Rating Distribution");
    if summary.distribution.total() == 0 {
        let _ = writeln!(output, "No ratings recorded.");
    } else {
        for line in distribution_lines(&summary.distribution, settings.distribution_order) {
            let _ = writeln!(output, "- {line}");
        }
    }

    let by_term = aggregate::group_by_term(records, |key| scope.expected_for_term(key));
    write_groups(&mut output, "By Feedback Type", &by_term, |key| {
        scope.expected_for_term(key)
    });

    let by_branch = aggregate::group_by_branch(records, |key| scope.expected_for_branch(key));
    write_groups(&mut output, "By Branch", &by_branch, |key| {
        scope.expected_for_branch(key)
    });

    let mut subject_names: HashMap<&str, (&str, &str)> = HashMap::new();
    for record in records {
        subject_names
            .entry(record.subject_code.as_str())
            .or_insert((record.subject_name.as_str(), record.instructor.as_str()));
    }

    let subjects = aggregate::rank_by_average(aggregate::group_by_subject(records, |key| {
        scope.expected_for_subject(key)
    }));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Subjects");
    if subjects.is_empty() {
        let _ = writeln!(output, "No subjects with feedback in this scope.");
    } else {
        for group in subjects.iter().take(settings.top_subjects) {
            let (name, instructor) = subject_names
                .get(group.key.as_str())
                .copied()
                .unwrap_or(("", ""));
            let _ = writeln!(
                output,
                "- {} {} ({}): avg {:.1} across {} responses, {}",
                group.key,
                name,
                instructor,
                group.summary.average_rating,
                group.summary.total_responses,
                rate_label(&group.summary, scope.expected_for_subject(&group.key))
            );
        }
    }

    let questions = aggregate::question_breakdown(records);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Question Breakdown");
    if questions.is_empty() {
        let _ = writeln!(output, "No rated questions in this scope.");
    } else {
        for question in &questions {
            let _ = writeln!(
                output,
                "- {}: avg {:.1} ({} answered)",
                question.question, question.average_rating, question.answered
            );
        }
    }

    let comments = aggregate::recent_comments(records, settings.recent_comments);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Comments");
    if comments.is_empty() {
        let _ = writeln!(output, "No comments recorded.");
    } else {
        for comment in &comments {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                comment.subject_code,
                comment.feedback_type,
                comment.submitted_at.date_naive(),
                comment.text
            );
        }
    }

    output
}

fn write_groups<E>(
    output: &mut String,
    title: &str,
    groups: &[GroupSummary],
    expected_for: E,
) where
    E: Fn(&str) -> Option<usize>,
{
    let _ = writeln!(output);
    let _ = writeln!(output, "## {title}");
    if groups.is_empty() {
        let _ = writeln!(output, "No responses in this scope.");
        return;
    }
    for group in groups {
        let _ = writeln!(
            output,
            "- {}: {} responses, avg {:.1}, {}",
            group.key,
            group.summary.total_responses,
            group.summary.average_rating,
            rate_label(&group.summary, expected_for(&group.key))
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, Role, RosterEntry, SubjectInfo};
    use chrono::{TimeZone, Utc};

    fn record(email: &str, code: &str, term: FeedbackType, ratings: &[f64], remark: Option<&str>) -> FeedbackRecord {
        let mut answers: Vec<Answer> = ratings
            .iter()
            .enumerate()
            .map(|(i, r)| Answer::rating(&format!("Q{}", i + 1), *r))
            .collect();
        if let Some(text) = remark {
            answers.push(Answer::comment("Remarks", text));
        }
        FeedbackRecord {
            student_id: email.to_string(),
            student_name: email.to_string(),
            student_email: email.to_string(),
            roll_number: "R-1".to_string(),
            branch: "MCA Regular".to_string(),
            year: 1,
            subject_id: code.to_lowercase(),
            subject_code: code.to_string(),
            subject_name: format!("{code} name"),
            instructor: "Dr. Rao".to_string(),
            feedback_type: term,
            answers,
            submitted_at: Utc.with_ymd_and_hms(2026, 2, 10, 9, 0, 0).unwrap(),
        }
    }

    fn roster() -> Roster {
        let student = |email: &str| RosterEntry {
            name: email.to_string(),
            email: email.to_string(),
            roll_number: email.to_string(),
            branch: "MCA Regular".to_string(),
            year: 1,
            role: Role::Student,
        };
        Roster::new(
            vec![student("a@x.edu"), student("b@x.edu")],
            vec![SubjectInfo {
                code: "MCA101".to_string(),
                name: "Data Structures".to_string(),
                instructor: "Dr. Rao".to_string(),
                branch: "MCA Regular".to_string(),
                year: 1,
            }],
        )
    }

    #[test]
    fn distribution_lines_follow_order() {
        let dist = RatingDistribution::from_counts([0, 0, 1, 2, 1]);
        let desc = distribution_lines(&dist, DistributionOrder::Descending);
        assert_eq!(desc[0], "5 stars: 1 (25%)");
        assert_eq!(desc[4], "1 star: 0 (0%)");
        let asc = distribution_lines(&dist, DistributionOrder::Ascending);
        assert_eq!(asc[3], "4 stars: 2 (50%)");
    }

    #[test]
    fn report_includes_every_section_for_empty_input() {
        let session = Session::admin();
        let criteria = FilterCriteria::default();
        let scope = ReportScope {
            session: &session,
            criteria: &criteria,
            roster: None,
            expected_override: None,
            since: None,
        };
        let report = build_report(&scope, &[], &ReportConfig::default());
        for heading in [
            "## Overall",
            "## Rating Distribution",
            "## By Feedback Type",
            "## By Branch",
            "## Top Subjects",
            "## Question Breakdown",
            "## Recent Comments",
        ] {
            assert!(report.contains(heading), "missing {heading}");
        }
        assert!(report.contains("- Average rating: 0.0 / 5"));
        assert!(report.contains("no roster available"));
    }

    #[test]
    fn report_uses_roster_for_response_rates() {
        let records = vec![
            record("a@x.edu", "MCA101", FeedbackType::Midterm, &[4.0, 5.0], Some("Clear lectures")),
            record("b@x.edu", "MCA101", FeedbackType::Midterm, &[3.0, 4.0], None),
        ];
        let session = Session::admin();
        let criteria = FilterCriteria::default();
        let roster = roster();
        let scope = ReportScope {
            session: &session,
            criteria: &criteria,
            roster: Some(&roster),
            expected_override: None,
            since: NaiveDate::from_ymd_opt(2026, 1, 1),
        };
        let report = build_report(&scope, &records, &ReportConfig::default());

        assert!(report.contains("submissions since 2026-01-01"));
        assert!(report.contains("- Average rating: 4.0 / 5"));
        assert!(report.contains("- Response rate: 50% of 4 expected"));
        assert!(report.contains("- midterm: 2 responses, avg 4.0, 100% of 2 expected"));
        assert!(report.contains("- MCA101 MCA101 name (Dr. Rao): avg 4.0 across 2 responses"));
        assert!(report.contains("- Q1: avg 3.5 (2 answered)"));
        assert!(report.contains("- MCA101 (midterm) on 2026-02-10: Clear lectures"));
    }

    #[test]
    fn expected_override_wins_for_headline() {
        let records = vec![record("a@x.edu", "MCA101", FeedbackType::Endterm, &[5.0], None)];
        let session = Session::admin();
        let criteria = FilterCriteria::default();
        let scope = ReportScope {
            session: &session,
            criteria: &criteria,
            roster: None,
            expected_override: Some(4),
            since: None,
        };
        assert_eq!(scope.expected_overall(), Some(4));
        let report = build_report(&scope, &records, &ReportConfig::default());
        assert!(report.contains("- Response rate: 25% of 4 expected"));
    }
}
