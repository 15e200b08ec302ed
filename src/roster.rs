use crate::filter::{matches_criteria, Filter, FilterCriteria};
use crate::models::{FeedbackType, Role, RosterEntry, SubjectInfo};
use crate::session::Session;

/// Enrolment data used to work out how many submissions should exist.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub students: Vec<RosterEntry>,
    pub subjects: Vec<SubjectInfo>,
}

impl Roster {
    pub fn new(students: Vec<RosterEntry>, subjects: Vec<SubjectInfo>) -> Self {
        Self { students, subjects }
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty() || self.subjects.is_empty()
    }

    /// One slot per (student, subject, feedback type) where the student's
    /// branch and year match the subject's. Roster rows carry no term, so
    /// the term filter only decides how many feedback types count.
    pub fn expected_submissions(&self, criteria: &FilterCriteria, session: &Session) -> usize {
        self.expected_where(criteria, session, |_| true)
    }

    pub fn expected_for_subject(
        &self,
        code: &str,
        criteria: &FilterCriteria,
        session: &Session,
    ) -> usize {
        self.expected_where(criteria, session, |subject| subject.code == code)
    }

    fn expected_where<P>(&self, criteria: &FilterCriteria, session: &Session, keep: P) -> usize
    where
        P: Fn(&SubjectInfo) -> bool,
    {
        let per_student = FilterCriteria {
            term: Filter::All,
            role: Filter::Value(Role::Student),
            ..criteria.clone()
        };
        let feedback_types = match criteria.term.value() {
            Some(_) => 1,
            None => FeedbackType::ALL.len(),
        };

        let students: Vec<&RosterEntry> = self
            .students
            .iter()
            .filter(|s| {
                matches_criteria(*s, &per_student) && session.can_view_student(&s.branch, &s.email)
            })
            .collect();

        let slots: usize = self
            .subjects
            .iter()
            .filter(|&subject| keep(subject))
            .map(|subject| {
                students
                    .iter()
                    .filter(|s| s.branch == subject.branch && s.year == subject.year)
                    .count()
            })
            .sum();

        slots * feedback_types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(email: &str, branch: &str, year: u16, role: Role) -> RosterEntry {
        RosterEntry {
            name: email.split('@').next().unwrap_or_default().to_string(),
            email: email.to_string(),
            roll_number: format!("R-{email}"),
            branch: branch.to_string(),
            year,
            role,
        }
    }

    fn subject(code: &str, branch: &str, year: u16) -> SubjectInfo {
        SubjectInfo {
            code: code.to_string(),
            name: code.to_string(),
            instructor: "Staff".to_string(),
            branch: branch.to_string(),
            year,
        }
    }

    fn roster() -> Roster {
        Roster::new(
            vec![
                entry("asha@college.edu", "MCA Regular", 1, Role::Student),
                entry("vikram@college.edu", "MCA Regular", 1, Role::Student),
                entry("meera@college.edu", "BCA", 2, Role::Student),
                entry("hod.mca@college.edu", "MCA Regular", 1, Role::Hod),
            ],
            vec![
                subject("MCA101", "MCA Regular", 1),
                subject("MCA102", "MCA Regular", 1),
                subject("BCA201", "BCA", 2),
            ],
        )
    }

    #[test]
    fn counts_matching_students_per_subject_and_type() {
        let total = roster().expected_submissions(&FilterCriteria::default(), &Session::admin());
        // (2 MCA students x 2 subjects + 1 BCA student) x 2 feedback types
        assert_eq!(total, 10);
    }

    #[test]
    fn term_filter_counts_a_single_feedback_type() {
        let criteria = FilterCriteria {
            term: Filter::Value(FeedbackType::Midterm),
            ..FilterCriteria::default()
        };
        assert_eq!(roster().expected_submissions(&criteria, &Session::admin()), 5);
    }

    #[test]
    fn branch_and_session_narrow_the_roster() {
        let criteria = FilterCriteria {
            branch: Filter::Value("BCA".to_string()),
            ..FilterCriteria::default()
        };
        assert_eq!(roster().expected_submissions(&criteria, &Session::admin()), 2);

        let hod = Session::new(Role::Hod, Some("MCA Regular".to_string()));
        assert_eq!(
            roster().expected_submissions(&FilterCriteria::default(), &hod),
            8
        );
    }

    #[test]
    fn per_subject_count() {
        let count =
            roster().expected_for_subject("MCA101", &FilterCriteria::default(), &Session::admin());
        assert_eq!(count, 4);
    }

    #[test]
    fn empty_roster_expects_nothing() {
        let roster = Roster::default();
        assert!(roster.is_empty());
        assert_eq!(
            roster.expected_submissions(&FilterCriteria::default(), &Session::admin()),
            0
        );
    }
}
