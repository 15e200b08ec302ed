use crate::models::{FeedbackRecord, Role};

/// Who is looking at the numbers. Passed in explicitly so record selection
/// never depends on ambient state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub role: Role,
    /// Branch for a HOD, email for a student; ignored for admin and dean.
    pub scope: Option<String>,
}

impl Session {
    pub fn new(role: Role, scope: Option<String>) -> Self {
        let scope = scope
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Self { role, scope }
    }

    pub fn admin() -> Self {
        Self::new(Role::Admin, None)
    }

    /// Whether data about a student in `branch` with `email` is visible.
    pub fn can_view_student(&self, branch: &str, email: &str) -> bool {
        match self.role {
            Role::Admin | Role::Dean => true,
            Role::Hod => self
                .scope
                .as_deref()
                .is_some_and(|scope| branch.eq_ignore_ascii_case(scope)),
            Role::Student => self
                .scope
                .as_deref()
                .is_some_and(|scope| email.eq_ignore_ascii_case(scope)),
        }
    }

    pub fn can_view(&self, record: &FeedbackRecord) -> bool {
        self.can_view_student(&record.branch, &record.student_email)
    }

    /// Records this session may aggregate over, in input order.
    pub fn visible(&self, records: &[FeedbackRecord]) -> Vec<FeedbackRecord> {
        records
            .iter()
            .filter(|record| self.can_view(record))
            .cloned()
            .collect()
    }

    pub fn label(&self) -> String {
        match (&self.role, self.scope.as_deref()) {
            (Role::Admin | Role::Dean, _) | (_, None) => self.role.to_string(),
            (role, Some(scope)) => format!("{role} ({scope})"),
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::admin()
    }
}
