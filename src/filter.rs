//! Record filtering.
//!
//! Every dimension is a [`Filter`], so "no filter" is an explicit variant
//! rather than a magic `"all"` string mixed in with real values.

use std::fmt;
use std::str::FromStr;

use crate::models::{FeedbackRecord, FeedbackType, ParseError, Role, RosterEntry};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Filter<T> {
    #[default]
    All,
    Value(T),
}

impl<T: PartialEq> Filter<T> {
    pub fn matches(&self, value: Option<&T>) -> bool {
        match self {
            Filter::All => true,
            Filter::Value(expected) => value == Some(expected),
        }
    }
}

impl<T> Filter<T> {
    pub fn is_all(&self) -> bool {
        matches!(self, Filter::All)
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Filter::All => None,
            Filter::Value(value) => Some(value),
        }
    }
}

impl<T> FromStr for Filter<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            return Ok(Filter::All);
        }
        trimmed
            .parse::<T>()
            .map(Filter::Value)
            .map_err(|err| ParseError::Filter {
                value: s.to_string(),
                reason: err.to_string(),
            })
    }
}

impl<T: fmt::Display> fmt::Display for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => f.write_str("all"),
            Filter::Value(value) => value.fmt(f),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    pub term: Filter<FeedbackType>,
    pub branch: Filter<String>,
    pub year: Filter<u16>,
    pub role: Filter<Role>,
    pub search: Option<String>,
}

impl FilterCriteria {
    pub fn is_unfiltered(&self) -> bool {
        self.term.is_all()
            && self.branch.is_all()
            && self.year.is_all()
            && self.role.is_all()
            && self.search.as_deref().map_or(true, |q| q.trim().is_empty())
    }

    pub fn describe(&self) -> String {
        if self.is_unfiltered() {
            return "all records".to_string();
        }
        let mut parts = Vec::new();
        if let Filter::Value(term) = &self.term {
            parts.push(format!("term {term}"));
        }
        if let Filter::Value(branch) = &self.branch {
            parts.push(format!("branch {branch}"));
        }
        if let Filter::Value(year) = &self.year {
            parts.push(format!("year {year}"));
        }
        if let Filter::Value(role) = &self.role {
            parts.push(format!("role {role}"));
        }
        if let Some(q) = self.search.as_deref().filter(|q| !q.trim().is_empty()) {
            parts.push(format!("search \"{}\"", q.trim()));
        }
        parts.join(", ")
    }
}

/// Anything that can be narrowed by [`FilterCriteria`]. A dimension a
/// type does not carry yields `None` and only matches [`Filter::All`].
pub trait Filterable {
    fn term(&self) -> Option<FeedbackType>;
    fn branch(&self) -> Option<&str>;
    fn year(&self) -> Option<u16>;
    fn role(&self) -> Option<Role>;
    fn search_fields(&self) -> [&str; 3];
}

impl Filterable for FeedbackRecord {
    fn term(&self) -> Option<FeedbackType> {
        Some(self.feedback_type)
    }

    fn branch(&self) -> Option<&str> {
        Some(&self.branch)
    }

    fn year(&self) -> Option<u16> {
        Some(self.year)
    }

    fn role(&self) -> Option<Role> {
        Some(Role::Student)
    }

    fn search_fields(&self) -> [&str; 3] {
        [
            self.student_name.as_str(),
            self.student_email.as_str(),
            self.roll_number.as_str(),
        ]
    }
}

impl Filterable for RosterEntry {
    fn term(&self) -> Option<FeedbackType> {
        None
    }

    fn branch(&self) -> Option<&str> {
        Some(&self.branch)
    }

    fn year(&self) -> Option<u16> {
        Some(self.year)
    }

    fn role(&self) -> Option<Role> {
        Some(self.role)
    }

    fn search_fields(&self) -> [&str; 3] {
        [
            self.name.as_str(),
            self.email.as_str(),
            self.roll_number.as_str(),
        ]
    }
}

pub fn matches_criteria<R: Filterable>(record: &R, criteria: &FilterCriteria) -> bool {
    if !criteria.term.matches(record.term().as_ref()) {
        return false;
    }
    let branch_ok = match &criteria.branch {
        Filter::All => true,
        Filter::Value(branch) => record.branch() == Some(branch.as_str()),
    };
    if !branch_ok {
        return false;
    }
    if !criteria.year.matches(record.year().as_ref()) {
        return false;
    }
    if !criteria.role.matches(record.role().as_ref()) {
        return false;
    }

    match criteria.search.as_deref().map(str::trim) {
        None | Some("") => true,
        Some(query) => {
            let needle = query.to_lowercase();
            record
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        }
    }
}

/// Keeps the records matching every set dimension, in input order.
pub fn filter_by_criteria<R: Filterable + Clone>(records: &[R], criteria: &FilterCriteria) -> Vec<R> {
    records
        .iter()
        .filter(|record| matches_criteria(*record, criteria))
        .cloned()
        .collect()
}
