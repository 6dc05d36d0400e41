use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer};

use crate::data::{Department, Report};

/// A categorical selection: either the `all` sentinel or one concrete value.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Choice<T> {
    #[default]
    All,
    Only(T),
}

impl<T: FromStr> Choice<T> {
    /// `all` and the empty string select everything.
    pub fn parse(s: &str) -> Result<Self, T::Err> {
        let s = s.trim();
        if s.is_empty() || s == "all" {
            return Ok(Choice::All);
        }

        T::from_str(s).map(Choice::Only)
    }
}

impl<T: PartialEq> Choice<T> {
    pub fn matches(&self, value: &T) -> bool {
        match self {
            Choice::All => true,
            Choice::Only(v) => v == value,
        }
    }

    pub fn matches_opt(&self, value: Option<&T>) -> bool {
        match self {
            Choice::All => true,
            Choice::Only(v) => value == Some(v),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Choice::All)
    }
}

impl<T: Display> Choice<T> {
    /// Form value, as used to mark the selected `<option>`.
    pub fn value(&self) -> String {
        match self {
            Choice::All => "all".to_string(),
            Choice::Only(v) => v.to_string(),
        }
    }
}

impl<'de, T> Deserialize<'de> for Choice<T>
where
    T: FromStr,
    T::Err: Display,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Choice::parse(&s).map_err(serde::de::Error::custom)
    }
}

pub type TextField<R> = fn(&R) -> &str;

/// Conjunction of a free-text query over a fixed set of text fields and any
/// number of categorical predicates.
pub struct Filter<'a, R> {
    fields: &'a [TextField<R>],
    needle: String,
    predicates: Vec<Box<dyn Fn(&R) -> bool + 'a>>,
}

impl<'a, R> Filter<'a, R> {
    pub fn new(fields: &'a [TextField<R>], query: &str) -> Self {
        Self {
            fields,
            needle: query.to_lowercase(),
            predicates: Vec::new(),
        }
    }

    /// A filter for pages without a search box.
    pub fn categorical() -> Self {
        Self::new(&[], "")
    }

    pub fn choice<T>(mut self, choice: Choice<T>, field: fn(&R) -> &T) -> Self
    where
        T: PartialEq + 'a,
    {
        if !choice.is_all() {
            self.predicates
                .push(Box::new(move |r| choice.matches(field(r))));
        }
        self
    }

    /// Like [`Filter::choice`] for fields that may be unset. An unset field
    /// only passes the `all` selection.
    pub fn optional<T>(mut self, choice: Choice<T>, field: fn(&R) -> Option<&T>) -> Self
    where
        T: PartialEq + 'a,
    {
        if !choice.is_all() {
            self.predicates
                .push(Box::new(move |r| choice.matches_opt(field(r))));
        }
        self
    }

    fn matches_text(&self, record: &R) -> bool {
        if self.needle.is_empty() {
            return true;
        }

        self.fields
            .iter()
            .any(|field| field(record).to_lowercase().contains(&self.needle))
    }

    pub fn matches(&self, record: &R) -> bool {
        self.matches_text(record) && self.predicates.iter().all(|p| p(record))
    }

    /// Matching records in input order.
    pub fn apply<'r>(&self, records: &'r [R]) -> Vec<&'r R> {
        records.iter().filter(|r| self.matches(r)).collect()
    }

    /// Whether anything narrows the result.
    pub fn is_active(&self) -> bool {
        !self.needle.is_empty() || !self.predicates.is_empty()
    }
}

pub mod fields {
    use super::*;

    pub fn title(r: &Report) -> &str {
        &r.title
    }

    pub fn category(r: &Report) -> &str {
        r.category.label()
    }

    pub fn location(r: &Report) -> &str {
        &r.location
    }

    pub fn reporter_name(r: &Report) -> &str {
        &r.reporter.name
    }

    pub fn reporter_email(r: &Report) -> &str {
        r.reporter.email.as_deref().unwrap_or("")
    }

    pub fn department_name(d: &Department) -> &str {
        &d.name
    }

    pub fn department_head(d: &Department) -> &str {
        &d.head.name
    }

    pub fn department_location(d: &Department) -> &str {
        &d.location
    }
}

pub const MY_REPORTS: &[TextField<Report>] = &[fields::title, fields::category, fields::location];

pub const DASHBOARD: &[TextField<Report>] = &[
    fields::title,
    fields::category,
    fields::location,
    fields::reporter_email,
];

pub const COMPLAINTS: &[TextField<Report>] =
    &[fields::title, fields::reporter_name, fields::location];

pub const DEPARTMENTS: &[TextField<Department>] = &[
    fields::department_name,
    fields::department_head,
    fields::department_location,
];
