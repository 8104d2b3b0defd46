//! Data models for the roll aggregator.
//!
//! The report is a dual-indexed structure: every class is reachable both
//! from the flat class index and from its year. Class records live once in
//! an arena; both indices hold arena slots, so setting a count through
//! [`ClassReport::set_count`] is visible from either side.

use crate::error::DetailError;
use crate::validate::is_valid_class_name;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

/// A validated class name: two ASCII digits followed by one uppercase letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClassName(String);

impl ClassName {
    /// Parse a token, returning `None` if it is not a well-formed class name.
    pub fn parse(token: &str) -> Option<Self> {
        is_valid_class_name(token).then(|| Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The year this class belongs to (its first two characters).
    pub fn year(&self) -> YearKey {
        YearKey(self.0[..2].to_string())
    }
}

impl Borrow<str> for ClassName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClassName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Year group key, e.g. `01`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct YearKey(String);

impl YearKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for YearKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for YearKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One class and its student count, once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassRecord {
    pub name: ClassName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
}

/// A year group: ordered member list plus arena slots of its members.
#[derive(Debug, Clone)]
struct YearRecord {
    name: YearKey,
    class_list: Vec<ClassName>,
    members: HashMap<ClassName, usize>,
}

/// The aggregate built by one run.
#[derive(Debug, Clone, Default)]
pub struct ClassReport {
    /// Arena of class records, in order of first appearance in the list.
    records: Vec<ClassRecord>,
    classes: HashMap<ClassName, usize>,
    years: HashMap<YearKey, YearRecord>,
    years_list: Vec<YearKey>,
}

impl ClassReport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class with no count yet, creating its year on first sight.
    ///
    /// Returns the name back as the error if the class is already present.
    pub fn insert_class(&mut self, name: ClassName) -> Result<(), ClassName> {
        if self.classes.contains_key(&name) {
            return Err(name);
        }

        let slot = self.records.len();
        self.records.push(ClassRecord {
            name: name.clone(),
            count: None,
        });
        self.classes.insert(name.clone(), slot);

        let key = name.year();
        let year = self.years.entry(key.clone()).or_insert_with(|| {
            self.years_list.push(key.clone());
            YearRecord {
                name: key,
                class_list: Vec::new(),
                members: HashMap::new(),
            }
        });
        year.class_list.push(name.clone());
        year.members.insert(name, slot);

        Ok(())
    }

    /// Set the count of a class. Returns false if the class is unknown.
    pub fn set_count(&mut self, name: &str, count: u64) -> bool {
        match self.classes.get(name) {
            Some(&slot) => {
                self.records[slot].count = Some(count);
                true
            }
            None => false,
        }
    }

    /// Look up a class through the flat index.
    #[allow(dead_code)] // Lookup API, exercised by tests
    pub fn class(&self, name: &str) -> Option<&ClassRecord> {
        self.classes.get(name).map(|&slot| &self.records[slot])
    }

    /// Class names in order of first appearance.
    pub fn class_names(&self) -> impl Iterator<Item = &ClassName> {
        self.records.iter().map(|r| &r.name)
    }

    /// Class records in order of first appearance.
    #[allow(dead_code)] // Lookup API, exercised by tests
    pub fn classes(&self) -> impl Iterator<Item = &ClassRecord> {
        self.records.iter()
    }

    /// Look up a year through the grouped index.
    pub fn year(&self, key: &str) -> Option<YearView<'_>> {
        self.years.get(key).map(|year| YearView { report: self, year })
    }

    /// Years in order of first appearance.
    pub fn years(&self) -> impl Iterator<Item = YearView<'_>> {
        self.years_list
            .iter()
            .filter_map(move |key| self.year(key.as_str()))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn year_count(&self) -> usize {
        self.years_list.len()
    }

    /// Number of classes whose count has been filled in.
    pub fn counted(&self) -> usize {
        self.records.iter().filter(|r| r.count.is_some()).count()
    }
}

/// Borrowed view of one year, resolving members through the report's arena.
#[derive(Debug, Clone, Copy)]
pub struct YearView<'a> {
    report: &'a ClassReport,
    year: &'a YearRecord,
}

impl<'a> YearView<'a> {
    pub fn name(&self) -> &'a YearKey {
        &self.year.name
    }

    /// Member class names in order of first appearance.
    pub fn class_list(&self) -> &'a [ClassName] {
        &self.year.class_list
    }

    /// Look up a member class; this is the same record as the flat index holds.
    pub fn member(&self, name: &str) -> Option<&'a ClassRecord> {
        self.year
            .members
            .get(name)
            .map(|&slot| &self.report.records[slot])
    }

    /// Member records in order of first appearance.
    pub fn members(&self) -> impl Iterator<Item = &'a ClassRecord> + 'a {
        let view = *self;
        let year = self.year;
        year.class_list
            .iter()
            .filter_map(move |name| view.member(name.as_str()))
    }

    /// Sum of the counts fetched so far for this year.
    pub fn total(&self) -> u64 {
        self.members().filter_map(|r| r.count).sum()
    }
}

struct OrderedClasses<'a>(Vec<&'a ClassRecord>);

impl Serialize for OrderedClasses<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|r| (&r.name, *r)))
    }
}

impl Serialize for YearView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Year", 3)?;
        state.serialize_field("name", self.name())?;
        state.serialize_field("classList", self.class_list())?;
        state.serialize_field("classes", &OrderedClasses(self.members().collect()))?;
        state.end()
    }
}

struct OrderedYears<'a>(&'a ClassReport);

impl Serialize for OrderedYears<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.years().map(|y| (y.name(), y)))
    }
}

/// Serializes in the `years / classes / yearsList / classesList` layout,
/// with every map in insertion order.
impl Serialize for ClassReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ClassReport", 4)?;
        state.serialize_field("years", &OrderedYears(self))?;
        state.serialize_field("classes", &OrderedClasses(self.records.iter().collect()))?;
        state.serialize_field("yearsList", &self.years_list)?;
        state.serialize_field("classesList", &self.class_names().collect::<Vec<_>>())?;
        state.end()
    }
}

/// Result of a run that reached `Complete`.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub report: ClassReport,
    /// Per-class failures, in class order. Their counts are left unset.
    pub failures: Vec<DetailError>,
}

impl RunOutcome {
    /// True if at least one class is missing its count.
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Context of a run, rendered alongside the report.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub source_url: String,
    pub generated_at: DateTime<Utc>,
    pub concurrency: usize,
    pub duration_seconds: f64,
}
