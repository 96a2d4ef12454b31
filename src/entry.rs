//! Comment entries and their line-oriented wire form.
//!
//! An entry line is `id;tests;author;comment`. The comment is the last field
//! and may itself contain `;`, so parsing splits off the first three fields
//! and keeps the remainder intact.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone};

use crate::codec;
use crate::dates::short_timestamp;
use crate::error::GridnotesError;

/// Conversion to and from the text embedded in an entry line.
pub trait Serializable: Sized {
    fn serialize(&self) -> String;
    fn deserialize(s: &str) -> Result<Self, GridnotesError>;
}

/// Opaque entry identifier.
///
/// New ids are random and non-zero. Ids read back from a log may be any
/// decimal `u64`, which covers logs whose ids are millisecond timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

impl EntryId {
    pub fn generate() -> Self {
        loop {
            let id: u64 = rand::random();
            if id != 0 {
                return Self(id);
            }
        }
    }

    pub fn from_u64(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Prefix identifying this entry's line in the log.
    pub fn line_prefix(&self) -> String {
        format!("{};", self.0)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = GridnotesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| GridnotesError::MalformedEntry(format!("bad id {s:?}")))
    }
}

/// Who wrote a comment, and when (short local timestamp).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub name: String,
    pub time: Option<String>,
}

impl Author {
    /// Validated author without a timestamp.
    pub fn new(name: &str) -> Result<Self, GridnotesError> {
        validate_author(name)?;
        Ok(Self {
            name: name.to_string(),
            time: None,
        })
    }

    /// Validated author stamped with `at`.
    pub fn stamped<Tz: TimeZone>(name: &str, at: &DateTime<Tz>) -> Result<Self, GridnotesError>
    where
        Tz::Offset: fmt::Display,
    {
        let mut author = Self::new(name)?;
        author.time = Some(short_timestamp(at));
        Ok(author)
    }

    /// Stamped with the current local time.
    pub fn now(name: &str) -> Result<Self, GridnotesError> {
        Self::stamped(name, &chrono::Local::now())
    }
}

/// An author name must be non-empty and must not contain the characters the
/// author blob and the entry line use as separators.
pub fn validate_author(name: &str) -> Result<(), GridnotesError> {
    if name.trim().is_empty() {
        return Err(GridnotesError::InvalidAuthor("name is empty".to_string()));
    }
    if let Some(bad) = name.chars().find(|c| matches!(c, ';' | ',' | '\n' | '\r')) {
        return Err(GridnotesError::InvalidAuthor(format!(
            "name contains {bad:?}"
        )));
    }
    Ok(())
}

impl Serializable for Author {
    fn serialize(&self) -> String {
        match &self.time {
            Some(time) => format!("{},{time}", codec::encode(&self.name)),
            None => codec::encode(&self.name),
        }
    }

    fn deserialize(s: &str) -> Result<Self, GridnotesError> {
        let mut parts = s.split(',');
        let name = codec::decode(parts.next().unwrap_or_default());
        let time = parts.next().map(str::to_string);
        Ok(Self { name, time })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comment {
    pub text: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Serializable for Comment {
    fn serialize(&self) -> String {
        codec::encode(&self.text)
    }

    fn deserialize(s: &str) -> Result<Self, GridnotesError> {
        Ok(Self {
            text: codec::decode(s),
        })
    }
}

/// One test, identified across versions by its composite key
/// `version[/suffix]/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TestReference {
    pub composite_key: String,
    pub version_path: String,
    pub name: String,
}

impl TestReference {
    /// Build from the report's raw row key and the (possibly multi-line) test
    /// name shown in the row header. The name's first occurrence inside the
    /// raw key splits it into version and version suffix.
    pub fn from_raw(raw_key: &str, raw_name: &str) -> Self {
        let name: String = raw_name.chars().filter(|c| *c != '\n').collect();
        let version_path = if !name.is_empty() && raw_key.contains(name.as_str()) {
            raw_key.replacen(name.as_str(), "/", 1)
        } else {
            raw_key.to_string()
        };
        Self {
            composite_key: format!("{version_path}/{name}"),
            version_path,
            name,
        }
    }

    /// Parse a composite key. Keys without a `/` or with an empty name are
    /// rejected.
    pub fn parse(key: &str) -> Option<Self> {
        let (version_path, name) = key.rsplit_once('/')?;
        if name.is_empty() {
            return None;
        }
        Some(Self {
            composite_key: key.to_string(),
            version_path: version_path.to_string(),
            name: name.to_string(),
        })
    }

    /// The key the report uses to tag this test's row.
    pub fn raw_key(&self) -> String {
        match self.version_path.split_once('/') {
            Some((version, suffix)) => format!("{version}{}{suffix}", self.name),
            None => format!("{}{}", self.version_path, self.name),
        }
    }

    /// `version` or `version.suffix`, as shown when grouping tests.
    pub fn display_version(&self) -> String {
        match self.version_path.split_once('/') {
            Some((version, "")) => version.to_string(),
            Some((version, suffix)) => format!("{version}.{suffix}"),
            None => self.version_path.clone(),
        }
    }
}

/// Tests annotated by an entry, grouped by run date. A date mapped to an
/// empty list marks a general comment on that date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tests {
    by_date: BTreeMap<String, Vec<TestReference>>,
}

impl Tests {
    pub fn new() -> Self {
        Self::default()
    }

    /// A general comment on `date`.
    pub fn general(date: &str) -> Self {
        let mut tests = Self::new();
        tests.by_date.insert(date.to_string(), Vec::new());
        tests
    }

    pub fn add(&mut self, test: TestReference, date: &str) {
        self.by_date.entry(date.to_string()).or_default().push(test);
    }

    pub fn get(&self, date: &str) -> Option<&[TestReference]> {
        self.by_date.get(date).map(Vec::as_slice)
    }

    pub fn dates(&self) -> impl Iterator<Item = &str> {
        self.by_date.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TestReference])> {
        self.by_date.iter().map(|(d, t)| (d.as_str(), t.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }
}

impl Serializable for Tests {
    fn serialize(&self) -> String {
        let blob = self
            .by_date
            .iter()
            .map(|(date, tests)| {
                let keys: Vec<&str> = tests.iter().map(|t| t.composite_key.as_str()).collect();
                format!("{date}={}", keys.join(","))
            })
            .collect::<Vec<_>>()
            .join("&");
        codec::encode(&blob)
    }

    fn deserialize(s: &str) -> Result<Self, GridnotesError> {
        let blob = codec::decode(s);
        let mut tests = Self::new();
        for segment in blob.split('&').filter(|seg| !seg.is_empty()) {
            let (date, keys) = segment.split_once('=').unwrap_or((segment, ""));
            let refs = tests.by_date.entry(date.to_string()).or_default();
            refs.extend(keys.split(',').filter_map(TestReference::parse));
        }
        Ok(tests)
    }
}

/// A persisted comment with its author and the (date, test) pairs it
/// annotates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentEntry {
    pub id: EntryId,
    pub author: Author,
    pub comment: Comment,
    pub tests: Tests,
}

impl CommentEntry {
    /// New entry with a freshly generated id.
    pub fn new(comment: Comment, author: Author, tests: Tests) -> Self {
        Self {
            id: EntryId::generate(),
            author,
            comment,
            tests,
        }
    }
}

impl Serializable for CommentEntry {
    fn serialize(&self) -> String {
        format!(
            "{};{};{};{}",
            self.id,
            self.tests.serialize(),
            self.author.serialize(),
            self.comment.serialize()
        )
    }

    fn deserialize(s: &str) -> Result<Self, GridnotesError> {
        let line = s.trim_end_matches(['\r', '\n']);
        let mut fields = line.splitn(4, ';');
        let id: EntryId = fields.next().unwrap_or_default().parse()?;
        let tests = fields
            .next()
            .ok_or_else(|| GridnotesError::MalformedEntry(format!("no tests field in {line:?}")))?;
        let author = fields.next().unwrap_or_default();
        let comment = fields.next().unwrap_or_default();
        Ok(Self {
            id,
            tests: Tests::deserialize(tests)?,
            author: Author::deserialize(author)?,
            comment: Comment::deserialize(comment)?,
        })
    }
}
