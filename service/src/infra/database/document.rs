//! [`Document`] store query definitions.

use std::fmt;

use derive_more::Display;
#[cfg(feature = "postgres")]
use postgres_types::ToSql;
use regex::{Regex, RegexBuilder};

/// Document kept in a document store.
pub type Document = serde_json::Value;

/// Path to a (possibly nested) field of a [`Document`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Path(&'static [&'static str]);

impl Path {
    /// Creates a new [`Path`] out of the provided field names.
    #[must_use]
    pub const fn new(segments: &'static [&'static str]) -> Self {
        Self(segments)
    }

    /// Returns the field names of this [`Path`].
    #[must_use]
    pub const fn segments(self) -> &'static [&'static str] {
        self.0
    }

    /// Looks up the value this [`Path`] points to in the provided
    /// [`Document`].
    #[must_use]
    pub fn lookup(self, document: &Document) -> Option<&Document> {
        self.0.iter().try_fold(document, |value, field| value.get(field))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Case-insensitive regular expression matching a text field literally.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[cfg_attr(feature = "postgres", derive(ToSql), postgres(transparent))]
pub struct Pattern(String);

impl Pattern {
    /// Creates a new [`Pattern`] matching the whole field equal to `text`.
    #[must_use]
    pub fn exact(text: &str) -> Self {
        Self(format!("^{}$", regex::escape(text)))
    }

    /// Creates a new [`Pattern`] matching a field containing `text`.
    #[must_use]
    pub fn containing(text: &str) -> Self {
        Self(regex::escape(text))
    }

    /// Compiles this [`Pattern`] into a [`Regex`].
    ///
    /// # Errors
    ///
    /// If the compiled [`Regex`] exceeds its size limits.
    pub fn to_regex(&self) -> Result<Regex, regex::Error> {
        RegexBuilder::new(&self.0).case_insensitive(true).build()
    }
}

/// Condition a [`Document`] field must satisfy.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Condition {
    /// Text field matches the [`Pattern`].
    Matches(Pattern),

    /// Array field contains all of the values.
    ContainsAll(Vec<String>),

    /// Field is present, not `null` and not an empty string.
    NonEmpty,
}

/// Filter selecting [`Document`]s satisfying all of its [`Condition`]s.
#[derive(Clone, Debug, Default)]
pub struct Filter {
    /// [`Condition`]s of this [`Filter`] on their field [`Path`]s.
    conditions: Vec<(Path, Condition)>,
}

impl Filter {
    /// Adds the provided [`Condition`] on the `path` to this [`Filter`].
    #[must_use]
    pub fn with(mut self, path: Path, condition: Condition) -> Self {
        self.conditions.push((path, condition));
        self
    }

    /// Returns [`Condition`]s of this [`Filter`].
    #[must_use]
    pub fn conditions(&self) -> &[(Path, Condition)] {
        &self.conditions
    }
}

#[cfg(test)]
mod spec {
    use serde_json::json;

    use super::{Path, Pattern};

    #[test]
    fn looks_up_nested_fields() {
        let doc = json!({ "location": { "city": "Pune" } });

        assert_eq!(
            Path::new(&["location", "city"]).lookup(&doc),
            Some(&json!("Pune")),
        );
        assert_eq!(Path::new(&["location", "locality"]).lookup(&doc), None);
        assert_eq!(Path::new(&["location", "city", "x"]).lookup(&doc), None);
        assert_eq!(Path::new(&["location", "city"]).to_string(), "location.city");
    }

    #[test]
    fn exact_pattern_matches_whole_text_ignoring_case() {
        let re = Pattern::exact("Pune").to_regex().unwrap();

        assert!(re.is_match("pune"));
        assert!(re.is_match("PUNE"));
        assert!(!re.is_match("Pune East"));
        assert!(!re.is_match("Pun"));
    }

    #[test]
    fn containing_pattern_matches_substring_ignoring_case() {
        let re = Pattern::containing("Pun").to_regex().unwrap();

        assert!(re.is_match("Pune"));
        assert!(re.is_match("north PUNE"));
        assert!(!re.is_match("Mumbai"));
    }

    #[test]
    fn patterns_match_literally() {
        let re = Pattern::containing("a.b (c)").to_regex().unwrap();

        assert!(re.is_match("xa.b (c)y"));
        assert!(!re.is_match("axb c"));
    }
}
