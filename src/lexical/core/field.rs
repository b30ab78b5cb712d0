//! Field value types and field options for documents.
//!
//! This module defines:
//! - [`Field`] - A named value together with its indexing options
//! - [`FieldValue`] - The value stored in a field (Text, Integer, Float)
//! - [`FieldOption`] - The `{stored, indexed, tokenized}` flags
//!
//! The convenience constructors mirror the common field kinds:
//!
//! | constructor        | stored | indexed | tokenized |
//! |--------------------|--------|---------|-----------|
//! | [`Field::text`]    | yes    | yes     | yes       |
//! | [`Field::string`]  | yes    | yes     | no        |
//! | [`Field::integer`] | yes    | yes     | no        |
//! | [`Field::float`]   | yes    | yes     | no        |
//! | [`Field::point`]   | no     | yes     | no        |
//! | [`Field::stored`]  | yes    | no      | no        |
//!
//! ```
//! use quarry::lexical::core::field::{Field, FieldValue};
//!
//! let field = Field::text("name", "Kemp test");
//! assert_eq!(field.value.as_text(), Some("Kemp test"));
//! assert!(field.option.tokenized);
//!
//! let age = Field::integer("age", 26);
//! assert_eq!(age.value.term_text(), "26");
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};

/// Represents a value for a field in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
}

impl FieldValue {
    /// Return the text if this is a text value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Return the integer if this is an integer value.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Return the value as a float if it is numeric.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Convert to numeric string representation.
    pub fn as_numeric(&self) -> Option<String> {
        match self {
            FieldValue::Integer(i) => Some(i.to_string()),
            FieldValue::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// The exact term text this value indexes as when it is not tokenized.
    pub fn term_text(&self) -> String {
        match self {
            FieldValue::Text(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldValue::Integer(_) | FieldValue::Float(_))
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(i) => write!(f, "{i}"),
            FieldValue::Float(v) => write!(f, "{v}"),
        }
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

/// Indexing and storage flags of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    /// Whether to keep the original value for retrieval.
    #[serde(default = "default_true")]
    pub stored: bool,

    /// Whether to make the field searchable.
    #[serde(default = "default_true")]
    pub indexed: bool,

    /// Whether to run text through the analyzer. Ignored for numeric values,
    /// which always index as a single exact term.
    #[serde(default = "default_true")]
    pub tokenized: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FieldOption {
    fn default() -> Self {
        FieldOption::text()
    }
}

impl FieldOption {
    /// Stored, indexed and tokenized.
    pub const fn text() -> Self {
        FieldOption {
            stored: true,
            indexed: true,
            tokenized: true,
        }
    }

    /// Stored and indexed as one exact term.
    pub const fn string() -> Self {
        FieldOption {
            stored: true,
            indexed: true,
            tokenized: false,
        }
    }

    /// Indexed as one exact term, not stored.
    pub const fn point() -> Self {
        FieldOption {
            stored: false,
            indexed: true,
            tokenized: false,
        }
    }

    /// Stored only.
    pub const fn stored_only() -> Self {
        FieldOption {
            stored: true,
            indexed: false,
            tokenized: false,
        }
    }
}

/// A named field: value plus indexing options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// The field name.
    pub name: String,

    /// The field value.
    pub value: FieldValue,

    /// The field indexing options.
    pub option: FieldOption,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<FieldValue>, option: FieldOption) -> Self {
        Field {
            name: name.into(),
            value: value.into(),
            option,
        }
    }

    /// Full-text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field::new(name, FieldValue::Text(value.into()), FieldOption::text())
    }

    /// Exact-match text field (identifiers, tags).
    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Field::new(name, FieldValue::Text(value.into()), FieldOption::string())
    }

    /// Stored and indexed integer.
    pub fn integer(name: impl Into<String>, value: i64) -> Self {
        Field::new(name, FieldValue::Integer(value), FieldOption::string())
    }

    /// Stored and indexed float.
    pub fn float(name: impl Into<String>, value: f64) -> Self {
        Field::new(name, FieldValue::Float(value), FieldOption::string())
    }

    /// Indexed-only value (searchable, not retrievable).
    pub fn point(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Field::new(name, value, FieldOption::point())
    }

    /// Stored-only value (retrievable, not searchable).
    pub fn stored(name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Field::new(name, value, FieldOption::stored_only())
    }

    /// Whether the value goes through the analyzer when indexed.
    pub fn is_analyzed(&self) -> bool {
        self.option.indexed && self.option.tokenized && !self.value.is_numeric()
    }

    /// Check the field is well-formed.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(QuarryError::input("field name must not be empty"));
        }
        if !self.option.stored && !self.option.indexed {
            return Err(QuarryError::input(format!(
                "field '{}' is neither stored nor indexed",
                self.name
            )));
        }
        if let FieldValue::Float(value) = self.value {
            if !value.is_finite() {
                return Err(QuarryError::input(format!(
                    "field '{}' has non-finite float value {value}",
                    self.name
                )));
            }
        }
        Ok(())
    }
}
