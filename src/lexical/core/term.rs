//! Index terms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `(field, token)` pair: the key of the inverted index.
///
/// Terms order by field first, then token text (byte-wise), which is the
/// order of the on-disk term dictionary.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Term {
    field: String,
    text: String,
}

impl Term {
    pub fn new(field: impl Into<String>, text: impl Into<String>) -> Self {
        Term {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Term for an integer value, as indexed by integer fields.
    pub fn integer(field: impl Into<String>, value: i64) -> Self {
        Term::new(field, value.to_string())
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Approximate heap footprint, for flush accounting.
    pub fn heap_size(&self) -> usize {
        self.field.capacity() + self.text.capacity()
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering_is_field_then_text() {
        let mut terms = vec![
            Term::new("name", "test"),
            Term::integer("age", 26),
            Term::new("name", "kemp"),
        ];
        terms.sort();
        let rendered: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
        assert_eq!(rendered, vec!["age:26", "name:kemp", "name:test"]);
    }
}
