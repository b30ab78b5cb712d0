//! Query trees.
//!
//! A [`Query`] is built programmatically; there is no query-string parser.
//! Term and phrase queries match index terms exactly, so their text must
//! already be in analyzed form (lowercased by the standard analyzer). Use
//! [`builder::QueryBuilder`] to build them from raw text instead.
//!
//! ```
//! use quarry::lexical::query::Query;
//!
//! let query = Query::and(vec![
//!     Query::phrase("name", ["kemp", "test"]),
//!     Query::not(Query::term("age", "30")),
//! ]);
//! assert!(query.validate().is_ok());
//! assert_eq!(query.to_string(), r#"(+name:"kemp test" -age:30)"#);
//! ```

pub mod builder;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::lexical::core::term::Term;

/// A boolean/phrase/term query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// Documents containing the term.
    Term(Term),

    /// Documents where `terms` occur at consecutive positions of `field`.
    Phrase { field: String, terms: Vec<String> },

    /// Documents matching every child. Scores add up.
    And(Vec<Query>),

    /// Documents matching at least one child. Scores of matching children add up.
    Or(Vec<Query>),

    /// Documents of the segment not matching the child. Contributes no score.
    Not(Box<Query>),
}

impl Query {
    pub fn term(field: impl Into<String>, text: impl Into<String>) -> Self {
        Query::Term(Term::new(field, text))
    }

    pub fn phrase<I, S>(field: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Phrase {
            field: field.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }

    pub fn and(children: Vec<Query>) -> Self {
        Query::And(children)
    }

    pub fn or(children: Vec<Query>) -> Self {
        Query::Or(children)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(child: Query) -> Self {
        Query::Not(Box::new(child))
    }

    /// Check the tree is well-formed.
    ///
    /// Fails with `QuerySyntax` for an empty term field or text, a phrase
    /// without terms, or an `And`/`Or` without children.
    pub fn validate(&self) -> Result<()> {
        match self {
            Query::Term(term) => {
                if term.field().is_empty() {
                    return Err(empty_error("term query field"));
                }
                if term.text().is_empty() {
                    return Err(empty_error(format!(
                        "term query text on field '{}'",
                        term.field()
                    )));
                }
                Ok(())
            }
            Query::Phrase { field, terms } => {
                if field.is_empty() {
                    return Err(empty_error("phrase query field"));
                }
                if terms.is_empty() {
                    return Err(QuarryError::query_syntax(format!(
                        "phrase query on field '{field}' has no terms"
                    )));
                }
                if terms.iter().any(String::is_empty) {
                    return Err(empty_error(format!(
                        "phrase term on field '{field}'"
                    )));
                }
                Ok(())
            }
            Query::And(children) | Query::Or(children) => {
                if children.is_empty() {
                    return Err(QuarryError::query_syntax(format!(
                        "{} query has no children",
                        self.kind()
                    )));
                }
                children.iter().try_for_each(Query::validate)
            }
            Query::Not(child) => child.validate(),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Query::Term(_) => "term",
            Query::Phrase { .. } => "phrase",
            Query::And(_) => "and",
            Query::Or(_) => "or",
            Query::Not(_) => "not",
        }
    }

    /// Every term the query reads postings of, with repeats.
    pub fn terms(&self) -> Vec<Term> {
        let mut terms = Vec::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms(&self, out: &mut Vec<Term>) {
        match self {
            Query::Term(term) => out.push(term.clone()),
            Query::Phrase { field, terms } => {
                out.extend(terms.iter().map(|text| Term::new(field.clone(), text.clone())))
            }
            Query::And(children) | Query::Or(children) => {
                children.iter().for_each(|child| child.collect_terms(out))
            }
            Query::Not(child) => child.collect_terms(out),
        }
    }

    /// Fields the query scores against.
    pub fn fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self.terms().into_iter().map(|t| t.field().to_string()).collect();
        fields.sort();
        fields.dedup();
        fields
    }
}

fn empty_error(what: impl fmt::Display) -> QuarryError {
    QuarryError::query_syntax(format!("{what} must not be empty"))
}

impl From<Term> for Query {
    fn from(term: Term) -> Self {
        Query::Term(term)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Term(term) => write!(f, "{term}"),
            Query::Phrase { field, terms } => write!(f, "{field}:\"{}\"", terms.join(" ")),
            Query::And(children) => {
                let parts: Vec<String> = children
                    .iter()
                    .map(|child| match child {
                        Query::Not(inner) => format!("-{inner}"),
                        other => format!("+{other}"),
                    })
                    .collect();
                write!(f, "({})", parts.join(" "))
            }
            Query::Or(children) => {
                let parts: Vec<String> = children.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" "))
            }
            Query::Not(child) => write!(f, "NOT {child}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_syntax_error(query: Query) {
        match query.validate() {
            Err(QuarryError::QuerySyntax { .. }) => {}
            other => panic!("expected query syntax error for {query:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_ill_formed_queries() {
        assert_syntax_error(Query::phrase("name", Vec::<String>::new()));
        assert_syntax_error(Query::term("name", ""));
        assert_syntax_error(Query::term("", "kemp"));
        assert_syntax_error(Query::and(vec![]));
        assert_syntax_error(Query::or(vec![]));
        assert_syntax_error(Query::not(Query::or(vec![])));
        assert_syntax_error(Query::and(vec![
            Query::term("name", "kemp"),
            Query::phrase("name", ["kemp", ""]),
        ]));
    }

    #[test]
    fn test_terms_and_fields() {
        let query = Query::or(vec![
            Query::phrase("name", ["kemp", "test"]),
            Query::not(Query::term("age", "26")),
        ]);
        let terms: Vec<String> = query.terms().iter().map(|t| t.to_string()).collect();
        assert_eq!(terms, vec!["name:kemp", "name:test", "age:26"]);
        assert_eq!(query.fields(), vec!["age", "name"]);
    }

    #[test]
    fn test_display() {
        let query = Query::or(vec![Query::term("a", "x"), Query::not(Query::term("b", "y"))]);
        assert_eq!(query.to_string(), "(a:x NOT b:y)");
    }
}
