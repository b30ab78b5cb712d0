//! Documents: ordered collections of fields.
//!
//! [`Document`] is what callers index; [`StoredDocument`] is what they get back
//! (the stored fields only, in their original order).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{QuarryError, Result};
use crate::lexical::core::field::{Field, FieldOption, FieldValue};

/// A document to be indexed.
///
/// Field order is preserved, and a name may repeat (multi-valued fields).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    fields: Vec<Field>,
}

impl Document {
    /// Create a new empty document.
    pub fn new() -> Self {
        Document { fields: Vec::new() }
    }

    pub fn builder() -> DocumentBuilder {
        DocumentBuilder::new()
    }

    /// Append a field.
    pub fn add_field(&mut self, field: Field) {
        self.fields.push(field);
    }

    /// Builder-style append.
    pub fn with_field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    /// Add a full-text field.
    pub fn add_text(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_field(Field::text(name, text))
    }

    /// Add an exact-match text field.
    pub fn add_string(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_field(Field::string(name, text))
    }

    /// Add an integer field.
    pub fn add_integer(self, name: impl Into<String>, value: i64) -> Self {
        self.with_field(Field::integer(name, value))
    }

    /// Add a float field.
    pub fn add_float(self, name: impl Into<String>, value: f64) -> Self {
        self.with_field(Field::float(name, value))
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// First field with the given name.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Check the document can be indexed: at least one field, every field valid.
    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(QuarryError::input("document has no fields"));
        }
        for field in &self.fields {
            field.validate()?;
        }
        Ok(())
    }

    /// The stored part of this document.
    pub fn to_stored(&self) -> StoredDocument {
        StoredDocument {
            fields: self
                .fields
                .iter()
                .filter(|f| f.option.stored)
                .map(|f| (f.name.clone(), f.value.clone()))
                .collect(),
        }
    }
}

impl FromIterator<Field> for Document {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Document {
            fields: iter.into_iter().collect(),
        }
    }
}

/// A builder for constructing documents in a fluent manner.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    document: Document,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        DocumentBuilder {
            document: Document::new(),
        }
    }

    pub fn add_text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.document.add_field(Field::text(name, value));
        self
    }

    pub fn add_string(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.document.add_field(Field::string(name, value));
        self
    }

    pub fn add_integer(mut self, name: impl Into<String>, value: i64) -> Self {
        self.document.add_field(Field::integer(name, value));
        self
    }

    pub fn add_float(mut self, name: impl Into<String>, value: f64) -> Self {
        self.document.add_field(Field::float(name, value));
        self
    }

    /// Add a field with explicit options.
    pub fn add(
        mut self,
        name: impl Into<String>,
        value: impl Into<FieldValue>,
        option: FieldOption,
    ) -> Self {
        self.document.add_field(Field::new(name, value, option));
        self
    }

    pub fn add_field(mut self, field: Field) -> Self {
        self.document.add_field(field);
        self
    }

    pub fn build(self) -> Document {
        self.document
    }
}

/// The stored fields of an indexed document, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    fields: Vec<(String, FieldValue)>,
}

impl StoredDocument {
    pub fn new(fields: Vec<(String, FieldValue)>) -> Self {
        StoredDocument { fields }
    }

    /// First value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    /// All values stored under `name`.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FieldValue> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_text)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Flatten into `name -> value` strings; a repeated name keeps its first value.
    pub fn to_string_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            map.entry(name.clone()).or_insert_with(|| value.to_string());
        }
        map
    }

    pub fn into_fields(self) -> Vec<(String, FieldValue)> {
        self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let doc = Document::builder()
            .add_text("name", "Kemp test")
            .add_integer("age", 26)
            .add_field(Field::point("rank", 3))
            .build();

        let names: Vec<&str> = doc.fields().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["name", "age", "rank"]);
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn test_to_stored_skips_unstored_fields() {
        let doc = Document::new()
            .add_text("name", "Kemp test")
            .with_field(Field::point("age", 26))
            .with_field(Field::stored("age", 26));

        let stored = doc.to_stored();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored.get_text("name"), Some("Kemp test"));
        assert_eq!(stored.get("age"), Some(&FieldValue::Integer(26)));

        let map = stored.to_string_map();
        assert_eq!(map.get("age").map(String::as_str), Some("26"));
    }

    #[test]
    fn test_empty_document_is_invalid() {
        let err = Document::new().validate().unwrap_err();
        assert!(matches!(err, QuarryError::Input { .. }));
    }

    #[test]
    fn test_multi_valued_fields() {
        let stored = Document::new()
            .add_string("tag", "a")
            .add_string("tag", "b")
            .to_stored();
        let tags: Vec<String> = stored.get_all("tag").map(|v| v.to_string()).collect();
        assert_eq!(tags, vec!["a", "b"]);
    }
}
