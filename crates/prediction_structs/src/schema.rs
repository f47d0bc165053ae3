use core::str::FromStr;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Declared type of a model input field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FieldType {
    Number,
    Image,
}

impl FieldType {
    /// Human readable description of what a valid value looks like.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Number => "a finite number",
            Self::Image => "a non-empty image payload",
        }
    }
}

impl FromStr for FieldType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "number" => Ok(Self::Number),
            "image" => Ok(Self::Image),
            _ => Err(anyhow::anyhow!("Invalid field type: {s}")),
        }
    }
}

/// A single named, typed field of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
}

impl FieldSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// What kind of input a schema describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum SchemaKind {
    /// Only `number` fields, assembled into a feature row.
    Tabular,
    /// Exactly one `image` field.
    Image,
}

/// Ordered list of fields a model requires.
///
/// Field order is significant: tabular models receive their feature row in
/// exactly this order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    #[serde(skip)]
    kind: SchemaKind,
}

impl Schema {
    /// Builds a schema from its fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the schema is empty, repeats a field name, or mixes
    /// `number` and `image` fields.
    pub fn new(fields: Vec<FieldSpec>) -> anyhow::Result<Self> {
        if fields.is_empty() {
            anyhow::bail!("Schema must declare at least one field");
        }

        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                anyhow::bail!("Schema field names must not be empty");
            }
            if !seen.insert(field.name.as_str()) {
                anyhow::bail!("Duplicate schema field: {}", field.name);
            }
        }

        let image_fields = fields
            .iter()
            .filter(|f| f.field_type == FieldType::Image)
            .count();

        let kind = match (image_fields, fields.len()) {
            (0, _) => SchemaKind::Tabular,
            (1, 1) => SchemaKind::Image,
            _ => anyhow::bail!("Image schemas must declare exactly one image field and nothing else"),
        };

        Ok(Self { fields, kind })
    }

    /// Builds a tabular schema of `number` fields in the given order.
    ///
    /// # Errors
    ///
    /// See [`Schema::new`].
    pub fn tabular<I, S>(names: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            names
                .into_iter()
                .map(|name| FieldSpec::new(name, FieldType::Number))
                .collect(),
        )
    }

    /// Builds a single-field image schema.
    ///
    /// # Errors
    ///
    /// See [`Schema::new`].
    pub fn image(name: impl Into<String>) -> anyhow::Result<Self> {
        Self::new(vec![FieldSpec::new(name, FieldType::Image)])
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    #[must_use]
    pub const fn kind(&self) -> SchemaKind {
        self.kind
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field in the schema.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Field names in schema order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabular_schema_keeps_order() {
        let schema = Schema::tabular(["living_area", "bathrooms", "bedrooms"]).unwrap();
        assert_eq!(schema.kind(), SchemaKind::Tabular);
        assert_eq!(
            schema.names().collect::<Vec<_>>(),
            ["living_area", "bathrooms", "bedrooms"]
        );
        assert_eq!(schema.position("bedrooms"), Some(2));
        assert_eq!(schema.position("latitude"), None);
    }

    #[test]
    fn test_image_schema() {
        let schema = Schema::image("image").unwrap();
        assert_eq!(schema.kind(), SchemaKind::Image);
        assert_eq!(schema.len(), 1);
    }

    #[test]
    fn test_schema_rejects_invalid_layouts() {
        assert!(Schema::new(vec![]).is_err());
        assert!(Schema::tabular(["a", "b", "a"]).is_err());
        assert!(Schema::tabular([""]).is_err());
        assert!(
            Schema::new(vec![
                FieldSpec::new("image", FieldType::Image),
                FieldSpec::new("bedrooms", FieldType::Number),
            ])
            .is_err()
        );
    }

    #[test]
    fn test_field_type_from_str() {
        assert_eq!("number".parse::<FieldType>().unwrap(), FieldType::Number);
        assert_eq!(" Image ".parse::<FieldType>().unwrap(), FieldType::Image);
        assert!("text".parse::<FieldType>().is_err());
        assert_eq!(FieldType::Image.to_string(), "image");
    }

    #[test]
    fn test_schema_serializes_as_field_list() {
        let schema = Schema::tabular(["bedrooms"]).unwrap();
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"fields": [{"name": "bedrooms", "type": "number"}]})
        );
    }
}
