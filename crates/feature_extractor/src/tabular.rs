//! Tabular feature row assembly.

use prediction_structs::{FieldType, PredictionError, Schema, TypedFields, TypedValue};

/// Builds the single feature row a tabular model consumes.
///
/// The row follows the schema's field order, whatever order the fields
/// arrived in. Tree models split on feature positions, so a permuted row
/// would silently produce a wrong prediction.
///
/// # Errors
///
/// Returns `MissingField` or `BadType` if `fields` does not hold a number for
/// every schema field.
#[expect(
    clippy::cast_possible_truncation,
    reason = "models evaluate features in single precision"
)]
pub fn assemble_feature_row(
    schema: &Schema,
    fields: &TypedFields,
) -> Result<Vec<f32>, PredictionError> {
    schema
        .fields()
        .iter()
        .map(|spec| match fields.get(&spec.name) {
            Some(TypedValue::Number(value)) => Ok(*value as f32),
            Some(TypedValue::Image(_)) => Err(PredictionError::bad_type(
                &spec.name,
                FieldType::Number,
            )),
            None => Err(PredictionError::missing_field(&spec.name)),
        })
        .collect()
}
