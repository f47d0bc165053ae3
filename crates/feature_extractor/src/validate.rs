//! Request validation against a model schema.
//!
//! Validation is fail-fast: fields are checked in schema order and the first
//! violation is returned. Fields the schema does not declare are ignored.

use bytes::Bytes;
use prediction_structs::{
    FieldType, PredictionError, RawFields, RawValue, Schema, SchemaKind, TypedFields, TypedValue,
};
use serde_json::Value;

/// Checks `fields` against `schema` and coerces every declared field.
///
/// # Errors
///
/// Returns `MissingField` for the first absent (or `null`) field, or
/// `BadType` for the first field that cannot be coerced to its type.
pub fn validate(schema: &Schema, fields: &RawFields) -> Result<TypedFields, PredictionError> {
    let mut typed = TypedFields::new();

    for spec in schema.fields() {
        let raw = fields
            .get(&spec.name)
            .filter(|raw| !is_null(raw))
            .ok_or_else(|| PredictionError::missing_field(&spec.name))?;

        let value = match spec.field_type {
            FieldType::Number => TypedValue::Number(coerce_number(&spec.name, raw)?),
            FieldType::Image => TypedValue::Image(coerce_image(&spec.name, raw)?),
        };
        typed.push(spec.name.clone(), value);
    }

    Ok(typed)
}

/// Validates a bare ordered list of values against a tabular schema.
///
/// The n-th value is bound to the n-th schema field.
///
/// # Errors
///
/// Returns `MalformedRequest` if the schema is not tabular or the number of
/// values differs from the schema, otherwise the same errors as [`validate`].
pub fn validate_positional(
    schema: &Schema,
    values: &[Value],
) -> Result<TypedFields, PredictionError> {
    if schema.kind() != SchemaKind::Tabular {
        return Err(PredictionError::MalformedRequest(
            "Positional input is only accepted by tabular models".to_string(),
        ));
    }

    if values.len() != schema.len() {
        return Err(PredictionError::MalformedRequest(format!(
            "Expected {} input values, got {}",
            schema.len(),
            values.len()
        )));
    }

    let mut typed = TypedFields::new();
    for (spec, value) in schema.fields().iter().zip(values) {
        let raw = RawValue::Json(value.clone());
        if is_null(&raw) {
            return Err(PredictionError::missing_field(&spec.name));
        }
        typed.push(
            spec.name.clone(),
            TypedValue::Number(coerce_number(&spec.name, &raw)?),
        );
    }

    Ok(typed)
}

const fn is_null(raw: &RawValue) -> bool {
    matches!(raw, RawValue::Json(Value::Null))
}

fn coerce_number(field: &str, raw: &RawValue) -> Result<f64, PredictionError> {
    let parsed = match raw {
        RawValue::Json(Value::Number(n)) => n.as_f64(),
        RawValue::Json(Value::String(s)) => parse_number(s),
        RawValue::Json(_) => None,
        RawValue::Binary(bytes) => core::str::from_utf8(bytes).ok().and_then(parse_number),
    };

    parsed
        .filter(|v| fits_single_precision(*v))
        .ok_or_else(|| PredictionError::bad_type(field, FieldType::Number))
}

/// Models evaluate features as `f32`, so a value must stay finite there too.
#[expect(
    clippy::cast_possible_truncation,
    reason = "the cast is the range check itself"
)]
fn fits_single_precision(value: f64) -> bool {
    value.is_finite() && (value as f32).is_finite()
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse().ok()
}

fn coerce_image(field: &str, raw: &RawValue) -> Result<Bytes, PredictionError> {
    match raw {
        RawValue::Binary(bytes) if !bytes.is_empty() => Ok(bytes.clone()),
        _ => Err(PredictionError::bad_type(field, FieldType::Image)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn house_schema() -> Schema {
        Schema::tabular(["living_area", "bathrooms", "bedrooms", "latitude", "longitude"]).unwrap()
    }

    fn json_fields(value: Value) -> RawFields {
        value
            .as_object()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), RawValue::Json(v.clone())))
            .collect()
    }

    #[test]
    fn test_valid_tabular_fields() {
        let fields = json_fields(json!({
            "bedrooms": 3,
            "living_area": 1500,
            "bathrooms": "2",
            "longitude": -122.4,
            "latitude": 37.7,
            "garage": true,
        }));

        let typed = validate(&house_schema(), &fields).unwrap();

        assert_eq!(typed.len(), 5);
        assert_eq!(
            typed.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            ["living_area", "bathrooms", "bedrooms", "latitude", "longitude"]
        );
        assert_eq!(typed.get("bathrooms"), Some(&TypedValue::Number(2.0)));
        assert_eq!(typed.get("longitude"), Some(&TypedValue::Number(-122.4)));
        assert!(typed.get("garage").is_none());
    }

    #[test]
    fn test_missing_field_is_named() {
        let fields = json_fields(json!({
            "living_area": 1500,
            "bathrooms": 2,
            "latitude": 37.7,
            "longitude": -122.4,
        }));

        let err = validate(&house_schema(), &fields).unwrap_err();
        assert_eq!(err, PredictionError::missing_field("bedrooms"));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let fields = json_fields(json!({
            "living_area": null,
            "bathrooms": 2,
            "bedrooms": 3,
            "latitude": 37.7,
            "longitude": -122.4,
        }));

        let err = validate(&house_schema(), &fields).unwrap_err();
        assert_eq!(err, PredictionError::missing_field("living_area"));
    }

    #[test]
    fn test_fail_fast_in_schema_order() {
        // bathrooms is malformed and bedrooms is missing; bathrooms comes first.
        let fields = json_fields(json!({
            "living_area": 1500,
            "bathrooms": "two",
            "latitude": 37.7,
            "longitude": -122.4,
        }));

        let err = validate(&house_schema(), &fields).unwrap_err();
        assert_eq!(err, PredictionError::bad_type("bathrooms", FieldType::Number));
    }

    #[test]
    fn test_numbers_beyond_single_precision() {
        let schema = Schema::tabular(["living_area"]).unwrap();

        for bad in [json!(1e39), json!(-1e39), json!("1e39"), json!(f64::MAX)] {
            let err = validate(&schema, &json_fields(json!({ "living_area": bad.clone() })))
                .unwrap_err();
            assert_eq!(
                err,
                PredictionError::bad_type("living_area", FieldType::Number),
                "{bad} should be rejected"
            );
        }

        let err = validate_positional(&schema, &[json!(-1e39)]).unwrap_err();
        assert_eq!(
            err,
            PredictionError::bad_type("living_area", FieldType::Number)
        );

        // The largest single precision value is still accepted.
        let typed = validate(
            &schema,
            &json_fields(json!({ "living_area": f64::from(f32::MAX) })),
        )
        .unwrap();
        assert_eq!(
            typed.get("living_area"),
            Some(&TypedValue::Number(f64::from(f32::MAX)))
        );
    }

    #[test]
    fn test_bad_number_values() {
        let schema = Schema::tabular(["x"]).unwrap();

        for bad in [
            json!(true),
            json!([1.0]),
            json!({"value": 1.0}),
            json!("abc"),
            json!("NaN"),
            json!("inf"),
            json!(""),
        ] {
            let err = validate(&schema, &json_fields(json!({ "x": bad.clone() }))).unwrap_err();
            assert_eq!(
                err,
                PredictionError::bad_type("x", FieldType::Number),
                "value {bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_number_from_binary_text() {
        let schema = Schema::tabular(["x"]).unwrap();

        let mut fields = RawFields::new();
        fields.insert("x".into(), RawValue::Binary(Bytes::from_static(b" 42.5 ")));
        let typed = validate(&schema, &fields).unwrap();
        assert_eq!(typed.get("x"), Some(&TypedValue::Number(42.5)));

        fields.insert("x".into(), RawValue::Binary(Bytes::from_static(&[0xff, 0xfe])));
        let err = validate(&schema, &fields).unwrap_err();
        assert_eq!(err, PredictionError::bad_type("x", FieldType::Number));
    }

    #[test]
    fn test_image_field() {
        let schema = Schema::image("image").unwrap();

        let mut fields = RawFields::new();
        fields.insert(
            "image".into(),
            RawValue::Binary(Bytes::from_static(b"\x89PNG")),
        );
        let typed = validate(&schema, &fields).unwrap();
        assert_eq!(
            typed.get("image"),
            Some(&TypedValue::Image(Bytes::from_static(b"\x89PNG")))
        );

        fields.insert("image".into(), RawValue::Binary(Bytes::new()));
        let err = validate(&schema, &fields).unwrap_err();
        assert_eq!(err, PredictionError::bad_type("image", FieldType::Image));

        fields.insert("image".into(), RawValue::Json(json!("aGVsbG8=")));
        let err = validate(&schema, &fields).unwrap_err();
        assert_eq!(err, PredictionError::bad_type("image", FieldType::Image));

        let err = validate(&schema, &RawFields::new()).unwrap_err();
        assert_eq!(err, PredictionError::missing_field("image"));
    }

    #[test]
    fn test_positional_binds_by_index() {
        let schema = Schema::tabular(["a", "b", "c"]).unwrap();
        let typed = validate_positional(&schema, &[json!(1), json!("2.5"), json!(-3)]).unwrap();

        assert_eq!(typed.get("a"), Some(&TypedValue::Number(1.0)));
        assert_eq!(typed.get("b"), Some(&TypedValue::Number(2.5)));
        assert_eq!(typed.get("c"), Some(&TypedValue::Number(-3.0)));
    }

    #[test]
    fn test_positional_errors() {
        let schema = Schema::tabular(["a", "b"]).unwrap();

        let err = validate_positional(&schema, &[json!(1)]).unwrap_err();
        assert!(matches!(err, PredictionError::MalformedRequest(_)));

        let err = validate_positional(&schema, &[json!(1), json!(null)]).unwrap_err();
        assert_eq!(err, PredictionError::missing_field("b"));

        let err = validate_positional(&schema, &[json!("x"), json!(2)]).unwrap_err();
        assert_eq!(err, PredictionError::bad_type("a", FieldType::Number));

        let image = Schema::image("image").unwrap();
        let err = validate_positional(&image, &[json!(1)]).unwrap_err();
        assert!(matches!(err, PredictionError::MalformedRequest(_)));
    }
}
