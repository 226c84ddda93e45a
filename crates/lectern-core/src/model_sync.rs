//! Reconciliation between an element's JSON model and its relational columns.
//!
//! The model blob is what dashboards render; `name`, `type` and `description`
//! are denormalized into columns so they can be indexed and filtered. Every
//! create and patch runs [`sync_fields_with_model`] before writing:
//!
//! | Field         | Direction                                                        |
//! |---------------|------------------------------------------------------------------|
//! | `name`        | column → model (`title` for panels, `name` for variables)        |
//! | `type`        | model → column when present, otherwise column → model            |
//! | `description` | model → column when present, otherwise column → model            |
//!
//! Values longer than their column are rejected before anything is written.

use serde_json::{Map, Value as JsonValue};

use crate::defaults::{DESCRIPTION_MAX_LENGTH, NAME_MAX_LENGTH, TYPE_MAX_LENGTH};
use crate::error::{Error, Result};
use crate::models::{ElementKind, LibraryElement};

/// Model key that mirrors the element name for the given kind.
pub const fn name_key(kind: ElementKind) -> &'static str {
    match kind {
        ElementKind::Panel => "title",
        ElementKind::Variable => "name",
    }
}

/// Reconcile `element.model` with the element's relational columns.
///
/// Fails with [`Error::MalformedModel`] if the model is not a JSON object or
/// carries a non-string or oversized `type`/`description`, and with
/// [`Error::InvalidInput`] if the name is too long. On failure the element is
/// left untouched.
pub fn sync_fields_with_model(element: &mut LibraryElement) -> Result<()> {
    let name_len = element.name.chars().count();
    if name_len > NAME_MAX_LENGTH {
        return Err(Error::InvalidInput(format!(
            "library element name is {} characters, maximum is {}",
            name_len, NAME_MAX_LENGTH
        )));
    }

    let mut model = match &element.model {
        JsonValue::Object(map) => map.clone(),
        other => {
            return Err(Error::MalformedModel(format!(
                "model must be a JSON object, found {}",
                json_type_name(other)
            )))
        }
    };

    model.insert(
        name_key(element.kind).to_string(),
        JsonValue::String(element.name.clone()),
    );

    let element_type = reconcile_text_field(&mut model, "type", &element.element_type)?;
    let description = reconcile_text_field(&mut model, "description", &element.description)?;
    check_length("type", &element_type, TYPE_MAX_LENGTH)?;
    check_length("description", &description, DESCRIPTION_MAX_LENGTH)?;

    element.element_type = element_type;
    element.description = description;
    element.model = JsonValue::Object(model);
    Ok(())
}

fn check_length(key: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(Error::MalformedModel(format!(
            "model field '{}' is {} characters, maximum is {}",
            key, len, max
        )));
    }
    Ok(())
}

// A null entry counts as absent.
fn reconcile_text_field(
    model: &mut Map<String, JsonValue>,
    key: &str,
    column: &str,
) -> Result<String> {
    match model.get(key) {
        Some(JsonValue::String(value)) => Ok(value.clone()),
        None | Some(JsonValue::Null) => {
            model.insert(key.to_string(), JsonValue::String(column.to_string()));
            Ok(column.to_string())
        }
        Some(other) => Err(Error::MalformedModel(format!(
            "model field '{}' must be a string, found {}",
            key,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
