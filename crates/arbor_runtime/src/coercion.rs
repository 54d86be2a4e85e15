//! Input coercion for variables and field arguments.

use crate::error::{ErrorKind, FieldError, ResolverError};
use crate::query::{InputValue, VariableDefinition, Variables};
use crate::resolver::ResolverArgs;
use crate::schema::{FieldDef, TypeDef, TypeRef, TypeRegistry};
use serde_json::{Map, Value};

/// Coerces the request variables against the operation's declarations.
///
/// The first failure aborts coercion. A missing required variable is a
/// validation error; a value the declared type refuses is a user input
/// error naming the variable.
pub fn coerce_variables(
    registry: &TypeRegistry,
    definitions: &[VariableDefinition],
    raw: &Variables,
) -> Result<Variables, FieldError> {
    let mut coerced = Variables::new();

    for definition in definitions {
        let name = &definition.name;
        let value = match raw.get(name) {
            Some(value) => value,
            None => match &definition.default_value {
                Some(default) => default,
                None if definition.ty.is_nullable() => continue,
                None => {
                    return Err(FieldError::validation(format!(
                        "Variable '${name}' of required type '{}' was not provided.",
                        definition.ty
                    )))
                }
            },
        };

        let value = coerce_input(registry, &definition.ty, value).map_err(|message| {
            FieldError::new(
                ErrorKind::UserInputError,
                format!("Variable '${name}' got invalid value: {message}"),
            )
            .with_extension("variableName", name.as_str())
        })?;
        coerced.insert(name.clone(), value);
    }

    Ok(coerced)
}

/// Coerces the arguments of one field selection, applying defaults and
/// substituting variables.
pub fn coerce_argument_values(
    registry: &TypeRegistry,
    field: &FieldDef,
    arguments: &[(String, InputValue)],
    variables: &Variables,
) -> Result<ResolverArgs, ResolverError> {
    let mut args = ResolverArgs::new();

    for (name, definition) in &field.arguments {
        let provided = arguments.iter().find(|(n, _)| n == name).map(|(_, v)| v);

        let value = match provided {
            // Variables were coerced against their declared type already.
            Some(InputValue::Variable(var)) => variables.get(var).cloned(),
            Some(input) => match input.resolve(variables) {
                Some(value) => Some(
                    coerce_input(registry, &definition.ty, &value)
                        .map_err(|message| ResolverError::ArgumentParseError(name.clone(), message))?,
                ),
                None => None,
            },
            None => None,
        };

        match value.or_else(|| definition.default_value.clone()) {
            Some(Value::Null) if !definition.ty.is_nullable() => {
                return Err(ResolverError::ArgumentParseError(
                    name.clone(),
                    format!("expected non-null value of type '{}'", definition.ty),
                ))
            }
            Some(value) => args.set(name.clone(), value),
            None if definition.ty.is_nullable() => {}
            None => return Err(ResolverError::MissingArgument(name.clone())),
        }
    }

    Ok(args)
}

/// Coerces a caller-supplied value against an input type.
pub fn coerce_input(registry: &TypeRegistry, ty: &TypeRef, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return if ty.is_nullable() {
            Ok(Value::Null)
        } else {
            Err(format!("expected non-null value of type '{ty}'"))
        };
    }

    match ty.non_null() {
        TypeRef::List(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input(registry, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            // A single value is accepted where a list is expected.
            single => Ok(Value::Array(vec![coerce_input(registry, inner, single)?])),
        },
        TypeRef::Named(name) => match registry.describe(name) {
            Ok(TypeDef::Scalar(_) | TypeDef::Enum(_)) => registry
                .parse_leaf(name, value)
                .map_err(|e| e.to_string()),
            Ok(TypeDef::InputObject(def)) => {
                let Value::Object(fields) = value else {
                    return Err(format!("expected an object for input type '{name}'"));
                };
                if let Some(unknown) = fields.keys().find(|k| !def.fields.contains_key(*k)) {
                    return Err(format!("unknown field '{unknown}' on input type '{name}'"));
                }

                let mut coerced = Map::new();
                for (field_name, field) in &def.fields {
                    match fields.get(field_name).or(field.default_value.as_ref()) {
                        Some(v) => {
                            coerced.insert(field_name.clone(), coerce_input(registry, &field.ty, v)?);
                        }
                        None if field.ty.is_nullable() => {}
                        None => {
                            return Err(format!(
                                "missing required field '{field_name}' on input type '{name}'"
                            ))
                        }
                    }
                }
                Ok(Value::Object(coerced))
            }
            Ok(_) => Err(format!("'{name}' is not an input type")),
            Err(e) => Err(e.to_string()),
        },
        TypeRef::Option(_) => Err(format!("invalid type '{ty}'")),
    }
}
