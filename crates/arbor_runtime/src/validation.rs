//! Pre-execution document validation.
//!
//! Every failure here is a [`ErrorKind::ValidationError`](crate::ErrorKind);
//! a document with any such error is never executed.

use crate::error::FieldError;
use crate::query::{Directive, OperationKind, QueryDocument, Selection};
use crate::schema::TypeRegistry;
use rustc_hash::FxHashSet;

/// Validates a document against the registry.
///
/// Collects every problem found instead of stopping at the first one.
pub fn validate(
    registry: &TypeRegistry,
    document: &QueryDocument,
    max_depth: Option<usize>,
) -> Result<(), Vec<FieldError>> {
    let mut validator = Validator {
        registry,
        document,
        max_depth,
        errors: Vec::new(),
        used_variables: FxHashSet::default(),
        depth_exceeded: false,
    };
    validator.validate();

    if validator.errors.is_empty() {
        Ok(())
    } else {
        Err(validator.errors)
    }
}

struct Validator<'a> {
    registry: &'a TypeRegistry,
    document: &'a QueryDocument,
    max_depth: Option<usize>,
    errors: Vec<FieldError>,
    used_variables: FxHashSet<&'a str>,
    depth_exceeded: bool,
}

impl<'a> Validator<'a> {
    fn error(&mut self, message: String) {
        self.errors.push(FieldError::validation(message));
    }

    fn validate(&mut self) {
        let document = self.document;
        let kind = document.kind;
        let root = match self.registry.root_type(kind) {
            Ok(root) => root.name.clone(),
            Err(_) => {
                self.error(format!("Schema is not configured for {kind} operations."));
                return;
            }
        };

        for variable in &document.variables {
            match self.registry.describe(variable.ty.named_type()) {
                Ok(def) if def.is_input() => {}
                _ => self.error(format!(
                    "Variable '${}' cannot be non-input type '{}'.",
                    variable.name, variable.ty
                )),
            }
        }

        if kind == OperationKind::Subscription {
            let root_fields = document
                .selection_set
                .iter()
                .filter(|s| matches!(s, Selection::Field(_)))
                .count();
            if root_fields != 1 || root_fields != document.selection_set.len() {
                self.error("Subscription operations must select exactly one root field.".into());
            }
        }

        let mut spreads = Vec::new();
        self.selection_set(&root, &document.selection_set, 1, &mut spreads);

        for name in std::mem::take(&mut self.used_variables) {
            if !document.variables.iter().any(|v| v.name == name) {
                self.error(format!("Variable '${name}' is not defined."));
            }
        }
    }

    fn selection_set(
        &mut self,
        parent: &str,
        selections: &'a [Selection],
        depth: usize,
        spreads: &mut Vec<&'a str>,
    ) {
        let registry = self.registry;
        let document = self.document;
        for selection in selections {
            self.directives(selection.directives());
            match selection {
                Selection::Field(field) => {
                    if field.name == "__typename" {
                        if !field.selection_set.is_empty() {
                            self.error("Field '__typename' must not have a selection.".into());
                        }
                        continue;
                    }

                    let Some(def) = registry.field(parent, &field.name) else {
                        self.error(format!(
                            "Cannot query field '{}' on type '{parent}'.",
                            field.name
                        ));
                        continue;
                    };

                    for (arg, value) in &field.arguments {
                        if !def.arguments.contains_key(arg) {
                            self.error(format!(
                                "Unknown argument '{arg}' on field '{parent}.{}'.",
                                field.name
                            ));
                        }
                        let mut names = Vec::new();
                        value.variables(&mut names);
                        self.used_variables.extend(names);
                    }
                    for (arg, input) in &def.arguments {
                        let provided = field.arguments.iter().any(|(n, _)| n == arg);
                        if !provided && !input.ty.is_nullable() && input.default_value.is_none() {
                            self.error(format!(
                                "Field '{parent}.{}' argument '{arg}' of type '{}' is required but not provided.",
                                field.name, input.ty
                            ));
                        }
                    }

                    let target = def.ty.named_type();
                    match registry.describe(target) {
                        Ok(ty) if ty.is_leaf() => {
                            if !field.selection_set.is_empty() {
                                self.error(format!(
                                    "Field '{}' must not have a selection since type '{target}' has no subfields.",
                                    field.name
                                ));
                            }
                        }
                        Ok(_) => {
                            if field.selection_set.is_empty() {
                                self.error(format!(
                                    "Field '{}' of type '{}' must have a selection of subfields.",
                                    field.name, def.ty
                                ));
                            } else {
                                self.check_depth(depth + 1);
                                self.selection_set(target, &field.selection_set, depth + 1, spreads);
                            }
                        }
                        Err(e) => self.error(e.to_string()),
                    }
                }
                Selection::InlineFragment(fragment) => {
                    let condition = fragment.type_condition.as_deref().unwrap_or(parent);
                    if self.composite_condition(condition) {
                        self.selection_set(condition, &fragment.selection_set, depth, spreads);
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let name = spread.name.as_str();
                    let Some(fragment) = document.fragments.get(name) else {
                        self.error(format!("Unknown fragment '{name}'."));
                        continue;
                    };
                    if spreads.contains(&name) {
                        self.error(format!("Cannot spread fragment '{name}' within itself."));
                        continue;
                    }
                    if self.composite_condition(&fragment.type_condition) {
                        spreads.push(name);
                        self.selection_set(
                            &fragment.type_condition,
                            &fragment.selection_set,
                            depth,
                            spreads,
                        );
                        spreads.pop();
                    }
                }
            }
        }
    }

    fn composite_condition(&mut self, condition: &str) -> bool {
        match self.registry.describe(condition) {
            Ok(def) if def.is_composite() => true,
            Ok(_) => {
                self.error(format!(
                    "Fragment cannot condition on non composite type '{condition}'."
                ));
                false
            }
            Err(_) => {
                self.error(format!("Unknown type '{condition}'."));
                false
            }
        }
    }

    fn directives(&mut self, directives: &'a [Directive]) {
        for directive in directives {
            match directive.name.as_str() {
                "skip" | "include" => match directive.argument("if") {
                    Some(value) => {
                        let mut names = Vec::new();
                        value.variables(&mut names);
                        self.used_variables.extend(names);
                    }
                    None => self.error(format!(
                        "Directive '@{}' argument 'if' of type 'Boolean!' is required but not provided.",
                        directive.name
                    )),
                },
                other => self.error(format!("Unknown directive '@{other}'.")),
            }
        }
    }

    fn check_depth(&mut self, depth: usize) {
        if let Some(max) = self.max_depth {
            if depth > max && !self.depth_exceeded {
                self.depth_exceeded = true;
                self.error(format!(
                    "Query depth {depth} exceeds maximum allowed depth {max}."
                ));
            }
        }
    }
}
