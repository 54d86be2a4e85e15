//! Query documents.
//!
//! Documents are built programmatically; there is no grammar parser here.
//!
//! ```
//! use arbor_runtime::query::{field, var, QueryDocument};
//! use arbor_runtime::TypeRef;
//!
//! let doc = QueryDocument::query()
//!     .variable("id", TypeRef::named("ID"))
//!     .select([field("movie").arg("id", var("id")).select([field("title")])]);
//! assert_eq!(doc.selection_set.len(), 1);
//! ```

use crate::schema::TypeRef;
use indexmap::IndexMap;
use serde_json::Value;
use std::fmt;

/// Coerced or raw request variables.
pub type Variables = serde_json::Map<String, Value>;

/// The operation type of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OperationKind {
    #[default]
    Query,
    Mutation,
    Subscription,
}

impl OperationKind {
    /// Returns the keyword of the operation type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An input value in argument position.
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    /// A reference to a request variable.
    Variable(String),
    /// A literal value.
    Literal(Value),
    /// A list that may contain variables.
    List(Vec<InputValue>),
    /// An object that may contain variables.
    Object(IndexMap<String, InputValue>),
}

impl InputValue {
    /// Substitutes variables, producing a plain value. Unset variables
    /// produce `None`.
    pub fn resolve(&self, variables: &Variables) -> Option<Value> {
        match self {
            Self::Variable(name) => variables.get(name).cloned(),
            Self::Literal(value) => Some(value.clone()),
            Self::List(items) => Some(Value::Array(
                items
                    .iter()
                    .map(|item| item.resolve(variables).unwrap_or(Value::Null))
                    .collect(),
            )),
            Self::Object(fields) => Some(Value::Object(
                fields
                    .iter()
                    .filter_map(|(k, v)| v.resolve(variables).map(|v| (k.clone(), v)))
                    .collect(),
            )),
        }
    }

    /// Collects the names of the variables referenced by this value.
    pub fn variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Variable(name) => out.push(name),
            Self::Literal(_) => {}
            Self::List(items) => items.iter().for_each(|item| item.variables(out)),
            Self::Object(fields) => fields.values().for_each(|v| v.variables(out)),
        }
    }
}

macro_rules! literal_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for InputValue {
                fn from(value: $ty) -> Self {
                    Self::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_from!(Value, bool, i32, i64, u32, u64, f64, String, &str);

/// A reference to a variable.
pub fn var(name: impl Into<String>) -> InputValue {
    InputValue::Variable(name.into())
}

/// A directive applied to a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
}

impl Directive {
    /// Creates a new directive.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Vec::new(),
        }
    }

    /// Adds an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    /// Gets an argument.
    pub fn argument(&self, name: &str) -> Option<&InputValue> {
        self.arguments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A field selection.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: Vec<(String, InputValue)>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

impl FieldSelection {
    /// Creates a new field selection.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            alias: None,
            name: name.into(),
            arguments: Vec::new(),
            directives: Vec::new(),
            selection_set: Vec::new(),
        }
    }

    /// Returns the key under which this field appears in the result.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Sets the alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds an argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.arguments.push((name.into(), value.into()));
        self
    }

    /// Adds a directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Adds `@skip(if: ..)`.
    pub fn skip_if(self, condition: impl Into<InputValue>) -> Self {
        self.directive(Directive::new("skip").arg("if", condition))
    }

    /// Adds `@include(if: ..)`.
    pub fn include_if(self, condition: impl Into<InputValue>) -> Self {
        self.directive(Directive::new("include").arg("if", condition))
    }

    /// Appends sub-selections.
    pub fn select(mut self, selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        self.selection_set
            .extend(selections.into_iter().map(Into::into));
        self
    }
}

/// Starts a field selection.
pub fn field(name: impl Into<String>) -> FieldSelection {
    FieldSelection::new(name)
}

/// An inline fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: Vec<Selection>,
}

impl InlineFragment {
    /// Adds a directive.
    pub fn directive(mut self, directive: Directive) -> Self {
        self.directives.push(directive);
        self
    }

    /// Appends sub-selections.
    pub fn select(mut self, selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        self.selection_set
            .extend(selections.into_iter().map(Into::into));
        self
    }
}

/// Starts an inline fragment `... on TypeName`.
pub fn on(type_condition: impl Into<String>) -> InlineFragment {
    InlineFragment {
        type_condition: Some(type_condition.into()),
        directives: Vec::new(),
        selection_set: Vec::new(),
    }
}

/// A named fragment spread.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
}

/// Spreads the named fragment.
pub fn spread(name: impl Into<String>) -> FragmentSpread {
    FragmentSpread {
        name: name.into(),
        directives: Vec::new(),
    }
}

/// A selection.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Field(FieldSelection),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

impl Selection {
    /// Returns the directives of the selection.
    pub fn directives(&self) -> &[Directive] {
        match self {
            Self::Field(f) => &f.directives,
            Self::InlineFragment(f) => &f.directives,
            Self::FragmentSpread(f) => &f.directives,
        }
    }
}

impl From<FieldSelection> for Selection {
    fn from(field: FieldSelection) -> Self {
        Self::Field(field)
    }
}

impl From<InlineFragment> for Selection {
    fn from(fragment: InlineFragment) -> Self {
        Self::InlineFragment(fragment)
    }
}

impl From<FragmentSpread> for Selection {
    fn from(spread: FragmentSpread) -> Self {
        Self::FragmentSpread(spread)
    }
}

/// A named fragment definition.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub selection_set: Vec<Selection>,
}

/// A declared operation variable.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

/// An executable document holding a single operation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryDocument {
    pub kind: OperationKind,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: Vec<Selection>,
    pub fragments: IndexMap<String, FragmentDefinition>,
}

impl QueryDocument {
    /// Creates an operation of the given kind.
    pub fn new(kind: OperationKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Creates a query operation.
    pub fn query() -> Self {
        Self::new(OperationKind::Query)
    }

    /// Creates a mutation operation.
    pub fn mutation() -> Self {
        Self::new(OperationKind::Mutation)
    }

    /// Creates a subscription operation.
    pub fn subscription() -> Self {
        Self::new(OperationKind::Subscription)
    }

    /// Sets the operation name.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Declares a variable.
    pub fn variable(mut self, name: impl Into<String>, ty: TypeRef) -> Self {
        self.variables.push(VariableDefinition {
            name: name.into(),
            ty,
            default_value: None,
        });
        self
    }

    /// Declares a variable with a default value.
    pub fn variable_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeRef,
        default: impl Into<Value>,
    ) -> Self {
        self.variables.push(VariableDefinition {
            name: name.into(),
            ty,
            default_value: Some(default.into()),
        });
        self
    }

    /// Appends root selections.
    pub fn select(mut self, selections: impl IntoIterator<Item = impl Into<Selection>>) -> Self {
        self.selection_set
            .extend(selections.into_iter().map(Into::into));
        self
    }

    /// Adds a named fragment.
    pub fn fragment(
        mut self,
        name: impl Into<String>,
        type_condition: impl Into<String>,
        selections: impl IntoIterator<Item = impl Into<Selection>>,
    ) -> Self {
        let name = name.into();
        self.fragments.insert(
            name.clone(),
            FragmentDefinition {
                name,
                type_condition: type_condition.into(),
                selection_set: selections.into_iter().map(Into::into).collect(),
            },
        );
        self
    }

    /// Returns the first root field, used to pick the subscription source.
    pub fn root_field(&self) -> Option<&FieldSelection> {
        self.selection_set.iter().find_map(|selection| match selection {
            Selection::Field(field) => Some(field),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_builder() {
        let doc = QueryDocument::query()
            .named("Authors")
            .select([field("getAuthors")
                .alias("authors")
                .select([field("name"), field("books").select([field("title")])])]);

        let root = doc.root_field().unwrap();
        assert_eq!(root.response_key(), "authors");
        assert_eq!(root.selection_set.len(), 2);
        assert_eq!(doc.name.as_deref(), Some("Authors"));
    }

    #[test]
    fn test_input_value_resolution() {
        let mut variables = Variables::new();
        variables.insert("repo".into(), json!("arbor"));

        let value = InputValue::Object(IndexMap::from([
            ("repoFullName".to_string(), var("repo")),
            ("limit".to_string(), InputValue::from(10)),
            ("missing".to_string(), var("unset")),
        ]));

        assert_eq!(
            value.resolve(&variables),
            Some(json!({"repoFullName": "arbor", "limit": 10}))
        );

        let mut names = Vec::new();
        value.variables(&mut names);
        assert_eq!(names, ["repo", "unset"]);
    }

    #[test]
    fn test_directive_helpers() {
        let f = field("title").skip_if(var("hide")).include_if(true);
        assert_eq!(f.directives.len(), 2);
        assert_eq!(f.directives[0].argument("if"), Some(&var("hide")));
    }
}
