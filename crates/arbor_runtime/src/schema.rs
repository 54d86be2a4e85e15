//! Type registry.
//!
//! The registry is the static description of every type the executor can
//! produce: objects, interfaces, unions, enums, input objects and scalars,
//! plus the resolver bindings, the per-abstract-type discriminators and the
//! scalar codecs. It is assembled once with [`SchemaBuilder`] and is
//! read-only afterwards, so a single `Arc<TypeRegistry>` is shared by every
//! concurrent request.

use crate::context::Context;
use crate::error::{ScalarCoercionError, SchemaError, TypeResolutionError};
use crate::query::OperationKind;
use crate::resolver::{
    AsyncFnResolver, FieldResolvers, FnResolver, Resolver, ResolverArgs, ResolverInfo,
    ResolverResult,
};
use crate::scalar::{builtin_scalars, SharedScalarCodec};
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Maps a runtime value of an abstract type onto the name of its concrete
/// object type.
pub type Discriminator = Arc<dyn Fn(&Value) -> Option<String> + Send + Sync>;

/// A reference to a type from a field, argument or variable.
///
/// `Named` and `List` are non-null; wrapping in `Option` makes them nullable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    /// A non-null named type.
    Named(String),
    /// A nullable type.
    Option(Box<TypeRef>),
    /// A non-null list.
    List(Box<TypeRef>),
}

impl TypeRef {
    /// A non-null named type.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// A nullable named type.
    pub fn nullable(name: impl Into<String>) -> Self {
        Self::Option(Box::new(Self::Named(name.into())))
    }

    /// A non-null list of `inner`.
    pub fn list(inner: TypeRef) -> Self {
        Self::List(Box::new(inner))
    }

    /// Makes this type nullable.
    pub fn optional(self) -> Self {
        match self {
            Self::Option(_) => self,
            other => Self::Option(Box::new(other)),
        }
    }

    /// Returns true if null is an acceptable value.
    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Option(_))
    }

    /// Returns the type with nullability stripped.
    pub fn non_null(&self) -> &TypeRef {
        match self {
            Self::Option(inner) => inner.non_null(),
            other => other,
        }
    }

    /// Returns the innermost named type.
    pub fn named_type(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Option(inner) | Self::List(inner) => inner.named_type(),
        }
    }

    /// Returns the list depth of this type.
    pub fn list_depth(&self) -> usize {
        match self {
            Self::Named(_) => 0,
            Self::Option(inner) => inner.list_depth(),
            Self::List(inner) => 1 + inner.list_depth(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}!"),
            Self::List(inner) => write!(f, "[{inner}]!"),
            Self::Option(inner) => match inner.as_ref() {
                Self::Named(name) => f.write_str(name),
                Self::List(item) => write!(f, "[{item}]"),
                Self::Option(nested) => write!(f, "{nested}"),
            },
        }
    }
}

/// The kind of a registered type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Scalar => "scalar",
            Self::Object => "object",
            Self::Interface => "interface",
            Self::Union => "union",
            Self::Enum => "enum",
            Self::InputObject => "input object",
        };
        f.write_str(name)
    }
}

/// An argument or input object field.
#[derive(Debug, Clone, PartialEq)]
pub struct InputValueDef {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
    pub description: Option<String>,
}

impl InputValueDef {
    /// Creates a new input value.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            default_value: None,
            description: None,
        }
    }

    /// Sets the default value.
    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A field of an object or interface.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub ty: TypeRef,
    pub arguments: IndexMap<String, InputValueDef>,
    pub description: Option<String>,
    pub deprecation_reason: Option<String>,
}

impl FieldDef {
    /// Creates a new field.
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            arguments: IndexMap::new(),
            description: None,
            deprecation_reason: None,
        }
    }

    /// Adds an argument.
    pub fn argument(mut self, argument: InputValueDef) -> Self {
        self.arguments.insert(argument.name.clone(), argument);
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Marks the field deprecated.
    pub fn deprecated(mut self, reason: impl Into<String>) -> Self {
        self.deprecation_reason = Some(reason.into());
        self
    }

    /// Returns true if the field is deprecated.
    pub fn is_deprecated(&self) -> bool {
        self.deprecation_reason.is_some()
    }
}

/// An object type.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDef {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
    pub implements: Vec<String>,
    pub description: Option<String>,
}

impl ObjectDef {
    /// Creates a new object type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            implements: Vec::new(),
            description: None,
        }
    }

    /// Adds a field. Field names are unique; a later field replaces an
    /// earlier one with the same name in place.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    /// Declares an implemented interface.
    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.implements.push(interface.into());
        self
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An interface type.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDef {
    pub name: String,
    pub fields: IndexMap<String, FieldDef>,
    pub description: Option<String>,
}

impl InterfaceDef {
    /// Creates a new interface type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            description: None,
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// A union type.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionDef {
    pub name: String,
    pub members: Vec<String>,
    pub description: Option<String>,
}

impl UnionDef {
    /// Creates a new union type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
            description: None,
        }
    }

    /// Adds a member type.
    pub fn member(mut self, member: impl Into<String>) -> Self {
        self.members.push(member.into());
        self
    }
}

/// An enum type.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: String,
    pub values: Vec<String>,
    pub description: Option<String>,
}

impl EnumDef {
    /// Creates a new enum type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            description: None,
        }
    }

    /// Adds a value.
    pub fn value(mut self, value: impl Into<String>) -> Self {
        self.values.push(value.into());
        self
    }

    fn check(&self, value: &Value) -> Result<Value, ScalarCoercionError> {
        match value.as_str() {
            Some(s) if self.values.iter().any(|v| v == s) => Ok(value.clone()),
            _ => Err(ScalarCoercionError::new(
                &self.name,
                format!("{value} is not a value of this enum"),
            )),
        }
    }
}

/// An input object type.
#[derive(Debug, Clone, PartialEq)]
pub struct InputObjectDef {
    pub name: String,
    pub fields: IndexMap<String, InputValueDef>,
    pub description: Option<String>,
}

impl InputObjectDef {
    /// Creates a new input object type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
            description: None,
        }
    }

    /// Adds a field.
    pub fn field(mut self, field: InputValueDef) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }
}

/// A registered type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Scalar(String),
    Object(ObjectDef),
    Interface(InterfaceDef),
    Union(UnionDef),
    Enum(EnumDef),
    InputObject(InputObjectDef),
}

impl TypeDef {
    /// Returns the type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Scalar(name) => name,
            Self::Object(def) => &def.name,
            Self::Interface(def) => &def.name,
            Self::Union(def) => &def.name,
            Self::Enum(def) => &def.name,
            Self::InputObject(def) => &def.name,
        }
    }

    /// Returns the kind of the type.
    pub fn kind(&self) -> TypeKind {
        match self {
            Self::Scalar(_) => TypeKind::Scalar,
            Self::Object(_) => TypeKind::Object,
            Self::Interface(_) => TypeKind::Interface,
            Self::Union(_) => TypeKind::Union,
            Self::Enum(_) => TypeKind::Enum,
            Self::InputObject(_) => TypeKind::InputObject,
        }
    }

    /// Returns the output fields of an object or interface.
    pub fn fields(&self) -> Option<&IndexMap<String, FieldDef>> {
        match self {
            Self::Object(def) => Some(&def.fields),
            Self::Interface(def) => Some(&def.fields),
            _ => None,
        }
    }

    /// Returns true for scalars and enums.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_))
    }

    /// Returns true for objects, interfaces and unions.
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Object(_) | Self::Interface(_) | Self::Union(_))
    }

    /// Returns true for interfaces and unions.
    pub fn is_abstract(&self) -> bool {
        matches!(self, Self::Interface(_) | Self::Union(_))
    }

    /// Returns true for types allowed in input positions.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Scalar(_) | Self::Enum(_) | Self::InputObject(_))
    }
}

impl From<ObjectDef> for TypeDef {
    fn from(def: ObjectDef) -> Self {
        Self::Object(def)
    }
}

impl From<InterfaceDef> for TypeDef {
    fn from(def: InterfaceDef) -> Self {
        Self::Interface(def)
    }
}

impl From<UnionDef> for TypeDef {
    fn from(def: UnionDef) -> Self {
        Self::Union(def)
    }
}

impl From<EnumDef> for TypeDef {
    fn from(def: EnumDef) -> Self {
        Self::Enum(def)
    }
}

impl From<InputObjectDef> for TypeDef {
    fn from(def: InputObjectDef) -> Self {
        Self::InputObject(def)
    }
}

/// The built, read-only type registry.
pub struct TypeRegistry {
    types: IndexMap<String, TypeDef>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    resolvers: FieldResolvers,
    discriminators: FxHashMap<String, Discriminator>,
    scalars: FxHashMap<String, SharedScalarCodec>,
    possible_types: FxHashMap<String, Vec<String>>,
}

impl TypeRegistry {
    /// Starts building a registry.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    /// Describes a type by name.
    pub fn describe(&self, type_name: &str) -> Result<&TypeDef, SchemaError> {
        self.types
            .get(type_name)
            .ok_or_else(|| SchemaError::UnknownType(type_name.to_string()))
    }

    /// Returns true if the type exists.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Iterates over every registered type in registration order.
    pub fn types(&self) -> impl Iterator<Item = &TypeDef> {
        self.types.values()
    }

    /// Looks up a field of an object or interface.
    pub fn field(&self, type_name: &str, field_name: &str) -> Option<&FieldDef> {
        self.types
            .get(type_name)
            .and_then(TypeDef::fields)
            .and_then(|fields| fields.get(field_name))
    }

    /// Returns the object type at the root of an operation.
    pub fn root_type(&self, kind: OperationKind) -> Result<&ObjectDef, SchemaError> {
        let name = match kind {
            OperationKind::Query => Some(&self.query_type),
            OperationKind::Mutation => self.mutation_type.as_ref(),
            OperationKind::Subscription => self.subscription_type.as_ref(),
        }
        .ok_or(SchemaError::MissingRootType(kind.as_str()))?;

        match self.describe(name)? {
            TypeDef::Object(def) => Ok(def),
            _ => Err(SchemaError::InvalidRootType(name.clone())),
        }
    }

    /// Returns the resolver bound to `type_name.field_name`, falling back to
    /// the default property resolver.
    pub fn resolver(&self, type_name: &str, field_name: &str) -> &dyn Resolver {
        self.resolvers.get(type_name, field_name)
    }

    /// Returns the concrete object types of an abstract type.
    pub fn possible_types(&self, abstract_type: &str) -> &[String] {
        self.possible_types
            .get(abstract_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Returns true if `object_type` is (or belongs to) `type_condition`.
    pub fn is_possible_type(&self, type_condition: &str, object_type: &str) -> bool {
        type_condition == object_type
            || self
                .possible_types(type_condition)
                .iter()
                .any(|name| name == object_type)
    }

    /// Resolves the concrete object type of a value of an abstract type.
    ///
    /// The registered discriminator is consulted exactly once. Its answer
    /// must name one of the possible types of `abstract_type`.
    pub fn resolve_variant(
        &self,
        abstract_type: &str,
        value: &Value,
    ) -> Result<&ObjectDef, TypeResolutionError> {
        let discriminator = self.discriminators.get(abstract_type).ok_or_else(|| {
            TypeResolutionError::unresolved(abstract_type, "no discriminator registered")
        })?;

        let Some(concrete) = discriminator(value) else {
            return Err(TypeResolutionError::unresolved(
                abstract_type,
                "discriminator did not recognise the value",
            ));
        };

        if !self.possible_types(abstract_type).contains(&concrete) {
            return Err(TypeResolutionError::unresolved(
                abstract_type,
                format!("'{concrete}' is not a possible type"),
            ));
        }

        match self.types.get(&concrete) {
            Some(TypeDef::Object(def)) => Ok(def),
            _ => Err(TypeResolutionError::unresolved(
                abstract_type,
                format!("'{concrete}' is not an object type"),
            )),
        }
    }

    /// Serializes a leaf value to its wire form.
    pub fn serialize_leaf(
        &self,
        type_name: &str,
        value: &Value,
    ) -> Result<Value, ScalarCoercionError> {
        match self.types.get(type_name) {
            Some(TypeDef::Enum(def)) => def.check(value),
            _ => self.codec(type_name)?.serialize(value),
        }
    }

    /// Parses a caller-supplied leaf value.
    pub fn parse_leaf(&self, type_name: &str, value: &Value) -> Result<Value, ScalarCoercionError> {
        match self.types.get(type_name) {
            Some(TypeDef::Enum(def)) => def.check(value),
            _ => self.codec(type_name)?.parse_input(value),
        }
    }

    fn codec(&self, type_name: &str) -> Result<&SharedScalarCodec, ScalarCoercionError> {
        self.scalars
            .get(type_name)
            .ok_or_else(|| ScalarCoercionError::new(type_name, "no codec registered"))
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("query_type", &self.query_type)
            .field("mutation_type", &self.mutation_type)
            .field("subscription_type", &self.subscription_type)
            .field("resolvers", &self.resolvers)
            .finish_non_exhaustive()
    }
}

/// Builder for [`TypeRegistry`].
pub struct SchemaBuilder {
    types: IndexMap<String, TypeDef>,
    query_type: String,
    mutation_type: Option<String>,
    subscription_type: Option<String>,
    resolvers: FieldResolvers,
    discriminators: FxHashMap<String, Discriminator>,
    scalars: FxHashMap<String, SharedScalarCodec>,
}

impl Default for SchemaBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaBuilder {
    /// Creates a builder pre-seeded with the built-in scalars.
    pub fn new() -> Self {
        let mut builder = Self {
            types: IndexMap::new(),
            query_type: "Query".to_string(),
            mutation_type: None,
            subscription_type: None,
            resolvers: FieldResolvers::default(),
            discriminators: FxHashMap::default(),
            scalars: FxHashMap::default(),
        };
        for (name, codec) in builtin_scalars() {
            builder = builder.scalar(name, codec);
        }
        builder
    }

    /// Sets the query root type name.
    pub fn query_type(mut self, name: impl Into<String>) -> Self {
        self.query_type = name.into();
        self
    }

    /// Sets the mutation root type name.
    pub fn mutation_type(mut self, name: impl Into<String>) -> Self {
        self.mutation_type = Some(name.into());
        self
    }

    /// Sets the subscription root type name.
    pub fn subscription_type(mut self, name: impl Into<String>) -> Self {
        self.subscription_type = Some(name.into());
        self
    }

    /// Registers a type.
    pub fn add_type(mut self, ty: impl Into<TypeDef>) -> Self {
        let ty = ty.into();
        self.types.insert(ty.name().to_string(), ty);
        self
    }

    /// Registers a custom scalar with its codec.
    pub fn scalar(mut self, name: impl Into<String>, codec: SharedScalarCodec) -> Self {
        let name = name.into();
        self.types.insert(name.clone(), TypeDef::Scalar(name.clone()));
        self.scalars.insert(name, codec);
        self
    }

    /// Registers the discriminator of an interface or union.
    pub fn discriminator<F>(mut self, abstract_type: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Value) -> Option<String> + Send + Sync + 'static,
    {
        self.discriminators.insert(abstract_type.into(), Arc::new(f));
        self
    }

    /// Binds a resolver to a field.
    pub fn resolver<R: Resolver + 'static>(
        mut self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        resolver: R,
    ) -> Self {
        self.resolvers
            .bind(type_name.into(), field_name.into(), Box::new(resolver));
        self
    }

    /// Binds a sync function as a resolver.
    pub fn resolver_fn<F>(
        self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(&Value, &ResolverArgs, &Context, &ResolverInfo) -> ResolverResult
            + Send
            + Sync
            + 'static,
    {
        self.resolver(type_name, field_name, FnResolver::new(f))
    }

    /// Binds an async function as a resolver.
    pub fn resolver_async<F, Fut>(
        self,
        type_name: impl Into<String>,
        field_name: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(Value, ResolverArgs, Context, ResolverInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResolverResult> + Send + 'static,
    {
        self.resolver(type_name, field_name, AsyncFnResolver::new(f))
    }

    /// Validates the definitions and builds the registry.
    pub fn build(self) -> Result<TypeRegistry, SchemaError> {
        let mut possible_types: FxHashMap<String, Vec<String>> = FxHashMap::default();

        for ty in self.types.values() {
            match ty {
                TypeDef::Object(def) => {
                    self.check_fields(&def.name, &def.fields)?;
                    for interface in &def.implements {
                        self.check_implementation(def, interface)?;
                        possible_types
                            .entry(interface.clone())
                            .or_default()
                            .push(def.name.clone());
                    }
                }
                TypeDef::Interface(def) => {
                    self.check_fields(&def.name, &def.fields)?;
                    possible_types.entry(def.name.clone()).or_default();
                }
                TypeDef::Union(def) => {
                    for member in &def.members {
                        if !matches!(self.types.get(member), Some(TypeDef::Object(_))) {
                            return Err(SchemaError::InvalidUnionMember {
                                union: def.name.clone(),
                                member: member.clone(),
                            });
                        }
                    }
                    possible_types.insert(def.name.clone(), def.members.clone());
                }
                TypeDef::InputObject(def) => {
                    for field in def.fields.values() {
                        self.check_input_type(&def.name, &field.name, &field.ty)?;
                    }
                }
                TypeDef::Scalar(name) => {
                    if !self.scalars.contains_key(name) {
                        return Err(SchemaError::MissingScalarCodec(name.clone()));
                    }
                }
                TypeDef::Enum(_) => {}
            }

            if ty.is_abstract() && !self.discriminators.contains_key(ty.name()) {
                return Err(SchemaError::MissingDiscriminator(ty.name().to_string()));
            }
        }

        for name in std::iter::once(&self.query_type)
            .chain(self.mutation_type.iter())
            .chain(self.subscription_type.iter())
        {
            match self.types.get(name) {
                Some(TypeDef::Object(_)) => {}
                Some(_) => return Err(SchemaError::InvalidRootType(name.clone())),
                None => return Err(SchemaError::UnknownType(name.clone())),
            }
        }

        tracing::debug!(
            types = self.types.len(),
            abstract_types = possible_types.len(),
            "type registry built"
        );

        Ok(TypeRegistry {
            types: self.types,
            query_type: self.query_type,
            mutation_type: self.mutation_type,
            subscription_type: self.subscription_type,
            resolvers: self.resolvers,
            discriminators: self.discriminators,
            scalars: self.scalars,
            possible_types,
        })
    }

    fn check_fields(
        &self,
        type_name: &str,
        fields: &IndexMap<String, FieldDef>,
    ) -> Result<(), SchemaError> {
        for field in fields.values() {
            let target = field.ty.named_type();
            match self.types.get(target) {
                Some(ty) if !matches!(ty, TypeDef::InputObject(_)) => {}
                _ => {
                    return Err(SchemaError::UnknownFieldType {
                        type_name: type_name.to_string(),
                        field: field.name.clone(),
                        target: target.to_string(),
                    })
                }
            }
            for argument in field.arguments.values() {
                self.check_input_type(type_name, &field.name, &argument.ty)?;
            }
        }
        Ok(())
    }

    fn check_input_type(
        &self,
        type_name: &str,
        field: &str,
        ty: &TypeRef,
    ) -> Result<(), SchemaError> {
        let target = ty.named_type();
        match self.types.get(target) {
            Some(def) if def.is_input() => Ok(()),
            _ => Err(SchemaError::UnknownFieldType {
                type_name: type_name.to_string(),
                field: field.to_string(),
                target: target.to_string(),
            }),
        }
    }

    fn check_implementation(&self, object: &ObjectDef, interface: &str) -> Result<(), SchemaError> {
        let not_satisfied = |reason: String| SchemaError::InterfaceNotSatisfied {
            object: object.name.clone(),
            interface: interface.to_string(),
            reason,
        };

        let Some(TypeDef::Interface(def)) = self.types.get(interface) else {
            return Err(not_satisfied("not an interface".to_string()));
        };

        for (name, expected) in &def.fields {
            let Some(actual) = object.fields.get(name) else {
                return Err(not_satisfied(format!("missing field '{name}'")));
            };
            if !self.is_subtype(&actual.ty, &expected.ty) {
                return Err(not_satisfied(format!(
                    "field '{name}' has type {} which is not compatible with {}",
                    actual.ty, expected.ty
                )));
            }
            if let Some(arg) = expected
                .arguments
                .keys()
                .find(|arg| !actual.arguments.contains_key(*arg))
            {
                return Err(not_satisfied(format!(
                    "field '{name}' is missing argument '{arg}'"
                )));
            }
        }
        Ok(())
    }

    /// Output covariance: `actual` may be the same type, non-null where the
    /// interface is nullable, or a possible type of an abstract `expected`.
    fn is_subtype(&self, actual: &TypeRef, expected: &TypeRef) -> bool {
        match (actual, expected) {
            (TypeRef::Option(a), TypeRef::Option(e)) => self.is_subtype(a, e),
            (a, TypeRef::Option(e)) => self.is_subtype(a, e),
            (TypeRef::List(a), TypeRef::List(e)) => self.is_subtype(a, e),
            (TypeRef::Named(a), TypeRef::Named(e)) => a == e || self.is_member(a, e),
            _ => false,
        }
    }

    fn is_member(&self, candidate: &str, abstract_type: &str) -> bool {
        match self.types.get(abstract_type) {
            Some(TypeDef::Union(def)) => def.members.iter().any(|m| m == candidate),
            Some(TypeDef::Interface(_)) => matches!(
                self.types.get(candidate),
                Some(TypeDef::Object(def)) if def.implements.iter().any(|i| i == abstract_type)
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::DateScalar;
    use serde_json::json;

    fn media_registry() -> Result<TypeRegistry, SchemaError> {
        SchemaBuilder::new()
            .scalar("Date", Arc::new(DateScalar))
            .add_type(
                InterfaceDef::new("Media")
                    .field(FieldDef::new("id", TypeRef::named("ID")))
                    .field(FieldDef::new("title", TypeRef::nullable("String"))),
            )
            .add_type(
                ObjectDef::new("Movie")
                    .implements("Media")
                    .field(FieldDef::new("id", TypeRef::named("ID")))
                    .field(FieldDef::new("title", TypeRef::named("String")))
                    .field(FieldDef::new("releaseDate", TypeRef::nullable("Date"))),
            )
            .add_type(
                ObjectDef::new("Book")
                    .implements("Media")
                    .field(FieldDef::new("id", TypeRef::named("ID")))
                    .field(FieldDef::new("title", TypeRef::nullable("String"))),
            )
            .add_type(UnionDef::new("SearchResult").member("Movie").member("Book"))
            .add_type(EnumDef::new("Genre").value("DRAMA").value("COMEDY"))
            .add_type(
                ObjectDef::new("Query")
                    .field(FieldDef::new("media", TypeRef::list(TypeRef::named("Media"))))
                    .field(FieldDef::new("search", TypeRef::nullable("SearchResult"))),
            )
            .discriminator("Media", |v| v.get("kind")?.as_str().map(String::from))
            .discriminator("SearchResult", |v| {
                v.get("kind")?.as_str().map(String::from)
            })
            .build()
    }

    #[test]
    fn test_type_ref_display() {
        assert_eq!(TypeRef::named("Int").to_string(), "Int!");
        assert_eq!(TypeRef::nullable("Int").to_string(), "Int");
        assert_eq!(
            TypeRef::list(TypeRef::nullable("Int")).optional().to_string(),
            "[Int]"
        );
        assert_eq!(TypeRef::list(TypeRef::named("Int")).to_string(), "[Int!]!");
        assert_eq!(TypeRef::list(TypeRef::named("Int")).list_depth(), 1);
    }

    #[test]
    fn test_describe_unknown_type() {
        let registry = media_registry().unwrap();
        assert_eq!(
            registry.describe("Nope").unwrap_err(),
            SchemaError::UnknownType("Nope".into())
        );
        assert_eq!(registry.describe("Movie").unwrap().kind(), TypeKind::Object);
    }

    #[test]
    fn test_resolve_variant() {
        let registry = media_registry().unwrap();

        let movie = registry
            .resolve_variant("Media", &json!({"kind": "Movie"}))
            .unwrap();
        assert_eq!(movie.name, "Movie");

        let book = registry
            .resolve_variant("SearchResult", &json!({"kind": "Book"}))
            .unwrap();
        assert_eq!(book.name, "Book");

        assert!(registry
            .resolve_variant("Media", &json!({"title": "untagged"}))
            .is_err());
        assert!(registry
            .resolve_variant("Media", &json!({"kind": "Query"}))
            .is_err());
    }

    #[test]
    fn test_possible_types() {
        let registry = media_registry().unwrap();
        assert_eq!(registry.possible_types("Media"), ["Movie", "Book"]);
        assert!(registry.is_possible_type("SearchResult", "Book"));
        assert!(registry.is_possible_type("Movie", "Movie"));
        assert!(!registry.is_possible_type("Media", "Query"));
    }

    #[test]
    fn test_leaf_coercion() {
        let registry = media_registry().unwrap();
        assert_eq!(registry.serialize_leaf("ID", &json!(7)).unwrap(), json!("7"));
        assert_eq!(
            registry.serialize_leaf("Genre", &json!("DRAMA")).unwrap(),
            json!("DRAMA")
        );
        assert!(registry.serialize_leaf("Genre", &json!("HORROR")).is_err());
        assert!(registry.parse_leaf("Date", &json!("yesterday")).is_err());
    }

    #[test]
    fn test_missing_discriminator() {
        let result = SchemaBuilder::new()
            .add_type(UnionDef::new("U").member("Query"))
            .add_type(ObjectDef::new("Query").field(FieldDef::new("u", TypeRef::nullable("U"))))
            .build();
        assert_eq!(
            result.unwrap_err(),
            SchemaError::MissingDiscriminator("U".into())
        );
    }

    #[test]
    fn test_interface_must_be_satisfied() {
        let result = SchemaBuilder::new()
            .add_type(InterfaceDef::new("Node").field(FieldDef::new("id", TypeRef::named("ID"))))
            .add_type(
                ObjectDef::new("Query")
                    .implements("Node")
                    .field(FieldDef::new("id", TypeRef::nullable("ID"))),
            )
            .discriminator("Node", |_| Some("Query".into()))
            .build();
        assert!(matches!(
            result.unwrap_err(),
            SchemaError::InterfaceNotSatisfied { .. }
        ));
    }

    #[test]
    fn test_union_members_must_be_objects() {
        let result = SchemaBuilder::new()
            .add_type(UnionDef::new("U").member("String"))
            .add_type(ObjectDef::new("Query").field(FieldDef::new("u", TypeRef::nullable("U"))))
            .discriminator("U", |_| None)
            .build();
        assert!(matches!(
            result.unwrap_err(),
            SchemaError::InvalidUnionMember { .. }
        ));
    }

    #[test]
    fn test_unknown_field_type() {
        let result = SchemaBuilder::new()
            .add_type(ObjectDef::new("Query").field(FieldDef::new("x", TypeRef::named("Missing"))))
            .build();
        assert!(matches!(
            result.unwrap_err(),
            SchemaError::UnknownFieldType { .. }
        ));
    }
}
