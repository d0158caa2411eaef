//! JSON-backed resources and the schema file that describes them.
//!
//! A [`Store`] holds plain JSON records grouped by kind; relationships are
//! stored as ids and resolved against the store on access. A
//! [`SchemaConfig`] declares, per kind, which fields are attributes and
//! which are relationships, and turns into a [`Registry`].

use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::descriptor::{Context, Descriptor, FieldOptions, Resource, ResourceRef};
use crate::error::{DeclarationError, LoadError};
use crate::format::{Dasherize, Verbatim};
use crate::registry::Registry;

/// One JSON object of a given kind.
#[derive(Debug)]
pub struct Record {
    kind: String,
    id: String,
    fields: Map<String, Value>,
    store: Weak<Store>,
}

impl Resource for Record {
    fn descriptor_key(&self) -> &str {
        &self.kind
    }
}

impl Record {
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Record referenced by `field`, either a bare id of `kind` or an
    /// explicit `{"kind": .., "id": ..}` reference.
    pub fn related(&self, field: &str, kind: &str) -> Option<ResourceRef> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(reference) => self.resolve(field, kind, reference),
        }
    }

    /// Records referenced by the array in `field`. Dangling entries are dropped.
    pub fn related_many(&self, field: &str, kind: &str) -> Option<Vec<ResourceRef>> {
        match self.fields.get(field) {
            None | Some(Value::Null) => None,
            Some(Value::Array(references)) => Some(
                references
                    .iter()
                    .filter_map(|reference| self.resolve(field, kind, reference))
                    .collect(),
            ),
            Some(other) => {
                tracing::warn!(
                    record = %self.key(),
                    field,
                    value = %other,
                    "to-many field is not an array"
                );
                None
            }
        }
    }

    fn resolve(&self, field: &str, kind: &str, reference: &Value) -> Option<ResourceRef> {
        let (kind, id) = match reference {
            Value::Object(object) => (
                object.get("kind").and_then(Value::as_str).unwrap_or(kind),
                object.get("id").and_then(scalar_id)?,
            ),
            other => (kind, scalar_id(other)?),
        };
        let found = self.store.upgrade().and_then(|store| store.get(kind, &id));
        if found.is_none() {
            tracing::warn!(record = %self.key(), field, target = %format!("{}#{}", kind, id), "dangling reference");
        }
        found.map(|record| record as ResourceRef)
    }

    fn key(&self) -> String {
        format!("{}#{}", self.kind, self.id)
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// All records of one data file, indexed by kind and id.
#[derive(Debug, Default)]
pub struct Store {
    records: IndexMap<String, IndexMap<String, Rc<Record>>>,
}

impl Store {
    /// Load `{"kind": [record, ..], ..}`, reading each record's id from the
    /// field the schema declares for its kind.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::InvalidConfig` for undeclared kinds, non-object
    /// records, missing ids and duplicate ids.
    pub fn from_json(data: &Value, schema: &SchemaConfig) -> Result<Rc<Self>, LoadError> {
        let groups = data.as_object().ok_or_else(|| LoadError::InvalidConfig {
            message: "data must be an object of kind -> array of records".to_string(),
        })?;

        let mut parsed: Vec<(String, String, Map<String, Value>)> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for (kind, records) in groups {
            let id_field = schema.id_field(kind).ok_or_else(|| LoadError::InvalidConfig {
                message: format!("data contains undeclared kind '{}'", kind),
            })?;
            let records = records.as_array().ok_or_else(|| LoadError::InvalidConfig {
                message: format!("'{}' must be an array of records", kind),
            })?;
            for (index, record) in records.iter().enumerate() {
                let fields = record.as_object().ok_or_else(|| LoadError::InvalidConfig {
                    message: format!("{}[{}] is not an object", kind, index),
                })?;
                let id = fields
                    .get(id_field)
                    .and_then(scalar_id)
                    .ok_or_else(|| LoadError::InvalidConfig {
                        message: format!("{}[{}] has no '{}'", kind, index, id_field),
                    })?;
                if !seen.insert((kind.clone(), id.clone())) {
                    return Err(LoadError::InvalidConfig {
                        message: format!("duplicate record {}#{}", kind, id),
                    });
                }
                parsed.push((kind.clone(), id, fields.clone()));
            }
        }

        let store = Rc::new_cyclic(|weak: &Weak<Store>| {
            let mut records: IndexMap<String, IndexMap<String, Rc<Record>>> = IndexMap::new();
            for (kind, id, fields) in parsed {
                let record = Rc::new(Record {
                    kind: kind.clone(),
                    id: id.clone(),
                    fields,
                    store: weak.clone(),
                });
                records.entry(kind).or_default().insert(id, record);
            }
            Store { records }
        });
        tracing::debug!(
            kinds = store.records.len(),
            records = store.records.values().map(IndexMap::len).sum::<usize>(),
            "loaded record store"
        );
        Ok(store)
    }

    pub fn get(&self, kind: &str, id: &str) -> Option<Rc<Record>> {
        self.records.get(kind)?.get(id).cloned()
    }

    /// Records of `kind` in file order.
    pub fn all(&self, kind: &str) -> Vec<Rc<Record>> {
        self.records
            .get(kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

/// Truthiness of a context value for `if`/`unless` conditions.
pub fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}

/// Naming convention for wire keys.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KeyFormat {
    #[default]
    Dasherize,
    Verbatim,
}

/// Schema file: kinds and how each is rendered.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    #[serde(default)]
    pub key_format: KeyFormat,
    pub types: IndexMap<String, TypeConfig>,
    /// Alternative declarations selected with a namespace.
    #[serde(default)]
    pub namespaces: IndexMap<String, IndexMap<String, TypeConfig>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TypeConfig {
    /// JSON:API type; defaults to the kind.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    #[serde(default = "default_id_field")]
    pub id: String,
    #[serde(default)]
    pub attributes: Vec<AttributeConfig>,
    #[serde(default)]
    pub has_one: IndexMap<String, RelationshipConfig>,
    #[serde(default)]
    pub has_many: IndexMap<String, RelationshipConfig>,
    /// Field copied into resource-level `meta`.
    pub meta: Option<String>,
}

fn default_id_field() -> String {
    "id".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AttributeConfig {
    Name(String),
    Full(AttributeSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeSpec {
    pub name: String,
    /// Source field when it differs from `name`.
    pub field: Option<String>,
    #[serde(rename = "if")]
    pub when: Option<String>,
    pub unless: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RelationshipConfig {
    Kind(String),
    Full(RelationshipSpec),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipSpec {
    pub kind: String,
    pub field: Option<String>,
    #[serde(default = "default_true")]
    pub links: bool,
    #[serde(default)]
    pub data: bool,
    #[serde(rename = "if")]
    pub when: Option<String>,
    pub unless: Option<String>,
}

impl AttributeConfig {
    fn into_spec(self) -> AttributeSpec {
        match self {
            AttributeConfig::Name(name) => AttributeSpec {
                name,
                field: None,
                when: None,
                unless: None,
            },
            AttributeConfig::Full(spec) => spec,
        }
    }
}

impl RelationshipConfig {
    fn into_spec(self) -> RelationshipSpec {
        match self {
            RelationshipConfig::Kind(kind) => RelationshipSpec {
                kind,
                field: None,
                links: true,
                data: false,
                when: None,
                unless: None,
            },
            RelationshipConfig::Full(spec) => spec,
        }
    }
}

fn field_options(when: Option<String>, unless: Option<String>) -> FieldOptions<Record> {
    let mut options = FieldOptions::new();
    if let Some(key) = when {
        options = options.when(move |_: &Record, context: &Context| truthy(context.get(&key)));
    }
    if let Some(key) = unless {
        options = options.unless(move |_: &Record, context: &Context| truthy(context.get(&key)));
    }
    options
}

impl SchemaConfig {
    /// Parse a schema file already loaded as JSON.
    ///
    /// # Errors
    ///
    /// Returns `LoadError::InvalidConfig` describing the first mismatch.
    pub fn from_value(value: Value) -> Result<Self, LoadError> {
        serde_json::from_value(value).map_err(|e| LoadError::InvalidConfig {
            message: format!("schema: {}", e),
        })
    }

    /// Id field for `kind`, looked up in the default types first.
    pub fn id_field(&self, kind: &str) -> Option<&str> {
        self.types
            .get(kind)
            .or_else(|| self.namespaces.values().find_map(|types| types.get(kind)))
            .map(|config| config.id.as_str())
    }

    /// Declare every kind (and every namespaced kind) in a new registry.
    ///
    /// # Errors
    ///
    /// Returns `DeclarationError::UnknownKind` when a relationship targets
    /// a kind its namespace does not declare, and any builder error.
    pub fn to_registry(&self) -> Result<Registry, DeclarationError> {
        let mut registry = match self.key_format {
            KeyFormat::Dasherize => Registry::new().with_formatter(Dasherize),
            KeyFormat::Verbatim => Registry::new().with_formatter(Verbatim),
        };
        for (kind, config) in &self.types {
            registry.register_as(kind.clone(), declare(kind, config, &self.types)?);
        }
        for (namespace, types) in &self.namespaces {
            for (kind, config) in types {
                registry.register_in_as(namespace.clone(), kind.clone(), declare(kind, config, types)?);
            }
        }
        tracing::debug!(descriptors = registry.len(), "built registry from schema");
        Ok(registry)
    }
}

fn declare(
    kind: &str,
    config: &TypeConfig,
    declared: &IndexMap<String, TypeConfig>,
) -> Result<Descriptor, DeclarationError> {
    let type_name = config.type_name.clone().unwrap_or_else(|| kind.to_string());
    let mut builder = Descriptor::builder::<Record>(type_name).id(|r| r.id().to_string());

    for attribute in &config.attributes {
        let spec = attribute.clone().into_spec();
        let field = spec.field.unwrap_or_else(|| spec.name.clone());
        builder = builder.attribute_with(
            &spec.name,
            move |r: &Record, _: &Context| r.get(&field).cloned().unwrap_or(Value::Null),
            field_options(spec.when, spec.unless),
        );
    }

    for (name, relationship) in &config.has_one {
        let spec = relationship.clone().into_spec();
        check_kind(&spec.kind, declared)?;
        let field = spec.field.unwrap_or_else(|| name.clone());
        let target = spec.kind;
        let options = field_options(spec.when, spec.unless)
            .links(spec.links)
            .data(spec.data);
        builder = builder.has_one_with(name, move |r: &Record| r.related(&field, &target), options);
    }

    for (name, relationship) in &config.has_many {
        let spec = relationship.clone().into_spec();
        check_kind(&spec.kind, declared)?;
        let field = spec.field.unwrap_or_else(|| name.clone());
        let target = spec.kind;
        let options = field_options(spec.when, spec.unless)
            .links(spec.links)
            .data(spec.data);
        builder =
            builder.has_many_with(name, move |r: &Record| r.related_many(&field, &target), options);
    }

    if let Some(field) = config.meta.clone() {
        builder = builder.meta(move |r: &Record, _: &Context| r.get(&field).cloned());
    }

    builder.build()
}

fn check_kind(kind: &str, declared: &IndexMap<String, TypeConfig>) -> Result<(), DeclarationError> {
    if declared.contains_key(kind) {
        Ok(())
    } else {
        Err(DeclarationError::UnknownKind {
            kind: kind.to_string(),
        })
    }
}
