//! Top-level document assembly.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Map, Value};

use crate::compound::resolve_from;
use crate::descriptor::{Context, Descriptor, Resource};
use crate::error::SerializeError;
use crate::format::KeyFormatter;
use crate::include::InclusionTree;
use crate::registry::{Registry, ResourceKey};
use crate::render::{render, render_resource, Fieldsets, RenderOptions};

/// Primary data handed to [`serialize`].
///
/// Whether the caller means one resource or a collection must match
/// [`SerializeOptions::is_collection`]; see [`serialize`].
pub enum Primary<'a> {
    Null,
    One(&'a dyn Resource),
    Many(Vec<&'a dyn Resource>),
}

impl<'a> Primary<'a> {
    pub fn one(object: &'a dyn Resource) -> Self {
        Primary::One(object)
    }

    pub fn many<I>(objects: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn Resource>,
    {
        Primary::Many(objects.into_iter().collect())
    }

    fn objects(&self) -> Vec<&'a dyn Resource> {
        match self {
            Primary::Null => Vec::new(),
            Primary::One(object) => vec![*object],
            Primary::Many(objects) => objects.clone(),
        }
    }
}

impl<'a> From<Option<&'a dyn Resource>> for Primary<'a> {
    fn from(object: Option<&'a dyn Resource>) -> Self {
        match object {
            Some(object) => Primary::One(object),
            None => Primary::Null,
        }
    }
}

/// Options for one [`serialize`] call.
#[derive(Debug, Clone, Default)]
pub struct SerializeOptions {
    /// Must be set to `Some(true)` for collections. See [`serialize`].
    pub is_collection: Option<bool>,
    /// Requested include paths; `Some` even when empty yields an `included` member.
    pub include: Option<Vec<String>>,
    pub context: Context,
    pub fields: Fieldsets,
    pub base_url: String,
    pub namespace: Option<String>,
    pub meta: Option<Value>,
    pub links: Option<Value>,
    pub jsonapi: Option<Value>,
    pub errors: Option<Vec<Value>>,
    /// Trust the shape of the primary data without checking `is_collection`.
    pub skip_collection_check: bool,
    /// Renders the primary data instead of the registry's descriptor.
    /// Related resources are still looked up in the registry.
    pub descriptor: Option<Arc<Descriptor>>,
}

impl SerializeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection(mut self, is_collection: bool) -> Self {
        self.is_collection = Some(is_collection);
        self
    }

    /// Add include paths. Items may be comma-joined lists.
    pub fn include<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let include = self.include.get_or_insert_with(Vec::new);
        include.extend(paths.into_iter().map(|p| p.as_ref().to_string()));
        self
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn fields(mut self, fields: Fieldsets) -> Self {
        self.fields = fields;
        self
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    pub fn links(mut self, links: Value) -> Self {
        self.links = Some(links);
        self
    }

    pub fn jsonapi(mut self, jsonapi: Value) -> Self {
        self.jsonapi = Some(jsonapi);
        self
    }

    pub fn errors(mut self, errors: Vec<Value>) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn skip_collection_check(mut self, skip: bool) -> Self {
        self.skip_collection_check = skip;
        self
    }

    pub fn descriptor(mut self, descriptor: impl Into<Arc<Descriptor>>) -> Self {
        self.descriptor = Some(descriptor.into());
        self
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            context: self.context.clone(),
            fields: self.fields.clone(),
            include_linkages: Default::default(),
            base_url: self.base_url.clone(),
            namespace: self.namespace.clone(),
        }
    }
}

/// Build a complete JSON:API document for `primary`.
///
/// `options.is_collection` must agree with the shape of `primary`: a
/// `Many` without `is_collection: true`, or anything else with it, fails
/// with `AmbiguousCollection` unless `skip_collection_check` is set.
///
/// When `options.include` is set, the related resources it names are
/// resolved from every primary object, deduplicated by `(type, id)`, and
/// rendered into `included`.
///
/// # Errors
///
/// Returns `SerializeError` for ambiguous collections, invalid include
/// paths, unregistered types and failing accessors. No partial document
/// is produced.
pub fn serialize(
    registry: &Registry,
    primary: Primary<'_>,
    options: &SerializeOptions,
) -> Result<Value, SerializeError> {
    check_collection(&primary, options)?;

    let tree = options
        .include
        .as_ref()
        .map(|paths| InclusionTree::parse(paths.iter()));

    let mut primary_options = options.render_options();
    if let Some(tree) = &tree {
        primary_options.include_linkages = tree.linkages();
    }

    let descriptor = options.descriptor.as_deref();
    let render_primary = |object: &dyn Resource| -> Result<Value, SerializeError> {
        let rendered = match descriptor {
            Some(descriptor) => render(Some(object), descriptor, registry, &primary_options)?,
            None => render_resource(Some(object), registry, &primary_options)?,
        };
        Ok(rendered.unwrap_or(Value::Null))
    };

    let data = match &primary {
        Primary::Null if options.is_collection == Some(true) => Value::Array(Vec::new()),
        Primary::Null => Value::Null,
        Primary::One(object) => render_primary(*object)?,
        Primary::Many(objects) => Value::Array(
            objects
                .iter()
                .map(|object| render_primary(*object))
                .collect::<Result<_, _>>()?,
        ),
    };

    let mut document = Map::new();
    document.insert("data".to_string(), data);

    if let Some(tree) = &tree {
        let roots = primary.objects();
        let resolved = resolve_from(&roots, descriptor, tree, registry, &primary_options)?;

        // A compound document carries each (type, id) once; primaries stay in `data`.
        let primary_keys = roots
            .iter()
            .map(|object| match descriptor {
                Some(descriptor) => Ok(ResourceKey {
                    type_name: descriptor.type_name().to_string(),
                    id: descriptor.id_of(*object)?,
                }),
                None => registry.identify(*object, primary_options.namespace.as_deref()),
            })
            .collect::<Result<HashSet<_>, SerializeError>>()?;

        let mut included = Vec::with_capacity(resolved.len());
        for (key, entry) in &resolved {
            if primary_keys.contains(key) {
                tracing::trace!(key = %key, "resource already in primary data");
                continue;
            }
            let entry_options = RenderOptions {
                include_linkages: entry.include_linkages.clone(),
                ..primary_options.clone()
            };
            if let Some(rendered) = render_resource(Some(entry.object.as_ref()), registry, &entry_options)? {
                included.push(rendered);
            }
        }
        document.insert("included".to_string(), Value::Array(included));
    }

    if let Some(jsonapi) = options.jsonapi.as_ref().filter(|v| !v.is_null()) {
        document.insert("jsonapi".to_string(), jsonapi.clone());
    }
    if let Some(meta) = options.meta.as_ref().filter(|v| !v.is_null()) {
        document.insert("meta".to_string(), meta.clone());
    }
    if let Some(links) = options.links.as_ref().filter(|v| !v.is_null()) {
        document.insert("links".to_string(), links.clone());
    }
    if let Some(errors) = options.errors.as_ref().filter(|e| !e.is_empty()) {
        document.insert("errors".to_string(), Value::Array(errors.clone()));
    }

    let included = document
        .get("included")
        .and_then(Value::as_array)
        .map(Vec::len);
    tracing::debug!(
        collection = matches!(primary, Primary::Many(_)),
        included,
        "serialized document"
    );
    Ok(Value::Object(document))
}

fn check_collection(primary: &Primary<'_>, options: &SerializeOptions) -> Result<(), SerializeError> {
    if options.skip_collection_check {
        return Ok(());
    }
    match (primary, options.is_collection) {
        (Primary::Many(_), Some(true)) => Ok(()),
        (Primary::Many(_), _) => Err(SerializeError::AmbiguousCollection {
            message: "must set is_collection to true when serializing a collection".to_string(),
        }),
        (_, Some(true)) => Err(SerializeError::AmbiguousCollection {
            message: "attempted to serialize a single object as a collection".to_string(),
        }),
        _ => Ok(()),
    }
}

/// Validation errors keyed by attribute, with fully formatted messages.
pub trait AttributeErrors {
    /// `(attribute, messages)` pairs, each message already a full sentence.
    fn full_messages(&self) -> Vec<(String, Vec<String>)>;
}

impl AttributeErrors for BTreeMap<String, Vec<String>> {
    fn full_messages(&self) -> Vec<(String, Vec<String>)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl AttributeErrors for IndexMap<String, Vec<String>> {
    fn full_messages(&self) -> Vec<(String, Vec<String>)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl AttributeErrors for HashMap<String, Vec<String>> {
    fn full_messages(&self) -> Vec<(String, Vec<String>)> {
        let mut messages: Vec<_> = self.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        messages.sort_by(|a, b| a.0.cmp(&b.0));
        messages
    }
}

/// Errors to render into an `errors` document.
#[derive(Debug, Clone)]
pub enum ErrorSource {
    /// Already JSON:API error objects; passed through unchanged.
    Objects(Vec<Value>),
    /// Attribute-keyed validation messages.
    Attributes(Vec<(String, Vec<String>)>),
}

impl ErrorSource {
    pub fn from_attribute_errors(errors: &impl AttributeErrors) -> Self {
        ErrorSource::Attributes(errors.full_messages())
    }

    /// JSON:API error objects, each attribute message pointing at
    /// `/data/attributes/{wire-name}`.
    pub fn into_objects(self, formatter: &dyn KeyFormatter) -> Vec<Value> {
        match self {
            ErrorSource::Objects(objects) => objects,
            ErrorSource::Attributes(attributes) => attributes
                .into_iter()
                .flat_map(|(attribute, messages)| {
                    let pointer = format!("/data/attributes/{}", formatter.format(&attribute));
                    messages.into_iter().map(move |detail| {
                        json!({
                            "source": { "pointer": pointer },
                            "detail": detail,
                        })
                    })
                })
                .collect(),
        }
    }
}

impl From<Vec<Value>> for ErrorSource {
    fn from(objects: Vec<Value>) -> Self {
        ErrorSource::Objects(objects)
    }
}

/// Build an `{"errors": [...]}` document.
pub fn serialize_errors(errors: impl Into<ErrorSource>, formatter: &dyn KeyFormatter) -> Value {
    json!({ "errors": errors.into().into_objects(formatter) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::format::Dasherize;

    struct Post {
        id: u32,
        title: String,
    }
    impl Resource for Post {}

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::builder::<Post>("posts")
                .id(|p| p.id)
                .attribute("title", |p, _| p.title.clone())
                .build()
                .unwrap(),
        );
        registry
    }

    fn post(id: u32) -> Post {
        Post {
            id,
            title: format!("Title for Post {}", id),
        }
    }

    #[test]
    fn null_primary() {
        let doc = serialize(&registry(), Primary::Null, &SerializeOptions::new()).unwrap();
        assert_eq!(doc, json!({"data": null}));
    }

    #[test]
    fn null_primary_with_include() {
        let options = SerializeOptions::new().include(["fake"]);
        let doc = serialize(&registry(), Primary::Null, &options).unwrap();
        assert_eq!(doc, json!({"data": null, "included": []}));
    }

    #[test]
    fn empty_collection() {
        let options = SerializeOptions::new().collection(true);
        let doc = serialize(&registry(), Primary::many([]), &options).unwrap();
        assert_eq!(doc, json!({"data": []}));

        let options = options.include(["fake"]);
        let doc = serialize(&registry(), Primary::many([]), &options).unwrap();
        assert_eq!(doc, json!({"data": [], "included": []}));
    }

    #[test]
    fn collection_requires_flag() {
        let (a, b) = (post(1), post(2));
        let primary = || Primary::many([&a as &dyn Resource, &b]);

        let result = serialize(&registry(), primary(), &SerializeOptions::new());
        assert!(matches!(result, Err(SerializeError::AmbiguousCollection { .. })));

        let result = serialize(&registry(), primary(), &SerializeOptions::new().collection(false));
        assert!(matches!(result, Err(SerializeError::AmbiguousCollection { .. })));

        let doc = serialize(&registry(), primary(), &SerializeOptions::new().collection(true)).unwrap();
        assert_eq!(doc["data"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn single_object_as_collection_fails() {
        let p = post(1);
        let options = SerializeOptions::new().collection(true);
        let result = serialize(&registry(), Primary::one(&p), &options);
        assert!(matches!(result, Err(SerializeError::AmbiguousCollection { .. })));
    }

    #[test]
    fn skip_collection_check_trusts_the_shape() {
        let p = post(1);
        let options = SerializeOptions::new().skip_collection_check(true);
        let doc = serialize(&registry(), Primary::many([&p as &dyn Resource]), &options).unwrap();
        assert!(doc["data"].is_array());

        let options = options.collection(true);
        let doc = serialize(&registry(), Primary::one(&p), &options).unwrap();
        assert_eq!(doc["data"]["id"], "1");
    }

    #[test]
    fn top_level_members_in_order() {
        let p = post(1);
        let options = SerializeOptions::new()
            .links(json!({"self": "/posts/1"}))
            .meta(json!({"total": 1}))
            .jsonapi(json!({"version": "1.0"}));
        let doc = serialize(&registry(), Primary::one(&p), &options).unwrap();
        let keys: Vec<_> = doc.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, ["data", "jsonapi", "meta", "links"]);
    }

    #[test]
    fn null_and_empty_members_are_omitted() {
        let options = SerializeOptions::new().meta(Value::Null).errors(vec![]);
        let doc = serialize(&registry(), Primary::Null, &options).unwrap();
        assert_eq!(doc, json!({"data": null}));
    }

    #[test]
    fn attribute_errors_become_pointers() {
        let mut errors = IndexMap::new();
        errors.insert(
            "long_title".to_string(),
            vec!["Long title can't be blank".to_string(), "Long title is too short".to_string()],
        );
        let doc = serialize_errors(ErrorSource::from_attribute_errors(&errors), &Dasherize);
        assert_eq!(
            doc,
            json!({"errors": [
                {"source": {"pointer": "/data/attributes/long-title"}, "detail": "Long title can't be blank"},
                {"source": {"pointer": "/data/attributes/long-title"}, "detail": "Long title is too short"},
            ]})
        );
    }

    #[test]
    fn raw_errors_pass_through() {
        let raw = vec![json!({"status": "422", "title": "Invalid"})];
        let doc = serialize_errors(raw.clone(), &Dasherize);
        assert_eq!(doc, json!({ "errors": raw }));
    }
}
