//! Rendering of single resource objects.

use indexmap::{IndexMap, IndexSet};
use serde_json::{json, Map, Value};

use crate::descriptor::{Context, Descriptor, Linkage, Relationship, Resource};
use crate::error::SerializeError;
use crate::registry::Registry;

/// Sparse fieldsets: per JSON:API type, the wire names allowed in output.
///
/// Types without an entry are unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fieldsets(IndexMap<String, IndexSet<String>>);

impl Fieldsets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict `type_name` to `fields`. Items may be comma-joined lists.
    pub fn insert<I, S>(&mut self, type_name: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.0.entry(type_name.into()).or_default();
        for item in fields {
            entry.extend(
                item.as_ref()
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from),
            );
        }
    }

    pub fn with<I, S>(mut self, type_name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.insert(type_name, fields);
        self
    }

    pub fn allows(&self, type_name: &str, field: &str) -> bool {
        match self.0.get(type_name) {
            Some(fields) => fields.contains(field),
            None => true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-call options threaded through rendering.
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    /// Passed to every visibility predicate and attribute accessor.
    pub context: Context,
    pub fields: Fieldsets,
    /// Wire names of relationships that must carry `data` on this resource.
    pub include_linkages: IndexSet<String>,
    /// Prefix of every generated link; empty for relative links.
    pub base_url: String,
    /// Descriptor-lookup qualifier for related objects.
    pub namespace: Option<String>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    pub fn fields(mut self, fields: Fieldsets) -> Self {
        self.fields = fields;
        self
    }

    pub fn include_linkages<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.include_linkages = names.into_iter().map(Into::into).collect();
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
}

/// Render `object` as a JSON:API resource object using `descriptor`.
///
/// Returns `Ok(None)` for a missing object. Related objects are resolved
/// through `registry` only far enough to produce their identifiers.
///
/// # Errors
///
/// Propagates accessor failures and missing descriptors for related objects.
pub fn render(
    object: Option<&dyn Resource>,
    descriptor: &Descriptor,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<Option<Value>, SerializeError> {
    let Some(object) = object else {
        return Ok(None);
    };
    let formatter = registry.formatter();
    let type_name = descriptor.type_name();
    let id = descriptor.id_of(object)?;

    let mut resource = Map::new();
    resource.insert("type".to_string(), Value::String(type_name.to_string()));
    if !id.trim().is_empty() {
        resource.insert("id".to_string(), Value::String(id.clone()));
    }

    let mut attributes = Map::new();
    for (name, attribute) in descriptor.attributes() {
        let wire_name = formatter.format(name);
        if !options.fields.allows(type_name, &wire_name)
            || !attribute.is_visible(object, &options.context)?
        {
            continue;
        }
        let value = attribute.value(object, &options.context)?;
        attributes.insert(wire_name, value);
    }
    if !attributes.is_empty() {
        resource.insert("attributes".to_string(), Value::Object(attributes));
    }

    let self_link = descriptor.self_link(object, &id, &options.base_url)?;

    let mut relationships = Map::new();
    for (name, relationship) in descriptor.relationships() {
        let wire_name = formatter.format(name);
        if !options.fields.allows(type_name, &wire_name)
            || !relationship.is_visible(object, &options.context)?
        {
            continue;
        }
        let rendered = render_relationship(
            object,
            &wire_name,
            relationship,
            self_link.as_deref(),
            registry,
            options,
        )?;
        if let Some(rendered) = rendered {
            relationships.insert(wire_name, rendered);
        }
    }
    if !relationships.is_empty() {
        resource.insert("relationships".to_string(), Value::Object(relationships));
    }

    if let Some(link) = &self_link {
        resource.insert("links".to_string(), json!({ "self": link }));
    }

    if let Some(meta) = descriptor.meta(object, &options.context)? {
        if !meta.is_null() {
            resource.insert("meta".to_string(), meta);
        }
    }

    tracing::trace!(type_name, id = %id, "rendered resource");
    Ok(Some(Value::Object(resource)))
}

/// Render `object` with whatever descriptor the registry holds for it.
pub fn render_resource(
    object: Option<&dyn Resource>,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<Option<Value>, SerializeError> {
    match object {
        Some(object) => {
            let descriptor = registry.lookup(object, options.namespace.as_deref())?;
            render(Some(object), descriptor, registry, options)
        }
        None => Ok(None),
    }
}

fn render_relationship(
    object: &dyn Resource,
    wire_name: &str,
    relationship: &Relationship,
    self_link: Option<&str>,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<Option<Value>, SerializeError> {
    let mut rendered = Map::new();

    if relationship.include_links {
        if let Some(link) = self_link {
            rendered.insert(
                "links".to_string(),
                json!({
                    "self": format!("{}/relationships/{}", link, wire_name),
                    "related": format!("{}/{}", link, wire_name),
                }),
            );
        }
    }

    if relationship.include_data || options.include_linkages.contains(wire_name) {
        let namespace = options.namespace.as_deref();
        let data = match relationship.load(object)? {
            Linkage::One(None) => Value::Null,
            Linkage::One(Some(related)) => registry
                .identify(related.as_ref(), namespace)?
                .to_identifier(),
            Linkage::Many(related) => Value::Array(
                related
                    .iter()
                    .map(|r| {
                        registry
                            .identify(r.as_ref(), namespace)
                            .map(|key| key.to_identifier())
                    })
                    .collect::<Result<_, _>>()?,
            ),
        };
        rendered.insert("data".to_string(), data);
    }

    Ok((!rendered.is_empty()).then_some(Value::Object(rendered)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{FieldOptions, ResourceRef};
    use std::rc::Rc;

    struct Post {
        id: u32,
        title: String,
        body: String,
        author: Option<Rc<User>>,
        comments: Vec<Rc<Comment>>,
    }
    impl Resource for Post {}

    struct User {
        id: u32,
        name: String,
    }
    impl Resource for User {}

    struct Comment {
        id: u32,
    }
    impl Resource for Comment {}

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry
            .register(
                Descriptor::builder::<Post>("posts")
                    .id(|p| p.id)
                    .attribute("title", |p, _| p.title.clone())
                    .attribute("long_content", |p, _| p.body.clone())
                    .has_one("author", |p| p.author.clone().map(|a| a as ResourceRef))
                    .has_many("long_comments", |p| {
                        p.comments
                            .iter()
                            .map(|c| c.clone() as ResourceRef)
                            .collect::<Vec<_>>()
                    })
                    .build()
                    .unwrap(),
            )
            .register(
                Descriptor::builder::<User>("users")
                    .id(|u| u.id)
                    .attribute("name", |u, _| u.name.clone())
                    .build()
                    .unwrap(),
            )
            .register(
                Descriptor::builder::<Comment>("long-comments")
                    .id(|c| c.id)
                    .build()
                    .unwrap(),
            );
        registry
    }

    fn post() -> Post {
        Post {
            id: 1,
            title: "Title for Post 1".into(),
            body: "Body for Post 1".into(),
            author: None,
            comments: vec![],
        }
    }

    fn render_post(post: &Post, options: &RenderOptions) -> Value {
        render_resource(Some(post), &registry(), options)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn none_renders_none() {
        let registry = registry();
        let descriptor = registry.lookup(&post(), None).unwrap();
        let result = render(None, descriptor, &registry, &RenderOptions::new()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn renders_links_without_linkage_by_default() {
        let rendered = render_post(&post(), &RenderOptions::new());
        assert_eq!(
            rendered,
            json!({
                "type": "posts",
                "id": "1",
                "attributes": {
                    "title": "Title for Post 1",
                    "long-content": "Body for Post 1",
                },
                "relationships": {
                    "author": {
                        "links": {
                            "self": "/posts/1/relationships/author",
                            "related": "/posts/1/author",
                        },
                    },
                    "long-comments": {
                        "links": {
                            "self": "/posts/1/relationships/long-comments",
                            "related": "/posts/1/long-comments",
                        },
                    },
                },
                "links": { "self": "/posts/1" },
            })
        );
    }

    #[test]
    fn requested_linkage_for_empty_relationships() {
        let options = RenderOptions::new().include_linkages(["author", "long-comments"]);
        let rendered = render_post(&post(), &options);
        assert_eq!(rendered["relationships"]["author"]["data"], Value::Null);
        assert_eq!(rendered["relationships"]["long-comments"]["data"], json!([]));
    }

    #[test]
    fn requested_linkage_for_populated_relationships() {
        let mut p = post();
        p.author = Some(Rc::new(User {
            id: 1,
            name: "User #1".into(),
        }));
        p.comments = vec![Rc::new(Comment { id: 1 }), Rc::new(Comment { id: 2 })];

        let options = RenderOptions::new().include_linkages(["author", "long-comments"]);
        let rendered = render_post(&p, &options);
        assert_eq!(
            rendered["relationships"]["author"]["data"],
            json!({"type": "users", "id": "1"})
        );
        assert_eq!(
            rendered["relationships"]["long-comments"]["data"],
            json!([
                {"type": "long-comments", "id": "1"},
                {"type": "long-comments", "id": "2"},
            ])
        );
        // the related user's attributes are never rendered inline
        assert!(rendered["relationships"]["author"]["data"]
            .get("attributes")
            .is_none());
    }

    #[test]
    fn base_url_prefixes_links() {
        let options = RenderOptions::new().base_url("https://api.test");
        let rendered = render_post(&post(), &options);
        assert_eq!(rendered["links"]["self"], "https://api.test/posts/1");
        assert_eq!(
            rendered["relationships"]["author"]["links"]["related"],
            "https://api.test/posts/1/author"
        );
    }

    #[test]
    fn sparse_fieldsets_filter_attributes_and_relationships() {
        let options = RenderOptions::new().fields(Fieldsets::new().with("posts", ["title,author"]));
        let rendered = render_post(&post(), &options);
        assert_eq!(rendered["attributes"], json!({"title": "Title for Post 1"}));
        let relationships = rendered["relationships"].as_object().unwrap();
        assert_eq!(relationships.keys().collect::<Vec<_>>(), ["author"]);
    }

    #[test]
    fn descriptor_without_fields_renders_identity_and_link_only() {
        let rendered = render_resource(Some(&Comment { id: 9 }), &registry(), &RenderOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(
            rendered,
            json!({"type": "long-comments", "id": "9", "links": {"self": "/long-comments/9"}})
        );
    }

    #[test]
    fn blank_id_omits_id_and_self_link() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::builder::<User>("users")
                .id(|_| "")
                .attribute("name", |u, _| u.name.clone())
                .build()
                .unwrap(),
        );
        let user = User {
            id: 0,
            name: "draft".into(),
        };
        let rendered = render_resource(Some(&user), &registry, &RenderOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(rendered, json!({"type": "users", "attributes": {"name": "draft"}}));
    }

    #[test]
    fn relationship_without_links_or_data_is_omitted() {
        let mut registry = Registry::new();
        registry
            .register(
                Descriptor::builder::<Post>("posts")
                    .id(|p| p.id)
                    .has_one_with(
                        "author",
                        |p| p.author.clone().map(|a| a as ResourceRef),
                        FieldOptions::new().links(false),
                    )
                    .has_many_with(
                        "long_comments",
                        |p| {
                            p.comments
                                .iter()
                                .map(|c| c.clone() as ResourceRef)
                                .collect::<Vec<_>>()
                        },
                        FieldOptions::new().links(false).data(true),
                    )
                    .build()
                    .unwrap(),
            )
            .register(
                Descriptor::builder::<Comment>("long-comments")
                    .id(|c| c.id)
                    .build()
                    .unwrap(),
            );
        let mut p = post();
        p.comments = vec![Rc::new(Comment { id: 4 })];

        let rendered = render_resource(Some(&p), &registry, &RenderOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(
            rendered["relationships"],
            json!({"long-comments": {"data": [{"type": "long-comments", "id": "4"}]}})
        );
    }

    #[test]
    fn meta_and_self_link_overrides() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::builder::<User>("users")
                .id(|u| u.id)
                .meta(|_, _| Some(json!({"copyright": "Copyright 2015 Example Corp."})))
                .self_link(|u, base| Some(format!("{}/people/{}", base, u.id)))
                .build()
                .unwrap(),
        );
        let user = User {
            id: 5,
            name: "x".into(),
        };
        let rendered = render_resource(Some(&user), &registry, &RenderOptions::new())
            .unwrap()
            .unwrap();
        assert_eq!(rendered["links"]["self"], "/people/5");
        assert_eq!(rendered["meta"]["copyright"], "Copyright 2015 Example Corp.");
    }

    #[test]
    fn context_drives_visibility() {
        let mut registry = Registry::new();
        registry.register(
            Descriptor::builder::<Post>("posts")
                .id(|p| p.id)
                .attribute_with(
                    "body",
                    |p, _| p.body.clone(),
                    FieldOptions::new()
                        .when(|_, ctx| ctx.get("show_body") == Some(&json!(true)))
                        .unless(|_, ctx| ctx.get("hide_body") == Some(&json!(true))),
                )
                .build()
                .unwrap(),
        );
        let p = post();
        let with = |ctx: Value| {
            let options = RenderOptions::new().context(ctx.as_object().unwrap().clone());
            render_resource(Some(&p), &registry, &options)
                .unwrap()
                .unwrap()
        };

        assert!(with(json!({"show_body": false})).get("attributes").is_none());
        assert_eq!(with(json!({"show_body": true}))["attributes"]["body"], "Body for Post 1");
        assert!(with(json!({"show_body": true, "hide_body": true}))
            .get("attributes")
            .is_none());
    }
}
