//! Per-type serialization rules.
//!
//! A [`Descriptor`] says how one domain type becomes a JSON:API resource
//! object: how to read its id, which attributes it exposes and which to-one
//! and to-many relationships it links to. Descriptors are declared once with
//! a typed [`DescriptorBuilder`] and are immutable afterwards.
//!
//! ```
//! use jsonapi_doc::{Descriptor, FieldOptions, Resource};
//! use serde_json::Value;
//!
//! struct Post { id: u64, title: String, body: String }
//! impl Resource for Post {}
//!
//! let posts = Descriptor::builder::<Post>("posts")
//!     .id(|p| p.id)
//!     .attribute("title", |p, _| p.title.clone())
//!     .attribute_with(
//!         "body",
//!         |p, _| p.body.clone(),
//!         FieldOptions::new().when(|_, ctx| ctx.get("show_body") == Some(&Value::Bool(true))),
//!     )
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(posts.type_name(), "posts");
//! assert_eq!(posts.attribute_names().collect::<Vec<_>>(), ["title", "body"]);
//! ```

use std::any::{type_name, Any};
use std::fmt::Display;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{DeclarationError, SerializeError};

/// Read-only, caller-supplied values passed to every predicate and accessor.
pub type Context = Map<String, Value>;

/// Shared handle to a related object, as returned by relationship accessors.
pub type ResourceRef = Rc<dyn Resource>;

/// Wire keys that can never be declared as fields.
pub const RESERVED_NAMES: &[&str] = &["id", "type"];

/// Upcast helper so descriptors can recover the concrete type of a resource.
pub trait AsAny {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A domain object that can be rendered as a JSON:API resource.
///
/// The only required decision is which descriptor applies. By default that
/// is the one registered for the object's Rust type; override
/// [`descriptor_key`](Resource::descriptor_key) to pick a descriptor per
/// object (polymorphic relationships, JSON-backed records).
pub trait Resource: AsAny {
    fn descriptor_key(&self) -> &str {
        type_name::<Self>()
    }
}

pub(crate) type IdFn = Arc<dyn Fn(&dyn Resource) -> Result<String, SerializeError> + Send + Sync>;
pub(crate) type ValueFn =
    Arc<dyn Fn(&dyn Resource, &Context) -> Result<Value, SerializeError> + Send + Sync>;
pub(crate) type PredicateFn =
    Arc<dyn Fn(&dyn Resource, &Context) -> Result<bool, SerializeError> + Send + Sync>;
pub(crate) type ToOneFn =
    Arc<dyn Fn(&dyn Resource) -> Result<Option<ResourceRef>, SerializeError> + Send + Sync>;
pub(crate) type ToManyFn =
    Arc<dyn Fn(&dyn Resource) -> Result<Option<Vec<ResourceRef>>, SerializeError> + Send + Sync>;
pub(crate) type MetaFn =
    Arc<dyn Fn(&dyn Resource, &Context) -> Result<Option<Value>, SerializeError> + Send + Sync>;
pub(crate) type LinkFn =
    Arc<dyn Fn(&dyn Resource, &str) -> Result<Option<String>, SerializeError> + Send + Sync>;
type ProjectFn =
    Arc<dyn Fn(&dyn Resource) -> Result<&dyn Resource, SerializeError> + Send + Sync>;

fn downcast<T: Resource + 'static>(object: &dyn Resource) -> Result<&T, SerializeError> {
    object
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| SerializeError::DescriptorMismatch {
            expected: type_name::<T>().to_string(),
            found: object.descriptor_key().to_string(),
        })
}

/// Declared attribute.
#[derive(Clone)]
pub(crate) struct Attribute {
    value: ValueFn,
    visible: Option<PredicateFn>,
}

impl Attribute {
    pub(crate) fn is_visible(
        &self,
        object: &dyn Resource,
        context: &Context,
    ) -> Result<bool, SerializeError> {
        match &self.visible {
            Some(predicate) => predicate(object, context),
            None => Ok(true),
        }
    }

    pub(crate) fn value(
        &self,
        object: &dyn Resource,
        context: &Context,
    ) -> Result<Value, SerializeError> {
        (self.value)(object, context)
    }
}

#[derive(Clone)]
enum Accessor {
    One(ToOneFn),
    Many(ToManyFn),
}

/// Related objects as read from a relationship accessor.
pub(crate) enum Linkage {
    One(Option<ResourceRef>),
    Many(Vec<ResourceRef>),
}

impl Linkage {
    /// Flatten into a list; a missing to-one is an empty list.
    pub(crate) fn into_objects(self) -> Vec<ResourceRef> {
        match self {
            Linkage::One(object) => object.into_iter().collect(),
            Linkage::Many(objects) => objects,
        }
    }
}

/// Declared to-one or to-many relationship.
#[derive(Clone)]
pub(crate) struct Relationship {
    accessor: Accessor,
    visible: Option<PredicateFn>,
    pub(crate) include_links: bool,
    pub(crate) include_data: bool,
}

impl Relationship {
    pub(crate) fn is_visible(
        &self,
        object: &dyn Resource,
        context: &Context,
    ) -> Result<bool, SerializeError> {
        match &self.visible {
            Some(predicate) => predicate(object, context),
            None => Ok(true),
        }
    }

    pub(crate) fn load(&self, object: &dyn Resource) -> Result<Linkage, SerializeError> {
        match &self.accessor {
            Accessor::One(f) => f(object).map(Linkage::One),
            Accessor::Many(f) => f(object).map(|objects| Linkage::Many(objects.unwrap_or_default())),
        }
    }
}

/// Visibility and linkage options for one declared field.
///
/// Multiple `when`/`unless` conditions are AND-ed together.
pub struct FieldOptions<T> {
    conditions: Vec<Arc<dyn Fn(&T, &Context) -> bool + Send + Sync>>,
    include_links: bool,
    include_data: bool,
}

impl<T> Default for FieldOptions<T> {
    fn default() -> Self {
        Self {
            conditions: Vec::new(),
            include_links: true,
            include_data: false,
        }
    }
}

impl<T: Resource + 'static> FieldOptions<T> {
    /// Visible, with relationship links and without linkage data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Only render the field when `condition` holds.
    pub fn when(mut self, condition: impl Fn(&T, &Context) -> bool + Send + Sync + 'static) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    /// Hide the field when `condition` holds.
    pub fn unless(
        mut self,
        condition: impl Fn(&T, &Context) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditions
            .push(Arc::new(move |object: &T, context: &Context| !condition(object, context)));
        self
    }

    /// Whether a relationship renders `self`/`related` links. Ignored for attributes.
    pub fn links(mut self, include_links: bool) -> Self {
        self.include_links = include_links;
        self
    }

    /// Whether a relationship always renders linkage data. Ignored for attributes.
    pub fn data(mut self, include_data: bool) -> Self {
        self.include_data = include_data;
        self
    }

    fn predicate(&self) -> Option<PredicateFn> {
        if self.conditions.is_empty() {
            return None;
        }
        let conditions = self.conditions.clone();
        Some(Arc::new(
            move |object: &dyn Resource, context: &Context| -> Result<bool, SerializeError> {
                let object = downcast::<T>(object)?;
                Ok(conditions.iter().all(|condition| condition(object, context)))
            },
        ))
    }
}

/// Immutable, type-erased serialization rules for one domain type.
#[derive(Clone)]
pub struct Descriptor {
    type_name: String,
    key: String,
    id: IdFn,
    attributes: IndexMap<String, Attribute>,
    to_one: IndexMap<String, Relationship>,
    to_many: IndexMap<String, Relationship>,
    meta: Option<MetaFn>,
    self_link: Option<LinkFn>,
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Descriptor")
            .field("type_name", &self.type_name)
            .field("key", &self.key)
            .field("attributes", &self.attributes.keys().collect::<Vec<_>>())
            .field("to_one", &self.to_one.keys().collect::<Vec<_>>())
            .field("to_many", &self.to_many.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Descriptor {
    /// Start declaring rules for `T`, rendered with JSON:API type `type_name`.
    pub fn builder<T: Resource + 'static>(type_name: impl Into<String>) -> DescriptorBuilder<T> {
        DescriptorBuilder {
            type_name: type_name.into(),
            key: std::any::type_name::<T>().to_string(),
            id: None,
            attributes: IndexMap::new(),
            to_one: IndexMap::new(),
            to_many: IndexMap::new(),
            meta: None,
            self_link: None,
            error: None,
            _marker: PhantomData,
        }
    }

    /// Start declaring rules for `T` on top of `parent`'s.
    ///
    /// `project` reaches the parent's view of a `T`. Every parent entry is
    /// kept, in the parent's order; later declarations on the returned
    /// builder add to or replace them by name. Type name, id, meta and self
    /// link are inherited until overridden.
    pub fn derive<T, P>(
        parent: &Descriptor,
        project: impl Fn(&T) -> &P + Send + Sync + 'static,
    ) -> DescriptorBuilder<T>
    where
        T: Resource + 'static,
        P: Resource + 'static,
    {
        let project = projection(move |object| {
            let object = downcast::<T>(object)?;
            Ok(project(object) as &dyn Resource)
        });

        let id: IdFn = {
            let (f, p) = (parent.id.clone(), project.clone());
            Arc::new(move |object: &dyn Resource| -> Result<String, SerializeError> {
                f(p(object)?)
            })
        };

        let attributes = parent
            .attributes
            .iter()
            .map(|(name, attribute)| {
                let (f, p) = (attribute.value.clone(), project.clone());
                let value: ValueFn = Arc::new(
                    move |object: &dyn Resource, context: &Context| -> Result<Value, SerializeError> {
                        f(p(object)?, context)
                    },
                );
                let attribute = Attribute {
                    value,
                    visible: attribute.visible.clone().map(|v| project_predicate(v, &project)),
                };
                (name.clone(), attribute)
            })
            .collect();

        let project_relationship = |relationship: &Relationship| {
            let p = project.clone();
            let accessor = match &relationship.accessor {
                Accessor::One(f) => {
                    let f = f.clone();
                    Accessor::One(Arc::new(
                        move |object: &dyn Resource| -> Result<Option<ResourceRef>, SerializeError> {
                            f(p(object)?)
                        },
                    ))
                }
                Accessor::Many(f) => {
                    let f = f.clone();
                    Accessor::Many(Arc::new(
                        move |object: &dyn Resource| -> Result<Option<Vec<ResourceRef>>, SerializeError> {
                            f(p(object)?)
                        },
                    ))
                }
            };
            Relationship {
                accessor,
                visible: relationship
                    .visible
                    .clone()
                    .map(|v| project_predicate(v, &project)),
                include_links: relationship.include_links,
                include_data: relationship.include_data,
            }
        };

        let to_one = parent
            .to_one
            .iter()
            .map(|(name, r)| (name.clone(), project_relationship(r)))
            .collect();
        let to_many = parent
            .to_many
            .iter()
            .map(|(name, r)| (name.clone(), project_relationship(r)))
            .collect();

        let meta = parent.meta.clone().map(|f| {
            let p = project.clone();
            Arc::new(
                move |object: &dyn Resource, context: &Context| -> Result<Option<Value>, SerializeError> {
                    f(p(object)?, context)
                },
            ) as MetaFn
        });
        let self_link = parent.self_link.clone().map(|f| {
            let p = project.clone();
            Arc::new(
                move |object: &dyn Resource, base_url: &str| -> Result<Option<String>, SerializeError> {
                    f(p(object)?, base_url)
                },
            ) as LinkFn
        });

        DescriptorBuilder {
            type_name: parent.type_name.clone(),
            key: std::any::type_name::<T>().to_string(),
            id: Some(id),
            attributes,
            to_one,
            to_many,
            meta,
            self_link,
            error: None,
            _marker: PhantomData,
        }
    }

    /// JSON:API `type` of every resource rendered by this descriptor.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Registry key this descriptor is filed under by default.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Declared attribute names, in declaration order.
    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    /// Declared relationship names: to-one first, then to-many.
    pub fn relationship_names(&self) -> impl Iterator<Item = &str> {
        self.to_one.keys().chain(self.to_many.keys()).map(String::as_str)
    }

    pub(crate) fn id_of(&self, object: &dyn Resource) -> Result<String, SerializeError> {
        (self.id)(object)
    }

    pub(crate) fn attributes(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(name, a)| (name.as_str(), a))
    }

    pub(crate) fn relationships(&self) -> impl Iterator<Item = (&str, &Relationship)> {
        self.to_one
            .iter()
            .chain(self.to_many.iter())
            .map(|(name, r)| (name.as_str(), r))
    }

    pub(crate) fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.to_one.get(name).or_else(|| self.to_many.get(name))
    }

    pub(crate) fn meta(
        &self,
        object: &dyn Resource,
        context: &Context,
    ) -> Result<Option<Value>, SerializeError> {
        match &self.meta {
            Some(f) => f(object, context),
            None => Ok(None),
        }
    }

    /// `{base_url}/{type}/{id}` unless overridden; `None` for blank ids.
    pub(crate) fn self_link(
        &self,
        object: &dyn Resource,
        id: &str,
        base_url: &str,
    ) -> Result<Option<String>, SerializeError> {
        match &self.self_link {
            Some(f) => f(object, base_url),
            None if id.trim().is_empty() => Ok(None),
            None => Ok(Some(format!("{}/{}/{}", base_url, self.type_name, id))),
        }
    }
}

fn project_predicate(predicate: PredicateFn, project: &ProjectFn) -> PredicateFn {
    let p = project.clone();
    Arc::new(
        move |object: &dyn Resource, context: &Context| -> Result<bool, SerializeError> {
            predicate(p(object)?, context)
        },
    )
}

fn projection<F>(f: F) -> ProjectFn
where
    F: for<'a> Fn(&'a dyn Resource) -> Result<&'a dyn Resource, SerializeError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// Typed declaration of a [`Descriptor`].
///
/// Declaration mistakes are collected and reported by [`build`](Self::build).
pub struct DescriptorBuilder<T> {
    type_name: String,
    key: String,
    id: Option<IdFn>,
    attributes: IndexMap<String, Attribute>,
    to_one: IndexMap<String, Relationship>,
    to_many: IndexMap<String, Relationship>,
    meta: Option<MetaFn>,
    self_link: Option<LinkFn>,
    error: Option<DeclarationError>,
    _marker: PhantomData<fn(&T)>,
}

impl<T: Resource + 'static> DescriptorBuilder<T> {
    /// Override the JSON:API type (useful after [`Descriptor::derive`]).
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = type_name.into();
        self
    }

    /// How to read the id. Any `Display` value; rendered as a string.
    pub fn id<I: Display>(mut self, f: impl Fn(&T) -> I + Send + Sync + 'static) -> Self {
        self.id = Some(Arc::new(
            move |object: &dyn Resource| -> Result<String, SerializeError> {
                Ok(f(downcast::<T>(object)?).to_string())
            },
        ));
        self
    }

    pub fn attribute<V: Serialize>(
        self,
        name: &str,
        f: impl Fn(&T, &Context) -> V + Send + Sync + 'static,
    ) -> Self {
        self.attribute_with(name, f, FieldOptions::default())
    }

    pub fn attribute_with<V: Serialize>(
        mut self,
        name: &str,
        f: impl Fn(&T, &Context) -> V + Send + Sync + 'static,
        options: FieldOptions<T>,
    ) -> Self {
        if !self.check_name(name) {
            return self;
        }
        let owned = name.to_string();
        let value: ValueFn = Arc::new(
            move |object: &dyn Resource, context: &Context| -> Result<Value, SerializeError> {
                let object = downcast::<T>(object)?;
                serde_json::to_value(f(object, context)).map_err(|source| {
                    SerializeError::Attribute {
                        name: owned.clone(),
                        source,
                    }
                })
            },
        );
        let attribute = Attribute {
            value,
            visible: options.predicate(),
        };
        self.attributes.insert(name.to_string(), attribute);
        self
    }

    pub fn has_one<R: Into<Option<ResourceRef>>>(
        self,
        name: &str,
        f: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> Self {
        self.has_one_with(name, f, FieldOptions::default())
    }

    pub fn has_one_with<R: Into<Option<ResourceRef>>>(
        mut self,
        name: &str,
        f: impl Fn(&T) -> R + Send + Sync + 'static,
        options: FieldOptions<T>,
    ) -> Self {
        if !self.check_name(name) {
            return self;
        }
        let accessor = Accessor::One(Arc::new(
            move |object: &dyn Resource| -> Result<Option<ResourceRef>, SerializeError> {
                Ok(f(downcast::<T>(object)?).into())
            },
        ));
        let relationship = relationship(accessor, &options);
        self.to_one.insert(name.to_string(), relationship);
        self
    }

    pub fn has_many<R: Into<Option<Vec<ResourceRef>>>>(
        self,
        name: &str,
        f: impl Fn(&T) -> R + Send + Sync + 'static,
    ) -> Self {
        self.has_many_with(name, f, FieldOptions::default())
    }

    pub fn has_many_with<R: Into<Option<Vec<ResourceRef>>>>(
        mut self,
        name: &str,
        f: impl Fn(&T) -> R + Send + Sync + 'static,
        options: FieldOptions<T>,
    ) -> Self {
        if !self.check_name(name) {
            return self;
        }
        let accessor = Accessor::Many(Arc::new(
            move |object: &dyn Resource| -> Result<Option<Vec<ResourceRef>>, SerializeError> {
                Ok(f(downcast::<T>(object)?).into())
            },
        ));
        let relationship = relationship(accessor, &options);
        self.to_many.insert(name.to_string(), relationship);
        self
    }

    /// Resource-level `meta`; omitted when `f` returns `None`.
    pub fn meta(
        mut self,
        f: impl Fn(&T, &Context) -> Option<Value> + Send + Sync + 'static,
    ) -> Self {
        self.meta = Some(Arc::new(
            move |object: &dyn Resource, context: &Context| -> Result<Option<Value>, SerializeError> {
                Ok(f(downcast::<T>(object)?, context))
            },
        ));
        self
    }

    /// Replace the default `{base_url}/{type}/{id}` self link. `None` drops it.
    pub fn self_link(
        mut self,
        f: impl Fn(&T, &str) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.self_link = Some(Arc::new(
            move |object: &dyn Resource, base_url: &str| -> Result<Option<String>, SerializeError> {
                Ok(f(downcast::<T>(object)?, base_url))
            },
        ));
        self
    }

    /// Finish the declaration.
    ///
    /// # Errors
    ///
    /// Returns the first `DeclarationError` recorded while declaring, or
    /// `MissingId` when no id accessor was given.
    pub fn build(self) -> Result<Descriptor, DeclarationError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let id = self.id.ok_or_else(|| DeclarationError::MissingId {
            type_name: self.type_name.clone(),
        })?;
        Ok(Descriptor {
            type_name: self.type_name,
            key: self.key,
            id,
            attributes: self.attributes,
            to_one: self.to_one,
            to_many: self.to_many,
            meta: self.meta,
            self_link: self.self_link,
        })
    }

    fn check_name(&mut self, name: &str) -> bool {
        if !RESERVED_NAMES.contains(&name) {
            return true;
        }
        if self.error.is_none() {
            self.error = Some(DeclarationError::ReservedName {
                type_name: self.type_name.clone(),
                name: name.to_string(),
            });
        }
        false
    }
}

fn relationship<T: Resource + 'static>(accessor: Accessor, options: &FieldOptions<T>) -> Relationship {
    Relationship {
        accessor,
        visible: options.predicate(),
        include_links: options.include_links,
        include_data: options.include_data,
    }
}
