//! JSON:API compound documents
//!
//! Turns in-memory object graphs into JSON:API documents: one `data`
//! member for the primary resource(s) and, when include paths are given, a
//! deduplicated `included` list of the related resources they reach.
//!
//! Each domain type gets a [`Descriptor`] declaring its JSON:API type, id,
//! attributes and relationships. Descriptors live in a [`Registry`] that
//! finds the right one for any object reached while walking the graph.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use jsonapi_doc::{serialize, Descriptor, Primary, Registry, Resource, ResourceRef, SerializeOptions};
//! use serde_json::json;
//!
//! struct User { id: u32, name: String }
//! impl Resource for User {}
//!
//! struct Post { id: u32, title: String, author: Option<Rc<User>> }
//! impl Resource for Post {}
//!
//! let mut registry = Registry::new();
//! registry
//!     .register(
//!         Descriptor::builder::<User>("users")
//!             .id(|u| u.id)
//!             .attribute("name", |u, _| u.name.clone())
//!             .build()
//!             .unwrap(),
//!     )
//!     .register(
//!         Descriptor::builder::<Post>("posts")
//!             .id(|p| p.id)
//!             .attribute("title", |p, _| p.title.clone())
//!             .has_one("author", |p| p.author.clone().map(|a| a as ResourceRef))
//!             .build()
//!             .unwrap(),
//!     );
//!
//! let post = Post {
//!     id: 1,
//!     title: "Hello".into(),
//!     author: Some(Rc::new(User { id: 9, name: "Ann".into() })),
//! };
//! let options = SerializeOptions::new().include(["author"]);
//! let document = serialize(&registry, Primary::one(&post), &options).unwrap();
//!
//! assert_eq!(document["data"]["relationships"]["author"]["data"], json!({"type": "users", "id": "9"}));
//! assert_eq!(document["included"][0]["attributes"]["name"], "Ann");
//! ```
//!
//! # Include paths
//!
//! | Request                 | `included` gets                    |
//! |-------------------------|------------------------------------|
//! | `comments`              | every comment                      |
//! | `comments.author`       | comment authors, not the comments  |
//! | `comments,comments.author` | both                            |
//!
//! A segment that names no declared relationship fails the whole call with
//! [`SerializeError::InvalidInclude`].

mod compound;
mod descriptor;
mod document;
mod error;
mod format;
mod include;
mod loader;
mod record;
mod registry;
mod render;
mod validator;

pub use compound::{resolve, resolve_from, IncludedResource, IncludedResources};
pub use descriptor::{
    AsAny, Context, Descriptor, DescriptorBuilder, FieldOptions, Resource, ResourceRef,
    RESERVED_NAMES,
};
pub use document::{
    serialize, serialize_errors, AttributeErrors, ErrorSource, Primary, SerializeOptions,
};
pub use error::{DeclarationError, LoadError, SerializeError, ValidateError, Violation};
pub use format::{Dasherize, KeyFormatter, Verbatim};
pub use include::InclusionTree;
pub use loader::{is_url, load_json, load_json_auto, load_json_str};
pub use record::{
    truthy, AttributeConfig, AttributeSpec, KeyFormat, Record, RelationshipConfig,
    RelationshipSpec, SchemaConfig, Store, TypeConfig,
};
pub use registry::{Registry, ResourceKey};
pub use render::{render, render_resource, Fieldsets, RenderOptions};
pub use validator::{validate_against_schema, validate_document, DOCUMENT_SCHEMA};

#[cfg(feature = "remote")]
pub use loader::load_json_url;
