//! Compound-document resolution.
//!
//! Walks an [`InclusionTree`] against the object graph and collects every
//! resource that belongs in `included`, keyed by `(type, id)` so that a
//! resource reached along several paths appears once.
//!
//! Recursion follows the tree, not the graph: depth is bounded by the
//! longest include path, so cyclic object graphs terminate without any
//! visited-set bookkeeping.

use std::collections::HashSet;

use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};

use crate::descriptor::{Descriptor, Relationship, Resource, ResourceRef};
use crate::error::SerializeError;
use crate::include::InclusionTree;
use crate::registry::{Registry, ResourceKey};
use crate::render::RenderOptions;

/// A resource selected for `included`.
#[derive(Clone)]
pub struct IncludedResource {
    /// Last object seen with this identity.
    pub object: ResourceRef,
    /// Relationships that must carry linkage data when this resource is rendered.
    pub include_linkages: IndexSet<String>,
}

impl std::fmt::Debug for IncludedResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludedResource")
            .field("object", &self.object.descriptor_key())
            .field("include_linkages", &self.include_linkages)
            .finish()
    }
}

/// Included resources in first-discovery order.
pub type IncludedResources = IndexMap<ResourceKey, IncludedResource>;

struct Walk<'a> {
    registry: &'a Registry,
    options: &'a RenderOptions,
    /// Include paths already checked against a declaring type.
    validated: HashSet<String>,
    results: IncludedResources,
}

/// Collect the resources `tree` selects, starting from `roots` in order.
///
/// Each include segment is checked against the first object reached at
/// that path; objects of other types reached later through the same path
/// are skipped when they do not declare it. A relationship hidden by its
/// visibility predicate is treated as absent.
///
/// # Errors
///
/// Returns `SerializeError::InvalidInclude` for a segment that names no
/// declared relationship (an empty segment included), and propagates
/// accessor and lookup failures.
pub fn resolve(
    roots: &[&dyn Resource],
    tree: &InclusionTree,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<IncludedResources, SerializeError> {
    resolve_from(roots, None, tree, registry, options)
}

/// Like [`resolve`], but reads the roots' relationships from `descriptor`
/// when given. Deeper levels always go through the registry.
pub fn resolve_from(
    roots: &[&dyn Resource],
    descriptor: Option<&Descriptor>,
    tree: &InclusionTree,
    registry: &Registry,
    options: &RenderOptions,
) -> Result<IncludedResources, SerializeError> {
    let mut walk = Walk {
        registry,
        options,
        validated: HashSet::new(),
        results: IndexMap::new(),
    };
    for root in roots {
        let descriptor = match descriptor {
            Some(descriptor) => descriptor,
            None => registry.lookup(*root, options.namespace.as_deref())?,
        };
        walk.visit(*root, descriptor, tree, "")?;
    }
    tracing::debug!(included = walk.results.len(), "resolved compound document");
    Ok(walk.results)
}

impl Walk<'_> {
    fn visit(
        &mut self,
        object: &dyn Resource,
        descriptor: &Descriptor,
        level: &InclusionTree,
        prefix: &str,
    ) -> Result<(), SerializeError> {
        let (registry, options) = (self.registry, self.options);
        let namespace = options.namespace.as_deref();

        for (segment, child) in level.children() {
            if segment.is_empty() {
                return Err(SerializeError::InvalidInclude {
                    segment: String::new(),
                    suggestion: None,
                });
            }
            let path = if prefix.is_empty() {
                segment.to_string()
            } else {
                format!("{}.{}", prefix, segment)
            };

            let relationship = match self.declared(descriptor, segment) {
                Ok(relationship) => relationship,
                Err(_) if self.validated.contains(&path) => {
                    tracing::debug!(
                        path = %path,
                        type_name = descriptor.type_name(),
                        "skipping undeclared include"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            self.validated.insert(path.clone());

            if !relationship.is_visible(object, &options.context)? {
                continue;
            }
            let related = relationship.load(object)?.into_objects();
            if related.is_empty() {
                continue;
            }

            if child.is_included() {
                let linkages = child.linkages();
                for object in &related {
                    let key = registry.identify(object.as_ref(), namespace)?;
                    self.merge(key, object, &linkages);
                }
            }

            if !child.is_empty() {
                for object in &related {
                    let descriptor = registry.lookup(object.as_ref(), namespace)?;
                    self.visit(object.as_ref(), descriptor, child, &path)?;
                }
            }
        }
        Ok(())
    }

    /// The relationship rendered under the wire name `segment`.
    ///
    /// A segment that only matches once unformatted gets a suggestion
    /// carrying the wire name.
    fn declared<'d>(
        &self,
        descriptor: &'d Descriptor,
        segment: &str,
    ) -> Result<&'d Relationship, SerializeError> {
        let formatter = self.registry.formatter();
        if let Some((_, relationship)) = descriptor
            .relationships()
            .find(|(name, _)| formatter.format(name) == segment)
        {
            return Ok(relationship);
        }
        let name = formatter.unformat(segment);
        Err(SerializeError::InvalidInclude {
            segment: segment.to_string(),
            suggestion: descriptor
                .relationship(&name)
                .map(|_| formatter.format(&name)),
        })
    }

    fn merge(&mut self, key: ResourceKey, object: &ResourceRef, linkages: &IndexSet<String>) {
        match self.results.entry(key) {
            Entry::Occupied(mut entry) => {
                let included = entry.get_mut();
                included.object = object.clone();
                included.include_linkages.extend(linkages.iter().cloned());
            }
            Entry::Vacant(entry) => {
                tracing::trace!(key = %entry.key(), "including resource");
                entry.insert(IncludedResource {
                    object: object.clone(),
                    include_linkages: linkages.clone(),
                });
            }
        }
    }
}
