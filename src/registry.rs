//! Lookup from runtime objects to their descriptors.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::descriptor::{Descriptor, Resource};
use crate::error::SerializeError;
use crate::format::{Dasherize, KeyFormatter};

/// Identity of one resource inside a compound document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub type_name: String,
    pub id: String,
}

impl ResourceKey {
    /// Resource identifier object: `{"type": .., "id": ..}`.
    pub fn to_identifier(&self) -> Value {
        json!({ "type": self.type_name, "id": self.id })
    }
}

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}

/// Descriptors by key, plus the name formatter shared by all of them.
///
/// Built once at startup and read-only afterwards; safe to share between
/// concurrent `serialize` calls.
pub struct Registry {
    descriptors: HashMap<(Option<String>, String), Arc<Descriptor>>,
    formatter: Arc<dyn KeyFormatter>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            descriptors: HashMap::new(),
            formatter: Arc::new(Dasherize),
        }
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<_> = self.descriptors.keys().collect();
        keys.sort();
        f.debug_struct("Registry").field("descriptors", &keys).finish()
    }
}

impl Registry {
    /// Empty registry using the [`Dasherize`] formatter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the name formatter.
    pub fn with_formatter(mut self, formatter: impl KeyFormatter + 'static) -> Self {
        self.formatter = Arc::new(formatter);
        self
    }

    /// File `descriptor` under its own key (the Rust type it was built for).
    pub fn register(&mut self, descriptor: Descriptor) -> &mut Self {
        let key = descriptor.key().to_string();
        self.insert(None, key, descriptor)
    }

    /// File `descriptor` under an explicit key, matched against
    /// [`Resource::descriptor_key`].
    pub fn register_as(&mut self, key: impl Into<String>, descriptor: Descriptor) -> &mut Self {
        self.insert(None, key.into(), descriptor)
    }

    /// File `descriptor` under its own key inside `namespace`.
    pub fn register_in(&mut self, namespace: impl Into<String>, descriptor: Descriptor) -> &mut Self {
        let key = descriptor.key().to_string();
        self.insert(Some(namespace.into()), key, descriptor)
    }

    /// File `descriptor` under an explicit key inside `namespace`.
    pub fn register_in_as(
        &mut self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        descriptor: Descriptor,
    ) -> &mut Self {
        self.insert(Some(namespace.into()), key.into(), descriptor)
    }

    fn insert(&mut self, namespace: Option<String>, key: String, descriptor: Descriptor) -> &mut Self {
        tracing::debug!(
            namespace = namespace.as_deref().unwrap_or(""),
            key = %key,
            type_name = descriptor.type_name(),
            "registered descriptor"
        );
        self.descriptors
            .insert((namespace, key), Arc::new(descriptor));
        self
    }

    pub fn formatter(&self) -> &dyn KeyFormatter {
        self.formatter.as_ref()
    }

    /// Number of registered descriptors, counting each namespace separately.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Descriptor for `object`, optionally qualified by `namespace`.
    ///
    /// Namespaced lookups do not fall back to unqualified descriptors.
    ///
    /// # Errors
    ///
    /// Returns `SerializeError::DescriptorNotFound` when nothing is filed
    /// under the object's key.
    pub fn lookup(
        &self,
        object: &dyn Resource,
        namespace: Option<&str>,
    ) -> Result<&Descriptor, SerializeError> {
        let key = object.descriptor_key();
        self.descriptors
            .get(&(namespace.map(str::to_string), key.to_string()))
            .map(Arc::as_ref)
            .ok_or_else(|| SerializeError::DescriptorNotFound {
                key: match namespace {
                    Some(ns) => format!("{}::{}", ns, key),
                    None => key.to_string(),
                },
            })
    }

    /// `(type, id)` of `object`, without rendering anything else.
    pub fn identify(
        &self,
        object: &dyn Resource,
        namespace: Option<&str>,
    ) -> Result<ResourceKey, SerializeError> {
        let descriptor = self.lookup(object, namespace)?;
        Ok(ResourceKey {
            type_name: descriptor.type_name().to_string(),
            id: descriptor.id_of(object)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::Verbatim;

    struct User {
        id: u32,
    }
    impl Resource for User {}

    struct Admin {
        id: u32,
    }
    impl Resource for Admin {
        fn descriptor_key(&self) -> &str {
            "staff"
        }
    }

    fn users() -> Descriptor {
        Descriptor::builder::<User>("users")
            .id(|u| u.id)
            .build()
            .unwrap()
    }

    #[test]
    fn lookup_by_type_key() {
        let mut registry = Registry::new();
        registry.register(users());

        let key = registry.identify(&User { id: 3 }, None).unwrap();
        assert_eq!(key.type_name, "users");
        assert_eq!(key.id, "3");
        assert_eq!(key.to_identifier(), json!({"type": "users", "id": "3"}));
    }

    #[test]
    fn lookup_by_object_override() {
        let mut registry = Registry::new();
        registry.register_as(
            "staff",
            Descriptor::builder::<Admin>("admins")
                .id(|a| a.id)
                .build()
                .unwrap(),
        );

        let key = registry.identify(&Admin { id: 1 }, None).unwrap();
        assert_eq!(key.to_string(), "admins#1");
    }

    #[test]
    fn missing_descriptor_is_an_error() {
        let registry = Registry::new();
        let result = registry.lookup(&User { id: 1 }, None);
        assert!(matches!(result, Err(SerializeError::DescriptorNotFound { .. })));
    }

    #[test]
    fn namespaced_lookup_is_strict() {
        let mut registry = Registry::new();
        registry.register(users());
        let result = registry.lookup(&User { id: 1 }, Some("v2"));
        assert!(matches!(
            result,
            Err(SerializeError::DescriptorNotFound { key }) if key.starts_with("v2::")
        ));

        registry.register_in(
            "v2",
            Descriptor::builder::<User>("people")
                .id(|u| u.id)
                .build()
                .unwrap(),
        );
        let descriptor = registry.lookup(&User { id: 1 }, Some("v2")).unwrap();
        assert_eq!(descriptor.type_name(), "people");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn formatter_is_replaceable() {
        let registry = Registry::new().with_formatter(Verbatim);
        assert_eq!(registry.formatter().format("long_content"), "long_content");
        assert_eq!(Registry::new().formatter().format("long_content"), "long-content");
    }
}
