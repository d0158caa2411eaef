//! Mapping between declared field names and wire names.

/// Bidirectional name transform applied to attribute and relationship names.
///
/// `format` turns a declared name into its wire form; `unformat` is the
/// inverse, used to map include paths and fieldsets back onto declarations.
pub trait KeyFormatter: Send + Sync {
    fn format(&self, name: &str) -> String;
    fn unformat(&self, name: &str) -> String;
}

/// `long_content` <-> `long-content`. The default.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dasherize;

impl KeyFormatter for Dasherize {
    fn format(&self, name: &str) -> String {
        name.replace('_', "-")
    }

    fn unformat(&self, name: &str) -> String {
        name.replace('-', "_")
    }
}

/// Leaves names untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbatim;

impl KeyFormatter for Verbatim {
    fn format(&self, name: &str) -> String {
        name.to_string()
    }

    fn unformat(&self, name: &str) -> String {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dasherize_formats_underscores() {
        assert_eq!(Dasherize.format("long_content"), "long-content");
        assert_eq!(Dasherize.format("title"), "title");
    }

    #[test]
    fn dasherize_unformats_dashes() {
        assert_eq!(Dasherize.unformat("long-comments"), "long_comments");
        // already-internal names pass through
        assert_eq!(Dasherize.unformat("long_comments"), "long_comments");
    }

    #[test]
    fn verbatim_is_identity() {
        assert_eq!(Verbatim.format("long_content"), "long_content");
        assert_eq!(Verbatim.unformat("long-content"), "long-content");
    }
}
