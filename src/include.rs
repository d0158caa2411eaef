//! Include-path parsing.
//!
//! `include=comments,comments.author` becomes a tree whose nodes say whether
//! the resources reached at that level are included, and which deeper
//! relationships to follow from there.

use indexmap::{IndexMap, IndexSet};

/// One level of a parsed include request.
///
/// Equality ignores the order in which paths were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InclusionTree {
    include: bool,
    children: IndexMap<String, InclusionTree>,
}

impl InclusionTree {
    /// Parse include paths. Each item may itself be a comma-joined list.
    ///
    /// Whitespace around paths is trimmed, blanks are dropped and duplicates
    /// are ignored. Trailing dots are dropped too, so `author.` means
    /// `author`; other empty segments are kept for resolution to reject.
    /// Intermediate segments are only marked as included when a path ends
    /// there: `a.b` alone includes `b` but not `a`.
    pub fn parse<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut unique = IndexSet::new();
        for item in paths {
            for path in item.as_ref().split(',') {
                let path = path.trim();
                if !path.is_empty() {
                    unique.insert(path.to_string());
                }
            }
        }

        let mut root = Self::default();
        for path in &unique {
            let mut segments: Vec<&str> = path.split('.').map(str::trim).collect();
            while segments.last().is_some_and(|s| s.is_empty()) {
                segments.pop();
            }
            if !segments.is_empty() {
                root.insert(segments.into_iter());
            }
        }
        root
    }

    /// Parse a single comma-joined include string.
    pub fn parse_str(paths: &str) -> Self {
        Self::parse([paths])
    }

    fn insert<'a>(&mut self, mut segments: impl Iterator<Item = &'a str>) {
        let Some(segment) = segments.next() else {
            self.include = true;
            return;
        };
        self.children
            .entry(segment.to_string())
            .or_default()
            .insert(segments);
    }

    /// Whether resources reached at this level go into `included`.
    pub fn is_included(&self) -> bool {
        self.include
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    #[cfg(test)]
    fn get(&self, segment: &str) -> Option<&InclusionTree> {
        self.children.get(segment)
    }

    /// Child segments in first-requested order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &InclusionTree)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Child segments that are themselves included.
    ///
    /// These are the relationships that must carry linkage data on a
    /// resource rendered at this level.
    pub fn linkages(&self) -> IndexSet<String> {
        self.children
            .iter()
            .filter(|(_, node)| node.include)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(include: bool, children: Vec<(&str, InclusionTree)>) -> InclusionTree {
        InclusionTree {
            include,
            children: children
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }

    fn leaf() -> InclusionTree {
        node(true, vec![])
    }

    #[test]
    fn empty_paths() {
        let empty: [&str; 0] = [];
        assert_eq!(InclusionTree::parse(empty), InclusionTree::default());
        assert!(InclusionTree::parse_str("").is_empty());
    }

    #[test]
    fn single_level() {
        let tree = InclusionTree::parse(["foo"]);
        assert_eq!(tree, node(false, vec![("foo", leaf())]));
    }

    #[test]
    fn multi_level_does_not_include_intermediate() {
        let tree = InclusionTree::parse(["foo.bar"]);
        assert_eq!(tree, node(false, vec![("foo", node(false, vec![("bar", leaf())]))]));
        assert!(!tree.get("foo").unwrap().is_included());
    }

    #[test]
    fn same_parent() {
        let tree = InclusionTree::parse(["foo", "foo.bar"]);
        assert_eq!(tree, node(false, vec![("foo", node(true, vec![("bar", leaf())]))]));
    }

    #[test]
    fn different_parents() {
        let tree = InclusionTree::parse(["foo", "bar", "bar.baz"]);
        assert_eq!(
            tree,
            node(
                false,
                vec![
                    ("foo", leaf()),
                    ("bar", node(true, vec![("baz", leaf())])),
                ]
            )
        );
    }

    #[test]
    fn three_levels_with_skipped_middle() {
        let tree = InclusionTree::parse(["foo", "foo.bar.baz"]);
        assert_eq!(
            tree,
            node(
                false,
                vec![("foo", node(true, vec![("bar", node(false, vec![("baz", leaf())]))]))]
            )
        );
    }

    #[test]
    fn order_independent() {
        let a = InclusionTree::parse(["a", "a.b", "c.d", "c"]);
        let b = InclusionTree::parse(["c", "a.b", "c.d", "a"]);
        assert_eq!(a, b);
    }

    #[test]
    fn comma_string_is_split_trimmed_and_deduplicated() {
        let tree = InclusionTree::parse_str("long-comments, long-comments.post.author,long-comments");
        assert_eq!(tree, InclusionTree::parse(["long-comments", "long-comments.post.author"]));
    }

    #[test]
    fn trailing_dots_are_dropped() {
        assert_eq!(InclusionTree::parse(["author."]), InclusionTree::parse(["author"]));
        assert_eq!(InclusionTree::parse(["a.b.. "]), InclusionTree::parse(["a.b"]));
        assert!(InclusionTree::parse(["."]).is_empty());
    }

    #[test]
    fn inner_empty_segments_are_kept() {
        let tree = InclusionTree::parse([".author"]);
        assert_eq!(tree, node(false, vec![("", node(false, vec![("author", leaf())]))]));

        let tree = InclusionTree::parse(["author..author"]);
        let author = tree.get("author").unwrap();
        assert!(!author.is_included());
        assert!(author.get("").unwrap().get("author").unwrap().is_included());
    }

    #[test]
    fn linkages_lists_included_children() {
        let tree = InclusionTree::parse(["comments", "comments.author", "comments.post.tags"]);
        let comments = tree.get("comments").unwrap();
        assert_eq!(comments.linkages().into_iter().collect::<Vec<_>>(), ["author"]);
        assert_eq!(tree.linkages().into_iter().collect::<Vec<_>>(), ["comments"]);
    }
}
