//! Depth-first discovery of the document tree.
//!
//! The walker keeps an explicit work list instead of recursing, so nesting
//! depth never grows the call stack. Visited nodes are recorded in an arena
//! indexed by visitation order; index `0` is always the container.
//!
//! Ordering: a node is parsed and handed to the visitor before any of its
//! children are touched, and its children are pushed in reverse so that they
//! pop in the order the backend reported them. One parent's subtree is thus
//! contiguous in the output.

use crate::backend::ParserBackend;
use crate::document::{keys, set_value, Document, Metadata};
use crate::error::{ExtractError, Result};
use crate::source::ByteSource;
use log::{debug, warn};
use std::io::Read;

/// Default maximum nesting depth of embedded documents
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default size cap for one embedded source (100 MB)
pub const DEFAULT_MAX_EMBEDDED_SIZE: u64 = 100_000_000;

/// Traversal limits and failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalkPolicy {
    /// Deepest level whose nodes are visited (container is level 0)
    pub max_depth: usize,
    /// Embedded sources larger than this are skipped
    pub max_embedded_size: u64,
    /// Record embedded failures instead of aborting.
    ///
    /// Covers both backend parse errors and errors raised while the node's
    /// content stream is decoded or formatted. A failed node keeps no
    /// children.
    pub catch_embedded_errors: bool,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            max_embedded_size: DEFAULT_MAX_EMBEDDED_SIZE,
            catch_embedded_errors: false,
        }
    }
}

/// Position of a visited node in the document tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo {
    /// Visitation index
    pub index: usize,
    /// Nesting depth, `0` for the container
    pub depth: usize,
    /// Arena index of the parent node
    pub parent: Option<usize>,
    /// `/`-joined names from the container down; empty for the container
    pub resource_path: String,
    /// Resource name of the node's byte source
    pub name: Option<String>,
    /// Media type hint declared by the parent
    pub content_type: Option<String>,
}

impl NodeInfo {
    /// Whether this node is the container
    #[inline]
    #[must_use = "checks whether the node is the container"]
    pub const fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Resource path for messages; `/` for the container
    #[inline]
    #[must_use = "returns the display path"]
    pub fn display_path(&self) -> &str {
        if self.resource_path.is_empty() {
            "/"
        } else {
            &self.resource_path
        }
    }
}

/// One arena slot: where a node sits and the document built for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    /// Position in the tree
    pub info: NodeInfo,
    /// Finalized document
    pub document: Document,
}

struct Pending {
    source: ByteSource,
    depth: usize,
    parent: Option<usize>,
    resource_path: String,
}

/// Drives a [`ParserBackend`] over a root source and all its descendants.
#[derive(Debug, Clone, Copy)]
pub struct ContainerWalker<'a> {
    backend: &'a dyn ParserBackend,
    policy: WalkPolicy,
}

impl<'a> ContainerWalker<'a> {
    /// Create a walker with the default policy
    #[inline]
    #[must_use = "creates a walker"]
    pub fn new(backend: &'a dyn ParserBackend) -> Self {
        Self {
            backend,
            policy: WalkPolicy::default(),
        }
    }

    /// Replace the traversal policy
    #[inline]
    #[must_use = "returns the walker with the new policy"]
    pub const fn with_policy(mut self, policy: WalkPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Active policy
    #[inline]
    #[must_use = "returns the traversal policy"]
    pub const fn policy(&self) -> &WalkPolicy {
        &self.policy
    }

    /// Walk the tree rooted at `root`.
    ///
    /// `visit` receives each node's position, its content stream and its
    /// metadata, and returns the finalized [`Document`]. It is called exactly
    /// once per node, in visitation order.
    ///
    /// # Errors
    ///
    /// - [`ExtractError::EmptyInput`] if `root` has zero bytes (checked before
    ///   any parsing)
    /// - [`ExtractError::BackendParseFailure`] if the backend rejects the root,
    ///   or rejects an embedded node while embedded errors are not caught
    /// - any error returned by `visit`
    pub fn walk<F>(&self, root: ByteSource, mut visit: F) -> Result<Vec<TreeNode>>
    where
        F: FnMut(&NodeInfo, &mut dyn Read, Metadata) -> Result<Document>,
    {
        if root.is_empty() {
            return Err(ExtractError::EmptyInput);
        }

        let mut arena: Vec<TreeNode> = Vec::new();
        let mut stack = vec![Pending {
            source: root,
            depth: 0,
            parent: None,
            resource_path: String::new(),
        }];

        while let Some(pending) = stack.pop() {
            let info = NodeInfo {
                index: arena.len(),
                depth: pending.depth,
                parent: pending.parent,
                resource_path: pending.resource_path,
                name: pending.source.name().map(str::to_owned),
                content_type: pending.source.content_type().map(str::to_owned),
            };
            debug!(
                "Visiting node {} at depth {}: {} ({})",
                info.index,
                info.depth,
                info.display_path(),
                self.backend.name()
            );

            let (mut content, mut metadata, children) = match self.backend.parse(&pending.source) {
                Ok(node) => node.into_parts(),
                Err(e) if info.is_root() || !self.policy.catch_embedded_errors => {
                    return Err(ExtractError::backend(info.display_path(), e));
                }
                Err(e) => {
                    warn!(
                        "Embedded document {} failed to parse: {}",
                        info.display_path(),
                        e
                    );
                    let empty: Box<dyn Read> = Box::new(std::io::empty());
                    (empty, failure_metadata(&e), Vec::new())
                }
            };

            let children = self.admit_children(&info, children, &mut metadata);
            let (document, children) = match visit(&info, content.as_mut(), metadata) {
                Ok(document) => (document, children),
                Err(e) if info.is_root() || !self.policy.catch_embedded_errors => return Err(e),
                Err(e) => {
                    warn!(
                        "Embedded document {} failed to extract: {}",
                        info.display_path(),
                        e
                    );
                    let document = visit(&info, &mut std::io::empty(), failure_metadata(&e))?;
                    (document, Vec::new())
                }
            };

            let index = info.index;
            let child_depth = info.depth + 1;
            let parent_path = info.resource_path.clone();
            arena.push(TreeNode { info, document });

            for (ordinal, child) in children.into_iter().enumerate().rev() {
                let name = child
                    .name()
                    .map_or_else(|| format!("embedded-{}", ordinal + 1), str::to_owned);
                stack.push(Pending {
                    source: child,
                    depth: child_depth,
                    parent: Some(index),
                    resource_path: format!("{parent_path}/{name}"),
                });
            }
        }

        Ok(arena)
    }

    /// Apply the depth and size limits to a node's children.
    fn admit_children(
        &self,
        info: &NodeInfo,
        children: Vec<ByteSource>,
        metadata: &mut Metadata,
    ) -> Vec<ByteSource> {
        if children.is_empty() {
            return children;
        }
        if info.depth >= self.policy.max_depth {
            warn!(
                "Depth limit {} reached at {}, skipping {} embedded document(s)",
                self.policy.max_depth,
                info.display_path(),
                children.len()
            );
            set_value(metadata, keys::EMBEDDED_DEPTH_LIMIT_REACHED, "true");
            return Vec::new();
        }

        let max_size = self.policy.max_embedded_size;
        children
            .into_iter()
            .filter(|child| {
                let fits = u64::try_from(child.len()).map_or(false, |len| len <= max_size);
                if !fits {
                    warn!(
                        "Skipping embedded {} under {}: {} bytes exceeds limit of {} bytes",
                        child.name().unwrap_or("<unnamed>"),
                        info.display_path(),
                        child.len(),
                        max_size
                    );
                }
                fits
            })
            .collect()
    }
}

/// Metadata of a node whose extraction failed
fn failure_metadata(error: &dyn std::fmt::Display) -> Metadata {
    let mut metadata = Metadata::new();
    set_value(&mut metadata, keys::EMBEDDED_EXCEPTION, error.to_string());
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendResult, ParsedNode};
    use crate::ErrorKind;

    /// Backend reading a toy tree encoding: `text|child1;child2` where each
    /// child is `name=payload` and payload uses `(` `)` for nesting.
    #[derive(Debug)]
    struct ToyBackend;

    fn split_children(spec: &str) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut depth = 0;
        let mut start = 0;
        for (i, c) in spec.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth -= 1,
                ';' if depth == 0 => {
                    parts.push(&spec[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        if start < spec.len() {
            parts.push(&spec[start..]);
        }
        parts
    }

    impl ParserBackend for ToyBackend {
        fn name(&self) -> &str {
            "toy"
        }

        fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
            let text = std::str::from_utf8(source.bytes())?;
            if text.starts_with("CORRUPT") {
                return Err("corrupt payload".into());
            }
            let (body, children) = text.split_once('|').unwrap_or((text, ""));
            let embedded = split_children(children)
                .into_iter()
                .map(|child| {
                    let (name, payload) = child.split_once('=').unwrap_or((child, "x"));
                    let payload = payload
                        .strip_prefix('(')
                        .and_then(|p| p.strip_suffix(')'))
                        .unwrap_or(payload);
                    ByteSource::new(payload.as_bytes().to_vec()).with_name(name)
                })
                .collect();
            Ok(ParsedNode::from_text(body.to_string()).with_embedded(embedded))
        }
    }

    fn walk(input: &str, policy: WalkPolicy) -> Result<Vec<TreeNode>> {
        let backend = ToyBackend;
        ContainerWalker::new(&backend)
            .with_policy(policy)
            .walk(ByteSource::new(input.as_bytes().to_vec()), |_, content, metadata| {
                let mut text = String::new();
                content
                    .read_to_string(&mut text)
                    .map_err(|e| ExtractError::backend("/", e))?;
                if text.starts_with("UNDECODABLE") {
                    return Err(ExtractError::InvalidEncoding {
                        offset: 0,
                        message: "stream ends inside a sequence".to_string(),
                    });
                }
                Ok(Document::new(text, metadata))
            })
    }

    fn contents(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.document.content.as_str()).collect()
    }

    #[test]
    fn test_depth_first_preorder() {
        let nodes = walk("root|a=(A|a1=A1;a2=A2);b=B", WalkPolicy::default()).unwrap();
        assert_eq!(contents(&nodes), vec!["root", "A", "A1", "A2", "B"]);

        let paths: Vec<_> = nodes.iter().map(|n| n.info.resource_path.as_str()).collect();
        assert_eq!(paths, vec!["", "/a", "/a/a1", "/a/a2", "/b"]);

        let parents: Vec<_> = nodes.iter().map(|n| n.info.parent).collect();
        assert_eq!(parents, vec![None, Some(0), Some(1), Some(1), Some(0)]);
        assert_eq!(nodes[2].info.depth, 2);
    }

    #[test]
    fn test_empty_root_fails_before_parse() {
        let err = walk("", WalkPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }

    #[test]
    fn test_root_failure_always_aborts() {
        let policy = WalkPolicy {
            catch_embedded_errors: true,
            ..WalkPolicy::default()
        };
        let err = walk("CORRUPT", policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendParseFailure);
        assert!(err.to_string().contains("Backend parse failure in /"));
    }

    #[test]
    fn test_embedded_failure_aborts_by_default() {
        let err = walk("root|ok=fine;bad=CORRUPT", WalkPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BackendParseFailure);
        assert!(err.to_string().contains("/bad"));
    }

    #[test]
    fn test_embedded_failure_caught() {
        let policy = WalkPolicy {
            catch_embedded_errors: true,
            ..WalkPolicy::default()
        };
        let nodes = walk("root|bad=CORRUPT;ok=fine", policy).unwrap();
        assert_eq!(contents(&nodes), vec!["root", "", "fine"]);
        assert_eq!(
            nodes[1].document.metadata_value(keys::EMBEDDED_EXCEPTION),
            Some("corrupt payload")
        );
    }

    #[test]
    fn test_stream_failure_aborts_by_default() {
        let err = walk("root|bad=UNDECODABLE", WalkPolicy::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
    }

    #[test]
    fn test_stream_failure_caught() {
        let policy = WalkPolicy {
            catch_embedded_errors: true,
            ..WalkPolicy::default()
        };
        let nodes = walk("root|bad=(UNDECODABLE|child=C);ok=fine", policy).unwrap();
        assert_eq!(contents(&nodes), vec!["root", "", "fine"]);
        assert!(nodes[1]
            .document
            .metadata_value(keys::EMBEDDED_EXCEPTION)
            .is_some_and(|message| message.contains("Invalid encoding")));

        let err = walk("UNDECODABLE", policy).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidEncoding);
    }

    #[test]
    fn test_depth_limit_marks_parent() {
        let policy = WalkPolicy {
            max_depth: 1,
            ..WalkPolicy::default()
        };
        let nodes = walk("root|a=(A|deep=D)", policy).unwrap();
        assert_eq!(contents(&nodes), vec!["root", "A"]);
        assert_eq!(
            nodes[1]
                .document
                .metadata_value(keys::EMBEDDED_DEPTH_LIMIT_REACHED),
            Some("true")
        );
        assert!(nodes[0]
            .document
            .metadata_value(keys::EMBEDDED_DEPTH_LIMIT_REACHED)
            .is_none());
    }

    #[test]
    fn test_oversized_children_skipped() {
        let policy = WalkPolicy {
            max_embedded_size: 3,
            ..WalkPolicy::default()
        };
        let nodes = walk("root|small=abc;big=abcdef", policy).unwrap();
        assert_eq!(contents(&nodes), vec!["root", "abc"]);
    }

    #[test]
    fn test_unnamed_children_get_ordinal_names() {
        #[derive(Debug)]
        struct Anonymous;
        impl ParserBackend for Anonymous {
            fn name(&self) -> &str {
                "anonymous"
            }
            fn parse(&self, source: &ByteSource) -> BackendResult<ParsedNode> {
                let embedded = if source.bytes() == b"root" {
                    vec![ByteSource::new(b"x".to_vec()), ByteSource::new(b"y".to_vec())]
                } else {
                    Vec::new()
                };
                Ok(ParsedNode::from_text(String::new()).with_embedded(embedded))
            }
        }

        let backend = Anonymous;
        let nodes = ContainerWalker::new(&backend)
            .walk(ByteSource::new(b"root".to_vec()), |_, _, metadata| {
                Ok(Document::new(String::new(), metadata))
            })
            .unwrap();
        assert_eq!(nodes[1].info.resource_path, "/embedded-1");
        assert_eq!(nodes[2].info.resource_path, "/embedded-2");
    }
}
