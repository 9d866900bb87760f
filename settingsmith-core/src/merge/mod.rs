//! Injecting resolved credentials into a Maven `settings.xml`.
//!
//! The merger rewrites only the `<server>` entries it has credentials for
//! (and the `<servers>` container when it has to create one). All other
//! bytes of the template, including comments, whitespace and attribute
//! quoting, come out unchanged. Inserted markup follows the document's
//! line endings and indentation.
//!
//! # Policies
//!
//! With `replace_all` an existing entry keeps only its `<id>` and gets a
//! fresh authentication block. Otherwise `username`, `password`,
//! `privateKey` and `passphrase` are overwritten in place, added, or
//! removed to match the credential, and every other child is preserved.

mod document;

use quick_xml::escape::escape;
use std::ops::Range;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::credential::ResolvedCredential;
use crate::model::{MergePolicy, ServerId};
use crate::resolve::ResolvedCredentialMap;
use document::Document;

/// `<server>` children that carry authentication.
pub const AUTH_ELEMENTS: [&str; 4] = ["username", "password", "privateKey", "passphrase"];

/// Error type for settings templates that cannot be merged.
///
/// Positions refer to the template, which never contains injected secrets.
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("not well-formed XML at byte {position}: {message}")]
    Malformed { position: usize, message: String },

    #[error("document has no root element")]
    Empty,

    #[error("root element is <{found}>, expected <settings>")]
    UnexpectedRoot { found: String },

    #[error("element <{name}> is never closed")]
    Unclosed { name: String },
}

/// Rewrites settings templates according to a [`MergePolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsMerger {
    policy: MergePolicy,
}

impl SettingsMerger {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> MergePolicy {
        self.policy
    }

    /// Parse `template` as a settings document without rewriting it.
    pub fn validate(&self, template: &str) -> Result<(), MergeError> {
        Document::parse(template).map(|_| ())
    }

    /// Inject `resolved` into `template`.
    ///
    /// An empty map returns the template unchanged without parsing it.
    /// Entries are processed in map order; every `<server>` whose `<id>`
    /// matches is rewritten, and ids with no entry get a new one appended
    /// to `<servers>`.
    pub fn merge(&self, template: &str, resolved: &ResolvedCredentialMap) -> Result<String, MergeError> {
        if resolved.is_empty() {
            return Ok(template.to_string());
        }

        let doc = Document::parse(template)?;
        let rewriter = Rewriter {
            layout: Layout {
                newline: doc.newline(),
                unit: doc.indent_unit(),
            },
            doc: &doc,
        };
        let root = doc.root();
        let mut edits = Vec::new();

        match doc.first_child(root, "servers") {
            Some(servers) => {
                let mut missing = Vec::new();
                for (server_id, credential) in resolved.iter() {
                    let entries: Vec<usize> = doc
                        .children_named(servers, "server")
                        .filter(|&server| doc.child_text(server, "id") == Some(server_id.as_str()))
                        .collect();
                    if entries.is_empty() {
                        missing.push(server_node(server_id, credential));
                        continue;
                    }
                    for server in entries {
                        if self.policy.replace_all {
                            let mut children = vec![NewNode::leaf("id", server_id.as_str())];
                            children.extend(auth_nodes(credential));
                            edits.push(rewriter.replace_children(server, &children));
                        } else {
                            rewriter.merge_auth(server, credential, &mut edits);
                        }
                    }
                }
                if !missing.is_empty() {
                    edits.push(rewriter.append(servers, &missing));
                }
            }
            None => {
                let servers = NewNode::Parent {
                    name: "servers",
                    children: resolved
                        .iter()
                        .map(|(server_id, credential)| server_node(server_id, credential))
                        .collect(),
                };
                edits.push(rewriter.append(root, std::slice::from_ref(&servers)));
            }
        }

        tracing::debug!(
            servers = resolved.len(),
            edits = edits.len(),
            policy = %self.policy,
            "merged server credentials"
        );
        Ok(apply(template, edits))
    }
}

/// Markup to insert, values already escaped.
enum NewNode {
    Leaf {
        name: &'static str,
        value: Zeroizing<String>,
    },
    Parent {
        name: &'static str,
        children: Vec<NewNode>,
    },
}

impl NewNode {
    fn leaf(name: &'static str, raw: &str) -> Self {
        Self::Leaf {
            name,
            value: Zeroizing::new(escape(raw).into_owned()),
        }
    }

    /// Render with the element's own line at `indent`, or inline for `None`.
    fn render(&self, indent: Option<&str>, layout: &Layout, out: &mut String) {
        match self {
            Self::Leaf { name, value } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
                out.push_str(value);
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
            Self::Parent { name, children } => {
                out.push('<');
                out.push_str(name);
                out.push('>');
                layout.write_block(children, indent, out);
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

fn auth_nodes(credential: &ResolvedCredential) -> Vec<NewNode> {
    credential
        .auth_fields()
        .into_iter()
        .map(|(name, value)| NewNode::leaf(name, &value))
        .collect()
}

fn server_node(server_id: &ServerId, credential: &ResolvedCredential) -> NewNode {
    let mut children = vec![NewNode::leaf("id", server_id.as_str())];
    children.extend(auth_nodes(credential));
    NewNode::Parent {
        name: "server",
        children,
    }
}

struct Layout {
    newline: &'static str,
    unit: String,
}

impl Layout {
    /// Children of a container whose own line is at `indent`, followed by
    /// the break before its end tag.
    fn write_block(&self, nodes: &[NewNode], indent: Option<&str>, out: &mut String) {
        match indent {
            Some(indent) => {
                let child = format!("{}{}", indent, self.unit);
                for node in nodes {
                    out.push_str(self.newline);
                    out.push_str(&child);
                    node.render(Some(&child), self, out);
                }
                out.push_str(self.newline);
                out.push_str(indent);
            }
            None => {
                for node in nodes {
                    node.render(None, self, out);
                }
            }
        }
    }
}

struct Edit {
    range: Range<usize>,
    text: Zeroizing<String>,
}

impl Edit {
    fn insert(at: usize, text: Zeroizing<String>) -> Self {
        Self { range: at..at, text }
    }

    fn replace(range: Range<usize>, text: Zeroizing<String>) -> Self {
        Self { range, text }
    }
}

struct Rewriter<'d, 'a> {
    doc: &'d Document<'a>,
    layout: Layout,
}

impl Rewriter<'_, '_> {
    /// Add `nodes` after the last child element of `container`.
    fn append(&self, container: usize, nodes: &[NewNode]) -> Edit {
        let el = self.doc.element(container);
        let mut text = Zeroizing::new(String::new());

        if let Some(&last) = el.children.last() {
            let last = self.doc.element(last);
            let indent = self.doc.line_indent(last.start.start);
            for node in nodes {
                if let Some(indent) = indent {
                    text.push_str(self.layout.newline);
                    text.push_str(indent);
                }
                node.render(indent, &self.layout, &mut text);
            }
            return Edit::insert(last.outer_end(), text);
        }

        match &el.end {
            Some(end) => match self.doc.line_indent(end.start) {
                // End tag on its own line: insert whole lines above it.
                Some(end_indent) => {
                    let child = format!("{}{}", end_indent, self.layout.unit);
                    for node in nodes {
                        text.push_str(&child);
                        node.render(Some(&child), &self.layout, &mut text);
                        text.push_str(self.layout.newline);
                    }
                    Edit::insert(end.start - end_indent.len(), text)
                }
                None => {
                    let indent = self.doc.line_indent(el.start.start);
                    self.layout.write_block(nodes, indent, &mut text);
                    Edit::insert(end.start, text)
                }
            },
            None => self.expand(container, nodes),
        }
    }

    /// Replace everything inside `container` with `nodes`.
    fn replace_children(&self, container: usize, nodes: &[NewNode]) -> Edit {
        let el = self.doc.element(container);
        match el.inner() {
            Some(inner) => {
                let mut text = Zeroizing::new(String::new());
                self.layout
                    .write_block(nodes, self.doc.line_indent(el.start.start), &mut text);
                Edit::replace(inner, text)
            }
            None => self.expand(container, nodes),
        }
    }

    /// Turn a self-closing `container` into one holding `nodes`.
    fn expand(&self, container: usize, nodes: &[NewNode]) -> Edit {
        let el = self.doc.element(container);
        let mut text = Zeroizing::new(self.doc.open_tag(container));
        self.layout
            .write_block(nodes, self.doc.line_indent(el.start.start), &mut text);
        text.push_str("</");
        text.push_str(&el.qname);
        text.push('>');
        Edit::replace(el.start.clone(), text)
    }

    /// Bring the authentication children of `server` in line with `credential`.
    fn merge_auth(&self, server: usize, credential: &ResolvedCredential, edits: &mut Vec<Edit>) {
        let fields = credential.auth_fields();
        let mut used = vec![false; fields.len()];
        let floor = self.doc.element(server).start.end;

        for &child in &self.doc.element(server).children {
            let el = self.doc.element(child);
            if !AUTH_ELEMENTS.contains(&el.local.as_str()) {
                continue;
            }
            match fields.iter().position(|(name, _)| *name == el.local) {
                Some(i) if !used[i] => {
                    used[i] = true;
                    let value = Zeroizing::new(escape(fields[i].1.as_str()).into_owned());
                    edits.push(self.set_text(child, value));
                }
                // Stale or duplicate: drop it together with its leading whitespace.
                _ => {
                    let start = self.doc.whitespace_start(el.start.start, floor);
                    edits.push(Edit::replace(start..el.outer_end(), Zeroizing::new(String::new())));
                }
            }
        }

        let missing: Vec<NewNode> = fields
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|((name, value), _)| NewNode::leaf(*name, value))
            .collect();
        if !missing.is_empty() {
            edits.push(self.append(server, &missing));
        }
    }

    fn set_text(&self, element: usize, escaped: Zeroizing<String>) -> Edit {
        let el = self.doc.element(element);
        match el.inner() {
            Some(inner) => Edit::replace(inner, escaped),
            None => {
                let mut text = Zeroizing::new(self.doc.open_tag(element));
                text.push_str(&escaped);
                text.push_str("</");
                text.push_str(&el.qname);
                text.push('>');
                Edit::replace(el.start.clone(), text)
            }
        }
    }
}

/// Apply non-overlapping edits to `source`.
fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    // Stable: insertions at one offset keep the order they were made in.
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let extra: usize = edits.iter().map(|edit| edit.text.len()).sum();
    let mut out = String::with_capacity(source.len() + extra);
    let mut cursor = 0;
    for edit in &edits {
        debug_assert!(edit.range.start >= cursor, "overlapping edits");
        let start = edit.range.start.max(cursor);
        out.push_str(&source[cursor..start]);
        out.push_str(&edit.text);
        cursor = edit.range.end.max(start);
    }
    out.push_str(&source[cursor..]);
    out
}
