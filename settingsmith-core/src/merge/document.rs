//! Span index over a settings document.
//!
//! Only element boundaries are recorded. Everything between them stays in
//! the source string, so edits can be applied as byte-range replacements
//! and untouched regions come out exactly as they went in.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::ops::Range;

use super::MergeError;

const DEFAULT_INDENT: &str = "  ";

#[derive(Debug)]
pub(crate) struct Element {
    /// Name as written, including any prefix.
    pub qname: String,
    /// Name without prefix.
    pub local: String,
    /// Start tag, or the whole element when self-closing.
    pub start: Range<usize>,
    /// End tag; `None` for `<name/>`.
    pub end: Option<Range<usize>>,
    pub children: Vec<usize>,
    /// Direct character data, unescaped.
    pub text: String,
}

impl Element {
    /// Byte offset just past the element.
    pub fn outer_end(&self) -> usize {
        self.end.as_ref().map_or(self.start.end, |end| end.end)
    }

    /// Content between start and end tag.
    pub fn inner(&self) -> Option<Range<usize>> {
        self.end.as_ref().map(|end| self.start.end..end.start)
    }
}

#[derive(Debug)]
pub(crate) struct Document<'a> {
    source: &'a str,
    elements: Vec<Element>,
    root: usize,
}

impl<'a> Document<'a> {
    /// Index `source`, which must have a single `<settings>` root.
    pub fn parse(source: &'a str) -> Result<Self, MergeError> {
        let mut reader = Reader::from_str(source);
        let mut elements: Vec<Element> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut root: Option<usize> = None;

        loop {
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    return Err(MergeError::Malformed {
                        position: reader.error_position() as usize,
                        message: e.to_string(),
                    });
                }
            };
            let end = reader.buffer_position() as usize;

            match event {
                Event::Start(ref tag) | Event::Empty(ref tag) => {
                    let self_closing = matches!(event, Event::Empty(_));
                    let start = tag_start(source, end);
                    let idx = elements.len();
                    elements.push(Element {
                        qname: String::from_utf8_lossy(tag.name().as_ref()).into_owned(),
                        local: String::from_utf8_lossy(tag.local_name().as_ref()).into_owned(),
                        start: start..end,
                        end: None,
                        children: Vec::new(),
                        text: String::new(),
                    });

                    match stack.last() {
                        Some(&parent) => elements[parent].children.push(idx),
                        None if root.is_none() => root = Some(idx),
                        None => {
                            return Err(MergeError::Malformed {
                                position: start,
                                message: "more than one root element".to_string(),
                            });
                        }
                    }
                    if !self_closing {
                        stack.push(idx);
                    }
                }
                Event::End(_) => {
                    let Some(idx) = stack.pop() else {
                        return Err(MergeError::Malformed {
                            position: end,
                            message: "end tag without start tag".to_string(),
                        });
                    };
                    elements[idx].end = Some(tag_start(source, end)..end);
                }
                Event::Text(ref text) => {
                    if let Some(&idx) = stack.last() {
                        match text.unescape() {
                            Ok(unescaped) => elements[idx].text.push_str(&unescaped),
                            Err(_) => elements[idx].text.push_str(&String::from_utf8_lossy(text)),
                        }
                    }
                }
                Event::CData(ref data) => {
                    if let Some(&idx) = stack.last() {
                        elements[idx].text.push_str(&String::from_utf8_lossy(data));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(&open) = stack.last() {
            return Err(MergeError::Unclosed {
                name: elements[open].qname.clone(),
            });
        }
        let root = root.ok_or(MergeError::Empty)?;
        if elements[root].local != "settings" {
            return Err(MergeError::UnexpectedRoot {
                found: elements[root].qname.clone(),
            });
        }

        Ok(Self {
            source,
            elements,
            root,
        })
    }

    pub fn root(&self) -> usize {
        self.root
    }

    pub fn element(&self, idx: usize) -> &Element {
        &self.elements[idx]
    }

    /// Child elements of `parent` with local name `local`.
    pub fn children_named<'s>(&'s self, parent: usize, local: &'s str) -> impl Iterator<Item = usize> + 's {
        self.elements[parent]
            .children
            .iter()
            .copied()
            .filter(move |&child| self.elements[child].local == local)
    }

    pub fn first_child(&self, parent: usize, local: &str) -> Option<usize> {
        self.children_named(parent, local).next()
    }

    /// Trimmed text of the first `local` child of `parent`.
    pub fn child_text(&self, parent: usize, local: &str) -> Option<&str> {
        self.first_child(parent, local)
            .map(|child| self.elements[child].text.trim())
    }

    /// The start tag of a self-closing element, rewritten as an open tag.
    pub fn open_tag(&self, idx: usize) -> String {
        let raw = &self.source[self.elements[idx].start.clone()];
        let body = raw.strip_suffix("/>").unwrap_or(raw).trim_end();
        format!("{}>", body)
    }

    /// Whitespace before `pos` on its line, or `None` if anything else precedes it.
    pub fn line_indent(&self, pos: usize) -> Option<&'a str> {
        let line_start = self.source[..pos].rfind('\n').map_or(0, |i| i + 1);
        let prefix = &self.source[line_start..pos];
        prefix
            .chars()
            .all(|c| c == ' ' || c == '\t')
            .then_some(prefix)
    }

    /// Start of the whitespace run ending at `pos`, not going below `floor`.
    pub fn whitespace_start(&self, pos: usize, floor: usize) -> usize {
        let trimmed = self.source[floor..pos].trim_end_matches([' ', '\t', '\r', '\n']);
        floor + trimmed.len()
    }

    pub fn newline(&self) -> &'static str {
        if self.source.contains("\r\n") { "\r\n" } else { "\n" }
    }

    /// One level of indentation, taken from the root's first child.
    pub fn indent_unit(&self) -> String {
        let root = &self.elements[self.root];
        root.children
            .first()
            .and_then(|&child| {
                let outer = self.line_indent(root.start.start)?;
                let inner = self.line_indent(self.elements[child].start.start)?;
                inner
                    .strip_prefix(outer)
                    .filter(|unit| !unit.is_empty())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| DEFAULT_INDENT.to_string())
    }
}

/// Offset of the `<` opening the tag that ends at `end`.
///
/// Attribute values cannot contain `<`, so the last one before `end` is it.
fn tag_start(source: &str, end: usize) -> usize {
    source[..end].rfind('<').unwrap_or(0)
}
