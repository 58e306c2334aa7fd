//! Heading and named-link indices.
//!
//! Both feed the table of contents, the PDF outline and named destinations.

use std::cmp::Ordering;

/// One indexed heading.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingEntry {
    /// Page index the heading starts on
    pub page: usize,
    /// Page-local Y of the heading's top
    pub y: f32,
    /// Heading level, 1-based
    pub level: u8,
    /// Heading text
    pub title: String,
}

/// Headings in document order.
#[derive(Debug, Clone)]
pub struct HeadingIndex {
    entries: Vec<HeadingEntry>,
    max: usize,
}

impl HeadingIndex {
    /// Create an index holding at most `max` entries.
    pub fn new(max: usize) -> Self {
        Self {
            entries: Vec::new(),
            max,
        }
    }

    /// Append a heading. Returns `false` when the index is full.
    pub fn push(&mut self, entry: HeadingEntry) -> bool {
        if self.entries.len() >= self.max {
            return false;
        }
        self.entries.push(entry);
        true
    }

    /// Entries in document order.
    pub fn entries(&self) -> &[HeadingEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A named destination.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedLink {
    /// Target name as first seen
    pub name: String,
    /// Page index
    pub page: usize,
    /// Page-local Y
    pub y: f32,
}

fn compare_ignore_case(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
}

/// Named links sorted case-insensitively by name.
#[derive(Debug, Clone)]
pub struct LinkIndex {
    links: Vec<NamedLink>,
    max: usize,
}

/// Outcome of [`LinkIndex::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkAdd {
    /// New name inserted
    Inserted,
    /// Existing name moved to the new position
    Updated,
    /// Index full; name dropped
    Full,
}

impl LinkIndex {
    /// Create an index holding at most `max` names.
    pub fn new(max: usize) -> Self {
        Self {
            links: Vec::new(),
            max,
        }
    }

    /// Record `name` at `(page, y)`, updating an existing entry in place.
    pub fn add(&mut self, name: &str, page: usize, y: f32) -> LinkAdd {
        match self
            .links
            .binary_search_by(|link| compare_ignore_case(&link.name, name))
        {
            Ok(pos) => {
                let link = &mut self.links[pos];
                link.page = page;
                link.y = y;
                LinkAdd::Updated
            },
            Err(_) if self.links.len() >= self.max => LinkAdd::Full,
            Err(pos) => {
                self.links.insert(
                    pos,
                    NamedLink {
                        name: name.to_string(),
                        page,
                        y,
                    },
                );
                LinkAdd::Inserted
            },
        }
    }

    /// Find a name case-insensitively.
    pub fn find(&self, name: &str) -> Option<&NamedLink> {
        self.links
            .binary_search_by(|link| compare_ignore_case(&link.name, name))
            .ok()
            .map(|pos| &self.links[pos])
    }

    /// Links in sorted order.
    pub fn links(&self) -> &[NamedLink] {
        &self.links
    }

    /// Number of names.
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Whether no name is recorded.
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
