//! Document outline (bookmarks) built from the heading index.
//!
//! Headings nest by level: each heading becomes a child of the closest
//! preceding heading with a smaller level. Entries are written closed, so
//! a viewer initially shows only the top level.

use crate::layout::HeadingIndex;
use crate::object::{Object, ObjectRef};
use std::collections::HashMap;

/// A single outline item.
#[derive(Debug, Clone, PartialEq)]
pub struct OutlineItem {
    /// Display title
    pub title: String,
    /// Page index of the destination
    pub page: usize,
    /// Page-local Y of the destination
    pub top: f32,
    /// Heading level (0 for the contents entry)
    pub level: u8,
    /// Whether the item is initially expanded
    pub open: bool,
    /// Child items
    pub children: Vec<OutlineItem>,
}

impl OutlineItem {
    /// Create a closed item.
    pub fn new(title: impl Into<String>, page: usize, top: f32, level: u8) -> Self {
        Self {
            title: title.into(),
            page,
            top,
            level,
            open: false,
            children: Vec::new(),
        }
    }

    /// Signed descendant count for `/Count`: negative when closed.
    fn descendant_count(&self) -> i64 {
        let count = self.children.len() as i64
            + self
                .children
                .iter()
                .map(OutlineItem::visible_descendant_count)
                .sum::<i64>();
        if self.open {
            count
        } else {
            -count
        }
    }

    fn visible_descendant_count(&self) -> i64 {
        if !self.open {
            return 0;
        }
        self.children.len() as i64
            + self
                .children
                .iter()
                .map(OutlineItem::visible_descendant_count)
                .sum::<i64>()
    }

    fn total(&self) -> usize {
        1 + self.children.iter().map(OutlineItem::total).sum::<usize>()
    }
}

/// Builder for the outline hierarchy.
#[derive(Debug, Default)]
pub struct OutlineBuilder {
    /// Root items
    items: Vec<OutlineItem>,
    /// Path of indices to the item new children attach to
    current_path: Vec<usize>,
}

impl OutlineBuilder {
    /// Create an empty outline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the outline from indexed headings up to `max_level`.
    ///
    /// `contents` adds a leading entry for the table of contents.
    pub fn from_headings(headings: &HeadingIndex, max_level: u8, contents: Option<OutlineItem>) -> Self {
        let mut builder = Self::new();
        if let Some(item) = contents {
            builder.add_item(item);
            builder.root();
        }

        let mut levels: Vec<u8> = Vec::new();
        for entry in headings.entries().iter().filter(|e| e.level <= max_level) {
            while levels.last().is_some_and(|l| *l >= entry.level) {
                levels.pop();
                builder.pop();
            }
            let item = OutlineItem::new(entry.title.clone(), entry.page, entry.y, entry.level);
            if levels.is_empty() {
                builder.add_item(item);
            } else {
                builder.add_child(item);
            }
            levels.push(entry.level);
        }
        builder
    }

    /// Add a top-level item.
    pub fn add_item(&mut self, item: OutlineItem) -> &mut Self {
        self.current_path.clear();
        let index = self.items.len();
        self.items.push(item);
        self.current_path.push(index);
        self
    }

    /// Add a child to the current item.
    pub fn add_child(&mut self, item: OutlineItem) -> &mut Self {
        let Some(parent) = self.current_mut() else {
            return self.add_item(item);
        };
        let child_index = parent.children.len();
        parent.children.push(item);
        self.current_path.push(child_index);
        self
    }

    /// Go back up one level.
    pub fn pop(&mut self) -> &mut Self {
        self.current_path.pop();
        self
    }

    /// Go back to the root level.
    pub fn root(&mut self) -> &mut Self {
        self.current_path.clear();
        self
    }

    fn current_mut(&mut self) -> Option<&mut OutlineItem> {
        let (first, rest) = self.current_path.split_first()?;
        let mut current = self.items.get_mut(*first)?;
        for &idx in rest {
            current = current.children.get_mut(idx)?;
        }
        Some(current)
    }

    /// Whether the outline is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of top-level items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Root items.
    pub fn items(&self) -> &[OutlineItem] {
        &self.items
    }

    /// Objects [`build`](Self::build) will produce: the root plus every item.
    pub fn object_count(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            1 + self.items.iter().map(OutlineItem::total).sum::<usize>()
        }
    }

    /// Build the outline objects, numbered from `root_id` in pre-order.
    ///
    /// `dest` maps a page index and page-local Y to a destination array;
    /// items whose page is not output get no `/Dest`.
    pub fn build<F>(&self, root_id: u32, dest: F) -> Option<OutlineBuildResult>
    where
        F: Fn(usize, f32) -> Option<Object>,
    {
        if self.items.is_empty() {
            return None;
        }

        let mut objects: HashMap<u32, Object> = HashMap::new();
        let mut next_id = root_id + 1;
        let item_ids = Self::build_level(&self.items, root_id, &mut next_id, &dest, &mut objects);

        let total_count: i64 = self
            .items
            .iter()
            .map(|i| 1 + i.visible_descendant_count())
            .sum();

        let mut root = HashMap::new();
        root.insert("Type".to_string(), Object::Name("Outlines".to_string()));
        root.insert("Count".to_string(), Object::Integer(total_count));
        if let (Some(first), Some(last)) = (item_ids.first(), item_ids.last()) {
            root.insert("First".to_string(), ObjectRef::new(*first).into());
            root.insert("Last".to_string(), ObjectRef::new(*last).into());
        }
        objects.insert(root_id, Object::Dictionary(root));

        Some(OutlineBuildResult {
            root_ref: ObjectRef::new(root_id),
            objects,
            next_obj_id: next_id,
        })
    }

    /// Build a run of siblings and link them with `/Prev`/`/Next`.
    fn build_level<F>(
        items: &[OutlineItem],
        parent_id: u32,
        next_id: &mut u32,
        dest: &F,
        objects: &mut HashMap<u32, Object>,
    ) -> Vec<u32>
    where
        F: Fn(usize, f32) -> Option<Object>,
    {
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let item_id = *next_id;
            *next_id += 1;
            ids.push(item_id);

            let mut dict = HashMap::new();
            dict.insert("Title".to_string(), Object::String(item.title.as_bytes().to_vec()));
            dict.insert("Parent".to_string(), ObjectRef::new(parent_id).into());
            if let Some(d) = dest(item.page, item.top) {
                dict.insert("Dest".to_string(), d);
            }

            let child_ids = Self::build_level(&item.children, item_id, next_id, dest, objects);
            if let (Some(first), Some(last)) = (child_ids.first(), child_ids.last()) {
                dict.insert("First".to_string(), ObjectRef::new(*first).into());
                dict.insert("Last".to_string(), ObjectRef::new(*last).into());
                let count = item.descendant_count();
                if count != 0 {
                    dict.insert("Count".to_string(), Object::Integer(count));
                }
            }
            objects.insert(item_id, Object::Dictionary(dict));
        }

        for (i, id) in ids.iter().enumerate() {
            if let Some(Object::Dictionary(dict)) = objects.get_mut(id) {
                if i > 0 {
                    dict.insert("Prev".to_string(), ObjectRef::new(ids[i - 1]).into());
                }
                if let Some(next) = ids.get(i + 1) {
                    dict.insert("Next".to_string(), ObjectRef::new(*next).into());
                }
            }
        }
        ids
    }
}

/// Result of building an outline.
#[derive(Debug)]
pub struct OutlineBuildResult {
    /// Reference to the root outline object
    pub root_ref: ObjectRef,
    /// All outline objects by number
    pub objects: HashMap<u32, Object>,
    /// Next free object number
    pub next_obj_id: u32,
}

impl OutlineBuildResult {
    /// Objects in ascending number order, ready to emit.
    pub fn into_sorted(self) -> Vec<(u32, Object)> {
        let mut objects: Vec<_> = self.objects.into_iter().collect();
        objects.sort_by_key(|(id, _)| *id);
        objects
    }
}
