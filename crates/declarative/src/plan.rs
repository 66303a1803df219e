//! Categorized change plans
//!
//! Every domain diff produces a [`Plan`]: items to add, update, remove, and
//! items that already match but must be recorded as managed (track). Items
//! that need no action are simply absent from the plan.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of a planned change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Desired but absent from the live system
    Add,
    /// Present but differing from the desired state
    Update,
    /// Managed previously, no longer desired
    Remove,
    /// Already matching, not yet recorded as managed
    Track,
}

impl Category {
    /// All categories in display order
    pub const ALL: [Self; 4] = [Self::Add, Self::Update, Self::Remove, Self::Track];

    /// Single-character marker used in plan listings
    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Update => "~",
            Self::Remove => "-",
            Self::Track => "=",
        }
    }

    /// Verb describing the change
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Track => "track",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

/// A categorized set of changes for one domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan<T> {
    pub to_add: Vec<T>,
    pub to_update: Vec<T>,
    pub to_remove: Vec<T>,
    pub to_track: Vec<T>,
}

impl<T> Default for Plan<T> {
    fn default() -> Self {
        Self {
            to_add: Vec::new(),
            to_update: Vec::new(),
            to_remove: Vec::new(),
            to_track: Vec::new(),
        }
    }
}

impl<T> Plan<T> {
    /// Create an empty plan
    pub fn new() -> Self {
        Self::default()
    }

    /// Push an item into the given category
    pub fn push(&mut self, category: Category, item: T) {
        self.items_mut(category).push(item);
    }

    /// Items in one category
    pub fn items(&self, category: Category) -> &[T] {
        match category {
            Category::Add => &self.to_add,
            Category::Update => &self.to_update,
            Category::Remove => &self.to_remove,
            Category::Track => &self.to_track,
        }
    }

    fn items_mut(&mut self, category: Category) -> &mut Vec<T> {
        match category {
            Category::Add => &mut self.to_add,
            Category::Update => &mut self.to_update,
            Category::Remove => &mut self.to_remove,
            Category::Track => &mut self.to_track,
        }
    }

    /// Iterate over every planned item with its category
    pub fn iter(&self) -> impl Iterator<Item = (Category, &T)> {
        Category::ALL
            .into_iter()
            .flat_map(move |category| self.items(category).iter().map(move |item| (category, item)))
    }

    /// Total number of planned items, tracking included
    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_update.len() + self.to_remove.len() + self.to_track.len()
    }

    /// Whether the plan contains no work at all
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether applying the plan would touch the live system
    pub fn has_mutations(&self) -> bool {
        !self.to_add.is_empty() || !self.to_update.is_empty() || !self.to_remove.is_empty()
    }

    /// Per-category counts
    pub fn counts(&self) -> PlanCounts {
        PlanCounts {
            add: self.to_add.len(),
            update: self.to_update.len(),
            remove: self.to_remove.len(),
            track: self.to_track.len(),
        }
    }
}

/// Item counts per category
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounts {
    pub add: usize,
    pub update: usize,
    pub remove: usize,
    pub track: usize,
}

impl PlanCounts {
    /// Sum of all categories
    pub fn total(&self) -> usize {
        self.add + self.update + self.remove + self.track
    }
}

impl fmt::Display for PlanCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to update, {} to remove, {} to track",
            self.add, self.update, self.remove, self.track
        )
    }
}
