use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Current,
    Upcoming,
}

impl Category {
    pub const ALL: [Category; 2] = [Category::Current, Category::Upcoming];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Current => "current",
            Category::Upcoming => "upcoming",
        }
    }

    /// Upper-case label used in CLI banners and logs.
    pub fn label(self) -> &'static str {
        match self {
            Category::Current => "CURRENT",
            Category::Upcoming => "UPCOMING",
        }
    }

    /// Maps a dashboard status cell to a category. Closed or listed issues have none.
    pub fn from_status(status: &str) -> Option<Self> {
        match status.trim().to_ascii_lowercase().as_str() {
            "current" | "open" => Some(Category::Current),
            "upcoming" => Some(Category::Upcoming),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid IPO category {0:?}; expected \"current\" or \"upcoming\"")]
pub struct ParseCategoryError(pub String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Category::Current),
            "upcoming" => Ok(Category::Upcoming),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// Positional identity of a listing inside one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListingKey {
    pub category: Category,
    pub index: usize,
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub category: Category,
    /// Index of this record within its category in the snapshot that produced it.
    pub position: usize,
    pub name: String,
    /// Absolute link to the issue's detail page; empty when the source had none.
    pub url: String,
    pub price_band: String,
    pub issue_size: String,
    pub open_date: String,
    pub close_date: String,
    pub listing_date: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl ListingRecord {
    pub fn new(category: Category, position: usize, name: impl Into<String>) -> Self {
        Self {
            category,
            position,
            name: name.into(),
            url: String::new(),
            price_band: String::new(),
            issue_size: String::new(),
            open_date: String::new(),
            close_date: String::new(),
            listing_date: String::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn key(&self) -> ListingKey {
        ListingKey {
            category: self.category,
            index: self.position,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Stamped by the snapshot cache when the snapshot becomes current; 0 until then.
    pub version: u64,
    pub current: Vec<ListingRecord>,
    pub upcoming: Vec<ListingRecord>,
    pub fetched_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(current: Vec<ListingRecord>, upcoming: Vec<ListingRecord>) -> Self {
        Self {
            version: 0,
            current,
            upcoming,
            fetched_at: Utc::now(),
        }
    }

    pub fn with_version(self, version: u64) -> Self {
        Self { version, ..self }
    }

    pub fn listings(&self, category: Category) -> &[ListingRecord] {
        match category {
            Category::Current => &self.current,
            Category::Upcoming => &self.upcoming,
        }
    }

    pub fn get(&self, category: Category, index: usize) -> Option<&ListingRecord> {
        self.listings(category).get(index)
    }

    pub fn total(&self) -> usize {
        self.current.len() + self.upcoming.len()
    }
}
