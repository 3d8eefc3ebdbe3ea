use crate::core::{Classification, CommentRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Inclusive numeric bounds; `None` leaves a side open
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NumericRange {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

impl NumericRange {
    pub fn new(min: Option<u64>, max: Option<u64>) -> Self {
        Self { min, max }
    }

    pub fn at_least(min: u64) -> Self {
        Self { min: Some(min), max: None }
    }

    pub fn at_most(max: u64) -> Self {
        Self { min: None, max: Some(max) }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min.is_none_or(|min| value >= min) && self.max.is_none_or(|max| value <= max)
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Inclusive publication date bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| *at >= from) && self.to.is_none_or(|to| *at <= to)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    #[default]
    CommentText,
    VideoTitle,
    ChannelName,
    All,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(default)]
    pub scope: SearchScope,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    PublishedAt,
    LikeCount,
    CharCount,
    ChannelName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    #[default]
    Descending,
}

impl SortDirection {
    pub fn is_descending(&self) -> bool {
        matches!(self, SortDirection::Descending)
    }
}

/// Filter + sort + search criteria defining one logical ordered result set.
///
/// The order is total: records comparing equal on `sort_field` are ordered by
/// ascending id, so offsets stay stable while the store is not mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct QuerySpec {
    pub char_count: NumericRange,
    pub like_count: NumericRange,
    pub required_labels: BTreeSet<String>,
    /// Empty means every classification is allowed
    pub allowed_classifications: BTreeSet<Classification>,
    pub date_range: Option<DateRange>,
    pub channel_id: Option<String>,
    pub search: Option<SearchQuery>,
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn char_count(mut self, range: NumericRange) -> Self {
        self.char_count = range;
        self
    }

    pub fn like_count(mut self, range: NumericRange) -> Self {
        self.like_count = range;
        self
    }

    pub fn require_label(mut self, label: impl Into<String>) -> Self {
        self.required_labels.insert(label.into());
        self
    }

    pub fn allow_classification(mut self, classification: Classification) -> Self {
        self.allowed_classifications.insert(classification);
        self
    }

    pub fn published_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.date_range = Some(DateRange { from, to });
        self
    }

    pub fn channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn search(mut self, text: impl Into<String>, scope: SearchScope) -> Self {
        self.search = Some(SearchQuery {
            text: text.into(),
            scope,
        });
        self
    }

    pub fn sort_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_field = field;
        self.sort_direction = direction;
        self
    }

    /// Evaluate every predicate except free-text search
    pub fn matches_filters(&self, record: &CommentRecord) -> bool {
        if !self.char_count.contains(record.char_count as u64) {
            return false;
        }
        if !self.like_count.contains(record.like_count) {
            return false;
        }
        if !self
            .required_labels
            .iter()
            .all(|label| record.labels.contains(label))
        {
            return false;
        }
        if !self.allowed_classifications.is_empty()
            && !self.allowed_classifications.contains(&record.classification)
        {
            return false;
        }
        if let Some(range) = &self.date_range
            && !range.contains(&record.published_at)
        {
            return false;
        }
        if let Some(channel_id) = &self.channel_id
            && record.channel_id.as_deref() != Some(channel_id.as_str())
        {
            return false;
        }
        true
    }
}
