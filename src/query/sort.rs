// ============================================================================
// src/query/sort.rs - Total ordering of comment records
// ============================================================================
//
// Every QuerySpec defines exactly one total order:
// - primary key: the query's sort field and direction
// - missing values (channel name) sort last ascending, first descending
// - tie breaker: ascending record id, regardless of direction
//
// ============================================================================

use super::spec::{SortDirection, SortField};
use crate::core::CommentRecord;
use std::cmp::Ordering;

/// Where records without a value for the sort field go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingOrdering {
    MissingFirst,
    MissingLast,
}

impl MissingOrdering {
    pub fn default_for_direction(direction: SortDirection) -> Self {
        if direction.is_descending() {
            Self::MissingFirst
        } else {
            Self::MissingLast
        }
    }
}

/// Comparator for one (field, direction) pair
#[derive(Debug, Clone, Copy)]
pub struct RecordComparator {
    field: SortField,
    direction: SortDirection,
    missing: MissingOrdering,
}

impl RecordComparator {
    pub fn new(field: SortField, direction: SortDirection) -> Self {
        Self {
            field,
            direction,
            missing: MissingOrdering::default_for_direction(direction),
        }
    }

    pub fn compare(&self, a: &CommentRecord, b: &CommentRecord) -> Ordering {
        self.compare_key(a, b).then_with(|| a.id.cmp(&b.id))
    }

    fn compare_key(&self, a: &CommentRecord, b: &CommentRecord) -> Ordering {
        let ordering = match self.field {
            SortField::PublishedAt => a.published_at.cmp(&b.published_at),
            SortField::LikeCount => a.like_count.cmp(&b.like_count),
            SortField::CharCount => a.char_count.cmp(&b.char_count),
            SortField::ChannelName => {
                return self.compare_optional(a.channel_name.as_deref(), b.channel_name.as_deref());
            }
        };
        self.apply_direction(ordering)
    }

    fn compare_optional(&self, a: Option<&str>, b: Option<&str>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => match self.missing {
                MissingOrdering::MissingFirst => Ordering::Less,
                MissingOrdering::MissingLast => Ordering::Greater,
            },
            (Some(_), None) => match self.missing {
                MissingOrdering::MissingFirst => Ordering::Greater,
                MissingOrdering::MissingLast => Ordering::Less,
            },
            (Some(a), Some(b)) => {
                let ordering = a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b));
                self.apply_direction(ordering)
            }
        }
    }

    fn apply_direction(&self, ordering: Ordering) -> Ordering {
        if self.direction.is_descending() {
            ordering.reverse()
        } else {
            ordering
        }
    }

    /// Stable sort of records into the query's total order
    pub fn sort(&self, records: &mut [&CommentRecord]) {
        records.sort_by(|a, b| self.compare(a, b));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn rec(id: &str, likes: u64, channel: Option<&str>) -> CommentRecord {
        let mut r = CommentRecord::new(id, "v", "text", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
            .with_likes(likes);
        r.channel_name = channel.map(str::to_string);
        r
    }

    #[test]
    fn test_missing_ordering_defaults() {
        assert_eq!(
            MissingOrdering::default_for_direction(SortDirection::Ascending),
            MissingOrdering::MissingLast
        );
        assert_eq!(
            MissingOrdering::default_for_direction(SortDirection::Descending),
            MissingOrdering::MissingFirst
        );
    }

    #[test]
    fn test_ties_break_by_ascending_id_in_both_directions() {
        let a = rec("a", 5, None);
        let b = rec("b", 5, None);

        let asc = RecordComparator::new(SortField::LikeCount, SortDirection::Ascending);
        let desc = RecordComparator::new(SortField::LikeCount, SortDirection::Descending);
        assert_eq!(asc.compare(&a, &b), Ordering::Less);
        assert_eq!(desc.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_descending_reverses_primary_key() {
        let low = rec("z", 1, None);
        let high = rec("a", 9, None);
        let desc = RecordComparator::new(SortField::LikeCount, SortDirection::Descending);
        assert_eq!(desc.compare(&high, &low), Ordering::Less);
    }

    #[test]
    fn test_missing_channel_names() {
        let named = rec("a", 0, Some("beta"));
        let unnamed = rec("b", 0, None);

        let asc = RecordComparator::new(SortField::ChannelName, SortDirection::Ascending);
        assert_eq!(asc.compare(&named, &unnamed), Ordering::Less);

        let desc = RecordComparator::new(SortField::ChannelName, SortDirection::Descending);
        assert_eq!(desc.compare(&named, &unnamed), Ordering::Greater);
    }

    #[test]
    fn test_channel_names_compare_case_insensitively() {
        let upper = rec("a", 0, Some("Beta"));
        let lower = rec("b", 0, Some("alpha"));
        let asc = RecordComparator::new(SortField::ChannelName, SortDirection::Ascending);
        assert_eq!(asc.compare(&lower, &upper), Ordering::Less);
    }

    #[test]
    fn test_sort_produces_total_order() {
        let records = vec![rec("c", 2, None), rec("a", 2, None), rec("b", 7, None)];
        let mut refs: Vec<&CommentRecord> = records.iter().collect();
        RecordComparator::new(SortField::LikeCount, SortDirection::Descending).sort(&mut refs);
        let ids: Vec<&str> = refs.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
