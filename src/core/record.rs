use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type CommentId = String;

/// Well-known record labels
pub mod labels {
    /// A remote deletion attempt failed; see `last_error`
    pub const DELETE_FAILED: &str = "delete-failed";
    /// Video/channel metadata could not be resolved
    pub const UNENRICHABLE: &str = "unenrichable";
    /// The comment disappeared remotely without our involvement
    pub const EXTERNALLY_REMOVED: &str = "externally-removed";
}

/// Privacy / moderation classification of a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Classification {
    #[default]
    Public,
    Unlisted,
    Private,
    HeldForReview,
    LikelySpam,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum EnrichmentState {
    #[default]
    Pending,
    Enriched,
    Unenrichable,
}

/// One imported comment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub id: CommentId,
    pub text: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub like_count: u64,
    /// Character count of `text`, fixed at construction
    #[serde(default)]
    pub char_count: usize,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    #[serde(default)]
    pub enrichment: EnrichmentState,
    #[serde(default)]
    pub classification: Classification,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub last_error_at: Option<DateTime<Utc>>,
    pub video_id: String,
    #[serde(default)]
    pub video_title: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub channel_name: Option<String>,
}

impl CommentRecord {
    pub fn new(
        id: impl Into<String>,
        video_id: impl Into<String>,
        text: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            char_count: text.chars().count(),
            text,
            published_at,
            like_count: 0,
            labels: BTreeSet::new(),
            enrichment: EnrichmentState::Pending,
            classification: Classification::Public,
            last_error: None,
            last_error_at: None,
            video_id: video_id.into(),
            video_title: None,
            channel_id: None,
            channel_name: None,
        }
    }

    pub fn with_likes(mut self, likes: u64) -> Self {
        self.like_count = likes;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    pub fn with_video_title(mut self, title: impl Into<String>) -> Self {
        self.video_title = Some(title.into());
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>, channel_name: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self.channel_name = Some(channel_name.into());
        self
    }

    /// Mark enrichment as finished. Resolved metadata clears `unenrichable`.
    pub fn enrich(&mut self, video_title: Option<String>, channel: Option<(String, String)>) {
        match (video_title, channel) {
            (None, None) => {
                self.enrichment = EnrichmentState::Unenrichable;
                self.labels.insert(labels::UNENRICHABLE.to_string());
            }
            (title, channel) => {
                if title.is_some() {
                    self.video_title = title;
                }
                if let Some((id, name)) = channel {
                    self.channel_id = Some(id);
                    self.channel_name = Some(name);
                }
                self.enrichment = EnrichmentState::Enriched;
                self.labels.remove(labels::UNENRICHABLE);
            }
        }
    }

    /// Attach the reason of a failed remote deletion
    pub fn record_delete_failure(&mut self, reason: impl Into<String>, at: DateTime<Utc>) {
        self.labels.insert(labels::DELETE_FAILED.to_string());
        self.last_error = Some(reason.into());
        self.last_error_at = Some(at);
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}
