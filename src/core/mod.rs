pub mod error;
pub mod record;

pub use error::{Result, SweepError};
pub use record::{Classification, CommentId, CommentRecord, EnrichmentState, labels};
