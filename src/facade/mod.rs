pub mod workspace;

pub use workspace::CommentWorkspace;
