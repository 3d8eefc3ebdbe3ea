pub mod search;
pub mod sort;
pub mod spec;
pub mod window;

pub use search::{PatternCache, SearchMatcher};
pub use sort::{MissingOrdering, RecordComparator};
pub use spec::{
    DateRange, NumericRange, QuerySpec, SearchQuery, SearchScope, SortDirection, SortField,
};
pub use window::{Window, WindowedQueryEngine};
