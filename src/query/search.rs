use super::spec::{SearchQuery, SearchScope};
use crate::core::{CommentRecord, Result, SweepError};
use lru::LruCache;
use regex::{Regex, RegexBuilder};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_PATTERN_CACHE_SIZE: usize = 200;

/// Compiled wildcard patterns, shared across searches
pub struct PatternCache {
    compiled: Mutex<LruCache<String, Arc<Regex>>>,
}

impl PatternCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            compiled: Mutex::new(LruCache::new(capacity)),
        }
    }

    fn get_or_compile(&self, token: &str) -> Result<Arc<Regex>> {
        {
            let mut cache = self.compiled.lock()?;
            if let Some(regex) = cache.get(token) {
                return Ok(Arc::clone(regex));
            }
        }

        let compiled = RegexBuilder::new(&wildcard_to_regex(token))
            .case_insensitive(true)
            .build()
            .map_err(|e| SweepError::InvalidQuery(format!("Invalid search pattern: {}", e)))?;
        let compiled = Arc::new(compiled);

        self.compiled
            .lock()?
            .put(token.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERN_CACHE_SIZE)
    }
}

/// `*` matches any run of characters; everything else is literal
fn wildcard_to_regex(token: &str) -> String {
    token
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*")
}

enum Term {
    /// Lowercased literal, matched by substring
    Literal(String),
    Pattern(Arc<Regex>),
}

impl Term {
    fn is_match(&self, haystack: &str, lowered: &str) -> bool {
        match self {
            Term::Literal(needle) => lowered.contains(needle.as_str()),
            Term::Pattern(regex) => regex.is_match(haystack),
        }
    }
}

/// Free-text matcher: every whitespace-separated term must occur somewhere
/// in the fields covered by the scope.
pub struct SearchMatcher {
    terms: Vec<Term>,
    scope: SearchScope,
}

impl SearchMatcher {
    pub fn compile(query: &SearchQuery, patterns: &PatternCache) -> Result<Self> {
        let mut terms = Vec::new();
        for token in query.text.split_whitespace() {
            if token.chars().all(|c| c == '*') {
                continue;
            }
            if token.contains('*') {
                terms.push(Term::Pattern(patterns.get_or_compile(token)?));
            } else {
                terms.push(Term::Literal(token.to_lowercase()));
            }
        }
        Ok(Self {
            terms,
            scope: query.scope,
        })
    }

    /// A query with no usable terms matches everything
    pub fn is_trivial(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn matches(&self, record: &CommentRecord) -> bool {
        if self.terms.is_empty() {
            return true;
        }

        let fields: Vec<&str> = match self.scope {
            SearchScope::CommentText => vec![record.text.as_str()],
            SearchScope::VideoTitle => record.video_title.as_deref().into_iter().collect(),
            SearchScope::ChannelName => record.channel_name.as_deref().into_iter().collect(),
            SearchScope::All => std::iter::once(record.text.as_str())
                .chain(record.video_title.as_deref())
                .chain(record.channel_name.as_deref())
                .collect(),
        };
        let lowered: Vec<String> = fields.iter().map(|f| f.to_lowercase()).collect();

        self.terms.iter().all(|term| {
            fields
                .iter()
                .zip(lowered.iter())
                .any(|(field, low)| term.is_match(field, low))
        })
    }
}
