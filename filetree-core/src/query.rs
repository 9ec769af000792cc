use std::fmt;
use std::sync::Arc;

use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use glob::{MatchOptions, Pattern};

use crate::config::SearchModeConfig;
use crate::node::NodeKind;

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchMode {
    Prefix,
    #[default]
    Substring,
    Fuzzy,
}

impl From<SearchModeConfig> for MatchMode {
    fn from(c: SearchModeConfig) -> Self {
        match c {
            SearchModeConfig::Prefix => MatchMode::Prefix,
            SearchModeConfig::Substring => MatchMode::Substring,
            SearchModeConfig::Fuzzy => MatchMode::Fuzzy,
        }
    }
}

pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Filename globs such as `*.py;*.md`. Empty and malformed parts are dropped.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Pattern>,
}

impl PatternSet {
    pub fn parse(raw: &str) -> Self {
        let patterns = raw
            .split(';')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .filter_map(|p| match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::debug!(pattern = p, error = %err, "ignoring malformed pattern");
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(file_name, GLOB_OPTIONS))
    }

    /// Canonical `;`-joined form, for status messages.
    pub fn display(&self) -> String {
        self.patterns
            .iter()
            .map(Pattern::as_str)
            .collect::<Vec<_>>()
            .join(";")
    }
}

#[derive(Clone, Default)]
pub struct SearchQuery {
    text: String,
    patterns: PatternSet,
    mode: MatchMode,
    matcher: Arc<SkimMatcherV2>,
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("text", &self.text)
            .field("patterns", &self.patterns)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SearchQuery {
    pub fn new(text: &str, patterns: PatternSet) -> Self {
        Self {
            text: normalize_query(text),
            patterns,
            mode: MatchMode::Substring,
            matcher: Arc::new(SkimMatcherV2::default()),
        }
    }

    pub fn with_mode(mut self, mode: MatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Neither text nor patterns: nothing to look for.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.patterns.is_empty()
    }

    /// Directories match on text alone. Files must also pass the pattern set
    /// when one is given.
    pub fn matches(&self, name: &str, kind: NodeKind) -> bool {
        if self.is_empty() {
            return false;
        }
        match kind {
            NodeKind::Directory => !self.text.is_empty() && self.matches_text(name),
            NodeKind::File => {
                (self.patterns.is_empty() || self.patterns.matches(name))
                    && self.matches_text(name)
            }
        }
    }

    fn matches_text(&self, name: &str) -> bool {
        if self.text.is_empty() {
            return true;
        }
        let name_lower = name.to_lowercase();
        match self.mode {
            MatchMode::Prefix => name_lower.starts_with(&self.text),
            MatchMode::Substring => name_lower.contains(&self.text),
            MatchMode::Fuzzy => self.matcher.fuzzy_match(&name_lower, &self.text).is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_trims_and_lowercases() {
        assert_eq!(normalize_query("  HeLLo  "), "hello");
    }

    #[test]
    fn patterns_split_on_semicolons_and_trim() {
        let set = PatternSet::parse(" *.py ; *.md;;  ");
        assert_eq!(set.len(), 2);
        assert_eq!(set.display(), "*.py;*.md");
    }

    #[test]
    fn malformed_patterns_are_ignored() {
        let set = PatternSet::parse("[abc;*.rs");
        assert_eq!(set.len(), 1);
        assert!(set.matches("lib.rs"));
    }

    #[test]
    fn pattern_matching_ignores_case() {
        let set = PatternSet::parse("*.md");
        assert!(set.matches("README.MD"));
        assert!(!set.matches("notes.txt"));
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let q = SearchQuery::new("Readme", PatternSet::default());
        assert!(q.matches("README.txt", NodeKind::File));
        assert!(q.matches("old-readme", NodeKind::Directory));
        assert!(!q.matches("notes.txt", NodeKind::File));
    }

    #[test]
    fn patterns_never_exclude_directories_matched_by_text() {
        let q = SearchQuery::new("docs", PatternSet::parse("*.md"));
        assert!(q.matches("docs", NodeKind::Directory));
        assert!(!q.matches("docs.txt", NodeKind::File));
        assert!(q.matches("docs.md", NodeKind::File));
    }

    #[test]
    fn empty_text_with_patterns_matches_only_files() {
        let q = SearchQuery::new("", PatternSet::parse("*.md"));
        assert!(!q.is_empty());
        assert!(q.matches("a.md", NodeKind::File));
        assert!(!q.matches("notes.md", NodeKind::Directory));
        assert!(!q.matches("a.txt", NodeKind::File));
    }

    #[test]
    fn empty_query_matches_nothing() {
        let q = SearchQuery::new("   ", PatternSet::parse(" ; "));
        assert!(q.is_empty());
        assert!(!q.matches("anything", NodeKind::File));
    }

    #[test]
    fn prefix_mode_matches_only_prefix() {
        let q = SearchQuery::new("rep", PatternSet::default()).with_mode(MatchMode::Prefix);
        assert!(q.matches("report.txt", NodeKind::File));
        assert!(!q.matches("my_report.txt", NodeKind::File));
    }

    #[test]
    fn fuzzy_mode_matches_skipped_characters() {
        let q = SearchQuery::new("vsc", PatternSet::default()).with_mode(MatchMode::Fuzzy);
        assert!(q.matches("Visual Studio Code.txt", NodeKind::File));
        let q = SearchQuery::new("vsc", PatternSet::default());
        assert!(!q.matches("Visual Studio Code.txt", NodeKind::File));
    }

    #[test]
    fn fuzzy_matcher_is_built_once_per_query() {
        let q = SearchQuery::new("mn", PatternSet::default()).with_mode(MatchMode::Fuzzy);
        let copy = q.clone();
        assert!(Arc::ptr_eq(&q.matcher, &copy.matcher));
        for name in ["main.rs", "Makefile.in", "readme"] {
            assert_eq!(q.matches(name, NodeKind::File), copy.matches(name, NodeKind::File));
        }
        assert!(q.matches("main.rs", NodeKind::File));
        assert!(!q.matches("readme", NodeKind::File));
    }
}
