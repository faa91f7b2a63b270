//! Translation of search leaves into IMAP UID SEARCH criteria
//!
//! Each leaf resolves to a constant, to local evaluation against the
//! summary and message cache, or to a server search. Probe mode answers
//! only whether the leaf can be decided without the server.

use std::fmt;

use crate::models::{SUMMARY_HEADERS, Uid};

/// How leaves are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationMode {
    /// Check local feasibility only; never touches the server
    Probe,
    /// Evaluate on the server through UID SEARCH
    Remote,
    /// Store is offline: decide everything locally
    LocalFallback,
}

/// Which messages a search addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Folder,
    Message(Uid),
}

/// Outcome of translating one leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Translation {
    MatchAll,
    MatchNone,
    /// Decide per message from local data
    Local,
    /// Probe mode found that only the server can decide
    Infeasible,
    Remote(SearchCriteria),
}

/// Normalized UID SEARCH criteria, also the search cache key
///
/// Rendered as `[UID n] [prefix] [KEYWORD "w1" KEYWORD "w2" ...]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SearchCriteria {
    /// Set for single-message scope
    pub uid: Option<Uid>,
    /// Criteria preceding the per-word terms (e.g. `HEADER "X-Spam" ""`)
    pub prefix: String,
    /// Search key repeated before every word (`SUBJECT`, `BODY`, `HEADER "X-Foo"`)
    pub keyword: Option<String>,
    pub words: Vec<String>,
}

impl SearchCriteria {
    fn new(scope: Scope) -> Self {
        Self {
            uid: match scope {
                Scope::Folder => None,
                Scope::Message(uid) => Some(uid),
            },
            prefix: String::new(),
            keyword: None,
            words: Vec::new(),
        }
    }

    /// The same criteria addressed to the whole folder
    pub fn folder_scope(&self) -> Self {
        Self {
            uid: None,
            ..self.clone()
        }
    }

    /// Text passed to UID SEARCH
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if let Some(uid) = self.uid {
            parts.push(format!("UID {}", uid));
        }
        if !self.prefix.is_empty() {
            parts.push(self.prefix.clone());
        }
        if let Some(keyword) = &self.keyword {
            for word in &self.words {
                parts.push(format!("{} {}", keyword, quote(word)));
            }
        }
        parts.join(" ")
    }
}

impl fmt::Display for SearchCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Whether the header is kept in the folder summary
pub fn is_header_from_summary(name: &str) -> bool {
    SUMMARY_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Split arguments into whitespace-delimited words, dropping repeats
pub fn split_words(args: &[String]) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for arg in args {
        for word in arg.split_whitespace() {
            if !words.iter().any(|w| w == word) {
                words.push(word.to_string());
            }
        }
    }
    words
}

/// Escape a string for use inside an IMAP quoted string
pub fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c == '\\' || c == '"' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Quote a string for IMAP
pub fn quote(value: &str) -> String {
    format!("\"{}\"", escape(value))
}

/// SEARCH key testing a header for a substring
fn header_search_key(name: &str) -> String {
    const DEDICATED: [&str; 5] = ["FROM", "TO", "CC", "BCC", "SUBJECT"];
    DEDICATED
        .iter()
        .find(|key| key.eq_ignore_ascii_case(name))
        .map(|key| key.to_string())
        .unwrap_or_else(|| format!("HEADER {}", quote(name)))
}

/// Translate `(header-contains name args...)`
///
/// `summary_empty` is whether the folder has no messages at all.
pub fn translate_header_contains(
    name: &str,
    args: &[String],
    mode: EvaluationMode,
    scope: Scope,
    summary_empty: bool,
) -> Translation {
    if args.is_empty() || summary_empty {
        return Translation::MatchNone;
    }

    let words = split_words(args);
    if words.is_empty() {
        return Translation::MatchNone;
    }

    match mode {
        EvaluationMode::Probe if is_header_from_summary(name) => Translation::Local,
        EvaluationMode::Probe => Translation::Infeasible,
        EvaluationMode::LocalFallback => Translation::Local,
        EvaluationMode::Remote => {
            let mut criteria = SearchCriteria::new(scope);
            criteria.keyword = Some(header_search_key(name));
            criteria.words = words;
            Translation::Remote(criteria)
        }
    }
}

/// Translate `(header-exists names...)`
pub fn translate_header_exists(
    names: &[String],
    mode: EvaluationMode,
    scope: Scope,
    summary_empty: bool,
) -> Translation {
    if names.is_empty() || summary_empty {
        return Translation::MatchNone;
    }

    let all_local = names.iter().all(|name| is_header_from_summary(name));
    match mode {
        EvaluationMode::Probe if all_local => Translation::Local,
        EvaluationMode::Probe => Translation::Infeasible,
        EvaluationMode::LocalFallback => Translation::Local,
        EvaluationMode::Remote => {
            let mut criteria = SearchCriteria::new(scope);
            criteria.prefix = names
                .iter()
                .map(|name| format!("HEADER {} \"\"", quote(name)))
                .collect::<Vec<_>>()
                .join(" ");
            Translation::Remote(criteria)
        }
    }
}

/// Translate `(body-contains args...)`
///
/// A single empty argument matches every message without consulting the
/// server; body text is never resolvable in probe mode.
pub fn translate_body_contains(
    args: &[String],
    mode: EvaluationMode,
    scope: Scope,
    summary_empty: bool,
) -> Translation {
    if mode == EvaluationMode::Probe {
        return Translation::Infeasible;
    }

    if args.len() == 1 && args[0].is_empty() {
        return Translation::MatchAll;
    }

    if args.is_empty() || summary_empty {
        return Translation::MatchNone;
    }

    let words = split_words(args);
    if words.is_empty() {
        return Translation::MatchNone;
    }

    match mode {
        EvaluationMode::LocalFallback => Translation::Local,
        _ => {
            let mut criteria = SearchCriteria::new(scope);
            criteria.keyword = Some("BODY".to_string());
            criteria.words = words;
            Translation::Remote(criteria)
        }
    }
}
