//! Folder search: expression parsing, translation to IMAP SEARCH criteria,
//! server result caching and local evaluation
//!
//! Search expressions use the s-expression language described in
//! [`expression`], for example:
//!
//! ```text
//! (and (header-contains "From" "alice") (not (body-contains "unsubscribe")))
//! ```

mod cache;
mod evaluator;
mod expression;
mod local;
mod translate;

pub use cache::SearchResultCache;
pub use evaluator::{Evaluator, RemoteSearch, translate_leaf};
pub use expression::Expression;
pub use local::{LocalMatcher, contains_all_words};
pub(crate) use local::raw_header;
pub use translate::{
    EvaluationMode, Scope, SearchCriteria, Translation, escape, is_header_from_summary, quote,
    split_words, translate_body_contains, translate_header_contains, translate_header_exists,
};
