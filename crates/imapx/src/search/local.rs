//! Local evaluation of search leaves
//!
//! Summary headers come straight from the [`MessageInfo`]. Any other header
//! and the body are read from the settled message cache; a message that is
//! not cached does not match.

use std::borrow::Cow;

use mail_parser::{Message, MessageParser};

use super::Expression;
use super::translate::split_words;
use crate::error::Result;
use crate::models::MessageInfo;
use crate::storage::{CacheKey, MessageCache};

/// Case-insensitive test that `haystack` contains every word
pub fn contains_all_words(haystack: &str, words: &[String]) -> bool {
    let haystack = haystack.to_lowercase();
    words
        .iter()
        .all(|word| haystack.contains(&word.to_lowercase()))
}

/// Unparsed value of the first header called `name`
pub(crate) fn raw_header<'m>(message: &'m Message<'_>, name: &str) -> Option<Cow<'m, str>> {
    let header = message
        .headers()
        .iter()
        .find(|header| header.name.as_str().eq_ignore_ascii_case(name))?;
    let raw = message
        .raw_message()
        .get(header.offset_start as usize..header.offset_end as usize)?;
    Some(String::from_utf8_lossy(raw))
}

/// Decides leaves from locally available data
#[derive(Clone, Copy)]
pub struct LocalMatcher<'a> {
    cache: Option<&'a dyn MessageCache>,
    folder_path: &'a str,
}

impl<'a> LocalMatcher<'a> {
    pub fn new(cache: Option<&'a dyn MessageCache>, folder_path: &'a str) -> Self {
        Self { cache, folder_path }
    }

    /// Matcher that only sees summary headers
    pub fn summary_only() -> Self {
        Self {
            cache: None,
            folder_path: "",
        }
    }

    /// Evaluate a leaf for one message
    pub fn matches_leaf(&self, leaf: &Expression, info: &MessageInfo) -> Result<bool> {
        match leaf {
            Expression::HeaderContains { name, words } => {
                let words = split_words(words);
                if words.is_empty() {
                    return Ok(false);
                }
                self.header_contains(info, name, &words)
            }
            Expression::HeaderExists(names) => {
                for name in names {
                    if !self.header_exists(info, name)? {
                        return Ok(false);
                    }
                }
                Ok(!names.is_empty())
            }
            Expression::BodyContains(words) => {
                let words = split_words(words);
                if words.is_empty() {
                    return Ok(false);
                }
                self.body_contains(info, &words)
            }
            _ => Ok(false),
        }
    }

    fn header_contains(&self, info: &MessageInfo, name: &str, words: &[String]) -> Result<bool> {
        if let Some(value) = info.summary_header(name) {
            return Ok(contains_all_words(value, words));
        }

        self.with_message(info, |message| {
            raw_header(message, name).is_some_and(|value| contains_all_words(&value, words))
        })
    }

    fn header_exists(&self, info: &MessageInfo, name: &str) -> Result<bool> {
        if let Some(value) = info.summary_header(name) {
            return Ok(!value.is_empty());
        }

        self.with_message(info, |message| raw_header(message, name).is_some())
    }

    fn body_contains(&self, info: &MessageInfo, words: &[String]) -> Result<bool> {
        self.with_message(info, |message| {
            let mut text = String::new();
            let mut part = 0;
            while let Some(body) = message.body_text(part) {
                text.push_str(&body);
                text.push('\n');
                part += 1;
            }
            contains_all_words(&text, words)
        })
    }

    /// Parse the cached source of `info` and apply `test`; false when uncached
    fn with_message(
        &self,
        info: &MessageInfo,
        test: impl FnOnce(&Message<'_>) -> bool,
    ) -> Result<bool> {
        let Some(cache) = self.cache else {
            return Ok(false);
        };
        let Some(source) = cache.get(&CacheKey::settled(self.folder_path, info.uid))? else {
            return Ok(false);
        };

        Ok(MessageParser::default()
            .parse(&source)
            .is_some_and(|message| test(&message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Uid;
    use crate::storage::InMemoryMessageCache;

    const RAW: &[u8] = b"From: alice@example.com\r\n\
Subject: Quarterly numbers\r\n\
X-Mailer: mutt 2.2\r\n\
\r\n\
Please find the invoice attached.\r\n";

    fn info(uid: u32) -> MessageInfo {
        MessageInfo::builder(Uid(uid))
            .from("Alice <alice@example.com>")
            .subject("Quarterly numbers")
            .build()
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_contains_all_words() {
        assert!(contains_all_words("Urgent: Report", &strings(&["urgent", "REPORT"])));
        assert!(!contains_all_words("Urgent", &strings(&["urgent", "report"])));
    }

    #[test]
    fn test_summary_header() {
        let matcher = LocalMatcher::summary_only();
        let leaf = Expression::HeaderContains {
            name: "subject".to_string(),
            words: strings(&["quarterly NUMBERS"]),
        };
        assert!(matcher.matches_leaf(&leaf, &info(1)).unwrap());
    }

    #[test]
    fn test_uncached_message_does_not_match() {
        let matcher = LocalMatcher::summary_only();
        let leaf = Expression::BodyContains(strings(&["invoice"]));
        assert!(!matcher.matches_leaf(&leaf, &info(1)).unwrap());
    }

    #[test]
    fn test_cached_body_and_headers() {
        let cache = InMemoryMessageCache::default();
        cache.put(&CacheKey::settled("INBOX", Uid(1)), RAW).unwrap();
        let matcher = LocalMatcher::new(Some(&cache), "INBOX");

        let body = Expression::BodyContains(strings(&["invoice"]));
        assert!(matcher.matches_leaf(&body, &info(1)).unwrap());

        let mailer = Expression::HeaderContains {
            name: "X-Mailer".to_string(),
            words: strings(&["mutt"]),
        };
        assert!(matcher.matches_leaf(&mailer, &info(1)).unwrap());

        let exists = Expression::HeaderExists(strings(&["X-Mailer", "Subject"]));
        assert!(matcher.matches_leaf(&exists, &info(1)).unwrap());

        let missing = Expression::HeaderExists(strings(&["List-Id"]));
        assert!(!matcher.matches_leaf(&missing, &info(1)).unwrap());
    }
}
