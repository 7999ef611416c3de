//! Users and their standing subscriptions.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::query::TagQuery;

/// A chat that receives files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct User {
    pub id: i64,

    /// Messenger chat identifier
    pub chat_id: i64,
}

/// A standing query on one board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,

    /// Board short name, e.g. `b`
    pub board: String,

    /// Tag expression, e.g. `"webm"&!"gif"`
    pub tags: String,

    /// Type expression, e.g. `.img.webm`
    pub types: String,

    /// Display name for shared (default) subscriptions
    #[serde(default)]
    pub alias: String,

    /// Shared subscription that users opt into
    #[serde(default)]
    pub is_default: bool,
}

impl Subscription {
    /// Parse a request of the form `board .types "tag"[&|]...`.
    ///
    /// The tag expression is fully validated so a malformed query is
    /// rejected here rather than silently never matching later.
    pub fn parse_request(request: &str) -> Result<Self> {
        let (board, types, tags) = split_request(request)?;
        Self::build(board, types, tags, String::new(), false)
    }

    /// Parse a shared subscription request: `board .types "tag"... alias`.
    pub fn parse_default_request(request: &str) -> Result<Self> {
        let (board, types, rest) = split_request(request)?;
        let closing = rest
            .rfind('"')
            .ok_or_else(|| AppError::validation("tag expression is missing"))?;
        let (tags, alias) = rest.split_at(closing + 1);
        let alias = alias.trim();
        if alias.is_empty() || alias.contains(char::is_whitespace) {
            return Err(AppError::validation("alias must be a single word"));
        }
        Self::build(board, types, tags, alias.to_string(), true)
    }

    fn build(board: &str, types: &str, tags: &str, alias: String, is_default: bool) -> Result<Self> {
        if !board_pattern().is_match(board) {
            return Err(AppError::validation(format!("bad board name {board:?}")));
        }
        if !types_pattern().is_match(types) {
            return Err(AppError::validation(format!("bad type list {types:?}")));
        }
        TagQuery::parse(tags)?;

        Ok(Self {
            id: 0,
            board: board.to_string(),
            tags: tags.to_string(),
            types: types.to_string(),
            alias,
            is_default,
        })
    }
}

fn split_request(request: &str) -> Result<(&str, &str, &str)> {
    let mut parts = request.trim().splitn(3, ' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(board), Some(types), Some(tags)) if !tags.trim().is_empty() => {
            Ok((board, types, tags.trim()))
        }
        _ => Err(AppError::validation(
            "request must look like: board .types \"tag\"",
        )),
    }
}

fn board_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid board regex"))
}

fn types_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\.[A-Za-z0-9]+)+$").expect("valid types regex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let sub = Subscription::parse_request(r#"b .webm.gif "cat"&!"dog""#).unwrap();
        assert_eq!(sub.board, "b");
        assert_eq!(sub.types, ".webm.gif");
        assert_eq!(sub.tags, r#""cat"&!"dog""#);
        assert!(!sub.is_default);
    }

    #[test]
    fn test_parse_request_keeps_spaces_in_tags() {
        let sub = Subscription::parse_request(r#"vg .img "dark souls"|"elden ring""#).unwrap();
        assert_eq!(sub.tags, r#""dark souls"|"elden ring""#);
    }

    #[test]
    fn test_parse_request_rejects_bad_input() {
        assert!(Subscription::parse_request("b .webm").is_err());
        assert!(Subscription::parse_request(r#"b webm "cat""#).is_err());
        assert!(Subscription::parse_request(r#"b/x .webm "cat""#).is_err());
        assert!(matches!(
            Subscription::parse_request(r#"b .webm "cat"#),
            Err(AppError::Query(_))
        ));
    }

    #[test]
    fn test_parse_default_request() {
        let sub = Subscription::parse_default_request(r#"b .webm "cat"|"kitten" cats"#).unwrap();
        assert_eq!(sub.tags, r#""cat"|"kitten""#);
        assert_eq!(sub.alias, "cats");
        assert!(sub.is_default);
    }

    #[test]
    fn test_parse_default_request_requires_alias() {
        assert!(Subscription::parse_default_request(r#"b .webm "cat""#).is_err());
        assert!(Subscription::parse_default_request(r#"b .webm "cat" two words"#).is_err());
    }
}
