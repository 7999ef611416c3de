//! Tag expression compiler.
//!
//! A tag expression is a disjunction of conjunctions over quoted keywords:
//!
//! ```text
//! expr := conj ('|' conj)*
//! conj := atom ('&' atom)*
//! atom := ['!'] '"' text '"'
//! ```
//!
//! `&` binds tighter than `|`. Keywords are matched as case-insensitive
//! substrings; `!` negates a keyword.

use super::QueryError;

/// A single keyword test.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Atom {
    /// Lowercased keyword text
    text: String,
    negated: bool,
}

impl Atom {
    fn eval(&self, haystack: &str) -> bool {
        haystack.contains(&self.text) != self.negated
    }
}

/// Compiled tag expression in disjunctive normal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    groups: Vec<Vec<Atom>>,
}

impl TagQuery {
    /// Parse a tag expression, reporting the first syntax problem.
    pub fn parse(source: &str) -> Result<Self, QueryError> {
        Parser::new(source).parse()
    }

    /// Compile a tag expression for the crawl path.
    ///
    /// Malformed expressions compile to a query that never matches.
    pub fn compile(source: &str) -> Self {
        Self::parse(source).unwrap_or_else(|e| {
            log::warn!("Tag expression {:?} rejected: {}", source, e);
            Self::never()
        })
    }

    /// A query with no groups; matches nothing.
    pub fn never() -> Self {
        Self { groups: Vec::new() }
    }

    /// Evaluate the query against a piece of text (a thread comment).
    pub fn matches(&self, text: &str) -> bool {
        if self.groups.is_empty() {
            return false;
        }
        let haystack = text.to_lowercase();
        self.groups
            .iter()
            .any(|group| group.iter().all(|atom| atom.eval(&haystack)))
    }

    /// Number of conjunction groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

struct Parser<'a> {
    source: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self { source, pos: 0 }
    }

    fn parse(mut self) -> Result<TagQuery, QueryError> {
        if self.source.trim().is_empty() {
            return Err(QueryError::Empty);
        }

        let mut groups = Vec::new();
        let mut group = Vec::new();

        loop {
            group.push(self.atom()?);
            self.skip_whitespace();

            match self.bump() {
                None => break,
                Some('&') => {}
                Some('|') => groups.push(std::mem::take(&mut group)),
                Some(found) => {
                    return Err(QueryError::UnexpectedChar {
                        found,
                        pos: self.pos - found.len_utf8(),
                    });
                }
            }

            self.skip_whitespace();
            if self.peek().is_none() {
                return Err(QueryError::DanglingOperator { pos: self.pos });
            }
        }

        groups.push(group);
        Ok(TagQuery { groups })
    }

    fn atom(&mut self) -> Result<Atom, QueryError> {
        self.skip_whitespace();

        let negated = self.peek() == Some('!');
        if negated {
            self.bump();
        }

        let start = self.pos;
        match self.bump() {
            Some('"') => {}
            Some(found) => return Err(QueryError::ExpectedQuote { found, pos: start }),
            None => return Err(QueryError::DanglingOperator { pos: start }),
        }

        let rest = &self.source[self.pos..];
        let len = rest
            .find('"')
            .ok_or(QueryError::UnterminatedKeyword { pos: start })?;
        let text = &rest[..len];
        self.pos += len + 1;

        if text.is_empty() {
            return Err(QueryError::EmptyKeyword { pos: start });
        }

        Ok(Atom {
            text: text.to_lowercase(),
            negated,
        })
    }

    fn peek(&self) -> Option<char> {
        self.source[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_and_negation() {
        let query = TagQuery::parse(r#""ac"|"ab"&"bc"|"a"&!"z""#).unwrap();
        assert_eq!(query.group_count(), 3);

        let cases = [
            ("acz", true),
            ("abc", true),
            ("ab", true),
            ("abz", false),
            ("bc", false),
            ("bcz", false),
        ];
        for (input, expected) in cases {
            assert_eq!(query.matches(input), expected, "input {input:?}");
        }
    }

    #[test]
    fn test_case_insensitive() {
        let query = TagQuery::parse(r#""WebM""#).unwrap();
        assert!(query.matches("webm thread"));
        assert!(query.matches("WEBM THREAD"));
        assert!(!query.matches("gif thread"));
    }

    #[test]
    fn test_single_negation() {
        let query = TagQuery::parse(r#"!"spam""#).unwrap();
        assert!(query.matches("anything"));
        assert!(!query.matches("Spam here"));
    }

    #[test]
    fn test_keyword_may_contain_operators() {
        let query = TagQuery::parse(r#""a|b"&"c & d""#).unwrap();
        assert!(query.matches("x a|b y c & d"));
        assert!(!query.matches("a b c d"));
    }

    #[test]
    fn test_whitespace_between_tokens() {
        let query = TagQuery::parse(r#" "abc" | "def" "#).unwrap();
        assert!(query.matches("def"));
    }

    #[test]
    fn test_unicode_keywords() {
        let query = TagQuery::parse(r#""Вебм"&!"гиф""#).unwrap();
        assert!(query.matches("тред вебм"));
        assert!(!query.matches("вебм и гиф"));
    }

    #[test]
    fn test_malformed_expressions() {
        assert_eq!(TagQuery::parse(""), Err(QueryError::Empty));
        assert_eq!(TagQuery::parse("   "), Err(QueryError::Empty));
        assert!(matches!(
            TagQuery::parse(r#""abc"#),
            Err(QueryError::UnterminatedKeyword { pos: 0 })
        ));
        assert!(matches!(
            TagQuery::parse("abc"),
            Err(QueryError::ExpectedQuote { found: 'a', pos: 0 })
        ));
        assert!(matches!(
            TagQuery::parse(r#""abc"|"#),
            Err(QueryError::DanglingOperator { .. })
        ));
        assert!(matches!(
            TagQuery::parse(r#""abc""def""#),
            Err(QueryError::UnexpectedChar { found: '"', pos: 5 })
        ));
        assert!(matches!(
            TagQuery::parse(r#""""#),
            Err(QueryError::EmptyKeyword { pos: 0 })
        ));
        assert!(matches!(
            TagQuery::parse(r#""a"&!"#),
            Err(QueryError::DanglingOperator { .. })
        ));
    }

    #[test]
    fn test_compile_fails_closed() {
        let query = TagQuery::compile(r#""unbalanced"#);
        assert_eq!(query, TagQuery::never());
        assert!(!query.matches("unbalanced"));
        assert!(!query.matches(""));
    }
}
