//! Hand-written recursive descent parser for the filter language
//!
//! ```text
//! filter   := "(" filter ")" | compare
//! compare  := attrPath op value? (("and"|"or") filter)?
//! attrPath := qualifiedName ["." subName]
//! op       := "eq"|"co"|"sw"|"pr"|"gt"|"ge"|"lt"|"le"
//! value    := quotedString | integer | "true" | "false"
//! ```
//!
//! A combinator applies to the whole remainder of the expression, so
//! `a and b or c` groups as `a and (b or c)`.

use thiserror::Error;

pub use crate::parser::filter_operator::{AttributePath, CompareOperator, ScimFilter};
use crate::schema::SCHEMA_URI_CORE;

/// Syntax error with the 0-based character offset it was detected at
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter at position {position}: {message}")]
pub struct FilterParseError {
    pub position: usize,
    pub message: String,
}

impl FilterParseError {
    pub fn new(position: usize, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

type ParseResult<T> = Result<T, FilterParseError>;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Open,
    Close,
    Quoted(String),
    Word(String),
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
}

/// Parse a filter expression
pub fn parse_filter(input: &str) -> ParseResult<ScimFilter> {
    let mut parser = FilterParser::new(input);
    let filter = parser.parse_expression()?;
    match parser.next_token()? {
        None => Ok(filter),
        Some(Token {
            kind: TokenKind::Close,
            start,
        }) => Err(FilterParseError::new(start, "unexpected ')'")),
        Some(token) => Err(FilterParseError::new(token.start, "expected 'and' or 'or'")),
    }
}

/// Parse an attribute path such as `userName`, `name.familyName` or
/// `urn:scim:schemas:extension:enterprise:1.0:manager.managerId`.
///
/// Positions in errors are relative to the start of `text`.
pub fn parse_attribute_path(text: &str) -> ParseResult<AttributePath> {
    parse_path(text, 0)
}

struct FilterParser {
    chars: Vec<char>,
    pos: usize,
    peeked: Option<Token>,
}

impl FilterParser {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            peeked: None,
        }
    }

    fn end_error(&self, message: &str) -> FilterParseError {
        FilterParseError::new(self.chars.len(), message)
    }

    fn parse_expression(&mut self) -> ParseResult<ScimFilter> {
        let token = self
            .next_token()?
            .ok_or_else(|| self.end_error("expected an attribute path or '('"))?;

        let left = match token.kind {
            TokenKind::Open => {
                let inner = self.parse_expression()?;
                match self.next_token()? {
                    Some(Token {
                        kind: TokenKind::Close,
                        ..
                    }) => inner,
                    Some(other) => return Err(FilterParseError::new(other.start, "expected ')'")),
                    None => return Err(self.end_error("expected ')'")),
                }
            }
            TokenKind::Word(word) => self.parse_comparison(&word, token.start)?,
            TokenKind::Close => return Err(FilterParseError::new(token.start, "unexpected ')'")),
            TokenKind::Quoted(_) => {
                return Err(FilterParseError::new(token.start, "expected an attribute path or '('"))
            }
        };

        let combinator = match self.peek_token()? {
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) if word.eq_ignore_ascii_case("and") => Some(true),
            Some(Token {
                kind: TokenKind::Word(word),
                ..
            }) if word.eq_ignore_ascii_case("or") => Some(false),
            _ => None,
        };
        let Some(is_and) = combinator else {
            return Ok(left);
        };
        self.peeked = None;

        let right = self.parse_expression()?;
        Ok(if is_and {
            ScimFilter::And(vec![left, right])
        } else {
            ScimFilter::Or(vec![left, right])
        })
    }

    fn parse_comparison(&mut self, word: &str, start: usize) -> ParseResult<ScimFilter> {
        let path = parse_path(word, start)?;

        let op_token = self
            .next_token()?
            .ok_or_else(|| self.end_error("expected an operator"))?;
        let op = match &op_token.kind {
            TokenKind::Word(keyword) => CompareOperator::parse(keyword).ok_or_else(|| {
                FilterParseError::new(op_token.start, format!("unknown operator '{}'", keyword))
            })?,
            _ => return Err(FilterParseError::new(op_token.start, "expected an operator")),
        };

        if !op.takes_value() {
            return Ok(ScimFilter::present(path));
        }

        let value_token = self
            .next_token()?
            .ok_or_else(|| self.end_error("expected a value"))?;
        let (value, quoted) = match value_token.kind {
            TokenKind::Quoted(value) => (value, true),
            TokenKind::Word(word) => (parse_unquoted_value(&word, value_token.start)?, false),
            _ => return Err(FilterParseError::new(value_token.start, "expected a value")),
        };
        Ok(ScimFilter::Compare {
            op,
            path,
            value: Some(value),
            quoted,
        })
    }

    fn peek_token(&mut self) -> ParseResult<Option<&Token>> {
        if self.peeked.is_none() {
            self.peeked = self.lex()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn next_token(&mut self) -> ParseResult<Option<Token>> {
        match self.peeked.take() {
            Some(token) => Ok(Some(token)),
            None => self.lex(),
        }
    }

    fn lex(&mut self) -> ParseResult<Option<Token>> {
        while self.pos < self.chars.len() && self.chars[self.pos].is_whitespace() {
            self.pos += 1;
        }
        let start = self.pos;
        let Some(&c) = self.chars.get(start) else {
            return Ok(None);
        };

        let kind = match c {
            '(' => {
                self.pos += 1;
                TokenKind::Open
            }
            ')' => {
                self.pos += 1;
                TokenKind::Close
            }
            '\'' => TokenKind::Quoted(self.lex_quoted(start)?),
            _ => {
                while self.pos < self.chars.len() {
                    let c = self.chars[self.pos];
                    if c.is_whitespace() || c == '(' || c == ')' {
                        break;
                    }
                    self.pos += 1;
                }
                TokenKind::Word(self.chars[start..self.pos].iter().collect())
            }
        };
        Ok(Some(Token { kind, start }))
    }

    fn lex_quoted(&mut self, start: usize) -> ParseResult<String> {
        let unterminated = || FilterParseError::new(start, "unterminated quoted string");
        let mut value = String::new();
        self.pos = start + 1;
        loop {
            let c = *self.chars.get(self.pos).ok_or_else(unterminated)?;
            match c {
                '\'' => {
                    self.pos += 1;
                    return Ok(value);
                }
                '\\' => {
                    let escaped = *self.chars.get(self.pos + 1).ok_or_else(unterminated)?;
                    value.push(match escaped {
                        '\'' => '\'',
                        '\\' => '\\',
                        'n' => '\n',
                        't' => '\t',
                        other => {
                            return Err(FilterParseError::new(
                                self.pos,
                                format!("invalid escape sequence '\\{}'", other),
                            ))
                        }
                    });
                    self.pos += 2;
                }
                other => {
                    value.push(other);
                    self.pos += 1;
                }
            }
        }
    }
}

fn parse_unquoted_value(word: &str, start: usize) -> ParseResult<String> {
    if let Some((offset, c)) = word
        .chars()
        .enumerate()
        .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '-'))
    {
        return Err(FilterParseError::new(
            start + offset,
            format!("invalid character '{}' in unquoted value", c),
        ));
    }
    if word.eq_ignore_ascii_case("true") || word.eq_ignore_ascii_case("false") {
        return Ok(word.to_ascii_lowercase());
    }
    word.parse::<i64>().map(|i| i.to_string()).map_err(|_| {
        FilterParseError::new(
            start,
            format!("invalid value '{}': expected a quoted string, an integer, true or false", word),
        )
    })
}

fn parse_path(word: &str, start: usize) -> ParseResult<AttributePath> {
    let chars: Vec<char> = word.chars().collect();
    if let Some(offset) = chars
        .iter()
        .position(|c| !(c.is_ascii_alphanumeric() || matches!(*c, '-' | '_' | ':' | '.')))
    {
        return Err(FilterParseError::new(
            start + offset,
            format!("invalid character '{}' in attribute path", chars[offset]),
        ));
    }

    let (schema, name_start) = match chars.iter().rposition(|c| *c == ':') {
        Some(0) => return Err(FilterParseError::new(start, "expected a schema URI")),
        Some(colon) => (chars[..colon].iter().collect::<String>(), colon + 1),
        None => (SCHEMA_URI_CORE.to_string(), 0),
    };

    let name = &chars[name_start..];
    let dots: Vec<usize> = name
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == '.')
        .map(|(i, _)| i)
        .collect();
    let attribute_end = dots.first().copied().unwrap_or(name.len());
    if attribute_end == 0 {
        return Err(FilterParseError::new(start + name_start, "expected an attribute name"));
    }
    if let Some(&second) = dots.get(1) {
        return Err(FilterParseError::new(
            start + name_start + second,
            "unexpected '.' after sub-attribute name",
        ));
    }

    let attribute: String = name[..attribute_end].iter().collect();
    let sub_attribute = match dots.first() {
        Some(&dot) if dot + 1 == name.len() => {
            return Err(FilterParseError::new(
                start + name_start + dot + 1,
                "expected a sub-attribute name",
            ))
        }
        Some(&dot) => Some(name[dot + 1..].iter().collect::<String>()),
        None => None,
    };
    Ok(AttributePath {
        schema,
        attribute,
        sub_attribute,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eq(attribute: &str, value: &str) -> ScimFilter {
        ScimFilter::compare(CompareOperator::Equality, AttributePath::core(attribute, None), value)
    }

    #[test]
    fn test_simple_equality() {
        let filter = parse_filter("userName eq 'bjensen'").unwrap();
        assert_eq!(filter, eq("userName", "bjensen"));
    }

    #[test]
    fn test_parenthesised_and_presence() {
        let filter = parse_filter("(userName eq 'bjensen') and title pr").unwrap();
        assert_eq!(
            filter,
            ScimFilter::And(vec![
                eq("userName", "bjensen"),
                ScimFilter::present(AttributePath::core("title", None)),
            ])
        );
    }

    #[test]
    fn test_combinators_are_right_associative() {
        let filter = parse_filter("a eq 'x' and b eq 'y' or c eq 'z'").unwrap();
        assert_eq!(
            filter,
            ScimFilter::And(vec![
                eq("a", "x"),
                ScimFilter::Or(vec![eq("b", "y"), eq("c", "z")]),
            ])
        );
    }

    #[test]
    fn test_parens_need_no_surrounding_whitespace() {
        let filter = parse_filter("(title pr)or(userType eq 'Employee')").unwrap();
        assert!(matches!(filter, ScimFilter::Or(ref children) if children.len() == 2));
    }

    #[test]
    fn test_unquoted_values() {
        let ScimFilter::Compare { value, quoted, .. } = parse_filter("active eq TRUE").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(value.as_deref(), Some("true"));
        assert!(!quoted);

        let ScimFilter::Compare { value, .. } = parse_filter("age gt -42").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(value.as_deref(), Some("-42"));
    }

    #[test]
    fn test_qualified_paths() {
        let ScimFilter::Compare { path, op, .. } =
            parse_filter("urn:scim:schemas:extension:enterprise:1.0:manager.managerId PR").unwrap()
        else {
            panic!("expected a comparison");
        };
        assert_eq!(op, CompareOperator::Presence);
        assert_eq!(path.schema, "urn:scim:schemas:extension:enterprise:1.0");
        assert_eq!(path.attribute, "manager");
        assert_eq!(path.sub_attribute.as_deref(), Some("managerId"));

        let path = parse_attribute_path("name.familyName").unwrap();
        assert_eq!(path, AttributePath::core("name", Some("familyName")));
    }

    #[test]
    fn test_escapes() {
        let ScimFilter::Compare { value, .. } = parse_filter(r"displayName eq 'O\'Brien\\\t'").unwrap() else {
            panic!("expected a comparison");
        };
        assert_eq!(value.as_deref(), Some("O'Brien\\\t"));
    }

    #[test]
    fn test_error_positions() {
        let cases = [
            ("userName xx 'a'", 9),
            ("userName eq 'abc", 12),
            (r"userName eq 'a\qb'", 14),
            ("userName eq ab_c", 14),
            ("(userName eq 'a'", 16),
            ("userName eq 'a')", 15),
            ("userName eq 'a' title pr", 16),
            ("userName eq abc", 12),
            ("", 0),
            ("userName eq", 11),
            ("user$Name pr", 4),
            ("name.given.family pr", 10),
        ];
        for (input, position) in cases {
            let err = parse_filter(input).unwrap_err();
            assert_eq!(err.position, position, "{input}: {err}");
        }
    }
}
