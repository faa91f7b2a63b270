//! Search expression tree and its s-expression parser
//!
//! Parses the folder search language:
//! - `(and e...)`, `(or e...)`, `(not e)`
//! - `(match-all)` or `(match-all e)`
//! - `(header-contains "Subject" "words" ...)`
//! - `(header-exists "X-Spam-Flag" ...)`
//! - `(body-contains "words" ...)`
//! - `#t`, `#f`

use std::fmt;

use crate::error::{Error, Result};

/// Immutable search expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Bool(bool),
    And(Vec<Expression>),
    Or(Vec<Expression>),
    Not(Box<Expression>),
    /// Every message in scope, optionally filtered by a per-message expression
    MatchAll(Option<Box<Expression>>),
    /// Header `name` contains every word of `words` (each argument may hold several words)
    HeaderContains { name: String, words: Vec<String> },
    HeaderExists(Vec<String>),
    BodyContains(Vec<String>),
}

impl Expression {
    /// Parse an expression from its s-expression text
    pub fn parse(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::InvalidQuery(
                "unexpected input after expression".to_string(),
            ));
        }
        Ok(expr)
    }

    /// Whether this node is a header/body test rather than a combinator
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            Expression::HeaderContains { .. }
                | Expression::HeaderExists(_)
                | Expression::BodyContains(_)
        )
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_list(f: &mut fmt::Formatter<'_>, head: &str, items: &[Expression]) -> fmt::Result {
            write!(f, "({}", head)?;
            for item in items {
                write!(f, " {}", item)?;
            }
            write!(f, ")")
        }

        fn write_strings(f: &mut fmt::Formatter<'_>, head: &str, items: &[String]) -> fmt::Result {
            write!(f, "({}", head)?;
            for item in items {
                write!(f, " \"{}\"", item.replace('\\', "\\\\").replace('"', "\\\""))?;
            }
            write!(f, ")")
        }

        match self {
            Expression::Bool(true) => write!(f, "#t"),
            Expression::Bool(false) => write!(f, "#f"),
            Expression::And(items) => write_list(f, "and", items),
            Expression::Or(items) => write_list(f, "or", items),
            Expression::Not(inner) => write!(f, "(not {})", inner),
            Expression::MatchAll(None) => write!(f, "(match-all)"),
            Expression::MatchAll(Some(inner)) => write!(f, "(match-all {})", inner),
            Expression::HeaderContains { name, words } => {
                let mut args = Vec::with_capacity(words.len() + 1);
                args.push(name.clone());
                args.extend(words.iter().cloned());
                write_strings(f, "header-contains", &args)
            }
            Expression::HeaderExists(names) => write_strings(f, "header-exists", names),
            Expression::BodyContains(words) => write_strings(f, "body-contains", words),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Str(String),
    Atom(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '(' {
            tokens.push(Token::Open);
            i += 1;
        } else if c == ')' {
            tokens.push(Token::Close);
            i += 1;
        } else if c == '"' {
            let (value, consumed) = read_string(&chars[i..])?;
            tokens.push(Token::Str(value));
            i += consumed;
        } else {
            let start = i;
            while i < chars.len()
                && !chars[i].is_whitespace()
                && chars[i] != '('
                && chars[i] != ')'
                && chars[i] != '"'
            {
                i += 1;
            }
            tokens.push(Token::Atom(chars[start..i].iter().collect()));
        }
    }

    Ok(tokens)
}

/// Read a quoted string starting at `chars[0] == '"'`, returning (value, chars consumed)
fn read_string(chars: &[char]) -> Result<(String, usize)> {
    let mut value = String::new();
    let mut i = 1;

    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((value, i + 1)),
            '\\' if i + 1 < chars.len() => {
                let escaped = match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                };
                value.push(escaped);
                i += 2;
            }
            c => {
                value.push(c);
                i += 1;
            }
        }
    }

    Err(Error::InvalidQuery("unterminated string".to_string()))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn expression(&mut self) -> Result<Expression> {
        match self.next() {
            Some(Token::Atom(atom)) if atom == "#t" => Ok(Expression::Bool(true)),
            Some(Token::Atom(atom)) if atom == "#f" => Ok(Expression::Bool(false)),
            Some(Token::Open) => self.call(),
            Some(Token::Atom(atom)) => Err(Error::InvalidQuery(format!(
                "unexpected symbol '{}'",
                atom
            ))),
            Some(Token::Str(value)) => Err(Error::InvalidQuery(format!(
                "unexpected string \"{}\"",
                value
            ))),
            Some(Token::Close) => Err(Error::InvalidQuery("unexpected ')'".to_string())),
            None => Err(Error::InvalidQuery("empty expression".to_string())),
        }
    }

    /// Parse the rest of a `(head args...)` form after the opening paren
    fn call(&mut self) -> Result<Expression> {
        let head = match self.next() {
            Some(Token::Atom(head)) => head,
            _ => {
                return Err(Error::InvalidQuery(
                    "expected a function name after '('".to_string(),
                ));
            }
        };

        let expr = match head.as_str() {
            "and" => Expression::And(self.expressions()?),
            "or" => Expression::Or(self.expressions()?),
            "not" => {
                let mut args = self.expressions()?;
                if args.len() != 1 {
                    return Err(Error::InvalidQuery(
                        "not takes exactly one argument".to_string(),
                    ));
                }
                Expression::Not(Box::new(args.remove(0)))
            }
            "match-all" => {
                let mut args = self.expressions()?;
                match args.len() {
                    0 => Expression::MatchAll(None),
                    1 => Expression::MatchAll(Some(Box::new(args.remove(0)))),
                    _ => {
                        return Err(Error::InvalidQuery(
                            "match-all takes at most one argument".to_string(),
                        ));
                    }
                }
            }
            "header-contains" => {
                let mut args = self.strings()?;
                if args.is_empty() {
                    return Err(Error::InvalidQuery(
                        "header-contains needs a header name".to_string(),
                    ));
                }
                let name = args.remove(0);
                Expression::HeaderContains { name, words: args }
            }
            "header-exists" => Expression::HeaderExists(self.strings()?),
            "body-contains" => Expression::BodyContains(self.strings()?),
            other => {
                return Err(Error::InvalidQuery(format!("unknown function '{}'", other)));
            }
        };

        Ok(expr)
    }

    /// Parse expressions up to and including the closing paren
    fn expressions(&mut self) -> Result<Vec<Expression>> {
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Close) => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => items.push(self.expression()?),
                None => return Err(Error::InvalidQuery("missing ')'".to_string())),
            }
        }
    }

    /// Parse string arguments up to and including the closing paren
    fn strings(&mut self) -> Result<Vec<String>> {
        let mut items = Vec::new();
        loop {
            match self.next() {
                Some(Token::Close) => return Ok(items),
                Some(Token::Str(value)) => items.push(value),
                Some(_) => {
                    return Err(Error::InvalidQuery(
                        "expected a string argument".to_string(),
                    ));
                }
                None => return Err(Error::InvalidQuery("missing ')'".to_string())),
            }
        }
    }
}
