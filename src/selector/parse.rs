//! Selector tokenizer.
//!
//! Produces a flat sequence alternating compound selectors and combinators.
//! Whitespace between two compounds becomes an explicit descendant combinator.

use std::fmt;

use crate::element::format_number;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace: anywhere beneath.
    Descendant,
    /// `>`
    Child,
    /// `+`
    Adjacent,
    /// `~`
    General,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    Equals,
    /// `~=` whitespace-separated word
    Includes,
    /// `|=` exact or prefix followed by `-`
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

/// Typed attribute value. Unquoted literals keep their type so `[n=2]`
/// only matches the number 2.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Number(f64),
    Bool(bool),
    Null,
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::String(s) => write!(f, "{s:?}"),
            AttrValue::Number(n) => write!(f, "{}", format_number(*n)),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Null => write!(f, "null"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SimpleSelector {
    Universal,
    Type(String),
    Class(String),
    Id(String),
    Attribute {
        name: String,
        matcher: Option<(AttrOp, AttrValue)>,
    },
    /// `:name` or `:name(argument)`; the argument is kept as raw text.
    Pseudo {
        name: String,
        argument: Option<String>,
    },
    PseudoElement(String),
}

/// Simple selectors written together with no separator; all must match.
#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub parts: Vec<SimpleSelector>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Compound(Compound),
    Combinator(Combinator),
}

pub fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut parser = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    parser.parse()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn fail(message: impl Into<String>) -> Error {
    Error::Selector(message.into())
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(fail(format!("expected '{want}' but found '{c}' at position {}", self.pos - 1))),
            None => Err(fail(format!("expected '{want}' but the selector ended"))),
        }
    }

    fn parse(&mut self) -> Result<Vec<Token>> {
        let mut tokens: Vec<Token> = Vec::new();
        loop {
            let spaced = self.skip_whitespace();
            let Some(c) = self.peek() else { break };
            let combinator = match c {
                '>' => Some(Combinator::Child),
                '+' => Some(Combinator::Adjacent),
                '~' => Some(Combinator::General),
                ',' => return Err(fail("selector lists (',') are not supported")),
                _ => None,
            };
            match combinator {
                Some(combinator) => {
                    self.pos += 1;
                    match tokens.last() {
                        None => return Err(fail(format!("selector cannot start with '{c}'"))),
                        Some(Token::Combinator(_)) => {
                            return Err(fail(format!("unexpected '{c}' after a combinator")))
                        }
                        Some(Token::Compound(_)) => tokens.push(Token::Combinator(combinator)),
                    }
                }
                None => {
                    if matches!(tokens.last(), Some(Token::Compound(_))) {
                        if !spaced {
                            return Err(fail(format!("unexpected '{c}' at position {}", self.pos)));
                        }
                        tokens.push(Token::Combinator(Combinator::Descendant));
                    }
                    tokens.push(Token::Compound(self.compound()?));
                }
            }
        }
        match tokens.last() {
            None => Err(fail("empty selector")),
            Some(Token::Combinator(_)) => Err(fail("selector cannot end with a combinator")),
            Some(Token::Compound(_)) => Ok(tokens),
        }
    }

    fn compound(&mut self) -> Result<Compound> {
        let mut parts = Vec::new();
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '>' | '+' | '~' | ',' | ')') {
                break;
            }
            let part = match c {
                '*' => {
                    self.pos += 1;
                    SimpleSelector::Universal
                }
                '.' => {
                    self.pos += 1;
                    SimpleSelector::Class(self.ident("class name")?)
                }
                '#' => {
                    self.pos += 1;
                    SimpleSelector::Id(self.ident("id")?)
                }
                '[' => self.attribute()?,
                ':' => self.pseudo()?,
                c if is_ident_char(c) || c == '\\' => {
                    if !parts.is_empty() {
                        return Err(fail(format!(
                            "type selector must come first in a compound, found '{c}' at position {}",
                            self.pos
                        )));
                    }
                    SimpleSelector::Type(self.ident("type")?)
                }
                c => return Err(fail(format!("unexpected '{c}' at position {}", self.pos))),
            };
            parts.push(part);
        }
        if parts.is_empty() {
            return Err(fail(format!("expected a selector at position {}", self.pos)));
        }
        Ok(Compound { parts })
    }

    fn ident(&mut self, what: &str) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '\\' {
                self.pos += 1;
                match self.bump() {
                    Some(escaped) => out.push(escaped),
                    None => return Err(fail("selector ends with an escape")),
                }
            } else if is_ident_char(c) {
                out.push(c);
                self.pos += 1;
            } else {
                break;
            }
        }
        if out.is_empty() {
            return Err(fail(format!("expected {what} at position {}", self.pos)));
        }
        Ok(out)
    }

    fn attribute(&mut self) -> Result<SimpleSelector> {
        self.expect('[')?;
        self.skip_whitespace();
        let name = self.ident("attribute name")?;
        self.skip_whitespace();
        let op = match (self.peek(), self.peek_at(1)) {
            (Some(']'), _) => {
                self.pos += 1;
                return Ok(SimpleSelector::Attribute { name, matcher: None });
            }
            (Some('='), _) => {
                self.pos += 1;
                AttrOp::Equals
            }
            (Some(c), Some('=')) => {
                let op = match c {
                    '~' => AttrOp::Includes,
                    '|' => AttrOp::DashMatch,
                    '^' => AttrOp::Prefix,
                    '$' => AttrOp::Suffix,
                    '*' => AttrOp::Substring,
                    other => return Err(fail(format!("unknown attribute operator '{other}='"))),
                };
                self.pos += 2;
                op
            }
            (Some(c), _) => return Err(fail(format!("unexpected '{c}' in attribute selector"))),
            (None, _) => return Err(fail("unterminated attribute selector")),
        };
        self.skip_whitespace();
        let value = match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                AttrValue::String(self.quoted(quote)?)
            }
            Some(_) => literal(&self.unquoted()?),
            None => return Err(fail("unterminated attribute selector")),
        };
        self.skip_whitespace();
        match self.bump() {
            Some(']') => Ok(SimpleSelector::Attribute {
                name,
                matcher: Some((op, value)),
            }),
            Some(c) => Err(fail(format!("expected ']' but found '{c}'"))),
            None => Err(fail("unterminated attribute selector")),
        }
    }

    fn quoted(&mut self, quote: char) -> Result<String> {
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(fail("unterminated string in attribute selector")),
                Some('\\') => match self.bump() {
                    Some(c) => out.push(c),
                    None => return Err(fail("unterminated string in attribute selector")),
                },
                Some(c) if c == quote => return Ok(out),
                Some(c) => out.push(c),
            }
        }
    }

    fn unquoted(&mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == ']' || c.is_whitespace() {
                break;
            }
            if c == '\\' {
                self.pos += 1;
                if let Some(escaped) = self.bump() {
                    out.push(escaped);
                }
                continue;
            }
            out.push(c);
            self.pos += 1;
        }
        if out.is_empty() {
            return Err(fail("expected an attribute value"));
        }
        Ok(out)
    }

    fn pseudo(&mut self) -> Result<SimpleSelector> {
        self.expect(':')?;
        if self.peek() == Some(':') {
            self.pos += 1;
            return Ok(SimpleSelector::PseudoElement(self.ident("pseudo-element name")?));
        }
        let name = self.ident("pseudo-class name")?;
        if self.peek() != Some('(') {
            return Ok(SimpleSelector::Pseudo { name, argument: None });
        }
        self.pos += 1;
        let mut depth = 1;
        let mut argument = String::new();
        loop {
            let c = self
                .bump()
                .ok_or_else(|| fail(format!("unterminated argument to :{name}(")))?;
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            argument.push(c);
        }
        Ok(SimpleSelector::Pseudo {
            name,
            argument: Some(argument.trim().to_string()),
        })
    }
}

fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix(&['-', '+'][..]).unwrap_or(text);
    digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

/// Unquoted attribute value to a typed literal.
fn literal(text: &str) -> AttrValue {
    match text {
        "true" => AttrValue::Bool(true),
        "false" => AttrValue::Bool(false),
        "null" => AttrValue::Null,
        "NaN" => AttrValue::Number(f64::NAN),
        "Infinity" | "+Infinity" => AttrValue::Number(f64::INFINITY),
        "-Infinity" => AttrValue::Number(f64::NEG_INFINITY),
        _ if looks_numeric(text) => match text.parse::<f64>() {
            Ok(n) => AttrValue::Number(n),
            Err(_) => AttrValue::String(text.to_string()),
        },
        _ => AttrValue::String(text.to_string()),
    }
}
