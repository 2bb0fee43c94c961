// SPDX-License-Identifier: MIT

//! Parser and evaluator for detection conditions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! or    := and ("or" and)*
//! and   := unary ("and" unary)*
//! unary := "not" unary | atom
//! atom  := "(" or ")" | "1 of" glob | "all of" glob | name
//! ```
//!
//! Globs are selection-name patterns with a trailing `*`. Anything outside
//! this grammar is rejected at load time.

use indexmap::IndexMap;
use std::fmt;

/// Parsed condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConditionAst {
    /// Reference to a named selection.
    Name(String),
    And(Box<ConditionAst>, Box<ConditionAst>),
    Or(Box<ConditionAst>, Box<ConditionAst>),
    Not(Box<ConditionAst>),
    /// `1 of sel_*`: at least one matching selection is true.
    OneOf(String),
    /// `all of sel_*`: every matching selection is true.
    AllOf(String),
}

/// Condition rejected at rule load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,
    #[error("unexpected token {0:?}")]
    UnexpectedToken(String),
    #[error("unbalanced parenthesis")]
    UnbalancedParen,
    #[error("trailing input after expression: {0:?}")]
    TrailingInput(String),
    #[error("expected selection pattern after {0:?}")]
    MissingPattern(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    And,
    Or,
    Not,
    OneOf,
    AllOf,
    Open,
    Close,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Name(n) => write!(f, "{n}"),
            Token::And => write!(f, "and"),
            Token::Or => write!(f, "or"),
            Token::Not => write!(f, "not"),
            Token::OneOf => write!(f, "1 of"),
            Token::AllOf => write!(f, "all of"),
            Token::Open => write!(f, "("),
            Token::Close => write!(f, ")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, ConditionError> {
    let mut words = Vec::new();
    let mut current = String::new();
    for ch in input.chars() {
        match ch {
            '(' | ')' => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
                words.push(ch.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }

    let mut tokens = Vec::new();
    let mut iter = words.into_iter().peekable();
    while let Some(word) = iter.next() {
        match word.as_str() {
            "(" => tokens.push(Token::Open),
            ")" => tokens.push(Token::Close),
            "and" => tokens.push(Token::And),
            "or" => tokens.push(Token::Or),
            "not" => tokens.push(Token::Not),
            "1" | "all" => match iter.peek().map(String::as_str) {
                Some("of") => {
                    iter.next();
                    tokens.push(if word == "1" { Token::OneOf } else { Token::AllOf });
                }
                _ => return Err(ConditionError::UnexpectedToken(word)),
            },
            _ => tokens.push(Token::Name(word)),
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<ConditionAst, ConditionError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.next();
            let right = self.parse_and()?;
            left = ConditionAst::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<ConditionAst, ConditionError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.next();
            let right = self.parse_unary()?;
            left = ConditionAst::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<ConditionAst, ConditionError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(ConditionAst::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<ConditionAst, ConditionError> {
        match self.next() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::Close) => Ok(inner),
                    _ => Err(ConditionError::UnbalancedParen),
                }
            }
            Some(Token::OneOf) => match self.next() {
                Some(Token::Name(pattern)) => Ok(ConditionAst::OneOf(pattern)),
                _ => Err(ConditionError::MissingPattern("1 of".to_string())),
            },
            Some(Token::AllOf) => match self.next() {
                Some(Token::Name(pattern)) => Ok(ConditionAst::AllOf(pattern)),
                _ => Err(ConditionError::MissingPattern("all of".to_string())),
            },
            Some(Token::Name(name)) => Ok(ConditionAst::Name(name)),
            Some(token) => Err(ConditionError::UnexpectedToken(token.to_string())),
            None => Err(ConditionError::Empty),
        }
    }
}

impl ConditionAst {
    /// Parse a condition string. Rejects anything outside the grammar.
    pub fn parse(input: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(ConditionError::Empty);
        }
        let mut parser = Parser { tokens, pos: 0 };
        let ast = parser.parse_or()?;
        if let Some(rest) = parser.peek() {
            return Err(ConditionError::TrailingInput(rest.to_string()));
        }
        Ok(ast)
    }

    /// Evaluate against per-selection match results.
    ///
    /// An atom naming no known selection short-circuits to false and is
    /// reported through `on_unknown` (the caller logs once per rule).
    pub fn evaluate<U: FnMut(&str)>(
        &self,
        results: &IndexMap<String, bool>,
        on_unknown: &mut U,
    ) -> bool {
        match self {
            ConditionAst::Name(name) => match results.get(name) {
                Some(value) => *value,
                None => {
                    on_unknown(name);
                    false
                }
            },
            ConditionAst::And(a, b) => {
                let left = a.evaluate(results, on_unknown);
                let right = b.evaluate(results, on_unknown);
                left && right
            }
            ConditionAst::Or(a, b) => {
                let left = a.evaluate(results, on_unknown);
                let right = b.evaluate(results, on_unknown);
                left || right
            }
            ConditionAst::Not(inner) => !inner.evaluate(results, on_unknown),
            ConditionAst::OneOf(pattern) => {
                let mut matched = results
                    .iter()
                    .filter(|(name, _)| glob_matches(pattern, name))
                    .peekable();
                if matched.peek().is_none() {
                    on_unknown(pattern);
                    return false;
                }
                matched.any(|(_, value)| *value)
            }
            ConditionAst::AllOf(pattern) => {
                let mut matched = results
                    .iter()
                    .filter(|(name, _)| glob_matches(pattern, name))
                    .peekable();
                if matched.peek().is_none() {
                    on_unknown(pattern);
                    return false;
                }
                matched.all(|(_, value)| *value)
            }
        }
    }
}

/// Whether `name` matches a selection-name pattern (`*` suffix wildcard,
/// or exact match).
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => name == pattern,
    }
}

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;
