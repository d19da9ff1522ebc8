//! Run-if predicate parsing and evaluation.
//!
//! A `runIf` expression compares a single template token against a literal:
//!
//! ```text
//! {{ token }} op rhs
//! op  := == | != | in | not in        (case-insensitive)
//! rhs := null | "text" | 'text' | -12.5 | [1, 2, 3]
//! ```
//!
//! Tokens that fail to resolve evaluate as null rather than raising; a
//! `null` comparison matches empty-or-absent. String comparisons are ordinal
//! and case-sensitive; list membership compares elements as trimmed strings.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::context::TemplateContext;
use crate::error::{EngineError, EngineResult};
use crate::template::resolve_token_lenient;

static NUMBER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("number pattern compiles"));

/// Comparison operator of a run-if expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunIfOperator {
    Equal,
    NotEqual,
    In,
    NotIn,
}

/// Right-hand side literal of a run-if expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunIfLiteral {
    Null,
    Text(String),
    Number(String),
    List(Vec<String>),
}

/// Parsed run-if expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunIfExpression {
    token: String,
    operator: RunIfOperator,
    literal: RunIfLiteral,
}

impl RunIfExpression {
    /// Parses a `runIf` string, rejecting anything outside the grammar.
    pub fn parse(expression: &str) -> EngineResult<Self> {
        let invalid = |detail: &str| EngineError::InvalidRunIf(format!("'{}' ({})", expression.trim(), detail));

        let trimmed = expression.trim();
        let Some(after_open) = trimmed.strip_prefix("{{") else {
            return Err(invalid("expected a '{{ token }}' on the left"));
        };
        let Some(close) = after_open.find("}}") else {
            return Err(invalid("unterminated token"));
        };
        let token = after_open[..close].trim();
        if token.is_empty() {
            return Err(invalid("empty token"));
        }

        let rest = after_open[close + 2..].trim_start();
        let (operator, rest) = parse_operator(rest).ok_or_else(|| invalid("expected ==, !=, in, or not in"))?;
        let literal = parse_literal(rest.trim()).ok_or_else(|| invalid("unsupported right-hand side"))?;

        match (operator, &literal) {
            (RunIfOperator::In | RunIfOperator::NotIn, RunIfLiteral::List(_)) => {}
            (RunIfOperator::In | RunIfOperator::NotIn, _) => {
                return Err(invalid("membership operators require a [list]"));
            }
            (_, RunIfLiteral::List(_)) => return Err(invalid("== and != do not accept a [list]")),
            _ => {}
        }

        Ok(Self {
            token: token.to_string(),
            operator,
            literal,
        })
    }

    /// Evaluates the expression against the live context.
    pub fn evaluate(&self, context: &TemplateContext) -> bool {
        let value = resolve_token_lenient(&self.token, context);

        match self.operator {
            RunIfOperator::Equal => self.matches(value.as_deref()),
            RunIfOperator::NotEqual => !self.matches(value.as_deref()),
            RunIfOperator::In => self.contained(value.as_deref()),
            RunIfOperator::NotIn => !self.contained(value.as_deref()),
        }
    }

    fn matches(&self, value: Option<&str>) -> bool {
        match &self.literal {
            // null matches empty-or-absent.
            RunIfLiteral::Null => value.is_none_or(|text| text.is_empty()),
            RunIfLiteral::Text(expected) => value == Some(expected.as_str()),
            RunIfLiteral::Number(expected) => value.map(str::trim) == Some(expected.as_str()),
            RunIfLiteral::List(_) => false,
        }
    }

    fn contained(&self, value: Option<&str>) -> bool {
        let RunIfLiteral::List(items) = &self.literal else {
            return false;
        };
        let Some(value) = value else {
            return false;
        };
        let trimmed = value.trim();
        items.iter().any(|item| item == trimmed)
    }
}

/// Parses and evaluates in one step; the usual entry point for the executor.
pub fn evaluate_run_if(expression: &str, context: &TemplateContext) -> EngineResult<bool> {
    Ok(RunIfExpression::parse(expression)?.evaluate(context))
}

fn parse_operator(rest: &str) -> Option<(RunIfOperator, &str)> {
    if let Some(after) = rest.strip_prefix("==") {
        return Some((RunIfOperator::Equal, after));
    }
    if let Some(after) = rest.strip_prefix("!=") {
        return Some((RunIfOperator::NotEqual, after));
    }

    let lowered = rest.to_ascii_lowercase();
    if lowered.starts_with("not") {
        let after_not = rest[3..].trim_start();
        if after_not.len() >= 2 && after_not[..2].eq_ignore_ascii_case("in") {
            return Some((RunIfOperator::NotIn, &after_not[2..]));
        }
        return None;
    }
    if lowered.starts_with("in") {
        return Some((RunIfOperator::In, &rest[2..]));
    }
    None
}

fn parse_literal(text: &str) -> Option<RunIfLiteral> {
    if text.eq_ignore_ascii_case("null") {
        return Some(RunIfLiteral::Null);
    }

    if (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        || (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
    {
        return Some(RunIfLiteral::Text(text[1..text.len() - 1].to_string()));
    }

    if text.starts_with('[') && text.ends_with(']') {
        let inner = &text[1..text.len() - 1];
        let mut items = Vec::new();
        for element in inner.split(',') {
            let element = element.trim();
            if !NUMBER_PATTERN.is_match(element) {
                return None;
            }
            items.push(element.to_string());
        }
        if items.is_empty() {
            return None;
        }
        return Some(RunIfLiteral::List(items));
    }

    if NUMBER_PATTERN.is_match(text) {
        return Some(RunIfLiteral::Number(text.to_string()));
    }

    None
}
