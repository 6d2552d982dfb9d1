//! Tag glob and function allow-list filtering.
//!
//! # Design
//! - Tag patterns follow shell `fnmatch` rules: `*` matches any run of
//!   characters including `/`, `?` one character, `[...]` a class and
//!   `[!...]` its complement. Every other character, backslash and braces
//!   included, is literal. An unclosed `[` is a literal bracket.
//! - Patterns are translated to anchored regular expressions and compiled
//!   once at startup.
//! - An event without a `fun` key is never rejected by the allow-list.

use std::collections::BTreeSet;

use regex::{RegexBuilder, RegexSet, RegexSetBuilder};
use serde_json::Value;
use stashline_config::ForwarderSettings;
use stashline_events::Event;
use stashline_telemetry::FilterReason;

use crate::error::{ForwarderError, ForwarderResult};

/// Upper bound on the compiled size of a single tag pattern.
pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// Compiled tag patterns. An empty matcher accepts every tag.
#[derive(Debug, Clone)]
pub struct TagMatcher {
    set: Option<RegexSet>,
    len: usize,
}

impl TagMatcher {
    /// Compile the given patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ForwarderError::InvalidPattern`] when a pattern compiles
    /// past [`PATTERN_SIZE_LIMIT`].
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> ForwarderResult<Self> {
        if patterns.is_empty() {
            return Ok(Self { set: None, len: 0 });
        }
        let mut expressions = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let pattern = pattern.as_ref();
            // A pattern holding an empty class can never match.
            let Some(expression) = translate(pattern) else {
                continue;
            };
            RegexBuilder::new(&expression)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
                .map_err(|source| ForwarderError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })?;
            expressions.push(expression);
        }
        let set = RegexSetBuilder::new(&expressions)
            .size_limit(PATTERN_SIZE_LIMIT.saturating_mul(expressions.len().max(1)))
            .build()
            .map_err(|source| ForwarderError::InvalidPattern {
                pattern: patterns
                    .iter()
                    .map(AsRef::as_ref)
                    .collect::<Vec<_>>()
                    .join(","),
                source,
            })?;
        Ok(Self {
            set: Some(set),
            len: patterns.len(),
        })
    }

    /// Returns `true` when the tag matches any pattern, or no pattern is set.
    #[must_use]
    pub fn accepts(&self, tag: &str) -> bool {
        self.set.as_ref().is_none_or(|set| set.is_match(tag))
    }

    /// Number of configured patterns.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no pattern is configured.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.set.is_none()
    }
}

/// Translate an `fnmatch` pattern into an anchored regular expression.
///
/// Returns `None` when the pattern contains a class that matches nothing.
fn translate(pattern: &str) -> Option<String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut expression = String::with_capacity(pattern.len() + 8);
    expression.push_str("^(?s:");
    let mut index = 0;
    while index < chars.len() {
        let current = chars[index];
        index += 1;
        match current {
            '*' => {
                while chars.get(index) == Some(&'*') {
                    index += 1;
                }
                expression.push_str(".*");
            }
            '?' => expression.push('.'),
            '[' => match class_end(&chars, index) {
                Some(end) => {
                    expression.push_str(&translate_class(&chars[index..end])?);
                    index = end + 1;
                }
                None => expression.push_str(r"\["),
            },
            literal => {
                let mut utf8 = [0; 4];
                expression.push_str(&regex::escape(literal.encode_utf8(&mut utf8)));
            }
        }
    }
    expression.push_str(")$");
    Some(expression)
}

/// Index of the `]` closing a class whose body starts at `start`.
fn class_end(chars: &[char], start: usize) -> Option<usize> {
    let mut end = start;
    if chars.get(end) == Some(&'!') {
        end += 1;
    }
    if chars.get(end) == Some(&']') {
        end += 1;
    }
    while end < chars.len() && chars[end] != ']' {
        end += 1;
    }
    (end < chars.len()).then_some(end)
}

fn translate_class(body: &[char]) -> Option<String> {
    let (negated, body) = match body.split_first() {
        Some(('!', rest)) => (true, rest),
        _ => (false, body),
    };
    let mut members = String::new();
    let mut index = 0;
    while index < body.len() {
        let low = body[index];
        if body.get(index + 1) == Some(&'-') && index + 2 < body.len() {
            let high = body[index + 2];
            index += 3;
            // Reversed ranges are empty.
            if low <= high {
                push_class_char(&mut members, low);
                members.push('-');
                push_class_char(&mut members, high);
            }
        } else {
            push_class_char(&mut members, low);
            index += 1;
        }
    }
    match (negated, members.is_empty()) {
        (false, true) => None,
        (true, true) => Some(".".to_string()),
        (false, false) => Some(format!("[{members}]")),
        (true, false) => Some(format!("[^{members}]")),
    }
}

fn push_class_char(members: &mut String, member: char) {
    if matches!(member, '\\' | '[' | ']' | '^' | '-' | '&' | '~' | '|') {
        members.push('\\');
    }
    members.push(member);
}

/// Allowed function names. An empty list allows every function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunAllowList {
    funs: BTreeSet<String>,
}

impl FunAllowList {
    /// Build the allow-list.
    pub fn new<I, S>(funs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            funs: funs.into_iter().map(Into::into).collect(),
        }
    }

    /// Decide on the event's `fun` value.
    ///
    /// Absent values pass. A non-string value never matches a non-empty list.
    #[must_use]
    pub fn permits(&self, fun: Option<&Value>) -> bool {
        if self.funs.is_empty() {
            return true;
        }
        match fun {
            None => true,
            Some(Value::String(name)) => self.funs.contains(name),
            Some(_) => false,
        }
    }

    /// Number of allowed names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.funs.len()
    }

    /// Returns `true` when every function is allowed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.funs.is_empty()
    }
}

/// Outcome of filtering one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Both checks accepted the event.
    Forward,
    /// The tag matched no pattern.
    TagMismatch,
    /// The function is not allowed.
    FunNotAllowed,
    /// Both checks rejected the event.
    TagMismatchAndFunNotAllowed,
}

impl FilterDecision {
    /// Returns `true` for [`FilterDecision::Forward`].
    #[must_use]
    pub const fn is_forward(self) -> bool {
        matches!(self, Self::Forward)
    }

    /// Metrics label for a rejection.
    #[must_use]
    pub const fn reason(self) -> Option<FilterReason> {
        match self {
            Self::Forward => None,
            Self::TagMismatch => Some(FilterReason::TagMismatch),
            Self::FunNotAllowed => Some(FilterReason::FunNotAllowed),
            Self::TagMismatchAndFunNotAllowed => Some(FilterReason::TagAndFun),
        }
    }
}

/// Compiled tag and function filter.
#[derive(Debug, Clone)]
pub struct EventFilter {
    tags: TagMatcher,
    funs: FunAllowList,
}

impl EventFilter {
    /// Compile the filter from forwarder settings.
    ///
    /// # Errors
    ///
    /// Returns an error when a tag pattern is invalid.
    pub fn new(settings: &ForwarderSettings) -> ForwarderResult<Self> {
        Ok(Self {
            tags: TagMatcher::new(settings.tags.as_slice())?,
            funs: FunAllowList::new(settings.funs.iter().cloned()),
        })
    }

    /// Filter built from already compiled parts.
    #[must_use]
    pub const fn from_parts(tags: TagMatcher, funs: FunAllowList) -> Self {
        Self { tags, funs }
    }

    /// Evaluate both checks.
    #[must_use]
    pub fn evaluate(&self, event: &Event) -> FilterDecision {
        let tag_ok = self.tags.accepts(event.tag());
        let fun_ok = self.funs.permits(event.fun());
        match (tag_ok, fun_ok) {
            (true, true) => FilterDecision::Forward,
            (false, true) => FilterDecision::TagMismatch,
            (true, false) => FilterDecision::FunNotAllowed,
            (false, false) => FilterDecision::TagMismatchAndFunNotAllowed,
        }
    }

    /// Returns `true` when the event should be delivered.
    #[must_use]
    pub fn should_forward(&self, event: &Event) -> bool {
        self.evaluate(event).is_forward()
    }

    /// Compiled tag patterns.
    #[must_use]
    pub const fn tags(&self) -> &TagMatcher {
        &self.tags
    }

    /// Function allow-list.
    #[must_use]
    pub const fn funs(&self) -> &FunAllowList {
        &self.funs
    }
}

/// Decide whether `event` passes the tag patterns and the function allow-list.
#[must_use]
pub fn should_forward(event: &Event, tags: &TagMatcher, funs: &FunAllowList) -> bool {
    tags.accepts(event.tag()) && funs.permits(event.fun())
}
