//! Invocation directive parsing
//!
//! A directive is `<KEYWORD>(<json-object>)` starting a line (after optional
//! indentation). The argument blob may span several lines and may contain
//! nested objects, arrays and string literals with escaped quotes; the parser
//! tracks bracket nesting and string state instead of stopping at the first
//! closing brace. A directive only counts when its outer parenthesis closes
//! with a matching `)` and nothing but whitespace follows on that line.
//!
//! All offsets refer to LF-normalized text.

use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Directive parameters: string keys to string values
pub type Parameters = BTreeMap<String, String>;

/// A directive located in script text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive<'t> {
    /// Line indices covered by the directive, first line to closing line
    pub lines: RangeInclusive<usize>,
    /// Argument blob between the outer parentheses, untrimmed
    pub args: &'t str,
}

impl Directive<'_> {
    /// Parse the argument blob as a JSON object
    ///
    /// String values are kept as-is; numbers, booleans, arrays and objects are
    /// kept as their compact JSON text; `null` entries are dropped.
    pub fn parameters(&self) -> Result<Parameters, serde_json::Error> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(self.args.trim())?;
        Ok(object
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::Null => None,
                Value::String(s) => Some((key, s)),
                other => Some((key, other.to_string())),
            })
            .collect())
    }
}

/// Locates directives for one keyword
#[derive(Debug, Clone)]
pub struct DirectiveParser<'k> {
    keyword: &'k str,
}

impl<'k> DirectiveParser<'k> {
    /// Create a parser for `keyword` (e.g. `EXECUTE`)
    #[must_use]
    pub fn new(keyword: &'k str) -> Self {
        Self { keyword }
    }

    /// Find every directive in `text`, in order
    ///
    /// `text` must already use `\n` line endings. Directives never overlap.
    pub fn scan<'t>(&self, text: &'t str) -> Vec<Directive<'t>> {
        let line_starts = line_starts(text);
        let mut directives = Vec::new();
        let mut index = 0;

        while index < line_starts.len() {
            match self.directive_at(text, &line_starts, index) {
                Some(directive) => {
                    index = directive.lines.end() + 1;
                    directives.push(directive);
                }
                None => index += 1,
            }
        }

        directives
    }

    /// First directive in `text`, if any
    pub fn first<'t>(&self, text: &'t str) -> Option<Directive<'t>> {
        self.scan(text).into_iter().next()
    }

    fn directive_at<'t>(
        &self,
        text: &'t str,
        line_starts: &[usize],
        index: usize,
    ) -> Option<Directive<'t>> {
        if self.keyword.is_empty() {
            return None;
        }

        let start = line_starts[index];
        let line = line_text(text, line_starts, index);
        let indent = line.len() - line.trim_start().len();

        let after_keyword = line[indent..].strip_prefix(self.keyword)?;
        if !after_keyword.starts_with('(') {
            return None;
        }

        let open = start + indent + self.keyword.len();
        let close = matching_paren(text, open)?;

        let closing_line = line_starts.partition_point(|&s| s <= close) - 1;
        let line_end = line_starts
            .get(closing_line + 1)
            .map_or(text.len(), |next| next - 1);
        if !text[close + 1..line_end].trim().is_empty() {
            log::debug!(
                "Ignoring '{}(' on line {}: trailing text after closing parenthesis",
                self.keyword,
                index + 1
            );
            return None;
        }

        Some(Directive {
            lines: index..=closing_line,
            args: &text[open + 1..close],
        })
    }
}

/// Byte offset of the start of every line
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn line_text<'t>(text: &'t str, line_starts: &[usize], index: usize) -> &'t str {
    let start = line_starts[index];
    let end = line_starts.get(index + 1).map_or(text.len(), |next| next - 1);
    &text[start..end]
}

/// Offset of the `)` closing the `(` at `open`
///
/// Returns `None` when the group never closes or a closer does not match
/// its opener.
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut expected: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[open..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' => expected.push(')'),
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            ')' | '}' | ']' => {
                if expected.pop() != Some(c) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }

    None
}
