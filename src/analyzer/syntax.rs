//! Syntax and logic heuristics
//!
//! Advisory only. False negatives are expected; the checks aim to be quiet
//! on correct code rather than exhaustive on broken code.

use super::source::SourceText;
use super::Patterns;
use crate::toolchain::{matching_brace, BlockStyle, EntryPoint, LanguageSupport};

/// Most bracket problems reported per analysis
const MAX_BRACKET_REPORTS: usize = 5;
/// Most unterminated-string reports per analysis
const MAX_STRING_REPORTS: usize = 3;

/// Every syntax problem found in `text`, in source order per check
pub fn syntax_errors(text: &SourceText, support: &dyn LanguageSupport) -> Vec<String> {
    let mut errors = bracket_errors(text);

    errors.extend(
        text.unterminated_strings()
            .iter()
            .take(MAX_STRING_REPORTS)
            .map(|line| format!("Line {}: unterminated string literal", line)),
    );
    if let Some(line) = text.unterminated_block() {
        errors.push(format!(
            "Line {}: unterminated block comment or multi-line string",
            line
        ));
    }

    errors.extend(support.syntax_pitfalls(text));
    errors
}

fn closer_for(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

/// Unclosed, unexpected and mismatched brackets
pub fn bracket_errors(text: &SourceText) -> Vec<String> {
    let mut errors = Vec::new();
    let mut stack: Vec<(char, usize)> = Vec::new();
    let mut line = 1usize;

    for ch in text.code().chars() {
        match ch {
            '\n' => line += 1,
            '(' | '[' | '{' => stack.push((ch, line)),
            ')' | ']' | '}' => match stack.last() {
                Some((open, _)) if closer_for(*open) == ch => {
                    stack.pop();
                }
                Some((open, opened_at)) => {
                    errors.push(format!(
                        "Line {}: mismatched '{}', expected '{}' to close '{}' from line {}",
                        line,
                        ch,
                        closer_for(*open),
                        open,
                        opened_at
                    ));
                    stack.pop();
                }
                None => errors.push(format!("Line {}: unexpected '{}'", line, ch)),
            },
            _ => {}
        }
        if errors.len() >= MAX_BRACKET_REPORTS {
            return errors;
        }
    }

    for (open, opened_at) in stack.into_iter().rev() {
        errors.push(format!("Line {}: unclosed '{}'", opened_at, open));
        if errors.len() >= MAX_BRACKET_REPORTS {
            break;
        }
    }
    errors
}

/// Logic problems: loop structure, exits, and language pitfalls
pub(crate) fn logic_issues(
    text: &SourceText,
    support: &dyn LanguageSupport,
    entry: &EntryPoint,
    loop_depth: u32,
    patterns: &Patterns,
) -> Vec<String> {
    let mut issues = Vec::new();

    if loop_depth >= 3 {
        issues.push(format!(
            "Deeply nested loops (depth {}) are O(n^{}) and hard to follow; consider a hash map or a helper function",
            loop_depth, loop_depth
        ));
    } else if loop_depth == 2 {
        issues.push(
            "Nested loops (depth 2) make this O(n²); check whether a single pass can do"
                .to_string(),
        );
    }

    let code = text.code();
    let style = support.lexicon().block_style;
    for found in patterns.infinite_loop.find_iter(code) {
        let body = loop_body(code, found.end(), style);
        if !(text_has_word(body, "break") || text_has_word(body, "return")) {
            issues.push(format!(
                "Line {}: infinite loop without a break or return",
                text.line_of(found.start())
            ));
            break;
        }
    }

    if entry.detected && !entry.returns_nothing() && !text.contains_word("return") {
        issues.push(format!(
            "Function '{}' never returns a value",
            entry.name
        ));
    }

    issues.extend(support.logic_pitfalls(text));
    issues
}

fn text_has_word(text: &str, word: &str) -> bool {
    super::source::count_word(text, word) > 0
}

/// Body of the loop whose header ends at `header_end`
fn loop_body(code: &str, header_end: usize, style: BlockStyle) -> &str {
    let rest = &code[header_end..];
    match style {
        BlockStyle::Braces => {
            let Some(open) = rest.find(['{', ';']) else {
                return rest;
            };
            if rest[open..].starts_with(';') {
                return &rest[..open];
            }
            match matching_brace(code, header_end + open) {
                Some(close) => &code[header_end + open..=close],
                None => &code[header_end + open..],
            }
        }
        BlockStyle::Indentation => {
            let header_start = code[..header_end].rfind('\n').map_or(0, |at| at + 1);
            let header_indent = indent_of(&code[header_start..]);
            let body_start = rest.find('\n').map_or(rest.len(), |at| at + 1);
            let mut end = body_start;
            for line in rest[body_start..].split_inclusive('\n') {
                if !line.trim().is_empty() && indent_of(line) <= header_indent {
                    break;
                }
                end += line.len();
            }
            // Single-line bodies (`while True: x += 1`) sit on the header line
            let inline_end = rest.find('\n').unwrap_or(rest.len());
            if end == body_start {
                &rest[..inline_end]
            } else {
                &rest[..end]
            }
        }
    }
}

fn indent_of(line: &str) -> usize {
    line.chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}
