//! Per-language strategies
//!
//! Each supported language implements `LanguageSupport` once: how its source
//! is lexed for analysis, how the entry point is found, how test cases are
//! wrapped into a runnable harness, and which language-specific pitfalls the
//! analyzer reports. Callers pick the strategy once with `support_for`.

pub mod cpp;
pub mod java;
pub mod javascript;
pub mod python;

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;
use tracing::warn;

use crate::analyzer::source::{is_ident_char, SourceText};
use crate::catalog::TestCase;
use crate::languages::Language;

/// Prefix of the stdout line carrying the JSON-encoded return value
pub const RESULT_MARKER: &str = "__RESULT__";

/// Entry point assumed when nothing else matches
pub const DEFAULT_ENTRY: &str = "solution";

/// Names that are almost always helpers rather than the solution itself
const HELPER_NAMES: &[&str] = &[
    "main", "helper", "swap", "gcd", "lcm", "min", "max", "abs", "dfs", "bfs", "backtrack",
];

pub fn is_helper(name: &str) -> bool {
    name.starts_with('_') || HELPER_NAMES.contains(&name)
}

/// A declared parameter; `ty` is absent for dynamically typed languages
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: Option<String>,
    pub name: String,
}

/// The function the harness calls
#[derive(Debug, Clone, PartialEq)]
pub struct EntryPoint {
    pub name: String,
    /// Enclosing class, when the function is a method
    pub owner: Option<String>,
    pub is_static: bool,
    pub params: Vec<Param>,
    pub return_type: Option<String>,
    /// False when the default name was assumed
    pub detected: bool,
}

impl EntryPoint {
    pub fn fallback() -> Self {
        Self {
            name: DEFAULT_ENTRY.to_string(),
            owner: None,
            is_static: false,
            params: Vec::new(),
            return_type: None,
            detected: false,
        }
    }

    /// Void entry points report their (mutated) first argument instead
    pub fn returns_nothing(&self) -> bool {
        matches!(
            self.return_type.as_deref().map(str::trim),
            Some("void") | Some("None")
        )
    }
}

/// How one test case is run against the harness
#[derive(Debug, Clone, PartialEq)]
pub enum Invocation {
    Run {
        args: Vec<String>,
        stdin: Option<String>,
    },
    /// The case cannot be expressed for this harness; reported as a failed case
    Invalid { reason: String },
}

/// Generated program plus one invocation per test case, in order
#[derive(Debug, Clone)]
pub struct Harness {
    pub source: String,
    pub invocations: Vec<Invocation>,
}

/// How nesting is expressed, for loop depth measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockStyle {
    Braces,
    Indentation,
}

/// Lexical facts the analyzer needs to blank comments and strings
#[derive(Debug, Clone, Copy)]
pub struct Lexicon {
    pub line_comment: &'static str,
    pub block_comment: Option<(&'static str, &'static str)>,
    /// Quotes that must close on the same line
    pub quotes: &'static [char],
    /// Delimiters whose literals may span lines
    pub multiline_quotes: &'static [&'static str],
    pub block_style: BlockStyle,
    pub loop_keywords: &'static [&'static str],
    pub decision_keywords: &'static [&'static str],
}

pub trait LanguageSupport: Send + Sync {
    fn language(&self) -> Language;

    fn lexicon(&self) -> &'static Lexicon;

    fn detect_entry_point(&self, source: &str) -> EntryPoint;

    /// One invocation per test case, same order
    fn build_harness(&self, source: &str, test_cases: &[TestCase]) -> Harness;

    /// Language-specific syntax problems on top of bracket/string checks
    fn syntax_pitfalls(&self, source: &SourceText) -> Vec<String>;

    /// Language-specific logic problems on top of the shared checks
    fn logic_pitfalls(&self, source: &SourceText) -> Vec<String>;

    /// Idiom suggestions; never affect the score
    fn style_suggestions(&self, _source: &SourceText) -> Vec<String> {
        Vec::new()
    }
}

/// Strategy for `language`
pub fn support_for(language: Language) -> &'static dyn LanguageSupport {
    match language {
        Language::Python => &python::PythonSupport,
        Language::JavaScript => &javascript::JavaScriptSupport,
        Language::Java => &java::JavaSupport,
        Language::Cpp => &cpp::CppSupport,
    }
}

/// Decode a test input: one JSON value per non-empty line, one line per argument
pub fn parse_arguments(input: &str) -> Result<Vec<Value>, String> {
    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str(line.trim()).map_err(|e| {
                format!("Test input line {} is not valid JSON: {}", index + 1, e)
            })
        })
        .collect()
}

/// Compile a fixed pattern once; `None` (logged) if it is invalid
pub(crate) fn cached_regex(
    cell: &'static OnceLock<Option<Regex>>,
    pattern: &str,
) -> Option<&'static Regex> {
    cell.get_or_init(|| match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Invalid entry point pattern {:?}: {}", pattern, e);
            None
        }
    })
    .as_ref()
}

/// Split a parameter list on commas that are not nested in <>, [], () or {}
pub(crate) fn split_top_level(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in list.chars() {
        match ch {
            '<' | '[' | '(' | '{' => depth += 1,
            '>' | ']' | ')' | '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(current.trim().to_string());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    if !current.trim().is_empty() {
        parts.push(current.trim().to_string());
    }
    parts
}

/// Quote text as a double-quoted literal valid in C++ and Java
pub(crate) fn quote_c_string(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c if (c as u32) < 0x20 => quoted.push_str(&format!("\\{:03o}", c as u32)),
            c => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Quote a single character as a C++/Java char literal
pub(crate) fn quote_c_char(ch: char) -> String {
    match ch {
        '\'' => "'\\''".to_string(),
        '\\' => "'\\\\'".to_string(),
        '\n' => "'\\n'".to_string(),
        '\r' => "'\\r'".to_string(),
        '\t' => "'\\t'".to_string(),
        c => format!("'{}'", c),
    }
}

/// Pick the entry among candidates: `Solution` members first, then the first non-helper
pub(crate) fn choose_entry(candidates: Vec<EntryPoint>) -> EntryPoint {
    let in_solution = candidates
        .iter()
        .find(|c| c.owner.as_deref() == Some("Solution") && !is_helper(&c.name));
    if let Some(entry) = in_solution {
        return entry.clone();
    }
    candidates
        .into_iter()
        .find(|c| !is_helper(&c.name))
        .unwrap_or_else(EntryPoint::fallback)
}

/// Name of the class whose body contains byte offset `at`, if any.
/// Brace-delimited languages only.
pub(crate) fn enclosing_class(class_spans: &[(String, usize, usize)], at: usize) -> Option<String> {
    class_spans
        .iter()
        .filter(|(_, start, end)| *start <= at && at < *end)
        .max_by_key(|(_, start, _)| *start)
        .map(|(name, _, _)| name.clone())
}

/// Find `class Name ... {` declarations and the byte span of their bodies.
/// `code` must already have comments and strings blanked.
pub(crate) fn brace_class_spans(code: &str) -> Vec<(String, usize, usize)> {
    static CLASS: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(class_re) = cached_regex(&CLASS, r"\b(?:class|struct)\s+([A-Za-z_]\w*)[^;{]*\{") else {
        return Vec::new();
    };

    class_re
        .captures_iter(code)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_string();
            let open = whole.end() - 1;
            let close = matching_brace(code, open)?;
            Some((name, open, close))
        })
        .collect()
}

/// Byte offset of the `}` matching the `{` at `open`
pub(crate) fn matching_brace(code: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in code.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Split `type name` (optionally `= default`) into a typed parameter
pub(crate) fn split_typed_param(text: &str) -> Option<Param> {
    let text = text.split('=').next().unwrap_or_default().trim();
    let name_start = text
        .char_indices()
        .rev()
        .take_while(|(_, ch)| is_ident_char(*ch))
        .last()
        .map(|(at, _)| at)?;
    let name = &text[name_start..];
    let ty = text[..name_start].trim();
    if ty.is_empty() || name.is_empty() {
        return None;
    }
    Some(Param {
        ty: Some(ty.to_string()),
        name: name.to_string(),
    })
}

/// Net `{` depth just before byte offset `at` in blanked code
pub(crate) fn brace_depth_at(code: &str, at: usize) -> i32 {
    code.as_bytes()[..at.min(code.len())]
        .iter()
        .fold(0, |depth, byte| match byte {
            b'{' => depth + 1,
            b'}' => depth - 1,
            _ => depth,
        })
}

/// Statement starters that never take a trailing semicolon on their own line
const NON_STATEMENT_PREFIXES: &[&str] = &[
    "if", "else", "for", "while", "do", "switch", "case", "default", "try", "catch", "finally",
    "function", "class", "struct", "namespace", "template", "public", "private", "protected",
    "interface", "enum", "#", "@", "}", "{", "async function", "export default function",
];

/// Continuation tokens that mean the statement goes on
const CONTINUATIONS: &[&str] = &[
    ".", "?", ":", "&&", "||", "+", "-", "*", "/", "%", "=", ")", "]", ",", "<<", ">>", "{",
];

/// Most missing-semicolon reports per analysis
const MAX_SEMICOLON_REPORTS: usize = 3;

/// Lines in a semicolon-terminated language that look like complete
/// statements without their `;`
pub(crate) fn missing_semicolons(source: &SourceText) -> Vec<String> {
    let lines: Vec<(usize, &str)> = source.lines().collect();
    let mut issues = Vec::new();
    let mut open_groups = 0i32;

    for (index, (number, line)) in lines.iter().enumerate() {
        let trimmed = line.trim();
        let depth_before = open_groups;
        open_groups += trimmed.matches(['(', '[']).count() as i32;
        open_groups -= trimmed.matches([')', ']']).count() as i32;
        open_groups = open_groups.max(0);

        if trimmed.is_empty() || depth_before > 0 || open_groups > 0 {
            continue;
        }
        let Some(last) = trimmed.chars().next_back() else {
            continue;
        };
        let ends_like_statement = is_ident_char(last)
            || matches!(last, ')' | ']' | '"' | '\'' | '`')
            || trimmed.ends_with("++")
            || trimmed.ends_with("--");
        // Unbalanced backtick: a template literal continues on the next line
        if !ends_like_statement || trimmed.matches('`').count() % 2 == 1 {
            continue;
        }
        let starts_block = NON_STATEMENT_PREFIXES.iter().any(|prefix| {
            trimmed.strip_prefix(prefix).is_some_and(|rest| {
                !prefix.chars().all(is_ident_char) || !rest.starts_with(is_ident_char)
            })
        });
        if starts_block {
            continue;
        }
        // Object literal entries and labels
        if trimmed.replace("::", "").contains(':') && !trimmed.contains('?') {
            continue;
        }
        let next = lines[index + 1..]
            .iter()
            .map(|(_, l)| l.trim())
            .find(|l| !l.is_empty());
        if next.is_some_and(|n| CONTINUATIONS.iter().any(|c| n.starts_with(c))) {
            continue;
        }

        issues.push(format!("Line {}: statement is missing a terminating ';'", number));
        if issues.len() == MAX_SEMICOLON_REPORTS {
            break;
        }
    }

    issues
}

/// `catch (...) {}` blocks that drop the exception
pub(crate) fn empty_catch(source: &SourceText) -> Option<String> {
    static EMPTY_CATCH: OnceLock<Option<Regex>> = OnceLock::new();
    let catch_re = cached_regex(&EMPTY_CATCH, r"\bcatch\s*(?:\([^)]*\))?\s*\{\s*\}")?;
    catch_re.find(source.code()).map(|found| {
        format!(
            "Line {}: empty catch block silently swallows the exception",
            source.line_of(found.start())
        )
    })
}

/// `if (a = b)` / `while (a = b)` where a comparison was probably meant
pub(crate) fn assignment_in_condition(source: &SourceText) -> Vec<String> {
    static CONDITION: OnceLock<Option<Regex>> = OnceLock::new();
    static SINGLE_EQUALS: OnceLock<Option<Regex>> = OnceLock::new();
    let (Some(condition_re), Some(assign_re)) = (
        cached_regex(&CONDITION, r"\b(?:if|while)\s*\(([^()]*)\)"),
        cached_regex(&SINGLE_EQUALS, r"(?:^|[^=!<>+\-*/%&|^])=(?:[^=>]|$)"),
    ) else {
        return Vec::new();
    };

    condition_re
        .captures_iter(source.code())
        .filter_map(|caps| {
            let inner = caps.get(1)?;
            assign_re.is_match(inner.as_str()).then(|| {
                format!(
                    "Line {}: assignment inside a condition; did you mean '==' or '==='?",
                    source.line_of(inner.start())
                )
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_arguments_line_per_argument() {
        let args = parse_arguments("[2,7,11,15]\n9\n").unwrap();
        assert_eq!(args, vec![serde_json::json!([2, 7, 11, 15]), serde_json::json!(9)]);
    }

    #[test]
    fn test_parse_arguments_skips_blank_lines() {
        let args = parse_arguments("\n\"abc\"\n\n").unwrap();
        assert_eq!(args, vec![serde_json::json!("abc")]);
    }

    #[test]
    fn test_parse_arguments_reports_bad_line() {
        let err = parse_arguments("[1,2]\nnot json").unwrap_err();
        assert!(err.contains("line 2"));
    }

    #[test]
    fn test_split_top_level() {
        assert_eq!(
            split_top_level("vector<pair<int, int>>& a, int b"),
            vec!["vector<pair<int, int>>& a", "int b"]
        );
        assert!(split_top_level("  ").is_empty());
    }

    #[test]
    fn test_quote_c_string() {
        assert_eq!(quote_c_string("a\"b\\c\n"), r#""a\"b\\c\n""#);
        assert_eq!(quote_c_char('\''), r"'\''");
    }

    #[test]
    fn test_choose_entry_prefers_solution_members() {
        let free = EntryPoint {
            name: "twoSum".into(),
            ..EntryPoint::fallback()
        };
        let member = EntryPoint {
            name: "threeSum".into(),
            owner: Some("Solution".into()),
            ..EntryPoint::fallback()
        };
        let helper = EntryPoint {
            name: "helper".into(),
            ..EntryPoint::fallback()
        };

        assert_eq!(choose_entry(vec![free.clone(), member.clone()]).name, "threeSum");
        assert_eq!(choose_entry(vec![helper.clone(), free]).name, "twoSum");
        assert_eq!(choose_entry(vec![helper]).name, DEFAULT_ENTRY);
    }

    #[test]
    fn test_split_typed_param() {
        let param = split_typed_param("vector<int>& nums").unwrap();
        assert_eq!(param.name, "nums");
        assert_eq!(param.ty.as_deref(), Some("vector<int>&"));

        let param = split_typed_param("const string &s").unwrap();
        assert_eq!(param.name, "s");
        assert_eq!(param.ty.as_deref(), Some("const string &"));

        assert!(split_typed_param("x").is_none());
    }

    fn brace_text(src: &str) -> SourceText<'_> {
        SourceText::new(src, support_for(Language::Cpp).lexicon())
    }

    #[test]
    fn test_missing_semicolons() {
        let src = "int f(int x)\n{\n    int y = x + 1\n    return y;\n}\n";
        let issues = missing_semicolons(&brace_text(src));
        assert_eq!(issues, vec!["Line 3: statement is missing a terminating ';'"]);
    }

    #[test]
    fn test_semicolon_heuristic_ignores_continuations() {
        let src = "int total = a\n    + b;\nfoo(a,\n    b);\nif (x)\n    y++;\n";
        assert!(missing_semicolons(&brace_text(src)).is_empty());
    }

    #[test]
    fn test_empty_catch() {
        let text = brace_text("try {\n  f();\n} catch (const std::exception& e) {\n}\n");
        assert_eq!(
            empty_catch(&text).as_deref(),
            Some("Line 3: empty catch block silently swallows the exception")
        );
    }

    #[test]
    fn test_assignment_in_condition() {
        let text = brace_text("if (a = b) {}\nif (a == b) {}\nwhile (x <= y) {}\n");
        let issues = assignment_in_condition(&text);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].starts_with("Line 1"));
    }

    #[test]
    fn test_brace_class_spans() {
        let code = "class Solution {\n  int f() { return 1; }\n};\nint g() { return 2; }\n";
        let spans = brace_class_spans(code);
        assert_eq!(spans.len(), 1);
        let (name, start, end) = &spans[0];
        assert_eq!(name, "Solution");
        assert!(code[*start..=*end].contains("int f()"));
        assert!(!code[*start..=*end].contains("int g()"));
    }
}
