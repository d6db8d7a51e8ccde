//! Python strategy
//!
//! The harness appends a small driver to the candidate module. It reads one
//! JSON value per stdin line, calls the entry point and prints the result
//! behind the result marker.

use std::sync::OnceLock;

use regex::Regex;

use super::{
    cached_regex, choose_entry, parse_arguments, split_top_level, BlockStyle, EntryPoint,
    Harness, Invocation, LanguageSupport, Lexicon, Param, RESULT_MARKER,
};
use crate::analyzer::source::{is_ident_char, SourceText};
use crate::catalog::TestCase;
use crate::languages::Language;

pub struct PythonSupport;

static LEXICON: Lexicon = Lexicon {
    line_comment: "#",
    block_comment: None,
    quotes: &['"', '\''],
    multiline_quotes: &["\"\"\"", "'''"],
    block_style: BlockStyle::Indentation,
    loop_keywords: &["for", "while"],
    decision_keywords: &["if", "elif", "else", "for", "while", "except", "and", "or", "case"],
};

/// Block headers that must end with a colon
const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "class", "try", "except", "finally", "with",
];

const PRELUDE: &str = "\
from typing import *
import bisect
import collections
import heapq
import itertools
import math
from collections import Counter, defaultdict, deque
";

const DRIVER: &str = r#"
def _engine_main():
    import json as _engine_json
    import sys as _engine_sys
    _engine_args = [_engine_json.loads(_line) for _line in _engine_sys.stdin.read().splitlines() if _line.strip()]
    _engine_result = {target}(*_engine_args)
    # In-place solutions return None; report the mutated first argument
    if _engine_result is None and _engine_args:
        _engine_result = _engine_args[0]
    print("{marker}" + _engine_json.dumps(_engine_result, separators=(",", ":"), default=list))


if __name__ == "__main__":
    _engine_main()
"#;

impl LanguageSupport for PythonSupport {
    fn language(&self) -> Language {
        Language::Python
    }

    fn lexicon(&self) -> &'static Lexicon {
        &LEXICON
    }

    fn detect_entry_point(&self, source: &str) -> EntryPoint {
        static DEF: OnceLock<Option<Regex>> = OnceLock::new();
        static CLASS: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(def_re) = cached_regex(
            &DEF,
            r"(?m)^([ \t]*)(?:async[ \t]+)?def[ \t]+([A-Za-z_]\w*)[ \t]*\(([^)]*)\)[ \t]*(?:->[ \t]*([^:\n]+?))?[ \t]*:",
        ) else {
            return EntryPoint::fallback();
        };
        let Some(class_re) = cached_regex(&CLASS, r"(?m)^class[ \t]+([A-Za-z_]\w*)") else {
            return EntryPoint::fallback();
        };

        let text = SourceText::new(source, &LEXICON);
        let code = text.code();

        // Top-level classes and where they start; a method belongs to the
        // closest class above it when it is indented.
        let classes: Vec<(usize, String)> = class_re
            .captures_iter(code)
            .filter_map(|caps| Some((caps.get(0)?.start(), caps.get(1)?.as_str().to_string())))
            .collect();

        let candidates = def_re
            .captures_iter(code)
            .filter_map(|caps| {
                let start = caps.get(0)?.start();
                let indented = !caps.get(1)?.as_str().is_empty();
                let name = caps.get(2)?.as_str().to_string();
                if name.starts_with("__") {
                    return None;
                }
                let owner = if indented {
                    classes
                        .iter()
                        .filter(|(at, _)| *at < start)
                        .last()
                        .map(|(_, class)| class.clone())
                } else {
                    None
                };
                // Nested functions inside other functions are helpers
                if indented && owner.is_none() {
                    return None;
                }

                let params_range = caps.get(3)?.range();
                let mut params: Vec<Param> = split_top_level(&source[params_range])
                    .into_iter()
                    .filter(|p| !p.is_empty() && !p.starts_with('*') && p != "/")
                    .map(|p| Param {
                        ty: p.split_once(':').map(|(_, ty)| ty.trim().to_string()),
                        name: p
                            .split([':', '='])
                            .next()
                            .unwrap_or_default()
                            .trim()
                            .to_string(),
                    })
                    .collect();
                let is_method = owner.is_some();
                if is_method && params.first().is_some_and(|p| p.name == "self" || p.name == "cls") {
                    params.remove(0);
                }

                Some(EntryPoint {
                    name,
                    owner,
                    is_static: false,
                    params,
                    return_type: caps
                        .get(4)
                        .map(|m| source[m.range()].trim().to_string()),
                    detected: true,
                })
            })
            .collect();

        choose_entry(candidates)
    }

    fn build_harness(&self, source: &str, test_cases: &[TestCase]) -> Harness {
        let entry = self.detect_entry_point(source);
        let target = match &entry.owner {
            Some(class) => format!("{}().{}", class, entry.name),
            None => entry.name.clone(),
        };
        let driver = DRIVER
            .replace("{target}", &target)
            .replace("{marker}", RESULT_MARKER);
        let harness = format!("{}\n{}\n\n{}", PRELUDE, source, driver);

        let invocations = test_cases
            .iter()
            .map(|case| match parse_arguments(&case.input) {
                Ok(_) => Invocation::Run {
                    args: Vec::new(),
                    stdin: Some(case.input.clone()),
                },
                Err(reason) => Invocation::Invalid { reason },
            })
            .collect();

        Harness {
            source: harness,
            invocations,
        }
    }

    fn syntax_pitfalls(&self, source: &SourceText) -> Vec<String> {
        let mut issues = Vec::new();

        for (number, line) in source.lines() {
            let trimmed = line.trim();
            let Some(keyword) = BLOCK_KEYWORDS.iter().find(|kw| {
                trimmed
                    .strip_prefix(**kw)
                    .is_some_and(|rest| rest.is_empty() || !rest.starts_with(is_ident_char))
            }) else {
                continue;
            };
            // Headers continued on the next line are not judged
            let opens = trimmed.matches(['(', '[', '{']).count();
            let closes = trimmed.matches([')', ']', '}']).count();
            if opens > closes || trimmed.ends_with('\\') {
                continue;
            }
            if !trimmed.contains(':') {
                issues.push(format!(
                    "Line {}: missing ':' after '{}' statement",
                    number, keyword
                ));
            }
        }

        let mut tab_line = None;
        let mut space_line = None;
        for (number, line) in source.original().lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
            if indent.contains('\t') {
                tab_line.get_or_insert(number + 1);
            }
            if indent.contains(' ') {
                space_line.get_or_insert(number + 1);
            }
        }
        if let (Some(tabs), Some(spaces)) = (tab_line, space_line) {
            issues.push(format!(
                "Inconsistent use of tabs and spaces in indentation (lines {} and {})",
                tabs.min(spaces),
                tabs.max(spaces)
            ));
        }

        issues
    }

    fn logic_pitfalls(&self, source: &SourceText) -> Vec<String> {
        static SWALLOW: OnceLock<Option<Regex>> = OnceLock::new();
        let mut issues = Vec::new();

        if let Some(swallow) =
            cached_regex(&SWALLOW, r"(?m)^[ \t]*except\b[^:\n]*:[ \t]*(?:\n[ \t]*)?pass\b")
        {
            if let Some(found) = swallow.find(source.code()) {
                issues.push(format!(
                    "Line {}: exception is silently swallowed with 'pass'",
                    source.line_of(found.start())
                ));
            }
        }

        issues
    }

    fn style_suggestions(&self, source: &SourceText) -> Vec<String> {
        let mut suggestions = Vec::new();
        let code = source.code();
        if code.contains("range(len(") {
            suggestions.push(
                "Use enumerate() instead of range(len(...)) when you need both index and value"
                    .to_string(),
            );
        }
        if code.contains(".index(") && source.count_word("for") > 0 {
            suggestions.push(
                "list.index() scans the whole list; a dict of value -> index makes lookups O(1)"
                    .to_string(),
            );
        }
        suggestions
    }
}
