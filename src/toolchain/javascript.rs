//! JavaScript (Node.js) strategy

use std::sync::OnceLock;

use regex::Regex;

use super::{
    assignment_in_condition, brace_class_spans, brace_depth_at, cached_regex, choose_entry,
    empty_catch, enclosing_class, missing_semicolons, parse_arguments, split_top_level,
    BlockStyle, EntryPoint, Harness, Invocation, LanguageSupport, Lexicon, Param, RESULT_MARKER,
};
use crate::analyzer::source::SourceText;
use crate::catalog::TestCase;
use crate::languages::Language;

pub struct JavaScriptSupport;

static LEXICON: Lexicon = Lexicon {
    line_comment: "//",
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\''],
    multiline_quotes: &["`"],
    block_style: BlockStyle::Braces,
    loop_keywords: &["for", "while", "do", "forEach"],
    decision_keywords: &["if", "else", "for", "while", "case", "catch"],
};

/// Words that look like `name(...) {` but are not method definitions
const NOT_METHODS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "function", "constructor", "return",
];

const DRIVER: &str = r#"
;(function () {
  const _engineInput = require("fs").readFileSync(0, "utf8");
  const _engineArgs = _engineInput
    .split(/\r?\n/)
    .filter((line) => line.trim().length > 0)
    .map((line) => JSON.parse(line));
  {target}
  const _engineReplacer = (key, value) =>
    value instanceof Set ? [...value] : value instanceof Map ? Object.fromEntries(value) : value;
  Promise.resolve(_engineTarget(..._engineArgs)).then((value) => {
    const result = value === undefined && _engineArgs.length > 0 ? _engineArgs[0] : value;
    process.stdout.write(
      "{marker}" + JSON.stringify(result === undefined ? null : result, _engineReplacer) + "\n"
    );
  });
})();
"#;

impl LanguageSupport for JavaScriptSupport {
    fn language(&self) -> Language {
        Language::JavaScript
    }

    fn lexicon(&self) -> &'static Lexicon {
        &LEXICON
    }

    fn detect_entry_point(&self, source: &str) -> EntryPoint {
        static FUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
        static BINDING: OnceLock<Option<Regex>> = OnceLock::new();
        static METHOD: OnceLock<Option<Regex>> = OnceLock::new();
        let (Some(function_re), Some(binding_re), Some(method_re)) = (
            cached_regex(
                &FUNCTION,
                r"\b(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)\s*\(([^)]*)\)",
            ),
            cached_regex(
                &BINDING,
                r"\b(?:const|let|var)\s+([A-Za-z_$][\w$]*)\s*=\s*(?:async\s+)?(?:function\b[^(]*\(([^)]*)\)|\(([^)]*)\)\s*=>|([A-Za-z_$][\w$]*)\s*=>)",
            ),
            cached_regex(
                &METHOD,
                r"(?m)^[ \t]*(static\s+)?(?:async\s+)?([A-Za-z_$][\w$]*)\s*\(([^)]*)\)\s*\{",
            ),
        ) else {
            return EntryPoint::fallback();
        };

        let text = SourceText::new(source, &LEXICON);
        let code = text.code();
        let classes = brace_class_spans(code);
        let params_of = |range: std::ops::Range<usize>| -> Vec<Param> {
            split_top_level(&source[range])
                .into_iter()
                .map(|p| Param {
                    ty: None,
                    name: p.split('=').next().unwrap_or_default().trim().to_string(),
                })
                .collect()
        };

        let mut found: Vec<(usize, EntryPoint)> = Vec::new();

        for caps in function_re.captures_iter(code) {
            let (Some(whole), Some(name), Some(params)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            if brace_depth_at(code, whole.start()) != 0 {
                continue;
            }
            found.push((
                whole.start(),
                EntryPoint {
                    name: name.as_str().to_string(),
                    params: params_of(params.range()),
                    detected: true,
                    ..EntryPoint::fallback()
                },
            ));
        }

        for caps in binding_re.captures_iter(code) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if brace_depth_at(code, whole.start()) != 0 {
                continue;
            }
            let params = match (caps.get(2).or(caps.get(3)), caps.get(4)) {
                (Some(list), _) => params_of(list.range()),
                (None, Some(single)) => vec![Param {
                    ty: None,
                    name: single.as_str().to_string(),
                }],
                (None, None) => Vec::new(),
            };
            found.push((
                whole.start(),
                EntryPoint {
                    name: name.as_str().to_string(),
                    params,
                    detected: true,
                    ..EntryPoint::fallback()
                },
            ));
        }

        for caps in method_re.captures_iter(code) {
            let (Some(whole), Some(name), Some(params)) = (caps.get(0), caps.get(2), caps.get(3))
            else {
                continue;
            };
            if NOT_METHODS.contains(&name.as_str()) {
                continue;
            }
            let Some(owner) = enclosing_class(&classes, whole.start()) else {
                continue;
            };
            found.push((
                whole.start(),
                EntryPoint {
                    name: name.as_str().to_string(),
                    owner: Some(owner),
                    is_static: caps.get(1).is_some(),
                    params: params_of(params.range()),
                    detected: true,
                    ..EntryPoint::fallback()
                },
            ));
        }

        found.sort_by_key(|(at, _)| *at);
        choose_entry(found.into_iter().map(|(_, entry)| entry).collect())
    }

    fn build_harness(&self, source: &str, test_cases: &[TestCase]) -> Harness {
        let entry = self.detect_entry_point(source);
        let target = match (&entry.owner, entry.is_static) {
            (Some(class), true) => format!(
                "const _engineTarget = {class}.{name}.bind({class});",
                class = class,
                name = entry.name
            ),
            (Some(class), false) => format!(
                "const _engineInstance = new {}();\n  const _engineTarget = _engineInstance.{}.bind(_engineInstance);",
                class, entry.name
            ),
            (None, _) => format!("const _engineTarget = {};", entry.name),
        };
        let driver = DRIVER
            .replace("{target}", &target)
            .replace("{marker}", RESULT_MARKER);

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
            source: format!("{}\n{}", source, driver),
            invocations,
        }
    }

    fn syntax_pitfalls(&self, source: &SourceText) -> Vec<String> {
        let mut issues = missing_semicolons(source);
        issues.extend(assignment_in_condition(source));
        issues
    }

    fn logic_pitfalls(&self, source: &SourceText) -> Vec<String> {
        empty_catch(source).into_iter().collect()
    }

    fn style_suggestions(&self, source: &SourceText) -> Vec<String> {
        static LOOSE_EQUALITY: OnceLock<Option<Regex>> = OnceLock::new();
        let mut suggestions = Vec::new();

        if source.contains_word("var") {
            suggestions.push("Prefer let/const over var for block-scoped variables".to_string());
        }
        if let Some(loose) = cached_regex(&LOOSE_EQUALITY, r"[^=!<>]==[^=]|!=[^=]") {
            if loose.is_match(source.code()) {
                suggestions.push(
                    "Use === and !== to avoid implicit type coercion in comparisons".to_string(),
                );
            }
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(input: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: String::new(),
            explanation: None,
        }
    }

    #[test]
    fn test_detects_function_declaration() {
        let src = "function helper(a) { return a; }\nfunction twoSum(nums, target) {\n  const inner = (x) => x;\n  return [];\n}\n";
        let entry = JavaScriptSupport.detect_entry_point(src);

        assert_eq!(entry.name, "twoSum");
        assert_eq!(entry.params.len(), 2);
        assert_eq!(entry.params[1].name, "target");
    }

    #[test]
    fn test_detects_arrow_binding() {
        let entry = JavaScriptSupport.detect_entry_point("const isValid = (s) => {\n  return true;\n};\n");
        assert_eq!(entry.name, "isValid");
        assert_eq!(entry.params[0].name, "s");
    }

    #[test]
    fn test_prefers_solution_class_method() {
        let src = "function parse(x) { return x; }\nclass Solution {\n  constructor() {}\n  maxSubArray(nums) {\n    if (nums.length) {\n      return 1;\n    }\n  }\n}\n";
        let entry = JavaScriptSupport.detect_entry_point(src);

        assert_eq!(entry.name, "maxSubArray");
        assert_eq!(entry.owner.as_deref(), Some("Solution"));
        assert!(!entry.is_static);
    }

    #[test]
    fn test_harness_binds_instance_method() {
        let src = "class Solution {\n  twoSum(nums, target) {\n    return [0, 1];\n  }\n}\n";
        let harness = JavaScriptSupport.build_harness(src, &[case("[1,2]\n3"), case("[1,")]);

        assert!(harness.source.contains("new Solution()"));
        assert!(harness.source.contains("_engineInstance.twoSum.bind(_engineInstance)"));
        assert!(harness.source.contains(RESULT_MARKER));
        assert!(matches!(harness.invocations[0], Invocation::Run { .. }));
        assert!(matches!(harness.invocations[1], Invocation::Invalid { .. }));
    }

    #[test]
    fn test_syntax_pitfalls() {
        let src = "function f(a, b) {\n  if (a = b) {\n    return 1;\n  }\n  let x = 2\n  return x;\n}\n";
        let text = SourceText::new(src, &LEXICON);
        let issues = JavaScriptSupport.syntax_pitfalls(&text);

        assert_eq!(issues.len(), 2);
        assert!(issues.iter().any(|i| i.starts_with("Line 5")));
        assert!(issues.iter().any(|i| i.contains("assignment inside a condition")));
    }

    #[test]
    fn test_object_literal_is_not_missing_semicolons() {
        let src = "const o = {\n  a: 1,\n  b: 2\n};\n";
        let text = SourceText::new(src, &LEXICON);
        assert!(JavaScriptSupport.syntax_pitfalls(&text).is_empty());
    }

    #[test]
    fn test_style_suggestions() {
        let src = "var x = 1;\nif (x == 1) { x++; }\n";
        let text = SourceText::new(src, &LEXICON);
        assert_eq!(JavaScriptSupport.style_suggestions(&text).len(), 2);
    }
}
