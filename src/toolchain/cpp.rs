//! C++ strategy
//!
//! Like Java, test cases are compiled into the harness as typed literals and
//! selected by index on the command line. A submission that defines its own
//! `main` is run as-is with the raw test input on stdin.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::java::float_literal;
use super::{
    assignment_in_condition, brace_class_spans, brace_depth_at, cached_regex, choose_entry,
    empty_catch, enclosing_class, missing_semicolons, parse_arguments, quote_c_char,
    quote_c_string, split_top_level, split_typed_param, BlockStyle, EntryPoint, Harness,
    Invocation, LanguageSupport, Lexicon, Param, RESULT_MARKER,
};
use crate::analyzer::source::SourceText;
use crate::catalog::TestCase;
use crate::languages::Language;

pub struct CppSupport;

static LEXICON: Lexicon = Lexicon {
    line_comment: "//",
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\''],
    multiline_quotes: &[],
    block_style: BlockStyle::Braces,
    loop_keywords: &["for", "while", "do"],
    decision_keywords: &["if", "else", "for", "while", "case", "catch"],
};

const NOT_FUNCTIONS: &[&str] = &["if", "for", "while", "switch", "catch", "return", "sizeof"];

const NOT_RETURN_TYPES: &[&str] = &["return", "else", "new", "delete", "explicit", "throw", "case"];

const PRELUDE: &str = "#include <bits/stdc++.h>\nusing namespace std;\n";

const EMITTERS: &str = r#"
namespace engine_harness {
inline void emit(bool v) { cout << (v ? "true" : "false"); }
inline void emit(short v) { cout << v; }
inline void emit(int v) { cout << v; }
inline void emit(long v) { cout << v; }
inline void emit(long long v) { cout << v; }
inline void emit(unsigned v) { cout << v; }
inline void emit(unsigned long v) { cout << v; }
inline void emit(unsigned long long v) { cout << v; }
inline void emit(double v) {
    if (!std::isfinite(v)) { cout << "null"; return; }
    cout << setprecision(15) << v;
}
inline void emit(float v) { emit(static_cast<double>(v)); }
inline void emit(const string& v) {
    cout << '"';
    for (unsigned char c : v) {
        switch (c) {
            case '"': cout << "\\\""; break;
            case '\\': cout << "\\\\"; break;
            case '\n': cout << "\\n"; break;
            case '\r': cout << "\\r"; break;
            case '\t': cout << "\\t"; break;
            default:
                if (c < 0x20) {
                    char buf[8];
                    snprintf(buf, sizeof buf, "\\u%04x", c);
                    cout << buf;
                } else {
                    cout << c;
                }
        }
    }
    cout << '"';
}
inline void emit(const char* v) { emit(string(v)); }
inline void emit(char v) { emit(string(1, v)); }
template <typename T> void emit(const vector<T>& v);
template <typename A, typename B> void emit(const pair<A, B>& v);
template <typename T> void emit(const set<T>& v);
template <typename T> void emit(const vector<T>& v) {
    cout << '[';
    for (size_t i = 0; i < v.size(); ++i) {
        if (i) cout << ',';
        emit(static_cast<T>(v[i]));
    }
    cout << ']';
}
template <typename A, typename B> void emit(const pair<A, B>& v) {
    cout << '[';
    emit(v.first);
    cout << ',';
    emit(v.second);
    cout << ']';
}
template <typename T> void emit(const set<T>& v) {
    cout << '[';
    bool first = true;
    for (const auto& item : v) {
        if (!first) cout << ',';
        first = false;
        emit(item);
    }
    cout << ']';
}
}
"#;

/// C++ types the harness can build literals for
#[derive(Debug, Clone, PartialEq)]
enum CppType {
    Int,
    Long,
    LongLong,
    Unsigned,
    Double,
    Float,
    Bool,
    Char,
    Str,
    Vector(Box<CppType>),
}

impl CppType {
    fn parse(text: &str) -> Option<Self> {
        let cleaned = text.replace("std::", "").replace('&', " ");
        let words: Vec<&str> = cleaned
            .split_whitespace()
            .filter(|w| *w != "const")
            .collect();
        let text = words.join(" ");
        if let Some(inner) = text
            .strip_prefix("vector<")
            .and_then(|rest| rest.strip_suffix('>'))
        {
            return Some(CppType::Vector(Box::new(Self::parse(inner)?)));
        }
        match text.as_str() {
            "int" | "signed" | "signed int" | "short" | "int32_t" => Some(CppType::Int),
            "long" | "long int" => Some(CppType::Long),
            "long long" | "long long int" | "int64_t" => Some(CppType::LongLong),
            "unsigned" | "unsigned int" | "size_t" | "uint32_t" => Some(CppType::Unsigned),
            "double" => Some(CppType::Double),
            "float" => Some(CppType::Float),
            "bool" => Some(CppType::Bool),
            "char" => Some(CppType::Char),
            "string" => Some(CppType::Str),
            _ => None,
        }
    }

    fn infer(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(_) => Ok(CppType::Bool),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(v) if i32::try_from(v).is_ok() => CppType::Int,
                Some(_) => CppType::LongLong,
                None => CppType::Double,
            }),
            Value::String(_) => Ok(CppType::Str),
            Value::Array(items) => {
                let mut element: Option<CppType> = None;
                for item in items {
                    let found = Self::infer(item)?;
                    element = Some(match element {
                        None => found,
                        Some(current) => current.widen(found)?,
                    });
                }
                Ok(CppType::Vector(Box::new(element.unwrap_or(CppType::Int))))
            }
            Value::Null => Err("cannot infer a C++ type for null".to_string()),
            Value::Object(_) => Err("JSON objects are not supported as arguments".to_string()),
        }
    }

    fn widen(self, other: CppType) -> Result<CppType, String> {
        use CppType::*;
        match (self, other) {
            (a, b) if a == b => Ok(a),
            (Int, LongLong) | (LongLong, Int) => Ok(LongLong),
            (Int | LongLong, Double) | (Double, Int | LongLong) => Ok(Double),
            (Vector(a), Vector(b)) => Ok(Vector(Box::new((*a).widen(*b)?))),
            (a, b) => Err(format!(
                "mixed element types {} and {}",
                a.render(),
                b.render()
            )),
        }
    }

    fn render(&self) -> String {
        match self {
            CppType::Int => "int".into(),
            CppType::Long => "long".into(),
            CppType::LongLong => "long long".into(),
            CppType::Unsigned => "unsigned".into(),
            CppType::Double => "double".into(),
            CppType::Float => "float".into(),
            CppType::Bool => "bool".into(),
            CppType::Char => "char".into(),
            CppType::Str => "string".into(),
            CppType::Vector(inner) => format!("vector<{}>", inner.render()),
        }
    }

    fn literal(&self, value: &Value) -> Result<String, String> {
        let mismatch = || format!("cannot use {} as {}", value, self.render());
        match (self, value) {
            (CppType::Int, Value::Number(n)) => match n.as_i64() {
                Some(v) if i32::try_from(v).is_ok() => Ok(v.to_string()),
                Some(v) => Err(format!("{} is out of range for int", v)),
                None => Err(mismatch()),
            },
            (CppType::Long, Value::Number(n)) => {
                n.as_i64().map(|v| format!("{}L", v)).ok_or_else(mismatch)
            }
            (CppType::LongLong, Value::Number(n)) => {
                n.as_i64().map(|v| format!("{}LL", v)).ok_or_else(mismatch)
            }
            (CppType::Unsigned, Value::Number(n)) => n
                .as_u64()
                .filter(|v| u32::try_from(*v).is_ok())
                .map(|v| format!("{}u", v))
                .ok_or_else(mismatch),
            (CppType::Double, Value::Number(n)) => {
                n.as_f64().map(float_literal).ok_or_else(mismatch)
            }
            (CppType::Float, Value::Number(n)) => n
                .as_f64()
                .map(|v| format!("{}f", float_literal(v)))
                .ok_or_else(mismatch),
            (CppType::Bool, Value::Bool(b)) => Ok(b.to_string()),
            (CppType::Char, Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) if ch.is_ascii() => Ok(quote_c_char(ch)),
                    _ => Err(mismatch()),
                }
            }
            (CppType::Str, Value::String(s)) => Ok(quote_c_string(s)),
            (CppType::Vector(inner), Value::Array(items)) => {
                let elements = items
                    .iter()
                    .map(|item| inner.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("{{{}}}", elements.join(", ")))
            }
            _ => Err(mismatch()),
        }
    }
}

impl CppSupport {
    fn has_own_main(code: &str) -> bool {
        static MAIN: OnceLock<Option<Regex>> = OnceLock::new();
        cached_regex(&MAIN, r"\bint\s+main\s*\(").is_some_and(|re| re.is_match(code))
    }

    fn case_body(&self, entry: &EntryPoint, input: &str) -> Result<String, String> {
        let args = parse_arguments(input)?;
        if entry.detected && entry.params.len() != args.len() {
            return Err(format!(
                "{} expects {} argument(s) but the test case provides {}",
                entry.name,
                entry.params.len(),
                args.len()
            ));
        }

        let mut body = String::new();
        let mut names = Vec::with_capacity(args.len());
        for (index, value) in args.iter().enumerate() {
            let ty = match entry.params.get(index).and_then(|p| p.ty.as_deref()) {
                Some(text) => CppType::parse(text)
                    .ok_or_else(|| format!("unsupported parameter type {}", text.trim()))?,
                None => CppType::infer(value)?,
            };
            let name = format!("engine_arg{}", index);
            body.push_str(&format!(
                "            {} {} = {};\n",
                ty.render(),
                name,
                ty.literal(value)?
            ));
            names.push(name);
        }

        let args = names.join(", ");
        let call = match (&entry.owner, entry.is_static) {
            (Some(owner), true) => format!("{}::{}({})", owner, entry.name, args),
            (Some(owner), false) => {
                body.push_str(&format!("            {} engine_solution;\n", owner));
                format!("engine_solution.{}({})", entry.name, args)
            }
            (None, _) => format!("{}({})", entry.name, args),
        };

        let reported = if entry.returns_nothing() {
            body.push_str(&format!("            {};\n", call));
            names.first().cloned().unwrap_or_else(|| "nullptr".to_string())
        } else {
            body.push_str(&format!("            auto engine_result = {};\n", call));
            "engine_result".to_string()
        };
        body.push_str(&format!(
            "            cout << \"{}\";\n            engine_harness::emit({});\n            cout << endl;\n",
            RESULT_MARKER, reported
        ));
        Ok(body)
    }
}

impl LanguageSupport for CppSupport {
    fn language(&self) -> Language {
        Language::Cpp
    }

    fn lexicon(&self) -> &'static Lexicon {
        &LEXICON
    }

    fn detect_entry_point(&self, source: &str) -> EntryPoint {
        static FUNCTION: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(function_re) = cached_regex(
            &FUNCTION,
            r"(?m)^[ \t]*((?:(?:static|inline|virtual|constexpr)[ \t]+)*)([A-Za-z_][\w:<>, \t\*&]*?[ \t\*&>])([A-Za-z_]\w*)[ \t]*\(([^()]*)\)\s*(?:const\s*)?(?:noexcept\s*)?(?:override\s*)?\{",
        ) else {
            return EntryPoint::fallback();
        };

        let text = SourceText::new(source, &LEXICON);
        let code = text.code();
        let classes = brace_class_spans(code);

        let candidates = function_re
            .captures_iter(code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let return_type = caps.get(2)?.as_str().trim();
                let name = caps.get(3)?.as_str();
                let first_word = return_type.split_whitespace().next().unwrap_or_default();
                if NOT_FUNCTIONS.contains(&name) || NOT_RETURN_TYPES.contains(&first_word) {
                    return None;
                }
                let owner = enclosing_class(&classes, whole.start());
                if owner.is_none() && brace_depth_at(code, whole.start()) != 0 {
                    return None;
                }
                if owner.as_deref() == Some(name) {
                    return None;
                }
                let params = split_top_level(&source[caps.get(4)?.range()])
                    .iter()
                    .filter(|p| p.as_str() != "void")
                    .map(|p| {
                        split_typed_param(p).unwrap_or(Param {
                            ty: None,
                            name: p.clone(),
                        })
                    })
                    .collect();
                let is_static = caps.get(1)?.as_str().contains("static");

                Some(EntryPoint {
                    name: name.to_string(),
                    is_static: is_static && owner.is_some(),
                    owner,
                    params,
                    return_type: Some(return_type.to_string()),
                    detected: true,
                })
            })
            .collect();

        choose_entry(candidates)
    }

    fn build_harness(&self, source: &str, test_cases: &[TestCase]) -> Harness {
        let text = SourceText::new(source, &LEXICON);
        if Self::has_own_main(text.code()) {
            return Harness {
                source: source.to_string(),
                invocations: test_cases
                    .iter()
                    .map(|case| Invocation::Run {
                        args: Vec::new(),
                        stdin: Some(case.input.clone()),
                    })
                    .collect(),
            };
        }

        let entry = self.detect_entry_point(source);
        let mut cases = String::new();
        let invocations = test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| match self.case_body(&entry, &case.input) {
                Ok(statements) => {
                    cases.push_str(&format!(
                        "        case {}: {{\n{}            break;\n        }}\n",
                        index, statements
                    ));
                    Invocation::Run {
                        args: vec![index.to_string()],
                        stdin: None,
                    }
                }
                Err(reason) => Invocation::Invalid { reason },
            })
            .collect();

        let harness = format!(
            "{prelude}\n{source}\n{emitters}\n\
int main(int argc, char** argv) {{\n    \
int engine_case = argc > 1 ? atoi(argv[1]) : -1;\n    \
switch (engine_case) {{\n\
{cases}        \
default:\n            \
return 3;\n    \
}}\n    \
return 0;\n\
}}\n",
            prelude = PRELUDE,
            source = source,
            emitters = EMITTERS,
            cases = cases,
        );

        Harness {
            source: harness,
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
        let mut suggestions = Vec::new();
        let in_loop = LEXICON.loop_keywords.iter().any(|kw| source.contains_word(kw));
        if in_loop && source.contains_word("endl") {
            suggestions.push(
                "std::endl flushes the stream on every call; prefer '\\n' inside loops".to_string(),
            );
        }
        suggestions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn case(input: &str) -> TestCase {
        TestCase {
            input: input.to_string(),
            expected_output: String::new(),
            explanation: None,
        }
    }

    const TWO_SUM: &str = "class Solution {\npublic:\n    vector<int> twoSum(vector<int>& nums, int target) {\n        for (int i = 0; i < (int)nums.size(); i++) {\n            if (nums[i] == target) {\n                return {i};\n            }\n        }\n        return {};\n    }\n};\n";

    #[test]
    fn test_detects_solution_method() {
        let entry = CppSupport.detect_entry_point(TWO_SUM);

        assert_eq!(entry.name, "twoSum");
        assert_eq!(entry.owner.as_deref(), Some("Solution"));
        assert_eq!(entry.return_type.as_deref(), Some("vector<int>"));
        assert_eq!(entry.params[0].ty.as_deref(), Some("vector<int>&"));
        assert_eq!(entry.params[1].name, "target");
    }

    #[test]
    fn test_detects_free_function_and_skips_helpers() {
        let src = "int gcd(int a, int b) {\n    return b ? gcd(b, a % b) : a;\n}\n\nlong long countPairs(const vector<int>& a) {\n    return 0;\n}\n";
        let entry = CppSupport.detect_entry_point(src);

        assert_eq!(entry.name, "countPairs");
        assert!(entry.owner.is_none());
        assert_eq!(entry.return_type.as_deref(), Some("long long"));
    }

    #[test]
    fn test_harness_embeds_typed_literals() {
        let harness = CppSupport.build_harness(TWO_SUM, &[case("[2,7,11,15]\n9"), case("{}")]);

        assert!(harness.source.starts_with("#include <bits/stdc++.h>"));
        assert!(harness.source.contains("vector<int> engine_arg0 = {2, 7, 11, 15};"));
        assert!(harness.source.contains("int engine_arg1 = 9;"));
        assert!(harness.source.contains("Solution engine_solution;"));
        assert!(harness
            .source
            .contains("auto engine_result = engine_solution.twoSum(engine_arg0, engine_arg1);"));
        assert_eq!(
            harness.invocations[0],
            Invocation::Run { args: vec!["0".into()], stdin: None }
        );
        assert!(matches!(harness.invocations[1], Invocation::Invalid { .. }));
    }

    #[test]
    fn test_void_entry_emits_first_argument() {
        let src = "class Solution {\npublic:\n    void reverseString(vector<char>& s) {\n        reverse(s.begin(), s.end());\n    }\n};\n";
        let harness = CppSupport.build_harness(src, &[case("[\"h\",\"i\"]")]);

        assert!(harness.source.contains("vector<char> engine_arg0 = {'h', 'i'};"));
        assert!(harness.source.contains("engine_solution.reverseString(engine_arg0);"));
        assert!(harness.source.contains("engine_harness::emit(engine_arg0);"));
    }

    #[test]
    fn test_own_main_runs_with_raw_stdin() {
        let src = "#include <iostream>\nint main() {\n    int x;\n    std::cin >> x;\n    std::cout << x * 2;\n}\n";
        let harness = CppSupport.build_harness(src, &[case("21")]);

        assert_eq!(harness.source, src);
        assert_eq!(
            harness.invocations,
            vec![Invocation::Run { args: vec![], stdin: Some("21".into()) }]
        );
    }

    #[test]
    fn test_literals() {
        let grid = CppType::parse("const std::vector<std::vector<int>> &").unwrap();
        assert_eq!(grid.render(), "vector<vector<int>>");
        assert_eq!(grid.literal(&json!([[1, 2], []])).unwrap(), "{{1, 2}, {}}");
        assert_eq!(CppType::LongLong.literal(&json!(5)).unwrap(), "5LL");
        assert_eq!(CppType::Double.literal(&json!(1)).unwrap(), "1.0");
        assert!(CppType::Char.literal(&json!("é")).is_err());
        assert!(CppType::Unsigned.literal(&json!(-1)).is_err());
        assert!(CppType::parse("ListNode*").is_none());
    }

    #[test]
    fn test_inference() {
        assert_eq!(CppType::infer(&json!([1, 5_000_000_000i64])).unwrap().render(), "vector<long long>");
        assert_eq!(CppType::infer(&json!(["a", "b"])).unwrap().render(), "vector<string>");
        assert!(CppType::infer(&json!([1, "a"])).is_err());
    }

    #[test]
    fn test_endl_in_loop_suggestion() {
        let src = "for (int i = 0; i < n; i++) {\n    cout << i << endl;\n}\n";
        let text = SourceText::new(src, &LEXICON);
        assert_eq!(CppSupport.style_suggestions(&text).len(), 1);
    }
}
