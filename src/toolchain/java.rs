//! Java strategy
//!
//! Compilation is shared across a batch, so the harness is a generated `Main`
//! class that embeds every test case as typed literals and picks one by its
//! index in `args[0]`. Results are serialized by a reflective JSON writer.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{
    brace_class_spans, cached_regex, choose_entry, empty_catch, enclosing_class,
    missing_semicolons, parse_arguments, quote_c_char, quote_c_string, split_top_level,
    split_typed_param, BlockStyle, EntryPoint, Harness, Invocation, LanguageSupport, Lexicon,
    Param, RESULT_MARKER,
};
use crate::analyzer::source::SourceText;
use crate::catalog::TestCase;
use crate::languages::Language;

pub struct JavaSupport;

static LEXICON: Lexicon = Lexicon {
    line_comment: "//",
    block_comment: Some(("/*", "*/")),
    quotes: &['"', '\''],
    multiline_quotes: &["\"\"\""],
    block_style: BlockStyle::Braces,
    loop_keywords: &["for", "while", "do"],
    decision_keywords: &["if", "else", "for", "while", "case", "catch"],
};

const MODIFIERS: &[&str] = &[
    "public", "private", "protected", "static", "final", "synchronized", "abstract", "native",
];

const NOT_METHODS: &[&str] = &["if", "for", "while", "switch", "catch", "synchronized", "return"];

const JSON_WRITER: &str = r#"
    static String _engineQuote(String text) {
        StringBuilder sb = new StringBuilder("\"");
        for (char c : text.toCharArray()) {
            switch (c) {
                case '"': sb.append("\\\""); break;
                case '\\': sb.append("\\\\"); break;
                case '\n': sb.append("\\n"); break;
                case '\r': sb.append("\\r"); break;
                case '\t': sb.append("\\t"); break;
                default:
                    if (c < 0x20) {
                        sb.append(String.format("\\u%04x", (int) c));
                    } else {
                        sb.append(c);
                    }
            }
        }
        return sb.append('"').toString();
    }

    static String _engineJson(Object value) {
        if (value == null) return "null";
        if (value instanceof String) return _engineQuote((String) value);
        if (value instanceof Character) return _engineQuote(String.valueOf(value));
        if (value instanceof Double || value instanceof Float) {
            double d = ((Number) value).doubleValue();
            if (Double.isNaN(d) || Double.isInfinite(d)) return "null";
            return String.valueOf(value);
        }
        if (value instanceof Number || value instanceof Boolean) return String.valueOf(value);
        if (value.getClass().isArray()) {
            StringBuilder sb = new StringBuilder("[");
            int length = java.lang.reflect.Array.getLength(value);
            for (int i = 0; i < length; i++) {
                if (i > 0) sb.append(',');
                sb.append(_engineJson(java.lang.reflect.Array.get(value, i)));
            }
            return sb.append(']').toString();
        }
        if (value instanceof Map) {
            StringBuilder sb = new StringBuilder("{");
            boolean first = true;
            for (Map.Entry<?, ?> entry : ((Map<?, ?>) value).entrySet()) {
                if (!first) sb.append(',');
                first = false;
                sb.append(_engineQuote(String.valueOf(entry.getKey())));
                sb.append(':').append(_engineJson(entry.getValue()));
            }
            return sb.append('}').toString();
        }
        if (value instanceof Iterable) {
            StringBuilder sb = new StringBuilder("[");
            boolean first = true;
            for (Object item : (Iterable<?>) value) {
                if (!first) sb.append(',');
                first = false;
                sb.append(_engineJson(item));
            }
            return sb.append(']').toString();
        }
        return _engineQuote(String.valueOf(value));
    }
"#;

/// Java types the harness can build literals for
#[derive(Debug, Clone, PartialEq)]
enum JavaType {
    Int,
    Long,
    Short,
    Byte,
    Double,
    Float,
    Boolean,
    Char,
    Str,
    Boxed(Box<JavaType>),
    Array(Box<JavaType>),
    List(Box<JavaType>),
}

impl JavaType {
    fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if let Some(inner) = text.strip_suffix("[]") {
            return Some(JavaType::Array(Box::new(Self::parse(inner)?)));
        }
        if let Some(rest) = text.strip_suffix('>') {
            let (outer, inner) = rest.split_once('<')?;
            return match outer.trim() {
                "List" | "ArrayList" | "Collection" | "Iterable" | "java.util.List" => {
                    Some(JavaType::List(Box::new(Self::parse(inner)?)))
                }
                _ => None,
            };
        }
        let boxed = |inner: JavaType| Some(JavaType::Boxed(Box::new(inner)));
        match text {
            "int" => Some(JavaType::Int),
            "long" => Some(JavaType::Long),
            "short" => Some(JavaType::Short),
            "byte" => Some(JavaType::Byte),
            "double" => Some(JavaType::Double),
            "float" => Some(JavaType::Float),
            "boolean" => Some(JavaType::Boolean),
            "char" => Some(JavaType::Char),
            "String" | "CharSequence" | "java.lang.String" => Some(JavaType::Str),
            "Integer" => boxed(JavaType::Int),
            "Long" => boxed(JavaType::Long),
            "Short" => boxed(JavaType::Short),
            "Byte" => boxed(JavaType::Byte),
            "Double" => boxed(JavaType::Double),
            "Float" => boxed(JavaType::Float),
            "Boolean" => boxed(JavaType::Boolean),
            "Character" => boxed(JavaType::Char),
            _ => None,
        }
    }

    fn infer(value: &Value) -> Result<Self, String> {
        match value {
            Value::Bool(_) => Ok(JavaType::Boolean),
            Value::Number(n) => Ok(match n.as_i64() {
                Some(v) if i32::try_from(v).is_ok() => JavaType::Int,
                Some(_) => JavaType::Long,
                None => JavaType::Double,
            }),
            Value::String(_) => Ok(JavaType::Str),
            Value::Array(items) => {
                let mut element: Option<JavaType> = None;
                for item in items.iter().filter(|item| !item.is_null()) {
                    let found = Self::infer(item)?;
                    element = Some(match element {
                        None => found,
                        Some(current) => current.widen(found)?,
                    });
                }
                Ok(JavaType::Array(Box::new(element.unwrap_or(JavaType::Int))))
            }
            Value::Null => Err("cannot infer a Java type for null".to_string()),
            Value::Object(_) => Err("JSON objects are not supported as arguments".to_string()),
        }
    }

    /// Common type of two inferred element types
    fn widen(self, other: JavaType) -> Result<JavaType, String> {
        use JavaType::*;
        match (self, other) {
            (a, b) if a == b => Ok(a),
            (Int, Long) | (Long, Int) => Ok(Long),
            (Int | Long, Double) | (Double, Int | Long) => Ok(Double),
            (Array(a), Array(b)) => Ok(Array(Box::new((*a).widen(*b)?))),
            (a, b) => Err(format!(
                "mixed element types {} and {}",
                a.render(),
                b.render()
            )),
        }
    }

    fn render(&self) -> String {
        match self {
            JavaType::Int => "int".into(),
            JavaType::Long => "long".into(),
            JavaType::Short => "short".into(),
            JavaType::Byte => "byte".into(),
            JavaType::Double => "double".into(),
            JavaType::Float => "float".into(),
            JavaType::Boolean => "boolean".into(),
            JavaType::Char => "char".into(),
            JavaType::Str => "String".into(),
            JavaType::Boxed(inner) => inner.boxed_name(),
            JavaType::Array(inner) => format!("{}[]", inner.render()),
            JavaType::List(inner) => format!("List<{}>", inner.boxed_name()),
        }
    }

    fn boxed_name(&self) -> String {
        match self {
            JavaType::Int => "Integer".into(),
            JavaType::Long => "Long".into(),
            JavaType::Short => "Short".into(),
            JavaType::Byte => "Byte".into(),
            JavaType::Double => "Double".into(),
            JavaType::Float => "Float".into(),
            JavaType::Boolean => "Boolean".into(),
            JavaType::Char => "Character".into(),
            JavaType::Boxed(inner) => inner.boxed_name(),
            other => other.render(),
        }
    }

    fn literal(&self, value: &Value) -> Result<String, String> {
        let mismatch = || format!("cannot use {} as {}", value, self.render());
        match (self, value) {
            (JavaType::Boxed(_), Value::Null)
            | (JavaType::Str, Value::Null)
            | (JavaType::Array(_), Value::Null)
            | (JavaType::List(_), Value::Null) => Ok("null".into()),
            (JavaType::Boxed(inner), _) => inner.literal(value),
            (JavaType::Int | JavaType::Short | JavaType::Byte, Value::Number(n)) => {
                let v = n.as_i64().ok_or_else(mismatch)?;
                match self {
                    JavaType::Int if i32::try_from(v).is_ok() => Ok(v.to_string()),
                    JavaType::Short if i16::try_from(v).is_ok() => Ok(format!("(short) {}", v)),
                    JavaType::Byte if i8::try_from(v).is_ok() => Ok(format!("(byte) {}", v)),
                    _ => Err(format!("{} is out of range for {}", v, self.render())),
                }
            }
            (JavaType::Long, Value::Number(n)) => {
                n.as_i64().map(|v| format!("{}L", v)).ok_or_else(mismatch)
            }
            (JavaType::Double, Value::Number(n)) => {
                n.as_f64().map(float_literal).ok_or_else(mismatch)
            }
            (JavaType::Float, Value::Number(n)) => n
                .as_f64()
                .map(|v| format!("{}f", float_literal(v)))
                .ok_or_else(mismatch),
            (JavaType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
            (JavaType::Char, Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(ch), None) => Ok(quote_c_char(ch)),
                    _ => Err(mismatch()),
                }
            }
            (JavaType::Str, Value::String(s)) => Ok(quote_c_string(s)),
            (JavaType::Array(inner), Value::Array(items)) => {
                let elements = items
                    .iter()
                    .map(|item| inner.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("new {}{{{}}}", self.render(), elements.join(", ")))
            }
            (JavaType::List(inner), Value::Array(items)) => {
                if items.is_empty() {
                    return Ok(format!("new ArrayList<{}>()", inner.boxed_name()));
                }
                let elements = items
                    .iter()
                    .map(|item| inner.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!(
                    "new ArrayList<{}>(Arrays.asList({}))",
                    inner.boxed_name(),
                    elements.join(", ")
                ))
            }
            _ => Err(mismatch()),
        }
    }
}

/// Shortest round-trip decimal that Java and C++ both accept as a double
pub(crate) fn float_literal(value: f64) -> String {
    let text = format!("{:?}", value);
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{}.0", text)
    }
}

impl JavaSupport {
    /// Statements declaring the arguments and calling the entry point for one case
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
            let declared = entry.params.get(index).and_then(|p| p.ty.clone());
            let (decl, ty) = match declared {
                Some(text) => {
                    let ty = JavaType::parse(&text)
                        .ok_or_else(|| format!("unsupported parameter type {}", text))?;
                    (text, ty)
                }
                None => {
                    let ty = JavaType::infer(value)?;
                    (ty.render(), ty)
                }
            };
            let name = format!("_arg{}", index);
            body.push_str(&format!(
                "                {} {} = {};\n",
                decl,
                name,
                ty.literal(value)?
            ));
            names.push(name);
        }

        let owner = entry.owner.as_deref().unwrap_or("Solution");
        let receiver = if entry.is_static {
            owner.to_string()
        } else {
            format!("new {}()", owner)
        };
        let call = format!("{}.{}({})", receiver, entry.name, names.join(", "));

        if entry.returns_nothing() {
            body.push_str(&format!("                {};\n", call));
            let reported = names.first().map(String::as_str).unwrap_or("null");
            body.push_str(&format!("                _engineResult = {};\n", reported));
        } else {
            body.push_str(&format!("                _engineResult = {};\n", call));
        }
        Ok(body)
    }
}

impl LanguageSupport for JavaSupport {
    fn language(&self) -> Language {
        Language::Java
    }

    fn lexicon(&self) -> &'static Lexicon {
        &LEXICON
    }

    fn detect_entry_point(&self, source: &str) -> EntryPoint {
        static METHOD: OnceLock<Option<Regex>> = OnceLock::new();
        let Some(method_re) = cached_regex(
            &METHOD,
            r"(?m)^[ \t]*((?:[a-z]+[ \t]+)*)([\w<>\[\],.? ]+?)\s+([A-Za-z_]\w*)\s*\(([^)]*)\)\s*(?:throws\s+[\w.,\s]+?)?\s*\{",
        ) else {
            return EntryPoint::fallback();
        };

        let text = SourceText::new(source, &LEXICON);
        let code = text.code();
        let classes = brace_class_spans(code);

        let candidates = method_re
            .captures_iter(code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let modifiers = caps.get(1)?.as_str();
                let return_type = caps.get(2)?.as_str().trim();
                let name = caps.get(3)?.as_str();
                if NOT_METHODS.contains(&name)
                    || MODIFIERS.contains(&return_type)
                    || matches!(return_type, "new" | "return" | "else" | "throw")
                {
                    return None;
                }
                let modifier_words: Vec<&str> = modifiers.split_whitespace().collect();
                if modifier_words.iter().any(|word| !MODIFIERS.contains(word)) {
                    return None;
                }
                let owner = enclosing_class(&classes, whole.start())?;
                let params = split_top_level(&source[caps.get(4)?.range()])
                    .iter()
                    .map(|p| {
                        let cleaned = p
                            .split_whitespace()
                            .filter(|w| !w.starts_with('@') && *w != "final")
                            .collect::<Vec<_>>()
                            .join(" ")
                            .replace("...", "[] ");
                        split_typed_param(&cleaned).unwrap_or(Param {
                            ty: None,
                            name: cleaned,
                        })
                    })
                    .collect();

                Some(EntryPoint {
                    name: name.to_string(),
                    owner: Some(owner),
                    is_static: modifier_words.contains(&"static"),
                    params,
                    return_type: Some(return_type.to_string()),
                    detected: true,
                })
            })
            .collect();

        choose_entry(candidates)
    }

    fn build_harness(&self, source: &str, test_cases: &[TestCase]) -> Harness {
        static PUBLIC_TYPE: OnceLock<Option<Regex>> = OnceLock::new();
        let entry = self.detect_entry_point(source);

        let mut imports = Vec::new();
        let mut body = Vec::new();
        for line in source.lines() {
            let trimmed = line.trim_start();
            if trimmed.starts_with("import ") {
                imports.push(trimmed.to_string());
            } else if !trimmed.starts_with("package ") {
                body.push(line);
            }
        }
        let mut body = body.join("\n");
        // Only Main may be public in Main.java
        if let Some(public_re) = cached_regex(
            &PUBLIC_TYPE,
            r"(?m)^([ \t]*)public\s+((?:(?:final|abstract|static)\s+)*)(class|interface|enum|record)\b",
        ) {
            body = public_re.replace_all(&body, "${1}${2}${3}").into_owned();
        }

        let mut cases = String::new();
        let invocations = test_cases
            .iter()
            .enumerate()
            .map(|(index, case)| match self.case_body(&entry, &case.input) {
                Ok(statements) => {
                    cases.push_str(&format!(
                        "            case {}: {{\n{}                break;\n            }}\n",
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
            "{imports}\nimport java.util.*;\n\n{body}\n\n\
public class Main {{\n\
    public static void main(String[] args) throws Exception {{\n\
        int _engineCase = args.length > 0 ? Integer.parseInt(args[0]) : -1;\n\
        Object _engineResult = null;\n\
        switch (_engineCase) {{\n\
{cases}\
            default:\n\
                throw new IllegalArgumentException(\"Unknown test case \" + _engineCase);\n\
        }}\n\
        System.out.println(\"{marker}\" + _engineJson(_engineResult));\n\
    }}\n\
{json}\
}}\n",
            imports = imports.join("\n"),
            body = body,
            cases = cases,
            marker = RESULT_MARKER,
            json = JSON_WRITER,
        );

        Harness {
            source: harness,
            invocations,
        }
    }

    fn syntax_pitfalls(&self, source: &SourceText) -> Vec<String> {
        missing_semicolons(source)
    }

    fn logic_pitfalls(&self, source: &SourceText) -> Vec<String> {
        static STRING_DECL: OnceLock<Option<Regex>> = OnceLock::new();
        static LITERAL_EQ: OnceLock<Option<Regex>> = OnceLock::new();
        let mut issues: Vec<String> = empty_catch(source).into_iter().collect();
        let code = source.code();

        let literal_compare = cached_regex(&LITERAL_EQ, r#""\s*[=!]=[^=]|[=!]=\s*""#)
            .and_then(|re| re.find(code));

        let variable_compare = cached_regex(&STRING_DECL, r"\bString\s+([A-Za-z_]\w*)").and_then(|decl_re| {
            let names: Vec<&str> = decl_re
                .captures_iter(code)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect();
            names.iter().find_map(|name| {
                let pattern = format!(
                    r#"\b{name}\s*[=!]=\s*[\w"]+|[\w"]+\s*[=!]=\s*{name}\b"#,
                    name = regex::escape(name)
                );
                Regex::new(&pattern)
                    .ok()?
                    .find_iter(code)
                    .find(|found| !found.as_str().contains("null"))
            })
        });

        if let Some(found) = literal_compare.or(variable_compare) {
            issues.push(format!(
                "Line {}: strings compared with '=='; use .equals() to compare contents",
                source.line_of(found.start())
            ));
        }

        issues
    }
}
