//! Complexity, cost and quality metrics

use serde::Serialize;

use super::source::{is_ident_char, SourceText};
use super::Patterns;
use crate::toolchain::{BlockStyle, Lexicon};

/// Penalty per syntax error
const SYNTAX_PENALTY: f64 = 15.0;
/// Penalty per logic issue
const LOGIC_PENALTY: f64 = 8.0;
/// Share of the maintainability index in the final score
const MAINTAINABILITY_WEIGHT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComplexityRating {
    Low,
    Medium,
    High,
}

impl ComplexityRating {
    pub fn from_complexity(cyclomatic: u32) -> Self {
        match cyclomatic {
            0..=10 => ComplexityRating::Low,
            11..=20 => ComplexityRating::Medium,
            _ => ComplexityRating::High,
        }
    }

    fn penalty(self) -> f64 {
        match self {
            ComplexityRating::Low => 0.0,
            ComplexityRating::Medium => 5.0,
            ComplexityRating::High => 15.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaintainabilityRating {
    Good,
    Fair,
    Poor,
}

impl MaintainabilityRating {
    pub fn from_index(index: f64) -> Self {
        if index >= 70.0 {
            MaintainabilityRating::Good
        } else if index >= 50.0 {
            MaintainabilityRating::Fair
        } else {
            MaintainabilityRating::Poor
        }
    }
}

/// Asymptotic cost classes, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BigO {
    Constant,
    Logarithmic,
    Linear,
    Linearithmic,
    Quadratic,
    Cubic,
}

impl BigO {
    pub fn label(self) -> &'static str {
        match self {
            BigO::Constant => "O(1)",
            BigO::Logarithmic => "O(log n)",
            BigO::Linear => "O(n)",
            BigO::Linearithmic => "O(n log n)",
            BigO::Quadratic => "O(n²)",
            BigO::Cubic => "O(n³)",
        }
    }

    /// Parse labels such as "O(n)", "O(n log n)", "O(n^2)" or "O(n²)"
    pub fn parse(label: &str) -> Option<Self> {
        let compact: String = label
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        match compact.as_str() {
            "o(1)" => Some(BigO::Constant),
            "o(logn)" => Some(BigO::Logarithmic),
            "o(n)" => Some(BigO::Linear),
            "o(nlogn)" => Some(BigO::Linearithmic),
            "o(n^2)" | "o(n²)" | "o(n*n)" => Some(BigO::Quadratic),
            "o(n^3)" | "o(n³)" => Some(BigO::Cubic),
            _ => None,
        }
    }

    /// Rough wall time for n = 10^5
    pub fn estimated_time(self) -> &'static str {
        match self {
            BigO::Constant | BigO::Logarithmic => "< 1 ms for n = 10^5",
            BigO::Linear => "~1 ms for n = 10^5",
            BigO::Linearithmic => "~10 ms for n = 10^5",
            BigO::Quadratic => "~10 s for n = 10^5",
            BigO::Cubic => "hours for n = 10^5",
        }
    }
}

/// `1 +` decision keywords, `&&`, `||` and ternary `?`
pub fn cyclomatic_complexity(text: &SourceText, lexicon: &Lexicon) -> u32 {
    let code = text.code();
    let keywords: usize = lexicon
        .decision_keywords
        .iter()
        .map(|kw| text.count_word(kw))
        .sum();
    let operators = code.matches("&&").count() + code.matches("||").count();
    let ternaries = ternary_count(code);
    u32::try_from(1 + keywords + operators + ternaries).unwrap_or(u32::MAX)
}

/// `?` that are conditional operators rather than `?.`, `??`, or `<?` wildcards
fn ternary_count(code: &str) -> usize {
    let bytes = code.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|(at, byte)| {
            if **byte != b'?' {
                return false;
            }
            let next = bytes.get(at + 1).copied();
            let prev = at
                .checked_sub(1)
                .and_then(|p| bytes[..=p].iter().rev().find(|b| !b.is_ascii_whitespace()))
                .copied();
            !matches!(next, Some(b'.') | Some(b'?') | Some(b'='))
                && !matches!(prev, Some(b'?') | Some(b'<') | Some(b','))
        })
        .count()
}

/// Deepest nesting of loop bodies
pub fn loop_nesting_depth(text: &SourceText, lexicon: &Lexicon) -> u32 {
    let depth = match lexicon.block_style {
        BlockStyle::Braces => brace_loop_depth(text.code(), lexicon.loop_keywords),
        BlockStyle::Indentation => indented_loop_depth(text, lexicon.loop_keywords),
    };
    u32::try_from(depth).unwrap_or(u32::MAX)
}

fn brace_loop_depth(code: &str, loop_keywords: &[&str]) -> usize {
    // One entry per open brace: whether it opened a loop body
    let mut blocks: Vec<bool> = Vec::new();
    let mut pending_loop = false;
    let mut parens = 0i32;
    let mut deepest = 0usize;
    let mut word = String::new();

    let flush = |word: &mut String, blocks: &[bool], pending: &mut bool, deepest: &mut usize| {
        if !word.is_empty() && loop_keywords.contains(&word.as_str()) {
            *pending = true;
            let open_loops = blocks.iter().filter(|is_loop| **is_loop).count();
            *deepest = (*deepest).max(open_loops + 1);
        }
        word.clear();
    };

    for ch in code.chars() {
        if is_ident_char(ch) {
            word.push(ch);
            continue;
        }
        flush(&mut word, &blocks, &mut pending_loop, &mut deepest);
        match ch {
            '(' => parens += 1,
            ')' => parens = (parens - 1).max(0),
            '{' => {
                blocks.push(pending_loop);
                pending_loop = false;
            }
            '}' => {
                blocks.pop();
            }
            ';' if parens == 0 => pending_loop = false,
            _ => {}
        }
    }
    flush(&mut word, &blocks, &mut pending_loop, &mut deepest);
    deepest
}

fn indented_loop_depth(text: &SourceText, loop_keywords: &[&str]) -> usize {
    // Indentation of every enclosing loop header
    let mut loops: Vec<usize> = Vec::new();
    let mut open_brackets = 0i32;
    let mut deepest = 0usize;

    for (_, line) in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let continued = open_brackets > 0;
        open_brackets += trimmed.matches(['(', '[', '{']).count() as i32;
        open_brackets -= trimmed.matches([')', ']', '}']).count() as i32;
        open_brackets = open_brackets.max(0);
        if continued {
            continue;
        }

        let indent: usize = line
            .chars()
            .take_while(|c| *c == ' ' || *c == '\t')
            .map(|c| if c == '\t' { 4 } else { 1 })
            .sum();
        while loops.last().is_some_and(|&at| at >= indent) {
            loops.pop();
        }

        let header = trimmed.strip_prefix("async ").unwrap_or(trimmed);
        let is_loop_header = loop_keywords.iter().any(|kw| {
            header
                .strip_prefix(kw)
                .is_some_and(|rest| !rest.starts_with(is_ident_char))
        });
        // Comprehension `for`s nest inside the current line
        let inline_loops = super::source::count_word(trimmed, "for")
            .saturating_sub(usize::from(is_loop_header && header.starts_with("for")));

        deepest = deepest.max(loops.len() + usize::from(is_loop_header) + inline_loops);
        if is_loop_header {
            loops.push(indent);
        }
    }
    deepest
}

/// First matching rule wins
pub(crate) fn estimate_big_o(text: &SourceText, loop_depth: u32, patterns: &Patterns) -> BigO {
    let code = text.code();
    if loop_depth >= 3 {
        BigO::Cubic
    } else if loop_depth == 2 {
        BigO::Quadratic
    } else if patterns.sort_call.is_match(code) {
        BigO::Linearithmic
    } else if is_binary_search(text, patterns) {
        BigO::Logarithmic
    } else if loop_depth == 1 {
        BigO::Linear
    } else {
        BigO::Constant
    }
}

fn is_binary_search(text: &SourceText, patterns: &Patterns) -> bool {
    let code = text.code();
    patterns.binary_search_call.is_match(code)
        || (text.contains_word("mid") && patterns.halving.is_match(code))
}

/// Auxiliary memory: linear when the code allocates a collection
pub(crate) fn estimate_memory(text: &SourceText, patterns: &Patterns) -> &'static str {
    if patterns.collection.is_match(text.code()) {
        "O(n)"
    } else {
        "O(1)"
    }
}

/// Identifiers and numbers count once, every other visible character once
pub fn token_count(text: &SourceText) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for ch in text.code().chars() {
        if is_ident_char(ch) || (ch == '.' && in_word) {
            if !in_word {
                count += 1;
                in_word = true;
            }
        } else {
            in_word = false;
            if !ch.is_whitespace() {
                count += 1;
            }
        }
    }
    count
}

/// `100 - 2*CC - V/100` with `V = N*log2(N)`, clamped to 0..=100, one decimal
pub fn maintainability_index(cyclomatic: u32, tokens: usize) -> f64 {
    let n = tokens as f64;
    let volume = if tokens > 1 { n * n.log2() } else { 0.0 };
    let index = (100.0 - 2.0 * f64::from(cyclomatic) - volume / 100.0).clamp(0.0, 100.0);
    (index * 10.0).round() / 10.0
}

pub fn score(
    syntax_errors: usize,
    logic_issues: usize,
    complexity: ComplexityRating,
    maintainability: f64,
) -> u8 {
    let base = 100.0
        - SYNTAX_PENALTY * syntax_errors as f64
        - LOGIC_PENALTY * logic_issues as f64
        - complexity.penalty();
    let blended = (1.0 - MAINTAINABILITY_WEIGHT) * base.clamp(0.0, 100.0)
        + MAINTAINABILITY_WEIGHT * maintainability;
    blended.round().clamp(0.0, 100.0) as u8
}
