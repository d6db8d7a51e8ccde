//! Source text with comments and string contents blanked
//!
//! Heuristics match against `code()`, a copy of the source in which comment
//! bodies and string literal contents are replaced by spaces. Byte offsets and
//! line numbers are preserved, so a match in `code()` can be mapped back to
//! the original text.

use crate::toolchain::Lexicon;

#[derive(Debug)]
pub struct SourceText<'a> {
    original: &'a str,
    code: String,
    unterminated_strings: Vec<usize>,
    unterminated_block: Option<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(original: &'a str, lexicon: &Lexicon) -> Self {
        let mut code = String::with_capacity(original.len());
        let mut unterminated_strings = Vec::new();
        let mut unterminated_block = None;

        let bytes_len = original.len();
        let mut pos = 0usize;
        let mut line = 1usize;

        while pos < bytes_len {
            let rest = &original[pos..];

            if !lexicon.line_comment.is_empty() && rest.starts_with(lexicon.line_comment) {
                let end = rest.find('\n').unwrap_or(rest.len());
                blank(&mut code, &rest[..end]);
                pos += end;
                continue;
            }

            if let Some((open, close)) = lexicon.block_comment {
                if rest.starts_with(open) {
                    let body = &rest[open.len()..];
                    let (consumed, closed) = match body.find(close) {
                        Some(at) => (open.len() + at + close.len(), true),
                        None => (rest.len(), false),
                    };
                    let span = &rest[..consumed];
                    if !closed {
                        unterminated_block.get_or_insert(line);
                    }
                    blank(&mut code, span);
                    line += span.matches('\n').count();
                    pos += consumed;
                    continue;
                }
            }

            if let Some(delim) = lexicon
                .multiline_quotes
                .iter()
                .find(|delim| rest.starts_with(**delim))
            {
                let body = &rest[delim.len()..];
                let (content_len, closed) = match find_unescaped(body, delim) {
                    Some(at) => (at, true),
                    None => (body.len(), false),
                };
                code.push_str(delim);
                blank(&mut code, &body[..content_len]);
                if closed {
                    code.push_str(delim);
                } else {
                    unterminated_block.get_or_insert(line);
                }
                line += body[..content_len].matches('\n').count();
                pos += delim.len() + content_len + if closed { delim.len() } else { 0 };
                continue;
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };

            if lexicon.quotes.contains(&ch) {
                let body = &rest[ch.len_utf8()..];
                let line_end = body.find('\n').unwrap_or(body.len());
                let (content_len, closed) = match find_unescaped(&body[..line_end], &ch.to_string()) {
                    Some(at) => (at, true),
                    None => (line_end, false),
                };
                code.push(ch);
                blank(&mut code, &body[..content_len]);
                if closed {
                    code.push(ch);
                } else {
                    unterminated_strings.push(line);
                }
                pos += ch.len_utf8() + content_len + if closed { ch.len_utf8() } else { 0 };
                continue;
            }

            if ch == '\n' {
                line += 1;
            }
            code.push(ch);
            pos += ch.len_utf8();
        }

        Self {
            original,
            code,
            unterminated_strings,
            unterminated_block,
        }
    }

    pub fn original(&self) -> &'a str {
        self.original
    }

    /// Source with comments and string contents blanked
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Blanked lines, numbered from 1
    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.code.lines().enumerate().map(|(i, line)| (i + 1, line))
    }

    /// Lines where a single-line string literal never closed
    pub fn unterminated_strings(&self) -> &[usize] {
        &self.unterminated_strings
    }

    /// Line where an unclosed block comment or multi-line string starts
    pub fn unterminated_block(&self) -> Option<usize> {
        self.unterminated_block
    }

    /// 1-based line number of byte offset `at`
    pub fn line_of(&self, at: usize) -> usize {
        self.code[..at.min(self.code.len())].matches('\n').count() + 1
    }

    /// Whether `word` occurs as a whole identifier in the code
    pub fn contains_word(&self, word: &str) -> bool {
        count_word(&self.code, word) > 0
    }

    pub fn count_word(&self, word: &str) -> usize {
        count_word(&self.code, word)
    }
}

/// Non-whitespace characters in `text`
pub fn meaningful_chars(text: &str) -> usize {
    text.chars().filter(|c| !c.is_whitespace()).count()
}

/// Occurrences of `word` bounded by non-identifier characters
pub fn count_word(text: &str, word: &str) -> usize {
    if word.is_empty() {
        return 0;
    }
    text.match_indices(word)
        .filter(|(at, _)| {
            let before = text[..*at].chars().next_back();
            let after = text[at + word.len()..].chars().next();
            !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
        })
        .count()
}

pub fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

/// Replace every non-newline character with as many spaces as its UTF-8 width
fn blank(out: &mut String, span: &str) {
    for ch in span.chars() {
        if ch == '\n' {
            out.push('\n');
        } else {
            out.extend(std::iter::repeat(' ').take(ch.len_utf8()));
        }
    }
}

/// Byte offset of the first `delim` in `text` not preceded by a backslash escape
fn find_unescaped(text: &str, delim: &str) -> Option<usize> {
    let mut escaped = false;
    for (at, ch) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        if ch == '\\' {
            escaped = true;
            continue;
        }
        if text[at..].starts_with(delim) {
            return Some(at);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::Language;
    use crate::toolchain::support_for;

    fn sanitize(text: &str, language: Language) -> SourceText<'_> {
        SourceText::new(text, support_for(language).lexicon())
    }

    #[test]
    fn test_blanks_comments_and_strings() {
        let src = "x = \"for i in y\"  # while True\nfor i in range(3):\n    pass\n";
        let text = sanitize(src, Language::Python);

        assert_eq!(text.code().len(), src.len());
        assert_eq!(text.count_word("for"), 1);
        assert!(!text.contains_word("while"));
        assert!(text.code().contains("x = \""));
    }

    #[test]
    fn test_block_comment_keeps_line_numbers() {
        let src = "/* a\n b { */\nint x = 1;\n";
        let text = sanitize(src, Language::Cpp);

        assert!(!text.code().contains('{'));
        assert_eq!(text.line_of(src.find("int").unwrap()), 3);
        assert!(text.unterminated_block().is_none());
    }

    #[test]
    fn test_reports_unterminated_string() {
        let text = sanitize("let s = \"oops;\nlet t = 1;\n", Language::JavaScript);
        assert_eq!(text.unterminated_strings(), &[1]);
    }

    #[test]
    fn test_escaped_quote_does_not_close() {
        let text = sanitize(r#"s = "a\"b" + c"#, Language::Python);
        assert!(text.unterminated_strings().is_empty());
        assert!(text.contains_word("c"));
    }

    #[test]
    fn test_python_triple_quotes_span_lines() {
        let src = "def f():\n    \"\"\"doc for\n    while\"\"\"\n    return 1\n";
        let text = sanitize(src, Language::Python);
        assert!(!text.contains_word("while"));
        assert!(text.contains_word("return"));
    }

    #[test]
    fn test_multibyte_characters_keep_offsets() {
        let src = "s = 'héllo'\nif s: pass\n";
        let text = sanitize(src, Language::Python);
        assert_eq!(text.code().len(), src.len());
        assert_eq!(text.line_of(src.find("if").unwrap()), 2);
    }

    #[test]
    fn test_count_word_respects_boundaries() {
        assert_eq!(count_word("for fork before for", "for"), 2);
        assert_eq!(count_word("my_if if", "if"), 1);
    }

    #[test]
    fn test_meaningful_chars() {
        assert_eq!(meaningful_chars(" \n\t a b "), 2);
    }
}
