//! C# tokenizer.

use logos::Logos;

use crate::core::domain::{CompilationError, Location};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword,
    Number,
    Str,
    Char,
    Punct,
    Eof,
}

/// A token with its start position and the position just past its last source character.
///
/// `text` is the cooked text: literals lose their quotes and prefixes, verbatim
/// identifiers lose their `@`. Positions always follow the raw source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Token {
    pub fn eof(line: u32, column: u32) -> Self {
        Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line,
            column,
            end_line: line,
            end_column: column,
        }
    }

    pub fn is_punct(&self, p: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == p
    }

    pub fn is_keyword(&self, k: &str) -> bool {
        self.kind == TokenKind::Keyword && self.text == k
    }

    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_contextual(&self, word: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == word
    }

    pub fn is_eof(&self) -> bool {
        self.kind == TokenKind::Eof
    }

    /// Position just past the token, where missing-token errors are reported.
    pub fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_column)
    }
}

/// Whether a delimited lexeme found its closing delimiter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Closure {
    Closed,
    Open,
}

/// Scans a `"`- or `'`-delimited literal with backslash escapes. Stops before a newline.
fn quoted(lex: &mut logos::Lexer<Lexeme>, quote: char) -> Closure {
    let rest = lex.remainder();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\n' => {
                lex.bump(i);
                return Closure::Open;
            }
            '\\' => {
                chars.next();
            }
            c if c == quote => {
                lex.bump(i + c.len_utf8());
                return Closure::Closed;
            }
            _ => {}
        }
    }
    lex.bump(rest.len());
    Closure::Open
}

fn regular_string(lex: &mut logos::Lexer<Lexeme>) -> Closure {
    quoted(lex, '"')
}

fn char_literal(lex: &mut logos::Lexer<Lexeme>) -> Closure {
    quoted(lex, '\'')
}

/// Verbatim strings span lines and escape `"` by doubling it.
fn verbatim_string(lex: &mut logos::Lexer<Lexeme>) -> Closure {
    let rest = lex.remainder();
    let mut chars = rest.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '"' {
            continue;
        }
        if chars.peek().is_some_and(|(_, next)| *next == '"') {
            chars.next();
            continue;
        }
        lex.bump(i + 1);
        return Closure::Closed;
    }
    lex.bump(rest.len());
    Closure::Open
}

fn block_comment(lex: &mut logos::Lexer<Lexeme>) -> Closure {
    match lex.remainder().find("*/") {
        Some(end) => {
            lex.bump(end + 2);
            Closure::Closed
        }
        None => {
            lex.bump(lex.remainder().len());
            Closure::Open
        }
    }
}

/// Preprocessor directives must start their line; anywhere else `#` is an error.
fn directive(lex: &mut logos::Lexer<Lexeme>) -> bool {
    let at_line_start = lex.source()[..lex.span().start]
        .rsplit('\n')
        .next()
        .is_some_and(|before| before.trim().is_empty());
    if at_line_start {
        let rest = lex.remainder();
        lex.bump(rest.find('\n').unwrap_or(rest.len()));
    }
    at_line_start
}

/// Extends a numeric literal over its digits, fraction, exponent and suffix.
fn number(lex: &mut logos::Lexer<Lexeme>) {
    let hex = lex.slice() == "0" && lex.remainder().starts_with(['x', 'X', 'b', 'B']);
    let mut prev = lex.slice().bytes().last().unwrap_or(b'0');
    let rest = lex.remainder().as_bytes();
    let mut len = 0;
    while let Some(&c) = rest.get(len) {
        let exponent_sign = matches!(c, b'+' | b'-') && !hex && matches!(prev, b'e' | b'E');
        let fraction = c == b'.' && !hex && rest.get(len + 1).is_some_and(u8::is_ascii_digit);
        if !(c.is_ascii_alphanumeric() || c == b'_' || fraction || exponent_sign) {
            break;
        }
        prev = c;
        len += 1;
    }
    lex.bump(len);
}

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"\s+")]
enum Lexeme {
    // ===== Trivia =====
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[token("/*", block_comment)]
    BlockComment(Closure),

    #[token("#", directive)]
    Directive,

    // ===== Literals =====
    #[regex(r"[\p{L}_][\p{L}\p{N}_]*")]
    Identifier,

    #[regex(r"@[\p{L}_][\p{L}\p{N}_]*")]
    VerbatimIdentifier,

    #[token("\"", regular_string)]
    #[token("$\"", regular_string)]
    #[token("@\"", verbatim_string)]
    #[token("$@\"", verbatim_string)]
    #[token("@$\"", verbatim_string)]
    String(Closure),

    #[token("'", char_literal)]
    Char(Closure),

    #[regex(r"[0-9]", number)]
    #[regex(r"\.[0-9]", number)]
    Number,

    // ===== Keywords =====
    #[token("abstract")]
    #[token("as")]
    #[token("base")]
    #[token("bool")]
    #[token("break")]
    #[token("byte")]
    #[token("case")]
    #[token("catch")]
    #[token("char")]
    #[token("checked")]
    #[token("class")]
    #[token("const")]
    #[token("continue")]
    #[token("decimal")]
    #[token("default")]
    #[token("delegate")]
    #[token("do")]
    #[token("double")]
    #[token("else")]
    #[token("enum")]
    #[token("event")]
    #[token("explicit")]
    #[token("extern")]
    #[token("false")]
    #[token("finally")]
    #[token("fixed")]
    #[token("float")]
    #[token("for")]
    #[token("foreach")]
    #[token("goto")]
    #[token("if")]
    #[token("implicit")]
    #[token("in")]
    #[token("int")]
    #[token("interface")]
    #[token("internal")]
    #[token("is")]
    #[token("lock")]
    #[token("long")]
    #[token("namespace")]
    #[token("new")]
    #[token("null")]
    #[token("object")]
    #[token("operator")]
    #[token("out")]
    #[token("override")]
    #[token("params")]
    #[token("private")]
    #[token("protected")]
    #[token("public")]
    #[token("readonly")]
    #[token("ref")]
    #[token("return")]
    #[token("sbyte")]
    #[token("sealed")]
    #[token("short")]
    #[token("sizeof")]
    #[token("stackalloc")]
    #[token("static")]
    #[token("string")]
    #[token("struct")]
    #[token("switch")]
    #[token("this")]
    #[token("throw")]
    #[token("true")]
    #[token("try")]
    #[token("typeof")]
    #[token("uint")]
    #[token("ulong")]
    #[token("unchecked")]
    #[token("unsafe")]
    #[token("ushort")]
    #[token("using")]
    #[token("virtual")]
    #[token("void")]
    #[token("volatile")]
    #[token("while")]
    Keyword,

    // ===== Punctuation =====
    // No `>>`: nested generic arguments close one `>` at a time.
    #[token("<<=")]
    #[token("??=")]
    #[token("...")]
    #[token("=>")]
    #[token("==")]
    #[token("!=")]
    #[token("<=")]
    #[token(">=")]
    #[token("&&")]
    #[token("||")]
    #[token("++")]
    #[token("--")]
    #[token("+=")]
    #[token("-=")]
    #[token("*=")]
    #[token("/=")]
    #[token("%=")]
    #[token("&=")]
    #[token("|=")]
    #[token("^=")]
    #[token("<<")]
    #[token("??")]
    #[token("?.")]
    #[token("::")]
    #[token("->")]
    #[token("{")]
    #[token("}")]
    #[token("(")]
    #[token(")")]
    #[token("[")]
    #[token("]")]
    #[token(";")]
    #[token(",")]
    #[token(".")]
    #[token(":")]
    #[token("?")]
    #[token("+")]
    #[token("-")]
    #[token("*")]
    #[token("/")]
    #[token("%")]
    #[token("&")]
    #[token("|")]
    #[token("^")]
    #[token("!")]
    #[token("~")]
    #[token("=")]
    #[token("<")]
    #[token(">")]
    Punct,
}

/// Tracks line and column while walking forward through the source.
struct Cursor {
    offset: usize,
    line: u32,
    column: u32,
}

impl Cursor {
    fn new() -> Self {
        Cursor {
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Moves to byte `offset` and returns its position. Continuation bytes are not columns.
    fn advance(&mut self, source: &str, offset: usize) -> (u32, u32) {
        let offset = offset.min(source.len()).max(self.offset);
        for &b in &source.as_bytes()[self.offset..offset] {
            if b == b'\n' {
                self.line += 1;
                self.column = 1;
            } else if b & 0xC0 != 0x80 {
                self.column += 1;
            }
        }
        self.offset = offset;
        (self.line, self.column)
    }
}

/// Literal text without its prefix and quotes, with verbatim `""` collapsed.
fn literal_text(slice: &str, quote: char, closure: Closure) -> String {
    let Some(open) = slice.find(quote) else {
        return String::new();
    };
    let verbatim = slice[..open].contains('@');
    let body = &slice[open + 1..];
    let body = match closure {
        Closure::Closed => body.strip_suffix(quote).unwrap_or(body),
        Closure::Open => body,
    };
    if verbatim {
        body.replace("\"\"", "\"")
    } else {
        body.to_string()
    }
}

fn error(file: &str, id: &str, message: String, (line, column): (u32, u32)) -> CompilationError {
    CompilationError::error(id, message).at(Location::new(file, line, column))
}

/// Splits `source` into tokens, always terminated by an `Eof` token.
pub fn tokenize(file: &str, source: &str) -> (Vec<Token>, Vec<CompilationError>) {
    let mut tokens = Vec::new();
    let mut diagnostics = Vec::new();
    let mut cursor = Cursor::new();

    for (lexeme, span) in Lexeme::lexer(source).spanned() {
        let start = cursor.advance(source, span.start);
        let end = cursor.advance(source, span.end);
        let slice = source.get(span.clone()).unwrap_or_default();

        let (kind, text) = match lexeme {
            Ok(Lexeme::Identifier) => (TokenKind::Ident, slice.to_string()),
            Ok(Lexeme::VerbatimIdentifier) => (TokenKind::Ident, slice[1..].to_string()),
            Ok(Lexeme::Keyword) => (TokenKind::Keyword, slice.to_string()),
            Ok(Lexeme::Number) => (TokenKind::Number, slice.to_string()),
            Ok(Lexeme::Punct) => (TokenKind::Punct, slice.to_string()),
            Ok(Lexeme::String(closure)) | Ok(Lexeme::Char(closure)) => {
                let (kind, quote) = match lexeme {
                    Ok(Lexeme::Char(_)) => (TokenKind::Char, '\''),
                    _ => (TokenKind::Str, '"'),
                };
                if closure == Closure::Open {
                    diagnostics.push(error(file, "CS1010", "Newline in constant".to_string(), start));
                }
                (kind, literal_text(slice, quote, closure))
            }
            Ok(Lexeme::BlockComment(Closure::Open)) => {
                diagnostics.push(error(
                    file,
                    "CS1035",
                    "End-of-file found, '*/' expected".to_string(),
                    start,
                ));
                continue;
            }
            Ok(Lexeme::BlockComment(Closure::Closed) | Lexeme::Directive | Lexeme::LineComment) => {
                continue;
            }
            Err(()) => {
                let c = source
                    .get(span.start..)
                    .and_then(|s| s.chars().next())
                    .unwrap_or('?');
                diagnostics.push(error(file, "CS1056", format!("Unexpected character '{}'", c), start));
                continue;
            }
        };

        tokens.push(Token {
            kind,
            text,
            line: start.0,
            column: start.1,
            end_line: end.0,
            end_column: end.1,
        });
    }

    let (line, column) = cursor.advance(source, source.len());
    tokens.push(Token::eof(line, column));
    (tokens, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_text(source: &str) -> Vec<(TokenKind, String)> {
        let (tokens, diagnostics) = tokenize("test.cs", source);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics);
        tokens.into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn test_class_declaration() {
        let tokens = kinds_and_text("public class Class1 { }");
        assert_eq!(
            tokens,
            vec![
                (TokenKind::Keyword, "public".to_string()),
                (TokenKind::Keyword, "class".to_string()),
                (TokenKind::Ident, "Class1".to_string()),
                (TokenKind::Punct, "{".to_string()),
                (TokenKind::Punct, "}".to_string()),
                (TokenKind::Eof, String::new()),
            ]
        );
    }

    #[test]
    fn test_keyword_prefixes_are_identifiers() {
        let tokens = kinds_and_text("classy asString int");
        assert_eq!(tokens[0].0, TokenKind::Ident);
        assert_eq!(tokens[1].0, TokenKind::Ident);
        assert_eq!(tokens[2].0, TokenKind::Keyword);
    }

    #[test]
    fn test_positions_and_end() {
        let (tokens, _) = tokenize("test.cs", "class A\n{\n  int x;\n}");
        let x = tokens.iter().find(|t| t.text == "x").unwrap();
        assert_eq!((x.line, x.column), (3, 7));
        assert_eq!(x.end(), (3, 8));
        assert_eq!(tokens.last().map(|t| (t.line, t.column)), Some((4, 2)));
    }

    #[test]
    fn test_literal_end_follows_source() {
        let (tokens, _) = tokenize("test.cs", r#"s = "a\"b"; c = 'x'; v = @"p""q";"#);
        let string = &tokens[2];
        assert_eq!(string.text, "a\\\"b");
        assert_eq!((string.column, string.end()), (5, (1, 11)));

        let ch = &tokens[6];
        assert_eq!(ch.kind, TokenKind::Char);
        assert_eq!((ch.column, ch.end()), (17, (1, 20)));

        let verbatim = &tokens[10];
        assert_eq!(verbatim.text, "p\"q");
        assert_eq!((verbatim.column, verbatim.end()), (26, (1, 33)));
    }

    #[test]
    fn test_multiline_verbatim_end() {
        let (tokens, diagnostics) = tokenize("test.cs", "x = @\"a\nbc\";");
        assert!(diagnostics.is_empty());
        assert_eq!(tokens[2].end(), (2, 4));
        assert_eq!((tokens[3].line, tokens[3].column), (2, 4));
    }

    #[test]
    fn test_non_ascii_columns() {
        let (tokens, _) = tokenize("test.cs", "var café = \"é\";");
        assert_eq!(tokens[1].text, "café");
        assert_eq!(tokens[1].end(), (1, 9));
        assert_eq!((tokens[4].line, tokens[4].column), (1, 15));
    }

    #[test]
    fn test_generic_closers_are_separate() {
        let tokens = kinds_and_text("List<List<int>>");
        let closers = tokens.iter().filter(|(_, t)| t == ">").count();
        assert_eq!(closers, 2);
    }

    #[test]
    fn test_comments_and_directives_skipped() {
        let tokens = kinds_and_text("#region Stuff\n// line\n/* block\n */ x /**/ y\n  #endregion");
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(texts, vec!["x", "y", ""]);
    }

    #[test]
    fn test_directive_must_start_line() {
        let (tokens, diagnostics) = tokenize("test.cs", "x #if");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "CS1056");
        assert_eq!(diagnostics[0].location, Some(Location::new("test.cs", 1, 3)));
        assert_eq!(tokens.len(), 3);
    }

    #[test]
    fn test_strings() {
        let tokens = kinds_and_text(r#"a = "x\"y"; b = @"c:\dir""q"; c = $"{a} b"; d = $@"{a}""";"#);
        let strings: Vec<_> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Str)
            .map(|(_, t)| t.as_str())
            .collect();
        assert_eq!(strings, vec!["x\\\"y", "c:\\dir\"q", "{a} b", "{a}\""]);
    }

    #[test]
    fn test_numbers_and_verbatim_identifiers() {
        let tokens = kinds_and_text("0xFF 1_000 3.14e-2f .5 @class x.y 1.ToString");
        let texts: Vec<_> = tokens.iter().map(|(_, t)| t.as_str()).collect();
        assert_eq!(
            texts,
            vec!["0xFF", "1_000", "3.14e-2f", ".5", "class", "x", ".", "y", "1", ".", "ToString", ""]
        );
        assert_eq!(tokens[4].0, TokenKind::Ident);
    }

    #[test]
    fn test_unterminated_string() {
        let (tokens, diagnostics) = tokenize("test.cs", "var s = \"abc\n;");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].id, "CS1010");
        assert_eq!(diagnostics[0].location, Some(Location::new("test.cs", 1, 9)));
        assert!(tokens[4].is_punct(";"));
    }

    #[test]
    fn test_unterminated_comment() {
        let (_, diagnostics) = tokenize("test.cs", "class A {} /* open");
        assert_eq!(diagnostics[0].id, "CS1035");
        assert_eq!(diagnostics[0].location, Some(Location::new("test.cs", 1, 12)));
    }

    #[test]
    fn test_unexpected_character() {
        let (tokens, diagnostics) = tokenize("test.cs", "a ` b");
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].message, "Unexpected character '`'");
        assert_eq!(tokens.len(), 3);
    }
}
