//! Tokenizer for TypeScript / JavaScript source
//!
//! Produces byte-offset tokens; comments and whitespace are not tokens but
//! their presence is recorded (`newline_before`, comment ranges) because
//! erasure works on the original text. `>` is never merged into `>>`, `>=`
//! or `>>>`: the parser rebuilds those from adjacent tokens so that nested
//! type arguments (`Array<Array<T>>`) close naturally.

use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenKind {
    /// Identifiers and keywords.
    Ident,
    /// `#name`
    PrivateName,
    Punct,
    Str,
    Number,
    Regex,
    /// Template without substitutions.
    Template,
    /// `` `...${ ``
    TemplateHead,
    /// `}...${`
    TemplateMiddle,
    /// `` }...` ``
    TemplateTail,
    Eof,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    /// 1-based line of the first byte.
    pub line: usize,
    pub newline_before: bool,
}

#[derive(Debug)]
pub(crate) struct Lexed {
    pub tokens: Vec<Token>,
    pub comments: Vec<Range<usize>>,
    /// `#!` line at the very start, if any.
    pub hashbang: Option<Range<usize>>,
}

#[derive(Debug)]
pub(crate) struct LexError {
    pub line: usize,
    pub message: String,
}

const PUNCTUATORS: &[&str] = &[
    "...", "===", "!==", "**=", "<<=", "&&=", "||=", "??=", "=>", "==", "!=", "<=", "<<", "**",
    "++", "--", "&&", "||", "??", "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "{", "}", "(",
    ")", "[", "]", ";", ",", "<", ">", "+", "-", "*", "/", "%", "&", "|", "^", "!", "~", "?", ":",
    "=", ".", "@",
];

/// Keywords after which a `/` starts a regular expression.
const KEYWORDS_BEFORE_EXPRESSION: &[&str] = &[
    "return", "typeof", "instanceof", "in", "of", "new", "delete", "void", "throw", "case", "do",
    "else", "yield", "await",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Brace {
    Block,
    Substitution,
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: usize,
    newline_pending: bool,
    braces: Vec<Brace>,
    /// One entry per open `(`: whether it holds an `if`/`while`/`for`/`with` head.
    parens: Vec<bool>,
    /// The last `)` closed such a head, so an expression statement follows.
    head_closed: bool,
    tokens: Vec<Token>,
    comments: Vec<Range<usize>>,
    hashbang: Option<Range<usize>>,
}

pub(crate) fn tokenize(src: &str) -> Result<Lexed, LexError> {
    let mut lexer = Lexer {
        src,
        bytes: src.as_bytes(),
        pos: 0,
        line: 1,
        newline_pending: false,
        braces: Vec::new(),
        parens: Vec::new(),
        head_closed: false,
        tokens: Vec::new(),
        comments: Vec::new(),
        hashbang: None,
    };
    lexer.run()?;
    Ok(Lexed {
        tokens: lexer.tokens,
        comments: lexer.comments,
        hashbang: lexer.hashbang,
    })
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'$' || b == b'_' || b >= 0x80 || b == b'\\'
}

fn is_ident_part(b: u8) -> bool {
    is_ident_start(b) || b.is_ascii_digit()
}

impl<'a> Lexer<'a> {
    fn run(&mut self) -> Result<(), LexError> {
        if self.src.starts_with('\u{feff}') {
            self.pos = 3;
        }
        if self.src[self.pos..].starts_with("#!") {
            let start = self.pos;
            while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                self.pos += 1;
            }
            self.hashbang = Some(start..self.pos);
        }

        loop {
            self.skip_trivia()?;
            if self.pos >= self.bytes.len() {
                self.push(TokenKind::Eof, self.pos, self.line);
                return Ok(());
            }
            self.next_token()?;
        }
    }

    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            line: self.line,
            message: message.into(),
        }
    }

    fn push(&mut self, kind: TokenKind, start: usize, line: usize) {
        if kind == TokenKind::Punct {
            match &self.src[start..self.pos] {
                "(" => {
                    let head = self.statement_keyword_before();
                    self.parens.push(head);
                }
                ")" => self.head_closed = self.parens.pop().unwrap_or(false),
                _ => {}
            }
        }
        self.tokens.push(Token {
            kind,
            start,
            end: self.pos,
            line,
            newline_before: self.newline_pending,
        });
        self.newline_pending = false;
    }

    fn peek_byte(&self, offset: usize) -> u8 {
        self.bytes.get(self.pos + offset).copied().unwrap_or(0)
    }

    fn newline(&mut self) {
        self.line += 1;
        self.newline_pending = true;
    }

    fn skip_trivia(&mut self) -> Result<(), LexError> {
        while self.pos < self.bytes.len() {
            let rest = &self.src[self.pos..];
            match self.bytes[self.pos] {
                b'\n' => {
                    self.newline();
                    self.pos += 1;
                }
                b' ' | b'\t' | b'\r' | 0x0b | 0x0c => self.pos += 1,
                b'/' if self.peek_byte(1) == b'/' => {
                    let start = self.pos;
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'\n' {
                        self.pos += 1;
                    }
                    self.comments.push(start..self.pos);
                }
                b'/' if self.peek_byte(1) == b'*' => {
                    let start = self.pos;
                    let start_line = self.line;
                    self.pos += 2;
                    loop {
                        if self.pos >= self.bytes.len() {
                            return Err(LexError {
                                line: start_line,
                                message: "unterminated block comment".into(),
                            });
                        }
                        if self.bytes[self.pos] == b'*' && self.peek_byte(1) == b'/' {
                            self.pos += 2;
                            break;
                        }
                        if self.bytes[self.pos] == b'\n' {
                            self.newline();
                        }
                        self.pos += 1;
                    }
                    self.comments.push(start..self.pos);
                }
                _ if rest.starts_with('\u{a0}') || rest.starts_with('\u{feff}') => {
                    self.pos += rest.chars().next().map_or(1, char::len_utf8);
                }
                _ if rest.starts_with('\u{2028}') || rest.starts_with('\u{2029}') => {
                    self.newline();
                    self.pos += 3;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn next_token(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let line = self.line;
        let b = self.bytes[self.pos];

        if is_ident_start(b) {
            self.scan_identifier();
            self.push(TokenKind::Ident, start, line);
            return Ok(());
        }
        if b.is_ascii_digit() || (b == b'.' && self.peek_byte(1).is_ascii_digit()) {
            self.scan_number();
            self.push(TokenKind::Number, start, line);
            return Ok(());
        }

        match b {
            b'"' | b'\'' => {
                self.scan_string(b)?;
                self.push(TokenKind::Str, start, line);
            }
            b'`' => {
                self.pos += 1;
                let kind = self.scan_template_chars(line)?;
                self.push(kind, start, line);
            }
            b'#' => {
                self.pos += 1;
                if !is_ident_start(self.peek_byte(0)) {
                    return Err(self.error("invalid character '#'"));
                }
                self.scan_identifier();
                self.push(TokenKind::PrivateName, start, line);
            }
            b'}' => match self.braces.pop() {
                Some(Brace::Substitution) => {
                    self.pos += 1;
                    let kind = match self.scan_template_chars(line)? {
                        TokenKind::TemplateHead => TokenKind::TemplateMiddle,
                        _ => TokenKind::TemplateTail,
                    };
                    self.push(kind, start, line);
                }
                _ => {
                    self.pos += 1;
                    self.push(TokenKind::Punct, start, line);
                }
            },
            b'/' if self.regex_allowed() => {
                self.scan_regex()?;
                self.push(TokenKind::Regex, start, line);
            }
            _ => {
                let rest = &self.src[self.pos..];
                let punct = if rest.starts_with("?.") && !self.peek_byte(2).is_ascii_digit() {
                    Some("?.")
                } else {
                    PUNCTUATORS.iter().copied().find(|p| rest.starts_with(p))
                };
                let Some(punct) = punct else {
                    let ch = rest.chars().next().unwrap_or('?');
                    return Err(self.error(format!("unexpected character '{ch}'")));
                };
                self.pos += punct.len();
                if punct == "{" {
                    self.braces.push(Brace::Block);
                }
                self.push(TokenKind::Punct, start, line);
            }
        }
        Ok(())
    }

    fn scan_identifier(&mut self) {
        while self.pos < self.bytes.len() && is_ident_part(self.bytes[self.pos]) {
            if self.bytes[self.pos] == b'\\' {
                // \uXXXX or \u{...}
                self.pos += 1;
                if self.peek_byte(0) == b'u' {
                    self.pos += 1;
                    if self.peek_byte(0) == b'{' {
                        while self.pos < self.bytes.len() && self.bytes[self.pos] != b'}' {
                            self.pos += 1;
                        }
                        self.pos += 1;
                    } else {
                        self.pos = (self.pos + 4).min(self.bytes.len());
                    }
                }
                continue;
            }
            self.pos += 1;
        }
    }

    fn scan_number(&mut self) {
        let radix_prefix = self.bytes[self.pos] == b'0'
            && matches!(self.peek_byte(1), b'x' | b'X' | b'o' | b'O' | b'b' | b'B');
        if radix_prefix {
            self.pos += 2;
            while self.pos < self.bytes.len()
                && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
            {
                self.pos += 1;
            }
            return;
        }

        let digits = |lexer: &mut Self| {
            while lexer.pos < lexer.bytes.len()
                && (lexer.bytes[lexer.pos].is_ascii_digit() || lexer.bytes[lexer.pos] == b'_')
            {
                lexer.pos += 1;
            }
        };
        digits(self);
        if self.peek_byte(0) == b'.' {
            self.pos += 1;
            digits(self);
        }
        if matches!(self.peek_byte(0), b'e' | b'E') {
            let sign = usize::from(matches!(self.peek_byte(1), b'+' | b'-'));
            if self.peek_byte(1 + sign).is_ascii_digit() {
                self.pos += 1 + sign;
                digits(self);
            }
        }
        if self.peek_byte(0) == b'n' {
            self.pos += 1;
        }
    }

    fn scan_string(&mut self, quote: u8) -> Result<(), LexError> {
        self.pos += 1;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => return Err(self.error("unterminated string literal")),
                Some(&b) if b == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(b'\\') => {
                    if self.peek_byte(1) == b'\n' {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    /// Scan template characters after `` ` `` or `}` up to the closing
    /// backtick or the next `${`.
    fn scan_template_chars(&mut self, start_line: usize) -> Result<TokenKind, LexError> {
        loop {
            match self.bytes.get(self.pos) {
                None => {
                    return Err(LexError {
                        line: start_line,
                        message: "unterminated template literal".into(),
                    })
                }
                Some(b'`') => {
                    self.pos += 1;
                    return Ok(TokenKind::Template);
                }
                Some(b'$') if self.peek_byte(1) == b'{' => {
                    self.pos += 2;
                    self.braces.push(Brace::Substitution);
                    return Ok(TokenKind::TemplateHead);
                }
                Some(b'\\') => {
                    if self.peek_byte(1) == b'\n' {
                        self.line += 1;
                    }
                    self.pos += 2;
                }
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn scan_regex(&mut self) -> Result<(), LexError> {
        self.pos += 1;
        let mut in_class = false;
        loop {
            match self.bytes.get(self.pos) {
                None | Some(b'\n') => return Err(self.error("unterminated regular expression")),
                Some(b'\\') => self.pos += 2,
                Some(b'[') => {
                    in_class = true;
                    self.pos += 1;
                }
                Some(b']') => {
                    in_class = false;
                    self.pos += 1;
                }
                Some(b'/') if !in_class => {
                    self.pos += 1;
                    break;
                }
                Some(_) => self.pos += 1,
            }
        }
        while self.pos < self.bytes.len() && is_ident_part(self.bytes[self.pos]) {
            self.pos += 1;
        }
        Ok(())
    }

    fn token_text(&self, token: &Token) -> &'a str {
        &self.src[token.start..token.end]
    }

    /// Whether the last token is `if`, `while`, `for` or `with` used as a
    /// statement keyword rather than a property name.
    fn statement_keyword_before(&self) -> bool {
        let n = self.tokens.len();
        let Some(prev) = self.tokens.last() else {
            return false;
        };
        prev.kind == TokenKind::Ident
            && matches!(self.token_text(prev), "if" | "while" | "for" | "with")
            && !n
                .checked_sub(2)
                .is_some_and(|i| matches!(self.token_text(&self.tokens[i]), "." | "?."))
    }

    fn regex_allowed(&self) -> bool {
        let Some(prev) = self.tokens.last() else {
            return true;
        };
        match prev.kind {
            TokenKind::Number
            | TokenKind::Str
            | TokenKind::Template
            | TokenKind::TemplateTail
            | TokenKind::Regex
            | TokenKind::PrivateName => false,
            TokenKind::Ident => KEYWORDS_BEFORE_EXPRESSION.contains(&self.token_text(prev)),
            TokenKind::TemplateHead | TokenKind::TemplateMiddle | TokenKind::Eof => true,
            TokenKind::Punct => match self.token_text(prev) {
                ")" => self.head_closed,
                "]" | "}" | "++" | "--" => false,
                // `value! / 2`: a `!` glued to an operand is a non-null assertion.
                "!" => !self.tokens.len().checked_sub(2).is_some_and(|i| {
                    let before = &self.tokens[i];
                    before.end == prev.start
                        && (before.kind == TokenKind::Ident
                            || matches!(self.token_text(before), ")" | "]"))
                }),
                _ => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_text(src: &str) -> Vec<(TokenKind, &str)> {
        tokenize(src)
            .unwrap()
            .tokens
            .iter()
            .map(|t| (t.kind, &src[t.start..t.end]))
            .collect()
    }

    #[test]
    fn nested_generics_close_with_single_angles() {
        let tokens = kinds_and_text("let x: Map<string, Array<number>> = y >>= 2;");
        let angles = tokens.iter().filter(|(_, t)| *t == ">").count();
        assert_eq!(angles, 4);
    }

    #[test]
    fn template_substitutions_nest() {
        let src = "`a ${ b ? `c${d}` : {e: 1}.e } f`";
        let kinds: Vec<_> = kinds_and_text(src).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds.first(), Some(&TokenKind::TemplateHead));
        assert!(kinds.contains(&TokenKind::TemplateTail));
        assert_eq!(kinds.last(), Some(&TokenKind::Eof));
        assert_eq!(kinds.iter().filter(|k| **k == TokenKind::TemplateTail).count(), 2);
    }

    #[test]
    fn regex_versus_division() {
        let tokens = kinds_and_text("a = b / c; r = /x\\/y[/]/g.test(s); n = x! / 2;");
        assert!(tokens.contains(&(TokenKind::Regex, "/x\\/y[/]/g")));
        assert_eq!(tokens.iter().filter(|(k, _)| *k == TokenKind::Regex).count(), 1);

        let tokens = kinds_and_text(
            "if (s) /a+b/.test(s);\nwhile (n < 1) /x/.test('x') && n++;\nfor (;;) /y/g.exec(t);\n\
             if (f(a) / 2) q = (a) / b / c;\nobj.if(a) / 2;",
        );
        let regexes: Vec<&str> = tokens
            .iter()
            .filter(|(k, _)| *k == TokenKind::Regex)
            .map(|(_, text)| *text)
            .collect();
        assert_eq!(regexes, ["/a+b/", "/x/", "/y/g"]);
    }

    #[test]
    fn lines_and_newlines_are_tracked() {
        let lexed = tokenize("a\n/* one\ntwo */ b `x\ny` c").unwrap();
        let lines: Vec<_> = lexed.tokens.iter().map(|t| t.line).collect();
        assert_eq!(lines, [1, 3, 3, 4, 4]);
        assert!(lexed.tokens[1].newline_before);
        assert_eq!(lexed.comments.len(), 1);
    }

    #[test]
    fn optional_chaining_is_not_a_ternary_before_digits() {
        let tokens = kinds_and_text("a?.b; c?.5:1");
        assert!(tokens.contains(&(TokenKind::Punct, "?.")));
        assert!(tokens.contains(&(TokenKind::Number, ".5")));
    }

    #[test]
    fn unterminated_string_reports_line() {
        let err = tokenize("let a = 1;\nlet b = 'oops\n").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn hashbang_is_recorded() {
        let lexed = tokenize("#!/usr/bin/env node\nrun();").unwrap();
        assert_eq!(lexed.hashbang, Some(0..19));
        assert_eq!(lexed.tokens[0].line, 2);
    }
}
