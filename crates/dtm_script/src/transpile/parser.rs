//! Type eraser
//!
//! A recursive-descent walk over the token stream that understands enough
//! of the statement and expression grammar to find every TypeScript-only
//! construct and record an [`Edit`] removing it. No syntax tree is built;
//! precedence is irrelevant because nothing is evaluated, only skipped or
//! kept. Module syntax is collected separately and rewritten afterwards,
//! once the whole file has been seen (import elision needs the complete set
//! of value references).

use super::edits::Edit;
use super::lexer::{Lexed, Token, TokenKind};
use std::collections::HashSet;

const NONE: usize = usize::MAX;

const DECORATORS: &str = "decorators are not supported";
const ENUMS: &str = "enums are not supported; use a union of literal types or a const object";
const NAMESPACES: &str = "namespaces are not supported; use modules";

/// Words that can never be an identifier reference.
const RESERVED: &[&str] = &[
    "break", "case", "catch", "const", "continue", "debugger", "default", "do", "else", "enum",
    "export", "extends", "finally", "for", "if", "import", "in", "instanceof", "return", "switch",
    "throw", "try", "var", "while", "with",
];

/// Words that cannot start a type.
const NOT_A_TYPE: &[&str] = &["function", "class", "delete", "super", "as", "satisfies", "new"];

const PARAM_MODIFIERS: &[&str] = &["public", "private", "protected", "readonly", "override"];

const CLASS_MODIFIERS: &[&str] = &[
    "public", "private", "protected", "readonly", "override", "abstract", "declare", "static",
    "accessor",
];

const DECLARABLE: &[&str] = &[
    "var", "let", "const", "function", "async", "class", "abstract", "module", "namespace",
    "global", "enum", "type", "interface",
];

const BINARY_OPERATORS: &[&str] = &[
    "+", "-", "*", "/", "%", "**", "==", "!=", "===", "!==", "<", "<=", "<<", "&", "|", "^", "&&",
    "||", "??",
];

const ASSIGNMENT_OPERATORS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", "&=", "|=", "^=", "&&=", "||=", "??=",
];

#[derive(Debug)]
pub(crate) struct ParseError {
    pub line: usize,
    pub message: String,
}

type PResult<T> = Result<T, ParseError>;

#[derive(Debug, Default)]
pub(crate) struct ImportBindings {
    pub default: Option<String>,
    pub namespace: Option<String>,
    /// `(imported, local)`
    pub named: Vec<(String, String)>,
    /// Some specifiers were written `type X`.
    pub type_only_specifiers: bool,
}

#[derive(Debug)]
pub(crate) enum ImportClause {
    SideEffect,
    Bindings(ImportBindings),
}

#[derive(Debug)]
pub(crate) struct ImportDecl {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub specifier: String,
    pub clause: ImportClause,
}

#[derive(Debug)]
pub(crate) enum Reexport {
    All { namespace: Option<String> },
    /// `(imported, exported)`
    Named(Vec<(String, String)>),
}

#[derive(Debug)]
pub(crate) struct ReexportDecl {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub specifier: String,
    pub kind: Reexport,
}

#[derive(Debug, Default)]
pub(crate) struct ModuleSyntax {
    pub edits: Vec<Edit>,
    pub imports: Vec<ImportDecl>,
    pub reexports: Vec<ReexportDecl>,
    /// `(exported, local)`
    pub exports: Vec<(String, String)>,
    pub value_refs: HashSet<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Form {
    Declaration,
    Expression,
}

enum Declared {
    Body(Option<String>),
    /// Overload or ambient signature; already erased.
    Signature,
}

pub(crate) struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    matching: Vec<usize>,
    pos: usize,
    syntax: ModuleSyntax,
    /// `export { a as b }` lists, resolved once all type names are known.
    local_exports: Vec<(String, String)>,
    type_names: HashSet<String>,
}

fn match_brackets(src: &str, tokens: &[Token]) -> Vec<usize> {
    let mut matching = vec![NONE; tokens.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        let opener = match &src[token.start..token.end] {
            "(" | "[" | "{" => {
                stack.push(i);
                continue;
            }
            ")" => "(",
            "]" => "[",
            "}" => "{",
            _ => continue,
        };
        if let Some(&open) = stack.last() {
            if &src[tokens[open].start..tokens[open].end] == opener {
                stack.pop();
                matching[open] = i;
                matching[i] = open;
            }
        }
    }
    matching
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len().saturating_sub(1).max(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(escaped) = chars.next() {
                out.push(escaped);
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl<'a> Parser<'a> {
    pub(crate) fn new(src: &'a str, lexed: Lexed) -> Self {
        let matching = match_brackets(src, &lexed.tokens);
        Self {
            src,
            tokens: lexed.tokens,
            matching,
            pos: 0,
            syntax: ModuleSyntax::default(),
            local_exports: Vec::new(),
            type_names: HashSet::new(),
        }
    }

    pub(crate) fn parse_module(mut self) -> PResult<ModuleSyntax> {
        while !self.at_eof() {
            self.parse_statement(true)?;
        }
        for (local, exported) in std::mem::take(&mut self.local_exports) {
            if self.type_names.contains(&local) {
                continue;
            }
            self.syntax.value_refs.insert(local.clone());
            self.record_export(&exported, &local);
        }
        Ok(self.syntax)
    }

    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn tok(&self) -> Token {
        self.tokens[self.pos]
    }

    fn tok_at(&self, n: usize) -> Token {
        self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn text_of(&self, token: Token) -> &'a str {
        &self.src[token.start..token.end]
    }

    fn text(&self) -> &'a str {
        self.text_of(self.tok())
    }

    fn text_at_index(&self, index: usize) -> &'a str {
        self.text_of(self.tokens[index.min(self.tokens.len() - 1)])
    }

    fn is(&self, s: &str) -> bool {
        let token = self.tok();
        matches!(token.kind, TokenKind::Ident | TokenKind::Punct) && self.text_of(token) == s
    }

    fn is_at(&self, n: usize, s: &str) -> bool {
        let token = self.tok_at(n);
        matches!(token.kind, TokenKind::Ident | TokenKind::Punct) && self.text_of(token) == s
    }

    fn is_kind(&self, kind: TokenKind) -> bool {
        self.tok().kind == kind
    }

    fn at_eof(&self) -> bool {
        self.is_kind(TokenKind::Eof)
    }

    fn bump(&mut self) -> Token {
        let token = self.tok();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn bump_text(&mut self) -> String {
        let token = self.bump();
        self.text_of(token).to_string()
    }

    fn eat(&mut self, s: &str) -> bool {
        if self.is(s) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, s: &str) -> PResult<Token> {
        if self.is(s) {
            Ok(self.bump())
        } else {
            let found = self.describe_current();
            self.error(format!("expected '{s}' but found {found}"))
        }
    }

    fn prev_end(&self) -> usize {
        self.tokens[self.pos.saturating_sub(1)].end
    }

    fn describe_current(&self) -> String {
        match self.tok().kind {
            TokenKind::Eof => "end of input".to_string(),
            _ => format!("'{}'", self.text()),
        }
    }

    fn error<T>(&self, message: impl Into<String>) -> PResult<T> {
        Err(ParseError {
            line: self.tok().line,
            message: message.into(),
        })
    }

    fn unexpected<T>(&self) -> PResult<T> {
        let found = self.describe_current();
        self.error(format!("unexpected {found}"))
    }

    fn erase(&mut self, start: usize, end: usize) {
        if start < end {
            self.syntax.edits.push(Edit::blank(start, end));
        }
    }

    fn erase_current(&mut self) {
        let token = self.bump();
        self.erase(token.start, token.end);
    }

    fn skip_balanced(&mut self) -> PResult<()> {
        let close = self.matching[self.pos];
        if close == NONE {
            return self.error(format!("unbalanced '{}'", self.text()));
        }
        self.pos = close + 1;
        Ok(())
    }

    /// Run `f`; on failure rewind as if nothing happened.
    fn speculate<T>(&mut self, f: impl FnOnce(&mut Self) -> PResult<T>) -> Option<T> {
        let pos = self.pos;
        let edits = self.syntax.edits.len();
        match f(self) {
            Ok(value) => Some(value),
            Err(_) => {
                self.pos = pos;
                self.syntax.edits.truncate(edits);
                None
            }
        }
    }

    fn statement_ends(&self) -> bool {
        self.is(";") || self.is("}") || self.at_eof() || self.tok().newline_before
    }

    fn consume_semicolon(&mut self) -> PResult<()> {
        if self.eat(";") || self.is("}") || self.at_eof() || self.tok().newline_before {
            Ok(())
        } else {
            self.unexpected()
        }
    }

    fn is_key_start(&self, token: Token) -> bool {
        match token.kind {
            TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::PrivateName => true,
            TokenKind::Punct => self.text_of(token) == "[",
            _ => false,
        }
    }

    fn binding_name(&mut self) -> PResult<String> {
        if self.is_kind(TokenKind::Ident) && !RESERVED.contains(&self.text()) {
            Ok(self.bump_text())
        } else {
            self.unexpected()
        }
    }

    fn module_export_name(&mut self) -> PResult<String> {
        match self.tok().kind {
            TokenKind::Ident => Ok(self.bump_text()),
            TokenKind::Str => self.string_value(),
            _ => self.unexpected(),
        }
    }

    fn string_value(&mut self) -> PResult<String> {
        if !self.is_kind(TokenKind::Str) {
            return self.unexpected();
        }
        let token = self.bump();
        Ok(unquote(self.text_of(token)))
    }

    fn expect_member_name(&mut self) -> PResult<()> {
        match self.tok().kind {
            TokenKind::Ident | TokenKind::PrivateName => {
                self.bump();
                Ok(())
            }
            _ => self.unexpected(),
        }
    }

    fn record_export(&mut self, exported: &str, local: &str) {
        if !self.syntax.exports.iter().any(|(name, _)| name == exported) {
            self.syntax
                .exports
                .push((exported.to_string(), local.to_string()));
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self, top: bool) -> PResult<()> {
        let token = self.tok();
        if token.kind == TokenKind::Eof {
            return self.unexpected();
        }

        if token.kind == TokenKind::Ident {
            let next = self.tok_at(1);
            let next_text = self.text_of(next);
            let same_line = !next.newline_before;
            match self.text() {
                "import" if !matches!(next_text, "(" | ".") => {
                    if !top {
                        return self.error("import declarations may only appear at the top level");
                    }
                    return self.parse_import();
                }
                "export" => {
                    if !top {
                        return self.error("export declarations may only appear at the top level");
                    }
                    return self.parse_export();
                }
                "interface" if next.kind == TokenKind::Ident && same_line => {
                    return self.erase_interface(token.start);
                }
                "type"
                    if next.kind == TokenKind::Ident
                        && same_line
                        && (self.is_at(2, "=") || self.is_at(2, "<")) =>
                {
                    return self.erase_type_alias(token.start);
                }
                "declare" if same_line && DECLARABLE.contains(&next_text) => {
                    return self.erase_declare(token.start);
                }
                "abstract" if next_text == "class" && same_line => {
                    self.erase_current();
                    return self.parse_class().map(drop);
                }
                "enum" if next.kind == TokenKind::Ident => return self.error(ENUMS),
                "const" if next_text == "enum" => return self.error(ENUMS),
                "namespace" | "module"
                    if same_line
                        && matches!(next.kind, TokenKind::Ident | TokenKind::Str)
                        && (self.is_at(2, "{") || self.is_at(2, ".")) =>
                {
                    return self.error(NAMESPACES);
                }
                "function" => {
                    return self.parse_function(Form::Declaration, token.start).map(drop);
                }
                "async" if next_text == "function" && same_line => {
                    return self.parse_function(Form::Declaration, token.start).map(drop);
                }
                "class" => return self.parse_class().map(drop),
                "var" | "const" => return self.parse_var_statement(&mut Vec::new()),
                "let" if next.kind == TokenKind::Ident || matches!(next_text, "[" | "{") => {
                    return self.parse_var_statement(&mut Vec::new());
                }
                "if" => {
                    self.bump();
                    self.parse_paren_expression()?;
                    self.parse_statement(false)?;
                    if self.eat("else") {
                        self.parse_statement(false)?;
                    }
                    return Ok(());
                }
                "for" => return self.parse_for(),
                "while" | "with" => {
                    self.bump();
                    self.parse_paren_expression()?;
                    return self.parse_statement(false);
                }
                "do" => {
                    self.bump();
                    self.parse_statement(false)?;
                    self.expect("while")?;
                    self.parse_paren_expression()?;
                    self.eat(";");
                    return Ok(());
                }
                "return" | "throw" => {
                    self.bump();
                    if !self.statement_ends() {
                        self.parse_expression(false)?;
                    }
                    return self.consume_semicolon();
                }
                "try" => return self.parse_try(),
                "switch" => return self.parse_switch(),
                "break" | "continue" => {
                    self.bump();
                    if self.is_kind(TokenKind::Ident) && !self.tok().newline_before {
                        self.bump();
                    }
                    return self.consume_semicolon();
                }
                "debugger" => {
                    self.bump();
                    return self.consume_semicolon();
                }
                label if next_text == ":" && !RESERVED.contains(&label) => {
                    self.bump();
                    self.bump();
                    return self.parse_statement(false);
                }
                _ => {}
            }
        }

        if self.is("{") {
            return self.parse_block();
        }
        if self.eat(";") {
            return Ok(());
        }
        if self.is("@") {
            return self.error(DECORATORS);
        }
        self.parse_expression(false)?;
        self.consume_semicolon()
    }

    fn parse_block(&mut self) -> PResult<()> {
        self.expect("{")?;
        while !self.is("}") {
            self.parse_statement(false)?;
        }
        self.expect("}")?;
        Ok(())
    }

    fn parse_paren_expression(&mut self) -> PResult<()> {
        self.expect("(")?;
        self.parse_expression(false)?;
        self.expect(")")?;
        Ok(())
    }

    fn parse_var_statement(&mut self, names: &mut Vec<String>) -> PResult<()> {
        self.bump();
        self.parse_var_declarations(false, names)?;
        self.consume_semicolon()
    }

    fn parse_var_declarations(&mut self, no_in: bool, names: &mut Vec<String>) -> PResult<()> {
        loop {
            self.parse_binding_target(names)?;
            if self.is("!") && self.is_at(1, ":") {
                self.erase_current();
            }
            if self.is(":") {
                self.erase_annotation()?;
            }
            if self.eat("=") {
                self.parse_assign(no_in)?;
            }
            if !self.eat(",") {
                return Ok(());
            }
        }
    }

    fn parse_binding_target(&mut self, names: &mut Vec<String>) -> PResult<()> {
        if self.is("[") {
            self.bump();
            while !self.is("]") {
                if self.eat(",") {
                    continue;
                }
                if self.eat("...") {
                    self.parse_binding_target(names)?;
                } else {
                    self.parse_binding_element(names)?;
                }
                if !self.is("]") {
                    self.expect(",")?;
                }
            }
            self.expect("]")?;
            return Ok(());
        }

        if self.is("{") {
            self.bump();
            while !self.is("}") {
                if self.eat("...") {
                    self.parse_binding_target(names)?;
                } else if self.is("[") {
                    self.bump();
                    self.parse_assign(false)?;
                    self.expect("]")?;
                    self.expect(":")?;
                    self.parse_binding_element(names)?;
                } else if self.is_at(1, ":")
                    && matches!(
                        self.tok().kind,
                        TokenKind::Ident | TokenKind::Str | TokenKind::Number
                    )
                {
                    self.bump();
                    self.bump();
                    self.parse_binding_element(names)?;
                } else {
                    names.push(self.binding_name()?);
                    if self.eat("=") {
                        self.parse_assign(false)?;
                    }
                }
                if !self.is("}") {
                    self.expect(",")?;
                }
            }
            self.expect("}")?;
            return Ok(());
        }

        names.push(self.binding_name()?);
        Ok(())
    }

    fn parse_binding_element(&mut self, names: &mut Vec<String>) -> PResult<()> {
        self.parse_binding_target(names)?;
        if self.eat("=") {
            self.parse_assign(false)?;
        }
        Ok(())
    }

    fn parse_for(&mut self) -> PResult<()> {
        self.bump();
        self.eat("await");
        self.expect("(")?;
        if !self.eat(";") {
            let declaration = self.is("var")
                || self.is("const")
                || (self.is("let")
                    && (self.tok_at(1).kind == TokenKind::Ident
                        || self.is_at(1, "[")
                        || self.is_at(1, "{")));
            if declaration {
                self.bump();
                self.parse_var_declarations(true, &mut Vec::new())?;
            } else {
                self.parse_expression(true)?;
            }
            if self.eat("of") {
                self.parse_assign(false)?;
                self.expect(")")?;
                return self.parse_statement(false);
            }
            if self.eat("in") {
                self.parse_expression(false)?;
                self.expect(")")?;
                return self.parse_statement(false);
            }
            self.expect(";")?;
        }
        if !self.is(";") {
            self.parse_expression(false)?;
        }
        self.expect(";")?;
        if !self.is(")") {
            self.parse_expression(false)?;
        }
        self.expect(")")?;
        self.parse_statement(false)
    }

    fn parse_try(&mut self) -> PResult<()> {
        self.bump();
        self.parse_block()?;
        if self.eat("catch") {
            if self.eat("(") {
                self.parse_binding_target(&mut Vec::new())?;
                if self.is(":") {
                    self.erase_annotation()?;
                }
                self.expect(")")?;
            }
            self.parse_block()?;
        }
        if self.eat("finally") {
            self.parse_block()?;
        }
        Ok(())
    }

    fn parse_switch(&mut self) -> PResult<()> {
        self.bump();
        self.parse_paren_expression()?;
        self.expect("{")?;
        while !self.is("}") {
            if self.eat("case") {
                self.parse_expression(false)?;
                self.expect(":")?;
            } else if self.eat("default") {
                self.expect(":")?;
            } else {
                self.parse_statement(false)?;
            }
        }
        self.expect("}")?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Functions and classes
    // ------------------------------------------------------------------

    fn parse_function(&mut self, form: Form, start: usize) -> PResult<Declared> {
        self.eat("async");
        self.expect("function")?;
        self.eat("*");
        let name = if self.is_kind(TokenKind::Ident) {
            Some(self.bump_text())
        } else {
            None
        };
        if self.is("<") {
            self.erase_type_params()?;
        }
        self.parse_params()?;
        if self.is(":") {
            self.erase_annotation()?;
        }
        if self.is("{") {
            self.parse_block()?;
            return Ok(Declared::Body(name));
        }
        if form == Form::Declaration {
            self.consume_semicolon()?;
            self.erase(start, self.prev_end());
            return Ok(Declared::Signature);
        }
        self.unexpected()
    }

    fn parse_params(&mut self) -> PResult<()> {
        self.expect("(")?;
        while !self.is(")") {
            let param = self.tok();
            if self.is("@") {
                return self.error(DECORATORS);
            }
            if param.kind == TokenKind::Ident && PARAM_MODIFIERS.contains(&self.text()) {
                let next = self.tok_at(1);
                if next.kind == TokenKind::Ident || matches!(self.text_of(next), "[" | "{") {
                    return self.error(
                        "parameter properties are not supported; assign the field in the constructor body",
                    );
                }
            }
            if self.is("this") && matches!(self.text_of(self.tok_at(1)), ":" | "," | ")") {
                self.bump();
                if self.eat(":") {
                    self.skip_type()?;
                }
                self.eat(",");
                self.erase(param.start, self.prev_end());
                continue;
            }
            self.eat("...");
            self.parse_binding_target(&mut Vec::new())?;
            if self.is("?") {
                self.erase_current();
            }
            if self.is(":") {
                self.erase_annotation()?;
            }
            if self.eat("=") {
                self.parse_assign(false)?;
            }
            if !self.is(")") {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        Ok(())
    }

    fn parse_class(&mut self) -> PResult<Option<String>> {
        self.expect("class")?;
        let name = if self.is_kind(TokenKind::Ident) && !self.is("extends") && !self.is("implements")
        {
            Some(self.bump_text())
        } else {
            None
        };
        if self.is("<") {
            self.erase_type_params()?;
        }
        if self.eat("extends") {
            self.parse_lhs()?;
            if self.is("<") {
                self.erase_type_args()?;
            }
        }
        if self.is("implements") {
            let start = self.tok().start;
            self.bump();
            loop {
                self.skip_type()?;
                if !self.eat(",") {
                    break;
                }
            }
            self.erase(start, self.prev_end());
        }

        self.expect("{")?;
        while !self.is("}") {
            if self.at_eof() {
                return self.unexpected();
            }
            if self.eat(";") {
                continue;
            }
            self.parse_class_member()?;
        }
        self.expect("}")?;
        Ok(name)
    }

    fn modifier_is_member_name(&self) -> bool {
        let next = self.tok_at(1);
        next.kind == TokenKind::Eof
            || matches!(
                self.text_of(next),
                "(" | "=" | ";" | ":" | "?" | "!" | "<" | "}"
            )
    }

    fn parse_class_member(&mut self) -> PResult<()> {
        let member_start = self.tok().start;
        if self.is("@") {
            return self.error(DECORATORS);
        }
        if self.is("static") && self.is_at(1, "{") {
            self.bump();
            return self.parse_block();
        }

        let mut declaration_only = false;
        while self.is_kind(TokenKind::Ident)
            && CLASS_MODIFIERS.contains(&self.text())
            && !self.modifier_is_member_name()
        {
            match self.text() {
                "abstract" | "declare" => {
                    declaration_only = true;
                    self.bump();
                }
                "static" | "accessor" => {
                    self.bump();
                }
                _ => self.erase_current(),
            }
        }

        // index signature
        if self.is("[") && self.tok_at(1).kind == TokenKind::Ident && self.is_at(2, ":") {
            self.skip_balanced()?;
            if self.eat(":") {
                self.skip_type()?;
            }
            self.consume_semicolon()?;
            self.erase(member_start, self.prev_end());
            return Ok(());
        }

        let next = self.tok_at(1);
        if (self.is("get") || self.is("set")) && self.is_key_start(next) {
            self.bump();
        } else if self.is("async")
            && !next.newline_before
            && (self.is_key_start(next) || self.text_of(next) == "*")
        {
            self.bump();
            self.eat("*");
        } else {
            self.eat("*");
        }
        self.parse_property_key()?;
        if self.is("?") || self.is("!") {
            self.erase_current();
        }

        if self.is("(") || self.is("<") {
            if self.is("<") {
                self.erase_type_params()?;
            }
            self.parse_params()?;
            if self.is(":") {
                self.erase_annotation()?;
            }
            if self.is("{") {
                self.parse_block()?;
            } else {
                self.consume_semicolon()?;
                declaration_only = true;
            }
        } else {
            if self.is(":") {
                self.erase_annotation()?;
            }
            if self.eat("=") {
                self.parse_assign(false)?;
            }
            self.consume_semicolon()?;
        }

        if declaration_only {
            self.erase(member_start, self.prev_end());
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn parse_expression(&mut self, no_in: bool) -> PResult<()> {
        loop {
            self.parse_assign(no_in)?;
            if !self.eat(",") {
                return Ok(());
            }
        }
    }

    fn parse_assign(&mut self, no_in: bool) -> PResult<()> {
        if self.try_parse_arrow(no_in)? {
            return Ok(());
        }
        if self.is("yield") {
            self.bump();
            self.eat("*");
            if !self.statement_ends() && !matches!(self.text(), ")" | "]" | "," | ":") {
                self.parse_assign(no_in)?;
            }
            return Ok(());
        }
        self.parse_conditional(no_in)?;
        if let Some(width) = self.assignment_operator() {
            self.pos += width;
            self.parse_assign(no_in)?;
        }
        Ok(())
    }

    fn try_parse_arrow(&mut self, no_in: bool) -> PResult<bool> {
        let start = self.pos;
        let is_async = self.is("async") && !self.tok_at(1).newline_before && {
            let next = self.tok_at(1);
            next.kind == TokenKind::Ident || matches!(self.text_of(next), "(" | "<")
        };
        let head = start + usize::from(is_async);
        let head_token = self.tokens[head.min(self.tokens.len() - 1)];
        let head_text = self.text_of(head_token);

        // x => ...
        if head_token.kind == TokenKind::Ident
            && !RESERVED.contains(&head_text)
            && self.text_at_index(head + 1) == "=>"
        {
            self.pos = head + 2;
            self.parse_arrow_body(no_in)?;
            return Ok(true);
        }

        let open = match (head_token.kind, head_text) {
            (TokenKind::Punct, "(") => Some(head),
            (TokenKind::Punct, "<") => {
                self.pos = head;
                let open = self.speculate(|p| {
                    p.skip_type_params()?;
                    if p.is("(") {
                        Ok(p.pos)
                    } else {
                        p.unexpected()
                    }
                });
                self.pos = start;
                open
            }
            _ => None,
        };
        let Some(open) = open else {
            return Ok(false);
        };
        let close = self.matching[open];
        if close == NONE {
            return Ok(false);
        }

        let is_arrow = match self.text_at_index(close + 1) {
            "=>" => true,
            ":" => {
                self.pos = close + 2;
                let found = self
                    .speculate(|p| {
                        p.skip_type()?;
                        if p.is("=>") {
                            Ok(())
                        } else {
                            p.unexpected()
                        }
                    })
                    .is_some();
                self.pos = start;
                found
            }
            _ => false,
        };
        if !is_arrow {
            return Ok(false);
        }

        if is_async {
            self.bump();
        }
        if self.is("<") {
            self.erase_type_params()?;
        }
        self.parse_params()?;
        if self.is(":") {
            self.erase_annotation()?;
        }
        self.expect("=>")?;
        self.parse_arrow_body(no_in)?;
        Ok(true)
    }

    fn parse_arrow_body(&mut self, no_in: bool) -> PResult<()> {
        if self.is("{") {
            self.parse_block()
        } else {
            self.parse_assign(no_in)
        }
    }

    fn parse_conditional(&mut self, no_in: bool) -> PResult<()> {
        self.parse_binary(no_in)?;
        if self.eat("?") {
            self.parse_assign(false)?;
            self.expect(":")?;
            self.parse_assign(no_in)?;
        }
        Ok(())
    }

    fn parse_binary(&mut self, no_in: bool) -> PResult<()> {
        loop {
            self.parse_unary()?;
            self.erase_type_operators()?;
            match self.binary_operator(no_in) {
                Some(width) => self.pos += width,
                None => return Ok(()),
            }
        }
    }

    /// `x as T`, `x as const`, `x satisfies T`
    fn erase_type_operators(&mut self) -> PResult<()> {
        while (self.is("as") || self.is("satisfies")) && !self.tok().newline_before {
            let start = self.tok().start;
            self.bump();
            if !self.eat("const") {
                self.skip_type()?;
            }
            self.erase(start, self.prev_end());
        }
        Ok(())
    }

    /// Width in tokens of a `>`-run operator at the cursor, and whether it
    /// assigns. The lexer never merges `>`, so `>>=` arrives as three
    /// adjacent tokens.
    fn greater_than_operator(&self) -> Option<(usize, bool)> {
        if !self.is(">") {
            return None;
        }
        let mut count = 1;
        let mut end = self.tok().end;
        while count < 3 {
            let next = self.tok_at(count);
            if next.start == end && next.kind == TokenKind::Punct && self.text_of(next) == ">" {
                count += 1;
                end = next.end;
            } else {
                break;
            }
        }
        let next = self.tok_at(count);
        if next.start == end && next.kind == TokenKind::Punct && self.text_of(next) == "=" {
            Some((count + 1, count > 1))
        } else {
            Some((count, false))
        }
    }

    fn binary_operator(&self, no_in: bool) -> Option<usize> {
        let token = self.tok();
        match token.kind {
            TokenKind::Punct => {
                if BINARY_OPERATORS.contains(&self.text()) {
                    return Some(1);
                }
                self.greater_than_operator()
                    .filter(|(_, assigns)| !assigns)
                    .map(|(width, _)| width)
            }
            TokenKind::Ident => match self.text() {
                "instanceof" => Some(1),
                "in" if !no_in => Some(1),
                _ => None,
            },
            _ => None,
        }
    }

    fn assignment_operator(&self) -> Option<usize> {
        if self.tok().kind != TokenKind::Punct {
            return None;
        }
        if ASSIGNMENT_OPERATORS.contains(&self.text()) {
            return Some(1);
        }
        self.greater_than_operator()
            .filter(|(_, assigns)| *assigns)
            .map(|(width, _)| width)
    }

    fn parse_unary(&mut self) -> PResult<()> {
        let token = self.tok();
        let prefix = match token.kind {
            TokenKind::Punct => matches!(self.text(), "!" | "~" | "+" | "-" | "++" | "--"),
            TokenKind::Ident => matches!(self.text(), "typeof" | "void" | "delete" | "await"),
            _ => false,
        };
        if prefix {
            self.bump();
            return self.parse_unary();
        }
        if self.is("<") {
            // <T>value
            self.erase_type_args()?;
            return self.parse_unary();
        }
        self.parse_lhs()?;
        if (self.is("++") || self.is("--")) && !self.tok().newline_before {
            self.bump();
        }
        Ok(())
    }

    fn parse_lhs(&mut self) -> PResult<()> {
        if self.is("new") {
            self.parse_new()?;
        } else {
            self.parse_primary()?;
        }
        self.parse_call_tail()
    }

    fn parse_call_tail(&mut self) -> PResult<()> {
        loop {
            let token = self.tok();
            match token.kind {
                TokenKind::Template | TokenKind::TemplateHead => {
                    self.parse_template()?;
                    continue;
                }
                TokenKind::Punct => {}
                _ => return Ok(()),
            }
            match self.text() {
                "." => {
                    self.bump();
                    self.expect_member_name()?;
                }
                "?." => {
                    self.bump();
                    if self.is("(") {
                        self.parse_args()?;
                    } else if self.is("[") {
                        self.bump();
                        self.parse_expression(false)?;
                        self.expect("]")?;
                    } else if self.is("<") {
                        self.erase_type_args()?;
                        self.parse_args()?;
                    } else {
                        self.expect_member_name()?;
                    }
                }
                "[" => {
                    self.bump();
                    self.parse_expression(false)?;
                    self.expect("]")?;
                }
                "(" => self.parse_args()?,
                // non-null assertion
                "!" if !token.newline_before => self.erase_current(),
                "<" => {
                    let applied = self.speculate(|p| {
                        p.skip_type_args()?;
                        if p.is("(")
                            || matches!(p.tok().kind, TokenKind::Template | TokenKind::TemplateHead)
                        {
                            Ok(())
                        } else {
                            p.unexpected()
                        }
                    });
                    if applied.is_none() {
                        return Ok(());
                    }
                    self.erase(token.start, self.prev_end());
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_new(&mut self) -> PResult<()> {
        self.bump();
        if self.eat(".") {
            // new.target
            return self.expect_member_name();
        }
        if self.is("new") {
            self.parse_new()?;
        } else {
            self.parse_primary()?;
        }
        loop {
            if self.eat(".") {
                self.expect_member_name()?;
            } else if self.is("[") {
                self.bump();
                self.parse_expression(false)?;
                self.expect("]")?;
            } else if matches!(self.tok().kind, TokenKind::Template | TokenKind::TemplateHead) {
                self.parse_template()?;
            } else {
                break;
            }
        }
        if self.is("<") {
            let start = self.tok().start;
            if self.speculate(|p| p.skip_type_args()).is_some() {
                self.erase(start, self.prev_end());
            }
        }
        if self.is("(") {
            self.parse_args()?;
        }
        Ok(())
    }

    fn parse_args(&mut self) -> PResult<()> {
        self.expect("(")?;
        while !self.is(")") {
            self.eat("...");
            self.parse_assign(false)?;
            if !self.is(")") {
                self.expect(",")?;
            }
        }
        self.expect(")")?;
        Ok(())
    }

    fn parse_primary(&mut self) -> PResult<()> {
        let token = self.tok();
        match token.kind {
            TokenKind::Number
            | TokenKind::Str
            | TokenKind::Regex
            | TokenKind::Template
            | TokenKind::PrivateName => {
                self.bump();
                Ok(())
            }
            TokenKind::TemplateHead => self.parse_template(),
            TokenKind::Eof | TokenKind::TemplateMiddle | TokenKind::TemplateTail => {
                self.unexpected()
            }
            TokenKind::Ident => match self.text() {
                "function" => self.parse_function(Form::Expression, token.start).map(drop),
                "async" if self.is_at(1, "function") && !self.tok_at(1).newline_before => {
                    self.parse_function(Form::Expression, token.start).map(drop)
                }
                "class" => self.parse_class().map(drop),
                "this" | "super" | "null" | "true" | "false" => {
                    self.bump();
                    Ok(())
                }
                "import" if self.is_at(1, "(") => {
                    self.error("dynamic import() is not supported; use a static import")
                }
                "import" => self.error("import.meta is not supported"),
                word if RESERVED.contains(&word) => self.unexpected(),
                word => {
                    self.syntax.value_refs.insert(word.to_string());
                    self.bump();
                    Ok(())
                }
            },
            TokenKind::Punct => match self.text() {
                "(" => {
                    self.bump();
                    self.parse_expression(false)?;
                    self.expect(")")?;
                    Ok(())
                }
                "[" => self.parse_array_literal(),
                "{" => self.parse_object_literal(),
                "@" => self.error(DECORATORS),
                _ => self.unexpected(),
            },
        }
    }

    fn parse_template(&mut self) -> PResult<()> {
        if self.bump().kind == TokenKind::Template {
            return Ok(());
        }
        loop {
            self.parse_expression(false)?;
            match self.tok().kind {
                TokenKind::TemplateMiddle => {
                    self.bump();
                }
                TokenKind::TemplateTail => {
                    self.bump();
                    return Ok(());
                }
                _ => return self.unexpected(),
            }
        }
    }

    fn parse_array_literal(&mut self) -> PResult<()> {
        self.bump();
        while !self.is("]") {
            if self.eat(",") {
                continue;
            }
            self.eat("...");
            self.parse_assign(false)?;
            if !self.is("]") {
                self.expect(",")?;
            }
        }
        self.expect("]")?;
        Ok(())
    }

    fn parse_object_literal(&mut self) -> PResult<()> {
        self.bump();
        while !self.is("}") {
            if self.eat("...") {
                self.parse_assign(false)?;
            } else {
                self.parse_object_member()?;
            }
            if !self.is("}") {
                self.expect(",")?;
            }
        }
        self.expect("}")?;
        Ok(())
    }

    fn parse_object_member(&mut self) -> PResult<()> {
        let next = self.tok_at(1);
        if (self.is("get") || self.is("set")) && self.is_key_start(next) {
            self.bump();
            self.parse_property_key()?;
            return self.parse_method_rest();
        }
        if self.is("async")
            && !next.newline_before
            && (self.is_key_start(next) || self.text_of(next) == "*")
        {
            self.bump();
            self.eat("*");
            self.parse_property_key()?;
            return self.parse_method_rest();
        }
        if self.eat("*") {
            self.parse_property_key()?;
            return self.parse_method_rest();
        }

        let key = self.tok();
        self.parse_property_key()?;
        if self.is("(") || self.is("<") {
            return self.parse_method_rest();
        }
        if self.eat(":") {
            return self.parse_assign(false);
        }
        if key.kind != TokenKind::Ident {
            return self.unexpected();
        }
        // shorthand `{ a }` or `{ a = 1 } = value`
        self.syntax.value_refs.insert(self.text_of(key).to_string());
        if self.eat("=") {
            self.parse_assign(false)?;
        }
        Ok(())
    }

    fn parse_property_key(&mut self) -> PResult<()> {
        match self.tok().kind {
            TokenKind::Ident | TokenKind::Str | TokenKind::Number | TokenKind::PrivateName => {
                self.bump();
                Ok(())
            }
            TokenKind::Punct if self.is("[") => {
                self.bump();
                self.parse_assign(false)?;
                self.expect("]")?;
                Ok(())
            }
            _ => self.unexpected(),
        }
    }

    fn parse_method_rest(&mut self) -> PResult<()> {
        if self.is("<") {
            self.erase_type_params()?;
        }
        self.parse_params()?;
        if self.is(":") {
            self.erase_annotation()?;
        }
        self.parse_block()
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    fn parse_import(&mut self) -> PResult<()> {
        let import = self.bump();
        let start = import.start;

        if self.is("type") && self.import_is_type_only() {
            self.bump();
            if self.is("{") {
                self.skip_balanced()?;
            } else if self.eat("*") {
                self.expect("as")?;
                self.binding_name()?;
            } else {
                self.binding_name()?;
            }
            self.expect("from")?;
            self.string_value()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            self.erase(start, self.prev_end());
            return Ok(());
        }

        if self.is_kind(TokenKind::Str) {
            let specifier = self.string_value()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            self.syntax.imports.push(ImportDecl {
                start,
                end: self.prev_end(),
                line: import.line,
                specifier,
                clause: ImportClause::SideEffect,
            });
            return Ok(());
        }

        if self.is_kind(TokenKind::Ident) && self.is_at(1, "=") {
            return self.error("'import x = require()' is not supported; use an ES import");
        }

        let mut bindings = ImportBindings::default();
        let mut more = true;
        if self.is_kind(TokenKind::Ident) {
            bindings.default = Some(self.binding_name()?);
            more = self.eat(",");
        }
        if more {
            if self.eat("*") {
                self.expect("as")?;
                bindings.namespace = Some(self.binding_name()?);
            } else if self.eat("{") {
                while !self.is("}") {
                    if self.is_inline_type_modifier() {
                        self.bump();
                        self.module_export_name()?;
                        if self.eat("as") {
                            self.binding_name()?;
                        }
                        bindings.type_only_specifiers = true;
                    } else {
                        let imported = self.module_export_name()?;
                        let local = if self.eat("as") {
                            self.binding_name()?
                        } else {
                            imported.clone()
                        };
                        bindings.named.push((imported, local));
                    }
                    if !self.is("}") {
                        self.expect(",")?;
                    }
                }
                self.expect("}")?;
            } else {
                return self.unexpected();
            }
        }

        self.expect("from")?;
        let specifier = self.string_value()?;
        self.skip_import_attributes()?;
        self.consume_semicolon()?;
        self.syntax.imports.push(ImportDecl {
            start,
            end: self.prev_end(),
            line: import.line,
            specifier,
            clause: ImportClause::Bindings(bindings),
        });
        Ok(())
    }

    /// At `type` after `import`: is this `import type ...`?
    fn import_is_type_only(&self) -> bool {
        let next = self.tok_at(1);
        match self.text_of(next) {
            "{" | "*" => true,
            // `import type from "x"` imports a default named `type`
            "from" => self.is_at(2, "from"),
            _ => next.kind == TokenKind::Ident,
        }
    }

    /// At `type` inside `{ ... }`: is it a modifier rather than a name?
    fn is_inline_type_modifier(&self) -> bool {
        if !self.is("type") {
            return false;
        }
        let next = self.tok_at(1);
        if !matches!(next.kind, TokenKind::Ident | TokenKind::Str) {
            return false;
        }
        if self.text_of(next) != "as" {
            return true;
        }
        // `type as as x` and `type as` name a type; `type as x` renames `type`.
        self.is_at(2, "as") || self.is_at(2, ",") || self.is_at(2, "}")
    }

    fn skip_import_attributes(&mut self) -> PResult<()> {
        if (self.is("with") || self.is("assert"))
            && self.is_at(1, "{")
            && !self.tok().newline_before
        {
            self.bump();
            self.skip_balanced()?;
        }
        Ok(())
    }

    fn parse_export(&mut self) -> PResult<()> {
        let export = self.bump();
        let start = export.start;
        let next_text = self.text_of(self.tok_at(1));

        match self.text() {
            "default" => return self.parse_export_default(export),
            "type" if matches!(next_text, "{" | "*") => {
                self.bump();
                if self.is("{") {
                    self.skip_balanced()?;
                } else {
                    self.bump();
                    if self.eat("as") {
                        self.module_export_name()?;
                    }
                }
                if self.eat("from") {
                    self.string_value()?;
                    self.skip_import_attributes()?;
                }
                self.consume_semicolon()?;
                self.erase(start, self.prev_end());
                return Ok(());
            }
            "interface" => return self.erase_interface(start),
            "type" => return self.erase_type_alias(start),
            "declare" => return self.erase_declare(start),
            "enum" => return self.error(ENUMS),
            "const" if next_text == "enum" => return self.error(ENUMS),
            "namespace" | "module" => return self.error(NAMESPACES),
            "import" => return self.error("'export import' aliases are not supported"),
            "=" => return self.error("'export =' is not supported; use named exports"),
            "as" => {
                // export as namespace X;
                self.bump();
                self.expect("namespace")?;
                self.binding_name()?;
                self.consume_semicolon()?;
                self.erase(start, self.prev_end());
                return Ok(());
            }
            "*" => {
                self.bump();
                let namespace = if self.eat("as") {
                    Some(self.module_export_name()?)
                } else {
                    None
                };
                self.expect("from")?;
                let specifier = self.string_value()?;
                self.skip_import_attributes()?;
                self.consume_semicolon()?;
                self.syntax.reexports.push(ReexportDecl {
                    start,
                    end: self.prev_end(),
                    line: export.line,
                    specifier,
                    kind: Reexport::All { namespace },
                });
                return Ok(());
            }
            "{" => return self.parse_export_list(export),
            _ => {}
        }

        if self.is("function") || (self.is("async") && self.is_at(1, "function")) {
            match self.parse_function(Form::Declaration, start)? {
                Declared::Body(Some(name)) => {
                    self.erase(start, export.end);
                    self.record_export(&name, &name);
                }
                Declared::Body(None) => {
                    return self.error("exported function declarations need a name");
                }
                Declared::Signature => {}
            }
            return Ok(());
        }
        if self.is("abstract") && self.is_at(1, "class") {
            self.erase_current();
        }
        if self.is("class") {
            self.erase(start, export.end);
            let Some(name) = self.parse_class()? else {
                return self.error("exported class declarations need a name");
            };
            self.record_export(&name, &name);
            return Ok(());
        }
        if matches!(self.text(), "var" | "let" | "const") {
            self.erase(start, export.end);
            let mut names = Vec::new();
            self.parse_var_statement(&mut names)?;
            for name in names {
                self.record_export(&name, &name);
            }
            return Ok(());
        }
        self.unexpected()
    }

    fn parse_export_default(&mut self, export: Token) -> PResult<()> {
        let start = export.start;
        let keyword_end = self.bump().end;

        let is_function = self.is("function") || (self.is("async") && self.is_at(1, "function"));
        let is_class = self.is("class") || (self.is("abstract") && self.is_at(1, "class"));

        if is_function {
            let mut name_at = self.pos + if self.is("async") { 2 } else { 1 };
            if self.text_at_index(name_at) == "*" {
                name_at += 1;
            }
            if self.tokens[name_at.min(self.tokens.len() - 1)].kind == TokenKind::Ident {
                if let Declared::Body(Some(name)) =
                    self.parse_function(Form::Declaration, start)?
                {
                    self.erase(start, keyword_end);
                    self.record_export("default", &name);
                }
            } else {
                self.syntax
                    .edits
                    .push(Edit::replace(start, keyword_end, "exports.default ="));
                self.parse_function(Form::Expression, start)?;
                self.syntax.edits.push(Edit::insert(self.prev_end(), ";"));
            }
            return Ok(());
        }

        if is_class {
            if self.is("abstract") {
                self.erase_current();
            }
            let named = self.tok_at(1).kind == TokenKind::Ident
                && !self.is_at(1, "extends")
                && !self.is_at(1, "implements");
            if named {
                self.erase(start, keyword_end);
                if let Some(name) = self.parse_class()? {
                    self.record_export("default", &name);
                }
            } else {
                self.syntax
                    .edits
                    .push(Edit::replace(start, keyword_end, "exports.default ="));
                self.parse_class()?;
                self.syntax.edits.push(Edit::insert(self.prev_end(), ";"));
            }
            return Ok(());
        }

        if self.is("interface") {
            return self.erase_interface(start);
        }

        self.syntax
            .edits
            .push(Edit::replace(start, keyword_end, "exports.default ="));
        self.parse_assign(false)?;
        self.consume_semicolon()
    }

    fn parse_export_list(&mut self, export: Token) -> PResult<()> {
        let start = export.start;
        self.expect("{")?;
        let mut names = Vec::new();
        while !self.is("}") {
            if self.is_inline_type_modifier() {
                self.bump();
                self.module_export_name()?;
                if self.eat("as") {
                    self.module_export_name()?;
                }
            } else {
                let local = self.module_export_name()?;
                let exported = if self.eat("as") {
                    self.module_export_name()?
                } else {
                    local.clone()
                };
                names.push((local, exported));
            }
            if !self.is("}") {
                self.expect(",")?;
            }
        }
        self.expect("}")?;

        if self.eat("from") {
            let specifier = self.string_value()?;
            self.skip_import_attributes()?;
            self.consume_semicolon()?;
            self.syntax.reexports.push(ReexportDecl {
                start,
                end: self.prev_end(),
                line: export.line,
                specifier,
                kind: Reexport::Named(names),
            });
            return Ok(());
        }

        self.consume_semicolon()?;
        self.erase(start, self.prev_end());
        self.local_exports.extend(names);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Declarations that only exist at the type level
    // ------------------------------------------------------------------

    fn erase_interface(&mut self, start: usize) -> PResult<()> {
        self.expect("interface")?;
        let name = self.binding_name()?;
        if self.is("<") {
            self.skip_type_params()?;
        }
        if self.eat("extends") {
            loop {
                self.skip_type()?;
                if !self.eat(",") {
                    break;
                }
            }
        }
        if !self.is("{") {
            return self.unexpected();
        }
        self.skip_balanced()?;
        self.erase(start, self.prev_end());
        self.type_names.insert(name);
        Ok(())
    }

    fn erase_type_alias(&mut self, start: usize) -> PResult<()> {
        self.expect("type")?;
        let name = self.binding_name()?;
        if self.is("<") {
            self.skip_type_params()?;
        }
        self.expect("=")?;
        self.skip_type()?;
        self.consume_semicolon()?;
        self.erase(start, self.prev_end());
        self.type_names.insert(name);
        Ok(())
    }

    fn erase_declare(&mut self, start: usize) -> PResult<()> {
        self.expect("declare")?;
        match self.text() {
            "interface" => return self.erase_interface(start),
            "type" => return self.erase_type_alias(start),
            "const" if self.is_at(1, "enum") => {
                self.bump();
                self.bump();
                self.binding_name()?;
                self.skip_balanced()?;
            }
            "enum" => {
                self.bump();
                self.binding_name()?;
                self.skip_balanced()?;
            }
            "const" | "let" | "var" => {
                self.bump();
                loop {
                    if self.is("[") || self.is("{") {
                        self.skip_balanced()?;
                    } else {
                        self.binding_name()?;
                    }
                    if self.eat(":") {
                        self.skip_type()?;
                    }
                    if self.eat("=") {
                        self.parse_assign(false)?;
                    }
                    if !self.eat(",") {
                        break;
                    }
                }
                self.consume_semicolon()?;
            }
            "async" | "function" => {
                self.eat("async");
                self.expect("function")?;
                self.eat("*");
                self.binding_name()?;
                if self.is("<") {
                    self.skip_type_params()?;
                }
                if !self.is("(") {
                    return self.unexpected();
                }
                self.skip_balanced()?;
                if self.eat(":") {
                    self.skip_type()?;
                }
                self.consume_semicolon()?;
            }
            "abstract" | "class" => {
                while !self.is("{") {
                    if self.at_eof() {
                        return self.unexpected();
                    }
                    if self.is("(") || self.is("[") {
                        self.skip_balanced()?;
                    } else if self.is("<") {
                        self.skip_type_args()?;
                    } else {
                        self.bump();
                    }
                }
                self.skip_balanced()?;
            }
            "module" | "namespace" | "global" => {
                self.bump();
                if self.is_kind(TokenKind::Str) {
                    self.bump();
                } else if !self.is("{") {
                    self.binding_name()?;
                    while self.eat(".") {
                        self.binding_name()?;
                    }
                }
                if self.is("{") {
                    self.skip_balanced()?;
                } else {
                    self.consume_semicolon()?;
                }
            }
            _ => return self.unexpected(),
        }
        self.erase(start, self.prev_end());
        Ok(())
    }

    // ------------------------------------------------------------------
    // Types: skipped, never recorded
    // ------------------------------------------------------------------

    fn erase_annotation(&mut self) -> PResult<()> {
        let start = self.expect(":")?.start;
        self.skip_type()?;
        self.erase(start, self.prev_end());
        Ok(())
    }

    fn erase_type_params(&mut self) -> PResult<()> {
        let start = self.tok().start;
        self.skip_type_params()?;
        self.erase(start, self.prev_end());
        Ok(())
    }

    fn erase_type_args(&mut self) -> PResult<()> {
        let start = self.tok().start;
        self.skip_type_args()?;
        self.erase(start, self.prev_end());
        Ok(())
    }

    fn skip_type_params(&mut self) -> PResult<()> {
        self.expect("<")?;
        while !self.is(">") {
            while matches!(self.text(), "const" | "in" | "out")
                && self.tok_at(1).kind == TokenKind::Ident
            {
                self.bump();
            }
            if !self.is_kind(TokenKind::Ident) {
                return self.unexpected();
            }
            self.bump();
            if self.eat("extends") {
                self.skip_type()?;
            }
            if self.eat("=") {
                self.skip_type()?;
            }
            if !self.is(">") {
                self.expect(",")?;
            }
        }
        self.expect(">")?;
        Ok(())
    }

    fn skip_type_args(&mut self) -> PResult<()> {
        self.expect("<")?;
        loop {
            self.skip_type()?;
            if !self.eat(",") {
                break;
            }
        }
        self.expect(">")?;
        Ok(())
    }

    fn skip_type(&mut self) -> PResult<()> {
        if self.is("<") {
            self.skip_type_params()?;
            return self.skip_function_type_rest();
        }
        if self.is("new") || (self.is("abstract") && self.is_at(1, "new")) {
            self.eat("abstract");
            self.bump();
            if self.is("<") {
                self.skip_type_params()?;
            }
            return self.skip_function_type_rest();
        }
        if self.is("(") && self.starts_function_type() {
            return self.skip_function_type_rest();
        }
        if self.is("asserts")
            && self.tok_at(1).kind == TokenKind::Ident
            && !self.tok_at(1).newline_before
        {
            self.bump();
            self.bump();
            if self.eat("is") {
                self.skip_type()?;
            }
            return Ok(());
        }

        self.skip_union_type()?;
        if self.is("extends") && !self.tok().newline_before {
            self.bump();
            self.skip_union_type()?;
            self.expect("?")?;
            self.skip_type()?;
            self.expect(":")?;
            self.skip_type()?;
        }
        Ok(())
    }

    fn skip_function_type_rest(&mut self) -> PResult<()> {
        if !self.is("(") {
            return self.unexpected();
        }
        self.skip_balanced()?;
        self.expect("=>")?;
        self.skip_type()
    }

    /// Whether the `(` at the cursor opens a parameter list rather than a
    /// parenthesized type: `()`, `(...`, `(a:`, `(a?`, `(a,`, `(a =` or
    /// `(a) =>`.
    fn starts_function_type(&self) -> bool {
        let open = self.pos;
        let close = self.matching[open];
        if close == NONE {
            return false;
        }
        let first = self.tokens[open + 1];
        let mut next = open + 2;
        match (first.kind, self.text_of(first)) {
            (TokenKind::Punct, ")") => return self.text_at_index(close + 1) == "=>",
            (TokenKind::Punct, "...") => return true,
            (TokenKind::Punct, "[" | "{") => {
                let end = self.matching[open + 1];
                if end == NONE {
                    return false;
                }
                next = end + 1;
            }
            (TokenKind::Ident, _) => {}
            _ => return false,
        }
        match self.text_at_index(next) {
            ":" | "?" | "," | "=" => true,
            ")" => next == close && self.text_at_index(close + 1) == "=>",
            _ => false,
        }
    }

    fn skip_union_type(&mut self) -> PResult<()> {
        if self.is("|") || self.is("&") {
            self.bump();
        }
        loop {
            self.skip_type_operator()?;
            if self.is("|") || self.is("&") {
                self.bump();
                continue;
            }
            return Ok(());
        }
    }

    fn starts_type(&self, token: Token) -> bool {
        match token.kind {
            TokenKind::Ident
            | TokenKind::Str
            | TokenKind::Number
            | TokenKind::Template
            | TokenKind::TemplateHead => true,
            TokenKind::Punct => matches!(self.text_of(token), "(" | "[" | "{" | "<" | "-"),
            _ => false,
        }
    }

    fn skip_type_operator(&mut self) -> PResult<()> {
        if matches!(self.text(), "keyof" | "unique" | "readonly")
            && self.is_kind(TokenKind::Ident)
            && self.starts_type(self.tok_at(1))
        {
            self.bump();
            return self.skip_type_operator();
        }
        if self.is("infer") && self.tok_at(1).kind == TokenKind::Ident {
            self.bump();
            self.bump();
            return Ok(());
        }
        self.skip_primary_type()?;
        while self.is("[") && !self.tok().newline_before {
            self.skip_balanced()?;
        }
        Ok(())
    }

    fn skip_primary_type(&mut self) -> PResult<()> {
        let token = self.tok();
        match token.kind {
            TokenKind::Str | TokenKind::Number | TokenKind::Template => {
                self.bump();
                Ok(())
            }
            TokenKind::TemplateHead => {
                self.bump();
                loop {
                    self.skip_type()?;
                    match self.tok().kind {
                        TokenKind::TemplateMiddle => {
                            self.bump();
                        }
                        TokenKind::TemplateTail => {
                            self.bump();
                            return Ok(());
                        }
                        _ => return self.unexpected(),
                    }
                }
            }
            TokenKind::Punct => match self.text() {
                "(" => {
                    self.bump();
                    self.skip_type()?;
                    self.expect(")")?;
                    Ok(())
                }
                "[" | "{" => self.skip_balanced(),
                "-" => {
                    self.bump();
                    if self.is_kind(TokenKind::Number) {
                        self.bump();
                        Ok(())
                    } else {
                        self.unexpected()
                    }
                }
                _ => self.unexpected(),
            },
            TokenKind::Ident => {
                match self.text() {
                    "typeof" => {
                        self.bump();
                        if self.is("import") {
                            self.bump();
                            if !self.is("(") {
                                return self.unexpected();
                            }
                            self.skip_balanced()?;
                        } else {
                            self.expect_member_name()?;
                        }
                    }
                    "import" => {
                        self.bump();
                        if !self.is("(") {
                            return self.unexpected();
                        }
                        self.skip_balanced()?;
                    }
                    word if RESERVED.contains(&word) || NOT_A_TYPE.contains(&word) => {
                        return self.unexpected();
                    }
                    _ => {
                        self.bump();
                    }
                }
                while self.is(".")
                    && matches!(
                        self.tok_at(1).kind,
                        TokenKind::Ident | TokenKind::PrivateName
                    )
                {
                    self.bump();
                    self.bump();
                }
                if self.is("<") && !self.tok().newline_before {
                    self.skip_type_args()?;
                }
                // type predicate `value is T`
                if self.is("is") && !self.tok().newline_before {
                    self.bump();
                    self.skip_type()?;
                }
                Ok(())
            }
            _ => self.unexpected(),
        }
    }
}
