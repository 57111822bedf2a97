//! Recursive-descent parser for the supported C# subset.
//!
//! Declarations are parsed fully. Statement bodies are parsed structurally,
//! with expressions kept as balanced token runs for the binder to scan.

use crate::constants::MAX_SYNTAX_DEPTH;
use crate::core::domain::{CompilationError, Location};
use crate::csharp::lexer::{Token, TokenKind};
use crate::csharp::syntax::*;
use crate::metadata::TypeKind;

pub const PREDEFINED_TYPES: &[&str] = &[
    "bool", "byte", "sbyte", "char", "decimal", "double", "float", "int", "uint", "long",
    "ulong", "short", "ushort", "object", "string", "void",
];

const MODIFIER_KEYWORDS: &[&str] = &[
    "public", "private", "protected", "internal", "static", "abstract", "sealed", "virtual",
    "override", "readonly", "extern", "unsafe", "volatile", "new", "const",
];

const CONTEXTUAL_MODIFIERS: &[&str] = &["partial", "async", "required", "file"];

const PARAM_MODIFIERS: &[&str] = &["ref", "out", "in", "params", "this", "readonly"];

/// Tokens that may follow a generic argument list in an expression.
pub const GENERIC_FOLLOW: &[&str] = &[
    "(", ")", "]", "}", ":", ";", ",", ".", "?.", "?", "==", "!=", "[", "=>", "{",
];

pub struct Parser<'a> {
    file: &'a str,
    tokens: &'a [Token],
    pos: usize,
    eof: Token,
    depth: usize,
    too_deep: bool,
    diagnostics: Vec<CompilationError>,
}

/// Parses one source file. `tokens` must end with an `Eof` token.
pub fn parse(file: &str, tokens: &[Token]) -> (CompilationUnit, Vec<CompilationError>) {
    let mut parser = Parser::new(file, tokens);
    let unit = parser.compilation_unit();
    (unit, parser.diagnostics)
}

/// Speculatively parses a type at the start of `tokens`, returning it with
/// the number of tokens it spans.
pub fn parse_type_prefix(tokens: &[Token]) -> Option<(TypeSyntax, usize)> {
    let mut parser = Parser::new("", tokens);
    let ty = parser.parse_type()?;
    Some((ty, parser.pos))
}

/// Speculatively parses a type argument list (`<...>`) at the start of `tokens`.
pub fn parse_type_args_prefix(tokens: &[Token]) -> Option<(Vec<Option<TypeSyntax>>, usize)> {
    if !tokens.first().is_some_and(|t| t.is_punct("<")) {
        return None;
    }
    let mut parser = Parser::new("", tokens);
    let args = parser.type_args()?;
    Some((args, parser.pos))
}

impl<'a> Parser<'a> {
    /// `tokens` need not end with `Eof`: reading past the end yields one.
    pub fn new(file: &'a str, tokens: &'a [Token]) -> Self {
        let (line, column) = tokens.last().map(Token::end).unwrap_or((1, 1));
        Parser {
            file,
            tokens,
            pos: 0,
            eof: Token::eof(line, column),
            depth: 0,
            too_deep: false,
            diagnostics: Vec::new(),
        }
    }

    // ---- cursor ----

    fn nth(&self, n: usize) -> &Token {
        self.tokens.get(self.pos + n).unwrap_or(&self.eof)
    }

    fn peek(&self) -> &Token {
        self.nth(0)
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if !token.is_eof() {
            self.pos += 1;
        }
        token
    }

    fn at(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn at_keyword(&self, k: &str) -> bool {
        self.peek().is_keyword(k)
    }

    fn eat(&mut self, p: &str) -> bool {
        if self.at(p) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn at_eof(&self) -> bool {
        self.peek().is_eof()
    }

    // ---- diagnostics ----

    fn error_at(&mut self, id: &str, message: String, line: u32, column: u32) {
        self.diagnostics
            .push(CompilationError::error(id, message).at(Location::new(self.file, line, column)));
    }

    fn error_here(&mut self, id: &str, message: String) {
        let (line, column) = (self.peek().line, self.peek().column);
        self.error_at(id, message, line, column);
    }

    /// Missing tokens are reported just past the previous token.
    fn error_after_prev(&mut self, id: &str, message: String) {
        let (line, column) = match self.pos.checked_sub(1) {
            Some(prev) => self.tokens[prev].end(),
            None => (self.peek().line, self.peek().column),
        };
        self.error_at(id, message, line, column);
    }

    fn expect(&mut self, p: &str) -> bool {
        if self.eat(p) {
            return true;
        }
        let (id, message) = missing_token(p);
        self.error_after_prev(id, message);
        false
    }

    fn expect_ident(&mut self) -> Ident {
        if self.peek().is_ident() {
            return Ident::from(&self.bump());
        }
        self.error_here("CS1001", "Identifier expected".to_string());
        Ident {
            text: String::new(),
            pos: self.peek().into(),
        }
    }

    // ---- skipping ----

    fn skip_balanced(&mut self, open: &str, close: &str) {
        let mut depth = 0usize;
        while !self.at_eof() {
            let token = self.bump();
            if token.is_punct(open) {
                depth += 1;
            } else if token.is_punct(close) {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return;
                }
            }
        }
    }

    /// Skips a malformed member up to and including its `;` or closing brace.
    fn skip_member(&mut self) {
        let mut depth = 0usize;
        while !self.at_eof() {
            if self.at(";") && depth == 0 {
                self.bump();
                return;
            }
            if self.at("{") {
                depth += 1;
            } else if self.at("}") {
                if depth == 0 {
                    return;
                }
                depth -= 1;
                self.bump();
                if depth == 0 {
                    return;
                }
                continue;
            }
            self.bump();
        }
    }

    fn skip_constraints(&mut self) {
        while self.peek().is_contextual("where") {
            self.bump();
            let mut depth = 0usize;
            while !self.at_eof() {
                if depth == 0
                    && (self.at("{") || self.at(";") || self.at("=>") || self.peek().is_contextual("where"))
                {
                    break;
                }
                let token = self.bump();
                if token.is_punct("(") {
                    depth += 1;
                } else if token.is_punct(")") {
                    depth = depth.saturating_sub(1);
                }
            }
        }
    }

    fn skip_attributes(&mut self) {
        while self.at("[") {
            self.skip_balanced("[", "]");
        }
    }

    // ---- nesting ----

    fn report_too_deep(&mut self) {
        if !self.too_deep {
            self.too_deep = true;
            self.error_here("CS8078", "An expression is too long or complex to compile".to_string());
        }
    }

    /// Runs `parse` one nesting level down. Past `MAX_SYNTAX_DEPTH` the construct
    /// is skipped without descending into it.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> T) -> Option<T> {
        if self.depth >= MAX_SYNTAX_DEPTH {
            self.report_too_deep();
            let start = self.pos;
            self.skip_member();
            if self.pos == start {
                self.bump();
            }
            return None;
        }
        self.depth += 1;
        let parsed = parse(self);
        self.depth -= 1;
        Some(parsed)
    }

    // ---- compilation unit & namespaces ----

    fn compilation_unit(&mut self) -> CompilationUnit {
        let usings = self.usings();
        let members = self.namespace_body(false);
        CompilationUnit {
            file: self.file.to_string(),
            usings,
            members,
        }
    }

    fn usings(&mut self) -> Vec<UsingDirective> {
        let mut usings = Vec::new();
        loop {
            let global = self.peek().is_contextual("global") && self.nth(1).is_keyword("using");
            if !(global || self.at_keyword("using")) {
                break;
            }
            if global {
                self.bump();
            }
            let pos = Pos::from(&self.bump());

            let kind = if self.at_keyword("static") {
                self.bump();
                UsingKind::Static
            } else if self.peek().is_ident() && self.nth(1).is_punct("=") {
                let alias = Ident::from(&self.bump());
                self.bump();
                UsingKind::Alias(alias)
            } else {
                UsingKind::Namespace
            };

            match self.parse_type() {
                Some(target) => {
                    usings.push(UsingDirective { kind, target, pos });
                    self.expect(";");
                }
                None => {
                    self.error_here("CS1001", "Identifier expected".to_string());
                    self.skip_member();
                }
            }
        }
        usings
    }

    fn namespace_body(&mut self, braced: bool) -> Vec<NamespaceMember> {
        let mut members = Vec::new();
        loop {
            if self.at_eof() {
                if braced {
                    self.error_after_prev("CS1513", "} expected".to_string());
                }
                break;
            }
            if braced && self.eat("}") {
                break;
            }
            if self.at_keyword("namespace") {
                if let Some(namespace) = self.nested(Self::namespace_decl) {
                    members.push(NamespaceMember::Namespace(namespace));
                }
                continue;
            }
            if self.at_keyword("using") {
                self.error_here(
                    "CS1529",
                    "A using clause must precede all other elements defined in the namespace except extern alias declarations"
                        .to_string(),
                );
                self.usings();
                continue;
            }
            if self.at("}") {
                self.error_here(
                    "CS1022",
                    "Type or namespace definition, or end-of-file expected".to_string(),
                );
                self.bump();
                continue;
            }

            let modifiers = self.modifiers();
            if self.at_type_keyword() {
                if let Some(decl) = self.nested(|p| p.type_decl(modifiers)) {
                    members.push(NamespaceMember::Type(decl));
                }
                continue;
            }

            self.error_here(
                "CS0116",
                "A namespace cannot directly contain members such as fields, methods or statements"
                    .to_string(),
            );
            let start = self.pos;
            self.skip_member();
            if self.pos == start {
                self.bump();
            }
        }
        members
    }

    fn namespace_decl(&mut self) -> NamespaceDecl {
        self.bump();
        let name = self.dotted_name();
        if name.is_empty() {
            self.error_here("CS1001", "Identifier expected".to_string());
        }

        if self.eat(";") {
            let usings = self.usings();
            let members = self.namespace_body(false);
            return NamespaceDecl {
                name,
                usings,
                members,
            };
        }
        if !self.expect("{") {
            return NamespaceDecl {
                name,
                usings: Vec::new(),
                members: Vec::new(),
            };
        }
        let usings = self.usings();
        let members = self.namespace_body(true);
        NamespaceDecl {
            name,
            usings,
            members,
        }
    }

    fn dotted_name(&mut self) -> Vec<Ident> {
        let mut parts = Vec::new();
        while self.peek().is_ident() {
            parts.push(Ident::from(&self.bump()));
            if self.at(".") && self.nth(1).is_ident() {
                self.bump();
            } else {
                break;
            }
        }
        parts
    }

    // ---- types ----

    fn modifiers(&mut self) -> Vec<String> {
        let mut modifiers = Vec::new();
        loop {
            self.skip_attributes();
            let token = self.peek();
            let is_modifier = (token.kind == TokenKind::Keyword
                && MODIFIER_KEYWORDS.contains(&token.text.as_str()))
                || (token.kind == TokenKind::Ident
                    && CONTEXTUAL_MODIFIERS.contains(&token.text.as_str())
                    && (self.nth(1).kind == TokenKind::Keyword || self.nth(1).is_ident()));
            if !is_modifier {
                break;
            }
            modifiers.push(self.bump().text);
        }
        modifiers
    }

    fn at_type_keyword(&self) -> bool {
        let token = self.peek();
        if token.kind == TokenKind::Keyword {
            return matches!(
                token.text.as_str(),
                "class" | "struct" | "interface" | "enum" | "delegate"
            );
        }
        token.is_contextual("record")
            && (self.nth(1).is_ident() || self.nth(1).is_keyword("class") || self.nth(1).is_keyword("struct"))
    }

    fn type_decl(&mut self, mut modifiers: Vec<String>) -> TypeDecl {
        let keyword = self.bump();
        if keyword.is_keyword("delegate") {
            return self.delegate_decl(modifiers);
        }

        let is_record = keyword.is_contextual("record");
        let kind = match keyword.text.as_str() {
            "struct" => TypeKind::Struct,
            "interface" => TypeKind::Interface,
            "enum" => TypeKind::Enum,
            _ if is_record && self.at_keyword("struct") => {
                self.bump();
                TypeKind::Struct
            }
            _ => {
                if is_record && self.at_keyword("class") {
                    self.bump();
                }
                TypeKind::Class
            }
        };
        if is_record {
            modifiers.push("record".to_string());
        }

        let name = self.expect_ident();
        let type_params = if self.at("<") {
            self.type_params()
        } else {
            Vec::new()
        };

        let mut members = Vec::new();
        if is_record && self.at("(") {
            let params = self.params("(", ")");
            for param in &params {
                let mut property = Member::new(MemberKindSyntax::Property, param.name.clone());
                property.modifiers.push("public".to_string());
                property.ty = Some(param.ty.clone());
                members.push(MemberDecl::Member(property));
            }
            let mut ctor = Member::new(MemberKindSyntax::Constructor, name.clone());
            ctor.modifiers.push("public".to_string());
            ctor.params = params;
            members.push(MemberDecl::Member(ctor));
        }

        let mut bases = Vec::new();
        if self.eat(":") {
            loop {
                match self.parse_type() {
                    Some(base) => bases.push(base),
                    None => {
                        self.error_here("CS1031", "Type expected".to_string());
                        break;
                    }
                }
                if self.at("(") {
                    self.skip_balanced("(", ")");
                }
                if !self.eat(",") {
                    break;
                }
            }
        }
        self.skip_constraints();

        if is_record && self.eat(";") {
            // positional record without a body
        } else if self.at("{") {
            self.bump();
            if kind == TypeKind::Enum {
                members.extend(self.enum_body());
            } else {
                members.extend(self.class_body(&name.text));
            }
        } else {
            self.expect("{");
        }

        TypeDecl {
            kind,
            name,
            modifiers,
            type_params,
            bases,
            members,
        }
    }

    fn delegate_decl(&mut self, mut modifiers: Vec<String>) -> TypeDecl {
        modifiers.push("delegate".to_string());
        let return_type = self.parse_type();
        if return_type.is_none() {
            self.error_here("CS1031", "Type expected".to_string());
        }
        let name = self.expect_ident();
        let type_params = if self.at("<") {
            self.type_params()
        } else {
            Vec::new()
        };
        let params = self.params("(", ")");
        self.skip_constraints();
        self.expect(";");

        let mut invoke = Member::new(
            MemberKindSyntax::Method,
            Ident {
                text: "Invoke".to_string(),
                pos: name.pos,
            },
        );
        invoke.modifiers.push("public".to_string());
        invoke.ty = return_type;
        invoke.params = params;

        TypeDecl {
            kind: TypeKind::Class,
            name,
            modifiers,
            type_params,
            bases: Vec::new(),
            members: vec![MemberDecl::Member(invoke)],
        }
    }

    fn type_params(&mut self) -> Vec<Ident> {
        self.bump();
        let mut params = Vec::new();
        loop {
            self.skip_attributes();
            if self.at_keyword("in") || self.peek().is_contextual("out") || self.at_keyword("out") {
                self.bump();
            }
            params.push(self.expect_ident());
            if self.eat(",") {
                continue;
            }
            self.expect(">");
            break;
        }
        params
    }

    fn enum_body(&mut self) -> Vec<MemberDecl> {
        let mut members = Vec::new();
        loop {
            if self.at_eof() {
                self.error_after_prev("CS1513", "} expected".to_string());
                break;
            }
            if self.eat("}") {
                break;
            }
            self.skip_attributes();
            if !self.peek().is_ident() {
                self.error_here("CS1001", "Identifier expected".to_string());
                self.bump();
                continue;
            }
            let mut member = Member::new(MemberKindSyntax::EnumMember, Ident::from(&self.bump()));
            member.modifiers.push("public".to_string());
            if self.eat("=") {
                member.initializers.push(self.expr_until(&[",", "}"]));
            }
            members.push(MemberDecl::Member(member));
            if !self.eat(",") && !self.at("}") && !self.at_eof() {
                self.error_after_prev("CS1003", "Syntax error, ',' expected".to_string());
            }
        }
        members
    }

    fn class_body(&mut self, type_name: &str) -> Vec<MemberDecl> {
        let mut members = Vec::new();
        loop {
            if self.at_eof() {
                self.error_after_prev("CS1513", "} expected".to_string());
                break;
            }
            if self.eat("}") {
                break;
            }
            if self.eat(";") {
                continue;
            }
            let start = self.pos;
            if let Some(member) = self.member(type_name) {
                members.push(member);
            }
            if self.pos == start {
                let text = self.peek().text.clone();
                self.error_here(
                    "CS1519",
                    format!(
                        "Invalid token '{}' in class, record, struct, or interface member declaration",
                        text
                    ),
                );
                self.bump();
            }
        }
        members
    }

    fn member(&mut self, type_name: &str) -> Option<MemberDecl> {
        let modifiers = self.modifiers();
        if self.at_type_keyword() {
            return self.nested(|p| p.type_decl(modifiers)).map(MemberDecl::Nested);
        }

        let token = self.peek().clone();

        if token.is_punct("~") {
            self.bump();
            let ident = self.expect_ident();
            let mut member = Member::new(
                MemberKindSyntax::Destructor,
                Ident {
                    text: "Finalize".to_string(),
                    pos: ident.pos,
                },
            );
            member.modifiers = modifiers;
            member.params = self.params("(", ")");
            member.bodies.extend(self.method_body());
            return Some(MemberDecl::Member(member));
        }

        if token.is_ident() && token.text == type_name && self.nth(1).is_punct("(") {
            self.bump();
            let mut member = Member::new(MemberKindSyntax::Constructor, Ident::from(&token));
            member.modifiers = modifiers;
            member.params = self.params("(", ")");
            if self.eat(":") {
                member.initializers.push(self.expr_until(&["{", "=>", ";"]));
            }
            member.bodies.extend(self.method_body());
            return Some(MemberDecl::Member(member));
        }

        if token.is_keyword("event") {
            self.bump();
            let Some(ty) = self.parse_type() else {
                self.error_here("CS1031", "Type expected".to_string());
                self.skip_member();
                return None;
            };
            let first = self.expect_ident();
            let mut member = Member::new(MemberKindSyntax::Event, first.clone());
            member.modifiers = modifiers;
            member.ty = Some(ty);
            member.declarators.push(Declarator {
                name: first,
                init: None,
            });
            while self.eat(",") {
                let name = self.expect_ident();
                member.declarators.push(Declarator { name, init: None });
            }
            if self.at("{") {
                member.bodies.extend(self.accessors());
            } else {
                self.expect(";");
            }
            return Some(MemberDecl::Member(member));
        }

        if token.is_keyword("implicit") || token.is_keyword("explicit") {
            self.bump();
            if !self.at_keyword("operator") {
                self.error_here("CS1003", "Syntax error, 'operator' expected".to_string());
                self.skip_member();
                return None;
            }
            self.bump();
            let ty = self.parse_type();
            let name = format!("op_{}", if token.text == "implicit" { "Implicit" } else { "Explicit" });
            let mut member = Member::new(
                MemberKindSyntax::Operator,
                Ident {
                    text: name,
                    pos: (&token).into(),
                },
            );
            member.modifiers = modifiers;
            member.ty = ty;
            member.params = self.params("(", ")");
            member.bodies.extend(self.method_body());
            return Some(MemberDecl::Member(member));
        }

        let Some(ty) = self.parse_type() else {
            if !modifiers.is_empty() {
                let text = self.peek().text.clone();
                self.error_here(
                    "CS1519",
                    format!(
                        "Invalid token '{}' in class, record, struct, or interface member declaration",
                        text
                    ),
                );
                self.bump();
            }
            return None;
        };

        if self.at_keyword("operator") {
            let op_token = self.bump();
            let op = self.bump();
            let mut member = Member::new(
                MemberKindSyntax::Operator,
                Ident {
                    text: format!("op_{}", op.text),
                    pos: (&op_token).into(),
                },
            );
            member.modifiers = modifiers;
            member.ty = Some(ty);
            member.params = self.params("(", ")");
            member.bodies.extend(self.method_body());
            return Some(MemberDecl::Member(member));
        }

        if self.at_keyword("this") && self.nth(1).is_punct("[") {
            let this = self.bump();
            let mut member = Member::new(
                MemberKindSyntax::Indexer,
                Ident {
                    text: "Item".to_string(),
                    pos: (&this).into(),
                },
            );
            member.modifiers = modifiers;
            member.ty = Some(ty);
            member.params = self.params("[", "]");
            if self.eat("=>") {
                member.bodies.push(Body::Expr(self.expr_until(&[";"])));
                self.expect(";");
            } else {
                member.bodies.extend(self.accessors());
            }
            return Some(MemberDecl::Member(member));
        }

        if !self.peek().is_ident() {
            self.error_here("CS1001", "Identifier expected".to_string());
            self.skip_member();
            return None;
        }

        let mut name = Ident::from(&self.bump());
        // Explicit interface implementations: `IFoo.Bar`.
        while self.at(".") && self.nth(1).is_ident() {
            self.bump();
            name = Ident::from(&self.bump());
        }

        if self.at("(") || self.at("<") {
            let mut member = Member::new(MemberKindSyntax::Method, name);
            member.modifiers = modifiers;
            member.ty = Some(ty);
            if self.at("<") {
                member.type_params = self.type_params();
            }
            member.params = self.params("(", ")");
            self.skip_constraints();
            member.bodies.extend(self.method_body());
            return Some(MemberDecl::Member(member));
        }

        if self.at("{") {
            let mut member = Member::new(MemberKindSyntax::Property, name);
            member.modifiers = modifiers;
            member.ty = Some(ty);
            member.bodies.extend(self.accessors());
            if self.eat("=") {
                member.initializers.push(self.expr_until(&[";"]));
                self.expect(";");
            }
            return Some(MemberDecl::Member(member));
        }

        if self.eat("=>") {
            let mut member = Member::new(MemberKindSyntax::Property, name);
            member.modifiers = modifiers;
            member.ty = Some(ty);
            member.bodies.push(Body::Expr(self.expr_until(&[";"])));
            self.expect(";");
            return Some(MemberDecl::Member(member));
        }

        let kind = if modifiers.iter().any(|m| m == "const") {
            MemberKindSyntax::Const
        } else {
            MemberKindSyntax::Field
        };
        let mut member = Member::new(kind, name.clone());
        member.modifiers = modifiers;
        member.ty = Some(ty);
        let mut declarator = Declarator { name, init: None };
        loop {
            if self.eat("=") {
                declarator.init = Some(self.expr_until(&[",", ";"]));
            }
            member.declarators.push(declarator);
            if !self.eat(",") {
                break;
            }
            declarator = Declarator {
                name: self.expect_ident(),
                init: None,
            };
        }
        self.expect(";");
        Some(MemberDecl::Member(member))
    }

    fn method_body(&mut self) -> Option<Body> {
        if self.at("{") {
            return Some(Body::Block(self.block()));
        }
        if self.eat("=>") {
            let expr = self.expr_until(&[";"]);
            self.expect(";");
            return Some(Body::Expr(expr));
        }
        self.expect(";");
        None
    }

    fn accessors(&mut self) -> Vec<Body> {
        let mut bodies = Vec::new();
        if !self.expect("{") {
            return bodies;
        }
        loop {
            if self.at_eof() {
                self.error_after_prev("CS1513", "} expected".to_string());
                break;
            }
            if self.eat("}") {
                break;
            }
            self.modifiers();
            let accessor = self.peek();
            let known = accessor.is_ident()
                && matches!(accessor.text.as_str(), "get" | "set" | "init" | "add" | "remove");
            if !known {
                self.error_here("CS1014", "A get or set accessor expected".to_string());
                self.bump();
                continue;
            }
            self.bump();
            if self.at("{") {
                bodies.push(Body::Block(self.block()));
            } else if self.eat("=>") {
                bodies.push(Body::Expr(self.expr_until(&[";"])));
                self.expect(";");
            } else {
                self.expect(";");
            }
        }
        bodies
    }

    fn params(&mut self, open: &str, close: &str) -> Vec<Param> {
        let mut params = Vec::new();
        if !self.expect(open) {
            return params;
        }
        if self.eat(close) {
            return params;
        }
        loop {
            if self.at_eof() {
                self.expect(close);
                break;
            }
            self.skip_attributes();
            while (self.peek().kind == TokenKind::Keyword || self.peek().is_contextual("scoped"))
                && (PARAM_MODIFIERS.contains(&self.peek().text.as_str()) || self.peek().is_contextual("scoped"))
            {
                self.bump();
            }
            match self.parse_type() {
                Some(ty) => {
                    let name = self.expect_ident();
                    let default = if self.eat("=") {
                        Some(self.expr_until(&[",", close]))
                    } else {
                        None
                    };
                    params.push(Param { ty, name, default });
                }
                None => {
                    self.error_here("CS1031", "Type expected".to_string());
                    while !self.at_eof() && !self.at(",") && !self.at(close) && !self.at("{") && !self.at(";") {
                        self.bump();
                    }
                }
            }
            if self.eat(",") {
                continue;
            }
            self.expect(close);
            break;
        }
        params
    }

    /// Speculative: returns `None` and leaves the cursor untouched when no type starts here.
    pub fn parse_type(&mut self) -> Option<TypeSyntax> {
        if self.depth >= MAX_SYNTAX_DEPTH {
            self.report_too_deep();
            return None;
        }
        self.depth += 1;
        let ty = self.type_syntax();
        self.depth -= 1;
        ty
    }

    fn type_syntax(&mut self) -> Option<TypeSyntax> {
        let start = self.pos;
        let Some(mut ty) = self.non_array_type() else {
            self.pos = start;
            return None;
        };
        loop {
            if self.at("?") {
                self.bump();
                ty = TypeSyntax::Nullable(Box::new(ty));
            } else if self.at("[") && (self.nth(1).is_punct("]") || self.nth(1).is_punct(",")) {
                let bracket = self.pos;
                self.bump();
                while self.eat(",") {}
                if !self.eat("]") {
                    self.pos = bracket;
                    break;
                }
                ty = TypeSyntax::Array(Box::new(ty));
            } else {
                break;
            }
        }
        Some(ty)
    }

    fn non_array_type(&mut self) -> Option<TypeSyntax> {
        let token = self.peek().clone();
        if token.kind == TokenKind::Keyword && PREDEFINED_TYPES.contains(&token.text.as_str()) {
            self.bump();
            return Some(TypeSyntax::Predefined(Ident::from(&token)));
        }
        if token.is_punct("(") {
            self.bump();
            let mut items = Vec::new();
            loop {
                items.push(self.parse_type()?);
                if self.peek().is_ident() {
                    self.bump();
                }
                if self.eat(",") {
                    continue;
                }
                if self.eat(")") {
                    break;
                }
                return None;
            }
            return (items.len() >= 2).then_some(TypeSyntax::Tuple(items));
        }
        if !token.is_ident() {
            return None;
        }

        if token.text == "global" && self.nth(1).is_punct("::") {
            self.bump();
            self.bump();
        }
        let mut parts = Vec::new();
        loop {
            if !self.peek().is_ident() {
                return None;
            }
            let ident = Ident::from(&self.bump());
            let type_args = if self.at("<") {
                self.type_args().unwrap_or_default()
            } else {
                Vec::new()
            };
            parts.push(NamePart { ident, type_args });
            if (self.at(".") || self.at("::")) && self.nth(1).is_ident() {
                self.bump();
                continue;
            }
            break;
        }
        Some(TypeSyntax::Named(parts))
    }

    fn type_args(&mut self) -> Option<Vec<Option<TypeSyntax>>> {
        let start = self.pos;
        self.bump();
        let mut args = Vec::new();
        loop {
            if self.at(",") || self.at(">") {
                args.push(None);
            } else if let Some(ty) = self.parse_type() {
                args.push(Some(ty));
            } else {
                self.pos = start;
                return None;
            }
            if self.eat(",") {
                continue;
            }
            if self.eat(">") {
                return Some(args);
            }
            self.pos = start;
            return None;
        }
    }

    // ---- statements ----

    fn block(&mut self) -> Block {
        let mut block = Block::default();
        if !self.expect("{") {
            return block;
        }
        loop {
            if self.at_eof() {
                self.error_after_prev("CS1513", "} expected".to_string());
                break;
            }
            if self.eat("}") {
                break;
            }
            self.statement_into(&mut block.statements);
        }
        block
    }

    /// Parses one statement, reporting and skipping a token when nothing parses.
    fn statement_into(&mut self, statements: &mut Vec<Stmt>) {
        let start = self.pos;
        if let Some(statement) = self.statement() {
            statements.push(statement);
        }
        if self.pos == start {
            let text = self.peek().text.clone();
            self.error_here("CS1525", format!("Invalid expression term '{}'", text));
            self.bump();
        }
    }

    fn embedded(&mut self) -> Vec<Stmt> {
        let mut statements = Vec::new();
        if self.at_eof() {
            self.error_after_prev("CS1525", "Invalid expression term ''".to_string());
            return statements;
        }
        self.statement_into(&mut statements);
        statements
    }

    fn statement(&mut self) -> Option<Stmt> {
        self.nested(Self::statement_kind).flatten()
    }

    fn statement_kind(&mut self) -> Option<Stmt> {
        let token = self.peek().clone();
        if token.is_punct("{") {
            return Some(Stmt::Block(self.block()));
        }
        if token.is_punct(";") {
            self.bump();
            return None;
        }

        if token.is_contextual("await") && self.nth(1).is_keyword("foreach") {
            self.bump();
            return Some(self.foreach());
        }
        if token.is_contextual("yield") && (self.nth(1).is_keyword("return") || self.nth(1).is_keyword("break")) {
            self.bump();
            return self.statement();
        }

        if token.kind == TokenKind::Keyword {
            match token.text.as_str() {
                "if" => {
                    let keyword = Ident::from(&self.bump());
                    let mut header = self.paren_header();
                    let mut body = self.embedded();
                    // `else if` chains are kept flat.
                    while self.at_keyword("else") {
                        self.bump();
                        if !self.at_keyword("if") {
                            body.extend(self.embedded());
                            break;
                        }
                        self.bump();
                        header.extend(self.paren_header());
                        body.extend(self.embedded());
                    }
                    return Some(Stmt::Compound { keyword, header, body });
                }
                "while" | "lock" | "fixed" => {
                    let keyword = Ident::from(&self.bump());
                    let header = self.paren_header();
                    let body = self.embedded();
                    return Some(Stmt::Compound { keyword, header, body });
                }
                "using" if self.nth(1).is_punct("(") => {
                    let keyword = Ident::from(&self.bump());
                    let header = self.resource_header();
                    let body = self.embedded();
                    return Some(Stmt::Compound { keyword, header, body });
                }
                "using" | "const" => {
                    self.bump();
                    return self.local_or_expression();
                }
                "for" => {
                    let keyword = Ident::from(&self.bump());
                    let header = self.for_header();
                    let body = self.embedded();
                    return Some(Stmt::Compound { keyword, header, body });
                }
                "foreach" => return Some(self.foreach()),
                "do" => {
                    let keyword = Ident::from(&self.bump());
                    let body = self.embedded();
                    let mut header = Vec::new();
                    if self.at_keyword("while") {
                        self.bump();
                        header = self.paren_header();
                        self.expect(";");
                    } else {
                        self.error_here("CS1003", "Syntax error, 'while' expected".to_string());
                    }
                    return Some(Stmt::Compound { keyword, header, body });
                }
                "switch" => {
                    self.bump();
                    let subject = match self.paren_header().pop() {
                        Some(Stmt::Expr(expr)) => expr,
                        _ => Expr::default(),
                    };
                    let sections = self.switch_body();
                    return Some(Stmt::Switch { subject, sections });
                }
                "try" => return Some(self.try_statement()),
                "return" | "throw" => {
                    self.bump();
                    let expr = self.expr_until(&[";"]);
                    self.expect(";");
                    return Some(Stmt::Expr(expr));
                }
                "break" | "continue" => {
                    self.bump();
                    self.expect(";");
                    return None;
                }
                "goto" => {
                    self.bump();
                    self.expr_until(&[";"]);
                    self.expect(";");
                    return None;
                }
                "checked" | "unchecked" | "unsafe" if self.nth(1).is_punct("{") => {
                    let keyword = Ident::from(&self.bump());
                    let body = vec![Stmt::Block(self.block())];
                    return Some(Stmt::Compound {
                        keyword,
                        header: Vec::new(),
                        body,
                    });
                }
                _ => {}
            }
        }

        self.local_or_expression()
    }

    fn local_or_expression(&mut self) -> Option<Stmt> {
        if self.peek().is_ident() && self.nth(1).is_punct(":") {
            // label
            self.bump();
            self.bump();
            return self.statement();
        }
        if let Some(function) = self.try_local_function() {
            return Some(function);
        }
        if let Some(decl) = self.try_local_decl() {
            self.expect(";");
            return Some(Stmt::Local(decl));
        }

        let expr = self.expr_until(&[";"]);
        if expr.is_empty() {
            return None;
        }
        self.expect(";");
        Some(Stmt::Expr(expr))
    }

    fn try_local_function(&mut self) -> Option<Stmt> {
        let start = self.pos;
        while self.at_keyword("static") || (self.peek().is_contextual("async") && !self.nth(1).is_punct("(")) {
            self.bump();
        }
        let Some(return_type) = self.parse_type() else {
            self.pos = start;
            return None;
        };
        if !(self.peek().is_ident() && (self.nth(1).is_punct("(") || self.nth(1).is_punct("<"))) {
            self.pos = start;
            return None;
        }
        let name = Ident::from(&self.bump());
        let type_params = if self.at("<") {
            self.type_params()
        } else {
            Vec::new()
        };
        let params = self.params("(", ")");
        self.skip_constraints();
        let body = self.method_body().unwrap_or(Body::Expr(Expr::default()));
        Some(Stmt::LocalFunction {
            return_type,
            name,
            type_params,
            params,
            body,
        })
    }

    fn try_local_decl(&mut self) -> Option<LocalDecl> {
        if self.peek().is_contextual("await") {
            return None;
        }
        let start = self.pos;
        let ty = self.parse_type()?;
        let follows = self.nth(1);
        let declares = self.peek().is_ident()
            && (follows.is_punct("=") || follows.is_punct(";") || follows.is_punct(",") || follows.is_punct(")"));
        if !declares {
            self.pos = start;
            return None;
        }

        let mut declarators = Vec::new();
        loop {
            let name = Ident::from(&self.bump());
            let init = if self.eat("=") {
                Some(self.expr_until(&[",", ";", ")"]))
            } else {
                None
            };
            declarators.push(Declarator { name, init });
            if self.at(",") && self.nth(1).is_ident() {
                self.bump();
                continue;
            }
            break;
        }
        Some(LocalDecl { ty, declarators })
    }

    fn paren_header(&mut self) -> Vec<Stmt> {
        if !self.expect("(") {
            return Vec::new();
        }
        let expr = self.expr_until(&[")"]);
        self.expect(")");
        vec![Stmt::Expr(expr)]
    }

    fn resource_header(&mut self) -> Vec<Stmt> {
        self.bump();
        let header = match self.try_local_decl() {
            Some(decl) => Stmt::Local(decl),
            None => Stmt::Expr(self.expr_until(&[")"])),
        };
        self.expect(")");
        vec![header]
    }

    fn for_header(&mut self) -> Vec<Stmt> {
        let mut header = Vec::new();
        if !self.expect("(") {
            return header;
        }
        loop {
            if self.eat(")") {
                break;
            }
            if self.at_eof() {
                self.expect(")");
                break;
            }
            match self.try_local_decl() {
                Some(decl) => header.push(Stmt::Local(decl)),
                None => {
                    let expr = self.expr_until(&[";", ")"]);
                    if !expr.is_empty() {
                        header.push(Stmt::Expr(expr));
                    }
                }
            }
            if self.eat(";") {
                continue;
            }
            self.expect(")");
            break;
        }
        header
    }

    fn foreach(&mut self) -> Stmt {
        let keyword = Ident::from(&self.bump());
        if !self.expect("(") {
            return Stmt::Compound {
                keyword,
                header: Vec::new(),
                body: Vec::new(),
            };
        }

        let start = self.pos;
        if let Some(ty) = self.parse_type() {
            if self.peek().is_ident() && self.nth(1).is_keyword("in") {
                let name = Ident::from(&self.bump());
                self.bump();
                let iterable = self.expr_until(&[")"]);
                self.expect(")");
                let body = self.embedded().pop().unwrap_or(Stmt::Block(Block::default()));
                return Stmt::Foreach {
                    ty,
                    name,
                    iterable,
                    body: Box::new(body),
                };
            }
        }

        // Deconstruction and other forms: keep the header as a plain expression.
        self.pos = start;
        let expr = self.expr_until(&[")"]);
        self.expect(")");
        let body = self.embedded();
        Stmt::Compound {
            keyword,
            header: vec![Stmt::Expr(expr)],
            body,
        }
    }

    fn try_statement(&mut self) -> Stmt {
        self.bump();
        let block = self.block();
        let mut catches = Vec::new();
        while self.at_keyword("catch") {
            self.bump();
            let mut clause = CatchClause {
                ty: None,
                name: None,
                filter: None,
                block: Block::default(),
            };
            if self.eat("(") {
                clause.ty = self.parse_type();
                if self.peek().is_ident() {
                    clause.name = Some(Ident::from(&self.bump()));
                }
                self.expect(")");
            }
            if self.peek().is_contextual("when") {
                self.bump();
                if let Some(Stmt::Expr(expr)) = self.paren_header().pop() {
                    clause.filter = Some(expr);
                }
            }
            clause.block = self.block();
            catches.push(clause);
        }
        let finally = if self.at_keyword("finally") {
            self.bump();
            Some(self.block())
        } else {
            None
        };
        if catches.is_empty() && finally.is_none() {
            self.error_after_prev("CS1524", "Expected catch or finally".to_string());
        }
        Stmt::Try {
            block,
            catches,
            finally,
        }
    }

    fn at_switch_label(&self) -> bool {
        self.at_keyword("case") || (self.at_keyword("default") && self.nth(1).is_punct(":"))
    }

    fn switch_body(&mut self) -> Vec<SwitchSection> {
        let mut sections = Vec::new();
        if !self.expect("{") {
            return sections;
        }
        loop {
            if self.at_eof() {
                self.error_after_prev("CS1513", "} expected".to_string());
                break;
            }
            if self.eat("}") {
                break;
            }
            let mut section = SwitchSection {
                labels: Vec::new(),
                statements: Vec::new(),
            };
            while self.at_switch_label() {
                if self.at_keyword("case") {
                    self.bump();
                    section.labels.push(self.expr_until(&[":"]));
                    self.expect(":");
                } else {
                    self.bump();
                    self.bump();
                }
            }
            while !self.at_eof() && !self.at("}") && !self.at_switch_label() {
                self.statement_into(&mut section.statements);
            }
            sections.push(section);
        }
        sections
    }

    // ---- expressions ----

    /// Collects a balanced token run up to a terminator at nesting depth zero.
    /// Generic argument lists such as `Dictionary<string, int>` are taken whole.
    fn expr_until(&mut self, terminators: &[&str]) -> Expr {
        let mut tokens = Vec::new();
        let mut depth = 0usize;
        loop {
            let token = self.peek();
            if token.is_eof() {
                break;
            }
            if depth == 0 && token.kind == TokenKind::Punct {
                let text = token.text.as_str();
                if terminators.contains(&text) || matches!(text, ")" | "]" | "}" | ";") {
                    break;
                }
            }
            if token.kind == TokenKind::Punct {
                match token.text.as_str() {
                    "(" | "[" | "{" => depth += 1,
                    ")" | "]" | "}" => depth = depth.saturating_sub(1),
                    _ => {}
                }
            }
            if token.is_ident() && self.nth(1).is_punct("<") {
                if let Some(end) = self.generic_name_end() {
                    while self.pos < end {
                        tokens.push(self.bump());
                    }
                    continue;
                }
            }
            tokens.push(self.bump());
        }
        Expr { tokens }
    }

    /// End of `Name<...>` at the cursor when the `<` opens a type argument list
    /// rather than a comparison.
    fn generic_name_end(&mut self) -> Option<usize> {
        let start = self.pos;
        self.bump();
        let generic = self.type_args().is_some()
            && (self.at_eof()
                || (self.peek().kind == TokenKind::Punct
                    && GENERIC_FOLLOW.contains(&self.peek().text.as_str())));
        let end = self.pos;
        self.pos = start;
        generic.then_some(end)
    }
}

fn missing_token(p: &str) -> (&'static str, String) {
    match p {
        ";" => ("CS1002", "; expected".to_string()),
        "}" => ("CS1513", "} expected".to_string()),
        "{" => ("CS1514", "{ expected".to_string()),
        ")" => ("CS1026", ") expected".to_string()),
        _ => ("CS1003", format!("Syntax error, '{}' expected", p)),
    }
}
