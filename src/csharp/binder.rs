//! Name binding over parsed compilation units.
//!
//! Builds a symbol table from the reference assemblies and the declared
//! source types, resolves every type and member reference, and records the
//! symbol use-sites analyzers work on.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::constants::MAX_SYNTAX_DEPTH;
use crate::core::domain::{CompilationError, Location, SemanticModel, SymbolKind, SymbolUse};
use crate::csharp::lexer::{Token, TokenKind};
use crate::csharp::parser::{parse_type_args_prefix, parse_type_prefix, GENERIC_FOLLOW, PREDEFINED_TYPES};
use crate::csharp::syntax::*;
use crate::metadata::{display_name, qualify, Assembly, MemberDef, MemberKind, TypeDef, TypeKind, Visibility};

const OBJECT: &str = "System.Object";
const VALUE_TYPE: &str = "System.ValueType";
const ENUM: &str = "System.Enum";
const DELEGATE: &str = "System.Delegate";

/// Tokens that may follow a name introduced by a declaration pattern or `out var`.
const DECLARATION_FOLLOW: &[&str] = &[")", ",", ";", "=", ":", "&&", "||", "]", "}", "=>"];

pub struct BindOutput {
    pub diagnostics: Vec<CompilationError>,
    pub model: SemanticModel,
    /// Types declared by the sources, in declaration order.
    pub types: Vec<TypeDef>,
}

/// Binds `units` against `references`.
pub fn bind(unit_name: &str, units: &[CompilationUnit], references: &[Arc<Assembly>]) -> BindOutput {
    let mut binder = Binder::new(references);
    for unit in units {
        binder.declare_unit(unit);
    }
    binder.resolve_usings();
    binder.declare_bases();
    binder.declare_members();
    binder.bind_bodies();
    binder.report_unused_usings();

    tracing::debug!(
        "Bound {} source types with {} symbol uses and {} diagnostics",
        binder.sources.len(),
        binder.uses.len(),
        binder.diagnostics.len()
    );

    let types = binder
        .sources
        .iter()
        .filter_map(|s| binder.table.types.get(&s.full_name).cloned())
        .collect();
    BindOutput {
        diagnostics: binder.diagnostics,
        model: SemanticModel {
            unit_name: unit_name.to_string(),
            symbol_uses: binder.uses,
        },
        types,
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Resolved {
    Namespace(String),
    Type(String),
    TypeParam(String),
}

/// What the expression to the left of a `.` denotes.
#[derive(Clone, Debug)]
enum Chain {
    Unknown,
    Namespace(String),
    /// A type name, so only static members and nested types follow.
    Static(String),
    /// A value of the given type.
    Value(Option<String>),
    /// A method group returning the given type.
    Invocable(Option<String>),
}

#[derive(Debug, Default)]
struct SymbolTable {
    types: HashMap<String, TypeDef>,
    namespaces: HashSet<String>,
}

impl SymbolTable {
    fn add_namespace(&mut self, namespace: &str) {
        let mut prefix = String::new();
        for part in namespace.split('.').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('.');
            }
            prefix.push_str(part);
            self.namespaces.insert(prefix.clone());
        }
    }

    fn has_type(&self, full_name: &str) -> bool {
        self.types.contains_key(full_name)
    }

    fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// `type_name` followed by its base types, breadth first, cycles cut.
    fn hierarchy(&self, type_name: &str) -> Vec<String> {
        let mut order = vec![type_name.to_string()];
        let mut seen: HashSet<String> = order.iter().cloned().collect();
        let mut next = 0;
        while next < order.len() {
            if let Some(def) = self.types.get(&order[next]) {
                for base in &def.base_types {
                    if seen.insert(base.clone()) {
                        order.push(base.clone());
                    }
                }
            }
            next += 1;
        }
        order
    }

    /// Whether every type in the hierarchy is known, so a missing member is a real error.
    fn hierarchy_complete(&self, type_name: &str) -> bool {
        self.hierarchy(type_name).iter().all(|t| self.has_type(t))
    }

    fn find_nested(&self, type_name: &str, key: &str) -> Option<String> {
        self.hierarchy(type_name)
            .into_iter()
            .map(|t| format!("{}.{}", t, key))
            .find(|candidate| self.has_type(candidate))
    }

    fn find_member(&self, type_name: &str, name: &str) -> Option<(String, MemberDef)> {
        self.hierarchy(type_name).into_iter().find_map(|t| {
            let member = self.types.get(&t)?.members_named(name).next()?.clone();
            Some((t, member))
        })
    }
}

#[derive(Clone, Debug)]
struct Level {
    namespace: String,
    usings: Vec<usize>,
}

#[derive(Clone, Debug)]
struct Scope {
    file: String,
    /// Innermost namespace first; the last level is the compilation unit.
    levels: Vec<Level>,
    /// Enclosing types, outermost first.
    enclosing: Vec<String>,
    type_params: Vec<String>,
}

impl Scope {
    fn with_type_params(&self, params: &[Ident]) -> Scope {
        let mut scope = self.clone();
        scope
            .type_params
            .extend(params.iter().map(|p| p.text.clone()));
        scope
    }
}

#[derive(Debug)]
struct UsingInfo {
    directive: UsingDirective,
    file: String,
    /// Namespaces a relative target is resolved against, innermost first.
    search: Vec<String>,
    group: usize,
    resolved: Option<Resolved>,
    used: bool,
    duplicate: bool,
}

struct SourceType<'u> {
    full_name: String,
    decls: Vec<(&'u TypeDecl, Scope)>,
}

struct BodyCtx {
    scope: Scope,
    current_type: String,
    /// Where the member being bound is declared.
    pos: Pos,
    /// Locals and parameters in scope, with their type when it is known.
    locals: HashMap<String, Option<String>>,
}

struct Binder<'u> {
    table: SymbolTable,
    sources: Vec<SourceType<'u>>,
    source_index: HashMap<String, usize>,
    usings: Vec<UsingInfo>,
    using_groups: usize,
    diagnostics: Vec<CompilationError>,
    uses: Vec<SymbolUse>,
    missing_predefined: HashSet<String>,
    depth: usize,
    too_deep: bool,
}

impl<'u> Binder<'u> {
    fn new(references: &[Arc<Assembly>]) -> Self {
        let mut table = SymbolTable::default();
        for assembly in references {
            for ty in &assembly.types {
                table.add_namespace(&ty.namespace);
                table.types.entry(ty.full_name()).or_insert_with(|| ty.clone());
            }
        }
        Binder {
            table,
            sources: Vec::new(),
            source_index: HashMap::new(),
            usings: Vec::new(),
            using_groups: 0,
            diagnostics: Vec::new(),
            uses: Vec::new(),
            missing_predefined: HashSet::new(),
            depth: 0,
            too_deep: false,
        }
    }

    /// Descends one level; past `MAX_SYNTAX_DEPTH` reports CS8078 once and refuses.
    fn enter(&mut self, file: &str, pos: Pos) -> bool {
        if self.depth >= MAX_SYNTAX_DEPTH {
            if !self.too_deep {
                self.too_deep = true;
                self.error("CS8078", "An expression is too long or complex to compile".to_string(), file, pos);
            }
            return false;
        }
        self.depth += 1;
        true
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn error(&mut self, id: &str, message: String, file: &str, pos: Pos) {
        self.diagnostics.push(
            CompilationError::error(id, message).at(Location::new(file, pos.line, pos.column)),
        );
    }

    // ---- declarations ----

    fn declare_unit(&mut self, unit: &'u CompilationUnit) {
        let usings = self.register_usings(&unit.usings, &unit.file, &[String::new()]);
        let levels = vec![Level {
            namespace: String::new(),
            usings,
        }];
        self.declare_namespace_members(&unit.members, &unit.file, "", &levels);
    }

    fn register_usings(&mut self, directives: &[UsingDirective], file: &str, search: &[String]) -> Vec<usize> {
        let group = self.using_groups;
        self.using_groups += 1;
        directives
            .iter()
            .map(|directive| {
                self.usings.push(UsingInfo {
                    directive: directive.clone(),
                    file: file.to_string(),
                    search: search.to_vec(),
                    group,
                    resolved: None,
                    used: false,
                    duplicate: false,
                });
                self.usings.len() - 1
            })
            .collect()
    }

    fn declare_namespace_members(
        &mut self,
        members: &'u [NamespaceMember],
        file: &str,
        namespace: &str,
        levels: &[Level],
    ) {
        for member in members {
            match member {
                NamespaceMember::Namespace(decl) => {
                    let mut levels = levels.to_vec();
                    let mut inner = namespace.to_string();
                    for part in &decl.name {
                        inner = qualify(&inner, &part.text);
                        levels.insert(
                            0,
                            Level {
                                namespace: inner.clone(),
                                usings: Vec::new(),
                            },
                        );
                    }
                    self.table.add_namespace(&inner);
                    let search: Vec<String> = levels.iter().map(|l| l.namespace.clone()).collect();
                    levels[0].usings = self.register_usings(&decl.usings, file, &search);
                    self.declare_namespace_members(&decl.members, file, &inner, &levels);
                }
                NamespaceMember::Type(decl) => {
                    let scope = Scope {
                        file: file.to_string(),
                        levels: levels.to_vec(),
                        enclosing: Vec::new(),
                        type_params: Vec::new(),
                    };
                    self.declare_type(decl, namespace, None, scope);
                }
            }
        }
    }

    fn declare_type(&mut self, decl: &'u TypeDecl, namespace: &str, outer: Option<&TypeDef>, outer_scope: Scope) {
        if decl.name.text.is_empty() {
            return;
        }
        let name = match outer {
            Some(outer) => format!("{}.{}", outer.name, decl.metadata_name()),
            None => decl.metadata_name(),
        };
        let full_name = qualify(namespace, &name);

        if let Some(&index) = self.source_index.get(&full_name) {
            let partial = decl.has_modifier("partial")
                && self.sources[index].decls.iter().all(|(d, _)| d.has_modifier("partial"));
            if !partial {
                let message = match outer {
                    Some(outer) => format!(
                        "The type '{}' already contains a definition for '{}'",
                        outer.display_name(),
                        decl.name.text
                    ),
                    None if namespace.is_empty() => format!(
                        "The namespace '<global namespace>' already contains a definition for '{}'",
                        decl.name.text
                    ),
                    None => format!(
                        "The namespace '{}' already contains a definition for '{}'",
                        namespace, decl.name.text
                    ),
                };
                let id = if outer.is_some() { "CS0102" } else { "CS0101" };
                self.error(id, message, &outer_scope.file, decl.name.pos);
                return;
            }
        }

        let mut scope = outer_scope.with_type_params(&decl.type_params);
        scope.enclosing.push(full_name.clone());

        match self.source_index.get(&full_name) {
            Some(&index) => self.sources[index].decls.push((decl, scope.clone())),
            None => {
                let mut def = TypeDef::new(namespace, &name, decl.kind);
                def.visibility = visibility(&decl.modifiers, outer.is_some());
                def.is_static = decl.has_modifier("static");
                self.table.types.insert(full_name.clone(), def);
                self.source_index.insert(full_name.clone(), self.sources.len());
                self.sources.push(SourceType {
                    full_name: full_name.clone(),
                    decls: vec![(decl, scope.clone())],
                });
            }
        }

        let Some(def) = self.table.types.get(&full_name).cloned() else {
            return;
        };
        for member in &decl.members {
            if let MemberDecl::Nested(nested) = member {
                self.declare_type(nested, namespace, Some(&def), scope.clone());
            }
        }
    }

    // ---- usings ----

    fn resolve_usings(&mut self) {
        for index in 0..self.usings.len() {
            let resolved = self.resolve_using(index);
            let duplicate = resolved.is_some()
                && self.usings[..index].iter().any(|u| {
                    u.group == self.usings[index].group
                        && u.resolved == resolved
                        && u.directive.kind == self.usings[index].directive.kind
                });
            let info = &mut self.usings[index];
            info.resolved = resolved;
            if duplicate {
                info.duplicate = true;
                let target = type_text(&info.directive.target);
                let location = Location::new(&info.file, info.directive.pos.line, info.directive.pos.column);
                self.diagnostics.push(
                    CompilationError::warning(
                        "CS0105",
                        format!("The using directive for '{}' appeared previously in this namespace", target),
                    )
                    .at(location),
                );
            }
        }
    }

    fn resolve_using(&mut self, index: usize) -> Option<Resolved> {
        let info = &self.usings[index];
        let file = info.file.clone();
        let kind = info.directive.kind.clone();
        let target = info.directive.target.clone();
        let search = info.search.clone();

        let TypeSyntax::Named(parts) = &target else {
            // `using static int;` and the like
            return self.bind_type_in(&target, &file, &search, true).map(Resolved::Type);
        };

        let resolved = self.resolve_qualified(parts, &file, &search, true)?;
        match (&kind, &resolved) {
            (UsingKind::Namespace, Resolved::Type(full)) => {
                let message = format!(
                    "A 'using namespace' directive can only be applied to namespaces; '{}' is a type not a namespace. Consider a 'using static' directive instead",
                    full
                );
                self.error("CS0138", message, &file, target.pos());
                None
            }
            (UsingKind::Static, Resolved::Namespace(ns)) => {
                self.error("CS0118", format!("'{}' is a namespace but is used like a type", ns), &file, target.pos());
                None
            }
            _ => Some(resolved),
        }
    }

    /// Resolves a qualified name against a list of namespaces without consulting usings.
    fn resolve_qualified(&mut self, parts: &[NamePart], file: &str, search: &[String], report: bool) -> Option<Resolved> {
        let first = &parts[0];
        let key = metadata_key(&first.ident.text, first.type_args.len());
        let start = search.iter().find_map(|ns| {
            let candidate = qualify(ns, &key);
            if self.table.has_type(&candidate) {
                return Some(Resolved::Type(candidate));
            }
            let namespace = qualify(ns, &first.ident.text);
            (first.type_args.is_empty() && self.table.has_namespace(&namespace))
                .then_some(Resolved::Namespace(namespace))
        });
        let Some(start) = start else {
            if report {
                self.report_missing_type(first, file);
            }
            return None;
        };
        self.resolve_rest(start, parts, file, report)
    }

    fn report_unused_usings(&mut self) {
        for info in &self.usings {
            if info.resolved.is_some() && !info.used && !info.duplicate {
                let pos = info.directive.pos;
                self.diagnostics.push(
                    CompilationError::info("CS8019", "Unnecessary using directive.")
                        .at(Location::new(&info.file, pos.line, pos.column)),
                );
            }
        }
    }

    // ---- lookup ----

    fn lookup_simple(&mut self, name: &str, arity: usize, scope: &Scope) -> Option<Resolved> {
        if arity == 0 && scope.type_params.iter().any(|p| p == name) {
            return Some(Resolved::TypeParam(name.to_string()));
        }
        let key = metadata_key(name, arity);
        for enclosing in scope.enclosing.iter().rev() {
            if let Some(nested) = self.table.find_nested(enclosing, &key) {
                return Some(Resolved::Type(nested));
            }
        }

        for level in &scope.levels {
            let candidate = qualify(&level.namespace, &key);
            if self.table.has_type(&candidate) {
                return Some(Resolved::Type(candidate));
            }
            if arity == 0 {
                let namespace = qualify(&level.namespace, name);
                if self.table.has_namespace(&namespace) {
                    return Some(Resolved::Namespace(namespace));
                }
            }

            for &index in &level.usings {
                let info = &self.usings[index];
                let UsingKind::Alias(alias) = &info.directive.kind else {
                    continue;
                };
                if arity == 0 && alias.text == name {
                    if let Some(target) = info.resolved.clone() {
                        self.usings[index].used = true;
                        return Some(target);
                    }
                }
            }
            for &index in &level.usings {
                let info = &self.usings[index];
                if info.directive.kind != UsingKind::Namespace {
                    continue;
                }
                if let Some(Resolved::Namespace(ns)) = &info.resolved {
                    let candidate = qualify(ns, &key);
                    if self.table.has_type(&candidate) {
                        self.usings[index].used = true;
                        return Some(Resolved::Type(candidate));
                    }
                }
            }
        }
        None
    }

    fn resolve_rest(&mut self, start: Resolved, parts: &[NamePart], file: &str, report: bool) -> Option<Resolved> {
        let mut current = start;
        self.note_type_use(&current, &parts[0].ident, file);
        self.bind_type_args(&parts[0].type_args, file, None, report);

        for part in &parts[1..] {
            let key = metadata_key(&part.ident.text, part.type_args.len());
            current = match current {
                Resolved::Namespace(ns) => {
                    let candidate = qualify(&ns, &key);
                    let namespace = qualify(&ns, &part.ident.text);
                    if self.table.has_type(&candidate) {
                        Resolved::Type(candidate)
                    } else if part.type_args.is_empty() && self.table.has_namespace(&namespace) {
                        Resolved::Namespace(namespace)
                    } else {
                        if report {
                            let message = format!(
                                "The type or namespace name '{}' does not exist in the namespace '{}' (are you missing an assembly reference?)",
                                generic_text(part),
                                ns
                            );
                            self.error("CS0234", message, file, part.ident.pos);
                        }
                        return None;
                    }
                }
                Resolved::Type(ty) => match self.table.find_nested(&ty, &key) {
                    Some(nested) => Resolved::Type(nested),
                    None => {
                        if report {
                            let message = format!(
                                "The type name '{}' does not exist in the type '{}'",
                                generic_text(part),
                                simple_name(&ty)
                            );
                            self.error("CS0426", message, file, part.ident.pos);
                        }
                        return None;
                    }
                },
                Resolved::TypeParam(_) => return None,
            };
            self.note_type_use(&current, &part.ident, file);
            self.bind_type_args(&part.type_args, file, None, report);
        }
        Some(current)
    }

    fn report_missing_type(&mut self, part: &NamePart, file: &str) {
        let message = format!(
            "The type or namespace name '{}' could not be found (are you missing a using directive or an assembly reference?)",
            generic_text(part)
        );
        self.error("CS0246", message, file, part.ident.pos);
    }

    fn bind_type_args(&mut self, args: &[Option<TypeSyntax>], file: &str, scope: Option<&Scope>, report: bool) {
        for arg in args.iter().flatten() {
            match scope {
                Some(scope) => {
                    self.bind_type(arg, scope, report);
                }
                None => {
                    self.bind_type_in(arg, file, &[String::new()], report);
                }
            }
        }
    }

    // ---- types ----

    /// Binds a type in `scope`, returning the full name used in signatures.
    fn bind_type(&mut self, ty: &TypeSyntax, scope: &Scope, report: bool) -> Option<String> {
        match ty {
            TypeSyntax::Predefined(ident) => self.bind_predefined(ident, &scope.file, report),
            TypeSyntax::Named(parts) => {
                if let [only] = &parts[..] {
                    if only.type_args.is_empty() && only.ident.text == "dynamic" {
                        return Some(OBJECT.to_string());
                    }
                }
                let first = &parts[0];
                let Some(start) = self.lookup_simple(&first.ident.text, first.type_args.len(), scope) else {
                    if report {
                        self.report_missing_type(first, &scope.file);
                    }
                    for part in parts {
                        self.bind_type_args(&part.type_args, &scope.file, Some(scope), report);
                    }
                    return None;
                };
                let file = scope.file.clone();
                // Type arguments are resolved in the full scope, so bind them here
                // and resolve the name chain without them.
                for part in parts {
                    self.bind_type_args(&part.type_args, &file, Some(scope), report);
                }
                let bare: Vec<NamePart> = parts
                    .iter()
                    .map(|p| NamePart {
                        ident: p.ident.clone(),
                        type_args: vec![None; p.type_args.len()],
                    })
                    .collect();
                match self.resolve_rest(start, &bare, &file, report)? {
                    Resolved::Type(full) => Some(full),
                    Resolved::TypeParam(name) => Some(name),
                    Resolved::Namespace(ns) => {
                        if report {
                            self.error(
                                "CS0118",
                                format!("'{}' is a namespace but is used like a type", ns),
                                &file,
                                ty.pos(),
                            );
                        }
                        None
                    }
                }
            }
            TypeSyntax::Array(inner) => self.bind_type(inner, scope, report).map(|t| format!("{}[]", t)),
            TypeSyntax::Nullable(inner) => self.bind_type(inner, scope, report),
            TypeSyntax::Tuple(items) => {
                for item in items {
                    self.bind_type(item, scope, report);
                }
                Some(format!("System.ValueTuple`{}", items.len()))
            }
        }
    }

    /// Binds a type against bare namespaces, as using directives do.
    fn bind_type_in(&mut self, ty: &TypeSyntax, file: &str, search: &[String], report: bool) -> Option<String> {
        let scope = Scope {
            file: file.to_string(),
            levels: search
                .iter()
                .map(|ns| Level {
                    namespace: ns.clone(),
                    usings: Vec::new(),
                })
                .collect(),
            enclosing: Vec::new(),
            type_params: Vec::new(),
        };
        self.bind_type(ty, &scope, report)
    }

    fn bind_predefined(&mut self, ident: &Ident, file: &str, report: bool) -> Option<String> {
        let full = format!("System.{}", predefined_name(&ident.text)?);
        if self.table.has_type(&full) {
            self.record_type_use(&full, &ident.text, file, ident.pos);
            return Some(full);
        }
        if report {
            self.report_missing_predefined(&full, file, ident.pos);
        }
        None
    }

    fn report_missing_predefined(&mut self, full: &str, file: &str, pos: Pos) {
        if self.missing_predefined.insert(full.to_string()) {
            self.error(
                "CS0518",
                format!("Predefined type '{}' is not defined or imported", full),
                file,
                pos,
            );
        }
    }

    fn note_type_use(&mut self, resolved: &Resolved, ident: &Ident, file: &str) {
        if let Resolved::Type(full) = resolved {
            let name = simple_name(full).to_string();
            self.record_type_use(full, &name, file, ident.pos);
        }
    }

    fn record_type_use(&mut self, full: &str, name: &str, file: &str, pos: Pos) {
        let namespace = self
            .table
            .types
            .get(full)
            .map(|t| t.namespace.clone())
            .unwrap_or_default();
        self.uses.push(SymbolUse {
            kind: SymbolKind::Type,
            doc_id: format!("T:{}", full),
            name: name.to_string(),
            namespace,
            container: None,
            location: Location::new(file, pos.line, pos.column),
        });
    }

    fn record_member_use(&mut self, declaring: &str, member: &MemberDef, file: &str, token: &Token) {
        let kind = match member.kind {
            MemberKind::Method => SymbolKind::Method,
            MemberKind::Property => SymbolKind::Property,
            MemberKind::Field => SymbolKind::Field,
            MemberKind::Event => SymbolKind::Event,
            MemberKind::Constructor => return,
        };
        let namespace = self
            .table
            .types
            .get(declaring)
            .map(|t| t.namespace.clone())
            .unwrap_or_default();
        self.uses.push(SymbolUse {
            kind,
            doc_id: format!("{}:{}.{}", kind.doc_prefix(), declaring, member.name),
            name: format!("{}.{}", simple_name(declaring), member.name),
            namespace,
            container: Some(format!("T:{}", declaring)),
            location: Location::new(file, token.line, token.column),
        });
    }

    // ---- signatures ----

    fn declare_bases(&mut self) {
        for index in 0..self.sources.len() {
            let full_name = self.sources[index].full_name.clone();
            let decls = self.sources[index].decls.clone();
            let mut bases: Vec<String> = Vec::new();
            for (decl, scope) in &decls {
                // Bases are resolved outside the type's own members.
                let mut outer = scope.clone();
                outer.enclosing.pop();
                for base in &decl.bases {
                    if let Some(full) = self.bind_type(base, &outer, true) {
                        if full != full_name && !bases.contains(&full) {
                            bases.push(full);
                        }
                    }
                }
            }

            let Some((decl, scope)) = decls.first() else {
                continue;
            };
            let implicit = if decl.has_modifier("delegate") {
                Some(DELEGATE)
            } else {
                match decl.kind {
                    TypeKind::Class => {
                        let has_class_base = bases.iter().any(|b| {
                            self.table
                                .types
                                .get(b)
                                .is_some_and(|t| t.kind == TypeKind::Class)
                        });
                        (!has_class_base).then_some(OBJECT)
                    }
                    TypeKind::Struct => Some(VALUE_TYPE),
                    TypeKind::Enum => Some(ENUM),
                    TypeKind::Interface => None,
                }
            };
            if let Some(implicit) = implicit {
                if !self.table.has_type(implicit) {
                    self.report_missing_predefined(implicit, &scope.file, decl.name.pos);
                }
                bases.insert(0, implicit.to_string());
            }

            if let Some(def) = self.table.types.get_mut(&full_name) {
                def.base_types = bases;
            }
        }
    }

    fn declare_members(&mut self) {
        for index in 0..self.sources.len() {
            let full_name = self.sources[index].full_name.clone();
            let decls = self.sources[index].decls.clone();
            let mut members = Vec::new();
            for (decl, scope) in &decls {
                for member in &decl.members {
                    if let MemberDecl::Member(member) = member {
                        members.extend(self.member_defs(member, &full_name, scope));
                    }
                }
            }
            if let Some(def) = self.table.types.get_mut(&full_name) {
                def.members = members;
            }
        }
    }

    fn member_defs(&mut self, member: &Member, owner: &str, scope: &Scope) -> Vec<MemberDef> {
        let scope = scope.with_type_params(&member.type_params);
        let type_name = match &member.ty {
            Some(ty) => {
                let bound = self.bind_type(ty, &scope, true);
                if ty.is_void() { None } else { bound }
            }
            None => None,
        };
        let parameters: Vec<String> = member
            .params
            .iter()
            .map(|p| self.bind_type(&p.ty, &scope, true).unwrap_or_default())
            .collect();
        let type_ref = type_name.as_deref().unwrap_or(OBJECT);
        let is_static = member.is_static();
        let name = member.name.text.as_str();
        let with_params = |def: MemberDef| MemberDef {
            parameters: parameters.clone(),
            ..def
        };

        match member.kind {
            MemberKindSyntax::Field | MemberKindSyntax::Const => member
                .declarators
                .iter()
                .map(|d| {
                    if is_static {
                        MemberDef::static_field(&d.name.text, type_ref)
                    } else {
                        MemberDef::field(&d.name.text, type_ref)
                    }
                })
                .collect(),
            MemberKindSyntax::Event => member
                .declarators
                .iter()
                .map(|d| {
                    let mut def = MemberDef::event(&d.name.text, type_ref);
                    def.is_static = is_static;
                    def
                })
                .collect(),
            MemberKindSyntax::Property | MemberKindSyntax::Indexer => {
                let def = if is_static {
                    MemberDef::static_property(name, type_ref)
                } else {
                    MemberDef::property(name, type_ref)
                };
                vec![with_params(def)]
            }
            MemberKindSyntax::Method => {
                let def = if is_static {
                    MemberDef::static_method(name, type_name.as_deref())
                } else {
                    MemberDef::method(name, type_name.as_deref())
                };
                vec![with_params(def)]
            }
            MemberKindSyntax::Operator => {
                vec![with_params(MemberDef::static_method(name, type_name.as_deref()))]
            }
            MemberKindSyntax::Constructor => {
                let mut def = MemberDef::constructor();
                if is_static {
                    def.name = ".cctor".to_string();
                    def.is_static = true;
                }
                vec![with_params(def)]
            }
            MemberKindSyntax::Destructor => vec![MemberDef::method("Finalize", None)],
            MemberKindSyntax::EnumMember => vec![MemberDef::static_field(name, owner)],
        }
    }

    // ---- bodies ----

    fn bind_bodies(&mut self) {
        for index in 0..self.sources.len() {
            let full_name = self.sources[index].full_name.clone();
            let decls = self.sources[index].decls.clone();
            for (decl, scope) in &decls {
                for member in &decl.members {
                    if let MemberDecl::Member(member) = member {
                        self.bind_member_body(member, &full_name, scope);
                    }
                }
            }
        }
    }

    fn bind_member_body(&mut self, member: &Member, owner: &str, scope: &Scope) {
        let scope = scope.with_type_params(&member.type_params);
        let mut locals = HashMap::new();
        for param in &member.params {
            let ty = self.type_of(&param.ty, &scope);
            locals.insert(param.name.text.clone(), ty);
        }
        if matches!(
            member.kind,
            MemberKindSyntax::Property | MemberKindSyntax::Indexer | MemberKindSyntax::Event
        ) {
            let ty = member.ty.as_ref().and_then(|ty| self.type_of(ty, &scope));
            locals.insert("value".to_string(), ty);
        }
        let mut ctx = BodyCtx {
            scope,
            current_type: owner.to_string(),
            pos: member.name.pos,
            locals,
        };

        for param in &member.params {
            if let Some(default) = &param.default {
                self.bind_expr(&default.tokens, &mut ctx);
            }
        }
        for declarator in &member.declarators {
            if let Some(init) = &declarator.init {
                self.bind_expr(&init.tokens, &mut ctx);
            }
        }
        for init in &member.initializers {
            self.bind_expr(&init.tokens, &mut ctx);
        }
        for body in &member.bodies {
            self.bind_body(body, &mut ctx);
        }
    }

    fn bind_body(&mut self, body: &Body, ctx: &mut BodyCtx) {
        match body {
            Body::Block(block) => self.bind_statements(&block.statements, ctx),
            Body::Expr(expr) => self.bind_expr(&expr.tokens, ctx),
        }
    }

    /// Binds a declared local type; `var` is left to the initializer.
    fn bind_local_type(&mut self, ty: &TypeSyntax, ctx: &BodyCtx) -> Option<String> {
        if ty.is_var() {
            return None;
        }
        self.bind_type(ty, &ctx.scope, true)
    }

    /// Resolves `ty` for typing a local, without recording uses or diagnostics.
    fn type_of(&mut self, ty: &TypeSyntax, scope: &Scope) -> Option<String> {
        let (uses, diagnostics) = (self.uses.len(), self.diagnostics.len());
        let full = self.bind_type(ty, scope, false);
        self.uses.truncate(uses);
        self.diagnostics.truncate(diagnostics);
        full
    }

    fn bind_statements(&mut self, statements: &[Stmt], ctx: &mut BodyCtx) {
        for statement in statements {
            self.bind_statement(statement, ctx);
        }
    }

    fn bind_statement(&mut self, statement: &Stmt, ctx: &mut BodyCtx) {
        let file = ctx.scope.file.clone();
        if !self.enter(&file, ctx.pos) {
            return;
        }
        self.bind_statement_kind(statement, ctx);
        self.leave();
    }

    fn bind_statement_kind(&mut self, statement: &Stmt, ctx: &mut BodyCtx) {
        match statement {
            Stmt::Block(block) => self.bind_statements(&block.statements, ctx),
            Stmt::Local(decl) => {
                let declared = self.bind_local_type(&decl.ty, ctx);
                for declarator in &decl.declarators {
                    let inferred = match &declarator.init {
                        Some(init) => self.bind_expr_typed(&init.tokens, ctx),
                        None => None,
                    };
                    let ty = if decl.ty.is_var() { inferred } else { declared.clone() };
                    ctx.locals.insert(declarator.name.text.clone(), ty);
                }
            }
            Stmt::Expr(expr) => self.bind_expr(&expr.tokens, ctx),
            Stmt::Compound { header, body, .. } => {
                self.bind_statements(header, ctx);
                self.bind_statements(body, ctx);
            }
            Stmt::Foreach {
                ty,
                name,
                iterable,
                body,
            } => {
                let ty = self.bind_local_type(ty, ctx);
                self.bind_expr(&iterable.tokens, ctx);
                ctx.locals.insert(name.text.clone(), ty);
                self.bind_statement(body, ctx);
            }
            Stmt::Try {
                block,
                catches,
                finally,
            } => {
                self.bind_statements(&block.statements, ctx);
                for clause in catches {
                    let ty = match &clause.ty {
                        Some(ty) => self.bind_type(ty, &ctx.scope, true),
                        None => None,
                    };
                    if let Some(name) = &clause.name {
                        ctx.locals.insert(name.text.clone(), ty);
                    }
                    if let Some(filter) = &clause.filter {
                        self.bind_expr(&filter.tokens, ctx);
                    }
                    self.bind_statements(&clause.block.statements, ctx);
                }
                if let Some(finally) = finally {
                    self.bind_statements(&finally.statements, ctx);
                }
            }
            Stmt::Switch { subject, sections } => {
                self.bind_expr(&subject.tokens, ctx);
                for section in sections {
                    for label in &section.labels {
                        self.bind_expr(&label.tokens, ctx);
                    }
                    self.bind_statements(&section.statements, ctx);
                }
            }
            Stmt::LocalFunction {
                return_type,
                name,
                type_params,
                params,
                body,
            } => {
                ctx.locals.insert(name.text.clone(), None);
                let outer_scope = ctx.scope.clone();
                ctx.scope = outer_scope.with_type_params(type_params);
                self.bind_type(return_type, &ctx.scope, true);
                for param in params {
                    let ty = self.bind_type(&param.ty, &ctx.scope, true);
                    ctx.locals.insert(param.name.text.clone(), ty);
                }
                self.bind_body(body, ctx);
                ctx.scope = outer_scope;
            }
        }
    }

    // ---- expressions ----

    fn bind_expr(&mut self, tokens: &[Token], ctx: &mut BodyCtx) {
        self.bind_expr_typed(tokens, ctx);
    }

    /// Binds `tokens`. When they form a single member chain such as
    /// `new T()` or `Type.Create().Value`, returns the type it evaluates to.
    fn bind_expr_typed(&mut self, tokens: &[Token], ctx: &mut BodyCtx) -> Option<String> {
        let file = ctx.scope.file.clone();
        let pos = tokens.first().map(Pos::from).unwrap_or(ctx.pos);
        if !self.enter(&file, pos) {
            return None;
        }

        for (name, type_start) in collect_declared_locals(tokens) {
            let ty = type_start
                .and_then(|start| parse_type_prefix(&tokens[start..]))
                .and_then(|(ty, _)| self.type_of(&ty, &ctx.scope));
            ctx.locals.insert(name, ty);
        }

        let mut value = None;
        let mut i = 0;
        while i < tokens.len() {
            let (end, chain) = self.bind_expr_at(tokens, i, ctx);
            if i == 0 && end >= tokens.len() {
                if let Chain::Value(ty) = chain {
                    value = ty;
                }
            }
            i = end.max(i + 1);
        }

        self.leave();
        value
    }

    fn bind_expr_at(&mut self, tokens: &[Token], i: usize, ctx: &mut BodyCtx) -> (usize, Chain) {
        let token = &tokens[i];
        let next = tokens.get(i + 1);
        let after_access = i
            .checked_sub(1)
            .map(|p| &tokens[p])
            .is_some_and(|p| p.is_punct(".") || p.is_punct("?.") || p.is_punct("::") || p.is_punct("->"));

        match token.kind {
            TokenKind::Keyword => match token.text.as_str() {
                "new" => return self.bind_creation(tokens, i, ctx),
                "typeof" | "sizeof" | "default" if next.is_some_and(|n| n.is_punct("(")) => {
                    if let Some((ty, n)) = parse_type_prefix(&tokens[i + 2..]) {
                        if tokens.get(i + 2 + n).is_some_and(|t| t.is_punct(")")) {
                            self.bind_type(&ty, &ctx.scope, true);
                            return (i + 3 + n, Chain::Unknown);
                        }
                    }
                }
                "is" | "as" => {
                    if let Some((ty, n)) = parse_type_prefix(&tokens[i + 1..]) {
                        self.bind_type(&ty, &ctx.scope, false);
                        return (i + 1 + n, Chain::Unknown);
                    }
                }
                "this" if !after_access => {
                    let chain = Chain::Value(Some(ctx.current_type.clone()));
                    return self.follow_chain(tokens, i + 1, chain, ctx);
                }
                "base" if !after_access => {
                    let base = self
                        .table
                        .types
                        .get(&ctx.current_type)
                        .and_then(|t| t.base_types.first().cloned());
                    return self.follow_chain(tokens, i + 1, Chain::Value(base), ctx);
                }
                text if PREDEFINED_TYPES.contains(&text) && next.is_some_and(|n| n.is_punct(".")) => {
                    let ident = Ident::from(token);
                    let chain = match self.bind_predefined(&ident, &ctx.scope.file.clone(), true) {
                        Some(full) => Chain::Static(full),
                        None => Chain::Unknown,
                    };
                    return self.follow_chain(tokens, i + 1, chain, ctx);
                }
                _ => {}
            },
            TokenKind::Ident if !after_access => return self.bind_head(tokens, i, ctx),
            TokenKind::Punct if token.is_punct("(") => {
                if let Some(end) = self.bind_cast(tokens, i, ctx) {
                    return (end, Chain::Unknown);
                }
            }
            _ => {}
        }
        (i + 1, Chain::Unknown)
    }

    /// `(T)expr`: binds `T` quietly and returns the index after `)`.
    fn bind_cast(&mut self, tokens: &[Token], i: usize, ctx: &mut BodyCtx) -> Option<usize> {
        let (ty, n) = parse_type_prefix(&tokens[i + 1..])?;
        if !tokens.get(i + 1 + n)?.is_punct(")") {
            return None;
        }
        let operand = tokens.get(i + 2 + n)?;
        let starts_operand = matches!(
            operand.kind,
            TokenKind::Ident | TokenKind::Number | TokenKind::Str | TokenKind::Char
        ) || operand.is_punct("(")
            || ["this", "new", "typeof", "default", "true", "false", "null", "base"]
                .iter()
                .any(|k| operand.is_keyword(k));
        if !starts_operand {
            return None;
        }
        if let TypeSyntax::Named(parts) = &ty {
            if parts.len() == 1 && ctx.locals.contains_key(&parts[0].ident.text) {
                return None;
            }
        }
        self.bind_type(&ty, &ctx.scope, false);
        Some(i + 2 + n)
    }

    fn bind_creation(&mut self, tokens: &[Token], i: usize, ctx: &mut BodyCtx) -> (usize, Chain) {
        let mut j = i + 1;
        let Some((ty, n)) = parse_type_prefix(&tokens[j..]) else {
            return (j, Chain::Unknown);
        };
        let created = self.bind_type(&ty, &ctx.scope, true);
        j += n;

        if tokens.get(j).is_some_and(|t| t.is_punct("[")) {
            let close = matching_close(tokens, j);
            self.bind_expr(&tokens[j + 1..close.min(tokens.len())], ctx);
            return (close + 1, Chain::Unknown);
        }
        for open in ["(", "{"] {
            if tokens.get(j).is_some_and(|t| t.is_punct(open)) {
                let close = matching_close(tokens, j);
                self.bind_expr(&tokens[j + 1..close.min(tokens.len())], ctx);
                j = close + 1;
            }
        }
        self.follow_chain(tokens, j, Chain::Value(created), ctx)
    }

    /// Parses `<...>` at `j` when it reads as a generic argument list.
    fn generic_suffix(&self, tokens: &[Token], j: usize) -> (Vec<Option<TypeSyntax>>, usize) {
        if tokens.get(j).is_some_and(|t| t.is_punct("<")) {
            if let Some((args, n)) = parse_type_args_prefix(&tokens[j..]) {
                let follows = tokens
                    .get(j + n)
                    .is_none_or(|t| t.kind == TokenKind::Punct && GENERIC_FOLLOW.contains(&t.text.as_str()));
                if follows {
                    return (args, j + n);
                }
            }
        }
        (Vec::new(), j)
    }

    fn bind_head(&mut self, tokens: &[Token], i: usize, ctx: &mut BodyCtx) -> (usize, Chain) {
        let token = &tokens[i];
        let name = token.text.as_str();

        let named_argument = tokens.get(i + 1).is_some_and(|t| t.is_punct(":"))
            && i.checked_sub(1)
                .is_some_and(|p| tokens[p].is_punct("(") || tokens[p].is_punct(","));
        if named_argument {
            return (i + 1, Chain::Unknown);
        }

        let (type_args, j) = self.generic_suffix(tokens, i + 1);
        let scope = ctx.scope.clone();
        let file = scope.file.clone();

        let chain = if let Some(ty) = ctx.locals.get(name) {
            Chain::Value(ty.clone())
        } else if let Some(chain) = self.member_head(token, ctx) {
            chain
        } else {
            match self.lookup_simple(name, type_args.len(), &scope) {
                Some(Resolved::Type(full)) => {
                    self.record_type_use(&full, simple_name(&full), &file, Pos::from(token));
                    Chain::Static(full)
                }
                Some(Resolved::Namespace(ns)) => Chain::Namespace(ns),
                Some(Resolved::TypeParam(_)) | None => Chain::Unknown,
            }
        };
        self.bind_type_args(&type_args, &file, Some(&scope), true);
        self.follow_chain(tokens, j, chain, ctx)
    }

    /// A simple name bound to a member of the current type, an enclosing type or a `using static` type.
    fn member_head(&mut self, token: &Token, ctx: &BodyCtx) -> Option<Chain> {
        let name = token.text.as_str();
        let file = ctx.scope.file.clone();

        let mut owners = vec![ctx.current_type.clone()];
        owners.extend(ctx.scope.enclosing.iter().rev().cloned());
        for owner in owners {
            if let Some((declaring, member)) = self.table.find_member(&owner, name) {
                self.record_member_use(&declaring, &member, &file, token);
                return Some(member_chain(&member));
            }
        }

        for level in &ctx.scope.levels {
            for &index in &level.usings {
                let info = &self.usings[index];
                if info.directive.kind != UsingKind::Static {
                    continue;
                }
                let Some(Resolved::Type(target)) = info.resolved.clone() else {
                    continue;
                };
                if let Some((declaring, member)) = self.table.find_member(&target, name) {
                    self.usings[index].used = true;
                    self.record_member_use(&declaring, &member, &file, token);
                    return Some(member_chain(&member));
                }
            }
        }
        None
    }

    /// Follows `.Member`, calls and indexers from `j`, returning where the chain
    /// ends and what it denotes there.
    fn follow_chain(&mut self, tokens: &[Token], mut j: usize, mut chain: Chain, ctx: &mut BodyCtx) -> (usize, Chain) {
        loop {
            let Some(token) = tokens.get(j) else {
                return (j, chain);
            };
            if token.is_punct("(") || token.is_punct("[") {
                let close = matching_close(tokens, j);
                self.bind_expr(&tokens[j + 1..close.min(tokens.len())], ctx);
                chain = match chain {
                    Chain::Invocable(returns) if token.is_punct("(") => Chain::Value(returns),
                    _ => Chain::Unknown,
                };
                j = close + 1;
                continue;
            }
            let next = tokens.get(j + 1);
            if token.is_punct("!") && next.is_some_and(|n| n.is_punct(".") || n.is_punct("?.")) {
                j += 1;
                continue;
            }
            if (token.is_punct(".") || token.is_punct("?.")) && next.is_some_and(Token::is_ident) {
                let ident = &tokens[j + 1];
                let (type_args, after) = self.generic_suffix(tokens, j + 2);
                chain = self.member_access(chain, ident, type_args.len(), ctx);
                let scope = ctx.scope.clone();
                self.bind_type_args(&type_args, &scope.file, Some(&scope), true);
                j = after;
                continue;
            }
            return (j, chain);
        }
    }

    fn member_access(&mut self, chain: Chain, ident: &Token, arity: usize, ctx: &BodyCtx) -> Chain {
        let name = ident.text.as_str();
        let file = ctx.scope.file.clone();
        let key = metadata_key(name, arity);

        match chain {
            Chain::Namespace(ns) => {
                let candidate = qualify(&ns, &key);
                let namespace = qualify(&ns, name);
                if self.table.has_type(&candidate) {
                    self.record_type_use(&candidate, simple_name(&candidate), &file, Pos::from(ident));
                    Chain::Static(candidate)
                } else if arity == 0 && self.table.has_namespace(&namespace) {
                    Chain::Namespace(namespace)
                } else {
                    let message = format!(
                        "The type or namespace name '{}' does not exist in the namespace '{}' (are you missing an assembly reference?)",
                        name, ns
                    );
                    self.error("CS0234", message, &file, Pos::from(ident));
                    Chain::Unknown
                }
            }
            Chain::Static(ty) => {
                if let Some(nested) = self.table.find_nested(&ty, &key) {
                    self.record_type_use(&nested, simple_name(&nested), &file, Pos::from(ident));
                    return Chain::Static(nested);
                }
                if let Some((declaring, member)) = self.table.find_member(&ty, name) {
                    self.record_member_use(&declaring, &member, &file, ident);
                    return member_chain(&member);
                }
                if self.table.hierarchy_complete(&ty) {
                    let message = format!(
                        "'{}' does not contain a definition for '{}'",
                        simple_name(&ty),
                        name
                    );
                    self.error("CS0117", message, &file, Pos::from(ident));
                }
                Chain::Unknown
            }
            Chain::Value(Some(ty)) => match self.table.find_member(&ty, name) {
                Some((declaring, member)) => {
                    self.record_member_use(&declaring, &member, &file, ident);
                    member_chain(&member)
                }
                None => Chain::Unknown,
            },
            _ => Chain::Unknown,
        }
    }
}

fn member_chain(member: &MemberDef) -> Chain {
    match member.kind {
        MemberKind::Method => Chain::Invocable(member.type_name.clone()),
        MemberKind::Constructor => Chain::Unknown,
        _ => Chain::Value(member.type_name.clone()),
    }
}

/// Names introduced inside an expression: lambda parameters, `out var x`,
/// and declaration patterns such as `is Foo f`. Each comes with the index
/// where its declared type starts, when it has one.
fn collect_declared_locals(tokens: &[Token]) -> Vec<(String, Option<usize>)> {
    let mut declared = Vec::new();
    for (i, token) in tokens.iter().enumerate() {
        if token.is_punct("=>") && i > 0 && tokens[i - 1].is_punct(")") {
            let mut depth = 0usize;
            let mut k = i - 1;
            loop {
                if tokens[k].is_punct(")") {
                    depth += 1;
                } else if tokens[k].is_punct("(") {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                if depth == 1
                    && tokens[k].is_ident()
                    && tokens.get(k + 1).is_some_and(|n| n.is_punct(",") || n.is_punct(")"))
                {
                    declared.push((tokens[k].text.clone(), None));
                }
                if k == 0 {
                    break;
                }
                k -= 1;
            }
            continue;
        }

        if !token.is_ident() {
            continue;
        }
        let prev = i.checked_sub(1).map(|p| &tokens[p]);
        let next = tokens.get(i + 1);
        if next.is_some_and(|n| n.is_punct("=>")) && !prev.is_some_and(|p| p.is_punct(".")) {
            declared.push((token.text.clone(), None));
            continue;
        }
        let after_type = prev.is_some_and(|p| {
            (p.is_ident() && p.text != "await")
                || p.is_punct(">")
                || p.is_punct("]")
                || (p.kind == TokenKind::Keyword && PREDEFINED_TYPES.contains(&p.text.as_str()))
        });
        let ends_declaration = next.is_none_or(|n| {
            (n.kind == TokenKind::Punct && DECLARATION_FOLLOW.contains(&n.text.as_str()))
                || n.is_keyword("in")
                || n.is_contextual("when")
        });
        if after_type && ends_declaration {
            declared.push((token.text.clone(), dotted_type_start(tokens, i - 1)));
        }
    }
    declared
}

/// Start of the dotted name ending at `last`, as in `is System.Diagnostics.Process p`.
fn dotted_type_start(tokens: &[Token], last: usize) -> Option<usize> {
    let is_name = |t: &Token| t.is_ident() || (t.kind == TokenKind::Keyword && PREDEFINED_TYPES.contains(&t.text.as_str()));
    if !is_name(&tokens[last]) {
        return None;
    }
    let mut start = last;
    while start >= 2 && tokens[start - 1].is_punct(".") && tokens[start - 2].is_ident() {
        start -= 2;
    }
    Some(start)
}

/// Index of the bracket closing the one at `open`, or `tokens.len()` when unbalanced.
fn matching_close(tokens: &[Token], open: usize) -> usize {
    let mut depth = 0usize;
    for (k, token) in tokens.iter().enumerate().skip(open) {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" | "{" => depth += 1,
            ")" | "]" | "}" => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return k;
                }
            }
            _ => {}
        }
    }
    tokens.len()
}

fn predefined_name(keyword: &str) -> Option<&'static str> {
    Some(match keyword {
        "bool" => "Boolean",
        "byte" => "Byte",
        "sbyte" => "SByte",
        "char" => "Char",
        "decimal" => "Decimal",
        "double" => "Double",
        "float" => "Single",
        "int" => "Int32",
        "uint" => "UInt32",
        "long" => "Int64",
        "ulong" => "UInt64",
        "short" => "Int16",
        "ushort" => "UInt16",
        "object" => "Object",
        "string" => "String",
        "void" => "Void",
        _ => return None,
    })
}

fn visibility(modifiers: &[String], nested: bool) -> Visibility {
    let has = |m: &str| modifiers.iter().any(|x| x == m);
    if has("public") {
        Visibility::Public
    } else if has("protected") {
        Visibility::Protected
    } else if has("private") {
        Visibility::Private
    } else if has("internal") || !nested {
        Visibility::Internal
    } else {
        Visibility::Private
    }
}

fn metadata_key(name: &str, arity: usize) -> String {
    if arity == 0 {
        name.to_string()
    } else {
        format!("{}`{}", name, arity)
    }
}

/// `Process` for `System.Diagnostics.Process`, `Inner` for `Ns.Outer.Inner`, `List` for ``List`1``.
fn simple_name(full: &str) -> &str {
    let last = full.rsplit('.').next().unwrap_or(full);
    display_name(last)
}

/// Name as shown in diagnostics: `List<>` for a generic reference.
fn generic_text(part: &NamePart) -> String {
    match part.type_args.len() {
        0 => part.ident.text.clone(),
        n => format!("{}<{}>", part.ident.text, ",".repeat(n - 1)),
    }
}

fn type_text(ty: &TypeSyntax) -> String {
    match ty {
        TypeSyntax::Predefined(ident) => ident.text.clone(),
        TypeSyntax::Named(parts) => parts
            .iter()
            .map(generic_text)
            .collect::<Vec<_>>()
            .join("."),
        TypeSyntax::Array(inner) => format!("{}[]", type_text(inner)),
        TypeSyntax::Nullable(inner) => format!("{}?", type_text(inner)),
        TypeSyntax::Tuple(items) => format!(
            "({})",
            items.iter().map(type_text).collect::<Vec<_>>().join(", ")
        ),
    }
}
