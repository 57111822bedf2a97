use crate::csharp::lexer::Token;
use crate::metadata::TypeKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
}

impl From<&Token> for Pos {
    fn from(token: &Token) -> Self {
        Pos {
            line: token.line,
            column: token.column,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ident {
    pub text: String,
    pub pos: Pos,
}

impl From<&Token> for Ident {
    fn from(token: &Token) -> Self {
        Ident {
            text: token.text.clone(),
            pos: token.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamePart {
    pub ident: Ident,
    /// `None` for omitted arguments as in `typeof(Dictionary<,>)`.
    pub type_args: Vec<Option<TypeSyntax>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeSyntax {
    Predefined(Ident),
    Named(Vec<NamePart>),
    Array(Box<TypeSyntax>),
    Nullable(Box<TypeSyntax>),
    Tuple(Vec<TypeSyntax>),
}

impl TypeSyntax {
    pub fn pos(&self) -> Pos {
        match self {
            TypeSyntax::Predefined(ident) => ident.pos,
            TypeSyntax::Named(parts) => parts[0].ident.pos,
            TypeSyntax::Array(inner) | TypeSyntax::Nullable(inner) => inner.pos(),
            TypeSyntax::Tuple(items) => items[0].pos(),
        }
    }

    /// `var` used as an implicitly typed local.
    pub fn is_var(&self) -> bool {
        matches!(self, TypeSyntax::Named(parts)
            if parts.len() == 1 && parts[0].ident.text == "var" && parts[0].type_args.is_empty())
    }

    pub fn is_void(&self) -> bool {
        matches!(self, TypeSyntax::Predefined(ident) if ident.text == "void")
    }
}

/// A run of tokens forming an expression; scanned for name references when bound.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Expr {
    pub tokens: Vec<Token>,
}

impl Expr {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsingKind {
    Namespace,
    Static,
    Alias(Ident),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UsingDirective {
    pub kind: UsingKind,
    pub target: TypeSyntax,
    pub pos: Pos,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationUnit {
    pub file: String,
    pub usings: Vec<UsingDirective>,
    pub members: Vec<NamespaceMember>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub name: Vec<Ident>,
    pub usings: Vec<UsingDirective>,
    pub members: Vec<NamespaceMember>,
}

impl NamespaceDecl {
    pub fn dotted_name(&self) -> String {
        self.name
            .iter()
            .map(|i| i.text.as_str())
            .collect::<Vec<_>>()
            .join(".")
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NamespaceMember {
    Namespace(NamespaceDecl),
    Type(TypeDecl),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeDecl {
    pub kind: TypeKind,
    pub name: Ident,
    pub modifiers: Vec<String>,
    pub type_params: Vec<Ident>,
    pub bases: Vec<TypeSyntax>,
    pub members: Vec<MemberDecl>,
}

impl TypeDecl {
    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    /// Metadata name, with the generic arity suffix when the type has parameters.
    pub fn metadata_name(&self) -> String {
        if self.type_params.is_empty() {
            self.name.text.clone()
        } else {
            format!("{}`{}", self.name.text, self.type_params.len())
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub ty: TypeSyntax,
    pub name: Ident,
    pub default: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declarator {
    pub name: Ident,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Block(Block),
    Expr(Expr),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberKindSyntax {
    Field,
    Const,
    Event,
    Property,
    Indexer,
    Method,
    Operator,
    Constructor,
    Destructor,
    EnumMember,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemberDecl {
    Nested(TypeDecl),
    Member(Member),
}

/// Every non-type member shares this shape; unused parts stay empty.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub kind: MemberKindSyntax,
    pub modifiers: Vec<String>,
    /// Field/property/event type or method return type; `None` for constructors and enum members.
    pub ty: Option<TypeSyntax>,
    pub name: Ident,
    /// Method type parameters.
    pub type_params: Vec<Ident>,
    pub params: Vec<Param>,
    pub declarators: Vec<Declarator>,
    /// Accessor bodies, method body or constructor body.
    pub bodies: Vec<Body>,
    /// Initializers: field/property values, `: base(...)`, enum values.
    pub initializers: Vec<Expr>,
}

impl Member {
    pub fn new(kind: MemberKindSyntax, name: Ident) -> Self {
        Member {
            kind,
            modifiers: Vec::new(),
            ty: None,
            name,
            type_params: Vec::new(),
            params: Vec::new(),
            declarators: Vec::new(),
            bodies: Vec::new(),
            initializers: Vec::new(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.iter().any(|m| m == "static" || m == "const")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalDecl {
    pub ty: TypeSyntax,
    pub declarators: Vec<Declarator>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatchClause {
    pub ty: Option<TypeSyntax>,
    pub name: Option<Ident>,
    pub filter: Option<Expr>,
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchSection {
    pub labels: Vec<Expr>,
    pub statements: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
    Block(Block),
    Local(LocalDecl),
    Expr(Expr),
    /// `if`, `while`, `for`, `do`, `lock`, `using`, `fixed`, `checked`...
    Compound {
        keyword: Ident,
        header: Vec<Stmt>,
        body: Vec<Stmt>,
    },
    Foreach {
        ty: TypeSyntax,
        name: Ident,
        iterable: Expr,
        body: Box<Stmt>,
    },
    Try {
        block: Block,
        catches: Vec<CatchClause>,
        finally: Option<Block>,
    },
    Switch {
        subject: Expr,
        sections: Vec<SwitchSection>,
    },
    LocalFunction {
        return_type: TypeSyntax,
        name: Ident,
        type_params: Vec<Ident>,
        params: Vec<Param>,
        body: Body,
    },
}
