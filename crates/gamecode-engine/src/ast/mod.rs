//! Abstract syntax tree for the gamecode language.
//!
//! The external grammar-driven parser produces nodes already shaped to the
//! variants defined here; nothing in the engine re-parses text. Nodes live in
//! an [`Ast`] arena and refer to their children by [`NodeId`]. The arena is
//! the exclusive owner of every node; parent links are kept in a side table
//! of plain ids (non-owning, lookup only) filled in by
//! [`visitor::link_parents`] before any transform runs.

pub mod factory;
pub mod visitor;

pub use factory::NodeFactory;
pub use visitor::{link_parents, walk, Transformer, Visitor};

/// Index of a node inside an [`Ast`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    /// Create a node id from a raw index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Raw arena index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena holding every node of one translation unit.
#[derive(Debug, Default, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
    parents: Vec<Option<NodeId>>,
    root: Option<NodeId>,
}

impl Ast {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node and return its id.
    pub fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        self.parents.push(None);
        id
    }

    /// Mark a node as the unit root.
    pub fn set_root(&mut self, id: NodeId) {
        self.root = Some(id);
    }

    /// The unit root, if one has been set.
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Replace a node in place, keeping its id (and thus all references to
    /// it) stable.
    pub fn replace(&mut self, id: NodeId, node: Node) {
        self.nodes[id.index()] = node;
    }

    /// Syntactic parent recorded by the linking pass.
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.parents[id.index()]
    }

    pub(crate) fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.parents[id.index()] = parent;
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when the arena holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Child ids of a node, in field order. Sequences contribute every
    /// element; optional children contribute when present.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.node(id).collect_children(&mut out);
        out
    }
}

/// Numeric literal payload. The parser distinguishes integer from floating
/// tokens; folding and codegen preserve that representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Integer literal value.
    Int(i64),
    /// Floating-point literal value.
    Float(f64),
}

impl Number {
    /// True for the integer representation.
    pub fn is_int(self) -> bool {
        matches!(self, Number::Int(_))
    }

    /// Value widened to f64 regardless of representation.
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)] // spellings are given by `as_str`
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    /// Source spelling of the operator.
    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// True for `==`, `!=`, `<`, `<=`, `>`, `>=`.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

/// Unary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation `-x`.
    Neg,
    /// Logical negation `!x`.
    Not,
}

/// One segment of a dotted path expression: a plain name or a call.
#[derive(Debug, Clone, PartialEq)]
pub enum PathSeg {
    /// Identifier segment.
    Ident(String),
    /// Call segment; the id points at a [`Call`] node.
    Call(NodeId),
}

/// Translation unit (one source file).
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    /// Package the unit belongs to.
    pub package: String,
    /// `use` declarations ([`UseDecl`] nodes).
    pub imports: Vec<NodeId>,
    /// Top-level statements in source order.
    pub statements: Vec<NodeId>,
}

/// `use "module"` dependency declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct UseDecl {
    /// Name of the depended-on module.
    pub module: String,
}

/// Namespace grouping of top-level statements.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Grouped statements in source order.
    pub statements: Vec<NodeId>,
}

/// `struct` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    /// Attached decorations ([`Decoration`] nodes).
    pub decorations: Vec<NodeId>,
    /// Struct name.
    pub name: String,
    /// Template parameter names.
    pub template_params: Vec<String>,
    /// Body members: variables, composes, methods.
    pub body: Vec<NodeId>,
}

/// `enum` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDecl {
    /// Enum name.
    pub name: String,
    /// Enumerator names in declaration order.
    pub values: Vec<String>,
}

/// `alias NAME = type` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasDecl {
    /// Name being introduced.
    pub alias: String,
    /// Aliased type ([`TypeRef`] node).
    pub ty: NodeId,
}

/// `interface` declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDecl {
    /// Interface name.
    pub name: String,
    /// Member prototypes ([`InterfaceFn`] nodes).
    pub functions: Vec<NodeId>,
}

/// Function prototype inside an interface.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceFn {
    /// Attached decorations.
    pub decorations: Vec<NodeId>,
    /// Member name.
    pub name: String,
    /// Formal parameters ([`Param`] nodes).
    pub params: Vec<NodeId>,
    /// Declared return type name, if any.
    pub return_type: Option<String>,
}

/// Variable declaration, top-level, local, or struct member.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    /// Attached decorations.
    pub decorations: Vec<NodeId>,
    /// Static storage marker (struct members).
    pub is_static: bool,
    /// Declared type ([`TypeRef`] node).
    pub ty: NodeId,
    /// Variable name.
    pub name: String,
    /// Initializer expression, if any.
    pub init: Option<NodeId>,
}

/// Function prototype (no body). A `lib` decoration turns it into a native
/// import.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    /// Attached decorations.
    pub decorations: Vec<NodeId>,
    /// Function name.
    pub name: String,
    /// Formal parameters ([`Param`] nodes).
    pub params: Vec<NodeId>,
    /// Declared return type name, if any.
    pub return_type: Option<String>,
}

/// Function definition with a body.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    /// Attached decorations.
    pub decorations: Vec<NodeId>,
    /// Function name.
    pub name: String,
    /// Formal parameters ([`Param`] nodes).
    pub params: Vec<NodeId>,
    /// Declared return type name, if any.
    pub return_type: Option<String>,
    /// Body statements in source order.
    pub statements: Vec<NodeId>,
}

/// Formal parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    /// Declared type ([`TypeRef`] node).
    pub ty: NodeId,
    /// Parameter name.
    pub name: String,
}

/// `if` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    /// Condition expression.
    pub condition: NodeId,
    /// Statements executed on a true condition.
    pub then_branch: Vec<NodeId>,
    /// Statements executed otherwise.
    pub else_branch: Vec<NodeId>,
}

/// `for ENTRY in ITERABLE { .. }` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ForStmt {
    /// Loop variable name.
    pub binding: String,
    /// Iterated expression.
    pub iterable: NodeId,
    /// Loop body statements.
    pub body: Vec<NodeId>,
}

/// `match` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchExpr {
    /// Matched expression.
    pub input: NodeId,
    /// Optional alias for the matched value.
    pub input_alias: Option<String>,
    /// Explicit result type ([`TypeRef`] node).
    pub explicit_type: Option<NodeId>,
    /// Arms ([`MatchCase`] nodes).
    pub cases: Vec<NodeId>,
    /// Fallback result when no arm matches.
    pub fallback: Option<NodeId>,
}

/// One arm of a `match`.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    /// Value the arm matches against.
    pub value: NodeId,
    /// Result expression or block.
    pub result: NodeId,
}

/// `return` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnStmt {
    /// Returned expression, if any.
    pub value: Option<NodeId>,
}

/// Braced statement block.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Statements in source order.
    pub statements: Vec<NodeId>,
}

/// Binary operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryExpr {
    /// Left operand.
    pub lhs: NodeId,
    /// Operator.
    pub op: BinaryOp,
    /// Right operand.
    pub rhs: NodeId,
}

/// Unary operation.
#[derive(Debug, Clone, PartialEq)]
pub struct UnaryExpr {
    /// Operator.
    pub op: UnaryOp,
    /// Operand expression.
    pub operand: NodeId,
}

/// `cast<T>(expr)` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct CastExpr {
    /// Target type ([`TypeRef`] node).
    pub ty: NodeId,
    /// Casted expression.
    pub operand: NodeId,
}

/// Function call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpr {
    /// Callee name (import, label, or decorator-script receiver method).
    pub callee: String,
    /// Argument expressions in order.
    pub arguments: Vec<NodeId>,
}

/// Dotted path expression: a variable reference or a call chain.
#[derive(Debug, Clone, PartialEq)]
pub struct PathExpr {
    /// Segments in source order.
    pub segments: Vec<PathSeg>,
}

impl PathExpr {
    /// Leading identifier of the path, if the first segment is one.
    pub fn head(&self) -> Option<&str> {
        match self.segments.first() {
            Some(PathSeg::Ident(name)) => Some(name),
            _ => None,
        }
    }
}

/// `::`-scoped name reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedName {
    /// Scope segments, outermost first.
    pub scopes: Vec<String>,
}

/// Subscript postfix expression `operand[index]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptExpr {
    /// Subscripted expression.
    pub operand: NodeId,
    /// Index expression.
    pub index: NodeId,
}

/// Numeric literal.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberLiteral {
    /// Literal value.
    pub value: Number,
}

/// String literal.
#[derive(Debug, Clone, PartialEq)]
pub struct StringLiteral {
    /// Literal contents, quotes stripped.
    pub value: String,
}

/// Type reference: constness, base name, template arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRef {
    /// `const` qualifier.
    pub is_const: bool,
    /// Base type name.
    pub name: String,
    /// Template arguments ([`TypeRef`] nodes).
    pub template_args: Vec<NodeId>,
}

/// Source-level annotation `[[key: value]]` attached to a declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoration {
    /// Annotation key.
    pub key: String,
    /// Optional literal payload (string or number node).
    pub value: Option<NodeId>,
}

/// Struct embedding member.
#[derive(Debug, Clone, PartialEq)]
pub struct Compose {
    /// Embedded type name.
    pub type_name: String,
}

/// `decorator NAME(self, root, target) { .. }` definition.
#[derive(Debug, Clone, PartialEq)]
pub struct DecoratorDef {
    /// Decorator name, matched against decoration keys.
    pub name: String,
    /// The three formal binding names, in declaration order: the triggering
    /// decoration, the AST root, and the decorated declaration.
    pub formals: [String; 3],
    /// Body statements (restricted grammar subset).
    pub statements: Vec<NodeId>,
}

/// A gamecode AST node. Closed variant set; every visitor matches it
/// exhaustively so the compiler guarantees full coverage.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Translation unit root.
    Unit(Unit),
    /// `use` dependency declaration.
    Use(UseDecl),
    /// Namespace grouping.
    Namespace(Namespace),
    /// Struct declaration.
    Struct(StructDecl),
    /// Enum declaration.
    Enum(EnumDecl),
    /// Type alias declaration.
    Alias(AliasDecl),
    /// Interface declaration.
    Interface(InterfaceDecl),
    /// Interface member prototype.
    InterfaceFn(InterfaceFn),
    /// Variable declaration.
    Var(VarDecl),
    /// Function prototype.
    FnDecl(FnDecl),
    /// Function definition.
    FnDef(FnDef),
    /// Formal parameter.
    Param(Param),
    /// `if` statement.
    If(IfStmt),
    /// `for` statement.
    For(ForStmt),
    /// `match` expression.
    Match(MatchExpr),
    /// One `match` arm.
    MatchCase(MatchCase),
    /// `return` statement.
    Return(ReturnStmt),
    /// Braced block.
    Block(Block),
    /// Binary operation.
    Binary(BinaryExpr),
    /// Unary operation.
    Unary(UnaryExpr),
    /// Cast expression.
    Cast(CastExpr),
    /// Function call.
    Call(CallExpr),
    /// Dotted path reference.
    Path(PathExpr),
    /// `::`-scoped name reference.
    ScopedName(ScopedName),
    /// Subscript expression.
    Subscript(SubscriptExpr),
    /// Numeric literal.
    Number(NumberLiteral),
    /// String literal.
    String(StringLiteral),
    /// Type reference.
    TypeRef(TypeRef),
    /// Annotation attached to a declaration.
    Decoration(Decoration),
    /// Struct embedding member.
    Compose(Compose),
    /// Decorator definition.
    DecoratorDef(DecoratorDef),
}

impl Node {
    /// Collect child ids in field order.
    fn collect_children(&self, out: &mut Vec<NodeId>) {
        match self {
            Node::Unit(n) => {
                out.extend(&n.imports);
                out.extend(&n.statements);
            }
            Node::Use(_) => {}
            Node::Namespace(n) => out.extend(&n.statements),
            Node::Struct(n) => {
                out.extend(&n.decorations);
                out.extend(&n.body);
            }
            Node::Enum(_) => {}
            Node::Alias(n) => out.push(n.ty),
            Node::Interface(n) => out.extend(&n.functions),
            Node::InterfaceFn(n) => {
                out.extend(&n.decorations);
                out.extend(&n.params);
            }
            Node::Var(n) => {
                out.extend(&n.decorations);
                out.push(n.ty);
                out.extend(n.init);
            }
            Node::FnDecl(n) => {
                out.extend(&n.decorations);
                out.extend(&n.params);
            }
            Node::FnDef(n) => {
                out.extend(&n.decorations);
                out.extend(&n.params);
                out.extend(&n.statements);
            }
            Node::Param(n) => out.push(n.ty),
            Node::If(n) => {
                out.push(n.condition);
                out.extend(&n.then_branch);
                out.extend(&n.else_branch);
            }
            Node::For(n) => {
                out.push(n.iterable);
                out.extend(&n.body);
            }
            Node::Match(n) => {
                out.push(n.input);
                out.extend(n.explicit_type);
                out.extend(&n.cases);
                out.extend(n.fallback);
            }
            Node::MatchCase(n) => {
                out.push(n.value);
                out.push(n.result);
            }
            Node::Return(n) => out.extend(n.value),
            Node::Block(n) => out.extend(&n.statements),
            Node::Binary(n) => {
                out.push(n.lhs);
                out.push(n.rhs);
            }
            Node::Unary(n) => out.push(n.operand),
            Node::Cast(n) => {
                out.push(n.ty);
                out.push(n.operand);
            }
            Node::Call(n) => out.extend(&n.arguments),
            Node::Path(n) => {
                for seg in &n.segments {
                    if let PathSeg::Call(id) = seg {
                        out.push(*id);
                    }
                }
            }
            Node::ScopedName(_) => {}
            Node::Subscript(n) => {
                out.push(n.operand);
                out.push(n.index);
            }
            Node::Number(_) => {}
            Node::String(_) => {}
            Node::TypeRef(n) => out.extend(&n.template_args),
            Node::Decoration(n) => out.extend(n.value),
            Node::Compose(_) => {}
            Node::DecoratorDef(n) => out.extend(&n.statements),
        }
    }

    /// Short kind name, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Unit(_) => "unit",
            Node::Use(_) => "use",
            Node::Namespace(_) => "namespace",
            Node::Struct(_) => "struct",
            Node::Enum(_) => "enum",
            Node::Alias(_) => "alias",
            Node::Interface(_) => "interface",
            Node::InterfaceFn(_) => "interface function",
            Node::Var(_) => "variable",
            Node::FnDecl(_) => "function declaration",
            Node::FnDef(_) => "function definition",
            Node::Param(_) => "parameter",
            Node::If(_) => "if",
            Node::For(_) => "for",
            Node::Match(_) => "match",
            Node::MatchCase(_) => "match case",
            Node::Return(_) => "return",
            Node::Block(_) => "block",
            Node::Binary(_) => "binary expression",
            Node::Unary(_) => "unary expression",
            Node::Cast(_) => "cast",
            Node::Call(_) => "call",
            Node::Path(_) => "path",
            Node::ScopedName(_) => "scoped name",
            Node::Subscript(_) => "subscript",
            Node::Number(_) => "number literal",
            Node::String(_) => "string literal",
            Node::TypeRef(_) => "type",
            Node::Decoration(_) => "decoration",
            Node::Compose(_) => "compose",
            Node::DecoratorDef(_) => "decorator",
        }
    }
}
