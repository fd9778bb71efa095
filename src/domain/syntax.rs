//! Surface syntax tree produced by the expression parser.
//!
//! The parser accepts a broad Python-like expression syntax so that the
//! validator can reject disallowed constructs by node kind with a precise
//! position, instead of failing with a generic parse error. Nothing in this
//! tree is ever executed; only the validated [`crate::domain::expr::Expr`] is.

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// Byte offset of the node's first character in the source.
    pub position: usize,
}

impl Node {
    pub fn new(kind: NodeKind, position: usize) -> Self {
        Self { kind, position }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxConstant {
    True,
    False,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Neg,
    Pos,
    Invert,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Lt,
    Gt,
    LtE,
    GtE,
    Eq,
    NotEq,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

/// One `for <targets> in <iter> [if <cond>]*` clause of a comprehension.
#[derive(Debug, Clone, PartialEq)]
pub struct ForClause {
    pub targets: Vec<String>,
    pub iter: Node,
    pub conditions: Vec<Node>,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Number(f64),
    Text(String),
    Constant(SyntaxConstant),
    Name(String),
    Unary {
        op: UnaryOperator,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<Node>,
        right: Box<Node>,
    },
    Compare {
        left: Box<Node>,
        ops: Vec<CompareOperator>,
        comparators: Vec<Node>,
    },
    BoolOp {
        op: BoolOperator,
        values: Vec<Node>,
    },
    IfElse {
        test: Box<Node>,
        body: Box<Node>,
        orelse: Box<Node>,
    },
    Lambda {
        params: Vec<String>,
        body: Box<Node>,
    },
    Call {
        func: Box<Node>,
        args: Vec<Node>,
        keywords: Vec<(String, Node)>,
    },
    Starred(Box<Node>),
    Attribute {
        value: Box<Node>,
        attr: String,
    },
    Subscript {
        value: Box<Node>,
        index: Box<Node>,
    },
    List(Vec<Node>),
    Tuple(Vec<Node>),
    Dict(Vec<(Node, Node)>),
    /// `[elt for ...]` or `(elt for ...)`; `generators` holds every `for` clause.
    Comprehension {
        element: Box<Node>,
        generators: Vec<ForClause>,
    },
}

impl NodeKind {
    /// Human-readable name of the construct, used in rejection messages.
    pub fn describe(&self) -> &'static str {
        match self {
            NodeKind::Number(_) => "number",
            NodeKind::Text(_) => "string",
            NodeKind::Constant(_) => "constant",
            NodeKind::Name(_) => "name",
            NodeKind::Unary { .. } => "unary operator",
            NodeKind::Binary { .. } => "binary operator",
            NodeKind::Compare { .. } => "comparison",
            NodeKind::BoolOp { .. } => "boolean operator",
            NodeKind::IfElse { .. } => "conditional expression",
            NodeKind::Lambda { .. } => "lambda",
            NodeKind::Call { .. } => "call",
            NodeKind::Starred(_) => "starred argument",
            NodeKind::Attribute { .. } => "attribute access",
            NodeKind::Subscript { .. } => "index access",
            NodeKind::List(_) => "list",
            NodeKind::Tuple(_) => "tuple",
            NodeKind::Dict(_) => "dict",
            NodeKind::Comprehension { .. } => "comprehension",
        }
    }
}
