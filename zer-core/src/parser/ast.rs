use std::{fmt::Display, sync::Arc};

use crate::{lexer::prelude::Token, utils::prelude::SrcSpan};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub statements: Vec<Node>,
    pub location: SrcSpan
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
    Index,
    Eq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
}

impl BinOp {
    pub fn from_token(token: &Token) -> Option<Self> {
        Some(match token {
            Token::Plus => Self::Add,
            Token::Minus => Self::Sub,
            Token::Mul => Self::Mul,
            Token::Div => Self::Div,
            Token::FloorDiv => Self::FloorDiv,
            Token::Mod => Self::Mod,
            Token::Pow => Self::Pow,
            Token::Dollar => Self::Index,
            Token::EqEq => Self::Eq,
            Token::NotEq => Self::NotEq,
            Token::Lt => Self::Lt,
            Token::Gt => Self::Gt,
            Token::LtEq => Self::LtEq,
            Token::GtEq => Self::GtEq,
            Token::And => Self::And,
            Token::Or => Self::Or,
            _ => return None,
        })
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::FloorDiv => "//",
            Self::Mod => "%",
            Self::Pow => "^",
            Self::Index => "$",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::LtEq => "<=",
            Self::GtEq => ">=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    Libs,
    Local,
}

/// A parameter of a `defun`.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Required(String),
    Default(String, Node),
    // *name
    Rest(String),
    // **name
    Keywords(String),
}

impl Param {
    pub fn name(&self) -> &str {
        match self {
            Param::Required(name) | Param::Default(name, _) | Param::Rest(name) | Param::Keywords(name) => name,
        }
    }
}

/// An argument at a call site.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Positional(Node),
    Keyword(String, Node),
    // *list
    Spread(Node),
    // **map
    SpreadKeywords(Node),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDef {
    pub name: Option<String>,
    pub params: Vec<Param>,
    pub body: Node,
    /// `-> expr` form: the body's value is the call's result.
    pub auto_return: bool,
    pub is_async: bool,
    pub decorators: Vec<Node>,
    pub location: SrcSpan
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfCase {
    pub condition: Node,
    pub body: Node,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Number { value: Number, location: SrcSpan },
    Str { value: String, location: SrcSpan },
    List { elements: Vec<Node>, location: SrcSpan },
    Map { entries: Vec<(Node, Node)>, location: SrcSpan },
    /// Statements of an indented block. Evaluates to the last one's value.
    Block { statements: Vec<Node>, location: SrcSpan },

    VarAccess { name: String, location: SrcSpan },
    VarAssign { name: String, value: Box<Node>, location: SrcSpan },
    MultiAssign { names: Vec<String>, value: Box<Node>, location: SrcSpan },
    Alias { name: String, alias: String, location: SrcSpan },
    IndexAssign { target: Box<Node>, index: Box<Node>, value: Box<Node>, location: SrcSpan },
    Del { names: Vec<String>, location: SrcSpan },

    BinOp { left: Box<Node>, op: BinOp, right: Box<Node>, location: SrcSpan },
    Unary { op: UnaryOp, operand: Box<Node>, location: SrcSpan },

    If {
        cases: Vec<IfCase>,
        else_case: Option<Box<Node>>,
        multiline: bool,
        location: SrcSpan
    },
    For {
        var: String,
        start: Box<Node>,
        end: Box<Node>,
        step: Option<Box<Node>>,
        body: Box<Node>,
        multiline: bool,
        location: SrcSpan
    },
    ForIn {
        vars: Vec<String>,
        iterable: Box<Node>,
        body: Box<Node>,
        multiline: bool,
        location: SrcSpan
    },
    While { condition: Box<Node>, body: Box<Node>, multiline: bool, location: SrcSpan },

    FuncDef(Arc<FuncDef>),
    Call { callee: Box<Node>, args: Vec<Arg>, location: SrcSpan },
    Member { object: Box<Node>, name: String, location: SrcSpan },
    Await { value: Box<Node>, location: SrcSpan },

    Return { value: Option<Box<Node>>, location: SrcSpan },
    Continue { location: SrcSpan },
    Break { location: SrcSpan },

    Load { path: String, kind: LoadKind, location: SrcSpan },
    Namespace { name: String, body: Arc<Vec<Node>>, location: SrcSpan },
    Using { names: Vec<String>, parent: bool, location: SrcSpan },
}

impl Node {
    pub fn location(&self) -> SrcSpan {
        match self {
            Node::FuncDef(def) => def.location,
            Node::Number { location, .. }
            | Node::Str { location, .. }
            | Node::List { location, .. }
            | Node::Map { location, .. }
            | Node::Block { location, .. }
            | Node::VarAccess { location, .. }
            | Node::VarAssign { location, .. }
            | Node::MultiAssign { location, .. }
            | Node::Alias { location, .. }
            | Node::IndexAssign { location, .. }
            | Node::Del { location, .. }
            | Node::BinOp { location, .. }
            | Node::Unary { location, .. }
            | Node::If { location, .. }
            | Node::For { location, .. }
            | Node::ForIn { location, .. }
            | Node::While { location, .. }
            | Node::Call { location, .. }
            | Node::Member { location, .. }
            | Node::Await { location, .. }
            | Node::Return { location, .. }
            | Node::Continue { location }
            | Node::Break { location }
            | Node::Load { location, .. }
            | Node::Namespace { location, .. }
            | Node::Using { location, .. } => *location,
        }
    }

    /// Names this node binds at the level it appears in. Used by tooling to
    /// list top-level definitions.
    pub fn bound_names(&self) -> Vec<&str> {
        match self {
            Node::VarAssign { name, .. } | Node::Namespace { name, .. } => vec![name.as_str()],
            Node::Alias { alias, .. } => vec![alias.as_str()],
            Node::MultiAssign { names, .. } => names.iter().map(String::as_str).collect(),
            Node::FuncDef(def) => def.name.as_deref().into_iter().collect(),
            _ => vec![],
        }
    }
}

pub fn escape_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn write_block(f: &mut std::fmt::Formatter<'_>, node: &Node) -> std::fmt::Result {
    match node {
        Node::Block { statements, .. } => {
            for statement in statements {
                writeln!(f, "{statement}")?;
            }
            Ok(())
        },
        other => writeln!(f, "{other}"),
    }
}

fn write_body(f: &mut std::fmt::Formatter<'_>, body: &Node, multiline: bool) -> std::fmt::Result {
    if multiline {
        writeln!(f)?;
        write_block(f, body)?;
        write!(f, "done")
    } else {
        write!(f, " {body}")
    }
}

fn join<T: Display>(items: &[T]) -> String {
    items.iter().map(|item| item.to_string()).collect::<Vec<_>>().join(", ")
}

impl Display for Number {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => {
                let text = value.to_string();
                if text.contains('.') {
                    write!(f, "{text}")
                } else {
                    write!(f, "{text}.0")
                }
            },
        }
    }
}

impl Display for Param {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Param::Required(name) => write!(f, "{name}"),
            Param::Default(name, value) => write!(f, "let {name} = {value}"),
            Param::Rest(name) => write!(f, "*{name}"),
            Param::Keywords(name) => write!(f, "**{name}"),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Arg::Positional(value) => write!(f, "{value}"),
            Arg::Keyword(name, value) => write!(f, "let {name} = {value}"),
            Arg::Spread(value) => write!(f, "*{value}"),
            Arg::SpreadKeywords(value) => write!(f, "**{value}"),
        }
    }
}

impl Display for FuncDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for decorator in &self.decorators {
            writeln!(f, "@{decorator}")?;
        }
        if self.is_async {
            write!(f, "async ")?;
        }
        write!(f, "defun")?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        write!(f, "({})", join(&self.params))?;

        if self.auto_return {
            write!(f, " -> {}", self.body)
        } else {
            write_body(f, &self.body, true)
        }
    }
}

/// Canonical source form. Every binary and unary operation is parenthesized
/// so that re-parsing the output yields the same tree.
impl Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Number { value, .. } => write!(f, "{value}"),
            Node::Str { value, .. } => write!(f, "{}", escape_str(value)),
            Node::List { elements, .. } => write!(f, "[{}]", join(elements)),
            Node::Map { entries, .. } => {
                let entries = entries.iter()
                    .map(|(key, value)| format!("{key}: {value}"))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", entries.join(", "))
            },
            Node::Block { statements, .. } => {
                let lines = statements.iter().map(|s| s.to_string()).collect::<Vec<_>>();
                write!(f, "{}", lines.join("\n"))
            },

            Node::VarAccess { name, .. } => write!(f, "{name}"),
            Node::VarAssign { name, value, .. } => write!(f, "let {name} = {value}"),
            Node::MultiAssign { names, value, .. } => write!(f, "let {} = {value}", names.join(", ")),
            Node::Alias { name, alias, .. } => write!(f, "let {name} as {alias}"),
            Node::IndexAssign { target, index, value, .. } => write!(f, "({target} $ {index}) = {value}"),
            Node::Del { names, .. } => write!(f, "del {}", names.join(", ")),

            Node::BinOp { left, op, right, .. } => write!(f, "({left} {} {right})", op.symbol()),
            Node::Unary { op: UnaryOp::Plus, operand, .. } => write!(f, "(+{operand})"),
            Node::Unary { op: UnaryOp::Minus, operand, .. } => write!(f, "(-{operand})"),
            Node::Unary { op: UnaryOp::Not, operand, .. } => write!(f, "(not {operand})"),

            Node::If { cases, else_case, multiline, .. } => {
                for (idx, case) in cases.iter().enumerate() {
                    let keyword = if idx == 0 { "if" } else { "elif" };
                    if *multiline {
                        writeln!(f, "{keyword} {} do", case.condition)?;
                        write_block(f, &case.body)?;
                    } else {
                        if idx > 0 {
                            write!(f, " ")?;
                        }
                        write!(f, "{keyword} {} do {}", case.condition, case.body)?;
                    }
                }
                match (else_case, multiline) {
                    (Some(body), true) => {
                        writeln!(f, "else")?;
                        write_block(f, body)?;
                        write!(f, "done")
                    },
                    (Some(body), false) => write!(f, " else {body}"),
                    (None, true) => write!(f, "done"),
                    (None, false) => Ok(()),
                }
            },
            Node::For { var, start, end, step, body, multiline, .. } => {
                write!(f, "for {var} = {start} to {end}")?;
                if let Some(step) = step {
                    write!(f, " step {step}")?;
                }
                write!(f, " do")?;
                write_body(f, body, *multiline)
            },
            Node::ForIn { vars, iterable, body, multiline, .. } => {
                write!(f, "for {} in {iterable} do", vars.join(", "))?;
                write_body(f, body, *multiline)
            },
            Node::While { condition, body, multiline, .. } => {
                write!(f, "while {condition} do")?;
                write_body(f, body, *multiline)
            },

            Node::FuncDef(def) => write!(f, "{def}"),
            Node::Call { callee, args, .. } => write!(f, "{callee}({})", join(args)),
            Node::Member { object, name, .. } => write!(f, "{object}.{name}"),
            Node::Await { value, .. } => write!(f, "(await {value})"),

            Node::Return { value: Some(value), .. } => write!(f, "return {value}"),
            Node::Return { value: None, .. } => write!(f, "return"),
            Node::Continue { .. } => write!(f, "continue"),
            Node::Break { .. } => write!(f, "break"),

            Node::Load { path, .. } => write!(f, "load {}", escape_str(path)),
            Node::Namespace { name, body, .. } => {
                writeln!(f, "namespace {name}")?;
                for statement in body.iter() {
                    writeln!(f, "{statement}")?;
                }
                write!(f, "done")
            },
            Node::Using { names, parent: true, .. } => write!(f, "using parent {}", names.join(", ")),
            Node::Using { names, parent: false, .. } => write!(f, "using {}", names.join(", ")),
        }
    }
}

impl Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lines = self.statements.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        write!(f, "{}", lines.join("\n"))
    }
}
