use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // [A-Za-z_][A-Za-z0-9_]*
    Ident(String),
    // <digit>{<digit>}
    Int(i64),
    // <digit>{<digit>}.{<digit>}
    Float(f64),
    // '...' | "..." | '''...''' | """..."""
    Str(String),

    // Arithmetic
    Plus, // +
    Minus, // -
    Mul, // *
    Div, // /
    FloorDiv, // //
    Mod, // %
    Pow, // ^
    Dollar, // $
    Dot, // .

    // Comparison and assignment
    Eq, // =
    EqEq, // ==
    NotEq, // !=
    Lt, // <
    Gt, // >
    LtEq, // <=
    GtEq, // >=

    // Delimiters
    LParen, // (
    RParen, // )
    LSquare, // [
    RSquare, // ]
    LBrace, // {
    RBrace, // }
    Comma, // ,
    Colon, // :
    Arrow, // ->
    At, // @
    DoubleStar, // **

    // Keywords
    Let,
    And,
    Or,
    Not,
    If,
    Elif,
    Else,
    For,
    To,
    Do,
    Step,
    While,
    Defun,
    Done,
    Return,
    Continue,
    Break,
    Load,
    In,
    As,
    Namespace,
    Using,
    Parent,
    Async,
    Await,
    Del,

    Newline,
    Eof,
}

pub const KEYWORDS: &[&str] = &[
    "let", "and", "or", "not", "if", "elif", "else", "for", "to", "do", "step",
    "while", "defun", "done", "return", "continue", "break", "load", "in", "as",
    "namespace", "using", "parent", "async", "await", "del",
];

pub fn str_to_keyword(word: &str) -> Option<Token> {
    Some(match word {
        "let" => Token::Let,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "if" => Token::If,
        "elif" => Token::Elif,
        "else" => Token::Else,
        "for" => Token::For,
        "to" => Token::To,
        "do" => Token::Do,
        "step" => Token::Step,
        "while" => Token::While,
        "defun" => Token::Defun,
        "done" => Token::Done,
        "return" => Token::Return,
        "continue" => Token::Continue,
        "break" => Token::Break,
        "load" => Token::Load,
        "in" => Token::In,
        "as" => Token::As,
        "namespace" => Token::Namespace,
        "using" => Token::Using,
        "parent" => Token::Parent,
        "async" => Token::Async,
        "await" => Token::Await,
        "del" => Token::Del,
        _ => return None,
    })
}

impl Token {
    pub fn is_keyword(&self) -> bool {
        KEYWORDS.contains(&self.as_literal().as_str())
            && !matches!(self, Token::Ident(_) | Token::Str(_))
    }

    /// Operators that have an augmented `op=` form.
    pub fn is_augmentable(&self) -> bool {
        matches!(
            self,
            Token::Plus | Token::Minus | Token::Mul | Token::Div | Token::FloorDiv | Token::Mod | Token::Pow
        )
    }

    pub fn as_literal(&self) -> String {
        match self {
            Token::Ident(value) => value.clone(),
            Token::Int(value) => format!("{value}"),
            Token::Float(value) => format!("{value:?}"),
            Token::Str(value) => format!("{value:?}"),

            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Mul => "*".into(),
            Token::Div => "/".into(),
            Token::FloorDiv => "//".into(),
            Token::Mod => "%".into(),
            Token::Pow => "^".into(),
            Token::Dollar => "$".into(),
            Token::Dot => ".".into(),

            Token::Eq => "=".into(),
            Token::EqEq => "==".into(),
            Token::NotEq => "!=".into(),
            Token::Lt => "<".into(),
            Token::Gt => ">".into(),
            Token::LtEq => "<=".into(),
            Token::GtEq => ">=".into(),

            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::LSquare => "[".into(),
            Token::RSquare => "]".into(),
            Token::LBrace => "{".into(),
            Token::RBrace => "}".into(),
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Arrow => "->".into(),
            Token::At => "@".into(),
            Token::DoubleStar => "**".into(),

            Token::Let => "let".into(),
            Token::And => "and".into(),
            Token::Or => "or".into(),
            Token::Not => "not".into(),
            Token::If => "if".into(),
            Token::Elif => "elif".into(),
            Token::Else => "else".into(),
            Token::For => "for".into(),
            Token::To => "to".into(),
            Token::Do => "do".into(),
            Token::Step => "step".into(),
            Token::While => "while".into(),
            Token::Defun => "defun".into(),
            Token::Done => "done".into(),
            Token::Return => "return".into(),
            Token::Continue => "continue".into(),
            Token::Break => "break".into(),
            Token::Load => "load".into(),
            Token::In => "in".into(),
            Token::As => "as".into(),
            Token::Namespace => "namespace".into(),
            Token::Using => "using".into(),
            Token::Parent => "parent".into(),
            Token::Async => "async".into(),
            Token::Await => "await".into(),
            Token::Del => "del".into(),

            Token::Newline => "NEWLINE".into(),
            Token::Eof => "EOF".into(),
        }
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_literal())
    }
}
