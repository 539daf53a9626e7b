use crate::{lexer::prelude::{LexicalError, Token}, utils::prelude::SrcSpan};

#[derive(Debug, Clone, PartialEq)]
pub enum ParseErrorType {
    ExpectedIdent,
    Expected { what: String },
    UnexpectedToken {
        token: Token,
        expected: Vec<String>,
    },
    TrailingTokens { token: Token },
    MixedBlockForms { construct: &'static str },
    InvalidLoadPath { path: String },
    DefaultBeforeRequired { name: String },
    DuplicateParameter { name: String },
    DuplicateCollector { kind: &'static str },
    InvalidAssignmentTarget,
    LexError { error: LexicalError },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub error: ParseErrorType,
    pub span: SrcSpan
}

impl ParseError {
    pub fn kind_name(&self) -> &'static str {
        match &self.error {
            ParseErrorType::LexError { error } => error.kind_name(),
            _ => "InvalidSyntaxError",
        }
    }

    pub fn details(&self) -> (String, Vec<String>) {
        match &self.error {
            ParseErrorType::ExpectedIdent => ("Expected identifier".into(), vec![]),
            ParseErrorType::Expected { what } => (format!("Expected {what}"), vec![]),
            ParseErrorType::UnexpectedToken { token, expected } => {
                let found = match token {
                    Token::Int(_) => "an int".to_string(),
                    Token::Float(_) => "a float".to_string(),
                    Token::Str(_) => "a string".to_string(),
                    Token::Ident(_) => "an identifier".to_string(),
                    Token::Newline => "a newline".to_string(),
                    Token::Eof => "the end of the file".to_string(),
                    _ if token.is_keyword() => format!("the keyword '{}'", token.as_literal()),
                    _ => format!("'{}'", token.as_literal())
                };

                let messages = std::iter::once(format!("Found {found}, expected one of: "))
                    .chain(expected.iter().map(|s| format!("- {s}")))
                    .collect();

                (format!("Expected {}", expected.join(", ")), messages)
            },
            ParseErrorType::TrailingTokens { token } => (
                "Token cannot appear after previous tokens".into(),
                vec![format!("'{}' should start a new line", token.as_literal())]
            ),
            ParseErrorType::MixedBlockForms { construct } => (
                format!("Cannot mix inline and block bodies in one '{construct}' chain"),
                vec![]
            ),
            ParseErrorType::InvalidLoadPath { path } => (
                format!("Invalid module path '{path}'"),
                vec!["module paths must start with 'libs.' or 'local.'".into()]
            ),
            ParseErrorType::DefaultBeforeRequired { name } => (
                format!("Parameter '{name}' without a default follows a defaulted parameter"),
                vec![]
            ),
            ParseErrorType::DuplicateParameter { name } => (
                format!("Duplicate parameter '{name}'"),
                vec![]
            ),
            ParseErrorType::DuplicateCollector { kind } => (
                format!("A function can have only one '{kind}' parameter"),
                vec![]
            ),
            ParseErrorType::InvalidAssignmentTarget => (
                "Invalid assignment target".into(),
                vec!["only names and 'collection $ key' can be assigned to".into()]
            ),
            ParseErrorType::LexError { error } => error.details()
        }
    }
}
