use crate::utils::prelude::SrcSpan;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexicalErrorType {
    IllegalCharacter { ch: char },
    StrayBackslash,
    ExpectedAfter { expected: char, after: char },
    UnterminatedString { quote: char, triple: bool },
    UnmatchedCloser { found: char },
    MismatchedCloser {
        expected: char,
        found: char,
        opened_line: usize,
        opened_column: usize,
    },
    UnclosedBracket {
        expected: char,
        opened_line: usize,
        opened_column: usize,
    },
    IntegerTooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexicalError {
    pub error: LexicalErrorType,
    pub location: SrcSpan
}

impl LexicalError {
    /// The user-facing error class shown in front of the message.
    pub fn kind_name(&self) -> &'static str {
        match self.error {
            LexicalErrorType::IllegalCharacter { .. }
            | LexicalErrorType::StrayBackslash
            | LexicalErrorType::IntegerTooLarge => "IllegalCharacterError",
            _ => "ExpectedCharacterError",
        }
    }

    /// The closing character the lexer was waiting for, if any.
    pub fn expected_closer(&self) -> Option<char> {
        match self.error {
            LexicalErrorType::MismatchedCloser { expected, .. }
            | LexicalErrorType::UnclosedBracket { expected, .. } => Some(expected),
            _ => None,
        }
    }

    pub fn details(&self) -> (String, Vec<String>) {
        match &self.error {
            LexicalErrorType::IllegalCharacter { ch } => {
                (format!("'{ch}'"), vec![])
            },
            LexicalErrorType::StrayBackslash => {
                ("Stray '\\' character in program".into(), vec![
                    "a '\\' is only allowed right before a line break".into()
                ])
            },
            LexicalErrorType::ExpectedAfter { expected, after } => {
                (format!("'{expected}' (after '{after}')"), vec![])
            },
            LexicalErrorType::UnterminatedString { quote, triple: true } => {
                (format!("'{q}{q}{q}' (closing quotes for multiline string)", q = quote), vec![])
            },
            LexicalErrorType::UnterminatedString { quote, triple: false } => {
                (format!("'{quote}' (closing quote for string)"), vec![])
            },
            LexicalErrorType::UnmatchedCloser { found } => {
                (format!("'{found}' without matching opener"), vec![])
            },
            LexicalErrorType::MismatchedCloser { expected, found, opened_line, opened_column } => {
                (
                    format!("Expected '{expected}' but found '{found}'"),
                    vec![format!("the bracket was opened at line {opened_line}, column {opened_column}")]
                )
            },
            LexicalErrorType::UnclosedBracket { expected, opened_line, opened_column } => {
                (
                    format!("Expected '{expected}'"),
                    vec![format!("the bracket was opened at line {opened_line}, column {opened_column}")]
                )
            },
            LexicalErrorType::IntegerTooLarge => {
                ("Integer literal is too large".into(), vec![])
            },
        }
    }
}
