use std::path::PathBuf;

use termcolor::Buffer;
use thiserror::Error;

use crate::{
    eval::prelude::RuntimeError,
    lexer::prelude::LexicalError,
    parser::prelude::{ParseError, ParseErrorType},
};
use super::diagnostic::{Diagnostic, Label, Location};

/// Identical traceback lines beyond this many are folded into one note.
const REPEAT_LIMIT: usize = 3;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("failed to tokenize source code")]
    Lex {
        name: String,
        src: String,
        error: LexicalError
    },
    #[error("failed to parse source code")]
    Parse {
        name: String,
        src: String,
        error: ParseError
    },
    #[error("{error}")]
    Runtime {
        error: RuntimeError
    },
    #[error("IO operation failed")]
    StdIo {
        path: PathBuf,
        err: std::io::ErrorKind
    },
    #[error("the file is empty or only contains comments")]
    Empty {
        name: String
    }
}

impl Error {
    /// Splits a lexical failure wrapped by the parser back out.
    pub fn from_parse(name: &str, src: &str, error: ParseError) -> Self {
        match error.error {
            ParseErrorType::LexError { error } => Error::Lex {
                name: name.into(),
                src: src.into(),
                error
            },
            _ => Error::Parse {
                name: name.into(),
                src: src.into(),
                error
            },
        }
    }

    pub fn pretty_string(&self) -> String {
        let mut nocolor = Buffer::no_color();
        self.pretty(&mut nocolor);
        String::from_utf8(nocolor.into_inner()).expect("Error printing produced invalid utf8")
    }

    pub fn pretty(&self, buf: &mut Buffer) {
        use std::io::Write;

        if let Error::Runtime { error } = self {
            writeln!(buf, "{}", traceback(error)).expect("write traceback");
        }

        for diagnostic in self.to_diagnostics() {
            diagnostic.write(buf);
            writeln!(buf).expect("write new line diagnostic");
        }
    }

    pub fn to_diagnostics(&self) -> Vec<Diagnostic<'_>> {
        let diagnostic = match self {
            Error::Lex { name, src, error } => {
                let (label, extra) = error.details();

                extra.into_iter()
                    .fold(Diagnostic::new(error.kind_name()), Diagnostic::with_note)
                    .with_location(Some(Location {
                        src,
                        name,
                        labels: vec![Label::with_text(error.location, label)],
                    }))
            },
            Error::Parse { name, src, error } => {
                let (label, extra) = error.details();

                extra.into_iter()
                    .fold(Diagnostic::new(error.kind_name()), Diagnostic::with_note)
                    .with_location(Some(Location {
                        src,
                        name,
                        labels: vec![Label::with_text(error.span, label)],
                    }))
            },
            Error::Runtime { error } => {
                let location = error.location().map(|frame| Location {
                    src: &frame.source.text,
                    name: &frame.source.name,
                    labels: vec![Label::at(frame.span)],
                });

                Diagnostic::new(error.to_string()).with_location(location)
            },
            Error::StdIo { path, err } => {
                Diagnostic::new("Standard IO error")
                    .with_note(format!("{}: {err}", path.display()))
            },
            Error::Empty { name } => {
                Diagnostic::new("The file is empty or only contains comments")
                    .with_note(name.clone())
            }
        };

        vec![diagnostic]
    }
}

impl From<RuntimeError> for Error {
    fn from(error: RuntimeError) -> Self {
        Error::Runtime { error }
    }
}

/// `Traceback (most recent call last):` followed by one line per frame.
/// Runs of the same frame, as left by deep recursion, are folded.
pub fn traceback(error: &RuntimeError) -> String {
    let (_, lines) = error.details();
    let mut out = vec!["Traceback (most recent call last):".to_string()];
    let mut index = 0;

    while index < lines.len() {
        let line = &lines[index];
        let run = lines[index..].iter().take_while(|other| *other == line).count();

        out.extend(std::iter::repeat(format!("  {line}")).take(run.min(REPEAT_LIMIT)));
        if run > REPEAT_LIMIT {
            out.push(format!("  [Previous line repeated {} more times]", run - REPEAT_LIMIT));
        }
        index += run;
    }

    out.join("\n")
}
