use std::{fmt::Display, sync::Arc};

use crate::{environment::prelude::Context, utils::prelude::{Source, SrcSpan}};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    Runtime,
    Math,
    Io,
    Type,
}

impl RuntimeErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Runtime => "RuntimeError",
            Self::Math => "MathError",
            Self::Io => "IOError",
            Self::Type => "TypeError",
        }
    }

    /// Short tag handed out by `is_panic`.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Runtime => "RT",
            Self::Math => "M",
            Self::Io => "IO",
            Self::Type => "T",
        }
    }
}

/// One line of a traceback.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub source: Arc<Source>,
    pub span: SrcSpan,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    /// Outermost call first, failure site last.
    pub frames: Vec<Frame>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>, span: SrcSpan, ctx: &Context) -> Self {
        let mut frames = vec![];
        let mut span = span;
        let mut source = ctx.source.clone();
        let mut current = Some(ctx);

        while let Some(context) = current {
            frames.push(Frame {
                source: source.clone(),
                span,
                name: context.display_name.clone(),
            });

            if let Some(parent) = &context.parent {
                span = context.entry_span;
                source = parent.source.clone();
            }
            current = context.parent.as_deref();
        }
        frames.reverse();

        Self {
            kind,
            message: message.into(),
            frames,
        }
    }

    pub fn location(&self) -> Option<&Frame> {
        self.frames.last()
    }

    pub fn details(&self) -> (String, Vec<String>) {
        let lines = self.frames.iter()
            .map(|frame| {
                let (line, _) = frame.source.line_col(frame.span.start);
                format!("File \"{}\", line {line}, in {}", frame.source.name, frame.name)
            })
            .collect();

        (format!("{}: {}", self.kind.name(), self.message), lines)
    }
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.name(), self.message)
    }
}

/// Everything that stops the evaluation of a statement list early.
#[derive(Debug, Clone)]
pub enum Signal {
    Error(Box<RuntimeError>),
    Return(crate::environment::prelude::Value),
    Continue,
    Break,
}

impl From<RuntimeError> for Signal {
    fn from(value: RuntimeError) -> Self {
        Signal::Error(Box::new(value))
    }
}

pub type Eval<T = crate::environment::prelude::Value> = Result<T, Signal>;

pub fn runtime_error<T>(
    kind: RuntimeErrorKind,
    message: impl Into<String>,
    span: SrcSpan,
    ctx: &Context
) -> Result<T, RuntimeError> {
    Err(RuntimeError::new(kind, message, span, ctx))
}
