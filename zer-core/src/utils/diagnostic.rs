use codespan_reporting::{
    diagnostic::{Diagnostic as Report, Label as CodespanLabel, LabelStyle, Severity},
    files::SimpleFiles,
    term,
};
use termcolor::Buffer;

use super::src_span::SrcSpan;

/// A span in the reported source, optionally with a message under it.
pub struct Label {
    pub text: Option<String>,
    pub span: SrcSpan,
}

impl Label {
    pub fn at(span: SrcSpan) -> Self {
        Self { text: None, span }
    }

    pub fn with_text(span: SrcSpan, text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), span }
    }

    fn to_codespan(&self, file_id: usize, style: LabelStyle, len: usize) -> CodespanLabel<usize> {
        let span = self.span.clamp(len as u32);
        let label = CodespanLabel::new(style, file_id, (span.start as usize)..(span.end as usize));

        match &self.text {
            None => label,
            Some(text) => label.with_message(text.clone()),
        }
    }
}

/// The source a diagnostic points into. The first label is the primary one.
pub struct Location<'a> {
    pub src: &'a str,
    pub name: &'a str,
    pub labels: Vec<Label>,
}

pub struct Diagnostic<'a> {
    pub title: String,
    pub notes: Vec<String>,
    pub location: Option<Location<'a>>,
}

impl<'a> Diagnostic<'a> {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            notes: vec![],
            location: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        let note = note.into();
        if !note.is_empty() {
            self.notes.push(note);
        }
        self
    }

    pub fn with_location(mut self, location: Option<Location<'a>>) -> Self {
        self.location = location;
        self
    }

    pub fn write(&self, buf: &mut Buffer) {
        let mut files = SimpleFiles::new();
        let mut report = Report::new(Severity::Error)
            .with_message(&self.title)
            .with_notes(self.notes.clone());

        if let Some(location) = &self.location {
            let file_id = files.add(location.name, location.src);
            let labels = location.labels.iter()
                .enumerate()
                .map(|(index, label)| {
                    let style = if index == 0 { LabelStyle::Primary } else { LabelStyle::Secondary };
                    label.to_codespan(file_id, style, location.src.len())
                })
                .collect();

            report = report.with_labels(labels);
        }

        term::emit(buf, &term::Config::default(), &files, &report)
            .expect("write_diagnostic");
    }
}
