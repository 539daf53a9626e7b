use std::{path::{Path, PathBuf}, sync::Arc};

use tracing::debug;

use crate::{
    environment::prelude::{Context, Value},
    parser::prelude::{parse_module, LoadKind},
    utils::prelude::{Source, SrcSpan},
};
use super::{
    error::{RuntimeError, RuntimeErrorKind},
    task::TaskResult,
    Interpreter,
};

pub const EXTENSION: &str = "zer";

/// Strips each line of its surrounding whitespace. Indentation carries no
/// meaning, and every span refers to the stripped text.
pub fn strip_lines(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

/// True when nothing but blank lines, comments and bare `;` separators remain.
pub fn is_blank(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .all(|line| line.starts_with('#') || line.chars().all(|ch| ch == ';'))
}

/// Files `load "<path>"` tries, in order.
pub fn module_candidates(path: &str, kind: LoadKind, base_dir: &Path, lib_root: &Path) -> Vec<PathBuf> {
    let mut segments = path.split('.').skip(1).collect::<Vec<_>>();
    let Some(last) = segments.pop() else {
        return vec![];
    };

    let mut relative = PathBuf::new();
    if kind == LoadKind::Libs {
        relative.push("libs");
    }
    segments.iter().for_each(|segment| relative.push(segment));
    relative.push(format!("{last}.{EXTENSION}"));

    match kind {
        LoadKind::Libs => vec![base_dir.join(&relative), lib_root.join(&relative)],
        LoadKind::Local => vec![base_dir.join(&relative)],
    }
}

fn base_dir(source: &Source) -> PathBuf {
    Path::new(&source.name)
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

impl Interpreter {
    /// Parses and runs a module against the shared globals. Loading the same
    /// path twice runs it twice.
    pub fn load(&mut self, path: &str, kind: LoadKind, span: SrcSpan, ctx: &Arc<Context>) -> TaskResult {
        let candidates = module_candidates(path, kind, &base_dir(&ctx.source), &self.config.lib_root);

        let Some(file) = candidates.iter().find(|candidate| candidate.is_file()) else {
            let searched = candidates.iter()
                .map(|candidate| candidate.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");

            return Err(RuntimeError::new(
                RuntimeErrorKind::Io,
                format!("Module '{path}' not found (searched {searched})"),
                span,
                ctx
            ));
        };

        debug!(module = path, file = %file.display(), "loading module");

        let text = std::fs::read_to_string(file).map_err(|error| RuntimeError::new(
            RuntimeErrorKind::Io,
            format!("Failed to read module '{path}': {error}"),
            span,
            ctx
        ))?;

        let source = Source::new(file.display().to_string(), strip_lines(&text));
        let module = parse_module(&source.text).map_err(|error| {
            let (headline, _) = error.details();
            let (line, _) = source.line_col(error.span.start);

            RuntimeError::new(
                RuntimeErrorKind::Runtime,
                format!("Failed to load module '{path}': {}: {headline} (line {line})", error.kind_name()),
                span,
                ctx
            )
        })?;

        if self.depth >= self.config.max_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Runtime,
                format!("Maximum recursion depth exceeded ({})", self.config.max_depth),
                span,
                ctx
            ));
        }

        let module_ctx = Context::module("<module>", source, self.globals.clone(), Some(ctx.clone()), span);
        module_ctx.private_scope.set("is_main", Value::Bool(false));

        self.depth += 1;
        let result = self.run_module(&module, &module_ctx);
        self.depth -= 1;

        result
    }
}
