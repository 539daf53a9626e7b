pub mod lexer;
pub mod parser;
pub mod environment;
pub mod eval;
pub mod builtins;
pub mod utils;

use std::{
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
};

use tracing::debug;

use crate::{
    environment::prelude::{Context, SymbolTable, Value, TYPE_NAMES},
    eval::prelude::{is_blank, strip_lines, Interpreter},
    lexer::prelude::{char_stream, Lexer, Spanned, KEYWORDS},
    parser::prelude::parse_module,
    utils::prelude::{Error, Source, SrcSpan},
};

pub const VERSION: &str = "Zerionyx (v2.3.0)";

/// Overrides `Config::lib_root`.
pub const LIB_ROOT_VAR: &str = "ZER_LIB_ROOT";

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `libs/`, searched after the importing file's own.
    pub lib_root: PathBuf,
    /// Deepest chain of nested calls and loads before giving up.
    pub max_depth: usize,
    /// Exposed to programs as `argv`.
    pub argv: Vec<String>,
    /// Stack of every thread that walks the tree.
    pub stack_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        let lib_root = std::env::var_os(LIB_ROOT_VAR)
            .map(PathBuf::from)
            .or_else(|| {
                std::env::current_exe().ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_default();

        Self {
            lib_root,
            max_depth: 1000,
            argv: vec![],
            stack_size: 256 * 1024 * 1024,
        }
    }
}

/// One set of globals plus the configuration every run shares.
pub struct Runtime {
    pub config: Arc<Config>,
    pub globals: Arc<SymbolTable>,
}

impl Runtime {
    pub fn new(config: Config) -> Self {
        let globals = SymbolTable::new(None);
        builtins::register(&globals, &config);

        Self {
            config: Arc::new(config),
            globals,
        }
    }

    /// Runs a whole program. Calls are independent of each other apart from
    /// the globals they leave behind.
    pub fn run(&self, name: &str, text: &str) -> Result<Value, Error> {
        if is_blank(text) {
            return Err(Error::Empty { name: name.into() });
        }

        let source = Source::new(name, strip_lines(text));
        let module = parse_module(&source.text)
            .map_err(|error| Error::from_parse(name, &source.text, error))?;

        debug!(name, statements = module.statements.len(), "running program");

        let ctx = Context::module("<program>", source, self.globals.clone(), None, SrcSpan::default());
        ctx.private_scope.set("is_main", Value::Bool(true));

        let mut interpreter = Interpreter::new(self.config.clone(), self.globals.clone());

        std::thread::scope(|scope| {
            let worker = std::thread::Builder::new()
                .name("zer-main".into())
                .stack_size(self.config.stack_size)
                .spawn_scoped(scope, || interpreter.run_module(&module, &ctx))
                .map_err(|err| Error::StdIo { path: name.into(), err: err.kind() })?;

            match worker.join() {
                Ok(result) => result.map_err(Error::from),
                Err(panic) => std::panic::resume_unwind(panic),
            }
        })
    }

    pub fn run_file(&self, path: &Path) -> Result<Value, Error> {
        let text = std::fs::read_to_string(path)
            .map_err(|err| Error::StdIo { path: path.to_path_buf(), err: err.kind() })?;

        self.run(&path.display().to_string(), &text)
    }

    /// Globals bound to functions or type names, sorted.
    pub fn bound_names(&self) -> Vec<String> {
        self.globals.entries()
            .into_iter()
            .filter(|(name, value)| {
                value.is_callable() || TYPE_NAMES.iter().any(|(type_name, _)| type_name == name)
            })
            .map(|(name, _)| name)
            .collect()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn default_runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(Runtime::default)
}

/// Runs a program against the process-wide globals.
pub fn run(name: &str, text: &str) -> Result<Value, Error> {
    default_runtime().run(name, text)
}

pub fn run_file(path: &Path) -> Result<Value, Error> {
    default_runtime().run_file(path)
}

pub fn keywords() -> &'static [&'static str] {
    KEYWORDS
}

pub fn bound_names() -> Vec<String> {
    default_runtime().bound_names()
}

/// Tokens of an arbitrary piece of source, for highlighting. Never fails: a
/// lexical error just ends the stream.
pub fn retokenize(fragment: &str) -> Vec<Spanned> {
    let (tokens, _) = Lexer::new(char_stream(fragment))
        .without_let_insertion()
        .tokenize_partial();

    tokens.iter().map(|lexeme| lexeme.spanned()).collect()
}
