use std::{path::{Path, PathBuf}, sync::Arc};

use tracing::trace;

use crate::{
    environment::prelude::{FileHandle, Value},
    eval::prelude::{Coroutine, Interpreter, RuntimeError, RuntimeErrorKind, TaskResult},
};
use super::{required, BuiltIn, BuiltinCall};

pub static BUILTINS: &[BuiltIn] = &[
    BuiltIn { name: "open", params: &[required("path")], body: open },
    BuiltIn { name: "read_file", params: &[required("file")], body: read_file },
    BuiltIn { name: "write_file", params: &[required("file"), required("text")], body: write_file },
    BuiltIn { name: "file_exists", params: &[required("path")], body: file_exists },
    BuiltIn { name: "read_file_async", params: &[required("file")], body: read_file_async },
    BuiltIn { name: "write_file_async", params: &[required("file"), required("text")], body: write_file_async },
];

/// A file handle or a plain path string.
fn path(call: &BuiltinCall, index: usize) -> Result<PathBuf, RuntimeError> {
    match call.arg(index) {
        Value::File(file) => Ok(file.path.clone()),
        Value::Str(path) => Ok(PathBuf::from(path.as_ref())),
        _ => call.type_error(index, "a file or a string"),
    }
}

fn read(path: &Path) -> Result<Value, String> {
    trace!(path = %path.display(), "reading file");
    std::fs::read_to_string(path)
        .map(Value::str)
        .map_err(|error| format!("Failed to read file '{}': {error}", path.display()))
}

fn write(path: &Path, text: &str) -> Result<Value, String> {
    trace!(path = %path.display(), "writing file");
    std::fs::write(path, text)
        .map(|_| Value::None)
        .map_err(|error| format!("Failed to write file '{}': {error}", path.display()))
}

fn open(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let path = PathBuf::from(call.string(0)?.as_ref());
    let name = path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Value::File(Arc::new(FileHandle { name, path })))
}

fn read_file(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    read(&path(call, 0)?).or_else(|message| call.error(RuntimeErrorKind::Io, message))
}

fn write_file(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let path = path(call, 0)?;
    let text = call.string(1)?;
    write(&path, &text).or_else(|message| call.error(RuntimeErrorKind::Io, message))
}

fn file_exists(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(path(call, 0)?.exists()))
}

fn read_file_async(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let path = path(call, 0)?;
    let (span, ctx) = (call.span, call.ctx.clone());

    let work = move || read(&path).map_err(|message| RuntimeError::new(RuntimeErrorKind::Io, message, span, &ctx));
    Ok(Value::Coroutine(Coroutine::offload("read_file_async", work, call.span, call.ctx)?))
}

fn write_file_async(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let path = path(call, 0)?;
    let text = call.string(1)?;
    let (span, ctx) = (call.span, call.ctx.clone());

    let work = move || write(&path, &text).map_err(|message| RuntimeError::new(RuntimeErrorKind::Io, message, span, &ctx));
    Ok(Value::Coroutine(Coroutine::offload("write_file_async", work, call.span, call.ctx)?))
}
