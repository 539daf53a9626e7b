pub mod base;
pub mod concurrency;
pub mod io;

pub mod prelude {
    pub use super::{BuiltIn, BuiltinCall, DefaultArg, Parameter};
}


use std::{collections::BTreeMap, sync::Arc, time::Duration};

use num_traits::ToPrimitive;

use crate::{
    environment::prelude::{Context, List, Map, SymbolTable, Value, TYPE_NAMES},
    eval::prelude::{bind_arguments, duration, Interpreter, RuntimeError, RuntimeErrorKind, Slot, TaskResult},
    utils::prelude::SrcSpan,
    Config,
};

/// Constant default of a built-in parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultArg {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
    EmptyList,
    EmptyMap,
}

impl DefaultArg {
    pub fn to_value(self) -> Value {
        match self {
            DefaultArg::None => Value::None,
            DefaultArg::Bool(value) => Value::Bool(value),
            DefaultArg::Int(value) => Value::Int(value),
            DefaultArg::Float(value) => Value::Float(value),
            DefaultArg::Str(value) => Value::str(value),
            DefaultArg::EmptyList => Value::list(vec![]),
            DefaultArg::EmptyMap => Value::map(BTreeMap::new()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameter {
    pub name: &'static str,
    pub default: Option<DefaultArg>,
}

pub const fn required(name: &'static str) -> Parameter {
    Parameter { name, default: None }
}

pub const fn optional(name: &'static str, default: DefaultArg) -> Parameter {
    Parameter { name, default: Some(default) }
}

pub type NativeBody = fn(&mut Interpreter, &BuiltinCall) -> TaskResult;

pub struct BuiltIn {
    pub name: &'static str,
    pub params: &'static [Parameter],
    pub body: NativeBody,
}

/// Arguments of one built-in call, already bound to its parameters.
pub struct BuiltinCall<'a> {
    pub name: &'static str,
    pub args: Vec<Value>,
    pub span: SrcSpan,
    pub ctx: &'a Arc<Context>,
}

const ORDINALS: &[&str] = &["First", "Second", "Third", "Fourth", "Fifth", "Sixth"];

impl BuiltinCall<'_> {
    pub fn arg(&self, index: usize) -> &Value {
        &self.args[index]
    }

    pub fn error<T>(&self, kind: RuntimeErrorKind, message: impl Into<String>) -> Result<T, RuntimeError> {
        Err(RuntimeError::new(kind, message, self.span, self.ctx))
    }

    /// `Second argument of 'pop' must be an int`.
    pub fn type_error<T>(&self, index: usize, expected: &str) -> Result<T, RuntimeError> {
        let ordinal = ORDINALS.get(index).copied().unwrap_or("An");
        self.error(
            RuntimeErrorKind::Type,
            format!("{ordinal} argument of '{}' must be {expected}", self.name)
        )
    }

    pub fn int(&self, index: usize) -> Result<i64, RuntimeError> {
        match self.arg(index) {
            Value::Int(value) => Ok(*value),
            _ => self.type_error(index, "an int"),
        }
    }

    pub fn number(&self, index: usize) -> Result<f64, RuntimeError> {
        match self.arg(index) {
            Value::Int(value) => Ok(*value as f64),
            Value::Float(value) => Ok(*value),
            Value::Decimal(value) => Ok(value.to_f64().unwrap_or(f64::NAN)),
            _ => self.type_error(index, "a number"),
        }
    }

    pub fn boolean(&self, index: usize) -> Result<bool, RuntimeError> {
        match self.arg(index) {
            Value::Bool(value) => Ok(*value),
            _ => self.type_error(index, "a boolean"),
        }
    }

    pub fn string(&self, index: usize) -> Result<Arc<str>, RuntimeError> {
        match self.arg(index) {
            Value::Str(value) => Ok(value.clone()),
            _ => self.type_error(index, "a string"),
        }
    }

    pub fn list(&self, index: usize) -> Result<List, RuntimeError> {
        match self.arg(index) {
            Value::List(list) => Ok(list.clone()),
            _ => self.type_error(index, "a list"),
        }
    }

    pub fn map(&self, index: usize) -> Result<Map, RuntimeError> {
        match self.arg(index) {
            Value::Map(map) => Ok(map.clone()),
            _ => self.type_error(index, "a hashmap"),
        }
    }

    pub fn callable(&self, index: usize) -> Result<Value, RuntimeError> {
        match self.arg(index) {
            value if value.is_callable() => Ok(value.clone()),
            _ => self.type_error(index, "a function"),
        }
    }

    /// Seconds as a `Duration`; `none` means no limit.
    pub fn seconds(&self, index: usize) -> Result<Option<Duration>, RuntimeError> {
        if matches!(self.arg(index), Value::None) {
            return Ok(None);
        }

        let seconds = self.number(index)?;
        match duration(seconds) {
            Some(limit) => Ok(Some(limit)),
            None => self.error(RuntimeErrorKind::Runtime, format!("Invalid number of seconds: {seconds}")),
        }
    }

    /// Positional and keyword arguments given as a list and a hashmap.
    pub fn call_arguments(&self, args: usize, kwargs: usize) -> Result<(Vec<Value>, BTreeMap<String, Value>), RuntimeError> {
        Ok((self.list(args)?.snapshot(), self.map(kwargs)?.snapshot()))
    }
}

/// Binds arguments exactly like a user function call, then runs the body.
pub fn invoke(
    interpreter: &mut Interpreter,
    builtin: &BuiltIn,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    span: SrcSpan,
    ctx: &Arc<Context>,
) -> TaskResult {
    let slots = builtin.params.iter()
        .map(|param| (param.name, if param.default.is_some() { Slot::Optional } else { Slot::Required }))
        .collect::<Vec<_>>();

    let bound = bind_arguments(builtin.name, &slots, args, kwargs)
        .map_err(|message| RuntimeError::new(RuntimeErrorKind::Runtime, message, span, ctx))?;

    let args = bound.into_iter()
        .zip(builtin.params)
        .map(|(value, param)| match value {
            Some(value) => value,
            None => param.default.map_or(Value::None, DefaultArg::to_value),
        })
        .collect();

    let call = BuiltinCall {
        name: builtin.name,
        args,
        span,
        ctx,
    };

    (builtin.body)(interpreter, &call)
}

pub fn all() -> impl Iterator<Item = &'static BuiltIn> {
    base::BUILTINS.iter()
        .chain(concurrency::BUILTINS.iter())
        .chain(io::BUILTINS.iter())
}

/// Binds every built-in function and constant into a fresh global table.
pub fn register(globals: &SymbolTable, config: &Config) {
    for builtin in all() {
        globals.set(builtin.name, Value::BuiltIn(builtin));
    }

    for (name, type_name) in TYPE_NAMES {
        globals.set(name, Value::str(type_name));
    }

    globals.set("none", Value::None);
    globals.set("true", Value::Bool(true));
    globals.set("false", Value::Bool(false));
    globals.set("nan", Value::Float(f64::NAN));
    globals.set("inf", Value::Float(f64::INFINITY));
    globals.set("neg_inf", Value::Float(f64::NEG_INFINITY));
    globals.set("PI", Value::Float(std::f64::consts::PI));
    globals.set("E", Value::Float(std::f64::consts::E));
    globals.set("argv", Value::list(config.argv.iter().map(Value::str).collect()));
}
