use std::{collections::BTreeMap, sync::Arc};

use crate::{
    builtins,
    environment::prelude::{Context, Function, Value},
    parser::prelude::Param,
    utils::prelude::SrcSpan,
};
use super::{
    error::{RuntimeError, RuntimeErrorKind, Signal},
    task::{Coroutine, TaskResult},
    Interpreter,
};

/// How a formal parameter takes its argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Required,
    Optional,
    /// Collects surplus positional arguments into a list.
    Rest,
    /// Collects unknown keyword arguments into a hashmap.
    Keywords,
}

impl From<&Param> for Slot {
    fn from(param: &Param) -> Self {
        match param {
            Param::Required(_) => Slot::Required,
            Param::Default(..) => Slot::Optional,
            Param::Rest(_) => Slot::Rest,
            Param::Keywords(_) => Slot::Keywords,
        }
    }
}

/// Matches call arguments against a parameter list. The result has one
/// entry per parameter; `None` marks an optional parameter left for its
/// default. Shared by user functions and built-ins so both report the same
/// messages.
pub fn bind_arguments(
    name: &str,
    params: &[(&str, Slot)],
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
) -> Result<Vec<Option<Value>>, String> {
    let mut bound: Vec<Option<Value>> = vec![None; params.len()];
    let mut positional = args.into_iter();
    let given = positional.len();
    let mut rest_seen = false;

    for (index, (_, slot)) in params.iter().enumerate() {
        match slot {
            Slot::Required | Slot::Optional if !rest_seen => {
                if let Some(value) = positional.next() {
                    bound[index] = Some(value);
                }
            },
            Slot::Rest => {
                rest_seen = true;
                bound[index] = Some(Value::list(positional.by_ref().collect()));
            },
            _ => {},
        }
    }

    let surplus = positional.count();
    if surplus > 0 {
        let accepted = params.iter()
            .filter(|(_, slot)| matches!(slot, Slot::Required | Slot::Optional))
            .count();
        return Err(format!(
            "'{name}' got too many positional arguments (expected at most {accepted}, got {given})"
        ));
    }

    let collector = params.iter().position(|(_, slot)| *slot == Slot::Keywords);
    let mut collected = BTreeMap::new();

    for (key, value) in kwargs {
        let target = params.iter().position(|(param, slot)| {
            *param == key && matches!(slot, Slot::Required | Slot::Optional)
        });

        match target {
            Some(index) if bound[index].is_some() => {
                return Err(format!("'{name}' got multiple values for argument '{key}'"));
            },
            Some(index) => bound[index] = Some(value),
            None if collector.is_some() => {
                collected.insert(key, value);
            },
            None => return Err(format!("'{name}' got an unexpected keyword argument '{key}'")),
        }
    }

    if let Some(index) = collector {
        bound[index] = Some(Value::map(collected));
    }

    for (index, (param, slot)) in params.iter().enumerate() {
        if *slot == Slot::Required && bound[index].is_none() {
            return Err(format!("'{name}' missing required argument '{param}'"));
        }
    }

    Ok(bound)
}

impl Interpreter {
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        span: SrcSpan,
        ctx: &Arc<Context>,
    ) -> TaskResult {
        match callee {
            Value::Function(function) => self.call_function(function, args, kwargs, span, ctx),
            Value::BuiltIn(builtin) => builtins::invoke(self, builtin, args, kwargs, span, ctx),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::Type,
                format!("'{}' is not callable", other.type_name()),
                span,
                ctx
            )),
        }
    }

    fn call_function(
        &mut self,
        function: &Arc<Function>,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        span: SrcSpan,
        caller: &Arc<Context>,
    ) -> TaskResult {
        let def = &function.def;
        let slots = def.params.iter()
            .map(|param| (param.name(), Slot::from(param)))
            .collect::<Vec<_>>();

        let bound = bind_arguments(&function.name, &slots, args, kwargs)
            .map_err(|message| RuntimeError::new(RuntimeErrorKind::Runtime, message, span, caller))?;

        let context = Context::nested(function.name.clone(), &function.closure, Some(caller.clone()), span);

        for (param, value) in def.params.iter().zip(bound) {
            let value = match (value, param) {
                (Some(value), _) => value,
                // defaults are evaluated on every call, in the defining scope
                (None, Param::Default(_, default)) => self.evaluate(default, &function.closure)?,
                (None, _) => Value::None,
            };
            context.assign(param.name(), value);
        }

        if def.is_async {
            return Ok(Value::Coroutine(Coroutine::call(function.clone(), context)));
        }

        self.run_body(function, context)
    }

    /// Runs a function body in a context whose parameters are already bound.
    pub fn run_body(&mut self, function: &Function, context: Arc<Context>) -> TaskResult {
        let def = &function.def;

        if self.depth >= self.config.max_depth {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Runtime,
                format!("Maximum recursion depth exceeded ({})", self.config.max_depth),
                def.body.location(),
                &context
            ));
        }

        self.depth += 1;
        let result = self.visit(&def.body, &context);
        self.depth -= 1;

        match result {
            Ok(value) if def.auto_return => Ok(value),
            Ok(_) => Ok(Value::None),
            Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Error(error)) => Err(*error),
            Err(signal) => Err(stray_signal(&signal, def.body.location(), &context)),
        }
    }

    /// Drives a coroutine result to completion; other values pass through.
    pub fn settle(&mut self, value: Value, span: SrcSpan, ctx: &Context) -> TaskResult {
        match value {
            Value::Coroutine(coroutine) => coroutine.drive(self, span, ctx),
            other => Ok(other),
        }
    }
}

/// `break` or `continue` that escaped every loop.
pub fn stray_signal(signal: &Signal, span: SrcSpan, ctx: &Context) -> RuntimeError {
    let keyword = match signal {
        Signal::Continue => "continue",
        _ => "break",
    };

    RuntimeError::new(RuntimeErrorKind::Runtime, format!("'{keyword}' outside of a loop"), span, ctx)
}
