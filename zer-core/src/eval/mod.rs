#[cfg(test)]
mod tests;

pub mod error;
pub mod call;
pub mod task;
pub mod module;

pub mod prelude {
    pub use super::{
        error::*,
        call::*,
        task::*,
        module::*,
        Interpreter
    };
}

use std::{
    collections::BTreeMap,
    sync::{atomic::{AtomicBool, Ordering}, Arc},
    time::Instant,
};

use tracing::debug;

use crate::{
    environment::prelude::{Context, Function, Namespace, SymbolTable, Value},
    parser::prelude::{Arg, BinOp, Module, Node, Number, UnaryOp},
    utils::prelude::SrcSpan,
    Config,
};
use self::{
    call::stray_signal,
    error::{Eval, RuntimeError, RuntimeErrorKind, Signal},
    task::{Deadline, TaskResult},
};

/// Walks the syntax tree. One per OS thread; threads share the globals.
pub struct Interpreter {
    pub config: Arc<Config>,
    pub globals: Arc<SymbolTable>,
    depth: usize,
    cancel: Option<Arc<AtomicBool>>,
    deadline: Option<Deadline>,
}

impl Interpreter {
    pub fn new(config: Arc<Config>, globals: Arc<SymbolTable>) -> Self {
        Self {
            config,
            globals,
            depth: 0,
            cancel: None,
            deadline: None,
        }
    }

    /// A fresh interpreter for another thread, sharing the globals.
    pub fn fork(&self) -> Self {
        Self::new(self.config.clone(), self.globals.clone())
    }

    pub fn with_cancel(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Fails once the thread was cancelled or the innermost `timeout` ran out.
    pub fn check_cancelled(&self, span: SrcSpan, ctx: &Context) -> Result<(), RuntimeError> {
        if self.is_cancelled() {
            return Err(RuntimeError::new(RuntimeErrorKind::Runtime, "Thread was cancelled", span, ctx));
        }
        if let Some(deadline) = self.deadline.filter(|deadline| Instant::now() >= deadline.at) {
            debug!(seconds = deadline.limit.as_secs_f64(), "coroutine timed out");
            return Err(RuntimeError::new(
                RuntimeErrorKind::Runtime,
                format!("Coroutine timed out after {} seconds", deadline.limit.as_secs_f64()),
                span,
                ctx
            ));
        }
        Ok(())
    }

    /// Runs top-level statements. The result is the value of a `return`
    /// that fires, or else of the last statement.
    pub fn run_module(&mut self, module: &Module, ctx: &Arc<Context>) -> TaskResult {
        let mut last = Value::None;

        for statement in &module.statements {
            match self.visit(statement, ctx) {
                Ok(value) => last = value,
                Err(Signal::Return(value)) => return Ok(value),
                Err(Signal::Error(error)) => return Err(*error),
                Err(signal) => return Err(stray_signal(&signal, statement.location(), ctx)),
            }
        }

        Ok(last)
    }

    /// Evaluates an expression outside any function body.
    pub fn evaluate(&mut self, node: &Node, ctx: &Arc<Context>) -> TaskResult {
        match self.visit(node, ctx) {
            Ok(value) | Err(Signal::Return(value)) => Ok(value),
            Err(Signal::Error(error)) => Err(*error),
            Err(signal) => Err(stray_signal(&signal, node.location(), ctx)),
        }
    }

    pub fn visit(&mut self, node: &Node, ctx: &Arc<Context>) -> Eval {
        match node {
            Node::Number { value: Number::Int(value), .. } => Ok(Value::Int(*value)),
            Node::Number { value: Number::Float(value), .. } => Ok(Value::Float(*value)),
            Node::Str { value, .. } => Ok(Value::str(value)),
            Node::List { elements, .. } => {
                let mut items = Vec::with_capacity(elements.len());
                for element in elements {
                    items.push(self.visit(element, ctx)?);
                }
                Ok(Value::list(items))
            },
            Node::Map { entries, .. } => {
                let mut map = BTreeMap::new();
                for (key, value) in entries {
                    let key_value = self.visit(key, ctx)?;
                    let Value::Str(name) = key_value else {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::Type,
                            format!("Hashmap keys must be strings, got '{}'", key_value.type_name()),
                            key.location(),
                            ctx
                        ).into());
                    };
                    map.insert(name.to_string(), self.visit(value, ctx)?);
                }
                Ok(Value::map(map))
            },
            Node::Block { statements, .. } => {
                let mut last = Value::None;
                for statement in statements {
                    self.check_cancelled(statement.location(), ctx)?;
                    last = self.visit(statement, ctx)?;
                }
                Ok(last)
            },

            Node::VarAccess { name, location } => ctx.lookup(name)
                .ok_or_else(|| undefined(name, *location, ctx)),
            Node::VarAssign { name, value, .. } => {
                let value = self.visit(value, ctx)?;
                ctx.assign(name, value.clone());
                Ok(value)
            },
            Node::MultiAssign { names, value, location } => {
                let value = self.visit(value, ctx)?;
                unpack(value.clone(), names, *location, ctx)?;
                Ok(value)
            },
            Node::Alias { name, alias, location } => {
                let value = ctx.lookup(name).ok_or_else(|| undefined(name, *location, ctx))?;
                ctx.assign(alias, value.clone());
                Ok(value)
            },
            Node::IndexAssign { target, index, value, location } => {
                let key = self.visit(index, ctx)?;
                let value = self.visit(value, ctx)?;
                self.assign_index(target, key, value.clone(), *location, ctx)?;
                Ok(value)
            },
            Node::Del { names, location } => {
                for name in names {
                    ctx.remove(name).ok_or_else(|| undefined(name, *location, ctx))?;
                }
                Ok(Value::None)
            },

            Node::BinOp { left, op: BinOp::And, right, location } => {
                let left = self.visit(left, ctx)?;
                if !left.logic_operand().map_err(|error| error.at(*location, ctx))? {
                    return Ok(Value::Bool(false));
                }
                let right = self.visit(right, ctx)?;
                Ok(Value::Bool(right.logic_operand().map_err(|error| error.at(*location, ctx))?))
            },
            Node::BinOp { left, op: BinOp::Or, right, location } => {
                let left = self.visit(left, ctx)?;
                if left.logic_operand().map_err(|error| error.at(*location, ctx))? {
                    return Ok(Value::Bool(true));
                }
                let right = self.visit(right, ctx)?;
                Ok(Value::Bool(right.logic_operand().map_err(|error| error.at(*location, ctx))?))
            },
            Node::BinOp { left, op, right, location } => {
                let left = self.visit(left, ctx)?;
                let right = self.visit(right, ctx)?;
                Ok(left.binary(*op, &right).map_err(|error| error.at(*location, ctx))?)
            },
            Node::Unary { op, operand, location } => {
                let operand = self.visit(operand, ctx)?;
                let result = match op {
                    UnaryOp::Plus => operand.identity(),
                    UnaryOp::Minus => operand.negate(),
                    UnaryOp::Not => operand.not(),
                };
                Ok(result.map_err(|error| error.at(*location, ctx))?)
            },

            Node::If { cases, else_case, multiline, .. } => {
                for case in cases {
                    if self.visit(&case.condition, ctx)?.is_truthy() {
                        let value = self.visit(&case.body, ctx)?;
                        return Ok(if *multiline { Value::None } else { value });
                    }
                }
                match else_case {
                    Some(body) => {
                        let value = self.visit(body, ctx)?;
                        Ok(if *multiline { Value::None } else { value })
                    },
                    None => Ok(Value::None),
                }
            },
            Node::For { var, start, end, step, body, multiline, location } => {
                let start = self.visit(start, ctx)?;
                let end = self.visit(end, ctx)?;
                let step = match step {
                    Some(step) => self.visit(step, ctx)?,
                    None => Value::Int(1),
                };
                self.for_range(var, start, end, step, body, *multiline, *location, ctx)
            },
            Node::ForIn { vars, iterable, body, multiline, location } => {
                let iterable = self.visit(iterable, ctx)?;
                let items = iteration_items(&iterable)
                    .ok_or_else(|| RuntimeError::new(
                        RuntimeErrorKind::Type,
                        format!("Cannot iterate over '{}'", iterable.type_name()),
                        *location,
                        ctx
                    ))?;

                let mut collected = vec![];
                for item in items {
                    match vars.as_slice() {
                        [name] => ctx.assign(name, item),
                        names => unpack(item, names, *location, ctx)?,
                    }
                    self.check_cancelled(*location, ctx)?;

                    match self.visit(body, ctx) {
                        Ok(value) => collected.push(value),
                        Err(Signal::Continue) => {},
                        Err(Signal::Break) => break,
                        Err(signal) => return Err(signal),
                    }
                }
                Ok(loop_value(collected, *multiline))
            },
            Node::While { condition, body, multiline, location } => {
                let mut collected = vec![];
                while self.visit(condition, ctx)?.is_truthy() {
                    self.check_cancelled(*location, ctx)?;

                    match self.visit(body, ctx) {
                        Ok(value) => collected.push(value),
                        Err(Signal::Continue) => {},
                        Err(Signal::Break) => break,
                        Err(signal) => return Err(signal),
                    }
                }
                Ok(loop_value(collected, *multiline))
            },

            Node::FuncDef(def) => {
                let name = def.name.clone().unwrap_or_else(|| "<anonymous>".into());
                let mut value = Value::Function(Arc::new(Function {
                    name,
                    def: def.clone(),
                    closure: ctx.clone(),
                }));

                // the decorator written closest to `defun` applies first
                for decorator in def.decorators.iter().rev() {
                    let wrapper = self.visit(decorator, ctx)?;
                    value = self.call_value(&wrapper, vec![value], BTreeMap::new(), decorator.location(), ctx)?;
                }

                if let Some(name) = &def.name {
                    ctx.assign(name, value.clone());
                }
                Ok(value)
            },
            Node::Call { callee, args, location } => {
                let callee = self.visit(callee, ctx)?;
                let (positional, keywords) = self.arguments(args, ctx)?;
                Ok(self.call_value(&callee, positional, keywords, *location, ctx)?)
            },
            Node::Member { object, name, location } => {
                let object = self.visit(object, ctx)?;
                let Value::Namespace(namespace) = object else {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Type,
                        format!("'{}' has no member '{name}'", object.type_name()),
                        *location,
                        ctx
                    ).into());
                };

                self.initialize_namespace(&namespace)?;
                namespace.member(name).ok_or_else(|| RuntimeError::new(
                    RuntimeErrorKind::Runtime,
                    format!("'{name}' is not a member of namespace '{}'", namespace.name),
                    *location,
                    ctx
                ).into())
            },
            Node::Await { value, location } => match self.visit(value, ctx)? {
                Value::Coroutine(coroutine) => Ok(coroutine.drive(self, *location, ctx)?),
                other => Err(RuntimeError::new(
                    RuntimeErrorKind::Type,
                    format!("Cannot await '{}'", other.type_name()),
                    *location,
                    ctx
                ).into()),
            },

            Node::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.visit(value, ctx)?,
                    None => Value::None,
                };
                Err(Signal::Return(value))
            },
            Node::Continue { .. } => Err(Signal::Continue),
            Node::Break { .. } => Err(Signal::Break),

            Node::Load { path, kind, location } => Ok(self.load(path, *kind, *location, ctx)?),
            Node::Namespace { name, body, location } => {
                let context = Context::nested(name.clone(), ctx, Some(ctx.clone()), *location);
                let namespace = Value::Namespace(Arc::new(Namespace::new(name.clone(), body.clone(), context)));
                ctx.assign(name, namespace.clone());
                Ok(namespace)
            },
            Node::Using { names, parent, location } => {
                for name in names {
                    ctx.declare_escape(name, *parent)
                        .map_err(|message| RuntimeError::new(RuntimeErrorKind::Runtime, message, *location, ctx))?;
                }
                Ok(Value::None)
            },
        }
    }

    fn arguments(&mut self, args: &[Arg], ctx: &Arc<Context>) -> Eval<(Vec<Value>, BTreeMap<String, Value>)> {
        let mut positional = vec![];
        let mut keywords = BTreeMap::new();

        for arg in args {
            match arg {
                Arg::Positional(node) => positional.push(self.visit(node, ctx)?),
                Arg::Keyword(name, node) => {
                    let value = self.visit(node, ctx)?;
                    keywords.insert(name.clone(), value);
                },
                Arg::Spread(node) => match self.visit(node, ctx)? {
                    Value::List(list) => positional.extend(list.snapshot()),
                    _ => return Err(RuntimeError::new(
                        RuntimeErrorKind::Runtime,
                        "Can only unpack a list with '*'",
                        node.location(),
                        ctx
                    ).into()),
                },
                Arg::SpreadKeywords(node) => match self.visit(node, ctx)? {
                    Value::Map(map) => keywords.extend(map.snapshot()),
                    _ => return Err(RuntimeError::new(
                        RuntimeErrorKind::Runtime,
                        "Can only unpack a hashmap with '**'",
                        node.location(),
                        ctx
                    ).into()),
                },
            }
        }

        Ok((positional, keywords))
    }

    /// Runs a namespace body the first time one of its members is read.
    fn initialize_namespace(&mut self, namespace: &Namespace) -> Eval<()> {
        if !namespace.claim_initialization() {
            return Ok(());
        }

        debug!(namespace = %namespace.name, "initializing namespace");
        for statement in namespace.body.iter() {
            match self.visit(statement, &namespace.context) {
                Ok(_) => {},
                Err(Signal::Return(_)) => break,
                Err(Signal::Error(error)) => return Err(Signal::Error(error)),
                Err(signal) => return Err(stray_signal(&signal, statement.location(), &namespace.context).into()),
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn for_range(
        &mut self,
        var: &str,
        start: Value,
        end: Value,
        step: Value,
        body: &Node,
        multiline: bool,
        location: SrcSpan,
        ctx: &Arc<Context>,
    ) -> Eval {
        for bound in [&start, &end, &step] {
            if !matches!(bound, Value::Int(_) | Value::Float(_) | Value::Decimal(_)) {
                return Err(RuntimeError::new(
                    RuntimeErrorKind::Type,
                    format!("'for' loop bounds must be numbers, got '{}'", bound.type_name()),
                    location,
                    ctx
                ).into());
            }
        }

        let zero = Value::Int(0);
        if step.equals(&zero) {
            return Err(RuntimeError::new(
                RuntimeErrorKind::Runtime,
                "Step value for a 'for' loop cannot be zero",
                location,
                ctx
            ).into());
        }

        let op_error = |error: crate::environment::prelude::OpError| error.at(location, ctx);
        let ascending = step.compare(BinOp::Gt, &zero).map_err(op_error)?;
        let keep_going = if ascending { BinOp::Lt } else { BinOp::Gt };

        let mut collected = vec![];
        let mut current = start;

        while current.compare(keep_going, &end).map_err(op_error)? {
            ctx.assign(var, current.clone());
            self.check_cancelled(location, ctx)?;

            match self.visit(body, ctx) {
                Ok(value) => collected.push(value),
                Err(Signal::Continue) => {},
                Err(Signal::Break) => break,
                Err(signal) => return Err(signal),
            }

            current = current.add(&step).map_err(op_error)?;
        }

        Ok(loop_value(collected, multiline))
    }

    /// Stores `value` at `target $ key`, writing the changed container back
    /// through the chain of indexes that led to it.
    fn assign_index(&mut self, target: &Node, key: Value, value: Value, span: SrcSpan, ctx: &Arc<Context>) -> Eval<()> {
        match target {
            Node::VarAccess { name, location } => {
                let mut container = ctx.lookup(name).ok_or_else(|| undefined(name, *location, ctx))?;
                container.set_index(&key, value).map_err(|error| error.at(span, ctx))?;

                if !is_reusable(&container) {
                    ctx.assign(name, container);
                }
                Ok(())
            },
            Node::BinOp { left, op: BinOp::Index, right, .. } => {
                let outer_key = self.visit(right, ctx)?;
                let mut container = self.visit(target, ctx)?;
                container.set_index(&key, value).map_err(|error| error.at(span, ctx))?;
                self.assign_index(left, outer_key, container, span, ctx)
            },
            other => {
                let mut container = self.visit(other, ctx)?;
                container.set_index(&key, value).map_err(|error| error.at(span, ctx))?;
                Ok(())
            },
        }
    }
}

fn undefined(name: &str, span: SrcSpan, ctx: &Context) -> Signal {
    RuntimeError::new(RuntimeErrorKind::Runtime, format!("'{name}' is not defined"), span, ctx).into()
}

fn is_reusable(value: &Value) -> bool {
    match value {
        Value::List(list) => list.is_reusable(),
        Value::Map(map) => map.is_reusable(),
        _ => false,
    }
}

fn loop_value(collected: Vec<Value>, multiline: bool) -> Value {
    if multiline { Value::None } else { Value::list(collected) }
}

/// Elements a `for ... in` visits: list items, characters, or `[key, value]`
/// pairs of a hashmap.
fn iteration_items(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(list) => Some(list.snapshot()),
        Value::Str(text) => Some(text.chars().map(|ch| Value::str(ch.to_string())).collect()),
        Value::Bytes(bytes) => Some(bytes.iter().map(|byte| Value::Int(*byte as i64)).collect()),
        Value::Map(map) => Some(map.read(|entries| {
            entries.iter()
                .map(|(key, value)| Value::list(vec![Value::str(key), value.clone()]))
                .collect()
        })),
        _ => None,
    }
}

fn unpack(value: Value, names: &[String], span: SrcSpan, ctx: &Context) -> Result<(), RuntimeError> {
    let Value::List(list) = value else {
        return Err(RuntimeError::new(RuntimeErrorKind::Type, "Value to unpack must be a list", span, ctx));
    };

    let mut items = list.snapshot();
    if items.len() == 1 && names.len() > 1 {
        if let Value::List(inner) = &items[0] {
            items = inner.snapshot();
        }
    }

    if items.len() != names.len() {
        let problem = if items.len() < names.len() { "Not enough" } else { "Too many" };
        return Err(RuntimeError::new(
            RuntimeErrorKind::Runtime,
            format!("{problem} values to unpack (expected {}, got {})", names.len(), items.len()),
            span,
            ctx
        ));
    }

    for (name, item) in names.iter().zip(items) {
        ctx.assign(name, item);
    }
    Ok(())
}
