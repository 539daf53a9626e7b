use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    path::PathBuf,
    sync::{atomic::{AtomicBool, Ordering}, Arc, PoisonError, RwLock},
};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero, One};

use crate::{
    builtins::prelude::BuiltIn,
    eval::task::{Channel, CoChannel, Coroutine, FutureHandle, ThreadHandle, ThreadPool},
    parser::prelude::{escape_str, FuncDef, Node},
};
use super::environment::Context;

/// Storage of a list or map. `Plain` values are copied on write, so every
/// binding behaves as if it held its own copy. `Reusable` values are one
/// shared buffer mutated in place by everybody holding it.
#[derive(Debug)]
pub enum Shared<T> {
    Plain(Arc<T>),
    Reusable(Arc<RwLock<T>>),
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        match self {
            Shared::Plain(value) => Shared::Plain(value.clone()),
            Shared::Reusable(value) => Shared::Reusable(value.clone()),
        }
    }
}

impl<T: Clone> Shared<T> {
    pub fn new(value: T) -> Self {
        Shared::Plain(Arc::new(value))
    }

    pub fn reusable(value: T) -> Self {
        Shared::Reusable(Arc::new(RwLock::new(value)))
    }

    pub fn is_reusable(&self) -> bool {
        matches!(self, Shared::Reusable(_))
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Shared::Plain(value) => f(value),
            Shared::Reusable(value) => f(&value.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Mutates this handle's contents. For a plain value the buffer is
    /// detached first if anybody else still refers to it.
    pub fn update<R>(&mut self, f: impl FnOnce(&mut T) -> R) -> R {
        match self {
            Shared::Plain(value) => f(Arc::make_mut(value)),
            Shared::Reusable(value) => f(&mut value.write().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    pub fn snapshot(&self) -> T {
        self.read(T::clone)
    }

    pub fn with_reusable(&self, reusable: bool) -> Self {
        if reusable {
            Self::reusable(self.snapshot())
        } else {
            Self::new(self.snapshot())
        }
    }
}

pub type List = Shared<Vec<Value>>;
pub type Map = Shared<BTreeMap<String, Value>>;

pub struct Function {
    pub name: String,
    pub def: Arc<FuncDef>,
    /// The context the function was defined in.
    pub closure: Arc<Context>,
}

pub struct Namespace {
    pub name: String,
    pub body: Arc<Vec<Node>>,
    pub context: Arc<Context>,
    initialized: AtomicBool,
}

impl Namespace {
    pub fn new(name: String, body: Arc<Vec<Node>>, context: Arc<Context>) -> Self {
        Self {
            name,
            body,
            context,
            initialized: AtomicBool::new(false),
        }
    }

    /// True exactly once: for the caller that has to run the body.
    pub fn claim_initialization(&self) -> bool {
        !self.initialized.swap(true, Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn member(&self, name: &str) -> Option<Value> {
        self.context.scope.get_local(name)
    }
}

/// Files are just a name and a path; every operation opens and closes them.
#[derive(Debug, Clone, PartialEq)]
pub struct FileHandle {
    pub name: String,
    pub path: PathBuf,
}

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Arc<BigRational>),
    Str(Arc<str>),
    Bytes(Arc<[u8]>),
    List(List),
    Map(Map),
    Function(Arc<Function>),
    BuiltIn(&'static BuiltIn),
    Coroutine(Arc<Coroutine>),
    Namespace(Arc<Namespace>),
    Channel(Channel),
    CoChannel(CoChannel),
    Thread(Arc<ThreadHandle>),
    ThreadPool(Arc<ThreadPool>),
    Future(Arc<FutureHandle>),
    File(Arc<FileHandle>),
}

/// Names returned by `type()`, also bound as globals (`int`, `list`, ...).
pub const TYPE_NAMES: &[(&str, &str)] = &[
    ("list", "<list>"),
    ("str", "<str>"),
    ("int", "<int>"),
    ("float", "<float>"),
    ("func", "<func>"),
    ("bool", "<bool>"),
    ("hashmap", "<hashmap>"),
    ("bytes", "<bytes>"),
    ("none_type", "<none>"),
    ("cfloat", "<cfloat>"),
    ("thread", "<thread>"),
    ("channel_type", "<channel>"),
    ("co_channel_type", "<co-channel>"),
    ("thread_pool_type", "<thread-pool>"),
    ("future_type", "<future>"),
    ("coroutine_type", "<coroutine>"),
    ("namespace_type", "<namespace>"),
    ("file_type", "<File>"),
];

impl Value {
    pub fn str(value: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(value.as_ref()))
    }

    pub fn list(values: Vec<Value>) -> Self {
        Value::List(Shared::new(values))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Shared::new(entries))
    }

    pub fn decimal(value: BigRational) -> Self {
        Value::Decimal(Arc::new(value))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "<none>",
            Value::Bool(_) => "<bool>",
            Value::Int(_) => "<int>",
            Value::Float(_) => "<float>",
            Value::Decimal(_) => "<cfloat>",
            Value::Str(_) => "<str>",
            Value::Bytes(_) => "<bytes>",
            Value::List(_) => "<list>",
            Value::Map(_) => "<hashmap>",
            Value::Function(_) | Value::BuiltIn(_) => "<func>",
            Value::Coroutine(_) => "<coroutine>",
            Value::Namespace(_) => "<namespace>",
            Value::Channel(_) => "<channel>",
            Value::CoChannel(_) => "<co-channel>",
            Value::Thread(_) => "<thread>",
            Value::ThreadPool(_) => "<thread-pool>",
            Value::Future(_) => "<future>",
            Value::File(_) => "<File>",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(value) => *value,
            Value::Int(value) => *value != 0,
            Value::Float(value) => *value != 0.0,
            Value::Decimal(value) => !value.is_zero(),
            Value::Str(value) => !value.is_empty(),
            Value::Bytes(value) => !value.is_empty(),
            Value::List(list) => list.read(|items| !items.is_empty()),
            Value::Map(map) => map.read(|entries| !entries.is_empty()),
            _ => true,
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Function(_) | Value::BuiltIn(_))
    }

    /// Quoted form used inside collections and by the REPL.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(value) => escape_str(value),
            other => other.to_string(),
        }
    }
}

pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".into();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".into() } else { "-inf".into() };
    }

    let text = value.to_string();
    if text.contains('.') { text } else { format!("{text}.0") }
}

/// Exact decimal expansion when the denominator allows one, `n/d` otherwise.
pub fn format_decimal(value: &BigRational) -> String {
    if value.is_integer() {
        return value.numer().to_string();
    }

    let two = BigInt::from(2);
    let five = BigInt::from(5);
    let mut rest = value.denom().clone();
    let (mut twos, mut fives) = (0usize, 0usize);

    while (&rest % &two).is_zero() {
        rest /= &two;
        twos += 1;
    }
    while (&rest % &five).is_zero() {
        rest /= &five;
        fives += 1;
    }
    if !rest.is_one() {
        return format!("{}/{}", value.numer(), value.denom());
    }

    let places = twos.max(fives);
    let scale = BigRational::from_integer(num_traits::pow(BigInt::from(10), places));
    let scaled = (value * scale).to_integer();
    let digits = format!("{:0>width$}", scaled.abs().to_string(), width = places + 1);
    let (whole, fraction) = digits.split_at(digits.len() - places);
    let sign = if scaled.is_negative() { "-" } else { "" };

    format!("{sign}{whole}.{fraction}")
}

fn format_bytes(bytes: &[u8]) -> String {
    let mut out = String::from("b\"");
    for byte in bytes {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            0x20..=0x7e => out.push(*byte as char),
            _ => out.push_str(&format!("\\x{byte:02x}")),
        }
    }
    out.push('"');
    out
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "none"),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{}", format_float(*value)),
            Value::Decimal(value) => write!(f, "{}", format_decimal(value)),
            Value::Str(value) => write!(f, "{value}"),
            Value::Bytes(value) => write!(f, "{}", format_bytes(value)),
            Value::List(list) => list.read(|items| {
                let items = items.iter().map(Value::repr).collect::<Vec<_>>();
                write!(f, "[{}]", items.join(", "))
            }),
            Value::Map(map) => map.read(|entries| {
                let entries = entries.iter()
                    .map(|(key, value)| format!("{}: {}", escape_str(key), value.repr()))
                    .collect::<Vec<_>>();
                write!(f, "{{{}}}", entries.join(", "))
            }),
            Value::Function(function) => write!(f, "<function {}>", function.name),
            Value::BuiltIn(builtin) => write!(f, "<built-in function {}>", builtin.name),
            Value::Coroutine(coroutine) => write!(f, "<coroutine {}>", coroutine.name),
            Value::Namespace(namespace) => write!(f, "<namespace {}>", namespace.name),
            Value::Channel(_) => write!(f, "<channel>"),
            Value::CoChannel(_) => write!(f, "<co-channel>"),
            Value::Thread(thread) => write!(f, "<thread #{}>", thread.id),
            Value::ThreadPool(pool) => write!(f, "<thread-pool of {}>", pool.max_workers),
            Value::Future(_) => write!(f, "<future>"),
            Value::File(file) => write!(f, "<File {}>", file.name),
        }
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::str(value)
    }
}
