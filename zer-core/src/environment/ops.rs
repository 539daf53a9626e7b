use std::{cmp::Ordering, sync::Arc};

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::{
    eval::error::{RuntimeError, RuntimeErrorKind},
    parser::prelude::{escape_str, BinOp},
    utils::prelude::SrcSpan,
};
use super::{environment::Context, value::Value};

/// Failure of an operator. The evaluator attaches the location.
#[derive(Debug, Clone, PartialEq)]
pub struct OpError {
    pub kind: RuntimeErrorKind,
    pub message: String,
}

impl OpError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn at(self, span: SrcSpan, ctx: &Context) -> RuntimeError {
        RuntimeError::new(self.kind, self.message, span, ctx)
    }
}

pub type OpResult<T = Value> = Result<T, OpError>;

fn illegal(op: &str, left: &Value, right: &Value) -> OpError {
    OpError::new(
        RuntimeErrorKind::Type,
        format!("Illegal operation '{op}' between '{}' and '{}'", left.type_name(), right.type_name())
    )
}

fn illegal_unary(op: &str, operand: &Value) -> OpError {
    OpError::new(
        RuntimeErrorKind::Type,
        format!("Illegal operation '{op}' on '{}'", operand.type_name())
    )
}

pub fn none_error() -> OpError {
    OpError::new(RuntimeErrorKind::Type, "Cannot perform arithmetic or logical operation on 'none'")
}

fn math(message: &str) -> OpError {
    OpError::new(RuntimeErrorKind::Math, message)
}

fn overflow() -> OpError {
    math("Integer overflow")
}

/// Longest string (in bytes) or list a repetition may build.
pub const MAX_REPEAT_LEN: usize = 1 << 28;

/// Length of `len` items repeated `count` times, if it stays in bounds.
fn repeated_len(len: usize, count: i64) -> OpResult<usize> {
    let count = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
    if len == 0 {
        return Ok(0);
    }

    len.checked_mul(count)
        .filter(|total| *total <= MAX_REPEAT_LEN)
        .map(|_| count)
        .ok_or_else(|| OpError::new(
            RuntimeErrorKind::Runtime,
            format!("Cannot repeat a sequence of length {len} {count} times: the result is too large")
        ))
}

fn division_by_zero() -> OpError {
    math("Division by zero")
}

fn modulo_by_zero() -> OpError {
    math("Modulo by zero")
}

fn domain_error() -> OpError {
    math("Math domain error: cannot raise a negative number to a fractional power")
}

/// Resolves a possibly negative index against a sequence length.
pub fn normalize_index(index: i64, len: usize) -> Option<usize> {
    let resolved = if index < 0 { index + len as i64 } else { index };
    (0..len as i64).contains(&resolved).then_some(resolved as usize)
}

pub fn to_rational(value: f64) -> OpResult<BigRational> {
    BigRational::from_float(value)
        .ok_or_else(|| math(&format!("Cannot convert '{value}' to an exact decimal")))
}

/// Parses `12`, `-1.25`, `3e-2` or `1/3` exactly.
pub fn parse_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();

    if let Some((numer, denom)) = text.split_once('/') {
        let numer: BigInt = numer.trim().parse().ok()?;
        let denom: BigInt = denom.trim().parse().ok()?;
        return (!denom.is_zero()).then(|| BigRational::new(numer, denom));
    }

    let (mantissa, exponent) = match text.split_once(['e', 'E']) {
        Some((mantissa, exponent)) => (mantissa, exponent.parse::<i32>().ok()?),
        None => (text, 0),
    };
    let (negative, digits) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));

    let is_digits = |part: &str| part.chars().all(|ch| ch.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !is_digits(whole) || !is_digits(fraction) {
        return None;
    }

    let numer: BigInt = format!("{whole}{fraction}").parse().ok()?;
    let scale = fraction.len() as i64 - exponent as i64;
    let ten = BigInt::from(10);
    let value = if scale >= 0 {
        BigRational::new(numer, num_traits::pow(ten, scale as usize))
    } else {
        BigRational::from_integer(numer * num_traits::pow(ten, (-scale) as usize))
    };

    Some(if negative { -value } else { value })
}

enum Pair {
    Ints(i64, i64),
    Floats(f64, f64),
    Decimals(BigRational, BigRational),
}

fn as_rational(value: &Value) -> OpResult<Option<BigRational>> {
    Ok(match value {
        Value::Int(value) => Some(BigRational::from_integer(BigInt::from(*value))),
        Value::Float(value) => Some(to_rational(*value)?),
        Value::Decimal(value) => Some(value.as_ref().clone()),
        _ => None,
    })
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Int(value) => Some(*value as f64),
        Value::Float(value) => Some(*value),
        Value::Decimal(value) => value.to_f64(),
        _ => None,
    }
}

/// Widens two numbers to a common representation: int, then float, then
/// exact decimal.
fn promote(left: &Value, right: &Value) -> OpResult<Option<Pair>> {
    Ok(match (left, right) {
        (Value::Int(a), Value::Int(b)) => Some(Pair::Ints(*a, *b)),
        (Value::Decimal(_), _) | (_, Value::Decimal(_)) => {
            match (as_rational(left)?, as_rational(right)?) {
                (Some(a), Some(b)) => Some(Pair::Decimals(a, b)),
                _ => None,
            }
        },
        _ => match (as_float(left), as_float(right)) {
            (Some(a), Some(b)) => Some(Pair::Floats(a, b)),
            _ => None,
        },
    })
}

fn floor_div(a: i64, b: i64) -> OpResult<i64> {
    let quotient = a.checked_div(b).ok_or_else(overflow)?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(quotient - 1)
    } else {
        Ok(quotient)
    }
}

fn int_op(op: BinOp, a: i64, b: i64) -> OpResult {
    match op {
        BinOp::Add => a.checked_add(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Sub => a.checked_sub(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Mul => a.checked_mul(b).map(Value::Int).ok_or_else(overflow),
        BinOp::Div if b == 0 => Err(division_by_zero()),
        BinOp::Div => Ok(Value::Float(a as f64 / b as f64)),
        BinOp::FloorDiv if b == 0 => Err(division_by_zero()),
        BinOp::FloorDiv => floor_div(a, b).map(Value::Int),
        BinOp::Mod if b == 0 => Err(modulo_by_zero()),
        BinOp::Mod if b == -1 => Ok(Value::Int(0)),
        BinOp::Mod => {
            let rest = a % b;
            if rest != 0 && ((rest < 0) != (b < 0)) {
                Ok(Value::Int(rest + b))
            } else {
                Ok(Value::Int(rest))
            }
        },
        BinOp::Pow if b >= 0 && matches!(a, 0 | 1) => Ok(Value::Int(if b == 0 { 1 } else { a })),
        BinOp::Pow if b >= 0 && a == -1 => Ok(Value::Int(if b % 2 == 0 { 1 } else { -1 })),
        BinOp::Pow if b >= 0 => u32::try_from(b).ok()
            .and_then(|exp| a.checked_pow(exp))
            .map(Value::Int)
            .ok_or_else(overflow),
        BinOp::Pow if a == 0 => Err(division_by_zero()),
        BinOp::Pow => Ok(Value::Float((a as f64).powf(b as f64))),
        _ => unreachable!("int_op is only called with arithmetic operators"),
    }
}

fn float_op(op: BinOp, a: f64, b: f64) -> OpResult {
    match op {
        BinOp::Add => Ok(Value::Float(a + b)),
        BinOp::Sub => Ok(Value::Float(a - b)),
        BinOp::Mul => Ok(Value::Float(a * b)),
        BinOp::Div if b == 0.0 => Err(division_by_zero()),
        BinOp::Div => Ok(Value::Float(a / b)),
        BinOp::FloorDiv if b == 0.0 => Err(division_by_zero()),
        BinOp::FloorDiv => Ok(Value::Float((a / b).floor())),
        BinOp::Mod if b == 0.0 => Err(modulo_by_zero()),
        BinOp::Mod => {
            let rest = a % b;
            if rest != 0.0 && ((rest < 0.0) != (b < 0.0)) {
                Ok(Value::Float(rest + b))
            } else {
                Ok(Value::Float(rest))
            }
        },
        BinOp::Pow if a < 0.0 && b.fract() != 0.0 => Err(domain_error()),
        BinOp::Pow if a == 0.0 && b < 0.0 => Err(division_by_zero()),
        BinOp::Pow => Ok(Value::Float(a.powf(b))),
        _ => unreachable!("float_op is only called with arithmetic operators"),
    }
}

fn decimal_op(op: BinOp, a: BigRational, b: BigRational) -> OpResult {
    match op {
        BinOp::Add => Ok(Value::decimal(a + b)),
        BinOp::Sub => Ok(Value::decimal(a - b)),
        BinOp::Mul => Ok(Value::decimal(a * b)),
        BinOp::Div if b.is_zero() => Err(division_by_zero()),
        BinOp::Div => Ok(Value::decimal(a / b)),
        BinOp::FloorDiv if b.is_zero() => Err(division_by_zero()),
        BinOp::FloorDiv => {
            let quotient = (a / b).floor().to_integer();
            Ok(match quotient.to_i64() {
                Some(value) => Value::Int(value),
                None => Value::decimal(BigRational::from_integer(quotient)),
            })
        },
        BinOp::Mod if b.is_zero() => Err(modulo_by_zero()),
        BinOp::Mod => {
            let quotient = (&a / &b).floor();
            Ok(Value::decimal(a - b * quotient))
        },
        BinOp::Pow => {
            if b.is_integer() {
                let exp = b.to_integer().to_i32().ok_or_else(|| math("Exponent is too large"))?;
                if a.is_zero() && exp < 0 {
                    return Err(division_by_zero());
                }
                return Ok(Value::decimal(a.pow(exp)));
            }

            let (base, exp) = match (a.to_f64(), b.to_f64()) {
                (Some(base), Some(exp)) => (base, exp),
                _ => return Err(math("Exponent is too large")),
            };
            if base < 0.0 {
                return Err(domain_error());
            }
            Ok(Value::decimal(to_rational(base.powf(exp))?))
        },
        _ => unreachable!("decimal_op is only called with arithmetic operators"),
    }
}

fn arithmetic(op: BinOp, left: &Value, right: &Value) -> OpResult {
    if matches!(left, Value::None) || matches!(right, Value::None) {
        return Err(none_error());
    }

    match promote(left, right)? {
        Some(Pair::Ints(a, b)) => int_op(op, a, b),
        Some(Pair::Floats(a, b)) => float_op(op, a, b),
        Some(Pair::Decimals(a, b)) => decimal_op(op, a, b),
        None => Err(illegal(op.symbol(), left, right)),
    }
}

impl Value {
    /// Every binary operator except the short-circuiting `and` / `or`.
    pub fn binary(&self, op: BinOp, other: &Value) -> OpResult {
        match op {
            BinOp::Add => self.add(other),
            BinOp::Sub => self.subtract(other),
            BinOp::Mul => self.multiply(other),
            BinOp::Div | BinOp::FloorDiv | BinOp::Mod | BinOp::Pow => arithmetic(op, self, other),
            BinOp::Index => self.index(other),
            BinOp::Eq | BinOp::NotEq | BinOp::Lt | BinOp::Gt | BinOp::LtEq | BinOp::GtEq => {
                self.compare(op, other).map(Value::Bool)
            },
            BinOp::And => Ok(Value::Bool(self.logic_operand()? && other.logic_operand()?)),
            BinOp::Or => Ok(Value::Bool(self.logic_operand()? || other.logic_operand()?)),
        }
    }

    pub fn add(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
            (Value::Bytes(a), Value::Bytes(b)) => Ok(Value::Bytes([a.as_ref(), b.as_ref()].concat().into())),
            (Value::List(list), item) => {
                let mut list = list.clone();
                list.update(|items| items.push(item.clone()));
                Ok(Value::List(list))
            },
            (Value::Map(map), Value::Map(extra)) => {
                let extra = extra.snapshot();
                let mut map = map.clone();
                map.update(|entries| entries.extend(extra));
                Ok(Value::Map(map))
            },
            (Value::Str(_) | Value::Map(_) | Value::Bytes(_), _) => Err(illegal("+", self, other)),
            _ => arithmetic(BinOp::Add, self, other),
        }
    }

    pub fn subtract(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::List(list), Value::Int(index)) => {
                let len = list.read(Vec::len);
                let Some(position) = normalize_index(*index, len) else {
                    return Err(OpError::new(
                        RuntimeErrorKind::Runtime,
                        format!("Element at index {index} could not be removed from list of length {len} because index is out of bounds")
                    ));
                };

                let mut list = list.clone();
                list.update(|items| items.remove(position));
                Ok(Value::List(list))
            },
            (Value::List(_) | Value::Str(_) | Value::Map(_), _) => Err(illegal("-", self, other)),
            _ => arithmetic(BinOp::Sub, self, other),
        }
    }

    pub fn multiply(&self, other: &Value) -> OpResult {
        match (self, other) {
            (Value::Str(text), Value::Int(count)) => {
                let count = repeated_len(text.len(), *count)?;
                Ok(Value::str(text.repeat(count)))
            },
            (Value::List(list), Value::List(extra)) => {
                let extra = extra.snapshot();
                let mut list = list.clone();
                list.update(|items| items.extend(extra));
                Ok(Value::List(list))
            },
            (Value::List(list), Value::Int(count)) => {
                let count = repeated_len(list.read(Vec::len), *count)?;
                let mut list = list.clone();
                list.update(|items| {
                    let base = std::mem::take(items);
                    *items = (0..count).flat_map(|_| base.iter().cloned()).collect();
                });
                Ok(Value::List(list))
            },
            (Value::List(_) | Value::Str(_) | Value::Map(_), _) => Err(illegal("*", self, other)),
            _ => arithmetic(BinOp::Mul, self, other),
        }
    }

    /// `container $ key`.
    pub fn index(&self, key: &Value) -> OpResult {
        match (self, key) {
            (Value::Str(text), Value::Int(index)) => {
                let len = text.chars().count();
                normalize_index(*index, len)
                    .and_then(|position| text.chars().nth(position))
                    .map(|ch| Value::str(ch.to_string()))
                    .ok_or_else(|| out_of_bounds("string", *index, len))
            },
            (Value::List(list), Value::Int(index)) => list.read(|items| {
                normalize_index(*index, items.len())
                    .map(|position| items[position].clone())
                    .ok_or_else(|| out_of_bounds("list", *index, items.len()))
            }),
            (Value::Bytes(bytes), Value::Int(index)) => {
                normalize_index(*index, bytes.len())
                    .map(|position| Value::Int(bytes[position] as i64))
                    .ok_or_else(|| out_of_bounds("bytes", *index, bytes.len()))
            },
            (Value::Map(map), Value::Str(name)) => map.read(|entries| {
                entries.get(name.as_ref()).cloned().ok_or_else(|| OpError::new(
                    RuntimeErrorKind::Runtime,
                    format!("Key {} not found in hashmap of size {}", escape_str(name), entries.len())
                ))
            }),
            (Value::Str(_) | Value::List(_) | Value::Bytes(_), _) => Err(OpError::new(
                RuntimeErrorKind::Type,
                format!("Index of '{}' must be an int, got '{}'", self.type_name(), key.type_name())
            )),
            (Value::Map(_), _) => Err(OpError::new(
                RuntimeErrorKind::Type,
                format!("Hashmap keys must be strings, got '{}'", key.type_name())
            )),
            _ => Err(illegal("$", self, key)),
        }
    }

    /// Stores `value` under `key`. Plain containers are detached from other
    /// holders first; reusable ones are changed for everybody.
    pub fn set_index(&mut self, key: &Value, value: Value) -> OpResult<()> {
        let type_name = self.type_name();

        match (self, key) {
            (Value::List(list), Value::Int(index)) => {
                let len = list.read(Vec::len);
                let position = normalize_index(*index, len)
                    .ok_or_else(|| out_of_bounds("list", *index, len))?;
                list.update(|items| items[position] = value);
                Ok(())
            },
            (Value::Map(map), Value::Str(name)) => {
                map.update(|entries| entries.insert(name.to_string(), value));
                Ok(())
            },
            (Value::List(_), _) => Err(OpError::new(
                RuntimeErrorKind::Type,
                format!("List index must be an int, got '{}'", key.type_name())
            )),
            (Value::Map(_), _) => Err(OpError::new(
                RuntimeErrorKind::Type,
                format!("Hashmap keys must be strings, got '{}'", key.type_name())
            )),
            _ => Err(OpError::new(
                RuntimeErrorKind::Type,
                format!("'{type_name}' does not support index assignment")
            )),
        }
    }

    pub fn compare(&self, op: BinOp, other: &Value) -> OpResult<bool> {
        let left_none = matches!(self, Value::None);
        let right_none = matches!(other, Value::None);

        if left_none || right_none {
            let both = left_none && right_none;
            return Ok(match op {
                BinOp::Eq | BinOp::LtEq | BinOp::GtEq => both,
                BinOp::NotEq => !both,
                _ => false,
            });
        }

        match op {
            BinOp::Eq => Ok(self.equals(other)),
            BinOp::NotEq => Ok(!self.equals(other)),
            _ => {
                let ordering = self.ordering(other)
                    .ok_or_else(|| illegal(op.symbol(), self, other))?;

                Ok(match (op, ordering) {
                    (_, None) => false,
                    (BinOp::Lt, Some(ordering)) => ordering == Ordering::Less,
                    (BinOp::Gt, Some(ordering)) => ordering == Ordering::Greater,
                    (BinOp::LtEq, Some(ordering)) => ordering != Ordering::Greater,
                    (BinOp::GtEq, Some(ordering)) => ordering != Ordering::Less,
                    _ => false,
                })
            },
        }
    }

    /// `None` when the two values cannot be ordered at all; `Some(None)` for
    /// numbers that are unordered (NaN).
    fn ordering(&self, other: &Value) -> Option<Option<Ordering>> {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => Some(Some(a.cmp(b))),
            (Value::Bool(a), Value::Bool(b)) => Some(Some(a.cmp(b))),
            _ => match promote(self, other) {
                Ok(Some(Pair::Ints(a, b))) => Some(Some(a.cmp(&b))),
                Ok(Some(Pair::Floats(a, b))) => Some(a.partial_cmp(&b)),
                Ok(Some(Pair::Decimals(a, b))) => Some(Some(a.cmp(&b))),
                // a NaN against a decimal
                Err(_) => Some(None),
                Ok(None) => None,
            },
        }
    }

    /// Structural equality. Lists and maps compare element by element after
    /// a length check; handles compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let a = a.snapshot();
                let b = b.snapshot();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.equals(y))
            },
            (Value::Map(a), Value::Map(b)) => {
                let a = a.snapshot();
                let b = b.snapshot();
                a.len() == b.len() && a.iter().all(|(key, x)| b.get(key).is_some_and(|y| x.equals(y)))
            },
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::BuiltIn(a), Value::BuiltIn(b)) => a.name == b.name,
            (Value::Coroutine(a), Value::Coroutine(b)) => Arc::ptr_eq(a, b),
            (Value::Namespace(a), Value::Namespace(b)) => Arc::ptr_eq(a, b),
            (Value::Thread(a), Value::Thread(b)) => Arc::ptr_eq(a, b),
            (Value::ThreadPool(a), Value::ThreadPool(b)) => Arc::ptr_eq(a, b),
            (Value::Future(a), Value::Future(b)) => Arc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => a == b,
            (Value::Channel(a), Value::Channel(b)) => a.same_channel(b),
            (Value::CoChannel(a), Value::CoChannel(b)) => a.same_channel(b),
            _ => matches!(
                promote(self, other),
                Ok(Some(Pair::Ints(..) | Pair::Floats(..) | Pair::Decimals(..)))
            ) && self.ordering(other) == Some(Some(Ordering::Equal)),
        }
    }

    pub fn logic_operand(&self) -> OpResult<bool> {
        match self {
            Value::None => Err(none_error()),
            other => Ok(other.is_truthy()),
        }
    }

    pub fn not(&self) -> OpResult {
        Ok(Value::Bool(!self.logic_operand()?))
    }

    pub fn negate(&self) -> OpResult {
        match self {
            Value::Int(value) => value.checked_neg().map(Value::Int).ok_or_else(overflow),
            Value::Float(value) => Ok(Value::Float(-value)),
            Value::Decimal(value) => Ok(Value::decimal(-value.as_ref().clone())),
            Value::None => Err(none_error()),
            other => Err(illegal_unary("-", other)),
        }
    }

    pub fn identity(&self) -> OpResult {
        match self {
            Value::Int(_) | Value::Float(_) | Value::Decimal(_) => Ok(self.clone()),
            Value::None => Err(none_error()),
            other => Err(illegal_unary("+", other)),
        }
    }
}

fn out_of_bounds(what: &str, index: i64, len: usize) -> OpError {
    OpError::new(
        RuntimeErrorKind::Runtime,
        format!("Index {index} is out of bounds for {what} of length {len}")
    )
}
