use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
    time::{SystemTime, UNIX_EPOCH},
};

use crossbeam_channel::after;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;

use crate::{
    environment::prelude::{normalize_index, parse_decimal, Value},
    eval::prelude::{duration, Interpreter, RuntimeError, RuntimeErrorKind, TaskResult},
};
use super::{optional, required, BuiltIn, BuiltinCall, DefaultArg};

pub static BUILTINS: &[BuiltIn] = &[
    BuiltIn { name: "print", params: &[optional("value", DefaultArg::Str(""))], body: print },
    BuiltIn { name: "println", params: &[optional("value", DefaultArg::Str(""))], body: println },
    BuiltIn { name: "input", params: &[optional("prompt", DefaultArg::Str(""))], body: input },
    BuiltIn { name: "type", params: &[required("value")], body: type_of },
    BuiltIn { name: "len", params: &[required("value")], body: len },
    BuiltIn { name: "is_none", params: &[required("value")], body: is_none },
    BuiltIn { name: "to_str", params: &[required("value")], body: to_str },
    BuiltIn { name: "to_int", params: &[required("value")], body: to_int },
    BuiltIn { name: "to_float", params: &[required("value")], body: to_float },
    BuiltIn { name: "to_decimal", params: &[required("value")], body: to_decimal },
    BuiltIn { name: "to_bytes", params: &[required("value")], body: to_bytes },
    BuiltIn { name: "from_bytes", params: &[required("value")], body: from_bytes },
    BuiltIn { name: "keys", params: &[required("map")], body: keys },
    BuiltIn { name: "values", params: &[required("map")], body: values },
    BuiltIn { name: "append", params: &[required("list"), required("value")], body: append },
    BuiltIn { name: "extend", params: &[required("list"), required("other")], body: extend },
    BuiltIn { name: "pop", params: &[required("list"), optional("index", DefaultArg::Int(-1))], body: pop },
    BuiltIn {
        name: "range",
        params: &[required("start"), optional("end", DefaultArg::None), optional("step", DefaultArg::Int(1))],
        body: range,
    },
    BuiltIn {
        name: "catch",
        params: &[required("func"), optional("args", DefaultArg::EmptyList), optional("kwargs", DefaultArg::EmptyMap)],
        body: catch,
    },
    BuiltIn {
        name: "is_panic",
        params: &[required("func"), optional("args", DefaultArg::EmptyList), optional("kwargs", DefaultArg::EmptyMap)],
        body: is_panic,
    },
    BuiltIn {
        name: "finally",
        params: &[
            required("func"),
            required("final_func"),
            optional("args", DefaultArg::EmptyList),
            optional("kwargs", DefaultArg::EmptyMap),
        ],
        body: finally,
    },
    BuiltIn { name: "set_reusable", params: &[required("value"), optional("flag", DefaultArg::Bool(true))], body: set_reusable },
    BuiltIn { name: "sleep", params: &[required("seconds")], body: sleep },
    BuiltIn { name: "time_now", params: &[], body: time_now },
];

fn write_stdout(call: &BuiltinCall, text: &str) -> TaskResult {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes())
        .and_then(|_| stdout.flush())
        .or_else(|error| call.error(RuntimeErrorKind::Io, format!("Failed to write to stdout: {error}")))?;

    Ok(Value::None)
}

fn print(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    write_stdout(call, &call.arg(0).to_string())
}

fn println(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    write_stdout(call, &format!("{}\n", call.arg(0)))
}

fn input(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    write_stdout(call, &call.arg(0).to_string())?;

    let mut line = String::new();
    std::io::stdin().lock()
        .read_line(&mut line)
        .or_else(|error| call.error(RuntimeErrorKind::Io, format!("Failed to read from stdin: {error}")))?;

    Ok(Value::str(line.trim_end_matches(['\n', '\r'])))
}

fn type_of(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::str(call.arg(0).type_name()))
}

fn len(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let length = match call.arg(0) {
        Value::Str(text) => text.chars().count(),
        Value::Bytes(bytes) => bytes.len(),
        Value::List(list) => list.read(Vec::len),
        Value::Map(map) => map.read(BTreeMap::len),
        _ => return call.type_error(0, "a list, string, hashmap or bytes"),
    };

    Ok(Value::Int(length as i64))
}

fn is_none(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(matches!(call.arg(0), Value::None)))
}

fn to_str(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::str(call.arg(0).to_string()))
}

fn to_int(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let value = call.arg(0);
    let converted = match value {
        Value::Int(value) => Some(*value),
        Value::Bool(value) => Some(*value as i64),
        Value::Float(value) if value.is_finite() => value.trunc().to_i64(),
        Value::Decimal(value) => value.trunc().to_integer().to_i64(),
        Value::Str(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    match converted {
        Some(converted) => Ok(Value::Int(converted)),
        None => call.error(RuntimeErrorKind::Runtime, format!("Cannot convert {} to int", value.repr())),
    }
}

fn to_float(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let value = call.arg(0);
    let converted = match value {
        Value::Int(value) => Some(*value as f64),
        Value::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
        Value::Float(value) => Some(*value),
        Value::Decimal(value) => value.to_f64(),
        Value::Str(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };

    match converted {
        Some(converted) => Ok(Value::Float(converted)),
        None => call.error(RuntimeErrorKind::Runtime, format!("Cannot convert {} to float", value.repr())),
    }
}

fn to_decimal(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let value = call.arg(0);
    let converted = match value {
        Value::Int(value) => Some(BigRational::from_integer(BigInt::from(*value))),
        Value::Decimal(value) => Some(value.as_ref().clone()),
        // through the shortest printed form, so 0.1 becomes exactly 1/10
        Value::Float(value) if value.is_finite() => parse_decimal(&value.to_string()),
        Value::Str(text) => parse_decimal(text),
        _ => None,
    };

    match converted {
        Some(converted) => Ok(Value::decimal(converted)),
        None => call.error(RuntimeErrorKind::Runtime, format!("Cannot convert {} to cfloat", value.repr())),
    }
}

fn to_bytes(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    match call.arg(0) {
        Value::Bytes(bytes) => Ok(Value::Bytes(bytes.clone())),
        Value::Str(text) => Ok(Value::Bytes(text.as_bytes().into())),
        Value::List(list) => {
            let bytes = list.read(|items| {
                items.iter()
                    .map(|item| match item {
                        Value::Int(value) => u8::try_from(*value).ok(),
                        _ => None,
                    })
                    .collect::<Option<Vec<u8>>>()
            });

            match bytes {
                Some(bytes) => Ok(Value::Bytes(bytes.into())),
                None => call.error(RuntimeErrorKind::Runtime, "List elements must be ints between 0 and 255"),
            }
        },
        _ => call.type_error(0, "a string, list or bytes"),
    }
}

fn from_bytes(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let Value::Bytes(bytes) = call.arg(0) else {
        return call.type_error(0, "bytes");
    };

    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Value::str(text)),
        Err(_) => call.error(RuntimeErrorKind::Runtime, "Bytes are not valid UTF-8"),
    }
}

fn keys(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let map = call.map(0)?;
    Ok(Value::list(map.read(|entries| entries.keys().map(Value::str).collect())))
}

fn values(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let map = call.map(0)?;
    Ok(Value::list(map.read(|entries| entries.values().cloned().collect())))
}

/// Returns the list with `value` added. A reusable list is changed for every
/// holder; a plain one only in the returned copy.
fn append(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let mut list = call.list(0)?;
    let value = call.arg(1).clone();
    list.update(|items| items.push(value));
    Ok(Value::List(list))
}

fn extend(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let mut list = call.list(0)?;
    let other = call.list(1)?.snapshot();
    list.update(|items| items.extend(other));
    Ok(Value::List(list))
}

fn pop(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let mut list = call.list(0)?;
    let index = call.int(1)?;
    let len = list.read(Vec::len);

    match normalize_index(index, len) {
        Some(position) => Ok(list.update(|items| items.remove(position))),
        None => call.error(
            RuntimeErrorKind::Runtime,
            format!("Element at index {index} could not be removed from list of length {len} because index is out of bounds")
        ),
    }
}

fn range(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let (start, end) = match call.arg(1) {
        Value::None => (0, call.int(0)?),
        _ => (call.int(0)?, call.int(1)?),
    };
    let step = call.int(2)?;

    if step == 0 {
        return call.error(RuntimeErrorKind::Runtime, "Step value for 'range' cannot be zero");
    }

    let mut items = vec![];
    let mut current = start;
    while (step > 0 && current < end) || (step < 0 && current > end) {
        items.push(Value::Int(current));
        current = match current.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }

    Ok(Value::list(items))
}

/// Calls the function of a catch-style built-in and drives a coroutine result.
fn guarded_call(interpreter: &mut Interpreter, call: &BuiltinCall) -> Result<TaskResult, RuntimeError> {
    let func = call.callable(0)?;
    let (args, kwargs) = call.call_arguments(1, 2)?;

    Ok(interpreter.call_value(&func, args, kwargs, call.span, call.ctx)
        .and_then(|value| interpreter.settle(value, call.span, call.ctx)))
}

fn catch(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(match guarded_call(interpreter, call)? {
        Ok(value) => Value::list(vec![value, Value::None]),
        Err(error) => Value::list(vec![Value::None, Value::str(error.to_string())]),
    })
}

fn is_panic(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(match guarded_call(interpreter, call)? {
        Ok(value) => Value::list(vec![value, Value::None, Value::None]),
        Err(error) => Value::list(vec![
            Value::None,
            Value::str(&error.message),
            Value::str(error.kind.tag()),
        ]),
    })
}

fn finally(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let func = call.callable(0)?;
    let final_func = call.callable(1)?;
    let (args, kwargs) = call.call_arguments(2, 3)?;

    let result = interpreter.call_value(&func, args, kwargs, call.span, call.ctx)
        .and_then(|value| interpreter.settle(value, call.span, call.ctx));

    let cleanup = interpreter.call_value(&final_func, vec![], BTreeMap::new(), call.span, call.ctx)?;
    interpreter.settle(cleanup, call.span, call.ctx)?;

    result
}

fn set_reusable(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let flag = call.boolean(1)?;
    match call.arg(0) {
        Value::List(list) => Ok(Value::List(list.with_reusable(flag))),
        Value::Map(map) => Ok(Value::Map(map.with_reusable(flag))),
        _ => call.type_error(0, "a list or hashmap"),
    }
}

fn sleep(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let seconds = call.number(0)?;
    let Some(limit) = duration(seconds) else {
        return call.error(RuntimeErrorKind::Runtime, format!("Invalid number of seconds: {seconds}"));
    };

    interpreter.wait_on(&after(limit), call.span, call.ctx)?;
    Ok(Value::None)
}

fn time_now(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => Ok(Value::Float(elapsed.as_secs_f64())),
        Err(error) => call.error(RuntimeErrorKind::Runtime, format!("System clock is before 1970: {error}")),
    }
}
