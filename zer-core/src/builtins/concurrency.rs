use std::sync::Arc;

use crate::{
    environment::prelude::Value,
    eval::prelude::{
        gather as gather_all, timeout as run_with_timeout, Channel, CoChannel, Coroutine, FutureHandle,
        Interpreter, RuntimeError, RuntimeErrorKind, TaskResult, ThreadHandle, ThreadPool, Wait,
    },
};
use super::{optional, required, BuiltIn, BuiltinCall, DefaultArg};

pub static BUILTINS: &[BuiltIn] = &[
    BuiltIn { name: "async_sleep", params: &[required("seconds")], body: async_sleep },
    BuiltIn { name: "gather", params: &[required("coroutines")], body: gather },
    BuiltIn { name: "timeout", params: &[required("coroutine"), required("seconds")], body: timeout },
    BuiltIn {
        name: "thread_start",
        params: &[required("func"), optional("args", DefaultArg::EmptyList), optional("kwargs", DefaultArg::EmptyMap)],
        body: thread_start,
    },
    BuiltIn { name: "thread_join", params: &[required("thread"), optional("timeout", DefaultArg::Int(15))], body: thread_join },
    BuiltIn { name: "thread_is_alive", params: &[required("thread")], body: thread_is_alive },
    BuiltIn { name: "thread_cancel", params: &[required("thread")], body: thread_cancel },
    BuiltIn { name: "thread_pool_new", params: &[optional("max_workers", DefaultArg::Int(5))], body: thread_pool_new },
    BuiltIn {
        name: "thread_pool_submit",
        params: &[
            required("pool"),
            required("func"),
            optional("args", DefaultArg::EmptyList),
            optional("kwargs", DefaultArg::EmptyMap),
        ],
        body: thread_pool_submit,
    },
    BuiltIn {
        name: "thread_pool_shutdown",
        params: &[required("pool"), optional("wait", DefaultArg::Bool(true))],
        body: thread_pool_shutdown,
    },
    BuiltIn { name: "future_result", params: &[required("future"), optional("timeout", DefaultArg::None)], body: future_result },
    BuiltIn { name: "future_done", params: &[required("future")], body: future_done },
    BuiltIn { name: "channel_new", params: &[], body: channel_new },
    BuiltIn { name: "channel_send", params: &[required("channel"), required("value")], body: channel_send },
    BuiltIn {
        name: "channel_receive",
        params: &[required("channel"), optional("timeout", DefaultArg::None)],
        body: channel_receive,
    },
    BuiltIn { name: "channel_is_empty", params: &[required("channel")], body: channel_is_empty },
    BuiltIn { name: "co_channel_new", params: &[], body: co_channel_new },
    BuiltIn { name: "co_channel_send", params: &[required("channel"), required("value")], body: co_channel_send },
    BuiltIn { name: "co_channel_receive", params: &[required("channel")], body: co_channel_receive },
    BuiltIn { name: "co_channel_is_empty", params: &[required("channel")], body: co_channel_is_empty },
];

fn coroutine(call: &BuiltinCall, index: usize) -> Result<Arc<Coroutine>, RuntimeError> {
    match call.arg(index) {
        Value::Coroutine(coroutine) => Ok(coroutine.clone()),
        _ => call.type_error(index, "a coroutine"),
    }
}

fn thread(call: &BuiltinCall, index: usize) -> Result<Arc<ThreadHandle>, RuntimeError> {
    match call.arg(index) {
        Value::Thread(thread) => Ok(thread.clone()),
        _ => call.type_error(index, "a thread"),
    }
}

fn pool(call: &BuiltinCall, index: usize) -> Result<Arc<ThreadPool>, RuntimeError> {
    match call.arg(index) {
        Value::ThreadPool(pool) => Ok(pool.clone()),
        _ => call.type_error(index, "a thread pool"),
    }
}

fn future(call: &BuiltinCall, index: usize) -> Result<Arc<FutureHandle>, RuntimeError> {
    match call.arg(index) {
        Value::Future(future) => Ok(future.clone()),
        _ => call.type_error(index, "a future"),
    }
}

fn channel(call: &BuiltinCall, index: usize) -> Result<Channel, RuntimeError> {
    match call.arg(index) {
        Value::Channel(channel) => Ok(channel.clone()),
        _ => call.type_error(index, "a channel"),
    }
}

fn co_channel(call: &BuiltinCall, index: usize) -> Result<CoChannel, RuntimeError> {
    match call.arg(index) {
        Value::CoChannel(channel) => Ok(channel.clone()),
        _ => call.type_error(index, "a co-channel"),
    }
}

fn required_seconds(call: &BuiltinCall, index: usize) -> Result<std::time::Duration, RuntimeError> {
    match call.seconds(index)? {
        Some(limit) => Ok(limit),
        None => call.type_error(index, "a number"),
    }
}

fn async_sleep(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let limit = required_seconds(call, 0)?;

    Ok(Value::Coroutine(Coroutine::timer("async_sleep", limit)))
}

fn gather(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let members = call.list(0)?.snapshot();
    let coroutines = members.iter()
        .map(|member| match member {
            Value::Coroutine(coroutine) => Some(coroutine.clone()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>();

    match coroutines {
        Some(coroutines) => gather_all(interpreter, coroutines, call.span, call.ctx),
        None => call.type_error(0, "a list of coroutines"),
    }
}

fn timeout(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let coroutine = coroutine(call, 0)?;
    let limit = required_seconds(call, 1)?;

    run_with_timeout(interpreter, coroutine, limit, call.span, call.ctx)
}

fn thread_start(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let func = call.callable(0)?;
    let (args, kwargs) = call.call_arguments(1, 2)?;

    let handle = ThreadHandle::spawn(interpreter, func, args, kwargs, call.span, call.ctx)?;
    Ok(Value::Thread(handle))
}

/// The thread's result, or `none` while it is still running. Failures were
/// already reported by the thread itself.
fn thread_join(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let thread = thread(call, 0)?;
    let limit = call.seconds(1)?;

    Ok(match thread.join(limit) {
        Wait::Ready(Ok(value)) => value,
        Wait::Ready(Err(_)) | Wait::Pending | Wait::Lost => Value::None,
    })
}

fn thread_is_alive(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(thread(call, 0)?.is_alive()))
}

fn thread_cancel(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    thread(call, 0)?.cancel();
    Ok(Value::None)
}

fn thread_pool_new(interpreter: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let max_workers = call.int(0)?;
    if max_workers < 1 {
        return call.error(RuntimeErrorKind::Runtime, "Thread pool needs at least one worker");
    }

    match ThreadPool::new(interpreter, max_workers as usize) {
        Ok(pool) => Ok(Value::ThreadPool(pool)),
        Err(error) => call.error(RuntimeErrorKind::Runtime, format!("Failed to start thread pool: {error}")),
    }
}

fn thread_pool_submit(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let pool = pool(call, 0)?;
    let func = call.callable(1)?;
    let (args, kwargs) = call.call_arguments(2, 3)?;

    match pool.submit(func, args, kwargs, call.span, call.ctx) {
        Some(future) => Ok(Value::Future(future)),
        None => call.error(RuntimeErrorKind::Runtime, "Cannot submit work to a thread pool that was shut down"),
    }
}

fn thread_pool_shutdown(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let pool = pool(call, 0)?;
    pool.shutdown(call.boolean(1)?);
    Ok(Value::None)
}

/// Waits for the job and re-surfaces its error, if any.
fn future_result(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let future = future(call, 0)?;
    let limit = call.seconds(1)?;

    match future.result(limit) {
        Wait::Ready(result) => result,
        Wait::Pending => call.error(
            RuntimeErrorKind::Runtime,
            format!("Future did not complete within {} seconds", limit.map_or(0.0, |limit| limit.as_secs_f64()))
        ),
        Wait::Lost => call.error(RuntimeErrorKind::Runtime, "Future was abandoned before it completed"),
    }
}

fn future_done(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(future(call, 0)?.is_done()))
}

fn channel_new(_: &mut Interpreter, _: &BuiltinCall) -> TaskResult {
    Ok(Value::Channel(Channel::new()))
}

fn channel_send(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    channel(call, 0)?.send(call.arg(1).clone());
    Ok(Value::None)
}

/// Blocks for the next value; `none` when the timeout runs out first.
fn channel_receive(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let channel = channel(call, 0)?;
    let limit = call.seconds(1)?;

    Ok(channel.receive(limit).unwrap_or(Value::None))
}

fn channel_is_empty(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(channel(call, 0)?.is_empty()))
}

fn co_channel_new(_: &mut Interpreter, _: &BuiltinCall) -> TaskResult {
    Ok(Value::CoChannel(CoChannel::new()))
}

fn co_channel_send(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    co_channel(call, 0)?.send(call.arg(1).clone());
    Ok(Value::None)
}

fn co_channel_receive(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    let channel = co_channel(call, 0)?;
    Ok(Value::Coroutine(channel.receive(call.span, call.ctx.clone())))
}

fn co_channel_is_empty(_: &mut Interpreter, call: &BuiltinCall) -> TaskResult {
    Ok(Value::Bool(co_channel(call, 0)?.is_empty()))
}
