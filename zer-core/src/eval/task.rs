use std::{
    collections::BTreeMap,
    sync::{atomic::{AtomicBool, AtomicU64, Ordering}, Arc, Mutex, PoisonError},
    thread::JoinHandle,
    time::{Duration, Instant},
};

use crossbeam_channel::{after, bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use tracing::{debug, trace, warn};

use crate::{
    environment::prelude::{Context, Function, Value},
    utils::prelude::SrcSpan,
};
use super::{error::{RuntimeError, RuntimeErrorKind}, Interpreter};

pub type TaskResult = Result<Value, RuntimeError>;
pub type NativeWork = Box<dyn FnOnce(&mut Interpreter) -> TaskResult + Send>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Converts a user supplied number of seconds, rejecting NaN and overflow.
pub fn duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds.max(0.0)).ok()
}

fn spawn_worker<F>(name: String, stack_size: usize, body: F) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    std::thread::Builder::new()
        .name(name)
        .stack_size(stack_size)
        .spawn(body)
}

fn spawn_failed(error: std::io::Error, span: SrcSpan, ctx: &Context) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::Runtime, format!("Failed to start thread: {error}"), span, ctx)
}

pub enum CoroutineWork {
    /// A user function body with its arguments already bound in `context`.
    Call { function: Arc<Function>, context: Arc<Context> },
    /// Runs on the awaiting interpreter.
    Native(NativeWork),
    /// Already running on a background thread since creation.
    Offloaded(Receiver<TaskResult>),
    /// Fires once the deadline set at creation has passed.
    Timer(Receiver<Instant>),
}

enum CoroutineState {
    Pending(CoroutineWork),
    Running,
    Done(TaskResult),
}

/// A suspended call. Driving it runs the work to completion once; later
/// awaits see the memoized result.
pub struct Coroutine {
    pub name: String,
    state: Mutex<CoroutineState>,
}

impl Coroutine {
    fn with_work(name: &str, work: CoroutineWork) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            state: Mutex::new(CoroutineState::Pending(work)),
        })
    }

    pub fn call(function: Arc<Function>, context: Arc<Context>) -> Arc<Self> {
        let name = function.name.clone();
        Self::with_work(&name, CoroutineWork::Call { function, context })
    }

    pub fn native<F>(name: &str, work: F) -> Arc<Self>
    where
        F: FnOnce(&mut Interpreter) -> TaskResult + Send + 'static,
    {
        Self::with_work(name, CoroutineWork::Native(Box::new(work)))
    }

    /// Starts blocking `work` on its own thread right away. Awaiting the
    /// coroutine waits for the result without holding up cancellation.
    pub fn offload<F>(name: &str, work: F, span: SrcSpan, ctx: &Context) -> Result<Arc<Self>, RuntimeError>
    where
        F: FnOnce() -> TaskResult + Send + 'static,
    {
        let (sender, receiver) = bounded(1);

        trace!(coroutine = name, "offloading native work");
        std::thread::Builder::new()
            .name(format!("zer-offload-{name}"))
            .spawn(move || {
                let _ = sender.send(work());
            })
            .map_err(|error| spawn_failed(error, span, ctx))?;

        Ok(Self::with_work(name, CoroutineWork::Offloaded(receiver)))
    }

    /// Completes `limit` after creation.
    pub fn timer(name: &str, limit: Duration) -> Arc<Self> {
        Self::with_work(name, CoroutineWork::Timer(after(limit)))
    }

    pub fn is_done(&self) -> bool {
        matches!(*self.state.lock().unwrap_or_else(PoisonError::into_inner), CoroutineState::Done(_))
    }

    pub fn drive(&self, interpreter: &mut Interpreter, span: SrcSpan, ctx: &Context) -> TaskResult {
        let work = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, CoroutineState::Running) {
                CoroutineState::Pending(work) => work,
                CoroutineState::Done(result) => {
                    *state = CoroutineState::Done(result.clone());
                    return result;
                },
                CoroutineState::Running => {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::Runtime,
                        format!("Coroutine '{}' is already running", self.name),
                        span,
                        ctx
                    ));
                },
            }
        };

        trace!(coroutine = %self.name, "driving coroutine");
        let result = match work {
            CoroutineWork::Call { function, context } => interpreter.run_body(&function, context),
            CoroutineWork::Native(work) => work(interpreter),
            CoroutineWork::Offloaded(receiver) => match interpreter.wait_on(&receiver, span, ctx) {
                Ok(Some(result)) => result,
                Ok(None) => Err(RuntimeError::new(
                    RuntimeErrorKind::Runtime,
                    format!("Background work of '{}' stopped without a result", self.name),
                    span,
                    ctx
                )),
                Err(error) => Err(error),
            },
            CoroutineWork::Timer(timer) => interpreter.wait_on(&timer, span, ctx).map(|_| Value::None),
        };

        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = CoroutineState::Done(result.clone());
        result
    }
}

/// Drives every coroutine on the calling interpreter, in input order. Work
/// offloaded by natives overlaps; user code never does.
pub fn gather(
    interpreter: &mut Interpreter,
    coroutines: Vec<Arc<Coroutine>>,
    span: SrcSpan,
    ctx: &Context,
) -> TaskResult {
    debug!(count = coroutines.len(), "gathering coroutines");

    coroutines.iter()
        .map(|coroutine| coroutine.drive(interpreter, span, ctx))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::list)
}

/// Drives `coroutine` with a deadline `limit` from now. Effects the
/// coroutine performed before the deadline stay.
pub fn timeout(
    interpreter: &mut Interpreter,
    coroutine: Arc<Coroutine>,
    limit: Duration,
    span: SrcSpan,
    ctx: &Context,
) -> TaskResult {
    interpreter.with_deadline(limit, |interpreter| coroutine.drive(interpreter, span, ctx))
}

/// How often blocked waits look at cancellation and deadlines.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// The point at which a `timeout` stops the work it drives.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    pub at: Instant,
    pub limit: Duration,
}

impl Interpreter {
    /// Runs `f` with a deadline `limit` from now, or the enclosing one when
    /// that comes first.
    pub fn with_deadline<R>(&mut self, limit: Duration, f: impl FnOnce(&mut Self) -> R) -> R {
        let outer = self.deadline;
        let inner = Instant::now().checked_add(limit).map(|at| Deadline { at, limit });

        self.deadline = match (outer, inner) {
            (Some(outer), Some(inner)) if outer.at <= inner.at => Some(outer),
            (_, Some(inner)) => Some(inner),
            (outer, None) => outer,
        };
        let result = f(self);
        self.deadline = outer;
        result
    }

    /// Blocks on `receiver` while still honouring cancellation and the
    /// current deadline. `None` when the sending side is gone.
    pub fn wait_on<T>(&self, receiver: &Receiver<T>, span: SrcSpan, ctx: &Context) -> Result<Option<T>, RuntimeError> {
        loop {
            self.check_cancelled(span, ctx)?;

            let slice = match self.deadline {
                Some(deadline) => deadline.at.saturating_duration_since(Instant::now()).min(POLL_INTERVAL),
                None => POLL_INTERVAL,
            };
            match receiver.recv_timeout(slice) {
                Ok(value) => return Ok(Some(value)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

pub enum Wait {
    Ready(TaskResult),
    Pending,
    /// The producer went away without sending anything.
    Lost,
}

/// The single result of a thread or pool job.
pub struct Outcome {
    receiver: Receiver<TaskResult>,
    settled: Mutex<Option<TaskResult>>,
}

impl Outcome {
    pub fn new() -> (Sender<TaskResult>, Self) {
        let (sender, receiver) = bounded(1);
        (sender, Self { receiver, settled: Mutex::new(None) })
    }

    pub fn wait(&self, limit: Option<Duration>) -> Wait {
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(result) = settled.as_ref() {
            return Wait::Ready(result.clone());
        }

        let received = match limit {
            Some(limit) => self.receiver.recv_timeout(limit).map_err(|error| error.is_timeout()),
            None => self.receiver.recv().map_err(|_| false),
        };

        match received {
            Ok(result) => {
                *settled = Some(result.clone());
                Wait::Ready(result)
            },
            Err(true) => Wait::Pending,
            Err(false) => Wait::Lost,
        }
    }

    pub fn is_settled(&self) -> bool {
        let mut settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner);
        if settled.is_some() {
            return true;
        }

        match self.receiver.try_recv() {
            Ok(result) => {
                *settled = Some(result);
                true
            },
            Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

pub struct ThreadHandle {
    pub id: u64,
    outcome: Outcome,
    cancel: Arc<AtomicBool>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadHandle {
    /// Calls `callee` on a new OS thread with its own interpreter. A
    /// coroutine result is driven to completion there too.
    pub fn spawn(
        interpreter: &Interpreter,
        callee: Value,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        span: SrcSpan,
        ctx: &Arc<Context>,
    ) -> Result<Arc<Self>, RuntimeError> {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::SeqCst);
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, outcome) = Outcome::new();
        let mut worker = interpreter.fork().with_cancel(Some(cancel.clone()));
        let context = ctx.clone();

        let join = spawn_worker(format!("zer-thread-{id}"), interpreter.config.stack_size, move || {
            debug!(thread = id, "thread started");
            let result = worker.call_value(&callee, args, kwargs, span, &context)
                .and_then(|value| worker.settle(value, span, &context));

            if let Err(error) = &result {
                warn!(thread = id, "{error}");
            }
            debug!(thread = id, "thread finished");
            let _ = sender.send(result);
        }).map_err(|error| spawn_failed(error, span, ctx))?;

        Ok(Arc::new(Self {
            id,
            outcome,
            cancel,
            join: Mutex::new(Some(join)),
        }))
    }

    pub fn join(&self, limit: Option<Duration>) -> Wait {
        let wait = self.outcome.wait(limit);
        if matches!(wait, Wait::Ready(_) | Wait::Lost) {
            if let Some(handle) = self.join.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = handle.join();
            }
        }
        wait
    }

    pub fn is_alive(&self) -> bool {
        !self.outcome.is_settled()
    }

    pub fn cancel(&self) {
        debug!(thread = self.id, "thread cancellation requested");
        self.cancel.store(true, Ordering::SeqCst);
    }
}

type Job = Box<dyn FnOnce(&mut Interpreter) + Send>;

/// A fixed set of worker threads, each owning its own interpreter.
pub struct ThreadPool {
    pub max_workers: usize,
    jobs: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPool {
    pub fn new(interpreter: &Interpreter, max_workers: usize) -> std::io::Result<Arc<Self>> {
        let (sender, receiver) = unbounded::<Job>();

        let workers = (0..max_workers)
            .map(|index| {
                let receiver = receiver.clone();
                let mut worker = interpreter.fork();

                spawn_worker(format!("zer-pool-{index}"), interpreter.config.stack_size, move || {
                    for job in receiver.iter() {
                        job(&mut worker);
                    }
                    trace!(worker = index, "pool worker stopped");
                })
            })
            .collect::<std::io::Result<Vec<_>>>()?;

        debug!(max_workers, "thread pool started");
        Ok(Arc::new(Self {
            max_workers,
            jobs: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        }))
    }

    /// `None` once the pool has been shut down.
    pub fn submit(
        &self,
        callee: Value,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        span: SrcSpan,
        ctx: &Arc<Context>,
    ) -> Option<Arc<FutureHandle>> {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let jobs = jobs.as_ref()?;

        let (sender, outcome) = Outcome::new();
        let context = ctx.clone();
        let job: Job = Box::new(move |worker: &mut Interpreter| {
            let result = worker.call_value(&callee, args, kwargs, span, &context)
                .and_then(|value| worker.settle(value, span, &context));
            let _ = sender.send(result);
        });

        jobs.send(job).ok()?;
        Some(Arc::new(FutureHandle { outcome }))
    }

    pub fn shutdown(&self, wait: bool) {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).take();

        if wait {
            let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
            for worker in workers {
                let _ = worker.join();
            }
        }
        debug!(wait, "thread pool shut down");
    }
}

pub struct FutureHandle {
    outcome: Outcome,
}

impl FutureHandle {
    pub fn result(&self, limit: Option<Duration>) -> Wait {
        self.outcome.wait(limit)
    }

    pub fn is_done(&self) -> bool {
        self.outcome.is_settled()
    }
}

/// FIFO safe to share between OS threads.
#[derive(Clone)]
pub struct Channel {
    sender: Sender<Value>,
    receiver: Receiver<Value>,
}

impl Channel {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn send(&self, value: Value) {
        // both ends live as long as self, so this cannot fail
        let _ = self.sender.send(value);
    }

    /// Blocks until a value arrives, or gives up after `limit`.
    pub fn receive(&self, limit: Option<Duration>) -> Option<Value> {
        match limit {
            Some(limit) => self.receiver.recv_timeout(limit).ok(),
            None => self.receiver.recv().ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn same_channel(&self, other: &Channel) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl Default for Channel {
    fn default() -> Self {
        Self::new()
    }
}

/// FIFO read through `await`. Receiving hands out a coroutine instead of
/// blocking the caller directly.
#[derive(Clone)]
pub struct CoChannel {
    sender: Sender<Value>,
    receiver: Receiver<Value>,
}

impl CoChannel {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();
        Self { sender, receiver }
    }

    pub fn send(&self, value: Value) {
        let _ = self.sender.send(value);
    }

    pub fn receive(&self, span: SrcSpan, ctx: Arc<Context>) -> Arc<Coroutine> {
        let receiver = self.receiver.clone();

        Coroutine::native("co_channel_receive", move |interpreter| {
            Ok(interpreter.wait_on(&receiver, span, &ctx)?.unwrap_or(Value::None))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    pub fn same_channel(&self, other: &CoChannel) -> bool {
        self.sender.same_channel(&other.sender)
    }
}

impl Default for CoChannel {
    fn default() -> Self {
        Self::new()
    }
}
