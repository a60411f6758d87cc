use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use mio::{Events, Poll, Token, Waker};

use crate::err::{DispatchError, DispatchErrorKind};

/// Highest function code a queue accepts; `FUNCTION_MAX + 1` per-function
/// signal slots are allocated, mirroring the original's fixed-size
/// eventfd table.
pub const FUNCTION_MAX: u8 = 15;

/// Cap on the amount passed to a single invocation of a function callback
/// in one drain iteration.
const MAX_DISPATCH_AMOUNT: u64 = 0xffff;

/// Poll granularity for the one-shot unpause check, matching the 50 µs
/// one-shot timer the original installs when a loop pauses.
const UNPAUSE_POLL: Duration = Duration::from_micros(50);

type FunctionCallback = Box<dyn FnMut(u16) -> Result<u16, DispatchError> + Send>;
type PeriodicCallback = Box<dyn FnMut() -> Result<(), DispatchError> + Send>;
/// `(is_paused_now) -> should_pause`, replacing the original's in/out
/// `int *do_pause` parameter with an ordinary return value.
type PauseCallback = Box<dyn FnMut(bool) -> bool + Send>;

struct Function {
    counter: AtomicU64,
    waker: Waker,
    callback: Mutex<Option<FunctionCallback>>,
}

/// One instance thread's event loop: `FUNCTION_MAX + 1` independently
/// countable signal channels, a periodic timer, and pause/resume
/// back-pressure, realized over an `mio::Poll` reactor.
pub struct EventQueue {
    poll: Mutex<Poll>,
    functions: Vec<Function>,
    periodic: Mutex<Option<(Duration, PeriodicCallback)>>,
    pause_callback: Mutex<Option<PauseCallback>>,
    is_paused: AtomicBool,
    unpause_at: Mutex<Option<Instant>>,
    stop_requested: AtomicBool,
}

pub enum DispatchOutcome {
    /// The loop stopped because [`EventQueue::dispatch_break`] was called
    /// or a periodic tick ran out of work.
    Break,
    /// The loop stopped because a callback requested exit via
    /// [`EventQueue::dispatch_exit`] or returned `DispatchErrorKind::Exit`.
    Exit,
}

impl EventQueue {
    /// Creates a queue with one signal channel per function code in
    /// `0..=FUNCTION_MAX`.
    pub fn new() -> Result<Self, DispatchError> {
        let poll = Poll::new()?;
        let mut functions = Vec::with_capacity(FUNCTION_MAX as usize + 1);
        for code in 0..=FUNCTION_MAX {
            let waker = Waker::new(poll.registry(), Token(code as usize))?;
            functions.push(Function {
                counter: AtomicU64::new(0),
                waker,
                callback: Mutex::new(None),
            });
        }

        return Ok(Self {
            poll: Mutex::new(poll),
            functions,
            periodic: Mutex::new(None),
            pause_callback: Mutex::new(None),
            is_paused: AtomicBool::new(false),
            unpause_at: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        });
    }

    fn function(&self, code: u8) -> Result<&Function, DispatchError> {
        self.functions.get(code as usize).ok_or_else(|| {
            DispatchError::new(
                DispatchErrorKind::UnknownFunction,
                format!("function code {code} exceeds FUNCTION_MAX ({FUNCTION_MAX})"),
            )
        })
    }

    /// Registers the callback invoked when `code`'s signal fires.
    pub fn function_set(&self, code: u8, callback: impl FnMut(u16) -> Result<u16, DispatchError> + Send + 'static) -> Result<(), DispatchError> {
        let function = self.function(code)?;
        *function.callback.lock().expect("function mutex poisoned") = Some(Box::new(callback));
        return Ok(());
    }

    /// Increments `code`'s counter by `amount` and wakes the loop.
    /// Honours `retry_callback` the way the original honours a
    /// non-blocking eventfd write: on backlog saturation, invokes it and
    /// retries, failing if it returns an error.
    pub fn pass(&self, code: u8, amount: u16, mut retry_callback: Option<impl FnMut() -> Result<(), DispatchError>>) -> Result<(), DispatchError> {
        let function = self.function(code)?;

        loop {
            let prev = function.counter.load(Ordering::SeqCst);
            if prev.checked_add(amount as u64).is_none() {
                match retry_callback.as_mut() {
                    Some(cb) => {
                        cb()?;
                        continue;
                    }
                    None => {
                        return Err(DispatchError::new(
                            DispatchErrorKind::Callback,
                            "function counter saturated and no retry_callback was supplied",
                        ));
                    }
                }
            }
            function.counter.fetch_add(amount as u64, Ordering::SeqCst);
            function.waker.wake()?;
            return Ok(());
        }
    }

    /// Registers the pause/resume policy consulted before every signal
    /// dispatch.
    pub fn callback_pause_set(&self, callback: impl FnMut(bool) -> bool + Send + 'static) {
        *self.pause_callback.lock().expect("pause mutex poisoned") = Some(Box::new(callback));
    }

    pub fn dispatch_break(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn dispatch_exit(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn dispatch_restart(&self) {
        self.stop_requested.store(false, Ordering::SeqCst);
    }

    /// Runs one pass of the underlying reactor without installing a
    /// periodic timer.
    pub fn dispatch_once(&self) -> Result<(), DispatchError> {
        let mut events = Events::with_capacity(64);
        {
            let mut poll = self.poll.lock().expect("poll mutex poisoned");
            poll.poll(&mut events, Some(Duration::ZERO))?;
        }
        for event in events.iter() {
            self.dispatch_token(event.token())?;
        }
        return Ok(());
    }

    /// Installs `periodic` to run every `period_us` microseconds and runs
    /// the dispatch loop until a callback requests break/exit or
    /// [`EventQueue::dispatch_break`]/[`EventQueue::dispatch_exit`] is
    /// called.
    pub fn dispatch(&self, period_us: u64, periodic: impl FnMut() -> Result<(), DispatchError> + Send + 'static) -> Result<DispatchOutcome, DispatchError> {
        *self.periodic.lock().expect("periodic mutex poisoned") = Some((Duration::from_micros(period_us), Box::new(periodic)));
        self.stop_requested.store(false, Ordering::SeqCst);

        let mut next_periodic = Instant::now() + Duration::from_micros(period_us);
        let mut events = Events::with_capacity(64);

        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(DispatchOutcome::Break);
            }

            let now = Instant::now();
            let mut timeout = next_periodic.saturating_duration_since(now);
            if let Some(unpause_at) = *self.unpause_at.lock().expect("unpause mutex poisoned") {
                timeout = timeout.min(unpause_at.saturating_duration_since(now));
            }

            {
                let mut poll = self.poll.lock().expect("poll mutex poisoned");
                poll.poll(&mut events, Some(timeout))?;
            }

            let now = Instant::now();
            if now >= next_periodic {
                next_periodic = now + Duration::from_micros(period_us.max(1));
                let mut periodic = self.periodic.lock().expect("periodic mutex poisoned");
                if let Some((_, callback)) = periodic.as_mut() {
                    match callback() {
                        Ok(()) => {}
                        Err(err) if err.is_exit() => return Ok(DispatchOutcome::Exit),
                        Err(_) => return Ok(DispatchOutcome::Break),
                    }
                }
            }

            self.maybe_unpause(now);

            for event in events.iter() {
                match self.dispatch_token(event.token()) {
                    Ok(()) => {}
                    Err(err) if err.is_exit() => return Ok(DispatchOutcome::Exit),
                    Err(_) => return Ok(DispatchOutcome::Break),
                }
            }

            if self.stop_requested.load(Ordering::SeqCst) {
                return Ok(DispatchOutcome::Break);
            }
        }
    }

    fn maybe_unpause(&self, now: Instant) {
        let mut unpause_at = self.unpause_at.lock().expect("unpause mutex poisoned");
        if let Some(at) = *unpause_at {
            if now >= at {
                self.is_paused.store(false, Ordering::SeqCst);
                *unpause_at = None;
            }
        }
    }

    fn dispatch_token(&self, token: Token) -> Result<(), DispatchError> {
        let idx = token.0;
        if idx > FUNCTION_MAX as usize {
            return Ok(());
        }
        return self.dispatch_function(&self.functions[idx]);
    }

    /// Dispatch algorithm for one signal event: consult the pause policy,
    /// and if not paused, drain the function's counter in chunks of at
    /// most `0xffff`, yielding scheduling whenever a callback makes no
    /// progress on its chunk.
    fn dispatch_function(&self, function: &Function) -> Result<(), DispatchError> {
        if let Some(pause_cb) = self.pause_callback.lock().expect("pause mutex poisoned").as_mut() {
            let was_paused = self.is_paused.load(Ordering::SeqCst);
            let should_pause = pause_cb(was_paused);
            self.is_paused.store(should_pause, Ordering::SeqCst);
        }

        if self.is_paused.load(Ordering::SeqCst) {
            *self.unpause_at.lock().expect("unpause mutex poisoned") = Some(Instant::now() + UNPAUSE_POLL);
            return Ok(());
        }

        let mut count = function.counter.swap(0, Ordering::SeqCst);
        if count == 0 {
            return Ok(());
        }

        let mut callback_guard = function.callback.lock().expect("function mutex poisoned");
        let Some(callback) = callback_guard.as_mut() else {
            return Ok(());
        };

        while count > 0 {
            let amount = count.min(MAX_DISPATCH_AMOUNT) as u16;
            count -= amount as u64;
            let amount_orig = amount;

            let leftover = callback(amount)?;

            if leftover == amount_orig {
                std::thread::yield_now();
            }
            if leftover > 0 {
                count += leftover as u64;
            }
        }

        return Ok(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    #[test]
    fn pass_then_dispatch_once_delivers_full_amount() {
        let queue = EventQueue::new().expect("queue creation");
        let received = Arc::new(AtomicU32::new(0));
        let received_cb = received.clone();

        queue
            .function_set(3, move |amount| {
                received_cb.fetch_add(amount as u32, Ordering::SeqCst);
                Ok(0)
            })
            .unwrap();

        queue.pass(3, 7, None::<fn() -> Result<(), DispatchError>>).unwrap();
        queue.dispatch_once().unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn unknown_function_code_is_rejected() {
        let queue = EventQueue::new().expect("queue creation");
        let err = queue.function_set(FUNCTION_MAX + 1, |_| Ok(0)).unwrap_err();
        assert_eq!(err.kind(), DispatchErrorKind::UnknownFunction);
    }

    #[test]
    fn pause_policy_suppresses_delivery_until_resumed() {
        let queue = EventQueue::new().expect("queue creation");
        let received = Arc::new(AtomicU32::new(0));
        let received_cb = received.clone();

        queue
            .function_set(0, move |amount| {
                received_cb.fetch_add(amount as u32, Ordering::SeqCst);
                Ok(0)
            })
            .unwrap();

        queue.callback_pause_set(|_was_paused| true);
        queue.pass(0, 4, None::<fn() -> Result<(), DispatchError>>).unwrap();
        queue.dispatch_once().unwrap();

        assert_eq!(received.load(Ordering::SeqCst), 0, "paused loop must not invoke the function callback");
    }
}
