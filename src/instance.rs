//! Instance-to-instance contract (spec.md §6): every processing unit the
//! host spawns exposes a `module_name`, a `kind`, a small set of lifecycle
//! operations, and a `start_priority` the host uses to order `preload`
//! calls before any `thread_entry` is spawned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rrr_broker::Broker;
use rrr_event::EventQueue;

/// Where an instance sits in the data-flow graph (§2 overview table).
/// Purely descriptive — routing is driven by broker customer names, not
/// by this tag — but it documents intent the way the original's module
/// type enum does, and lets `main` log a coherent topology summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Source,
    Processor,
    Network,
    Deadend,
    Flexible,
}

/// Shared context every instance's `thread_entry` receives: the broker
/// fabric it routes messages through, its own event loop, and the
/// cooperative stop flag the host sets at shutdown.
pub struct InstanceContext {
    pub name: String,
    pub broker: Arc<Broker>,
    pub events: Arc<EventQueue>,
    pub stop: Arc<AtomicBool>,
}

impl InstanceContext {
    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Operations an instance exposes to the host (spec.md §6
/// `operations = {preload, thread_entry, inject?, poll?, poll_delete?}`).
pub trait Instance: Send + Sync {
    fn module_name(&self) -> &str;

    fn kind(&self) -> InstanceKind;

    /// Priority used to order `preload` across instances before any
    /// thread is spawned; lower runs first.
    fn start_priority(&self) -> i32 {
        0
    }

    /// Runs once, before any instance's `thread_entry` starts, with every
    /// other instance's `preload` already ordered by `start_priority`.
    fn preload(&self, _ctx: &InstanceContext) -> Result<(), crate::err::RrrError> {
        Ok(())
    }

    /// The instance's dispatch loop body. Runs on its own OS thread until
    /// `ctx.stop` is observed. Implementations are expected to drive
    /// `ctx.events.dispatch` themselves so the periodic callback can poll
    /// `ctx.should_stop()` and call `ctx.events.dispatch_break()`.
    fn thread_entry(&self, ctx: &InstanceContext);

    /// Out-of-band injection hook (e.g. a test harness pushing a message
    /// directly into the instance's input customer without going through
    /// the broker's normal producer path). Most instances don't need it.
    fn inject(&self, _ctx: &InstanceContext, _holder: rrr_broker::MessageHolder) -> Result<(), crate::err::RrrError> {
        Ok(())
    }

    /// Polling variant of a source instance's normal production path,
    /// used by hosts that want to pull rather than have the instance push
    /// on its own schedule.
    fn poll(&self, _ctx: &InstanceContext) -> Result<usize, crate::err::RrrError> {
        Ok(0)
    }

    /// Counterpart to `poll` for instances that maintain a deletion
    /// queue (e.g. an ASD release queue draining completed entries).
    fn poll_delete(&self, _ctx: &InstanceContext) -> Result<usize, crate::err::RrrError> {
        Ok(0)
    }
}

/// A no-op terminal instance: drains its customer and logs each message
/// at debug level. Stands in for the plugin modules (`p_blockdev`,
/// `p_incrementer`, ...) spec.md places out of scope, while still
/// exercising the full thread-per-instance/event-loop/broker wiring.
pub struct DeadendInstance {
    name: String,
    customer: String,
}

impl DeadendInstance {
    pub fn new(name: impl Into<String>, customer: impl Into<String>) -> Self {
        return Self { name: name.into(), customer: customer.into() };
    }
}

impl Instance for DeadendInstance {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> InstanceKind {
        InstanceKind::Deadend
    }

    fn preload(&self, ctx: &InstanceContext) -> Result<(), crate::err::RrrError> {
        ctx.broker.register_fifo_customer(&self.customer);
        return Ok(());
    }

    fn thread_entry(&self, ctx: &InstanceContext) {
        let broker = ctx.broker.clone();
        let customer = self.customer.clone();
        let name = self.name.clone();
        let events = ctx.events.clone();
        let stop = ctx.stop.clone();

        let periodic_events = events.clone();
        let result = events.dispatch(50_000, move || {
            let drained = broker.poll(&customer, &name, |holder| {
                log::debug!(
                    "[{name}] dropped message on dead-end customer '{customer}' (topic={:?})",
                    holder.lock().message().topic
                );
            }, |_paused| {});
            if drained > 0 {
                log::debug!("[{name}] drained {drained} messages");
            }
            if stop.load(Ordering::SeqCst) {
                periodic_events.dispatch_break();
            }
            Ok(())
        });

        if let Err(err) = result {
            log::error!("[{}] event loop terminated: {err}", self.name);
        }
    }
}
