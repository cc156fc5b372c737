//! Event fan-out to caller handlers with bounded per-handler queues
//!
//! Each handler owns a queue of `queue_size` events drained by its own tokio
//! task, so a slow handler never blocks the connection actor or other
//! handlers. When a queue is full the oldest queued event is dropped and an
//! `Error{HandlerOverrun}` is delivered to the `Error` handlers. Overrun
//! notices that overflow themselves are dropped silently.

use crate::events::{ErrorKind, Event, EventCategory};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Caller-supplied event handler
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;

/// Default per-handler queue capacity
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

struct HandlerSlot {
    handler: EventHandler,
    queue: Mutex<VecDeque<Event>>,
    notify: Notify,
    closed: AtomicBool,
    capacity: usize,
}

impl HandlerSlot {
    /// Enqueue, returning the evicted event on overflow
    fn push(&self, event: Event) -> Option<Event> {
        let evicted = {
            let mut queue = self.queue.lock();
            let evicted = if queue.len() >= self.capacity {
                queue.pop_front()
            } else {
                None
            };
            queue.push_back(event);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    async fn run(self: Arc<Self>) {
        loop {
            let next = self.queue.lock().pop_front();
            match next {
                Some(event) => {
                    let handler = &self.handler;
                    if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                        error!(category = ?event.category(), "Event handler panicked");
                    }
                }
                None if self.closed.load(Ordering::Acquire) => break,
                None => self.notify.notified().await,
            }
        }
    }
}

/// Events evicted by one [`Dispatcher::dispatch`] call
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DispatchReport {
    pub dropped: Vec<Event>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.dropped.is_empty()
    }
}

/// Routes events to handlers by [`EventCategory`]
pub struct Dispatcher {
    runtime: Handle,
    queue_size: usize,
    handlers: RwLock<BTreeMap<EventCategory, Vec<Arc<HandlerSlot>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    overruns: AtomicU64,
}

impl Dispatcher {
    /// Create a dispatcher whose workers run on the current tokio runtime
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(queue_size: usize) -> Self {
        Self::with_runtime(Handle::current(), queue_size)
    }

    pub fn with_runtime(runtime: Handle, queue_size: usize) -> Self {
        Self {
            runtime,
            queue_size: queue_size.max(1),
            handlers: RwLock::new(BTreeMap::new()),
            workers: Mutex::new(Vec::new()),
            overruns: AtomicU64::new(0),
        }
    }

    /// Register a handler; events of `category` reach handlers in registration order
    pub fn register(&self, category: EventCategory, handler: EventHandler) {
        let slot = Arc::new(HandlerSlot {
            handler,
            queue: Mutex::new(VecDeque::with_capacity(self.queue_size.min(64))),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            capacity: self.queue_size,
        });
        let worker = self.runtime.spawn(Arc::clone(&slot).run());
        self.workers.lock().push(worker);
        self.handlers.write().entry(category).or_default().push(slot);
    }

    /// Number of handlers registered for a category
    pub fn handler_count(&self, category: EventCategory) -> usize {
        self.handlers.read().get(&category).map_or(0, Vec::len)
    }

    /// Total events evicted since creation
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    fn slots(&self, category: EventCategory) -> Vec<Arc<HandlerSlot>> {
        self.handlers
            .read()
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Queue an event for every handler of its category
    pub fn dispatch(&self, event: Event) -> DispatchReport {
        let mut report = DispatchReport::default();
        let slots = self.slots(event.category());

        for slot in &slots {
            if let Some(dropped) = slot.push(event.clone()) {
                report.dropped.push(dropped);
            }
        }

        for dropped in &report.dropped {
            self.overruns.fetch_add(1, Ordering::Relaxed);
            warn!(category = ?dropped.category(), "Handler queue full, dropped oldest event");
            let notice = Event::error(
                ErrorKind::HandlerOverrun,
                dropped.symbol().map(str::to_string),
                format!("handler queue full, dropped {:?} event", dropped.category()),
            );
            for slot in self.slots(EventCategory::Error) {
                // Overrun notices never produce further notices
                if slot.push(notice.clone()).is_some() {
                    self.overruns.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        report
    }

    /// Let workers drain their queues and stop
    pub async fn shutdown(&self) {
        for slots in self.handlers.read().values() {
            for slot in slots {
                slot.closed.store(true, Ordering::Release);
                slot.notify.notify_one();
            }
        }
        let workers: Vec<_> = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            let _ = worker.await;
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("queue_size", &self.queue_size)
            .field("categories", &self.handlers.read().len())
            .field("overruns", &self.overruns())
            .finish()
    }
}
