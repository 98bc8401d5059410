// Numan Thabit 2026
// push.rs - server-driven scheduling facade

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::api::{ClientInfo, Phase, QosError, ReqParams, SchedCounters};
use crate::clock::{self, Time, TIME_ZERO};
use crate::config::{ConfigError, QosConfig};
use crate::metrics::Metrics;
use crate::sched::{ClientInfoFn, Core, NextReq};
use crate::timer::Periodic;

/// Admission gate: asked before every scheduling pass whether the
/// server can take another request.
pub type CanHandleFn = Box<dyn Fn() -> bool + Send>;

/// Dispatch sink: receives each granted request. Called with the data
/// mutex held, so it must hand off rather than block.
pub type HandleFn<C, R> = Box<dyn FnMut(&C, R, Phase) + Send>;

struct PushState<C, R> {
    core: Core<C, R>,
    can_handle: CanHandleFn,
    handle: HandleFn<C, R>,
}

impl<C, R> PushState<C, R>
where
    C: Eq + Hash + Clone,
{
    /// One scheduling pass: dispatches at most one request, arms the
    /// future timer, or does nothing.
    fn schedule(&mut self, ahead: &SchedAhead, now: Time) {
        if !(self.can_handle)() {
            return;
        }
        match self.core.next_request(now) {
            NextReq::None => {}
            NextReq::Future(when) => ahead.sched_at(when),
            NextReq::Returning(source) => {
                if let Some((client, request, phase)) = self.core.pop_from(source) {
                    (self.handle)(&client, request, phase);
                }
            }
        }
    }
}

/// Deadline handoff between scheduling passes and the sched-ahead
/// worker. Uses its own mutex, always released before the data mutex
/// is taken.
struct SchedAhead {
    deadline: Mutex<Time>,
    signal: Condvar,
    finishing: AtomicBool,
}

impl SchedAhead {
    /// Records `when` if it is earlier than the armed deadline and
    /// wakes the worker.
    fn sched_at(&self, when: Time) {
        let mut deadline = self.deadline.lock();
        if *deadline == TIME_ZERO || when < *deadline {
            *deadline = when;
            self.signal.notify_one();
        }
    }
}

/// Push-mode scheduler: the server supplies an admission gate and a
/// dispatch sink, and the scheduler drives itself.
///
/// A pass runs after every submission and every completion; when the
/// pass lands on a future deadline, a background worker sleeps until
/// the deadline matures and re-runs the pass.
pub struct PushScheduler<C, R> {
    state: Arc<Mutex<PushState<C, R>>>,
    ahead: Arc<SchedAhead>,
    worker: Option<JoinHandle<()>>,
    _cleaner: Periodic,
}

impl<C, R> PushScheduler<C, R>
where
    C: Eq + Hash + Clone + Send + 'static,
    R: Send + 'static,
{
    /// Creates a scheduler after validating the configuration.
    pub fn new<F, G, H>(
        client_info_fn: F,
        can_handle_fn: G,
        handle_fn: H,
        config: &QosConfig,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&C) -> ClientInfo + Send + 'static,
        G: Fn() -> bool + Send + 'static,
        H: FnMut(&C, R, Phase) + Send + 'static,
    {
        config.validate()?;
        Ok(Self::build(
            Box::new(client_info_fn),
            Box::new(can_handle_fn),
            Box::new(handle_fn),
            config,
        ))
    }

    /// Creates a scheduler with the default lifecycle ages.
    pub fn with_defaults<F, G, H>(client_info_fn: F, can_handle_fn: G, handle_fn: H) -> Self
    where
        F: Fn(&C) -> ClientInfo + Send + 'static,
        G: Fn() -> bool + Send + 'static,
        H: FnMut(&C, R, Phase) + Send + 'static,
    {
        Self::build(
            Box::new(client_info_fn),
            Box::new(can_handle_fn),
            Box::new(handle_fn),
            &QosConfig::default(),
        )
    }

    fn build(
        client_info_fn: ClientInfoFn<C>,
        can_handle: CanHandleFn,
        handle: HandleFn<C, R>,
        config: &QosConfig,
    ) -> Self {
        let state = Arc::new(Mutex::new(PushState {
            core: Core::new(client_info_fn, config),
            can_handle,
            handle,
        }));
        let ahead = Arc::new(SchedAhead {
            deadline: Mutex::new(TIME_ZERO),
            signal: Condvar::new(),
            finishing: AtomicBool::new(false),
        });

        let worker_state = Arc::clone(&state);
        let worker_ahead = Arc::clone(&ahead);
        let worker = thread::spawn(move || run_sched_ahead(worker_state, worker_ahead));

        let cleaner_state = Arc::clone(&state);
        let cleaner = Periodic::spawn("numiqos-cleaner", config.check_time(), move || {
            cleaner_state.lock().core.do_clean(Instant::now());
        });

        Self {
            state,
            ahead,
            worker: Some(worker),
            _cleaner: cleaner,
        }
    }

    /// Mirrors the scheduler's counters and queue state into a
    /// Prometheus registry.
    pub fn attach_metrics(&self, metrics: Arc<Metrics>) {
        self.state.lock().core.set_metrics(metrics);
    }

    /// Submits a request with no distributed feedback, the current
    /// wall-clock time, and zero additional cost.
    pub fn add_request(&self, request: R, client: &C) -> Result<(), QosError> {
        self.add_request_with(request, client, ReqParams::default(), clock::now(), 0.0)
    }

    /// Submits a request with explicit feedback, timestamp, and cost,
    /// then runs a scheduling pass.
    pub fn add_request_with(
        &self,
        request: R,
        client: &C,
        params: ReqParams,
        time: Time,
        cost: f64,
    ) -> Result<(), QosError> {
        let mut state = self.state.lock();
        state.core.add_request(request, client, &params, time, cost)?;
        state.schedule(&self.ahead, clock::now());
        Ok(())
    }

    /// Signals that the server finished a request, freeing capacity;
    /// runs a scheduling pass.
    pub fn request_completed(&self) {
        let mut state = self.state.lock();
        state.schedule(&self.ahead, clock::now());
    }

    /// Drops all pending requests of one client; the client itself
    /// stays registered until aged out.
    pub fn remove_by_client(&self, client: &C) -> bool {
        self.state.lock().core.remove_by_client(client, |_| {})
    }

    /// Drains all pending requests of one client into `sink`.
    pub fn remove_by_client_into(&self, client: &C, sink: impl FnMut(R)) -> bool {
        self.state.lock().core.remove_by_client(client, sink)
    }

    /// Drops every pending request matching the predicate, visiting
    /// each client's FIFO front to back.
    pub fn remove_by_req_filter(&self, filter: impl FnMut(&R) -> bool) -> bool {
        self.state
            .lock()
            .core
            .remove_by_req_filter(filter, |_| {}, false)
    }

    /// Drains every matching request into `sink`; `reverse` visits
    /// each FIFO back to front.
    pub fn remove_by_req_filter_into(
        &self,
        filter: impl FnMut(&R) -> bool,
        sink: impl FnMut(R),
        reverse: bool,
    ) -> bool {
        self.state
            .lock()
            .core
            .remove_by_req_filter(filter, sink, reverse)
    }

    pub fn client_count(&self) -> usize {
        self.state.lock().core.client_count()
    }

    pub fn request_count(&self) -> usize {
        self.state.lock().core.request_count()
    }

    /// True when no client has a pending request.
    pub fn is_empty(&self) -> bool {
        self.state.lock().core.empty()
    }

    pub fn counters(&self) -> SchedCounters {
        self.state.lock().core.counters()
    }
}

impl<C, R> Drop for PushScheduler<C, R> {
    fn drop(&mut self) {
        self.ahead.finishing.store(true, Ordering::Release);
        self.ahead.signal.notify_one();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Worker loop: sleep until the armed deadline matures (or an earlier
/// one is armed), then re-run the scheduling pass.
fn run_sched_ahead<C, R>(state: Arc<Mutex<PushState<C, R>>>, ahead: Arc<SchedAhead>)
where
    C: Eq + Hash + Clone,
{
    let mut deadline = ahead.deadline.lock();
    while !ahead.finishing.load(Ordering::Acquire) {
        if *deadline == TIME_ZERO {
            ahead.signal.wait(&mut deadline);
        } else {
            loop {
                if ahead.finishing.load(Ordering::Acquire) {
                    return;
                }
                let now = clock::now();
                if now >= *deadline {
                    break;
                }
                // bounded so a distant deadline still re-checks the
                // finishing flag
                let wait = (*deadline - now).min(3600.0);
                let _ = ahead
                    .signal
                    .wait_for(&mut deadline, Duration::from_secs_f64(wait) + Duration::from_micros(1));
            }
            *deadline = TIME_ZERO;
            if ahead.finishing.load(Ordering::Acquire) {
                return;
            }
            // deadline handoff released before taking the data mutex;
            // the two are never held together by this thread
            drop(deadline);
            {
                let mut state = state.lock();
                state.schedule(&ahead, clock::now());
            }
            deadline = ahead.deadline.lock();
        }
    }
    debug!("sched-ahead worker stopped");
}
