// Numan Thabit 2026
// pull.rs - caller-driven scheduling facade

use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::api::{ClientInfo, PullReq, QosError, ReqParams, SchedCounters};
use crate::clock::{self, Time};
use crate::config::{ConfigError, QosConfig};
use crate::metrics::Metrics;
use crate::sched::{ClientInfoFn, Core, NextReq};
use crate::timer::Periodic;

/// Pull-mode scheduler: the caller drives dispatch by polling.
///
/// Submissions stamp and enqueue; `pull_request` runs one selection
/// pass and either hands back a request, names the next deadline, or
/// reports nothing pending. The only background activity is the aging
/// pass.
pub struct PullScheduler<C, R> {
    inner: Arc<Mutex<Core<C, R>>>,
    _cleaner: Periodic,
}

impl<C, R> PullScheduler<C, R>
where
    C: Eq + Hash + Clone + Send + 'static,
    R: Send + 'static,
{
    /// Creates a scheduler after validating the configuration.
    pub fn new<F>(client_info_fn: F, config: &QosConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&C) -> ClientInfo + Send + 'static,
    {
        config.validate()?;
        Ok(Self::build(Box::new(client_info_fn), config))
    }

    /// Creates a scheduler with the default lifecycle ages.
    pub fn with_defaults<F>(client_info_fn: F) -> Self
    where
        F: Fn(&C) -> ClientInfo + Send + 'static,
    {
        Self::build(Box::new(client_info_fn), &QosConfig::default())
    }

    fn build(client_info_fn: ClientInfoFn<C>, config: &QosConfig) -> Self {
        let inner = Arc::new(Mutex::new(Core::new(client_info_fn, config)));
        let cleaner_core = Arc::clone(&inner);
        let cleaner = Periodic::spawn("numiqos-cleaner", config.check_time(), move || {
            cleaner_core.lock().do_clean(Instant::now());
        });
        Self {
            inner,
            _cleaner: cleaner,
        }
    }

    /// Mirrors the scheduler's counters and queue state into a
    /// Prometheus registry.
    pub fn attach_metrics(&self, metrics: Arc<Metrics>) {
        self.inner.lock().set_metrics(metrics);
    }

    /// Submits a request with no distributed feedback, the current
    /// wall-clock time, and zero additional cost.
    pub fn add_request(&self, request: R, client: &C) -> Result<(), QosError> {
        self.add_request_with(request, client, ReqParams::default(), clock::now(), 0.0)
    }

    /// Submits a request with explicit feedback, timestamp, and cost.
    pub fn add_request_with(
        &self,
        request: R,
        client: &C,
        params: ReqParams,
        time: Time,
        cost: f64,
    ) -> Result<(), QosError> {
        self.inner
            .lock()
            .add_request(request, client, &params, time, cost)
    }

    /// Polls for the next request at the current wall-clock time.
    pub fn pull_request(&self) -> PullReq<C, R> {
        self.pull_request_at(clock::now())
    }

    /// Polls for the next request at an explicit time.
    pub fn pull_request_at(&self, now: Time) -> PullReq<C, R> {
        let mut core = self.inner.lock();
        match core.next_request(now) {
            NextReq::None => PullReq::None,
            NextReq::Future(when) => PullReq::Future(when),
            NextReq::Returning(source) => match core.pop_from(source) {
                Some((client, request, phase)) => PullReq::Returning {
                    client,
                    request,
                    phase,
                },
                None => PullReq::None,
            },
        }
    }

    /// Drops all pending requests of one client; the client itself
    /// stays registered until aged out.
    pub fn remove_by_client(&self, client: &C) -> bool {
        self.inner.lock().remove_by_client(client, |_| {})
    }

    /// Drains all pending requests of one client into `sink`.
    pub fn remove_by_client_into(&self, client: &C, sink: impl FnMut(R)) -> bool {
        self.inner.lock().remove_by_client(client, sink)
    }

    /// Drops every pending request matching the predicate, visiting
    /// each client's FIFO front to back.
    pub fn remove_by_req_filter(&self, filter: impl FnMut(&R) -> bool) -> bool {
        self.inner.lock().remove_by_req_filter(filter, |_| {}, false)
    }

    /// Drains every matching request into `sink`; `reverse` visits
    /// each FIFO back to front.
    pub fn remove_by_req_filter_into(
        &self,
        filter: impl FnMut(&R) -> bool,
        sink: impl FnMut(R),
        reverse: bool,
    ) -> bool {
        self.inner.lock().remove_by_req_filter(filter, sink, reverse)
    }

    pub fn client_count(&self) -> usize {
        self.inner.lock().client_count()
    }

    pub fn request_count(&self) -> usize {
        self.inner.lock().request_count()
    }

    /// True when no client has a pending request.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().empty()
    }

    pub fn counters(&self) -> SchedCounters {
        self.inner.lock().counters()
    }
}
