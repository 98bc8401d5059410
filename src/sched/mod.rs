// Numan Thabit 2026
// sched/mod.rs - tagging and selection engine

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use slab::Slab;
use tracing::{debug, warn};

use crate::api::{ClientInfo, Phase, QosError, ReqParams, SchedCounters};
use crate::clock::{min_not_zero, Time, TAG_MAX, TIME_MAX};
use crate::config::QosConfig;
use crate::metrics::Metrics;

pub mod tags;

mod heap;
mod order;
mod vector;

use self::heap::HeapIndex;
use self::order::{Order, ORDER_COUNT};
use self::tags::RequestTag;
use self::vector::VectorIndex;

/// Function supplied at construction to look up a client's service
/// parameters on first submission.
pub type ClientInfoFn<C> = Box<dyn Fn(&C) -> ClientInfo + Send>;

/// A queued request together with its scheduling tags.
#[derive(Debug)]
pub(crate) struct ClientReq<R> {
    pub(crate) tag: RequestTag,
    pub(crate) request: R,
}

/// Per-client record: service parameters, FIFO of pending requests,
/// the tag seed for the next submission, and lifecycle state.
#[derive(Debug)]
pub(crate) struct ClientRec<C, R> {
    pub(crate) client: C,
    pub(crate) info: ClientInfo,
    pub(crate) prev_tag: RequestTag,
    pub(crate) requests: VecDeque<ClientReq<R>>,
    /// Correction added to the proportion tag at comparison time after
    /// an idle-to-active transition.
    pub(crate) prop_delta: f64,
    pub(crate) idle: bool,
    pub(crate) last_tick: u64,
    /// Position handles, one per heap ordering.
    pub(crate) pos: [usize; ORDER_COUNT],
    /// Slot in the vector backing.
    pub(crate) vec_pos: usize,
}

impl<C, R> ClientRec<C, R> {
    pub(crate) fn new(client: C, info: ClientInfo, tick: u64) -> Self {
        Self {
            client,
            info,
            prev_tag: RequestTag::ZERO,
            requests: VecDeque::new(),
            prop_delta: 0.0,
            // starts idle so the first submission runs drift correction
            idle: true,
            last_tick: tick,
            pos: [usize::MAX; ORDER_COUNT],
            vec_pos: usize::MAX,
        }
    }

    pub(crate) fn has_request(&self) -> bool {
        !self.requests.is_empty()
    }

    pub(crate) fn head_tag(&self) -> Option<&RequestTag> {
        self.requests.front().map(|req| &req.tag)
    }

    pub(crate) fn head_tag_mut(&mut self) -> Option<&mut RequestTag> {
        self.requests.front_mut().map(|req| &mut req.tag)
    }

    pub(crate) fn push_request(&mut self, tag: RequestTag, request: R) {
        self.requests.push_back(ClientReq { tag, request });
    }

    pub(crate) fn pop_request(&mut self) -> Option<ClientReq<R>> {
        self.requests.pop_front()
    }

    /// Removes every queued request matching `filter`, draining them
    /// into `sink`. Each request is tested exactly once; `backwards`
    /// selects reverse FIFO traversal. Returns the number removed.
    fn remove_by_filter(
        &mut self,
        filter: &mut impl FnMut(&R) -> bool,
        sink: &mut impl FnMut(R),
        backwards: bool,
    ) -> usize {
        let mut removed = 0;
        if backwards {
            let mut i = self.requests.len();
            while i > 0 {
                i -= 1;
                if filter(&self.requests[i].request) {
                    if let Some(req) = self.requests.remove(i) {
                        sink(req.request);
                        removed += 1;
                    }
                }
            }
        } else {
            let mut i = 0;
            while i < self.requests.len() {
                if filter(&self.requests[i].request) {
                    if let Some(req) = self.requests.remove(i) {
                        sink(req.request);
                        removed += 1;
                    }
                } else {
                    i += 1;
                }
            }
        }
        removed
    }
}

/// Which top a dispatch draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Reservation,
    Ready,
    #[cfg(feature = "prop-heap")]
    Proportional,
}

/// Outcome of a selection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NextReq {
    Returning(Source),
    Future(Time),
    None,
}

/// Priority-index backing, chosen at construction; both provide the
/// same observable ordering semantics.
#[derive(Debug)]
pub(crate) enum Index {
    Heap(HeapIndex),
    Vector(VectorIndex),
}

impl Index {
    fn new(use_heap: bool) -> Self {
        if use_heap {
            Index::Heap(HeapIndex::new())
        } else {
            Index::Vector(VectorIndex::new())
        }
    }

    fn len(&self) -> usize {
        match self {
            Index::Heap(h) => h.len(),
            Index::Vector(v) => v.len(),
        }
    }

    fn top(&self, order: Order) -> Option<usize> {
        match self {
            Index::Heap(h) => match order {
                Order::Reservation => h.resv.top(),
                Order::Limit => h.limit.top(),
                Order::Ready => h.ready.top(),
                #[cfg(feature = "prop-heap")]
                Order::Proportion => h.prop.top(),
            },
            Index::Vector(v) => v.top(order),
        }
    }

    fn push<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => h.push(arena, key),
            Index::Vector(v) => v.push(arena, key),
        }
    }

    fn remove<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => h.remove(arena, key),
            Index::Vector(v) => v.remove(arena, key),
        }
    }

    /// Re-places one client after its head tag changed arbitrarily.
    fn adjust_client<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => h.adjust(arena, key),
            Index::Vector(v) => v.adjust(arena),
        }
    }

    /// Sinks one client after its head was popped.
    fn after_pop<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => h.demote(arena, key),
            Index::Vector(v) => v.adjust(arena),
        }
    }

    /// Re-places one client after its head's ready flag was raised.
    fn after_promotion<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => {
                // the proportion ordering ignores readiness and needs
                // no re-placement here
                h.ready.promote(arena, key);
                h.limit.demote(arena, key);
            }
            Index::Vector(v) => v.adjust_ready_limit(arena),
        }
    }

    /// Raises one client in the reservation ordering after its
    /// reservation tags were reduced.
    fn after_reduction<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        match self {
            Index::Heap(h) => h.resv.promote(arena, key),
            Index::Vector(v) => v.adjust_resv(arena),
        }
    }
}

/// The scheduling core shared by the pull and push facades.
///
/// Everything here is guarded by the facade's data mutex; no method
/// blocks or re-enters.
pub(crate) struct Core<C, R> {
    info_fn: ClientInfoFn<C>,
    clients: AHashMap<C, usize>,
    arena: Slab<ClientRec<C, R>>,
    index: Index,
    allow_limit_break: bool,
    idle_age: Duration,
    erase_age: Duration,
    /// Monotone submission counter, compared against mark points by
    /// the aging pass.
    tick: u64,
    queued: usize,
    counters: SchedCounters,
    mark_points: VecDeque<(Instant, u64)>,
    metrics: Option<Arc<Metrics>>,
}

impl<C, R> Core<C, R>
where
    C: Eq + Hash + Clone,
{
    pub(crate) fn new(info_fn: ClientInfoFn<C>, config: &QosConfig) -> Self {
        Self {
            info_fn,
            clients: AHashMap::default(),
            arena: Slab::new(),
            index: Index::new(config.use_heap),
            allow_limit_break: config.allow_limit_break,
            idle_age: config.idle_age(),
            erase_age: config.erase_age(),
            tick: 0,
            queued: 0,
            counters: SchedCounters::default(),
            mark_points: VecDeque::new(),
            metrics: None,
        }
    }

    pub(crate) fn set_metrics(&mut self, metrics: Arc<Metrics>) {
        self.metrics = Some(metrics);
    }

    /// Stamps and enqueues one request, creating the client on first
    /// submission and running the idle re-entry drift correction.
    pub(crate) fn add_request(
        &mut self,
        request: R,
        client_id: &C,
        params: &ReqParams,
        time: Time,
        cost: f64,
    ) -> Result<(), QosError> {
        self.tick += 1;

        let existing = self.clients.get(client_id).copied();
        let (info, prev_tag) = match existing {
            Some(key) => {
                let rec = &self.arena[key];
                (rec.info, rec.prev_tag)
            }
            None => ((self.info_fn)(client_id), RequestTag::ZERO),
        };

        let tag = match RequestTag::next(&prev_tag, &info, params, time, cost) {
            Ok(tag) => tag,
            Err(err) => {
                if let Some(m) = &self.metrics {
                    m.rejected_submissions.inc();
                }
                return Err(err);
            }
        };

        let key = match existing {
            Some(key) => key,
            None => {
                let rec = ClientRec::new(client_id.clone(), info, self.tick);
                let key = self.arena.insert(rec);
                self.index.push(&mut self.arena, key);
                self.clients.insert(client_id.clone(), key);
                debug!(
                    clients = self.clients.len(),
                    "registered client on first submission"
                );
                key
            }
        };

        if self.arena[key].idle {
            // compete from the current virtual front rather than from
            // a proportion tag that drifted while the client was quiet
            let lowest = self.lowest_prop_tag(key);
            let rec = &mut self.arena[key];
            if let Some(lowest) = lowest {
                rec.prop_delta = lowest - time;
            }
            rec.idle = false;
        }

        let rec = &mut self.arena[key];
        rec.push_request(tag, request);
        rec.prev_tag = tag;
        rec.last_tick = self.tick;
        self.queued += 1;
        self.index.adjust_client(&mut self.arena, key);

        if let Some(m) = &self.metrics {
            m.submissions.inc();
            m.queued_requests.set(self.queued as i64);
            m.active_clients.set(self.clients.len() as i64);
        }
        Ok(())
    }

    /// Lowest drift-corrected proportion tag over the other non-idle
    /// clients with a pending request.
    fn lowest_prop_tag(&self, exclude: usize) -> Option<f64> {
        #[cfg(feature = "prop-heap")]
        if let Index::Heap(h) = &self.index {
            if let Some(top) = h.prop.top() {
                let rec = &self.arena[top];
                if top != exclude && !rec.idle {
                    if let Some(tag) = rec.head_tag() {
                        // the proportion top is the global minimum, so
                        // the scan below would find the same value
                        return Some(tag.proportion + rec.prop_delta);
                    }
                }
            }
        }

        let mut lowest: Option<f64> = None;
        for (key, rec) in self.arena.iter() {
            if key == exclude || rec.idle {
                continue;
            }
            if let Some(tag) = rec.head_tag() {
                let p = tag.proportion + rec.prop_delta;
                if lowest.map_or(true, |v| p < v) {
                    lowest = Some(p);
                }
            }
        }
        lowest
    }

    /// One selection pass: reservation phase, ready-flag promotion,
    /// priority phase, optional limit break, else the earliest future
    /// deadline.
    pub(crate) fn next_request(&mut self, now: Time) -> NextReq {
        let Some(resv_key) = self.index.top(Order::Reservation) else {
            return NextReq::None;
        };
        // the reservation ordering puts clients with requests first, so
        // an empty top means nothing is pending anywhere
        let Some(head) = self.arena[resv_key].head_tag() else {
            return NextReq::None;
        };
        if head.reservation <= now {
            return NextReq::Returning(Source::Reservation);
        }

        // raise the ready flag on every head whose limit has matured
        loop {
            let Some(lim_key) = self.index.top(Order::Limit) else {
                break;
            };
            let promote = match self.arena[lim_key].head_tag() {
                Some(tag) => !tag.ready && tag.limit <= now,
                None => false,
            };
            if !promote {
                break;
            }
            if let Some(tag) = self.arena[lim_key].head_tag_mut() {
                tag.ready = true;
            }
            self.index.after_promotion(&mut self.arena, lim_key);
        }

        let ready_key = self.index.top(Order::Ready);
        if let Some(key) = ready_key {
            if let Some(tag) = self.arena[key].head_tag() {
                if tag.ready && tag.proportion < TAG_MAX {
                    return NextReq::Returning(Source::Ready);
                }
            }
        }

        if self.allow_limit_break {
            // capacity would go unused; serve past the limit tag,
            // preferring the proportion axis
            if let Some(key) = ready_key {
                if let Some(tag) = self.arena[key].head_tag() {
                    if tag.proportion < TAG_MAX {
                        return NextReq::Returning(Source::Ready);
                    }
                }
            }
            if let Some(tag) = self.arena[resv_key].head_tag() {
                if tag.reservation < TAG_MAX {
                    return NextReq::Returning(Source::Reservation);
                }
            }
        }

        let mut next_call = TIME_MAX;
        if let Some(tag) = self.arena[resv_key].head_tag() {
            next_call = min_not_zero(next_call, tag.reservation);
        }
        if let Some(lim_key) = self.index.top(Order::Limit) {
            if let Some(tag) = self.arena[lim_key].head_tag() {
                // a ready head has already matured and owes no wakeup
                if !tag.ready {
                    next_call = min_not_zero(next_call, tag.limit);
                }
            }
        }
        if next_call < TIME_MAX {
            NextReq::Future(next_call)
        } else {
            NextReq::None
        }
    }

    /// Pops the head request of the chosen top, re-places the client in
    /// every ordering, applies the post-dispatch reservation reduction
    /// for priority grants, and bumps the phase counter.
    pub(crate) fn pop_from(&mut self, source: Source) -> Option<(C, R, Phase)> {
        let (order, phase) = match source {
            Source::Reservation => (Order::Reservation, Phase::Reservation),
            Source::Ready => (Order::Ready, Phase::Priority),
            #[cfg(feature = "prop-heap")]
            Source::Proportional => (Order::Proportion, Phase::Priority),
        };
        let key = self.index.top(order)?;
        let req = self.arena[key].pop_request()?;
        self.queued -= 1;
        let client = self.arena[key].client.clone();
        self.index.after_pop(&mut self.arena, key);

        match source {
            Source::Reservation => {
                self.counters.reserv_sched_count += 1;
                if let Some(m) = &self.metrics {
                    m.reservation_dispatches.inc();
                }
            }
            Source::Ready => {
                // the grant opportunistically consumed reserved
                // capacity; reservation tags measure work still owed
                self.reduce_reservation_tags(key);
                self.counters.prop_sched_count += 1;
                if let Some(m) = &self.metrics {
                    m.priority_dispatches.inc();
                }
            }
            #[cfg(feature = "prop-heap")]
            Source::Proportional => {
                self.reduce_reservation_tags(key);
                self.counters.limit_break_sched_count += 1;
                if let Some(m) = &self.metrics {
                    m.limit_break_dispatches.inc();
                }
            }
        }

        if let Some(m) = &self.metrics {
            m.queued_requests.set(self.queued as i64);
        }
        Some((client, req.request, phase))
    }

    /// Subtracts one reservation increment from every queued tag and
    /// the tag seed of the given client.
    fn reduce_reservation_tags(&mut self, key: usize) {
        let Some(rec) = self.arena.get_mut(key) else {
            debug_assert!(false, "reservation reduction for an evicted client");
            warn!("reservation reduction requested for an evicted client");
            return;
        };
        let inv = rec.info.reservation_inv;
        for req in rec.requests.iter_mut() {
            req.tag.reservation -= inv;
        }
        rec.prev_tag.reservation -= inv;
        self.index.after_reduction(&mut self.arena, key);
    }

    /// One aging pass: record a mark point, evict clients quiet past
    /// the erase horizon, mark those past the idle horizon.
    pub(crate) fn do_clean(&mut self, now: Instant) {
        self.mark_points.push_back((now, self.tick));

        let mut erase_tick = 0;
        if let Some(horizon) = now.checked_sub(self.erase_age) {
            while let Some(&(stamp, tick)) = self.mark_points.front() {
                if stamp <= horizon {
                    erase_tick = tick;
                    self.mark_points.pop_front();
                } else {
                    break;
                }
            }
        }

        let mut idle_tick = 0;
        if let Some(horizon) = now.checked_sub(self.idle_age) {
            for &(stamp, tick) in &self.mark_points {
                if stamp <= horizon {
                    idle_tick = tick;
                } else {
                    break;
                }
            }
        }

        if erase_tick == 0 && idle_tick == 0 {
            return;
        }

        let mut evict = Vec::new();
        let mut idled = 0;
        for (key, rec) in self.arena.iter_mut() {
            if erase_tick > 0 && rec.last_tick <= erase_tick {
                evict.push(key);
            } else if idle_tick > 0 && rec.last_tick <= idle_tick && !rec.idle {
                rec.idle = true;
                idled += 1;
            }
        }
        if idled > 0 {
            debug!(idled, "marked quiet clients idle");
        }
        for key in evict {
            self.erase_key(key);
        }

        if let Some(m) = &self.metrics {
            m.active_clients.set(self.clients.len() as i64);
            m.queued_requests.set(self.queued as i64);
        }
    }

    fn erase_key(&mut self, key: usize) {
        self.index.remove(&mut self.arena, key);
        let rec = self.arena.remove(key);
        self.clients.remove(&rec.client);
        self.queued -= rec.requests.len();
        if let Some(m) = &self.metrics {
            m.evicted_clients.inc();
        }
        debug!(pending = rec.requests.len(), "evicted stale client");
    }

    /// Drains the client's pending requests into `sink`; the client
    /// itself stays registered. Returns false for unknown clients.
    pub(crate) fn remove_by_client(&mut self, client: &C, mut sink: impl FnMut(R)) -> bool {
        let Some(&key) = self.clients.get(client) else {
            return false;
        };
        let rec = &mut self.arena[key];
        self.queued -= rec.requests.len();
        for req in rec.requests.drain(..) {
            sink(req.request);
        }
        self.index.adjust_client(&mut self.arena, key);
        if let Some(m) = &self.metrics {
            m.queued_requests.set(self.queued as i64);
        }
        true
    }

    /// Removes every request matching `filter` across all clients,
    /// draining matches into `sink`. Returns true if anything matched.
    pub(crate) fn remove_by_req_filter(
        &mut self,
        mut filter: impl FnMut(&R) -> bool,
        mut sink: impl FnMut(R),
        backwards: bool,
    ) -> bool {
        let keys: Vec<usize> = self.arena.iter().map(|(key, _)| key).collect();
        let mut modified = Vec::new();
        for key in keys {
            let removed =
                self.arena[key].remove_by_filter(&mut filter, &mut sink, backwards);
            if removed > 0 {
                self.queued -= removed;
                modified.push(key);
            }
        }
        if modified.is_empty() {
            return false;
        }
        match &mut self.index {
            Index::Heap(h) => {
                for &key in &modified {
                    h.adjust(&mut self.arena, key);
                }
            }
            Index::Vector(v) => v.adjust(&self.arena),
        }
        if let Some(m) = &self.metrics {
            m.queued_requests.set(self.queued as i64);
        }
        true
    }

    pub(crate) fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub(crate) fn request_count(&self) -> usize {
        self.queued
    }

    pub(crate) fn empty(&self) -> bool {
        match self.index.top(Order::Reservation) {
            Some(key) => !self.arena[key].has_request(),
            None => true,
        }
    }

    pub(crate) fn counters(&self) -> SchedCounters {
        self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    type TestCore = Core<u32, u64>;

    fn config(use_heap: bool) -> QosConfig {
        QosConfig {
            use_heap,
            ..QosConfig::default()
        }
    }

    fn core_with(info: ClientInfo, use_heap: bool) -> TestCore {
        Core::new(Box::new(move |_| info), &config(use_heap))
    }

    fn submit(core: &mut TestCore, client: u32, id: u64, time: Time) {
        core.add_request(id, &client, &ReqParams::default(), time, 0.0)
            .expect("submit");
    }

    fn pull_at(core: &mut TestCore, now: Time) -> Option<(u32, u64, Phase)> {
        match core.next_request(now) {
            NextReq::Returning(source) => core.pop_from(source),
            _ => None,
        }
    }

    #[test]
    fn prev_tag_tracks_latest_submission() {
        for use_heap in [true, false] {
            let mut core = core_with(ClientInfo::new(1.0, 2.0, 4.0), use_heap);
            for (i, t) in [0.0, 0.1, 0.5, 0.5, 2.0].iter().enumerate() {
                submit(&mut core, 7, i as u64, *t);
                let key = core.clients[&7];
                let rec = &core.arena[key];
                let back = rec.requests.back().expect("queued").tag;
                assert_eq!(rec.prev_tag, back);
            }
        }
    }

    #[test]
    fn registry_and_index_membership_match() {
        let mut core = core_with(ClientInfo::new(1.0, 1.0, 0.0), true);
        for client in 0..5u32 {
            submit(&mut core, client, u64::from(client), 0.0);
        }
        assert_eq!(core.clients.len(), core.index.len());
        assert_eq!(core.clients.len(), core.arena.len());

        // evict everything via a synthetic aging pass
        let t0 = Instant::now();
        core.do_clean(t0);
        core.do_clean(t0 + core.erase_age + Duration::from_millis(1));
        assert_eq!(core.clients.len(), 0);
        assert_eq!(core.index.len(), 0);
        assert_eq!(core.arena.len(), 0);
        assert!(core.empty());
    }

    #[test]
    fn aging_marks_idle_then_erases() {
        let cfg = QosConfig {
            idle_age_ms: 100,
            erase_age_ms: 200,
            check_time_ms: 50,
            ..QosConfig::default()
        };
        let mut core: TestCore = Core::new(Box::new(|_| ClientInfo::new(1.0, 1.0, 0.0)), &cfg);
        submit(&mut core, 1, 0, 0.0);
        assert!(!core.arena[core.clients[&1]].idle);

        let t0 = Instant::now();
        let ms = Duration::from_millis;
        core.do_clean(t0);
        core.do_clean(t0 + ms(50));
        assert!(!core.arena[core.clients[&1]].idle);

        core.do_clean(t0 + ms(100));
        assert!(core.arena[core.clients[&1]].idle);
        assert_eq!(core.client_count(), 1);

        core.do_clean(t0 + ms(200));
        assert_eq!(core.client_count(), 0);
        assert_eq!(core.request_count(), 0);
    }

    #[test]
    fn fresh_submissions_keep_client_alive_through_aging() {
        let cfg = QosConfig {
            idle_age_ms: 100,
            erase_age_ms: 200,
            check_time_ms: 50,
            ..QosConfig::default()
        };
        let mut core: TestCore = Core::new(Box::new(|_| ClientInfo::new(1.0, 1.0, 0.0)), &cfg);
        let t0 = Instant::now();
        let ms = Duration::from_millis;
        submit(&mut core, 1, 0, 0.0);
        core.do_clean(t0);
        submit(&mut core, 1, 1, 0.1);
        core.do_clean(t0 + ms(100));
        // the second submission postdates the only aged mark point
        assert!(!core.arena[core.clients[&1]].idle);
    }

    #[test]
    fn idle_reentry_competes_from_virtual_front() {
        for use_heap in [true, false] {
            let mut core = core_with(ClientInfo::new(0.0, 1.0, 0.0), use_heap);
            for i in 0..100 {
                submit(&mut core, 2, i, 0.0);
            }
            for _ in 0..50 {
                let (client, _, phase) = pull_at(&mut core, 0.0).expect("dispatch");
                assert_eq!(client, 2);
                assert_eq!(phase, Phase::Priority);
            }
            // client 2's head proportion tag is now 51
            submit(&mut core, 9, 1000, 10.0);
            let key = core.clients[&9];
            assert_eq!(core.arena[key].prop_delta, 51.0 - 10.0);
            assert!(!core.arena[key].idle);

            // the newcomer's first head competes at the same effective
            // proportion as the incumbent's
            let head = *core.arena[key].head_tag().expect("head");
            assert_eq!(head.proportion + core.arena[key].prop_delta, 51.0);
        }
    }

    #[test]
    fn priority_grant_reduces_reservation_tags() {
        let mut core = core_with(ClientInfo::new(1.0, 1.0, 0.0), true);
        for i in 0..3 {
            submit(&mut core, 4, i, 0.0);
        }
        // reservation deadlines 1, 2, 3; at now=0.5 only priority fires
        let (_, id, phase) = pull_at(&mut core, 0.5).expect("dispatch");
        assert_eq!(id, 0);
        assert_eq!(phase, Phase::Priority);

        let rec = &core.arena[core.clients[&4]];
        assert_eq!(rec.head_tag().expect("head").reservation, 1.0);
        assert_eq!(rec.requests[1].tag.reservation, 2.0);
        assert_eq!(rec.prev_tag.reservation, 2.0);

        // at now=1.0 the reduced head is due on the reservation axis
        let (_, id, phase) = pull_at(&mut core, 1.0).expect("dispatch");
        assert_eq!(id, 1);
        assert_eq!(phase, Phase::Reservation);
    }

    #[test]
    fn ready_promotion_is_one_way_and_gated_on_limit() {
        let mut core = core_with(ClientInfo::new(0.0, 1.0, 2.0), true);
        for i in 0..4 {
            submit(&mut core, 1, i, 0.0);
        }
        // limits mature at 0.5, 1.0, 1.5, 2.0
        assert_eq!(core.next_request(0.4), NextReq::Future(0.5));
        assert!(!core.arena[core.clients[&1]].head_tag().expect("head").ready);

        assert_eq!(core.next_request(0.5), NextReq::Returning(Source::Ready));
        assert!(core.arena[core.clients[&1]].head_tag().expect("head").ready);
        // a second pass may not lower the flag again
        assert_eq!(core.next_request(0.5), NextReq::Returning(Source::Ready));
        assert!(core.arena[core.clients[&1]].head_tag().expect("head").ready);
    }

    #[test]
    fn remove_by_client_drains_fifo_in_order() {
        let mut core = core_with(ClientInfo::new(1.0, 1.0, 0.0), false);
        for i in 0..4 {
            submit(&mut core, 3, i, 0.0);
        }
        let mut drained = Vec::new();
        assert!(core.remove_by_client(&3, |r| drained.push(r)));
        assert_eq!(drained, vec![0, 1, 2, 3]);
        assert_eq!(core.request_count(), 0);
        assert_eq!(core.client_count(), 1);
        assert!(core.empty());
        assert!(!core.remove_by_client(&99, |_| {}));
    }

    #[test]
    fn filter_removal_respects_direction() {
        for backwards in [false, true] {
            let mut core = core_with(ClientInfo::new(1.0, 1.0, 0.0), true);
            for i in 0..6 {
                submit(&mut core, 5, i, 0.0);
            }
            let mut drained = Vec::new();
            assert!(core.remove_by_req_filter(|r| r % 2 == 0, |r| drained.push(r), backwards));
            if backwards {
                assert_eq!(drained, vec![4, 2, 0]);
            } else {
                assert_eq!(drained, vec![0, 2, 4]);
            }
            assert_eq!(core.request_count(), 3);
            assert!(!core.remove_by_req_filter(|r| *r > 100, |_| {}, backwards));
        }
    }

    /// Checks that no client strictly precedes the published top of
    /// any ordering.
    fn assert_tops_minimal(core: &TestCore) {
        for order in Order::ALL {
            let top = core.index.top(order);
            #[cfg(feature = "prop-heap")]
            let top = if matches!(core.index, Index::Vector(_)) && order == Order::Proportion {
                continue;
            } else {
                top
            };
            match top {
                Some(top) => {
                    for (_, rec) in core.arena.iter() {
                        assert!(
                            !order::precedes(order, rec, &core.arena[top]),
                            "published top is not minimal"
                        );
                    }
                }
                None => assert_eq!(core.arena.len(), 0),
            }
        }
    }

    #[test]
    fn randomized_ops_preserve_invariants() {
        for use_heap in [true, false] {
            let mut rng = StdRng::seed_from_u64(0x9d2c);
            let infos = [
                ClientInfo::new(2.0, 1.0, 8.0),
                ClientInfo::new(0.0, 3.0, 5.0),
                ClientInfo::new(1.0, 0.0, 0.0),
                ClientInfo::new(0.5, 2.0, 0.0),
            ];
            let mut core: TestCore =
                Core::new(Box::new(move |c| infos[*c as usize % 4]), &config(use_heap));

            let mut now = 0.0;
            let mut next_id = 0u64;
            let mut ready_seen: AHashMap<u64, bool> = AHashMap::default();
            let mut submitted = 0usize;
            let mut dispatched = 0usize;

            for _ in 0..600 {
                now += rng.gen_range(0.0..0.05);
                match rng.gen_range(0..10) {
                    0..=5 => {
                        let client = rng.gen_range(0..4u32);
                        let params = ReqParams::new(rng.gen_range(0..3), rng.gen_range(0..3));
                        core.add_request(next_id, &client, &params, now, 0.0)
                            .expect("submit");
                        ready_seen.insert(next_id, false);
                        next_id += 1;
                        submitted += 1;
                    }
                    6..=8 => {
                        if let Some((_, id, _)) = pull_at(&mut core, now) {
                            ready_seen.remove(&id);
                            dispatched += 1;
                        }
                    }
                    _ => {
                        let client = rng.gen_range(0..4u32);
                        core.remove_by_client(&client, |id| {
                            ready_seen.remove(&id);
                        });
                    }
                }

                assert_eq!(core.clients.len(), core.index.len());
                assert_eq!(core.clients.len(), core.arena.len());
                let queued: usize = core.arena.iter().map(|(_, r)| r.requests.len()).sum();
                assert_eq!(queued, core.request_count());
                assert_tops_minimal(&core);

                // ready flags never fall back to false
                for (_, rec) in core.arena.iter() {
                    for req in rec.requests.iter() {
                        let seen = ready_seen.entry(req.request).or_insert(false);
                        assert!(!(*seen && !req.tag.ready), "ready flag regressed");
                        *seen = req.tag.ready;
                    }
                }
            }
            assert!(submitted > 0 && dispatched > 0);
        }
    }
}
