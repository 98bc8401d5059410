// Numan Thabit 2026
// sched/vector.rs - linear-scan priority backing

use slab::Slab;

use crate::sched::order::{precedes, Order};
use crate::sched::ClientRec;

/// Dense vector backing with cached top indices.
///
/// Re-placement recomputes the tops with one sweep over all clients,
/// which beats the heap's pointer-chasing below roughly a hundred
/// clients. Semantics match the heap backing exactly.
#[derive(Debug, Default)]
pub(crate) struct VectorIndex {
    keys: Vec<usize>,
    resv: usize,
    ready: usize,
    limit: usize,
}

impl VectorIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub(crate) fn top(&self, order: Order) -> Option<usize> {
        if self.keys.is_empty() {
            return None;
        }
        let at = match order {
            Order::Reservation => self.resv,
            Order::Limit => self.limit,
            Order::Ready => self.ready,
            // the vector backing keeps no proportion top
            #[cfg(feature = "prop-heap")]
            Order::Proportion => return None,
        };
        self.keys.get(at).copied()
    }

    pub(crate) fn push<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        arena[key].vec_pos = self.keys.len();
        self.keys.push(key);
        self.adjust(arena);
    }

    pub(crate) fn remove<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let at = arena[key].vec_pos;
        debug_assert!(at < self.keys.len() && self.keys[at] == key);
        self.keys.swap_remove(at);
        arena[key].vec_pos = usize::MAX;
        if at < self.keys.len() {
            arena[self.keys[at]].vec_pos = at;
        }
        self.adjust(arena);
    }

    /// Recomputes all three cached tops in one sweep.
    pub(crate) fn adjust<C, R>(&mut self, arena: &Slab<ClientRec<C, R>>) {
        self.resv = 0;
        self.ready = 0;
        self.limit = 0;
        for at in 1..self.keys.len() {
            let candidate = &arena[self.keys[at]];
            if precedes(Order::Reservation, candidate, &arena[self.keys[self.resv]]) {
                self.resv = at;
            }
            if precedes(Order::Ready, candidate, &arena[self.keys[self.ready]]) {
                self.ready = at;
            }
            if precedes(Order::Limit, candidate, &arena[self.keys[self.limit]]) {
                self.limit = at;
            }
        }
    }

    /// Recomputes only the reservation top, for the post-dispatch
    /// reservation-tag reduction.
    pub(crate) fn adjust_resv<C, R>(&mut self, arena: &Slab<ClientRec<C, R>>) {
        self.resv = 0;
        for at in 1..self.keys.len() {
            if precedes(
                Order::Reservation,
                &arena[self.keys[at]],
                &arena[self.keys[self.resv]],
            ) {
                self.resv = at;
            }
        }
    }

    /// Recomputes the ready and limit tops, for the ready-flag
    /// promotion loop.
    pub(crate) fn adjust_ready_limit<C, R>(&mut self, arena: &Slab<ClientRec<C, R>>) {
        self.ready = 0;
        self.limit = 0;
        for at in 1..self.keys.len() {
            let candidate = &arena[self.keys[at]];
            if precedes(Order::Ready, candidate, &arena[self.keys[self.ready]]) {
                self.ready = at;
            }
            if precedes(Order::Limit, candidate, &arena[self.keys[self.limit]]) {
                self.limit = at;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ClientInfo;
    use crate::sched::tags::RequestTag;

    fn rec_with(
        id: u32,
        reservation: f64,
        limit: f64,
        proportion: f64,
        ready: bool,
    ) -> ClientRec<u32, u32> {
        let mut rec = ClientRec::new(id, ClientInfo::new(1.0, 1.0, 1.0), 0);
        rec.push_request(
            RequestTag {
                reservation,
                proportion,
                limit,
                ready,
            },
            id,
        );
        rec
    }

    #[test]
    fn tops_track_distinct_orderings() {
        let mut arena = Slab::new();
        let mut index = VectorIndex::new();
        // a: earliest reservation; b: earliest unready limit; c: ready head
        let a = arena.insert(rec_with(0, 1.0, 9.0, 5.0, false));
        let b = arena.insert(rec_with(1, 4.0, 2.0, 6.0, false));
        let c = arena.insert(rec_with(2, 8.0, 7.0, 9.0, true));
        index.push(&mut arena, a);
        index.push(&mut arena, b);
        index.push(&mut arena, c);

        assert_eq!(index.top(Order::Reservation), Some(a));
        assert_eq!(index.top(Order::Limit), Some(b));
        assert_eq!(index.top(Order::Ready), Some(c));
    }

    #[test]
    fn empty_index_has_no_tops() {
        let index = VectorIndex::new();
        assert_eq!(index.top(Order::Reservation), None);
        assert!(index.is_empty());
    }

    #[test]
    fn remove_repairs_positions_and_tops() {
        let mut arena = Slab::new();
        let mut index = VectorIndex::new();
        let a = arena.insert(rec_with(0, 1.0, 1.0, 1.0, false));
        let b = arena.insert(rec_with(1, 2.0, 2.0, 2.0, false));
        let c = arena.insert(rec_with(2, 3.0, 3.0, 3.0, false));
        index.push(&mut arena, a);
        index.push(&mut arena, b);
        index.push(&mut arena, c);

        index.remove(&mut arena, a);
        arena.remove(a);
        assert_eq!(index.len(), 2);
        assert_eq!(index.top(Order::Reservation), Some(b));
        assert_eq!(arena[index.keys[arena[c].vec_pos]].client, 2);
    }

    #[test]
    fn partial_sweeps_match_full_sweep() {
        let mut arena = Slab::new();
        let mut index = VectorIndex::new();
        let keys: Vec<usize> = (0..6)
            .map(|i| {
                let key = arena.insert(rec_with(
                    i,
                    f64::from(10 - i),
                    f64::from(i) * 1.5 + 0.5,
                    f64::from(i * i),
                    i % 2 == 0,
                ));
                index.push(&mut arena, key);
                key
            })
            .collect();

        let mut reference = VectorIndex::new();
        for &key in &keys {
            // positions already assigned by the first index; share them
            reference.keys.push(key);
        }
        reference.adjust(&arena);

        index.adjust_resv(&arena);
        index.adjust_ready_limit(&arena);
        assert_eq!(index.top(Order::Reservation), reference.top(Order::Reservation));
        assert_eq!(index.top(Order::Ready), reference.top(Order::Ready));
        assert_eq!(index.top(Order::Limit), reference.top(Order::Limit));
    }
}
