// Numan Thabit 2026
// sched/heap.rs - indexed binary-heap priority backing

use slab::Slab;

use crate::sched::order::{precedes, Order};
use crate::sched::ClientRec;

/// One binary heap of arena keys, ordered by a single comparator.
///
/// Each client record carries its position in every heap, so
/// re-placement after a head-tag change is O(log n) without a search.
#[derive(Debug)]
pub(crate) struct OrderHeap {
    order: Order,
    keys: Vec<usize>,
}

impl OrderHeap {
    pub(crate) fn new(order: Order) -> Self {
        Self {
            order,
            keys: Vec::new(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }

    /// Arena key of the minimal client, if any.
    pub(crate) fn top(&self) -> Option<usize> {
        self.keys.first().copied()
    }

    pub(crate) fn push<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let at = self.keys.len();
        self.keys.push(key);
        arena[key].pos[self.order.slot()] = at;
        self.sift_up(arena, at);
    }

    /// Removes an arbitrary client by its stored position handle.
    pub(crate) fn remove<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let slot = self.order.slot();
        let at = arena[key].pos[slot];
        debug_assert!(at < self.keys.len() && self.keys[at] == key);
        let last = self.keys.len() - 1;
        self.keys.swap(at, last);
        self.keys.pop();
        arena[key].pos[slot] = usize::MAX;
        if at < self.keys.len() {
            arena[self.keys[at]].pos[slot] = at;
            self.adjust_at(arena, at);
        }
    }

    /// Re-places a client whose key may have become smaller.
    pub(crate) fn promote<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let at = arena[key].pos[self.order.slot()];
        self.sift_up(arena, at);
    }

    /// Re-places a client whose key may have become larger.
    pub(crate) fn demote<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let at = arena[key].pos[self.order.slot()];
        self.sift_down(arena, at);
    }

    /// Re-places a client after an arbitrary key change.
    pub(crate) fn adjust<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        let at = arena[key].pos[self.order.slot()];
        self.adjust_at(arena, at);
    }

    fn adjust_at<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, at: usize) {
        let settled = self.sift_up(arena, at);
        self.sift_down(arena, settled);
    }

    fn sift_up<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, mut at: usize) -> usize {
        while at > 0 {
            let parent = (at - 1) / 2;
            if precedes(self.order, &arena[self.keys[at]], &arena[self.keys[parent]]) {
                self.swap_entries(arena, at, parent);
                at = parent;
            } else {
                break;
            }
        }
        at
    }

    fn sift_down<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, mut at: usize) {
        loop {
            let left = 2 * at + 1;
            if left >= self.keys.len() {
                break;
            }
            let right = left + 1;
            let mut smallest = at;
            if precedes(self.order, &arena[self.keys[left]], &arena[self.keys[smallest]]) {
                smallest = left;
            }
            if right < self.keys.len()
                && precedes(self.order, &arena[self.keys[right]], &arena[self.keys[smallest]])
            {
                smallest = right;
            }
            if smallest == at {
                break;
            }
            self.swap_entries(arena, at, smallest);
            at = smallest;
        }
    }

    fn swap_entries<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, a: usize, b: usize) {
        self.keys.swap(a, b);
        let slot = self.order.slot();
        arena[self.keys[a]].pos[slot] = a;
        arena[self.keys[b]].pos[slot] = b;
    }
}

/// The heap backing: one indexed heap per ordering.
#[derive(Debug)]
pub(crate) struct HeapIndex {
    pub(crate) resv: OrderHeap,
    pub(crate) limit: OrderHeap,
    pub(crate) ready: OrderHeap,
    #[cfg(feature = "prop-heap")]
    pub(crate) prop: OrderHeap,
}

impl HeapIndex {
    pub(crate) fn new() -> Self {
        Self {
            resv: OrderHeap::new(Order::Reservation),
            limit: OrderHeap::new(Order::Limit),
            ready: OrderHeap::new(Order::Ready),
            #[cfg(feature = "prop-heap")]
            prop: OrderHeap::new(Order::Proportion),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.resv.len()
    }

    pub(crate) fn push<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        self.resv.push(arena, key);
        self.limit.push(arena, key);
        self.ready.push(arena, key);
        #[cfg(feature = "prop-heap")]
        self.prop.push(arena, key);
    }

    pub(crate) fn remove<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        self.resv.remove(arena, key);
        self.limit.remove(arena, key);
        self.ready.remove(arena, key);
        #[cfg(feature = "prop-heap")]
        self.prop.remove(arena, key);
    }

    /// Re-places one client in every ordering.
    pub(crate) fn adjust<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        self.resv.adjust(arena, key);
        self.limit.adjust(arena, key);
        self.ready.adjust(arena, key);
        #[cfg(feature = "prop-heap")]
        self.prop.adjust(arena, key);
    }

    /// Sinks one client in every ordering after its head was popped.
    pub(crate) fn demote<C, R>(&mut self, arena: &mut Slab<ClientRec<C, R>>, key: usize) {
        self.resv.demote(arena, key);
        self.limit.demote(arena, key);
        self.ready.demote(arena, key);
        #[cfg(feature = "prop-heap")]
        self.prop.demote(arena, key);
    }
}
