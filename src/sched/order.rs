// Numan Thabit 2026
// sched/order.rs - priority-ordering comparators

use crate::sched::ClientRec;

/// Number of orderings each backing maintains.
#[cfg(feature = "prop-heap")]
pub(crate) const ORDER_COUNT: usize = 4;
#[cfg(not(feature = "prop-heap"))]
pub(crate) const ORDER_COUNT: usize = 3;

/// The logical orderings kept over clients, each keyed on the
/// head-of-queue request tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Order {
    /// Ascending reservation deadline.
    Reservation,
    /// Unready heads first, then ascending limit deadline; tracks the
    /// next client whose limit will mature.
    Limit,
    /// Ready heads first, then ascending drift-corrected proportion.
    Ready,
    /// Ascending drift-corrected proportion, ignoring readiness.
    #[cfg(feature = "prop-heap")]
    Proportion,
}

impl Order {
    #[cfg(feature = "prop-heap")]
    pub(crate) const ALL: [Order; ORDER_COUNT] =
        [Order::Reservation, Order::Limit, Order::Ready, Order::Proportion];
    #[cfg(not(feature = "prop-heap"))]
    pub(crate) const ALL: [Order; ORDER_COUNT] = [Order::Reservation, Order::Limit, Order::Ready];

    /// Slot of this ordering in a client's position-handle array.
    pub(crate) fn slot(self) -> usize {
        match self {
            Order::Reservation => 0,
            Order::Limit => 1,
            Order::Ready => 2,
            #[cfg(feature = "prop-heap")]
            Order::Proportion => 3,
        }
    }
}

/// Strict precedes-relation for one ordering: true iff `a` must sort
/// before `b`.
///
/// A client with no pending request sorts after any client with one;
/// two empty clients are left stable (false). Equal keys also return
/// false so the backings never reorder equivalent clients needlessly.
pub(crate) fn precedes<C, R>(order: Order, a: &ClientRec<C, R>, b: &ClientRec<C, R>) -> bool {
    let (ta, tb) = match (a.head_tag(), b.head_tag()) {
        (Some(ta), Some(tb)) => (ta, tb),
        (Some(_), None) => return true,
        _ => return false,
    };
    match order {
        Order::Reservation => ta.reservation < tb.reservation,
        Order::Limit => {
            if ta.ready == tb.ready {
                ta.limit < tb.limit
            } else {
                tb.ready
            }
        }
        Order::Ready => {
            if ta.ready == tb.ready {
                ta.proportion + a.prop_delta < tb.proportion + b.prop_delta
            } else {
                ta.ready
            }
        }
        #[cfg(feature = "prop-heap")]
        Order::Proportion => ta.proportion + a.prop_delta < tb.proportion + b.prop_delta,
    }
}
