// Public scheduler API exposed to integrators.
// Numan Thabit 2026
use std::fmt;

use thiserror::Error;

use crate::clock::Time;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QosError {
    /// The client's service parameters disable both the reservation and
    /// the weight axis, leaving no way to ever schedule its requests.
    #[error("client disables both reservation and weight (r=0, w=0)")]
    ClientParamsRejected,
}

/// Per-client service parameters, immutable once a client is registered.
///
/// A parameter of `0.0` disables the corresponding axis: no reserved
/// rate, no proportional share, or no upper limit respectively. At
/// least one of `reservation` and `weight` must be enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClientInfo {
    /// Minimum guaranteed service rate, in requests per second.
    pub reservation: f64,
    /// Proportional share of capacity left after reservations.
    pub weight: f64,
    /// Maximum service rate, in requests per second.
    pub limit: f64,

    /// 1/reservation, or 0 when the axis is disabled.
    pub reservation_inv: f64,
    /// 1/weight, or 0 when the axis is disabled.
    pub weight_inv: f64,
    /// 1/limit, or 0 when the axis is disabled.
    pub limit_inv: f64,
}

impl ClientInfo {
    /// Builds the parameter set, precomputing the inverses used by tag
    /// arithmetic.
    pub fn new(reservation: f64, weight: f64, limit: f64) -> Self {
        let inv = |v: f64| if v == 0.0 { 0.0 } else { 1.0 / v };
        Self {
            reservation,
            weight,
            limit,
            reservation_inv: inv(reservation),
            weight_inv: inv(weight),
            limit_inv: inv(limit),
        }
    }
}

impl fmt::Display for ClientInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ r:{} w:{} l:{} }}",
            self.reservation, self.weight, self.limit
        )
    }
}

/// Distributed feedback supplied with a submission: how many
/// reservation (`rho`) and proportion (`delta`) grants the client
/// received from other servers since it last submitted here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReqParams {
    /// Reservation grants served elsewhere.
    pub rho: u32,
    /// Proportion grants served elsewhere.
    pub delta: u32,
}

impl ReqParams {
    pub fn new(rho: u32, delta: u32) -> Self {
        Self { rho, delta }
    }
}

/// Which arbitration phase a dispatched request was granted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Granted against the client's reserved rate.
    Reservation,
    /// Granted from the weighted share of remaining capacity.
    Priority,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Reservation => f.write_str("reservation"),
            Phase::Priority => f.write_str("priority"),
        }
    }
}

/// Outcome of a pull: nothing pending, something pending at a future
/// time, or a dispatched request.
#[derive(Debug)]
pub enum PullReq<C, R> {
    /// No client has a schedulable request.
    None,
    /// Nothing is eligible yet; the earliest deadline is at the given
    /// time.
    Future(Time),
    /// A request was dispatched.
    Returning {
        /// Client the request belongs to.
        client: C,
        /// The request payload, ownership transferred to the caller.
        request: R,
        /// Phase the grant was made under.
        phase: Phase,
    },
}

impl<C, R> PullReq<C, R> {
    pub fn is_none(&self) -> bool {
        matches!(self, PullReq::None)
    }

    pub fn is_future(&self) -> bool {
        matches!(self, PullReq::Future(_))
    }

    pub fn is_returning(&self) -> bool {
        matches!(self, PullReq::Returning { .. })
    }
}

/// Snapshot of the dispatch counters kept by the scheduling core.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedCounters {
    /// Dispatches granted in the reservation phase.
    pub reserv_sched_count: u64,
    /// Dispatches granted in the priority phase.
    pub prop_sched_count: u64,
    /// Dispatches granted from the proportion ordering; only the
    /// `prop-heap` dispatch path feeds this counter.
    pub limit_break_sched_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverses_follow_parameters() {
        let info = ClientInfo::new(2.0, 4.0, 0.0);
        assert_eq!(info.reservation_inv, 0.5);
        assert_eq!(info.weight_inv, 0.25);
        assert_eq!(info.limit_inv, 0.0);
    }

    #[test]
    fn phase_displays() {
        assert_eq!(Phase::Reservation.to_string(), "reservation");
        assert_eq!(Phase::Priority.to_string(), "priority");
    }
}
