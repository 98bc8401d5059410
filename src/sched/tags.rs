// Numan Thabit 2026
// sched/tags.rs - three-tag request arithmetic

use std::fmt;

use crate::api::{ClientInfo, QosError, ReqParams};
use crate::clock::{Time, TAG_MAX, TAG_MIN};

/// Per-request scheduling tags.
///
/// `reservation` is the virtual deadline by which the next reserved
/// unit must be served, `proportion` the weighted-fair-queueing virtual
/// time, and `limit` the earliest real time the request is eligible for
/// non-reserved service. `ready` flips to true once wall time reaches
/// the limit tag; the flip is one-way.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestTag {
    pub reservation: f64,
    pub proportion: f64,
    pub limit: f64,
    pub ready: bool,
}

impl RequestTag {
    /// Seed tag for a client that has never submitted.
    pub(crate) const ZERO: RequestTag = RequestTag {
        reservation: 0.0,
        proportion: 0.0,
        limit: 0.0,
        ready: false,
    };

    /// Stamps the next request of a client, advancing each axis from
    /// the previous tag.
    ///
    /// Each enabled axis advances by its inverse rate, scaled by the
    /// distributed feedback count where applicable, and is clamped up
    /// to `time` so virtual time never trails real time after a quiet
    /// period. Rejects clients with both the reservation and weight
    /// axes disabled.
    pub fn next(
        prev: &RequestTag,
        info: &ClientInfo,
        params: &ReqParams,
        time: Time,
        cost: f64,
    ) -> Result<RequestTag, QosError> {
        let reservation = cost
            + tag_calc(
                time,
                prev.reservation,
                info.reservation_inv,
                params.rho,
                true,
            );
        let proportion = tag_calc(time, prev.proportion, info.weight_inv, params.delta, true);
        // the limit axis tracks this server's own service rate, so the
        // distributed count does not scale it
        let limit = tag_calc(time, prev.limit, info.limit_inv, 0, false);

        if reservation >= TAG_MAX && proportion >= TAG_MAX {
            return Err(QosError::ClientParamsRejected);
        }

        Ok(RequestTag {
            reservation,
            proportion,
            limit,
            ready: false,
        })
    }
}

impl fmt::Display for RequestTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ r:{:.4} p:{:.4} l:{:.4}{} }}",
            self.reservation,
            self.proportion,
            self.limit,
            if self.ready { " ready" } else { "" }
        )
    }
}

/// One axis of tag advancement.
///
/// A zero increment means the axis is disabled and pins the tag to the
/// appropriate extreme. `dist_count` scales the increment when the
/// client reports grants served elsewhere; zero counts apply a single
/// increment.
fn tag_calc(time: Time, prev: f64, increment: f64, dist_count: u32, extreme_is_high: bool) -> f64 {
    if increment == 0.0 {
        return if extreme_is_high { TAG_MAX } else { TAG_MIN };
    }
    let step = if dist_count != 0 {
        increment * f64::from(dist_count)
    } else {
        increment
    };
    time.max(prev + step)
}
