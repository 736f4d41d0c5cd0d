//! # Requeue backoff
//!
//! Owner references for freshly rolled-out workloads may lag behind the
//! secret write, so the reconciler requeues until they converge. The
//! interval is seeded from the secret's age: a secret created seconds ago is
//! retried at the base interval, one that has been missing its references
//! for a while backs off towards the cap.

use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;

/// Next requeue interval for a secret still missing a relevant owner
/// reference. Doubles per full minute of secret age, bounded by `base`
/// below and `max` above. A secret without a creation timestamp gets the
/// base interval.
pub fn next_requeue_interval(secret: &Secret, base: Duration, max: Duration) -> Duration {
    let age_minutes = secret
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|created| (Utc::now() - created.0).num_minutes().max(0))
        .unwrap_or(0);

    let mut interval = base;
    for _ in 0..age_minutes {
        interval = interval.saturating_mul(2);
        if interval >= max {
            return max;
        }
    }
    interval
}
