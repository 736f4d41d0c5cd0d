//! # Controller
//!
//! The reconciliation engine and its requeue policy.

pub mod backoff;
pub mod reconciler;
