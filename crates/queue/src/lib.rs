//! Background job queue for versia-rs.
//!
//! This crate provides durable federation processing backed by Redis:
//!
//! - **Jobs**: inbox processing, outbound entity delivery
//! - **Workers**: concurrent job execution with Apalis
//! - **Retry**: transient failures requeue as delayed copies with
//!   exponential backoff; permanent ones abort into the dead-letter set
//! - **Scheduler**: periodic maintenance (mute expiry, instance refresh)
//!
//! The inbox endpoint enqueues and returns; authentication, clock skew
//! checks, and entity dispatch all happen in the inbox workers here.

pub mod delivery_impl;
pub mod jobs;
pub mod retry;
pub mod scheduler;
pub mod workers;

pub use delivery_impl::RedisDeliveryService;
pub use jobs::*;
pub use retry::RetryConfig;
pub use scheduler::{MaintenanceExecutor, SchedulerConfig, run_scheduler};
pub use workers::*;
