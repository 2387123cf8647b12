//! # Visibility-Keeper Service
//!
//! Background daemon that keeps queued messages invisible while a slow or
//! absent downstream processor catches up.
//!
//! On a fixed cadence the service drains a bounded batch from the queue and
//! extends every drained message's invisibility window, repairing partial
//! batch failures with one single-entry retry each. A message that cannot be
//! extended simply becomes visible again and is picked up on a later cycle.
//!
//! Modules:
//! - [`config`] - Layered file/environment configuration
//! - [`keeper`] - The poll-and-extend cycle
//! - [`scheduler`] - Fixed-rate cycle driver with graceful shutdown
//! - [`publisher`] - HTTP endpoint fanning test messages into the queue

pub mod config;
pub mod keeper;
pub mod publisher;
pub mod scheduler;
