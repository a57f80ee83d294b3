//! Scheduling, diffing and bookkeeping for the monitored services.
pub mod clock;
pub mod differ;
pub mod herald;
pub mod pool;
pub mod roster;
pub mod schedule;
pub mod service;
