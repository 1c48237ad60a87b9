//! Background tasks that keep the published calendars fresh.
//!
//! The sync task runs as a tokio background task inside the server
//! process, sharing settings and the output directory with the HTTP side.

pub mod calendar;

pub use calendar::{run_sync_cycle, start_calendar_sync_task, CycleStats};
