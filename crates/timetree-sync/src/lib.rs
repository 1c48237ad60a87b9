//! Periodically exports TimeTree calendars to `.ics` files with the external
//! `timetree-exporter` tool and republishes them over HTTP for calendar
//! subscriptions.

pub mod config;
pub mod error;
pub mod exporter;
pub mod handlers;
pub mod pollers;
pub mod routes;
pub mod state;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber; `RUST_LOG` overrides `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
