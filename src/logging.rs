// ABOUTME: Process-wide tracing subscriber setup with set-once semantics
// ABOUTME: Library code only emits tracing events; installing a subscriber is the embedder's call
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Installs a process-wide `tracing` fmt subscriber.
///
/// The default level is `info`; `RUST_LOG` overrides it. The first call wins:
/// later calls, and calls made after the embedder installed its own
/// subscriber, are no-ops.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init();
    });
}
