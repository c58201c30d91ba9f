// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! A process-wide verbosity toggle (spec.md §6), since the library is always
//! embedded and has no CLI of its own to gate logging with flags.

use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Switch between a verbose-and-persisted level and a cheap-and-ephemeral
/// level. Affects only whether this crate's own `tracing::debug!`/`trace!`
/// call sites are worth evaluating their arguments for; subscriber-level
/// filtering is still the host's responsibility.
pub fn set_verbose(verbose: bool) {
    VERBOSE.store(verbose, Ordering::Relaxed);
}

/// Whether verbose diagnostic logging is currently enabled.
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Install a reasonable default `tracing` subscriber for hosts that don't
/// already have one. Only ever registers a global default once; later calls
/// are no-ops.
pub fn init() {
    let filter = if is_verbose() { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
