// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! Thin, non-reentrant command wrappers over [`crate::Connection::send`] /
//! [`crate::Connection::subscribe`] (spec.md §4.5). Each maps a typed API
//! onto the raw `com.roonlabs.*` service paths.

pub mod browse;
pub mod transport;

pub use browse::BrowseService;
pub use transport::TransportService;
