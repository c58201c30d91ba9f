// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! An async client for the Roon music-system control protocol: MOO/1, a
//! length-framed text-over-binary RPC protocol carried over WebSocket.
//!
//! The [`Connection`] type is the entry point: it performs the registration
//! handshake, correlates requests with responses, owns subscriptions, and
//! survives disconnects with token-remembered re-registration and bounded
//! exponential-backoff reconnect. [`services::TransportService`] and
//! [`services::BrowseService`] are thin typed wrappers over it.

pub mod clock;
pub mod codec;
pub mod connection;
pub mod error;
pub mod image;
pub mod logging;
pub mod models;
pub mod reconnect;
pub mod registration;
pub mod response;
pub mod services;
pub mod subscription;
pub mod token_store;
pub mod transport;

pub use connection::{Connection, ConnectionConfig, StateStream, SubscriptionStream};
pub use error::{CodecError, Error, ImageError, ServiceError};
pub use image::{FetchedImage, ImageClient, ImageFormat, ImageRequest, Scale};
pub use models::{BrowseItem, Output, OutputsEvent, QueueEvent, QueueItem, Zone, ZonesEvent};
pub use reconnect::{ReconnectConfig, Reconnector};
pub use registration::{ConnectionState, RegistrationRecord, RegistrationRecordBuilder};
pub use response::RoonResponse;
pub use services::{BrowseService, TransportService};
pub use token_store::{InMemoryTokenStore, TokenStore};
pub use transport::{Message, Transport, WebSocketTransport};
