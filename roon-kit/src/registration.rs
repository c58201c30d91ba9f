// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! The registration handshake's data model: what a host sends in `register`,
//! and the states the connection moves through while establishing a session.

use serde::{Deserialize, Serialize};

/// The record sent in the `POST com.roonlabs.registry:1/register` request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRecord {
    /// A stable identifier for this extension, e.g. a reverse-DNS string.
    pub extension_id: String,
    /// The human-readable name shown in Roon's extension manager.
    pub display_name: String,
    /// The extension's version string.
    pub display_version: String,
    /// The publisher's name.
    pub publisher: String,
    /// A contact email.
    pub email: String,
    /// An optional website URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    /// Services this extension requires the Core to provide.
    pub required_services: Vec<String>,
    /// Services this extension may optionally use.
    #[serde(default)]
    pub optional_services: Vec<String>,
    /// Services this extension provides to the Core (must include ping).
    pub provided_services: Vec<String>,
    /// A credential remembered from a prior successful registration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// A small builder over [`RegistrationRecord`], since the spec describes the
/// record's fields but not how a host assembles one.
#[derive(Debug, Clone, Default)]
pub struct RegistrationRecordBuilder {
    extension_id: String,
    display_name: String,
    display_version: String,
    publisher: String,
    email: String,
    website: Option<String>,
    required_services: Vec<String>,
    optional_services: Vec<String>,
    provided_services: Vec<String>,
}

impl RegistrationRecordBuilder {
    /// Start building a record for the given extension id.
    pub fn new(extension_id: impl Into<String>) -> Self {
        Self {
            extension_id: extension_id.into(),
            provided_services: vec!["com.roonlabs.ping:1".to_string()],
            required_services: vec![
                "com.roonlabs.transport:2".to_string(),
                "com.roonlabs.browse:1".to_string(),
            ],
            ..Default::default()
        }
    }

    /// Set the display name shown in Roon's extension manager.
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the extension's version string.
    pub fn display_version(mut self, version: impl Into<String>) -> Self {
        self.display_version = version.into();
        self
    }

    /// Set the publisher's name.
    pub fn publisher(mut self, publisher: impl Into<String>) -> Self {
        self.publisher = publisher.into();
        self
    }

    /// Set a contact email.
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Set an optional website URL.
    pub fn website(mut self, website: impl Into<String>) -> Self {
        self.website = Some(website.into());
        self
    }

    /// Add a service this extension additionally requires.
    pub fn require_service(mut self, service: impl Into<String>) -> Self {
        self.required_services.push(service.into());
        self
    }

    /// Add a service this extension additionally provides.
    pub fn provide_service(mut self, service: impl Into<String>) -> Self {
        self.provided_services.push(service.into());
        self
    }

    /// Finish building, attaching a remembered token if one is supplied.
    pub fn build(self, token: Option<String>) -> RegistrationRecord {
        RegistrationRecord {
            extension_id: self.extension_id,
            display_name: self.display_name,
            display_version: self.display_version,
            publisher: self.publisher,
            email: self.email,
            website: self.website,
            required_services: self.required_services,
            optional_services: self.optional_services,
            provided_services: self.provided_services,
            token,
        }
    }
}

/// The connection's lifecycle state.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// No connection attempt is in progress.
    Disconnected,
    /// The transport is being established.
    Connecting,
    /// The registration handshake is underway.
    Registering,
    /// Registration is blocked on the user approving the extension in Roon's UI.
    AwaitingAuthorization,
    /// A session is fully established.
    Connected {
        /// The Core's id.
        core_id: String,
        /// The Core's display name.
        core_name: String,
    },
    /// A previously-connected session is being re-established.
    Reconnecting {
        /// The current reconnect attempt number, starting at 1.
        attempt: u32,
    },
    /// The connection has given up.
    Failed {
        /// A human-readable description of why.
        error: String,
    },
}

impl ConnectionState {
    /// Whether commands may be sent in this state.
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected { .. })
    }
}
