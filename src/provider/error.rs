//! Error types shared by every provider implementation.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Resource families addressed by provider calls.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Compute instance.
    Server,
    /// Compute flavor (instance size).
    Flavor,
    /// Boot image or snapshot.
    Image,
    /// Tenant or provider network.
    Network,
    /// Network with `router:external` set, used for gateways and floating IPs.
    ExternalNetwork,
    /// Subnet attached to a network.
    Subnet,
    /// Router.
    Router,
    /// Network port.
    Port,
    /// Security group.
    SecurityGroup,
    /// Block storage volume.
    Volume,
    /// Floating IP allocation.
    FloatingIp,
}

impl ResourceKind {
    /// Human readable resource label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Flavor => "flavor",
            Self::Image => "image",
            Self::Network => "network",
            Self::ExternalNetwork => "external network",
            Self::Subnet => "subnet",
            Self::Router => "router",
            Self::Port => "port",
            Self::SecurityGroup => "security group",
            Self::Volume => "volume",
            Self::FloatingIp => "floating IP",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse classification of provider failures.
///
/// Callers use the class to tell transient conditions from terminal ones
/// without matching on message text.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// A named resource does not exist.
    NotFound,
    /// A wait exceeded its deadline.
    Timeout,
    /// The backend rejected or failed the request.
    BackendFault,
}

/// Errors raised by provider calls and the waits built on them.
#[derive(Clone, Debug, Error, Eq, PartialEq, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ProviderError {
    /// Raised when a named resource cannot be resolved.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Resource family that was looked up.
        kind: ResourceKind,
        /// Name or identifier used for the lookup.
        name: String,
    },
    /// Raised when a status wait exceeds its deadline.
    #[error("timeout waiting for {action} on {resource_id}")]
    Timeout {
        /// Action being waited on (for example `status ACTIVE`).
        action: String,
        /// Provider identifier of the resource.
        resource_id: String,
    },
    /// Raised when a resource enters a failure status during a wait.
    #[error("{resource_id} entered status {status} while waiting for {action}")]
    FailedStatus {
        /// Action being waited on.
        action: String,
        /// Provider identifier of the resource.
        resource_id: String,
        /// Status reported by the provider.
        status: String,
    },
    /// Raised when the identity service rejects the credentials.
    #[error("authentication failed: {message}")]
    Auth {
        /// Message returned by the identity service.
        message: String,
    },
    /// Raised when a request is rejected before it reaches the backend.
    #[error("invalid request: {message}")]
    Validation {
        /// Reason the request was rejected.
        message: String,
    },
    /// Wrapper for backend and transport failures.
    #[error("provider error: {message}")]
    Backend {
        /// HTTP status when the backend answered, `None` for transport errors.
        status: Option<u16>,
        /// Message returned by the backend or transport.
        message: String,
    },
}

impl ProviderError {
    /// Builds a [`ProviderError::NotFound`] for `kind` and `name`.
    #[must_use]
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Builds a [`ProviderError::Backend`] without an HTTP status.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            status: None,
            message: message.into(),
        }
    }

    /// Returns the coarse class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Timeout { .. } => ErrorClass::Timeout,
            Self::FailedStatus { .. }
            | Self::Auth { .. }
            | Self::Validation { .. }
            | Self::Backend { .. } => ErrorClass::BackendFault,
        }
    }

    /// Reports whether repeating the call could succeed.
    ///
    /// Timeouts, transport failures, throttling and server-side errors are
    /// transient. Missing resources, rejected credentials, invalid requests and
    /// resources stuck in a failure status are terminal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Backend { status: None, .. } => true,
            Self::Backend {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            Self::NotFound { .. }
            | Self::FailedStatus { .. }
            | Self::Auth { .. }
            | Self::Validation { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ProviderError::not_found(ResourceKind::Flavor, "m1.huge"), ErrorClass::NotFound, false)]
    #[case(
        ProviderError::Timeout { action: String::from("status ACTIVE"), resource_id: String::from("srv-1") },
        ErrorClass::Timeout,
        true
    )]
    #[case(ProviderError::backend("connection reset"), ErrorClass::BackendFault, true)]
    #[case(
        ProviderError::Backend { status: Some(503), message: String::from("unavailable") },
        ErrorClass::BackendFault,
        true
    )]
    #[case(
        ProviderError::Backend { status: Some(409), message: String::from("conflict") },
        ErrorClass::BackendFault,
        false
    )]
    #[case(
        ProviderError::FailedStatus {
            action: String::from("status ACTIVE"),
            resource_id: String::from("srv-1"),
            status: String::from("ERROR"),
        },
        ErrorClass::BackendFault,
        false
    )]
    fn classifies_errors(
        #[case] error: ProviderError,
        #[case] class: ErrorClass,
        #[case] retryable: bool,
    ) {
        assert_eq!(error.class(), class);
        assert_eq!(error.is_retryable(), retryable);
    }

    #[test]
    fn not_found_message_names_kind_and_resource() {
        let error = ProviderError::not_found(ResourceKind::ExternalNetwork, "any");
        assert_eq!(error.to_string(), "external network 'any' not found");
    }
}
