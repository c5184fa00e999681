// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error type shared by every DOTS layer.
//!
//! Local API misuse (duplicate types, incomplete keys, unknown handlers, ...)
//! is reported synchronously to the caller. Transport and protocol trouble is
//! reported to the owning transceiver, which closes the affected connection.

use crate::types::PropertySet;
use thiserror::Error;

/// Errors returned by DOTS operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    // ========================================================================
    // Registry / descriptor errors
    // ========================================================================
    /// A type with the same name is already registered.
    #[error("there already is a type with name: {0}")]
    DuplicateType(String),

    /// No type with this name is known to the registry.
    #[error("no type registered with name: {0}")]
    UnknownType(String),

    /// Descriptor construction rejected its input.
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// A received struct descriptor references a type that has not been imported.
    #[error("missing type dependency: {0}")]
    MissingTypeDependency(String),

    /// A received vector property references an unknown value type.
    #[error("missing value type dependency: {0}")]
    MissingValueTypeDependency(String),

    /// The type cannot be represented at runtime.
    #[error("{0}")]
    UnsupportedType(String),

    // ========================================================================
    // Instance errors
    // ========================================================================
    /// Read access to a property that is not valid on the instance.
    #[error("attempt to access invalid property '{property}' of type '{type_name}'")]
    InvalidPropertyAccess { type_name: String, property: String },

    /// Construction of a property that is already valid.
    #[error("attempt to construct already valid property '{property}' of type '{type_name}'")]
    PropertyAlreadyValid { type_name: String, property: String },

    /// The struct has no property with this name or tag.
    #[error("type '{type_name}' has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },

    /// A value does not match the descriptor of the property it is assigned to.
    #[error("value for property '{property}' of type '{type_name}' is not a valid '{expected}'")]
    TypeMismatch {
        type_name: String,
        property: String,
        expected: String,
    },

    /// Required properties are missing on a received instance.
    #[error("instance of type '{type_name}' is missing properties {missing}")]
    MissingProperties {
        type_name: String,
        missing: PropertySet,
    },

    /// The instance was expected to be cached.
    #[error("instance is not part of container for type: {0}")]
    NotInContainer(String),

    // ========================================================================
    // Dispatch / transceiver errors
    // ========================================================================
    /// Removal of a handler id that was never registered for the type.
    #[error("cannot remove unknown handler for type: {0}")]
    UnknownHandler(String),

    /// Publish or remove without a complete key.
    #[error("attempt to publish instance of type '{type_name}' with missing key properties '{missing}'")]
    InvalidKey {
        type_name: String,
        missing: PropertySet,
    },

    /// Substruct-only types may never be published or subscribed top-level.
    #[error("attempt to {operation} substruct-only type '{type_name}'")]
    SubstructOnly {
        operation: &'static str,
        type_name: String,
    },

    /// Removal of an instance whose type is not cached.
    #[error("cannot remove uncached instance for type: {0}")]
    UncachedRemove(String),

    /// A subscriber callback panicked.
    #[error("error in handler for type '{type_name}': {message}")]
    Handler { type_name: String, message: String },

    // ========================================================================
    // Connection errors
    // ========================================================================
    /// Protocol violation or transport failure.
    #[error("{0}")]
    Connection(String),

    /// The peer closed the connection with an error.
    #[error("received DOTS error: ({code}) {text}")]
    PeerError { code: String, text: String },

    /// Authentication failed or could not be performed.
    #[error("{0}")]
    Authentication(String),

    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// Configuration could not be read or is invalid.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    pub(crate) fn connection(reason: impl Into<String>) -> Self {
        Self::Connection(reason.into())
    }

    /// True for errors that close a connection rather than report misuse.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_)
                | Self::PeerError { .. }
                | Self::Authentication(_)
                | Self::MissingTypeDependency(_)
                | Self::MissingValueTypeDependency(_)
                | Self::UnsupportedType(_)
        )
    }
}

/// Result type alias for DOTS operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            Error::DuplicateType("Foo".into()).to_string(),
            "there already is a type with name: Foo"
        );
        assert_eq!(
            Error::UncachedRemove("Foo".into()).to_string(),
            "cannot remove uncached instance for type: Foo"
        );
        assert_eq!(
            Error::SubstructOnly {
                operation: "subscribe to",
                type_name: "Bar".into()
            }
            .to_string(),
            "attempt to subscribe to substruct-only type 'Bar'"
        );
    }

    #[test]
    fn test_transport_classification() {
        assert!(Error::connection("closed").is_transport());
        assert!(Error::MissingTypeDependency("X".into()).is_transport());
        assert!(!Error::UnknownHandler("X".into()).is_transport());
    }
}
