// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Publish/Subscribe Runtime
//!
//! ```text
//! +------------------------------------------------------+
//! |     GuestTransceiver          HostTransceiver        |
//! |            \                      /                  |
//! |             Transceiver<Role> (core)                 |
//! |         registry | dispatcher | subscriptions        |
//! +------------------------------------------------------+
//! |   Dispatcher -> ContainerPool -> Container           |
//! +------------------------------------------------------+
//! |   Connection (handshake, header stamping)            |
//! |   DependencyTracker (descriptor export / import)     |
//! |   Channel (LocalChannel, ...)                        |
//! +------------------------------------------------------+
//! ```

pub mod auth;
pub mod channel;
pub mod connection;
pub mod container;
pub mod descriptor_converter;
pub mod dispatcher;
pub mod event;
pub mod guest;
pub mod header;
pub mod host;
pub mod local_channel;
pub mod subscription;
pub mod transceiver;

pub use auth::{AuthManager, Digest, Nonce, SecretAuthManager};
pub use channel::{Channel, DependencyTracker};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use container::{CloneInformation, Container, ContainerPool, Mt};
pub use descriptor_converter::DescriptorConverter;
pub use dispatcher::{Dispatcher, ErrorHandler, EventHandler, HandlerId, TransmissionHandler};
pub use event::Event;
pub use guest::{Guest, GuestTransceiver};
pub use header::{DotsHeader, Transmission};
pub use host::{Host, HostTransceiver};
pub use local_channel::LocalChannel;
pub use subscription::{Subscription, SubscriptionKind, Unsubscribe};
pub use transceiver::{Core, DescriptorHandler, Role, Transceiver};
