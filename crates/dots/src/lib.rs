// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DOTS - Distributed Objects in Time and Space
//!
//! A typed publish/subscribe middleware with a host-side authoritative cache.
//! Guests connect to a single host, join the groups of the types they are
//! interested in and receive every change of those types; the host keeps
//! the current state of every cached type and replays it to new members.
//!
//! ## Quick Start
//!
//! ```rust
//! use dots::{
//!     Event, FundamentalKind, GuestConfig, GuestTransceiver, HostTransceiver, LocalChannel,
//!     Result, Struct, StructDescriptorBuilder,
//! };
//!
//! fn main() -> Result<()> {
//!     let host = HostTransceiver::default();
//!     let guest = GuestTransceiver::new(GuestConfig::new("sensor"));
//!
//!     let (host_end, guest_end) = LocalChannel::pair();
//!     host.accept(host_end)?;
//!     guest.open(guest_end)?;
//!
//!     let temperature = StructDescriptorBuilder::new("Temperature")
//!         .cached()
//!         .key("room", 1, FundamentalKind::String)
//!         .field("celsius", 2, FundamentalKind::Float64)
//!         .build_arc()?;
//!     let _subscription = guest.subscribe(&temperature, |event: &Event| {
//!         println!("{:?}", event.updated());
//!     })?;
//!
//!     while host.process_events() + guest.process_events() > 0 {}
//!
//!     let mut reading = Struct::new(&temperature);
//!     reading.set("room", "kitchen")?.set("celsius", 21.5)?;
//!     guest.publish(&reading, None, false)?;
//!
//!     while host.process_events() + guest.process_events() > 0 {}
//!     assert_eq!(host.container_len("Temperature"), 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Registry`] | Name -> descriptor catalog of one transceiver |
//! | [`Struct`] | Dynamic instance of a struct type |
//! | [`Container`] | Per-type cache keyed by the key properties |
//! | [`Dispatcher`] | Routes transmissions to handlers and maintains the cache |
//! | [`GuestTransceiver`] | Connects to one host |
//! | [`HostTransceiver`] | Serves guests and relays their publications |
//!
//! ## Modules Overview
//!
//! - [`types`] - descriptors, values, property sets, struct operations
//! - [`system`] - compiled-in protocol records
//! - [`io`] - containers, dispatch, transceivers, connections, channels
//! - [`config`] - protocol constants and TOML configuration

/// Global configuration (protocol constants, guest and host settings).
pub mod config;
/// Crate-wide error type.
pub mod error;
/// Runtime: cache, dispatch, transceivers and connections.
pub mod io;
/// Compiled-in system types.
pub mod system;
/// Type descriptors, values and generic struct operations.
pub mod types;

pub use config::{AuthConfig, ConfigError, GuestConfig, HostConfig};
pub use error::{Error, Result};
pub use io::{
    AuthManager, Channel, CloneInformation, Connection, ConnectionEvent, ConnectionState,
    Container, ContainerPool, DescriptorConverter, Dispatcher, DotsHeader, Event, GuestTransceiver,
    HostTransceiver, LocalChannel, Mt, SecretAuthManager, Subscription, Transceiver, Transmission,
};
pub use system::{PropertyType, Record};
pub use types::{
    Descriptor, EnumDescriptor, EnumDescriptorBuilder, FundamentalKind, PropertySet, Registry,
    Struct, StructDescriptor, StructDescriptorBuilder, TimePoint, Value,
};

/// DOTS crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
