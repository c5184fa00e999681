// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Guest side: one upstream connection to a host.
//!
//! Groups joined before the connection reaches `early_subscribe` are joined
//! during the preload phase, so their caches arrive before the connection
//! is reported connected. Groups joined when the connection closes are
//! joined again on the next [`GuestTransceiver::open`].

use crate::config::GuestConfig;
use crate::error::{Error, Result};
use crate::io::channel::Channel;
use crate::io::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::io::dispatcher::ErrorHandler;
use crate::io::header::{DotsHeader, Transmission};
use crate::io::transceiver::{Core, Role, Transceiver};
use crate::system::{DotsMember, DotsMemberEvent};
use crate::types::descriptor::Descriptor;
use crate::types::property_set::PropertySet;
use crate::types::structure::Struct;
use crate::types::time::TimePoint;
use parking_lot::Mutex;
use std::collections::BTreeSet;

#[derive(Debug, Default)]
struct GuestState {
    connection: Option<Connection>,
    joined: BTreeSet<String>,
    preload_publish: Vec<String>,
    preload_subscribe: Vec<String>,
}

/// The connection, if membership messages may be sent on it.
fn live(connection: &mut Option<Connection>) -> Option<&mut Connection> {
    connection.as_mut().filter(|c| {
        matches!(
            c.state(),
            ConnectionState::EarlySubscribe | ConnectionState::Connected
        )
    })
}

/// Guest role of a [`Transceiver`].
#[derive(Debug)]
pub struct Guest {
    auth_secret: Option<String>,
    state: Mutex<GuestState>,
}

impl Role for Guest {
    fn join_group(&self, _core: &Core, name: &str) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.joined.contains(name) {
            return Ok(());
        }

        match live(&mut state.connection) {
            Some(connection) => {
                connection.transmit_record(&DotsMember::new(name, DotsMemberEvent::Join))?;
                state.joined.insert(name.to_string());
                log::debug!("[guest] joined group '{}'", name);
            }
            None => {
                if !state.preload_subscribe.iter().any(|n| n == name) {
                    state.preload_subscribe.push(name.to_string());
                }
            }
        }
        Ok(())
    }

    fn leave_group(&self, _core: &Core, name: &str) -> Result<()> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        state.preload_subscribe.retain(|n| n != name);

        if !state.joined.remove(name) {
            return Ok(());
        }

        if let Some(connection) = live(&mut state.connection) {
            connection.transmit_record(&DotsMember::new(name, DotsMemberEvent::Leave))?;
            log::debug!("[guest] left group '{}'", name);
        }
        Ok(())
    }

    fn publish(&self, _core: &Core, instance: &Struct, included: PropertySet, remove: bool) -> Result<()> {
        let header = DotsHeader {
            sent_time: Some(TimePoint::now()),
            remove_obj: remove,
            ..DotsHeader::new(instance.type_name(), included)
        };

        let mut state = self.state.lock();
        let connection = match state.connection.as_mut() {
            Some(connection) if !connection.closed() => connection,
            _ => return Err(Error::connection("attempt to publish on closed connection")),
        };

        if !matches!(
            connection.state(),
            ConnectionState::EarlySubscribe | ConnectionState::Connected
        ) {
            return Err(Error::connection(format!(
                "attempt to publish in connection state {}",
                connection.state()
            )));
        }

        if let Err(e) = connection.transmit(&header, instance) {
            connection.handle_error(e.clone());
            return Err(e);
        }
        Ok(())
    }
}

/// Transceiver connected to a single host.
pub type GuestTransceiver = Transceiver<Guest>;

impl Default for Transceiver<Guest> {
    fn default() -> Self {
        Self::new(GuestConfig::default())
    }
}

impl Transceiver<Guest> {
    pub fn new(config: GuestConfig) -> Self {
        Self::build(config, None)
    }

    /// Guest whose handler failures and connection errors are reported to
    /// `error_handler`.
    pub fn with_error_handler(config: GuestConfig, error_handler: ErrorHandler) -> Self {
        Self::build(config, Some(error_handler))
    }

    fn build(config: GuestConfig, error_handler: Option<ErrorHandler>) -> Self {
        let role = Guest {
            auth_secret: config.auth_secret,
            state: Mutex::new(GuestState {
                preload_publish: config.preload_publish_types,
                preload_subscribe: config.preload_subscribe_types,
                ..Default::default()
            }),
        };
        Self::with_role(config.name, role, error_handler)
    }

    /// Connect to a host over `channel`.
    ///
    /// Fails if a connection is already open.
    pub fn open(&self, channel: impl Channel + 'static) -> Result<()> {
        let mut state = self.role().state.lock();

        if state.connection.as_ref().is_some_and(|c| !c.closed()) {
            return Err(Error::connection(format!(
                "guest '{}' is already connected",
                self.self_name()
            )));
        }

        let mut connection = Connection::guest(
            Box::new(channel),
            self.self_name(),
            self.role().auth_secret.clone(),
        );
        connection.open()?;
        log::debug!(
            "[guest] '{}' opening connection at '{}'",
            self.self_name(),
            connection.remote_endpoint()
        );
        state.connection = Some(connection);
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.role()
            .state
            .lock()
            .connection
            .as_ref()
            .is_some_and(Connection::connected)
    }

    /// State of the connection, `Closed` when there is none.
    pub fn connection_state(&self) -> ConnectionState {
        self.role()
            .state
            .lock()
            .connection
            .as_ref()
            .map_or(ConnectionState::Closed, Connection::state)
    }

    /// Id the host assigned to this guest.
    pub fn self_id(&self) -> Option<u32> {
        self.role()
            .state
            .lock()
            .connection
            .as_ref()
            .map(Connection::self_id)
    }

    /// Name of the host, once its hello was received.
    pub fn host_name(&self) -> Option<String> {
        self.role()
            .state
            .lock()
            .connection
            .as_ref()
            .map(|c| c.peer_name().to_string())
    }

    /// Groups this guest is a member of on the host.
    pub fn joined_groups(&self) -> Vec<String> {
        self.role().state.lock().joined.iter().cloned().collect()
    }

    /// Close the connection gracefully.
    pub fn close(&self) {
        let connection = self.role().state.lock().connection.take();
        if let Some(mut connection) = connection {
            connection.close();
            self.handle_closed(None);
        }
    }

    /// Handle everything the connection has received. Returns the number of
    /// connection events handled.
    pub fn process_events(&self) -> usize {
        let mut handled = 0;

        loop {
            let event = {
                let mut state = self.role().state.lock();
                let Some(connection) = state.connection.as_mut() else {
                    break;
                };
                let mut registry = self.core().lock_registry();
                connection.next_event(&mut registry)
            };
            self.core().flush_new_types();

            let Some(event) = event else {
                break;
            };
            handled += 1;

            match event {
                ConnectionEvent::Transmission(transmission) => self.handle_transmission(&transmission),
                ConnectionEvent::Transition { state, error } => self.handle_transition(state, error),
            }
        }

        handled
    }

    fn handle_transmission(&self, transmission: &Transmission) {
        if let Err(e) = self.core().dispatcher().dispatch(transmission) {
            self.fail(e);
        }
    }

    fn handle_transition(&self, state: ConnectionState, error: Option<Error>) {
        match state {
            ConnectionState::EarlySubscribe => {
                if let Err(e) = self.preload() {
                    self.fail(e);
                }
            }
            ConnectionState::Closed => {
                self.role().state.lock().connection = None;
                self.handle_closed(error);
            }
            _ => {}
        }
    }

    /// Share the preload types with the host and join the pending groups.
    fn preload(&self) -> Result<()> {
        let (publish, subscribe) = {
            let mut state = self.role().state.lock();
            (
                std::mem::take(&mut state.preload_publish),
                std::mem::take(&mut state.preload_subscribe),
            )
        };

        let resolve = |names: &[String]| -> Vec<(String, Option<Descriptor>)> {
            let registry = self.core().lock_registry();
            names
                .iter()
                .map(|name| (name.clone(), registry.find_type(name)))
                .collect()
        };
        let publish = resolve(&publish);
        let subscribe = resolve(&subscribe);

        let mut guard = self.role().state.lock();
        let state = &mut *guard;
        let Some(connection) = state.connection.as_mut() else {
            return Ok(());
        };

        for (name, descriptor) in &publish {
            match descriptor {
                Some(descriptor) => connection.transmit_descriptor(descriptor)?,
                None => log::warn!("[guest] cannot preload unknown type '{}'", name),
            }
        }

        for (name, descriptor) in &subscribe {
            if let Some(descriptor) = descriptor {
                connection.transmit_descriptor(descriptor)?;
            }
            if state.joined.insert(name.clone()) {
                connection.transmit_record(&DotsMember::new(name.as_str(), DotsMemberEvent::Join))?;
            }
        }

        log::debug!(
            "[guest] preloading {} published and {} subscribed type(s)",
            publish.len(),
            subscribe.len()
        );
        Ok(())
    }

    fn handle_closed(&self, error: Option<Error>) {
        {
            let mut guard = self.role().state.lock();
            let state = &mut *guard;
            for name in std::mem::take(&mut state.joined) {
                if !state.preload_subscribe.contains(&name) {
                    state.preload_subscribe.push(name);
                }
            }
        }

        if let Some(error) = error {
            self.core().dispatcher().report(&error);
        }
    }

    fn fail(&self, error: Error) {
        if let Some(connection) = self.role().state.lock().connection.as_mut() {
            connection.handle_error(error);
        }
    }
}
