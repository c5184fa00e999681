// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host side: the authoritative cache and the hub of every guest.
//!
//! The host dispatches each accepted transmission locally and relays it to
//! every guest that joined the group of its type. It answers the internal
//! requests of its guests itself:
//!
//! - `DotsMember` updates group membership; a join of a cached type is
//!   answered with the current cache and a `DotsCacheInfo` end marker,
//! - `DotsDescriptorRequest` is answered with the matching descriptors,
//! - `DotsClearCache` removes every cached instance of the listed types.

use crate::config::{HostConfig, FIRST_GUEST_ID, HOST_ID};
use crate::error::{Error, Result};
use crate::io::auth::{AuthManager, SecretAuthManager};
use crate::io::channel::Channel;
use crate::io::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::io::dispatcher::ErrorHandler;
use crate::io::header::{DotsHeader, Transmission};
use crate::io::transceiver::{Core, Role, Transceiver};
use crate::system::{
    DotsCacheInfo, DotsClearCache, DotsDescriptorRequest, DotsMember, DotsMemberEvent, Record,
};
use crate::types::descriptor::Descriptor;
use crate::types::property_set::PropertySet;
use crate::types::structure::Struct;
use crate::types::time::TimePoint;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

struct HostState {
    connections: BTreeMap<u32, Connection>,
    groups: BTreeMap<String, BTreeSet<u32>>,
    next_guest_id: u32,
    auth_manager: Option<Arc<dyn AuthManager>>,
}

impl HostState {
    /// Relay a transmission to every open member of its group. A failing
    /// connection is closed with the error.
    fn transmit_to_group(&mut self, header: &DotsHeader, instance: &Struct) {
        let Some(members) = self.groups.get(&header.type_name) else {
            return;
        };

        for id in members {
            let Some(connection) = self.connections.get_mut(id) else {
                continue;
            };
            if connection.closed() {
                continue;
            }

            log::debug!(
                "[host] deliver '{}' to guest '{}' ({})",
                header.type_name,
                connection.peer_name(),
                id
            );
            if let Err(e) = connection.transmit(header, instance) {
                connection.handle_error(e);
            }
        }
    }

    fn connection(&mut self, id: u32) -> Result<&mut Connection> {
        self.connections
            .get_mut(&id)
            .ok_or_else(|| Error::connection(format!("no connection with id {}", id)))
    }
}

/// Host role of a [`Transceiver`].
pub struct Host {
    state: Mutex<HostState>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Host")
            .field("connections", &state.connections.len())
            .field("groups", &state.groups)
            .finish_non_exhaustive()
    }
}

impl Role for Host {
    fn join_group(&self, _core: &Core, _name: &str) -> Result<()> {
        Ok(())
    }

    fn leave_group(&self, _core: &Core, _name: &str) -> Result<()> {
        Ok(())
    }

    fn publish(&self, core: &Core, instance: &Struct, included: PropertySet, remove: bool) -> Result<()> {
        let now = TimePoint::now();
        let header = DotsHeader {
            sent_time: Some(now),
            server_sent_time: Some(now),
            sender: Some(HOST_ID),
            remove_obj: remove,
            is_from_myself: true,
            ..DotsHeader::new(instance.type_name(), included)
        };

        let transmission = Transmission::new(header, instance.rebind(instance.descriptor(), included)?);
        core.dispatcher().dispatch(&transmission)?;

        let mut header = transmission.header().clone();
        header.is_from_myself = false;
        self.state
            .lock()
            .transmit_to_group(&header, transmission.instance());
        Ok(())
    }
}

/// Transceiver serving any number of guests.
pub type HostTransceiver = Transceiver<Host>;

impl Default for Transceiver<Host> {
    fn default() -> Self {
        Self::build(HostConfig::default(), None)
    }
}

impl Transceiver<Host> {
    /// Host configured by `config`. Guests are challenged when
    /// `config.auth` is set.
    pub fn new(config: HostConfig) -> Self {
        Self::build(config, None)
    }

    /// Host whose handler failures and connection errors are reported to
    /// `error_handler`.
    pub fn with_error_handler(config: HostConfig, error_handler: ErrorHandler) -> Self {
        Self::build(config, Some(error_handler))
    }

    fn build(config: HostConfig, error_handler: Option<ErrorHandler>) -> Self {
        let auth_manager = config
            .auth
            .map(|auth| Arc::new(SecretAuthManager::new(auth)) as Arc<dyn AuthManager>);

        let role = Host {
            state: Mutex::new(HostState {
                connections: BTreeMap::new(),
                groups: BTreeMap::new(),
                next_guest_id: FIRST_GUEST_ID,
                auth_manager,
            }),
        };
        Self::with_role(config.name, role, error_handler)
    }

    /// Policy applied to connections accepted from now on.
    pub fn set_auth_manager(&self, auth_manager: Option<Arc<dyn AuthManager>>) {
        self.role().state.lock().auth_manager = auth_manager;
    }

    /// Start serving a guest over `channel`. Returns the id assigned to it.
    pub fn accept(&self, channel: impl Channel + 'static) -> Result<u32> {
        let mut state = self.role().state.lock();
        let id = state.next_guest_id;
        state.next_guest_id += 1;

        let mut connection = Connection::host(
            Box::new(channel),
            self.self_name(),
            id,
            state.auth_manager.clone(),
        );
        connection.open()?;

        log::debug!(
            "[host] accepted guest {} from '{}'",
            id,
            connection.remote_endpoint()
        );
        state.connections.insert(id, connection);
        Ok(id)
    }

    /// Close the connection of guest `id` gracefully. It is forgotten by the
    /// next [`process_events`](Self::process_events).
    pub fn disconnect(&self, id: u32) -> Result<()> {
        self.role().state.lock().connection(id)?.close();
        Ok(())
    }

    /// Number of guest connections, including those not connected yet.
    pub fn connection_count(&self) -> usize {
        self.role().state.lock().connections.len()
    }

    pub fn connection_state(&self, id: u32) -> Option<ConnectionState> {
        self.role()
            .state
            .lock()
            .connections
            .get(&id)
            .map(Connection::state)
    }

    /// Name the guest `id` announced.
    pub fn peer_name(&self, id: u32) -> Option<String> {
        self.role()
            .state
            .lock()
            .connections
            .get(&id)
            .map(|c| c.peer_name().to_string())
    }

    /// Ids of the guests in the group `name`.
    pub fn group_members(&self, name: &str) -> Vec<u32> {
        self.role()
            .state
            .lock()
            .groups
            .get(name)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Handle everything the guests have sent. Returns the number of
    /// connection events handled.
    pub fn process_events(&self) -> usize {
        let mut handled = 0;

        loop {
            let ids: Vec<u32> = self.role().state.lock().connections.keys().copied().collect();
            let mut progressed = false;

            for id in ids {
                while let Some(event) = self.next_event(id) {
                    progressed = true;
                    handled += 1;

                    match event {
                        ConnectionEvent::Transmission(transmission) => {
                            self.handle_transmission(id, transmission);
                        }
                        ConnectionEvent::Transition { state, error } => {
                            self.handle_transition(id, state, error);
                        }
                    }
                }
            }

            if !progressed {
                break;
            }
        }

        handled
    }

    fn next_event(&self, id: u32) -> Option<ConnectionEvent> {
        let event = {
            let mut state = self.role().state.lock();
            let connection = state.connections.get_mut(&id)?;
            let mut registry = self.core().lock_registry();
            connection.next_event(&mut registry)
        };
        self.core().flush_new_types();
        event
    }

    fn fail(&self, id: u32, error: Error) {
        if let Some(connection) = self.role().state.lock().connections.get_mut(&id) {
            connection.handle_error(error);
        }
    }

    fn handle_transmission(&self, origin: u32, transmission: Transmission) {
        let instance = transmission.instance();

        match instance.type_name() {
            DotsMember::TYPE_NAME => {
                if let Err(e) = self.handle_member(origin, instance) {
                    self.fail(origin, e);
                }
                return;
            }
            DotsDescriptorRequest::TYPE_NAME => {
                if let Err(e) = self.handle_descriptor_request(origin, instance) {
                    self.fail(origin, e);
                }
                return;
            }
            DotsClearCache::TYPE_NAME => {
                if let Err(e) = self.handle_clear_cache(instance) {
                    self.fail(origin, e);
                    return;
                }
            }
            _ => {}
        }

        if let Err(e) = self.core().dispatcher().dispatch(&transmission) {
            self.fail(origin, e);
            return;
        }

        self.role()
            .state
            .lock()
            .transmit_to_group(transmission.header(), transmission.instance());
    }

    fn handle_transition(&self, id: u32, state: ConnectionState, error: Option<Error>) {
        match state {
            ConnectionState::Connected => {
                let state = self.role().state.lock();
                if let Some(connection) = state.connections.get(&id) {
                    log::info!(
                        "[host] guest '{}' opened connection at '{}' from '{}'",
                        connection.peer_name(),
                        connection.local_endpoint(),
                        connection.remote_endpoint()
                    );
                }
            }
            ConnectionState::Closed => self.handle_closed(id, error),
            _ => {}
        }
    }

    fn handle_closed(&self, id: u32, error: Option<Error>) {
        let connection = {
            let mut state = self.role().state.lock();
            for members in state.groups.values_mut() {
                members.remove(&id);
            }
            state.groups.retain(|_, members| !members.is_empty());
            state.connections.remove(&id)
        };

        let peer_name = connection
            .as_ref()
            .map(|c| c.peer_name().to_string())
            .unwrap_or_default();
        drop(connection);

        let cleanup: Vec<Struct> = self.with_pool(|pool| {
            pool.iter()
                .filter(|container| container.descriptor().is_cleanup())
                .flat_map(|container| {
                    container
                        .iter()
                        .filter(|(_, info)| info.last_update_from == Some(id))
                        .map(|(instance, _)| instance.clone())
                })
                .collect()
        });

        for instance in &cleanup {
            if let Err(e) = self.remove(instance) {
                log::warn!(
                    "[host] failed to clean up '{}' of guest '{}': {}",
                    instance.type_name(),
                    peer_name,
                    e
                );
            }
        }

        log::debug!(
            "[host] guest '{}' ({}) erased, {} instance(s) cleaned up",
            peer_name,
            id,
            cleanup.len()
        );

        if let Some(error) = error {
            self.core().dispatcher().report(&error);
        }
    }

    fn handle_member(&self, origin: u32, instance: &Struct) -> Result<()> {
        instance.assert_has_properties(PropertySet::from_tags([1, 2]))?;
        let member = DotsMember::from_struct(instance)?;
        let group = member.group_name.unwrap_or_default();

        let mut state = self.role().state.lock();
        let peer_name = state.connection(origin)?.peer_name().to_string();

        match member.event {
            Some(DotsMemberEvent::Kill) | None => {
                log::warn!("[host] guest '{}' requested unsupported kill event", peer_name);
                Ok(())
            }
            Some(DotsMemberEvent::Leave) => {
                let removed = state
                    .groups
                    .get_mut(&group)
                    .is_some_and(|members| members.remove(&origin));
                if removed {
                    state.groups.retain(|_, members| !members.is_empty());
                    log::debug!("[host] guest '{}' left group '{}'", peer_name, group);
                } else {
                    log::warn!(
                        "[host] guest '{}' is not a member of group '{}'",
                        peer_name,
                        group
                    );
                }
                Ok(())
            }
            Some(DotsMemberEvent::Join) => {
                if state.groups.entry(group.clone()).or_default().insert(origin) {
                    log::info!("[host] guest '{}' is now a member of group '{}'", peer_name, group);
                } else {
                    log::warn!(
                        "[host] guest '{}' is already member of group '{}'",
                        peer_name,
                        group
                    );
                }
                drop(state);
                self.transmit_cache(origin, &group)
            }
        }
    }

    /// Send the cache of `type_name` to guest `id`, followed by the end
    /// marker. Does nothing for unknown or uncached types.
    fn transmit_cache(&self, id: u32, type_name: &str) -> Result<()> {
        let cached_type = self
            .find_struct_type(type_name)
            .is_some_and(|descriptor| descriptor.is_cached());
        if !cached_type {
            return Ok(());
        }

        let cached = self.cached(type_name);
        let mut state = self.role().state.lock();
        let connection = state.connection(id)?;
        log::debug!("[host] send cache for '{}' size={}", type_name, cached.len());

        let mut remaining = cached.len() as u32;
        for (instance, clone_info) in &cached {
            remaining -= 1;
            let header = DotsHeader {
                sent_time: clone_info.modified,
                server_sent_time: Some(TimePoint::now()),
                sender: clone_info.last_update_from,
                from_cache: Some(remaining),
                ..DotsHeader::for_instance(instance)
            };
            connection.transmit(&header, instance)?;
        }

        connection.transmit_record(&DotsCacheInfo {
            type_name: Some(type_name.to_string()),
            end_transmission: Some(true),
            ..Default::default()
        })
    }

    fn handle_descriptor_request(&self, origin: u32, instance: &Struct) -> Result<()> {
        let request = DotsDescriptorRequest::from_struct(instance)?;
        let whitelist = request.whitelist.unwrap_or_default();
        let blacklist = request.blacklist.unwrap_or_default();

        let descriptors: Vec<Descriptor> = self.with_registry(|registry| {
            let mut descriptors = Vec::new();
            registry.for_each_struct(|descriptor| {
                let name = descriptor.name();
                let listed = |list: &[String]| list.iter().any(|n| n == name);
                if descriptor.is_internal()
                    || (!whitelist.is_empty() && !listed(&whitelist))
                    || (!blacklist.is_empty() && listed(&blacklist))
                {
                    return;
                }
                descriptors.push(Descriptor::Struct(Arc::clone(descriptor)));
            });
            descriptors
        });

        let mut state = self.role().state.lock();
        let connection = state.connection(origin)?;
        log::info!(
            "[host] received descriptor request from '{}' ({}), sending {} descriptor(s)",
            connection.peer_name(),
            origin,
            descriptors.len()
        );

        for descriptor in &descriptors {
            connection.transmit_descriptor(descriptor)?;
        }

        connection.transmit_record(&DotsCacheInfo {
            end_descriptor_request: Some(true),
            ..Default::default()
        })
    }

    fn handle_clear_cache(&self, instance: &Struct) -> Result<()> {
        instance.assert_has_properties(PropertySet::from_tag(1))?;
        let request = DotsClearCache::from_struct(instance)?;

        for type_name in request.type_names.unwrap_or_default() {
            let cached = self.cached(&type_name);
            log::info!("[host] clear container '{}' ({} elements)", type_name, cached.len());

            for (instance, _) in &cached {
                self.remove(instance)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::event::Event;
    use crate::io::local_channel::LocalChannel;
    use crate::types::builder::StructDescriptorBuilder;
    use crate::types::descriptor::FundamentalKind;
    use crate::types::value::Value;

    fn entry(host: &HostTransceiver, key: u32) -> Struct {
        let d = StructDescriptorBuilder::new("Entry")
            .cached()
            .key("key", 1, FundamentalKind::UInt32)
            .build_arc()
            .expect("valid descriptor");
        let d = host
            .register_type(d, false)
            .ok()
            .and_then(|d| d.as_struct().cloned())
            .expect("registered");
        let mut instance = Struct::new(&d);
        instance.put(1, Value::UInt32(key));
        instance
    }

    #[test]
    fn test_publish_dispatches_locally() -> Result<()> {
        let host = HostTransceiver::new(HostConfig::new("hub"));
        let headers = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&headers);
        let d = host.get_struct_type("DotsCacheInfo")?;
        let _subscription = host.subscribe(&d, move |e: &Event| sink.lock().push(e.header().clone()))?;

        host.publish_record(&DotsCacheInfo {
            type_name: Some("x".into()),
            ..Default::default()
        })?;

        let headers = headers.lock();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].sender, Some(HOST_ID));
        assert!(headers[0].is_from_myself);
        assert!(headers[0].server_sent_time.is_some());
        Ok(())
    }

    #[test]
    fn test_accept_assigns_ids() -> Result<()> {
        let host = HostTransceiver::default();
        let (a, _a_peer) = LocalChannel::pair();
        let (b, _b_peer) = LocalChannel::pair();

        assert_eq!(host.accept(a)?, FIRST_GUEST_ID);
        assert_eq!(host.accept(b)?, FIRST_GUEST_ID + 1);
        assert_eq!(host.connection_count(), 2);
        assert_eq!(host.connection_state(FIRST_GUEST_ID), Some(ConnectionState::Connecting));
        Ok(())
    }

    #[test]
    fn test_expired_guest_is_erased() -> Result<()> {
        let host = HostTransceiver::default();
        let (channel, peer) = LocalChannel::pair();
        let id = host.accept(channel)?;

        drop(peer);
        host.process_events();

        assert_eq!(host.connection_count(), 0);
        assert_eq!(host.connection_state(id), None);
        assert!(host.disconnect(id).is_err());
        Ok(())
    }

    #[test]
    fn test_remove_publishes_key_only() -> Result<()> {
        let host = HostTransceiver::default();
        let instance = entry(&host, 4);
        host.publish(&instance, None, false)?;
        assert_eq!(host.container_len("Entry"), 1);

        host.remove(&instance)?;
        assert_eq!(host.container_len("Entry"), 0);
        Ok(())
    }
}
