// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connection state machine.
//!
//! A [`Connection`] wraps one [`Channel`] and runs the handshake for either
//! side of it:
//!
//! ```text
//! host                                guest
//!  | -- DotsMsgHello ------------------> |
//!  | <-------------- DotsMsgConnect --   |   clientName, preloadCache
//!  | -- DotsMsgConnectResponse -------> |   clientId, accepted, preload
//!  |        (early_subscribe: guest subscribes, host streams caches)
//!  | <-- DotsMsgConnect{preloadClientFinished}
//!  | -- DotsMsgConnectResponse{preloadFinished} -->
//!  |                connected            |
//! ```
//!
//! The connection does not call back into its owner. State transitions and
//! received data are queued as [`ConnectionEvent`]s and handed out one at a
//! time by [`Connection::next_event`]. Work that must follow the owner's
//! reaction to a transition (the guest's `preloadClientFinished`) is queued
//! behind the transition event.

use crate::config::{HOST_ID, UNINITIALIZED_ID};
use crate::error::{Error, Result};
use crate::io::auth::{AuthManager, Digest, Nonce};
use crate::io::channel::{Channel, DependencyTracker};
use crate::io::header::{DotsHeader, Transmission};
use crate::system::{
    self, DotsConnectionState, DotsMsgConnect, DotsMsgConnectResponse, DotsMsgError, DotsMsgHello,
    Record,
};
use crate::types::descriptor::Descriptor;
use crate::types::property_set::PropertySet;
use crate::types::registry::Registry;
use crate::types::structure::Struct;
use crate::types::time::TimePoint;
use std::collections::VecDeque;
use std::sync::Arc;

pub type ConnectionState = DotsConnectionState;

/// Something the owner of a connection has to react to.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// The connection changed state. `error` is set when it closed because
    /// of an error.
    Transition {
        state: ConnectionState,
        error: Option<Error>,
    },
    /// A data transmission with a stamped header.
    Transmission(Transmission),
}

#[derive(Debug)]
enum Pending {
    Event(ConnectionEvent),
    Transmit(Struct),
}

/// Next handshake record the connection accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expected {
    Hello,
    Connect,
    ConnectResponse,
    PreloadClientFinished,
    PreloadFinished,
    Nothing,
}

impl Expected {
    fn type_name(self) -> &'static str {
        match self {
            Self::Hello => DotsMsgHello::TYPE_NAME,
            Self::Connect | Self::PreloadClientFinished => DotsMsgConnect::TYPE_NAME,
            Self::ConnectResponse | Self::PreloadFinished => DotsMsgConnectResponse::TYPE_NAME,
            Self::Nothing => "<none>",
        }
    }

    fn required_properties(self) -> PropertySet {
        match self {
            Self::Connect => PropertySet::from_tags([1, 2]),
            Self::PreloadClientFinished => PropertySet::from_tag(3),
            Self::ConnectResponse => PropertySet::from_tags([2, 3, 5]),
            Self::PreloadFinished => PropertySet::from_tag(4),
            Self::Hello | Self::Nothing => PropertySet::NONE,
        }
    }
}

enum Side {
    Host {
        auth_manager: Option<Arc<dyn AuthManager>>,
        nonce: Option<Nonce>,
    },
    Guest {
        auth_secret: Option<String>,
    },
}

/// One end of a host/guest connection.
pub struct Connection {
    channel: Box<dyn Channel>,
    tracker: DependencyTracker,
    side: Side,
    state: ConnectionState,
    expected: Expected,
    self_name: String,
    self_id: u32,
    peer_name: String,
    peer_id: u32,
    pending: VecDeque<Pending>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state)
            .field("self_name", &self.self_name)
            .field("self_id", &self.self_id)
            .field("peer_name", &self.peer_name)
            .field("peer_id", &self.peer_id)
            .finish_non_exhaustive()
    }
}

fn now_header(instance: &Struct) -> DotsHeader {
    DotsHeader {
        sent_time: Some(TimePoint::now()),
        ..DotsHeader::for_instance(instance)
    }
}

impl Connection {
    /// Host side of a connection to the guest with id `guest_id`.
    pub fn host(
        channel: Box<dyn Channel>,
        host_name: impl Into<String>,
        guest_id: u32,
        auth_manager: Option<Arc<dyn AuthManager>>,
    ) -> Self {
        Self::new(
            channel,
            Side::Host {
                auth_manager,
                nonce: None,
            },
            host_name.into(),
            HOST_ID,
            guest_id,
        )
    }

    /// Guest side of a connection to a host.
    pub fn guest(channel: Box<dyn Channel>, guest_name: impl Into<String>, auth_secret: Option<String>) -> Self {
        Self::new(
            channel,
            Side::Guest { auth_secret },
            guest_name.into(),
            UNINITIALIZED_ID,
            HOST_ID,
        )
    }

    fn new(channel: Box<dyn Channel>, side: Side, self_name: String, self_id: u32, peer_id: u32) -> Self {
        Self {
            channel,
            tracker: DependencyTracker::new(),
            side,
            state: ConnectionState::Suspended,
            expected: Expected::Nothing,
            self_name,
            self_id,
            peer_name: String::new(),
            peer_id,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn closed(&self) -> bool {
        self.state == ConnectionState::Closed
    }

    /// True if the host side.
    pub fn is_host(&self) -> bool {
        matches!(self.side, Side::Host { .. })
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    /// Own id. A guest learns it from the host's connect response.
    pub fn self_id(&self) -> u32 {
        self.self_id
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    pub fn peer_id(&self) -> u32 {
        self.peer_id
    }

    pub fn local_endpoint(&self) -> &str {
        self.channel.local_endpoint()
    }

    pub fn remote_endpoint(&self) -> &str {
        self.channel.remote_endpoint()
    }

    /// Start the handshake. The host sends its hello, the guest waits for it.
    pub fn open(&mut self) -> Result<()> {
        if self.state != ConnectionState::Suspended {
            return Err(Error::connection(format!(
                "cannot open connection in state {}",
                self.state
            )));
        }

        match self.send_hello() {
            Ok(()) => Ok(()),
            Err(e) => {
                self.handle_error(e.clone());
                Err(e)
            }
        }
    }

    fn send_hello(&mut self) -> Result<()> {
        let challenge = match &self.side {
            Side::Host { auth_manager, .. } => Some(auth_manager.as_ref().and_then(|m| {
                m.requires_authentication(self.channel.remote_endpoint(), &self.peer_name)
            })),
            Side::Guest { .. } => None,
        };

        let Some(challenge) = challenge else {
            self.expected = Expected::Hello;
            self.set_state(ConnectionState::Connecting, None);
            return Ok(());
        };

        if let Side::Host { nonce, .. } = &mut self.side {
            *nonce = challenge;
        }

        let hello = DotsMsgHello {
            server_name: Some(self.self_name.clone()),
            auth_challenge: Some(challenge.map_or(0, |n| n.value())),
            authentication_required: Some(challenge.is_some()),
        };
        self.expected = Expected::Connect;
        self.set_state(ConnectionState::Connecting, None);
        self.transmit_record(&hello)
    }

    // ------------------------------------------------------------------------
    // Outbound
    // ------------------------------------------------------------------------

    /// Transmit an instance, preceded by the descriptors it depends on that
    /// have not been shared over this connection yet.
    pub fn transmit(&mut self, header: &DotsHeader, instance: &Struct) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::connection("attempt to transmit on closed connection"));
        }

        let Self { channel, tracker, .. } = self;
        let descriptor = Descriptor::Struct(Arc::clone(instance.descriptor()));
        tracker.export_dependencies(&descriptor, &mut |record| {
            channel.transmit_raw(&now_header(&record), &record)
        })?;

        channel.transmit_raw(header, instance)
    }

    /// Transmit every valid property of a record.
    pub fn transmit_record<T: Record>(&mut self, record: &T) -> Result<()> {
        let instance = record.to_struct();
        self.transmit(&now_header(&instance), &instance)
    }

    /// Share a descriptor, and the descriptors it depends on, unless already
    /// shared.
    pub fn transmit_descriptor(&mut self, descriptor: &Descriptor) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(Error::connection("attempt to transmit on closed connection"));
        }

        let Self { channel, tracker, .. } = self;
        tracker.export_dependencies(descriptor, &mut |record| {
            channel.transmit_raw(&now_header(&record), &record)
        })
    }

    // ------------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------------

    /// Next event for the owner, receiving from the channel as needed.
    ///
    /// Returns `None` when nothing is pending and the channel has no data.
    /// Descriptor records are imported into `registry` before the record is
    /// handed out.
    pub fn next_event(&mut self, registry: &mut Registry) -> Option<ConnectionEvent> {
        loop {
            if let Some(pending) = self.pending.pop_front() {
                match pending {
                    Pending::Event(event) => return Some(event),
                    Pending::Transmit(instance) => {
                        if let Err(e) = self.transmit(&now_header(&instance), &instance) {
                            self.handle_error(e);
                        }
                        continue;
                    }
                }
            }

            if matches!(self.state, ConnectionState::Suspended | ConnectionState::Closed) {
                return None;
            }

            match self.channel.receive_raw(registry) {
                Ok(None) => return None,
                Ok(Some(transmission)) => {
                    if let Err(e) = self.handle_receive(transmission, registry) {
                        self.handle_error(e);
                    }
                }
                Err(e) => self.handle_error(e),
            }
        }
    }

    fn handle_receive(&mut self, mut transmission: Transmission, registry: &mut Registry) -> Result<()> {
        self.tracker
            .import_dependencies(transmission.instance(), registry)?;

        let type_name = transmission.header().type_name.clone();

        if type_name == DotsMsgError::TYPE_NAME {
            let error = DotsMsgError::from_struct(transmission.instance())?;
            self.handle_peer_error(&error);
            return Ok(());
        }

        if system::is_handshake_type(&type_name) {
            return self.handle_handshake(transmission.instance());
        }

        if !matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::EarlySubscribe
        ) {
            return Err(Error::connection(format!(
                "received instance of non-system type {} while not in early_subscribe or connected state {}",
                type_name, self.state
            )));
        }

        let header = transmission.header_mut();
        if self.is_host() {
            header.sender = Some(self.peer_id);
            header.server_sent_time = Some(TimePoint::now());
            if header.sent_time.is_none() {
                header.sent_time = header.server_sent_time;
            }
            header.is_from_myself = header.sender == Some(self.self_id);
        } else {
            if header.sent_time.is_none() {
                header.sent_time = Some(TimePoint::now());
            }
            match header.sender {
                Some(sender) => header.is_from_myself = sender == self.self_id,
                None => {
                    header.sender = Some(self.peer_id);
                    header.is_from_myself = false;
                }
            }
        }

        self.pending
            .push_back(Pending::Event(ConnectionEvent::Transmission(transmission)));
        Ok(())
    }

    fn handle_handshake(&mut self, instance: &Struct) -> Result<()> {
        let expected = self.expected;
        if instance.type_name() != expected.type_name() {
            return Err(Error::connection(format!(
                "received unexpected system type '{}' in state {} (expected '{}')",
                instance.type_name(),
                self.state,
                expected.type_name()
            )));
        }
        instance.assert_has_properties(expected.required_properties())?;

        match expected {
            Expected::Hello => self.handle_hello(&DotsMsgHello::from_struct(instance)?),
            Expected::Connect => self.handle_connect(&DotsMsgConnect::from_struct(instance)?),
            Expected::ConnectResponse => {
                self.handle_connect_response(&DotsMsgConnectResponse::from_struct(instance)?)
            }
            Expected::PreloadClientFinished => {
                self.handle_preload_client_finished(&DotsMsgConnect::from_struct(instance)?)
            }
            Expected::PreloadFinished => {
                self.expected = Expected::Nothing;
                self.set_state(ConnectionState::Connected, None);
                Ok(())
            }
            Expected::Nothing => Ok(()),
        }
    }

    fn handle_hello(&mut self, hello: &DotsMsgHello) -> Result<()> {
        self.peer_name = hello.server_name.clone().unwrap_or_default();
        log::debug!(
            "[connection] received hello from '{}' authChallenge={}",
            self.peer_name,
            hello.auth_challenge.unwrap_or_default()
        );

        let mut connect = DotsMsgConnect {
            client_name: Some(self.self_name.clone()),
            preload_cache: Some(true),
            ..Default::default()
        };

        if hello.authentication_required == Some(true) {
            let Side::Guest {
                auth_secret: Some(secret),
            } = &self.side
            else {
                return Err(Error::Authentication(
                    "host requested authentication but no secret was specified".to_string(),
                ));
            };

            let cnonce = Nonce::random()?.to_string();
            let nonce = Nonce::new(hello.auth_challenge.unwrap_or_default());
            connect.auth_challenge_response =
                Some(Digest::compute(nonce, &cnonce, &self.self_name, secret).to_string());
            connect.cnonce = Some(cnonce);
        }

        self.expected = Expected::ConnectResponse;
        self.transmit_record(&connect)
    }

    fn handle_connect(&mut self, connect: &DotsMsgConnect) -> Result<()> {
        let client_name = connect.client_name.clone().unwrap_or_default();
        let preload = connect.preload_cache == Some(true);

        let verified = match &self.side {
            Side::Host {
                auth_manager: Some(auth_manager),
                nonce,
            } => {
                let response = connect
                    .auth_challenge_response
                    .as_deref()
                    .and_then(Digest::from_hex)
                    .unwrap_or(Digest::from_bytes([0; 32]));
                Some(auth_manager.verify_authentication(
                    self.channel.remote_endpoint(),
                    &client_name,
                    nonce.unwrap_or(Nonce::new(0)),
                    connect.cnonce.as_deref().unwrap_or_default(),
                    &response,
                ))
            }
            _ => None,
        };

        match verified {
            Some(false) => {
                self.transmit_record(&DotsMsgConnectResponse {
                    client_id: Some(self.peer_id),
                    preload: Some(preload),
                    accepted: Some(false),
                    ..Default::default()
                })?;
                return Err(Error::Authentication(
                    "invalid authorization information".to_string(),
                ));
            }
            Some(true) => log::info!("[connection] guest '{}' authorized", client_name),
            None => {}
        }

        self.peer_name = client_name;
        self.transmit_record(&DotsMsgConnectResponse {
            server_name: Some(self.self_name.clone()),
            client_id: Some(self.peer_id),
            preload: Some(preload),
            accepted: Some(true),
            ..Default::default()
        })?;

        if preload {
            self.expected = Expected::PreloadClientFinished;
            self.set_state(ConnectionState::EarlySubscribe, None);
        } else {
            self.expected = Expected::Nothing;
            self.set_state(ConnectionState::Connected, None);
        }

        Ok(())
    }

    fn handle_preload_client_finished(&mut self, connect: &DotsMsgConnect) -> Result<()> {
        if connect.preload_client_finished != Some(true) {
            return Err(Error::connection("expected preload client finished to be true"));
        }

        self.expected = Expected::Nothing;
        self.set_state(ConnectionState::Connected, None);
        self.transmit_record(&DotsMsgConnectResponse {
            preload_finished: Some(true),
            ..Default::default()
        })
    }

    fn handle_connect_response(&mut self, response: &DotsMsgConnectResponse) -> Result<()> {
        self.self_id = response.client_id.unwrap_or(UNINITIALIZED_ID);
        log::debug!(
            "[connection] connect response from '{}': accepted={:?} id={}",
            self.peer_name,
            response.accepted,
            self.self_id
        );

        if response.accepted != Some(true) {
            return Err(Error::Authentication(format!(
                "connection was not accepted by host '{}'",
                self.peer_name
            )));
        }

        if response.preload == Some(true) {
            self.expected = Expected::PreloadFinished;
            self.set_state(ConnectionState::EarlySubscribe, None);
            self.pending.push_back(Pending::Transmit(
                DotsMsgConnect {
                    preload_client_finished: Some(true),
                    ..Default::default()
                }
                .to_struct(),
            ));
        } else {
            self.expected = Expected::Nothing;
            self.set_state(ConnectionState::Connected, None);
        }

        Ok(())
    }

    fn handle_peer_error(&mut self, error: &DotsMsgError) {
        if error.error_code == Some(0) {
            self.handle_close(None);
        } else {
            self.handle_error(Error::PeerError {
                code: error
                    .error_code
                    .map_or_else(|| "<unknown error code>".to_string(), |c| c.to_string()),
                text: error
                    .error_text
                    .clone()
                    .unwrap_or_else(|| "<unknown error>".to_string()),
            });
        }
    }

    // ------------------------------------------------------------------------
    // Teardown
    // ------------------------------------------------------------------------

    /// Close because of `error`. A connected peer is told why.
    pub fn handle_error(&mut self, error: Error) {
        if self.state == ConnectionState::Connected {
            let notice = DotsMsgError {
                error_code: Some(1),
                error_text: Some(error.to_string()),
            };
            if let Err(e) = self.transmit_record(&notice) {
                log::debug!("[connection] could not send error to '{}': {}", self.peer_name, e);
            }
        }

        self.handle_close(Some(error));
    }

    /// Close gracefully. A connected peer receives an error record with code 0.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }

        if self.state == ConnectionState::Connected {
            if let Err(e) = self.transmit_record(&DotsMsgError::graceful()) {
                log::debug!("[connection] could not send close to '{}': {}", self.peer_name, e);
            }
        }

        self.handle_close(None);
    }

    fn handle_close(&mut self, error: Option<Error>) {
        if self.state == ConnectionState::Closed {
            return;
        }

        self.expected = Expected::Nothing;
        self.channel.close();
        self.set_state(ConnectionState::Closed, error);
    }

    fn set_state(&mut self, state: ConnectionState, error: Option<Error>) {
        let side = if self.is_host() { "guest" } else { "host" };

        match (&state, &error) {
            (ConnectionState::Connected, _) => log::info!(
                "[connection] established connection with {} '{}' ({})",
                side,
                self.peer_name,
                self.peer_id
            ),
            (ConnectionState::Closed, None) => log::info!(
                "[connection] {} '{}' ({}) gracefully closed connection",
                side,
                self.peer_name,
                self.peer_id
            ),
            (ConnectionState::Closed, Some(e)) => log::error!(
                "[connection] connection with {} '{}' ({}) closed with error: {}",
                side,
                self.peer_name,
                self.peer_id,
                e
            ),
            _ => log::debug!(
                "[connection] connection with {} '{}' changed state to {}",
                side,
                self.peer_name,
                state
            ),
        }

        self.state = state;
        self.pending
            .push_back(Pending::Event(ConnectionEvent::Transition { state, error }));
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
