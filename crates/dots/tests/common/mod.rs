// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Shared helpers for the transceiver integration tests

#![allow(dead_code)]

use dots::io::ErrorHandler;
use dots::{Error, Event, GuestTransceiver, HostTransceiver, LocalChannel};
use parking_lot::Mutex;
use std::sync::Arc;

pub type Recorded = Arc<Mutex<Vec<Event>>>;

/// Process events on every transceiver until none has work left.
pub fn pump(host: &HostTransceiver, guests: &[&GuestTransceiver]) {
    for _ in 0..1000 {
        let handled = host.process_events()
            + guests
                .iter()
                .map(|guest| guest.process_events())
                .sum::<usize>();
        if handled == 0 {
            return;
        }
    }
    panic!("transceivers did not settle");
}

/// Wire `guest` to `host` over a local channel. Returns the peer id.
pub fn connect(host: &HostTransceiver, guest: &GuestTransceiver) -> u32 {
    let (host_end, guest_end) = LocalChannel::pair();
    let id = host.accept(host_end).expect("accept guest");
    guest.open(guest_end).expect("open guest");
    id
}

pub fn recorder() -> (Recorded, impl Fn(&Event) + Send + Sync + 'static) {
    let events: Recorded = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    (events, move |event: &Event| sink.lock().push(event.clone()))
}

pub fn error_sink() -> (Arc<Mutex<Vec<Error>>>, ErrorHandler) {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    (errors, Arc::new(move |e: &Error| sink.lock().push(e.clone())))
}
