// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::too_many_lines)] // Scenario tests

//! Subscription lifecycle integration tests
//!
//! Group membership follows the local subscriber count, subscriptions can
//! be dropped from inside their own handler, and outlive their transceiver.

mod common;

use common::{connect, pump};
use dots::{
    Error, Event, FundamentalKind, GuestConfig, GuestTransceiver, HostTransceiver, LocalChannel,
    Struct, StructDescriptor, StructDescriptorBuilder, Subscription, Transmission,
};
use parking_lot::Mutex;
use std::sync::Arc;

fn connected_pair(name: &str) -> (HostTransceiver, GuestTransceiver, u32) {
    let host = HostTransceiver::default();
    let guest = GuestTransceiver::new(GuestConfig::new(name));
    let id = connect(&host, &guest);
    pump(&host, &[&guest]);
    (host, guest, id)
}

fn counter_type() -> Arc<StructDescriptor> {
    StructDescriptorBuilder::new("Counter")
        .cached()
        .key("name", 1, FundamentalKind::String)
        .field("value", 2, FundamentalKind::UInt64)
        .build_arc()
        .expect("valid descriptor")
}

fn counter(descriptor: &Arc<StructDescriptor>, name: &str, value: u64) -> Struct {
    Struct::new(descriptor)
        .with("name", name)
        .and_then(|s| s.with("value", value))
        .expect("valid counter")
}

#[test]
fn test_group_follows_subscriber_count() {
    let (host, guest, id) = connected_pair("sensor");
    let d = counter_type();

    let first = guest.subscribe(&d, |_: &Event| {}).expect("first");
    let second = guest.subscribe(&d, |_: &Event| {}).expect("second");
    pump(&host, &[&guest]);
    assert_eq!(guest.subscriber_count("Counter"), 2);
    assert_eq!(host.group_members("Counter"), vec![id]);

    drop(first);
    pump(&host, &[&guest]);
    assert_eq!(host.group_members("Counter"), vec![id]);

    drop(second);
    pump(&host, &[&guest]);
    assert_eq!(guest.subscriber_count("Counter"), 0);
    assert!(host.group_members("Counter").is_empty());
    assert!(guest.joined_groups().is_empty());
}

#[test]
fn test_unsubscribe_from_own_handler() {
    let (host, guest, id) = connected_pair("sensor");
    let d = counter_type();

    let calls = Arc::new(Mutex::new(0usize));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
    let subscription = {
        let calls = Arc::clone(&calls);
        let slot = Arc::clone(&slot);
        guest
            .subscribe(&d, move |_: &Event| {
                *calls.lock() += 1;
                let own = slot.lock().take();
                drop(own);
            })
            .expect("subscribe")
    };
    *slot.lock() = Some(subscription);
    pump(&host, &[&guest]);
    assert_eq!(host.group_members("Counter"), vec![id]);

    host.publish(&counter(&d, "a", 1), None, false).expect("first");
    pump(&host, &[&guest]);
    host.publish(&counter(&d, "b", 2), None, false).expect("second");
    pump(&host, &[&guest]);

    assert_eq!(*calls.lock(), 1);
    assert!(slot.lock().is_none());
    assert!(host.group_members("Counter").is_empty());
    assert!(guest.connected());
}

#[test]
fn test_subscription_outlives_guest() {
    let (host, guest, _) = connected_pair("short-lived");
    let d = counter_type();
    let subscription = guest.subscribe(&d, |_: &Event| {}).expect("subscribe");
    pump(&host, &[&guest]);

    drop(guest);
    drop(subscription);

    pump(&host, &[]);
    assert_eq!(host.connection_count(), 0);
    assert!(host.group_members("Counter").is_empty());
}

#[test]
fn test_discarded_subscription_keeps_receiving() {
    let (host, guest, _) = connected_pair("sensor");
    let d = counter_type();
    let calls = Arc::new(Mutex::new(0usize));
    let sink = Arc::clone(&calls);
    guest
        .subscribe(&d, move |_: &Event| *sink.lock() += 1)
        .expect("subscribe")
        .discard();
    pump(&host, &[&guest]);

    host.publish(&counter(&d, "a", 1), None, false).expect("publish");
    pump(&host, &[&guest]);

    assert_eq!(*calls.lock(), 1);
    assert_eq!(guest.subscriber_count("Counter"), 1);
}

#[test]
fn test_transmission_handler_sees_raw_header() {
    let (host, guest, _) = connected_pair("sensor");
    let d = counter_type();

    let order = Arc::new(Mutex::new(Vec::new()));
    let raw = Arc::clone(&order);
    let _transmissions = guest
        .subscribe_transmissions(&d, move |t: &Transmission| {
            raw.lock().push(format!("raw:{}", t.header().attributes));
        })
        .expect("subscribe transmissions");
    let events = Arc::clone(&order);
    let _events = guest
        .subscribe(&d, move |e: &Event| {
            events.lock().push(format!("event:{:?}", e.mt()));
        })
        .expect("subscribe events");
    pump(&host, &[&guest]);

    let mut update = counter(&d, "a", 1);
    host.publish(&update, None, false).expect("create");
    update.unset("value");
    host.publish(&update, None, false).expect("key-only update");
    pump(&host, &[&guest]);

    let order = order.lock();
    assert_eq!(order.len(), 4);
    assert!(order[0].starts_with("raw:"));
    assert_eq!(order[1], "event:Create");
    assert!(order[2].starts_with("raw:"));
    assert_eq!(order[3], "event:Update");
}

#[test]
fn test_panicking_handler_is_reported() {
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    let host = HostTransceiver::default();
    let guest = GuestTransceiver::with_error_handler(
        GuestConfig::new("fragile"),
        Arc::new(move |e: &Error| sink.lock().push(e.clone())),
    );
    let (host_end, guest_end) = LocalChannel::pair();
    host.accept(host_end).expect("accept");
    guest.open(guest_end).expect("open");

    let d = counter_type();
    let survivors = Arc::new(Mutex::new(0usize));
    let count = Arc::clone(&survivors);
    let _fragile = guest
        .subscribe(&d, |_: &Event| panic!("handler failure"))
        .expect("subscribe fragile");
    let _sturdy = guest
        .subscribe(&d, move |_: &Event| *count.lock() += 1)
        .expect("subscribe sturdy");
    pump(&host, &[&guest]);

    host.publish(&counter(&d, "a", 1), None, false).expect("publish");
    pump(&host, &[&guest]);

    assert_eq!(*survivors.lock(), 1);
    assert!(guest.connected());
    assert!(errors
        .lock()
        .iter()
        .any(|e| matches!(e, Error::Handler { type_name, .. } if type_name == "Counter")));
}
