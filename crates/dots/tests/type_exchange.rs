// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::too_many_lines)] // Scenario tests

//! Type exchange integration tests
//!
//! Descriptors travel ahead of the first instance that needs them, and
//! guests can ask the host for the types it knows.

mod common;

use common::{connect, pump};
use dots::system::{DotsCacheInfo, DotsDescriptorRequest};
use dots::{
    Descriptor, EnumDescriptorBuilder, Error, Event, FundamentalKind, GuestConfig,
    GuestTransceiver, HostTransceiver, Struct, StructDescriptor,
    StructDescriptorBuilder, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// `Reading { 1 key id: uint32, 2 unit: Unit, 3 location: Location }`
fn reading_types() -> Arc<StructDescriptor> {
    let unit = EnumDescriptorBuilder::new("Unit")
        .variant("celsius")
        .variant("kelvin")
        .build_arc()
        .expect("valid enum");
    let location = StructDescriptorBuilder::new("Location")
        .substruct_only()
        .field("x", 1, FundamentalKind::Float64)
        .field("y", 2, FundamentalKind::Float64)
        .build_arc()
        .expect("valid substruct");
    StructDescriptorBuilder::new("Reading")
        .cached()
        .key("id", 1, FundamentalKind::UInt32)
        .property("unit", 2, unit)
        .property("location", 3, location)
        .build_arc()
        .expect("valid descriptor")
}

fn names_recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&Descriptor) + Send + Sync + 'static) {
    let names = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&names);
    (names, move |d: &Descriptor| sink.lock().push(d.name().to_string()))
}

fn position(names: &[String], name: &str) -> usize {
    names
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("type '{}' was never announced", name))
}

#[test]
fn test_descriptors_precede_first_instance() {
    let host = HostTransceiver::default();
    let guest = GuestTransceiver::new(GuestConfig::new("sensor"));
    connect(&host, &guest);
    pump(&host, &[&guest]);

    let (names, handler) = names_recorder();
    let _new_types = host.subscribe_new_types(handler);
    let replayed = names.lock().len();

    let d = reading_types();
    let location = match d.property("location").map(|p| p.value()) {
        Some(Descriptor::Struct(location)) => Arc::clone(location),
        other => panic!("unexpected location descriptor {:?}", other),
    };
    let mut place = Struct::new(&location);
    place.set("x", 1.5).and_then(|s| s.set("y", -2.0)).expect("location");
    let mut instance = Struct::new(&d);
    instance
        .set("id", 7u32)
        .and_then(|s| s.set("unit", Value::Enum(2)))
        .and_then(|s| s.set("location", place))
        .expect("reading");

    guest.publish(&instance, None, false).expect("publish");
    pump(&host, &[&guest]);

    assert!(guest.connected());
    assert_eq!(host.container_len("Reading"), 1);

    let names = names.lock();
    let announced = &names[replayed..];
    assert!(position(announced, "Unit") < position(announced, "Reading"));
    assert!(position(announced, "Location") < position(announced, "Reading"));

    let imported = host.get_struct_type("Reading").expect("imported type");
    assert!(imported.is_cached());
    assert!(matches!(host.find_type("Unit"), Some(Descriptor::Enum(_))));

    let cached = host.cached("Reading");
    let (stored, _) = &cached[0];
    assert_eq!(stored.get("unit").and_then(|v| v.as_enum()), Some(2));
    let stored_location = stored
        .get("location")
        .and_then(|v| v.as_struct())
        .expect("nested location");
    assert_eq!(stored_location.get("y").and_then(|v| v.as_f64()), Some(-2.0));
}

#[test]
fn test_descriptor_request_imports_types() {
    let host = HostTransceiver::default();
    let d = reading_types();
    let other = StructDescriptorBuilder::new("Other")
        .key("id", 1, FundamentalKind::UInt32)
        .build_arc()
        .expect("valid descriptor");
    host.register_type(Arc::clone(&d), true).expect("register reading");
    host.register_type(other, true).expect("register other");

    let mut instance = Struct::new(&d);
    instance.set("id", 1u32).expect("set id");
    host.publish(&instance, None, false).expect("publish");

    let guest = GuestTransceiver::new(GuestConfig::new("browser"));
    connect(&host, &guest);
    pump(&host, &[&guest]);
    assert!(guest.find_type("Reading").is_none());

    let (names, handler) = names_recorder();
    let _new_types = guest.subscribe_new_types(handler);
    let replayed = names.lock().len();

    let markers = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&markers);
    let _markers = guest
        .subscribe_record::<DotsCacheInfo>(move |e: &Event| {
            if let Ok(info) = e.record::<DotsCacheInfo>() {
                sink.lock().push(info);
            }
        })
        .expect("subscribe cache info");

    guest
        .publish_record(&DotsDescriptorRequest {
            whitelist: Some(vec!["Reading".to_string()]),
            blacklist: None,
        })
        .expect("request descriptors");
    pump(&host, &[&guest]);

    assert!(markers
        .lock()
        .iter()
        .any(|info| info.end_descriptor_request == Some(true)));
    assert!(guest.find_type("Other").is_none());
    let imported = guest.get_struct_type("Reading").expect("imported reading");
    assert!(imported.is_cached());
    assert!(guest.find_type("Unit").is_some());

    let announced: Vec<String> = names.lock()[replayed..].to_vec();
    assert!(announced.contains(&"Reading".to_string()));
    assert!(!announced.iter().any(|n| n.starts_with("Dots")));

    let received = Arc::new(Mutex::new(0usize));
    let counter = Arc::clone(&received);
    let _subscription = guest
        .subscribe_name("Reading", move |_: &Event| *counter.lock() += 1)
        .expect("subscribe imported type");
    pump(&host, &[&guest]);
    assert_eq!(*received.lock(), 1);
}

#[test]
fn test_descriptor_request_blacklist() {
    let host = HostTransceiver::default();
    for name in ["Alpha", "Beta"] {
        let d = StructDescriptorBuilder::new(name)
            .key("id", 1, FundamentalKind::UInt32)
            .build_arc()
            .expect("valid descriptor");
        host.register_type(d, true).expect("register");
    }

    let guest = GuestTransceiver::new(GuestConfig::new("browser"));
    connect(&host, &guest);
    pump(&host, &[&guest]);

    guest
        .publish_record(&DotsDescriptorRequest {
            whitelist: None,
            blacklist: Some(vec!["Beta".to_string()]),
        })
        .expect("request descriptors");
    pump(&host, &[&guest]);

    assert!(guest.find_type("Alpha").is_some());
    assert!(guest.find_type("Beta").is_none());
    assert!(guest.connected());
}

#[test]
fn test_substruct_only_types_stay_nested() {
    let guest = GuestTransceiver::new(GuestConfig::new("sensor"));
    let d = reading_types();
    guest.register_type(Arc::clone(&d), true).expect("register");
    let location = guest.get_struct_type("Location").expect("registered dependency");

    assert!(matches!(
        guest.subscribe(&location, |_: &Event| {}),
        Err(Error::SubstructOnly { operation: "subscribe to", .. })
    ));
    assert!(matches!(
        guest.publish(&Struct::new(&location), None, false),
        Err(Error::SubstructOnly { operation: "publish", .. })
    ));
}

#[test]
fn test_conflicting_registration_is_rejected() {
    let host = HostTransceiver::default();
    let d = reading_types();
    host.register_type(Arc::clone(&d), true).expect("first registration");

    assert!(matches!(
        host.register_type(Arc::clone(&d), true),
        Err(Error::DuplicateType(name)) if name == "Reading"
    ));
    let again = host.register_type(d, false).expect("lenient registration");
    assert_eq!(again.name(), "Reading");
}
