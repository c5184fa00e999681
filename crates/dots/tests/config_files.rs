// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Configuration file integration tests
//!
//! Transceivers built from TOML files on disk.

mod common;

use common::{connect, pump};
use dots::{
    ConfigError, Error, FundamentalKind, GuestConfig, GuestTransceiver, HostConfig,
    HostTransceiver, StructDescriptorBuilder,
};
use std::fs;

#[test]
fn test_transceivers_from_files() {
    let dir = tempfile::tempdir().expect("temp dir");
    let host_path = dir.path().join("host.toml");
    let guest_path = dir.path().join("guest.toml");

    fs::write(
        &host_path,
        r#"
name = "plant-hub"

[auth]
default_secret = "fallback"

[auth.secrets]
boiler = "b01l3r"
"#,
    )
    .expect("write host config");
    fs::write(
        &guest_path,
        r#"
name = "boiler"
auth_secret = "b01l3r"
preload_publish_types = ["BoilerState"]
"#,
    )
    .expect("write guest config");

    let host_config = HostConfig::from_file(&host_path).expect("host config");
    let guest_config = GuestConfig::from_file(&guest_path).expect("guest config");
    assert_eq!(
        host_config.auth.as_ref().and_then(|a| a.secret_for("other")),
        Some("fallback")
    );

    let host = HostTransceiver::new(host_config);
    let guest = GuestTransceiver::new(guest_config);
    let state = StructDescriptorBuilder::new("BoilerState")
        .cached()
        .key("unit", 1, FundamentalKind::UInt32)
        .field("pressure", 2, FundamentalKind::Float64)
        .build_arc()
        .expect("valid descriptor");
    guest.register_type(state, true).expect("register");

    let id = connect(&host, &guest);
    pump(&host, &[&guest]);

    assert!(guest.connected());
    assert_eq!(guest.host_name().as_deref(), Some("plant-hub"));
    assert_eq!(host.peer_name(id).as_deref(), Some("boiler"));
    let announced = host
        .find_struct_type("BoilerState")
        .expect("descriptor sent during preload");
    assert!(announced.is_cached());
}

#[test]
fn test_invalid_files() {
    let dir = tempfile::tempdir().expect("temp dir");

    let missing = GuestConfig::from_file(dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(ConfigError::Io(_))));

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "name = [").expect("write");
    assert!(matches!(HostConfig::from_file(&broken), Err(ConfigError::Toml(_))));

    let empty_name = dir.path().join("empty.toml");
    fs::write(&empty_name, "name = \"  \"").expect("write");
    let error: Error = HostConfig::from_file(&empty_name)
        .expect_err("empty name rejected")
        .into();
    assert!(matches!(error, Error::Config(message) if message.contains("host name")));
}
