// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmission header and the header + instance unit exchanged on the wire.

use crate::types::property_set::PropertySet;
use crate::types::structure::Struct;
use crate::types::time::TimePoint;

/// Metadata accompanying every transmitted instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DotsHeader {
    pub type_name: String,
    /// Time the sender published the instance.
    pub sent_time: Option<TimePoint>,
    /// Time the host relayed the instance.
    pub server_sent_time: Option<TimePoint>,
    /// Properties carried by the transmission.
    pub attributes: PropertySet,
    /// Connection id of the original sender.
    pub sender: Option<u32>,
    pub remove_obj: bool,
    /// Remaining cached instances during a cache replay or transfer.
    pub from_cache: Option<u32>,
    pub is_from_myself: bool,
}

impl DotsHeader {
    pub fn new(type_name: impl Into<String>, attributes: PropertySet) -> Self {
        Self {
            type_name: type_name.into(),
            attributes,
            ..Default::default()
        }
    }

    /// Header for a plain transmission of every valid property of `instance`.
    pub fn for_instance(instance: &Struct) -> Self {
        Self::new(instance.type_name(), instance.valid_properties())
    }
}

/// One header + instance unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    header: DotsHeader,
    instance: Struct,
}

impl Transmission {
    pub fn new(header: DotsHeader, instance: Struct) -> Self {
        Self { header, instance }
    }

    pub fn header(&self) -> &DotsHeader {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut DotsHeader {
        &mut self.header
    }

    pub fn instance(&self) -> &Struct {
        &self.instance
    }

    pub fn into_parts(self) -> (DotsHeader, Struct) {
        (self.header, self.instance)
    }
}
