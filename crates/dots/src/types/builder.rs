// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fluent builder API for struct and enum descriptors.

use crate::error::Result;
use crate::types::descriptor::{
    Descriptor, EnumDescriptor, EnumeratorDescriptor, FundamentalKind, PropertyDescriptor,
    StructDescriptor, StructFlags,
};
use std::sync::Arc;

/// Builder for [`StructDescriptor`] instances.
#[derive(Debug)]
pub struct StructDescriptorBuilder {
    name: String,
    flags: StructFlags,
    properties: Vec<PropertyDescriptor>,
}

impl StructDescriptorBuilder {
    /// Create a new builder for an uncached struct type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            flags: StructFlags::NONE,
            properties: Vec::new(),
        }
    }

    pub fn flags(mut self, flags: StructFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn cached(self) -> Self {
        self.flags(StructFlags::CACHED)
    }

    pub fn cleanup(self) -> Self {
        self.flags(StructFlags::CLEANUP)
    }

    pub fn substruct_only(self) -> Self {
        self.flags(StructFlags::SUBSTRUCT_ONLY)
    }

    /// Add a property with an arbitrary value descriptor.
    pub fn property(mut self, name: impl Into<String>, tag: u32, value: impl Into<Descriptor>) -> Self {
        self.properties
            .push(PropertyDescriptor::new(name, tag, false, value.into()));
        self
    }

    /// Add a key property.
    pub fn key(mut self, name: impl Into<String>, tag: u32, value: impl Into<Descriptor>) -> Self {
        self.properties
            .push(PropertyDescriptor::new(name, tag, true, value.into()));
        self
    }

    /// Add a fundamental property.
    pub fn field(self, name: impl Into<String>, tag: u32, kind: FundamentalKind) -> Self {
        self.property(name, tag, kind)
    }

    pub fn string_field(self, name: impl Into<String>, tag: u32) -> Self {
        self.field(name, tag, FundamentalKind::String)
    }

    /// Add a `vector<value>` property.
    pub fn vector_field(self, name: impl Into<String>, tag: u32, value: impl Into<Descriptor>) -> Self {
        let vector = value.into().vector_of();
        self.property(name, tag, vector)
    }

    /// Build the descriptor, validating tags and names.
    pub fn build(self) -> Result<StructDescriptor> {
        StructDescriptor::new(self.name, self.flags, self.properties)
    }

    /// Build into a shared descriptor.
    pub fn build_arc(self) -> Result<Arc<StructDescriptor>> {
        self.build().map(Arc::new)
    }
}

/// Builder for [`EnumDescriptor`] instances.
///
/// Enumerators added with [`variant`](Self::variant) get the next free tag
/// (starting at 1) and the next value (starting at 0).
#[derive(Debug)]
pub struct EnumDescriptorBuilder {
    name: String,
    enumerators: Vec<EnumeratorDescriptor>,
    next_tag: u32,
    next_value: i32,
}

impl EnumDescriptorBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enumerators: Vec::new(),
            next_tag: 1,
            next_value: 0,
        }
    }

    /// Add an enumerator with auto-assigned tag and value.
    pub fn variant(self, name: impl Into<String>) -> Self {
        let (tag, value) = (self.next_tag, self.next_value);
        self.enumerator(tag, name, value)
    }

    /// Add an enumerator with explicit tag and value.
    pub fn enumerator(mut self, tag: u32, name: impl Into<String>, value: i32) -> Self {
        self.enumerators
            .push(EnumeratorDescriptor::new(tag, name, value));
        self.next_tag = self.next_tag.max(tag.saturating_add(1));
        self.next_value = self.next_value.max(value.saturating_add(1));
        self
    }

    pub fn build(self) -> Result<EnumDescriptor> {
        EnumDescriptor::new(self.name, self.enumerators)
    }

    pub fn build_arc(self) -> Result<Arc<EnumDescriptor>> {
        self.build().map(Arc::new)
    }
}
