// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction and per-channel descriptor exchange.

use crate::error::Result;
use crate::io::descriptor_converter::DescriptorConverter;
use crate::io::header::{DotsHeader, Transmission};
use crate::system::{EnumDescriptorData, Record, StructDescriptorData};
use crate::types::descriptor::Descriptor;
use crate::types::registry::Registry;
use crate::types::structure::Struct;
use std::collections::HashSet;

/// Bidirectional transport of transmissions.
///
/// Receiving never blocks: `receive_raw` returns `Ok(None)` when nothing is
/// pending. A received instance must be bound to a descriptor of `registry`.
pub trait Channel: Send {
    fn transmit_raw(&mut self, header: &DotsHeader, instance: &Struct) -> Result<()>;

    fn receive_raw(&mut self, registry: &Registry) -> Result<Option<Transmission>>;

    fn local_endpoint(&self) -> &str;

    fn remote_endpoint(&self) -> &str;

    fn close(&mut self);
}

/// Tracks which descriptors have been shared over one channel.
///
/// Export walks the dependencies of a descriptor depth-first so every
/// descriptor record is transmitted strictly before the first record that
/// refers to it, and each one at most once.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    exported: HashSet<String>,
    imported: HashSet<String>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand the descriptor records `descriptor` depends on, and the record of
    /// `descriptor` itself, to `transmit`. Internal struct types are known to
    /// every peer and never exported.
    pub fn export_dependencies(
        &mut self,
        descriptor: &Descriptor,
        transmit: &mut dyn FnMut(Struct) -> Result<()>,
    ) -> Result<()> {
        if !self.exported.insert(descriptor.name().to_string()) {
            return Ok(());
        }

        match descriptor {
            Descriptor::Vector(vector) => self.export_dependencies(vector.value(), transmit),
            Descriptor::Enum(enumeration) => {
                transmit(DescriptorConverter::enum_to_data(enumeration).to_struct())
            }
            Descriptor::Struct(structure) if !structure.is_internal() => {
                for property in structure.properties() {
                    self.export_dependencies(property.value(), transmit)?;
                }
                transmit(DescriptorConverter::struct_to_data(structure).to_struct())
            }
            Descriptor::Struct(_) | Descriptor::Fundamental(_) => Ok(()),
        }
    }

    /// Import the descriptor carried by `instance`, if it is a descriptor
    /// record not seen on this channel yet.
    pub fn import_dependencies(&mut self, instance: &Struct, registry: &mut Registry) -> Result<()> {
        match instance.type_name() {
            StructDescriptorData::TYPE_NAME => {
                let data = StructDescriptorData::from_struct(instance)?;
                if let Some(name) = data.name.as_deref() {
                    if self.is_new(name) {
                        let descriptor = DescriptorConverter::new(registry).struct_from_data(&data)?;
                        log::debug!("[channel] imported struct type '{}'", descriptor.name());
                    }
                }
            }
            EnumDescriptorData::TYPE_NAME => {
                let data = EnumDescriptorData::from_struct(instance)?;
                if let Some(name) = data.name.as_deref() {
                    if self.is_new(name) {
                        let descriptor = DescriptorConverter::new(registry).enum_from_data(&data)?;
                        log::debug!("[channel] imported enum type '{}'", descriptor.name());
                    }
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn is_new(&mut self, name: &str) -> bool {
        if !self.imported.insert(name.to_string()) {
            return false;
        }
        self.exported.insert(name.to_string());
        true
    }

    /// True if the descriptor named `name` was exported or imported.
    pub fn is_shared(&self, name: &str) -> bool {
        self.exported.contains(name) || self.imported.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builder::{EnumDescriptorBuilder, StructDescriptorBuilder};
    use crate::types::descriptor::FundamentalKind;

    fn nested() -> Descriptor {
        let color = EnumDescriptorBuilder::new("Color")
            .variant("red")
            .variant("green")
            .build_arc()
            .expect("valid enum");
        let point = StructDescriptorBuilder::new("Point")
            .substruct_only()
            .field("x", 1, FundamentalKind::Int32)
            .field("y", 2, FundamentalKind::Int32)
            .build_arc()
            .expect("valid struct");
        StructDescriptorBuilder::new("Shape")
            .cached()
            .key("id", 1, FundamentalKind::UInt32)
            .property("origin", 2, point)
            .vector_field("colors", 3, color)
            .build_arc()
            .expect("valid struct")
            .into()
    }

    fn record_name(instance: &Struct) -> String {
        instance
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    #[test]
    fn test_export_order_and_dedup() -> Result<()> {
        let shape = nested();
        let mut tracker = DependencyTracker::new();
        let mut sent = Vec::new();

        tracker.export_dependencies(&shape, &mut |record| {
            sent.push((record.type_name().to_string(), record_name(&record)));
            Ok(())
        })?;
        tracker.export_dependencies(&shape, &mut |record| {
            sent.push((record.type_name().to_string(), record_name(&record)));
            Ok(())
        })?;

        assert_eq!(
            sent,
            vec![
                ("StructDescriptorData".to_string(), "Point".to_string()),
                ("EnumDescriptorData".to_string(), "Color".to_string()),
                ("StructDescriptorData".to_string(), "Shape".to_string()),
            ]
        );
        assert!(tracker.is_shared("vector<Color>"));
        Ok(())
    }

    #[test]
    fn test_internal_types_are_not_exported() -> Result<()> {
        let mut tracker = DependencyTracker::new();
        let mut count = 0;
        let member: Descriptor = crate::system::DotsMember::descriptor().clone().into();
        tracker.export_dependencies(&member, &mut |_| {
            count += 1;
            Ok(())
        })?;
        assert_eq!(count, 0);
        Ok(())
    }

    #[test]
    fn test_import_from_exported_records() -> Result<()> {
        let shape = nested();
        let mut records = Vec::new();
        DependencyTracker::new().export_dependencies(&shape, &mut |record| {
            records.push(record);
            Ok(())
        })?;

        let mut registry = Registry::new();
        let mut tracker = DependencyTracker::new();
        for record in &records {
            tracker.import_dependencies(record, &mut registry)?;
        }

        let imported = registry.get_struct_type("Shape")?;
        assert!(imported.is_cached());
        assert_eq!(imported.properties().len(), 3);
        assert!(registry.has_type("Point"));
        assert!(registry.has_type("vector<Color>"));
        Ok(())
    }
}
