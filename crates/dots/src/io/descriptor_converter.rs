// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Conversion between runtime descriptors and their wire records.

use crate::error::{Error, Result};
use crate::system::{
    DotsStructFlags, EnumDescriptorData, EnumElementDescriptor, StructDescriptorData,
    StructPropertyData,
};
use crate::types::descriptor::{
    Descriptor, EnumDescriptor, EnumeratorDescriptor, PropertyDescriptor, StructDescriptor,
    StructFlags, VectorDescriptor,
};
use crate::types::registry::Registry;
use std::sync::Arc;

/// Converts [`StructDescriptorData`] / [`EnumDescriptorData`] records into
/// registered descriptors, and descriptors back into records.
pub struct DescriptorConverter<'a> {
    registry: &'a mut Registry,
}

fn missing(record: &str, field: &str) -> Error {
    Error::InvalidDescriptor(format!("{} without '{}'", record, field))
}

impl<'a> DescriptorConverter<'a> {
    pub fn new(registry: &'a mut Registry) -> Self {
        Self { registry }
    }

    /// Register the enum described by `data`, or return the known one.
    pub fn enum_from_data(&mut self, data: &EnumDescriptorData) -> Result<Arc<EnumDescriptor>> {
        let name = data
            .name
            .as_deref()
            .ok_or_else(|| missing("EnumDescriptorData", "name"))?;

        if let Some(descriptor) = self.registry.find_enum_type(name) {
            return Ok(descriptor);
        }

        let enumerators = data
            .elements
            .iter()
            .flatten()
            .map(|element| {
                let tag = element
                    .tag
                    .ok_or_else(|| missing("EnumElementDescriptor", "tag"))?;
                let enumerator_name = element
                    .name
                    .clone()
                    .ok_or_else(|| missing("EnumElementDescriptor", "name"))?;
                let value = element.enum_value.unwrap_or_default();
                Ok(EnumeratorDescriptor::new(tag, enumerator_name, value))
            })
            .collect::<Result<Vec<_>>>()?;

        let descriptor = EnumDescriptor::new(name, enumerators)?;
        self.registry.register_enum(descriptor, false)
    }

    /// Register the struct described by `data`, or return the known one.
    ///
    /// Every property type must already be known, except `vector<X>` types
    /// which are derived when `X` is a known enum.
    pub fn struct_from_data(&mut self, data: &StructDescriptorData) -> Result<Arc<StructDescriptor>> {
        let name = data
            .name
            .as_deref()
            .ok_or_else(|| missing("StructDescriptorData", "name"))?;

        if let Some(descriptor) = self.registry.find_struct_type(name) {
            return Ok(descriptor);
        }

        let flags = data.flags.as_ref().map(flags_from_data).unwrap_or_default();

        let properties = data
            .properties
            .iter()
            .flatten()
            .map(|property| self.property_from_data(property))
            .collect::<Result<Vec<_>>>()?;

        if properties.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "struct '{}' has no properties",
                name
            )));
        }

        let descriptor = StructDescriptor::new(name, flags, properties)?;
        self.registry.register_struct(descriptor, false)
    }

    fn property_from_data(&mut self, data: &StructPropertyData) -> Result<PropertyDescriptor> {
        let name = data
            .name
            .clone()
            .ok_or_else(|| missing("StructPropertyData", "name"))?;
        let tag = data.tag.ok_or_else(|| missing("StructPropertyData", "tag"))?;
        let type_name = data
            .type_name
            .as_deref()
            .ok_or_else(|| missing("StructPropertyData", "type"))?;

        let value = match self.registry.find_type(type_name) {
            Some(descriptor) => descriptor,
            None => self.resolve_vector(type_name)?,
        };

        Ok(PropertyDescriptor::new(
            name,
            tag,
            data.is_key.unwrap_or(false),
            value,
        ))
    }

    fn resolve_vector(&mut self, type_name: &str) -> Result<Descriptor> {
        let value_name = VectorDescriptor::value_name_of(type_name)
            .ok_or_else(|| Error::MissingTypeDependency(type_name.to_string()))?;

        let value = self
            .registry
            .find_type(value_name)
            .ok_or_else(|| Error::MissingValueTypeDependency(value_name.to_string()))?;

        match value {
            Descriptor::Enum(_) => self.registry.register_type(value.vector_of(), false),
            Descriptor::Struct(_) => Err(Error::UnsupportedType(
                "dynamic struct vector types are currently not supported".to_string(),
            )),
            _ => Err(Error::UnsupportedType(format!(
                "unsupported dynamic vector type: {}",
                value_name
            ))),
        }
    }

    /// Wire form of an enum descriptor.
    pub fn enum_to_data(descriptor: &EnumDescriptor) -> EnumDescriptorData {
        EnumDescriptorData {
            name: Some(descriptor.name().to_string()),
            elements: Some(
                descriptor
                    .enumerators()
                    .iter()
                    .map(|e| EnumElementDescriptor {
                        enum_value: Some(e.value),
                        name: Some(e.name.clone()),
                        tag: Some(e.tag),
                    })
                    .collect(),
            ),
        }
    }

    /// Wire form of a struct descriptor.
    pub fn struct_to_data(descriptor: &StructDescriptor) -> StructDescriptorData {
        StructDescriptorData {
            name: Some(descriptor.name().to_string()),
            flags: Some(flags_to_data(descriptor.flags())),
            properties: Some(
                descriptor
                    .properties()
                    .iter()
                    .map(|p| StructPropertyData {
                        name: Some(p.name().to_string()),
                        tag: Some(p.tag()),
                        is_key: Some(p.is_key()),
                        type_name: Some(p.value().name().to_string()),
                    })
                    .collect(),
            ),
        }
    }
}

fn flags_from_data(data: &DotsStructFlags) -> StructFlags {
    [
        (data.cached, StructFlags::CACHED),
        (data.internal, StructFlags::INTERNAL),
        (data.persistent, StructFlags::PERSISTENT),
        (data.cleanup, StructFlags::CLEANUP),
        (data.local, StructFlags::LOCAL),
        (data.substruct_only, StructFlags::SUBSTRUCT_ONLY),
    ]
    .into_iter()
    .filter(|(set, _)| *set == Some(true))
    .fold(StructFlags::NONE, |flags, (_, flag)| flags | flag)
}

fn flags_to_data(flags: StructFlags) -> DotsStructFlags {
    DotsStructFlags {
        cached: Some(flags.contains(StructFlags::CACHED)),
        internal: Some(flags.contains(StructFlags::INTERNAL)),
        persistent: Some(flags.contains(StructFlags::PERSISTENT)),
        cleanup: Some(flags.contains(StructFlags::CLEANUP)),
        local: Some(flags.contains(StructFlags::LOCAL)),
        substruct_only: Some(flags.contains(StructFlags::SUBSTRUCT_ONLY)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builder::{EnumDescriptorBuilder, StructDescriptorBuilder};
    use crate::types::descriptor::FundamentalKind;

    fn color() -> Arc<EnumDescriptor> {
        EnumDescriptorBuilder::new("Color")
            .variant("red")
            .variant("green")
            .variant("blue")
            .build_arc()
            .expect("valid enum")
    }

    fn property(name: &str, tag: u32, type_name: &str) -> StructPropertyData {
        StructPropertyData {
            name: Some(name.into()),
            tag: Some(tag),
            is_key: Some(false),
            type_name: Some(type_name.into()),
        }
    }

    #[test]
    fn test_struct_round_trip() -> std::result::Result<(), String> {
        let source = StructDescriptorBuilder::new("Paint")
            .cached()
            .key("id", 1, FundamentalKind::UInt32)
            .string_field("label", 2)
            .vector_field("colors", 3, color())
            .build()
            .map_err(|e| e.to_string())?;

        let struct_data = DescriptorConverter::struct_to_data(&source);
        let enum_data = DescriptorConverter::enum_to_data(&color());

        let mut registry = Registry::new();
        let mut converter = DescriptorConverter::new(&mut registry);
        converter.enum_from_data(&enum_data).map_err(|e| e.to_string())?;
        let rebuilt = converter
            .struct_from_data(&struct_data)
            .map_err(|e| e.to_string())?;

        assert_eq!(rebuilt.name(), source.name());
        assert_eq!(rebuilt.flags(), source.flags());
        for (a, b) in rebuilt.properties().iter().zip(source.properties()) {
            assert_eq!(a.name(), b.name());
            assert_eq!(a.tag(), b.tag());
            assert_eq!(a.is_key(), b.is_key());
            assert_eq!(a.value().name(), b.value().name());
            assert_eq!(a.offset(), b.offset());
        }
        assert_eq!(rebuilt.size(), source.size());
        assert!(registry.has_type("vector<Color>"));
        Ok(())
    }

    #[test]
    fn test_known_name_returns_existing() -> std::result::Result<(), String> {
        let mut registry = Registry::new();
        let existing = registry
            .register_struct(
                StructDescriptorBuilder::new("Known")
                    .key("id", 1, FundamentalKind::UInt32)
                    .build()
                    .map_err(|e| e.to_string())?,
                true,
            )
            .map_err(|e| e.to_string())?;

        let data = StructDescriptorData {
            name: Some("Known".into()),
            flags: None,
            properties: Some(vec![property("other", 7, "string")]),
        };
        let converted = DescriptorConverter::new(&mut registry)
            .struct_from_data(&data)
            .map_err(|e| e.to_string())?;
        assert!(Arc::ptr_eq(&existing, &converted));
        Ok(())
    }

    #[test]
    fn test_missing_dependencies() {
        let mut registry = Registry::new();
        let mut converter = DescriptorConverter::new(&mut registry);

        let unknown = StructDescriptorData {
            name: Some("A".into()),
            flags: None,
            properties: Some(vec![property("p", 1, "Unknown")]),
        };
        assert!(matches!(
            converter.struct_from_data(&unknown),
            Err(Error::MissingTypeDependency(name)) if name == "Unknown"
        ));

        let unknown_value = StructDescriptorData {
            name: Some("B".into()),
            flags: None,
            properties: Some(vec![property("p", 1, "vector<Unknown>")]),
        };
        assert!(matches!(
            converter.struct_from_data(&unknown_value),
            Err(Error::MissingValueTypeDependency(name)) if name == "Unknown"
        ));
    }

    #[test]
    fn test_struct_vector_unsupported() -> std::result::Result<(), String> {
        let mut registry = Registry::new();
        registry
            .register_struct(
                StructDescriptorBuilder::new("Element")
                    .substruct_only()
                    .field("x", 1, FundamentalKind::Int32)
                    .build()
                    .map_err(|e| e.to_string())?,
                true,
            )
            .map_err(|e| e.to_string())?;

        let data = StructDescriptorData {
            name: Some("Holder".into()),
            flags: None,
            properties: Some(vec![property("elements", 1, "vector<Element>")]),
        };
        let result = DescriptorConverter::new(&mut registry).struct_from_data(&data);
        assert!(matches!(result, Err(Error::UnsupportedType(_))));
        assert!(!registry.has_type("Holder"));
        Ok(())
    }
}
