// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type registry: name -> descriptor catalog.
//!
//! Lookups consult two catalogs:
//!
//! - the **static** catalog, seeded once per process with every fundamental
//!   type, the `vector<fundamental>` of each and the compiled-in system
//!   types. It is read-only.
//! - the **dynamic** catalog owned by each `Registry`, holding user types
//!   and types imported over a connection.

use crate::error::{Error, Result};
use crate::system;
use crate::types::descriptor::{Descriptor, EnumDescriptor, FundamentalKind, StructDescriptor};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

/// Callback invoked once for every newly inserted descriptor.
pub type NewTypeHandler = Box<dyn Fn(&Descriptor) + Send + Sync>;

fn insert_with_dependencies(catalog: &mut BTreeMap<String, Descriptor>, descriptor: &Descriptor) {
    if catalog.contains_key(descriptor.name()) {
        return;
    }

    match descriptor {
        Descriptor::Vector(v) => insert_with_dependencies(catalog, v.value()),
        Descriptor::Struct(s) => {
            for property in s.properties() {
                insert_with_dependencies(catalog, property.value());
            }
        }
        Descriptor::Fundamental(_) | Descriptor::Enum(_) => {}
    }

    catalog.insert(descriptor.name().to_string(), descriptor.clone());
}

/// Process-wide catalog of built-in types.
pub fn static_catalog() -> &'static BTreeMap<String, Descriptor> {
    static CATALOG: OnceLock<BTreeMap<String, Descriptor>> = OnceLock::new();

    CATALOG.get_or_init(|| {
        let mut catalog = BTreeMap::new();

        for kind in FundamentalKind::ALL {
            let fundamental = Descriptor::Fundamental(kind);
            insert_with_dependencies(&mut catalog, &fundamental.vector_of());
        }

        for descriptor in system::descriptors() {
            insert_with_dependencies(&mut catalog, &descriptor);
        }

        catalog
    })
}

/// Name -> descriptor catalog of one transceiver.
#[derive(Default)]
pub struct Registry {
    types: BTreeMap<String, Descriptor>,
    new_type_handler: Option<NewTypeHandler>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that reports every newly inserted descriptor.
    pub fn with_new_type_handler(handler: NewTypeHandler) -> Self {
        Self {
            types: BTreeMap::new(),
            new_type_handler: Some(handler),
        }
    }

    /// Register a descriptor and, recursively, the descriptors it depends on.
    ///
    /// If the name is taken, fails with [`Error::DuplicateType`] when
    /// `assert_new` is set and returns the registered descriptor otherwise.
    pub fn register_type(&mut self, descriptor: Descriptor, assert_new: bool) -> Result<Descriptor> {
        if let Some(existing) = self.find_type(descriptor.name()) {
            if assert_new {
                return Err(Error::DuplicateType(descriptor.name().to_string()));
            }
            return Ok(existing);
        }

        match &descriptor {
            Descriptor::Vector(v) => {
                self.register_type(v.value().clone(), false)?;
            }
            Descriptor::Struct(s) => {
                for property in s.properties() {
                    self.register_type(property.value().clone(), false)?;
                }
            }
            Descriptor::Fundamental(_) | Descriptor::Enum(_) => {}
        }

        log::debug!("[registry] registered type '{}'", descriptor.name());
        self.types
            .insert(descriptor.name().to_string(), descriptor.clone());

        if let Some(handler) = &self.new_type_handler {
            handler(&descriptor);
        }

        Ok(descriptor)
    }

    /// Register a struct descriptor, returning the registered instance.
    pub fn register_struct(
        &mut self,
        descriptor: StructDescriptor,
        assert_new: bool,
    ) -> Result<Arc<StructDescriptor>> {
        let name = descriptor.name().to_string();
        self.register_type(Descriptor::Struct(Arc::new(descriptor)), assert_new)?
            .as_struct()
            .cloned()
            .ok_or_else(|| Error::DuplicateType(name))
    }

    /// Register an enum descriptor, returning the registered instance.
    pub fn register_enum(
        &mut self,
        descriptor: EnumDescriptor,
        assert_new: bool,
    ) -> Result<Arc<EnumDescriptor>> {
        let name = descriptor.name().to_string();
        self.register_type(Descriptor::Enum(Arc::new(descriptor)), assert_new)?
            .as_enum()
            .cloned()
            .ok_or_else(|| Error::DuplicateType(name))
    }

    /// Remove a dynamically registered type.
    pub fn deregister_type(&mut self, name: &str, assert_registered: bool) -> Result<()> {
        if self.types.remove(name).is_none() && assert_registered {
            return Err(Error::UnknownType(name.to_string()));
        }
        Ok(())
    }

    pub fn find_type(&self, name: &str) -> Option<Descriptor> {
        static_catalog()
            .get(name)
            .or_else(|| self.types.get(name))
            .cloned()
    }

    pub fn get_type(&self, name: &str) -> Result<Descriptor> {
        self.find_type(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn find_struct_type(&self, name: &str) -> Option<Arc<StructDescriptor>> {
        self.find_type(name)
            .and_then(|descriptor| descriptor.as_struct().cloned())
    }

    /// Like [`find_struct_type`](Self::find_struct_type), failing with
    /// [`Error::UnknownType`] when the name is unknown or not a struct.
    pub fn get_struct_type(&self, name: &str) -> Result<Arc<StructDescriptor>> {
        self.find_struct_type(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn find_enum_type(&self, name: &str) -> Option<Arc<EnumDescriptor>> {
        self.find_type(name)
            .and_then(|descriptor| descriptor.as_enum().cloned())
    }

    pub fn get_enum_type(&self, name: &str) -> Result<Arc<EnumDescriptor>> {
        self.find_enum_type(name)
            .ok_or_else(|| Error::UnknownType(name.to_string()))
    }

    pub fn has_type(&self, name: &str) -> bool {
        static_catalog().contains_key(name) || self.types.contains_key(name)
    }

    /// True if the name belongs to the built-in catalog.
    pub fn is_static(&self, name: &str) -> bool {
        static_catalog().contains_key(name)
    }

    /// Visit every known descriptor, built-in types first.
    pub fn for_each(&self, mut f: impl FnMut(&Descriptor)) {
        static_catalog()
            .values()
            .chain(self.types.values())
            .for_each(|descriptor| f(descriptor));
    }

    /// Visit every known struct descriptor, built-in types first.
    pub fn for_each_struct(&self, mut f: impl FnMut(&Arc<StructDescriptor>)) {
        self.for_each(|descriptor| {
            if let Descriptor::Struct(s) = descriptor {
                f(s);
            }
        });
    }

    /// Snapshot of every known descriptor.
    pub fn types(&self) -> Vec<Descriptor> {
        let mut types = Vec::new();
        self.for_each(|descriptor| types.push(descriptor.clone()));
        types
    }

    /// Dynamically registered descriptors only.
    pub fn dynamic_types(&self) -> impl Iterator<Item = &Descriptor> {
        self.types.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builder::{EnumDescriptorBuilder, StructDescriptorBuilder};
    use parking_lot::Mutex;

    fn color() -> Arc<EnumDescriptor> {
        EnumDescriptorBuilder::new("Color")
            .variant("red")
            .variant("green")
            .build_arc()
            .expect("valid enum")
    }

    #[test]
    fn test_static_catalog() {
        let registry = Registry::new();
        assert!(registry.has_type("string"));
        assert!(registry.has_type("vector<uint32>"));
        assert!(registry.has_type("DotsMember"));
        assert!(registry.has_type("StructDescriptorData"));
        assert!(registry.find_struct_type("DotsMsgHello").is_some_and(|d| d.is_internal()));
        assert!(registry.find_struct_type("string").is_none());
        assert!(matches!(registry.get_type("Nope"), Err(Error::UnknownType(_))));
    }

    #[test]
    fn test_register_duplicate() -> std::result::Result<(), String> {
        let mut registry = Registry::new();
        let first = StructDescriptorBuilder::new("Foo")
            .key("id", 1, FundamentalKind::UInt32)
            .build()
            .map_err(|e| e.to_string())?;
        let registered = registry
            .register_struct(first, true)
            .map_err(|e| e.to_string())?;

        let second = StructDescriptorBuilder::new("Foo")
            .key("other", 2, FundamentalKind::String)
            .build()
            .map_err(|e| e.to_string())?;
        assert!(matches!(
            registry.register_struct(second.clone(), true),
            Err(Error::DuplicateType(_))
        ));

        let existing = registry
            .register_struct(second, false)
            .map_err(|e| e.to_string())?;
        assert!(Arc::ptr_eq(&existing, &registered));
        assert!(existing.property("id").is_some());

        assert!(matches!(
            registry.register_type(FundamentalKind::Bool.into(), true),
            Err(Error::DuplicateType(_))
        ));
        Ok(())
    }

    #[test]
    fn test_dependencies_registered_first() -> std::result::Result<(), String> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut registry = Registry::with_new_type_handler(Box::new(move |descriptor| {
            sink.lock().push(descriptor.name().to_string());
        }));

        let inner = StructDescriptorBuilder::new("Inner")
            .substruct_only()
            .property("color", 1, color())
            .build_arc()
            .map_err(|e| e.to_string())?;
        let outer = StructDescriptorBuilder::new("Outer")
            .key("id", 1, FundamentalKind::UInt32)
            .property("inner", 2, inner)
            .vector_field("colors", 3, color())
            .build()
            .map_err(|e| e.to_string())?;

        registry
            .register_struct(outer, true)
            .map_err(|e| e.to_string())?;

        assert_eq!(
            *seen.lock(),
            vec!["Color", "Inner", "vector<Color>", "Outer"]
        );
        assert!(registry.find_enum_type("Color").is_some());
        Ok(())
    }

    #[test]
    fn test_deregister() {
        let mut registry = Registry::new();
        assert!(registry.register_enum(EnumDescriptor::clone(&color()), true).is_ok());
        assert!(registry.deregister_type("Color", true).is_ok());
        assert!(!registry.has_type("Color"));
        assert!(matches!(
            registry.deregister_type("Color", true),
            Err(Error::UnknownType(_))
        ));
        assert!(registry.deregister_type("Color", false).is_ok());
    }

    #[test]
    fn test_for_each_struct_includes_user_types() {
        let mut registry = Registry::new();
        let descriptor = StructDescriptorBuilder::new("UserType")
            .key("id", 1, FundamentalKind::UInt32)
            .build()
            .expect("valid descriptor");
        registry
            .register_struct(descriptor, true)
            .expect("registered");

        let mut names = Vec::new();
        registry.for_each_struct(|s| names.push(s.name().to_string()));
        assert!(names.iter().any(|n| n == "UserType"));
        assert!(names.iter().any(|n| n == "DotsMember"));
    }
}
