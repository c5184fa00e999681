// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance caches.
//!
//! A [`Container`] holds the latest state of every instance of one cached
//! struct type, ordered by the values of its key properties. Updates are
//! partial: only the properties carried by a transmission are applied, every
//! other cached property keeps its value.

use crate::error::{Error, Result};
use crate::io::header::DotsHeader;
use crate::types::descriptor::StructDescriptor;
use crate::types::structure::Struct;
use crate::types::time::TimePoint;
use crate::types::value::Value;
use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Kind of the last operation applied to a cached instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mt {
    Create,
    Update,
    Remove,
}

/// Provenance of a cached instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CloneInformation {
    pub last_operation: Mt,
    pub created_from: Option<u32>,
    pub created: Option<TimePoint>,
    pub last_update_from: Option<u32>,
    pub modified: Option<TimePoint>,
    /// Receiver wall-clock time of the last change.
    pub local_update_time: TimePoint,
}

impl CloneInformation {
    /// Provenance of an instance seen for the first time.
    pub fn created(header: &DotsHeader) -> Self {
        Self {
            last_operation: Mt::Create,
            created_from: header.sender,
            created: header.sent_time,
            last_update_from: header.sender,
            modified: header.sent_time,
            local_update_time: TimePoint::now(),
        }
    }

    fn touch(&mut self, operation: Mt, header: &DotsHeader) {
        self.last_operation = operation;
        self.last_update_from = header.sender;
        self.modified = header.sent_time;
        self.local_update_time = TimePoint::now();
    }
}

/// Values of the key properties in declared order.
#[derive(Debug, Clone)]
struct InstanceKey(Vec<Value>);

impl PartialEq for InstanceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for InstanceKey {}

impl PartialOrd for InstanceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InstanceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match a.total_cmp(b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

type Entries = BTreeMap<InstanceKey, (Struct, CloneInformation)>;

/// Cache of one struct type.
#[derive(Debug)]
pub struct Container {
    descriptor: Arc<StructDescriptor>,
    instances: Entries,
}

impl Container {
    /// Create an empty container. The type must be cached and keyed.
    pub fn new(descriptor: &Arc<StructDescriptor>) -> Result<Self> {
        if !descriptor.is_cached() {
            return Err(Error::UnsupportedType(format!(
                "cannot create container for uncached type: {}",
                descriptor.name()
            )));
        }

        if descriptor.key_properties().is_empty() {
            return Err(Error::UnsupportedType(format!(
                "cannot create container for type without key properties: {}",
                descriptor.name()
            )));
        }

        Ok(Self {
            descriptor: Arc::clone(descriptor),
            instances: BTreeMap::new(),
        })
    }

    pub fn descriptor(&self) -> &Arc<StructDescriptor> {
        &self.descriptor
    }

    fn key_of(&self, instance: &Struct) -> Result<InstanceKey> {
        let keys = self.descriptor.key_properties();

        self.descriptor
            .properties()
            .iter()
            .filter(|p| p.is_key())
            .map(|p| instance.get_by_tag(p.tag()).cloned())
            .collect::<Option<Vec<_>>>()
            .map(InstanceKey)
            .ok_or_else(|| Error::InvalidKey {
                type_name: self.descriptor.name().to_string(),
                missing: keys - instance.valid_properties(),
            })
    }

    /// Cached instance with the same key, if any.
    pub fn find(&self, instance: &Struct) -> Option<&Struct> {
        self.find_clone(instance).map(|(cached, _)| cached)
    }

    pub fn find_clone(&self, instance: &Struct) -> Option<(&Struct, &CloneInformation)> {
        let key = self.key_of(instance).ok()?;
        self.instances.get(&key).map(|(cached, info)| (cached, info))
    }

    /// Like [`find`](Self::find), failing with [`Error::NotInContainer`].
    pub fn get(&self, instance: &Struct) -> Result<&Struct> {
        self.find(instance)
            .ok_or_else(|| Error::NotInContainer(self.descriptor.name().to_string()))
    }

    pub fn get_clone(&self, instance: &Struct) -> Result<(&Struct, &CloneInformation)> {
        self.find_clone(instance)
            .ok_or_else(|| Error::NotInContainer(self.descriptor.name().to_string()))
    }

    /// Create or partially update the cached instance with the key of `instance`.
    ///
    /// An update copies `header.attributes` minus the key properties onto the
    /// cached instance, including removals of properties absent on `instance`.
    pub fn insert(&mut self, header: &DotsHeader, instance: &Struct) -> Result<(&Struct, &CloneInformation)> {
        let key = self.key_of(instance)?;
        let update_properties = header.attributes - self.descriptor.key_properties();

        let entry = match self.instances.entry(key) {
            Entry::Vacant(vacant) => {
                vacant.insert((instance.clone(), CloneInformation::created(header)))
            }
            Entry::Occupied(occupied) => {
                let entry = occupied.into_mut();
                entry.0.copy_from(instance, update_properties);
                entry.1.touch(Mt::Update, header);
                entry
            }
        };

        Ok((&entry.0, &entry.1))
    }

    /// Detach the cached instance with the key of `instance`.
    ///
    /// The detached instance receives the same partial update as
    /// [`insert`](Self::insert) so it reflects the final attribute values.
    pub fn remove(&mut self, header: &DotsHeader, instance: &Struct) -> Result<Option<(Struct, CloneInformation)>> {
        let key = self.key_of(instance)?;
        let update_properties = header.attributes - self.descriptor.key_properties();

        Ok(self.instances.remove(&key).map(|(mut removed, mut info)| {
            removed.copy_from(instance, update_properties);
            info.touch(Mt::Remove, header);
            (removed, info)
        }))
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Cached instances in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Struct, &CloneInformation)> {
        self.instances.values().map(|(instance, info)| (instance, info))
    }

    /// Owned copy of every entry, in key order.
    pub fn snapshot(&self) -> Vec<(Struct, CloneInformation)> {
        self.instances.values().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.instances.clear();
    }

    /// Approximate memory used by the container and its instances.
    pub fn total_memory_usage(&self) -> usize {
        let static_usage = std::mem::size_of::<Self>();
        let entry_usage = self.instances.len()
            * (std::mem::size_of::<InstanceKey>()
                + std::mem::size_of::<(Struct, CloneInformation)>());
        let instance_usage: usize = self
            .instances
            .iter()
            .map(|(key, (instance, _))| {
                key.0.iter().map(Value::dynamic_memory_usage).sum::<usize>()
                    + instance.dynamic_memory_usage()
            })
            .sum();

        static_usage + entry_usage + instance_usage
    }
}

/// Containers of every cached type seen by one dispatcher.
#[derive(Debug, Default)]
pub struct ContainerPool {
    containers: BTreeMap<String, Container>,
}

impl ContainerPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Container for `descriptor`, created on first use.
    pub fn get(&mut self, descriptor: &Arc<StructDescriptor>) -> Result<&mut Container> {
        match self.containers.entry(descriptor.name().to_string()) {
            Entry::Occupied(occupied) => Ok(occupied.into_mut()),
            Entry::Vacant(vacant) => Ok(vacant.insert(Container::new(descriptor)?)),
        }
    }

    pub fn find(&self, type_name: &str) -> Option<&Container> {
        self.containers.get(type_name)
    }

    pub fn find_mut(&mut self, type_name: &str) -> Option<&mut Container> {
        self.containers.get_mut(type_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Container> {
        self.containers.values()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn total_memory_usage(&self) -> usize {
        self.containers
            .values()
            .map(Container::total_memory_usage)
            .sum()
    }
}
