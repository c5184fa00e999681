// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Struct instances and the generic algorithms over them.
//!
//! A [`Struct`] pairs its descriptor with a property area: the validity set
//! plus one slot per declared property, indexed by declared position. Every
//! algorithm takes an `included` property set restricting the properties it
//! touches.
//!
//! | Operation | Properties visited | Effect on `self` |
//! |-----------|--------------------|------------------|
//! | `copy_from` | `(valid(self) + valid(other)) & included` | take other's value, or destroy |
//! | `merge_from` | `valid(other) & included` | take other's value, nested structs merged |
//! | `assign_from` | all | take other's value if in `valid(other) & included`, else destroy |
//! | `swap` | `included` | exchange slots |
//! | `clear` | `included` | destroy |

use crate::error::{Error, Result};
use crate::types::descriptor::{Descriptor, PropertyDescriptor, StructDescriptor};
use crate::types::property_set::PropertySet;
use crate::types::value::Value;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Dynamic struct instance.
#[derive(Debug, Clone)]
pub struct Struct {
    descriptor: Arc<StructDescriptor>,
    valid: PropertySet,
    slots: Vec<Option<Value>>,
}

impl Struct {
    /// Create an instance with no valid properties.
    pub fn new(descriptor: &Arc<StructDescriptor>) -> Self {
        Self {
            descriptor: Arc::clone(descriptor),
            valid: PropertySet::NONE,
            slots: vec![None; descriptor.properties().len()],
        }
    }

    pub fn descriptor(&self) -> &Arc<StructDescriptor> {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn valid_properties(&self) -> PropertySet {
        self.valid
    }

    pub fn key_properties(&self) -> PropertySet {
        self.descriptor.key_properties()
    }

    /// All declared properties.
    pub fn properties(&self) -> PropertySet {
        self.descriptor.property_set()
    }

    pub fn has_properties(&self, properties: PropertySet) -> bool {
        self.valid.contains(properties)
    }

    /// Fail with [`Error::MissingProperties`] unless every property in `properties` is valid.
    pub fn assert_has_properties(&self, properties: PropertySet) -> Result<()> {
        let missing = properties - self.valid;
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingProperties {
                type_name: self.type_name().to_string(),
                missing,
            })
        }
    }

    pub fn is_valid(&self, name: &str) -> bool {
        self.descriptor
            .property(name)
            .is_some_and(|p| self.valid.has(p.tag()))
    }

    // ------------------------------------------------------------------------
    // Property access
    // ------------------------------------------------------------------------

    fn lookup(&self, name: &str) -> Result<(usize, &PropertyDescriptor)> {
        self.descriptor
            .properties()
            .iter()
            .enumerate()
            .find(|(_, p)| p.name() == name)
            .ok_or_else(|| Error::UnknownProperty {
                type_name: self.type_name().to_string(),
                property: name.to_string(),
            })
    }

    fn lookup_tag(&self, tag: u32) -> Result<(usize, &PropertyDescriptor)> {
        self.descriptor
            .position_of(tag)
            .map(|position| (position, &self.descriptor.properties()[position]))
            .ok_or_else(|| Error::UnknownProperty {
                type_name: self.type_name().to_string(),
                property: format!("#{}", tag),
            })
    }

    /// Value of a valid property, `None` if absent or unknown.
    pub fn get(&self, name: &str) -> Option<&Value> {
        let (position, _) = self.lookup(name).ok()?;
        self.slots[position].as_ref()
    }

    pub fn get_by_tag(&self, tag: u32) -> Option<&Value> {
        self.descriptor
            .position_of(tag)
            .and_then(|position| self.slots[position].as_ref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        let (position, _) = self.lookup(name).ok()?;
        self.slots[position].as_mut()
    }

    /// Value of a property that must be valid.
    pub fn value(&self, name: &str) -> Result<&Value> {
        let (position, property) = self.lookup(name)?;
        self.slots[position]
            .as_ref()
            .ok_or_else(|| Error::InvalidPropertyAccess {
                type_name: self.type_name().to_string(),
                property: property.name().to_string(),
            })
    }

    fn check(&self, property: &PropertyDescriptor, value: &Value) -> Result<()> {
        if property.value().accepts(value) {
            Ok(())
        } else {
            Err(Error::TypeMismatch {
                type_name: self.type_name().to_string(),
                property: property.name().to_string(),
                expected: property.value().name().to_string(),
            })
        }
    }

    /// Construct or assign a property.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        let (position, property) = self.lookup(name)?;
        self.check(property, &value)?;
        self.valid += property.set();
        self.slots[position] = Some(value);
        Ok(self)
    }

    pub fn set_by_tag(&mut self, tag: u32, value: impl Into<Value>) -> Result<&mut Self> {
        let value = value.into();
        let (position, property) = self.lookup_tag(tag)?;
        self.check(property, &value)?;
        self.valid += property.set();
        self.slots[position] = Some(value);
        Ok(self)
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Construct a property that is currently invalid.
    pub fn construct(&mut self, tag: u32, value: impl Into<Value>) -> Result<&mut Value> {
        let value = value.into();
        let (position, property) = self.lookup_tag(tag)?;

        if self.valid.has(tag) {
            return Err(Error::PropertyAlreadyValid {
                type_name: self.type_name().to_string(),
                property: property.name().to_string(),
            });
        }

        self.check(property, &value)?;
        self.valid += PropertySet::from_tag(tag);
        Ok(self.slots[position].insert(value))
    }

    /// Destroy a property, returning its former value.
    pub fn destruct(&mut self, tag: u32) -> Option<Value> {
        let position = self.descriptor.position_of(tag)?;
        self.valid -= PropertySet::from_tag(tag);
        self.slots[position].take()
    }

    /// Destroy a property by name.
    pub fn unset(&mut self, name: &str) -> Option<Value> {
        let tag = self.descriptor.property(name)?.tag();
        self.destruct(tag)
    }

    /// Store a value whose type is known to match. Unknown tags are ignored.
    pub(crate) fn put(&mut self, tag: u32, value: Value) {
        if let Some(position) = self.descriptor.position_of(tag) {
            self.store(position, tag, Some(value));
        }
    }

    fn slot(&self, tag: u32) -> Option<&Value> {
        self.get_by_tag(tag)
    }

    fn store(&mut self, position: usize, tag: u32, value: Option<Value>) {
        if value.is_some() {
            self.valid += PropertySet::from_tag(tag);
        } else {
            self.valid -= PropertySet::from_tag(tag);
        }
        self.slots[position] = value;
    }

    /// Declared `(position, tag)` pairs whose tag is in `set`.
    fn positions(&self, set: PropertySet) -> Vec<(usize, u32)> {
        self.descriptor
            .properties()
            .iter()
            .enumerate()
            .filter(|(_, p)| set.has(p.tag()))
            .map(|(position, p)| (position, p.tag()))
            .collect()
    }

    // ------------------------------------------------------------------------
    // Generic algorithms
    // ------------------------------------------------------------------------

    /// Properties in `included` must be absent on both sides or present and equal.
    pub fn equal(&self, other: &Struct, included: PropertySet) -> bool {
        self.descriptor
            .properties()
            .iter()
            .filter(|p| included.has(p.tag()))
            .all(|p| slots_equal(self.slot(p.tag()), other.slot(p.tag())))
    }

    /// Equality on the key properties.
    pub fn same(&self, other: &Struct) -> bool {
        self.equal(other, self.key_properties())
    }

    /// Lexicographic comparison in declared order, restricted to `included`.
    /// An absent property orders before a present one.
    pub fn total_cmp(&self, other: &Struct, included: PropertySet) -> Ordering {
        for property in self
            .descriptor
            .properties()
            .iter()
            .filter(|p| included.has(p.tag()))
        {
            let ordering = match (self.slot(property.tag()), other.slot(property.tag())) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.total_cmp(b),
            };

            if ordering != Ordering::Equal {
                return ordering;
            }
        }

        Ordering::Equal
    }

    /// `self < other` restricted to `included`; never true for an empty set.
    pub fn less(&self, other: &Struct, included: PropertySet) -> bool {
        !included.is_empty() && self.total_cmp(other, included) == Ordering::Less
    }

    /// Apply other's state for `included`, including removals.
    pub fn copy_from(&mut self, other: &Struct, included: PropertySet) -> &mut Self {
        let copy_properties = (self.valid + other.valid) & included;

        for (position, tag) in self.positions(copy_properties) {
            let value = other.slot(tag).cloned();
            self.store(position, tag, value);
        }

        self
    }

    /// Apply other's valid properties in `included`, merging nested structs.
    pub fn merge_from(&mut self, other: &Struct, included: PropertySet) -> &mut Self {
        let merge_properties = other.valid & included;

        for (position, tag) in self.positions(merge_properties) {
            let Some(incoming) = other.slot(tag) else {
                continue;
            };

            let Value::Struct(nested) = incoming else {
                self.store(position, tag, Some(incoming.clone()));
                continue;
            };

            if let Some(Value::Struct(current)) = self.slots[position].as_mut() {
                current.merge_from(nested, PropertySet::ALL);
            } else {
                let mut fresh = Struct::new(nested.descriptor());
                fresh.merge_from(nested, PropertySet::ALL);
                self.store(position, tag, Some(Value::Struct(fresh)));
            }
        }

        self
    }

    /// Take other's value for every property in `valid(other) & included`,
    /// destroy every other property.
    pub fn assign_from(&mut self, other: &Struct, included: PropertySet) -> &mut Self {
        let assign_properties = other.valid & included;

        for (position, tag) in self.positions(self.properties()) {
            let value = if assign_properties.has(tag) {
                other.slot(tag).cloned()
            } else {
                None
            };
            self.store(position, tag, value);
        }

        self
    }

    /// Exchange the properties in `included` with `other`.
    pub fn swap(&mut self, other: &mut Struct, included: PropertySet) {
        for (position, tag) in self.positions(included) {
            let Some(other_position) = other.descriptor.position_of(tag) else {
                continue;
            };
            let mine = self.slots[position].take();
            let theirs = other.slots[other_position].take();
            self.store(position, tag, theirs);
            other.store(other_position, tag, mine);
        }
    }

    /// Destroy every property in `included`.
    pub fn clear(&mut self, included: PropertySet) {
        for (position, tag) in self.positions(included) {
            self.store(position, tag, None);
        }
    }

    /// Properties in `included` whose presence or value differs.
    pub fn diff_properties(&self, other: &Struct, included: PropertySet) -> PropertySet {
        let symmetric = ((self.valid - other.valid) + (other.valid - self.valid)) & included;
        let common = self.valid & other.valid & included;

        common
            .iter()
            .filter(|&tag| !slots_equal(self.slot(tag), other.slot(tag)))
            .fold(symmetric, |diff, tag| diff + PropertySet::from_tag(tag))
    }

    /// Copy the properties in `valid & included` onto an instance of `target`,
    /// matching properties by tag.
    ///
    /// Properties the target does not declare are dropped. Nested structs and
    /// vectors are rebuilt against the target's property descriptors.
    pub fn rebind(&self, target: &Arc<StructDescriptor>, included: PropertySet) -> Result<Struct> {
        let mut instance = Struct::new(target);

        for (position, property) in target.properties().iter().enumerate() {
            if !included.has(property.tag()) {
                continue;
            }

            if let Some(value) = self.slot(property.tag()) {
                let value = rebind_value(value, property.value()).ok_or_else(|| {
                    Error::TypeMismatch {
                        type_name: target.name().to_string(),
                        property: property.name().to_string(),
                        expected: property.value().name().to_string(),
                    }
                })?;
                instance.store(position, property.tag(), Some(value));
            }
        }

        Ok(instance)
    }

    /// Heap memory owned by the instance.
    pub fn dynamic_memory_usage(&self) -> usize {
        self.slots.capacity() * std::mem::size_of::<Option<Value>>()
            + self
                .slots
                .iter()
                .flatten()
                .map(Value::dynamic_memory_usage)
                .sum::<usize>()
    }

    /// Iterate over valid properties in declared order.
    pub fn iter(&self) -> impl Iterator<Item = (&PropertyDescriptor, &Value)> {
        self.descriptor
            .properties()
            .iter()
            .zip(self.slots.iter())
            .filter_map(|(p, slot)| slot.as_ref().map(|v| (p, v)))
    }
}

fn rebind_value(value: &Value, target: &Descriptor) -> Option<Value> {
    match (value, target) {
        (Value::Struct(nested), Descriptor::Struct(descriptor)) => nested
            .rebind(descriptor, PropertySet::ALL)
            .ok()
            .map(Value::Struct),
        (Value::Vector(values), Descriptor::Vector(vector)) => values
            .iter()
            .map(|v| rebind_value(v, vector.value()))
            .collect::<Option<Vec<_>>>()
            .map(Value::Vector),
        _ if target.accepts(value) => Some(value.clone()),
        _ => None,
    }
}

impl PartialEq for Struct {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.equal(other, PropertySet::ALL)
    }
}

impl fmt::Display for Struct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.type_name())?;
        for (i, (property, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, " {} = {}", property.name(), value)?;
        }
        f.write_str(" }")
    }
}

/// Slot equality under the total value order, so a NaN equals itself.
fn slots_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.total_cmp(b) == Ordering::Equal,
        _ => false,
    }
}
