// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type descriptors for runtime type information.
//!
//! # Architecture
//!
//! ```text
//! Descriptor (cheap clone, shared read-only)
//! +-- Fundamental(FundamentalKind)       bool, int*, float*, string, ...
//! +-- Vector(Arc<VectorDescriptor>)      vector<value>
//! +-- Enum(Arc<EnumDescriptor>)          int32 enumerators
//! +-- Struct(Arc<StructDescriptor>)      tagged properties + flags + layout
//! ```
//!
//! Struct layout follows the aligned-struct algorithm: the property area
//! (validity bits) comes first, each property is placed at the next offset
//! satisfying its alignment, and the total size is rounded up to the largest
//! alignment involved.

use crate::error::{Error, Result};
use crate::types::property_set::{PropertySet, PROPERTY_CAPACITY};
use std::fmt;
use std::sync::Arc;

/// Size of the property area that precedes the properties of every struct.
pub const PROPERTY_AREA_SIZE: usize = std::mem::size_of::<u32>();

/// Alignment of the property area.
pub const PROPERTY_AREA_ALIGNMENT: usize = std::mem::align_of::<u32>();

/// Round `offset` up to the next multiple of `alignment`.
#[inline]
pub const fn align_up(offset: usize, alignment: usize) -> usize {
    if alignment <= 1 {
        offset
    } else {
        offset.div_ceil(alignment) * alignment
    }
}

/// Fundamental (built-in) value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FundamentalKind {
    Bool,
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    PropertySet,
    TimePoint,
    SteadyTimePoint,
    Duration,
    Uuid,
    String,
}

impl FundamentalKind {
    /// Every fundamental kind, in catalog order.
    pub const ALL: [FundamentalKind; 17] = [
        Self::Bool,
        Self::Int8,
        Self::UInt8,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Float32,
        Self::Float64,
        Self::PropertySet,
        Self::TimePoint,
        Self::SteadyTimePoint,
        Self::Duration,
        Self::Uuid,
        Self::String,
    ];

    /// Registered type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Int64 => "int64",
            Self::UInt64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::PropertySet => "property_set",
            Self::TimePoint => "timepoint",
            Self::SteadyTimePoint => "steady_timepoint",
            Self::Duration => "duration",
            Self::Uuid => "uuid",
            Self::String => "string",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// In-memory size in bytes.
    pub const fn size(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::PropertySet => 4,
            Self::Int64
            | Self::UInt64
            | Self::Float64
            | Self::TimePoint
            | Self::SteadyTimePoint
            | Self::Duration => 8,
            Self::Uuid => 16,
            Self::String => std::mem::size_of::<String>(),
        }
    }

    /// Alignment requirement in bytes.
    pub const fn alignment(&self) -> usize {
        match self {
            Self::Bool | Self::Int8 | Self::UInt8 | Self::Uuid => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 | Self::PropertySet => 4,
            Self::Int64
            | Self::UInt64
            | Self::Float64
            | Self::TimePoint
            | Self::SteadyTimePoint
            | Self::Duration => 8,
            Self::String => std::mem::align_of::<String>(),
        }
    }
}

/// Coarse type category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Fundamental,
    Vector,
    Enum,
    Struct,
}

/// Runtime metadata of any DOTS type.
#[derive(Debug, Clone, PartialEq)]
pub enum Descriptor {
    Fundamental(FundamentalKind),
    Vector(Arc<VectorDescriptor>),
    Enum(Arc<EnumDescriptor>),
    Struct(Arc<StructDescriptor>),
}

impl Descriptor {
    /// Globally unique type name.
    pub fn name(&self) -> &str {
        match self {
            Self::Fundamental(kind) => kind.name(),
            Self::Vector(v) => &v.name,
            Self::Enum(e) => &e.name,
            Self::Struct(s) => &s.name,
        }
    }

    pub fn type_kind(&self) -> TypeKind {
        match self {
            Self::Fundamental(_) => TypeKind::Fundamental,
            Self::Vector(_) => TypeKind::Vector,
            Self::Enum(_) => TypeKind::Enum,
            Self::Struct(_) => TypeKind::Struct,
        }
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Fundamental(kind) => kind.size(),
            Self::Vector(_) => VectorDescriptor::SIZE,
            Self::Enum(e) => e.underlying().size(),
            Self::Struct(s) => s.size,
        }
    }

    pub fn alignment(&self) -> usize {
        match self {
            Self::Fundamental(kind) => kind.alignment(),
            Self::Vector(_) => VectorDescriptor::ALIGNMENT,
            Self::Enum(e) => e.underlying().alignment(),
            Self::Struct(s) => s.alignment,
        }
    }

    pub fn as_fundamental(&self) -> Option<FundamentalKind> {
        match self {
            Self::Fundamental(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Arc<VectorDescriptor>> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&Arc<EnumDescriptor>> {
        match self {
            Self::Enum(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Arc<StructDescriptor>> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }

    /// Identity comparison (same allocation, or same fundamental kind).
    pub fn ptr_eq(&self, other: &Descriptor) -> bool {
        match (self, other) {
            (Self::Fundamental(a), Self::Fundamental(b)) => a == b,
            (Self::Vector(a), Self::Vector(b)) => Arc::ptr_eq(a, b),
            (Self::Enum(a), Self::Enum(b)) => Arc::ptr_eq(a, b),
            (Self::Struct(a), Self::Struct(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Shorthand for `vector<self>`.
    pub fn vector_of(&self) -> Descriptor {
        Descriptor::Vector(Arc::new(VectorDescriptor::new(self.clone())))
    }
}

impl From<FundamentalKind> for Descriptor {
    fn from(kind: FundamentalKind) -> Self {
        Self::Fundamental(kind)
    }
}

impl From<Arc<StructDescriptor>> for Descriptor {
    fn from(s: Arc<StructDescriptor>) -> Self {
        Self::Struct(s)
    }
}

impl From<Arc<EnumDescriptor>> for Descriptor {
    fn from(e: Arc<EnumDescriptor>) -> Self {
        Self::Enum(e)
    }
}

impl From<Arc<VectorDescriptor>> for Descriptor {
    fn from(v: Arc<VectorDescriptor>) -> Self {
        Self::Vector(v)
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vector (dynamic length sequence) descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDescriptor {
    name: String,
    value: Descriptor,
}

impl VectorDescriptor {
    pub const SIZE: usize = std::mem::size_of::<Vec<u8>>();
    pub const ALIGNMENT: usize = std::mem::align_of::<Vec<u8>>();

    pub fn new(value: Descriptor) -> Self {
        Self {
            name: Self::name_for(value.name()),
            value,
        }
    }

    /// Name of the vector type holding `value_name` elements.
    pub fn name_for(value_name: &str) -> String {
        format!("vector<{}>", value_name)
    }

    /// Extract `X` from `vector<X>`.
    pub fn value_name_of(name: &str) -> Option<&str> {
        name.strip_prefix("vector<")?.strip_suffix('>')
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Element descriptor.
    pub fn value(&self) -> &Descriptor {
        &self.value
    }
}

/// A single enumerator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumeratorDescriptor {
    /// Wire identifier.
    pub tag: u32,
    pub name: String,
    /// Underlying integer value.
    pub value: i32,
}

impl EnumeratorDescriptor {
    pub fn new(tag: u32, name: impl Into<String>, value: i32) -> Self {
        Self {
            tag,
            name: name.into(),
            value,
        }
    }
}

/// Enumeration type descriptor. The underlying type is always `int32`.
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDescriptor {
    name: String,
    enumerators: Vec<EnumeratorDescriptor>,
}

impl EnumDescriptor {
    /// Create an enum descriptor. Tags and names must be unique.
    pub fn new(name: impl Into<String>, enumerators: Vec<EnumeratorDescriptor>) -> Result<Self> {
        let name = name.into();

        if enumerators.is_empty() {
            return Err(Error::InvalidDescriptor(format!(
                "enum '{}' has no enumerators",
                name
            )));
        }

        for (i, e) in enumerators.iter().enumerate() {
            if enumerators[..i]
                .iter()
                .any(|other| other.tag == e.tag || other.name == e.name)
            {
                return Err(Error::InvalidDescriptor(format!(
                    "enum '{}' declares enumerator '{}' (tag {}) twice",
                    name, e.name, e.tag
                )));
            }
        }

        Ok(Self { name, enumerators })
    }

    /// Build a descriptor from enumerators already known to be valid.
    pub(crate) fn from_parts(name: impl Into<String>, enumerators: Vec<EnumeratorDescriptor>) -> Self {
        Self {
            name: name.into(),
            enumerators,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn underlying(&self) -> FundamentalKind {
        FundamentalKind::Int32
    }

    pub fn enumerators(&self) -> &[EnumeratorDescriptor] {
        &self.enumerators
    }

    /// Enumerator used for default construction.
    pub fn first(&self) -> &EnumeratorDescriptor {
        &self.enumerators[0]
    }

    pub fn enumerator_from_tag(&self, tag: u32) -> Option<&EnumeratorDescriptor> {
        self.enumerators.iter().find(|e| e.tag == tag)
    }

    pub fn enumerator_from_name(&self, name: &str) -> Option<&EnumeratorDescriptor> {
        self.enumerators.iter().find(|e| e.name == name)
    }

    pub fn enumerator_from_value(&self, value: i32) -> Option<&EnumeratorDescriptor> {
        self.enumerators.iter().find(|e| e.value == value)
    }
}

/// Struct flags (`cached`, `internal`, ...).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct StructFlags(u8);

impl StructFlags {
    pub const NONE: StructFlags = StructFlags(0);
    /// Instances are kept in a container.
    pub const CACHED: StructFlags = StructFlags(1 << 0);
    /// Part of the protocol itself.
    pub const INTERNAL: StructFlags = StructFlags(1 << 1);
    pub const PERSISTENT: StructFlags = StructFlags(1 << 2);
    /// Instances are removed when their last updater disconnects.
    pub const CLEANUP: StructFlags = StructFlags(1 << 3);
    pub const LOCAL: StructFlags = StructFlags(1 << 4);
    /// Only usable as a nested property type.
    pub const SUBSTRUCT_ONLY: StructFlags = StructFlags(1 << 5);

    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        StructFlags(bits)
    }

    #[must_use]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[must_use]
    pub const fn contains(&self, other: StructFlags) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for StructFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        StructFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for StructFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Property (struct member) descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    name: String,
    tag: u32,
    is_key: bool,
    offset: usize,
    value: Descriptor,
}

impl PropertyDescriptor {
    /// Create a property descriptor. The offset is assigned by the owning struct.
    pub fn new(name: impl Into<String>, tag: u32, is_key: bool, value: Descriptor) -> Self {
        Self {
            name: name.into(),
            tag,
            is_key,
            offset: 0,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn is_key(&self) -> bool {
        self.is_key
    }

    /// Byte offset within the owning struct.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Descriptor of the property's value.
    pub fn value(&self) -> &Descriptor {
        &self.value
    }

    /// Single-element set for this property.
    pub fn set(&self) -> PropertySet {
        PropertySet::from_tag(self.tag)
    }
}

/// Struct type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct StructDescriptor {
    name: String,
    flags: StructFlags,
    properties: Vec<PropertyDescriptor>,
    positions: [Option<u8>; PROPERTY_CAPACITY as usize],
    property_set: PropertySet,
    key_properties: PropertySet,
    size: usize,
    alignment: usize,
}

impl StructDescriptor {
    /// Create a struct descriptor and compute its layout.
    ///
    /// Properties keep their declared order. Tags must be below 32 and,
    /// like names, unique within the struct.
    pub fn new(
        name: impl Into<String>,
        flags: StructFlags,
        properties: Vec<PropertyDescriptor>,
    ) -> Result<Self> {
        let name = name.into();
        let mut seen = PropertySet::NONE;

        for (position, property) in properties.iter().enumerate() {
            if property.tag >= PROPERTY_CAPACITY {
                return Err(Error::InvalidDescriptor(format!(
                    "property '{}' of struct '{}' has tag {} (max {})",
                    property.name,
                    name,
                    property.tag,
                    PROPERTY_CAPACITY - 1
                )));
            }

            if seen.has(property.tag)
                || properties[..position].iter().any(|p| p.name == property.name)
            {
                return Err(Error::InvalidDescriptor(format!(
                    "struct '{}' declares property '{}' (tag {}) twice",
                    name, property.name, property.tag
                )));
            }

            seen += property.set();
        }

        Ok(Self::from_parts(name, flags, properties))
    }

    /// Build a descriptor from properties already known to be valid.
    ///
    /// Used for compiled-in types; properties with out-of-range tags are
    /// ignored by the lookup tables.
    pub(crate) fn from_parts(
        name: impl Into<String>,
        flags: StructFlags,
        mut properties: Vec<PropertyDescriptor>,
    ) -> Self {
        let mut positions = [None; PROPERTY_CAPACITY as usize];
        let mut property_set = PropertySet::NONE;
        let mut key_properties = PropertySet::NONE;

        for (position, property) in properties.iter().enumerate() {
            if let Some(slot) = positions.get_mut(property.tag as usize) {
                *slot = Some(position as u8);
            }
            property_set += property.set();
            if property.is_key {
                key_properties += property.set();
            }
        }

        let (size, alignment) = Self::layout(&mut properties);

        Self {
            name: name.into(),
            flags,
            properties,
            positions,
            property_set,
            key_properties,
            size,
            alignment,
        }
    }

    /// Assign offsets and return `(size, alignment)`.
    fn layout(properties: &mut [PropertyDescriptor]) -> (usize, usize) {
        let mut alignment = PROPERTY_AREA_ALIGNMENT;
        let mut end = PROPERTY_AREA_SIZE;

        for property in properties.iter_mut() {
            let property_alignment = property.value.alignment();
            property.offset = align_up(end, property_alignment);
            end = property.offset + property.value.size();
            alignment = alignment.max(property_alignment);
        }

        (align_up(end, alignment), alignment)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn flags(&self) -> StructFlags {
        self.flags
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Properties in declared order.
    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    /// Set of all declared properties.
    pub fn property_set(&self) -> PropertySet {
        self.property_set
    }

    pub fn key_properties(&self) -> PropertySet {
        self.key_properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn property_by_tag(&self, tag: u32) -> Option<&PropertyDescriptor> {
        self.position_of(tag).map(|position| &self.properties[position])
    }

    /// Declared position of the property with `tag`.
    #[inline]
    pub fn position_of(&self, tag: u32) -> Option<usize> {
        self.positions
            .get(tag as usize)
            .copied()
            .flatten()
            .map(usize::from)
    }

    pub fn is_cached(&self) -> bool {
        self.flags.contains(StructFlags::CACHED)
    }

    pub fn is_internal(&self) -> bool {
        self.flags.contains(StructFlags::INTERNAL)
    }

    pub fn is_persistent(&self) -> bool {
        self.flags.contains(StructFlags::PERSISTENT)
    }

    pub fn is_cleanup(&self) -> bool {
        self.flags.contains(StructFlags::CLEANUP)
    }

    pub fn is_local(&self) -> bool {
        self.flags.contains(StructFlags::LOCAL)
    }

    pub fn is_substruct_only(&self) -> bool {
        self.flags.contains(StructFlags::SUBSTRUCT_ONLY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn string() -> Descriptor {
        FundamentalKind::String.into()
    }

    #[test]
    fn test_fundamental_names() {
        for kind in FundamentalKind::ALL {
            assert_eq!(FundamentalKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(FundamentalKind::from_name("vector<bool>"), None);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 8), 0);
        assert_eq!(align_up(4, 8), 8);
        assert_eq!(align_up(9, 4), 12);
        assert_eq!(align_up(5, 1), 5);
    }

    #[test]
    fn test_struct_layout() {
        let descriptor = StructDescriptor::new(
            "Layout",
            StructFlags::CACHED,
            vec![
                PropertyDescriptor::new("flag", 1, true, FundamentalKind::Bool.into()),
                PropertyDescriptor::new("count", 2, false, FundamentalKind::UInt64.into()),
                PropertyDescriptor::new("small", 3, false, FundamentalKind::Int16.into()),
            ],
        )
        .expect("valid descriptor");

        let offsets: Vec<usize> = descriptor.properties().iter().map(|p| p.offset()).collect();
        assert_eq!(offsets, vec![4, 8, 16]);
        assert_eq!(descriptor.alignment(), 8);
        assert_eq!(descriptor.size(), 24);
        assert_eq!(descriptor.key_properties(), PropertySet::from_tag(1));
        assert_eq!(descriptor.property_set(), PropertySet::from_tags([1, 2, 3]));
    }

    #[test]
    fn test_empty_struct_layout() {
        let descriptor = StructDescriptor::new("Empty", StructFlags::NONE, Vec::new())
            .expect("valid descriptor");
        assert_eq!(descriptor.size(), PROPERTY_AREA_SIZE);
        assert!(descriptor.properties().is_empty());
    }

    #[test]
    fn test_struct_rejects_bad_tags() {
        let too_large = StructDescriptor::new(
            "Bad",
            StructFlags::NONE,
            vec![PropertyDescriptor::new("p", 32, false, string())],
        );
        assert!(matches!(too_large, Err(Error::InvalidDescriptor(_))));

        let duplicate = StructDescriptor::new(
            "Bad",
            StructFlags::NONE,
            vec![
                PropertyDescriptor::new("a", 1, false, string()),
                PropertyDescriptor::new("b", 1, false, string()),
            ],
        );
        assert!(matches!(duplicate, Err(Error::InvalidDescriptor(_))));
    }

    #[test]
    fn test_lookup_and_flags() {
        let descriptor = StructDescriptor::new(
            "Lookup",
            StructFlags::CACHED | StructFlags::CLEANUP,
            vec![
                PropertyDescriptor::new("id", 5, true, FundamentalKind::UInt32.into()),
                PropertyDescriptor::new("text", 2, false, string()),
            ],
        )
        .expect("valid descriptor");

        assert_eq!(descriptor.position_of(2), Some(1));
        assert_eq!(descriptor.property_by_tag(5).map(|p| p.name()), Some("id"));
        assert!(descriptor.property("missing").is_none());
        assert!(descriptor.is_cached() && descriptor.is_cleanup());
        assert!(!descriptor.is_internal() && !descriptor.is_substruct_only());
    }

    #[test]
    fn test_vector_and_enum() {
        let vector = VectorDescriptor::new(string());
        assert_eq!(vector.name(), "vector<string>");
        assert_eq!(VectorDescriptor::value_name_of("vector<Foo>"), Some("Foo"));
        assert_eq!(VectorDescriptor::value_name_of("Foo"), None);

        let e = EnumDescriptor::new(
            "Color",
            vec![
                EnumeratorDescriptor::new(1, "red", 10),
                EnumeratorDescriptor::new(2, "green", 20),
            ],
        )
        .expect("valid enum");
        assert_eq!(e.first().name, "red");
        assert_eq!(e.enumerator_from_value(20).map(|x| x.tag), Some(2));
        assert_eq!(Descriptor::Enum(Arc::new(e)).size(), 4);

        let dup = EnumDescriptor::new(
            "Dup",
            vec![
                EnumeratorDescriptor::new(1, "a", 0),
                EnumeratorDescriptor::new(1, "b", 1),
            ],
        );
        assert!(dup.is_err());
    }
}
