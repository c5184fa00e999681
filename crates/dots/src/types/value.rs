// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dynamic property values.

use crate::types::descriptor::{Descriptor, FundamentalKind};
use crate::types::property_set::PropertySet;
use crate::types::structure::Struct;
use crate::types::time::{Duration, SteadyTimePoint, TimePoint};
use std::cmp::Ordering;
use std::fmt;
pub use uuid::Uuid;

/// A property value of any DOTS type.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float32(f32),
    Float64(f64),
    PropertySet(PropertySet),
    TimePoint(TimePoint),
    SteadyTimePoint(SteadyTimePoint),
    Duration(Duration),
    Uuid(Uuid),
    String(String),
    /// Enumerator, identified by its tag.
    Enum(u32),
    Vector(Vec<Value>),
    Struct(Struct),
}

impl Value {
    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int8(_) => 1,
            Self::UInt8(_) => 2,
            Self::Int16(_) => 3,
            Self::UInt16(_) => 4,
            Self::Int32(_) => 5,
            Self::UInt32(_) => 6,
            Self::Int64(_) => 7,
            Self::UInt64(_) => 8,
            Self::Float32(_) => 9,
            Self::Float64(_) => 10,
            Self::PropertySet(_) => 11,
            Self::TimePoint(_) => 12,
            Self::SteadyTimePoint(_) => 13,
            Self::Duration(_) => 14,
            Self::Uuid(_) => 15,
            Self::String(_) => 16,
            Self::Enum(_) => 17,
            Self::Vector(_) => 18,
            Self::Struct(_) => 19,
        }
    }

    /// Total order over values.
    ///
    /// Floats use IEEE total ordering, property sets compare by raw bits and
    /// structs compare lexicographically over all their properties. Values of
    /// different variants order by variant.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int8(a), Self::Int8(b)) => a.cmp(b),
            (Self::UInt8(a), Self::UInt8(b)) => a.cmp(b),
            (Self::Int16(a), Self::Int16(b)) => a.cmp(b),
            (Self::UInt16(a), Self::UInt16(b)) => a.cmp(b),
            (Self::Int32(a), Self::Int32(b)) => a.cmp(b),
            (Self::UInt32(a), Self::UInt32(b)) => a.cmp(b),
            (Self::Int64(a), Self::Int64(b)) => a.cmp(b),
            (Self::UInt64(a), Self::UInt64(b)) => a.cmp(b),
            (Self::Float32(a), Self::Float32(b)) => a.total_cmp(b),
            (Self::Float64(a), Self::Float64(b)) => a.total_cmp(b),
            (Self::PropertySet(a), Self::PropertySet(b)) => a.bits().cmp(&b.bits()),
            (Self::TimePoint(a), Self::TimePoint(b)) => a.cmp(b),
            (Self::SteadyTimePoint(a), Self::SteadyTimePoint(b)) => a.cmp(b),
            (Self::Duration(a), Self::Duration(b)) => a.cmp(b),
            (Self::Uuid(a), Self::Uuid(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Enum(a), Self::Enum(b)) => a.cmp(b),
            (Self::Vector(a), Self::Vector(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.total_cmp(y) {
                        Ordering::Equal => {}
                        unequal => return unequal,
                    }
                }
                a.len().cmp(&b.len())
            }
            (Self::Struct(a), Self::Struct(b)) => a.total_cmp(b, PropertySet::ALL),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// `self < other` in the sense of [`total_cmp`](Self::total_cmp).
    pub fn less(&self, other: &Value) -> bool {
        self.total_cmp(other) == Ordering::Less
    }

    /// Heap memory owned by the value.
    pub fn dynamic_memory_usage(&self) -> usize {
        match self {
            Self::String(s) => s.capacity(),
            Self::Vector(values) => {
                values.capacity() * std::mem::size_of::<Value>()
                    + values.iter().map(Value::dynamic_memory_usage).sum::<usize>()
            }
            Self::Struct(s) => s.dynamic_memory_usage(),
            _ => 0,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::Int32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::UInt32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::UInt64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_time_point(&self) -> Option<TimePoint> {
        match self {
            Self::TimePoint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_property_set(&self) -> Option<PropertySet> {
        match self {
            Self::PropertySet(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            Self::Uuid(v) => Some(*v),
            _ => None,
        }
    }

    /// Enumerator tag.
    pub fn as_enum(&self) -> Option<u32> {
        match self {
            Self::Enum(tag) => Some(*tag),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[Value]> {
        match self {
            Self::Vector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct_mut(&mut self) -> Option<&mut Struct> {
        match self {
            Self::Struct(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{}", v),
            Self::Int8(v) => write!(f, "{}", v),
            Self::UInt8(v) => write!(f, "{}", v),
            Self::Int16(v) => write!(f, "{}", v),
            Self::UInt16(v) => write!(f, "{}", v),
            Self::Int32(v) => write!(f, "{}", v),
            Self::UInt32(v) => write!(f, "{}", v),
            Self::Int64(v) => write!(f, "{}", v),
            Self::UInt64(v) => write!(f, "{}", v),
            Self::Float32(v) => write!(f, "{}", v),
            Self::Float64(v) => write!(f, "{}", v),
            Self::PropertySet(v) => write!(f, "{}", v),
            Self::TimePoint(v) => write!(f, "{}", v),
            Self::SteadyTimePoint(v) => write!(f, "{}", v),
            Self::Duration(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::String(v) => write!(f, "{:?}", v),
            Self::Enum(tag) => write!(f, "#{}", tag),
            Self::Vector(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                f.write_str("]")
            }
            Self::Struct(s) => write!(f, "{}", s),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float32,
    f64 => Float64,
    PropertySet => PropertySet,
    TimePoint => TimePoint,
    SteadyTimePoint => SteadyTimePoint,
    Duration => Duration,
    Uuid => Uuid,
    String => String,
    Struct => Struct,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Vector(v.into_iter().map(Into::into).collect())
    }
}

impl Descriptor {
    /// Default-constructed value of this type.
    pub fn construct_default(&self) -> Value {
        match self {
            Descriptor::Fundamental(kind) => match kind {
                FundamentalKind::Bool => Value::Bool(false),
                FundamentalKind::Int8 => Value::Int8(0),
                FundamentalKind::UInt8 => Value::UInt8(0),
                FundamentalKind::Int16 => Value::Int16(0),
                FundamentalKind::UInt16 => Value::UInt16(0),
                FundamentalKind::Int32 => Value::Int32(0),
                FundamentalKind::UInt32 => Value::UInt32(0),
                FundamentalKind::Int64 => Value::Int64(0),
                FundamentalKind::UInt64 => Value::UInt64(0),
                FundamentalKind::Float32 => Value::Float32(0.0),
                FundamentalKind::Float64 => Value::Float64(0.0),
                FundamentalKind::PropertySet => Value::PropertySet(PropertySet::NONE),
                FundamentalKind::TimePoint => Value::TimePoint(TimePoint::default()),
                FundamentalKind::SteadyTimePoint => {
                    Value::SteadyTimePoint(SteadyTimePoint::default())
                }
                FundamentalKind::Duration => Value::Duration(Duration::ZERO),
                FundamentalKind::Uuid => Value::Uuid(Uuid::nil()),
                FundamentalKind::String => Value::String(String::new()),
            },
            Descriptor::Vector(_) => Value::Vector(Vec::new()),
            Descriptor::Enum(e) => Value::Enum(e.first().tag),
            Descriptor::Struct(s) => Value::Struct(Struct::new(s)),
        }
    }

    /// Check that `value` is a valid instance of this type.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Descriptor::Fundamental(kind), value) => matches!(
                (kind, value),
                (FundamentalKind::Bool, Value::Bool(_))
                    | (FundamentalKind::Int8, Value::Int8(_))
                    | (FundamentalKind::UInt8, Value::UInt8(_))
                    | (FundamentalKind::Int16, Value::Int16(_))
                    | (FundamentalKind::UInt16, Value::UInt16(_))
                    | (FundamentalKind::Int32, Value::Int32(_))
                    | (FundamentalKind::UInt32, Value::UInt32(_))
                    | (FundamentalKind::Int64, Value::Int64(_))
                    | (FundamentalKind::UInt64, Value::UInt64(_))
                    | (FundamentalKind::Float32, Value::Float32(_))
                    | (FundamentalKind::Float64, Value::Float64(_))
                    | (FundamentalKind::PropertySet, Value::PropertySet(_))
                    | (FundamentalKind::TimePoint, Value::TimePoint(_))
                    | (FundamentalKind::SteadyTimePoint, Value::SteadyTimePoint(_))
                    | (FundamentalKind::Duration, Value::Duration(_))
                    | (FundamentalKind::Uuid, Value::Uuid(_))
                    | (FundamentalKind::String, Value::String(_))
            ),
            (Descriptor::Enum(e), Value::Enum(tag)) => e.enumerator_from_tag(*tag).is_some(),
            (Descriptor::Vector(v), Value::Vector(values)) => {
                values.iter().all(|element| v.value().accepts(element))
            }
            (Descriptor::Struct(s), Value::Struct(instance)) => {
                instance.descriptor().name() == s.name()
            }
            _ => false,
        }
    }

    pub fn equal(&self, lhs: &Value, rhs: &Value) -> bool {
        lhs.total_cmp(rhs) == Ordering::Equal
    }

    pub fn less(&self, lhs: &Value, rhs: &Value) -> bool {
        lhs.less(rhs)
    }

    /// Text form of a value of this type. Enumerators print their name.
    pub fn value_to_string(&self, value: &Value) -> String {
        match (self, value) {
            (Descriptor::Enum(e), Value::Enum(tag)) => e
                .enumerator_from_tag(*tag)
                .map_or_else(|| value.to_string(), |enumerator| enumerator.name.clone()),
            (Descriptor::Vector(v), Value::Vector(values)) => {
                let elements: Vec<String> = values
                    .iter()
                    .map(|element| v.value().value_to_string(element))
                    .collect();
                format!("[{}]", elements.join(", "))
            }
            _ => value.to_string(),
        }
    }

    /// Heap memory owned by `value`.
    pub fn dynamic_memory_usage(&self, value: &Value) -> usize {
        value.dynamic_memory_usage()
    }
}
