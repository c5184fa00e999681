// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Type System
//!
//! Runtime description of the types exchanged over DOTS, and the generic
//! struct operations built on it.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `property_set` | 32-bit set of property tags |
//! | `descriptor` | Fundamental, enum, vector and struct descriptors |
//! | `value` | Dynamic property values |
//! | `structure` | Dynamic struct instances and their operations |
//! | `builder` | Fluent descriptor builders |
//! | `registry` | Name -> descriptor catalog |
//! | `time` | Wire time types |

pub mod builder;
pub mod descriptor;
pub mod property_set;
pub mod registry;
pub mod structure;
pub mod time;
pub mod value;

pub use builder::{EnumDescriptorBuilder, StructDescriptorBuilder};
pub use descriptor::{
    Descriptor, EnumDescriptor, EnumeratorDescriptor, FundamentalKind, PropertyDescriptor,
    StructDescriptor, StructFlags, TypeKind, VectorDescriptor,
};
pub use property_set::{PropertySet, PROPERTY_CAPACITY};
pub use registry::Registry;
pub use structure::Struct;
pub use time::{Duration, SteadyTimePoint, TimePoint};
pub use value::Value;
