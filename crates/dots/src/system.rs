// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compiled-in system types.
//!
//! These records make up the protocol itself (handshake, membership, type
//! exchange). Each one is a plain Rust struct with optional fields, converted
//! to and from a dynamic [`Struct`] through the [`Record`] trait. Their
//! descriptors live in the static catalog of every registry.

use crate::error::{Error, Result};
use crate::types::descriptor::{
    Descriptor, EnumDescriptor, EnumeratorDescriptor, FundamentalKind, PropertyDescriptor,
    StructDescriptor, StructFlags,
};
use crate::types::structure::Struct;
use crate::types::time::TimePoint;
use crate::types::value::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Rust type usable as a record field.
pub trait PropertyType: Sized {
    /// Descriptor of the property's value.
    fn value_descriptor() -> Descriptor;
    fn to_value(&self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
}

/// Statically typed view of a struct type.
pub trait Record: Sized {
    const TYPE_NAME: &'static str;

    fn descriptor() -> &'static Arc<StructDescriptor>;

    /// Convert into a dynamic instance, one valid property per `Some` field.
    fn to_struct(&self) -> Struct;

    /// Read a dynamic instance of the same type.
    fn from_struct(instance: &Struct) -> Result<Self>;
}

macro_rules! impl_fundamental_property {
    ($($ty:ty => $kind:ident),* $(,)?) => {
        $(
            impl PropertyType for $ty {
                fn value_descriptor() -> Descriptor {
                    Descriptor::Fundamental(FundamentalKind::$kind)
                }

                fn to_value(&self) -> Value {
                    Value::$kind(self.clone())
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$kind(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_fundamental_property! {
    bool => Bool,
    i32 => Int32,
    u32 => UInt32,
    u64 => UInt64,
    String => String,
    TimePoint => TimePoint,
}

impl<T: PropertyType> PropertyType for Vec<T> {
    fn value_descriptor() -> Descriptor {
        T::value_descriptor().vector_of()
    }

    fn to_value(&self) -> Value {
        Value::Vector(self.iter().map(T::to_value).collect())
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_vector()?.iter().map(T::from_value).collect()
    }
}

macro_rules! is_key {
    () => {
        false
    };
    (key) => {
        true
    };
}

macro_rules! dots_record {
    (
        $(#[$meta:meta])*
        $name:ident [$($flag:ident)|+] {
            $( $tag:literal $($key:ident)? $prop:literal $field:ident : $ty:ty, )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct $name {
            $( pub $field: Option<$ty>, )*
        }

        impl Record for $name {
            const TYPE_NAME: &'static str = stringify!($name);

            fn descriptor() -> &'static Arc<StructDescriptor> {
                static DESCRIPTOR: OnceLock<Arc<StructDescriptor>> = OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    Arc::new(StructDescriptor::from_parts(
                        stringify!($name),
                        StructFlags::NONE $(| StructFlags::$flag)+,
                        vec![
                            $( PropertyDescriptor::new(
                                $prop,
                                $tag,
                                is_key!($($key)?),
                                <$ty as PropertyType>::value_descriptor(),
                            ), )*
                        ],
                    ))
                })
            }

            fn to_struct(&self) -> Struct {
                let mut instance = Struct::new(Self::descriptor());
                $(
                    if let Some(value) = &self.$field {
                        instance.put($tag, PropertyType::to_value(value));
                    }
                )*
                instance
            }

            fn from_struct(instance: &Struct) -> Result<Self> {
                if instance.type_name() != Self::TYPE_NAME {
                    return Err(Error::TypeMismatch {
                        type_name: instance.type_name().to_string(),
                        property: String::new(),
                        expected: Self::TYPE_NAME.to_string(),
                    });
                }

                Ok(Self {
                    $(
                        $field: match instance.get_by_tag($tag) {
                            None => None,
                            Some(value) => Some(
                                <$ty as PropertyType>::from_value(value).ok_or_else(|| {
                                    Error::TypeMismatch {
                                        type_name: Self::TYPE_NAME.to_string(),
                                        property: $prop.to_string(),
                                        expected: <$ty as PropertyType>::value_descriptor()
                                            .name()
                                            .to_string(),
                                    }
                                })?,
                            ),
                        },
                    )*
                })
            }
        }

        impl PropertyType for $name {
            fn value_descriptor() -> Descriptor {
                Descriptor::Struct(Arc::clone(<Self as Record>::descriptor()))
            }

            fn to_value(&self) -> Value {
                Value::Struct(self.to_struct())
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.as_struct().and_then(|s| Self::from_struct(s).ok())
            }
        }
    };
}

macro_rules! dots_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $tag:literal $variant:ident = $label:literal, )+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $variant, )+
        }

        impl $name {
            pub const TYPE_NAME: &'static str = stringify!($name);

            pub fn enum_descriptor() -> &'static Arc<EnumDescriptor> {
                static DESCRIPTOR: OnceLock<Arc<EnumDescriptor>> = OnceLock::new();
                DESCRIPTOR.get_or_init(|| {
                    Arc::new(EnumDescriptor::from_parts(
                        stringify!($name),
                        vec![ $( EnumeratorDescriptor::new($tag, $label, $tag as i32 - 1), )+ ],
                    ))
                })
            }

            pub const fn tag(self) -> u32 {
                match self {
                    $( Self::$variant => $tag, )+
                }
            }

            pub fn from_tag(tag: u32) -> Option<Self> {
                match tag {
                    $( $tag => Some(Self::$variant), )+
                    _ => None,
                }
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl PropertyType for $name {
            fn value_descriptor() -> Descriptor {
                Descriptor::Enum(Arc::clone(Self::enum_descriptor()))
            }

            fn to_value(&self) -> Value {
                Value::Enum(self.tag())
            }

            fn from_value(value: &Value) -> Option<Self> {
                value.as_enum().and_then(Self::from_tag)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

dots_enum! {
    /// Group membership change.
    DotsMemberEvent {
        1 Join = "join",
        2 Leave = "leave",
        3 Kill = "kill",
    }
}

dots_enum! {
    /// Lifecycle state of a connection.
    DotsConnectionState {
        1 Suspended = "suspended",
        2 Connecting = "connecting",
        3 EarlySubscribe = "early_subscribe",
        4 Connected = "connected",
        5 Closed = "closed",
    }
}

dots_record! {
    /// Request to join or leave the group of a type.
    DotsMember [INTERNAL] {
        1 key "groupName" group_name: String,
        2 "event" event: DotsMemberEvent,
        3 "client" client: u32,
    }
}

dots_record! {
    /// First message of the host, optionally carrying an authentication challenge.
    DotsMsgHello [INTERNAL] {
        1 "serverName" server_name: String,
        2 "authChallenge" auth_challenge: u64,
        3 "authenticationRequired" authentication_required: bool,
    }
}

dots_record! {
    DotsMsgConnect [INTERNAL] {
        1 "clientName" client_name: String,
        2 "preloadCache" preload_cache: bool,
        3 "preloadClientFinished" preload_client_finished: bool,
        4 "cnonce" cnonce: String,
        5 "authChallengeResponse" auth_challenge_response: String,
    }
}

dots_record! {
    DotsMsgConnectResponse [INTERNAL] {
        1 "serverName" server_name: String,
        2 "clientId" client_id: u32,
        3 "preload" preload: bool,
        4 "preloadFinished" preload_finished: bool,
        5 "accepted" accepted: bool,
    }
}

dots_record! {
    /// Connection teardown. Code 0 is a graceful close.
    DotsMsgError [INTERNAL] {
        1 "errorCode" error_code: i32,
        2 "errorText" error_text: String,
    }
}

dots_record! {
    /// Marks the end of a cache transmission or of a descriptor request.
    DotsCacheInfo [INTERNAL] {
        1 "typeName" type_name: String,
        2 "endTransmission" end_transmission: bool,
        3 "endDescriptorRequest" end_descriptor_request: bool,
    }
}

dots_record! {
    DotsClearCache [INTERNAL] {
        1 "typeNames" type_names: Vec<String>,
    }
}

dots_record! {
    DotsDescriptorRequest [INTERNAL] {
        1 "whitelist" whitelist: Vec<String>,
        2 "blacklist" blacklist: Vec<String>,
    }
}

dots_record! {
    DotsStructFlags [INTERNAL | SUBSTRUCT_ONLY] {
        1 "cached" cached: bool,
        2 "internal" internal: bool,
        3 "persistent" persistent: bool,
        4 "cleanup" cleanup: bool,
        5 "local" local: bool,
        6 "substructOnly" substruct_only: bool,
    }
}

dots_record! {
    StructPropertyData [INTERNAL | SUBSTRUCT_ONLY] {
        1 "name" name: String,
        2 "tag" tag: u32,
        3 "isKey" is_key: bool,
        4 "type" type_name: String,
    }
}

dots_record! {
    /// Wire form of a struct descriptor.
    StructDescriptorData [INTERNAL] {
        1 key "name" name: String,
        2 "flags" flags: DotsStructFlags,
        3 "properties" properties: Vec<StructPropertyData>,
    }
}

dots_record! {
    EnumElementDescriptor [INTERNAL | SUBSTRUCT_ONLY] {
        1 "enum_value" enum_value: i32,
        2 "name" name: String,
        3 "tag" tag: u32,
    }
}

dots_record! {
    /// Wire form of an enum descriptor.
    EnumDescriptorData [INTERNAL] {
        1 key "name" name: String,
        2 "elements" elements: Vec<EnumElementDescriptor>,
    }
}

impl DotsMember {
    pub fn new(group_name: impl Into<String>, event: DotsMemberEvent) -> Self {
        Self {
            group_name: Some(group_name.into()),
            event: Some(event),
            client: None,
        }
    }
}

impl DotsMsgError {
    /// Error with code 0, closing a connection gracefully.
    pub fn graceful() -> Self {
        Self {
            error_code: Some(0),
            error_text: None,
        }
    }
}

/// Descriptors of every system type.
pub fn descriptors() -> Vec<Descriptor> {
    vec![
        DotsMemberEvent::value_descriptor(),
        DotsConnectionState::value_descriptor(),
        DotsMember::value_descriptor(),
        DotsMsgHello::value_descriptor(),
        DotsMsgConnect::value_descriptor(),
        DotsMsgConnectResponse::value_descriptor(),
        DotsMsgError::value_descriptor(),
        DotsCacheInfo::value_descriptor(),
        DotsClearCache::value_descriptor(),
        DotsDescriptorRequest::value_descriptor(),
        DotsStructFlags::value_descriptor(),
        StructPropertyData::value_descriptor(),
        StructDescriptorData::value_descriptor(),
        EnumElementDescriptor::value_descriptor(),
        EnumDescriptorData::value_descriptor(),
    ]
}

/// Names of the records exchanged during the handshake.
pub(crate) fn is_handshake_type(name: &str) -> bool {
    matches!(
        name,
        "DotsMsgHello" | "DotsMsgConnect" | "DotsMsgConnectResponse" | "DotsMsgError"
    )
}
