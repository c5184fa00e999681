// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transceiver: registry + dispatcher facade shared by guests and hosts.
//!
//! [`Transceiver`] is generic over its [`Role`]. The role decides how a
//! publication leaves the process and what joining a group means; everything
//! else (type registration, subscriptions, publish validation, the local
//! cache) lives in the shared [`Core`].
//!
//! Subscriptions reference the transceiver weakly, so they may outlive it.
//! No lock is held while user callbacks run.

use crate::error::{Error, Result};
use crate::io::container::{CloneInformation, Container, ContainerPool};
use crate::io::dispatcher::{Dispatcher, ErrorHandler, HandlerId};
use crate::io::event::Event;
use crate::io::header::Transmission;
use crate::io::subscription::{Subscription, SubscriptionKind, Unsubscribe};
use crate::system::Record;
use crate::types::descriptor::{Descriptor, StructDescriptor};
use crate::types::property_set::PropertySet;
use crate::types::registry::Registry;
use crate::types::structure::Struct;
use crossbeam::channel::{unbounded, Receiver};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback receiving type registrations.
pub type DescriptorHandler = Arc<dyn Fn(&Descriptor) + Send + Sync>;

/// How a transceiver reaches its peers. Implemented by
/// [`Guest`](crate::io::guest::Guest) and [`Host`](crate::io::host::Host).
pub trait Role: Send + Sync + 'static {
    /// Start receiving the group `name` from peers.
    fn join_group(&self, core: &Core, name: &str) -> Result<()>;

    /// Stop receiving the group `name`.
    fn leave_group(&self, core: &Core, name: &str) -> Result<()>;

    /// Send a validated publication. `included` already contains the key.
    fn publish(&self, core: &Core, instance: &Struct, included: PropertySet, remove: bool) -> Result<()>;
}

/// State shared by every role.
pub struct Core {
    self_name: String,
    registry: Mutex<Registry>,
    registered: Receiver<Descriptor>,
    dispatcher: Dispatcher,
    new_type_handlers: Mutex<Vec<(HandlerId, DescriptorHandler)>>,
    next_new_type_id: AtomicU64,
    subscribers: Mutex<BTreeMap<String, usize>>,
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("self_name", &self.self_name)
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Core {
    fn new(self_name: String, error_handler: Option<ErrorHandler>) -> Self {
        let (tx, rx) = unbounded();
        let registry = Registry::with_new_type_handler(Box::new(move |descriptor: &Descriptor| {
            let _ = tx.send(descriptor.clone());
        }));

        Self {
            self_name,
            registry: Mutex::new(registry),
            registered: rx,
            dispatcher: Dispatcher::new(error_handler),
            new_type_handlers: Mutex::new(Vec::new()),
            next_new_type_id: AtomicU64::new(1),
            subscribers: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn self_name(&self) -> &str {
        &self.self_name
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Run `f` on the registry, then deliver the registrations it caused.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        let result = f(&mut self.registry.lock());
        self.flush_new_types();
        result
    }

    /// Lock the registry. Callers must call [`Core::flush_new_types`] once
    /// the guard is released.
    pub(crate) fn lock_registry(&self) -> parking_lot::MutexGuard<'_, Registry> {
        self.registry.lock()
    }

    /// Deliver pending registrations to the new-type handlers.
    pub(crate) fn flush_new_types(&self) {
        while let Ok(descriptor) = self.registered.try_recv() {
            let handlers = self.new_type_handlers.lock().clone();
            for (id, handler) in handlers {
                if self.is_new_type_handler(id) {
                    self.dispatcher.invoke(descriptor.name(), || handler(&descriptor));
                }
            }
        }
    }

    fn is_new_type_handler(&self, id: HandlerId) -> bool {
        self.new_type_handlers
            .lock()
            .iter()
            .any(|(registered, _)| *registered == id)
    }

    /// Make sure `descriptor` is known to the registry.
    fn ensure_registered(&self, descriptor: &Arc<StructDescriptor>) -> Result<()> {
        self.with_registry(|registry| registry.register_type(Descriptor::Struct(Arc::clone(descriptor)), false))
            .map(|_| ())
    }
}

struct Inner<R> {
    core: Core,
    role: R,
}

impl<R: Role> Inner<R> {
    fn acquire_group(&self, name: &str) -> Result<()> {
        let first = {
            let mut subscribers = self.core.subscribers.lock();
            let count = subscribers.entry(name.to_string()).or_insert(0);
            *count += 1;
            *count == 1
        };

        if first {
            if let Err(e) = self.role.join_group(&self.core, name) {
                self.core.subscribers.lock().remove(name);
                return Err(e);
            }
        }
        Ok(())
    }

    fn release_group(&self, name: &str) -> Result<()> {
        let last = {
            let mut subscribers = self.core.subscribers.lock();
            match subscribers.get_mut(name) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    subscribers.remove(name);
                    true
                }
                None => false,
            }
        };

        if last {
            self.role.leave_group(&self.core, name)?;
        }
        Ok(())
    }
}

impl<R: Role> Unsubscribe for Inner<R> {
    fn unsubscribe(&self, kind: &SubscriptionKind, id: HandlerId) -> Result<()> {
        match kind {
            SubscriptionKind::Transmission(descriptor) => {
                self.core.dispatcher.remove_transmission_handler(descriptor, id)?;
                self.release_group(descriptor.name())
            }
            SubscriptionKind::Event(descriptor) => {
                self.core.dispatcher.remove_event_handler(descriptor, id)?;
                self.release_group(descriptor.name())
            }
            SubscriptionKind::NewType => {
                let mut handlers = self.core.new_type_handlers.lock();
                let position = handlers
                    .iter()
                    .position(|(registered, _)| *registered == id)
                    .ok_or_else(|| Error::UnknownHandler("<new type>".to_string()))?;
                handlers.remove(position);
                Ok(())
            }
        }
    }
}

/// Process-local facade over a registry, a dispatcher and the connection(s)
/// of its role.
pub struct Transceiver<R: Role> {
    inner: Arc<Inner<R>>,
}

/// Another handle to the same transceiver.
impl<R: Role> Clone for Transceiver<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Role> std::fmt::Debug for Transceiver<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transceiver")
            .field("core", &self.inner.core)
            .finish_non_exhaustive()
    }
}

impl<R: Role> Transceiver<R> {
    pub(crate) fn with_role(self_name: impl Into<String>, role: R, error_handler: Option<ErrorHandler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                core: Core::new(self_name.into(), error_handler),
                role,
            }),
        }
    }

    pub(crate) fn core(&self) -> &Core {
        &self.inner.core
    }

    pub(crate) fn role(&self) -> &R {
        &self.inner.role
    }

    fn owner(&self) -> Weak<dyn Unsubscribe> {
        let owner: Arc<dyn Unsubscribe> = Arc::clone(&self.inner) as Arc<dyn Unsubscribe>;
        Arc::downgrade(&owner)
    }

    pub fn self_name(&self) -> &str {
        self.core().self_name()
    }

    // ------------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------------

    /// Register a type (and the types it depends on).
    pub fn register_type(&self, descriptor: impl Into<Descriptor>, assert_new: bool) -> Result<Descriptor> {
        let descriptor = descriptor.into();
        self.core()
            .with_registry(|registry| registry.register_type(descriptor, assert_new))
    }

    pub fn find_type(&self, name: &str) -> Option<Descriptor> {
        self.core().lock_registry().find_type(name)
    }

    pub fn find_struct_type(&self, name: &str) -> Option<Arc<StructDescriptor>> {
        self.core().lock_registry().find_struct_type(name)
    }

    pub fn get_struct_type(&self, name: &str) -> Result<Arc<StructDescriptor>> {
        self.core().lock_registry().get_struct_type(name)
    }

    /// Run `f` on the registry.
    pub fn with_registry<T>(&self, f: impl FnOnce(&mut Registry) -> T) -> T {
        self.core().with_registry(f)
    }

    // ------------------------------------------------------------------------
    // Subscriptions
    // ------------------------------------------------------------------------

    fn check_subscribable(descriptor: &StructDescriptor) -> Result<()> {
        if descriptor.is_substruct_only() {
            return Err(Error::SubstructOnly {
                operation: "subscribe to",
                type_name: descriptor.name().to_string(),
            });
        }
        Ok(())
    }

    /// Join the group of `descriptor` and receive an [`Event`] for every
    /// change. Currently cached instances are replayed before this returns.
    pub fn subscribe(
        &self,
        descriptor: &Arc<StructDescriptor>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        Self::check_subscribable(descriptor)?;
        self.core().ensure_registered(descriptor)?;
        self.inner.acquire_group(descriptor.name())?;

        let id = self
            .core()
            .dispatcher()
            .add_event_handler(descriptor, Arc::new(handler));
        Ok(Subscription::new(
            self.owner(),
            SubscriptionKind::Event(Arc::clone(descriptor)),
            id,
        ))
    }

    /// [`subscribe`](Self::subscribe) to a registered type by name.
    pub fn subscribe_name(
        &self,
        name: &str,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        let descriptor = self.get_struct_type(name)?;
        self.subscribe(&descriptor, handler)
    }

    /// [`subscribe`](Self::subscribe) to a record type.
    pub fn subscribe_record<T: Record>(
        &self,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        self.subscribe(T::descriptor(), handler)
    }

    /// Join the group of `descriptor` and receive every raw transmission,
    /// without cache interaction.
    pub fn subscribe_transmissions(
        &self,
        descriptor: &Arc<StructDescriptor>,
        handler: impl Fn(&Transmission) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        Self::check_subscribable(descriptor)?;
        self.core().ensure_registered(descriptor)?;
        self.inner.acquire_group(descriptor.name())?;

        let id = self
            .core()
            .dispatcher()
            .add_transmission_handler(descriptor, Arc::new(handler));
        Ok(Subscription::new(
            self.owner(),
            SubscriptionKind::Transmission(Arc::clone(descriptor)),
            id,
        ))
    }

    /// Receive every known type now, built-in types first, and every type
    /// registered later.
    pub fn subscribe_new_types(&self, handler: impl Fn(&Descriptor) + Send + Sync + 'static) -> Subscription {
        let core = self.core();
        let handler: DescriptorHandler = Arc::new(handler);
        let id = core.next_new_type_id.fetch_add(1, Ordering::Relaxed);
        core.new_type_handlers.lock().push((id, Arc::clone(&handler)));

        let known = core.lock_registry().types();
        for descriptor in known {
            if !core.is_new_type_handler(id) {
                break;
            }
            core.dispatcher()
                .invoke(descriptor.name(), || handler(&descriptor));
        }

        Subscription::new(self.owner(), SubscriptionKind::NewType, id)
    }

    // ------------------------------------------------------------------------
    // Publishing
    // ------------------------------------------------------------------------

    /// Publish `instance`.
    ///
    /// `included` selects the transmitted properties and defaults to the
    /// valid ones. An explicit set must contain every key property;
    /// properties not declared by the type are dropped. Properties included
    /// but not valid are cleared in the receivers' caches.
    pub fn publish(&self, instance: &Struct, included: Option<PropertySet>, remove: bool) -> Result<()> {
        let descriptor = instance.descriptor();
        let type_name = descriptor.name();

        if descriptor.is_substruct_only() {
            return Err(Error::SubstructOnly {
                operation: "publish",
                type_name: type_name.to_string(),
            });
        }

        let keys = descriptor.key_properties();
        let missing = keys - instance.valid_properties();
        if !missing.is_empty() {
            return Err(Error::InvalidKey {
                type_name: type_name.to_string(),
                missing,
            });
        }

        if remove && !descriptor.is_cached() {
            return Err(Error::UncachedRemove(type_name.to_string()));
        }

        let included = match included {
            Some(included) => {
                let missing = keys - included;
                if !missing.is_empty() {
                    return Err(Error::InvalidKey {
                        type_name: type_name.to_string(),
                        missing,
                    });
                }
                included & descriptor.property_set()
            }
            None => instance.valid_properties(),
        };

        self.core().ensure_registered(descriptor)?;
        self.role().publish(self.core(), instance, included, remove)
    }

    /// Remove the cached instance with the key of `instance`.
    pub fn remove(&self, instance: &Struct) -> Result<()> {
        self.publish(instance, Some(instance.key_properties()), true)
    }

    /// Publish every set field of a record.
    pub fn publish_record<T: Record>(&self, record: &T) -> Result<()> {
        self.publish(&record.to_struct(), None, false)
    }

    // ------------------------------------------------------------------------
    // Cache
    // ------------------------------------------------------------------------

    /// Run `f` on the container of `type_name`. Do not publish from `f`.
    pub fn with_container<T>(&self, type_name: &str, f: impl FnOnce(Option<&Container>) -> T) -> T {
        self.core().dispatcher().with_container(type_name, f)
    }

    /// Run `f` on the container pool. Do not publish from `f`.
    pub fn with_pool<T>(&self, f: impl FnOnce(&ContainerPool) -> T) -> T {
        self.core().dispatcher().with_pool(f)
    }

    pub fn container_len(&self, type_name: &str) -> usize {
        self.core().dispatcher().container_len(type_name)
    }

    /// Owned copies of the cached instances of `type_name`.
    pub fn cached(&self, type_name: &str) -> Vec<(Struct, CloneInformation)> {
        self.core().dispatcher().cached(type_name)
    }

    pub fn find_cached(&self, instance: &Struct) -> Option<(Struct, CloneInformation)> {
        self.core().dispatcher().find_cached(instance)
    }

    /// Number of local subscriptions to the group `name`.
    pub fn subscriber_count(&self, name: &str) -> usize {
        self.core()
            .subscribers
            .lock()
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}
