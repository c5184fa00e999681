// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transmission dispatch.
//!
//! One dispatched transmission fans out to two handler pools of its type:
//!
//! 1. **transmission handlers** receive the raw transmission,
//! 2. **event handlers** receive an [`Event`] after the transmission has
//!    been applied to the type's [`Container`] (cached types) or as a
//!    one-shot create (uncached types).
//!
//! Handlers run on a snapshot taken under the lock, never with the lock held,
//! so a handler may publish, subscribe or unsubscribe. A handler removed
//! while a dispatch is in progress is not invoked by that dispatch anymore.
//! Panics are caught per handler and reported to the error handler.

use crate::error::{Error, Result};
use crate::io::container::{CloneInformation, Container, ContainerPool, Mt};
use crate::io::event::Event;
use crate::io::header::{DotsHeader, Transmission};
use crate::types::descriptor::StructDescriptor;
use crate::types::structure::Struct;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type TransmissionHandler = Arc<dyn Fn(&Transmission) + Send + Sync>;
pub type EventHandler = Arc<dyn Fn(&Event) + Send + Sync>;
pub type ErrorHandler = Arc<dyn Fn(&Error) + Send + Sync>;

/// Opaque handler id, unique per dispatcher.
pub type HandlerId = u64;

type Handlers<H> = BTreeMap<String, Vec<(HandlerId, H)>>;

#[derive(Default)]
struct DispatcherState {
    pool: ContainerPool,
    transmission_handlers: Handlers<TransmissionHandler>,
    event_handlers: Handlers<EventHandler>,
    next_id: HandlerId,
}

impl DispatcherState {
    fn next_id(&mut self) -> HandlerId {
        self.next_id += 1;
        self.next_id
    }
}

fn snapshot<H: Clone>(handlers: &Handlers<H>, type_name: &str) -> Vec<(HandlerId, H)> {
    handlers.get(type_name).cloned().unwrap_or_default()
}

fn is_registered<H>(handlers: &Handlers<H>, type_name: &str, id: HandlerId) -> bool {
    handlers
        .get(type_name)
        .is_some_and(|list| list.iter().any(|(registered, _)| *registered == id))
}

fn remove_handler<H>(handlers: &mut Handlers<H>, type_name: &str, id: HandlerId) -> Result<()> {
    let list = handlers
        .get_mut(type_name)
        .ok_or_else(|| Error::UnknownHandler(type_name.to_string()))?;
    let position = list
        .iter()
        .position(|(registered, _)| *registered == id)
        .ok_or_else(|| Error::UnknownHandler(type_name.to_string()))?;

    list.remove(position);
    if list.is_empty() {
        handlers.remove(type_name);
    }
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Routes transmissions to handlers and keeps the cache of cached types.
pub struct Dispatcher {
    state: Mutex<DispatcherState>,
    error_handler: Option<ErrorHandler>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Dispatcher")
            .field("containers", &state.pool.len())
            .field("transmission_handlers", &state.transmission_handlers.len())
            .field("event_handlers", &state.event_handlers.len())
            .finish()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Dispatcher {
    pub fn new(error_handler: Option<ErrorHandler>) -> Self {
        Self {
            state: Mutex::new(DispatcherState::default()),
            error_handler,
        }
    }

    /// Register a raw transmission handler for `descriptor`.
    pub fn add_transmission_handler(
        &self,
        descriptor: &StructDescriptor,
        handler: TransmissionHandler,
    ) -> HandlerId {
        let mut state = self.state.lock();
        let id = state.next_id();
        state
            .transmission_handlers
            .entry(descriptor.name().to_string())
            .or_default()
            .push((id, handler));
        id
    }

    /// Register an event handler for `descriptor`.
    ///
    /// Every instance currently cached for the type is replayed to the new
    /// handler as a create event before this returns, with
    /// `header.from_cache` counting down to zero.
    pub fn add_event_handler(
        &self,
        descriptor: &Arc<StructDescriptor>,
        handler: EventHandler,
    ) -> HandlerId {
        let (id, cached) = {
            let mut state = self.state.lock();
            let id = state.next_id();
            state
                .event_handlers
                .entry(descriptor.name().to_string())
                .or_default()
                .push((id, Arc::clone(&handler)));

            let cached = state
                .pool
                .find(descriptor.name())
                .map(Container::snapshot)
                .unwrap_or_default();
            (id, cached)
        };

        let mut remaining = cached.len();
        for (instance, clone_info) in cached {
            if !self.is_event_handler(descriptor.name(), id) {
                break;
            }

            remaining -= 1;
            let header = DotsHeader {
                from_cache: Some(remaining as u32),
                ..DotsHeader::for_instance(&instance)
            };
            let event = Event::new(header, instance.clone(), instance, clone_info, Mt::Create);
            self.invoke(descriptor.name(), || handler(&event));
        }

        id
    }

    /// Remove a transmission handler. Fails with [`Error::UnknownHandler`]
    /// if `id` is not registered for `descriptor`.
    pub fn remove_transmission_handler(&self, descriptor: &StructDescriptor, id: HandlerId) -> Result<()> {
        remove_handler(
            &mut self.state.lock().transmission_handlers,
            descriptor.name(),
            id,
        )
    }

    /// Remove an event handler. Fails with [`Error::UnknownHandler`] if `id`
    /// is not registered for `descriptor`.
    pub fn remove_event_handler(&self, descriptor: &StructDescriptor, id: HandlerId) -> Result<()> {
        remove_handler(&mut self.state.lock().event_handlers, descriptor.name(), id)
    }

    fn is_transmission_handler(&self, type_name: &str, id: HandlerId) -> bool {
        is_registered(&self.state.lock().transmission_handlers, type_name, id)
    }

    fn is_event_handler(&self, type_name: &str, id: HandlerId) -> bool {
        is_registered(&self.state.lock().event_handlers, type_name, id)
    }

    pub fn has_handlers(&self, type_name: &str) -> bool {
        let state = self.state.lock();
        state.transmission_handlers.contains_key(type_name) || state.event_handlers.contains_key(type_name)
    }

    /// Dispatch one transmission.
    ///
    /// Transmission handlers run first, then the cache is updated and event
    /// handlers run. A removal of an uncached type fails with
    /// [`Error::UncachedRemove`] before any handler runs. A removal of an
    /// instance that is not cached produces no event.
    pub fn dispatch(&self, transmission: &Transmission) -> Result<()> {
        let header = transmission.header();
        let instance = transmission.instance();
        let descriptor = instance.descriptor();
        let type_name = descriptor.name();

        if header.remove_obj && !descriptor.is_cached() {
            return Err(Error::UncachedRemove(type_name.to_string()));
        }

        let transmission_handlers = snapshot(&self.state.lock().transmission_handlers, type_name);
        // Removals made by a running handler skip the rest of the snapshot.
        for (id, handler) in transmission_handlers {
            if self.is_transmission_handler(type_name, id) {
                self.invoke(type_name, || handler(transmission));
            }
        }

        let (event, event_handlers) = {
            let mut state = self.state.lock();
            let event = if descriptor.is_cached() {
                Self::apply(&mut state.pool, header, instance)?
            } else {
                Some(Event::new(
                    header.clone(),
                    instance.clone(),
                    instance.clone(),
                    CloneInformation::created(header),
                    Mt::Create,
                ))
            };
            (event, snapshot(&state.event_handlers, type_name))
        };

        let Some(event) = event else {
            log::debug!("[dispatcher] ignoring removal of instance of '{}' that is not cached", type_name);
            return Ok(());
        };

        // Same effect as deferring removals to the end of dispatch.
        for (id, handler) in event_handlers {
            if self.is_event_handler(type_name, id) {
                self.invoke(type_name, || handler(&event));
            }
        }

        Ok(())
    }

    fn apply(pool: &mut ContainerPool, header: &DotsHeader, instance: &Struct) -> Result<Option<Event>> {
        let container = pool.get(instance.descriptor())?;

        if header.remove_obj {
            Ok(container.remove(header, instance)?.map(|(removed, clone_info)| {
                Event::new(header.clone(), instance.clone(), removed, clone_info, Mt::Remove)
            }))
        } else {
            let (updated, clone_info) = container.insert(header, instance)?;
            let mt = clone_info.last_operation;
            Ok(Some(Event::new(
                header.clone(),
                instance.clone(),
                updated.clone(),
                clone_info.clone(),
                mt,
            )))
        }
    }

    pub(crate) fn invoke(&self, type_name: &str, f: impl FnOnce()) {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

        if let Err(payload) = result {
            let message = panic_message(payload.as_ref());
            log::warn!("[dispatcher] handler for '{}' panicked: {}", type_name, message);

            self.report(&Error::Handler {
                type_name: type_name.to_string(),
                message,
            });
        }
    }

    /// Hand `error` to the error handler, if any.
    pub(crate) fn report(&self, error: &Error) {
        if let Some(error_handler) = &self.error_handler {
            error_handler(error);
        }
    }

    /// Run `f` on the container of `type_name`. The dispatcher is locked
    /// while `f` runs.
    pub fn with_container<R>(&self, type_name: &str, f: impl FnOnce(Option<&Container>) -> R) -> R {
        f(self.state.lock().pool.find(type_name))
    }

    /// Run `f` on the container pool. The dispatcher is locked while `f` runs.
    pub fn with_pool<R>(&self, f: impl FnOnce(&ContainerPool) -> R) -> R {
        f(&self.state.lock().pool)
    }

    /// Number of cached instances of `type_name`.
    pub fn container_len(&self, type_name: &str) -> usize {
        self.with_container(type_name, |container| container.map_or(0, Container::len))
    }

    /// Owned copy of the cached entry with the key of `instance`.
    pub fn find_cached(&self, instance: &Struct) -> Option<(Struct, CloneInformation)> {
        self.with_container(instance.type_name(), |container| {
            container
                .and_then(|c| c.find_clone(instance))
                .map(|(cached, info)| (cached.clone(), info.clone()))
        })
    }

    /// Owned copy of every cached entry of `type_name`, in key order.
    pub fn cached(&self, type_name: &str) -> Vec<(Struct, CloneInformation)> {
        self.with_container(type_name, |container| {
            container.map(Container::snapshot).unwrap_or_default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::builder::StructDescriptorBuilder;
    use crate::types::descriptor::FundamentalKind;
    use crate::types::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cached_descriptor() -> Arc<StructDescriptor> {
        StructDescriptorBuilder::new("Entry")
            .cached()
            .key("key", 1, FundamentalKind::UInt32)
            .string_field("value", 2)
            .build_arc()
            .expect("valid descriptor")
    }

    fn uncached_descriptor() -> Arc<StructDescriptor> {
        StructDescriptorBuilder::new("Note")
            .key("id", 1, FundamentalKind::UInt32)
            .build_arc()
            .expect("valid descriptor")
    }

    fn transmission(d: &Arc<StructDescriptor>, key: u32, value: Option<&str>, remove: bool) -> Transmission {
        let mut instance = Struct::new(d);
        instance.put(1, Value::UInt32(key));
        if let Some(value) = value {
            instance.put(2, Value::from(value));
        }
        let header = DotsHeader {
            remove_obj: remove,
            sender: Some(7),
            ..DotsHeader::for_instance(&instance)
        };
        Transmission::new(header, instance)
    }

    #[test]
    fn test_transmission_handlers_run_before_event_handlers() {
        let d = cached_descriptor();
        let dispatcher = Dispatcher::default();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        dispatcher.add_event_handler(&d, Arc::new(move |_: &Event| sink.lock().push("event")));
        let sink = Arc::clone(&order);
        dispatcher.add_transmission_handler(&d, Arc::new(move |_: &Transmission| sink.lock().push("transmission")));

        dispatcher
            .dispatch(&transmission(&d, 1, Some("a"), false))
            .expect("dispatch");
        assert_eq!(*order.lock(), vec!["transmission", "event"]);
    }

    #[test]
    fn test_publish_update_remove_scenario() {
        let d = cached_descriptor();
        let dispatcher = Dispatcher::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        dispatcher.add_event_handler(&d, Arc::new(move |e: &Event| sink.lock().push(e.clone())));

        dispatcher.dispatch(&transmission(&d, 1, Some("a"), false)).expect("create");
        assert_eq!(dispatcher.container_len("Entry"), 1);

        dispatcher.dispatch(&transmission(&d, 1, Some("b"), false)).expect("update");
        assert_eq!(dispatcher.container_len("Entry"), 1);

        dispatcher.dispatch(&transmission(&d, 1, None, true)).expect("remove");
        assert_eq!(dispatcher.container_len("Entry"), 0);

        let events = events.lock();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_create());
        assert!(events[1].is_update());
        assert_eq!(events[1].updated().get("value"), Some(&Value::from("b")));
        assert!(events[2].is_remove());
        assert_eq!(events[2].updated().get("value"), Some(&Value::from("b")));
        assert_eq!(events[2].clone_info().last_operation, Mt::Remove);
    }

    #[test]
    fn test_cache_replay_counts_down() {
        let d = cached_descriptor();
        let dispatcher = Dispatcher::default();
        for key in 0..4 {
            dispatcher
                .dispatch(&transmission(&d, key, Some("x"), false))
                .expect("dispatch");
        }

        let from_cache = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&from_cache);
        dispatcher.add_event_handler(
            &d,
            Arc::new(move |e: &Event| {
                assert!(e.is_create());
                sink.lock().push(e.header().from_cache);
            }),
        );

        assert_eq!(*from_cache.lock(), vec![Some(3), Some(2), Some(1), Some(0)]);

        dispatcher
            .dispatch(&transmission(&d, 9, Some("live"), false))
            .expect("dispatch");
        assert_eq!(from_cache.lock().last(), Some(&None));
    }

    #[test]
    fn test_uncached_remove_fails_without_side_effects() {
        let d = uncached_descriptor();
        let dispatcher = Dispatcher::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.add_transmission_handler(&d, Arc::new(move |_: &Transmission| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        let result = dispatcher.dispatch(&transmission(&d, 1, None, true));
        assert!(matches!(result, Err(Error::UncachedRemove(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(dispatcher.with_pool(ContainerPool::is_empty));
    }

    #[test]
    fn test_uncached_create_event() {
        let d = uncached_descriptor();
        let dispatcher = Dispatcher::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        dispatcher.add_event_handler(&d, Arc::new(move |e: &Event| {
            sink.lock().push((e.mt(), e.clone_info().created_from));
        }));

        dispatcher.dispatch(&transmission(&d, 1, None, false)).expect("dispatch");
        dispatcher.dispatch(&transmission(&d, 1, None, false)).expect("dispatch");
        assert_eq!(*seen.lock(), vec![(Mt::Create, Some(7)), (Mt::Create, Some(7))]);
        assert_eq!(dispatcher.container_len("Note"), 0);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let d = cached_descriptor();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let dispatcher = Dispatcher::new(Some(Arc::new(move |e: &Error| sink.lock().push(e.to_string()))));

        dispatcher.add_event_handler(&d, Arc::new(|_: &Event| panic!("boom")));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.add_event_handler(&d, Arc::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher
            .dispatch(&transmission(&d, 1, Some("a"), false))
            .expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("boom"));
    }

    #[test]
    fn test_remove_unknown_handler() {
        let d = cached_descriptor();
        let dispatcher = Dispatcher::default();
        assert!(matches!(
            dispatcher.remove_event_handler(&d, 42),
            Err(Error::UnknownHandler(_))
        ));

        let id = dispatcher.add_transmission_handler(&d, Arc::new(|_: &Transmission| {}));
        assert!(dispatcher.remove_transmission_handler(&d, id).is_ok());
        assert!(matches!(
            dispatcher.remove_transmission_handler(&d, id),
            Err(Error::UnknownHandler(_))
        ));
        assert!(!dispatcher.has_handlers("Entry"));
    }

    #[test]
    fn test_handler_removed_during_dispatch_is_skipped() {
        let d = cached_descriptor();
        let dispatcher = Arc::new(Dispatcher::default());
        let second_id = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let weak = Arc::downgrade(&dispatcher);
        let target = Arc::clone(&second_id);
        let descriptor = Arc::clone(&d);
        dispatcher.add_event_handler(&d, Arc::new(move |_: &Event| {
            if let (Some(dispatcher), Some(id)) = (weak.upgrade(), *target.lock()) {
                dispatcher
                    .remove_event_handler(&descriptor, id)
                    .expect("registered handler");
            }
        }));

        let counter = Arc::clone(&calls);
        let id = dispatcher.add_event_handler(&d, Arc::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        *second_id.lock() = Some(id);

        dispatcher
            .dispatch(&transmission(&d, 1, Some("a"), false))
            .expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        *second_id.lock() = None;
        dispatcher
            .dispatch(&transmission(&d, 1, Some("b"), false))
            .expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!dispatcher.is_event_handler(d.name(), id));
    }

    #[test]
    fn test_remove_absent_instance_produces_no_event() {
        let d = cached_descriptor();
        let dispatcher = Dispatcher::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        dispatcher.add_event_handler(&d, Arc::new(move |_: &Event| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.dispatch(&transmission(&d, 5, None, true)).expect("dispatch");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
