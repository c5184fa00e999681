// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RAII subscription guards.

use crate::error::Result;
use crate::io::dispatcher::{Dispatcher, HandlerId};
use crate::types::descriptor::StructDescriptor;
use std::sync::{Arc, Weak};

/// What a [`Subscription`] is registered for.
#[derive(Debug, Clone)]
pub enum SubscriptionKind {
    Transmission(Arc<StructDescriptor>),
    Event(Arc<StructDescriptor>),
    NewType,
}

impl SubscriptionKind {
    pub fn type_name(&self) -> Option<&str> {
        match self {
            Self::Transmission(d) | Self::Event(d) => Some(d.name()),
            Self::NewType => None,
        }
    }
}

/// Owner of the handlers a [`Subscription`] refers to.
pub trait Unsubscribe: Send + Sync {
    fn unsubscribe(&self, kind: &SubscriptionKind, id: HandlerId) -> Result<()>;
}

impl Unsubscribe for Dispatcher {
    fn unsubscribe(&self, kind: &SubscriptionKind, id: HandlerId) -> Result<()> {
        match kind {
            SubscriptionKind::Transmission(d) => self.remove_transmission_handler(d, id),
            SubscriptionKind::Event(d) => self.remove_event_handler(d, id),
            SubscriptionKind::NewType => Ok(()),
        }
    }
}

/// Handle of a registered handler.
///
/// Dropping the subscription removes the handler. The owner is referenced
/// weakly: if it is already gone, dropping does nothing. It is safe to drop
/// a subscription from inside its own handler.
#[must_use = "dropping a subscription removes its handler"]
pub struct Subscription {
    owner: Weak<dyn Unsubscribe>,
    kind: SubscriptionKind,
    id: HandlerId,
    active: bool,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(owner: Weak<dyn Unsubscribe>, kind: SubscriptionKind, id: HandlerId) -> Self {
        Self {
            owner,
            kind,
            id,
            active: true,
        }
    }

    pub fn id(&self) -> HandlerId {
        self.id
    }

    pub fn kind(&self) -> &SubscriptionKind {
        &self.kind
    }

    /// True until the subscription is unsubscribed or discarded.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Remove the handler now. Later calls do nothing.
    pub fn unsubscribe(&mut self) {
        if !std::mem::replace(&mut self.active, false) {
            return;
        }

        let Some(owner) = self.owner.upgrade() else {
            return;
        };

        if let Err(e) = owner.unsubscribe(&self.kind, self.id) {
            log::warn!("[subscription] failed to unsubscribe handler {}: {}", self.id, e);
        }
    }

    /// Detach the guard: the handler stays registered for the lifetime of
    /// its owner.
    pub fn discard(mut self) {
        self.active = false;
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
