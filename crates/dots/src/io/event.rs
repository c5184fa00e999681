// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Cache-aware events delivered to event handlers.

use crate::error::Result;
use crate::io::container::{CloneInformation, Mt};
use crate::io::header::DotsHeader;
use crate::system::Record;
use crate::types::descriptor::StructDescriptor;
use crate::types::structure::Struct;
use std::sync::Arc;

/// Outcome of one dispatched transmission for a single instance.
///
/// `transmitted` is the instance as received, `updated` the cached state
/// after applying it. For removals `updated` is the detached cache entry with
/// the removal's attributes merged in. For uncached types both are the
/// received instance.
#[derive(Debug, Clone)]
pub struct Event {
    header: DotsHeader,
    transmitted: Struct,
    updated: Struct,
    clone_info: CloneInformation,
    mt: Mt,
}

impl Event {
    pub(crate) fn new(
        header: DotsHeader,
        transmitted: Struct,
        updated: Struct,
        clone_info: CloneInformation,
        mt: Mt,
    ) -> Self {
        Self {
            header,
            transmitted,
            updated,
            clone_info,
            mt,
        }
    }

    pub fn header(&self) -> &DotsHeader {
        &self.header
    }

    pub fn transmitted(&self) -> &Struct {
        &self.transmitted
    }

    pub fn updated(&self) -> &Struct {
        &self.updated
    }

    pub fn clone_info(&self) -> &CloneInformation {
        &self.clone_info
    }

    pub fn mt(&self) -> Mt {
        self.mt
    }

    pub fn descriptor(&self) -> &Arc<StructDescriptor> {
        self.updated.descriptor()
    }

    pub fn is_create(&self) -> bool {
        self.mt == Mt::Create
    }

    pub fn is_update(&self) -> bool {
        self.mt == Mt::Update
    }

    pub fn is_remove(&self) -> bool {
        self.mt == Mt::Remove
    }

    pub fn is_from_myself(&self) -> bool {
        self.header.is_from_myself
    }

    /// Typed view of the updated instance.
    pub fn record<T: Record>(&self) -> Result<T> {
        T::from_struct(&self.updated)
    }
}
