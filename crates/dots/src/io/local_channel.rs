// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process channel.
//!
//! Two linked endpoints exchange transmissions through crossbeam queues.
//! Instances are rebound to the receiver's registry on arrival, restricted
//! to the properties the header announces, the way a serialization round
//! trip would.

use crate::error::{Error, Result};
use crate::io::channel::Channel;
use crate::io::header::{DotsHeader, Transmission};
use crate::types::registry::Registry;
use crate::types::structure::Struct;
use crossbeam::channel::{unbounded, Receiver, Sender, TryRecvError};

const LOCAL_ENDPOINT: &str = "local:/";

type Frame = (DotsHeader, Struct);

/// One endpoint of a linked in-process channel pair.
#[derive(Debug)]
pub struct LocalChannel {
    tx: Option<Sender<Frame>>,
    rx: Receiver<Frame>,
}

impl LocalChannel {
    /// Create two endpoints linked to each other.
    pub fn pair() -> (LocalChannel, LocalChannel) {
        let (a_tx, b_rx) = unbounded();
        let (b_tx, a_rx) = unbounded();

        (
            LocalChannel {
                tx: Some(a_tx),
                rx: a_rx,
            },
            LocalChannel {
                tx: Some(b_tx),
                rx: b_rx,
            },
        )
    }

    /// Number of transmissions waiting to be received.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl Channel for LocalChannel {
    fn transmit_raw(&mut self, header: &DotsHeader, instance: &Struct) -> Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::connection("attempt to transmit on closed local channel"))?;

        tx.send((header.clone(), instance.clone()))
            .map_err(|_| Error::connection("local channel is not linked or expired unexpectedly"))
    }

    fn receive_raw(&mut self, registry: &Registry) -> Result<Option<Transmission>> {
        let (header, instance) = match self.rx.try_recv() {
            Ok(frame) => frame,
            Err(TryRecvError::Empty) => return Ok(None),
            Err(TryRecvError::Disconnected) => {
                return Err(Error::connection("linked local channel expired unexpectedly"))
            }
        };

        let descriptor = registry
            .find_struct_type(&header.type_name)
            .ok_or_else(|| Error::connection(format!("encountered unknown type: {}", header.type_name)))?;

        let instance = instance.rebind(&descriptor, header.attributes)?;
        Ok(Some(Transmission::new(header, instance)))
    }

    fn local_endpoint(&self) -> &str {
        LOCAL_ENDPOINT
    }

    fn remote_endpoint(&self) -> &str {
        LOCAL_ENDPOINT
    }

    fn close(&mut self) {
        self.tx = None;
    }
}
