use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Mutex, MutexGuard, PoisonError};

use mpackrpc_codec::destroy;
use tracing::debug;

use crate::error::{ClientError, Result};

/// What a waiting caller receives: the response's result, or why there is none.
pub type Reply = Result<mpackrpc_codec::Value>;

enum Slot {
    Waiter(SyncSender<Reply>),
    /// Fire-and-forget request; the response is torn down on arrival.
    Discard,
}

/// In-flight requests keyed by `(channel, sequence)`.
///
/// The lock is only held for map operations, never while a caller waits.
#[derive(Default)]
pub struct PendingTable {
    slots: Mutex<HashMap<(u16, u32), Slot>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller and return the one-shot receiver it waits on.
    pub fn insert_waiter(&self, channel: u16, sequence: u32) -> Receiver<Reply> {
        let (tx, rx) = sync_channel(1);
        self.lock().insert((channel, sequence), Slot::Waiter(tx));
        rx
    }

    pub fn insert_discard(&self, channel: u16, sequence: u32) {
        self.lock().insert((channel, sequence), Slot::Discard);
    }

    /// Hand `reply` to whoever is waiting for it.
    ///
    /// Returns `false` when nothing is pending under this key; the reply is
    /// released in that case.
    pub fn complete(&self, channel: u16, sequence: u32, reply: Reply) -> bool {
        let slot = self.lock().remove(&(channel, sequence));
        match slot {
            Some(Slot::Waiter(tx)) => {
                // The caller may have given up between our removal and now.
                if let Err(TrySendError::Full(unsent) | TrySendError::Disconnected(unsent)) =
                    tx.try_send(reply)
                {
                    release(unsent);
                }
                true
            }
            Some(Slot::Discard) => {
                debug!(channel, sequence, "discarding response");
                release(reply);
                true
            }
            None => {
                release(reply);
                false
            }
        }
    }

    /// Drop an entry, e.g. after a timeout. Returns whether it was present.
    pub fn remove(&self, channel: u16, sequence: u32) -> bool {
        self.lock().remove(&(channel, sequence)).is_some()
    }

    /// Fail every request pending on `channel` with `ChannelClosed`.
    pub fn fail_channel(&self, channel: u16) -> usize {
        let failed: Vec<Slot> = {
            let mut slots = self.lock();
            let keys: Vec<(u16, u32)> = slots
                .keys()
                .filter(|(ch, _)| *ch == channel)
                .copied()
                .collect();
            keys.iter().filter_map(|key| slots.remove(key)).collect()
        };

        let count = failed.len();
        for slot in failed {
            if let Slot::Waiter(tx) = slot {
                let _ = tx.try_send(Err(ClientError::ChannelClosed(channel)));
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<(u16, u32), Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn release(reply: Reply) {
    if let Ok(value) = reply {
        destroy(value);
    }
}
