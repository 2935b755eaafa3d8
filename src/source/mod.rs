//! Source streams feeding the router.
//!
//! Each started channel gets one bounded record channel. Adapters push into
//! it through [`Inputs`]; a forwarding task routes every record and hands
//! the entry to the sink in arrival order. Dropping the adapter's sender ends
//! the source.
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::lifecycle::SourceGuard;
use crate::record::{Channel, Record};
use crate::router::{Entry, Router};

pub mod stdin;

/// Capacity of each per-channel record queue.
pub const SOURCE_CAPACITY: usize = 64;

/// Senders for the record streams that were started.
#[derive(Debug, Default)]
pub struct Inputs {
    senders: HashMap<Channel, mpsc::Sender<Record>>,
}

impl Inputs {
    pub(crate) fn insert(&mut self, channel: Channel, sender: mpsc::Sender<Record>) {
        self.senders.insert(channel, sender);
    }

    pub fn channels(&self) -> impl Iterator<Item = Channel> + '_ {
        self.senders.keys().copied()
    }

    pub fn sender(&self, channel: Channel) -> Option<&mpsc::Sender<Record>> {
        self.senders.get(&channel)
    }

    /// Hands `record` to the stream of its channel.
    ///
    /// Returns `false` if that channel was not started or has already
    /// ended; the record is discarded.
    pub async fn dispatch(&self, record: Record) -> bool {
        let channel = record.channel();
        match self.senders.get(&channel) {
            Some(sender) => sender.send(record).await.is_ok(),
            None => {
                log::trace!("Discarding record for disabled {channel} channel");
                false
            }
        }
    }
}

/// Routes records of one source until it ends.
pub async fn forward(
    channel: Channel,
    mut records: mpsc::Receiver<Record>,
    router: Arc<Router>,
    entries: mpsc::Sender<Entry>,
    guard: SourceGuard,
) {
    let mut routed = 0u64;
    while let Some(record) = records.recv().await {
        let Some(entry) = router.route(record) else {
            continue;
        };
        if entries.send(entry).await.is_err() {
            log::debug!("Sink gone, stopping {channel} source");
            break;
        }
        routed += 1;
    }
    log::debug!("{channel} source finished after {routed} entries");
    drop(guard);
}
