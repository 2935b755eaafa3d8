//! Wiring of router, sink and lifecycle coordinator.
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::lifecycle::{self, Lifecycle, SourceGuard};
use crate::router::{self, Router};
use crate::sink::{self, Connector, SinkManager, SinkState};
use crate::source::{self, Inputs};

/// Capacity of the entry queue between the forwarding tasks and the sink.
pub const SINK_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("you should enable either logs, stats or events and configure a token for it")]
    NoChannels,
    #[error("invalid routing configuration: {0}")]
    Router(#[from] router::Error),
    #[error(transparent)]
    Lifecycle(#[from] lifecycle::Error),
}

/// A started pipeline.
pub struct Running {
    /// Senders for the started source streams.
    pub inputs: Inputs,
    pub state: watch::Receiver<SinkState>,
    sink: JoinHandle<Result<(), sink::Error>>,
}

impl Running {
    /// Takes the source senders; dropping them ends the sources.
    pub fn take_inputs(&mut self) -> Inputs {
        std::mem::take(&mut self.inputs)
    }

    /// Waits for the sink to finish, i.e. for teardown or a fatal error.
    pub async fn wait(self) -> Result<Result<(), sink::Error>, tokio::task::JoinError> {
        self.sink.await
    }
}

/// Starts forwarding for every enabled channel of `config`.
///
/// No connection is attempted if the configuration is rejected.
///
/// # Errors
///
/// Returns [`Error::NoChannels`] when no channel is enabled with a usable
/// token, and [`Error::Router`] when a pattern does not compile.
pub fn start<C: Connector>(config: &Config, connector: C) -> Result<Running, Error> {
    let channels = config.enabled_channels();
    if channels.is_empty() {
        return Err(Error::NoChannels);
    }
    let router = Arc::new(Router::new(config)?);

    let (manager, teardown) = SinkManager::new(connector);
    let lifecycle = Lifecycle::new(channels.len(), teardown)?;
    let state = manager.subscribe();
    let (entries_tx, entries_rx) = mpsc::channel(SINK_CAPACITY);
    let (ended_tx, ended_rx) = mpsc::unbounded_channel();

    let mut inputs = Inputs::default();
    for channel in channels {
        let (records_tx, records_rx) = mpsc::channel(source::SOURCE_CAPACITY);
        inputs.insert(channel, records_tx);
        tokio::spawn(source::forward(
            channel,
            records_rx,
            Arc::clone(&router),
            entries_tx.clone(),
            SourceGuard::new(channel, ended_tx.clone()),
        ));
        log::debug!("Started {channel} source");
    }
    drop(entries_tx);
    drop(ended_tx);

    tokio::spawn(lifecycle.run(ended_rx));
    let sink = tokio::spawn(manager.run(entries_rx));

    Ok(Running {
        inputs,
        state,
        sink,
    })
}
