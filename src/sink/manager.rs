use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::router::Entry;

use super::{ConnectError, Connector, Error};

/// Upper bound for writing queued entries and closing the connection on
/// teardown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    Disconnected,
    Connecting,
    Connected,
    TornDown,
}

/// One-shot teardown command for a [`SinkManager`].
#[derive(Debug)]
pub struct Teardown(oneshot::Sender<()>);

impl Teardown {
    pub(crate) fn pair() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    /// Disables reconnection and closes the current connection.
    pub fn teardown(self) {
        // The manager may already be gone after a fatal error.
        let _ = self.0.send(());
    }
}

enum Outcome {
    Disconnected,
    TornDown,
}

enum Next {
    Teardown,
    Entry(Option<Entry>),
    Peer(io::Result<usize>),
}

pub struct SinkManager<C> {
    connector: C,
    state: watch::Sender<SinkState>,
    teardown: oneshot::Receiver<()>,
    connections: u64,
}

impl<C: Connector> SinkManager<C> {
    pub fn new(connector: C) -> (Self, Teardown) {
        let (handle, teardown) = Teardown::pair();
        let (state, _) = watch::channel(SinkState::Disconnected);
        (
            Self {
                connector,
                state,
                teardown,
                connections: 0,
            },
            handle,
        )
    }

    pub fn subscribe(&self) -> watch::Receiver<SinkState> {
        self.state.subscribe()
    }

    /// Writes `entries` to the endpoint until teardown.
    ///
    /// Entries that were already queued when teardown is requested are still
    /// delivered: if no connection is open at that point, one more attempt is
    /// made, bounded by the drain timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Unauthorized`] if the peer certificate is rejected;
    /// no reconnect is attempted in that case.
    pub async fn run(mut self, mut entries: mpsc::Receiver<Entry>) -> Result<(), Error> {
        let mut pending: Option<Vec<u8>> = None;
        let mut tearing_down = false;
        loop {
            self.transition(SinkState::Connecting);
            let attempt = {
                let connect = self.connector.connect();
                tokio::pin!(connect);
                if tearing_down {
                    bounded("connecting to deliver queued entries", &mut connect).await
                } else {
                    tokio::select! {
                        biased;
                        _ = &mut self.teardown => {
                            tearing_down = true;
                            if pending.is_none() && entries.is_empty() {
                                None
                            } else {
                                log::debug!("Teardown while connecting, delivering queued entries");
                                bounded("connecting to deliver queued entries", &mut connect).await
                            }
                        }
                        result = &mut connect => Some(result),
                    }
                }
            };
            let stream = match attempt {
                None => break,
                Some(Ok(stream)) => stream,
                Some(Err(ConnectError::Unauthorized { server, source })) => {
                    log::error!("Secure connection to `{server}` not authorized: {source}");
                    self.transition(SinkState::TornDown);
                    return Err(Error::Unauthorized { server, source });
                }
                Some(Err(err)) => {
                    log::warn!("{err}");
                    self.transition(SinkState::Disconnected);
                    if tearing_down {
                        break;
                    }
                    tokio::task::yield_now().await;
                    continue;
                }
            };

            self.connections += 1;
            log::info!("Connected to sink (connection #{})", self.connections);
            self.transition(SinkState::Connected);
            if tearing_down {
                deliver_backlog(stream, &mut entries, &mut pending).await;
                break;
            }
            match self.forward(stream, &mut entries, &mut pending).await {
                Outcome::Disconnected => self.transition(SinkState::Disconnected),
                Outcome::TornDown => break,
            }
        }

        entries.close();
        let discarded = entries.len() + usize::from(pending.is_some());
        if discarded > 0 {
            log::warn!("Dropping {discarded} undelivered entries on teardown");
        }
        self.transition(SinkState::TornDown);
        log::info!("Sink torn down after {} connections", self.connections);
        Ok(())
    }

    async fn forward(
        &mut self,
        stream: C::Stream,
        entries: &mut mpsc::Receiver<Entry>,
        pending: &mut Option<Vec<u8>>,
    ) -> Outcome {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let mut scratch = [0u8; 512];
        loop {
            let bytes = match pending.take() {
                Some(bytes) => bytes,
                None => {
                    let next = tokio::select! {
                        biased;
                        _ = &mut self.teardown => Next::Teardown,
                        entry = entries.recv() => Next::Entry(entry),
                        read = reader.read(&mut scratch) => Next::Peer(read),
                    };
                    match next {
                        Next::Teardown => {
                            drain(entries, &mut writer).await;
                            return Outcome::TornDown;
                        }
                        Next::Entry(Some(entry)) => entry.to_bytes(),
                        Next::Entry(None) => {
                            log::debug!("All entry producers are gone, waiting for teardown");
                            if let Err(err) = writer.flush().await {
                                log::warn!("Failed to flush sink connection: {err}");
                            }
                            let _ = (&mut self.teardown).await;
                            close(&mut writer).await;
                            return Outcome::TornDown;
                        }
                        Next::Peer(Ok(0)) => {
                            log::warn!("Sink connection closed by peer");
                            return Outcome::Disconnected;
                        }
                        Next::Peer(Ok(n)) => {
                            log::trace!("Discarding {n} bytes received from sink");
                            continue;
                        }
                        Next::Peer(Err(err)) => {
                            log::warn!("Sink connection failed: {err}");
                            return Outcome::Disconnected;
                        }
                    }
                }
            };

            // A write is never abandoned halfway: on teardown it is finished
            // within the drain timeout so the stream stays line aligned.
            let (written, torn_down) = {
                let write = write_entry(&mut writer, &bytes);
                tokio::pin!(write);
                tokio::select! {
                    biased;
                    _ = &mut self.teardown => {
                        let finished = tokio::time::timeout(DRAIN_TIMEOUT, &mut write)
                            .await
                            .unwrap_or_else(|_| Err(io::ErrorKind::TimedOut.into()));
                        (finished, true)
                    }
                    result = &mut write => (result, false),
                }
            };
            match (written, torn_down) {
                (Ok(()), false) => {}
                (Ok(()), true) => {
                    drain(entries, &mut writer).await;
                    return Outcome::TornDown;
                }
                (Err(err), false) => {
                    log::warn!("Failed to write to sink: {err}");
                    *pending = Some(bytes);
                    return Outcome::Disconnected;
                }
                (Err(err), true) => {
                    // The entry may be partially written; nothing else can
                    // follow it on this connection.
                    log::warn!("Failed to finish write on teardown: {err}");
                    *pending = Some(bytes);
                    close(&mut writer).await;
                    return Outcome::TornDown;
                }
            }
        }
    }

    fn transition(&self, next: SinkState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            log::debug!("Sink state {previous:?} -> {next:?}");
        }
    }
}

/// Awaits `fut` for at most the drain timeout.
async fn bounded<F: Future>(what: &str, fut: F) -> Option<F::Output> {
    match tokio::time::timeout(DRAIN_TIMEOUT, fut).await {
        Ok(output) => Some(output),
        Err(_) => {
            log::warn!("Timed out {what}");
            None
        }
    }
}

async fn write_entry<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &[u8]) -> io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// Writes the pending entry and everything queued on a connection opened
/// after teardown, then closes it.
async fn deliver_backlog<W: AsyncWrite + Unpin>(
    mut writer: W,
    entries: &mut mpsc::Receiver<Entry>,
    pending: &mut Option<Vec<u8>>,
) {
    if let Some(bytes) = pending.as_deref() {
        match tokio::time::timeout(DRAIN_TIMEOUT, write_entry(&mut writer, bytes)).await {
            Ok(Ok(())) => *pending = None,
            Ok(Err(err)) => {
                log::warn!("Failed to write pending entry on teardown: {err}");
                close(&mut writer).await;
                return;
            }
            Err(_) => {
                log::warn!("Timed out writing pending entry on teardown");
                close(&mut writer).await;
                return;
            }
        }
    }
    drain(entries, &mut writer).await;
}

/// Writes entries already queued, then closes the connection.
async fn drain<W: AsyncWrite + Unpin>(entries: &mut mpsc::Receiver<Entry>, writer: &mut W) {
    entries.close();
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        let mut count = 0usize;
        while let Ok(entry) = entries.try_recv() {
            writer.write_all(&entry.to_bytes()).await?;
            count += 1;
        }
        writer.flush().await?;
        Ok::<_, io::Error>(count)
    })
    .await;
    match drained {
        Ok(Ok(count)) => log::debug!("Drained {count} queued entries"),
        Ok(Err(err)) => log::warn!("Failed to drain queued entries: {err}"),
        Err(_) => log::warn!("Timed out draining queued entries"),
    }
    close(writer).await;
}

async fn close<W: AsyncWrite + Unpin>(writer: &mut W) {
    match tokio::time::timeout(DRAIN_TIMEOUT, writer.shutdown()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::debug!("Failed to shut down sink connection: {err}"),
        Err(_) => log::debug!("Timed out shutting down sink connection"),
    }
}
