//! Shutdown coordination across source streams.
//!
//! The [`Lifecycle`] counts the source streams that were started and tears
//! the sink down exactly once, when the last of them has ended.
use tokio::sync::mpsc;

use crate::record::Channel;
use crate::sink::Teardown;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no source stream was started: enable logs, stats or events and give it a token")]
    NoSources,
}

#[derive(Debug)]
pub struct Lifecycle {
    remaining: usize,
    teardown: Option<Teardown>,
}

impl Lifecycle {
    /// Creates a coordinator for `started` source streams.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSources`] if `started` is zero.
    pub fn new(started: usize, teardown: Teardown) -> Result<Self, Error> {
        if started == 0 {
            return Err(Error::NoSources);
        }
        Ok(Self {
            remaining: started,
            teardown: Some(teardown),
        })
    }

    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Records the end of one source stream.
    ///
    /// Returns `true` for the call that tore the sink down.
    pub fn source_ended(&mut self, channel: Channel) -> bool {
        let Some(remaining) = self.remaining.checked_sub(1) else {
            log::warn!("Ignoring end of {channel} source: all sources already ended");
            return false;
        };
        self.remaining = remaining;
        log::debug!("{channel} source ended, {remaining} remaining");
        if remaining > 0 {
            return false;
        }

        match self.teardown.take() {
            Some(teardown) => {
                log::info!("All sources ended, tearing down sink");
                teardown.teardown();
                true
            }
            None => false,
        }
    }

    /// Consumes source termination signals until every source has ended.
    pub async fn run(mut self, mut ended: mpsc::UnboundedReceiver<Channel>) {
        while let Some(channel) = ended.recv().await {
            if self.source_ended(channel) {
                return;
            }
        }
        // Every guard reports before its sender is dropped.
        log::warn!(
            "Termination channel closed with {} sources remaining",
            self.remaining
        );
    }
}

/// Reports the end of a source stream when dropped.
#[derive(Debug)]
pub struct SourceGuard {
    channel: Channel,
    ended: mpsc::UnboundedSender<Channel>,
}

impl SourceGuard {
    pub fn new(channel: Channel, ended: mpsc::UnboundedSender<Channel>) -> Self {
        Self { channel, ended }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        if self.ended.send(self.channel).is_err() {
            log::debug!("Lifecycle gone before {} source ended", self.channel);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::oneshot::error::TryRecvError;

    use super::*;

    #[test]
    fn test_zero_sources_is_rejected() {
        let (teardown, mut torn_down) = Teardown::pair();
        assert!(matches!(Lifecycle::new(0, teardown), Err(Error::NoSources)));
        // The rejected handle is dropped without a command.
        assert!(matches!(torn_down.try_recv(), Err(TryRecvError::Closed)));
    }

    #[test]
    fn test_teardown_after_last_of_three_sources() {
        let (teardown, mut torn_down) = Teardown::pair();
        let mut lifecycle = Lifecycle::new(3, teardown).unwrap();

        assert!(!lifecycle.source_ended(Channel::Logs));
        assert!(matches!(torn_down.try_recv(), Err(TryRecvError::Empty)));
        assert!(!lifecycle.source_ended(Channel::Stats));
        assert!(matches!(torn_down.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(lifecycle.remaining(), 1);

        assert!(lifecycle.source_ended(Channel::Events));
        assert_eq!(lifecycle.remaining(), 0);
        assert!(torn_down.try_recv().is_ok());
    }

    #[test]
    fn test_extra_end_signals_are_ignored() {
        let (teardown, _torn_down) = Teardown::pair();
        let mut lifecycle = Lifecycle::new(1, teardown).unwrap();

        assert!(lifecycle.source_ended(Channel::Logs));
        assert!(!lifecycle.source_ended(Channel::Logs));
        assert_eq!(lifecycle.remaining(), 0);
    }

    #[tokio::test]
    async fn test_run_with_source_guards() {
        let (teardown, mut torn_down) = Teardown::pair();
        let lifecycle = Lifecycle::new(2, teardown).unwrap();
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let coordinator = tokio::spawn(lifecycle.run(ended_rx));

        let logs = SourceGuard::new(Channel::Logs, ended_tx.clone());
        let stats = SourceGuard::new(Channel::Stats, ended_tx);

        drop(logs);
        tokio::task::yield_now().await;
        assert!(!coordinator.is_finished());
        assert!(matches!(torn_down.try_recv(), Err(TryRecvError::Empty)));

        // A panicking source still reports through its guard.
        let panicked = tokio::spawn(async move {
            let _stats = stats;
            panic!("source failed");
        });
        assert!(panicked.await.is_err());

        tokio::time::timeout(Duration::from_secs(5), coordinator)
            .await
            .unwrap()
            .unwrap();
        assert!(torn_down.try_recv().is_ok());
    }
}
