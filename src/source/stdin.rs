//! Newline-delimited JSON records on an async reader.
//!
//! ```text
//! {"kind":"log","time":1620000000000,"name":"web-1","image":"nginx","line":"hello"}
//! {"kind":"stats","stats":{"cpu":12}}
//! {"kind":"event","status":"die","id":"4f2a"}
//! ```
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::error::ResultOkLogExt;
use crate::record::Record;

use super::Inputs;

#[derive(Debug, thiserror::Error)]
#[error("malformed record on line {line}: {source}")]
pub struct MalformedRecord {
    line: u64,
    #[source]
    source: serde_json::Error,
}

/// Reads records until EOF, then drops `inputs` so every source ends.
///
/// Returns the number of records that were accepted by a started channel.
pub async fn read_records<R>(reader: R, inputs: Inputs) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut number = 0u64;
    let mut accepted = 0u64;
    while let Some(line) = lines.next_line().await? {
        number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let Some(record) = serde_json::from_str::<Record>(&line)
            .map_err(|source| MalformedRecord {
                line: number,
                source,
            })
            .ok_log()
        else {
            continue;
        };
        if inputs.dispatch(record).await {
            accepted += 1;
        }
    }
    log::debug!("Input ended after {number} lines ({accepted} records accepted)");
    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::record::Channel;

    #[tokio::test]
    async fn test_reads_and_dispatches_records() {
        let input = br#"{"kind":"log","time":1620000000000,"name":"web-1","image":"nginx","line":"hello"}

not json
{"kind":"stats","stats":{"cpu":12}}
{"kind":"event","status":"die"}
"#;
        let (logs_tx, mut logs_rx) = mpsc::channel(8);
        let (stats_tx, mut stats_rx) = mpsc::channel(8);
        let mut inputs = Inputs::default();
        inputs.insert(Channel::Logs, logs_tx);
        inputs.insert(Channel::Stats, stats_tx);

        let accepted = read_records(&input[..], inputs).await.unwrap();
        assert_eq!(accepted, 2);

        match logs_rx.recv().await.unwrap() {
            Record::Log(log) => assert_eq!(log.line, "hello"),
            other => panic!("unexpected record: {other:?}"),
        }
        assert_eq!(stats_rx.recv().await.unwrap().channel(), Channel::Stats);

        // Both sources end once the input is exhausted.
        assert!(logs_rx.recv().await.is_none());
        assert!(stats_rx.recv().await.is_none());
    }
}
