use tokio::io::{AsyncBufRead, BufReader};

use error::Error;

/// Creo Shipper: ships container logs, stats and events to a remote ingestion
/// endpoint over a persistent TCP or TLS connection.
///
/// Records from independent source streams are routed to a token (per
/// channel, and per image for logs), formatted as `<token> <payload>\n` and
/// written to a single self-healing connection. The connection is torn down
/// once every source stream has ended.
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod pipeline;
pub mod record;
pub mod router;
pub mod sink;
pub mod source;

/// Runs the shipper, reading newline-delimited JSON records from stdin.
///
/// # Errors
///
/// Possible errors include:
/// - Invalid configuration or no channel with a usable token.
/// - A TLS peer whose certificate is not authorized.
/// - I/O errors while reading stdin.
pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = config::Config::load().map_err(Error::from)?;
    log::debug!(
        "Shipping to {}:{} (secure={})",
        config.server,
        config.port(),
        config.secure
    );

    let connector = sink::EndpointConnector::new(&config).map_err(Error::from)?;
    ship(&config, connector, BufReader::new(tokio::io::stdin())).await?;
    Ok(())
}

/// Ships the records read from `input` until it ends or the sink stops.
///
/// Reading stops as soon as the sink is done, so a fatal sink error is
/// returned even while `input` is still open.
///
/// # Errors
///
/// Returns the startup, sink or input error that stopped shipping.
pub async fn ship<C, R>(config: &config::Config, connector: C, input: R) -> Result<(), Error>
where
    C: sink::Connector,
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut running = pipeline::start(config, connector)?;
    log::info!(
        "Started {} source streams",
        running.inputs.channels().count()
    );

    // Input EOF drops the only senders, which ends every source.
    let reader = tokio::spawn(source::stdin::read_records(input, running.take_inputs()));

    let result = running.wait().await.map_err(Error::Join)?;
    reader.abort();
    match reader.await {
        Ok(Ok(accepted)) => log::debug!("Forwarded {accepted} input records"),
        Ok(Err(err)) => return Err(Error::Input(err)),
        Err(err) if err.is_cancelled() => log::debug!("Stopped reading input"),
        Err(err) => return Err(Error::Join(err)),
    }
    result.map_err(Error::from)
}
