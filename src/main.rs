/// Entry point for the Creo Shipper.
///
/// This binary reads newline-delimited JSON records from stdin, routes each one
/// to a token and writes `<token> <payload>` lines to the configured ingestion
/// endpoint. It exits once stdin is exhausted and the connection is torn down.
///
/// # Errors
///
/// Returns an error if initialization fails (e.g., missing environment variables,
/// an invalid token pattern, or an endpoint rejecting the TLS handshake).
///
/// # Examples
///
/// ```bash
/// SHIPPER_SERVER=ingest.example.com SHIPPER_SECURE=true SHIPPER_LOGS_TOKEN=abc cargo run < records.ndjson
/// ```
fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let result = runtime.block_on(creo_shipper::run());
    // A stdin read in progress cannot be cancelled; do not wait for it.
    runtime.shutdown_background();
    result
}
