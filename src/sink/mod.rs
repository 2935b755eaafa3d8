//! Delivery of routed entries to the ingestion endpoint.
//!
//! The [`SinkManager`] owns the single outbound connection. It runs an
//! explicit state machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -(error | close)-> Disconnected -> ...
//!                                                       teardown -> TornDown
//! ```
//!
//! Transport failures are absorbed and followed by an immediate reconnect.
//! A peer certificate that is not authorized ends the sink with an error
//! instead. The loop only stops for good once [`Teardown::teardown`] is
//! called (or the [`Teardown`] handle is dropped).
mod error;
mod manager;
mod transport;

pub use error::{ConnectError, Error};
pub use manager::{SinkManager, SinkState, Teardown};
pub use transport::{Connector, EndpointConnector, Transport};
