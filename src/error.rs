pub trait ResultOkLogExt<T, E> {
    /// Converts into an [`Option`], logging the error as a warning.
    fn ok_log(self) -> Option<T>;
}

impl<T, E> ResultOkLogExt<T, E> for std::result::Result<T, E>
where
    E: std::error::Error,
{
    fn ok_log(self) -> Option<T> {
        match self {
            Ok(ok) => Some(ok),
            Err(err) => {
                log::warn!("{err}");
                None
            }
        }
    }
}

/// Errors that stop the shipper before or while it runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] crate::config::Error),
    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::Error),
    #[error(transparent)]
    Sink(#[from] crate::sink::Error),
    #[error("failed to read records from stdin: {0}")]
    Input(#[source] std::io::Error),
    #[error("sink task failed: {0}")]
    Join(#[source] tokio::task::JoinError),
}
