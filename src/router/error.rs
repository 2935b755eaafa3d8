#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid token pattern `{pattern}`: {source}")]
    TokenPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid label pattern `{pattern}`: {source}")]
    LabelPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
