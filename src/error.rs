use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid profile fields. Fatal before any row is read.
    #[error("config error: {0}")]
    Config(String),
    #[error("{ctx}: {source}")]
    Io {
        ctx: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{ctx}: {source}")]
    Json {
        ctx: String,
        #[source]
        source: serde_json::Error,
    },
    /// Non-fatal: the pipeline falls back to the built-in mutator.
    #[error("plugin load failed: {0}")]
    PluginLoad(String),
    /// Non-fatal: rejected plugin output, recovered per row.
    #[error("mutation output rejected: {0}")]
    MutationOutput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn io(ctx: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            ctx: ctx.into(),
            source,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::PluginLoad(_) | Error::MutationOutput(_))
    }
}
