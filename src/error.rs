/// Error returned when a record could not be queued for delivery.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("log channel full, record dropped")]
    ChannelFull,

    #[error("log dispatcher has shut down")]
    Closed,
}

/// Error returned when parsing a logging level name.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown logging level: {0}")]
pub struct LevelParseError(pub String);

/// Error returned when reading configuration from the environment.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Level(#[from] LevelParseError),

    #[error("invalid value for {key}: {value}")]
    InvalidNumber { key: &'static str, value: String },
}

/// Error returned when installing the global subscriber.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    SubscriberAlreadySet(#[from] tracing::subscriber::SetGlobalDefaultError),
}
