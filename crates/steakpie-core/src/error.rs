use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no config file found\n\n\
             Place a config.yml (or config.yaml) in the current directory.\n\n\
             Example:\n  WEBHOOK_SECRET=secret steakpie\n\n\
             Optional environment variables:\n  DB_PATH - Path to SQLite database (default: db.sqlite)")]
    ConfigNotFound,

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    ConfigParse(#[source] serde_yaml::Error),

    #[error("config file is empty")]
    EmptyConfig,

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("event store error: {0}")]
    Store(String),

    #[error("event store task failed: {0}")]
    StoreTask(String),
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
