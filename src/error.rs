use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("malformed grid: {0}")]
    MalformedGrid(String),

    #[error("map '{0}' no longer exists")]
    MapNotFound(String),

    #[error("room '{0}' no longer exists")]
    RoomNotFound(String),

    #[error("room '{0}' already exists")]
    RoomAlreadyExists(String),

    #[error("room '{0}' is closing")]
    RoomClosed(String),

    #[error("room '{0}' refused the join")]
    JoinRefused(String),
}
