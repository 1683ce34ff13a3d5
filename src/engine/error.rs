use ulid::Ulid;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// The candidate span shares at least one instant with this booking.
    Conflict(Ulid),
    PastStart,
    EndBeforeStart,
    DuplicateNumber(String),
    DuplicateUsername(String),
    InvalidField(&'static str),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with booking: {id}"),
            EngineError::PastStart => write!(f, "start_time is in the past"),
            EngineError::EndBeforeStart => write!(f, "end_time is before start_time"),
            EngineError::DuplicateNumber(n) => write!(f, "room number already taken: {n}"),
            EngineError::DuplicateUsername(u) => write!(f, "username already taken: {u}"),
            EngineError::InvalidField(msg) => write!(f, "{msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
