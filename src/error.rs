use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed precondition: {0}")]
    FailedPrecondition(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    #[error("Missing debug info in {path}. Compile with -g or point --memprof-profiled-binary-dwarf at the split debug file")]
    MissingDebugInfo { path: String },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// Exit codes reported by the binary.
pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const MISSING_DEBUG_INFO: i32 = 5;
    pub const PARSE_ERROR: i32 = 6;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => exit_code::INVALID_ARGUMENTS,
            Error::NotFound(_) => exit_code::NOT_FOUND,
            Error::MissingDebugInfo { .. } => exit_code::MISSING_DEBUG_INFO,
            Error::Parse { .. } => exit_code::PARSE_ERROR,
            _ => exit_code::GENERAL_ERROR,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_map_by_kind() {
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), 2);
        assert_eq!(Error::NotFound("x".into()).exit_code(), 3);
        assert_eq!(Error::Internal("x".into()).exit_code(), 1);
        assert_eq!(
            Error::MissingDebugInfo { path: "a.out".into() }.exit_code(),
            5
        );
    }
}
