use std::fmt;
use thiserror::Error;

/// Result type alias for CP/M disk operations
pub type Result<T> = std::result::Result<T, CpmError>;

/// Disk resource that can run out during allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    /// Free data blocks
    Blocks,
    /// Free directory entry slots
    DirectoryEntries,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Blocks => write!(f, "blocks"),
            Resource::DirectoryEntries => write!(f, "directory entries"),
        }
    }
}

/// Errors that can occur when working with CP/M disk images
#[derive(Debug, Error)]
pub enum CpmError {
    /// I/O error from the buffer's backing store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unrecognized on-disk format
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Disk parameters failed validation
    #[error("Invalid disk parameters: {0}")]
    InvalidParameters(String),

    /// A file with the same name already exists for the user
    #[error("File already exists: {user}:{name}")]
    FileAlreadyExists {
        /// User number
        user: u8,
        /// File name
        name: String,
    },

    /// No file with the name exists for the user
    #[error("File not found: {user}:{name}")]
    FileNotFound {
        /// User number
        user: u8,
        /// File name
        name: String,
    },

    /// Not enough free blocks or directory entries
    #[error("Allocation exhausted: {needed} {resource} needed, {available} available")]
    AllocationExhausted {
        /// What ran out
        resource: Resource,
        /// How many were required
        needed: usize,
        /// How many were free
        available: usize,
    },

    /// Invalid filename
    #[error("Invalid filename: {0}")]
    InvalidFilename(String),

    /// User number outside 0-31
    #[error("Invalid user number: {0} (max: 31)")]
    InvalidUser(u8),

    /// Access beyond the end of the buffer
    #[error("Out of bounds: {len} bytes at offset {offset} (size: {size})")]
    OutOfBounds {
        /// Byte offset of the access
        offset: usize,
        /// Length of the access
        len: usize,
        /// Size of the buffer
        size: usize,
    },
}

impl CpmError {
    /// Create an invalid format error
    pub fn invalid_format<S: Into<String>>(message: S) -> Self {
        CpmError::InvalidFormat(message.into())
    }

    /// Create an invalid parameters error
    pub fn parameters<S: Into<String>>(message: S) -> Self {
        CpmError::InvalidParameters(message.into())
    }

    /// Create a file not found error
    pub fn not_found<S: Into<String>>(user: u8, name: S) -> Self {
        CpmError::FileNotFound {
            user,
            name: name.into(),
        }
    }
}
