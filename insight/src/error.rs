use thiserror::Error;

/// Rejected tracer configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// More IPv4 destinations than the kernel allow-list holds.
    #[error("{got} IPv4 destinations given, at most {max} can be allow-listed")]
    TooManyV4 { got: usize, max: usize },

    #[error("{got} IPv6 destinations given, at most {max} can be allow-listed")]
    TooManyV6 { got: usize, max: usize },

    /// An empty prefix would intercept every deletion on the system.
    #[error("unlink directory must not be empty")]
    EmptyDirectory,

    /// The prefix plus its terminator must fit the kernel buffer.
    #[error("unlink directory is {len} bytes, at most {max} fit")]
    DirectoryTooLong { len: usize, max: usize },

    #[error("unlink directory contains a NUL byte")]
    DirectoryContainsNul,

    #[error("mysql port must be nonzero")]
    ZeroPort,
}
