//! Shared defaults for configuration resolution.

/// Storage region used when `S3_REGION` is not set.
pub const DEFAULT_S3_REGION: &str = "us-west-1";

/// Object-key prefix used when `S3_PREFIX` is not set.
pub const DEFAULT_S3_PREFIX: &str = "backup";

/// Server port used when `POSTGRES_PORT` is not set.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
