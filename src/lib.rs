//! Scheduled PostgreSQL backups to S3-compatible object storage.
//!
//! pgstash is a single-shot batch job: it enumerates the databases on one
//! server, dumps each with `pg_dump`, optionally encrypts the dump, uploads
//! it under a deterministic object key, and finally prunes aged backups of
//! databases that are still present — backups of dropped databases are kept
//! forever. Each run is stateless; every decision derives from the current
//! roster and the current storage listing.
//!
//! Module map:
//!
//! - [`config`] - Environment-driven configuration resolution
//! - [`postgres`] - Database roster and server-version queries
//! - [`dump`] - `pg_dump` invocation producing gzipped artifacts
//! - [`encrypt`] - OpenSSL-compatible AES-256-CBC artifact encryption
//! - [`storage`] - Object storage backends (S3 and in-memory)
//! - [`keys`] - The object-key naming grammar
//! - [`pipeline`] - The sequential dump-encrypt-upload loop
//! - [`retention`] - Planning and execution of backup pruning
//! - [`runner`] - One full run, start to finish

pub mod config;
pub mod constants;
pub mod dump;
pub mod encrypt;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod postgres;
pub mod retention;
pub mod runner;
pub mod storage;
pub mod ui;
pub mod utils;
