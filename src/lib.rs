//! Deckhand turns a declarative `deckhand.yml` into container-service API
//! calls.
//!
//! The config is loaded into a raw tree, interpolated in ordered processor
//! passes (`${terraform.*}` from remote Terraform state, then `${env.*}`
//! from env files), converted into API request payloads by adapters, and
//! deployments are followed by waiters that poll until the service settles.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (show, validate, render).
//! - [`config`] -- Document loading, validation and the
//!   [`ConfigResolver`](config::ConfigResolver) interpolation passes.
//! - [`state`] -- Terraform remote state: object storage and managed
//!   service backends, schema-version dispatch and output lookup.
//! - [`http`] -- Shared hyper-rustls client for the managed state service.
//! - [`adapters`] -- Fragment to payload conversion behind the
//!   [`AdapterRegistry`](adapters::AdapterRegistry).
//! - [`waiter`] -- Acceptor-driven polling with observer hooks.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |
//! | `s3` | S3 remote state backend _(enabled by default)_ |
//! | `file-formats` | All config file formats |
//! | `full` | All features |

// Binary crate: public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod adapters;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod state;
pub mod waiter;
