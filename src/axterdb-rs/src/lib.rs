//! AxterDB Client Library
//!
//! HTTP client for connecting to an AxterDB instance. A [`Client`] checks the
//! instance and the key's access rights on [`Client::connect`], then issues
//! key-authenticated requests for table and row operations.

mod admin;
mod client;

pub use admin::AdminClient;
pub use axterdb_core::{ClientConfig, ColumnType, Row, RowValues, TableSchema};
pub use client::{Client, ClientBuilder, ConnectionState};

use axterdb_core::SchemaError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{host} is not a valid instance IP")]
    InvalidInstanceIp { host: String },

    #[error("Failed connecting to {host} with key {key}")]
    ConnectionFailure { host: String, key: String },

    #[error("You are already connected to {name}! (Instance: {host} | Key: {key})")]
    AlreadyConnected {
        host: String,
        name: String,
        key: String,
    },

    #[error("You aren't connected to the database!")]
    NotConnected,

    #[error("Specified key is invalid.")]
    InvalidKey,

    #[error("You don't have access to {name}! (Instance: {host} | Key: {key})")]
    NoAccess {
        host: String,
        name: String,
        key: String,
    },

    #[error("{0} is not a accepted type!")]
    UnacceptedType(String),

    #[error("{0} already exists!")]
    TableAlreadyExists(String),

    #[error("Table is an argument that's missing")]
    InvalidTable,

    #[error("Rows is an argument that's missing")]
    InvalidRows,

    #[error("{0} is not a column in the table!")]
    InvalidColumn(String),

    #[error("There was an error while trying to perform this action (status code: {0})")]
    UnknownError(u16),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<SchemaError> for ClientError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::UnacceptedType(tag) => ClientError::UnacceptedType(tag),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
