//! SPDX-FileCopyrightText: © 2025 Cory Parent <goedelsoup+orasi@goedelsoup.io>
//! SPDX-License-Identifier: Apache-2.0
//!

//! Error handling for the registry core
//!
//! This module provides error types and result aliases shared by the data
//! model, the format converter and the filter engine.

use thiserror::Error;

/// Result type for registry core operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Registry core error types
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Registry payload is not valid for the declared or detected format
    #[error("Invalid registry data: {message}")]
    InvalidData { message: String },

    /// Payload matches none of the known registry formats
    #[error("Unable to detect registry format: data does not match any known format")]
    UnknownFormat,

    /// Format string is not a recognized registry format
    #[error("Unsupported registry format: {format}")]
    UnsupportedFormat { format: String },

    /// No conversion exists between the requested formats
    #[error("Unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: String, to: String },

    /// Name filter pattern failed to compile
    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// Registry structure violates a model invariant
    #[error("Validation error: {message}")]
    Validation { message: String },

    /// Serialization or deserialization failure
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Duration string does not match the s/m/h grammar
    #[error("Invalid duration '{value}': {message}")]
    InvalidDuration { value: String, message: String },
}

impl RegistryError {
    /// Create an invalid data error
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for RegistryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
