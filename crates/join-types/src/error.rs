//! Provisioning errors

use crate::role::Capability;
use std::time::Duration;
use thiserror::Error;

/// Rejected or unusable operator input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("invalid role option `{0}` (expected 0-3)")]
    InvalidRole(String),

    #[error("invalid {field}: `{value}` is not a whole number")]
    InvalidInterval { field: &'static str, value: String },

    #[error("minimum block interval {min} exceeds maximum {max}")]
    IntervalOrder { min: u64, max: u64 },

    #[error("no {0} address given for a role that requires one")]
    MissingAccount(Capability),

    #[error("operator input closed")]
    Closed,

    #[error("input error: {0}")]
    Io(String),
}

/// Any failure that aborts a provisioning run
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error("workspace error: {0}")]
    Workspace(String),

    #[error("key generation error: {0}")]
    KeyGeneration(String),

    #[error("config assembly error: {0}")]
    ConfigAssembly(String),

    #[error("handshake error: {0}")]
    Handshake(String),

    #[error("genesis resolution error: {0}")]
    Genesis(String),

    #[error("node did not signal startup within {0:?}")]
    LaunchTimeout(Duration),

    #[error("node launch failed: {0}")]
    LaunchFailure(String),

    #[error("node link error: {0}")]
    NodeLink(String),

    #[error("listener registration error: {0}")]
    ListenerRegistration(String),

    #[error("monitoring setup error: {0}")]
    MonitoringSetup(String),

    #[error("context field `{0}` read before any stage populated it")]
    MissingField(&'static str),

    #[error("context field `{0}` is write-once and was already set")]
    FieldAlreadySet(&'static str),
}

impl ProvisionError {
    pub fn workspace(e: impl std::fmt::Display) -> Self {
        Self::Workspace(e.to_string())
    }

    pub fn key_generation(e: impl std::fmt::Display) -> Self {
        Self::KeyGeneration(e.to_string())
    }

    pub fn config_assembly(e: impl std::fmt::Display) -> Self {
        Self::ConfigAssembly(e.to_string())
    }

    pub fn handshake(e: impl std::fmt::Display) -> Self {
        Self::Handshake(e.to_string())
    }

    pub fn node_link(e: impl std::fmt::Display) -> Self {
        Self::NodeLink(e.to_string())
    }
}

impl From<std::io::Error> for InputError {
    fn from(e: std::io::Error) -> Self {
        InputError::Io(e.to_string())
    }
}
