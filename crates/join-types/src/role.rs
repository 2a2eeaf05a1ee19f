//! Node roles and blockchain addresses

use crate::{error::InputError, ADDRESS_PREFIX};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Participation mode of the joining node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Makes and votes on blocks
    CombinedMakerVoter,
    /// Makes blocks
    MakerOnly,
    /// Votes on blocks
    VoterOnly,
    /// Follows the chain without making or voting
    Participant,
}

impl Role {
    /// All roles in menu order
    pub const ALL: [Role; 4] = [
        Role::CombinedMakerVoter,
        Role::MakerOnly,
        Role::VoterOnly,
        Role::Participant,
    ];

    /// Menu option the operator types to pick this role
    pub fn option(&self) -> u8 {
        match self {
            Role::CombinedMakerVoter => 0,
            Role::MakerOnly => 1,
            Role::VoterOnly => 2,
            Role::Participant => 3,
        }
    }

    /// Menu line shown to the operator
    pub fn description(&self) -> &'static str {
        match self {
            Role::CombinedMakerVoter => "Join the network as a block maker and block voter",
            Role::MakerOnly => "Join the network as a block maker",
            Role::VoterOnly => "Join the network as a block voter",
            Role::Participant => "Join the network as a participant",
        }
    }

    /// Whether this role makes blocks
    pub fn makes_blocks(&self) -> bool {
        matches!(self, Role::CombinedMakerVoter | Role::MakerOnly)
    }

    /// Whether this role votes on blocks
    pub fn votes_on_blocks(&self) -> bool {
        matches!(self, Role::CombinedMakerVoter | Role::VoterOnly)
    }

    /// Whether this role needs block interval bounds
    pub fn needs_block_timing(&self) -> bool {
        self.makes_blocks() || self.votes_on_blocks()
    }
}

impl TryFrom<u8> for Role {
    type Error = InputError;

    fn try_from(option: u8) -> Result<Self, Self::Error> {
        Role::ALL
            .into_iter()
            .find(|role| role.option() == option)
            .ok_or_else(|| InputError::InvalidRole(option.to_string()))
    }
}

impl FromStr for Role {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        trimmed
            .parse::<u8>()
            .map_err(|_| InputError::InvalidRole(trimmed.to_string()))
            .and_then(Role::try_from)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::CombinedMakerVoter => "block maker + block voter",
            Role::MakerOnly => "block maker",
            Role::VoterOnly => "block voter",
            Role::Participant => "participant",
        };
        f.write_str(name)
    }
}

/// Block-production capability an address is collected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    Maker,
    Voter,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Maker => f.write_str("block maker"),
            Capability::Voter => f.write_str("block voter"),
        }
    }
}

/// A blockchain account address (`0x`-prefixed)
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, BorshSerialize, BorshDeserialize,
)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Accept an operator-supplied address verbatim if it carries the address prefix
    pub fn parse(input: &str) -> Option<Self> {
        input
            .starts_with(ADDRESS_PREFIX)
            .then(|| Self(input.to_string()))
    }

    /// Build an address from raw account bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(format!("{}{}", ADDRESS_PREFIX, hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
