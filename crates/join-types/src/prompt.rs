//! Operator prompts and address classification

use crate::role::{Address, Capability};
use std::fmt;

/// A question asked of the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Prompt {
    /// IP address of one of the managing nodes
    RemoteAddress,
    /// Role menu option (0-3)
    Role,
    MinBlockInterval,
    MaxBlockInterval,
    /// Address to use for a capability, `1` to generate one
    Address(Capability),
}

impl Prompt {
    /// Field name shown next to the input cursor
    pub fn label(&self) -> &'static str {
        match self {
            Prompt::RemoteAddress => "ipAddress",
            Prompt::Role => "option",
            Prompt::MinBlockInterval => "minimumTimeBetweenBlocks",
            Prompt::MaxBlockInterval => "maximumTimeBetweenBlocks",
            Prompt::Address(_) => "address",
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What the operator asked for when prompted for an address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressChoice {
    /// Use this address as given
    Literal(Address),
    /// Mint a fresh account
    Generate,
    /// Do not take part in this capability
    Decline,
}

/// Input the operator types to request a generated account
pub const GENERATE_ADDRESS_INPUT: &str = "1";

/// Classify raw operator input for an address prompt
pub fn classify_address(input: &str) -> AddressChoice {
    let input = input.trim();
    if input == GENERATE_ADDRESS_INPUT {
        return AddressChoice::Generate;
    }
    match Address::parse(input) {
        Some(address) => AddressChoice::Literal(address),
        None => AddressChoice::Decline,
    }
}
