//! Node identity for Steam-Ripple
//!
//! This module provides the canonical [`NodeId`] used for deduplication and
//! normalization of the many shapes a seed identifier can arrive in.

mod locator;
mod normalize;

pub use locator::{parse_locator, profile_url};
pub use normalize::normalize_node_ref;

use crate::{IdError, IdResult};
use std::fmt;
use std::str::FromStr;

/// Offset between a 32-bit account id and the individual-account SteamID64
pub const STEAMID64_BASE: u64 = 76_561_197_960_265_728;

/// Canonical identifier of one crawlable profile (a SteamID64)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Wraps a raw SteamID64 without validating it
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Builds a NodeId from a SteamID64, rejecting values outside the
    /// individual-account range (17 digits, prefix `7656119`)
    pub fn from_steamid64(raw: u64) -> IdResult<Self> {
        if is_valid_steamid64(raw) {
            Ok(Self(raw))
        } else {
            Err(IdError::InvalidSteamId(raw.to_string()))
        }
    }

    /// Builds a NodeId from a 32-bit account id (SteamID3 `N`)
    pub fn from_account_id(account_id: u32) -> Self {
        Self(STEAMID64_BASE + account_id as u64)
    }

    /// Returns the raw SteamID64
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Returns the 32-bit account id portion
    pub fn account_id(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw: u64 = s
            .trim()
            .parse()
            .map_err(|_| IdError::InvalidSteamId(s.to_string()))?;
        Self::from_steamid64(raw)
    }
}

/// An identifier as supplied by a user, before resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeRef {
    /// Already canonical
    Id(NodeId),

    /// A vanity name that must be resolved against the remote source
    Alias(String),
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{}", id),
            Self::Alias(name) => write!(f, "alias:{}", name),
        }
    }
}

/// Checks the 17-digit `7656119…` shape of an individual SteamID64
pub fn is_valid_steamid64(raw: u64) -> bool {
    (10_000_000_000_000_000..100_000_000_000_000_000).contains(&raw)
        && raw / 10_000_000_000 == 7_656_119
}
