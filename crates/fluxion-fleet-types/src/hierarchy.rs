// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============= Hierarchy Levels =============

/// Level of a node in the organizational tree.
///
/// The tree is strict: Enterprise → State → Location → Gateway → Optimizer.
/// Variants are declared root first so `Ord` follows depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Enterprise,
    State,
    Location,
    Gateway,
    /// Leaf device
    Optimizer,
}

impl Level {
    /// Level of this node's immediate children, `None` for leaves
    pub fn child(self) -> Option<Level> {
        match self {
            Self::Enterprise => Some(Self::State),
            Self::State => Some(Self::Location),
            Self::Location => Some(Self::Gateway),
            Self::Gateway => Some(Self::Optimizer),
            Self::Optimizer => None,
        }
    }

    pub fn is_leaf(self) -> bool {
        matches!(self, Self::Optimizer)
    }

    /// Whether nodes at this level persist a `BypassMode`.
    ///
    /// States and enterprises carry no aggregate bypass status.
    pub fn carries_bypass_mode(self) -> bool {
        match self {
            Self::Location | Self::Gateway | Self::Optimizer => true,
            Self::Enterprise | Self::State => false,
        }
    }

    /// Wire name used by the command API (`group` field)
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enterprise => "enterprise",
            Self::State => "state",
            Self::Location => "location",
            Self::Gateway => "gateway",
            Self::Optimizer => "optimizer",
        }
    }

    /// All levels, root first
    pub fn all() -> &'static [Level] {
        &[
            Self::Enterprise,
            Self::State,
            Self::Location,
            Self::Gateway,
            Self::Optimizer,
        ]
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "enterprise" => Ok(Self::Enterprise),
            "state" => Ok(Self::State),
            "location" => Ok(Self::Location),
            "gateway" => Ok(Self::Gateway),
            "optimizer" => Ok(Self::Optimizer),
            _ => Err(anyhow::anyhow!(
                "Unknown hierarchy level: '{}'. Supported levels: {}",
                s,
                Self::all()
                    .iter()
                    .map(|l| l.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

// ============= Node References =============

/// A (level, id) pair addressing one node of the tree
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeRef {
    pub level: Level,
    pub id: String,
}

impl NodeRef {
    pub fn new(level: Level, id: impl Into<String>) -> Self {
        Self {
            level,
            id: id.into(),
        }
    }

    pub fn enterprise(id: impl Into<String>) -> Self {
        Self::new(Level::Enterprise, id)
    }

    pub fn state(id: impl Into<String>) -> Self {
        Self::new(Level::State, id)
    }

    pub fn location(id: impl Into<String>) -> Self {
        Self::new(Level::Location, id)
    }

    pub fn gateway(id: impl Into<String>) -> Self {
        Self::new(Level::Gateway, id)
    }

    pub fn optimizer(id: impl Into<String>) -> Self {
        Self::new(Level::Optimizer, id)
    }

    /// Reference to a child of this node, `None` if this node is a leaf
    pub fn child(&self, id: impl Into<String>) -> Option<NodeRef> {
        self.level.child().map(|level| NodeRef::new(level, id))
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.level, self.id)
    }
}
