//! Snapshot layers
//!
//! A layer is an independently aged slice of a repository snapshot. The set
//! is closed: adding a layer forces every `match` in the TTL policy and the
//! change detector to handle it.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GitStateError;

/// One independently aged slice of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Membership flag, active branch, ahead/behind counters
    Basic,
    /// Staged / unstaged / untracked / conflicted file lists
    Status,
    /// Branch list and recent history
    Detailed,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Basic, Layer::Status, Layer::Detailed];

    pub fn as_str(&self) -> &'static str {
        match self {
            Layer::Basic => "basic",
            Layer::Status => "status",
            Layer::Detailed => "detailed",
        }
    }

    fn bit(self) -> u8 {
        match self {
            Layer::Basic => 0b001,
            Layer::Status => 0b010,
            Layer::Detailed => 0b100,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Layer {
    type Err = GitStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Layer::Basic),
            "status" => Ok(Layer::Status),
            "detailed" => Ok(Layer::Detailed),
            other => Err(GitStateError::ConfigError {
                message: format!("Unknown layer: {}", other),
            }),
        }
    }
}

/// A small copyable set of layers
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LayerSet(u8);

impl LayerSet {
    pub const EMPTY: LayerSet = LayerSet(0);
    pub const ALL: LayerSet = LayerSet(0b111);
    /// The two layers served by one `git status` call
    pub const BASIC_AND_STATUS: LayerSet = LayerSet(0b011);

    pub fn empty() -> Self {
        Self::EMPTY
    }

    pub fn all() -> Self {
        Self::ALL
    }

    pub fn single(layer: Layer) -> Self {
        Self(layer.bit())
    }

    pub fn contains(&self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }

    pub fn insert(&mut self, layer: Layer) {
        self.0 |= layer.bit();
    }

    pub fn remove(&mut self, layer: Layer) {
        self.0 &= !layer.bit();
    }

    pub fn union(self, other: LayerSet) -> LayerSet {
        LayerSet(self.0 | other.0)
    }

    pub fn intersection(self, other: LayerSet) -> LayerSet {
        LayerSet(self.0 & other.0)
    }

    pub fn intersects(&self, other: LayerSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Layers in declaration order
    pub fn iter(&self) -> impl Iterator<Item = Layer> + '_ {
        Layer::ALL.into_iter().filter(move |layer| self.contains(*layer))
    }

    pub fn to_vec(&self) -> Vec<Layer> {
        self.iter().collect()
    }
}

impl fmt::Debug for LayerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl From<Layer> for LayerSet {
    fn from(layer: Layer) -> Self {
        LayerSet::single(layer)
    }
}

impl<const N: usize> From<[Layer; N]> for LayerSet {
    fn from(layers: [Layer; N]) -> Self {
        layers.into_iter().collect()
    }
}

impl From<&[Layer]> for LayerSet {
    fn from(layers: &[Layer]) -> Self {
        layers.iter().copied().collect()
    }
}

impl FromIterator<Layer> for LayerSet {
    fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
        let mut set = LayerSet::EMPTY;
        for layer in iter {
            set.insert(layer);
        }
        set
    }
}

impl Serialize for LayerSet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for LayerSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let layers = Vec::<Layer>::deserialize(deserializer)?;
        Ok(layers.into_iter().collect())
    }
}
