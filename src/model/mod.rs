//! Entity graph: the expanded, cross-checked cluster built from a [`Document`].
//!
//! Entities reference each other by name (group key + entity key), never by
//! handle. Every map keeps insertion order so that rendering is stable.
//!
//! [`Document`]: crate::spec::Document

pub mod balance;
pub mod build;

pub use build::GraphBuilder;

use crate::spec::Spec;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use serde_yaml::Value;
use std::collections::HashMap;

/// Insertion-ordered map: entries live in a Vec, a side index maps key to slot.
#[derive(Debug, Clone)]
pub struct Registry<T> {
    entries: Vec<(String, T)>,
    index: HashMap<String, usize>,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new entry. Returns the rejected value if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: T) -> Result<(), T> {
        let key = key.into();
        if self.index.contains_key(&key) {
            return Err(value);
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, value));
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Get the entry for `key`, inserting `T::default()` first if missing.
    pub fn entry_or_default(&mut self, key: &str) -> &mut T
    where
        T: Default,
    {
        let slot = match self.index.get(key) {
            Some(&i) => i,
            None => {
                self.index.insert(key.to_string(), self.entries.len());
                self.entries.push((key.to_string(), T::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[slot].1
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Slot of `key` in insertion order.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<T: Serialize> Serialize for Registry<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Daemons of one `daemons` entry, keyed by expanded daemon name.
pub type DaemonGroup = Registry<Daemon>;

#[derive(Debug, Clone, Serialize)]
pub struct Daemon {
    pub name: String,
    pub addr: String,
    pub environment: Option<Value>,
    pub endpoints: Registry<Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Endpoint {
    pub name: String,
    pub port: u16,
    pub xprt: String,
    pub maestro_comm: bool,
    pub auth: AuthRef,
}

/// Authentication domain of an endpoint. `name == None` means none configured.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthRef {
    pub name: Option<String>,
    pub plugin: Option<String>,
    pub conf: Option<String>,
}

/// One entry of a plugin's `config` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ConfigEntry {
    /// Rendered verbatim after `config name=<plugin>`.
    Line(String),
    /// Rendered as space-joined `key=value` pairs.
    Args(Spec),
}

#[derive(Debug, Clone, Serialize)]
pub struct Plugin {
    pub instance: String,
    pub name: String,
    pub interval_us: i64,
    pub offset_us: Option<i64>,
    pub config: Vec<ConfigEntry>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AggState {
    #[default]
    Stopped,
    Running,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSubscription {
    pub stream: String,
    pub regex: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Aggregator {
    pub name: String,
    pub state: AggState,
    pub subscribe: Option<Vec<StreamSubscription>>,
    pub plugins: Option<Vec<String>>,
}

/// Default regex for stream subscriptions and producer starts.
pub const MATCH_ALL: &str = ".*";

/// A sampler endpoint registered on an aggregator group.
#[derive(Debug, Clone, Serialize)]
pub struct Producer {
    /// Sampler daemon that owns `endpoint`.
    pub daemon: String,
    /// Key of the daemon group holding `daemon`.
    pub daemon_group: String,
    pub name: String,
    pub endpoint: String,
    pub kind: String,
    /// Aggregator group this producer is registered on.
    pub group: String,
    pub reconnect_us: i64,
    pub regex: Option<String>,
    pub updaters: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdaterMode {
    Pull,
    Push,
    OnChange,
    Auto,
    /// Any other declared mode, e.g. `static`.
    Other,
}

impl UpdaterMode {
    pub fn parse(mode: &str) -> Self {
        match mode {
            "pull" => Self::Pull,
            "push" => Self::Push,
            "onchange" => Self::OnChange,
            "auto" | "auto_interval" => Self::Auto,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Updater {
    pub name: String,
    pub interval_us: i64,
    pub group: String,
    /// Stored as declared; no consumer filters on it yet.
    pub sets: Value,
    pub mode: UpdaterMode,
    pub offset_us: Option<i64>,
    pub producers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Store {
    pub name: String,
    pub plugin: String,
    pub container: String,
    pub schema: Option<String>,
    pub decomposition: Option<String>,
    pub regex: Option<String>,
    pub flush_us: Option<i64>,
}

/// One `samplers` entry; applies to every daemon of `group`.
#[derive(Debug, Clone, Serialize)]
pub struct SamplerSpec {
    pub group: String,
    pub plugins: Vec<String>,
}

/// The fully built cluster. Write-once except for aggregator state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClusterModel {
    pub daemons: Registry<DaemonGroup>,
    pub plugins: Registry<Plugin>,
    pub aggregators: Registry<Registry<Aggregator>>,
    pub producers: Registry<Registry<Producer>>,
    pub updaters: Registry<Registry<Updater>>,
    pub stores: Registry<Registry<Store>>,
    pub samplers: Registry<SamplerSpec>,
}

impl ClusterModel {
    /// Find the group holding daemon `name`.
    pub fn find_daemon(&self, name: &str) -> Option<(&str, &Daemon)> {
        self.daemons
            .iter()
            .find_map(|(group, daemons)| daemons.get(name).map(|d| (group, d)))
    }

    pub fn set_aggregator_state(&mut self, group: &str, name: &str, state: AggState) -> bool {
        match self.aggregators.get_mut(group).and_then(|g| g.get_mut(name)) {
            Some(agg) => {
                agg.state = state;
                true
            }
            None => false,
        }
    }
}
