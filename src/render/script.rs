//! Per-daemon command scripts.
//!
//! A script is a newline-terminated list of ldmsd configuration commands,
//! emitted in a fixed order:
//!
//! env -> listeners -> producers -> stream subscriptions -> aggregator plugins
//!     -> updaters -> storage policies -> sampler plugins
//!
//! Rendering only reads the model; the auth/plugin dedup sets live in a
//! [`Script`] owned by one rendering call.

use crate::Result;
use crate::error::{CompileError, invalid};
use crate::model::balance::producer_share;
use crate::model::{
    ClusterModel, ConfigEntry, Daemon, Endpoint, MATCH_ALL, Plugin, Producer, UpdaterMode,
};
use crate::spec::Spec;
use crate::spec::attr::{is_interval_attr, key_text, scalar_text};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fmt::Write;
use tracing::warn;

/// Which endpoints get a `listen` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListenerScope {
    /// Control-channel (`maestro_comm`) endpoints only.
    #[default]
    Control,
    All,
}

/// How updater modes other than push/onchange render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AutoIntervalPolicy {
    /// Every mode that is not push/onchange gets `auto_interval=True`.
    #[default]
    Fallback,
    /// Only `auto`/`auto_interval` get the flag.
    Explicit,
}

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Host name used for sampler `producer=`/`instance=` defaults.
    pub hostname: String,
    /// Add `component_id=${LDMS_COMPONENT_ID}` to sampler config defaults.
    pub local: bool,
    pub listeners: ListenerScope,
    pub auto_interval: AutoIntervalPolicy,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            local: false,
            listeners: ListenerScope::default(),
            auto_interval: AutoIntervalPolicy::default(),
        }
    }
}

/// Text under construction plus the per-script dedup state.
#[derive(Debug, Default)]
pub struct Script {
    text: String,
    declared_auth: HashSet<String>,
    loaded_plugins: HashSet<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_text(self) -> String {
        self.text
    }

    fn line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }
}

/// Append ` attr=value` when `value` is present.
fn opt_attr<T: std::fmt::Display>(line: &mut String, attr: &str, value: Option<T>) {
    if let Some(value) = value {
        let _ = write!(line, " {}={}", attr, value);
    }
}

fn value_text(key: &str, value: &Value) -> Result<String> {
    if let Some(text) = scalar_text(value) {
        return Ok(text);
    }
    match value {
        Value::Sequence(items) => {
            let parts = items
                .iter()
                .map(|v| value_text(key, v))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        _ => invalid!("config argument '{}' must be a scalar or a list, got {:?}", key, value),
    }
}

/// Space-joined `key=value` pairs in mapping order, skipping interval attributes.
pub fn render_args(args: &Spec) -> Result<String> {
    let mut pairs = Vec::with_capacity(args.len());
    for (key, value) in args {
        let key = key_text(key)?;
        if is_interval_attr(&key) {
            continue;
        }
        pairs.push(format!("{}={}", key, value_text(&key, value)?));
    }
    Ok(pairs.join(" "))
}

/// Renders scripts for the daemons of one built model.
#[derive(Debug, Clone, Copy)]
pub struct ConfigEmitter<'a> {
    model: &'a ClusterModel,
    opts: &'a EmitOptions,
}

impl<'a> ConfigEmitter<'a> {
    pub fn new(model: &'a ClusterModel, opts: &'a EmitOptions) -> Self {
        Self { model, opts }
    }

    pub fn model(&self) -> &'a ClusterModel {
        self.model
    }

    fn daemon(&self, group: &str, name: &str) -> Result<&'a Daemon> {
        match self.model.daemons.get(group).and_then(|g| g.get(name)) {
            Some(d) => Ok(d),
            None => invalid!("daemon {} is not part of daemon group {}", name, group),
        }
    }

    /// Full script for one daemon, in the fixed rendering order.
    pub fn render_daemon(&self, group: &str, name: &str) -> Result<String> {
        let daemon = self.daemon(group, name)?;
        let mut script = Script::new();
        self.write_env(&mut script, daemon)?;
        self.write_listeners(&mut script, daemon);
        if self
            .model
            .aggregators
            .get(group)
            .is_some_and(|aggs| aggs.contains_key(name))
        {
            self.write_producers(&mut script, group, name)?;
            self.write_subscriptions(&mut script, group, name);
            self.write_agg_plugins(&mut script, group, name)?;
            self.write_updaters(&mut script, group);
            self.write_stores(&mut script, group)?;
        }
        if self.model.samplers.contains_key(group) {
            self.write_samplers(&mut script, group)?;
        }
        Ok(script.into_text())
    }

    /// Combined sampler script of a group: the sampler plugins once, then the
    /// listeners of every daemon in the group.
    pub fn render_sampler_group(&self, group: &str) -> Result<String> {
        let Some(daemons) = self.model.daemons.get(group) else {
            invalid!("No daemons matched daemon key {}", group);
        };
        let mut script = Script::new();
        self.write_samplers(&mut script, group)?;
        for daemon in daemons.values() {
            self.write_listeners(&mut script, daemon);
        }
        Ok(script.into_text())
    }

    /// Script for a single daemon looked up by name, terminated by a NUL byte.
    pub fn daemon_config(&self, path: &str, name: &str) -> Result<String> {
        let Some((group, _)) = self.model.find_daemon(name) else {
            invalid!("{} does not exist in YAML configuration file {}", name, path);
        };
        let mut text = self.render_daemon(group, name)?;
        text.push('\0');
        Ok(text)
    }

    fn write_env(&self, script: &mut Script, daemon: &Daemon) -> Result<()> {
        match &daemon.environment {
            None | Some(Value::Null) => Ok(()),
            Some(Value::Mapping(vars)) => {
                for (key, value) in vars {
                    let key = key_text(key)?;
                    let Some(value) = scalar_text(value) else {
                        invalid!("Environment variables must be a yaml key:value dictionary");
                    };
                    script.line(&format!("env {}={}", key, value));
                }
                Ok(())
            }
            Some(_) => Err(CompileError::structural(
                "Environment variables must be a yaml key:value dictionary",
                crate::spec::usage::ENVIRONMENT,
            )),
        }
    }

    fn write_auth_once(&self, script: &mut Script, endpoint: &Endpoint, plugin: Option<&str>) {
        let Some(auth) = &endpoint.auth.name else {
            return;
        };
        if !script.declared_auth.insert(auth.clone()) {
            return;
        }
        let mut line = format!("auth_add name={}", auth);
        opt_attr(&mut line, "plugin", plugin);
        opt_attr(&mut line, "conf", endpoint.auth.conf.as_deref());
        script.line(&line);
    }

    fn write_listeners(&self, script: &mut Script, daemon: &Daemon) {
        for endpoint in daemon.endpoints.values() {
            if self.opts.listeners == ListenerScope::Control && !endpoint.maestro_comm {
                continue;
            }
            self.write_auth_once(script, endpoint, endpoint.auth.plugin.as_deref());
            let mut line = format!("listen xprt={} port={}", endpoint.xprt, endpoint.port);
            opt_attr(&mut line, "auth", endpoint.auth.name.as_deref());
            opt_attr(&mut line, "conf", endpoint.auth.conf.as_deref());
            script.line(&line);
        }
    }

    /// Owning daemon and endpoint of a producer, looked up by name.
    fn producer_endpoint(&self, producer: &Producer) -> Result<(&'a Daemon, &'a Endpoint)> {
        let daemon = self.daemon(&producer.daemon_group, &producer.daemon)?;
        match daemon.endpoints.get(&producer.endpoint) {
            Some(ep) => Ok((daemon, ep)),
            None => invalid!(
                "producer endpoint {} is not an endpoint of daemon {}",
                producer.endpoint,
                producer.daemon
            ),
        }
    }

    /// This aggregator's slice of the group's producers.
    pub fn producer_share(&self, group: &str, name: &str) -> Vec<&'a Producer> {
        let (Some(producers), Some(aggs), Some(daemons)) = (
            self.model.producers.get(group),
            self.model.aggregators.get(group),
            self.model.daemons.get(group),
        ) else {
            return Vec::new();
        };
        let Some(index) = daemons.position(name) else {
            return Vec::new();
        };
        let range = producer_share(producers.len(), aggs.len(), index);
        producers.values().skip(range.start).take(range.len()).collect()
    }

    fn write_producers(&self, script: &mut Script, group: &str, name: &str) -> Result<()> {
        let share = self.producer_share(group, name);

        for producer in &share {
            let (_, endpoint) = self.producer_endpoint(producer)?;
            if let Some(auth) = &endpoint.auth.name {
                if script.declared_auth.contains(auth) {
                    continue;
                }
                let plugin = match &endpoint.auth.plugin {
                    Some(plugin) => plugin.as_str(),
                    None => {
                        warn!(
                            daemon = %producer.daemon,
                            auth = %auth,
                            "no auth plugin type for producer; falling back to the auth name, auth will likely be denied"
                        );
                        auth.as_str()
                    }
                };
                self.write_auth_once(script, endpoint, Some(plugin));
            }
        }

        for producer in &share {
            let (daemon, endpoint) = self.producer_endpoint(producer)?;
            let mut line = format!(
                "prdcr_add name={} host={} port={} xprt={} type={} reconnect={}",
                producer.name, daemon.addr, endpoint.port, endpoint.xprt, producer.kind, producer.reconnect_us
            );
            opt_attr(&mut line, "auth", endpoint.auth.name.as_deref());
            script.line(&line);
            let regex = producer.regex.as_deref().unwrap_or(MATCH_ALL);
            script.line(&format!("prdcr_start_regex regex={}", regex));
        }
        Ok(())
    }

    fn write_subscriptions(&self, script: &mut Script, group: &str, name: &str) {
        let subs = self
            .model
            .aggregators
            .get(group)
            .and_then(|aggs| aggs.get(name))
            .and_then(|agg| agg.subscribe.as_ref());
        for sub in subs.into_iter().flatten() {
            script.line(&format!("prdcr_subscribe stream={} regex={}", sub.stream, sub.regex));
        }
    }

    fn write_plugin_config(&self, script: &mut Script, plugin: &Plugin) -> Result<()> {
        script.line(&format!("load name={}", plugin.name));
        for entry in &plugin.config {
            let args = match entry {
                ConfigEntry::Line(line) => line.clone(),
                ConfigEntry::Args(args) => render_args(args)?,
            };
            script.line(&config_line(&plugin.name, &args));
        }
        Ok(())
    }

    fn write_agg_plugins(&self, script: &mut Script, group: &str, name: &str) -> Result<()> {
        let instances = self
            .model
            .aggregators
            .get(group)
            .and_then(|aggs| aggs.get(name))
            .and_then(|agg| agg.plugins.as_ref());
        for instance in instances.into_iter().flatten() {
            let Some(plugin) = self.model.plugins.get(instance) else {
                warn!(plugin = %instance, aggregator = %name, "aggregator plugin is not defined in the plugins dictionary; skipping");
                continue;
            };
            if script.loaded_plugins.insert(instance.clone()) {
                self.write_plugin_config(script, plugin)?;
            }
        }
        Ok(())
    }

    fn write_updaters(&self, script: &mut Script, group: &str) {
        let Some(updaters) = self.model.updaters.get(group) else {
            return;
        };
        for updater in updaters.values() {
            let flag = match updater.mode {
                UpdaterMode::Push => Some("push=True"),
                UpdaterMode::OnChange => Some("push=onchange"),
                UpdaterMode::Auto => Some("auto_interval=True"),
                UpdaterMode::Pull | UpdaterMode::Other => match self.opts.auto_interval {
                    AutoIntervalPolicy::Fallback => Some("auto_interval=True"),
                    AutoIntervalPolicy::Explicit => None,
                },
            };
            let mut line = format!("updtr_add name={}", updater.name);
            if let Some(flag) = flag {
                line.push(' ');
                line.push_str(flag);
            }
            let _ = write!(line, " interval={}", updater.interval_us);
            opt_attr(&mut line, "offset", updater.offset_us);
            script.line(&line);
            for regex in &updater.producers {
                script.line(&format!("updtr_prdcr_add name={} regex={}", updater.name, regex));
            }
            script.line(&format!("updtr_start name={}", updater.name));
        }
    }

    fn write_stores(&self, script: &mut Script, group: &str) -> Result<()> {
        let Some(stores) = self.model.stores.get(group) else {
            return Ok(());
        };
        for store in stores.values() {
            let Some(plugin) = self.model.plugins.get(&store.plugin) else {
                warn!(
                    store = %store.name,
                    plugin = %store.plugin,
                    "storage policy plugin is not defined in the plugins dictionary; continuing"
                );
                continue;
            };
            if script.loaded_plugins.insert(store.plugin.clone()) {
                self.write_plugin_config(script, plugin)?;
            }
            let mut line = format!(
                "strgp_add name={} plugin={} container={}",
                store.name, plugin.name, store.container
            );
            match (&store.schema, &store.regex) {
                (Some(schema), _) => opt_attr(&mut line, "schema", Some(schema)),
                (None, regex) => opt_attr(&mut line, "regex", regex.as_ref()),
            }
            opt_attr(&mut line, "decomposition", store.decomposition.as_ref());
            opt_attr(&mut line, "flush", store.flush_us);
            script.line(&line);
            script.line(&format!("strgp_start name={}", store.name));
        }
        Ok(())
    }

    /// Sampler config arguments with `producer`/`instance` synthesized from
    /// the host name when the entry does not set them.
    fn sampler_args(&self, plugin: &Plugin, args: &Spec) -> Result<String> {
        let mut merged = Spec::new();
        let host = &self.opts.hostname;
        if !args.contains_key("producer") {
            merged.insert(Value::from("producer"), Value::from(host.as_str()));
        }
        if !args.contains_key("instance") {
            merged.insert(
                Value::from("instance"),
                Value::from(format!("{}/{}", host, plugin.name)),
            );
        }
        if self.opts.local && !args.contains_key("component_id") {
            merged.insert(Value::from("component_id"), Value::from("${LDMS_COMPONENT_ID}"));
        }
        for (key, value) in args {
            if key.as_str() == Some("name") {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
        render_args(&merged)
    }

    fn write_samplers(&self, script: &mut Script, group: &str) -> Result<()> {
        let Some(sampler) = self.model.samplers.get(group) else {
            return Ok(());
        };
        for instance in &sampler.plugins {
            let Some(plugin) = self.model.plugins.get(instance) else {
                warn!(plugin = %instance, group = %group, "sampler plugin is not defined in the plugins dictionary; skipping");
                continue;
            };
            if !script.loaded_plugins.insert(instance.clone()) {
                continue;
            }
            script.line(&format!("load name={}", plugin.name));
            for entry in &plugin.config {
                let args = match entry {
                    ConfigEntry::Line(line) => line.clone(),
                    ConfigEntry::Args(args) => self.sampler_args(plugin, args)?,
                };
                script.line(&config_line(&plugin.name, &args));
            }
            let mut line = format!("start name={} interval={}", plugin.name, plugin.interval_us);
            opt_attr(&mut line, "offset", plugin.offset_us);
            script.line(&line);
        }
        Ok(())
    }
}

fn config_line(plugin: &str, args: &str) -> String {
    if args.is_empty() {
        format!("config name={}", plugin)
    } else {
        format!("config name={} {}", plugin, args)
    }
}
