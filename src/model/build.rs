//! Build stages: document sections -> entity graph.
//!
//! Stages run in a fixed order, each one reading the document plus whatever
//! earlier stages produced:
//!
//! daemons -> plugins -> aggregators -> producers -> updaters -> stores -> samplers
//!
//! The first violation aborts the build; there is nothing to roll back since
//! the model is only handed out once every stage succeeded.

use crate::Result;
use crate::error::{CompileError, invalid};
use crate::model::balance::{assign_endpoints, replicate_hosts, replicate_ports};
use crate::model::{
    AggState, Aggregator, AuthRef, ClusterModel, ConfigEntry, Daemon, DaemonGroup, Endpoint,
    MATCH_ALL, Plugin, Producer, Registry, SamplerSpec, Store, StreamSubscription, Updater,
    UpdaterMode,
};
use crate::spec::attr::{
    CONTROL_ATTR, DEFAULT_AUTH, DEFAULT_INTERVAL_US, require, resolve, resolve_bool,
    resolve_interval, resolve_str, scalar_text,
};
use crate::spec::hostlist::{self, split_top_level};
use crate::spec::{Document, Spec, expand_names, list_attr, spec_list_attr, usage};
use serde_yaml::Value;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Builds a [`ClusterModel`] from a parsed [`Document`].
///
/// The builder owns the updater name counter, so names stay unique across
/// every group and every build run through the same builder.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    updater_count: u64,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&mut self, doc: &Document) -> Result<ClusterModel> {
        let daemons = build_daemons(doc)?;
        debug!(groups = daemons.len(), "built daemons");

        let plugins = build_plugins(doc)?;
        debug!(plugins = plugins.len(), "built plugins");

        let aggregators = build_aggregators(doc, &daemons, &plugins)?;
        debug!(groups = aggregators.len(), "built aggregators");

        let producers = build_producers(doc, &daemons)?;
        debug!(
            producers = producers.values().map(Registry::len).sum::<usize>(),
            "built producers"
        );

        let updaters = self.build_updaters(doc)?;
        debug!(next = self.updater_count, "built updaters");

        let stores = build_stores(doc, &plugins, &aggregators)?;
        debug!(groups = stores.len(), "built stores");

        let samplers = build_samplers(doc, &daemons, &plugins)?;
        debug!(groups = samplers.len(), "built samplers");

        Ok(ClusterModel {
            daemons,
            plugins,
            aggregators,
            producers,
            updaters,
            stores,
            samplers,
        })
    }

    fn build_updaters(&mut self, doc: &Document) -> Result<Registry<Registry<Updater>>> {
        let mut updaters: Registry<Registry<Updater>> = Registry::new();
        for agg in doc.aggregators.iter() {
            let group = group_key(agg, "daemons")?;
            for peer in spec_list_attr(agg, "peers", usage::PEERS)? {
                for spec in spec_list_attr(peer, "updaters", usage::UPDATERS)? {
                    require(&["interval", "sets"], spec, "\"updaters\" entry")?;

                    let name = format!("updtr_{}", self.updater_count);
                    let mode = match spec.get("mode") {
                        Some(value) => text_of(value, "mode")?,
                        None => "pull".to_string(),
                    };
                    let interval_us = resolve_interval("interval", spec)?.unwrap_or(DEFAULT_INTERVAL_US);
                    let offset_us = resolve_interval("offset", spec)?;

                    let updater = Updater {
                        name: name.clone(),
                        interval_us,
                        group: group.clone(),
                        sets: spec.get("sets").cloned().unwrap_or(Value::Null),
                        mode: UpdaterMode::parse(&mode),
                        offset_us,
                        producers: vec![MATCH_ALL.to_string()],
                    };
                    if updaters.entry_or_default(&group).insert(name.clone(), updater).is_err() {
                        invalid!(
                            "Duplicate updater name '{}'. An updater name must be unique within the group",
                            name
                        );
                    }
                    self.updater_count += 1;
                }
            }
        }
        Ok(updaters)
    }
}

/// Build a model with a fresh builder.
pub fn compile(doc: &Document) -> Result<ClusterModel> {
    GraphBuilder::new().build(doc)
}

/// Group keys are compared as written, never as expanded name sets.
fn group_key(spec: &Spec, attr: &str) -> Result<String> {
    match spec.get(attr) {
        Some(Value::Sequence(items)) => {
            let parts = items
                .iter()
                .map(|v| text_of(v, attr))
                .collect::<Result<Vec<_>>>()?;
            Ok(parts.join(","))
        }
        Some(value) => text_of(value, attr),
        None => invalid!("The '{}' attribute is required", attr),
    }
}

fn text_of(value: &Value, attr: &str) -> Result<String> {
    match scalar_text(value) {
        Some(text) => Ok(text),
        None => invalid!("attribute '{}' must be a scalar, got {:?}", attr, value),
    }
}

fn required_names(spec: &Spec, attr: &str, container: &str) -> Result<Vec<String>> {
    let value = spec.get(attr).ok_or_else(|| {
        CompileError::validation(format!(
            "The '{}' attribute is required in a {}",
            attr, container
        ))
    })?;
    expand_names(value)
}

/// Endpoint attributes shared by every daemon of the group.
struct EndpointTemplate {
    names: VecDeque<String>,
    ports: VecDeque<String>,
    xprt: String,
    maestro_comm: bool,
    auth: AuthRef,
}

fn endpoint_auth(spec: &Spec) -> Result<AuthRef> {
    let name = resolve_str("auth", spec)?.filter(|n| n != DEFAULT_AUTH);
    if name.is_none() {
        return Ok(AuthRef::default());
    }
    let plugin = match spec.get("auth") {
        Some(Value::Mapping(auth)) => resolve_str("plugin", auth)?,
        _ => None,
    };
    Ok(AuthRef {
        name,
        plugin,
        conf: resolve_str("conf", spec)?,
    })
}

fn build_daemons(doc: &Document) -> Result<Registry<DaemonGroup>> {
    let mut groups = Registry::new();
    for spec in doc.daemons.iter() {
        require(&["names", "endpoints", "hosts"], spec, "\"daemons\" entry")?;
        let key = group_key(spec, "names")?;
        let dnames = required_names(spec, "names", "\"daemons\" entry")?;
        let hostnames = required_names(spec, "hosts", "\"daemons\" entry")?;
        let hosts = replicate_hosts(&hostnames, dnames.len());

        let mut templates = Vec::new();
        for ep in spec_list_attr(spec, "endpoints", usage::ENDPOINTS)? {
            require(&["names", "ports"], ep, "\"endpoints\" entry")?;
            let names = required_names(ep, "names", "\"endpoints\" entry")?;
            let ports = required_names(ep, "ports", "\"endpoints\" entry")?;
            let ports = replicate_ports(&ports, names.len());
            templates.push(EndpointTemplate {
                names: names.into(),
                ports: ports.into(),
                xprt: resolve_str("xprt", ep)?.unwrap_or_default(),
                maestro_comm: resolve_bool(CONTROL_ATTR, ep)?,
                auth: endpoint_auth(ep)?,
            });
        }

        let environment = resolve("environment", spec)?;
        let mut group = DaemonGroup::new();
        for (dname, host) in dnames.iter().zip(hosts.iter()) {
            let mut endpoints = Registry::new();
            for tmpl in templates.iter_mut() {
                let (Some(ep_name), Some(port)) = (tmpl.names.pop_front(), tmpl.ports.pop_front())
                else {
                    invalid!(
                        "Not enough endpoint names or ports for daemon {} in daemon group {}",
                        dname,
                        key
                    );
                };
                let port: u16 = port.parse().map_err(|_| {
                    CompileError::validation(format!(
                        "endpoint {} of daemon {}: {:?} is not a valid port",
                        ep_name, dname, port
                    ))
                })?;
                let endpoint = Endpoint {
                    name: ep_name.clone(),
                    port,
                    xprt: tmpl.xprt.clone(),
                    maestro_comm: tmpl.maestro_comm,
                    auth: tmpl.auth.clone(),
                };
                if endpoints.insert(ep_name.clone(), endpoint).is_err() {
                    invalid!("Duplicate endpoint name '{}' on daemon {}", ep_name, dname);
                }
            }
            let daemon = Daemon {
                name: dname.clone(),
                addr: host.clone(),
                environment: environment.clone(),
                endpoints,
            };
            if group.insert(dname.clone(), daemon).is_err() {
                invalid!("Duplicate daemon name '{}' in daemon group {}", dname, key);
            }
        }

        if group.is_empty() {
            invalid!(
                "Error processing regex of hostnames {} and daemons {}. \
                 Number of hosts must be a multiple of daemons with appropriate ports or equivalent to length of daemons.\n\
                 Hosts translate to {} hosts\n\
                 Names translate to {} daemons",
                group_key(spec, "hosts")?,
                key,
                hostnames.len(),
                dnames.len()
            );
        }
        if groups.insert(key.clone(), group).is_err() {
            invalid!("Duplicate daemon group '{}'", key);
        }
    }
    Ok(groups)
}

fn plugin_config(instance: &str, spec: &Spec) -> Result<Plugin> {
    require(
        &["name"],
        spec,
        &format!("\"plugin\" entry. Error in \"{}\" configuration", instance),
    )?;
    require(&["config"], spec, "\"plugin\" entry")?;
    let Some(Value::Sequence(items)) = spec.get("config") else {
        invalid!("\"config\" must be a list of configuration commands");
    };
    let mut config = Vec::with_capacity(items.len());
    for item in items {
        config.push(match item {
            Value::String(line) => ConfigEntry::Line(line.clone()),
            Value::Mapping(args) => ConfigEntry::Args(args.clone()),
            _ => invalid!("\"config\" list members must be a dictionary or a string"),
        });
    }
    Ok(Plugin {
        instance: instance.to_string(),
        name: resolve_str("name", spec)?.unwrap_or_default(),
        interval_us: resolve_interval("interval", spec)?.unwrap_or(DEFAULT_INTERVAL_US),
        offset_us: resolve_interval("offset", spec)?,
        config,
    })
}

fn build_plugins(doc: &Document) -> Result<Registry<Plugin>> {
    let mut plugins = Registry::new();
    for (instance, spec) in doc.plugins.iter() {
        let plugin = plugin_config(instance, spec)?;
        if plugins.insert(instance, plugin).is_err() {
            invalid!(
                "Duplicate plugin name \"{}\". Plugin must be unique within a group.",
                instance
            );
        }
    }
    Ok(plugins)
}

fn check_plugin_ref(instance: &str, plugins: &Registry<Plugin>) -> Result<()> {
    if !plugins.contains_key(instance) {
        invalid!(
            "Configuration for plugin instance \"{}\"\n\
             is not defined in the top level \"plugins\" dictionary",
            instance
        );
    }
    Ok(())
}

/// Instance names listed under `attr`, each checked against the registry.
fn plugin_refs(spec: &Spec, attr: &str, plugins: &Registry<Plugin>) -> Result<Option<Vec<String>>> {
    let Some(items) = list_attr(spec, attr, usage::PLUGIN_NAMES)? else {
        return Ok(None);
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let instance = text_of(item, attr)?;
        check_plugin_ref(&instance, plugins)?;
        out.push(instance);
    }
    Ok(Some(out))
}

fn build_aggregators(
    doc: &Document,
    daemons: &Registry<DaemonGroup>,
    plugins: &Registry<Plugin>,
) -> Result<Registry<Registry<Aggregator>>> {
    let mut aggregators: Registry<Registry<Aggregator>> = Registry::new();
    for spec in doc.aggregators.iter() {
        require(&["daemons"], spec, "\"aggregators\" entry")?;
        let group = group_key(spec, "daemons")?;
        let names = required_names(spec, "daemons", "\"aggregators\" entry")?;
        let agg_plugins = plugin_refs(spec, "plugins", plugins)?;

        if !daemons.contains_key(&group) {
            invalid!("No daemons matched daemon key {}", group);
        }

        let subscribe = match list_attr(spec, "subscribe", usage::SUBSCRIBE)? {
            None => None,
            Some(_) => {
                let mut subs = Vec::new();
                for stream in spec_list_attr(spec, "subscribe", usage::SUBSCRIBE)? {
                    require(&["stream", "regex"], stream, "stream specification")?;
                    subs.push(StreamSubscription {
                        stream: resolve_str("stream", stream)?.unwrap_or_default(),
                        regex: resolve_str("regex", stream)?.unwrap_or_else(|| MATCH_ALL.to_string()),
                    });
                }
                Some(subs)
            }
        };

        let group_aggs = aggregators.entry_or_default(&group);
        for name in names {
            let agg = Aggregator {
                name: name.clone(),
                state: AggState::Stopped,
                subscribe: subscribe.clone(),
                plugins: agg_plugins.clone(),
            };
            if group_aggs.insert(name.clone(), agg).is_err() {
                invalid!(
                    "Aggregator {} in group {} is configured by more than one \"aggregators\" entry",
                    name,
                    group
                );
            }
        }
    }
    Ok(aggregators)
}

fn build_producers(
    doc: &Document,
    daemons: &Registry<DaemonGroup>,
) -> Result<Registry<Registry<Producer>>> {
    let mut producers: Registry<Registry<Producer>> = Registry::new();
    for agg in doc.aggregators.iter() {
        let group = group_key(agg, "daemons")?;
        for peer in spec_list_attr(agg, "peers", usage::PEERS)? {
            require(
                &["daemons", "endpoints", "updaters", "reconnect", "type"],
                peer,
                "\"peers\" entry",
            )?;
            let peer_daemons = group_key(peer, "daemons")?;
            let peer_endpoints = group_key(peer, "endpoints")?;

            // "a,b" / "ea,eb" pairs sampler groups with their endpoint patterns.
            let pairs: Vec<(String, String)> = if daemons.contains_key(&peer_daemons) {
                vec![(peer_daemons, peer_endpoints)]
            } else {
                let dgrps = split_top_level(&peer_daemons)?;
                let eps = split_top_level(&peer_endpoints)?;
                if dgrps.len() != eps.len() {
                    invalid!(
                        "peer daemons {:?} and endpoints {:?} list a different number of groups",
                        peer_daemons,
                        peer_endpoints
                    );
                }
                dgrps
                    .into_iter()
                    .zip(eps)
                    .map(|(d, e)| (d.trim().to_string(), e.trim().to_string()))
                    .collect()
            };

            let kind = resolve_str("type", peer)?.unwrap_or_default();
            let reconnect_us = resolve_interval("reconnect", peer)?.unwrap_or_default();
            let regex = resolve_str("regex", peer)?;
            let updaters = list_attr(peer, "updaters", usage::UPDATERS)?
                .cloned()
                .unwrap_or_default();

            for (dgrp, ep_pattern) in pairs {
                let Some(sampler_group) = daemons.get(&dgrp) else {
                    invalid!("No daemons matched daemon key {} in \"peers\" entry", dgrp);
                };
                let endpoints = hostlist::expand(&ep_pattern)?;
                let sampler_daemons = hostlist::expand(&dgrp)?;

                for (endpoint, daemon) in assign_endpoints(&endpoints, &sampler_daemons)? {
                    let owns = sampler_group
                        .get(&daemon)
                        .is_some_and(|d| d.endpoints.contains_key(&endpoint));
                    if !owns {
                        invalid!(
                            "producer endpoint {} is not an endpoint of daemon {} in group {}",
                            endpoint,
                            daemon,
                            dgrp
                        );
                    }
                    let producer = Producer {
                        daemon,
                        daemon_group: dgrp.clone(),
                        name: endpoint.clone(),
                        endpoint: endpoint.clone(),
                        kind: kind.clone(),
                        group: group.clone(),
                        reconnect_us,
                        regex: regex.clone(),
                        updaters: updaters.clone(),
                    };
                    if producers.entry_or_default(&group).insert(endpoint.clone(), producer).is_err() {
                        invalid!(
                            "Duplicate producer '{}'. An endpoint may be a producer only once per aggregator group",
                            endpoint
                        );
                    }
                }
            }
        }
    }
    Ok(producers)
}

fn build_stores(
    doc: &Document,
    plugins: &Registry<Plugin>,
    aggregators: &Registry<Registry<Aggregator>>,
) -> Result<Registry<Registry<Store>>> {
    let mut stores: Registry<Registry<Store>> = Registry::new();
    for (name, spec) in doc.stores.iter() {
        require(&["plugin", "container", "daemons"], spec, "\"store\" entry")?;
        let decomposition = match resolve_str("decomp", spec)? {
            Some(d) => Some(d),
            None => resolve_str("decomposition", spec)?,
        };
        if decomposition.is_none() {
            require(&["schema"], spec, "\"store\" entry")?;
        }
        let schema = resolve_str("schema", spec)?;
        let regex = resolve_str("regex", spec)?;
        if decomposition.is_some() && schema.is_none() && regex.is_none() {
            invalid!(
                "Decomposition plugin configuration requires either 'schema' or 'regex' attribute"
            );
        }

        let group = group_key(spec, "daemons")?;
        let plugin = resolve_str("plugin", spec)?.unwrap_or_default();
        check_plugin_ref(&plugin, plugins)?;
        if !aggregators.contains_key(&group) {
            warn!(store = name, group = %group, "store targets a group with no aggregators");
        }

        let store = Store {
            name: name.to_string(),
            plugin,
            container: resolve_str("container", spec)?.unwrap_or_default(),
            schema,
            decomposition,
            regex,
            flush_us: resolve_interval("flush", spec)?,
        };
        if stores.entry_or_default(&group).insert(name, store).is_err() {
            invalid!(
                "Duplicate store name '{}'. A store name must be unique within the group",
                name
            );
        }
    }
    Ok(stores)
}

fn build_samplers(
    doc: &Document,
    daemons: &Registry<DaemonGroup>,
    plugins: &Registry<Plugin>,
) -> Result<Registry<SamplerSpec>> {
    let mut samplers = Registry::new();
    for spec in doc.samplers.iter() {
        require(&["daemons", "plugins"], spec, "\"sampler\" entry")?;
        let group = group_key(spec, "daemons")?;
        if !daemons.contains_key(&group) {
            invalid!("No daemons matched daemon key {} in \"samplers\" entry", group);
        }
        let instances = match list_attr(spec, "plugins", usage::SAMPLERS)? {
            Some(_) => plugin_refs(spec, "plugins", plugins)?.unwrap_or_default(),
            None => invalid!("The 'plugins' attribute is required in a \"sampler\" entry"),
        };
        let sampler = SamplerSpec {
            group: group.clone(),
            plugins: instances,
        };
        if samplers.insert(group.clone(), sampler).is_err() {
            invalid!("Daemon group {} is configured by more than one \"samplers\" entry", group);
        }
    }
    Ok(samplers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn doc(yaml: &str) -> Document {
        Document::from_yaml_str(yaml).unwrap()
    }

    fn build(yaml: &str) -> Result<ClusterModel> {
        compile(&doc(yaml))
    }

    const SAMPLER_DAEMONS: &str = r#"
daemons:
  - names: "sampler-[1-9]"
    hosts: "node-[1-3]"
    environment: { LDMS_VAR: 1 }
    endpoints:
      - names: "sampler-[1-9]-ctl"
        ports: "[10001]"
        maestro_comm: true
        xprt: rdma
        auth: { name: munge1, plugin: munge }
      - names: "sampler-[1-9]-data"
        ports: "[10002-10004]"
"#;

    #[test]
    fn hosts_are_shared_in_blocks() {
        let model = build(SAMPLER_DAEMONS).unwrap();
        let group = model.daemons.get("sampler-[1-9]").unwrap();
        let addrs: Vec<&str> = group.values().map(|d| d.addr.as_str()).collect();
        assert_eq!(
            addrs,
            vec!["node-1", "node-1", "node-1", "node-2", "node-2", "node-2", "node-3", "node-3", "node-3"]
        );
    }

    #[test]
    fn endpoints_pair_names_with_ports_in_order() {
        let model = build(SAMPLER_DAEMONS).unwrap();
        let group = model.daemons.get("sampler-[1-9]").unwrap();
        let s4 = group.get("sampler-4").unwrap();
        let ctl = s4.endpoints.get("sampler-4-ctl").unwrap();
        assert_eq!(ctl.port, 10001);
        assert_eq!(ctl.xprt, "rdma");
        assert!(ctl.maestro_comm);
        assert_eq!(ctl.auth.name.as_deref(), Some("munge1"));
        assert_eq!(ctl.auth.plugin.as_deref(), Some("munge"));

        let data = s4.endpoints.get("sampler-4-data").unwrap();
        assert_eq!(data.port, 10002);
        assert_eq!(data.xprt, "sock");
        assert!(!data.maestro_comm);
        assert_eq!(data.auth, AuthRef::default());
        let ports: Vec<u16> = group
            .values()
            .map(|d| d.endpoints.get(&format!("{}-data", d.name)).unwrap().port)
            .collect();
        assert_eq!(ports, vec![10002, 10003, 10004, 10002, 10003, 10004, 10002, 10003, 10004]);
    }

    #[test]
    fn daemons_require_attributes() {
        let err = build("daemons:\n  - names: a\n    hosts: b\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The 'endpoints' attribute is required in a \"daemons\" entry"
        );
    }

    #[test]
    fn endpoints_must_be_a_list() {
        let err = build("daemons:\n  - names: a\n    hosts: b\n    endpoints: {names: x, ports: 1}\n")
            .unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn too_few_endpoint_names_is_rejected() {
        let err = build(
            "daemons:\n  - names: \"d-[1-3]\"\n    hosts: h\n    endpoints:\n      - names: \"e-[1-2]\"\n        ports: 411\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("Not enough endpoint names"));
    }

    const PLUGINS: &str = r#"
daemons:
  - names: agg
    hosts: h
    endpoints: [ { names: agg-ep, ports: 411 } ]
plugins:
  meminfo1:
    name: meminfo
    interval: 2s
    config: [ { schema: meminfo, perm: "0777" }, "extra=1" ]
"#;

    #[test]
    fn plugins_register_config_entries() {
        let model = build(PLUGINS).unwrap();
        let p = model.plugins.get("meminfo1").unwrap();
        assert_eq!(p.name, "meminfo");
        assert_eq!(p.interval_us, 2_000_000);
        assert_eq!(p.config.len(), 2);
        assert_eq!(p.config[1], ConfigEntry::Line("extra=1".into()));
    }

    #[test]
    fn duplicate_plugins_are_rejected() {
        let yaml = format!("{}  meminfo1:\n    name: vmstat\n    config: []\n", PLUGINS);
        let err = build(&yaml).unwrap_err();
        assert!(err.to_string().starts_with("Duplicate plugin name \"meminfo1\""));
    }

    #[test]
    fn plugin_config_members_must_be_strings_or_maps() {
        let yaml = PLUGINS.replace("\"extra=1\"", "[nested]");
        assert!(build(&yaml).is_err());
    }

    #[test]
    fn aggregators_need_a_known_group() {
        let yaml = format!("{}aggregators:\n  - daemons: \"agg-[1-2]\"\n", PLUGINS);
        let err = build(&yaml).unwrap_err();
        assert_eq!(err.to_string(), "No daemons matched daemon key agg-[1-2]");

        let yaml = format!("{}aggregators:\n  - daemons: agg\n    plugins: [ nope ]\n", PLUGINS);
        assert!(build(&yaml).unwrap_err().to_string().contains("\"nope\""));
    }

    #[test]
    fn aggregators_start_stopped_with_subscriptions() {
        let yaml = format!(
            "{}aggregators:\n  - daemons: agg\n    subscribe:\n      - stream: kokkos\n        regex: \"k.*\"\n",
            PLUGINS
        );
        let mut model = build(&yaml).unwrap();
        let agg = model.aggregators.get("agg").unwrap().get("agg").unwrap();
        assert_eq!(agg.state, AggState::Stopped);
        assert_eq!(
            agg.subscribe.as_deref(),
            Some(&[StreamSubscription { stream: "kokkos".into(), regex: "k.*".into() }][..])
        );
        assert!(model.set_aggregator_state("agg", "agg", AggState::Running));
        assert!(!model.set_aggregator_state("agg", "missing", AggState::Error));
    }

    const CLUSTER: &str = r#"
daemons:
  - names: "agg-[1-2]"
    hosts: "head"
    endpoints: [ { names: "agg-[1-2]-ep", ports: "[20001-20002]" } ]
  - names: "samp-[1-2]"
    hosts: "node-[1-2]"
    endpoints:
      - names: "samp-[1-2]-a"
        ports: 10001
      - names: "samp-[1-2]-b"
        ports: 10002
plugins:
  store_csv1: { name: store_csv, config: [ { path: /data } ] }
aggregators:
  - daemons: "agg-[1-2]"
    peers:
      - daemons: "samp-[1-2]"
        endpoints: "samp-[1-2]-[a,b]"
        reconnect: 20s
        type: active
        updaters:
          - { interval: "1.0s", sets: [ { regex: ".*", field: inst } ] }
          - { interval: 2s, offset: 100ms, mode: push, sets: [] }
"#;

    #[test]
    fn producers_fan_out_over_sampler_daemons() {
        let model = build(CLUSTER).unwrap();
        let prods = model.producers.get("agg-[1-2]").unwrap();
        let owners: Vec<(&str, &str)> = prods
            .values()
            .map(|p| (p.endpoint.as_str(), p.daemon.as_str()))
            .collect();
        assert_eq!(
            owners,
            vec![
                ("samp-1-a", "samp-1"),
                ("samp-1-b", "samp-1"),
                ("samp-2-a", "samp-2"),
                ("samp-2-b", "samp-2"),
            ]
        );
        let p = prods.get("samp-2-b").unwrap();
        assert_eq!(p.reconnect_us, 20_000_000);
        assert_eq!(p.kind, "active");
        assert_eq!(p.updaters.len(), 2);
    }

    #[test]
    fn updaters_get_counter_names_and_default_mode() {
        let model = build(CLUSTER).unwrap();
        let updtrs = model.updaters.get("agg-[1-2]").unwrap();
        assert_eq!(updtrs.keys().collect::<Vec<_>>(), vec!["updtr_0", "updtr_1"]);
        let u0 = updtrs.get("updtr_0").unwrap();
        assert_eq!(u0.mode, UpdaterMode::Pull);
        assert_eq!(u0.interval_us, 1_000_000);
        assert_eq!(u0.offset_us, None);
        assert_eq!(u0.producers, vec![".*"]);
        let u1 = updtrs.get("updtr_1").unwrap();
        assert_eq!(u1.mode, UpdaterMode::Push);
        assert_eq!(u1.offset_us, Some(100_000));
    }

    #[test]
    fn updater_counter_is_never_reused() {
        let document = doc(CLUSTER);
        let mut builder = GraphBuilder::new();
        builder.build(&document).unwrap();
        let second = builder.build(&document).unwrap();
        let names: Vec<&str> = second.updaters.get("agg-[1-2]").unwrap().keys().collect();
        assert_eq!(names, vec!["updtr_2", "updtr_3"]);
    }

    #[test]
    fn peers_must_reference_real_endpoints() {
        let yaml = CLUSTER.replace("\"samp-[1-2]-[a,b]\"", "\"samp-[1-2]-[a,c]\"");
        assert!(build(&yaml).unwrap_err().to_string().contains("samp-1-c"));
    }

    #[test]
    fn stores_validate_schema_and_uniqueness() {
        let ok = format!(
            "{}stores:\n  csv-a: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c, schema: meminfo }}\n  csv-b: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c, schema: vmstat, flush: 10s }}\n",
            CLUSTER
        );
        let model = build(&ok).unwrap();
        let group = model.stores.get("agg-[1-2]").unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group.get("csv-b").unwrap().flush_us, Some(10_000_000));

        let dup = format!(
            "{}stores:\n  csv-a: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c, schema: a }}\n  csv-a: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c, schema: b }}\n",
            CLUSTER
        );
        let err = build(&dup).unwrap_err().to_string();
        assert!(err.starts_with("Duplicate store name 'csv-a'"), "{}", err);
    }

    #[test]
    fn decomposition_stores_need_schema_or_regex() {
        let no_regex = format!(
            "{}stores:\n  sos: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c, decomp: /etc/decomp.json }}\n",
            CLUSTER
        );
        assert!(build(&no_regex).is_err());

        let with_regex = no_regex.replace("decomp:", "regex: \".*\", decomp:");
        let model = build(&with_regex).unwrap();
        let store = model.stores.get("agg-[1-2]").unwrap().get("sos").unwrap();
        assert_eq!(store.decomposition.as_deref(), Some("/etc/decomp.json"));
        assert_eq!(store.schema, None);

        let no_schema = format!(
            "{}stores:\n  s: {{ daemons: \"agg-[1-2]\", plugin: store_csv1, container: c }}\n",
            CLUSTER
        );
        assert!(build(&no_schema).unwrap_err().to_string().contains("'schema'"));
    }

    #[test]
    fn samplers_key_by_group_and_check_plugins() {
        let yaml = format!(
            "{}samplers:\n  - daemons: \"samp-[1-2]\"\n    plugins: [ store_csv1 ]\n",
            CLUSTER
        );
        let model = build(&yaml).unwrap();
        assert_eq!(model.samplers.get("samp-[1-2]").unwrap().plugins, vec!["store_csv1"]);

        let bad = yaml.replace("plugins: [ store_csv1 ]", "plugins: [ meminfo9 ]");
        assert!(build(&bad).is_err());
    }

    const TWO_SAMPLER_GROUPS: &str = r#"
daemons:
  - names: agg
    hosts: head
    endpoints: [ { names: agg-ep, ports: 411 } ]
  - names: "a-[1-2]"
    hosts: "na-[1-2]"
    endpoints: [ { names: "a-[1-2]-ep", ports: 10001 } ]
  - names: "b-[1-2]"
    hosts: "nb-[1-2]"
    endpoints: [ { names: "b-[1-2]-ep", ports: 10002 } ]
aggregators:
  - daemons: agg
    peers:
      - daemons: "a-[1-2],b-[1-2]"
        endpoints: "a-[1-2]-ep,b-[1-2]-ep"
        regex: "a.*"
        reconnect: 20s
        type: active
        updaters: [ { interval: 1s, sets: [] } ]
"#;

    #[test]
    fn comma_separated_peer_groups_are_zipped() {
        let model = build(TWO_SAMPLER_GROUPS).unwrap();
        let prods = model.producers.get("agg").unwrap();
        let owners: Vec<(&str, &str, &str)> = prods
            .values()
            .map(|p| (p.endpoint.as_str(), p.daemon.as_str(), p.daemon_group.as_str()))
            .collect();
        assert_eq!(
            owners,
            vec![
                ("a-1-ep", "a-1", "a-[1-2]"),
                ("a-2-ep", "a-2", "a-[1-2]"),
                ("b-1-ep", "b-1", "b-[1-2]"),
                ("b-2-ep", "b-2", "b-[1-2]"),
            ]
        );
        assert!(prods.values().all(|p| p.regex.as_deref() == Some("a.*")));
    }

    #[test]
    fn comma_separated_peer_groups_must_pair_up() {
        let yaml = TWO_SAMPLER_GROUPS.replace("\"a-[1-2]-ep,b-[1-2]-ep\"", "\"a-[1-2]-ep\"");
        let err = build(&yaml).unwrap_err().to_string();
        assert!(err.contains("different number of groups"), "{}", err);
    }
}
