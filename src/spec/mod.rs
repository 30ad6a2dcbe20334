//! Spec layer: the cluster document schema plus the primitives every build
//! stage leans on.
//!
//! This module owns:
//! - Document sections (list vs mapping shape is enforced while parsing)
//! - Host list expansion
//! - Interval parsing
//! - Attribute lookup with defaults

pub mod attr;
pub mod hostlist;
pub mod interval;

pub use attr::Spec;

use crate::Result;
use crate::error::CompileError;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_yaml::Value;
use std::fmt;

pub const LIST_ERR: &str =
    "spec must be a list of dictionaries, specified with \"-\" in the ldms_config yaml file";
pub const DICT_ERR: &str =
    "spec must be a dictionary, with keys referencing a plugin instance name";

pub mod usage {
    pub const DOCUMENT: &str = "e.g. daemons:\n       - names : \"l1-aggs-[1-8]\"\n         hosts : \"node-[1-8]\"\n         endpoints : [ ... ]\n     plugins : { ... }\n     aggregators : [ ... ]\n     samplers : [ ... ]\n     stores : { ... }";
    pub const DAEMONS: &str = "e.g. daemons:\n       - names : &l1-agg \"l1-aggs-[1-8]\"\n         hosts : &l1-agg-hosts \"node-[1-8]\"";
    pub const ENDPOINTS: &str = "e.g endpoints :\n      - names : &l1-agg-endpoints \"node-[1-8]-[10101]\"\n        ports : &agg-ports \"[10101]\"\n        maestro_comm : True\n        xprt  : sock\n        auth  :\n          name : munge1\n          plugin : munge";
    pub const AGGREGATORS: &str = "e.g. aggregators:\n       - daemons: \"l1-aggregators\"\n         peers :\n           - daemons : \"samplers\"\n             ...     :  ...";
    pub const PEERS: &str = "e.g. peers:\n       - daemons: \"samplers\"\n         endpoints : \"sampler-endpoints\"\n         ...       : ...";
    pub const UPDATERS: &str = "e.g. updaters:\n       - mode     : pull\n         interval : \"1.0s\"\n         sets     :\n           - regex : \".*\"\n             field : inst";
    pub const SUBSCRIBE: &str = "e.g. subscribe:\n       - stream : kokkos\n         regex  : \".*\"";
    pub const STORES: &str = "e.g. stores:\n       sos-meminfo :\n         daemons   : \"l1-aggregators\"\n         container : ldms_data\n         ...       : ...";
    pub const SAMPLERS: &str = "e.g. samplers:\n       - daemons : \"samplers\"\n         plugins : [ meminfo1, vmstat1 ]";
    pub const PLUGINS: &str = "e.g. plugins:\n       meminfo1 :\n         name      : meminfo\n         interval  : 1.0s\n         config    : [ { schema : meminfo }, { ... : ... } ]";
    pub const PLUGIN_NAMES: &str = "e.g. plugins : [ meminfo1, store_sos1 ]";
    pub const ENVIRONMENT: &str = "e.g. environment:\n       LDMS_COMPONENT_ID : 10001\n       ZAP_LIBPATH : /usr/lib/ovis-ldms";
}

/// Parsed cluster document. Only `daemons` is mandatory, and it must list at
/// least one daemon group.
#[derive(Debug, Clone)]
pub struct Document {
    pub daemons: SpecList,
    pub plugins: NamedSpecs,
    pub aggregators: SpecList,
    pub samplers: SpecList,
    pub stores: NamedSpecs,
}

impl Document {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: RawDocument = serde_yaml::from_str(text).map_err(|e| {
            CompileError::structural(
                format!("Error parsing ldms_config yaml file: {}", e),
                usage::DOCUMENT,
            )
        })?;
        raw.check()
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawDocument = serde_json::from_str(text).map_err(|e| {
            CompileError::structural(
                format!("Error parsing ldms_config json file: {}", e),
                usage::DOCUMENT,
            )
        })?;
        raw.check()
    }
}

/// Top-level sections as read, before their shapes are checked.
#[derive(Debug, Default, Deserialize)]
struct RawDocument {
    #[serde(default)]
    daemons: RawSection,
    #[serde(default)]
    plugins: RawSection,
    #[serde(default)]
    aggregators: RawSection,
    #[serde(default)]
    samplers: RawSection,
    #[serde(default)]
    stores: RawSection,
}

impl RawDocument {
    fn check(self) -> Result<Document> {
        let daemons = spec_list(self.daemons, "daemons", usage::DAEMONS)?;
        if daemons.0.is_empty() {
            return Err(CompileError::structural(
                "Error parsing ldms_config yaml file\nthe \"daemons\" section must list at least one daemon group",
                usage::DAEMONS,
            ));
        }
        Ok(Document {
            daemons,
            plugins: named_specs(self.plugins, "plugins", usage::PLUGINS)?,
            aggregators: spec_list(self.aggregators, "aggregators", usage::AGGREGATORS)?,
            samplers: spec_list(self.samplers, "samplers", usage::SAMPLERS)?,
            stores: named_specs(self.stores, "stores", usage::STORES)?,
        })
    }
}

/// One top-level section in whatever shape the document gave it. Mapping
/// entries are kept as pairs so repeated keys survive to the build stages.
#[derive(Debug, Default)]
enum RawSection {
    /// Absent or null.
    #[default]
    Missing,
    List(Vec<Value>),
    Named(Vec<(Value, Value)>),
    Scalar,
}

impl<'de> Deserialize<'de> for RawSection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct SectionVisitor;

        impl<'de> Visitor<'de> for SectionVisitor {
            type Value = RawSection;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a list or a dictionary")
            }

            fn visit_unit<E: de::Error>(self) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Missing)
            }

            fn visit_none<E: de::Error>(self) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Missing)
            }

            fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<RawSection, D::Error> {
                RawSection::deserialize(d)
            }

            fn visit_bool<E: de::Error>(self, _: bool) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Scalar)
            }

            fn visit_i64<E: de::Error>(self, _: i64) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Scalar)
            }

            fn visit_u64<E: de::Error>(self, _: u64) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Scalar)
            }

            fn visit_f64<E: de::Error>(self, _: f64) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Scalar)
            }

            fn visit_str<E: de::Error>(self, _: &str) -> std::result::Result<RawSection, E> {
                Ok(RawSection::Scalar)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<RawSection, A::Error> {
                let mut out = Vec::new();
                while let Some(item) = seq.next_element::<Value>()? {
                    out.push(item);
                }
                Ok(RawSection::List(out))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<RawSection, A::Error> {
                let mut out = Vec::new();
                while let Some(entry) = map.next_entry::<Value, Value>()? {
                    out.push(entry);
                }
                Ok(RawSection::Named(out))
            }
        }

        deserializer.deserialize_any(SectionVisitor)
    }
}

fn misshapen(section: &str, shape: &str, usage: &'static str) -> CompileError {
    CompileError::structural(
        format!("Error parsing ldms_config yaml file\n{} {}", section, shape),
        usage,
    )
}

fn spec_list(raw: RawSection, section: &str, usage: &'static str) -> Result<SpecList> {
    match raw {
        RawSection::Missing => Ok(SpecList::default()),
        RawSection::List(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Mapping(spec) => Ok(spec),
                _ => Err(misshapen(section, LIST_ERR, usage)),
            })
            .collect::<Result<Vec<_>>>()
            .map(SpecList),
        RawSection::Named(_) | RawSection::Scalar => Err(misshapen(section, LIST_ERR, usage)),
    }
}

fn named_specs(raw: RawSection, section: &str, usage: &'static str) -> Result<NamedSpecs> {
    match raw {
        RawSection::Missing => Ok(NamedSpecs::default()),
        RawSection::Named(entries) => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let Value::Mapping(spec) = value else {
                    return Err(misshapen(section, DICT_ERR, usage));
                };
                out.push((attr::key_text(&key)?, spec));
            }
            Ok(NamedSpecs(out))
        }
        RawSection::List(_) | RawSection::Scalar => Err(misshapen(section, DICT_ERR, usage)),
    }
}

/// A list-shaped section: `- { ... }` entries.
#[derive(Debug, Clone, Default)]
pub struct SpecList(pub Vec<Spec>);

/// A mapping-shaped section keyed by name. Entries keep document order, and
/// repeated keys are kept so the build stages can report them.
#[derive(Debug, Clone, Default)]
pub struct NamedSpecs(pub Vec<(String, Spec)>);

impl SpecList {
    pub fn iter(&self) -> impl Iterator<Item = &Spec> {
        self.0.iter()
    }
}

impl NamedSpecs {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Spec)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Expand a name/port/host attribute: a pattern string, a number, or a list
/// of either.
pub fn expand_names(value: &Value) -> Result<Vec<String>> {
    match value {
        Value::Sequence(items) => {
            let mut out = Vec::new();
            for item in items {
                out.extend(expand_names(item)?);
            }
            Ok(out)
        }
        other => match attr::scalar_text(other) {
            Some(pattern) => hostlist::expand(&pattern),
            None => Err(CompileError::validation(format!(
                "cannot expand {:?}: expected a pattern string, a number, or a list of them",
                other
            ))),
        },
    }
}

/// Fetch a list-valued attribute, failing with a usage example when the
/// value has some other shape.
pub fn list_attr<'a>(
    spec: &'a Spec,
    attr: &str,
    usage: &'static str,
) -> Result<Option<&'a Vec<Value>>> {
    match spec.get(attr) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Sequence(items)) => Ok(Some(items)),
        Some(_) => Err(CompileError::structural(
            format!("Error parsing ldms_config yaml file\n{} {}", attr, LIST_ERR),
            usage,
        )),
    }
}

/// Like [`list_attr`], for lists whose members must be mappings.
pub fn spec_list_attr<'a>(
    spec: &'a Spec,
    attr: &str,
    usage: &'static str,
) -> Result<Vec<&'a Spec>> {
    let Some(items) = list_attr(spec, attr, usage)? else {
        return Ok(Vec::new());
    };
    items
        .iter()
        .map(|item| match item {
            Value::Mapping(m) => Ok(m),
            _ => Err(CompileError::structural(
                format!("Error parsing ldms_config yaml file\n{} {}", attr, LIST_ERR),
                usage,
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ONE_DAEMON: &str = "daemons:\n  - { names: d, hosts: h, endpoints: [] }\n";

    fn usage_of(err: CompileError) -> &'static str {
        match err {
            CompileError::Structural { usage, .. } => usage,
            other => panic!("expected a structural error, got {}", other),
        }
    }

    #[test]
    fn sections_keep_document_order_and_duplicates() {
        let doc = Document::from_yaml_str(&format!(
            "{}stores:\n  b: {{plugin: x}}\n  a: {{plugin: y}}\n",
            ONE_DAEMON
        ))
        .unwrap();
        let names: Vec<&str> = doc.stores.iter().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["b", "a"]);

        let doc = Document::from_json_str(
            r#"{"daemons": [{"names": "d"}], "plugins": {"p": {"name": "a"}, "p": {"name": "b"}}}"#,
        )
        .unwrap();
        assert_eq!(doc.plugins.0.len(), 2);
    }

    #[test]
    fn wrong_section_shape_reports_that_section() {
        let err = Document::from_yaml_str("daemons: {names: x}").unwrap_err();
        assert_eq!(usage_of(err), usage::DAEMONS);

        let err = Document::from_yaml_str(&format!("{}stores: [a, b]", ONE_DAEMON)).unwrap_err();
        assert!(err.to_string().starts_with("Error parsing ldms_config yaml file\nstores spec must be a dictionary"));
        assert_eq!(usage_of(err), usage::STORES);

        let err = Document::from_yaml_str(&format!("{}plugins: [meminfo]", ONE_DAEMON)).unwrap_err();
        assert_eq!(usage_of(err), usage::PLUGINS);

        let err = Document::from_yaml_str(&format!("{}aggregators: {{a: 1}}", ONE_DAEMON)).unwrap_err();
        assert_eq!(usage_of(err), usage::AGGREGATORS);

        let err = Document::from_yaml_str(&format!("{}samplers: [meminfo1]", ONE_DAEMON)).unwrap_err();
        assert_eq!(usage_of(err), usage::SAMPLERS);

        let err = Document::from_json_str(r#"{"daemons": [{"names": "d"}], "stores": "s"}"#).unwrap_err();
        assert_eq!(usage_of(err), usage::STORES);
    }

    #[test]
    fn daemons_must_list_at_least_one_group() {
        for text in ["plugins: {}", "daemons:\nplugins: {}\n", "daemons: []"] {
            let err = Document::from_yaml_str(text).unwrap_err();
            assert_eq!(usage_of(err), usage::DAEMONS, "{}", text);
        }
        let err = Document::from_json_str(r#"{"daemons": null}"#).unwrap_err();
        assert_eq!(usage_of(err), usage::DAEMONS);
    }

    #[test]
    fn optional_sections_may_be_null() {
        let doc = Document::from_yaml_str(&format!("{}stores:\nsamplers:\n", ONE_DAEMON)).unwrap();
        assert_eq!(doc.daemons.0.len(), 1);
        assert!(doc.stores.0.is_empty());
        assert!(doc.samplers.0.is_empty());
    }

    #[test]
    fn syntax_errors_carry_the_document_example() {
        let err = Document::from_yaml_str("daemons: [").unwrap_err();
        assert_eq!(usage_of(err), usage::DOCUMENT);
    }

    #[test]
    fn expand_names_coerces_numbers_and_lists() {
        let v: Value = serde_yaml::from_str("[10001, \"s-[1-2]\"]").unwrap();
        assert_eq!(expand_names(&v).unwrap(), vec!["10001", "s-1", "s-2"]);
    }
}
