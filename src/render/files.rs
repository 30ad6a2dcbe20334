//! Output set for a whole cluster: which scripts exist and where they land.
//!
//! - one `<group>-samplers.conf` per daemon group with a `samplers` entry
//! - one `<daemon>.conf` per aggregator daemon

use crate::render::script::ConfigEmitter;
use anyhow::Context;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A rendered script and the file name it is written under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptFile {
    pub file_name: String,
    pub text: String,
}

/// Render every script of the cluster, in daemon group order.
pub fn plan_scripts(emitter: &ConfigEmitter<'_>) -> crate::Result<Vec<ScriptFile>> {
    let model = emitter.model();
    let mut out = Vec::new();
    for group in model.daemons.keys() {
        if model.samplers.contains_key(group) {
            out.push(ScriptFile {
                file_name: format!("{}-samplers.conf", group),
                text: emitter.render_sampler_group(group)?,
            });
        } else {
            debug!(group, "no samplers configured for daemon group; skipping sampler script");
        }

        if let Some(aggs) = model.aggregators.get(group) {
            for name in aggs.keys() {
                out.push(ScriptFile {
                    file_name: format!("{}.conf", name),
                    text: emitter.render_daemon(group, name)?,
                });
            }
        }
    }
    Ok(out)
}

/// Write `scripts` into `dir`, creating it if needed. Returns the written paths.
pub fn write_scripts(dir: &Path, scripts: &[ScriptFile]) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let mut written = Vec::with_capacity(scripts.len());
    for script in scripts {
        let path = dir.join(&script.file_name);
        std::fs::write(&path, &script.text)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "wrote config");
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::build::compile;
    use crate::render::EmitOptions;
    use crate::spec::Document;
    use pretty_assertions::assert_eq;

    const CLUSTER: &str = r#"
daemons:
  - names: "agg-[1-2]"
    hosts: head
    endpoints: [ { names: "agg-[1-2]-ep", ports: "[20001-20002]", maestro_comm: true } ]
  - names: "samp-[1-2]"
    hosts: "node-[1-2]"
    endpoints: [ { names: "samp-[1-2]-ep", ports: 10001, maestro_comm: true } ]
  - names: idle
    hosts: spare
    endpoints: [ { names: idle-ep, ports: 411 } ]
plugins:
  vmstat1: { name: vmstat, config: [ { schema: vmstat } ] }
aggregators:
  - daemons: "agg-[1-2]"
    peers:
      - daemons: "samp-[1-2]"
        endpoints: "samp-[1-2]-ep"
        reconnect: 1s
        type: active
        updaters: [ { interval: 1s, sets: [] } ]
samplers:
  - daemons: "samp-[1-2]"
    plugins: [ vmstat1 ]
"#;

    #[test]
    fn plan_and_write() {
        let model = compile(&Document::from_yaml_str(CLUSTER).unwrap()).unwrap();
        let opts = EmitOptions::default();
        let scripts = plan_scripts(&ConfigEmitter::new(&model, &opts)).unwrap();
        let names: Vec<&str> = scripts.iter().map(|s| s.file_name.as_str()).collect();
        assert_eq!(names, vec!["agg-1.conf", "agg-2.conf", "samp-[1-2]-samplers.conf"]);

        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("conf");
        let written = write_scripts(&out, &scripts).unwrap();
        assert_eq!(written.len(), 3);
        let agg1 = std::fs::read_to_string(out.join("agg-1.conf")).unwrap();
        assert_eq!(agg1, scripts[0].text);
        assert!(agg1.contains("prdcr_add name=samp-1-ep host=node-1 port=10001"));
    }
}
