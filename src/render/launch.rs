//! `ldmsd` command line for one daemon.

use crate::Result;
use crate::error::invalid;
use crate::model::ClusterModel;
use std::path::Path;

pub const LDMSD: &str = "ldmsd";

/// Argument vector that starts `daemon` with its control listeners and the
/// config/pid/log files under `local_path`.
///
/// ```text
/// ldmsd -x sock:10001 -a munge -A conf=/run/munge.sock -c <dir>/d.conf -r <dir>/d.pid -l <dir>/d.log -F
/// ```
pub fn launch_args(
    model: &ClusterModel,
    local_path: &Path,
    group: &str,
    daemon: &str,
) -> Result<Vec<String>> {
    let Some(dmn) = model.daemons.get(group).and_then(|g| g.get(daemon)) else {
        invalid!("daemon {} is not part of daemon group {}", daemon, group);
    };

    let mut args = vec![LDMSD.to_string()];
    for endpoint in dmn.endpoints.values().filter(|ep| ep.maestro_comm) {
        args.push("-x".to_string());
        args.push(format!("{}:{}", endpoint.xprt, endpoint.port));

        let Some(auth) = &endpoint.auth.name else {
            continue;
        };
        args.push("-a".to_string());
        args.push(endpoint.auth.plugin.clone().unwrap_or_else(|| auth.clone()));
        if let Some(conf) = &endpoint.auth.conf {
            args.push("-A".to_string());
            args.push(if conf.contains('=') {
                conf.clone()
            } else {
                format!("conf={}", conf)
            });
        }
    }

    for (flag, ext) in [("-c", "conf"), ("-r", "pid"), ("-l", "log")] {
        args.push(flag.to_string());
        args.push(
            local_path
                .join(format!("{}.{}", daemon, ext))
                .to_string_lossy()
                .into_owned(),
        );
    }
    args.push("-F".to_string());
    Ok(args)
}
