use anyhow::Context;
use clap::{Parser, Subcommand};
use ldms_cfgc::render::{self, AutoIntervalPolicy, ListenerScope};
use ldms_cfgc::{ClusterModel, ConfigEmitter, Document, EmitOptions, compile};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub type Result<T> = anyhow::Result<T>;

#[derive(Parser)]
#[command(name = "ldms-cfgc")]
#[command(about = "Compile an LDMS cluster document into ldmsd configuration scripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every sampler and aggregator script of the cluster.
    Generate {
        /// Cluster document (.yaml/.yml, otherwise JSON).
        #[arg(long)]
        config: PathBuf,

        #[arg(short = 'o', long)]
        out: PathBuf,

        #[command(flatten)]
        emit: EmitArgs,
    },

    /// Print the script of a single daemon, NUL terminated.
    Daemon {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        name: String,

        #[command(flatten)]
        emit: EmitArgs,
    },

    /// Print the ldmsd launch arguments of a single daemon.
    Args {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        name: String,

        /// Directory holding the daemon's .conf/.pid/.log files.
        #[arg(long)]
        path: PathBuf,
    },

    /// Dump the built entity graph as JSON.
    Graph {
        #[arg(long)]
        config: PathBuf,
    },
}

/// Rendering knobs shared by every script-producing command.
#[derive(clap::Args, Debug)]
struct EmitArgs {
    /// Host name used for sampler producer/instance defaults.
    #[arg(long, env = "HOSTNAME", default_value = "localhost")]
    hostname: String,

    /// Add component_id=${LDMS_COMPONENT_ID} to sampler configs.
    #[arg(long)]
    local: bool,

    /// Emit listen lines for every endpoint, not only control endpoints.
    #[arg(long)]
    all_listeners: bool,

    /// Only render auto_interval=True for auto/auto_interval updaters.
    #[arg(long)]
    explicit_auto: bool,
}

impl From<EmitArgs> for EmitOptions {
    fn from(args: EmitArgs) -> Self {
        Self {
            hostname: args.hostname,
            local: args.local,
            listeners: if args.all_listeners {
                ListenerScope::All
            } else {
                ListenerScope::Control
            },
            auto_interval: if args.explicit_auto {
                AutoIntervalPolicy::Explicit
            } else {
                AutoIntervalPolicy::Fallback
            },
        }
    }
}

fn load_model(path: &Path) -> Result<ClusterModel> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let doc = match path.extension().and_then(|e| e.to_str()) {
        Some("yaml") | Some("yml") => Document::from_yaml_str(&text),
        _ => Document::from_json_str(&text),
    }
    .with_context(|| format!("invalid cluster document {}", path.display()))?;
    compile(&doc).with_context(|| format!("failed to build cluster from {}", path.display()))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Generate { config, out, emit } => {
            let model = load_model(&config)?;
            let opts = EmitOptions::from(emit);
            let scripts = render::plan_scripts(&ConfigEmitter::new(&model, &opts))?;
            let written = render::write_scripts(&out, &scripts)?;
            println!("Wrote {} scripts to {}", written.len(), out.display());
        }

        Commands::Daemon { config, name, emit } => {
            let model = load_model(&config)?;
            let opts = EmitOptions::from(emit);
            let text = ConfigEmitter::new(&model, &opts)
                .daemon_config(&config.to_string_lossy(), &name)?;
            print!("{}", text);
        }

        Commands::Args { config, name, path } => {
            let model = load_model(&config)?;
            let Some((group, _)) = model.find_daemon(&name) else {
                anyhow::bail!("{} does not exist in configuration file {}", name, config.display());
            };
            let args = render::launch_args(&model, &path, group, &name)?;
            println!("{}", args.join(" "));
        }

        Commands::Graph { config } => {
            let model = load_model(&config)?;
            println!("{}", serde_json::to_string_pretty(&model)?);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn emit_options(argv: &[&str]) -> EmitOptions {
        match Cli::try_parse_from(argv).unwrap().cmd {
            Commands::Generate { emit, .. } | Commands::Daemon { emit, .. } => emit.into(),
            _ => panic!("not a script command"),
        }
    }

    #[test]
    fn daemon_takes_the_generate_knobs() {
        let argv = [
            "ldms-cfgc", "daemon", "--config", "c.yaml", "--name", "d",
            "--hostname", "node-1", "--local", "--all-listeners", "--explicit-auto",
        ];
        let opts = emit_options(&argv);
        assert_eq!(opts.hostname, "node-1");
        assert!(opts.local);
        assert_eq!(opts.listeners, ListenerScope::All);
        assert_eq!(opts.auto_interval, AutoIntervalPolicy::Explicit);

        let mut generate = argv.to_vec();
        generate.splice(1..6, ["generate", "--config", "c.yaml", "-o", "out"]);
        let same = emit_options(&generate);
        assert_eq!(same.listeners, opts.listeners);
        assert_eq!(same.auto_interval, opts.auto_interval);
    }

    #[test]
    fn knobs_default_to_control_listeners_and_fallback() {
        let opts = emit_options(&["ldms-cfgc", "daemon", "--config", "c.yaml", "--name", "d"]);
        assert!(!opts.local);
        assert_eq!(opts.listeners, ListenerScope::Control);
        assert_eq!(opts.auto_interval, AutoIntervalPolicy::Fallback);
    }
}
