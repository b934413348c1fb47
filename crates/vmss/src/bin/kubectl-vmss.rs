//! kubectl-vmss - run commands on AKS nodes via Azure VMSS run-command.
//!
//! Installed on `$PATH` this is picked up as `kubectl vmss`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vmss::scripts::{self, ACN_STATE_SCRIPT, DEFAULT_EXEC_SCRIPT, NETNS_SCRIPT};
use vmss::{CommandResult, Config, LookupBackend, Orchestrator, Target};

const DEFAULT_NAMESPACE: &str = "kube-system";

/// Run commands on AKS nodes via Azure VMSS run-command.
///
/// Resolves node, VMSS, instance ID, resource group and subscription from pod
/// or node names, then runs the command with `az vmss run-command invoke`.
#[derive(Parser)]
#[command(name = "kubectl-vmss")]
#[command(version, about = "Run commands on AKS nodes via Azure VMSS run-command")]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// kubectl binary (or set `KUBECTL_VMSS_KUBECTL`).
    #[arg(long, global = true)]
    kubectl: Option<String>,

    /// az binary (or set `KUBECTL_VMSS_AZ`).
    #[arg(long, global = true)]
    az: Option<String>,

    /// How to look up pods and nodes (or set `KUBECTL_VMSS_LOOKUP`).
    #[arg(long, global = true, value_enum)]
    lookup: Option<LookupBackend>,

    /// kubeconfig context to use.
    #[arg(long, global = true)]
    context: Option<String>,

    /// Path to the kubeconfig file.
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Timeout in seconds for each kubectl/az call (or set `KUBECTL_VMSS_TIMEOUT`).
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Get container logs from the node via crictl.
    ///
    /// Useful when the API server cannot proxy logs, e.g. the kubelet is down.
    Logs {
        /// Pod name.
        pod: Option<String>,

        /// Namespace for pod lookup.
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Target a node directly instead of the pod's node.
        #[arg(long)]
        node: Option<String>,

        /// Number of log lines to show (0 = all).
        #[arg(long, default_value = "0")]
        tail: u32,

        /// Show logs from the previous container instance.
        #[arg(long, default_value = "false")]
        previous: bool,
    },

    /// Run a command on the pod's node.
    Exec {
        /// Pod name.
        pod: String,

        /// Command to run (default: basic node info).
        command: Option<String>,

        /// Namespace for pod lookup.
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Target a node directly instead of the pod's node.
        #[arg(long)]
        node: Option<String>,
    },

    /// Run an arbitrary command on one or more nodes.
    ///
    /// `run <node>[,<node>...] <command>` or `run --pod <pod> <command>`.
    Run {
        /// Node list and command, or just the command with --pod.
        #[arg(required = true, num_args = 1..=2)]
        args: Vec<String>,

        /// Resolve the node from this pod.
        #[arg(long)]
        pod: Option<String>,

        /// Namespace for pod lookup.
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,
    },

    /// Display node-level resources.
    #[command(subcommand)]
    Get(GetCommands),

    /// Inspect Azure CNI / CNS on a node.
    #[command(subcommand)]
    #[command(visible_aliases = ["azcni", "cni"])]
    Acn(AcnCommands),

    /// Run cilium CLI commands on a cilium pod's node.
    ///
    /// Works while the pod is in CrashLoopBackOff: the binary is taken from
    /// the mounted image and run in the pod's network namespace.
    Cilium {
        /// Cilium pod name.
        pod: String,

        /// Namespace for pod lookup.
        #[arg(short, long, default_value = DEFAULT_NAMESPACE)]
        namespace: String,

        /// Arguments passed to the cilium binary.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum GetCommands {
    /// List pods/containers on a node via crictl.
    #[command(visible_aliases = ["pod", "po"])]
    Pods {
        /// Node name.
        node: String,

        /// Show all containers including exited.
        #[arg(short, long, default_value = "false")]
        all: bool,
    },

    /// List network namespaces on a node.
    #[command(visible_aliases = ["networknamespaces", "nns"])]
    Netns {
        /// Node name.
        node: String,
    },
}

#[derive(Subcommand)]
enum AcnCommands {
    /// Get Azure CNI log files from a node.
    Logs {
        /// Node name.
        node: String,

        /// Number of log lines to show per file (0 = all).
        #[arg(long, default_value = "0")]
        tail: u32,
    },

    /// Get Azure CNI state files from a node.
    State {
        /// Node name.
        node: String,
    },
}

impl Cli {
    /// Environment configuration overridden by command-line flags.
    fn config(&self) -> Result<Config> {
        let mut config = Config::from_env()?;
        if let Some(kubectl) = &self.kubectl {
            config.kubectl_path.clone_from(kubectl);
        }
        if let Some(az) = &self.az {
            config.az_path.clone_from(az);
        }
        if let Some(lookup) = self.lookup {
            config.lookup = lookup;
        }
        if self.context.is_some() {
            config.kube_context.clone_from(&self.context);
        }
        if self.kubeconfig.is_some() {
            config.kubeconfig.clone_from(&self.kubeconfig);
        }
        if self.timeout.is_some() {
            config.call_timeout_secs = self.timeout;
        }
        Ok(config)
    }
}

fn print_result(result: &CommandResult) {
    if !result.stdout.is_empty() {
        println!("{}", result.stdout);
    }
    if !result.stderr.is_empty() {
        eprintln!("{}", result.stderr);
    }
}

async fn run_single(
    orchestrator: &Orchestrator,
    target: &Target,
    script: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    let result = orchestrator
        .run(target, script, cancel)
        .await
        .with_context(|| format!("Failed to run command on {target}"))?;
    print_result(&result);
    Ok(())
}

/// Turn `run` arguments into targets and the command to run on them.
fn plan_run(
    args: Vec<String>,
    pod: Option<String>,
    namespace: String,
) -> Result<(Vec<Target>, String)> {
    if let Some(pod) = pod {
        let [command] = <[String; 1]>::try_from(args).map_err(|_| {
            anyhow::anyhow!("when using --pod, provide exactly one argument: the command")
        })?;
        return Ok((vec![Target::pod(namespace, pod)], command));
    }

    let [nodes, command] = <[String; 2]>::try_from(args)
        .map_err(|_| anyhow::anyhow!("requires <node> <command> (or use --pod <pod> <command>)"))?;
    let targets: Vec<Target> = nodes
        .split(',')
        .map(str::trim)
        .filter(|node| !node.is_empty())
        .map(Target::node)
        .collect();
    if targets.is_empty() {
        bail!("no node given");
    }
    Ok((targets, command))
}

async fn run_command(
    orchestrator: &Orchestrator,
    targets: &[Target],
    command: &str,
    cancel: &CancellationToken,
) -> Result<()> {
    if let [target] = targets {
        return run_single(orchestrator, target, command, cancel).await;
    }

    let total = targets.len();
    let results = orchestrator.run_batch(targets, command, cancel).await;
    let mut failures = 0;
    for (target, result) in results {
        if let Target::Node(node) = &target {
            println!("==> {node} <==");
        }
        match result {
            Ok(result) => print_result(&result),
            Err(e) => {
                error!(node = %target, error = %e, "Command failed");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        bail!("command failed on {failures} of {total} nodes");
    }
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if matches!(cli.command, Commands::Version) {
        println!(
            "kubectl-vmss {} (commit: {})",
            env!("CARGO_PKG_VERSION"),
            option_env!("VMSS_GIT_COMMIT").unwrap_or("unknown")
        );
        return Ok(());
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling");
                cancel.cancel();
            }
        }
    });

    let orchestrator = cli.config()?.build_orchestrator().await?;

    match cli.command {
        Commands::Logs {
            pod,
            namespace,
            node,
            tail,
            previous,
        } => {
            let (target, container) = match (pod, node) {
                (None, None) => bail!("specify a pod name or --node"),
                (None, Some(node)) => (Target::node(node), None),
                (Some(pod), node) => {
                    let container = orchestrator
                        .resolve_container(&namespace, &pod, &cancel)
                        .await?;
                    let target = match node {
                        Some(node) => Target::node(node),
                        None => Target::pod(namespace, pod),
                    };
                    (target, Some(container))
                }
            };
            let script = scripts::logs_script(container.as_deref(), Some(tail), previous);
            run_single(&orchestrator, &target, &script, &cancel).await
        }

        Commands::Exec {
            pod,
            command,
            namespace,
            node,
        } => {
            let target = match node {
                Some(node) => Target::node(node),
                None => Target::pod(namespace, pod),
            };
            let script = command.as_deref().unwrap_or(DEFAULT_EXEC_SCRIPT);
            run_single(&orchestrator, &target, script, &cancel).await
        }

        Commands::Run {
            args,
            pod,
            namespace,
        } => {
            let (targets, command) = plan_run(args, pod, namespace)?;
            run_command(&orchestrator, &targets, &command, &cancel).await
        }

        Commands::Get(GetCommands::Pods { node, all }) => {
            run_single(
                &orchestrator,
                &Target::node(node),
                &scripts::pods_script(all),
                &cancel,
            )
            .await
        }

        Commands::Get(GetCommands::Netns { node }) => {
            run_single(&orchestrator, &Target::node(node), NETNS_SCRIPT, &cancel).await
        }

        Commands::Acn(AcnCommands::Logs { node, tail }) => {
            run_single(
                &orchestrator,
                &Target::node(node),
                &scripts::acn_logs_script(Some(tail)),
                &cancel,
            )
            .await
        }

        Commands::Acn(AcnCommands::State { node }) => {
            run_single(&orchestrator, &Target::node(node), ACN_STATE_SCRIPT, &cancel).await
        }

        Commands::Cilium {
            pod,
            namespace,
            args,
        } => {
            info!(cilium_args = %args.join(" "), "Running cilium");
            let script = scripts::cilium_script(&pod, &args);
            run_single(&orchestrator, &Target::pod(namespace, pod), &script, &cancel).await
        }

        Commands::Version => Ok(()),
    }
}
