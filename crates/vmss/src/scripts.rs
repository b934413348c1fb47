//! Shell scripts run on nodes by the CLI subcommands.
//!
//! Scripts run as root under `RunShellScript`. Any value that originates from
//! the user is passed through [`shell_quote`].

use std::fmt::Write as _;

/// Default `exec` command when none is given.
pub const DEFAULT_EXEC_SCRIPT: &str =
    "echo 'Connected to node. Run commands:'; uname -a; echo '---'; ps aux | head -20";

/// Network namespaces, both anonymous (`lsns`) and named (`ip netns`).
pub const NETNS_SCRIPT: &str = r#"echo "=== Network Namespaces (lsns) ===" && lsns -t net -o NS,PID,USER,COMMAND 2>/dev/null || true && echo "" && echo "=== Named Network Namespaces (ip netns) ===" && ip netns list 2>/dev/null || echo "(none)""#;

/// Azure CNI / CNS configuration and state files.
pub const ACN_STATE_SCRIPT: &str = r#"for f in \
  /etc/cni/net.d/10-azure.conflist \
  /etc/cni/net.d/05-cilium.conflist \
  /etc/cni/net.d/05-cilium.conf; do
  if [ -f "$f" ]; then
    echo "=== $f ==="
    cat "$f"
    echo ""
  fi
done
for f in $(find /opt/cni/downloads/ -name '*.conflist' -o -name '*.json' 2>/dev/null); do
  echo "=== $f ==="
  cat "$f"
  echo ""
done
for d in /var/run/azure-cns /var/run/azure-vnet /var/lib/azure-cns /opt/cns; do
  if [ -d "$d" ]; then
    echo "=== $d ==="
    find "$d" -type f | while read sf; do
      echo "--- $sf ---"
      cat "$sf"
      echo ""
    done
  fi
done"#;

const ACN_LOG_FILES: &[&str] = &[
    "/var/log/azure-vnet.log",
    "/var/log/azure-vnet-ipam.log",
    "/var/log/azure-vnet-ipamv2.log",
    "/var/log/azure-vnet-telemetry.log",
    "/var/log/azure-cnimonitor.log",
    "/var/log/azure-cns/azure-cns.log",
];

/// Quote `value` as a single POSIX shell word.
pub fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// `crictl ps` table, optionally including exited containers.
pub fn pods_script(all: bool) -> String {
    if all {
        "crictl ps -a -o table".to_string()
    } else {
        "crictl ps -o table".to_string()
    }
}

/// Container logs via `crictl logs`.
///
/// Picks the running container (falling back to the newest exited one), or
/// with `previous` the most recent container that is not the running one.
/// Without a container name every container on the node matches.
pub fn logs_script(container: Option<&str>, tail: Option<u32>, previous: bool) -> String {
    let filter = container
        .map(|name| format!(" --name {}", shell_quote(name)))
        .unwrap_or_default();
    let label = shell_quote(container.unwrap_or("any container"));
    let tail_flag = tail
        .filter(|n| *n > 0)
        .map(|n| format!(" --tail={n}"))
        .unwrap_or_default();

    if previous {
        format!(
            r#"RUNNING=$(crictl ps{filter} -q | head -1); ALL=$(crictl ps -a{filter} -q); if [ -n "$RUNNING" ]; then CID=$(echo "$ALL" | grep -v "$RUNNING" | head -1); else CID=$(echo "$ALL" | head -1); fi; if [ -z "$CID" ]; then echo "No previous container found for "{label} >&2; exit 1; fi; crictl logs{tail_flag} $CID"#
        )
    } else {
        format!(
            r#"CID=$(crictl ps{filter} -q | head -1); if [ -z "$CID" ]; then CID=$(crictl ps -a{filter} -q | head -1); fi; if [ -z "$CID" ]; then echo "No container found for "{label} >&2; exit 1; fi; crictl logs{tail_flag} $CID"#
        )
    }
}

/// Azure CNI / CNS log files plus the `azure-cns` journal.
pub fn acn_logs_script(tail: Option<u32>) -> String {
    let tail = tail.filter(|n| *n > 0);
    let files = ACN_LOG_FILES.join(" ");
    let mut script = format!("for f in {files}; do\n  if [ -f \"$f\" ]; then\n");

    match tail {
        Some(n) => {
            let _ = write!(
                script,
                "    echo \"=== $f (last {n} lines) ===\"\n    tail -n {n} \"$f\"\n"
            );
        }
        None => script.push_str("    echo \"=== $f ===\"\n    cat \"$f\"\n"),
    }
    script.push_str("    echo \"\"\n  fi\ndone\n");

    match tail {
        Some(n) => {
            let _ = write!(
                script,
                "echo \"=== azure-cns (journalctl, last {n} lines) ===\"\njournalctl -u azure-cns -n {n} --no-pager 2>/dev/null || echo \"(not available)\""
            );
        }
        None => script.push_str(
            "echo \"=== azure-cns (journalctl) ===\"\njournalctl -u azure-cns --no-pager 2>/dev/null || echo \"(not available)\"",
        ),
    }
    script
}

/// Run the cilium CLI inside a cilium pod's network namespace.
///
/// The binary is taken from the mounted container image rather than a
/// running container, so this works while the agent is crash-looping:
///
/// 1. find the pod sandbox PID (the sandbox stays up across restarts)
/// 2. find the cilium-agent image via `crictl inspect`
/// 3. mount the image with `ctr images mount`
/// 4. `nsenter` into the pod's network namespace and run `cilium-dbg`/`cilium`
/// 5. unmount on exit
pub fn cilium_script(pod: &str, cilium_args: &[String]) -> String {
    let args: String = cilium_args
        .iter()
        .map(|arg| format!(" {}", shell_quote(arg)))
        .collect();

    format!(
        r#"set -e

POD_NAME={pod}
MNT="/tmp/cilium-rootfs-$$"

SANDBOX_ID=$(crictl pods --name "$POD_NAME" -q | head -1)
if [ -z "$SANDBOX_ID" ]; then
  echo "Error: no sandbox found for pod $POD_NAME" >&2
  exit 1
fi
SANDBOX_PID=$(crictl inspectp "$SANDBOX_ID" 2>/dev/null \
  | python3 -c "import sys,json; print(json.load(sys.stdin)['info']['pid'])" 2>/dev/null || true)
if [ -z "$SANDBOX_PID" ] || [ "$SANDBOX_PID" = "0" ]; then
  echo "Error: could not determine sandbox PID for pod $POD_NAME" >&2
  exit 1
fi

CID=$(crictl ps --name cilium-agent -q | head -1)
if [ -z "$CID" ]; then
  CID=$(crictl ps -a --name cilium-agent -q | head -1)
fi
if [ -z "$CID" ]; then
  echo "Error: no cilium-agent container found" >&2
  exit 1
fi
IMAGE=$(crictl inspect "$CID" 2>/dev/null \
  | python3 -c "import sys,json; d=json.load(sys.stdin); print(d['info']['config']['image']['image'])" 2>/dev/null || true)
if [ -z "$IMAGE" ]; then
  IMAGE=$(crictl inspect "$CID" 2>/dev/null \
    | python3 -c "import sys,json; d=json.load(sys.stdin); print(d['status']['imageRef'])" 2>/dev/null || true)
fi
if [ -z "$IMAGE" ]; then
  echo "Error: could not determine cilium container image" >&2
  exit 1
fi

cleanup() {{ ctr -n k8s.io images unmount "$MNT" >/dev/null 2>&1 || true; rmdir "$MNT" 2>/dev/null || true; }}
trap cleanup EXIT
mkdir -p "$MNT"
ctr -n k8s.io images mount "$IMAGE" "$MNT" >/dev/null 2>&1
if [ ! -x "$MNT/usr/bin/cilium-dbg" ] && [ ! -x "$MNT/usr/bin/cilium" ]; then
  echo "Error: cilium binary not found in image $IMAGE" >&2
  exit 1
fi

CILIUM_BIN="$MNT/usr/bin/cilium-dbg"
if [ ! -x "$CILIUM_BIN" ]; then
  CILIUM_BIN="$MNT/usr/bin/cilium"
fi

nsenter -t "$SANDBOX_PID" -n -- "$CILIUM_BIN"{args}
"#,
        pod = shell_quote(pod),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("cilium-agent"), "'cilium-agent'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_logs_script_current_container() {
        let script = logs_script(Some("cilium-agent"), Some(50), false);
        assert!(script.contains("crictl ps --name 'cilium-agent' -q"));
        assert!(script.contains("crictl ps -a --name 'cilium-agent' -q"));
        assert!(script.contains("crictl logs --tail=50 $CID"));
        assert!(!script.contains("RUNNING"));
    }

    #[test]
    fn test_logs_script_previous_container() {
        let script = logs_script(Some("cilium-agent"), None, true);
        assert!(script.contains(r#"grep -v "$RUNNING""#));
        assert!(script.contains("No previous container found for "));
        assert!(script.contains("crictl logs $CID"));
    }

    #[test]
    fn test_logs_script_without_container_or_tail() {
        let script = logs_script(None, Some(0), false);
        assert!(script.starts_with("CID=$(crictl ps -q | head -1)"));
        assert!(!script.contains("--tail"));
    }

    #[test]
    fn test_pods_script() {
        assert_eq!(pods_script(false), "crictl ps -o table");
        assert_eq!(pods_script(true), "crictl ps -a -o table");
    }

    #[test]
    fn test_acn_logs_script() {
        let all = acn_logs_script(None);
        assert!(all.contains("/var/log/azure-cns/azure-cns.log"));
        assert!(all.contains(r#"cat "$f""#));
        assert!(all.contains("journalctl -u azure-cns --no-pager"));

        let tailed = acn_logs_script(Some(500));
        assert!(tailed.contains(r#"tail -n 500 "$f""#));
        assert!(tailed.contains("journalctl -u azure-cns -n 500 --no-pager"));
        assert!(!tailed.contains(r#"cat "$f""#));
    }

    #[test]
    fn test_static_scripts() {
        assert!(NETNS_SCRIPT.contains("lsns -t net"));
        assert!(NETNS_SCRIPT.contains("ip netns list"));
        assert!(ACN_STATE_SCRIPT.contains("/etc/cni/net.d/10-azure.conflist"));
        assert!(ACN_STATE_SCRIPT.contains("/var/run/azure-cns"));
    }

    #[test]
    fn test_cilium_script() {
        let script = cilium_script(
            "cilium-6jnvz",
            &["bpf".to_string(), "policy".to_string(), "get".to_string(), "1234".to_string()],
        );
        assert!(script.contains("POD_NAME='cilium-6jnvz'"));
        assert!(script.contains(r#"nsenter -t "$SANDBOX_PID" -n -- "$CILIUM_BIN" 'bpf' 'policy' 'get' '1234'"#));
        assert!(script.contains("ctr -n k8s.io images mount"));
        assert!(script.contains("trap cleanup EXIT"));
    }

    #[test]
    fn test_cilium_script_quotes_hostile_args() {
        let script = cilium_script("p", &["status; rm -rf /".to_string()]);
        assert!(script.contains(r#""$CILIUM_BIN" 'status; rm -rf /'"#));
    }
}
