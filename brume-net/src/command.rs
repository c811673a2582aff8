//! Command-backed networking implementation
//!
//! Drives `ip` and `iptables` directly; namespace-scoped operations run
//! under `nsenter -t <pid> -n`. Bridge domains are realized through the
//! container runtime's network API so launched containers can attach to
//! them by name.

use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::process::Output;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use brume_core::{ClusterSubnet, Error, ProcessId, Result};

use crate::port::{NatRule, NetScope, RouteOutcome, StaticRoute, SystemNetworking};

/// Default deadline for a single external command
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Production networking backend
///
/// Every external invocation is bounded by a timeout; a timeout is reported
/// as failure of that step and triggers the caller's normal cleanup path.
#[derive(Debug, Clone)]
pub struct CommandNetworking {
    timeout: Duration,
}

impl CommandNetworking {
    /// Create a backend with the default command timeout
    #[must_use]
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-command timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run a command, bounded by the configured timeout
    async fn run(&self, operation: &str, argv: &[String]) -> Result<Output> {
        debug!(operation, command = %argv.join(" "), "Running command");

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&argv[0]).args(&argv[1..]).output(),
        )
        .await
        .map_err(|_| Error::Timeout {
            operation: operation.to_string(),
        })??;

        Ok(output)
    }

    /// Run a command and surface stderr through `map_err` on failure
    async fn run_checked(
        &self,
        operation: &str,
        argv: &[String],
        map_err: impl FnOnce(String) -> Error,
    ) -> Result<Output> {
        let output = self.run(operation, argv).await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(map_err(format!("{operation}: {}", stderr.trim())));
        }

        Ok(output)
    }
}

impl Default for CommandNetworking {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the argv for a command, entering the namespace when scoped
fn scoped(scope: NetScope, argv: &[&str]) -> Vec<String> {
    let mut full = Vec::with_capacity(argv.len() + 4);
    if let NetScope::Namespace(pid) = scope {
        let pid = pid.to_string();
        for part in ["nsenter", "-t", pid.as_str(), "-n"] {
            full.push(part.to_string());
        }
    }
    full.extend(argv.iter().map(ToString::to_string));
    full
}

/// iptables argv for a rule; `action` is `-A` to append or `-D` to delete
fn nat_rule_args(rule: &NatRule, action: &str) -> Vec<String> {
    let args: Vec<&str> = match rule {
        NatRule::Masquerade { out_if } => vec![
            "iptables",
            "-t",
            "nat",
            action,
            "POSTROUTING",
            "-o",
            out_if,
            "-j",
            "MASQUERADE",
        ],
        NatRule::ForwardReturn { in_if, out_if } => vec![
            "iptables",
            action,
            "FORWARD",
            "-i",
            in_if,
            "-o",
            out_if,
            "-m",
            "state",
            "--state",
            "RELATED,ESTABLISHED",
            "-j",
            "ACCEPT",
        ],
        NatRule::ForwardNew { in_if, out_if } => vec![
            "iptables", action, "FORWARD", "-i", in_if, "-o", out_if, "-j", "ACCEPT",
        ],
    };
    args.into_iter().map(ToString::to_string).collect()
}

#[async_trait]
impl SystemNetworking for CommandNetworking {
    async fn create_veth(&self, ns_end: &str, bridge_end: &str) -> Result<()> {
        for name in [ns_end, bridge_end] {
            if self.link_exists(NetScope::Host, name).await? {
                return Err(Error::ResourceCreation {
                    message: format!("link {name} already exists"),
                });
            }
        }

        let argv = scoped(
            NetScope::Host,
            &[
                "ip", "link", "add", ns_end, "type", "veth", "peer", "name", bridge_end,
            ],
        );
        self.run_checked("create veth", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;

        debug!(ns_end, bridge_end, "Created veth pair");
        Ok(())
    }

    async fn move_to_namespace(&self, ifname: &str, pid: ProcessId) -> Result<()> {
        if !self.namespace_alive(pid).await {
            return Err(Error::NamespaceUnavailable { pid: pid.as_raw() });
        }

        let pid_str = pid.to_string();
        let argv = scoped(
            NetScope::Host,
            &["ip", "link", "set", "netns", pid_str.as_str(), "dev", ifname],
        );
        self.run_checked("move link to namespace", &argv, |message| {
            if message.contains("No such process") {
                Error::NamespaceUnavailable { pid: pid.as_raw() }
            } else {
                Error::ResourceCreation { message }
            }
        })
        .await?;

        debug!(ifname, pid = pid.as_raw(), "Moved link into namespace");
        Ok(())
    }

    async fn set_link_up(&self, scope: NetScope, ifname: &str) -> Result<()> {
        let argv = scoped(scope, &["ip", "link", "set", "dev", ifname, "up"]);
        self.run_checked("set link up", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;
        Ok(())
    }

    async fn assign_address(
        &self,
        scope: NetScope,
        ifname: &str,
        addr: Ipv4Addr,
        prefix: u8,
    ) -> Result<()> {
        // `replace` keeps this idempotent across repeated provision attempts
        let cidr = format!("{addr}/{prefix}");
        let argv = scoped(scope, &["ip", "addr", "replace", &cidr, "dev", ifname]);
        self.run_checked("assign address", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;

        debug!(%scope, ifname, %cidr, "Assigned address");
        Ok(())
    }

    async fn install_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()> {
        let inner = nat_rule_args(rule, "-A");
        let inner_refs: Vec<&str> = inner.iter().map(String::as_str).collect();
        let argv = scoped(scope, &inner_refs);
        self.run_checked("install nat rule", &argv, |message| {
            Error::ResourceCreation { message }
        })
        .await?;

        debug!(%scope, %rule, "Installed NAT rule");
        Ok(())
    }

    async fn remove_nat_rule(&self, scope: NetScope, rule: &NatRule) -> Result<()> {
        let inner = nat_rule_args(rule, "-D");
        let inner_refs: Vec<&str> = inner.iter().map(String::as_str).collect();
        let argv = scoped(scope, &inner_refs);
        self.run_checked("remove nat rule", &argv, |message| {
            Error::ResourceCreation { message }
        })
        .await?;

        debug!(%scope, %rule, "Removed NAT rule");
        Ok(())
    }

    async fn create_bridge(&self, name: &str, subnet: ClusterSubnet) -> Result<()> {
        // The runtime's network API owns the bridge so containers can attach
        // to it by name; the kernel bridge name is pinned to ours.
        let subnet_arg = subnet.to_string();
        let bridge_opt = format!("com.docker.network.bridge.name={name}");
        let argv = scoped(
            NetScope::Host,
            &[
                "docker",
                "network",
                "create",
                "--driver",
                "bridge",
                "--subnet",
                &subnet_arg,
                "--opt",
                &bridge_opt,
                name,
            ],
        );
        self.run_checked("create bridge", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;

        debug!(name, %subnet, "Created bridge domain");
        Ok(())
    }

    async fn delete_bridge(&self, name: &str) -> Result<()> {
        let argv = scoped(NetScope::Host, &["docker", "network", "rm", name]);
        self.run_checked("delete bridge", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;

        debug!(name, "Deleted bridge domain");
        Ok(())
    }

    async fn attach_interface(&self, bridge: &str, ifname: &str) -> Result<()> {
        if !self.link_exists(NetScope::Host, ifname).await? {
            return Err(Error::Attach {
                message: format!("interface {ifname} does not exist"),
            });
        }

        let argv = scoped(
            NetScope::Host,
            &["ip", "link", "set", "dev", ifname, "master", bridge],
        );
        self.run_checked("attach interface", &argv, |message| Error::Attach {
            message,
        })
        .await?;

        debug!(bridge, ifname, "Attached interface to bridge");
        Ok(())
    }

    async fn add_route(&self, scope: NetScope, route: &StaticRoute) -> Result<RouteOutcome> {
        let dest = route.dest.to_string();
        let via = route.via.to_string();
        let argv = scoped(
            scope,
            &[
                "ip",
                "route",
                "add",
                &dest,
                "via",
                &via,
                "dev",
                &route.device,
            ],
        );
        let output = self.run("add route", &argv).await?;

        if output.status.success() {
            debug!(%scope, %route, "Installed route");
            return Ok(RouteOutcome::Installed);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.contains("File exists") {
            return Err(Error::RouteInstall {
                message: format!("{route}: {}", stderr.trim()),
            });
        }

        // Something already covers the destination; identical routes are
        // fine, a different next hop is a conflict.
        let show = scoped(scope, &["ip", "route", "show", &dest]);
        let existing = self
            .run_checked("show route", &show, |message| Error::RouteInstall {
                message,
            })
            .await?;

        let stdout = String::from_utf8_lossy(&existing.stdout);
        if stdout.contains(&format!("via {via}")) {
            debug!(%scope, %route, "Route already present");
            Ok(RouteOutcome::AlreadyPresent)
        } else {
            Err(Error::RouteInstall {
                message: format!(
                    "{route}: conflicting route already installed: {}",
                    stdout.trim()
                ),
            })
        }
    }

    async fn delete_link(&self, scope: NetScope, ifname: &str) -> Result<()> {
        let argv = scoped(scope, &["ip", "link", "del", ifname]);
        self.run_checked("delete link", &argv, |message| Error::ResourceCreation {
            message,
        })
        .await?;

        debug!(%scope, ifname, "Deleted link");
        Ok(())
    }

    async fn link_exists(&self, scope: NetScope, ifname: &str) -> Result<bool> {
        let argv = scoped(scope, &["ip", "link", "show", ifname]);
        let output = self.run("query link", &argv).await?;
        Ok(output.status.success())
    }

    async fn namespace_alive(&self, pid: ProcessId) -> bool {
        // Signal 0 probes existence without delivering anything
        match nix::sys::signal::kill(pid.as_nix_pid(), None::<nix::sys::signal::Signal>) {
            Ok(()) => true,
            Err(errno) => {
                if errno != nix::errno::Errno::ESRCH {
                    warn!(pid = pid.as_raw(), %errno, "Unexpected liveness probe result");
                }
                false
            }
        }
    }
}
