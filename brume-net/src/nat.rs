//! Per-cluster NAT rule set

use std::sync::Arc;
use tracing::{debug, warn};

use brume_core::{ProcessId, Result};

use crate::port::{NatRule, NetScope, SystemNetworking};

/// The translation and forwarding rules for one cluster's namespace
///
/// Exactly three rules: masquerade on the external interface, return-traffic
/// acceptance toward the bridge side, and new-traffic acceptance from the
/// bridge side outward. The set installs and removes as a matched unit so
/// repeated provision/teardown cycles never leak firewall state.
pub struct NatRuleSet {
    scope: NetScope,
    rules: Vec<NatRule>,
    net: Arc<dyn SystemNetworking>,
}

impl NatRuleSet {
    /// Build the rule set for a cluster's namespace
    ///
    /// `external_if` is the namespace's external-facing interface;
    /// `inner_if` is the namespace-side veth end toward the bridge domain.
    #[must_use]
    pub fn for_cluster(
        net: Arc<dyn SystemNetworking>,
        pid: ProcessId,
        external_if: &str,
        inner_if: &str,
    ) -> Self {
        let rules = vec![
            NatRule::Masquerade {
                out_if: external_if.to_string(),
            },
            NatRule::ForwardReturn {
                in_if: external_if.to_string(),
                out_if: inner_if.to_string(),
            },
            NatRule::ForwardNew {
                in_if: inner_if.to_string(),
                out_if: external_if.to_string(),
            },
        ];

        Self {
            scope: NetScope::Namespace(pid),
            rules,
            net,
        }
    }

    /// The rules in installation order
    #[must_use]
    pub fn rules(&self) -> &[NatRule] {
        &self.rules
    }

    /// Install the full set
    ///
    /// Callers serialize installations globally; firewall rule insertion is
    /// not atomic across the whole ruleset.
    ///
    /// # Errors
    /// Returns the failing rule's error after removing the rules that were
    /// already installed, so a partial set never remains
    pub async fn install(&self) -> Result<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            if let Err(error) = self.net.install_nat_rule(self.scope, rule).await {
                for installed in self.rules[..index].iter().rev() {
                    if let Err(undo) = self.net.remove_nat_rule(self.scope, installed).await {
                        warn!(rule = %installed, error = %undo, "Failed to undo NAT rule");
                    }
                }
                return Err(error);
            }
        }

        debug!(scope = %self.scope, rules = self.rules.len(), "NAT rules installed");
        Ok(())
    }

    /// Remove exactly the rules `install` added, best-effort
    ///
    /// Individual removal failures are collected rather than raised so one
    /// stuck rule does not block the rest of a teardown.
    pub async fn remove(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        for rule in self.rules.iter().rev() {
            if let Err(error) = self.net.remove_nat_rule(self.scope, rule).await {
                warn!(rule = %rule, error = %error, "Failed to remove NAT rule");
                warnings.push(format!("{rule}: {error}"));
            }
        }

        if warnings.is_empty() {
            debug!(scope = %self.scope, "NAT rules removed");
        }
        warnings
    }
}

impl std::fmt::Debug for NatRuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatRuleSet")
            .field("scope", &self.scope)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockNetworking;

    fn rule_set(net: Arc<MockNetworking>) -> NatRuleSet {
        NatRuleSet::for_cluster(net, ProcessId::from_raw(4242), "fog-eth0", "fog-eth1")
    }

    #[tokio::test]
    async fn test_exactly_three_rules() {
        let net = Arc::new(MockNetworking::new());
        let nat = rule_set(net.clone());

        assert_eq!(nat.rules().len(), 3);
        assert!(matches!(nat.rules()[0], NatRule::Masquerade { .. }));
        assert!(matches!(nat.rules()[1], NatRule::ForwardReturn { .. }));
        assert!(matches!(nat.rules()[2], NatRule::ForwardNew { .. }));
    }

    #[tokio::test]
    async fn test_install_then_remove_leaves_nothing() {
        let net = Arc::new(MockNetworking::new());
        let nat = rule_set(net.clone());

        nat.install().await.unwrap();
        assert_eq!(net.nat_rule_count().await, 3);

        let warnings = nat.remove().await;
        assert!(warnings.is_empty());
        assert_eq!(net.nat_rule_count().await, 0);
    }

    #[tokio::test]
    async fn test_partial_install_rolls_back() {
        let net = Arc::new(MockNetworking::new());
        let nat = rule_set(net.clone());

        // First two rules land, third fails: both must be removed again
        net.fail_after("install_nat_rule", 2).await;

        assert!(nat.install().await.is_err());
        assert_eq!(net.nat_rule_count().await, 0);
    }

    #[tokio::test]
    async fn test_remove_collects_warnings() {
        let net = Arc::new(MockNetworking::new());
        let nat = rule_set(net.clone());

        nat.install().await.unwrap();
        net.fail_on("remove_nat_rule").await;

        let warnings = nat.remove().await;
        assert_eq!(warnings.len(), 1);
        // The other two rules were still removed
        assert_eq!(net.nat_rule_count().await, 1);
    }
}
