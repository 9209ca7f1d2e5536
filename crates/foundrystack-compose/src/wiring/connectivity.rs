//! Security-group connectivity rules.

use serde_json::{Value, json};

use foundrystack_common::error::Result;
use foundrystack_common::types::LogicalId;

use crate::intrinsic;
use crate::template::{Resource, Template};

/// A security group, local to the template or imported.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityGroupRef {
    /// Short name used to derive rule logical ids.
    pub name: String,
    /// Group id value.
    pub group_id: Value,
}

impl SecurityGroupRef {
    /// Creates a reference from a name and a group id value.
    #[must_use]
    pub fn new(name: impl Into<String>, group_id: Value) -> Self {
        Self {
            name: name.into(),
            group_id,
        }
    }

    /// References a group defined in the same template.
    #[must_use]
    pub fn local(id: &LogicalId) -> Self {
        Self::new(id.as_str(), intrinsic::get_att(id, "GroupId"))
    }
}

/// Source of allowed traffic.
#[derive(Debug, Clone, PartialEq)]
pub enum Peer {
    /// Any IPv4 address.
    AnyIpv4,
    /// Members of a security group.
    Group(SecurityGroupRef),
}

impl Peer {
    fn name(&self) -> &str {
        match self {
            Self::AnyIpv4 => "AnyIpv4",
            Self::Group(group) => &group.name,
        }
    }
}

/// Allow TCP `port` on `target` from `peer`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectivityRule {
    /// Group receiving the traffic.
    pub target: SecurityGroupRef,
    /// Where the traffic comes from.
    pub peer: Peer,
    /// TCP port.
    pub port: u16,
    /// Rule description.
    pub description: String,
    /// Also allow egress from the peer group to the target on `port`.
    pub bidirectional: bool,
}

/// Accumulated connectivity rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Connections {
    rules: Vec<ConnectivityRule>,
}

impl Connections {
    /// Creates an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows `port` on `target` from anywhere.
    pub fn allow_from_any_ipv4(&mut self, target: &SecurityGroupRef, port: u16, description: &str) {
        self.rules.push(ConnectivityRule {
            target: target.clone(),
            peer: Peer::AnyIpv4,
            port,
            description: description.to_owned(),
            bidirectional: false,
        });
    }

    /// Allows `port` on `target` from `source`, ingress only.
    pub fn allow_from(&mut self, target: &SecurityGroupRef, source: &SecurityGroupRef, port: u16, description: &str) {
        self.rules.push(ConnectivityRule {
            target: target.clone(),
            peer: Peer::Group(source.clone()),
            port,
            description: description.to_owned(),
            bidirectional: false,
        });
    }

    /// Allows `port` between `source` and `target` in both directions.
    pub fn allow_between(&mut self, target: &SecurityGroupRef, source: &SecurityGroupRef, port: u16, description: &str) {
        self.rules.push(ConnectivityRule {
            target: target.clone(),
            peer: Peer::Group(source.clone()),
            port,
            description: description.to_owned(),
            bidirectional: true,
        });
    }

    /// Accumulated rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> &[ConnectivityRule] {
        &self.rules
    }

    /// Ports open on `target` to any IPv4 address.
    #[must_use]
    pub fn public_ports(&self, target: &SecurityGroupRef) -> Vec<u16> {
        self.rules
            .iter()
            .filter(|r| r.peer == Peer::AnyIpv4 && r.target == *target)
            .map(|r| r.port)
            .collect()
    }

    /// Adds one ingress resource per rule, plus an egress resource for
    /// bidirectional rules.
    ///
    /// # Errors
    ///
    /// Returns an error if two rules map to the same logical id.
    pub fn render(&self, template: &mut Template) -> Result<()> {
        for rule in &self.rules {
            let mut ingress = json!({
                "GroupId": rule.target.group_id,
                "IpProtocol": "tcp",
                "FromPort": rule.port,
                "ToPort": rule.port,
                "Description": rule.description,
            });
            if let Value::Object(map) = &mut ingress {
                let _ = match &rule.peer {
                    Peer::AnyIpv4 => map.insert("CidrIp".into(), json!("0.0.0.0/0")),
                    Peer::Group(group) => {
                        map.insert("SourceSecurityGroupId".into(), group.group_id.clone())
                    }
                };
            }
            let _ = template.add(
                format!(
                    "{}IngressFrom{}Port{}",
                    rule.target.name,
                    rule.peer.name(),
                    rule.port
                ),
                Resource::new("AWS::EC2::SecurityGroupIngress").with_properties(ingress),
            )?;

            if let (true, Peer::Group(source)) = (rule.bidirectional, &rule.peer) {
                let _ = template.add(
                    format!("{}EgressTo{}Port{}", source.name, rule.target.name, rule.port),
                    Resource::new("AWS::EC2::SecurityGroupEgress").with_properties(json!({
                        "GroupId": source.group_id,
                        "IpProtocol": "tcp",
                        "FromPort": rule.port,
                        "ToPort": rule.port,
                        "DestinationSecurityGroupId": rule.target.group_id,
                        "Description": rule.description,
                    })),
                )?;
            }
        }
        Ok(())
    }
}
