//! Domain primitive types used across the Foundrystack workspace.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FoundryStackError;

/// Stable logical identifier of a resource inside a template.
///
/// Logical ids are what make re-composition idempotent: the same
/// configuration always yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalId(String);

impl LogicalId {
    /// Creates a logical id from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LogicalId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for LogicalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Execution model of the container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComputeKind {
    /// Fixed-size-one autoscaling fleet of instances.
    #[default]
    Ec2,
    /// Serverless task launch.
    Fargate,
}

impl fmt::Display for ComputeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ec2 => write!(f, "ec2"),
            Self::Fargate => write!(f, "fargate"),
        }
    }
}

impl FromStr for ComputeKind {
    type Err = FoundryStackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ec2" => Ok(Self::Ec2),
            "fargate" => Ok(Self::Fargate),
            other => Err(FoundryStackError::Config {
                message: format!("unknown compute kind \"{other}\" (expected ec2 or fargate)"),
            }),
        }
    }
}

/// Explicitly requested storage generation.
///
/// This is the raw switch. The resolved backend is
/// [`StorageKind`](crate::config::StorageKind), which also accounts for
/// an existing file share or a snapshot identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageSelection {
    /// Managed network file share.
    SharedFs,
    /// Durable block volume attached to the instance.
    BlockVolume,
    /// Directory on the instance's local disk.
    HostPath,
}

impl fmt::Display for StorageSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SharedFs => write!(f, "shared-fs"),
            Self::BlockVolume => write!(f, "block-volume"),
            Self::HostPath => write!(f, "host-path"),
        }
    }
}

impl FromStr for StorageSelection {
    type Err = FoundryStackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared-fs" | "efs" => Ok(Self::SharedFs),
            "block-volume" | "ebs" => Ok(Self::BlockVolume),
            "host-path" => Ok(Self::HostPath),
            other => Err(FoundryStackError::Config {
                message: format!(
                    "unknown storage kind \"{other}\" (expected shared-fs, block-volume or host-path)"
                ),
            }),
        }
    }
}

/// Public ingress mechanism. Exactly one is active per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngressKind {
    /// Container port bound directly to host ports.
    #[default]
    HostPort,
    /// Service registered behind an application load balancer.
    LoadBalancer,
}

impl fmt::Display for IngressKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostPort => write!(f, "host-port"),
            Self::LoadBalancer => write!(f, "load-balancer"),
        }
    }
}

impl FromStr for IngressKind {
    type Err = FoundryStackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host-port" => Ok(Self::HostPort),
            "load-balancer" | "alb" => Ok(Self::LoadBalancer),
            other => Err(FoundryStackError::Config {
                message: format!(
                    "unknown ingress kind \"{other}\" (expected host-port or load-balancer)"
                ),
            }),
        }
    }
}

/// A container-to-host port binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortMapping {
    /// Port inside the container.
    pub container_port: u16,
    /// Port on the host (or task network interface).
    pub host_port: u16,
}

impl PortMapping {
    /// Creates a TCP port mapping.
    #[must_use]
    pub const fn new(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }
}

impl fmt::Display for PortMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.container_port, self.host_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compute_kind_parses_case_insensitively() {
        assert_eq!("EC2".parse::<ComputeKind>().ok(), Some(ComputeKind::Ec2));
        assert_eq!(
            " Fargate ".parse::<ComputeKind>().ok(),
            Some(ComputeKind::Fargate)
        );
    }

    #[test]
    fn compute_kind_rejects_unknown() {
        let err = "lambda".parse::<ComputeKind>().unwrap_err();
        assert!(err.to_string().contains("lambda"));
    }

    #[test]
    fn storage_selection_accepts_aliases() {
        assert_eq!(
            "efs".parse::<StorageSelection>().ok(),
            Some(StorageSelection::SharedFs)
        );
        assert_eq!(
            "ebs".parse::<StorageSelection>().ok(),
            Some(StorageSelection::BlockVolume)
        );
    }

    #[test]
    fn display_matches_parse() {
        for kind in [IngressKind::HostPort, IngressKind::LoadBalancer] {
            assert_eq!(kind.to_string().parse::<IngressKind>().ok(), Some(kind));
        }
    }

    #[test]
    fn port_mapping_display() {
        assert_eq!(PortMapping::new(30000, 80).to_string(), "30000->80");
    }
}
