//! Public ingress.
//!
//! Exactly one mechanism is wired per deployment: the container port is
//! either bound straight to host ports, or registered behind a load
//! balancer. The two never coexist. Host ports need an instance; a
//! Fargate task is always reached through the load balancer.

use serde_json::json;

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::constants::{CONTAINER_NAME, CONTAINER_PORT, HTTPS_PORT, HTTP_PORT};
use foundrystack_common::error::{FoundryStackError, Result};
use foundrystack_common::types::{ComputeKind, IngressKind, PortMapping};

use super::connectivity::{Connections, SecurityGroupRef};
use crate::compute::ComputeUnit;
use crate::container;
use crate::intrinsic;
use crate::shared::SharedHandles;
use crate::template::{Output, Resource, Template};

/// Health-check path of the load-balancer target.
pub const HEALTH_CHECK_PATH: &str = "/";
/// Failed checks before the target is marked unhealthy.
pub const UNHEALTHY_THRESHOLD: u32 = 3;
/// Status codes counted as healthy. The application redirects to its
/// setup page, so 302 is healthy too.
pub const HEALTHY_HTTP_CODES: &str = "200,302";

/// Host-port bindings: 80 always, 443 iff TLS.
#[must_use]
pub fn host_port_mappings(tls_enabled: bool) -> Vec<PortMapping> {
    let mut mappings = vec![PortMapping::new(CONTAINER_PORT, HTTP_PORT)];
    if tls_enabled {
        mappings.push(PortMapping::new(CONTAINER_PORT, HTTPS_PORT));
    }
    mappings
}

/// Wires the configured ingress mechanism.
///
/// # Errors
///
/// Returns an error if a resource cannot be added or patched.
pub fn apply(
    config: &StackConfiguration,
    shared: &SharedHandles,
    compute: &ComputeUnit,
    template: &mut Template,
    connections: &mut Connections,
) -> Result<()> {
    tracing::info!(ingress = %config.ingress, "wiring ingress");
    match (config.ingress, compute.kind) {
        // awsvpc tasks must use identical host and container ports.
        (IngressKind::HostPort, ComputeKind::Fargate) => Err(FoundryStackError::conflict(
            "host-port ingress",
            "fargate compute",
        )),
        (IngressKind::HostPort, ComputeKind::Ec2) => {
            host_ports(config, shared, compute, template, connections)
        }
        (IngressKind::LoadBalancer, _) => load_balancer(shared, compute, template, connections),
    }
}

fn host_ports(
    config: &StackConfiguration,
    shared: &SharedHandles,
    compute: &ComputeUnit,
    template: &mut Template,
    connections: &mut Connections,
) -> Result<()> {
    let mappings = host_port_mappings(config.tls_enabled());
    container::set_port_mappings(template, &compute.task_definition, &mappings)?;
    for mapping in &mappings {
        let description = if mapping.host_port == HTTPS_PORT { "HTTPS" } else { "HTTP" };
        connections.allow_from_any_ipv4(&compute.security_group, mapping.host_port, description);
    }

    template.add_output(
        "PublicIp",
        Output::new(shared.address.public_ip.import(), "Public address of the Foundry host"),
    );
    Ok(())
}

fn load_balancer(
    shared: &SharedHandles,
    compute: &ComputeUnit,
    template: &mut Template,
    connections: &mut Connections,
) -> Result<()> {
    let group = template.add(
        "AlbSecurityGroup",
        Resource::new("AWS::EC2::SecurityGroup").with_properties(json!({
            "GroupDescription": "Allow HTTP traffic",
            "VpcId": shared.network.vpc_id.import(),
            "SecurityGroupEgress": [{ "CidrIp": "0.0.0.0/0", "IpProtocol": "-1" }],
        })),
    )?;
    let group = SecurityGroupRef::local(&group);
    connections.allow_from_any_ipv4(&group, HTTP_PORT, "HTTP");
    connections.allow_from(
        &compute.security_group,
        &group,
        CONTAINER_PORT,
        "Load balancer to container",
    );

    let balancer = template.add(
        "ApplicationLoadBalancer",
        Resource::new("AWS::ElasticLoadBalancingV2::LoadBalancer").with_properties(json!({
            "Type": "application",
            "Scheme": "internet-facing",
            "Subnets": shared.network.balancer_subnet_ids(),
            "SecurityGroups": [group.group_id],
        })),
    )?;

    let target_type = match compute.kind {
        ComputeKind::Ec2 => "instance",
        ComputeKind::Fargate => "ip",
    };
    let target_group = template.add(
        "EcsServiceTargetGroup",
        Resource::new("AWS::ElasticLoadBalancingV2::TargetGroup").with_properties(json!({
            "Port": CONTAINER_PORT,
            "Protocol": "HTTP",
            "TargetType": target_type,
            "VpcId": shared.network.vpc_id.import(),
            "HealthCheckPath": HEALTH_CHECK_PATH,
            "UnhealthyThresholdCount": UNHEALTHY_THRESHOLD,
            "Matcher": { "HttpCode": HEALTHY_HTTP_CODES },
        })),
    )?;

    let listener = template.add(
        "HttpListener",
        Resource::new("AWS::ElasticLoadBalancingV2::Listener").with_properties(json!({
            "LoadBalancerArn": intrinsic::reference(&balancer),
            "Port": HTTP_PORT,
            "Protocol": "HTTP",
            "DefaultActions": [{
                "Type": "forward",
                "TargetGroupArn": intrinsic::reference(&target_group),
            }],
        })),
    )?;

    container::set_port_mappings(
        template,
        &compute.task_definition,
        &[PortMapping::new(CONTAINER_PORT, CONTAINER_PORT)],
    )?;

    let service = template.resource_mut(&compute.service)?;
    service.push_property(
        "LoadBalancers",
        json!({
            "ContainerName": CONTAINER_NAME,
            "ContainerPort": CONTAINER_PORT,
            "TargetGroupArn": intrinsic::reference(&target_group),
        }),
    );
    let _ = service.depends_on.insert(listener);

    template.add_output(
        "LoadBalancerDns",
        Output::new(
            intrinsic::get_att(&balancer, "DNSName"),
            "DNS name of the load balancer serving Foundry",
        ),
    );
    Ok(())
}
