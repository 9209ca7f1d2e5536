//! Shared foundational resources.
//!
//! The shared stack owns the network, the reserved public address and the
//! optional asset bucket. It publishes each of them as an export and hands
//! the application stack a [`SharedHandles`] value that refers to those
//! exports. Nothing is copied across the boundary.

use serde_json::{Value, json};

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::constants::{
    BALANCER_SUBNET_CIDR, ISOLATED_SUBNET_CIDR, PUBLIC_SUBNET_CIDR, VPC_CIDR,
};
use foundrystack_common::error::Result;
use foundrystack_common::types::{IngressKind, LogicalId};

use crate::intrinsic;
use crate::stack::Stack;
use crate::template::{Output, Resource, Template};

/// Reference to a value exported by the shared stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    export: String,
}

impl Handle {
    fn new(stack: &str, output: &str) -> Self {
        Self {
            export: format!("{stack}:{output}"),
        }
    }

    /// Name of the export backing this handle.
    #[must_use]
    pub fn export_name(&self) -> &str {
        &self.export
    }

    /// The value as seen from a consuming stack.
    #[must_use]
    pub fn import(&self) -> Value {
        intrinsic::import_value(&self.export)
    }
}

/// Handles to the shared virtual network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTopology {
    /// Network id.
    pub vpc_id: Handle,
    /// The network's default security group.
    pub default_security_group: Handle,
    /// The single availability zone compute and storage live in.
    pub availability_zone: Handle,
    /// Public subnets (exactly one).
    pub public_subnets: Vec<Handle>,
    /// Isolated subnets (exactly one).
    pub isolated_subnets: Vec<Handle>,
    /// Subnets the load balancer spans: the public subnet plus one in a
    /// second zone. Empty unless ingress goes through a load balancer.
    pub balancer_subnets: Vec<Handle>,
}

impl NetworkTopology {
    /// Public subnet ids as imported values.
    #[must_use]
    pub fn public_subnet_ids(&self) -> Value {
        Value::Array(self.public_subnets.iter().map(Handle::import).collect())
    }

    /// Load-balancer subnet ids as imported values.
    #[must_use]
    pub fn balancer_subnet_ids(&self) -> Value {
        Value::Array(self.balancer_subnets.iter().map(Handle::import).collect())
    }
}

/// Handles to the reserved public address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedAddress {
    /// Allocation id, used to associate the address.
    pub allocation_id: Handle,
    /// The public IPv4 address.
    pub public_ip: Handle,
}

/// Handles to the asset bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectStore {
    /// Bucket name.
    pub bucket_name: Handle,
    /// Bucket ARN.
    pub bucket_arn: Handle,
}

/// Everything the application stack consumes from the shared stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedHandles {
    /// Name of the stack that exports these handles.
    pub stack_name: String,
    /// Network handles.
    pub network: NetworkTopology,
    /// Reserved address handles.
    pub address: ReservedAddress,
    /// Asset bucket handles, when the bucket is provisioned.
    pub object_store: Option<ObjectStore>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SubnetRole {
    /// Hosts compute; the load balancer spans it too.
    Public,
    /// Hosts storage; no route to the internet.
    Isolated,
    /// Second zone for the load balancer only.
    Balancer,
}

struct SubnetLayout {
    name: &'static str,
    cidr: &'static str,
    zone: u32,
    role: SubnetRole,
}

impl SubnetLayout {
    const fn is_public(&self) -> bool {
        !matches!(self.role, SubnetRole::Isolated)
    }
}

const SUBNETS: [SubnetLayout; 2] = [
    SubnetLayout {
        name: "PublicSubnet1",
        cidr: PUBLIC_SUBNET_CIDR,
        zone: 0,
        role: SubnetRole::Public,
    },
    SubnetLayout {
        name: "IsolatedSubnet1",
        cidr: ISOLATED_SUBNET_CIDR,
        zone: 0,
        role: SubnetRole::Isolated,
    },
];

const BALANCER_SUBNET: SubnetLayout = SubnetLayout {
    name: "PublicSubnet2",
    cidr: BALANCER_SUBNET_CIDR,
    zone: 1,
    role: SubnetRole::Balancer,
};

/// Builds the shared stack.
#[derive(Debug)]
pub struct SharedResourceProvisioner<'a> {
    config: &'a StackConfiguration,
    stack_name: String,
}

impl<'a> SharedResourceProvisioner<'a> {
    /// Creates a provisioner for the named stack.
    #[must_use]
    pub fn new(config: &'a StackConfiguration, stack_name: impl Into<String>) -> Self {
        Self {
            config,
            stack_name: stack_name.into(),
        }
    }

    /// Composes the shared stack and returns it with its handles.
    ///
    /// # Errors
    ///
    /// Returns an error if the template cannot be assembled.
    pub fn provision(&self) -> Result<(Stack, SharedHandles)> {
        tracing::info!(stack = %self.stack_name, "composing shared stack");
        let mut template = Template::new("Shared network, reserved address and asset storage");

        let network = self.network(&mut template)?;
        let address = self.address(&mut template)?;
        let object_store = if self.config.persist_s3_assets {
            Some(self.object_store(&mut template)?)
        } else {
            None
        };

        template.validate_references()?;

        let handles = SharedHandles {
            stack_name: self.stack_name.clone(),
            network,
            address,
            object_store,
        };
        let stack = Stack::new(
            self.stack_name.clone(),
            self.config.environment.clone(),
            template,
        );
        Ok((stack, handles))
    }

    fn network(&self, template: &mut Template) -> Result<NetworkTopology> {
        let vpc = template.add(
            "FreeTierVpc",
            Resource::new("AWS::EC2::VPC").with_properties(json!({
                "CidrBlock": VPC_CIDR,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": [
                    { "Key": "Name", "Value": format!("{}/FreeTierVpc", self.stack_name) },
                    { "Key": "Environment", "Value": "FreeTier" },
                ],
            })),
        )?;

        let gateway = template.add(
            "InternetGateway",
            Resource::new("AWS::EC2::InternetGateway").with_properties(json!({
                "Tags": [{ "Key": "Environment", "Value": "FreeTier" }],
            })),
        )?;
        let attachment = template.add(
            "VpcGatewayAttachment",
            Resource::new("AWS::EC2::VPCGatewayAttachment").with_properties(json!({
                "VpcId": intrinsic::reference(&vpc),
                "InternetGatewayId": intrinsic::reference(&gateway),
            })),
        )?;

        let balanced = self.config.ingress == IngressKind::LoadBalancer;
        let balancer_zone = balanced.then_some(&BALANCER_SUBNET);
        let mut public_subnets = Vec::new();
        let mut isolated_subnets = Vec::new();
        let mut balancer_subnets = Vec::new();
        for layout in SUBNETS.iter().chain(balancer_zone) {
            let subnet = self.subnet(template, &vpc, layout)?;
            let route_table = template.add(
                format!("{}RouteTable", layout.name),
                Resource::new("AWS::EC2::RouteTable").with_properties(json!({
                    "VpcId": intrinsic::reference(&vpc),
                })),
            )?;
            let _ = template.add(
                format!("{}RouteTableAssociation", layout.name),
                Resource::new("AWS::EC2::SubnetRouteTableAssociation").with_properties(json!({
                    "RouteTableId": intrinsic::reference(&route_table),
                    "SubnetId": intrinsic::reference(&subnet),
                })),
            )?;

            let handle = self.publish(
                template,
                &format!("{}Id", layout.name),
                intrinsic::reference(&subnet),
                "Subnet id",
            );
            if layout.is_public() {
                // Public subnets route to the internet gateway; there is no NAT.
                let _ = template.add(
                    format!("{}DefaultRoute", layout.name),
                    Resource::new("AWS::EC2::Route")
                        .with_properties(json!({
                            "RouteTableId": intrinsic::reference(&route_table),
                            "DestinationCidrBlock": "0.0.0.0/0",
                            "GatewayId": intrinsic::reference(&gateway),
                        }))
                        .depends_on(&attachment),
                )?;
            }
            match layout.role {
                SubnetRole::Public => {
                    if balanced {
                        balancer_subnets.push(handle.clone());
                    }
                    public_subnets.push(handle);
                }
                SubnetRole::Isolated => isolated_subnets.push(handle),
                SubnetRole::Balancer => balancer_subnets.push(handle),
            }
        }

        let vpc_id = self.publish(
            template,
            "VpcId",
            intrinsic::reference(&vpc),
            "Id of the shared VPC",
        );
        let default_security_group = self.publish(
            template,
            "VpcDefaultSecurityGroup",
            intrinsic::get_att(&vpc, "DefaultSecurityGroup"),
            "Default security group of the shared VPC",
        );
        let availability_zone = self.publish(
            template,
            "AvailabilityZone",
            intrinsic::get_att(&LogicalId::new(SUBNETS[0].name), "AvailabilityZone"),
            "Single availability zone of the shared VPC",
        );

        Ok(NetworkTopology {
            vpc_id,
            default_security_group,
            availability_zone,
            public_subnets,
            isolated_subnets,
            balancer_subnets,
        })
    }

    fn subnet(&self, template: &mut Template, vpc: &LogicalId, layout: &SubnetLayout) -> Result<LogicalId> {
        let kind = if layout.is_public() { "Public" } else { "Isolated" };
        template.add(
            layout.name,
            Resource::new("AWS::EC2::Subnet").with_properties(json!({
                "VpcId": intrinsic::reference(vpc),
                "CidrBlock": layout.cidr,
                "AvailabilityZone": intrinsic::availability_zone(layout.zone),
                "MapPublicIpOnLaunch": layout.is_public(),
                "Tags": [
                    { "Key": "Name", "Value": format!("{}/{}", self.stack_name, layout.name) },
                    { "Key": "SubnetType", "Value": kind },
                    { "Key": "Environment", "Value": "FreeTier" },
                ],
            })),
        )
    }

    fn address(&self, template: &mut Template) -> Result<ReservedAddress> {
        let eip = template.add(
            "Ec2Eip",
            Resource::new("AWS::EC2::EIP").with_properties(json!({ "Domain": "vpc" })),
        )?;
        Ok(ReservedAddress {
            allocation_id: self.publish(
                template,
                "EipAllocationId",
                intrinsic::get_att(&eip, "AllocationId"),
                "Allocation id of the reserved address",
            ),
            public_ip: self.publish(
                template,
                "EipPublicIp",
                intrinsic::reference(&eip),
                "Reserved public address",
            ),
        })
    }

    fn object_store(&self, template: &mut Template) -> Result<ObjectStore> {
        let bucket = template.add(
            "AssetsBucket",
            Resource::new("AWS::S3::Bucket")
                .with_properties(json!({
                    "CorsConfiguration": {
                        "CorsRules": [{
                            "AllowedOrigins": self.config.allowed_origins,
                            "AllowedMethods": ["GET", "PUT", "POST", "HEAD"],
                            "AllowedHeaders": ["*"],
                            "MaxAge": 3000,
                        }],
                    },
                    "PublicAccessBlockConfiguration": {
                        "BlockPublicAcls": false,
                        "BlockPublicPolicy": false,
                        "IgnorePublicAcls": false,
                        "RestrictPublicBuckets": false,
                    },
                    "OwnershipControls": {
                        "Rules": [{ "ObjectOwnership": "BucketOwnerPreferred" }],
                    },
                }))
                .retain(),
        )?;
        let _ = template.add(
            "AssetsBucketPolicy",
            Resource::new("AWS::S3::BucketPolicy").with_properties(json!({
                "Bucket": intrinsic::reference(&bucket),
                "PolicyDocument": {
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Sid": "PublicRead",
                        "Effect": "Allow",
                        "Principal": { "AWS": "*" },
                        "Action": "s3:GetObject",
                        "Resource": intrinsic::sub(format!("${{{bucket}.Arn}}/*")),
                    }],
                },
            })),
        )?;

        Ok(ObjectStore {
            bucket_name: self.publish(
                template,
                "AssetsBucketName",
                intrinsic::reference(&bucket),
                "Name of the public asset bucket",
            ),
            bucket_arn: self.publish(
                template,
                "AssetsBucketArn",
                intrinsic::get_att(&bucket, "Arn"),
                "ARN of the public asset bucket",
            ),
        })
    }

    fn publish(&self, template: &mut Template, name: &str, value: Value, description: &str) -> Handle {
        let handle = Handle::new(&self.stack_name, name);
        template.add_output(
            name,
            Output::new(value, description).exported_as(handle.export_name()),
        );
        handle
    }
}
