//! Fixed values of the deployed topology.

/// Port the application listens on inside the container.
pub const CONTAINER_PORT: u16 = 30000;

/// Public HTTP port, always exposed.
pub const HTTP_PORT: u16 = 80;

/// Public HTTPS port, exposed only when TLS is enabled.
pub const HTTPS_PORT: u16 = 443;

/// Default port of the managed file share (NFS).
pub const NFS_PORT: u16 = 2049;

/// Mount path of the persistent volume inside the container.
pub const DATA_MOUNT_PATH: &str = "/data";

/// Path of the object-store options file as seen from inside the container.
pub const CONTAINER_OPTIONS_PATH: &str = "/data/options.json";

/// Default name of the local options file whose presence enables the object store.
pub const DEFAULT_OPTIONS_FILE: &str = "options.json";

/// Default container image.
pub const DEFAULT_IMAGE: &str = "felddy/foundryvtt:release";

/// Default container timezone.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Name of the container inside the task definition.
pub const CONTAINER_NAME: &str = "FoundryContainer";

/// Name of the task volume backing [`DATA_MOUNT_PATH`].
pub const DATA_VOLUME_NAME: &str = "FoundryData";

/// Name given to the running service.
pub const SERVICE_NAME: &str = "EcsFoundryService";

/// Number of running tasks. The design is single-instance.
pub const DESIRED_COUNT: u32 = 1;

/// Instance type of the EC2 capacity fleet.
pub const INSTANCE_TYPE: &str = "t2.micro";

/// SSM parameter resolving the ECS-optimized Amazon Linux 2023 image.
pub const ECS_AMI_PARAMETER: &str = "/aws/service/ecs/optimized-ami/amazon-linux-2023/recommended/image_id";

/// Bootstrap configuration file written on the instance.
pub const BOOTSTRAP_CONFIG_PATH: &str = "/etc/config.json";

/// Initialization script written on the instance.
pub const INIT_SCRIPT_PATH: &str = "/etc/init.d/config.sh";

/// Device name of the attached block volume.
pub const BLOCK_DEVICE_NAME: &str = "/dev/xvdf";

/// Host mount point of the attached block volume.
pub const BLOCK_MOUNT_PATH: &str = "/mnt/foundry";

/// Size of a freshly created block volume, in GiB.
pub const BLOCK_VOLUME_SIZE_GIB: u32 = 10;

/// Host directory bound into the container for the host-path backend.
pub const HOST_DATA_PATH: &str = "/foundry/data";

/// CIDR of the shared virtual network.
pub const VPC_CIDR: &str = "10.0.0.0/24";

/// CIDR of the public subnet.
pub const PUBLIC_SUBNET_CIDR: &str = "10.0.0.0/28";

/// CIDR of the isolated subnet.
pub const ISOLATED_SUBNET_CIDR: &str = "10.0.0.16/28";

/// CIDR of the second-zone subnet that only the load balancer uses.
pub const BALANCER_SUBNET_CIDR: &str = "10.0.0.32/28";

/// CORS origin allowed when none are configured.
pub const DEFAULT_CORS_ORIGIN: &str = "*";

/// Default name of the shared stack.
pub const SHARED_STACK_NAME: &str = "SharedStack";

/// Default name of the application stack.
pub const APP_STACK_NAME: &str = "FoundryAwsStack";

/// Default output directory of a synthesized assembly.
pub const DEFAULT_OUTPUT_DIR: &str = "cdk.out";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "fstack";
