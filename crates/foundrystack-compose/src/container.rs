//! The application container.
//!
//! The container always listens on 30000 and keeps its state under `/data`.
//! Port bindings are decided later by the ingress wiring and patched into
//! the rendered definition with [`set_port_mappings`].

use std::collections::BTreeMap;

use serde_json::{Value, json};

use foundrystack_common::config::StackConfiguration;
use foundrystack_common::constants::{CONTAINER_NAME, CONTAINER_OPTIONS_PATH, CONTAINER_PORT};
use foundrystack_common::error::{FoundryStackError, Result};
use foundrystack_common::types::{LogicalId, PortMapping};

use crate::intrinsic;
use crate::storage::StorageBackend;
use crate::template::Template;

const MEMORY_RESERVATION_MIB: u32 = 512;
const LOG_STREAM_PREFIX: &str = "foundry";

/// Container specification before rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name inside the task definition.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Environment variables, sorted by name.
    pub environment: BTreeMap<String, String>,
    /// Health-check command.
    pub health_check: Vec<String>,
}

impl ContainerSpec {
    /// Builds the container from the configuration.
    ///
    /// `object_store` is whether the shared stack provides an asset bucket;
    /// the container is then pointed at its in-container options file.
    #[must_use]
    pub fn from_config(config: &StackConfiguration, object_store: bool) -> Self {
        let settings = &config.container;
        let mut environment = BTreeMap::new();
        let mut put = |key: &str, value: Option<&String>| {
            if let Some(value) = value {
                let _ = environment.insert(key.to_owned(), value.clone());
            }
        };
        put("FOUNDRY_RELEASE_URL", settings.release_url.as_ref());
        put("FOUNDRY_USERNAME", settings.username.as_ref());
        put("FOUNDRY_PASSWORD", settings.password.as_ref());
        put("FOUNDRY_ADMIN_KEY", settings.admin_key.as_ref());
        put("TIMEZONE", Some(&settings.timezone));
        if let Some(tls) = &config.tls {
            put("FOUNDRY_SSL_CERT", tls.cert.as_ref());
            put("FOUNDRY_SSL_KEY", tls.key.as_ref());
        }
        if object_store {
            put("FOUNDRY_AWS_CONFIG", Some(&CONTAINER_OPTIONS_PATH.to_owned()));
        }

        let scheme = if config.tls_enabled() { "https" } else { "http" };
        let health_check = vec![
            "CMD-SHELL".to_owned(),
            format!("curl -fsk {scheme}://localhost:{CONTAINER_PORT} || exit 1"),
        ];

        Self {
            name: CONTAINER_NAME.to_owned(),
            image: settings.image.clone(),
            environment,
            health_check,
        }
    }

    /// Renders the container definition. Port mappings start empty.
    #[must_use]
    pub fn to_definition(&self, storage: &StorageBackend, log_group: &LogicalId) -> Value {
        let environment: Vec<Value> = self
            .environment
            .iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect();

        json!({
            "Name": self.name,
            "Image": self.image,
            "Essential": true,
            "MemoryReservation": MEMORY_RESERVATION_MIB,
            "Environment": environment,
            "PortMappings": [],
            "MountPoints": [storage.mount_point()],
            "HealthCheck": {
                "Command": self.health_check,
                "Interval": 30,
                "Timeout": 5,
                "Retries": 3,
                "StartPeriod": 60,
            },
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": intrinsic::reference(log_group),
                    "awslogs-stream-prefix": LOG_STREAM_PREFIX,
                    "awslogs-region": { "Ref": "AWS::Region" },
                },
            },
        })
    }
}

/// Replaces the port mappings of the application container in a task
/// definition.
///
/// # Errors
///
/// Returns an error if the task definition or its container is missing.
pub fn set_port_mappings(
    template: &mut Template,
    task_definition: &LogicalId,
    mappings: &[PortMapping],
) -> Result<()> {
    let rendered: Vec<Value> = mappings
        .iter()
        .map(|m| {
            json!({
                "ContainerPort": m.container_port,
                "HostPort": m.host_port,
                "Protocol": "tcp",
            })
        })
        .collect();

    let resource = template.resource_mut(task_definition)?;
    let container = resource
        .properties
        .get_mut("ContainerDefinitions")
        .and_then(Value::as_array_mut)
        .and_then(|defs| defs.iter_mut().find(|d| d["Name"] == CONTAINER_NAME))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| FoundryStackError::NotFound {
            kind: "container definition",
            id: format!("{CONTAINER_NAME} in {task_definition}"),
        })?;
    let _ = container.insert("PortMappings".into(), Value::Array(rendered));
    Ok(())
}

/// Reads the port mappings of the application container back out of a
/// task definition.
#[must_use]
pub fn port_mappings(template: &Template, task_definition: &LogicalId) -> Vec<PortMapping> {
    template
        .resource(task_definition)
        .and_then(|r| r.property("ContainerDefinitions"))
        .and_then(Value::as_array)
        .and_then(|defs| defs.iter().find(|d| d["Name"] == CONTAINER_NAME))
        .and_then(|d| d["PortMappings"].as_array())
        .map(|mappings| {
            mappings
                .iter()
                .filter_map(|m| {
                    let container = u16::try_from(m["ContainerPort"].as_u64()?).ok()?;
                    let host = u16::try_from(m["HostPort"].as_u64()?).ok()?;
                    Some(PortMapping::new(container, host))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use foundrystack_common::config::RawInputs;

    use super::*;
    use crate::resolver;

    fn config(raw: RawInputs) -> StackConfiguration {
        resolver::resolve(&raw).expect("resolve")
    }

    #[test]
    fn plain_container_has_no_certificate_env() {
        let container = ContainerSpec::from_config(
            &config(RawInputs {
                release_url: Some("https://release".into()),
                ..RawInputs::default()
            }),
            false,
        );
        assert_eq!(
            container.environment.get("FOUNDRY_RELEASE_URL").map(String::as_str),
            Some("https://release")
        );
        assert!(!container.environment.contains_key("FOUNDRY_SSL_CERT"));
        assert!(!container.environment.contains_key("FOUNDRY_ADMIN_KEY"));
        assert!(!container.environment.contains_key("FOUNDRY_AWS_CONFIG"));
        assert!(container.health_check[1].contains("http://localhost:30000"));
    }

    #[test]
    fn tls_container_gets_certificates_and_https_probe() {
        let container = ContainerSpec::from_config(
            &config(RawInputs {
                ssl_certificate_zip_url: Some("https://certs.zip".into()),
                ssl_cert: Some("cert.pem".into()),
                ssl_key: Some("key.pem".into()),
                ..RawInputs::default()
            }),
            false,
        );
        assert_eq!(
            container.environment.get("FOUNDRY_SSL_CERT").map(String::as_str),
            Some("cert.pem")
        );
        assert_eq!(
            container.environment.get("FOUNDRY_SSL_KEY").map(String::as_str),
            Some("key.pem")
        );
        assert!(container.health_check[1].contains("https://localhost:30000"));
    }

    #[test]
    fn object_store_points_at_options_file() {
        let container = ContainerSpec::from_config(&config(RawInputs::default()), true);
        assert_eq!(
            container.environment.get("FOUNDRY_AWS_CONFIG").map(String::as_str),
            Some("/data/options.json")
        );
    }

    #[test]
    fn timezone_is_always_set() {
        let container = ContainerSpec::from_config(&config(RawInputs::default()), false);
        assert!(container.environment.contains_key("TIMEZONE"));
    }
}
