//! Permission grants and their rendering as IAM policies.
//!
//! Grants accumulate during composition and are never revoked. Each
//! principal ends up with exactly one policy holding all of its grants.

use std::collections::BTreeMap;

use serde_json::{Value, json};

use foundrystack_common::error::Result;
use foundrystack_common::types::LogicalId;

use crate::intrinsic;
use crate::template::{Resource, Template};

/// `(principal, actions, resources)`.
#[derive(Debug, Clone, PartialEq)]
pub struct PermissionGrant {
    /// Role receiving the permission.
    pub principal: LogicalId,
    /// Allowed actions.
    pub actions: Vec<String>,
    /// Resource scope.
    pub resources: Vec<Value>,
}

impl PermissionGrant {
    /// Returns `true` if the grant allows `action`.
    #[must_use]
    pub fn allows(&self, action: &str) -> bool {
        self.actions.iter().any(|a| a == action)
    }

    fn statement(&self) -> Value {
        let actions: Value = match self.actions.as_slice() {
            [single] => json!(single),
            many => json!(many),
        };
        let resources: Value = match self.resources.as_slice() {
            [single] => single.clone(),
            many => Value::Array(many.to_vec()),
        };
        json!({
            "Effect": "Allow",
            "Action": actions,
            "Resource": resources,
        })
    }
}

/// Accumulated grants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Permissions {
    grants: Vec<PermissionGrant>,
}

impl Permissions {
    /// Creates an empty grant set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `actions` on `resources` to `principal`.
    pub fn grant<I, S>(&mut self, principal: &LogicalId, actions: I, resources: Vec<Value>)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grant = PermissionGrant {
            principal: principal.clone(),
            actions: actions.into_iter().map(Into::into).collect(),
            resources,
        };
        tracing::debug!(principal = %grant.principal, actions = ?grant.actions, "permission granted");
        self.grants.push(grant);
    }

    /// All grants in insertion order.
    #[must_use]
    pub fn grants(&self) -> &[PermissionGrant] {
        &self.grants
    }

    /// Grants held by one principal.
    pub fn grants_for<'a>(&'a self, principal: &'a LogicalId) -> impl Iterator<Item = &'a PermissionGrant> + 'a {
        self.grants.iter().filter(move |g| g.principal == *principal)
    }

    /// Returns `true` if `principal` holds `action` through any grant.
    #[must_use]
    pub fn holds(&self, principal: &LogicalId, action: &str) -> bool {
        self.grants_for(principal).any(|g| g.allows(action))
    }

    /// Adds one `<principal>DefaultPolicy` resource per principal and
    /// returns the policy id of each principal.
    ///
    /// # Errors
    ///
    /// Returns an error if a policy logical id is already taken.
    pub fn render(&self, template: &mut Template) -> Result<BTreeMap<LogicalId, LogicalId>> {
        let mut by_principal: BTreeMap<&LogicalId, Vec<Value>> = BTreeMap::new();
        for grant in &self.grants {
            by_principal
                .entry(&grant.principal)
                .or_default()
                .push(grant.statement());
        }

        let mut policies = BTreeMap::new();
        for (principal, statements) in by_principal {
            let policy = template.add(
                format!("{principal}DefaultPolicy"),
                Resource::new("AWS::IAM::Policy").with_properties(json!({
                    "PolicyName": format!("{principal}DefaultPolicy"),
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": statements,
                    },
                    "Roles": [intrinsic::reference(principal)],
                })),
            )?;
            let _ = policies.insert(principal.clone(), policy);
        }
        Ok(policies)
    }
}
