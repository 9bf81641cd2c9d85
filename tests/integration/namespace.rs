//! Test namespace management for isolation

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, PostParams};
use kube::core::ObjectMeta;
use kube::{Api, Client};
use std::collections::BTreeMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum NamespaceError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),
}

/// A test namespace that is automatically cleaned up
pub struct TestNamespace {
    /// Name of the namespace
    pub name: String,
    /// Kubernetes client
    client: Client,
}

impl TestNamespace {
    /// Create a new unique namespace for test isolation
    ///
    /// The namespace name is generated as `{prefix}-{uuid8}` to ensure
    /// uniqueness across test runs.
    pub async fn create(client: Client, prefix: &str) -> Result<Self, NamespaceError> {
        let suffix = &Uuid::new_v4().to_string()[..8];
        let name = format!("{}-{}", prefix, suffix);

        let labels = BTreeMap::from([
            ("gateway-cd.test".to_string(), "true".to_string()),
            ("test-prefix".to_string(), prefix.to_string()),
        ]);

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(name.clone()),
                labels: Some(labels),
                ..Default::default()
            },
            ..Default::default()
        };

        let namespaces: Api<Namespace> = Api::all(client.clone());
        namespaces.create(&PostParams::default(), &ns).await?;

        tracing::info!("Created test namespace: {}", name);

        Ok(Self { name, client })
    }

    /// Get the namespace name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the namespace and everything in it
    pub async fn delete(self) -> Result<(), NamespaceError> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        namespaces
            .delete(&self.name, &DeleteParams::default())
            .await?;
        tracing::info!("Deleted test namespace: {}", self.name);
        Ok(())
    }
}
