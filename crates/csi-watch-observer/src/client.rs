//! Cluster client capability for VolumeAttachment records
//!
//! [`VaClient`] is the seam observers poll through. Production code wraps a
//! `kube::Client`; tests substitute `MockVaClient` or an in-memory fake. The
//! [`Clients`] bundle holds one optional handle per watched resource type, and
//! an absent handle means that resource type is not under test.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::storage::v1::VolumeAttachment;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::Client;
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use csi_watch_common::polling::{wait_for_resource, PollConfig};
use csi_watch_common::Error;

use crate::store::EntityStore;

/// Trait abstracting VolumeAttachment operations
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VaClient: Send + Sync {
    /// List all VolumeAttachments visible to this client
    async fn list(&self) -> Result<Vec<VolumeAttachment>, Error>;

    /// Create a VolumeAttachment
    async fn create(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, Error>;

    /// Delete a VolumeAttachment by name
    async fn delete(&self, name: &str) -> Result<(), Error>;

    /// Namespace of the test run this client was created for
    fn namespace(&self) -> String;
}

/// Real client backed by the Kubernetes API
///
/// VolumeAttachment is cluster-scoped, so the API handle spans the whole
/// cluster; the namespace only identifies the run.
pub struct KubeVaClient {
    api: Api<VolumeAttachment>,
    namespace: String,
}

impl KubeVaClient {
    /// Create a client for the given run namespace
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            api: Api::all(client),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl VaClient for KubeVaClient {
    async fn list(&self) -> Result<Vec<VolumeAttachment>, Error> {
        let list = self.api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    async fn create(&self, va: &VolumeAttachment) -> Result<VolumeAttachment, Error> {
        let created = self.api.create(&PostParams::default(), va).await?;
        debug!(name = ?created.metadata.name, "created VolumeAttachment");
        Ok(created)
    }

    async fn delete(&self, name: &str) -> Result<(), Error> {
        self.api.delete(name, &DeleteParams::default()).await?;
        debug!(name = %name, "deleted VolumeAttachment");
        Ok(())
    }

    fn namespace(&self) -> String {
        self.namespace.clone()
    }
}

/// Client handles available to observers
#[derive(Clone, Default)]
pub struct Clients {
    /// VolumeAttachment client, `None` when attachments are not being tested
    pub va_client: Option<Arc<dyn VaClient>>,
}

impl Clients {
    /// Bundle with a VolumeAttachment client
    pub fn with_va_client(va_client: Arc<dyn VaClient>) -> Self {
        Self {
            va_client: Some(va_client),
        }
    }

    /// Build the production bundle from a kube client
    pub fn from_kube(client: Client, namespace: &str) -> Self {
        Self::with_va_client(Arc::new(KubeVaClient::new(client, namespace)))
    }
}

/// Persistent volume an attachment refers to, if any
pub fn pv_name(va: &VolumeAttachment) -> Option<&str> {
    va.spec.source.persistent_volume_name.as_deref()
}

/// Whether the attacher reports the volume as attached
pub fn is_attached(va: &VolumeAttachment) -> bool {
    va.status.as_ref().is_some_and(|s| s.attached)
}

/// Whether the attachment has been marked for deletion but still exists
pub fn is_deleting(va: &VolumeAttachment) -> bool {
    va.metadata.deletion_timestamp.is_some()
}

/// Wait until no VolumeAttachment references a tracked entity.
///
/// Returns the number of polls it took.
pub async fn wait_until_none_left(
    client: &dyn VaClient,
    entities: &EntityStore,
    poll: &PollConfig,
) -> Result<u32, Error> {
    let mut polls = 0u32;
    wait_for_resource("tracked VolumeAttachments to be removed", poll, || {
        polls += 1;
        let attempt = polls;
        async move {
            let items = client.list().await?;
            let remaining = items
                .iter()
                .filter_map(pv_name)
                .filter(|pv| entities.contains(pv))
                .count();
            if remaining == 0 {
                Ok::<_, Error>(Some(attempt))
            } else {
                debug!(remaining, "VolumeAttachments still present");
                Ok(None)
            }
        }
    })
    .await
    .inspect(|polls| info!(polls, "all tracked VolumeAttachments are gone"))
}
