use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, ReplicaSet};
use kube::{
    api::{ListParams, Patch, PatchParams},
    Api, Client,
};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    kubemodel::{Revision, WorkloadDescriptor},
    meta::AnnotationKeys,
};

/// Cluster collaborator
#[async_trait(?Send)]
pub trait Cluster {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadDescriptor>>;
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadDescriptor>;
    /// Every revision in the namespace, regardless of owner
    async fn list_revisions(&self, namespace: &str) -> Result<Vec<Revision>>;
    /// Submits a strategic merge patch, returns the updated workload
    async fn apply_patch(
        &self,
        workload: &WorkloadDescriptor,
        patch: &Value,
    ) -> Result<WorkloadDescriptor>;
}

/// [`Cluster`] backed by the Kubernetes API
pub struct KubeCluster {
    client: Client,
    keys: AnnotationKeys,
}

impl KubeCluster {
    pub fn new(client: Client, keys: AnnotationKeys) -> Self {
        Self { client, keys }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait(?Send)]
impl Cluster for KubeCluster {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadDescriptor>> {
        log::trace!("Listing Deployments in {}", namespace);
        let list = self
            .deployments(namespace)
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::Cluster {
                operation: format!("retrieve Deployments in namespace {:?}", namespace),
                source,
            })?;
        list.items
            .into_iter()
            .map(WorkloadDescriptor::try_from)
            .collect()
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadDescriptor> {
        log::trace!("Loading Deployment {} in {}", name, namespace);
        match self.deployments(namespace).get(name).await {
            Ok(deployment) => WorkloadDescriptor::try_from(deployment),
            Err(kube::Error::Api(response)) if response.code == 404 => {
                Err(Error::WorkloadNotFound {
                    namespace: namespace.to_owned(),
                    name: name.to_owned(),
                })
            }
            Err(source) => Err(Error::Cluster {
                operation: format!("retrieve Deployment {:?}", name),
                source,
            }),
        }
    }

    async fn list_revisions(&self, namespace: &str) -> Result<Vec<Revision>> {
        log::trace!("Listing ReplicaSets in {}", namespace);
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        let list = api
            .list(&ListParams::default())
            .await
            .map_err(|source| Error::Cluster {
                operation: format!("retrieve ReplicaSets in namespace {:?}", namespace),
                source,
            })?;
        Ok(list
            .items
            .into_iter()
            .map(|rs| Revision::from_replica_set(rs, &self.keys))
            .collect())
    }

    async fn apply_patch(
        &self,
        workload: &WorkloadDescriptor,
        patch: &Value,
    ) -> Result<WorkloadDescriptor> {
        log::trace!("Patching {}", workload);
        let updated = self
            .deployments(&workload.namespace)
            .patch(&workload.name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|source| Error::Cluster {
                operation: format!("update Deployment {:?}", workload.name),
                source,
            })?;
        WorkloadDescriptor::try_from(updated)
    }
}
