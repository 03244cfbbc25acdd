//! In-memory collaborators for pipeline tests

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::core::ErrorResponse;
use serde_json::{json, Value};
use std::{cell::RefCell, collections::HashMap};

use crate::{
    cluster::Cluster,
    error::{Error, Result},
    github::SourceControl,
    kubemodel::{Revision, WorkloadDescriptor},
};

fn to_deployment_json(workload: &WorkloadDescriptor) -> Value {
    let containers: Vec<Value> = workload
        .containers
        .iter()
        .map(|c| json!({"name": c.name, "image": c.image}))
        .collect();
    json!({
        "metadata": {
            "name": workload.name,
            "namespace": workload.namespace,
            "uid": workload.uid,
            "annotations": workload.annotations,
            "labels": workload.labels,
        },
        "spec": {
            "selector": {"matchLabels": workload.labels},
            "template": {
                "metadata": {"annotations": workload.template_annotations},
                "spec": {"containers": containers},
            },
        },
    })
}

#[derive(Default)]
pub struct FakeCluster {
    workloads: RefCell<Vec<WorkloadDescriptor>>,
    revisions: Vec<Revision>,
    patches: RefCell<Vec<(String, Value)>>,
    conflict_on: Option<String>,
}

impl FakeCluster {
    pub fn new(workloads: Vec<WorkloadDescriptor>) -> Self {
        Self {
            workloads: RefCell::new(workloads),
            ..Self::default()
        }
    }

    pub fn with_revisions(mut self, revisions: Vec<Revision>) -> Self {
        self.revisions = revisions;
        self
    }

    /// Patches of this workload fail with a resource version conflict
    pub fn conflict_on(mut self, name: &str) -> Self {
        self.conflict_on = Some(name.to_owned());
        self
    }

    pub fn patches(&self) -> Vec<(String, Value)> {
        self.patches.borrow().clone()
    }

    pub fn workload(&self, name: &str) -> WorkloadDescriptor {
        self.workloads
            .borrow()
            .iter()
            .find(|w| w.name == name)
            .cloned()
            .unwrap()
    }
}

#[async_trait(?Send)]
impl Cluster for FakeCluster {
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<WorkloadDescriptor>> {
        Ok(self
            .workloads
            .borrow()
            .iter()
            .filter(|w| w.namespace == namespace)
            .cloned()
            .collect())
    }

    async fn get_workload(&self, namespace: &str, name: &str) -> Result<WorkloadDescriptor> {
        self.workloads
            .borrow()
            .iter()
            .find(|w| w.namespace == namespace && w.name == name)
            .cloned()
            .ok_or_else(|| Error::WorkloadNotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })
    }

    async fn list_revisions(&self, _namespace: &str) -> Result<Vec<Revision>> {
        Ok(self.revisions.clone())
    }

    async fn apply_patch(
        &self,
        workload: &WorkloadDescriptor,
        patch: &Value,
    ) -> Result<WorkloadDescriptor> {
        if self.conflict_on.as_deref() == Some(workload.name.as_str()) {
            return Err(Error::Cluster {
                operation: format!("update Deployment {:?}", workload.name),
                source: kube::Error::Api(ErrorResponse {
                    status: "Failure".to_owned(),
                    message: "the object has been modified".to_owned(),
                    reason: "Conflict".to_owned(),
                    code: 409,
                }),
            });
        }
        self.patches
            .borrow_mut()
            .push((workload.name.clone(), patch.clone()));

        let mut workloads = self.workloads.borrow_mut();
        let stored = workloads
            .iter_mut()
            .find(|w| w.name == workload.name)
            .unwrap();
        let mut object = to_deployment_json(stored);
        fieldpath::merge(&mut object, patch);
        let updated = WorkloadDescriptor::try_from(serde_json::from_value::<Deployment>(object)?)?;
        *stored = updated.clone();
        Ok(updated)
    }
}

#[derive(Default)]
pub struct FakeSourceControl {
    commits: HashMap<(String, String), String>,
    unavailable: bool,
    markers_rejected: bool,
    lookups: RefCell<Vec<(String, String)>>,
    markers: RefCell<Vec<(String, String, String)>>,
}

impl FakeSourceControl {
    pub fn with_commit(mut self, repository: &str, reference: &str, commit: &str) -> Self {
        self.commits.insert(
            (repository.to_owned(), reference.to_owned()),
            commit.to_owned(),
        );
        self
    }

    /// Every call fails as if the API were down
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Commit lookups work, deployment creation fails
    pub fn rejecting_markers(mut self) -> Self {
        self.markers_rejected = true;
        self
    }

    pub fn lookups(&self) -> Vec<(String, String)> {
        self.lookups.borrow().clone()
    }

    pub fn markers(&self) -> Vec<(String, String, String)> {
        self.markers.borrow().clone()
    }

    fn check_available(&self, operation: &str) -> Result<()> {
        if self.unavailable {
            return Err(Error::SourceControlUnavailable {
                operation: operation.to_owned(),
                source: "connection refused".into(),
            });
        }
        Ok(())
    }
}

#[async_trait(?Send)]
impl SourceControl for FakeSourceControl {
    async fn commit_for_ref(&self, repository: &str, reference: &str) -> Result<String> {
        self.lookups
            .borrow_mut()
            .push((repository.to_owned(), reference.to_owned()));
        self.check_available("retrieve commit SHA-1")?;
        self.commits
            .get(&(repository.to_owned(), reference.to_owned()))
            .cloned()
            .ok_or_else(|| Error::RefNotFound {
                repository: repository.to_owned(),
                reference: reference.to_owned(),
            })
    }

    async fn create_deployment_marker(
        &self,
        repository: &str,
        reference: &str,
        environment: &str,
    ) -> Result<u64> {
        self.check_available("create GitHub deployment")?;
        if self.markers_rejected {
            return Err(Error::SourceControlUnavailable {
                operation: "create GitHub deployment".to_owned(),
                source: "409 Conflict".into(),
            });
        }
        let mut markers = self.markers.borrow_mut();
        markers.push((
            repository.to_owned(),
            reference.to_owned(),
            environment.to_owned(),
        ));
        Ok(markers.len() as u64)
    }
}
