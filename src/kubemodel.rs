use chrono::{DateTime, Utc};
use k8s_openapi::api::{
    apps::v1::{Deployment, ReplicaSet},
    core::v1::Container,
};
use std::{
    collections::BTreeMap,
    convert::TryFrom,
    fmt::{self, Display},
};

use crate::{
    error::{Error, Result},
    image::ImageRef,
    meta::{lookup, AnnotationKeys, Field, REVISION_ANNOTATION},
};

/// Container of a Deployment pod template
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
}

impl ContainerSpec {
    pub fn image_ref(&self) -> ImageRef<'_> {
        ImageRef::parse(&self.image)
    }
}

impl From<Container> for ContainerSpec {
    fn from(container: Container) -> Self {
        Self {
            name: container.name,
            image: container.image.unwrap_or_default(),
        }
    }
}

/// Read-only view of a Deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadDescriptor {
    pub name: String,
    pub namespace: String,
    pub uid: String,
    pub annotations: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Pod template annotations
    pub template_annotations: BTreeMap<String, String>,
    /// Never empty
    pub containers: Vec<ContainerSpec>,
}

impl WorkloadDescriptor {
    pub fn container(&self, name: &str) -> Option<&ContainerSpec> {
        self.containers.iter().find(|c| c.name == name)
    }

    pub fn container_names(&self) -> Vec<String> {
        self.containers.iter().map(|c| c.name.clone()).collect()
    }
}

impl Display for WorkloadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Deployment {} in {}", self.name, self.namespace)
    }
}

impl TryFrom<Deployment> for WorkloadDescriptor {
    type Error = Error;

    fn try_from(deployment: Deployment) -> Result<Self> {
        let metadata = deployment.metadata;
        let name = metadata.name.unwrap_or_default();
        let template = deployment.spec.map(|spec| spec.template).unwrap_or_default();
        let containers: Vec<ContainerSpec> = template
            .spec
            .map(|spec| spec.containers)
            .unwrap_or_default()
            .into_iter()
            .map(ContainerSpec::from)
            .collect();
        if containers.is_empty() {
            return Err(Error::NoContainers(name));
        }

        Ok(Self {
            name,
            namespace: metadata.namespace.unwrap_or_default(),
            uid: metadata.uid.unwrap_or_default(),
            annotations: metadata.annotations.unwrap_or_default(),
            labels: metadata.labels.unwrap_or_default(),
            template_annotations: template
                .metadata
                .and_then(|meta| meta.annotations)
                .unwrap_or_default(),
            containers,
        })
    }
}

/// Historical pod template of a Deployment, backed by a ReplicaSet
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Revision {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    /// Opaque, but numeric for ReplicaSets created by the Deployment controller
    pub revision_number: String,
    pub deployed_by: String,
    /// Container name → image, in pod template order
    pub images: Vec<(String, String)>,
    pub owner_uids: Vec<String>,
}

impl Revision {
    pub fn from_replica_set(replica_set: ReplicaSet, keys: &AnnotationKeys) -> Self {
        let metadata = replica_set.metadata;
        let template = replica_set
            .spec
            .and_then(|spec| spec.template)
            .unwrap_or_default();
        let template_annotations = template
            .metadata
            .and_then(|meta| meta.annotations)
            .unwrap_or_default();
        let annotations = metadata.annotations.unwrap_or_default();

        Self {
            name: metadata.name.unwrap_or_default(),
            created_at: metadata.creation_timestamp.map(|time| time.0),
            revision_number: lookup(&annotations, REVISION_ANNOTATION)
                .unwrap_or_default()
                .to_owned(),
            deployed_by: lookup(&template_annotations, keys.get(Field::DeployUser))
                .unwrap_or_default()
                .to_owned(),
            images: template
                .spec
                .map(|spec| spec.containers)
                .unwrap_or_default()
                .into_iter()
                .map(|c| (c.name, c.image.unwrap_or_default()))
                .collect(),
            owner_uids: metadata
                .owner_references
                .unwrap_or_default()
                .into_iter()
                .map(|owner| owner.uid)
                .collect(),
        }
    }

    pub fn image_for(&self, container: &str) -> Option<&str> {
        self.images
            .iter()
            .find(|(name, _)| name == container)
            .map(|(_, image)| image.as_str())
    }
}
