use crate::{
    config::{ContainerFallback, Settings},
    error::{Error, Result},
    kubemodel::{ContainerSpec, WorkloadDescriptor},
    meta::{is_truthy, lookup, AnnotationKeys, Field},
};

/// Deploy-eligible workload paired with its resolved target container
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub workload: WorkloadDescriptor,
    pub container: ContainerSpec,
}

pub type TargetSet = Vec<Target>;

pub fn is_deploy_target(workload: &WorkloadDescriptor, keys: &AnnotationKeys) -> bool {
    is_truthy(lookup(&workload.annotations, keys.get(Field::DeployTarget)))
}

/// Keeps deploy targets in input order
pub fn select_targets(
    workloads: Vec<WorkloadDescriptor>,
    settings: &Settings,
) -> Result<Vec<WorkloadDescriptor>> {
    let targets: Vec<_> = workloads
        .into_iter()
        .filter(|w| is_deploy_target(w, &settings.keys))
        .collect();
    if targets.is_empty() {
        return Err(Error::NoTargetsFound(settings.namespace.clone()));
    }
    Ok(targets)
}

pub fn resolve_target_container<'w>(
    workload: &'w WorkloadDescriptor,
    explicit_name: Option<&str>,
    settings: &Settings,
) -> Result<&'w ContainerSpec> {
    let key = settings.keys.get(Field::DeployTargetContainer);
    let name = match explicit_name.filter(|name| !name.is_empty()) {
        Some(name) => name,
        None => match lookup(&workload.annotations, key) {
            Some(name) => name,
            None => {
                return match (settings.container_fallback, workload.containers.as_slice()) {
                    (ContainerFallback::SingleContainer, [only]) => Ok(only),
                    (ContainerFallback::SingleContainer, _) => Err(Error::AmbiguousContainer {
                        workload: workload.name.clone(),
                        candidates: workload.container_names(),
                    }),
                    (ContainerFallback::RequireAnnotation, _) => {
                        Err(Error::MissingTargetContainerAnnotation {
                            workload: workload.name.clone(),
                            key: key.to_owned(),
                        })
                    }
                }
            }
        },
    };
    workload
        .container(name)
        .ok_or_else(|| Error::ContainerNotFound {
            workload: workload.name.clone(),
            container: name.to_owned(),
        })
}

/// Exactly one workload must exist when none is named explicitly
pub fn detect_target_workload(
    mut workloads: Vec<WorkloadDescriptor>,
    namespace: &str,
) -> Result<WorkloadDescriptor> {
    match workloads.len() {
        0 => Err(Error::NoWorkloadFound(namespace.to_owned())),
        1 => Ok(workloads.remove(0)),
        _ => Err(Error::AmbiguousWorkload {
            namespace: namespace.to_owned(),
            candidates: workloads.into_iter().map(|w| w.name).collect(),
        }),
    }
}

pub fn build_target_set(
    workloads: Vec<WorkloadDescriptor>,
    explicit_container: Option<&str>,
    settings: &Settings,
) -> Result<TargetSet> {
    workloads
        .into_iter()
        .map(|workload| {
            let container = resolve_target_container(&workload, explicit_container, settings)?.clone();
            log::debug!("{} targets container {}", workload, container.name);
            Ok(Target {
                workload,
                container,
            })
        })
        .collect()
}
