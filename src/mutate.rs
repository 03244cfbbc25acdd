use fieldpath::{path, Element, FieldpathExt, PathBuf};
use serde_json::{json, Value};

use crate::{
    cluster::Cluster,
    error::Result,
    kubemodel::WorkloadDescriptor,
    meta::{AnnotationKeys, Field, CHANGE_CAUSE_ANNOTATION},
    reference::Selector,
};

fn workload_annotation(key: &str) -> PathBuf {
    PathBuf::from(path!(."metadata"."annotations")).join(Element::field(key))
}

fn template_annotation(key: &str) -> PathBuf {
    PathBuf::from(path!(."spec"."template"."metadata"."annotations")).join(Element::field(key))
}

fn container_image(container: &str) -> PathBuf {
    PathBuf::from(path!(."spec"."template"."spec"."containers"))
        .join(Element::select(fieldpath::MERGE_KEY, container))
        .join(Element::field("image"))
}

/// Single patch setting the image together with who deployed it and why, so no
/// reader ever observes a new image with stale attribution
pub fn compose_patch(
    keys: &AnnotationKeys,
    container: &str,
    new_image: &str,
    user: &str,
    cause: &str,
) -> Result<Value> {
    let mut patch = json!({});
    patch.insert_path(&container_image(container), json!(new_image))?;
    patch.insert_path(&workload_annotation(CHANGE_CAUSE_ANNOTATION), json!(cause))?;
    patch.insert_path(&template_annotation(keys.get(Field::DeployUser)), json!(user))?;
    Ok(patch)
}

/// Touches the pod template without changing images, forcing a rolling restart
pub fn compose_reload_patch(keys: &AnnotationKeys, signature: &str) -> Result<Value> {
    let mut patch = json!({});
    patch.insert_path(&template_annotation(keys.get(Field::ReloadedAt)), json!(signature))?;
    Ok(patch)
}

pub async fn submit(
    cluster: &dyn Cluster,
    workload: &WorkloadDescriptor,
    patch: &Value,
) -> Result<WorkloadDescriptor> {
    log::debug!("Submitting patch to {}: {}", workload, patch);
    cluster.apply_patch(workload, patch).await
}

/// Change cause of a multi-target deploy
pub fn deploy_cause(selector: &Selector, namespace: &str) -> String {
    match selector {
        Selector::Ref(reference) => format!(r#"kubeship deploy {} --namespace "{}""#, reference, namespace),
        Selector::Image(_) | Selector::Tag(_) => format!(
            r#"kubeship deploy --{} {} --namespace "{}""#,
            selector.verb(),
            selector.value(),
            namespace
        ),
    }
}

/// Change cause of a single-workload `image`, `tag` or `ref` command
pub fn single_cause(selector: &Selector, container: &str, deployment: &str, namespace: &str) -> String {
    format!(
        r#"kubeship {} {} --container "{}" --deployment "{}" --namespace "{}""#,
        selector.verb(),
        selector.value(),
        container,
        deployment,
        namespace
    )
}
