//! Cross-workload checks run before any mutation: one deploy may address several
//! workloads (web + worker), and they must all run one image and track one codebase.

use std::collections::BTreeMap;

use crate::{
    config::{RepositorySource, Settings},
    error::{Error, Result},
    kubemodel::WorkloadDescriptor,
    meta::{lookup, Field},
    select::Target,
};

/// Distinct values in first-seen order
fn distinct<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_owned());
        }
    }
    out
}

pub fn resolve_target_image_repository(targets: &[Target]) -> Result<String> {
    let mut repositories = distinct(
        targets
            .iter()
            .map(|target| target.container.image_ref().repository),
    );
    match repositories.len() {
        0 => Err(Error::NoImageFound),
        1 => Ok(repositories.remove(0)),
        _ => Err(Error::InconsistentImages(repositories)),
    }
}

/// Parses the container → `owner/repo` association of a workload
pub fn parse_repositories(
    workload: &WorkloadDescriptor,
    settings: &Settings,
) -> Result<BTreeMap<String, String>> {
    let source = settings.repository_source;
    let key = settings.keys.get(Field::Repository);
    let metadata = match source {
        RepositorySource::Annotation => &workload.annotations,
        RepositorySource::Label => &workload.labels,
    };
    let value = lookup(metadata, key).ok_or_else(|| Error::RepositoryAnnotationMissing {
        kind: source.kind(),
        key: key.to_owned(),
        workload: workload.name.clone(),
    })?;

    let mut out = BTreeMap::new();
    for entry in value.split(',') {
        match entry.split(source.delimiter()).collect::<Vec<_>>()[..] {
            [container, repository] if !container.is_empty() && !repository.is_empty() => {
                out.insert(container.to_owned(), repository.to_owned());
            }
            _ => {
                return Err(Error::MalformedRepositoryAnnotation {
                    kind: source.kind(),
                    key: key.to_owned(),
                    entry: entry.to_owned(),
                    delimiter: source.delimiter(),
                })
            }
        }
    }
    Ok(out)
}

pub fn resolve_target_repository(targets: &[Target], settings: &Settings) -> Result<String> {
    let mut found = Vec::with_capacity(targets.len());
    for target in targets {
        let mut repositories = parse_repositories(&target.workload, settings)?;
        let repository = repositories.remove(&target.container.name).ok_or_else(|| {
            Error::RepositoryNotConfiguredForContainer {
                workload: target.workload.name.clone(),
                container: target.container.name.clone(),
            }
        })?;
        found.push(repository);
    }

    let mut repositories = distinct(found.iter().map(String::as_str));
    match repositories.len() {
        // no targets, nothing to track
        0 => Err(Error::NoTargetsFound(settings.namespace.clone())),
        1 => Ok(repositories.remove(0)),
        _ => Err(Error::InconsistentRepositories(repositories)),
    }
}
