use clap::ValueEnum;

use crate::meta::AnnotationKeys;

/// Where the container → source repository association is read from
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum RepositorySource {
    /// Annotation with `container=owner/repo` pairs
    Annotation,
    /// Legacy label with `container:owner/repo` pairs
    Label,
}

impl RepositorySource {
    pub fn delimiter(self) -> char {
        match self {
            RepositorySource::Annotation => '=',
            RepositorySource::Label => ':',
        }
    }

    pub fn kind(self) -> &'static str {
        match self {
            RepositorySource::Annotation => "annotation",
            RepositorySource::Label => "label",
        }
    }
}

/// What to do when neither an explicit container nor the container annotation is given
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFallback {
    /// Pick the container if it is the only one
    SingleContainer,
    RequireAnnotation,
}

/// Per-invocation settings, built once and passed by reference
#[derive(Clone, Debug)]
pub struct Settings {
    pub namespace: String,
    pub keys: AnnotationKeys,
    pub repository_source: RepositorySource,
    pub container_fallback: ContainerFallback,
    /// Recorded as the deploying user on every mutation
    pub user: String,
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: "default".to_owned(),
            keys: AnnotationKeys::default(),
            repository_source: RepositorySource::Annotation,
            container_fallback: ContainerFallback::SingleContainer,
            user: String::new(),
            dry_run: false,
        }
    }
}
