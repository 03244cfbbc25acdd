use thiserror::Error;

/// Coarse classification of [`Error`], used by callers to decide how to report
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Conflicting or missing caller input, detected before any external call
    Input,
    NotFound,
    /// Several candidates and no disambiguator
    Ambiguity,
    /// Target containers disagree on image or source repository
    Consistency,
    ExternalService,
    /// A patch or object document could not be built or read back
    Internal,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{} cannot be specified simultaneously", .0.join(" and "))]
    ConflictingSelectors(Vec<&'static str>),
    #[error("image (--image), tag (--tag) or ref (branch, full commit SHA-1 or short commit SHA-1) must be given")]
    MissingSelector,
    #[error("invalid {kind} {key:?} value {entry:?}, must be \"container{delimiter}owner/repo\"")]
    MalformedRepositoryAnnotation {
        kind: &'static str,
        key: String,
        entry: String,
        delimiter: char,
    },
    #[error("invalid repository {0:?}, must be owner/repo")]
    InvalidRepository(String),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("no Deployment found in namespace {0:?}")]
    NoWorkloadFound(String),
    #[error("Deployment {name:?} not found in namespace {namespace:?}")]
    WorkloadNotFound { namespace: String, name: String },
    #[error("no target Deployments found in namespace {0:?}")]
    NoTargetsFound(String),
    #[error("Deployment {0:?} has no containers")]
    NoContainers(String),
    #[error("container {container:?} does not exist in Deployment {workload:?}")]
    ContainerNotFound { workload: String, container: String },
    #[error("annotation {key:?} does not exist in Deployment {workload:?}")]
    MissingTargetContainerAnnotation { workload: String, key: String },
    #[error("no image found in target containers")]
    NoImageFound,
    #[error("{kind} {key:?} not found in Deployment {workload:?}")]
    RepositoryAnnotationMissing {
        kind: &'static str,
        key: String,
        workload: String,
    },
    #[error("GitHub repository for container {container:?} in Deployment {workload:?} is not set")]
    RepositoryNotConfiguredForContainer { workload: String, container: String },
    #[error("no commit matched to ref {reference:?} in repository {repository:?}")]
    RefNotFound {
        repository: String,
        reference: String,
    },

    #[error("multiple containers {candidates:?} found in Deployment {workload:?}")]
    AmbiguousContainer {
        workload: String,
        candidates: Vec<String>,
    },
    #[error("multiple Deployments {candidates:?} found in namespace {namespace:?}")]
    AmbiguousWorkload {
        namespace: String,
        candidates: Vec<String>,
    },

    #[error("multiple images {0:?} found, all target containers must use the same image")]
    InconsistentImages(Vec<String>),
    #[error("multiple repositories {0:?} found, all target containers must use the same repository")]
    InconsistentRepositories(Vec<String>),

    #[error("failed to {operation}")]
    Cluster {
        operation: String,
        #[source]
        source: kube::Error,
    },
    #[error("failed to {operation}")]
    SourceControlUnavailable {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("path error: {0}")]
    Path(#[from] fieldpath::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConflictingSelectors(_)
            | Self::MissingSelector
            | Self::MalformedRepositoryAnnotation { .. }
            | Self::InvalidRepository(_)
            | Self::InvalidUrl(_) => ErrorKind::Input,
            Self::NoWorkloadFound(_)
            | Self::WorkloadNotFound { .. }
            | Self::NoTargetsFound(_)
            | Self::NoContainers(_)
            | Self::ContainerNotFound { .. }
            | Self::MissingTargetContainerAnnotation { .. }
            | Self::NoImageFound
            | Self::RepositoryAnnotationMissing { .. }
            | Self::RepositoryNotConfiguredForContainer { .. }
            | Self::RefNotFound { .. } => ErrorKind::NotFound,
            Self::AmbiguousContainer { .. } | Self::AmbiguousWorkload { .. } => {
                ErrorKind::Ambiguity
            }
            Self::InconsistentImages(_) | Self::InconsistentRepositories(_) => {
                ErrorKind::Consistency
            }
            Self::Cluster { .. } | Self::SourceControlUnavailable { .. } => {
                ErrorKind::ExternalService
            }
            Self::Path(_) | Self::Json(_) => ErrorKind::Internal,
        }
    }
}
