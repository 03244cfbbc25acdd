use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, USER_AGENT},
    Client as HttpClient, Response, StatusCode,
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "https://api.github.com/";

/// Source-control collaborator
#[async_trait(?Send)]
pub trait SourceControl {
    /// Latest commit SHA-1 of a branch, tag, full or short commit SHA-1
    async fn commit_for_ref(&self, repository: &str, reference: &str) -> Result<String>;
    /// Records a deployment of `reference` to `environment`, returns its id
    async fn create_deployment_marker(
        &self,
        repository: &str,
        reference: &str,
        environment: &str,
    ) -> Result<u64>;
}

/// Splits `owner/repo`
pub fn split_repository(repository: &str) -> Result<(&str, &str)> {
    match repository.split('/').collect::<Vec<_>>()[..] {
        [owner, name] if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => Err(Error::InvalidRepository(repository.to_owned())),
    }
}

#[derive(Serialize)]
struct DeploymentRequest<'a> {
    #[serde(rename = "ref")]
    reference: &'a str,
    environment: &'a str,
    description: &'a str,
    auto_merge: bool,
    required_contexts: Vec<String>,
}

#[derive(Deserialize)]
struct DeploymentResponse {
    id: u64,
}

/// GitHub REST v3 client
#[derive(Debug)]
pub struct GithubClient {
    http: HttpClient,
    base: Url,
    token: Option<String>,
}

impl GithubClient {
    pub fn new(api_url: &str, token: Option<String>) -> Result<Self> {
        let mut base = Url::parse(api_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            http: HttpClient::new(),
            base,
            token: token.filter(|token| !token.is_empty()),
        })
    }

    /// Each segment is percent-encoded, so refs like `fix#12` or `feature/x`
    /// stay a single path segment
    fn endpoint(&self, owner: &str, name: &str, rest: &[&str]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .extend(["repos", owner, name])
            .extend(rest);
        Ok(url)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        let builder = builder.header(USER_AGENT, concat!("kubeship/", env!("CARGO_PKG_VERSION")));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

fn unavailable(operation: String, source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Error {
    Error::SourceControlUnavailable {
        operation,
        source: source.into(),
    }
}

async fn unexpected_status(operation: String, response: Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    unavailable(
        operation,
        format!("GitHub API responded with {}: {}", status, body.trim()),
    )
}

#[async_trait(?Send)]
impl SourceControl for GithubClient {
    async fn commit_for_ref(&self, repository: &str, reference: &str) -> Result<String> {
        let (owner, name) = split_repository(repository)?;
        let operation = format!("retrieve commit SHA-1 of ref {:?} in {}", reference, repository);
        let url = self.endpoint(owner, name, &["commits", reference])?;
        log::trace!("GET {}", url);

        let response = self
            .request(self.http.get(url))
            .header(ACCEPT, "application/vnd.github.sha")
            .send()
            .await
            .map_err(|e| unavailable(operation.clone(), e))?;
        match response.status() {
            status if status.is_success() => {
                let sha = response
                    .text()
                    .await
                    .map_err(|e| unavailable(operation, e))?;
                Ok(sha.trim().to_owned())
            }
            StatusCode::NOT_FOUND | StatusCode::UNPROCESSABLE_ENTITY => Err(Error::RefNotFound {
                repository: repository.to_owned(),
                reference: reference.to_owned(),
            }),
            _ => Err(unexpected_status(operation, response).await),
        }
    }

    async fn create_deployment_marker(
        &self,
        repository: &str,
        reference: &str,
        environment: &str,
    ) -> Result<u64> {
        let (owner, name) = split_repository(repository)?;
        let operation = format!("create GitHub deployment of {:?} in {}", reference, repository);
        let url = self.endpoint(owner, name, &["deployments"])?;
        log::trace!("POST {}", url);

        let response = self
            .request(self.http.post(url))
            .header(ACCEPT, "application/vnd.github+json")
            .json(&DeploymentRequest {
                reference,
                environment,
                description: "kubeship deploy",
                auto_merge: false,
                required_contexts: Vec::new(),
            })
            .send()
            .await
            .map_err(|e| unavailable(operation.clone(), e))?;
        if !response.status().is_success() {
            return Err(unexpected_status(operation, response).await);
        }
        let deployment: DeploymentResponse = response
            .json()
            .await
            .map_err(|e| unavailable(operation, e))?;
        Ok(deployment.id)
    }
}
