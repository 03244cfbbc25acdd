mod cluster;
mod config;
mod consistency;
mod error;
mod github;
mod history;
mod image;
mod kubemodel;
mod meta;
mod mutate;
mod reference;
mod select;
mod ship;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use clap::{Parser, Subcommand};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};
use std::path::PathBuf;

use cluster::KubeCluster;
use config::{ContainerFallback, RepositorySource, Settings};
use github::GithubClient;
use history::{render, HistoryLimit};
use meta::AnnotationKeys;
use reference::Selector;
use ship::{DeployReport, Outcome, Shipper};

#[derive(Parser)]
#[clap(version, about = "Ship container images to Kubernetes Deployments")]
struct Opts {
    /// Prefix of every kubeship annotation, e.g. `example.com/`
    #[clap(long, global = true, env = "KUBESHIP_ANNOTATION_PREFIX", default_value = "")]
    annotation_prefix: String,
    /// Path of kubeconfig
    #[clap(long, global = true)]
    kubeconfig: Option<PathBuf>,
    /// Kubeconfig context to use
    #[clap(long, global = true, env = "KUBESHIP_CONTEXT")]
    context: Option<String>,
    /// Use the service account of the current pod
    #[clap(long, global = true)]
    in_cluster: bool,
    #[clap(short, long, global = true, default_value = "default")]
    namespace: String,
    /// Where to read container to repository associations from
    #[clap(long, global = true, value_enum, default_value = "annotation")]
    repository_source: RepositorySource,
    /// Fail instead of picking the only container when no container is given
    #[clap(long, global = true)]
    require_container_annotation: bool,
    /// GitHub access token
    #[clap(long, global = true, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    #[clap(long, global = true, env = "GITHUB_API_URL", default_value = github::DEFAULT_API_URL)]
    github_api_url: String,
    /// Recorded as the deploying user
    #[clap(short, long, global = true, env = "USER", default_value = "")]
    user: String,
    /// Resolve everything, change nothing
    #[clap(long, global = true)]
    dry_run: bool,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy to every Deployment annotated as deploy target
    Deploy {
        /// Branch, tag or commit SHA-1 to deploy
        reference: Option<String>,
        #[clap(long)]
        image: Option<String>,
        #[clap(long)]
        tag: Option<String>,
        /// Record a GitHub deployment for this environment
        #[clap(long)]
        environment: Option<String>,
    },
    /// Set an image on one Deployment
    Image {
        image: String,
        #[clap(short, long)]
        container: Option<String>,
        #[clap(short, long)]
        deployment: Option<String>,
    },
    /// Set a tag on one Deployment, keeping its image repository
    Tag {
        tag: String,
        #[clap(short, long)]
        container: Option<String>,
        #[clap(short, long)]
        deployment: Option<String>,
    },
    /// Deploy a branch, tag or commit to one Deployment
    Ref {
        reference: String,
        #[clap(short, long)]
        container: Option<String>,
        #[clap(short, long)]
        deployment: Option<String>,
    },
    /// Restart pods without changing images
    Reload {
        #[clap(short, long)]
        deployment: Option<String>,
    },
    /// Show deployed revisions
    History {
        #[clap(short, long)]
        deployment: Option<String>,
        #[clap(short, long)]
        container: Option<String>,
        #[clap(long, default_value_t = 10)]
        limit: usize,
        /// Show every revision
        #[clap(long, conflicts_with = "limit")]
        all: bool,
    },
}

impl Opts {
    fn settings(&self) -> Settings {
        Settings {
            namespace: self.namespace.clone(),
            keys: AnnotationKeys::new(&self.annotation_prefix),
            repository_source: self.repository_source,
            container_fallback: if self.require_container_annotation {
                ContainerFallback::RequireAnnotation
            } else {
                ContainerFallback::SingleContainer
            },
            user: self.user.clone(),
            dry_run: self.dry_run,
        }
    }

    async fn kube_config(&self) -> Result<Config> {
        if self.in_cluster {
            return Config::incluster().context("failed to load in-cluster config");
        }
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..KubeConfigOptions::default()
        };
        match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("failed to read kubeconfig {}", path.display()))?;
                Ok(Config::from_custom_kubeconfig(kubeconfig, &options).await?)
            }
            None if self.context.is_some() => Ok(Config::from_kubeconfig(&options).await?),
            None => Ok(Config::infer().await?),
        }
    }
}

fn print_report(report: &DeployReport, dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    for target in &report.outcomes {
        println!(
            "{}deploy to (deployment: {:?}, container: {:?})",
            prefix, target.workload, target.container
        );
        println!("{}  before: {}", prefix, target.previous_image);
        println!("{}   after: {}", prefix, target.new_image);
        match &target.outcome {
            Outcome::Failed(err) => println!("{}  failed: {}", prefix, err),
            Outcome::NotAttempted => println!("{}  skipped", prefix),
            Outcome::Applied(updated) => log::debug!("{} accepted the patch", updated),
            Outcome::DryRun => {}
        }
    }
    if let Some(Ok(id)) = &report.marker {
        println!("{}GitHub deployment {} created", prefix, id);
    }
}

fn finish(report: DeployReport, dry_run: bool) -> Result<()> {
    print_report(&report, dry_run);
    match report.error() {
        Some(err) => Err(anyhow::anyhow!("deploy stopped: {}", err)),
        None => Ok(()),
    }
}

impl Command {
    /// Validated before any collaborator is set up; empty values count as absent
    fn selector(&self) -> error::Result<Option<Selector>> {
        let selector = match self {
            Command::Deploy {
                reference,
                image,
                tag,
                ..
            } => Selector::from_inputs(reference.clone(), image.clone(), tag.clone())?,
            Command::Image { image, .. } => Selector::from_inputs(None, Some(image.clone()), None)?,
            Command::Tag { tag, .. } => Selector::from_inputs(None, None, Some(tag.clone()))?,
            Command::Ref { reference, .. } => {
                Selector::from_inputs(Some(reference.clone()), None, None)?
            }
            Command::Reload { .. } | Command::History { .. } => return Ok(None),
        };
        Ok(Some(selector))
    }
}

async fn run(opts: Opts) -> Result<()> {
    let selector = opts.command.selector()?;
    let settings = opts.settings();
    let client = Client::try_from(opts.kube_config().await?)?;
    let cluster = KubeCluster::new(client, settings.keys.clone());
    let scm = GithubClient::new(&opts.github_api_url, opts.access_token.clone())?;
    let shipper = Shipper::new(&cluster, &scm, &settings);

    match (opts.command, selector) {
        (Command::Deploy { environment, .. }, Some(selector)) => {
            let report = shipper.deploy(&selector, environment.as_deref()).await?;
            finish(report, settings.dry_run)
        }
        (
            Command::Image {
                container,
                deployment,
                ..
            }
            | Command::Tag {
                container,
                deployment,
                ..
            }
            | Command::Ref {
                container,
                deployment,
                ..
            },
            Some(selector),
        ) => {
            let report = shipper
                .ship_one(deployment.as_deref(), container.as_deref(), &selector)
                .await?;
            finish(report, settings.dry_run)
        }
        (Command::Reload { deployment }, _) => {
            let signature = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
            for workload in shipper.reload(deployment.as_deref(), &signature).await? {
                if settings.dry_run {
                    println!("[dry-run] reload {}", workload);
                } else {
                    println!("reloaded {}", workload);
                }
            }
            Ok(())
        }
        (
            Command::History {
                deployment,
                container,
                limit,
                all,
            },
            _,
        ) => {
            let limit = if all {
                HistoryLimit::All
            } else {
                HistoryLimit::Latest(limit)
            };
            let histories = shipper
                .history(deployment.as_deref(), container.as_deref(), limit)
                .await?;
            for history in histories {
                println!(
                    "=== {} (container: {:?})",
                    history.workload, history.container
                );
                println!("{}", render(&history.rows));
            }
            Ok(())
        }
        (_, None) => Err(error::Error::MissingSelector.into()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("kubeship=info")).init();

    let opts = Opts::parse();
    if let Err(err) = run(opts).await {
        if let Some(kind) = err.downcast_ref::<error::Error>().map(error::Error::kind) {
            log::debug!("{:?} error", kind);
        }
        log::error!("{:#}", err);
        std::process::exit(1);
    }
}
