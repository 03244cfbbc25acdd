//! Resolve-then-mutate transactions behind every command

use crate::{
    cluster::Cluster,
    config::Settings,
    consistency::{resolve_target_image_repository, resolve_target_repository},
    error::{Error, Result},
    github::SourceControl,
    history::{format_and_sort, list_revisions_owned_by, HistoryLimit, Row},
    kubemodel::WorkloadDescriptor,
    mutate::{compose_patch, compose_reload_patch, deploy_cause, single_cause, submit},
    reference::{resolve_image_for_ref, resolve_new_image, Selector},
    select::{build_target_set, detect_target_workload, select_targets, Target, TargetSet},
};

/// Everything decided before the first mutation
#[derive(Debug)]
pub struct DeployPlan {
    pub targets: TargetSet,
    /// Source repository, known when it had to be resolved
    pub repository: Option<String>,
    pub new_image: String,
    pub cause: String,
}

#[derive(Debug)]
pub enum Outcome {
    Applied(WorkloadDescriptor),
    Failed(Error),
    /// An earlier target failed, the batch stopped here
    NotAttempted,
    DryRun,
}

#[derive(Debug)]
pub struct TargetOutcome {
    pub workload: String,
    pub container: String,
    pub previous_image: String,
    pub new_image: String,
    pub outcome: Outcome,
}

#[derive(Debug)]
pub struct DeployReport {
    pub outcomes: Vec<TargetOutcome>,
    /// Deployment marker, when one was requested
    pub marker: Option<Result<u64>>,
}

impl DeployReport {
    /// Mutation failure, if any; targets applied before it are not rolled back
    pub fn error(&self) -> Option<&Error> {
        self.outcomes.iter().find_map(|target| match &target.outcome {
            Outcome::Failed(err) => Some(err),
            _ => None,
        })
    }
}

#[derive(Debug)]
pub struct WorkloadHistory {
    pub workload: String,
    pub container: String,
    pub rows: Vec<Row>,
}

pub struct Shipper<'a> {
    cluster: &'a dyn Cluster,
    scm: &'a dyn SourceControl,
    settings: &'a Settings,
}

impl<'a> Shipper<'a> {
    pub fn new(cluster: &'a dyn Cluster, scm: &'a dyn SourceControl, settings: &'a Settings) -> Self {
        Self {
            cluster,
            scm,
            settings,
        }
    }

    async fn list_workloads(&self) -> Result<Vec<WorkloadDescriptor>> {
        let namespace = &self.settings.namespace;
        let workloads = self.cluster.list_workloads(namespace).await?;
        if workloads.is_empty() {
            return Err(Error::NoWorkloadFound(namespace.clone()));
        }
        Ok(workloads)
    }

    /// Explicitly named workload, or the only one in the namespace
    async fn single_workload(&self, name: Option<&str>) -> Result<WorkloadDescriptor> {
        match name.filter(|name| !name.is_empty()) {
            Some(name) => self.cluster.get_workload(&self.settings.namespace, name).await,
            None => {
                let workloads = self.cluster.list_workloads(&self.settings.namespace).await?;
                detect_target_workload(workloads, &self.settings.namespace)
            }
        }
    }

    /// Plans a deploy to every annotated target; both consistency checks must pass
    pub async fn plan_deploy(&self, selector: &Selector) -> Result<DeployPlan> {
        let workloads = select_targets(self.list_workloads().await?, self.settings)?;
        let targets = build_target_set(workloads, None, self.settings)?;
        let repository = resolve_target_repository(&targets, self.settings)?;
        let image_repository = resolve_target_image_repository(&targets)?;
        log::debug!(
            "{} targets share image {} and repository {}",
            targets.len(),
            image_repository,
            repository
        );
        let new_image = resolve_new_image(self.scm, selector, &image_repository, &repository).await?;

        Ok(DeployPlan {
            targets,
            repository: Some(repository),
            new_image,
            cause: deploy_cause(selector, &self.settings.namespace),
        })
    }

    /// Plans a deploy to one workload and container, named or detected
    pub async fn plan_single(
        &self,
        deployment: Option<&str>,
        container: Option<&str>,
        selector: &Selector,
    ) -> Result<DeployPlan> {
        let workload = self.single_workload(deployment).await?;
        let targets = build_target_set(vec![workload], container, self.settings)?;
        let image_repository = resolve_target_image_repository(&targets)?;

        let (new_image, repository) = match selector.direct_image(&image_repository) {
            Some(image) => (image, None),
            None => {
                let repository = resolve_target_repository(&targets, self.settings)?;
                let image =
                    resolve_image_for_ref(self.scm, &repository, &image_repository, selector.value())
                        .await?;
                (image, Some(repository))
            }
        };
        let cause = single_cause(
            selector,
            &targets[0].container.name,
            &targets[0].workload.name,
            &self.settings.namespace,
        );

        Ok(DeployPlan {
            targets,
            repository,
            new_image,
            cause,
        })
    }

    async fn apply(&self, target: &Target, plan: &DeployPlan) -> Result<WorkloadDescriptor> {
        let patch = compose_patch(
            &self.settings.keys,
            &target.container.name,
            &plan.new_image,
            &self.settings.user,
            &plan.cause,
        )?;
        submit(self.cluster, &target.workload, &patch).await
    }

    /// Mutates targets in order. The first failure stops the batch; earlier
    /// targets stay updated.
    pub async fn execute(
        &self,
        plan: DeployPlan,
        selector: &Selector,
        environment: Option<&str>,
    ) -> DeployReport {
        let mut outcomes = Vec::with_capacity(plan.targets.len());
        let mut failed = false;

        for target in &plan.targets {
            let outcome = if self.settings.dry_run {
                Outcome::DryRun
            } else if failed {
                Outcome::NotAttempted
            } else {
                match self.apply(target, &plan).await {
                    Ok(updated) => {
                        log::info!("Updated {}", updated);
                        Outcome::Applied(updated)
                    }
                    Err(err) => {
                        failed = true;
                        Outcome::Failed(err)
                    }
                }
            };
            outcomes.push(TargetOutcome {
                workload: target.workload.name.clone(),
                container: target.container.name.clone(),
                previous_image: target.container.image.clone(),
                new_image: plan.new_image.clone(),
                outcome,
            });
        }

        let marker = match (environment, selector, &plan.repository) {
            (Some(environment), Selector::Ref(reference), Some(repository))
                if !failed && !self.settings.dry_run =>
            {
                let result = self
                    .scm
                    .create_deployment_marker(repository, reference, environment)
                    .await;
                if let Err(err) = &result {
                    log::warn!("Deployment marker not created: {}", err);
                }
                Some(result)
            }
            (Some(environment), ..) => {
                log::debug!("Skipping deployment marker for {}", environment);
                None
            }
            _ => None,
        };

        DeployReport { outcomes, marker }
    }

    pub async fn deploy(&self, selector: &Selector, environment: Option<&str>) -> Result<DeployReport> {
        let plan = self.plan_deploy(selector).await?;
        Ok(self.execute(plan, selector, environment).await)
    }

    pub async fn ship_one(
        &self,
        deployment: Option<&str>,
        container: Option<&str>,
        selector: &Selector,
    ) -> Result<DeployReport> {
        let plan = self.plan_single(deployment, container, selector).await?;
        Ok(self.execute(plan, selector, None).await)
    }

    /// Restarts pods of the named workload, or of every deploy target
    pub async fn reload(&self, deployment: Option<&str>, signature: &str) -> Result<Vec<WorkloadDescriptor>> {
        let targets = match deployment {
            Some(name) => vec![self.cluster.get_workload(&self.settings.namespace, name).await?],
            None => select_targets(self.list_workloads().await?, self.settings)?,
        };
        if self.settings.dry_run {
            return Ok(targets);
        }

        let patch = compose_reload_patch(&self.settings.keys, signature)?;
        let mut reloaded = Vec::with_capacity(targets.len());
        for workload in &targets {
            reloaded.push(submit(self.cluster, workload, &patch).await?);
        }
        Ok(reloaded)
    }

    pub async fn history(
        &self,
        deployment: Option<&str>,
        container: Option<&str>,
        limit: HistoryLimit,
    ) -> Result<Vec<WorkloadHistory>> {
        let workloads = match deployment {
            Some(name) => vec![self.cluster.get_workload(&self.settings.namespace, name).await?],
            None => select_targets(self.list_workloads().await?, self.settings)?,
        };
        let targets = build_target_set(workloads, container, self.settings)?;
        let revisions = self.cluster.list_revisions(&self.settings.namespace).await?;

        Ok(targets
            .into_iter()
            .map(|target| {
                let owned = list_revisions_owned_by(revisions.clone(), &target.workload.uid);
                WorkloadHistory {
                    rows: format_and_sort(&owned, &target.container.name, limit),
                    workload: target.workload.name,
                    container: target.container.name,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::ErrorKind,
        kubemodel::Revision,
        meta::{lookup, CHANGE_CAUSE_ANNOTATION},
        select::tests::workload,
        testing::{FakeCluster, FakeSourceControl},
    };
    use chrono::{TimeZone, Utc};

    fn settings() -> Settings {
        Settings {
            user: "alice".to_owned(),
            ..Settings::default()
        }
    }

    fn web_and_worker(worker_repository: &str) -> Vec<WorkloadDescriptor> {
        let worker_github = format!("worker={}", worker_repository);
        vec![
            workload(
                "web",
                &[("deploy-target", "1"), ("github", "web=acme/app")],
                &[("web", "app:v1")],
            ),
            workload(
                "worker",
                &[("deploy-target", "true"), ("github", worker_github.as_str())],
                &[("worker", "app:v1")],
            ),
            workload("db", &[], &[("db", "postgres:16")]),
        ]
    }

    #[tokio::test]
    async fn deploy_ref_to_every_target() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default().with_commit("acme/app", "main", "abc123f");
        let settings = settings();
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let report = shipper
            .deploy(&Selector::Ref("main".into()), None)
            .await
            .unwrap();
        assert!(report.error().is_none());
        assert!(report.marker.is_none());
        assert_eq!(report.outcomes.len(), 2);
        for outcome in &report.outcomes {
            assert_eq!(outcome.previous_image, "app:v1");
            assert_eq!(outcome.new_image, "app:abc123f");
            assert!(matches!(outcome.outcome, Outcome::Applied(_)));
        }

        let patched: Vec<_> = cluster.patches().into_iter().map(|(name, _)| name).collect();
        assert_eq!(patched, vec!["web", "worker"]);
        for name in ["web", "worker"] {
            let updated = cluster.workload(name);
            assert_eq!(updated.container(name).unwrap().image, "app:abc123f");
            assert_eq!(
                lookup(&updated.annotations, CHANGE_CAUSE_ANNOTATION),
                Some(r#"kubeship deploy main --namespace "default""#)
            );
            assert_eq!(lookup(&updated.template_annotations, "deploy-user"), Some("alice"));
        }
        assert!(cluster.workload("db").annotations.is_empty());
    }

    #[tokio::test]
    async fn divergent_repositories_stop_before_mutation() {
        let cluster = FakeCluster::new(web_and_worker("acme/other"));
        let scm = FakeSourceControl::default().with_commit("acme/app", "main", "abc123f");
        let settings = settings();
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let err = shipper
            .deploy(&Selector::Ref("main".into()), Some("production"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert!(cluster.patches().is_empty());
        assert!(scm.lookups().is_empty());
        assert!(scm.markers().is_empty());
    }

    #[tokio::test]
    async fn divergent_images_stop_before_mutation() {
        let mut workloads = web_and_worker("acme/app");
        workloads[1].containers[0].image = "nginx:latest".to_owned();
        let cluster = FakeCluster::new(workloads);
        let scm = FakeSourceControl::default();
        let settings = settings();

        let err = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Tag("v2".into()), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InconsistentImages(_)));
        assert!(cluster.patches().is_empty());
    }

    #[tokio::test]
    async fn failure_stops_batch_without_rollback() {
        let cluster = FakeCluster::new(web_and_worker("acme/app")).conflict_on("web");
        let scm = FakeSourceControl::default();
        let settings = settings();

        let report = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Tag("v2".into()), None)
            .await
            .unwrap();
        assert!(matches!(report.outcomes[0].outcome, Outcome::Failed(_)));
        assert!(matches!(report.outcomes[1].outcome, Outcome::NotAttempted));
        assert_eq!(report.error().unwrap().kind(), ErrorKind::ExternalService);
        assert!(cluster.patches().is_empty());
        assert_eq!(cluster.workload("worker").containers[0].image, "app:v1");

        // a later failure keeps the earlier success in place
        let cluster = FakeCluster::new(web_and_worker("acme/app")).conflict_on("worker");
        let report = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Tag("v2".into()), None)
            .await
            .unwrap();
        assert!(matches!(report.outcomes[0].outcome, Outcome::Applied(_)));
        assert!(matches!(report.outcomes[1].outcome, Outcome::Failed(_)));
        assert_eq!(cluster.workload("web").containers[0].image, "app:v2");
    }

    #[tokio::test]
    async fn dry_run_submits_nothing() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default().with_commit("acme/app", "main", "abc123f");
        let settings = Settings {
            dry_run: true,
            ..settings()
        };

        let report = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Ref("main".into()), Some("production"))
            .await
            .unwrap();
        assert!(report
            .outcomes
            .iter()
            .all(|o| matches!(o.outcome, Outcome::DryRun) && o.new_image == "app:abc123f"));
        assert!(cluster.patches().is_empty());
        assert!(scm.markers().is_empty());
    }

    #[tokio::test]
    async fn deployment_marker_is_best_effort() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default().with_commit("acme/app", "main", "abc123f");
        let settings = settings();
        let report = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Ref("main".into()), Some("production"))
            .await
            .unwrap();
        assert_eq!(report.marker.unwrap().unwrap(), 1);
        assert_eq!(
            scm.markers(),
            vec![("acme/app".to_owned(), "main".to_owned(), "production".to_owned())]
        );

        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let rejecting = FakeSourceControl::default()
            .with_commit("acme/app", "main", "abc123f")
            .rejecting_markers();
        let report = Shipper::new(&cluster, &rejecting, &settings)
            .deploy(&Selector::Ref("main".into()), Some("production"))
            .await
            .unwrap();
        assert!(report.error().is_none());
        assert!(matches!(report.marker, Some(Err(_))));
        assert_eq!(cluster.patches().len(), 2);

        // only refs produce a marker
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let report = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Tag("v2".into()), Some("production"))
            .await
            .unwrap();
        assert!(report.marker.is_none());
        assert_eq!(scm.markers().len(), 1);
    }

    #[tokio::test]
    async fn unavailable_source_control_is_terminal() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default().unavailable();
        let settings = settings();
        let err = Shipper::new(&cluster, &scm, &settings)
            .deploy(&Selector::Ref("main".into()), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalService);
        assert_eq!(scm.lookups().len(), 1);
        assert!(cluster.patches().is_empty());
    }

    #[tokio::test]
    async fn single_workload_by_tag() {
        let cluster = FakeCluster::new(vec![workload(
            "web",
            &[],
            &[("rails", "my-rails:v2"), ("nginx", "nginx:1.25")],
        )]);
        let scm = FakeSourceControl::default();
        let settings = settings();
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let err = shipper
            .ship_one(None, None, &Selector::Tag("v3".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AmbiguousContainer { .. }));

        let report = shipper
            .ship_one(None, Some("rails"), &Selector::Tag("v3".into()))
            .await
            .unwrap();
        assert!(report.error().is_none());
        let updated = cluster.workload("web");
        assert_eq!(updated.container("rails").unwrap().image, "my-rails:v3");
        assert_eq!(updated.container("nginx").unwrap().image, "nginx:1.25");
        assert_eq!(
            lookup(&updated.annotations, CHANGE_CAUSE_ANNOTATION),
            Some(r#"kubeship tag v3 --container "rails" --deployment "web" --namespace "default""#)
        );
        assert!(scm.lookups().is_empty());
    }

    #[tokio::test]
    async fn single_workload_by_ref() {
        let cluster = FakeCluster::new(vec![
            workload("web", &[("github", "web=acme/app")], &[("web", "app:v1")]),
            workload("admin", &[], &[("admin", "admin:v1")]),
        ]);
        let scm = FakeSourceControl::default().with_commit("acme/app", "feature", "def4567");
        let settings = settings();
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let err = shipper
            .ship_one(None, None, &Selector::Ref("feature".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Ambiguity);

        let err = shipper
            .ship_one(Some("missing"), None, &Selector::Ref("feature".into()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let report = shipper
            .ship_one(Some("web"), None, &Selector::Ref("feature".into()))
            .await
            .unwrap();
        assert_eq!(report.outcomes[0].new_image, "app:def4567");
        assert_eq!(cluster.workload("web").containers[0].image, "app:def4567");
    }

    #[tokio::test]
    async fn reload_stamps_every_target() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default();
        let settings = settings();
        let reloaded = Shipper::new(&cluster, &scm, &settings)
            .reload(None, "2017-12-05T12:18:31+09:00")
            .await
            .unwrap();
        let names: Vec<_> = reloaded.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["web", "worker"]);
        for workload in &reloaded {
            assert_eq!(
                lookup(&workload.template_annotations, "reloaded-at"),
                Some("2017-12-05T12:18:31+09:00")
            );
            assert_eq!(workload.containers[0].image, "app:v1");
        }
    }

    #[tokio::test]
    async fn history_of_targets() {
        let revision = |number: &str, day: u32, owner: &str, image: &str| Revision {
            name: format!("web-{}", number),
            created_at: Some(Utc.with_ymd_and_hms(2017, 12, day, 0, 0, 0).unwrap()),
            revision_number: number.to_owned(),
            deployed_by: "alice".to_owned(),
            images: vec![("web".to_owned(), image.to_owned())],
            owner_uids: vec![owner.to_owned()],
        };
        let cluster = FakeCluster::new(web_and_worker("acme/app")).with_revisions(vec![
            revision("1", 1, "uid-web", "app:v1"),
            revision("2", 2, "uid-web", "app:v2"),
            revision("3", 3, "uid-other", "app:v3"),
        ]);
        let scm = FakeSourceControl::default();
        let settings = settings();
        let history = Shipper::new(&cluster, &scm, &settings)
            .history(None, None, HistoryLimit::Latest(10))
            .await
            .unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].workload, "web");
        let images: Vec<_> = history[0].rows.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(images, vec!["app:v2", "app:v1"]);
        assert_eq!(history[1].workload, "worker");
        assert!(history[1].rows.is_empty());
    }

    #[tokio::test]
    async fn reload_named_deployment_skips_selection() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default();
        let settings = settings();
        let reloaded = Shipper::new(&cluster, &scm, &settings)
            .reload(Some("db"), "2017-12-05T12:18:31+09:00")
            .await
            .unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].name, "db");
        let patched: Vec<_> = cluster.patches().into_iter().map(|(name, _)| name).collect();
        assert_eq!(patched, vec!["db"]);
        assert!(lookup(&cluster.workload("web").template_annotations, "reloaded-at").is_none());

        let err = Shipper::new(&cluster, &scm, &settings)
            .reload(Some("missing"), "2017-12-05T12:18:31+09:00")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::WorkloadNotFound { .. }));
    }

    #[tokio::test]
    async fn dry_run_reload_and_single_submit_nothing() {
        let cluster = FakeCluster::new(web_and_worker("acme/app"));
        let scm = FakeSourceControl::default();
        let settings = Settings {
            dry_run: true,
            ..settings()
        };
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let selected = shipper
            .reload(None, "2017-12-05T12:18:31+09:00")
            .await
            .unwrap();
        let names: Vec<_> = selected.iter().map(|w| w.name.as_str()).collect();
        assert_eq!(names, vec!["web", "worker"]);

        let report = shipper
            .ship_one(Some("web"), None, &Selector::Tag("v3".into()))
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 1);
        assert!(matches!(report.outcomes[0].outcome, Outcome::DryRun));
        assert_eq!(report.outcomes[0].new_image, "app:v3");

        assert!(cluster.patches().is_empty());
        assert_eq!(cluster.workload("web").containers[0].image, "app:v1");
    }

    #[tokio::test]
    async fn history_of_named_deployment_and_container() {
        let revision = |number: &str, day: u32, rails: &str| Revision {
            name: format!("admin-{}", number),
            created_at: Some(Utc.with_ymd_and_hms(2017, 12, day, 0, 0, 0).unwrap()),
            revision_number: number.to_owned(),
            deployed_by: "bob".to_owned(),
            images: vec![
                ("rails".to_owned(), rails.to_owned()),
                ("nginx".to_owned(), "nginx:1.25".to_owned()),
            ],
            owner_uids: vec!["uid-admin".to_owned()],
        };
        let mut workloads = web_and_worker("acme/app");
        workloads.push(workload(
            "admin",
            &[],
            &[("rails", "admin:v2"), ("nginx", "nginx:1.25")],
        ));
        let cluster = FakeCluster::new(workloads)
            .with_revisions(vec![revision("1", 1, "admin:v1"), revision("2", 2, "admin:v2")]);
        let scm = FakeSourceControl::default();
        let settings = settings();
        let shipper = Shipper::new(&cluster, &scm, &settings);

        let history = shipper
            .history(Some("admin"), Some("rails"), HistoryLimit::All)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].workload, "admin");
        assert_eq!(history[0].container, "rails");
        let images: Vec<_> = history[0].rows.iter().map(|r| r.image.as_str()).collect();
        assert_eq!(images, vec!["admin:v2", "admin:v1"]);

        let history = shipper
            .history(Some("admin"), Some("nginx"), HistoryLimit::Latest(1))
            .await
            .unwrap();
        assert_eq!(history[0].rows.len(), 1);
        assert_eq!(history[0].rows[0].image, "nginx:1.25");

        let err = shipper.history(Some("admin"), None, HistoryLimit::All).await.unwrap_err();
        assert!(matches!(err, Error::AmbiguousContainer { .. }));
        assert!(cluster.patches().is_empty());
    }
}
