//! Organization Commands
//!
//! Sync, delete and search across every configured repository. Each command
//! fetches snapshots, builds a plan that can be shown for confirmation, and
//! executes it strictly in order.

use indexmap::IndexMap;
use tracing::{info, warn};

use crate::action::{Action, ActionKind};
use crate::config::OrgConfig;
use crate::error::{Error, Result};
use crate::github::LabelApi;
use crate::reconcile::{generate_sync_actions, match_repositories};
use crate::repository::{Label, Repository, RepositoryRef};

/// Result of executing one planned step
#[derive(Debug)]
pub enum Outcome {
    Succeeded,
    Skipped,
    Failed(Error),
}

/// Summary of an execution run
#[derive(Debug, Default)]
pub struct ExecutionReport {
    pub succeeded: usize,
    pub skipped: usize,

    /// Description of each failed step with its error
    pub failures: Vec<String>,

    /// Steps never attempted because the run stopped early
    pub not_attempted: usize,
}

impl ExecutionReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    fn record(&mut self, description: &str, outcome: &Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed(e) => self.failures.push(format!("{description}: {e}")),
        }
    }
}

/// Snapshots of the configured repositories
#[derive(Debug, Default)]
pub struct Fetched {
    pub repositories: Vec<Repository>,

    /// Repositories whose snapshot could not be reconciled at all
    pub skipped: Vec<(String, Error)>,
}

/// Fetch every configured repository in configuration order
///
/// A repository whose snapshot violates an index invariant is skipped and
/// reported; any other error stops the fetch.
///
/// # Errors
/// Returns the first non repository-fatal fetch error
pub async fn fetch_repositories(
    api: &dyn LabelApi,
    config: &OrgConfig,
    include_issues: bool,
) -> Result<Fetched> {
    let mut fetched = Fetched::default();

    for name in &config.project_repos {
        info!(organization = %config.organization, repository = %name, "fetching repository");

        match api
            .fetch_repository(&config.organization, name, include_issues)
            .await
        {
            Ok(repository) => {
                for error in repository.errors() {
                    warn!(repository = %name, "{}", error);
                }
                fetched.repositories.push(repository);
            }
            Err(e) if e.is_repository_fatal() => {
                warn!(repository = %name, error = %e, "skipping repository");
                fetched.skipped.push((name.clone(), e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(fetched)
}

/// Actions for one repository together with its snapshot
#[derive(Debug)]
pub struct RepositoryPlan {
    pub repository: Repository,
    pub actions: Vec<Action>,
}

/// Sync plan across the organization
#[derive(Debug)]
pub struct SyncPlan {
    /// Whether relabel actions are executed (issues were fetched)
    pub relabel: bool,
    pub repositories: Vec<RepositoryPlan>,
    pub skipped: Vec<(String, Error)>,
}

impl SyncPlan {
    /// Fetch every repository and compute its actions
    ///
    /// # Errors
    /// If fetching fails
    pub async fn prepare(api: &dyn LabelApi, config: &OrgConfig, relabel: bool) -> Result<Self> {
        let fetched = fetch_repositories(api, config, relabel).await?;
        let mut plan = Self::from_repositories(config, fetched.repositories, relabel);
        plan.skipped = fetched.skipped;
        Ok(plan)
    }

    pub fn from_repositories(
        config: &OrgConfig,
        repositories: Vec<Repository>,
        relabel: bool,
    ) -> Self {
        let repositories = repositories
            .into_iter()
            .map(|repository| RepositoryPlan {
                actions: generate_sync_actions(&config.organization, &config.labels, &repository),
                repository,
            })
            .collect();

        Self {
            relabel,
            repositories,
            skipped: Vec::new(),
        }
    }

    pub fn action_count(&self) -> usize {
        self.repositories.iter().map(|plan| plan.actions.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.action_count() == 0
    }

    /// One line per action, issue counts shown when relabeling
    pub fn describe(&self) -> Vec<String> {
        self.repositories
            .iter()
            .flat_map(|plan| {
                plan.actions
                    .iter()
                    .map(|action| action.describe(&plan.repository, self.relabel))
            })
            .collect()
    }

    /// Execute every action in order
    ///
    /// Relabel actions are skipped unless the plan relabels. The first
    /// failure stops the run; later actions are counted as not attempted.
    /// Steps are reported with the descriptions from [`SyncPlan::describe`],
    /// taken before anything executes.
    pub async fn execute<F>(&mut self, api: &dyn LabelApi, mut on_step: F) -> ExecutionReport
    where
        F: FnMut(&str, &Outcome),
    {
        let mut report = ExecutionReport::default();
        let total = self.action_count();
        let relabel = self.relabel;
        let mut descriptions = self.describe().into_iter();

        for plan in &mut self.repositories {
            for action in &plan.actions {
                let description = descriptions.next().unwrap_or_default();

                let outcome = if !relabel && action.kind == ActionKind::Relabel {
                    Outcome::Skipped
                } else {
                    match action.execute(&mut plan.repository, api).await {
                        Ok(()) => Outcome::Succeeded,
                        Err(e) => Outcome::Failed(e),
                    }
                };

                on_step(&description, &outcome);
                report.record(&description, &outcome);

                if let Outcome::Failed(e) = &outcome {
                    warn!(error = %e, "sync halted");
                    let attempted = report.succeeded + report.skipped + report.failures.len();
                    report.not_attempted = total - attempted;
                    return report;
                }
            }
        }

        report
    }
}

/// Deletion of one label across the organization
#[derive(Debug)]
pub struct DeletePlan {
    pub organization: String,
    pub label: String,
    pub targets: Vec<(RepositoryRef, Label)>,
    pub skipped: Vec<(String, Error)>,
}

impl DeletePlan {
    /// Fetch every repository and find the label in each
    ///
    /// # Errors
    /// If fetching fails
    pub async fn prepare(api: &dyn LabelApi, config: &OrgConfig, label: &str) -> Result<Self> {
        let fetched = fetch_repositories(api, config, false).await?;
        let mut plan = Self::from_repositories(&config.organization, label, &fetched.repositories);
        plan.skipped = fetched.skipped;
        Ok(plan)
    }

    pub fn from_repositories(organization: &str, label: &str, repositories: &[Repository]) -> Self {
        let targets = repositories
            .iter()
            .filter_map(|repository| {
                repository
                    .label_by_name(label)
                    .map(|found| (repository.reference(), found.clone()))
            })
            .collect();

        Self {
            organization: organization.to_string(),
            label: label.to_string(),
            targets,
            skipped: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// `<org>/<repo>` for every repository carrying the label
    pub fn describe(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|(repository, _)| format!("{}/{}", self.organization, repository.name))
            .collect()
    }

    /// Delete the label from every repository
    ///
    /// A failure on one repository is reported and the run continues.
    pub async fn execute<F>(&self, api: &dyn LabelApi, mut on_step: F) -> ExecutionReport
    where
        F: FnMut(&str, &Outcome),
    {
        let mut report = ExecutionReport::default();

        for (repository, label) in &self.targets {
            let description = format!(
                "Deleting \"{}\" from {}/{}",
                self.label, self.organization, repository.name
            );

            let outcome = match api.delete_label(label).await {
                Ok(()) => {
                    info!(repository = %repository.name, label = %label.name, "deleted label");
                    Outcome::Succeeded
                }
                Err(e) => {
                    let e = Error::remote(format!("delete label {}", label.id_str()), e);
                    warn!(repository = %repository.name, error = %e, "delete failed, continuing");
                    Outcome::Failed(e)
                }
            };

            on_step(&description, &outcome);
            report.record(&description, &outcome);
        }

        report
    }
}

/// Search configured repositories for labels matching `pattern`
///
/// # Errors
/// If fetching fails or the pattern is invalid
pub async fn search_labels(
    api: &dyn LabelApi,
    config: &OrgConfig,
    pattern: &str,
) -> Result<IndexMap<String, Vec<String>>> {
    let fetched = fetch_repositories(api, config, false).await?;
    match_repositories(&fetched.repositories, pattern)
}
