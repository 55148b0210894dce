//! # org-labeler
//!
//! Reconcile the labels of a GitHub organization's repositories against a
//! declarative configuration
//!
//! ## Features
//! - Minimal create/edit/relabel plans per repository
//! - Synonym merging (relabels issues, then deletes the synonym)
//! - Organization-wide label search and deletion
//! - Confirmation before anything is changed

pub mod action;
pub mod commands;
pub mod config;
pub mod error;
pub mod github;
pub mod reconcile;
pub mod repository;

#[cfg(test)]
pub(crate) mod testing;

pub use action::{find_action, Action, ActionKind};
pub use config::{DesiredLabel, DesiredLabels, OrgConfig};
pub use error::{Error, Result};
pub use github::{GitHubClient, LabelApi};
pub use reconcile::{generate_sync_actions, match_repositories};
pub use repository::{Issue, Label, Repository, RepositoryRef};

/// Compute the sync actions for a single repository
///
/// # Examples
///
/// ```rust,no_run
/// use org_labeler::GitHubClient;
///
/// #[tokio::main]
/// async fn main() -> org_labeler::Result<()> {
///     let config = org_labeler::config::load_config("labels.yaml")?;
///     let client = GitHubClient::new("your_github_token", &config.endpoint)?;
///
///     let actions = org_labeler::plan_repository(&client, &config, "h", false).await?;
///     for action in &actions {
///         println!("{:?} {}", action.kind, action.update.name);
///     }
///     Ok(())
/// }
/// ```
pub async fn plan_repository(
    api: &dyn LabelApi,
    config: &OrgConfig,
    repository: &str,
    include_issues: bool,
) -> Result<Vec<Action>> {
    let snapshot = api
        .fetch_repository(&config.organization, repository, include_issues)
        .await?;
    Ok(generate_sync_actions(
        &config.organization,
        &config.labels,
        &snapshot,
    ))
}
