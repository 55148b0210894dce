//! Label Reconciliation
//!
//! Computes the ordered actions that converge one repository snapshot to the
//! configured label set, merging synonyms into their canonical labels.

use std::collections::HashSet;

use indexmap::IndexMap;
use regex::RegexBuilder;
use tracing::debug;

use crate::action::{find_action, Action, ActionKind};
use crate::config::{DesiredLabel, DesiredLabels};
use crate::error::Result;
use crate::repository::{Label, Repository};

/// Outcome of the first pass for one desired label
struct LabelPlan<'a> {
    name: &'a str,
    desired: &'a DesiredLabel,

    /// Label as it should exist after convergence
    target: Label,

    /// Create or edit of the canonical label itself
    base: Option<Action>,
}

/// Generate the actions converging `repository` to `desired`
///
/// Actions follow the configured label order; each label's own create/edit
/// comes before the actions merging its synonyms. When the canonical label
/// does not exist yet, the first existing synonym is edited in place to
/// become it instead of creating the label and relabeling onto it.
pub fn generate_sync_actions(
    organization: &str,
    desired: &DesiredLabels,
    repository: &Repository,
) -> Vec<Action> {
    let plans: Vec<LabelPlan<'_>> = desired
        .iter()
        .map(|(name, label)| plan_label(organization, name, label, repository))
        .collect();

    // Existing canonical labels are never merged away as someone's synonym
    let mut claimed: HashSet<String> = plans
        .iter()
        .filter_map(|plan| plan.target.id.clone())
        .collect();

    let mut actions = Vec::new();

    for plan in plans {
        if let Some(action) = plan.base {
            actions.push(action);
        }

        let mut target = plan.target;

        for synonym in &plan.desired.synonyms {
            let Some(extant) = repository.label_by_name(synonym) else {
                continue;
            };

            if !claimed.insert(extant.id_str().to_string()) {
                debug!(
                    repository = %repository.name(),
                    label = %plan.name,
                    synonym = %synonym,
                    "synonym already accounted for, skipping"
                );
                continue;
            }

            match find_action(&actions, ActionKind::Create, plan.name) {
                Some(index) => {
                    // The synonym becomes the canonical label
                    actions.remove(index);
                    target.id = extant.id.clone();
                    actions.push(Action::edit(
                        organization,
                        repository.reference(),
                        extant.clone(),
                        target.clone(),
                    ));
                }
                None => actions.push(Action::relabel(
                    organization,
                    repository.reference(),
                    extant.clone(),
                    target.clone(),
                )),
            }
        }
    }

    debug!(
        repository = %repository.name(),
        actions = actions.len(),
        "generated sync actions"
    );
    actions
}

fn plan_label<'a>(
    organization: &str,
    name: &'a str,
    desired: &'a DesiredLabel,
    repository: &Repository,
) -> LabelPlan<'a> {
    let Some(existing) = repository.label_by_name(name) else {
        let target = Label::new(None, name, desired.description.as_str(), desired.color.as_str());
        return LabelPlan {
            name,
            desired,
            base: Some(Action::create(
                organization,
                repository.reference(),
                target.clone(),
            )),
            target,
        };
    };

    let target = Label::new(
        existing.id.clone(),
        name,
        desired.description.as_str(),
        desired.color.as_str(),
    );

    // Case-only renames count as a change
    let changed = existing.name != target.name
        || existing.color != target.color
        || existing.description != target.description;

    LabelPlan {
        name,
        desired,
        base: changed.then(|| {
            Action::edit(
                organization,
                repository.reference(),
                existing.clone(),
                target.clone(),
            )
        }),
        target,
    }
}

/// Find label names matching `pattern` (case-insensitive regex) per repository
///
/// Repositories without a match are omitted.
///
/// # Errors
/// Returns `InvalidPattern` if the pattern does not compile
pub fn match_repositories(
    repositories: &[Repository],
    pattern: &str,
) -> Result<IndexMap<String, Vec<String>>> {
    let regex = RegexBuilder::new(pattern).case_insensitive(true).build()?;

    let matched = repositories
        .iter()
        .filter_map(|repository| {
            let names: Vec<String> = repository
                .labels()
                .values()
                .filter(|label| regex.is_match(&label.name))
                .map(|label| label.name.clone())
                .collect();
            (!names.is_empty()).then(|| (repository.name().to_string(), names))
        })
        .collect();

    Ok(matched)
}
