//! Label Actions
//!
//! A single convergence step produced by the reconciler: describe it for
//! review, then execute it against the remote API.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexSet;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::github::LabelApi;
use crate::repository::{Label, Repository, RepositoryRef};

/// Kinds of label actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    /// Create a label that does not exist yet
    Create,

    /// Edit an existing label in place
    Edit,

    /// Move every issue from one label to another, then delete the old label
    Relabel,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Edit => "edit",
            ActionKind::Relabel => "relabel",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(ActionKind::Create),
            "edit" => Ok(ActionKind::Edit),
            "relabel" => Ok(ActionKind::Relabel),
            other => Err(Error::UnimplementedActionKind(other.to_string())),
        }
    }
}

/// One convergence step for one repository
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub kind: ActionKind,
    pub organization: String,
    pub repository: RepositoryRef,

    /// Label as it exists now (`None` only for `Create`)
    pub extant: Option<Label>,

    /// Label as it should exist afterwards
    pub update: Label,
}

impl Action {
    pub fn create(organization: &str, repository: RepositoryRef, update: Label) -> Self {
        Self {
            kind: ActionKind::Create,
            organization: organization.to_string(),
            repository,
            extant: None,
            update,
        }
    }

    pub fn edit(
        organization: &str,
        repository: RepositoryRef,
        extant: Label,
        update: Label,
    ) -> Self {
        Self {
            kind: ActionKind::Edit,
            organization: organization.to_string(),
            repository,
            extant: Some(extant),
            update,
        }
    }

    pub fn relabel(
        organization: &str,
        repository: RepositoryRef,
        extant: Label,
        update: Label,
    ) -> Self {
        Self {
            kind: ActionKind::Relabel,
            organization: organization.to_string(),
            repository,
            extant: Some(extant),
            update,
        }
    }

    /// Describe the action for review
    ///
    /// Renders `<kind>: [<n>] <org>/<repo> ("<old>" -> "<new>", ...)`. The
    /// issue count is only shown when requested; a create keeps the column
    /// blank. Color and description are only shown when they change.
    pub fn describe(&self, repository: &Repository, show_issue_count: bool) -> String {
        let mut output = format!("{:<10}", format!("{}:", self.kind));

        if show_issue_count {
            let count = match &self.extant {
                Some(extant) => format!("[{}]", repository.issue_count(extant.id_str())),
                None => String::new(),
            };
            output.push_str(&format!("{count:<6}"));
        }

        output.push_str(&format!(
            "{}/{} ({})",
            self.organization,
            self.repository.name,
            self.describe_changes()
        ));
        output
    }

    fn describe_changes(&self) -> String {
        let update = &self.update;
        let Some(extant) = &self.extant else {
            return format!("\"{}\"", update.name);
        };

        let mut changes = if extant.name != update.name {
            format!("\"{}\" -> \"{}\"", extant.name, update.name)
        } else {
            format!("\"{}\"", update.name)
        };

        if extant.color != update.color {
            changes.push_str(&format!(", \"{}\" -> \"{}\"", extant.color, update.color));
        }

        if extant.description != update.description {
            changes.push_str(&format!(
                ", \"{}\" -> \"{}\"",
                extant.description, update.description
            ));
        }

        changes
    }

    fn require_extant(&self) -> Result<&Label> {
        self.extant.as_ref().ok_or_else(|| {
            Error::MalformedAction(format!(
                "{} of \"{}\" has no extant label",
                self.kind, self.update.name
            ))
        })
    }

    /// Execute the action
    ///
    /// The snapshot is updated after each remote call that succeeds, so it
    /// keeps describing the remote state when a later call fails.
    ///
    /// # Errors
    /// Returns `RemoteOperationFailed` naming the first failing remote call.
    /// A failed issue update stops a relabel before its label is deleted.
    pub async fn execute(&self, repository: &mut Repository, api: &dyn LabelApi) -> Result<()> {
        match self.kind {
            ActionKind::Create => {
                let created = api
                    .create_label(repository.id(), &self.update)
                    .await
                    .map_err(|e| Error::remote(format!("create label \"{}\"", self.update.name), e))?;
                info!(repository = %repository.name(), label = %created.name, "created label");
                repository.insert_label(created);
            }
            ActionKind::Edit => {
                let extant = self.require_extant()?;
                api.edit_label(extant, &self.update)
                    .await
                    .map_err(|e| Error::remote(format!("edit label {}", extant.id_str()), e))?;
                info!(
                    repository = %repository.name(),
                    from = %extant.name,
                    to = %self.update.name,
                    "edited label"
                );
                repository.replace_label(extant.id_str(), &self.update);
            }
            ActionKind::Relabel => {
                let extant = self.require_extant()?;
                self.relabel_issues(repository, api, extant).await?;

                api.delete_label(extant)
                    .await
                    .map_err(|e| Error::remote(format!("delete label {}", extant.id_str()), e))?;
                info!(repository = %repository.name(), label = %extant.name, "deleted merged label");
                repository.remove_label(extant.id_str());
            }
        }

        Ok(())
    }

    async fn relabel_issues(
        &self,
        repository: &mut Repository,
        api: &dyn LabelApi,
        extant: &Label,
    ) -> Result<()> {
        let issue_ids: Vec<String> = repository
            .issues_by_label(extant.id_str())
            .into_iter()
            .map(|issue| issue.id.clone())
            .collect();

        for issue_id in issue_ids {
            let Some(issue) = repository.issues().get(&issue_id) else {
                continue;
            };

            let mut labels: IndexSet<String> = issue.labels.clone();
            labels.shift_remove(extant.id_str());
            labels.insert(self.update.id_str().to_string());

            let label_ids: Vec<String> = labels.iter().cloned().collect();
            api.update_issue_labels(&issue_id, &label_ids)
                .await
                .map_err(|e| Error::remote(format!("update issue {issue_id}"), e))?;
            debug!(issue = %issue_id, from = %extant.name, to = %self.update.name, "relabeled issue");

            repository.set_issue_labels(&issue_id, labels);
        }

        Ok(())
    }
}

/// Find the first action of `kind` whose update carries `label_name`
pub fn find_action(actions: &[Action], kind: ActionKind, label_name: &str) -> Option<usize> {
    actions
        .iter()
        .position(|action| action.kind == kind && action.update.name == label_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::Issue;
    use crate::testing::{Call, RecordingApi};
    use indexmap::IndexMap;

    fn label(id: &str, name: &str, description: &str, color: &str) -> Label {
        Label::new(Some(id.to_string()), name, description, color)
    }

    fn repository() -> Repository {
        let labels: IndexMap<String, Label> = [
            label("L_bug", "bug", "Broken", "d73a4a"),
            label("L_defect", "defect", "Old name", "ff0000"),
        ]
        .into_iter()
        .map(|l| (l.id_str().to_string(), l))
        .collect();
        let issues: IndexMap<String, Issue> = [
            Issue::new("I_1", "one", ["L_defect"]),
            Issue::new("I_2", "two", ["L_defect", "L_bug"]),
            Issue::new("I_3", "three", ["L_bug"]),
        ]
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

        Repository::new("R_1", "h", labels, issues, Vec::new()).unwrap()
    }

    fn relabel_defect(repo: &Repository) -> Action {
        Action::relabel(
            "hypothesis",
            repo.reference(),
            repo.label_by_name("defect").unwrap().clone(),
            repo.label_by_name("bug").unwrap().clone(),
        )
    }

    #[test]
    fn test_action_kind_parse() {
        assert_eq!("edit".parse::<ActionKind>().unwrap(), ActionKind::Edit);
        assert_eq!(ActionKind::Relabel.to_string(), "relabel");
        let err = "merge".parse::<ActionKind>().unwrap_err();
        assert!(matches!(err, Error::UnimplementedActionKind(ref k) if k == "merge"));
    }

    #[test]
    fn test_find_action_empty_list() {
        assert_eq!(find_action(&[], ActionKind::Create, "bug"), None);
    }

    #[test]
    fn test_find_action_first_match() {
        let repo = repository();
        let update = Label::new(None, "bug", "", "ffffff");
        let actions = vec![
            Action::edit("o", repo.reference(), update.clone(), update.clone()),
            Action::create("o", repo.reference(), Label::new(None, "docs", "", "ffffff")),
            Action::create("o", repo.reference(), update.clone()),
            Action::create("o", repo.reference(), update),
        ];

        assert_eq!(find_action(&actions, ActionKind::Create, "bug"), Some(2));
        assert_eq!(find_action(&actions, ActionKind::Edit, "bug"), Some(0));
        assert_eq!(find_action(&actions, ActionKind::Relabel, "bug"), None);
        assert_eq!(find_action(&actions, ActionKind::Create, "Bug"), None);
    }

    #[test]
    fn test_describe_create_shows_only_new_name() {
        let repo = repository();
        let action = Action::create(
            "hypothesis",
            repo.reference(),
            Label::new(None, "docs", "Docs", "0075ca"),
        );

        assert_eq!(
            action.describe(&repo, false),
            "create:   hypothesis/h (\"docs\")"
        );
        assert_eq!(
            action.describe(&repo, true),
            "create:         hypothesis/h (\"docs\")"
        );
    }

    #[test]
    fn test_describe_edit_shows_changed_fields() {
        let repo = repository();
        let extant = repo.label_by_name("bug").unwrap().clone();
        let update = Label::new(extant.id.clone(), "Bug", "Broken", "b60205");
        let action = Action::edit("hypothesis", repo.reference(), extant, update);

        assert_eq!(
            action.describe(&repo, false),
            "edit:     hypothesis/h (\"bug\" -> \"Bug\", \"d73a4a\" -> \"b60205\")"
        );
    }

    #[test]
    fn test_describe_relabel_with_issue_count() {
        let repo = repository();
        let action = relabel_defect(&repo);

        assert_eq!(
            action.describe(&repo, true),
            "relabel:  [2]   hypothesis/h (\"defect\" -> \"bug\", \"ff0000\" -> \"d73a4a\", \"Old name\" -> \"Broken\")"
        );
    }

    #[tokio::test]
    async fn test_execute_create_records_new_label() {
        let mut repo = repository();
        let api = RecordingApi::new();
        let action = Action::create(
            "hypothesis",
            repo.reference(),
            Label::new(None, "docs", "Docs", "0075ca"),
        );

        action.execute(&mut repo, &api).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![Call::CreateLabel {
                repository_id: "R_1".to_string(),
                name: "docs".to_string()
            }]
        );
        assert!(repo.label_by_name("docs").unwrap().id.is_some());
    }

    #[tokio::test]
    async fn test_execute_edit_uses_extant_id() {
        let mut repo = repository();
        let api = RecordingApi::new();
        let extant = repo.label_by_name("bug").unwrap().clone();
        let update = Label::new(extant.id.clone(), "Bug", "Broken", "b60205");
        let action = Action::edit("hypothesis", repo.reference(), extant, update);

        action.execute(&mut repo, &api).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![Call::EditLabel {
                id: "L_bug".to_string(),
                name: "Bug".to_string()
            }]
        );
        assert_eq!(repo.label_by_name("bug").unwrap().name, "Bug");
    }

    #[tokio::test]
    async fn test_execute_relabel_updates_issues_then_deletes() {
        let mut repo = repository();
        let api = RecordingApi::new();
        let action = relabel_defect(&repo);

        action.execute(&mut repo, &api).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::UpdateIssue {
                    id: "I_1".to_string(),
                    labels: vec!["L_bug".to_string()]
                },
                Call::UpdateIssue {
                    id: "I_2".to_string(),
                    labels: vec!["L_bug".to_string()]
                },
                Call::DeleteLabel {
                    id: "L_defect".to_string()
                },
            ]
        );
        assert!(repo.label_by_name("defect").is_none());
        assert_eq!(repo.issue_count("L_bug"), 3);
    }

    #[tokio::test]
    async fn test_execute_relabel_stops_before_delete_on_failure() {
        let mut repo = repository();
        let api = RecordingApi::failing_on(|call| matches!(call, Call::UpdateIssue { id, .. } if id == "I_2"));
        let action = relabel_defect(&repo);

        let err = action.execute(&mut repo, &api).await.unwrap_err();

        assert!(matches!(err, Error::RemoteOperationFailed { ref step, .. } if step == "update issue I_2"));
        assert!(!api
            .calls()
            .iter()
            .any(|call| matches!(call, Call::DeleteLabel { .. })));
        // I_1 was moved remotely, I_2 was not
        assert!(repo.issues()["I_1"].labels.contains("L_bug"));
        assert!(repo.issues()["I_2"].labels.contains("L_defect"));
        assert!(repo.label_by_name("defect").is_some());
    }

    #[tokio::test]
    async fn test_execute_edit_without_extant_is_malformed() {
        let mut repo = repository();
        let api = RecordingApi::new();
        let mut action = relabel_defect(&repo);
        action.kind = ActionKind::Edit;
        action.extant = None;

        let err = action.execute(&mut repo, &api).await.unwrap_err();
        assert!(matches!(err, Error::MalformedAction(_)));
        assert!(api.calls().is_empty());
    }
}
