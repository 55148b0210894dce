//! Repository Snapshot
//!
//! Point-in-time view of a repository's labels and issues, with the lookup
//! indexes the reconciler and the actions rely on. Indexes are built when the
//! snapshot is constructed and kept consistent by the mutation helpers that
//! action execution calls after each successful remote operation.

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Repository label
///
/// Matching is done on the lower-cased name, never on the id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    /// GraphQL node id (`None` for a label that does not exist yet)
    pub id: Option<String>,

    /// Label name
    pub name: String,

    /// Label description (empty when unset)
    pub description: String,

    /// Label color (6-digit hexadecimal, without #)
    pub color: String,
}

impl Label {
    /// Create a new label
    pub fn new(
        id: Option<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            description: description.into(),
            color: color.into(),
        }
    }

    /// Key used for name matching
    pub fn lower_name(&self) -> String {
        self.name.to_lowercase()
    }

    /// Id of the label, or an empty string for a label not created yet
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }
}

/// Issue with the ids of the labels it carries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub id: String,
    pub title: String,
    pub labels: IndexSet<String>,
}

impl Issue {
    pub fn new<I, S>(id: impl Into<String>, title: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            title: title.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }
}

/// Identity of a repository, carried by actions
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryRef {
    pub id: String,
    pub name: String,
}

/// Repository snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Repository {
    id: String,
    name: String,
    labels: IndexMap<String, Label>,
    issues: IndexMap<String, Issue>,
    errors: Vec<String>,
    labels_by_lower_name: HashMap<String, String>,
    issues_by_label: HashMap<String, Vec<String>>,
}

impl Repository {
    /// Build a snapshot and its indexes
    ///
    /// # Arguments
    /// - `labels`: Labels keyed by label id
    /// - `issues`: Issues keyed by issue id
    /// - `errors`: Non-fatal problems found while fetching
    ///
    /// # Errors
    /// Returns `MissingLabelName` if any label has an empty name
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        labels: IndexMap<String, Label>,
        issues: IndexMap<String, Issue>,
        errors: Vec<String>,
    ) -> Result<Self> {
        let name = name.into();
        let labels_by_lower_name = index_labels(&name, &labels)?;
        let issues_by_label = index_issues(&issues);

        debug!(
            repository = %name,
            labels = labels.len(),
            issues = issues.len(),
            "indexed repository snapshot"
        );

        Ok(Self {
            id: id.into(),
            name,
            labels,
            issues,
            errors,
            labels_by_lower_name,
            issues_by_label,
        })
    }

    /// Snapshot with labels only
    pub fn with_labels<I>(id: impl Into<String>, name: impl Into<String>, labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = Label>,
    {
        let labels = labels
            .into_iter()
            .map(|label| (label.id_str().to_string(), label))
            .collect();
        Self::new(id, name, labels, IndexMap::new(), Vec::new())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn reference(&self) -> RepositoryRef {
        RepositoryRef {
            id: self.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Labels keyed by id, in fetch order
    pub fn labels(&self) -> &IndexMap<String, Label> {
        &self.labels
    }

    /// Issues keyed by id, in fetch order
    pub fn issues(&self) -> &IndexMap<String, Issue> {
        &self.issues
    }

    /// Non-fatal errors recorded while fetching
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Lower-cased label name to label id
    pub fn labels_by_lower_name(&self) -> &HashMap<String, String> {
        &self.labels_by_lower_name
    }

    /// Look up a label by name, ignoring case
    pub fn label_by_name(&self, name: &str) -> Option<&Label> {
        self.labels_by_lower_name
            .get(&name.to_lowercase())
            .and_then(|id| self.labels.get(id))
    }

    /// Issues carrying the given label id, in fetch order
    pub fn issues_by_label(&self, label_id: &str) -> Vec<&Issue> {
        self.issues_by_label
            .get(label_id)
            .map(|ids| ids.iter().filter_map(|id| self.issues.get(id)).collect())
            .unwrap_or_default()
    }

    /// Number of issues carrying the given label id
    pub fn issue_count(&self, label_id: &str) -> usize {
        self.issues_by_label.get(label_id).map_or(0, Vec::len)
    }

    /// Record a label that now exists remotely
    pub(crate) fn insert_label(&mut self, label: Label) {
        let id = label.id_str().to_string();
        self.labels_by_lower_name.insert(label.lower_name(), id.clone());
        self.labels.insert(id, label);
    }

    /// Record an edit of an existing label, keeping its id
    pub(crate) fn replace_label(&mut self, label_id: &str, update: &Label) {
        let Some(label) = self.labels.get_mut(label_id) else {
            return;
        };

        let old_key = label.lower_name();
        if self.labels_by_lower_name.get(&old_key).map(String::as_str) == Some(label_id) {
            self.labels_by_lower_name.remove(&old_key);
        }

        label.name = update.name.clone();
        label.description = update.description.clone();
        label.color = update.color.clone();

        self.labels_by_lower_name
            .insert(update.lower_name(), label_id.to_string());
    }

    /// Replace the label set of an issue
    pub(crate) fn set_issue_labels(&mut self, issue_id: &str, labels: IndexSet<String>) {
        let Some(issue) = self.issues.get_mut(issue_id) else {
            return;
        };

        let touched: IndexSet<String> = issue
            .labels
            .symmetric_difference(&labels)
            .cloned()
            .collect();
        issue.labels = labels;

        for label_id in touched {
            self.reindex_label(&label_id);
        }
    }

    /// Forget a label that was deleted remotely
    pub(crate) fn remove_label(&mut self, label_id: &str) {
        if let Some(label) = self.labels.shift_remove(label_id) {
            let key = label.lower_name();
            if self.labels_by_lower_name.get(&key).map(String::as_str) == Some(label_id) {
                self.labels_by_lower_name.remove(&key);
            }
        }

        for issue in self.issues.values_mut() {
            issue.labels.shift_remove(label_id);
        }
        self.issues_by_label.remove(label_id);
    }

    fn reindex_label(&mut self, label_id: &str) {
        let carrying: Vec<String> = self
            .issues
            .values()
            .filter(|issue| issue.labels.contains(label_id))
            .map(|issue| issue.id.clone())
            .collect();

        if carrying.is_empty() {
            self.issues_by_label.remove(label_id);
        } else {
            self.issues_by_label.insert(label_id.to_string(), carrying);
        }
    }
}

fn index_labels(
    repository: &str,
    labels: &IndexMap<String, Label>,
) -> Result<HashMap<String, String>> {
    let mut index = HashMap::with_capacity(labels.len());

    for (id, label) in labels {
        if label.name.is_empty() {
            return Err(Error::MissingLabelName {
                repository: repository.to_string(),
            });
        }
        index.insert(label.lower_name(), id.clone());
    }

    Ok(index)
}

fn index_issues(issues: &IndexMap<String, Issue>) -> HashMap<String, Vec<String>> {
    let mut index: HashMap<String, Vec<String>> = HashMap::new();

    for issue in issues.values() {
        for label_id in &issue.labels {
            index
                .entry(label_id.clone())
                .or_default()
                .push(issue.id.clone());
        }
    }

    index
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(id: &str, name: &str) -> Label {
        Label::new(Some(id.to_string()), name, "", "ffffff")
    }

    fn repository_with_issues() -> Repository {
        let labels = [label("L_1", "Bug"), label("L_2", "feature")]
            .into_iter()
            .map(|l| (l.id_str().to_string(), l))
            .collect();
        let issues = [
            Issue::new("I_1", "first", ["L_1"]),
            Issue::new("I_2", "second", ["L_1", "L_2"]),
            Issue::new("I_3", "third", Vec::<String>::new()),
        ]
        .into_iter()
        .map(|i| (i.id.clone(), i))
        .collect();

        Repository::new("R_1", "h", labels, issues, Vec::new()).unwrap()
    }

    #[test]
    fn test_label_lookup_ignores_case() {
        let repo = repository_with_issues();
        assert_eq!(repo.label_by_name("bug").unwrap().name, "Bug");
        assert_eq!(repo.label_by_name("BUG").unwrap().id_str(), "L_1");
        assert!(repo.label_by_name("missing").is_none());
        assert_eq!(repo.labels_by_lower_name().len(), 2);
    }

    #[test]
    fn test_missing_label_name_fails_construction() {
        let result = Repository::with_labels("R_1", "h", vec![label("L_1", "bug"), label("L_2", "")]);
        assert!(matches!(result, Err(Error::MissingLabelName { .. })));
    }

    #[test]
    fn test_issues_by_label() {
        let repo = repository_with_issues();

        let ids: Vec<&str> = repo
            .issues_by_label("L_1")
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["I_1", "I_2"]);
        assert_eq!(repo.issue_count("L_2"), 1);
        assert_eq!(repo.issue_count("L_9"), 0);
        assert!(repo.issues_by_label("L_9").is_empty());
    }

    #[test]
    fn test_replace_label_updates_name_index() {
        let mut repo = repository_with_issues();
        repo.replace_label("L_1", &Label::new(None, "defect", "d", "000000"));

        assert!(repo.label_by_name("bug").is_none());
        let edited = repo.label_by_name("Defect").unwrap();
        assert_eq!(edited.id_str(), "L_1");
        assert_eq!(edited.color, "000000");
    }

    #[test]
    fn test_set_issue_labels_reindexes() {
        let mut repo = repository_with_issues();
        repo.set_issue_labels("I_1", ["L_2".to_string()].into_iter().collect());

        assert_eq!(repo.issue_count("L_1"), 1);
        let ids: Vec<&str> = repo
            .issues_by_label("L_2")
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(ids, vec!["I_1", "I_2"]);
    }

    #[test]
    fn test_remove_label_drops_everywhere() {
        let mut repo = repository_with_issues();
        repo.remove_label("L_1");

        assert!(repo.label_by_name("bug").is_none());
        assert!(!repo.labels().contains_key("L_1"));
        assert_eq!(repo.issue_count("L_1"), 0);
        assert!(repo.issues().values().all(|i| !i.labels.contains("L_1")));
    }
}
