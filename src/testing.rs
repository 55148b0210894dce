//! Recording fake of the remote API for tests

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::github::LabelApi;
use crate::repository::{Label, Repository};

/// A remote call as seen by the fake
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchRepository { name: String, include_issues: bool },
    CreateLabel { repository_id: String, name: String },
    EditLabel { id: String, name: String },
    UpdateIssue { id: String, labels: Vec<String> },
    DeleteLabel { id: String },
}

type FailWhen = Box<dyn Fn(&Call) -> bool + Send + Sync>;

/// Records every call; fails the ones matching a predicate
pub struct RecordingApi {
    calls: Mutex<Vec<Call>>,
    repositories: HashMap<String, Repository>,
    unnamed_label_repositories: HashSet<String>,
    fail_when: FailWhen,
    next_id: Mutex<usize>,
}

impl RecordingApi {
    pub fn new() -> Self {
        Self::failing_on(|_| false)
    }

    pub fn failing_on(fail_when: impl Fn(&Call) -> bool + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            repositories: HashMap::new(),
            unnamed_label_repositories: HashSet::new(),
            fail_when: Box::new(fail_when),
            next_id: Mutex::new(0),
        }
    }

    /// Serve `repository` from `fetch_repository`
    pub fn with_repository(mut self, repository: Repository) -> Self {
        self.repositories
            .insert(repository.name().to_string(), repository);
        self
    }

    /// Fetching `name` fails as if one of its labels had no name
    pub fn with_unnamed_label_repository(mut self, name: &str) -> Self {
        self.unnamed_label_repositories.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than fetches
    pub fn mutations(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, Call::FetchRepository { .. }))
            .collect()
    }

    fn record(&self, call: Call) -> Result<()> {
        let fail = (self.fail_when)(&call);
        self.calls.lock().unwrap().push(call.clone());
        if fail {
            return Err(Error::GraphQl(format!("injected failure: {call:?}")));
        }
        Ok(())
    }
}

#[async_trait]
impl LabelApi for RecordingApi {
    async fn viewer_login(&self) -> Result<String> {
        Ok("tester".to_string())
    }

    async fn fetch_repository(
        &self,
        organization: &str,
        name: &str,
        include_issues: bool,
    ) -> Result<Repository> {
        self.record(Call::FetchRepository {
            name: name.to_string(),
            include_issues,
        })?;
        if self.unnamed_label_repositories.contains(name) {
            return Err(Error::MissingLabelName {
                repository: format!("{organization}/{name}"),
            });
        }
        self.repositories
            .get(name)
            .cloned()
            .ok_or_else(|| Error::RepositoryNotFound(format!("{organization}/{name}")))
    }

    async fn create_label(&self, repository_id: &str, label: &Label) -> Result<Label> {
        self.record(Call::CreateLabel {
            repository_id: repository_id.to_string(),
            name: label.name.clone(),
        })?;
        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        let mut created = label.clone();
        created.id = Some(format!("L_new_{}", *next_id));
        Ok(created)
    }

    async fn edit_label(&self, extant: &Label, update: &Label) -> Result<Label> {
        self.record(Call::EditLabel {
            id: extant.id_str().to_string(),
            name: update.name.clone(),
        })?;
        let mut edited = update.clone();
        edited.id = extant.id.clone();
        Ok(edited)
    }

    async fn update_issue_labels(&self, issue_id: &str, label_ids: &[String]) -> Result<()> {
        self.record(Call::UpdateIssue {
            id: issue_id.to_string(),
            labels: label_ids.to_vec(),
        })
    }

    async fn delete_label(&self, label: &Label) -> Result<()> {
        self.record(Call::DeleteLabel {
            id: label.id_str().to_string(),
        })
    }
}
