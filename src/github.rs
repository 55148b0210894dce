//! GitHub API Client
//!
//! The remote side of reconciliation: fetching repository snapshots and the
//! label/issue mutations actions execute. Talks to the GitHub GraphQL API
//! through octocrab.

use async_trait::async_trait;
use indexmap::IndexMap;
use octocrab::Octocrab;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::repository::{Issue, Label, Repository};

/// Number of nodes requested per connection page
pub const PAGE_SIZE: usize = 100;

/// Default API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://api.github.com";

/// Preview media type required for label mutations
const LABEL_PREVIEW_MEDIA_TYPE: &str = "application/vnd.github.bane-preview+json";

/// Remote operations used by reconciliation
///
/// Each method is a single remote call that either succeeds or fails as a
/// whole. Callers are responsible for ordering them.
#[async_trait]
pub trait LabelApi: Send + Sync {
    /// Login of the authenticated user
    async fn viewer_login(&self) -> Result<String>;

    /// Fetch a fully paginated snapshot of a repository
    async fn fetch_repository(
        &self,
        organization: &str,
        name: &str,
        include_issues: bool,
    ) -> Result<Repository>;

    /// Create a label, returning it with its new id
    async fn create_label(&self, repository_id: &str, label: &Label) -> Result<Label>;

    /// Update name, color and description of the label identified by `extant`
    async fn edit_label(&self, extant: &Label, update: &Label) -> Result<Label>;

    /// Replace the full label set of an issue
    async fn update_issue_labels(&self, issue_id: &str, label_ids: &[String]) -> Result<()>;

    /// Delete a label
    async fn delete_label(&self, label: &Label) -> Result<()>;
}

const VIEWER_QUERY: &str = "query { viewer { login } }";

const REPOSITORY_QUERY: &str = r#"
query Repository($owner: String!, $name: String!, $first: Int!, $labelsAfter: String) {
  repository(owner: $owner, name: $name) {
    id
    name
    labels(first: $first, after: $labelsAfter) {
      nodes { id name color description }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

const REPOSITORY_WITH_ISSUES_QUERY: &str = r#"
query Repository($owner: String!, $name: String!, $first: Int!, $labelsAfter: String, $issuesAfter: String) {
  repository(owner: $owner, name: $name) {
    id
    name
    labels(first: $first, after: $labelsAfter) {
      nodes { id name color description }
      pageInfo { hasNextPage endCursor }
    }
    issues(first: $first, after: $issuesAfter) {
      nodes {
        id
        title
        labels(first: $first) {
          nodes { id }
          pageInfo { hasNextPage }
        }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}
"#;

const CREATE_LABEL_MUTATION: &str = r#"
mutation CreateLabel($input: CreateLabelInput!) {
  createLabel(input: $input) {
    label { id name color description }
  }
}
"#;

const UPDATE_LABEL_MUTATION: &str = r#"
mutation UpdateLabel($input: UpdateLabelInput!) {
  updateLabel(input: $input) {
    label { id name color description }
  }
}
"#;

const UPDATE_ISSUE_MUTATION: &str = r#"
mutation UpdateIssue($input: UpdateIssueInput!) {
  updateIssue(input: $input) {
    issue { id }
  }
}
"#;

const DELETE_LABEL_MUTATION: &str = r#"
mutation DeleteLabel($input: DeleteLabelInput!) {
  deleteLabel(input: $input) {
    clientMutationId
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    #[serde(default)]
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    nodes: Vec<T>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct LabelNode {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

impl From<LabelNode> for Label {
    fn from(node: LabelNode) -> Self {
        Label::new(
            Some(node.id),
            node.name.unwrap_or_default(),
            node.description.unwrap_or_default(),
            node.color.unwrap_or_default(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct LabelIdNode {
    id: String,
}

#[derive(Debug, Deserialize)]
struct IssueNode {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    labels: Option<Connection<LabelIdNode>>,
}

#[derive(Debug, Deserialize)]
struct RepositoryNode {
    id: String,
    name: String,
    labels: Connection<LabelNode>,
    #[serde(default)]
    issues: Option<Connection<IssueNode>>,
}

#[derive(Debug, Deserialize)]
struct RepositoryData {
    repository: Option<RepositoryNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateLabelData {
    create_label: LabelPayload,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateLabelData {
    update_label: LabelPayload,
}

#[derive(Debug, Deserialize)]
struct LabelPayload {
    label: LabelNode,
}

/// Accumulates repository pages until every connection is exhausted
#[derive(Debug, Default)]
struct SnapshotBuilder {
    id: String,
    name: String,
    labels: IndexMap<String, Label>,
    issues: IndexMap<String, Issue>,
    errors: Vec<String>,
    labels_after: Option<String>,
    issues_after: Option<String>,
    labels_done: bool,
    issues_done: bool,
}

impl SnapshotBuilder {
    fn new(include_issues: bool) -> Self {
        Self {
            issues_done: !include_issues,
            ..Self::default()
        }
    }

    fn is_complete(&self) -> bool {
        self.labels_done && self.issues_done
    }

    /// Merge one page; connections that already finished are ignored
    fn push_page(&mut self, page: RepositoryNode) {
        self.id = page.id;
        self.name = page.name;

        if !self.labels_done {
            for node in page.labels.nodes {
                let label = Label::from(node);
                self.labels.insert(label.id_str().to_string(), label);
            }
            self.labels_done = !page.labels.page_info.has_next_page;
            self.labels_after = page.labels.page_info.end_cursor;
        }

        if !self.issues_done {
            match page.issues {
                Some(issues) => {
                    for node in issues.nodes {
                        self.push_issue(node);
                    }
                    self.issues_done = !issues.page_info.has_next_page;
                    self.issues_after = issues.page_info.end_cursor;
                }
                None => self.issues_done = true,
            }
        }
    }

    fn push_issue(&mut self, node: IssueNode) {
        let title = node.title.unwrap_or_default();
        let mut label_ids = Vec::new();

        if let Some(labels) = node.labels {
            if labels.page_info.has_next_page {
                self.errors.push(format!(
                    "issue {} has more than {} labels: {}",
                    node.id, PAGE_SIZE, title
                ));
            }
            label_ids = labels.nodes.into_iter().map(|l| l.id).collect();
        }

        let issue = Issue::new(node.id, title, label_ids);
        self.issues.insert(issue.id.clone(), issue);
    }

    fn build(self) -> Result<Repository> {
        for error in &self.errors {
            warn!(repository = %self.name, "{}", error);
        }
        Repository::new(self.id, self.name, self.labels, self.issues, self.errors)
    }
}

/// Unwrap a GraphQL response body into its `data`
fn parse_response<T: DeserializeOwned>(body: Value) -> Result<T> {
    let response: GraphQlResponse<T> = serde_json::from_value(body)?;

    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(Error::GraphQl(messages.join("; ")));
    }

    response
        .data
        .ok_or_else(|| Error::GraphQl("response carried no data".to_string()))
}

/// GitHub API Client
///
/// GraphQL client responsible for interactions with the GitHub API
pub struct GitHubClient {
    octocrab: Octocrab,
}

impl GitHubClient {
    /// Create a new GitHub client
    ///
    /// # Arguments
    /// - `access_token`: GitHub access token
    /// - `endpoint`: API base URL (e.g. `https://api.github.com`)
    ///
    /// # Errors
    /// Returns an error if client initialization fails
    pub fn new(access_token: &str, endpoint: &str) -> Result<Self> {
        let octocrab = Octocrab::builder()
            .personal_token(access_token.to_string())
            .base_uri(endpoint)
            .map_err(Error::GitHubApi)?
            .add_header(ACCEPT, LABEL_PREVIEW_MEDIA_TYPE.to_string())
            .build()
            .map_err(Error::GitHubApi)?;

        Ok(Self { octocrab })
    }

    async fn execute<T: DeserializeOwned>(&self, query: &str, variables: Value) -> Result<T> {
        let body: Value = self
            .octocrab
            .graphql(&json!({ "query": query, "variables": variables }))
            .await
            .map_err(Error::GitHubApi)?;

        parse_response(body)
    }
}

#[async_trait]
impl LabelApi for GitHubClient {
    async fn viewer_login(&self) -> Result<String> {
        let data: Value = self.execute(VIEWER_QUERY, json!({})).await?;
        data.pointer("/viewer/login")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::GraphQl("viewer login missing from response".to_string()))
    }

    async fn fetch_repository(
        &self,
        organization: &str,
        name: &str,
        include_issues: bool,
    ) -> Result<Repository> {
        let query = if include_issues {
            REPOSITORY_WITH_ISSUES_QUERY
        } else {
            REPOSITORY_QUERY
        };
        let mut builder = SnapshotBuilder::new(include_issues);

        while !builder.is_complete() {
            let mut variables = json!({
                "owner": organization,
                "name": name,
                "first": PAGE_SIZE,
                "labelsAfter": builder.labels_after,
            });
            if include_issues {
                variables["issuesAfter"] = json!(builder.issues_after);
            }

            let data: RepositoryData = self.execute(query, variables).await?;
            let page = data
                .repository
                .ok_or_else(|| Error::RepositoryNotFound(format!("{organization}/{name}")))?;

            debug!(
                repository = %name,
                labels = page.labels.nodes.len(),
                "fetched repository page"
            );
            builder.push_page(page);
        }

        builder.build()
    }

    async fn create_label(&self, repository_id: &str, label: &Label) -> Result<Label> {
        let data: CreateLabelData = self
            .execute(
                CREATE_LABEL_MUTATION,
                json!({
                    "input": {
                        "repositoryId": repository_id,
                        "name": label.name,
                        "color": label.color,
                        "description": label.description,
                    }
                }),
            )
            .await?;

        Ok(data.create_label.label.into())
    }

    async fn edit_label(&self, extant: &Label, update: &Label) -> Result<Label> {
        let data: UpdateLabelData = self
            .execute(
                UPDATE_LABEL_MUTATION,
                json!({
                    "input": {
                        "id": extant.id_str(),
                        "name": update.name,
                        "color": update.color,
                        "description": update.description,
                    }
                }),
            )
            .await?;

        Ok(data.update_label.label.into())
    }

    async fn update_issue_labels(&self, issue_id: &str, label_ids: &[String]) -> Result<()> {
        let _: Value = self
            .execute(
                UPDATE_ISSUE_MUTATION,
                json!({ "input": { "id": issue_id, "labelIds": label_ids } }),
            )
            .await?;
        Ok(())
    }

    async fn delete_label(&self, label: &Label) -> Result<()> {
        let _: Value = self
            .execute(
                DELETE_LABEL_MUTATION,
                json!({ "input": { "id": label.id_str() } }),
            )
            .await?;
        Ok(())
    }
}
