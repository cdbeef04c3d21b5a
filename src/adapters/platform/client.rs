//! REST client for the destination platform

use super::models::{AccessTokenResponse, LookupRequest, NodeIdResponse, UploadFile};
use super::DestinationPlatform;
use crate::adapters::http::{build_client, check_status, read_json, send_error, RetryPolicy};
use crate::config::{secret_string, PlatformConfig, SecretString};
use crate::domain::{
    HierarchyLevel, HierarchyNode, ImportError, LookupPath, MasterCode, NodeId, Project, Result,
    SubjectRecord, UpstreamServiceError,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use serde_json::{Map, Value};

/// Destination platform reached over HTTP with API-key authentication
pub struct HttpPlatformClient {
    client: Client,
    api_url: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl HttpPlatformClient {
    /// Creates a client from the `[platform]` section
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be built
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config.timeout_seconds)?,
            api_url: format!("{}/api", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.header(
            "Authorization",
            format!("scitran-user {}", self.api_key.expose_secret().as_ref()),
        )
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        make: impl Fn() -> RequestBuilder,
        context: &str,
    ) -> Result<T> {
        self.retry
            .run(|| async {
                let resp = self
                    .authorized(make())
                    .send()
                    .await
                    .map_err(|e| send_error(e, context))?;
                let resp = check_status(resp, context).await?;
                read_json::<T>(resp, context).await
            })
            .await
    }
}

#[async_trait]
impl DestinationPlatform for HttpPlatformClient {
    async fn get_project(&self, project_id: &str) -> Result<Project> {
        let url = format!("{}/projects/{}", self.api_url, project_id);
        self.send_json(|| self.client.get(&url), &format!("project {project_id}"))
            .await
    }

    async fn find_subjects_by_master_code(
        &self,
        project: &NodeId,
        code: &MasterCode,
    ) -> Result<Vec<SubjectRecord>> {
        let url = format!("{}/projects/{}/subjects", self.api_url, project);
        let filter = format!("master_code={code}");

        let documents: Vec<Map<String, Value>> = self
            .send_json(
                || self.client.get(&url).query(&[("filter", filter.as_str())]),
                "subject query by master code",
            )
            .await?;

        documents
            .into_iter()
            .map(|doc| {
                SubjectRecord::from_document(doc)
                    .map_err(|e| ImportError::from(UpstreamServiceError::InvalidResponse(e)))
            })
            .collect()
    }

    async fn lookup(&self, path: &LookupPath) -> Result<Option<NodeId>> {
        let url = format!("{}/lookup", self.api_url);
        let context = format!("lookup {path}");
        let body = LookupRequest {
            path: path.segments(),
        };

        let result: Result<NodeIdResponse> = self
            .send_json(|| self.client.post(&url).json(&body), &context)
            .await;

        match result {
            Ok(found) => Ok(Some(found.id)),
            Err(ImportError::Upstream(UpstreamServiceError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_node(&self, level: HierarchyLevel, payload: &Value) -> Result<NodeId> {
        let url = format!("{}/{}", self.api_url, level.collection());
        let created: NodeIdResponse = self
            .send_json(
                || self.client.post(&url).json(payload),
                &format!("create {level}"),
            )
            .await?;
        tracing::debug!(level = %level, id = %created.id, "Node created");
        Ok(created.id)
    }

    async fn update_node(&self, level: HierarchyLevel, id: &NodeId, payload: &Value) -> Result<()> {
        let url = format!("{}/{}/{}", self.api_url, level.collection(), id);
        let context = format!("update {level} {id}");
        self.retry
            .run(|| async {
                let resp = self
                    .authorized(self.client.put(&url).json(payload))
                    .send()
                    .await
                    .map_err(|e| send_error(e, &context))?;
                check_status(resp, &context).await?;
                Ok(())
            })
            .await
    }

    async fn upload_file(
        &self,
        node: &HierarchyNode,
        file: UploadFile,
        metadata: &Value,
    ) -> Result<()> {
        let url = format!(
            "{}/{}/{}/files",
            self.api_url,
            node.level.collection(),
            node.id
        );
        let context = format!("upload {} to {node}", file.name);
        let metadata = metadata.to_string();

        self.retry
            .run(|| async {
                let form = Form::new()
                    .part(
                        "file",
                        Part::bytes(file.content.clone()).file_name(file.name.clone()),
                    )
                    .text("metadata", metadata.clone());
                let resp = self
                    .authorized(self.client.post(&url).multipart(form))
                    .send()
                    .await
                    .map_err(|e| send_error(e, &context))?;
                check_status(resp, &context).await?;
                Ok(())
            })
            .await?;

        tracing::info!(node = %node, file = %file.name, "File uploaded");
        Ok(())
    }

    async fn fetch_access_token(&self, token_id: &str) -> Result<SecretString> {
        let url = format!("{}/users/self/tokens/{}", self.api_url, token_id);
        let token: AccessTokenResponse = self
            .send_json(|| self.client.get(&url), "access token exchange")
            .await?;
        if token.access_token.is_empty() {
            return Err(UpstreamServiceError::InvalidResponse(
                "token endpoint returned an empty access token".to_string(),
            )
            .into());
        }
        Ok(secret_string(token.access_token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{OnConflict, RetryConfig};
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: &str) -> PlatformConfig {
        PlatformConfig {
            base_url: base_url.to_string(),
            api_key: secret_string("key-1".to_string()),
            project_id: "p1".to_string(),
            timeout_seconds: 5,
            retry: RetryConfig::default(),
            on_conflict: OnConflict::Fail,
            conflict_relookups: 1,
        }
    }

    fn project() -> Project {
        Project {
            id: NodeId::new("p1").unwrap(),
            group: "g".to_string(),
            label: None,
        }
    }

    #[tokio::test]
    async fn test_get_project() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/projects/p1")
            .match_header("authorization", "scitran-user key-1")
            .with_status(200)
            .with_body(r#"{"_id": "p1", "group": "radiology", "label": "Trial"}"#)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let project = client.get_project("p1").await.unwrap();

        mock.assert_async().await;
        assert_eq!(project.group, "radiology");
    }

    #[tokio::test]
    async fn test_find_subjects_by_master_code() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/projects/p1/subjects")
            .match_query(Matcher::UrlEncoded(
                "filter".into(),
                "master_code=M1".into(),
            ))
            .with_status(200)
            .with_body(r#"[{"_id": "s1", "code": "ex1", "master_code": "M1"}]"#)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let subjects = client
            .find_subjects_by_master_code(&NodeId::new("p1").unwrap(), &MasterCode::new("M1").unwrap())
            .await
            .unwrap();

        assert_eq!(subjects.len(), 1);
        assert_eq!(subjects[0].id.as_str(), "s1");
        assert!(subjects[0].has_value("code"));
    }

    #[tokio::test]
    async fn test_lookup_not_found_is_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/lookup")
            .match_body(Matcher::Json(json!({"path": ["g", "<id:p1>", "<id:s1>", "S"]})))
            .with_status(404)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let path = LookupPath::session(&project(), &NodeId::new("s1").unwrap(), "S");
        assert_eq!(client.lookup(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/lookup")
            .with_status(200)
            .with_body(r#"{"_id": "sess-1", "node_type": "session"}"#)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let path = LookupPath::session(&project(), &NodeId::new("s1").unwrap(), "S");
        assert_eq!(
            client.lookup(&path).await.unwrap(),
            Some(NodeId::new("sess-1").unwrap())
        );
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/sessions")
            .with_status(409)
            .with_body("session exists")
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let err = client
            .create_node(HierarchyLevel::Session, &json!({"label": "S"}))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_upload_file_multipart() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/acquisitions/a1/files")
            .match_header(
                "content-type",
                Matcher::Regex("multipart/form-data".to_string()),
            )
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="file"; filename="msg.hl7.txt""#.to_string()),
                Matcher::Regex(r#"\{"type":"text"\}"#.to_string()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let node = HierarchyNode::new(NodeId::new("a1").unwrap(), HierarchyLevel::Acquisition);
        client
            .upload_file(
                &node,
                UploadFile::new("msg.hl7.txt", b"MSH|".to_vec()),
                &json!({"type": "text"}),
            )
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_access_token() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/users/self/tokens/tid")
            .with_status(200)
            .with_body(r#"{"access_token": "ya29.token"}"#)
            .create_async()
            .await;

        let client = HttpPlatformClient::new(&config(&server.url())).unwrap();
        let token = client.fetch_access_token("tid").await.unwrap();
        assert_eq!(token.expose_secret().as_ref(), "ya29.token");
    }
}
