//! RPC transport used by the feed cache.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::ClientError;
use crate::errors::ErrorDetails;
use crate::models::{
    Comment, CreateCommentInput, GetCommentsInput, ListPostsInput, Page, PostId, PostSummary,
};

/// The procedures the feed client calls.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    /// One page of posts with author names and comment counts.
    async fn list_posts(&self, input: ListPostsInput) -> Result<Page<PostSummary>, ClientError>;

    async fn get_comments(&self, post_id: PostId) -> Result<Vec<Comment>, ClientError>;

    async fn create_comment(&self, input: CreateCommentInput) -> Result<Comment, ClientError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
    error: Option<ErrorDetails>,
}

/// [`FeedTransport`] over HTTP against the `/api/rpc` routes.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn call<I, O>(&self, procedure: &str, input: &I) -> Result<O, ClientError>
    where
        I: Serialize + ?Sized + Sync,
        O: DeserializeOwned,
    {
        let url = format!("{}/api/rpc/{}", self.base_url, procedure);
        let resp = self.client.post(&url).json(input).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        match serde_json::from_str::<Envelope<O>>(&body) {
            Ok(Envelope {
                success: true,
                data: Some(data),
                ..
            }) => Ok(data),
            Ok(Envelope {
                error: Some(details),
                ..
            }) => Err(ClientError::from_code(&details.code, details.message)),
            Ok(_) => Err(ClientError::Transport(format!(
                "{} returned an empty envelope ({})",
                procedure, status
            ))),
            Err(_) => Err(status_error(procedure, status, body)),
        }
    }
}

// Non-envelope bodies come from extractor rejections or proxies in between.
fn status_error(procedure: &str, status: StatusCode, body: String) -> ClientError {
    let message = format!("{} failed with {}: {}", procedure, status, body);
    if status == StatusCode::NOT_FOUND {
        ClientError::NotFound(message)
    } else if status.is_client_error() {
        ClientError::Validation(message)
    } else {
        ClientError::Transport(message)
    }
}

#[async_trait]
impl FeedTransport for HttpTransport {
    async fn list_posts(&self, input: ListPostsInput) -> Result<Page<PostSummary>, ClientError> {
        self.call("listPostsWithCommentCounts", &input).await
    }

    async fn get_comments(&self, post_id: PostId) -> Result<Vec<Comment>, ClientError> {
        self.call("getComments", &GetCommentsInput { post_id }).await
    }

    async fn create_comment(&self, input: CreateCommentInput) -> Result<Comment, ClientError> {
        self.call("createComment", &input).await
    }
}
