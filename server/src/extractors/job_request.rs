//! Decoding of execution requests.
//!
//! Two framings are accepted: `multipart/form-data` carrying a JSON recipe
//! part and a raw tar part, or a single `application/json` document with the
//! archive in base64. Both end in the same validated [`JobRequest`].

use axum::{
    async_trait,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::JsonRejection,
        FromRequest, Multipart, Request,
    },
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use joblib::errors::JobError;
use joblib::types::Artifact;
use joblib::JobSpec;
use protocol::{InlineRecipe, Recipe, DATA_PART, RECIPE_PART};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("unsupported content type {0:?}")]
    UnsupportedContentType(Option<String>),
    #[error("malformed json body: {0}")]
    Json(#[from] JsonRejection),
    #[error("malformed multipart body: {0}")]
    MultipartRejected(#[from] MultipartRejection),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("recipe is not valid json: {0}")]
    Recipe(#[from] serde_json::Error),
    #[error("data is not valid base64: {0}")]
    Base64(#[from] protocol::DecodeError),
    #[error("missing multipart part {0:?}")]
    MissingPart(&'static str),
    #[error(transparent)]
    Invalid(#[from] JobError),
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        debug!(error = %self, "rejected execution request");
        StatusCode::BAD_REQUEST.into_response()
    }
}

/// A validated execution request. Nothing has been allocated for it yet.
#[derive(Debug)]
pub struct JobRequest {
    pub spec: JobSpec,
    pub input: Artifact,
}

impl JobRequest {
    fn new(image: String, command: Vec<String>, input: Bytes) -> Result<Self, RequestError> {
        let spec = JobSpec::new(image, command)?;
        if input.is_empty() {
            return Err(JobError::Validation("input archive must not be empty".into()).into());
        }
        Ok(Self { spec, input })
    }

    async fn from_json<S: Send + Sync>(req: Request, state: &S) -> Result<Self, RequestError> {
        let Json(recipe) = Json::<InlineRecipe>::from_request(req, state).await?;
        let input = protocol::decode_artifact(&recipe.data)?;
        Self::new(recipe.image, recipe.command, Bytes::from(input))
    }

    async fn from_multipart<S: Send + Sync>(req: Request, state: &S) -> Result<Self, RequestError> {
        let mut multipart = Multipart::from_request(req, state).await?;
        let mut recipe = None;
        let mut data = None;
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(RECIPE_PART) => {
                    let bytes = field.bytes().await?;
                    recipe = Some(serde_json::from_slice::<Recipe>(&bytes)?);
                }
                Some(DATA_PART) => data = Some(field.bytes().await?),
                other => debug!(part = ?other, "ignoring multipart part"),
            }
        }
        let recipe = recipe.ok_or(RequestError::MissingPart(RECIPE_PART))?;
        let data = data.ok_or(RequestError::MissingPart(DATA_PART))?;
        Self::new(recipe.image, recipe.command, data)
    }
}

#[async_trait]
impl<S> FromRequest<S> for JobRequest
where
    S: Send + Sync,
{
    type Rejection = RequestError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let mime = content_type
            .as_deref()
            .and_then(|value| value.split(';').next())
            .map(|value| value.trim().to_ascii_lowercase());

        match mime.as_deref() {
            Some("application/json") => Self::from_json(req, state).await,
            Some("multipart/form-data") => Self::from_multipart(req, state).await,
            _ => Err(RequestError::UnsupportedContentType(content_type)),
        }
    }
}
