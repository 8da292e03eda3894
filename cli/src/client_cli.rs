use joblib::archive::{self, ArchiveError};
use protocol::{ExecResponse, InlineRecipe, JobListing, Recipe, DATA_PART, RECIPE_PART};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode};
use std::path::Path;
use std::{fs, io};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("server sent invalid base64: {0}")]
    Base64(#[from] protocol::DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

pub struct ClientCli {
    inner: Client,
    server: String,
}

impl ClientCli {
    pub fn new(server: &str) -> Self {
        Self {
            inner: Client::new(),
            server: server.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.server, route)
    }

    /// Run `command` in `image` with `input` staged as its workspace.
    ///
    /// Without an input directory the job starts from an empty workspace.
    pub async fn exec(
        &self,
        image: &str,
        command: &[String],
        input: Option<&Path>,
        inline: bool,
    ) -> Result<ExecResponse> {
        let data = match input {
            Some(dir) => archive::pack(dir)?,
            None => archive::empty()?,
        };

        let request = self.inner.post(self.url(protocol::EXEC_ROUTE));
        let request = if inline {
            request.json(&InlineRecipe {
                command: command.to_vec(),
                image: image.to_string(),
                data: protocol::encode_artifact(&data),
            })
        } else {
            let recipe = Recipe {
                command: command.to_vec(),
                image: image.to_string(),
            };
            let form = Form::new()
                .text(RECIPE_PART, serde_json::to_string(&recipe)?)
                .part(
                    DATA_PART,
                    Part::bytes(data)
                        .file_name("input.tar")
                        .mime_str("application/x-tar")?,
                );
            request.multipart(form)
        };

        let response = checked(request.send().await?)?;
        Ok(response.json().await?)
    }

    pub async fn list_jobs(&self) -> Result<Vec<JobListing>> {
        let response = checked(self.inner.get(self.url(protocol::JOBS_ROUTE)).send().await?)?;
        Ok(response.json().await?)
    }

    /// Fetch one of the plain text status routes.
    pub async fn get_text(&self, route: &str) -> Result<String> {
        let response = checked(self.inner.get(self.url(route)).send().await?)?;
        Ok(response.text().await?)
    }
}

fn checked(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status(status))
    }
}

/// Extract the returned workspace archive into `dest`, creating it if needed.
pub fn unpack_result(response: &ExecResponse, dest: &Path) -> Result<()> {
    let bytes = protocol::decode_artifact(&response.data)?;
    fs::create_dir_all(dest)?;
    archive::unpack(&bytes, dest)?;
    Ok(())
}
