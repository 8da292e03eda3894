//! Wire types shared by the execution server and its command line client.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

pub use base64::DecodeError;

pub const EXEC_ROUTE: &str = "/container";
pub const HEALTH_ROUTE: &str = "/healthy";
pub const CPU_ROUTE: &str = "/cpu";
pub const MEMORY_ROUTE: &str = "/memory";
pub const LOAD_ROUTE: &str = "/load";
pub const JOBS_ROUTE: &str = "/jobs";

/// Multipart part holding the JSON [`Recipe`].
pub const RECIPE_PART: &str = "recipe";
/// Multipart part holding the raw input tar archive.
pub const DATA_PART: &str = "data";

/// What to run, sent next to the raw archive in a multipart request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Recipe {
    pub command: Vec<String>,
    pub image: String,
}

/// Single-document request: the recipe plus the input archive in base64.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InlineRecipe {
    pub command: Vec<String>,
    pub image: String,
    pub data: String,
}

/// Body of a successful execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResponse {
    /// Everything the container wrote to stdout.
    pub stdout: String,
    /// Base64 tar archive of the workspace after the run.
    pub data: String,
}

/// One in-flight job, as listed by the jobs route.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobListing {
    pub job_id: String,
    pub state: String,
}

pub fn encode_artifact(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

pub fn decode_artifact(text: &str) -> Result<Vec<u8>, DecodeError> {
    STANDARD.decode(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default_to_empty() {
        let recipe: Recipe = serde_json::from_str(r#"{"image":"alpine"}"#).unwrap();
        assert_eq!(recipe.image, "alpine");
        assert!(recipe.command.is_empty());

        let inline: InlineRecipe = serde_json::from_str("{}").unwrap();
        assert_eq!(inline, InlineRecipe::default());
    }

    #[test]
    fn inline_recipe_uses_plain_field_names() {
        let inline: InlineRecipe = serde_json::from_str(
            r#"{"command":["echo","hi"],"image":"alpine","data":"aGk="}"#,
        )
        .unwrap();
        assert_eq!(inline.command, ["echo", "hi"]);
        assert_eq!(decode_artifact(&inline.data).unwrap(), b"hi");
    }

    #[test]
    fn response_serializes_stdout_and_data() {
        let response = ExecResponse {
            stdout: "hi\n".into(),
            data: encode_artifact(&[0, 1, 2]),
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["stdout"], "hi\n");
        assert_eq!(value["data"], "AAEC");
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(decode_artifact("not base64!").is_err());
    }
}
