use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::git;
use crate::handlers::{optional_str, required_str};
use crate::state::AppState;

pub async fn handle(state: &AppState, action: &str, payload: Value) -> Result<Value, HandlerError> {
    let root = state.workspace_root().to_string_lossy().into_owned();
    match action {
        "status" => Ok(serde_json::to_value(git::status(&root).await?).expect("serializable")),
        "diff" => {
            let file_path = optional_str(&payload, "filePath");
            let staged = payload.get("staged").and_then(Value::as_bool).unwrap_or(false);
            Ok(serde_json::to_value(git::diff(&root, file_path, staged).await?).expect("serializable"))
        }
        "show" => {
            let file_path = required_str(&payload, "filePath")?;
            let reference = optional_str(&payload, "ref");
            Ok(serde_json::to_value(git::show(&root, file_path, reference).await?).expect("serializable"))
        }
        "stage" => {
            let file_path = required_str(&payload, "filePath")?;
            git::stage(&root, file_path).await?;
            Ok(Value::Null)
        }
        "unstage" => {
            let file_path = required_str(&payload, "filePath")?;
            git::unstage(&root, file_path).await?;
            Ok(Value::Null)
        }
        "discard" => {
            let file_path = required_str(&payload, "filePath")?;
            git::discard(&root, file_path).await?;
            Ok(Value::Null)
        }
        "branch" => Ok(serde_json::to_value(git::branch(&root).await?).expect("serializable")),
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("git:{other}"))),
    }
}
