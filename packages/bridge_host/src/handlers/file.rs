use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::files;
use crate::handlers::required_str;
use crate::state::AppState;

pub async fn handle(state: &AppState, action: &str, payload: Value) -> Result<Value, HandlerError> {
    let root = state.workspace_root();
    let max_bytes = state.max_file_size_bytes;
    match action {
        "list" => {
            let path = required_str(&payload, "path")?;
            Ok(serde_json::to_value(files::list(root, path)?).expect("serializable"))
        }
        "read" => {
            let path = required_str(&payload, "path")?;
            Ok(serde_json::to_value(files::read(root, path, max_bytes)?).expect("serializable"))
        }
        "write" => {
            let path = required_str(&payload, "path")?.to_string();
            let content = required_str(&payload, "content")?.to_string();
            let create_backup = payload.get("createBackup").and_then(Value::as_bool).unwrap_or(false);
            files::write(root, &path, &content, create_backup)?;
            Ok(Value::Null)
        }
        "open" => {
            let path = required_str(&payload, "path")?;
            let content = files::read(root, path, max_bytes)?;
            state.editor_open(path, content.content).await;
            Ok(Value::Null)
        }
        "search" => {
            let pattern = required_str(&payload, "pattern")?;
            let max_results = payload.get("maxResults").and_then(Value::as_u64).unwrap_or(100) as usize;
            Ok(serde_json::to_value(files::search(root, pattern, max_results)?).expect("serializable"))
        }
        "stat" => {
            let path = required_str(&payload, "path")?;
            Ok(serde_json::to_value(files::stat(root, path)?).expect("serializable"))
        }
        "save" => {
            let state_snapshot = state.editor.get_state().await;
            let path = state_snapshot
                .file_path
                .ok_or_else(|| HandlerError::invalid_request("no file is currently open"))?;
            let content = state.editor.get_visible_text().await;
            files::write(root, &path, &content, false)?;
            Ok(Value::Null)
        }
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("file:{other}"))),
    }
}
