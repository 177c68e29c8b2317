use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::state::AppState;

#[derive(Serialize)]
struct WorkspaceInfo {
    id: String,
    name: String,
    root: String,
}

pub async fn handle(state: &AppState, action: &str, _payload: Value) -> Result<Value, HandlerError> {
    match action {
        "getInfo" => Ok(serde_json::to_value(WorkspaceInfo {
            id: state.workspace.id.clone(),
            name: state.workspace.name.clone(),
            root: state.workspace.root.to_string_lossy().to_string(),
        })
        .expect("serializable")),
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("workspace:{other}"))),
    }
}
