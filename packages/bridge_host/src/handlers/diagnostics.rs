use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::handlers::required_str;
use crate::state::AppState;

pub async fn handle(state: &AppState, action: &str, payload: Value) -> Result<Value, HandlerError> {
    let aggregator = &state.diagnostics;
    match action {
        "getAll" => {
            let snapshot = aggregator.get_all().await;
            Ok(serde_json::to_value(&snapshot.by_file).expect("serializable"))
        }
        "getFile" => {
            let path = required_str(&payload, "path")?;
            Ok(serde_json::to_value(aggregator.get_file(path).await).expect("serializable"))
        }
        "getSummary" => Ok(serde_json::to_value(aggregator.get_summary().await).expect("serializable")),
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("diagnostics:{other}"))),
    }
}
