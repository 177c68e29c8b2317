use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::handlers::required_u64;
use crate::state::AppState;

pub async fn handle(state: &AppState, action: &str, payload: Value) -> Result<Value, HandlerError> {
    let engine = &state.editor;
    match action {
        "getState" => Ok(serde_json::to_value(engine.get_state().await).expect("serializable")),
        "goTo" => {
            let line = required_u64(&payload, "line")? as u32;
            let col = required_u64(&payload, "col")? as u32;
            engine.go_to(line, col).await?;
            Ok(Value::Null)
        }
        "setSelection" => {
            let sl = required_u64(&payload, "sl")? as u32;
            let sc = required_u64(&payload, "sc")? as u32;
            let el = required_u64(&payload, "el")? as u32;
            let ec = required_u64(&payload, "ec")? as u32;
            engine.set_selection(sl, sc, el, ec).await?;
            Ok(Value::Null)
        }
        "getSelection" => Ok(serde_json::to_value(engine.get_selection().await).expect("serializable")),
        "insertText" => {
            let text = payload.get("text").and_then(Value::as_str).unwrap_or("");
            engine.insert_text(text).await?;
            Ok(Value::Null)
        }
        "replaceSelection" => {
            let text = payload.get("text").and_then(Value::as_str).unwrap_or("");
            engine.replace_selection(text).await?;
            Ok(Value::Null)
        }
        "getLine" => {
            let line = required_u64(&payload, "line")? as u32;
            Ok(Value::String(engine.get_line(line).await?))
        }
        "getVisibleText" => Ok(Value::String(engine.get_visible_text().await)),
        other => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("editor:{other}"))),
    }
}
