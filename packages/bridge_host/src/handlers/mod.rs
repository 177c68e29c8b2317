//! Category → action handler table (spec §4.8). Each function takes the
//! decoded JSON `payload` of a `command` envelope and returns the JSON
//! `data` of its `response`, or a [`HandlerError`] that the dispatcher turns
//! into an `error` envelope.

pub mod ai;
pub mod diagnostics;
pub mod editor;
pub mod file;
pub mod git;
pub mod terminal;
pub mod workspace;

use serde_json::Value;

use crate::error::{ErrorCode, HandlerError};
use crate::state::AppState;
use bridge_relay::protocol::Category;

pub async fn dispatch(
    state: &AppState,
    socket_id: &str,
    category: Category,
    action: &str,
    payload: Value,
) -> Result<Value, HandlerError> {
    match category {
        Category::File => file::handle(state, action, payload).await,
        Category::Editor => editor::handle(state, action, payload).await,
        Category::Workspace => workspace::handle(state, action, payload).await,
        Category::Terminal => terminal::handle(state, socket_id, action, payload).await,
        Category::Git => git::handle(state, action, payload).await,
        Category::Ai => ai::handle(state, socket_id, action, payload).await,
        Category::Diagnostics => diagnostics::handle(state, action, payload).await,
        Category::System => Err(HandlerError::new(ErrorCode::UnknownCommand, format!("system:{action}"))),
    }
}

/// Shared helper: pull a required string field out of a JSON payload.
pub(crate) fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, HandlerError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| HandlerError::invalid_request(format!("missing field: {field}")))
}

pub(crate) fn optional_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

pub(crate) fn required_u64(payload: &Value, field: &str) -> Result<u64, HandlerError> {
    payload
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| HandlerError::invalid_request(format!("missing field: {field}")))
}
