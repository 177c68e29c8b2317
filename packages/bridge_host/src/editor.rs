//! `editor` category handlers (spec §4.8). The editor-state operations
//! (`getState`, cursor/selection, text edits) address the editor-host's own
//! document model; no such integration exists in this reference corpus, so
//! this module keeps a minimal in-memory document standing in for it,
//! mutated the same way the file and diagnostics engines are: one
//! `RwLock`-guarded struct behind an async API (see DESIGN.md).

use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::HandlerError;

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Selection {
    #[serde(rename = "startLine")]
    pub start_line: u32,
    #[serde(rename = "startColumn")]
    pub start_column: u32,
    #[serde(rename = "endLine")]
    pub end_line: u32,
    #[serde(rename = "endColumn")]
    pub end_column: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditorState {
    #[serde(rename = "filePath")]
    pub file_path: Option<String>,
    pub cursor: Position,
    pub selection: Selection,
    #[serde(rename = "lineCount")]
    pub line_count: usize,
}

struct Document {
    file_path: Option<String>,
    lines: Vec<String>,
    cursor: Position,
    selection: Selection,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            file_path: None,
            lines: vec![String::new()],
            cursor: Position::default(),
            selection: Selection::default(),
        }
    }
}

pub struct EditorEngine {
    doc: RwLock<Document>,
}

impl Default for EditorEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorEngine {
    pub fn new() -> Self {
        Self {
            doc: RwLock::new(Document::default()),
        }
    }

    pub async fn get_state(&self) -> EditorState {
        let doc = self.doc.read().await;
        EditorState {
            file_path: doc.file_path.clone(),
            cursor: doc.cursor,
            selection: doc.selection,
            line_count: doc.lines.len(),
        }
    }

    pub async fn open(&self, file_path: String, content: String) {
        let mut doc = self.doc.write().await;
        doc.file_path = Some(file_path);
        doc.lines = content.lines().map(str::to_string).collect();
        if doc.lines.is_empty() {
            doc.lines.push(String::new());
        }
        doc.cursor = Position::default();
        doc.selection = Selection::default();
    }

    pub async fn go_to(&self, line: u32, column: u32) -> Result<(), HandlerError> {
        let mut doc = self.doc.write().await;
        if line as usize >= doc.lines.len() {
            return Err(HandlerError::invalid_request("line out of range"));
        }
        doc.cursor = Position { line, column };
        Ok(())
    }

    pub async fn set_selection(
        &self,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
    ) -> Result<(), HandlerError> {
        let mut doc = self.doc.write().await;
        if start_line as usize >= doc.lines.len() || end_line as usize >= doc.lines.len() {
            return Err(HandlerError::invalid_request("selection out of range"));
        }
        doc.selection = Selection {
            start_line,
            start_column,
            end_line,
            end_column,
        };
        Ok(())
    }

    pub async fn get_selection(&self) -> Selection {
        self.doc.read().await.selection
    }

    pub async fn insert_text(&self, text: &str) -> Result<(), HandlerError> {
        let mut doc = self.doc.write().await;
        let cursor = doc.cursor;
        let line = doc
            .lines
            .get_mut(cursor.line as usize)
            .ok_or_else(|| HandlerError::invalid_request("cursor out of range"))?;
        let at = (cursor.column as usize).min(line.len());
        line.insert_str(at, text);
        Ok(())
    }

    pub async fn replace_selection(&self, text: &str) -> Result<(), HandlerError> {
        let mut doc = self.doc.write().await;
        let sel = doc.selection;
        if sel.start_line != sel.end_line {
            // Multi-line replacement collapses the span into the start line;
            // sufficient for this bridge's scope.
            let tail = doc
                .lines
                .get(sel.end_line as usize)
                .cloned()
                .unwrap_or_default();
            let tail_from = (sel.end_column as usize).min(tail.len());
            let head = doc
                .lines
                .get(sel.start_line as usize)
                .cloned()
                .unwrap_or_default();
            let head_to = (sel.start_column as usize).min(head.len());
            let merged = format!("{}{}{}", &head[..head_to], text, &tail[tail_from..]);
            let start = sel.start_line as usize;
            let end = sel.end_line as usize;
            doc.lines.splice(start..=end.min(doc.lines.len() - 1), [merged]);
        } else {
            let line = doc
                .lines
                .get_mut(sel.start_line as usize)
                .ok_or_else(|| HandlerError::invalid_request("selection out of range"))?;
            let from = (sel.start_column as usize).min(line.len());
            let to = (sel.end_column as usize).min(line.len()).max(from);
            line.replace_range(from..to, text);
        }
        Ok(())
    }

    pub async fn get_line(&self, line: u32) -> Result<String, HandlerError> {
        self.doc
            .read()
            .await
            .lines
            .get(line as usize)
            .cloned()
            .ok_or_else(|| HandlerError::invalid_request("line out of range"))
    }

    pub async fn get_visible_text(&self) -> String {
        self.doc.read().await.lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_text_at_cursor() {
        let engine = EditorEngine::new();
        engine.open("a.rs".to_string(), "hello".to_string()).await;
        engine.go_to(0, 5).await.unwrap();
        engine.insert_text(" world").await.unwrap();
        assert_eq!(engine.get_line(0).await.unwrap(), "hello world");
    }

    #[tokio::test]
    async fn replace_selection_on_single_line() {
        let engine = EditorEngine::new();
        engine.open("a.rs".to_string(), "hello world".to_string()).await;
        engine.set_selection(0, 6, 0, 11).await.unwrap();
        engine.replace_selection("rust").await.unwrap();
        assert_eq!(engine.get_line(0).await.unwrap(), "hello rust");
    }

    #[tokio::test]
    async fn go_to_rejects_out_of_range_line() {
        let engine = EditorEngine::new();
        engine.open("a.rs".to_string(), "one\ntwo".to_string()).await;
        assert!(engine.go_to(5, 0).await.is_err());
    }
}
