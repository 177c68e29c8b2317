//! `git status` parsing, kept close to the teacher's porcelain-v2 parser.

use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct GitFileStatus {
    pub path: String,
    pub status: String,
    #[serde(rename = "oldPath", skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct GitStatusResponse {
    pub branch: String,
    pub staged: Vec<GitFileStatus>,
    pub unstaged: Vec<GitFileStatus>,
    pub untracked: Vec<GitFileStatus>,
    #[serde(rename = "aheadBehind")]
    pub ahead_behind: Option<(i64, i64)>,
}

/// Parse `git status --porcelain=v2 --branch` output into structured data.
pub fn parse_porcelain_status(output: &str) -> GitStatusResponse {
    let mut branch = String::new();
    let mut ahead_behind: Option<(i64, i64)> = None;
    let mut staged = Vec::new();
    let mut unstaged = Vec::new();
    let mut untracked = Vec::new();

    for line in output.lines() {
        if let Some(name) = line.strip_prefix("# branch.head ") {
            branch = name.to_string();
        } else if let Some(ab) = line.strip_prefix("# branch.ab ") {
            let parts: Vec<&str> = ab.split_whitespace().collect();
            if parts.len() == 2 {
                let a = parts[0].trim_start_matches('+').parse::<i64>().unwrap_or(0);
                let b = parts[1].trim_start_matches('-').parse::<i64>().unwrap_or(0);
                ahead_behind = Some((a, b));
            }
        } else if let Some(path) = line.strip_prefix("? ") {
            untracked.push(GitFileStatus {
                path: path.to_string(),
                status: "untracked".to_string(),
                old_path: None,
            });
        } else if line.starts_with("1 ") || line.starts_with("2 ") {
            let is_rename = line.starts_with("2 ");
            let parts: Vec<&str> = line.splitn(if is_rename { 10 } else { 9 }, ' ').collect();
            if parts.len() < 2 {
                continue;
            }
            let xy = parts[1];
            let x = xy.chars().next().unwrap_or('.');
            let y = xy.chars().nth(1).unwrap_or('.');
            let last = *parts.last().unwrap_or(&"");

            let (file_path, old_path) = if is_rename {
                let rename_parts: Vec<&str> = last.splitn(2, '\t').collect();
                if rename_parts.len() == 2 {
                    (rename_parts[0].to_string(), Some(rename_parts[1].to_string()))
                } else {
                    (last.to_string(), None)
                }
            } else {
                (last.to_string(), None)
            };

            if x != '.' && x != '?' {
                staged.push(GitFileStatus {
                    path: file_path.clone(),
                    status: porcelain_status_to_string(x),
                    old_path: old_path.clone(),
                });
            }
            if y != '.' && y != '?' {
                unstaged.push(GitFileStatus {
                    path: file_path,
                    status: porcelain_status_to_string(y),
                    old_path,
                });
            }
        }
    }

    GitStatusResponse {
        branch,
        staged,
        unstaged,
        untracked,
        ahead_behind,
    }
}

pub fn porcelain_status_to_string(c: char) -> String {
    match c {
        'M' => "modified".to_string(),
        'A' => "added".to_string(),
        'D' => "deleted".to_string(),
        'R' => "renamed".to_string(),
        'C' => "copied".to_string(),
        'T' => "type_changed".to_string(),
        'U' => "unmerged".to_string(),
        _ => format!("unknown({c})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branch_and_ahead_behind() {
        let output = "# branch.head feature\n# branch.ab +2 -1\n";
        let result = parse_porcelain_status(output);
        assert_eq!(result.branch, "feature");
        assert_eq!(result.ahead_behind, Some((2, 1)));
    }

    #[test]
    fn parses_staged_and_unstaged() {
        let output = "1 MM N... 100644 100644 100644 abc123 def456 src/both.rs\n";
        let result = parse_porcelain_status(output);
        assert_eq!(result.staged.len(), 1);
        assert_eq!(result.unstaged.len(), 1);
        assert_eq!(result.staged[0].status, "modified");
    }

    #[test]
    fn parses_untracked() {
        let output = "? newfile.rs\n";
        let result = parse_porcelain_status(output);
        assert_eq!(result.untracked.len(), 1);
        assert_eq!(result.untracked[0].path, "newfile.rs");
    }
}
