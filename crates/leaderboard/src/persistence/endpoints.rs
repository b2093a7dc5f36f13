use serde::{Deserialize, Serialize};

/// Repository directory holding every game document.
pub const DOCUMENTS_DIR: &str = "leaderboards";

/// Tree listings are requested in pages of this size.
pub const PAGE_SIZE: usize = 100;

/// `projects/{id}/repository/files/{path}/raw`: file content, 404 if absent.
pub const RAW_FILE_PATH: (reqwest::Method, &[&str]) = (reqwest::Method::GET, &["raw"]);

/// `projects/{id}/repository/files/{path}`: file metadata, 404 if absent.
pub const FILE_EXISTS_PATH: (reqwest::Method, &[&str]) = (reqwest::Method::GET, &[]);

/// `projects/{id}/repository/files/{path}`: commit new content to an existing file.
pub const UPDATE_FILE_PATH: (reqwest::Method, &[&str]) = (reqwest::Method::PUT, &[]);

/// `projects/{id}/repository/files/{path}`: commit a new file.
pub const CREATE_FILE_PATH: (reqwest::Method, &[&str]) = (reqwest::Method::POST, &[]);

/// `projects/{id}/repository/tree`: directory listing.
pub const TREE_PATH: (reqwest::Method, &[&str]) = (reqwest::Method::GET, &["repository", "tree"]);

/// Path segments between the project and the encoded file path.
pub const FILES_SEGMENTS: &[&str] = &["repository", "files"];

/// Header carrying the access token.
pub const TOKEN_HEADER: &str = "PRIVATE-TOKEN";

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CommitFileBody {
    pub branch: String,
    pub content: String,
    pub commit_message: String,
    pub encoding: String,
}

impl CommitFileBody {
    pub fn text(branch: &str, content: String, commit_message: String) -> Self {
        Self {
            branch: branch.to_string(),
            content,
            commit_message,
            encoding: "text".to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_file(&self) -> bool {
        self.kind == "blob"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn commit_body_is_plain_text() {
        let body = CommitFileBody::text("main", "{}".to_string(), "Wipe chess".to_string());

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"branch": "main", "content": "{}", "commit_message": "Wipe chess", "encoding": "text"})
        );
    }

    #[test]
    fn deser_tree_listing() {
        let listing = r#"[
            {"id": "a1", "name": "chess_history.json", "type": "blob", "path": "leaderboards/chess_history.json", "mode": "100644"},
            {"id": "b2", "name": "archive", "type": "tree", "path": "leaderboards/archive", "mode": "040000"}
        ]"#;

        let entries: Vec<TreeEntry> = serde_json::from_str(listing).unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_file());
        assert!(!entries[1].is_file());
        assert_eq!(entries[0].name, "chess_history.json");
    }
}
