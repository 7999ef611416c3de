//! Imageboard API payloads.
//!
//! Only the fields the relay reads are modelled; everything else in the
//! JSON is ignored.

use serde::{Deserialize, Deserializer, Serialize};

/// Thread header as listed in a board's thread catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Thread {
    /// Thread number (the API sends it as a string or a number)
    #[serde(rename = "num", deserialize_with = "string_or_number")]
    pub id: String,

    /// Opening post text, used for subscription matching
    #[serde(default)]
    pub comment: String,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub timestamp: u64,

    #[serde(default)]
    pub posts_count: u64,
}

/// Response of the thread catalog endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ThreadList {
    #[serde(default)]
    pub board: String,

    #[serde(default)]
    pub threads: Vec<Thread>,
}

/// An attached media file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct File {
    /// Server-side file name, carries the extension
    pub name: String,

    /// Path relative to the resource host
    pub path: String,

    /// Size as reported by the API (kilobytes on most boards)
    #[serde(default)]
    pub size: u64,
}

/// A single post in a thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Post {
    #[serde(default)]
    pub comment: String,

    pub timestamp: u64,

    #[serde(default)]
    pub files: Vec<File>,
}

/// Posts of one thread.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ThreadPosts {
    #[serde(default)]
    pub posts: Vec<Post>,
}

/// Response of the thread endpoint: `{"threads": [{"posts": [...]}]}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ThreadData {
    #[serde(default)]
    pub threads: Vec<ThreadPosts>,
}

impl ThreadData {
    /// Flatten into the posts of the thread.
    pub fn into_posts(self) -> ThreadPosts {
        ThreadPosts {
            posts: self.threads.into_iter().flat_map(|t| t.posts).collect(),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_list_accepts_numeric_and_string_ids() {
        let json = r#"{
            "board": "b",
            "threads": [
                {"num": "123", "comment": "first", "timestamp": 10, "views": 5},
                {"num": 456, "comment": "second"}
            ]
        }"#;
        let list: ThreadList = serde_json::from_str(json).unwrap();
        assert_eq!(list.board, "b");
        assert_eq!(list.threads[0].id, "123");
        assert_eq!(list.threads[1].id, "456");
        assert_eq!(list.threads[1].timestamp, 0);
    }

    #[test]
    fn test_thread_data_flattens_posts() {
        let json = r#"{
            "threads": [{
                "posts": [
                    {"comment": "op", "timestamp": 123},
                    {"comment": "files", "timestamp": 124,
                     "files": [{"name": "a.png", "path": "/b/src/1/a.png", "size": 100}]}
                ]
            }]
        }"#;
        let data: ThreadData = serde_json::from_str(json).unwrap();
        let posts = data.into_posts().posts;
        assert_eq!(posts.len(), 2);
        assert!(posts[0].files.is_empty());
        assert_eq!(posts[1].files[0].path, "/b/src/1/a.png");
    }
}
