use std::fs;
use std::path::Path;

use crawler_core::ports::{PostListStore, Result};
use crawler_core::CrawlError;
use tracing::debug;

/// Newline-delimited post url file, one url per line.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostListFile;

impl PostListFile {
    pub fn new() -> Self {
        Self
    }

    /// Trims every line and drops blank ones.
    fn parse(content: &str) -> Vec<String> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl PostListStore for PostListFile {
    fn read(&self, path: &Path) -> Result<Vec<String>> {
        if !path.exists() {
            return Err(CrawlError::PostList(format!(
                "{} does not exist",
                path.display()
            )));
        }
        let content = fs::read_to_string(path).map_err(|e| {
            CrawlError::PostList(format!("cannot read {}: {e}", path.display()))
        })?;

        let posts = Self::parse(&content);
        debug!(path = %path.display(), posts = posts.len(), "post list read");
        Ok(posts)
    }

    fn write(&self, path: &Path, posts: &[String]) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CrawlError::PostList(format!("cannot create {}: {e}", parent.display()))
            })?;
        }

        let mut content = String::new();
        for post in posts {
            content.push_str(post);
            content.push('\n');
        }
        fs::write(path, content).map_err(|e| {
            CrawlError::PostList(format!("cannot write {}: {e}", path.display()))
        })?;

        debug!(path = %path.display(), posts = posts.len(), "post list written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read_keeps_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data/wdb_crawler-post-urls.txt");
        let posts = vec![
            "https://www.instagram.com/p/c/".to_string(),
            "https://www.instagram.com/p/a/".to_string(),
        ];

        PostListFile::new().write(&path, &posts).unwrap();
        assert_eq!(PostListFile::new().read(&path).unwrap(), posts);
    }

    #[test]
    fn test_read_trims_and_skips_blank_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("posts.txt");
        fs::write(
            &path,
            "https://www.instagram.com/p/a/\r\n\n   \n  https://www.instagram.com/p/b/  \n",
        )
        .unwrap();

        assert_eq!(
            PostListFile::new().read(&path).unwrap(),
            vec![
                "https://www.instagram.com/p/a/".to_string(),
                "https://www.instagram.com/p/b/".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_file_is_post_list_error() {
        let dir = TempDir::new().unwrap();
        let result = PostListFile::new().read(&dir.path().join("missing.txt"));
        assert!(matches!(result, Err(CrawlError::PostList(_))));
    }

    #[test]
    fn test_empty_list_writes_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        PostListFile::new().write(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
        assert!(PostListFile::new().read(&path).unwrap().is_empty());
    }
}
