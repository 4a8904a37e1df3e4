//! TOML store fixtures.
//!
//! ```toml
//! root = "/Root"
//!
//! [[nodes]]
//! path = "/Root/Site/Settings/logging.settings"
//! type = "Settings"
//! data = { level = "debug" }
//!
//! [[nodes]]
//! path = "/Root/Site/Pages/home.page"
//! type = "Page"
//! ```
//!
//! Missing ancestors are created as folders. `data` tables are stored as
//! JSON bodies; `body` stores its string verbatim.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::application::repos::{NodeStore, ensure_folder};
use crate::domain::nodes::{FOLDER_TYPE, Node};
use crate::domain::paths;
use crate::infra::memory::MemoryNodeStore;

use super::error::InfraError;

#[derive(Debug, Deserialize)]
pub struct StoreFixture {
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub nodes: Vec<FixtureNode>,
}

#[derive(Debug, Deserialize)]
pub struct FixtureNode {
    pub path: String,
    #[serde(rename = "type", default = "default_node_type")]
    pub node_type: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: Option<toml::Value>,
}

fn default_node_type() -> String {
    FOLDER_TYPE.to_string()
}

impl StoreFixture {
    pub fn parse(source: &str) -> Result<Self, InfraError> {
        toml::from_str(source).map_err(|err| InfraError::fixture(format!("invalid fixture: {err}")))
    }

    pub async fn read(path: &Path) -> Result<Self, InfraError> {
        let source = tokio::fs::read_to_string(path).await?;
        Self::parse(&source)
    }

    /// Build a store holding `default_root` (unless the fixture names its own
    /// root) and every fixture node.
    pub async fn seed(&self, default_root: &str) -> Result<MemoryNodeStore, InfraError> {
        let root = self.root.as_deref().unwrap_or(default_root);
        let store = MemoryNodeStore::with_root(root).map_err(fixture_error)?;

        let mut nodes: Vec<&FixtureNode> = self.nodes.iter().collect();
        nodes.sort_by_key(|node| paths::depth(&node.path));

        for entry in nodes {
            if !paths::is_descendant_of(&entry.path, root) {
                return Err(InfraError::fixture(format!(
                    "`{}` is outside the root `{root}`",
                    entry.path
                )));
            }
            let node = entry.to_node()?;
            if let Some(parent) = paths::parent(&node.path) {
                ensure_folder(&store, parent).await.map_err(fixture_error)?;
            }
            store.save(&node).await.map_err(fixture_error)?;
        }

        info!(root, nodes = self.nodes.len(), "Store seeded from fixture");
        Ok(store)
    }
}

impl FixtureNode {
    fn to_node(&self) -> Result<Node, InfraError> {
        let body = match (&self.body, &self.data) {
            (Some(_), Some(_)) => {
                return Err(InfraError::fixture(format!(
                    "`{}` sets both `body` and `data`",
                    self.path
                )));
            }
            (Some(body), None) => Some(body.clone()),
            (None, Some(data)) => Some(
                serde_json::to_string(data)
                    .map_err(|err| InfraError::fixture(format!("`{}`: {err}", self.path)))?,
            ),
            (None, None) => None,
        };

        let node = Node::new(&self.path, self.node_type.clone()).map_err(fixture_error)?;
        Ok(match body {
            Some(body) => node.with_body(body),
            None => node,
        })
    }
}

fn fixture_error(err: impl std::fmt::Display) -> InfraError {
    InfraError::fixture(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: &str = r#"
[[nodes]]
path = "/Root/Site/Sub/Page"
type = "Page"

[[nodes]]
path = "/Root/Site/Settings/logging.settings"
type = "Settings"
data = { level = "debug", verbose = true }

[[nodes]]
path = "/Root/Site/Settings/raw.settings"
type = "Settings"
body = "{oops"
"#;

    #[tokio::test]
    async fn seeds_nodes_and_missing_folders() {
        let fixture = StoreFixture::parse(SITE).expect("parse");
        let store = fixture.seed("/Root").await.expect("seed");

        assert!(store.exists("/Root/Site/Sub").await.expect("exists"));
        let logging = store
            .load_by_path("/Root/Site/Settings/logging.settings")
            .await
            .expect("load")
            .expect("present");
        let body: serde_json::Value =
            serde_json::from_str(logging.body.as_deref().expect("body")).expect("json");
        assert_eq!(body["level"], "debug");
        assert_eq!(body["verbose"], true);

        let raw = store
            .load_by_path("/Root/Site/Settings/raw.settings")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(raw.body.as_deref(), Some("{oops"));
    }

    #[tokio::test]
    async fn reads_fixture_files_with_custom_root() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        std::io::Write::write_all(
            &mut file,
            b"root = \"/Content\"\n\n[[nodes]]\npath = \"/Content/Docs\"\n",
        )
        .expect("write fixture");

        let fixture = StoreFixture::read(file.path()).await.expect("read");
        let store = fixture.seed("/Root").await.expect("seed");

        assert!(store.exists("/Content/Docs").await.expect("exists"));
        assert!(!store.exists("/Root").await.expect("exists"));
    }

    #[tokio::test]
    async fn missing_fixture_file_is_an_io_error() {
        let err = StoreFixture::read(Path::new("/nonexistent/treecache/fixture.toml"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, InfraError::Io(_)));
    }

    #[tokio::test]
    async fn nodes_outside_root_are_rejected() {
        let fixture = StoreFixture::parse("[[nodes]]\npath = \"/Elsewhere/x\"\n").expect("parse");
        let err = fixture.seed("/Root").await.err().expect("outside root");
        assert!(matches!(err, InfraError::Fixture { .. }));
    }

    #[test]
    fn body_and_data_are_exclusive() {
        let fixture = StoreFixture::parse(
            "[[nodes]]\npath = \"/Root/a\"\nbody = \"{}\"\ndata = { a = 1 }\n",
        )
        .expect("parse");
        assert!(fixture.nodes[0].to_node().is_err());
    }

    #[test]
    fn malformed_toml_is_a_fixture_error() {
        let err = StoreFixture::parse("nodes = [").expect_err("invalid");
        assert!(matches!(err, InfraError::Fixture { .. }));
    }
}
