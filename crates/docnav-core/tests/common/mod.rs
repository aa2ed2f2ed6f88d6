//! Shared fixtures for the workspace integration suites.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use docnav_core::{
    InterfaceLanguage, Navigator, NavigatorIndexWriter, PageType, Project, ProjectNode,
    ProjectReference, ProjectSource, TopLevelNode, TopLevelNodeKind,
};

/// Writes a minimal bundle archive: a root directory with its navigator
/// index under `index/`.
pub async fn write_bundle_archive(root: &Path, title: &str) {
    navigator_index_writer(title)
        .write_to(&root.join("index"))
        .await
        .unwrap();
}

/// A small four-topic navigator index for `title`.
pub fn navigator_index_writer(title: &str) -> NavigatorIndexWriter {
    let mut writer = NavigatorIndexWriter::new();
    writer
        .add_node(0, None, title, PageType::ROOT, InterfaceLanguage::DEFAULT)
        .add_node(
            1,
            Some(0),
            "Essentials",
            PageType::FRAMEWORK,
            InterfaceLanguage::DEFAULT,
        )
        .add_node(
            2,
            Some(1),
            "Getting Started",
            PageType::ARTICLE,
            InterfaceLanguage::DEFAULT,
        )
        .add_node(
            3,
            Some(0),
            "Tutorials",
            PageType::TUTORIAL,
            InterfaceLanguage::DEFAULT,
        )
        .add_path(0, InterfaceLanguage::DEFAULT, "")
        .add_path(1, InterfaceLanguage::DEFAULT, "documentation/essentials")
        .add_path(
            2,
            InterfaceLanguage::DEFAULT,
            "documentation/essentials/getting-started",
        )
        .add_path(3, InterfaceLanguage::DEFAULT, "tutorials");
    writer
}

/// Builds a project whose bundles all come from local archives.
pub fn local_project<P: AsRef<Path>>(
    identifier: &str,
    items: Vec<ProjectNode>,
    archives: Vec<(&str, P)>,
) -> Project {
    let references: HashMap<_, _> = archives
        .into_iter()
        .map(|(bundle_identifier, root)| {
            (
                bundle_identifier.to_string(),
                ProjectReference::new(
                    ProjectSource::LocalFs {
                        root: root.as_ref().to_path_buf(),
                    },
                    bundle_identifier,
                    bundle_identifier,
                ),
            )
        })
        .collect();
    Project::new(identifier, "Integration Project", items, references)
}

/// Waits until every bundle node reached `Ready` or `Failed`, returning the
/// final node snapshot.
pub async fn wait_for_terminal_states(navigator: &Navigator) -> Vec<TopLevelNode> {
    let mut rx = navigator.observe();
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            let nodes = navigator.nodes().await;
            let settled = nodes
                .iter()
                .filter(|node| node.kind == TopLevelNodeKind::Bundle)
                .all(|node| node.status.is_ready() || node.status.error().is_some());
            if settled {
                return nodes;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("bundle loads did not settle in time")
}
