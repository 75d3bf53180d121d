use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use std::sync::LazyLock;

use super::ManifestParser;
use crate::error::{Error, Result};
use crate::model::{PackageRecord, Registry};

static SPEC_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^\s]+) \((.+)\)$").expect("spec line regex"));

/// Reads Bundler lock files.
///
/// `GEM` blocks list gems from rubygems.org. `GIT` blocks pin one gem to a
/// repository revision.
pub struct BundlerParser;

#[derive(Debug)]
struct Node {
    value: String,
    depth: usize,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// The indentation tree of a lock file, stored as an arena.
///
/// Node 0 is a synthetic root at depth 0; an unindented line has depth 1.
#[derive(Debug)]
struct LockTree {
    nodes: Vec<Node>,
}

impl LockTree {
    const ROOT: usize = 0;

    fn parse(contents: &str) -> Self {
        let mut nodes = vec![Node {
            value: String::new(),
            depth: 0,
            parent: None,
            children: Vec::new(),
        }];
        let mut indent_width: Option<usize> = None;
        let mut current = Self::ROOT;

        for line in contents.lines() {
            let value = line.trim();
            if value.is_empty() {
                continue;
            }

            let spaces = line.len() - line.trim_start().len();
            let level = if spaces == 0 {
                0
            } else {
                spaces.div_ceil(*indent_width.get_or_insert(spaces))
            };
            let depth = level + 1;

            // bundler writes some blocks (RUBY VERSION) one space deeper than
            // the rest, so any deeper line is a child of the current node
            while nodes[current].depth > depth {
                current = nodes[current].parent.unwrap_or(Self::ROOT);
            }
            let parent = if depth > nodes[current].depth {
                current
            } else {
                nodes[current].parent.unwrap_or(Self::ROOT)
            };

            let index = nodes.len();
            nodes.push(Node {
                value: value.to_string(),
                depth,
                parent: Some(parent),
                children: Vec::new(),
            });
            nodes[parent].children.push(index);
            current = index;
        }

        Self { nodes }
    }

    fn children(&self, index: usize) -> impl Iterator<Item = &Node> {
        self.nodes[index].children.iter().map(|&i| &self.nodes[i])
    }

    fn child_index(&self, index: usize, value: &str) -> Option<usize> {
        self.nodes[index]
            .children
            .iter()
            .copied()
            .find(|&i| self.nodes[i].value == value)
    }

    fn child_value<'a>(&'a self, index: usize, prefix: &str) -> Option<&'a str> {
        self.children(index)
            .find_map(|node| node.value.strip_prefix(prefix))
    }
}

/// Where the gems of a source block come from.
struct Remote {
    registry: Registry,
    scope: Option<String>,
    name: Option<String>,
}

fn parse_remote(manifest_path: &str, remote: &str) -> Result<Remote> {
    let unsupported = || Error::parse(manifest_path, format!("Unsupported remote: {}", remote));
    let url = Url::parse(remote).map_err(|_| unsupported())?;

    match url.host_str() {
        Some("rubygems.org") => Ok(Remote {
            registry: Registry::Rubygems,
            scope: None,
            name: None,
        }),
        Some("github.com") => {
            let mut segments = url
                .path_segments()
                .into_iter()
                .flatten()
                .filter(|s| !s.is_empty());
            let owner = segments.next().ok_or_else(unsupported)?;
            let repo = segments.next().ok_or_else(unsupported)?;
            Ok(Remote {
                registry: Registry::GithubRepositories,
                scope: Some(owner.to_string()),
                name: Some(repo.strip_suffix(".git").unwrap_or(repo).to_string()),
            })
        }
        _ => Err(unsupported()),
    }
}

#[async_trait]
impl ManifestParser for BundlerParser {
    fn name(&self) -> &'static str {
        "bundler"
    }

    fn file_names(&self) -> &'static [&'static str] {
        &["Gemfile.lock", "Gemfile.canary.lock"]
    }

    fn parse(&self, manifest_path: &str, contents: &str) -> Result<Vec<PackageRecord>> {
        let tree = LockTree::parse(contents);
        let mut packages = Vec::new();

        for &block in &tree.nodes[LockTree::ROOT].children {
            // PLATFORMS, DEPENDENCIES, RUBY VERSION, ... hold no resolved gems
            if !matches!(tree.nodes[block].value.as_str(), "GIT" | "GEM") {
                continue;
            }

            let Some(specs) = tree.child_index(block, "specs:") else {
                continue;
            };
            if tree.nodes[specs].children.is_empty() {
                continue;
            }

            let remote = tree.child_value(block, "remote: ").ok_or_else(|| {
                Error::parse(
                    manifest_path,
                    format!("Missing remote in {} block", tree.nodes[block].value),
                )
            })?;
            let remote = parse_remote(manifest_path, remote)?;

            if let Some(revision) = tree.child_value(block, "revision: ") {
                let spec_count = tree.nodes[specs].children.len();
                if spec_count != 1 {
                    return Err(Error::parse(
                        manifest_path,
                        format!(
                            "Expected exactly one spec when revision is present, got {}",
                            spec_count
                        ),
                    ));
                }

                let name = remote.name.as_deref().ok_or_else(|| {
                    Error::parse(manifest_path, "A pinned revision needs a repository remote")
                })?;
                packages.push(PackageRecord::new(
                    remote.scope.as_deref(),
                    name,
                    format!("commit:{}", revision),
                    manifest_path,
                    remote.registry,
                )?);
                continue;
            }

            for spec in tree.children(specs) {
                let caps = SPEC_LINE.captures(&spec.value).ok_or_else(|| {
                    Error::parse(manifest_path, format!("Unrecognized spec: {}", spec.value))
                })?;
                packages.push(PackageRecord::new(
                    remote.scope.as_deref(),
                    &caps[1],
                    &caps[2],
                    manifest_path,
                    remote.registry,
                )?);
            }
        }

        Ok(packages)
    }
}
