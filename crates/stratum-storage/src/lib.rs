//! Persistence boundary for Stratum repositories.
//!
//! A repository is stored as one pretty-printed JSON document carrying a
//! format version, the active schemas and every element with its category
//! instances. All identity is uuid-based, so cross-references and
//! inheritance edges survive the round-trip without any positional
//! resolution; a save followed by a load reproduces an identical containment
//! tree, inheritance graph, override flags and property values.
//!
//! Loading re-validates the structural invariants, because a stored document
//! may have been edited outside the graph API. A violation is fatal at load
//! time.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use stratum_model::Repository;

pub const FORMAT_VERSION: u32 = 1;

pub const REPOSITORY_FILE: &str = "repository.json";

#[derive(Debug, Serialize, Deserialize)]
struct RepositoryDocument {
    format_version: u32,
    repository: Repository,
}

// ============================================================================
// Project layout
// ============================================================================

/// Maps a project directory onto its storage files.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    root: PathBuf,
}

impl ProjectLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repository_file(&self) -> PathBuf {
        self.root.join(REPOSITORY_FILE)
    }

    /// Create the project directory structure on disk.
    pub fn init(&self) -> anyhow::Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("creating project directory {}", self.root.display()))?;
        Ok(())
    }

    pub fn exists(&self) -> bool {
        self.repository_file().is_file()
    }

    pub fn save(&self, repository: &Repository) -> anyhow::Result<()> {
        save_repository(repository, &self.repository_file())
    }

    pub fn load(&self) -> anyhow::Result<Repository> {
        load_repository(&self.repository_file())
    }
}

// ============================================================================
// Save / load
// ============================================================================

pub fn save_repository(repository: &Repository, path: &Path) -> anyhow::Result<()> {
    let document = RepositoryDocument {
        format_version: FORMAT_VERSION,
        repository: repository.clone(),
    };
    let json = serde_json::to_string_pretty(&document)?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    tracing::debug!(path = %path.display(), elements = repository.len(), "repository saved");
    Ok(())
}

pub fn load_repository(path: &Path) -> anyhow::Result<Repository> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let document: RepositoryDocument =
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    if document.format_version != FORMAT_VERSION {
        anyhow::bail!(
            "unsupported repository format version {} (expected {FORMAT_VERSION})",
            document.format_version
        );
    }
    document
        .repository
        .validate()
        .with_context(|| format!("validating {}", path.display()))?;
    tracing::debug!(path = %path.display(), elements = document.repository.len(), "repository loaded");
    Ok(document.repository)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratum_model::{
        CategorySchema, PropertyDef, PropertyKind, ScalarKind, ScalarValue, SchemaSet,
    };
    use tempfile::tempdir;

    fn sample_repository() -> Repository {
        let schemas = SchemaSet::load(vec![CategorySchema {
            id: "s.Part".to_string(),
            name: "Part".to_string(),
            properties: vec![PropertyDef {
                name: "mass".to_string(),
                kind: PropertyKind::Scalar {
                    scalar: ScalarKind::Float,
                },
            }],
        }])
        .unwrap();

        let mut repo = Repository::new(schemas);
        let root = repo.create_element("satellite");
        repo.add_root(root).unwrap();
        let wheel = repo.create_element("reaction-wheel");
        repo.add_child(root, wheel).unwrap();
        repo.add_inheritance_edge(wheel, root).unwrap();
        repo.attach_category(root, "s.Part").unwrap();
        repo.attach_category(wheel, "s.Part").unwrap();

        let mass = repo
            .element(root)
            .unwrap()
            .category("s.Part")
            .unwrap()
            .property("mass")
            .unwrap()
            .uuid;
        repo.find_property_mut(mass)
            .unwrap()
            .set_scalar(Some(ScalarValue::Float(12.5)))
            .unwrap();
        let wheel_mass = repo
            .element(wheel)
            .unwrap()
            .category("s.Part")
            .unwrap()
            .property("mass")
            .unwrap()
            .uuid;
        repo.find_property_mut(wheel_mass).unwrap().overridden = true;
        repo
    }

    #[test]
    fn round_trip_reproduces_the_repository_exactly() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new(dir.path().join("project"));
        layout.init().unwrap();

        let repo = sample_repository();
        layout.save(&repo).unwrap();
        assert!(layout.exists());

        let loaded = layout.load().unwrap();
        assert_eq!(loaded, repo);
    }

    #[test]
    fn load_rejects_unknown_format_versions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(REPOSITORY_FILE);
        let mut json = serde_json::to_value(&RepositoryDocument {
            format_version: FORMAT_VERSION,
            repository: sample_repository(),
        })
        .unwrap();
        json["format_version"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        let err = load_repository(&path).unwrap_err();
        assert!(err.to_string().contains("format version"));
    }

    #[test]
    fn load_rejects_structurally_corrupted_documents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(REPOSITORY_FILE);
        let repo = sample_repository();
        save_repository(&repo, &path).unwrap();

        // Break parent/child symmetry by hand: point the child at a parent
        // that never lists it.
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let elements = json["repository"]["elements"].as_object_mut().unwrap();
        let orphan_parent = serde_json::json!(uuid_like());
        for element in elements.values_mut() {
            if element["name"] == "reaction-wheel" {
                element["parent"] = orphan_parent.clone();
            }
        }
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();

        assert!(load_repository(&path).is_err());
    }

    fn uuid_like() -> String {
        "00000000-0000-4000-8000-000000000000".to_string()
    }
}
