//! Enrolled-face roster, persisted as JSON.
//!
//! The roster is the catalog of known encodings the matcher resolves
//! against. Enrollment appends to it; the daemon loads it read-only at
//! startup.

use crate::types::{Embedding, EnrolledFace};
use std::collections::BTreeSet;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster io: {0}")]
    Io(#[from] std::io::Error),
    #[error("roster parse: {0}")]
    Json(#[from] serde_json::Error),
}

/// Catalog of enrolled face encodings.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Roster {
    faces: Vec<EnrolledFace>,
}

impl Roster {
    /// Load the roster from a JSON file. A missing file is an empty
    /// roster, not an error.
    pub fn load(path: &Path) -> Result<Self, RosterError> {
        let data = match std::fs::read(path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no roster file, starting empty");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let roster: Roster = serde_json::from_slice(&data)?;
        tracing::info!(
            path = %path.display(),
            encodings = roster.faces.len(),
            people = roster.names().len(),
            "roster loaded"
        );
        Ok(roster)
    }

    /// Write the roster to a JSON file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), RosterError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Append a new encoding for `name`, stamping an id and creation
    /// time. Returns the new entry's id.
    pub fn add(&mut self, name: &str, embedding: Embedding) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.faces.push(EnrolledFace {
            id: id.clone(),
            name: name.to_string(),
            embedding,
            created_at: chrono::Local::now().to_rfc3339(),
        });
        id
    }

    pub fn faces(&self) -> &[EnrolledFace] {
        &self.faces
    }

    /// Distinct enrolled names, sorted.
    pub fn names(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.faces.iter().map(|f| f.name.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
