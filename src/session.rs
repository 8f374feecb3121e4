//! Links between local work sessions and tracker issues.
//!
//! A session link associates a named working directory with a ticket key so
//! other tooling can find the issue a checkout belongs to.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionLink {
    pub id: Uuid,
    /// Human-friendly label, defaults to the directory name
    pub name: String,
    /// Working directory the session refers to
    pub path: PathBuf,
    /// Ticket key this session works on (e.g. "OPS-42")
    pub ticket: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStore {
    #[serde(default)]
    pub sessions: Vec<SessionLink>,

    #[serde(skip)]
    store_path: PathBuf,
}

impl SessionStore {
    pub fn load(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        let store_file = data_dir.join("sessions.json");

        if store_file.exists() {
            let contents =
                fs::read_to_string(&store_file).context("Failed to read sessions file")?;
            let mut store: SessionStore =
                serde_json::from_str(&contents).context("Failed to parse sessions file")?;
            store.store_path = data_dir.to_path_buf();
            Ok(store)
        } else {
            Ok(Self {
                sessions: Vec::new(),
                store_path: data_dir.to_path_buf(),
            })
        }
    }

    pub fn save(&self) -> Result<()> {
        let store_file = self.store_path.join("sessions.json");
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(store_file, contents).context("Failed to write sessions file")?;
        Ok(())
    }

    /// Link a ticket to a working directory. An existing link for the same
    /// ticket is replaced.
    pub fn link(&mut self, ticket: &str, name: &str, path: PathBuf) -> Result<&SessionLink> {
        self.sessions.retain(|s| s.ticket != ticket);
        self.sessions.push(SessionLink {
            id: Uuid::new_v4(),
            name: name.to_string(),
            path,
            ticket: ticket.to_string(),
            created_at: Utc::now(),
        });
        self.save()?;
        Ok(self.sessions.last().expect("just pushed"))
    }

    /// Remove the link for a ticket. Returns true if one existed.
    pub fn unlink(&mut self, ticket: &str) -> Result<bool> {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.ticket != ticket);
        let removed = self.sessions.len() != before;
        if removed {
            self.save()?;
        }
        Ok(removed)
    }

    pub fn find(&self, ticket: &str) -> Option<&SessionLink> {
        self.sessions.iter().find(|s| s.ticket == ticket)
    }
}
