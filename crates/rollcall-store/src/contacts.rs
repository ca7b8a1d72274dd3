//! Contact store — durable name → (phone, email) mapping.
//!
//! The store enforces the one-contact-per-name invariant only; phone and
//! email syntax is the enrollment caller's job (see [`crate::validate`]).

use crate::db::Store;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: i64,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Store {
    /// Insert or update the contact for `name`. Updating keeps the
    /// existing row id.
    pub fn upsert_contact(
        &self,
        name: &str,
        phone: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO contacts (name, phone, email) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET phone = excluded.phone, email = excluded.email",
            params![name, phone, email],
        )?;
        tracing::debug!(name, "contact upserted");
        Ok(())
    }

    pub fn contact(&self, name: &str) -> Result<Option<Contact>, StoreError> {
        let contact = self
            .conn
            .query_row(
                "SELECT id, name, phone, email FROM contacts WHERE name = ?1",
                params![name],
                |row| {
                    Ok(Contact {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        phone: row.get(2)?,
                        email: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(contact)
    }

    pub fn contacts(&self) -> Result<Vec<Contact>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, phone, email FROM contacts ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok(Contact {
                id: row.get(0)?,
                name: row.get(1)?,
                phone: row.get(2)?,
                email: row.get(3)?,
            })
        })?;
        let mut contacts = Vec::new();
        for row in rows {
            contacts.push(row?);
        }
        Ok(contacts)
    }

    /// Delete the contact for `name`. Returns whether a row was removed.
    pub fn delete_contact(&self, name: &str) -> Result<bool, StoreError> {
        let n = self
            .conn
            .execute("DELETE FROM contacts WHERE name = ?1", params![name])?;
        Ok(n > 0)
    }
}
