use crate::storage::{self, RecordStore, Role};
use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::fs;

/// Staff account definition from JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StaffDefinition {
    /// Login email (unique identifier)
    pub email: String,
    /// Plain text password (will be hashed). Only applied when the account is created.
    pub password: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: Role,
    /// Whether the account may sign in
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

fn default_role() -> Role {
    Role::Analyst
}

/// Root structure of the users JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsersFile {
    pub users: Vec<StaffDefinition>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// Sync staff accounts from a JSON file to the store (idempotent)
pub async fn sync_users_from_file(store: &RecordStore, file_path: &str) -> Result<SyncSummary> {
    tracing::info!("Loading staff accounts from {}", file_path);

    let content = fs::read_to_string(file_path).into_diagnostic().map_err(|e| {
        miette::miette!("Failed to read users file at '{}': {}", file_path, e)
    })?;

    let users_file: UsersFile = serde_json::from_str(&content)
        .into_diagnostic()
        .map_err(|e| {
            miette::miette!(
                "Failed to parse users JSON file: {}\n\nExpected format:\n{{\n  \"users\": [\n    {{\n      \"email\": \"ana@example.com\",\n      \"password\": \"secure-password\",\n      \"display_name\": \"Ana Rojas\",\n      \"role\": \"admin\",\n      \"active\": true\n    }}\n  ]\n}}",
                e
            )
        })?;

    sync_users(store, &users_file.users).await
}

pub async fn sync_users(store: &RecordStore, users: &[StaffDefinition]) -> Result<SyncSummary> {
    tracing::info!("Found {} account(s) to sync", users.len());

    let mut summary = SyncSummary::default();
    for def in users {
        match sync_user(store, def).await? {
            SyncResult::Created => summary.created += 1,
            SyncResult::Updated => summary.updated += 1,
            SyncResult::Unchanged => summary.unchanged += 1,
        }
    }

    tracing::info!(
        "User sync complete: {} created, {} updated, {} unchanged",
        summary.created,
        summary.updated,
        summary.unchanged
    );

    Ok(summary)
}

#[derive(Debug)]
enum SyncResult {
    Created,
    Updated,
    Unchanged,
}

async fn sync_user(store: &RecordStore, def: &StaffDefinition) -> Result<SyncResult> {
    let display_name = def
        .display_name
        .clone()
        .unwrap_or_else(|| def.email.trim().to_string());

    let existing = storage::get_user_by_email(store, &def.email)
        .await
        .into_diagnostic()?;

    let result = match existing {
        None => {
            tracing::info!("Creating account: {}", def.email);
            let user =
                storage::create_user(store, &def.email, &def.password, &display_name, def.role)
                    .await
                    .into_diagnostic()?;

            if !def.active {
                storage::update_user(store, &user.id, Some(false), None, None, None)
                    .await
                    .into_diagnostic()?;
            }

            SyncResult::Created
        }
        Some(user) => {
            let role_matches = user.role == def.role;
            let active_matches = user.active == def.active;
            let name_matches = user.display_name == display_name;

            if !role_matches || !active_matches || !name_matches {
                tracing::info!("Updating account: {}", def.email);
                storage::update_user(
                    store,
                    &user.id,
                    (!active_matches).then_some(def.active),
                    (!role_matches).then_some(def.role),
                    (!name_matches).then_some(display_name),
                    None,
                )
                .await
                .into_diagnostic()?;

                SyncResult::Updated
            } else {
                SyncResult::Unchanged
            }
        }
    };

    Ok(result)
}
