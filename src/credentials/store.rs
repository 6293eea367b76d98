//! In-memory credential store with encrypted values and an audit trail

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use tracing::{info, warn};
use uuid::Uuid;

use super::cipher::Cipher;
use crate::error::{AppError, Result};

/// Kind of secret a credential holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialType {
    ApiKey,
    Oauth,
    BasicAuth,
    Jwt,
    Database,
    Webhook,
    Custom,
}

/// Payload for a new credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewCredential {
    pub name: String,
    pub credential_type: CredentialType,
    pub service_name: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub rotation_required: bool,
}

/// Patch for credential attributes other than the value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialUpdate {
    pub description: Option<String>,
    pub metadata: Option<HashMap<String, Value>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rotation_required: Option<bool>,
}

/// Stored credential; the value is only ever held encrypted
#[derive(Debug, Clone)]
struct StoredCredential {
    id: String,
    name: String,
    credential_type: CredentialType,
    service_name: String,
    encrypted_value: String,
    description: Option<String>,
    metadata: HashMap<String, Value>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    last_used: Option<DateTime<Utc>>,
    rotation_required: bool,
    rotation_count: u32,
}

/// Credential as exposed to callers, without any form of the secret
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialView {
    pub id: String,
    pub name: String,
    pub credential_type: CredentialType,
    pub service_name: String,
    pub description: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used: Option<DateTime<Utc>>,
    pub rotation_required: bool,
    pub rotation_count: u32,
}

impl StoredCredential {
    fn view(&self) -> CredentialView {
        CredentialView {
            id: self.id.clone(),
            name: self.name.clone(),
            credential_type: self.credential_type,
            service_name: self.service_name.clone(),
            description: self.description.clone(),
            metadata: self.metadata.clone(),
            expires_at: self.expires_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_used: self.last_used,
            rotation_required: self.rotation_required,
            rotation_count: self.rotation_count,
        }
    }
}

/// One audited access to a credential
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub credential_id: String,
    pub service_name: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Audit entries retained before the oldest are evicted
pub const DEFAULT_AUDIT_CAPACITY: usize = 10_000;

/// Credential store
pub struct CredentialStore {
    cipher: Cipher,
    credentials: DashMap<String, StoredCredential>,
    audit_log: Mutex<VecDeque<AuditEntry>>,
    audit_capacity: usize,
}

impl CredentialStore {
    /// Create a store whose key is derived from `encryption_key`, or random when absent
    pub fn new(encryption_key: Option<&str>) -> Self {
        let cipher = match encryption_key {
            Some(secret) if !secret.is_empty() => Cipher::from_secret(secret),
            _ => {
                warn!("No credential encryption key configured, generated a random key");
                Cipher::random()
            }
        };

        Self {
            cipher,
            credentials: DashMap::new(),
            audit_log: Mutex::new(VecDeque::new()),
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
        }
    }

    /// Keep at most `capacity` audit entries, dropping the oldest first
    pub fn with_audit_capacity(mut self, capacity: usize) -> Self {
        self.audit_capacity = capacity.max(1);
        self
    }

    pub fn encrypt(&self, value: &str) -> Result<String> {
        self.cipher.encrypt(value)
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String> {
        self.cipher.decrypt(ciphertext)
    }

    pub fn create(&self, credential: NewCredential) -> Result<CredentialView> {
        let name = credential.name.trim().to_lowercase();
        if name.is_empty() || name.len() > 255 {
            return Err(AppError::Validation(
                "Credential name must be between 1 and 255 characters".to_string(),
            ));
        }
        if credential.service_name.trim().is_empty() {
            return Err(AppError::Validation(
                "Credential service name cannot be empty".to_string(),
            ));
        }
        require_value(&credential.value)?;

        let now = Utc::now();
        let stored = StoredCredential {
            id: Uuid::new_v4().to_string(),
            name,
            credential_type: credential.credential_type,
            service_name: credential.service_name,
            encrypted_value: self.cipher.encrypt(&credential.value)?,
            description: credential.description,
            metadata: credential.metadata,
            expires_at: credential.expires_at,
            created_at: now,
            updated_at: now,
            last_used: None,
            rotation_required: credential.rotation_required,
            rotation_count: 0,
        };

        let view = stored.view();
        self.credentials.insert(stored.id.clone(), stored);
        self.audit(&view.id, &view.service_name, "create");

        info!(
            credential = %view.name,
            service = %view.service_name,
            "Created credential"
        );
        Ok(view)
    }

    pub fn get(&self, id: &str) -> Option<CredentialView> {
        self.credentials.get(id).map(|c| c.value().view())
    }

    /// Decrypt a credential's value for `accessor`, recording the access
    pub fn reveal(&self, id: &str, accessor: &str) -> Result<String> {
        let encrypted = {
            let mut credential = self
                .credentials
                .get_mut(id)
                .ok_or_else(|| AppError::credential_not_found(id))?;
            credential.last_used = Some(Utc::now());
            credential.encrypted_value.clone()
        };

        let value = self.cipher.decrypt(&encrypted)?;
        self.audit(id, accessor, "read");
        Ok(value)
    }

    pub fn list_for_service(&self, service_name: &str) -> Vec<CredentialView> {
        let mut views: Vec<CredentialView> = self
            .credentials
            .iter()
            .filter(|c| c.service_name == service_name)
            .map(|c| c.value().view())
            .collect();
        views.sort_by_key(|v| v.created_at);
        views
    }

    pub fn update(&self, id: &str, update: CredentialUpdate) -> Option<CredentialView> {
        let view = {
            let mut credential = self.credentials.get_mut(id)?;
            if let Some(description) = update.description {
                credential.description = Some(description);
            }
            if let Some(metadata) = update.metadata {
                credential.metadata = metadata;
            }
            if let Some(expires_at) = update.expires_at {
                credential.expires_at = Some(expires_at);
            }
            if let Some(rotation_required) = update.rotation_required {
                credential.rotation_required = rotation_required;
            }
            credential.updated_at = Utc::now();
            credential.view()
        };

        self.audit(id, &view.service_name, "update");
        Some(view)
    }

    /// Remove a credential. Returns whether it existed.
    pub fn delete(&self, id: &str) -> bool {
        match self.credentials.remove(id) {
            Some((_, credential)) => {
                self.audit(id, &credential.service_name, "delete");
                info!(credential = %credential.name, "Deleted credential");
                true
            }
            None => false,
        }
    }

    /// Replace a credential's value
    pub fn rotate(&self, id: &str, new_value: &str) -> Result<CredentialView> {
        require_value(new_value)?;
        let encrypted = self.cipher.encrypt(new_value)?;

        let view = {
            let mut credential = self
                .credentials
                .get_mut(id)
                .ok_or_else(|| AppError::credential_not_found(id))?;
            credential.encrypted_value = encrypted;
            credential.rotation_count += 1;
            credential.rotation_required = false;
            credential.updated_at = Utc::now();
            credential.view()
        };

        self.audit(id, &view.service_name, "rotate");
        info!(credential = %view.name, rotation_count = view.rotation_count, "Rotated credential");
        Ok(view)
    }

    /// Ids of credentials whose expiry is at or before `now`
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .credentials
            .iter()
            .filter(|c| c.expires_at.is_some_and(|at| at <= now))
            .map(|c| c.id.clone())
            .collect();
        info!(expired = expired.len(), "Checked credential expiration");
        expired
    }

    /// Record an access to a credential
    pub fn audit(&self, credential_id: &str, service_name: &str, action: &str) -> AuditEntry {
        let entry = AuditEntry {
            credential_id: credential_id.to_string(),
            service_name: service_name.to_string(),
            action: action.to_string(),
            timestamp: Utc::now(),
        };
        info!(
            credential_id = %entry.credential_id,
            service = %entry.service_name,
            action = %entry.action,
            "Credential audit"
        );
        let mut log = self.audit_log.lock();
        while log.len() >= self.audit_capacity {
            log.pop_front();
        }
        log.push_back(entry.clone());
        entry
    }

    /// Retained audit entries for one credential, oldest first
    pub fn audit_log(&self, credential_id: &str) -> Vec<AuditEntry> {
        self.audit_log
            .lock()
            .iter()
            .filter(|e| e.credential_id == credential_id)
            .cloned()
            .collect()
    }
}

fn require_value(value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(
            "Credential value cannot be empty".to_string(),
        ));
    }
    Ok(())
}
