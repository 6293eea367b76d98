//! Credential provider - encrypted storage for secrets services declare they need

pub mod cipher;
pub mod store;

pub use cipher::Cipher;
pub use store::{
    AuditEntry, CredentialStore, CredentialType, CredentialUpdate, CredentialView, NewCredential,
};
