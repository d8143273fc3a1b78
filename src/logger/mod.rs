//! Audit logging: append-only JSONL with graceful degradation.

pub mod jsonl;

pub use jsonl::{AuditConfig, AuditEntry, AuditLog};
