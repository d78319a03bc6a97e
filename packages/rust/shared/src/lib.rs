//! Shared types, error model, configuration, and collaborator traits for attachport.
//!
//! This crate is the foundation depended on by all other attachport crates.
//! It provides:
//! - [`AttachportError`]: the unified error type
//! - Domain types ([`ContentUnit`], [`RemoteFileInfo`], [`ImportReport`], ...)
//! - Collaborator traits ([`ContentStore`], [`AttachmentRegistrar`], [`ImportTracker`])
//! - Configuration ([`AppConfig`], [`ImportConfig`], config loading)

pub mod collab;
pub mod config;
pub mod error;
pub mod types;
pub mod upload_types;

// Re-export public API at crate root for ergonomic imports.
pub use collab::{AttachmentRegistrar, ContentStore, ImportTracker, UploadTypeRegistry};
pub use config::{
    AppConfig, ExtractConfig, HttpConfig, ImportConfig, ImportSection, StorageConfig,
    config_dir, config_file_path, init_config, init_config_at, load_config, load_config_from,
};
pub use error::{AttachportError, Result};
pub use types::{
    AttachmentId, AttachmentMeta, ContentKind, ContentUnit, EligibilityDecision, FetchFailure,
    FetchOutcome, IdRange, ImportOutcome, ImportReport, IneligibleReason, RemoteFileInfo,
    Replacement, UnitId, UploadType,
};
pub use upload_types::StaticUploadTypes;
