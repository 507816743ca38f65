use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("not initialized: run 'conductor init'")]
    NotInitialized,

    #[error("unit not found: {0}")]
    UnitNotFound(String),

    #[error("duplicate unit id: {0}")]
    DuplicateUnit(String),

    #[error("invalid unit id '{0}': must be lowercase alphanumeric with hyphens")]
    InvalidUnitId(String),

    #[error("unit '{unit}' depends on unknown unit '{dependency}'")]
    UnknownDependency { unit: String, dependency: String },

    #[error("dependency cycle detected among units: {0}")]
    CycleDetected(String),

    #[error("workspace creation failed for unit '{unit}': {message}")]
    WorkspaceCreation { unit: String, message: String },

    #[error("workspace not found for unit: {0}")]
    WorkspaceNotFound(String),

    #[error("vcs error: {0}")]
    Vcs(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("check '{0}' could not be spawned: {1}")]
    CheckSpawn(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ConductorError>;
