// ABOUTME: Defines all error types for the modswitch library using thiserror.
// ABOUTME: Each subsystem has its own error enum, unified under ModSwitchError.

/// Top-level error type for the modswitch library.
#[derive(Debug, thiserror::Error)]
pub enum ModSwitchError {
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),

    #[error("Profile error: {0}")]
    Profile(#[from] ProfileError),

    #[error("Tool initialization error: {0}")]
    ToolInit(#[from] ToolInitError),
}

/// Errors from tool host operations.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Execution failed: {0}")]
    Execution(#[source] anyhow::Error),
}

/// Errors from building the static module registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Module '{0}' is declared more than once")]
    DuplicateModule(String),
}

/// Errors from loading and unloading modules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    #[error("Unknown module: {0}")]
    UnknownModule(String),

    #[error("No factory registered for module '{0}'")]
    NoFactory(String),

    #[error("Dependency cycle detected: {}", .cycle.join(" -> "))]
    DependencyCycle { cycle: Vec<String> },

    #[error("Module '{module}' depends on missing module '{dependency}'")]
    MissingDependency { module: String, dependency: String },

    #[error("Dependency '{dependency}' of module '{module}' failed to load: {reason}")]
    DependencyFailed {
        module: String,
        dependency: String,
        reason: String,
    },

    #[error("Module '{module}' failed to load: {message}")]
    ModuleLoad { module: String, message: String },

    #[error("Cannot unload '{module}': required by {}", .dependents.join(", "))]
    UnloadBlocked {
        module: String,
        dependents: Vec<String>,
    },
}

/// Errors from profile resolution and switching.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("Unknown profile: {0}")]
    UnknownProfile(String),

    #[error("Profile extends cycle: {}", .chain.join(" -> "))]
    ExtendsCycle { chain: Vec<String> },

    #[error("Profile switch to '{in_progress}' in progress, retry switch to '{requested}' later")]
    SwitchInProgress {
        requested: String,
        in_progress: String,
    },

    #[error("Switch to profile '{profile}' exceeded {timeout_ms}ms")]
    Timeout { profile: String, timeout_ms: u64 },

    #[error("Profile '{profile}' failed to load modules: {}", .failures.join("; "))]
    ModulesFailed {
        profile: String,
        failures: Vec<String>,
    },

    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Rollback of switch to '{profile}' failed: {reason}")]
    RollbackFailed { profile: String, reason: String },

    #[error("Profile manager is in an unrecoverable state: {reason}")]
    Unrecoverable { reason: String },
}

/// Error raised by a module when a lazy tool's first-use initialization fails.
///
/// Returned to the caller of the tool through `anyhow::Error`, so callers can
/// `downcast_ref::<ToolInitError>()` to tell it apart from handler failures.
#[derive(Debug, thiserror::Error)]
#[error("Failed to initialize tool '{tool}': {source}")]
pub struct ToolInitError {
    pub tool: String,
    #[source]
    pub source: anyhow::Error,
}

impl ToolInitError {
    /// Create an initialization error for a tool.
    pub fn new(tool: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self {
            tool: tool.into(),
            source: source.into(),
        }
    }
}
