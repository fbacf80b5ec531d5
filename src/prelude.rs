// ABOUTME: Prelude module - convenient imports for common use cases.
// ABOUTME: Use `use modswitch::prelude::*;` to get started quickly.

pub use crate::error::{
    LoaderError, ModSwitchError, ProfileError, RegistryError, ToolError, ToolInitError,
};
pub use crate::loader::{
    LoadStatistics, LoadStatus, LoadedModuleRecord, ModuleFailure, ModuleLoadResult,
    ModuleLoader, ProfileLoadResult,
};
pub use crate::module::{
    FnModule, Module, ModuleBase, ModuleDefinition, ModuleFactories, ModuleRegistry,
    Registration, ToolOwnership,
};
pub use crate::profile::{
    ManagerState, ProfileConfig, ProfileDefinition, ProfileDetection, ProfileManager,
    ProfileRecommendation, ProfileSwitchResult, RecommendationContext, Signal,
};
pub use crate::tool::{
    FnTool, Registry, Tool, ToolAnnotations, ToolDefinition, ToolHost, ToolResult,
};
