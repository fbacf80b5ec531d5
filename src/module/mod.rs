// ABOUTME: Module system - static definitions, tool ownership, the Module
// ABOUTME: trait with its registration context, lazy tools, and factories.

mod base;
mod definition;
mod factory;
mod fn_module;
mod lazy;
mod ownership;

pub use base::*;
pub use definition::*;
pub use factory::*;
pub use fn_module::*;
pub use ownership::*;
