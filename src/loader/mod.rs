// ABOUTME: Loader module - dependency ordering, module load/unload, and the
// ABOUTME: result and statistics types they report.

mod loader;
mod order;
mod result;

pub use loader::ModuleLoader;
pub use order::{
    DependencyClosure, TopologicalOrder, dependency_closure, find_cycle, topological_order,
};
pub use result::*;

#[cfg(test)]
mod loader_test;
