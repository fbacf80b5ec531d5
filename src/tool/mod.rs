// ABOUTME: Tool module - defines tools, the host seam, and the in-memory host.
// ABOUTME: Modules expose their capabilities through these types.

mod fn_tool;
mod registry;
mod result;
mod traits;

pub use fn_tool::*;
pub use registry::*;
pub use result::*;
pub use traits::*;

#[cfg(test)]
mod registry_test;
