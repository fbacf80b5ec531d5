// ABOUTME: Root module for modswitch - dependency-aware capability modules
// ABOUTME: and hot-swappable tool profiles for an extensible tool server.

pub mod error;
pub mod loader;
pub mod module;
pub mod prelude;
pub mod profile;
pub mod tool;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::ModSwitchError;
