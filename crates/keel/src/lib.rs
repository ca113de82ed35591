//! Keel CLI Library
//!
//! Collaborator adapters and logging setup used by the `keel` binary, exposed
//! for programmatic use and testing.

pub mod adapters;
pub mod logging;
pub mod surface;

pub use adapters::{
    DeferredExit, JsonFileStore, LoggingMenus, MenuEventTable, StdinApplication, ThreadLocale,
};
