//! Workspace targets for agent sessions
//!
//! A target is the environment an agent session runs against. The session
//! runner only needs three things from it: the working directory, file
//! contents by path, and the files changed since a point in time. Two
//! variants are provided:
//! - [`ContainerTarget`]: a running container, reached through `docker exec`
//! - [`LocalWorkspaceTarget`]: a directory on the host

mod commands;
mod container;
mod error;
mod local;
mod target;

pub use commands::{run_command, CommandOutput};
pub use container::ContainerTarget;
pub use error::{Result, TargetError};
pub use local::LocalWorkspaceTarget;
pub use target::{from_descriptor, is_vcs_path, ModifiedFile, WorkspaceTarget};
