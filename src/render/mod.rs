//! Render layer: turns a built [`ClusterModel`] into daemon command scripts and
//! launch arguments.
//!
//! Nothing here mutates the model, so scripts for different daemons can be
//! rendered independently and in any order.
//!
//! [`ClusterModel`]: crate::model::ClusterModel

pub mod files;
pub mod launch;
pub mod script;

pub use files::{ScriptFile, plan_scripts, write_scripts};
pub use launch::launch_args;
pub use script::{AutoIntervalPolicy, ConfigEmitter, EmitOptions, ListenerScope};
