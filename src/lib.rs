//! Cluster configuration compiler for LDMS daemons.
//!
//! A declarative cluster document (daemons, plugins, aggregators, stores,
//! samplers) is expanded into an entity graph and then rendered into one
//! `ldmsd` command script per daemon:
//!
//! document -> [`spec::Document`] -> [`model::ClusterModel`] -> scripts

pub mod error;
pub mod model;
pub mod render;
pub mod spec;

pub use error::CompileError;
pub use model::build::compile;
pub use model::{ClusterModel, GraphBuilder};
pub use render::{ConfigEmitter, EmitOptions};
pub use spec::Document;

pub type Result<T> = std::result::Result<T, CompileError>;
