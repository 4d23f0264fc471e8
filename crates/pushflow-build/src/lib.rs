//! PushFlow image build and publish
//!
//! This crate builds a container image with a BuildKit-backed build engine and
//! publishes it to a registry, either directly from the engine or by loading an
//! exported image archive into the local Docker daemon and pushing from there.

pub mod auth;
pub mod container;
pub mod context;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod extract;
pub mod strategy;

pub use container::{Compression, ContainerSpec, DEFAULT_BASE_IMAGE, Secret};
pub use context::ContextBuilder;
pub use daemon::{DaemonClient, DockerDaemon, PushOptions, split_image_tag};
pub use engine::{BuildEngine, BuildxEngine};
pub use error::{BuildError, BuildResult};
pub use extract::extract_image_id;
pub use strategy::{DaemonPush, EnginePush, PublishOutcome, PublishStrategy, Publisher};
