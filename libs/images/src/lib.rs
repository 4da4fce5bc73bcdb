//! Kubernetes component image resolution and mirroring.
//!
//! Given a Kubernetes version, this library works out which component images
//! that release needs and copies the missing ones from a source registry into
//! a mirror registry. The work is a strictly downstream pipeline:
//!
//! - **Version**: normalize the operator's input into `vMAJOR.MINOR.PATCH`
//! - **Resolve**: map every component to its image tag, via `kubeadm` when it
//!   is installed, otherwise by parsing kubeadm's `constants.go`
//! - **Locate**: build the source and mirror image references
//! - **Probe**: ask the container engine which mirror images already exist
//! - **Sync**: pull, retag and push whatever is missing
//!
//! External systems (processes, the container engine, HTTP) sit behind the
//! [`CommandRunner`] and [`TextFetcher`] traits so every stage can be driven
//! by fakes in tests.

pub mod component;
pub mod config;
pub mod constants;
pub mod engine;
pub mod exec;
pub mod fetch;
pub mod locate;
pub mod pipeline;
pub mod probe;
pub mod resolve;
pub mod sync;
pub mod version;

pub use component::{component_set, ImagePrefixMap, ImageTagMap};
pub use config::MirrorConfig;
pub use engine::{ContainerEngine, EngineError};
pub use exec::{CommandError, CommandOutput, CommandRunner, ProcessRunner};
pub use fetch::{FetchConfig, FetchError, HttpFetcher, TextFetcher};
pub use locate::{locate, ImageReference, LocatedImages};
pub use pipeline::{Pipeline, PipelineError, RunReport};
pub use probe::{ExistenceMap, Presence, Prober};
pub use resolve::{Resolution, ResolveError, Resolver, ResolverConfig, Strategy, StrategyError};
pub use sync::{ComponentOutcome, ComponentSync, SyncPolicy, SyncReport, SyncStep, Synchronizer};
pub use version::{TargetVersion, VersionError};
