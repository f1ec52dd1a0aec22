//! Core library for the drydock VM lifecycle tool.
//!
//! Each user-facing verb (`up`, `halt`, `destroy`, `reload`, `provision`,
//! `status`, `ssh-config`) is a [`Pipeline`] of small actions sharing one
//! per-run [`Context`]. Pipelines branch on predicates such as
//! [`actions::IsCreated`], poll the compute API with bounded retries and
//! tear down half-provisioned instances when a wait fails or the user
//! interrupts the run. The compute API sits behind [`ComputeApi`], with a
//! Compute Engine REST adapter in [`google`].

pub mod actions;
pub mod compute;
pub mod config;
pub mod context;
pub mod error;
pub mod google;
pub mod guest;
pub mod identity;
pub mod interrupt;
pub mod pipeline;
pub mod poll;
pub mod runner;
pub mod state;
pub mod test_support;
pub mod ui;

pub use compute::{ComputeApi, ComputeError, Connector, ResourceKind, StaticConnector};
pub use config::{ConfigError, ConnectionConfig, FinalizedConfig, ProviderConfig, ZoneConfig};
pub use context::{Collaborators, Context};
pub use error::ActionError;
pub use google::{GoogleCompute, GoogleConnector};
pub use guest::{Communicator, GuestHooks, NoGuestHooks, SshInfo, TcpProbe};
pub use identity::{FileIdentityStore, IdentityError, IdentityStore, Machine, MemoryIdentityStore};
pub use interrupt::{InterruptFlag, install_ctrl_c_handler};
pub use pipeline::{Action, Next, Pipeline, PipelineBuilder, Step};
pub use poll::{PollLimit, PollOutcome, poll_until};
pub use runner::{ActionRunner, RunOptions, RunOutcome, Verb};
pub use state::LifecycleState;
pub use ui::{Confirmer, ConsoleUi, FixedConfirmer, StdinConfirmer, Ui};
