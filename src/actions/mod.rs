//! Actions composed into the lifecycle pipelines.

mod connect;
mod guest;
mod instance_groups;
mod messages;
mod predicates;
mod read_state;
mod run_instance;
mod start_instance;
mod stop_instance;
pub mod templates;
mod terminate_instance;
mod validate;
mod wait;

pub use connect::ConnectCompute;
pub use guest::{Provision, SyncFolders};
pub use instance_groups::AssignInstanceGroups;
pub use messages::{MessageAlreadyCreated, MessageNotCreated, MessageWillNotDestroy};
pub use predicates::{DestroyConfirm, IsCreated, IsStopped};
pub use read_state::{ReadSshInfo, ReadState};
pub use run_instance::RunInstance;
pub use start_instance::StartInstance;
pub use stop_instance::StopInstance;
pub use terminate_instance::TerminateInstance;
pub use validate::ConfigValidate;
