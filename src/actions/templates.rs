//! Pipelines for each user-facing verb.
//!
//! Every template is rebuilt on each call; building a pipeline performs no
//! I/O, so this is cheap.

use crate::pipeline::Pipeline;

use super::{
    AssignInstanceGroups, ConfigValidate, ConnectCompute, DestroyConfirm, IsCreated, IsStopped,
    MessageAlreadyCreated, MessageNotCreated, MessageWillNotDestroy, Provision, ReadSshInfo,
    ReadState, RunInstance, StartInstance, StopInstance, SyncFolders, TerminateInstance,
};

fn not_created() -> Pipeline {
    Pipeline::builder().use_action(MessageNotCreated).build()
}

/// Reads the machine's lifecycle state into the context.
#[must_use]
pub fn read_state() -> Pipeline {
    Pipeline::builder()
        .use_action(ConfigValidate)
        .use_action(ConnectCompute)
        .use_action(ReadState)
        .build()
}

/// Reads the guest's SSH endpoint into the context.
#[must_use]
pub fn read_ssh_info() -> Pipeline {
    Pipeline::builder()
        .use_action(ConfigValidate)
        .use_action(ConnectCompute)
        .use_action(ReadSshInfo)
        .build()
}

/// Stops a created instance.
#[must_use]
pub fn halt() -> Pipeline {
    Pipeline::builder()
        .use_action(ConfigValidate)
        .branch(
            IsCreated,
            Pipeline::builder()
                .use_action(ConnectCompute)
                .use_action(StopInstance)
                .build(),
            not_created(),
        )
        .build()
}

/// Terminates the instance after confirmation.
#[must_use]
pub fn destroy() -> Pipeline {
    let terminate = Pipeline::builder()
        .use_action(ConfigValidate)
        .branch(
            IsCreated,
            Pipeline::builder()
                .use_action(ConnectCompute)
                .use_action(TerminateInstance)
                .build(),
            not_created(),
        )
        .build();
    Pipeline::builder()
        .branch(
            DestroyConfirm,
            terminate,
            Pipeline::builder().use_action(MessageWillNotDestroy).build(),
        )
        .build()
}

/// Re-runs guest provisioning on a created instance over its SSH endpoint.
#[must_use]
pub fn provision() -> Pipeline {
    Pipeline::builder()
        .use_action(ConfigValidate)
        .branch(
            IsCreated,
            Pipeline::builder()
                .use_action(ConnectCompute)
                .use_action(ReadSshInfo)
                .use_action(Provision)
                .use_action(SyncFolders)
                .build(),
            not_created(),
        )
        .build()
}

/// Creates the instance, or starts it again when it is stopped.
#[must_use]
pub fn up() -> Pipeline {
    let resume = Pipeline::builder()
        .branch(
            IsStopped,
            Pipeline::builder()
                .use_action(Provision)
                .use_action(SyncFolders)
                .use_action(StartInstance)
                .build(),
            Pipeline::builder().use_action(MessageAlreadyCreated).build(),
        )
        .build();
    let create = Pipeline::builder()
        .use_action(Provision)
        .use_action(SyncFolders)
        .use_action(RunInstance)
        .use_action(AssignInstanceGroups)
        .build();
    Pipeline::builder()
        .use_action(ConfigValidate)
        .use_action(ConnectCompute)
        .branch(IsCreated, resume, create)
        .build()
}

/// Stops and restarts a created instance.
#[must_use]
pub fn reload() -> Pipeline {
    Pipeline::builder()
        .use_action(ConfigValidate)
        .use_action(ConnectCompute)
        .branch(
            IsCreated,
            Pipeline::builder().append(halt()).append(up()).build(),
            not_created(),
        )
        .build()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::compute::Instance;
    use crate::error::ActionError;
    use crate::guest::SshInfo;
    use crate::state::LifecycleState;
    use crate::test_support::{Harness, instance};

    #[rstest]
    #[case::read_state(read_state(), "ConfigValidate -> ConnectCompute -> ReadState")]
    #[case::halt(
        halt(),
        "ConfigValidate -> Branch(IsCreated ? [ConnectCompute -> StopInstance] : [MessageNotCreated])"
    )]
    #[case::destroy(
        destroy(),
        "Branch(DestroyConfirm ? [ConfigValidate -> Branch(IsCreated ? \
         [ConnectCompute -> TerminateInstance] : [MessageNotCreated])] : [MessageWillNotDestroy])"
    )]
    #[case::up(
        up(),
        "ConfigValidate -> ConnectCompute -> Branch(IsCreated ? [Branch(IsStopped ? \
         [Provision -> SyncFolders -> StartInstance] : [MessageAlreadyCreated])] : \
         [Provision -> SyncFolders -> RunInstance -> AssignInstanceGroups])"
    )]
    #[case::provision(
        provision(),
        "ConfigValidate -> Branch(IsCreated ? [ConnectCompute -> ReadSshInfo -> Provision -> \
         SyncFolders] : [MessageNotCreated])"
    )]
    fn templates_have_expected_shape(#[case] pipeline: Pipeline, #[case] expected: &str) {
        assert_eq!(pipeline.describe(), expected);
    }

    #[tokio::test]
    async fn up_then_up_reports_already_created() {
        let harness = Harness::new();

        let mut ctx = harness.context();
        assert_eq!(up().run(&mut ctx).await, Ok(()));
        let creates = |harness: &Harness| {
            harness
                .compute
                .calls()
                .iter()
                .filter(|call| call.starts_with("create_instance "))
                .count()
        };
        assert_eq!(creates(&harness), 1);

        let mut ctx = harness.context();
        assert_eq!(up().run(&mut ctx).await, Ok(()));
        assert_eq!(creates(&harness), 1);
        assert!(harness.ui.contains("Instance is already created."));
    }

    #[tokio::test]
    async fn halt_then_up_starts_the_same_instance() {
        let harness = Harness::builder().machine_id("vm").build();
        harness
            .compute
            .insert_instance(instance("vm", "us-central1-f", "RUNNING"));

        let mut ctx = harness.context();
        assert_eq!(halt().run(&mut ctx).await, Ok(()));
        assert_eq!(ctx.machine_state, Some(LifecycleState::Stopped));

        let mut ctx = harness.context();
        assert_eq!(up().run(&mut ctx).await, Ok(()));
        assert_eq!(ctx.machine_state, Some(LifecycleState::Running));
        assert_eq!(harness.store.get("default"), Some(String::from("vm")));
        assert_eq!(harness.hooks.calls(), ["sync_folders default", "provision default"]);
    }

    #[tokio::test]
    async fn halt_without_instance_reports_not_created() {
        let harness = Harness::new();
        let mut ctx = harness.context();

        assert_eq!(halt().run(&mut ctx).await, Ok(()));
        assert!(harness.ui.contains("Instance is not created."));
        assert_eq!(harness.connects(), 0);
    }

    #[tokio::test]
    async fn declined_destroy_changes_nothing() {
        let harness = Harness::builder().machine_id("vm").confirm(false).build();
        harness
            .compute
            .insert_instance(instance("vm", "us-central1-f", "RUNNING"));
        let mut ctx = harness.context();

        assert_eq!(destroy().run(&mut ctx).await, Ok(()));
        assert!(harness.compute.instance("vm").is_some());
        assert_eq!(harness.store.get("default"), Some(String::from("vm")));
        assert!(harness.ui.contains("will not be destroyed"));
    }

    #[tokio::test]
    async fn destroy_twice_is_a_no_op_the_second_time() {
        let harness = Harness::builder().machine_id("vm").confirm(true).build();
        harness
            .compute
            .insert_instance(instance("vm", "us-central1-f", "RUNNING"));

        let mut ctx = harness.context();
        assert_eq!(destroy().run(&mut ctx).await, Ok(()));
        let mut ctx = harness.context();
        assert_eq!(destroy().run(&mut ctx).await, Ok(()));

        let deletes = harness
            .compute
            .calls()
            .iter()
            .filter(|call| call.starts_with("delete_instance"))
            .count();
        assert_eq!(deletes, 1);
        assert!(harness.ui.contains("Instance is not created."));
    }

    #[tokio::test]
    async fn reload_stops_then_starts() {
        let harness = Harness::builder().machine_id("vm").build();
        harness
            .compute
            .insert_instance(instance("vm", "us-central1-f", "RUNNING"));
        let mut ctx = harness.context();

        assert_eq!(reload().run(&mut ctx).await, Ok(()));
        let calls = harness.compute.calls();
        let stop = calls.iter().position(|call| call == "stop_instance vm");
        let start = calls.iter().position(|call| call == "start_instance vm");
        assert!(matches!((stop, start), (Some(stop), Some(start)) if stop < start));
    }

    #[tokio::test]
    async fn provision_requires_created_instance() {
        let harness = Harness::new();
        let mut ctx = harness.context();

        assert_eq!(provision().run(&mut ctx).await, Ok(()));
        assert!(harness.hooks.calls().is_empty());
        assert!(harness.ui.contains("Instance is not created."));
    }

    #[tokio::test]
    async fn provision_hands_hooks_the_ssh_endpoint() {
        let harness = Harness::builder()
            .machine_id("vm")
            .configure(|settings| settings.ssh_port = Some(2222))
            .build();
        harness.compute.insert_instance(Instance {
            nat_ip: Some(String::from("34.1.2.3")),
            ..instance("vm", "us-central1-f", "RUNNING")
        });
        let mut ctx = harness.context();

        assert_eq!(provision().run(&mut ctx).await, Ok(()));
        let expected = Some(SshInfo {
            host: String::from("34.1.2.3"),
            port: 2222,
        });
        assert_eq!(harness.hooks.calls(), ["sync_folders default", "provision default"]);
        assert_eq!(harness.hooks.endpoints(), [expected.clone(), expected]);
    }

    #[tokio::test]
    async fn invalid_configuration_stops_up_before_any_remote_call() {
        let harness = Harness::builder()
            .configure(|settings| settings.image_family = Some(String::from("debian-12")))
            .build();
        let mut ctx = harness.context();

        assert!(matches!(
            up().run(&mut ctx).await,
            Err(ActionError::Validation(_))
        ));
        assert_eq!(harness.connects(), 0);
    }
}
