//! Behavioural scenarios for the machine lifecycle pipelines.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::LazyLock;

use drydock::actions::templates;
use drydock::test_support::{Harness, instance};
use drydock::{ActionError, LifecycleState, Pipeline};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tokio::runtime::Runtime;

static RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Runtime::new().unwrap_or_else(|err| panic!("tokio runtime should start for scenarios: {err}"))
});

const ZONE: &str = "us-central1-f";

#[derive(Clone)]
struct LifecycleWorld {
    harness: Rc<Harness>,
    outcome: Rc<RefCell<Option<Result<(), ActionError>>>>,
    state: Rc<RefCell<Option<LifecycleState>>>,
}

impl LifecycleWorld {
    fn new(harness: Harness) -> Self {
        Self {
            harness: Rc::new(harness),
            outcome: Rc::new(RefCell::new(None)),
            state: Rc::new(RefCell::new(None)),
        }
    }

    fn with_running(name: &str, confirm: bool) -> Self {
        let harness = Harness::builder()
            .machine_id(name)
            .confirm(confirm)
            .build();
        harness
            .compute
            .insert_instance(instance(name, ZONE, "RUNNING"));
        Self::new(harness)
    }

    fn run(&self, pipeline: &Pipeline, force: bool) {
        let mut ctx = self.harness.context();
        ctx.force_confirm_destroy = force;
        let result = RUNTIME.block_on(pipeline.run(&mut ctx));
        *self.outcome.borrow_mut() = Some(result);
        *self.state.borrow_mut() = ctx.machine_state;
    }

    fn outcome(&self) -> Result<(), ActionError> {
        self.outcome
            .borrow()
            .clone()
            .unwrap_or_else(|| panic!("no pipeline has run yet"))
    }
}

#[fixture]
fn world() -> LifecycleWorld {
    LifecycleWorld::new(Harness::new())
}

#[given("a project without an instance")]
fn project_without_instance() -> LifecycleWorld {
    LifecycleWorld::new(Harness::new())
}

#[given("a running instance \"{name}\"")]
fn running_instance(name: String) -> LifecycleWorld {
    LifecycleWorld::with_running(&name, true)
}

#[given("a running instance \"{name}\" and an operator who declines destruction")]
fn running_instance_declined(name: String) -> LifecycleWorld {
    LifecycleWorld::with_running(&name, false)
}

#[given("a project whose instances never boot")]
fn instances_never_boot() -> LifecycleWorld {
    let harness = Harness::builder()
        .configure(|settings| settings.instance_ready_timeout = Some(4))
        .build();
    harness.compute.set_boot_polls(u32::MAX);
    LifecycleWorld::new(harness)
}

#[when("I bring the machine up")]
fn bring_up(world: &LifecycleWorld) {
    world.run(&templates::up(), false);
}

#[when("I halt the machine")]
fn halt(world: &LifecycleWorld) {
    world.run(&templates::halt(), false);
}

#[when("I destroy the machine")]
fn destroy(world: &LifecycleWorld) {
    world.run(&templates::destroy(), false);
}

#[when("I force-destroy the machine")]
fn force_destroy(world: &LifecycleWorld) {
    world.run(&templates::destroy(), true);
}

#[when("I read the machine state")]
fn read_state(world: &LifecycleWorld) {
    world.run(&templates::read_state(), false);
}

#[then("the run succeeds")]
fn run_succeeds(world: &LifecycleWorld) {
    assert_eq!(world.outcome(), Ok(()));
}

#[then("the run fails waiting for readiness")]
fn run_times_out(world: &LifecycleWorld) {
    let outcome = world.outcome();
    assert!(
        matches!(outcome, Err(ActionError::ReadyTimeout { .. })),
        "expected a readiness timeout, got {outcome:?}"
    );
}

#[then("the machine is \"{state}\"")]
fn machine_is(world: &LifecycleWorld, state: String) {
    let actual = world.state.borrow().map(LifecycleState::id);
    assert_eq!(actual, Some(state.as_str()));
}

#[then("the identity is \"{id}\"")]
fn identity_is(world: &LifecycleWorld, id: String) {
    assert_eq!(world.harness.store.get("default"), Some(id));
}

#[then("no identity is recorded")]
fn no_identity(world: &LifecycleWorld) {
    assert_eq!(world.harness.store.get("default"), None);
}

#[then("the operator is told \"{message}\"")]
fn operator_is_told(world: &LifecycleWorld, message: String) {
    assert!(
        world.harness.ui.contains(&message),
        "missing '{message}' in {:?}",
        world.harness.ui.lines()
    );
}

#[then("no instance \"{name}\" remains")]
fn no_instance_remains(world: &LifecycleWorld, name: String) {
    assert!(world.harness.compute.instance(&name).is_none());
}

#[then("the instance \"{name}\" still exists")]
fn instance_still_exists(world: &LifecycleWorld, name: String) {
    assert!(world.harness.compute.instance(&name).is_some());
}

#[scenario(path = "tests/features/lifecycle.feature", name = "Provision a new machine")]
fn scenario_provision(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Bringing up a running machine changes nothing"
)]
fn scenario_up_is_idempotent(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/lifecycle.feature", name = "Halt a running machine")]
fn scenario_halt(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Tear down an instance that never becomes ready"
)]
fn scenario_readiness_timeout(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Respect a declined destroy"
)]
fn scenario_declined_destroy(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Force-destroy a running machine"
)]
fn scenario_forced_destroy(world: LifecycleWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/lifecycle.feature",
    name = "Report a machine that was never created"
)]
fn scenario_not_created(world: LifecycleWorld) {
    let _ = world;
}
