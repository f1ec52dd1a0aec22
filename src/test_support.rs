//! Test doubles shared by unit and behavioural tests.
//!
//! [`FakeCompute`] keeps an in-memory model of the remote platform and
//! records every call as `"<method> <name>"`. [`Harness`] wires the fakes
//! into a [`Context`] with a fast poll interval.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::compute::{
    Address, ComputeApi, ComputeError, ComputeFuture, Connector, Disk, DiskSpec, DiskType, Image,
    Instance, InstanceGroup, InstanceGroupSpec, InstanceSpec, Operation, ResourceKind,
    STATUS_DONE, STATUS_READY, STATUS_RUNNING,
};
use crate::config::{FinalizedConfig, MachineSettings, ProviderConfig, ZoneConfig};
use crate::context::{Collaborators, Context};
use crate::guest::{Communicator, GuestFuture, GuestHooks, SshInfo};
use crate::identity::{Machine, MemoryIdentityStore};
use crate::interrupt::InterruptFlag;
use crate::ui::{FixedConfirmer, Ui};

const PROJECT: &str = "proj";
const FAKE_NAT_IP: &str = "203.0.113.10";
const FAKE_NETWORK_IP: &str = "10.128.0.2";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds an instance with both a private and a public address.
#[must_use]
pub fn instance(name: &str, zone: &str, status: &str) -> Instance {
    Instance {
        name: name.to_owned(),
        zone: zone.to_owned(),
        status: status.to_owned(),
        network_ip: Some(FAKE_NETWORK_IP.to_owned()),
        nat_ip: Some(FAKE_NAT_IP.to_owned()),
    }
}

/// Builds a `READY` disk.
#[must_use]
pub fn disk(name: &str, zone: &str) -> Disk {
    Disk {
        name: name.to_owned(),
        zone: zone.to_owned(),
        status: STATUS_READY.to_owned(),
        self_link: format!("projects/{PROJECT}/zones/{zone}/disks/{name}"),
    }
}

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    instances: BTreeMap<String, Instance>,
    booting: BTreeMap<String, u32>,
    disks: BTreeMap<String, Disk>,
    disks_pending: BTreeMap<String, u32>,
    images: BTreeMap<(String, String), Image>,
    families: BTreeMap<(String, String), Image>,
    addresses: Vec<Address>,
    disk_types: BTreeSet<String>,
    groups: BTreeMap<String, Vec<String>>,
    operations: BTreeMap<String, u32>,
    next_operation: u32,
    boot_polls: u32,
    operation_polls: u32,
    disk_polls: u32,
    fail_get_instance: Option<ComputeError>,
    fail_create_instance: Option<ComputeError>,
    fail_create_disk: Option<ComputeError>,
    interrupt: Option<(InterruptFlag, u32)>,
    instance_polls: u32,
    identity_probe: Option<Arc<MemoryIdentityStore>>,
    identities_seen: Vec<Option<String>>,
}

impl FakeState {
    fn record(&mut self, method: &str, name: &str) {
        self.calls.push(format!("{method} {name}"));
    }

    fn operation(&mut self, zone: &str) -> Operation {
        self.next_operation = self.next_operation.saturating_add(1);
        let name = format!("op-{}", self.next_operation);
        let status = if self.operation_polls == 0 {
            STATUS_DONE
        } else {
            self.operations.insert(name.clone(), self.operation_polls);
            "RUNNING"
        };
        Operation {
            name,
            zone: zone.to_owned(),
            status: status.to_owned(),
            error: None,
        }
    }

    fn boot(&mut self, name: &str) -> &'static str {
        if self.boot_polls == 0 {
            self.booting.remove(name);
            STATUS_RUNNING
        } else {
            self.booting.insert(name.to_owned(), self.boot_polls);
            "STAGING"
        }
    }
}

/// Counts down one poll and reports whether the countdown finished.
fn tick(pending: &mut BTreeMap<String, u32>, name: &str) -> bool {
    let Some(remaining) = pending.get_mut(name) else {
        return true;
    };
    *remaining = remaining.saturating_sub(1);
    if *remaining == 0 {
        pending.remove(name);
        return true;
    }
    false
}

fn not_found(resource: ResourceKind, name: &str) -> ComputeError {
    ComputeError::NotFound {
        resource,
        name: name.to_owned(),
    }
}

/// In-memory stand-in for the remote compute platform.
#[derive(Default)]
pub struct FakeCompute {
    state: Mutex<FakeState>,
}

impl FakeCompute {
    /// Creates an empty platform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a platform holding the `debian-12` image in project `proj` and
    /// the standard disk types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let compute = Self::new();
        {
            let mut state = lock(&compute.state);
            state.images.insert(
                (PROJECT.to_owned(), String::from("debian-12")),
                image("debian-12"),
            );
            for disk_type in ["pd-standard", "pd-ssd", "pd-balanced"] {
                state.disk_types.insert(disk_type.to_owned());
            }
        }
        compute
    }

    /// Calls made so far, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    /// Adds or replaces an instance.
    pub fn insert_instance(&self, instance: Instance) {
        lock(&self.state)
            .instances
            .insert(instance.name.clone(), instance);
    }

    /// Current state of an instance.
    #[must_use]
    pub fn instance(&self, name: &str) -> Option<Instance> {
        lock(&self.state).instances.get(name).cloned()
    }

    /// Adds or replaces a disk.
    pub fn insert_disk(&self, disk: Disk) {
        lock(&self.state).disks.insert(disk.name.clone(), disk);
    }

    /// Current state of a disk.
    #[must_use]
    pub fn disk(&self, name: &str) -> Option<Disk> {
        lock(&self.state).disks.get(name).cloned()
    }

    /// Makes `family` in `project` resolve to `image_name`.
    pub fn insert_image_family(&self, family: &str, project: &str, image_name: &str) {
        lock(&self.state)
            .families
            .insert((project.to_owned(), family.to_owned()), image(image_name));
    }

    /// Adds a regional address.
    pub fn insert_address(&self, address: Address) {
        lock(&self.state).addresses.push(address);
    }

    /// Members of an instance group, if it exists.
    #[must_use]
    pub fn group_members(&self, group: &str) -> Option<Vec<String>> {
        lock(&self.state).groups.get(group).cloned()
    }

    /// Fails the next `get_instance` call with `err`.
    pub fn fail_next_get_instance(&self, err: ComputeError) {
        lock(&self.state).fail_get_instance = Some(err);
    }

    /// Fails the next `create_instance` call with `err`.
    pub fn fail_next_create_instance(&self, err: ComputeError) {
        lock(&self.state).fail_create_instance = Some(err);
    }

    /// Fails the next `create_disk` call with `err`.
    pub fn fail_next_create_disk(&self, err: ComputeError) {
        lock(&self.state).fail_create_disk = Some(err);
    }

    /// Keeps created or started instances in `STAGING` for `polls` lookups.
    pub fn set_boot_polls(&self, polls: u32) {
        lock(&self.state).boot_polls = polls;
    }

    /// Makes new operations report `DONE` on their `polls`-th lookup; zero
    /// returns them already finished.
    pub fn set_operation_polls_until_done(&self, polls: u32) {
        lock(&self.state).operation_polls = polls;
    }

    /// Keeps created disks in `CREATING` for `polls` lookups.
    pub fn set_disk_polls(&self, polls: u32) {
        lock(&self.state).disk_polls = polls;
    }

    /// Raises `flag` once `polls` instance lookups have been made.
    pub fn interrupt_after_polls(&self, flag: &InterruptFlag, polls: u32) {
        lock(&self.state).interrupt = Some((flag.clone(), polls));
    }

    /// Samples the `default` identity in `store` on every instance lookup.
    pub fn record_identity_on_get_instance(&self, store: &Arc<MemoryIdentityStore>) {
        lock(&self.state).identity_probe = Some(Arc::clone(store));
    }

    /// Identities sampled by [`Self::record_identity_on_get_instance`].
    #[must_use]
    pub fn identities_seen(&self) -> Vec<Option<String>> {
        lock(&self.state).identities_seen.clone()
    }

    fn get_instance_now(&self, name: &str) -> Result<Instance, ComputeError> {
        let mut state = lock(&self.state);
        state.record("get_instance", name);
        state.instance_polls = state.instance_polls.saturating_add(1);
        if let Some((flag, after)) = &state.interrupt
            && state.instance_polls >= *after
        {
            flag.set();
        }
        if let Some(store) = state.identity_probe.clone() {
            state.identities_seen.push(store.get("default"));
        }
        if let Some(err) = state.fail_get_instance.take() {
            return Err(err);
        }
        if !state.instances.contains_key(name) {
            return Err(not_found(ResourceKind::Instance, name));
        }
        if state.booting.contains_key(name) && tick(&mut state.booting, name) {
            if let Some(found) = state.instances.get_mut(name) {
                found.status = STATUS_RUNNING.to_owned();
            }
        }
        state
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Instance, name))
    }

    fn create_instance_now(&self, spec: &InstanceSpec) -> Result<Instance, ComputeError> {
        let mut state = lock(&self.state);
        state.record("create_instance", &spec.name);
        if let Some(err) = state.fail_create_instance.take() {
            return Err(err);
        }
        if state.instances.contains_key(&spec.name) {
            return Err(ComputeError::Conflict {
                resource: ResourceKind::Instance,
                name: spec.name.clone(),
                message: String::from("already exists"),
            });
        }
        let status = state.boot(&spec.name);
        let nat_ip = (!spec.use_private_ip).then(|| {
            spec.external_ip
                .clone()
                .unwrap_or_else(|| FAKE_NAT_IP.to_owned())
        });
        let created = Instance {
            name: spec.name.clone(),
            zone: spec.zone.clone(),
            status: status.to_owned(),
            network_ip: Some(FAKE_NETWORK_IP.to_owned()),
            nat_ip,
        };
        state.instances.insert(spec.name.clone(), created.clone());
        Ok(created)
    }

    fn set_status(&self, method: &str, name: &str, zone: &str) -> Result<Operation, ComputeError> {
        let mut state = lock(&self.state);
        state.record(method, name);
        if !state.instances.contains_key(name) {
            return Err(not_found(ResourceKind::Instance, name));
        }
        let status = if method == "stop_instance" {
            state.booting.remove(name);
            "STOPPED"
        } else {
            state.boot(name)
        };
        if let Some(found) = state.instances.get_mut(name) {
            found.status = status.to_owned();
        }
        Ok(state.operation(zone))
    }

    fn delete_instance_now(&self, name: &str, zone: &str) -> Result<Operation, ComputeError> {
        let mut state = lock(&self.state);
        state.record("delete_instance", name);
        state
            .instances
            .remove(name)
            .ok_or_else(|| not_found(ResourceKind::Instance, name))?;
        state.booting.remove(name);
        Ok(state.operation(zone))
    }

    fn get_operation_now(&self, name: &str, zone: &str) -> Operation {
        let mut state = lock(&self.state);
        state.record("get_operation", name);
        let done = tick(&mut state.operations, name);
        Operation {
            name: name.to_owned(),
            zone: zone.to_owned(),
            status: if done { STATUS_DONE } else { "RUNNING" }.to_owned(),
            error: None,
        }
    }

    fn get_disk_now(&self, name: &str) -> Result<Disk, ComputeError> {
        let mut state = lock(&self.state);
        state.record("get_disk", name);
        if !state.disks.contains_key(name) {
            return Err(not_found(ResourceKind::Disk, name));
        }
        if state.disks_pending.contains_key(name) && tick(&mut state.disks_pending, name) {
            if let Some(found) = state.disks.get_mut(name) {
                found.status = STATUS_READY.to_owned();
            }
        }
        state
            .disks
            .get(name)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Disk, name))
    }

    fn create_disk_now(&self, spec: &DiskSpec) -> Result<Disk, ComputeError> {
        let mut state = lock(&self.state);
        state.record("create_disk", &spec.name);
        if let Some(err) = state.fail_create_disk.take() {
            return Err(err);
        }
        let mut created = disk(&spec.name, &spec.zone);
        if state.disk_polls > 0 {
            created.status = String::from("CREATING");
            let polls = state.disk_polls;
            state.disks_pending.insert(spec.name.clone(), polls);
        }
        state.disks.insert(spec.name.clone(), created.clone());
        Ok(created)
    }

    fn delete_disk_now(&self, name: &str, zone: &str) -> Result<Operation, ComputeError> {
        let mut state = lock(&self.state);
        state.record("delete_disk", name);
        state
            .disks
            .remove(name)
            .ok_or_else(|| not_found(ResourceKind::Disk, name))?;
        Ok(state.operation(zone))
    }

    fn lookup_image(&self, method: &str, name: &str, project: &str) -> Result<Image, ComputeError> {
        let mut state = lock(&self.state);
        state.record(method, name);
        let key = (project.to_owned(), name.to_owned());
        let found = if method == "get_image" {
            state.images.get(&key)
        } else {
            state.families.get(&key)
        };
        found
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Image, name))
    }

    fn get_address_now(&self, wanted: &str) -> Result<Address, ComputeError> {
        let mut state = lock(&self.state);
        state.record("get_address", wanted);
        state
            .addresses
            .iter()
            .find(|address| address.address == wanted || address.name == wanted)
            .cloned()
            .ok_or_else(|| not_found(ResourceKind::Address, wanted))
    }

    fn get_disk_type_now(&self, name: &str, zone: &str) -> Result<DiskType, ComputeError> {
        let mut state = lock(&self.state);
        state.record("get_disk_type", name);
        if !state.disk_types.contains(name) {
            return Err(not_found(ResourceKind::DiskType, name));
        }
        Ok(DiskType {
            name: name.to_owned(),
            self_link: format!("projects/{PROJECT}/zones/{zone}/diskTypes/{name}"),
        })
    }

    fn group_now(
        &self,
        method: &str,
        name: &str,
        zone: &str,
    ) -> Result<InstanceGroup, ComputeError> {
        let mut state = lock(&self.state);
        state.record(method, name);
        if method == "create_instance_group" {
            state.groups.entry(name.to_owned()).or_default();
        } else if !state.groups.contains_key(name) {
            return Err(not_found(ResourceKind::InstanceGroup, name));
        }
        Ok(InstanceGroup {
            name: name.to_owned(),
            zone: zone.to_owned(),
        })
    }

    fn add_to_group_now(
        &self,
        group: &str,
        zone: &str,
        instances: &[String],
    ) -> Result<Operation, ComputeError> {
        let mut state = lock(&self.state);
        state.record("add_instances_to_group", group);
        let members = state
            .groups
            .get_mut(group)
            .ok_or_else(|| not_found(ResourceKind::InstanceGroup, group))?;
        members.extend(instances.iter().cloned());
        Ok(state.operation(zone))
    }
}

fn image(name: &str) -> Image {
    Image {
        name: name.to_owned(),
        self_link: format!("projects/{PROJECT}/global/images/{name}"),
    }
}

fn ready<'a, T: Send + 'a>(result: Result<T, ComputeError>) -> ComputeFuture<'a, T> {
    Box::pin(std::future::ready(result))
}

impl ComputeApi for FakeCompute {
    fn get_instance<'a>(&'a self, name: &'a str, _zone: &'a str) -> ComputeFuture<'a, Instance> {
        ready(self.get_instance_now(name))
    }

    fn create_instance<'a>(&'a self, spec: &'a InstanceSpec) -> ComputeFuture<'a, Instance> {
        ready(self.create_instance_now(spec))
    }

    fn delete_instance<'a>(
        &'a self,
        name: &'a str,
        zone: &'a str,
    ) -> ComputeFuture<'a, Operation> {
        ready(self.delete_instance_now(name, zone))
    }

    fn start_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        ready(self.set_status("start_instance", name, zone))
    }

    fn stop_instance<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        ready(self.set_status("stop_instance", name, zone))
    }

    fn get_operation<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        ready(Ok(self.get_operation_now(name, zone)))
    }

    fn get_disk<'a>(&'a self, name: &'a str, _zone: &'a str) -> ComputeFuture<'a, Disk> {
        ready(self.get_disk_now(name))
    }

    fn create_disk<'a>(&'a self, spec: &'a DiskSpec) -> ComputeFuture<'a, Disk> {
        ready(self.create_disk_now(spec))
    }

    fn delete_disk<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, Operation> {
        ready(self.delete_disk_now(name, zone))
    }

    fn get_image<'a>(&'a self, name: &'a str, project: &'a str) -> ComputeFuture<'a, Image> {
        ready(self.lookup_image("get_image", name, project))
    }

    fn get_image_from_family<'a>(
        &'a self,
        family: &'a str,
        project: &'a str,
    ) -> ComputeFuture<'a, Image> {
        ready(self.lookup_image("get_image_from_family", family, project))
    }

    fn get_address<'a>(
        &'a self,
        address_or_name: &'a str,
        _region: &'a str,
    ) -> ComputeFuture<'a, Address> {
        ready(self.get_address_now(address_or_name))
    }

    fn get_disk_type<'a>(&'a self, name: &'a str, zone: &'a str) -> ComputeFuture<'a, DiskType> {
        ready(self.get_disk_type_now(name, zone))
    }

    fn get_instance_group<'a>(
        &'a self,
        name: &'a str,
        zone: &'a str,
    ) -> ComputeFuture<'a, InstanceGroup> {
        ready(self.group_now("get_instance_group", name, zone))
    }

    fn create_instance_group<'a>(
        &'a self,
        spec: &'a InstanceGroupSpec,
    ) -> ComputeFuture<'a, InstanceGroup> {
        ready(self.group_now("create_instance_group", &spec.name, &spec.zone))
    }

    fn add_instances_to_group<'a>(
        &'a self,
        group: &'a str,
        zone: &'a str,
        instances: &'a [String],
    ) -> ComputeFuture<'a, Operation> {
        ready(self.add_to_group_now(group, zone, instances))
    }
}

/// Hands out a shared [`FakeCompute`] and counts connections.
pub struct CountingConnector {
    compute: Arc<FakeCompute>,
    connects: AtomicU32,
}

impl Connector for CountingConnector {
    fn connect(&self, _config: &ZoneConfig) -> Result<Arc<dyn ComputeApi>, ComputeError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let compute: Arc<dyn ComputeApi> = self.compute.clone();
        Ok(compute)
    }
}

/// Captures UI lines for assertions.
#[derive(Debug, Default)]
pub struct RecordingUi {
    lines: Mutex<Vec<String>>,
}

impl RecordingUi {
    /// Every line written so far.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        lock(&self.lines).clone()
    }

    /// Reports whether any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        lock(&self.lines).iter().any(|line| line.contains(needle))
    }
}

impl Ui for RecordingUi {
    fn info(&self, message: &str) {
        lock(&self.lines).push(message.to_owned());
    }

    fn warn(&self, message: &str) {
        lock(&self.lines).push(format!("warning: {message}"));
    }

    fn error(&self, message: &str) {
        lock(&self.lines).push(format!("error: {message}"));
    }
}

/// Communicator that reports the guest ready after a fixed number of probes.
#[derive(Debug)]
pub struct ScriptedGuest {
    ready_after: u32,
    probes: AtomicU32,
    interrupt: Mutex<Option<(InterruptFlag, u32)>>,
}

impl ScriptedGuest {
    /// Guest that reports ready from its `ready_after`-th probe on.
    #[must_use]
    pub fn new(ready_after: u32) -> Self {
        Self {
            ready_after,
            probes: AtomicU32::new(0),
            interrupt: Mutex::new(None),
        }
    }

    /// Probes made so far.
    #[must_use]
    pub fn probes(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Raises `flag` on the `probes`-th probe.
    pub fn interrupt_after_probes(&self, flag: &InterruptFlag, probes: u32) {
        *lock(&self.interrupt) = Some((flag.clone(), probes));
    }
}

impl Communicator for ScriptedGuest {
    fn ready<'a>(&'a self, _ssh: &'a SshInfo) -> GuestFuture<'a, bool> {
        let made = self.probes.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        if let Some((flag, after)) = lock(&self.interrupt).as_ref()
            && made >= *after
        {
            flag.set();
        }
        Box::pin(std::future::ready(Ok(made >= self.ready_after)))
    }
}

/// Records guest hook invocations as `"<hook> <machine>"` together with the
/// SSH endpoint each hook was handed.
#[derive(Debug, Default)]
pub struct RecordingHooks {
    calls: Mutex<Vec<String>>,
    endpoints: Mutex<Vec<Option<SshInfo>>>,
}

impl RecordingHooks {
    /// Hook invocations, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// SSH endpoints passed to the hooks, oldest first.
    #[must_use]
    pub fn endpoints(&self) -> Vec<Option<SshInfo>> {
        lock(&self.endpoints).clone()
    }

    fn push(&self, hook: &str, machine: &str, ssh: Option<&SshInfo>) -> GuestFuture<'_, ()> {
        lock(&self.calls).push(format!("{hook} {machine}"));
        lock(&self.endpoints).push(ssh.cloned());
        Box::pin(std::future::ready(Ok(())))
    }
}

impl GuestHooks for RecordingHooks {
    fn provision<'a>(&'a self, machine: &'a str, ssh: Option<&'a SshInfo>) -> GuestFuture<'a, ()> {
        self.push("provision", machine, ssh)
    }

    fn sync_folders<'a>(
        &'a self,
        machine: &'a str,
        ssh: Option<&'a SshInfo>,
    ) -> GuestFuture<'a, ()> {
        self.push("sync_folders", machine, ssh)
    }
}

/// Fakes wired into a context for the `default` machine.
pub struct Harness {
    /// Remote platform.
    pub compute: Arc<FakeCompute>,
    /// Identity storage.
    pub store: Arc<MemoryIdentityStore>,
    /// Captured progress output.
    pub ui: Arc<RecordingUi>,
    /// Guest readiness probe.
    pub guest: Arc<ScriptedGuest>,
    /// Guest hooks.
    pub hooks: Arc<RecordingHooks>,
    connector: Arc<CountingConnector>,
    confirm: bool,
    config: Arc<FinalizedConfig>,
}

impl Harness {
    /// Harness with default settings and no identity.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Starts customising a harness.
    #[must_use]
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }

    /// Fresh context whose machine identity is loaded from [`Self::store`].
    ///
    /// # Panics
    ///
    /// Panics when the in-memory store fails, which it never does.
    #[must_use]
    pub fn context(&self) -> Context {
        let machine = Machine::load("default", self.store.clone())
            .unwrap_or_else(|err| panic!("memory store failed: {err}"));
        let collaborators = Collaborators {
            ui: self.ui.clone(),
            connector: self.connector.clone(),
            communicator: self.guest.clone(),
            hooks: self.hooks.clone(),
            confirmer: Arc::new(FixedConfirmer(self.confirm)),
        };
        let mut ctx = Context::new(
            collaborators,
            Arc::clone(&self.config),
            machine,
            InterruptFlag::new(),
        );
        ctx.poll_interval = Duration::from_millis(1);
        ctx
    }

    /// The finalized configuration of the default zone.
    #[must_use]
    pub fn zone_config(&self) -> ZoneConfig {
        self.config.active().clone()
    }

    /// Number of compute connections made so far.
    #[must_use]
    pub fn connects(&self) -> u32 {
        self.connector.connects.load(Ordering::SeqCst)
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`Harness`].
pub struct HarnessBuilder {
    settings: MachineSettings,
    confirm: bool,
    machine_id: Option<String>,
    guest_ready_after: u32,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            settings: MachineSettings {
                project_id: Some(PROJECT.to_owned()),
                name: Some(String::from("vm")),
                image: Some(String::from("debian-12")),
                ..MachineSettings::default()
            },
            confirm: true,
            machine_id: None,
            guest_ready_after: 1,
        }
    }
}

impl HarnessBuilder {
    /// Adjusts the base machine settings.
    #[must_use]
    pub fn configure(mut self, adjust: impl FnOnce(&mut MachineSettings)) -> Self {
        adjust(&mut self.settings);
        self
    }

    /// Answer given to destroy confirmations.
    #[must_use]
    pub const fn confirm(mut self, answer: bool) -> Self {
        self.confirm = answer;
        self
    }

    /// Pre-populates the machine identity.
    #[must_use]
    pub fn machine_id(mut self, id: &str) -> Self {
        self.machine_id = Some(id.to_owned());
        self
    }

    /// Number of probes before the guest reports ready.
    #[must_use]
    pub const fn guest_ready_after(mut self, probes: u32) -> Self {
        self.guest_ready_after = probes;
        self
    }

    /// Builds the harness.
    ///
    /// # Panics
    ///
    /// Panics when the in-memory store fails, which it never does.
    #[must_use]
    pub fn build(self) -> Harness {
        let config = ProviderConfig {
            settings: self.settings,
            ..ProviderConfig::default()
        }
        .finalize();
        let store = Arc::new(MemoryIdentityStore::new());
        if let Some(id) = &self.machine_id {
            crate::identity::IdentityStore::save(store.as_ref(), "default", id)
                .unwrap_or_else(|err| panic!("memory store failed: {err}"));
        }
        let compute = Arc::new(FakeCompute::with_defaults());
        Harness {
            connector: Arc::new(CountingConnector {
                compute: Arc::clone(&compute),
                connects: AtomicU32::new(0),
            }),
            compute,
            store,
            ui: Arc::new(RecordingUi::default()),
            guest: Arc::new(ScriptedGuest::new(self.guest_ready_after)),
            hooks: Arc::new(RecordingHooks::default()),
            confirm: self.confirm,
            config: Arc::new(config),
        }
    }
}
