//! The container process orchestrator.
//!
//! A [`ContainerProcess`] holds everything resolved for one run and drives
//! it through the isolation steps. When a PID namespace is requested the
//! runtime re-executes itself as the namespace's first process and
//! supervises it; otherwise the initialization sequence runs in-process and
//! ends by replacing the runtime with the target.
//!
//! Every run switches root, so every run gets its own mount namespace,
//! whether or not the bundle lists one.

use std::convert::Infallible;
use std::path::{Path, PathBuf};

use burrow_common::config::BundleConfig;
use burrow_common::error::{BurrowError, Result, ResultExt};
use burrow_common::outcome::{Outcome, Warning};
use burrow_common::types::{ContainerId, ResourceLimits, ResourceStats, RunPhase};
use burrow_core::cgroup::CgroupManager;
use burrow_core::filesystem::{
    RootfsManager, isolate_mount_propagation, provision_baseline_mounts,
};
use burrow_core::namespace::{NamespaceKind, NamespaceSet, create_namespaces, set_hostname};
use burrow_core::syscall::{HostSyscalls, Syscalls};

use crate::process::{self, HostLauncher, Launcher};
use crate::state::RuntimeState;

/// What the supervising side observed once the container exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Exit code of the container, `128 + signal` if it was killed.
    pub exit_code: i32,
    /// Cgroup usage read after exit, if a cgroup was in use.
    pub stats: Option<ResourceStats>,
    /// Best-effort failures along the way.
    pub warnings: Vec<Warning>,
}

/// One container run, from resolved configuration to exec.
#[derive(Debug)]
pub struct ContainerProcess {
    id: ContainerId,
    config: BundleConfig,
    state: RuntimeState,
    namespaces: NamespaceSet,
    limits: ResourceLimits,
    cgroup: Option<CgroupManager>,
    phase: RunPhase,
}

impl ContainerProcess {
    /// Builds a run from a loaded bundle, taking every setting from it.
    #[must_use]
    pub fn new(id: ContainerId, bundle_dir: impl Into<PathBuf>, config: BundleConfig) -> Self {
        let state = RuntimeState {
            bundle_dir: bundle_dir.into(),
            hostname: config.hostname.clone(),
            args: config.process.args.clone(),
            env: config.process.env.clone(),
            working_dir: config.process.cwd.clone(),
        };
        let mut namespaces = NamespaceSet::from_names(config.namespace_types());
        if !namespaces.contains(NamespaceKind::Mount) {
            tracing::debug!("bundle lists no mount namespace, adding one for the root switch");
            namespaces.insert(NamespaceKind::Mount);
        }
        let limits = config.linux.resources.to_limits();
        Self {
            id,
            config,
            state,
            namespaces,
            limits,
            cgroup: None,
            phase: RunPhase::Configured,
        }
    }

    /// Replaces the hostname.
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.state.hostname = hostname.into();
        self
    }

    /// Replaces the target argument vector.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.state.args = args;
        self
    }

    /// Replaces the working directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        self.state.working_dir = dir.into();
        self
    }

    /// Overrides resource limits field by field; zero fields keep the bundle's value.
    #[must_use]
    pub fn with_limit_overrides(mut self, overrides: ResourceLimits) -> Self {
        self.limits = self.limits.overridden_by(overrides);
        self
    }

    /// Drops one namespace from the requested set.
    ///
    /// The mount namespace is never dropped: the root switch needs it.
    #[must_use]
    pub fn without_namespace(mut self, kind: NamespaceKind) -> Self {
        if kind == NamespaceKind::Mount {
            tracing::warn!("mount namespace is required and cannot be dropped");
            return self;
        }
        self.namespaces.remove(kind);
        self
    }

    /// Container identifier.
    #[must_use]
    pub const fn id(&self) -> &ContainerId {
        &self.id
    }

    /// The state that would be transferred to a re-executed init.
    #[must_use]
    pub const fn runtime_state(&self) -> &RuntimeState {
        &self.state
    }

    /// Namespaces that will be created.
    #[must_use]
    pub const fn namespaces(&self) -> NamespaceSet {
        self.namespaces
    }

    /// Effective resource limits.
    #[must_use]
    pub const fn limits(&self) -> ResourceLimits {
        self.limits
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Whether the run goes through a supervised re-exec into a PID namespace.
    #[must_use]
    pub const fn uses_reexec(&self) -> bool {
        self.namespaces.contains(NamespaceKind::Pid)
    }

    /// Creates the container cgroup and applies the effective limits.
    ///
    /// Does nothing when no limit is set.
    ///
    /// # Errors
    ///
    /// Returns an error if cgroup v2 is unavailable, the group cannot be
    /// created, or a limit cannot be written.
    pub fn setup_cgroups(&mut self) -> Result<Outcome<()>> {
        if self.limits.is_unconstrained() {
            return Ok(Outcome::clean(()));
        }
        let cgroup = CgroupManager::new(self.id.as_str()).context("set up cgroup")?;
        self.setup_cgroup_with(cgroup)
    }

    fn setup_cgroup_with(&mut self, cgroup: CgroupManager) -> Result<Outcome<()>> {
        let outcome = cgroup.setup()?;
        cgroup.apply_limits(&self.limits)?;
        self.cgroup = Some(cgroup);
        Ok(outcome)
    }

    /// Runs the container.
    ///
    /// On the re-exec path this returns once the container has exited. On
    /// the in-process path it only returns on failure: success replaces the
    /// runtime with the target program.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error of whichever path runs.
    pub fn run(mut self) -> Result<RunReport> {
        tracing::info!(id = %self.id, namespaces = %self.namespaces, "creating namespaces");
        if self.uses_reexec() {
            return self.run_reexec(&HostLauncher);
        }
        match self.run_in_process(&HostSyscalls) {
            Ok(never) => match never {},
            Err(e) => Err(e),
        }
    }

    fn run_reexec(&mut self, launcher: &impl Launcher) -> Result<RunReport> {
        let mut warnings = Vec::new();
        let transfer = self.state.to_env()?;
        self.phase = RunPhase::NamespacesRequested;

        let pid = match launcher.spawn(self.namespaces.clone_flags(), &transfer) {
            Ok(pid) => pid,
            Err(e) => {
                self.phase = RunPhase::Failed;
                self.teardown_cgroup(&mut warnings);
                return Err(e).context("start container process");
            }
        };

        if let Some(cgroup) = &self.cgroup {
            if let Err(e) = cgroup.add_process(pid.as_raw().unsigned_abs()) {
                warnings.push(Warning::at("add process to cgroup", cgroup.path(), e));
            }
        }

        let waited = launcher.wait(pid);
        let stats = self.cgroup.as_ref().map(|cg| cg.stats().collect_into(&mut warnings));
        self.teardown_cgroup(&mut warnings);

        match waited {
            Ok(exit_code) => {
                tracing::info!(id = %self.id, exit_code, "container exited");
                Ok(RunReport {
                    exit_code,
                    stats,
                    warnings,
                })
            }
            Err(e) => {
                self.phase = RunPhase::Failed;
                Outcome::with_warnings((), warnings).log();
                Err(e).context("wait for container process")
            }
        }
    }

    fn teardown_cgroup(&mut self, warnings: &mut Vec<Warning>) {
        if let Some(cgroup) = self.cgroup.take() {
            if let Err(e) = cgroup.cleanup() {
                warnings.push(Warning::at("clean up cgroup", cgroup.path(), e));
            }
        }
    }

    fn run_in_process(&mut self, sys: &impl Syscalls) -> Result<Infallible> {
        if !self.limits.is_unconstrained() {
            tracing::warn!(
                id = %self.id,
                "resource limits skipped: no supervising process remains after exec to remove the cgroup"
            );
        }
        self.phase = RunPhase::NamespacesRequested;
        if let Err(e) = create_namespaces(&self.namespaces, sys) {
            self.phase = RunPhase::Failed;
            return Err(e);
        }
        self.init_container(sys)
    }

    /// Runs the initialization sequence in the current process.
    ///
    /// Makes mount propagation private, sets the hostname, switches root,
    /// provisions baseline mounts, applies a read-only root, enters the
    /// working directory and finally executes the target. The caller must
    /// already be in its own mount namespace.
    ///
    /// # Errors
    ///
    /// Returns the first failing step, wrapped with its name. Never returns
    /// `Ok`.
    pub fn init_container(&mut self, sys: &impl Syscalls) -> Result<Infallible> {
        let result = self.init_steps(sys);
        if result.is_err() {
            self.phase = RunPhase::Failed;
        }
        result
    }

    fn init_steps(&mut self, sys: &impl Syscalls) -> Result<Infallible> {
        isolate_mount_propagation(sys)?;
        set_hostname(&self.state.hostname, sys)?;

        let rootfs = self.config.rootfs_path(&self.state.bundle_dir);
        let mut manager = RootfsManager::new(rootfs, self.config.root.readonly, sys);
        let switch = manager.switch_root().context("switch root")?.log();
        tracing::debug!(?switch, "root switched");
        self.phase = RunPhase::RootSwitched;

        provision_baseline_mounts(sys).context("create basic mounts")?;
        manager.apply_readonly()?;
        self.phase = RunPhase::MountsProvisioned;

        enter_working_dir(&self.state.working_dir, sys)?;

        self.phase = RunPhase::Execed;
        process::exec_target(&self.state.args, &self.state.env).context("exec process")
    }
}

fn enter_working_dir(dir: &str, sys: &impl Syscalls) -> Result<()> {
    if dir.is_empty() {
        return Ok(());
    }
    let path = Path::new(dir);
    if !path.is_dir() {
        return Err(BurrowError::NotFound {
            kind: "working directory",
            id: dir.to_string(),
        });
    }
    sys.chdir(path).context("change working directory")
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::ffi::OsString;

    use burrow_common::config::{NamespaceEntry, ProcessConfig, RootConfig};
    use burrow_core::filesystem::MountSpec;
    use nix::sched::CloneFlags;
    use nix::unistd::Pid;

    use super::*;

    /// Records the name of each call; calls starting with `fail` return `EINVAL`.
    struct Recorder {
        calls: RefCell<Vec<String>>,
        unshared: Cell<CloneFlags>,
        fail: Option<&'static str>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                unshared: Cell::new(CloneFlags::empty()),
                fail: None,
            }
        }

        fn failing(prefix: &'static str) -> Self {
            Self {
                fail: Some(prefix),
                ..Self::new()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: impl Into<String>) -> Result<()> {
            let call = call.into();
            let fails = self.fail.is_some_and(|p| call.starts_with(p));
            self.calls.borrow_mut().push(call);
            if fails {
                return Err(BurrowError::syscall(
                    "recorded",
                    std::io::Error::from_raw_os_error(libc::EINVAL),
                ));
            }
            Ok(())
        }
    }

    impl Syscalls for Recorder {
        fn unshare(&self, flags: CloneFlags) -> Result<()> {
            self.unshared.set(flags);
            self.record("unshare")
        }
        fn sethostname(&self, _: &str) -> Result<()> {
            self.record("sethostname")
        }
        fn mount(&self, spec: &MountSpec, _: &Path) -> Result<()> {
            self.record(format!("mount {}", spec.fs_type))
        }
        fn pivot_root(&self, _: &Path, _: &Path) -> Result<()> {
            self.record("pivot_root")
        }
        fn chroot(&self, _: &Path) -> Result<()> {
            self.record("chroot")
        }
        fn chdir(&self, _: &Path) -> Result<()> {
            self.record("chdir")
        }
        fn umount_detach(&self, _: &Path) -> Result<()> {
            self.record("umount")
        }
        fn make_rprivate(&self, _: &Path) -> Result<()> {
            self.record("make_rprivate")
        }
        fn bind_mount(&self, _: &Path, _: &Path) -> Result<()> {
            self.record("bind")
        }
        fn remount_readonly(&self, _: &Path) -> Result<()> {
            self.record("remount_ro")
        }
        fn remove_dir(&self, _: &Path) -> Result<()> {
            self.record("rmdir")
        }
    }

    fn bundle(namespaces: &[&str], args: &[&str]) -> BundleConfig {
        let mut config = BundleConfig {
            oci_version: "1.0.2".into(),
            hostname: "bundle-host".into(),
            process: ProcessConfig {
                args: args.iter().map(ToString::to_string).collect(),
                cwd: "/".into(),
                ..ProcessConfig::default()
            },
            root: RootConfig {
                path: "rootfs".into(),
                readonly: false,
            },
            ..BundleConfig::default()
        };
        config.linux.namespaces = namespaces
            .iter()
            .map(|t| NamespaceEntry {
                ns_type: (*t).to_string(),
            })
            .collect();
        config
    }

    fn process(namespaces: &[&str]) -> ContainerProcess {
        ContainerProcess::new(
            ContainerId::new("test"),
            "/bundles/test",
            bundle(namespaces, &["/bin/sh"]),
        )
    }

    #[test]
    fn pid_namespace_selects_reexec() {
        assert!(process(&["pid", "uts"]).uses_reexec());
        assert!(!process(&["uts", "mount"]).uses_reexec());
    }

    #[test]
    fn overrides_replace_bundle_values() {
        let p = process(&["uts"])
            .with_hostname("override")
            .with_args(vec!["/bin/echo".into(), "hi".into()])
            .with_working_dir("/tmp");
        let state = p.runtime_state();
        assert_eq!(state.hostname, "override");
        assert_eq!(state.args, ["/bin/echo", "hi"]);
        assert_eq!(state.working_dir, "/tmp");
        assert_eq!(state.bundle_dir, PathBuf::from("/bundles/test"));
        assert_eq!(p.phase(), RunPhase::Configured);
    }

    #[test]
    fn host_network_drops_net_namespace() {
        let p = process(&["network", "uts"]).without_namespace(NamespaceKind::Net);
        assert!(!p.namespaces().contains(NamespaceKind::Net));
        assert!(p.namespaces().contains(NamespaceKind::Uts));
    }

    #[test]
    fn unconstrained_run_creates_no_cgroup() {
        let mut p = process(&["pid"]);
        let outcome = p.setup_cgroups().expect("no-op");
        assert!(!outcome.is_degraded());
        assert!(p.cgroup.is_none());
    }

    #[test]
    fn limit_overrides_merge_per_field() {
        let mut config = bundle(&["pid"], &["/bin/sh"]);
        config.linux.resources.memory.limit = 1024;
        config.linux.resources.pids.limit = 10;
        let p = ContainerProcess::new(ContainerId::new("t"), "/b", config).with_limit_overrides(
            ResourceLimits {
                pids: Some(5),
                memory_bytes: Some(0),
                ..ResourceLimits::default()
            },
        );
        assert_eq!(p.limits().memory(), Some(1024));
        assert_eq!(p.limits().pids_max(), Some(5));
    }

    #[test]
    fn cgroup_setup_writes_limits_under_explicit_mount() {
        let root = tempfile::tempdir().expect("tempdir");
        std::fs::write(root.path().join("cgroup.controllers"), "cpu memory pids\n")
            .expect("write");
        let mut p = process(&["pid"]).with_limit_overrides(ResourceLimits {
            pids: Some(7),
            ..ResourceLimits::default()
        });
        let cgroup = CgroupManager::with_mount_point(root.path(), "test").expect("manager");
        p.setup_cgroup_with(cgroup).expect("setup");

        let group = root.path().join("burrow/test");
        assert_eq!(
            std::fs::read_to_string(group.join("pids.max")).expect("read"),
            "7"
        );
        let mut warnings = Vec::new();
        p.teardown_cgroup(&mut warnings);
        assert!(warnings.is_empty());
        assert!(!group.exists());
    }

    #[test]
    fn mount_namespace_is_always_requested() {
        let p = process(&["uts"]);
        assert!(p.namespaces().contains(NamespaceKind::Mount));
        assert!(p.namespaces().clone_flags().contains(CloneFlags::CLONE_NEWNS));

        let p = p.without_namespace(NamespaceKind::Mount);
        assert!(p.namespaces().contains(NamespaceKind::Mount));
    }

    #[test]
    fn missing_rootfs_fails_before_any_mount() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut p = ContainerProcess::new(
            ContainerId::new("t"),
            dir.path(),
            bundle(&["uts", "mount"], &["/bin/true"]),
        );
        let sys = Recorder::new();
        let err = p.run_in_process(&sys).expect_err("rootfs is missing");

        assert!(err.is_not_found());
        assert_eq!(sys.calls(), ["unshare", "make_rprivate", "sethostname"]);
        assert_eq!(p.phase(), RunPhase::Failed);
    }

    #[test]
    fn root_switch_happens_inside_a_private_mount_namespace() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("rootfs")).expect("rootfs");
        let mut p = ContainerProcess::new(
            ContainerId::new("t"),
            dir.path(),
            bundle(&["uts"], &["/bin/true"]),
        );
        let sys = Recorder::failing("mount");
        let err = p.run_in_process(&sys).expect_err("baseline mount fails");

        assert!(err.to_string().starts_with("create basic mounts"));
        assert!(sys.unshared.get().contains(CloneFlags::CLONE_NEWNS | CloneFlags::CLONE_NEWUTS));
        assert_eq!(
            sys.calls(),
            [
                "unshare",
                "make_rprivate",
                "sethostname",
                "bind",
                "pivot_root",
                "chdir",
                "umount",
                "rmdir",
                "mount proc",
            ]
        );
        assert_eq!(p.phase(), RunPhase::Failed);
    }

    // ── Supervised re-exec ──────────────────────────────────────────

    /// Stands in for clone and waitpid; remembers what the cgroup held
    /// while the child was "running".
    struct FakeLauncher {
        spawn_fails: bool,
        wait_fails: bool,
        procs_file: PathBuf,
        procs_at_wait: RefCell<Option<String>>,
        flags: Cell<CloneFlags>,
    }

    impl FakeLauncher {
        fn new(group: &Path) -> Self {
            Self {
                spawn_fails: false,
                wait_fails: false,
                procs_file: group.join("cgroup.procs"),
                procs_at_wait: RefCell::new(None),
                flags: Cell::new(CloneFlags::empty()),
            }
        }
    }

    impl Launcher for FakeLauncher {
        fn spawn(&self, flags: CloneFlags, _: &[(String, OsString)]) -> Result<Pid> {
            self.flags.set(flags);
            if self.spawn_fails {
                return Err(BurrowError::syscall(
                    "clone",
                    std::io::Error::from_raw_os_error(libc::EPERM),
                ));
            }
            Ok(Pid::from_raw(4242))
        }

        fn wait(&self, _: Pid) -> Result<i32> {
            *self.procs_at_wait.borrow_mut() = std::fs::read_to_string(&self.procs_file).ok();
            if self.wait_fails {
                return Err(BurrowError::syscall(
                    "waitpid",
                    std::io::Error::from_raw_os_error(libc::ECHILD),
                ));
            }
            Ok(3)
        }
    }

    /// A PID-namespaced run with a pids limit, its cgroup set up under `root`.
    fn supervised(root: &Path) -> ContainerProcess {
        std::fs::write(root.join("cgroup.controllers"), "cpu memory pids\n").expect("write");
        let mut p = process(&["pid"]).with_limit_overrides(ResourceLimits {
            pids: Some(7),
            ..ResourceLimits::default()
        });
        let cgroup = CgroupManager::with_mount_point(root, "test").expect("manager");
        let _ = p.setup_cgroup_with(cgroup).expect("setup");
        p
    }

    #[test]
    fn supervised_run_attaches_child_and_removes_cgroup() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = root.path().join("burrow/test");
        let mut p = supervised(root.path());
        let launcher = FakeLauncher::new(&group);

        let report = p.run_reexec(&launcher).expect("run");
        assert_eq!(report.exit_code, 3);
        assert_eq!(launcher.procs_at_wait.borrow().as_deref(), Some("4242"));
        assert!(
            launcher
                .flags
                .get()
                .contains(CloneFlags::CLONE_NEWPID | CloneFlags::CLONE_NEWNS)
        );
        assert!(report.stats.is_some());
        let ops: Vec<&str> = report.warnings.iter().map(|w| w.op.as_str()).collect();
        assert_eq!(ops, ["read CPU stats", "read memory stats", "read pids stats"]);
        assert!(!group.exists());
    }

    #[test]
    fn failed_attach_is_a_warning() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = root.path().join("burrow/test");
        std::fs::create_dir_all(group.join("cgroup.procs")).expect("mkdir");
        let mut p = supervised(root.path());
        let launcher = FakeLauncher::new(&group);

        let report = p.run_reexec(&launcher).expect("run");
        assert_eq!(report.exit_code, 3);
        assert!(report.warnings.iter().any(|w| w.op == "add process to cgroup"));
        assert!(!group.exists());
    }

    #[test]
    fn spawn_failure_removes_cgroup_without_waiting() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = root.path().join("burrow/test");
        let mut p = supervised(root.path());
        let launcher = FakeLauncher {
            spawn_fails: true,
            ..FakeLauncher::new(&group)
        };

        let err = p.run_reexec(&launcher).expect_err("spawn fails");
        assert!(err.to_string().starts_with("start container process"));
        assert!(err.is_permission_denied());
        assert!(launcher.procs_at_wait.borrow().is_none());
        assert!(!group.exists());
        assert!(p.cgroup.is_none());
        assert_eq!(p.phase(), RunPhase::Failed);
    }

    #[test]
    fn wait_failure_still_removes_cgroup() {
        let root = tempfile::tempdir().expect("tempdir");
        let group = root.path().join("burrow/test");
        let mut p = supervised(root.path());
        let launcher = FakeLauncher {
            wait_fails: true,
            ..FakeLauncher::new(&group)
        };

        let err = p.run_reexec(&launcher).expect_err("wait fails");
        assert!(err.to_string().starts_with("wait for container process"));
        assert_eq!(launcher.procs_at_wait.borrow().as_deref(), Some("4242"));
        assert!(!group.exists());
        assert!(p.cgroup.is_none());
        assert_eq!(p.phase(), RunPhase::Failed);
    }

    #[test]
    fn missing_working_dir_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("nope");
        let err = enter_working_dir(missing.to_str().expect("utf8"), &HostSyscalls)
            .expect_err("should fail");
        assert!(err.is_not_found());
    }
}
