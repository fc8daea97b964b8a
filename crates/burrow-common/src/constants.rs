//! System-wide constants and default paths.

/// Application name used in CLI output and cgroup paths.
pub const APP_NAME: &str = "burrow";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "burrow";

/// First argument that dispatches a re-executed runtime to the init entry point.
pub const INIT_SENTINEL: &str = "container-init";

/// Environment variable carrying the bundle directory to the init process.
pub const ENV_BUNDLE_DIR: &str = "BURROW_BUNDLE_DIR";
/// Environment variable carrying the resolved hostname to the init process.
pub const ENV_HOSTNAME: &str = "BURROW_HOSTNAME";
/// Environment variable carrying the JSON-encoded argument list to the init process.
pub const ENV_ARGS: &str = "BURROW_ARGS";
/// Environment variable carrying the working directory to the init process.
pub const ENV_WORKING_DIR: &str = "BURROW_WORKING_DIR";

/// Bundle configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Staging directory inside the new root that receives the old root during `pivot_root`.
pub const OLD_ROOT_DIR: &str = ".old_root";

/// `PATH` supplied to the target when the bundle defines no environment.
pub const DEFAULT_PATH_ENV: &str = "PATH=/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Cgroups v2 unified hierarchy mount points probed before scanning the mount table.
pub const CGROUP_V2_CANDIDATES: [&str; 2] = ["/sys/fs/cgroup", "/sys/fs/cgroup/unified"];

/// Mount table scanned when no candidate matches.
pub const PROC_MOUNTS: &str = "/proc/mounts";

/// Directory under the cgroup v2 mount holding one group per container.
pub const CGROUP_PREFIX: &str = "burrow";

/// Controllers enabled on the parent group's `cgroup.subtree_control`.
pub const REQUIRED_CONTROLLERS: [&str; 3] = ["cpu", "memory", "pids"];

/// CPU period in microseconds used when a quota is set without one.
pub const DEFAULT_CPU_PERIOD_US: u64 = 100_000;

/// Stack size for the short-lived clone child that re-executes the runtime.
pub const REEXEC_STACK_SIZE: usize = 1024 * 1024;
