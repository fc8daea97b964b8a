//! Runtime state carried across the re-exec boundary.
//!
//! The parent cannot hand Rust values to a freshly exec'd child, so the
//! resolved run parameters travel as environment variables. The argument
//! list is JSON-encoded so arguments containing whitespace survive intact.

use std::ffi::OsString;
use std::path::PathBuf;

use burrow_common::constants::{ENV_ARGS, ENV_BUNDLE_DIR, ENV_HOSTNAME, ENV_WORKING_DIR};
use burrow_common::error::{BurrowError, Result, ResultExt};

/// The resolved parameters of one container run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeState {
    /// Directory holding `config.json` and the root filesystem.
    pub bundle_dir: PathBuf,
    /// Hostname to set inside the container; empty leaves it unchanged.
    pub hostname: String,
    /// Target argument vector; `args[0]` is the binary to execute.
    pub args: Vec<String>,
    /// Environment of the target, `KEY=VALUE` entries.
    pub env: Vec<String>,
    /// Working directory inside the container; empty leaves it at `/`.
    pub working_dir: String,
}

impl RuntimeState {
    /// Renders the transferable fields as environment variable pairs.
    ///
    /// The target environment is not transferred; the child reloads it
    /// from the bundle. The bundle directory is passed as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the argument list cannot be encoded.
    pub fn to_env(&self) -> Result<Vec<(String, OsString)>> {
        Ok(vec![
            (
                ENV_BUNDLE_DIR.to_string(),
                self.bundle_dir.as_os_str().to_owned(),
            ),
            (ENV_HOSTNAME.to_string(), self.hostname.clone().into()),
            (ENV_ARGS.to_string(), encode_args(&self.args)?.into()),
            (ENV_WORKING_DIR.to_string(), self.working_dir.clone().into()),
        ])
    }
}

/// Overrides read back on the child side of the re-exec.
///
/// Empty or absent optional values mean "keep what the bundle says".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredState {
    /// Bundle directory; always present.
    pub bundle_dir: PathBuf,
    /// Hostname override.
    pub hostname: Option<String>,
    /// Argument list override.
    pub args: Option<Vec<String>>,
    /// Working directory override.
    pub working_dir: Option<String>,
}

impl TransferredState {
    /// Reads the transferred state from the process environment.
    ///
    /// # Errors
    ///
    /// See [`Self::from_lookup`].
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var_os(key))
    }

    /// Reads the transferred state through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`BurrowError::NotFound`] if the bundle directory is missing,
    /// a configuration error if a text value is not UTF-8, or a serialization
    /// error if the argument list is not a JSON string array.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<OsString>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        let text = |key: &str| {
            non_empty(key)
                .map(|v| {
                    v.into_string().map_err(|_| BurrowError::Config {
                        message: format!("{key} is not valid UTF-8"),
                    })
                })
                .transpose()
        };

        let bundle_dir = non_empty(ENV_BUNDLE_DIR).ok_or_else(|| BurrowError::NotFound {
            kind: "bundle directory",
            id: ENV_BUNDLE_DIR.to_string(),
        })?;
        let args = text(ENV_ARGS)?
            .map(|raw| decode_args(&raw))
            .transpose()
            .context("decode transferred arguments")?;

        Ok(Self {
            bundle_dir: PathBuf::from(bundle_dir),
            hostname: text(ENV_HOSTNAME)?,
            args,
            working_dir: text(ENV_WORKING_DIR)?,
        })
    }
}

/// Encodes an argument list as a JSON array.
///
/// # Errors
///
/// Returns a serialization error if encoding fails.
pub fn encode_args(args: &[String]) -> Result<String> {
    Ok(serde_json::to_string(args)?)
}

/// Decodes a JSON array produced by [`encode_args`].
///
/// # Errors
///
/// Returns a serialization error if `raw` is not a JSON array of strings.
pub fn decode_args(raw: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(raw)?)
}
