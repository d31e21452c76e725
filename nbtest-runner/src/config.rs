// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for nbtest.

use crate::{
    command::CommandSpec,
    errors::{ConfigParseError, ProfileNotFound},
    reporter::FailureOutput,
    selection::SamplingPolicy,
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::{
    collections::{BTreeSet, HashMap},
    time::Duration,
};

/// Overall configuration for nbtest.
///
/// This is the root data structure for nbtest configuration. Most configuration is managed
/// through [profiles](NbtestProfile), obtained through the [`profile`](Self::profile) method.
#[derive(Clone, Debug)]
pub struct NbtestConfig {
    workspace_root: Utf8PathBuf,
    inner: NbtestConfigImpl,
}

impl NbtestConfig {
    /// The default location of the config within the path: `.config/nbtest.toml`, used to read
    /// the config from the given directory.
    pub const CONFIG_PATH: &'static str = ".config/nbtest.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// The name of the default profile.
    pub const DEFAULT_PROFILE: &'static str = "default";

    /// Reads the nbtest config from the given file, or if not specified from
    /// `.config/nbtest.toml` in the workspace root.
    ///
    /// If no config file is specified and the workspace root doesn't have `.config/nbtest.toml`,
    /// uses the default config options.
    pub fn from_sources(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let workspace_root = workspace_root.into();
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        let inner = Self::build_and_deserialize_config(builder)
            .map_err(|err| ConfigParseError::new(config_file, err))?;
        Ok(Self {
            workspace_root,
            inner,
        })
    }

    /// Reads the nbtest config from a TOML string layered on top of the default config.
    ///
    /// `config_file` is only used for error reporting.
    pub fn from_toml_str(
        workspace_root: impl Into<Utf8PathBuf>,
        config_file: impl Into<Utf8PathBuf>,
        contents: &str,
    ) -> Result<Self, ConfigParseError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(contents, FileFormat::Toml));
        let inner = Self::build_and_deserialize_config(builder)
            .map_err(|err| ConfigParseError::new(config_file, err))?;
        Ok(Self {
            workspace_root: workspace_root.into(),
            inner,
        })
    }

    /// Returns the default nbtest config.
    pub fn default_config(workspace_root: impl Into<Utf8PathBuf>) -> Self {
        let inner = Self::build_and_deserialize_config(Self::make_default_config())
            .expect("default config is always valid");
        Self {
            workspace_root: workspace_root.into(),
            inner,
        }
    }

    /// Returns the workspace root that relative paths in the config are resolved against.
    pub fn workspace_root(&self) -> &Utf8Path {
        &self.workspace_root
    }

    /// Returns the profile with the given name, or an error if a profile was specified but not
    /// found.
    pub fn profile(&self, name: impl AsRef<str>) -> Result<NbtestProfile<'_>, ProfileNotFound> {
        let custom_profile = self.inner.profiles.get(name.as_ref())?;
        Ok(NbtestProfile {
            name: name.as_ref().to_owned(),
            workspace_root: &self.workspace_root,
            default_profile: &self.inner.profiles.default,
            custom_profile,
        })
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: ConfigBuilder<DefaultState>,
    ) -> Result<NbtestConfigImpl, ConfigError> {
        builder.build()?.try_deserialize()
    }
}

/// A configuration profile for nbtest.
///
/// Returned by [`NbtestConfig::profile`].
#[derive(Clone, Debug)]
pub struct NbtestProfile<'cfg> {
    name: String,
    workspace_root: &'cfg Utf8Path,
    default_profile: &'cfg DefaultProfileImpl,
    custom_profile: Option<&'cfg CustomProfileImpl>,
}

impl<'cfg> NbtestProfile<'cfg> {
    /// Returns the name of this profile.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the absolute directory notebooks are discovered in.
    pub fn notebook_dir(&self) -> Utf8PathBuf {
        let dir = self
            .custom_profile
            .and_then(|profile| profile.notebook_dir.as_deref())
            .unwrap_or(&self.default_profile.notebook_dir);
        self.workspace_root.join(dir)
    }

    /// Returns the fixed ignore list.
    pub fn ignore(&self) -> BTreeSet<String> {
        self.custom_profile
            .and_then(|profile| profile.ignore.as_ref())
            .unwrap_or(&self.default_profile.ignore)
            .iter()
            .cloned()
            .collect()
    }

    /// Returns the number of notebooks to skip at random.
    pub fn random_exclusions(&self) -> usize {
        self.custom_profile
            .and_then(|profile| profile.random_exclusions)
            .unwrap_or(self.default_profile.random_exclusions)
    }

    /// Returns how random exclusions are drawn.
    pub fn sampling(&self) -> SamplingPolicy {
        self.custom_profile
            .and_then(|profile| profile.sampling)
            .unwrap_or(self.default_profile.sampling)
    }

    /// Returns the configured seed for random exclusions, if any.
    pub fn seed(&self) -> Option<u64> {
        self.custom_profile
            .and_then(|profile| profile.seed)
            .or(self.default_profile.seed)
    }

    /// Returns the per-notebook timeout.
    pub fn timeout(&self) -> Duration {
        self.custom_profile
            .and_then(|profile| profile.timeout)
            .unwrap_or(self.default_profile.timeout)
    }

    /// Returns the Jupyter kernel name.
    pub fn kernel(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.kernel.as_deref())
            .unwrap_or(&self.default_profile.kernel)
    }

    /// Returns the configured notebook command, or `None` to use the default `jupyter nbconvert`
    /// command.
    pub fn command(&self) -> Option<&'cfg CommandSpec> {
        self.custom_profile
            .and_then(|profile| profile.command.as_ref())
            .or(self.default_profile.command.as_ref())
    }

    /// Returns the number of notebooks to run at the same time. Always at least 1.
    pub fn jobs(&self) -> usize {
        self.custom_profile
            .and_then(|profile| profile.jobs)
            .unwrap_or(self.default_profile.jobs)
            .max(1)
    }

    /// Returns the fail-fast config for this profile.
    pub fn fail_fast(&self) -> bool {
        self.custom_profile
            .and_then(|profile| profile.fail_fast)
            .unwrap_or(self.default_profile.fail_fast)
    }

    /// Returns the failure output config for this profile.
    pub fn failure_output(&self) -> FailureOutput {
        self.custom_profile
            .and_then(|profile| profile.failure_output)
            .unwrap_or(self.default_profile.failure_output)
    }

    /// Returns the JUnit configuration for this profile.
    pub fn junit(&self) -> Option<NbtestJunitConfig<'cfg>> {
        let path = self
            .custom_profile
            .and_then(|profile| profile.junit.path.as_deref())
            .or(self.default_profile.junit.path.as_deref());

        path.map(|path| NbtestJunitConfig {
            path: self.workspace_root.join(path),
            report_name: self.junit_report_name(),
        })
    }

    /// Returns the name of the JUnit report, used even if no JUnit path is configured.
    pub fn junit_report_name(&self) -> &'cfg str {
        self.custom_profile
            .and_then(|profile| profile.junit.report_name.as_deref())
            .unwrap_or(&self.default_profile.junit.report_name)
    }
}

/// JUnit configuration for nbtest, returned by an [`NbtestProfile`].
#[derive(Clone, Debug)]
pub struct NbtestJunitConfig<'cfg> {
    path: Utf8PathBuf,
    report_name: &'cfg str,
}

impl<'cfg> NbtestJunitConfig<'cfg> {
    /// Creates a JUnit config writing to `path`.
    pub fn new(path: impl Into<Utf8PathBuf>, report_name: &'cfg str) -> Self {
        Self {
            path: path.into(),
            report_name,
        }
    }

    /// Returns the absolute path to the JUnit report.
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Returns the name of the JUnit report.
    pub fn report_name(&self) -> &'cfg str {
        self.report_name
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NbtestConfigImpl {
    #[serde(rename = "profile")]
    profiles: NbtestProfilesImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct NbtestProfilesImpl {
    default: DefaultProfileImpl,
    #[serde(flatten)]
    other: HashMap<String, CustomProfileImpl>,
}

impl NbtestProfilesImpl {
    fn get(&self, profile: &str) -> Result<Option<&CustomProfileImpl>, ProfileNotFound> {
        let custom_profile = match profile {
            NbtestConfig::DEFAULT_PROFILE => None,
            other => Some(
                self.other
                    .get(other)
                    .ok_or_else(|| ProfileNotFound::new(profile, self.all_profiles()))?,
            ),
        };
        Ok(custom_profile)
    }

    fn all_profiles(&self) -> impl Iterator<Item = &str> {
        self.other
            .keys()
            .map(|key| key.as_str())
            .chain(std::iter::once(NbtestConfig::DEFAULT_PROFILE))
    }
}

// Arrays in the embedded default config are merged index by index with user arrays, so list
// settings (`ignore`, `command`) have no value there and default in code instead.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultProfileImpl {
    notebook_dir: Utf8PathBuf,
    #[serde(default)]
    ignore: Vec<String>,
    random_exclusions: usize,
    sampling: SamplingPolicy,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(with = "humantime_serde")]
    timeout: Duration,
    kernel: String,
    #[serde(default)]
    command: Option<CommandSpec>,
    jobs: usize,
    fail_fast: bool,
    failure_output: FailureOutput,
    junit: DefaultJunitImpl,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct DefaultJunitImpl {
    #[serde(default)]
    path: Option<Utf8PathBuf>,
    report_name: String,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CustomProfileImpl {
    #[serde(default)]
    notebook_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    ignore: Option<Vec<String>>,
    #[serde(default)]
    random_exclusions: Option<usize>,
    #[serde(default)]
    sampling: Option<SamplingPolicy>,
    #[serde(default)]
    seed: Option<u64>,
    #[serde(default, with = "humantime_serde::option")]
    timeout: Option<Duration>,
    #[serde(default)]
    kernel: Option<String>,
    #[serde(default)]
    command: Option<CommandSpec>,
    #[serde(default)]
    jobs: Option<usize>,
    #[serde(default)]
    fail_fast: Option<bool>,
    #[serde(default)]
    failure_output: Option<FailureOutput>,
    #[serde(default)]
    junit: JunitImpl,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct JunitImpl {
    #[serde(default)]
    path: Option<Utf8PathBuf>,
    #[serde(default)]
    report_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn parse(contents: &str) -> NbtestConfig {
        NbtestConfig::from_toml_str("/fake/root", "/fake/root/.config/nbtest.toml", contents)
            .expect("config is valid")
    }

    #[test]
    fn default_config_is_valid() {
        let config = NbtestConfig::default_config("/fake/root");
        let profile = config
            .profile(NbtestConfig::DEFAULT_PROFILE)
            .expect("default profile should exist");

        assert_eq!(profile.notebook_dir(), "/fake/root/notebooks");
        assert!(profile.ignore().is_empty());
        assert_eq!(profile.random_exclusions(), 0);
        assert_eq!(profile.sampling(), SamplingPolicy::WithoutReplacement);
        assert_eq!(profile.seed(), None);
        assert_eq!(profile.timeout(), Duration::from_secs(600));
        assert_eq!(profile.kernel(), "python3");
        assert_eq!(profile.command(), None);
        assert_eq!(profile.jobs(), 1);
        assert!(!profile.fail_fast());
        assert_eq!(profile.failure_output(), FailureOutput::Immediate);
        assert!(profile.junit().is_none());
    }

    #[test]
    fn ci_profile_falls_back_to_default() {
        let config = parse(indoc! {r#"
            [profile.default]
            notebook-dir = "tutorials"
            ignore = ["6-1-SIP_inversion_3D.ipynb", "5-DC_inversion_3D.ipynb"]
            timeout = "40m"

            [profile.ci]
            random-exclusions = 3
            sampling = "with-replacement"
            seed = 7
            command = "run-notebook {notebook}"

            [profile.ci.junit]
            path = "target/nbtest/junit.xml"
        "#});

        let default = config.profile("default").expect("default profile exists");
        assert_eq!(default.notebook_dir(), "/fake/root/tutorials");
        assert_eq!(default.random_exclusions(), 0);
        assert!(default.junit().is_none());

        let ci = config.profile("ci").expect("ci profile exists");
        assert_eq!(ci.name(), "ci");
        assert_eq!(ci.notebook_dir(), "/fake/root/tutorials");
        assert_eq!(
            ci.ignore().into_iter().collect::<Vec<_>>(),
            vec!["5-DC_inversion_3D.ipynb", "6-1-SIP_inversion_3D.ipynb"]
        );
        assert_eq!(ci.random_exclusions(), 3);
        assert_eq!(ci.sampling(), SamplingPolicy::WithReplacement);
        assert_eq!(ci.seed(), Some(7));
        assert_eq!(ci.timeout(), Duration::from_secs(40 * 60));
        assert_eq!(
            ci.command(),
            Some(&CommandSpec::String("run-notebook {notebook}".to_owned()))
        );

        let junit = ci.junit().expect("junit is configured");
        assert_eq!(junit.path(), "/fake/root/target/nbtest/junit.xml");
        assert_eq!(junit.report_name(), "nbtest-run");
    }

    #[test]
    fn user_command_replaces_default() {
        let config = parse(indoc! {r#"
            [profile.default]
            command = ["sh", "-c", "true"]
        "#});
        let profile = config.profile("default").expect("default profile exists");
        assert_eq!(
            profile.command(),
            Some(&CommandSpec::Args(vec![
                "sh".to_owned(),
                "-c".to_owned(),
                "true".to_owned()
            ]))
        );
    }

    #[test_case(0, 1 ; "zero is clamped")]
    #[test_case(4, 4 ; "explicit")]
    fn jobs(configured: usize, expected: usize) {
        let config = parse(&format!("[profile.default]\njobs = {configured}\n"));
        let profile = config.profile("default").expect("default profile exists");
        assert_eq!(profile.jobs(), expected);
    }

    #[test]
    fn profile_not_found() {
        let config = parse(indoc! {r#"
            [profile.ci]
            fail-fast = true
        "#});
        let err = config.profile("nightly").expect_err("nightly isn't defined");
        assert_eq!(
            err.to_string(),
            "profile `nightly` not found (known profiles: ci, default)"
        );
    }

    #[test_case(
        indoc! {r#"
            [profile.default]
            sampling = "sometimes"
        "#}
        ; "unknown sampling policy"
    )]
    #[test_case(
        indoc! {r#"
            [profile.default]
            timeout = "forever"
        "#}
        ; "invalid timeout"
    )]
    #[test_case(
        indoc! {r#"
            [profile.ci]
            failure-output = "sometimes"
        "#}
        ; "invalid failure output in custom profile"
    )]
    fn parse_errors(contents: &str) {
        let err = NbtestConfig::from_toml_str("/fake/root", "nbtest.toml", contents)
            .expect_err("config is invalid");
        assert_eq!(err.config_file(), "nbtest.toml");
    }

    #[test]
    fn reads_config_from_workspace_root() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_dir = dir.path().join(".config");
        std::fs::create_dir_all(&config_dir).expect("created .config");
        std::fs::write(
            config_dir.join("nbtest.toml"),
            "[profile.default]\nkernel = \"julia-1.10\"\n",
        )
        .expect("wrote config");

        let config = NbtestConfig::from_sources(dir.path(), None).expect("config is valid");
        let profile = config.profile("default").expect("default profile exists");
        assert_eq!(profile.kernel(), "julia-1.10");
        assert_eq!(profile.notebook_dir(), dir.path().join("notebooks"));
    }

    #[test]
    fn missing_explicit_config_file_is_an_error() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let missing = dir.path().join("missing.toml");
        let err = NbtestConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("explicit config file must exist");
        assert_eq!(err.config_file(), &missing);
    }
}
