// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    ExpectedError,
    errors::{Result, current_dir_utf8},
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand, ValueEnum};
use nbtest_metadata::NbtestExitCode;
use nbtest_runner::{
    config::{NbtestConfig, NbtestJunitConfig, NbtestProfile},
    discovery::NotebookDiscovery,
    list::{NotebookList, OutputFormat, SerializableFormat},
    reporter::{FailureOutput, NotebookReporterBuilder},
    runner::NotebookRunnerBuilder,
    selection::{SamplingPolicy, SelectionConfig},
    signal::SignalHandlerKind,
    test_filter::TestFilter,
};
use std::{io::Write, time::Duration};
use tracing::{debug, warn};

/// Runs Jupyter notebooks as integration tests.
///
/// Notebooks are discovered in the profile's notebook directory. A fixed list of notebooks is
/// always skipped, and on top of that a number of notebooks can be skipped at random, from a seed
/// that is printed so that every run can be reproduced.
#[derive(Debug, Parser)]
#[command(
    version,
    bin_name = "nbtest",
    styles = crate::output::cli_styles(),
    max_term_width = 100
)]
pub struct NbtestApp {
    #[clap(flatten)]
    config_opts: ConfigOpts,

    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl NbtestApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code on success.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        let workspace_root = self.config_opts.workspace_root()?;
        let config_file = self
            .config_opts
            .config_file
            .as_deref()
            .map(|file| absolutize(file, &workspace_root));
        let config = NbtestConfig::from_sources(&workspace_root, config_file.as_deref())?;
        let profile = config.profile(&self.config_opts.profile)?;
        debug!(profile = profile.name(), %workspace_root, "loaded config");

        match self.command {
            Command::List {
                selection,
                message_format,
            } => {
                let mut list = selection.make_list(&profile)?;
                if output.color.should_colorize(supports_color::Stream::Stdout) {
                    list.colorize();
                }
                let format = message_format.to_output_format(output.verbose);
                let mut stdout = std::io::stdout().lock();
                list.write(format, &mut stdout)?;
                stdout
                    .flush()
                    .map_err(nbtest_runner::errors::WriteNotebookListError::Io)?;
                Ok(NbtestExitCode::OK)
            }
            Command::Run {
                selection,
                runner_opts,
                reporter_opts,
            } => {
                let list = selection.make_list(&profile)?;

                let mut runner_builder = NotebookRunnerBuilder::from_profile(&profile);
                runner_opts.apply(&mut runner_builder);
                let runner = runner_builder.build(&list, SignalHandlerKind::Standard)?;

                let mut reporter_builder = NotebookReporterBuilder::from_profile(&profile);
                reporter_opts.apply(&mut reporter_builder, &profile);
                let mut reporter = reporter_builder.build(&list);
                if output.color.should_colorize(supports_color::Stream::Stdout) {
                    reporter.colorize();
                }

                let stdout = std::io::stdout();
                let run_stats =
                    runner.try_execute(|event| reporter.report_event(event, stdout.lock()))?;

                if run_stats.initial_run_count == 0 {
                    warn!("no notebooks to run");
                    Ok(NbtestExitCode::NO_NOTEBOOKS_RUN)
                } else if !run_stats.is_success() {
                    Err(ExpectedError::NotebookRunFailed)
                } else {
                    Ok(NbtestExitCode::OK)
                }
            }
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Config options")]
struct ConfigOpts {
    /// Directory that the config and relative notebook directories are resolved against
    /// [default: current directory]
    #[arg(long, global = true, value_name = "DIR", env = "NBTEST_WORKSPACE_ROOT")]
    workspace_root: Option<Utf8PathBuf>,

    /// Config file [default: <workspace-root>/.config/nbtest.toml]
    #[arg(long, global = true, value_name = "PATH")]
    config_file: Option<Utf8PathBuf>,

    /// Nbtest profile to use
    #[arg(
        long,
        short = 'P',
        global = true,
        env = "NBTEST_PROFILE",
        default_value = NbtestConfig::DEFAULT_PROFILE
    )]
    profile: String,
}

impl ConfigOpts {
    fn workspace_root(&self) -> Result<Utf8PathBuf> {
        let current_dir = current_dir_utf8()?;
        Ok(match &self.workspace_root {
            Some(root) => absolutize(root, &current_dir),
            None => current_dir,
        })
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List notebooks, and whether each one would be run or skipped
    ///
    /// Random exclusions are drawn just as they would be for `nbtest run` with the same seed.
    List {
        #[clap(flatten)]
        selection: SelectionOpts,

        /// Output format
        #[arg(
            short = 'T',
            long,
            value_enum,
            default_value_t,
            value_name = "FMT",
            help_heading = "Output options"
        )]
        message_format: MessageFormat,
    },

    /// Run notebooks
    ///
    /// Exits with a non-zero code if any notebook fails, times out or can't be executed.
    Run {
        #[clap(flatten)]
        selection: SelectionOpts,

        #[clap(flatten)]
        runner_opts: RunnerOpts,

        #[clap(flatten)]
        reporter_opts: ReporterOpts,
    },
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Selection options")]
struct SelectionOpts {
    /// Directory to discover notebooks in [default: from profile]
    #[arg(long, value_name = "DIR")]
    notebook_dir: Option<Utf8PathBuf>,

    /// Never run this notebook, in addition to the profile's ignore list (can be repeated)
    #[arg(long = "ignore", value_name = "NAME")]
    ignore: Vec<String>,

    /// Number of additional notebooks to skip at random [default: from profile]
    #[arg(long, value_name = "N")]
    random_exclusions: Option<usize>,

    /// How random exclusions are drawn [default: from profile]
    #[arg(long, value_enum, value_name = "POLICY")]
    sampling: Option<SamplingOpt>,

    /// Seed for random exclusions [default: from profile, or generated]
    #[arg(long, value_name = "SEED", env = "NBTEST_SEED")]
    seed: Option<u64>,

    /// Only run notebooks whose path contains one of these strings
    #[arg(help_heading = None, value_name = "FILTERS")]
    filters: Vec<String>,
}

impl SelectionOpts {
    fn make_list(&self, profile: &NbtestProfile<'_>) -> Result<NotebookList> {
        let notebook_dir = match &self.notebook_dir {
            Some(dir) => absolutize(dir, &current_dir_utf8()?),
            None => profile.notebook_dir(),
        };
        let discovered = NotebookDiscovery::new(notebook_dir).discover()?;

        let mut fixed_ignore = profile.ignore();
        fixed_ignore.extend(self.ignore.iter().cloned());
        let selection = SelectionConfig {
            fixed_ignore,
            random_exclusions: self
                .random_exclusions
                .unwrap_or_else(|| profile.random_exclusions()),
            sampling: self
                .sampling
                .map_or_else(|| profile.sampling(), SamplingPolicy::from),
            seed: self.seed.or_else(|| profile.seed()),
        }
        .select(&discovered)?;

        let filter = TestFilter::new(self.filters.as_slice())?;
        Ok(NotebookList::new(discovered, selection, &filter))
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Runner options")]
struct RunnerOpts {
    /// Number of notebooks to run at the same time [default: from profile]
    #[arg(long, short = 'j', value_name = "JOBS", env = "NBTEST_JOBS")]
    jobs: Option<usize>,

    /// Time after which a notebook is killed, e.g. "40m" [default: from profile]
    #[arg(long, value_name = "DURATION", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Jupyter kernel to execute notebooks with [default: from profile]
    #[arg(long, value_name = "NAME")]
    kernel: Option<String>,

    /// Cancel the run on the first failure
    #[arg(long, overrides_with = "no_fail_fast")]
    fail_fast: bool,

    /// Run all notebooks regardless of failure
    #[arg(long, overrides_with = "fail_fast")]
    no_fail_fast: bool,
}

impl RunnerOpts {
    fn apply(&self, builder: &mut NotebookRunnerBuilder) {
        if let Some(jobs) = self.jobs {
            builder.set_jobs(jobs);
        }
        if let Some(timeout) = self.timeout {
            builder.set_timeout(timeout);
        }
        if let Some(kernel) = &self.kernel {
            builder.set_kernel(kernel.clone());
        }
        if self.no_fail_fast {
            builder.set_fail_fast(false);
        } else if self.fail_fast {
            builder.set_fail_fast(true);
        }
    }
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Reporter options")]
struct ReporterOpts {
    /// When to output the stdout, stderr and tracebacks of failing notebooks
    #[arg(long, value_enum, value_name = "WHEN", env = "NBTEST_FAILURE_OUTPUT")]
    failure_output: Option<FailureOutputOpt>,

    /// Write a JUnit report to this path [default: from profile]
    #[arg(long, value_name = "PATH")]
    junit: Option<Utf8PathBuf>,
}

impl ReporterOpts {
    fn apply<'cfg>(
        &self,
        builder: &mut NotebookReporterBuilder<'cfg>,
        profile: &NbtestProfile<'cfg>,
    ) {
        if let Some(failure_output) = self.failure_output {
            builder.set_failure_output(failure_output.into());
        }
        if let Some(junit) = &self.junit {
            builder.set_junit(NbtestJunitConfig::new(
                junit.clone(),
                profile.junit_report_name(),
            ));
        }
    }
}

#[derive(Copy, Clone, Debug, Default, ValueEnum)]
enum MessageFormat {
    /// A human-readable output format
    #[default]
    Human,
    /// JSON with no whitespace
    Json,
    /// Prettified JSON
    JsonPretty,
}

impl MessageFormat {
    fn to_output_format(self, verbose: bool) -> OutputFormat {
        match self {
            Self::Human => OutputFormat::Human { verbose },
            Self::Json => OutputFormat::Serializable(SerializableFormat::Json),
            Self::JsonPretty => OutputFormat::Serializable(SerializableFormat::JsonPretty),
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum SamplingOpt {
    /// Every draw is independent; the same notebook may be drawn twice
    WithReplacement,
    /// Exactly the requested number of distinct notebooks is skipped
    WithoutReplacement,
}

impl From<SamplingOpt> for SamplingPolicy {
    fn from(opt: SamplingOpt) -> Self {
        match opt {
            SamplingOpt::WithReplacement => SamplingPolicy::WithReplacement,
            SamplingOpt::WithoutReplacement => SamplingPolicy::WithoutReplacement,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum FailureOutputOpt {
    Immediate,
    Final,
    Never,
}

impl From<FailureOutputOpt> for FailureOutput {
    fn from(opt: FailureOutputOpt) -> Self {
        match opt {
            FailureOutputOpt::Immediate => FailureOutput::Immediate,
            FailureOutputOpt::Final => FailureOutput::Final,
            FailureOutputOpt::Never => FailureOutput::Never,
        }
    }
}

/// Notebook commands run with the notebook's directory as their working directory, so paths
/// given on the command line must not stay relative.
fn absolutize(path: &Utf8Path, base: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_app() {
        NbtestApp::command().debug_assert();
    }

    #[test]
    fn parse_args() {
        let valid: &[&str] = &[
            "nbtest list",
            "nbtest list --message-format json-pretty",
            "nbtest list -T json --seed 42 --random-exclusions 3",
            "nbtest list --ignore 5-DC_inversion_3D.ipynb --ignore 8-IP_inversion_3D.ipynb",
            "nbtest list --sampling with-replacement inversion",
            "nbtest --workspace-root /tmp list --notebook-dir notebooks",
            "nbtest list --profile ci --config-file nbtest.toml",
            "nbtest run",
            "nbtest run -j 4 --timeout 40m --kernel python3",
            "nbtest run --fail-fast --no-fail-fast",
            "nbtest run --failure-output final --junit target/junit.xml",
            "nbtest run --color always -v mag grav",
        ];
        let invalid: &[&str] = &[
            "nbtest",
            "nbtest list --message-format xml",
            "nbtest list --sampling sometimes",
            "nbtest list --seed -1",
            "nbtest run --timeout forever",
            "nbtest run --failure-output sometimes",
            "nbtest list --jobs 4",
        ];

        for args in valid {
            if let Err(error) = NbtestApp::try_parse_from(args.split_whitespace()) {
                panic!("{args} should have parsed successfully, but errored: {error}");
            }
        }
        for args in invalid {
            if NbtestApp::try_parse_from(args.split_whitespace()).is_ok() {
                panic!("{args} should have errored, but parsed successfully");
            }
        }
    }

    #[test]
    fn fail_fast_overrides() {
        let app = NbtestApp::try_parse_from(["nbtest", "run", "--fail-fast", "--no-fail-fast"])
            .expect("valid args");
        let Command::Run { runner_opts, .. } = app.command else {
            panic!("expected run command");
        };
        assert!(runner_opts.no_fail_fast);
        assert!(!runner_opts.fail_fast);
    }

    #[test]
    fn absolutize_paths() {
        assert_eq!(
            absolutize(Utf8Path::new("notebooks"), Utf8Path::new("/ws")),
            "/ws/notebooks"
        );
        assert_eq!(
            absolutize(Utf8Path::new("/data/notebooks"), Utf8Path::new("/ws")),
            "/data/notebooks"
        );
    }
}
