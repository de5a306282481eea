// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts},
};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use owo_colors::{OwoColorize, Style};
use std::{io::Write, sync::Arc};
use tongs_metadata::TongsExitCode;
use tongs_runner::{
    config::{RetryQuota, TongsConfig},
    device::ConfiguredDeviceProvider,
    executor::CommandExecutor,
    pool::{Pool, PoolLoader},
    reporter::{JunitSink, Summary, SummaryDisplayer},
    runner::{RunnerSettings, TongsRunner},
    test_case::TestSuite,
};
use tracing::{debug, warn};

/// Distributes a test suite across pools of devices.
#[derive(Debug, Parser)]
#[command(name = "tongs", version)]
pub struct TongsApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl TongsApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the process exit code.
    pub fn exec(self, output: OutputContext) -> Result<i32> {
        match self.command {
            Command::Run(opts) => opts.exec(output),
            Command::ShowPools(opts) => opts.exec_show_pools(output),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a test suite on every configured device pool
    Run(RunOpts),

    /// Show the device pools a run would use
    ShowPools(ConfigOpts),
}

#[derive(Debug, Args)]
struct ConfigOpts {
    /// Config file [default: .config/tongs.toml under the root]
    #[arg(long, value_name = "PATH")]
    config: Option<Utf8PathBuf>,

    /// Directory to look for the repository config in
    #[arg(long, value_name = "DIR", default_value = ".")]
    root: Utf8PathBuf,
}

impl ConfigOpts {
    fn load(&self) -> Result<TongsConfig> {
        let config = TongsConfig::from_sources(self.config.as_deref(), &self.root)?;
        debug!("loaded config: {config:?}");
        Ok(config)
    }

    fn exec_show_pools(&self, output: OutputContext) -> Result<i32> {
        let config = self.load()?;
        let pools = load_pools(&config)?;

        let bold = output.emphasis(supports_color::Stream::Stdout);
        write_pools(&pools, bold, &mut std::io::stdout().lock())
            .map_err(|err| ExpectedError::WriteOutput { err })?;
        Ok(TongsExitCode::OK)
    }
}

fn load_pools(config: &TongsConfig) -> Result<Vec<Pool>> {
    let provider = ConfiguredDeviceProvider::new(config.devices().iter().cloned());
    Ok(PoolLoader::new(config.pooling().clone()).load_from(&provider)?)
}

fn write_pools(pools: &[Pool], bold: Style, writer: &mut dyn Write) -> std::io::Result<()> {
    for pool in pools {
        writeln!(writer, "{}:", pool.name().style(bold))?;
        for device in pool.devices() {
            writeln!(writer, "    {}", device.long_name())?;
        }
    }
    Ok(())
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    config_opts: ConfigOpts,

    /// JSON list of test cases to run
    #[arg(long, value_name = "PATH")]
    test_list: Utf8PathBuf,

    /// Command template to run each test with [default: from config]
    ///
    /// `{serial}`, `{class}`, `{method}` and `{attempt}` are substituted in each word.
    #[arg(long, value_name = "TEMPLATE")]
    command: Option<String>,

    /// Number of retries allowed per test case [default: from config]
    #[arg(long, value_name = "N")]
    retries: Option<usize>,

    /// Number of retries allowed across the whole run [default: from config]
    #[arg(long, value_name = "N")]
    total_retries: Option<usize>,

    /// Retry failed tests on a different device when possible
    #[arg(long)]
    retry_on_other_device: bool,

    /// Write a JUnit XML report to this path
    #[arg(long, value_name = "PATH")]
    junit: Option<Utf8PathBuf>,

    /// Write a JSON summary to this path
    #[arg(long, value_name = "PATH")]
    summary_json: Option<Utf8PathBuf>,

    /// Exit successfully even if tests failed
    #[arg(long)]
    ignore_failures: bool,
}

impl RunOpts {
    fn exec(self, output: OutputContext) -> Result<i32> {
        let config = self.config_opts.load()?;

        let quota = config.retry_quota();
        let mut settings = RunnerSettings::from_config(&config);
        settings.set_retry_quota(RetryQuota::new(
            self.retries.unwrap_or(quota.per_test_case),
            self.total_retries.unwrap_or(quota.total),
        ));
        if self.retry_on_other_device {
            settings.set_retry_on_other_device(true);
        }

        let pools = load_pools(&config)?;
        let suite = TestSuite::from_path(&self.test_list)?;
        let command = self
            .command
            .clone()
            .or_else(|| config.executor().command.clone())
            .ok_or(ExpectedError::NoExecutorCommand)?;
        let executor = CommandExecutor::new(&command)
            .map_err(|err| ExpectedError::ExecutorCommandParse { command, err })?;

        let runner = TongsRunner::new(pools, suite, Arc::new(executor), settings)?;
        let summary = runner.run()?;

        let mut displayer = SummaryDisplayer::new();
        if output.color.should_colorize(supports_color::Stream::Stdout) {
            displayer.colorize();
        }
        displayer
            .write_summary(&summary, std::io::stdout().lock())
            .map_err(|err| ExpectedError::WriteOutput { err })?;

        let reports = config.reports();
        write_reports(
            &summary,
            self.junit.as_deref().or(reports.junit.as_deref()),
            self.summary_json
                .as_deref()
                .or(reports.summary_json.as_deref()),
        )?;

        if summary.is_success() {
            Ok(TongsExitCode::OK)
        } else if self.ignore_failures {
            warn!("test run failed, exiting successfully because of --ignore-failures");
            Ok(TongsExitCode::OK)
        } else {
            Err(ExpectedError::TestRunFailed)
        }
    }
}

fn write_reports(
    summary: &Summary,
    junit: Option<&Utf8Path>,
    summary_json: Option<&Utf8Path>,
) -> Result<()> {
    if let Some(path) = junit {
        JunitSink::new(path).write(summary)?;
    }
    if let Some(path) = summary_json {
        summary.write_json(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Color;
    use camino_tempfile::Utf8TempDir;
    use indoc::{formatdoc, indoc};
    use pretty_assertions::assert_eq;
    use tongs_runner::{device::Device, pool::PoolName};

    #[test]
    fn parse_run() {
        let app = TongsApp::try_parse_from([
            "tongs",
            "run",
            "--test-list",
            "tests.json",
            "--retries",
            "2",
            "--ignore-failures",
            "--color",
            "never",
        ])
        .unwrap();

        assert_eq!(app.output.color, Color::Never);
        let Command::Run(opts) = app.command else {
            panic!("expected run command");
        };
        assert_eq!(opts.test_list, "tests.json");
        assert_eq!(opts.retries, Some(2));
        assert_eq!(opts.total_retries, None);
        assert!(opts.ignore_failures);
        assert_eq!(opts.config_opts.root, ".");
    }

    #[test]
    fn run_requires_test_list() {
        TongsApp::try_parse_from(["tongs", "run"]).unwrap_err();
    }

    #[test]
    fn show_pools_output() {
        let pools = [
            Pool::new(
                PoolName::new("api-30"),
                vec![Device::new("emulator-5554", 30).with_model("Pixel 4")],
            )
            .unwrap(),
        ];
        let mut out = Vec::new();
        write_pools(&pools, Style::new(), &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            format!("api-30:\n    {}\n", pools[0].devices()[0].long_name()),
        );
    }

    #[cfg(unix)]
    fn run_in(dir: &Utf8Path, command: &str, extra_args: &[&str]) -> Result<i32> {
        std::fs::write(
            dir.join("tongs.toml"),
            formatdoc! {r#"
                [run]
                poll-timeout = "50ms"
                test-output-timeout = "10s"

                [executor]
                command = "{command}"

                [[devices]]
                serial = "emulator-5554"
                api-level = 33

                [[devices]]
                serial = "emulator-5556"
                api-level = 33
            "#},
        )
        .unwrap();
        std::fs::write(
            dir.join("tests.json"),
            indoc! {r#"
                [
                    {"class": "com.example.LoginTest", "method": "logsIn"},
                    {"class": "com.example.LoginTest", "method": "logsOut"},
                    {"class": "com.example.LoginTest", "method": "skipped", "ignored": true}
                ]
            "#},
        )
        .unwrap();

        let config = dir.join("tongs.toml");
        let test_list = dir.join("tests.json");
        let mut args = vec![
            "tongs",
            "run",
            "--config",
            config.as_str(),
            "--test-list",
            test_list.as_str(),
            "--color",
            "never",
        ];
        args.extend_from_slice(extra_args);
        let app = TongsApp::try_parse_from(args).unwrap();
        app.exec(OutputContext {
            color: Color::Never,
        })
    }

    #[cfg(unix)]
    #[test]
    fn run_passing_suite() {
        let dir = Utf8TempDir::new().unwrap();
        let summary_path = dir.path().join("out/summary.json");
        let code = run_in(
            dir.path(),
            "true",
            &["--summary-json", summary_path.as_str()],
        )
        .unwrap();
        assert_eq!(code, TongsExitCode::OK);

        let summary: tongs_metadata::RunSummarySerialized =
            serde_json::from_str(&std::fs::read_to_string(&summary_path).unwrap()).unwrap();
        assert!(summary.success);
        assert_eq!(summary.pools["default"].passed, 2);
        assert_eq!(summary.pools["default"].ignored.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn run_failing_suite() {
        let dir = Utf8TempDir::new().unwrap();
        let err = run_in(dir.path(), "false", &["--retries", "0"]).unwrap_err();
        assert_eq!(err.process_exit_code(), TongsExitCode::TEST_RUN_FAILED);

        let code = run_in(dir.path(), "false", &["--retries", "0", "--ignore-failures"]).unwrap();
        assert_eq!(code, TongsExitCode::OK);
    }
}
