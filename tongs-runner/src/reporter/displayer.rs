// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolSummary, Summary, TestCaseRunResult, TestStatus};
use owo_colors::{OwoColorize, Style};
use std::io::{self, Write};

/// Prints a human-readable [`Summary`].
#[derive(Debug, Default)]
pub struct SummaryDisplayer {
    styles: Styles,
}

impl SummaryDisplayer {
    /// Creates a new displayer with no colors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Colorizes output.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Writes the summary to `writer`.
    pub fn write_summary(&self, summary: &Summary, mut writer: impl Write) -> io::Result<()> {
        let style = if summary.is_success() {
            self.styles.pass
        } else {
            self.styles.fail
        };
        write!(
            writer,
            "{:>12} [{:>9.3}s] ",
            "Summary".style(style),
            summary.elapsed().as_secs_f64(),
        )?;
        writeln!(
            writer,
            "{} {}, {} passed ({} flaky), {} failed, {} ignored, {} fatal {}",
            summary.total_attempts().style(self.styles.count),
            plural(summary.total_attempts(), "attempt", "attempts"),
            summary.passed_count().style(self.styles.count),
            summary.flaky_count().style(self.styles.count),
            summary.failed().count().style(self.styles.count),
            summary.ignored().count().style(self.styles.count),
            summary.fatal_crashes().count().style(self.styles.count),
            plural(summary.fatal_crashes().count(), "crash", "crashes"),
        )?;

        for pool in summary.pools() {
            self.write_pool(pool, &mut writer)?;
        }
        Ok(())
    }

    fn write_pool(&self, pool: &PoolSummary, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(
            writer,
            "{:>12} {} ({} {}): {} passed, {} flaky, {} failed, {} ignored",
            "Pool".style(self.styles.bold),
            pool.name().style(self.styles.bold),
            pool.devices().len(),
            plural(pool.devices().len(), "device", "devices"),
            pool.passed().len(),
            pool.flaky().count(),
            pool.failed().len(),
            pool.ignored().len(),
        )?;

        for result in pool.flaky() {
            writeln!(
                writer,
                "{:>12} [{}] {} ({} {})",
                "FLAKY".style(self.styles.skip),
                result.device_name(),
                result.test_case.style(self.styles.bold),
                pool.failure_count(&result.test_case),
                plural(pool.failure_count(&result.test_case), "failure", "failures"),
            )?;
        }
        for result in pool.ignored() {
            writeln!(
                writer,
                "{:>12} [{}] {}",
                status_label(result.status).style(self.styles.skip),
                result.device_name(),
                result.test_case.style(self.styles.bold),
            )?;
        }
        for result in pool.failed().iter().chain(pool.fatal_crashes()) {
            let label = if result.attempt == 0 {
                "CRASH"
            } else {
                status_label(result.status)
            };
            writeln!(
                writer,
                "{:>12} [{}] {} ({} {})",
                label.style(self.styles.fail),
                result.device_name(),
                result.test_case.style(self.styles.bold),
                pool.failure_count(&result.test_case),
                plural(pool.failure_count(&result.test_case), "failure", "failures"),
            )?;
            write_trace(result, writer)?;
        }
        Ok(())
    }
}

fn status_label(status: TestStatus) -> &'static str {
    match status {
        TestStatus::Pass => "PASS",
        TestStatus::Fail => "FAIL",
        TestStatus::Error => "ERROR",
        TestStatus::Ignored => "IGNORED",
        TestStatus::AssumptionFailed => "ASSUMPTION",
    }
}

fn write_trace(result: &TestCaseRunResult, writer: &mut dyn Write) -> io::Result<()> {
    if let Some(trace) = &result.trace {
        for line in trace.lines() {
            writeln!(writer, "{:>12} {line}", "")?;
        }
    }
    Ok(())
}

fn plural<'a>(count: usize, singular: &'a str, plural: &'a str) -> &'a str {
    if count == 1 { singular } else { plural }
}

#[derive(Debug, Default)]
struct Styles {
    bold: Style,
    count: Style,
    pass: Style,
    fail: Style,
    skip: Style,
}

impl Styles {
    fn colorize(&mut self) {
        self.bold = Style::new().bold();
        self.count = Style::new().bold();
        self.pass = Style::new().green().bold();
        self.fail = Style::new().red().bold();
        self.skip = Style::new().yellow().bold();
    }
}
