// Copyright (c) The nbtest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output: colors, clap styles and the stderr logger.

use clap::{
    Args, ValueEnum,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use owo_colors::{OwoColorize, Style, style};
use std::{fmt, sync::Once};
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
    level_filters::LevelFilter,
    warn,
};
use tracing_subscriber::{
    Layer,
    filter::Targets,
    fmt::{FmtContext, FormatEvent, FormatFields, format},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Events logged with this target are printed as is, without a `level:` prefix.
pub(crate) const NO_HEADING_TARGET: &str = "nbtest::no_heading";

const LOG_ENV: &str = "NBTEST_LOG";

/// Targets that `--verbose` turns debug logging on for.
const VERBOSE_TARGETS: &[&str] = &["nbtest", "nbtest_runner"];

/// Cargo's help palette.
pub(crate) const fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .usage(AnsiColor::Green.on_default().effects(Effects::BOLD))
        .literal(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default().effects(Effects::BOLD))
        .valid(AnsiColor::Cyan.on_default().effects(Effects::BOLD))
        .invalid(AnsiColor::Yellow.on_default().effects(Effects::BOLD))
}

#[derive(Copy, Clone, Debug, Args)]
#[must_use]
pub(crate) struct OutputOpts {
    /// Verbose output: more detail in notebook lists, and debug logging
    #[arg(long, short, global = true, env = "NBTEST_VERBOSE")]
    pub(crate) verbose: bool,

    /// Produce color output: auto, always, never
    #[arg(
        long,
        value_enum,
        default_value_t,
        hide_possible_values = true,
        global = true,
        value_name = "WHEN",
        env = "NBTEST_COLOR"
    )]
    pub(crate) color: Color,
}

impl OutputOpts {
    /// Installs the stderr logger. Only the first call has an effect.
    pub(crate) fn init(self) -> OutputContext {
        static INIT_LOGGER: Once = Once::new();

        let cx = OutputContext {
            verbose: self.verbose,
            color: self.color,
        };
        INIT_LOGGER.call_once(|| cx.install_logger());
        cx
    }
}

/// Output settings for an `nbtest` invocation.
#[derive(Copy, Clone, Debug)]
#[must_use]
pub struct OutputContext {
    pub(crate) verbose: bool,
    pub(crate) color: Color,
}

impl OutputContext {
    /// Returns general stderr styles for the current output context.
    pub fn stderr_styles(&self) -> StderrStyles {
        if self.color.should_colorize(supports_color::Stream::Stderr) {
            StderrStyles {
                bold: style().bold(),
                warning_text: style().yellow(),
            }
        } else {
            StderrStyles::default()
        }
    }

    fn install_logger(self) {
        let (targets, invalid_env) = self.log_targets();
        let formatter = LevelPrefixFormat {
            colorize: self.color.should_colorize(supports_color::Stream::Stderr),
        };

        let layer = tracing_subscriber::fmt::layer()
            .event_format(formatter)
            .with_writer(std::io::stderr)
            .with_filter(targets);
        tracing_subscriber::registry().with(layer).init();

        if let Some((value, error)) = invalid_env {
            warn!("ignoring invalid {LOG_ENV} `{value}`: {error}");
        }
    }

    /// `NBTEST_LOG` wins if it's set and valid. Otherwise everything logs at info, and nbtest's
    /// own crates at debug under `--verbose`.
    fn log_targets(self) -> (Targets, Option<(String, String)>) {
        let mut default = Targets::new().with_default(LevelFilter::INFO);
        if self.verbose {
            default = default.with_targets(
                VERBOSE_TARGETS
                    .iter()
                    .map(|target| (*target, LevelFilter::DEBUG)),
            );
        }

        match std::env::var(LOG_ENV) {
            Ok(value) if !value.is_empty() => match value.parse::<Targets>() {
                Ok(targets) => (targets, None),
                Err(error) => (default, Some((value, error.to_string()))),
            },
            _ => (default, None),
        }
    }
}

/// When to produce colored output.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
#[must_use]
pub enum Color {
    /// Color output if the stream is a terminal that supports it.
    #[default]
    Auto,
    /// Always color output.
    Always,
    /// Never color output.
    Never,
}

impl Color {
    pub(crate) fn should_colorize(self, stream: supports_color::Stream) -> bool {
        match self {
            Color::Auto => supports_color::on_cached(stream).is_some(),
            Color::Always => true,
            Color::Never => false,
        }
    }
}

/// Formats events as `level: message key=value ...`.
struct LevelPrefixFormat {
    colorize: bool,
}

impl LevelPrefixFormat {
    fn prefix(&self, level: Level) -> (&'static str, Style) {
        let (label, colored) = match level {
            Level::ERROR => ("error", style().red().bold()),
            Level::WARN => ("warning", style().yellow().bold()),
            Level::INFO => ("info", style().bold()),
            Level::DEBUG => ("debug", style().bold()),
            Level::TRACE => ("trace", style().dimmed()),
        };
        (label, if self.colorize { colored } else { style() })
    }
}

impl<S, N> FormatEvent<S, N> for LevelPrefixFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let metadata = event.metadata();
        if metadata.target() != NO_HEADING_TARGET {
            let (label, style) = self.prefix(*metadata.level());
            write!(writer, "{}: ", label.style(style))?;
        }

        let mut fields = FieldWriter {
            writer: &mut writer,
            result: Ok(()),
        };
        event.record(&mut fields);
        fields.result?;

        writeln!(writer)
    }
}

struct FieldWriter<'a, 'writer> {
    writer: &'a mut format::Writer<'writer>,
    result: fmt::Result,
}

impl Visit for FieldWriter<'_, '_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if self.result.is_err() {
            return;
        }
        self.result = match field.name() {
            "message" => write!(self.writer, "{value:?}"),
            name => write!(self.writer, " {name}={value:?}"),
        };
    }
}

/// Styles for error messages printed to stderr.
#[derive(Debug, Default)]
pub struct StderrStyles {
    pub(crate) bold: Style,
    pub(crate) warning_text: Style,
}
