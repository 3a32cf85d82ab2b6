// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{
    env,
    io::IsTerminal,
    sync::{Arc, Mutex, Once},
};

use bon::Builder;
use once_cell::sync::{Lazy, OnceCell};
use serde::{Deserialize, Deserializer, Serialize, de};
use smart_default::SmartDefault;
use snafu::{ResultExt, Snafu};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, filter,
    layer::{Layered, SubscriberExt},
    reload,
};

/// Deserializes a string value, using `Default::default()` if the string is
/// empty.
///
/// Lets configuration treat a missing value and an empty string the same way.
///
/// # Errors
/// Returns an error if deserialization fails.
pub fn empty_string_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let s = String::deserialize(deserializer)?;
    if s.is_empty() {
        Ok(T::default())
    } else {
        T::deserialize(de::value::StrDeserializer::new(&s)).map_err(|e: de::value::Error| {
            de::Error::custom(format!("invalid value, expect empty string, err: {e}"))
        })
    }
}

/// The default directory name for log files when file logging is enabled.
pub const DEFAULT_LOGGING_DIR: &str = "logs";

/// Default log level filter when neither `LoggingOptions::level` nor
/// `RUST_LOG` is set.
const DEFAULT_LOG_TARGETS: &str = "info";

/// Handle for changing the log filter at runtime.
///
/// Only available after [`init_global_logging`] succeeded.
pub static RELOAD_HANDLE: OnceCell<reload::Handle<filter::Targets, Registry>> = OnceCell::new();

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoggingError {
    #[snafu(display("Invalid log level filter '{level}'"))]
    InvalidLevel {
        level:  String,
        source: filter::ParseError,
    },

    #[snafu(display("Failed to initialize rolling file appender at {dir}"))]
    RollingAppender {
        dir:    String,
        source: tracing_appender::rolling::InitError,
    },

    #[snafu(display("Failed to bridge log records into tracing"))]
    LogBridge {
        source: tracing_log::log::SetLoggerError,
    },

    #[snafu(display("Global tracing subscriber is already set"))]
    GlobalSubscriber {
        source: tracing::subscriber::SetGlobalDefaultError,
    },

    #[snafu(display("Logging is already initialized"))]
    AlreadyInitialized,
}

/// Configuration options for the logging system.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, SmartDefault, Builder)]
#[serde(default)]
pub struct LoggingOptions {
    /// Directory for hourly rotated log files. Empty disables file logging.
    #[default = ""]
    #[builder(default)]
    pub dir: String,

    /// Log level filter string such as "info" or "warn,qfile_storage_queue=debug".
    ///
    /// Falls back to `RUST_LOG`, then to "info".
    pub level: Option<String>,

    #[serde(default, deserialize_with = "empty_string_as_default")]
    #[builder(default)]
    pub log_format: LogFormat,

    /// Maximum number of rotated log files to retain.
    #[default = 720]
    #[builder(default = 720)]
    pub max_log_files: usize,

    /// Also write logs to stdout.
    #[default = true]
    #[builder(default = true)]
    pub append_stdout: bool,
}

/// Available log output formats.
#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, Default, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per event, for log aggregation.
    Json,

    /// Human-readable text.
    ///
    /// ```text
    /// 2024-01-01T12:00:00.123Z  INFO qfile_storage_queue::queue_file: Queue file opened
    /// ```
    #[default]
    Text,
}

/// Initialize logging for unit and integration tests.
///
/// Logs go to files under `UNITTEST_LOG_DIR` (default
/// "/tmp/__unittest_logs") at `UNITTEST_LOG_LEVEL` (default "debug"). Safe to
/// call from every test; only the first call has an effect.
pub fn init_default_ut_logging() {
    static START: Once = Once::new();

    START.call_once(|| {
        let dir =
            env::var("UNITTEST_LOG_DIR").unwrap_or_else(|_| "/tmp/__unittest_logs".to_string());
        let level = env::var("UNITTEST_LOG_LEVEL").unwrap_or_else(|_| "debug".to_string());

        let opts = LoggingOptions {
            dir: dir.clone(),
            level: Some(level),
            append_stdout: false,
            ..Default::default()
        };

        match init_global_logging("unittest", &opts) {
            Ok(guards) => {
                if let Ok(mut g) = GLOBAL_UT_LOG_GUARD.as_ref().lock() {
                    *g = Some(guards);
                }
                tracing::info!("logs dir = {}", dir);
            }
            Err(e) => eprintln!("unit test logging disabled: {e}"),
        }
    });
}

/// Keeps the unit test worker guards alive for the whole test binary.
static GLOBAL_UT_LOG_GUARD: Lazy<Arc<Mutex<Option<Vec<WorkerGuard>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// Registry with the reloadable level filter applied.
type FilteredRegistry = Layered<reload::Layer<filter::Targets, Registry>, Registry>;

type BoxedLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync>;

fn build_fmt_layer<W>(writer: W, format: LogFormat, ansi: bool) -> BoxedLayer
where
    W: for<'w> tracing_subscriber::fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => tracing_subscriber::fmt::Layer::new()
            .json()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Text => tracing_subscriber::fmt::Layer::new()
            .with_writer(writer)
            .with_ansi(ansi)
            .boxed(),
    }
}

/// Installs the global tracing subscriber.
///
/// Layers, depending on `opts`:
///
/// - **Stdout**: if `append_stdout` is true
/// - **File**: hourly rotated `{app_name}.*` files in `dir`
/// - **Error file**: error-only `{app_name}-err.*` files in `dir`
///
/// The returned guards flush the non-blocking writers on drop and must be
/// kept alive for as long as logging is needed.
///
/// # Errors
///
/// Fails on an invalid level filter, an unusable log directory, or when a
/// global subscriber is already installed.
pub fn init_global_logging(
    app_name: &str,
    opts: &LoggingOptions,
) -> Result<Vec<WorkerGuard>, LoggingError> {
    if RELOAD_HANDLE.get().is_some() {
        return AlreadyInitializedSnafu.fail();
    }
    let mut guards = vec![];
    let mut layers: Vec<BoxedLayer> = vec![];

    let level = opts
        .level
        .clone()
        .or_else(|| env::var(EnvFilter::DEFAULT_ENV).ok())
        .unwrap_or_else(|| DEFAULT_LOG_TARGETS.to_string());
    let filter = level
        .parse::<filter::Targets>()
        .context(InvalidLevelSnafu { level: &level })?;

    if opts.append_stdout {
        let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());
        guards.push(guard);
        layers.push(build_fmt_layer(
            writer,
            opts.log_format,
            std::io::stdout().is_terminal(),
        ));
    }

    if !opts.dir.is_empty() {
        let appender = |prefix: String| {
            RollingFileAppender::builder()
                .rotation(Rotation::HOURLY)
                .filename_prefix(prefix)
                .max_log_files(opts.max_log_files)
                .build(&opts.dir)
                .context(RollingAppenderSnafu { dir: &opts.dir })
        };

        let (writer, guard) = tracing_appender::non_blocking(appender(app_name.to_string())?);
        guards.push(guard);
        layers.push(build_fmt_layer(writer, opts.log_format, false));

        let (writer, guard) = tracing_appender::non_blocking(appender(format!("{app_name}-err"))?);
        guards.push(guard);
        layers.push(
            build_fmt_layer(writer, opts.log_format, false)
                .with_filter(filter::LevelFilter::ERROR)
                .boxed(),
        );
    }

    let (dyn_filter, reload_handle) = reload::Layer::new(filter);
    let subscriber = Registry::default().with(dyn_filter).with(layers);

    tracing::subscriber::set_global_default(subscriber).context(GlobalSubscriberSnafu)?;
    LogTracer::init().context(LogBridgeSnafu)?;

    if RELOAD_HANDLE.set(reload_handle).is_err() {
        return AlreadyInitializedSnafu.fail();
    }

    Ok(guards)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = LoggingOptions::default();
        assert!(opts.dir.is_empty());
        assert_eq!(opts.level, None);
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.max_log_files, 720);
        assert!(opts.append_stdout);
    }

    #[test]
    fn test_builder_matches_default() {
        let opts = LoggingOptions::builder().build();
        assert_eq!(opts, LoggingOptions::default());

        let opts = LoggingOptions::builder()
            .level("debug".to_string())
            .log_format(LogFormat::Json)
            .build();
        assert_eq!(opts.level.as_deref(), Some("debug"));
        assert_eq!(opts.log_format, LogFormat::Json);
    }

    #[test]
    fn test_deserialize_empty_format_as_default() {
        let opts: LoggingOptions =
            serde_json::from_str(r#"{"log_format": "", "level": "warn"}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Text);
        assert_eq!(opts.level.as_deref(), Some("warn"));
        assert_eq!(opts.max_log_files, 720);

        let opts: LoggingOptions = serde_json::from_str(r#"{"log_format": "json"}"#).unwrap();
        assert_eq!(opts.log_format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_level_is_reported() {
        let opts = LoggingOptions {
            level: Some("info,qfile=loud".to_string()),
            append_stdout: false,
            ..Default::default()
        };
        let err = init_global_logging("test", &opts).unwrap_err();
        assert!(matches!(err, LoggingError::InvalidLevel { .. }));
    }
}
