use colorful::Colorful;
use indenter::indented;

use std::fmt::Write;
use std::{
    fs::create_dir_all,
    path::{Path, PathBuf},
};
use tracing_subscriber::layer::SubscriberExt;

use crate::error::{VramError, VramResult};

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: tracing::Level,
    pub logging_enabled: bool,
    pub logger_name: String,
    /// When set, an hourly rolling log file is written here as well.
    pub log_dir: Option<PathBuf>,
    pub _tracing_guard: Option<std::sync::Arc<tracing::subscriber::DefaultGuard>>,
}

impl LoggingConfig {
    pub fn new() -> Self {
        Default::default()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: tracing::Level::INFO,
            logging_enabled: true,
            logger_name: "llm_vram".to_string(),
            log_dir: None,
            _tracing_guard: None,
        }
    }
}

impl LoggingConfig {
    pub fn load_logger(&mut self) -> VramResult<()> {
        self._tracing_guard = if self.logging_enabled {
            Some(std::sync::Arc::new(self.create_logger()?))
        } else {
            None
        };

        // stdout carries command output, keep the banner off it
        eprintln!(
            "{}",
            format!("Starting {} Logger", self.logger_name)
                .color(colorful::RGB::new(0, 139, 248))
                .bold()
        );

        Ok(())
    }

    fn create_logger(&mut self) -> VramResult<tracing::subscriber::DefaultGuard> {
        let file_layer = match &self.log_dir {
            Some(log_dir) => {
                if !Path::new(log_dir).exists() {
                    create_dir_all(log_dir).map_err(|e| {
                        VramError::configuration(format!(
                            "failed to create log directory {}: {e}",
                            log_dir.display()
                        ))
                    })?;
                }

                let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
                    .rotation(tracing_appender::rolling::Rotation::HOURLY)
                    .max_log_files(6)
                    .filename_prefix(&self.logger_name)
                    .filename_suffix("log")
                    .build(log_dir)
                    .map_err(|e| VramError::configuration(format!("failed to open log file: {e}")))?;

                Some(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_ansi(false)
                        .with_writer(file_appender),
                )
            }
            None => None,
        };

        let filter = tracing_subscriber::EnvFilter::builder()
            .with_default_directive(self.level.into())
            .parse_lossy("");

        let terminal_layer = tracing_subscriber::fmt::layer()
            .compact()
            .with_ansi(false)
            .with_writer(std::io::stderr);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(terminal_layer);

        Ok(tracing::subscriber::set_default(subscriber))
    }
}

impl LoggingConfigTrait for LoggingConfig {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig {
        self
    }
}

pub trait LoggingConfigTrait {
    fn logging_config_mut(&mut self) -> &mut LoggingConfig;

    fn logging_enabled(mut self, enabled: bool) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logging_enabled = enabled;
        self
    }

    fn logger_name<S: Into<String>>(mut self, logger_name: S) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().logger_name = logger_name.into();
        self
    }

    fn log_dir<P: Into<PathBuf>>(mut self, log_dir: P) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().log_dir = Some(log_dir.into());
        self
    }

    /// Sets the log level to TRACE.
    ///
    /// Use TRACE for purely "I am here!" logs, such as entering a strategy.
    /// TRACE logs should not be used to log variables or decisions.
    fn log_level_trace(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::TRACE;
        self
    }

    /// Sets the log level to DEBUG.
    ///
    /// Use DEBUG to log variables or decisions, such as the batch size a
    /// strategy settled on.
    fn log_level_debug(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::DEBUG;
        self
    }

    /// Sets the log level to INFO.
    fn log_level_info(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::INFO;
        self
    }

    /// Sets the log level to WARN.
    ///
    /// Use WARN for inputs that were recovered from, such as an unknown
    /// workload name falling back to `serving`.
    fn log_level_warn(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::WARN;
        self
    }

    fn log_level_error(mut self) -> Self
    where
        Self: Sized,
    {
        self.logging_config_mut().level = tracing::Level::ERROR;
        self
    }
}

pub fn i_nln(f: &mut std::fmt::Formatter<'_>, arg: std::fmt::Arguments<'_>) -> std::fmt::Result {
    writeln!(indented(f), "{}", arg)?;
    Ok(())
}

pub fn i_nlns(
    f: &mut std::fmt::Formatter<'_>,
    args: &[std::fmt::Arguments<'_>],
) -> std::fmt::Result {
    for arg in args {
        writeln!(indented(f), "{}", arg)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lines(Vec<String>);

    impl std::fmt::Display for Lines {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            writeln!(f, "header")?;
            let args: Vec<String> = self.0.clone();
            for line in &args {
                i_nln(f, format_args!("{line}"))?;
            }
            i_nlns(f, &[format_args!("tail"), format_args!("end")])
        }
    }

    #[test]
    fn helpers_indent_every_line() {
        let rendered = Lines(vec!["a".into(), "b".into()]).to_string();
        assert_eq!(rendered, "header\n    a\n    b\n    tail\n    end\n");
    }

    #[test]
    fn builder_setters_apply() {
        let config = LoggingConfig::new()
            .logger_name("planner")
            .log_level_debug()
            .logging_enabled(false)
            .log_dir("/tmp/llm_vram_logs");
        assert_eq!(config.logger_name, "planner");
        assert_eq!(config.level, tracing::Level::DEBUG);
        assert!(!config.logging_enabled);
        assert_eq!(config.log_dir, Some(PathBuf::from("/tmp/llm_vram_logs")));
    }

    #[test]
    fn disabled_logger_installs_nothing() {
        let mut config = LoggingConfig::new().logging_enabled(false);
        config.load_logger().unwrap();
        assert!(config._tracing_guard.is_none());
    }
}
