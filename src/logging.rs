use anyhow::Result;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry};

use crate::config::{LogFormat, LoggingSettings};

const LOG_FILE_NAME: &str = "waf-sync.log";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// ログ設定
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// ログレベル (trace, debug, info, warn, error)
    pub level: String,
    /// 出力フォーマット
    pub format: LogFormat,
    /// ログディレクトリ（None ならコンソールのみ）
    pub log_dir: Option<PathBuf>,
    /// コンソール出力有効
    pub console_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
            log_dir: None,
            console_enabled: true,
        }
    }
}

impl LogConfig {
    /// 設定ファイルのセクションから作成
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            level: settings.level.clone(),
            format: settings.format,
            log_dir: settings.directory.clone(),
            console_enabled: true,
        }
    }

    /// カスタムログディレクトリを設定
    pub fn with_log_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    /// コンソール出力制御
    pub fn with_console(mut self, enabled: bool) -> Self {
        self.console_enabled = enabled;
        self
    }

    /// `RUST_LOG` が設定されていればそちらを優先
    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// ログディレクトリを確保
fn ensure_log_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

fn console_layer(format: LogFormat) -> BoxedLayer {
    match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
            .boxed(),
    }
}

/// ログシステムを初期化
///
/// ファイル出力を有効にした場合、返されたガードが生きている間だけ
/// バックグラウンドの書き込みスレッドが動作する。
pub fn init_logging(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;

    if config.console_enabled {
        layers.push(console_layer(config.format));
    }

    if let Some(dir) = &config.log_dir {
        ensure_log_dir(dir)?;
        let (writer, worker_guard) = non_blocking(rolling::daily(dir, LOG_FILE_NAME));
        let file_layer = match config.format {
            LogFormat::Json => fmt::layer().json().with_writer(writer).boxed(),
            LogFormat::Pretty => fmt::layer().with_writer(writer).with_ansi(false).boxed(),
        };
        layers.push(file_layer);
        guard = Some(worker_guard);
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(config.env_filter())
        .try_init()?;

    tracing::debug!(
        level = %config.level,
        log_dir = ?config.log_dir,
        "logging initialized"
    );

    Ok(guard)
}
