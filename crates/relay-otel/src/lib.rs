use once_cell::sync::OnceCell;
use tracing_appender::rolling::RollingFileAppender;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{
    fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Target used by the HTTP access log middleware.
pub const ACCESS_TARGET: &str = "http.access";

static ACCESS_GUARD: OnceCell<tracing_appender::non_blocking::WorkerGuard> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rotation {
    Minutely,
    Hourly,
    Daily,
}

impl Rotation {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hourly" => Rotation::Hourly,
            "minutely" => Rotation::Minutely,
            _ => Rotation::Daily,
        }
    }

    fn appender(self, dir: &str, prefix: &str) -> RollingFileAppender {
        match self {
            Rotation::Minutely => tracing_appender::rolling::minutely(dir, prefix),
            Rotation::Hourly => tracing_appender::rolling::hourly(dir, prefix),
            Rotation::Daily => tracing_appender::rolling::daily(dir, prefix),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AccessFileConfig {
    dir: String,
    prefix: String,
    rotation: Rotation,
}

fn access_file_config(var: impl Fn(&str) -> Option<String>) -> Option<AccessFileConfig> {
    if var("RELAY_ACCESS_LOG_ROLL").as_deref() != Some("1") {
        return None;
    }
    let dir = var("RELAY_ACCESS_LOG_DIR")
        .or_else(|| var("RELAY_LOGS_DIR"))
        .unwrap_or_else(|| "logs".to_string());
    let prefix = var("RELAY_ACCESS_LOG_PREFIX").unwrap_or_else(|| "http-access".into());
    let rotation = Rotation::parse(&var("RELAY_ACCESS_LOG_ROTATION").unwrap_or_default());
    Some(AccessFileConfig {
        dir,
        prefix,
        rotation,
    })
}

/// Install the global subscriber: console output filtered by `RUST_LOG`
/// (default `info`), plus a rolling access log file when
/// `RELAY_ACCESS_LOG_ROLL=1`. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(fmt::layer().with_filter(filter));

    let Some(cfg) = access_file_config(|key| std::env::var(key).ok()) else {
        let _ = registry.try_init();
        return;
    };
    if std::fs::create_dir_all(&cfg.dir).is_err() {
        tracing::warn!(directory = %cfg.dir, "failed to create access log directory");
    }
    let (writer, guard) = tracing_appender::non_blocking(cfg.rotation.appender(&cfg.dir, &cfg.prefix));
    let _ = ACCESS_GUARD.set(guard);
    let access_layer = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(ACCESS_TARGET, tracing::Level::INFO));
    let _ = registry.with(access_layer).try_init();
}
