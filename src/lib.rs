use log::info;

pub mod api;
pub mod assessment;
pub mod cli;
pub mod config;
pub mod session;

pub use assessment::{AssessmentBackend, AssessmentKind, FakeBackend, HttpBackend};
pub use config::AppConfig;
pub use session::{ControllerOptions, PhaseKind, SessionController, SessionError, SessionSnapshot};

/// Logs at `info` unless `RUST_LOG` says otherwise.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}

pub async fn run() -> anyhow::Result<()> {
    use clap::Parser;

    init_logging();
    info!("🚀 TalentGate {} starting", env!("CARGO_PKG_VERSION"));
    cli::run(cli::Cli::parse()).await
}
