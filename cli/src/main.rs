use clap::Parser;
use tajaa_cli::app;
use tajaa_cli::commands::cli;
use tajaa_core::config::{self, AppConfig};
use tajaa_core::error::{self, SupervisorError};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

static LOG_GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
    std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            exit_code_for_error(&e)
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, error::CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(&args).map_err(|e| error::CliError::Config(e.to_string()))?;
    init_tracing(&cfg.logging).map_err(error::CliError::Command)?;

    tracing::debug!(
        max_concurrent = cfg.supervisor.max_concurrent,
        parallel_max = cfg.parallel.max_concurrent,
        "config loaded"
    );

    match args.command {
        cli::Commands::Run(run_args) => app::run_cmd(run_args, &cfg).await,
        cli::Commands::Chain(chain_args) => app::chain_cmd(chain_args, &cfg).await,
        cli::Commands::Parallel(par_args) => app::parallel_cmd(par_args, &cfg).await,
        cli::Commands::Batch(batch_args) => app::batch_cmd(batch_args, &cfg).await,
    }
}

fn load_config(args: &cli::Args) -> anyhow::Result<AppConfig> {
    match args.config.as_deref() {
        Some(path) => {
            let mut cfg = config::load_from_path(path)?;
            config::apply_env_overrides(&mut cfg, |key| std::env::var(key).ok());
            Ok(cfg)
        }
        None => config::load_default(),
    }
}

fn exit_code_for_error(e: &error::CliError) -> i32 {
    // 0: success
    // 11: config error
    // 20: launch / IO error
    // 50: internal/uncategorized
    match e {
        error::CliError::Config(_) => 11,
        error::CliError::Supervisor(se) => match se {
            SupervisorError::InvalidCeiling(_) | SupervisorError::InvalidCapacity { .. } => 11,
            SupervisorError::NoRuntime => 50,
        },
        error::CliError::Runner(re) => match re {
            error::RunnerError::StreamIo { .. } => 20,
            re if re.is_launch_failure() => 20,
            _ => 50,
        },
        error::CliError::Io(_) => 20,
        error::CliError::Command(_) => 20,
        error::CliError::Anyhow(_) => 50,
    }
}

fn init_tracing(logging: &config::LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = match std::env::var("RUST_LOG") {
        Ok(v) if !v.trim().is_empty() => EnvFilter::from_default_env(),
        _ => EnvFilter::try_new(logging.level.clone()).map_err(|e| e.to_string())?,
    };

    let mut maybe_writer = None;

    if logging.file {
        let dir = match logging
            .directory
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(d) => std::path::PathBuf::from(d),
            None => std::env::temp_dir().join("tajaa"),
        };

        std::fs::create_dir_all(&dir).map_err(|e| format!("create log dir failed: {e}"))?;
        let file_name = format!("tajaa.{}.log", std::process::id());
        let appender = tracing_appender::rolling::never(dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        let _ = LOG_GUARD.set(guard);
        maybe_writer = Some(non_blocking);
    }

    if !logging.console && maybe_writer.is_none() {
        return Err("logging disabled for both console and file".to_string());
    }

    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
    });

    let file_layer = maybe_writer.map(|w| {
        tracing_subscriber::fmt::layer()
            .with_writer(w)
            .with_ansi(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(())
}
