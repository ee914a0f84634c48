// CLI modules
mod args;
mod op;
mod ops;
mod state;
mod version;

use args::Args;
use clap::{Parser, Subcommand};
use op::Op;
use ops::{
    Connect, CreateLedger, Identity, Init, Ledgers, Pending, SendMessage, SyncLedgers, Version,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

command_enum! {
    (Init, Init),
    (Identity, Identity),
    (Ledgers, Ledgers),
    (Pending, Pending),
    (Connect, Connect),
    (Sync, SyncLedgers),
    (Send, SendMessage),
    (CreateLedger, CreateLedger),
    (Version, Version),
}

/// Install the stderr log layer. The guard must outlive the program.
fn init_logging(level: tracing::Level) -> tracing_appender::non_blocking::WorkerGuard {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let stderr_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(writer)
        .with_filter(env_filter);

    tracing_subscriber::registry().with(stderr_layer).init();
    guard
}

/// Registers a panic hook that logs panics using the `tracing` crate
fn register_panic_logger() {
    std::panic::set_hook(Box::new(|panic| match panic.location() {
        Some(loc) => {
            tracing::error!(
                message = %panic,
                panic.file = loc.file(),
                panic.line = loc.line(),
                panic.column = loc.column(),
            );
        }
        None => tracing::error!(message = %panic),
    }));
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Log level comes from the config once there is one
    let level = state::AppState::load(args.config_path.clone())
        .map(|state| state.config.log_level())
        .unwrap_or(tracing::Level::WARN);
    let guard = init_logging(level);
    register_panic_logger();

    let ctx = op::OpContext::new(args.config_path, args.passphrase);

    let code = match args.command.execute(&ctx).await {
        Ok(output) => {
            println!("{}", output);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    };

    // Flush buffered log lines before exiting
    drop(guard);
    std::process::exit(code);
}
