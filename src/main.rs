use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> anyhow::Result<()> {
    // Init logging on stderr so command output on stdout stays machine-readable
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    debug!(target: "rbacstore", "rbacstore starting: RUST_LOG='{}'", rust_log);

    let code = rbacstore::cli::run(std::env::args().collect())?;
    std::process::exit(code);
}
