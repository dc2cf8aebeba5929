use log::{debug, error, LevelFilter};
use siphon::configuration::Config;
use siphon::session_management::Supervisor;
use std::fs::OpenOptions;
use std::path::Path;

/// Environment variable holding the diagnostics filter, in `env_logger` syntax.
const LOG_FILTER_ENV: &str = "SIPHON_LOG";

#[tokio::main]
async fn main() {
    let config = Config::load();
    init_diagnostics(
        config
            .as_ref()
            .ok()
            .and_then(|c| c.diagnostics_file.as_deref()),
    );

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}", e);
            eprintln!("siphon: configuration error: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Configuration loaded: {:?}", config);

    let supervisor = Supervisor::new(config);
    match supervisor.run(std::env::args_os().skip(1)).await {
        // Exiting directly: a pending read on the proxy's stdin would keep
        // the runtime from shutting down.
        Ok(report) => std::process::exit(report.exit_code),
        Err(e) => {
            error!("Session failed: {}", e);
            eprintln!("siphon: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

/// Diagnostics stay silent unless `SIPHON_LOG` asks for them, so the proxied
/// stderr is left untouched.
fn init_diagnostics(file: Option<&Path>) {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(LevelFilter::Off)
        .parse_env(env_logger::Env::new().filter(LOG_FILTER_ENV))
        .format_target(false);

    // Diagnostics stay on stderr if the file cannot be opened.
    let pipe = file.and_then(|p| OpenOptions::new().create(true).append(true).open(p).ok());
    if let Some(f) = pipe {
        builder.target(env_logger::Target::Pipe(Box::new(f)));
    }
    builder.init();
}
