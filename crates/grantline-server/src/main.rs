use grantline_server::Server;
use grantline_server::config::loader::{config_path, load_config};

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    grantline_server::observability::init_tracing();

    let path = config_path(
        std::env::args().skip(1),
        std::env::var("GRANTLINE_CONFIG").ok(),
    );

    let cfg = match load_config(Some(&path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %path,
        issuer = %cfg.auth.issuer,
        "Configuration loaded"
    );

    grantline_server::observability::apply_logging_level(&cfg.logging.level);

    let server = match Server::new(&cfg) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}
