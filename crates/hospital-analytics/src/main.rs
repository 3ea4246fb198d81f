use std::env;

use hospital_analytics::config::loader::load_config;

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    let config_path = config_path();
    let cfg = match load_config(config_path.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    hospital_analytics::init_tracing(&cfg.logging.level);

    if let Err(err) = hospital_analytics::run(cfg).await {
        eprintln!("Analytics service error: {err:#}");
        std::process::exit(1);
    }
}

/// `--config <path>`, then `HOSPITAL_ANALYTICS_CONFIG`.
fn config_path() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config"
            && let Some(path) = args.next()
        {
            return Some(path);
        }
    }
    env::var("HOSPITAL_ANALYTICS_CONFIG")
        .ok()
        .filter(|p| !p.is_empty())
}
