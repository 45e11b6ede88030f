use log::error;
use subscription_flag::server::{start_server, ServerConfig};

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = start_server(config).await {
        error!("Flag service stopped: {}", e);
        std::process::exit(1);
    }
}
