use std::net::SocketAddr;

use crate::{config::Settings, error, info, server};

pub async fn serve(address: Option<SocketAddr>) {
    let mut settings = match Settings::from_env() {
        Ok(settings) => settings,
        Err(e) => error!("Invalid configuration: {}", e),
    };
    if let Some(address) = address {
        settings.server_addr = address;
    }

    info!("Database: {}", settings.database_path.display());
    info!("Login at http://{}/authorize", settings.server_addr);

    if let Err(e) = server::start_api_server(&settings).await {
        error!("Server stopped. Err: {:#}", e);
    }
}
