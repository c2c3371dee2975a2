use std::{io::Write, path::PathBuf};

use super::open_store;
use crate::{error, report::{self, ExportFormat}, success};

pub async fn export(user: String, format: ExportFormat, output: Option<PathBuf>) {
    let store = open_store();

    let body = match report::export(&store, &user, format) {
        Ok(body) => body,
        Err(e) => error!("Failed to export data. Err: {}", e),
    };

    match output {
        Some(path) => {
            if let Err(e) = async_fs::write(&path, body).await {
                error!("Failed to write {}. Err: {}", path.display(), e);
            }
            success!("Export written to {}", path.display());
        }
        None => {
            if let Err(e) = std::io::stdout().write_all(&body) {
                error!("Failed to write export. Err: {}", e);
            }
        }
    }
}
