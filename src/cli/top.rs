use std::path::PathBuf;

use tabled::Table;

use super::open_store;
use crate::{
    error,
    report::{self, ChartOptions},
    success,
    types::{EntityKind, RankedTableRow},
    warning,
};

pub async fn top(user: String, kind: EntityKind, n: usize, chart: Option<PathBuf>) {
    let store = open_store();

    let ranked = match report::top_n(&store, kind, n, &user) {
        Ok(ranked) => ranked,
        Err(e) => error!("Failed to build report. Err: {}", e),
    };

    if ranked.is_empty() {
        warning!("No {} found for user {}.", kind, user);
        return;
    }

    let rows: Vec<RankedTableRow> = ranked
        .iter()
        .enumerate()
        .map(|(index, entry)| RankedTableRow {
            rank: index + 1,
            name: entry.name.clone(),
            occurrences: entry.occurrences,
            id: entry.external_id.clone(),
        })
        .collect();
    println!("{}", Table::new(rows));

    if let Some(path) = chart {
        let png = match report::render_bar_chart(&ranked, &ChartOptions::default()) {
            Ok(png) => png,
            Err(e) => error!("Failed to render chart. Err: {}", e),
        };
        if let Err(e) = async_fs::write(&path, png).await {
            error!("Failed to write {}. Err: {}", path.display(), e);
        }
        success!("Chart written to {}", path.display());
    }
}
