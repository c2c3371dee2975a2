//! Aggregate reports over the locally synced library.
//!
//! Reports only read persisted rows, they never call the provider. Ranking
//! ([`top_n`]) is kept apart from presentation ([`chart`], [`export`]).

pub mod chart;
pub mod export;

use crate::{
    error::{NoDataError, ReportError},
    management::SqliteStore,
    types::{EntityKind, RankedEntity},
};

pub use chart::{ChartOptions, render_bar_chart};
pub use export::{ExportFormat, export};

/// Fails with [`NoDataError`] unless the user has at least one committed
/// playlist. Never-synced users, empty libraries and passes where every
/// playlist failed all end up here.
pub(crate) fn ensure_synced(store: &SqliteStore, user_id: &str) -> Result<(), ReportError> {
    if store.playlist_count(user_id)? == 0 {
        return Err(NoDataError {
            user_id: user_id.to_string(),
        }
        .into());
    }
    Ok(())
}

/// The `n` most frequent entities of `kind` across the user's playlists.
///
/// Sorted by occurrence count descending, ties broken by external id
/// ascending. At most `n` entries are returned.
pub fn top_n(
    store: &SqliteStore,
    kind: EntityKind,
    n: usize,
    user_id: &str,
) -> Result<Vec<RankedEntity>, ReportError> {
    ensure_synced(store, user_id)?;
    if n == 0 {
        return Ok(Vec::new());
    }
    Ok(store.top_entities(kind, n, user_id)?)
}
