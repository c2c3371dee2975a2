use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    error::RemoteFetchError,
    spotify::retry::RetryPolicy,
    types::{CurrentUser, Page, Playlist, PlaylistItem},
};

/// Page size requested for every paginated collection.
pub const PAGE_LIMIT: u32 = 50;

/// Read access to a user's library on the provider.
///
/// Collections are returned complete, pagination is handled by the
/// implementation.
#[async_trait]
pub trait RemoteLibrary: Send + Sync {
    async fn current_user(&self, token: &str) -> Result<CurrentUser, RemoteFetchError>;

    async fn user_playlists(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<Playlist>, RemoteFetchError>;

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>, RemoteFetchError>;
}

pub struct SpotifyClient {
    client: Client,
    api_url: String,
    retry: RetryPolicy,
}

impl SpotifyClient {
    pub fn new(
        api_url: &str,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, RemoteFetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
    ) -> Result<T, RemoteFetchError> {
        self.retry.run(|| self.get_once(token, url)).await
    }

    async fn get_once<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
    ) -> Result<T, RemoteFetchError> {
        debug!("GET {}", url);
        let response = self.client.get(url).bearer_auth(token).send().await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok())
                    .unwrap_or(0);
                Err(RemoteFetchError::RateLimited { retry_after_secs })
            }
            StatusCode::UNAUTHORIZED => Err(RemoteFetchError::Unauthorized),
            status if !status.is_success() => Err(RemoteFetchError::Status {
                status,
                url: url.to_string(),
            }),
            _ => response
                .json::<T>()
                .await
                .map_err(|e| RemoteFetchError::Decode(e.to_string())),
        }
    }

    /// Follows `next` links until the collection is exhausted. Null items are dropped.
    async fn collect_pages<T: DeserializeOwned>(
        &self,
        token: &str,
        first_url: String,
    ) -> Result<Vec<T>, RemoteFetchError> {
        let mut items = Vec::new();
        let mut next = Some(first_url);

        while let Some(url) = next {
            let page: Page<T> = self.get_json(token, &url).await?;
            items.extend(page.items.into_iter().flatten());
            next = page.next;
        }

        Ok(items)
    }
}

#[async_trait]
impl RemoteLibrary for SpotifyClient {
    async fn current_user(&self, token: &str) -> Result<CurrentUser, RemoteFetchError> {
        self.get_json(token, &format!("{}/me", self.api_url)).await
    }

    async fn user_playlists(
        &self,
        token: &str,
        user_id: &str,
    ) -> Result<Vec<Playlist>, RemoteFetchError> {
        let url = format!(
            "{uri}/users/{user_id}/playlists?limit={limit}",
            uri = self.api_url,
            limit = PAGE_LIMIT
        );
        self.collect_pages(token, url).await
    }

    async fn playlist_tracks(
        &self,
        token: &str,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistItem>, RemoteFetchError> {
        let url = format!(
            "{uri}/playlists/{playlist_id}/tracks?limit={limit}",
            uri = self.api_url,
            limit = PAGE_LIMIT
        );
        self.collect_pages(token, url).await
    }
}
