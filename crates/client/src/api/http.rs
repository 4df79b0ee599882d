//! HTTP implementation of [`CartApi`] using `reqwest`.
//!
//! The client keeps a cookie store so an authenticated session established on
//! the same host applies to cart requests; account scopes therefore send no
//! cart token.

use std::sync::Arc;

use cart_sync_core::UserId;
use cart_sync_core::wire::{CartResponse, PushRequest};
use serde_json::json;
use tracing::instrument;
use url::Url;

use super::{CartApi, CartScope};
use crate::config::ClientConfig;
use crate::error::SyncError;

/// Longest response excerpt kept in error messages and logs.
const BODY_EXCERPT_CHARS: usize = 200;

/// Client for the `/cart` endpoint.
#[derive(Clone)]
pub struct HttpCartApi {
    inner: Arc<HttpCartApiInner>,
}

struct HttpCartApiInner {
    client: reqwest::Client,
    base_url: Url,
    cart_url: Url,
}

impl HttpCartApi {
    /// Create a new cart endpoint client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build or the base URL cannot
    /// be joined with `/cart`.
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout)
            .build()?;

        let cart_url = config.api_url.join("/cart")?;

        Ok(Self {
            inner: Arc::new(HttpCartApiInner {
                client,
                base_url: config.api_url.clone(),
                cart_url,
            }),
        })
    }

    /// Open a session as `user_id` using the storefront's development login.
    ///
    /// Only available when the server enables `STOREFRONT_DEV_LOGIN`.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the server rejects it.
    #[instrument(skip(self))]
    pub async fn dev_login(&self, user_id: &UserId) -> Result<(), SyncError> {
        let url = self.inner.base_url.join("/auth/login")?;
        let response = self
            .inner
            .client
            .post(url)
            .json(&json!({ "userId": user_id }))
            .send()
            .await?;
        ensure_success(response).await.map(drop)
    }

    /// End the current session.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the server rejects it.
    #[instrument(skip(self))]
    pub async fn dev_logout(&self) -> Result<(), SyncError> {
        let url = self.inner.base_url.join("/auth/logout")?;
        let response = self.inner.client.post(url).send().await?;
        ensure_success(response).await.map(drop)
    }

    fn scoped_url(&self, scope: &CartScope) -> Url {
        let mut url = self.inner.cart_url.clone();
        if let Some(cart_id) = scope.query_cart_id() {
            url.query_pairs_mut().append_pair("cartId", cart_id.as_str());
        }
        url
    }
}

/// Return the response if its status is a success, otherwise an `Api` error
/// carrying an excerpt of the body.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SyncError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Api {
        status: status.as_u16(),
        message: body.chars().take(BODY_EXCERPT_CHARS).collect(),
    })
}

/// Parse and validate a cart response body.
async fn read_cart(response: reqwest::Response) -> Result<CartResponse, SyncError> {
    let response = ensure_success(response).await?;
    let text = response.text().await?;

    let cart: CartResponse = match serde_json::from_str(&text) {
        Ok(cart) => cart,
        Err(e) => {
            tracing::warn!(
                error = %e,
                body = %text.chars().take(BODY_EXCERPT_CHARS).collect::<String>(),
                "Failed to parse cart response"
            );
            return Err(SyncError::Parse(e));
        }
    };
    cart.validate()?;
    Ok(cart)
}

impl CartApi for HttpCartApi {
    #[instrument(skip(self))]
    async fn fetch(&self, scope: &CartScope) -> Result<CartResponse, SyncError> {
        let response = self
            .inner
            .client
            .get(self.scoped_url(scope))
            .send()
            .await?;
        read_cart(response).await
    }

    #[instrument(skip(self, request), fields(lines = request.items.len()))]
    async fn push(
        &self,
        scope: &CartScope,
        request: &PushRequest,
    ) -> Result<CartResponse, SyncError> {
        let response = self
            .inner
            .client
            .post(self.inner.cart_url.clone())
            .json(request)
            .send()
            .await?;
        read_cart(response).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, scope: &CartScope) -> Result<(), SyncError> {
        let response = self
            .inner
            .client
            .delete(self.scoped_url(scope))
            .send()
            .await?;
        ensure_success(response).await.map(drop)
    }
}
