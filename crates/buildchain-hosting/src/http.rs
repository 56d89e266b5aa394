//! Shared REST transport with credential rotation on throttling.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::credentials::CredentialPool;
use crate::error::HostingError;
use crate::Result;

/// Page size requested from list endpoints
pub const PAGE_SIZE: usize = 100;

/// How a credential is attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `PRIVATE-TOKEN: <token>` (GitLab personal access tokens)
    PrivateToken,
    /// HTTP basic auth; the credential is `user:password`
    Basic,
}

/// Outcome of a single attempt under the rotation policy
#[derive(Debug)]
pub enum Attempt<T> {
    Done(T),
    RateLimited,
}

fn lock(pool: &Mutex<CredentialPool>) -> MutexGuard<'_, CredentialPool> {
    pool.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Run `op` with the pool's current credential, rotating and retrying the
/// same request every time it reports [`Attempt::RateLimited`].
///
/// Fails with [`HostingError::RateLimitExhausted`] once no credential is left.
pub async fn with_rotation<T, F, Fut>(pool: &Mutex<CredentialPool>, mut op: F) -> Result<T>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Attempt<T>>>,
{
    let mut token = lock(pool).current().map(str::to_string);
    loop {
        match op(token.clone()).await? {
            Attempt::Done(value) => return Ok(value),
            Attempt::RateLimited => {
                let mut guard = lock(pool);
                match guard.rotate_from(token.as_deref()) {
                    Some(next) => {
                        warn!(
                            exhausted = guard.exhausted().len(),
                            "Provider rate limit hit, rotating credential"
                        );
                        token = Some(next);
                    }
                    None => {
                        return Err(HostingError::RateLimitExhausted {
                            tried: guard.len().max(1),
                        })
                    }
                }
            }
        }
    }
}

/// `true` for throttling responses: 429, or 403 with an empty rate-limit window
pub fn is_rate_limited(status: StatusCode, headers: &HeaderMap) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    status == StatusCode::FORBIDDEN
        && headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim() == "0")
            .unwrap_or(false)
}

async fn send_once(req: reqwest::RequestBuilder, url: String) -> Result<Attempt<Option<String>>> {
    let resp = req.send().await?;
    let status = resp.status();
    if is_rate_limited(status, resp.headers()) {
        return Ok(Attempt::RateLimited);
    }
    if status == StatusCode::NOT_FOUND {
        debug!(%url, "Resource not found");
        return Ok(Attempt::Done(None));
    }
    if !status.is_success() {
        return Err(HostingError::UnexpectedStatus {
            status: status.as_u16(),
            url,
        });
    }
    Ok(Attempt::Done(Some(resp.text().await?)))
}

/// Thin GET-only REST client shared by all providers
pub struct RestTransport {
    http: reqwest::Client,
    base_url: String,
    auth: AuthScheme,
    pool: Arc<Mutex<CredentialPool>>,
}

impl RestTransport {
    pub fn new(base_url: &str, auth: AuthScheme, tokens: Vec<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("build-chain/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
            pool: Arc::new(Mutex::new(CredentialPool::new(tokens))),
        })
    }

    /// Credential currently at the head of the pool
    pub fn current_token(&self) -> Option<String> {
        lock(&self.pool).current().map(str::to_string)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, req: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        let Some(token) = token else {
            return req;
        };
        match self.auth {
            AuthScheme::Bearer => req.bearer_auth(token),
            AuthScheme::PrivateToken => req.header("PRIVATE-TOKEN", token),
            AuthScheme::Basic => match token.split_once(':') {
                Some((user, password)) => req.basic_auth(user, Some(password)),
                None => req.basic_auth(token, None::<&str>),
            },
        }
    }

    /// GET `path` and return the body; `Ok(None)` on 404.
    pub async fn get_text(&self, path: &str, query: &[(&str, String)]) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        with_rotation(&self.pool, |token| {
            let req = self.authorize(self.http.get(&url).query(query), token.as_deref());
            send_once(req, url.clone())
        })
        .await
    }

    /// GET `path` and decode the JSON body; `Ok(None)` on 404.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>> {
        match self.get_text(path, query).await? {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Collect every page of a list endpoint that uses `page`/`per_page`.
    pub async fn get_paged_json<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let query = [("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
            let batch: Vec<T> = self.get_json(path, &query).await?.unwrap_or_default();
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                return Ok(items);
            }
            page += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn pool(tokens: &[&str]) -> Mutex<CredentialPool> {
        Mutex::new(CredentialPool::new(
            tokens.iter().map(|t| t.to_string()).collect(),
        ))
    }

    #[test]
    fn test_429_is_rate_limited() {
        assert!(is_rate_limited(StatusCode::TOO_MANY_REQUESTS, &HeaderMap::new()));
    }

    #[test]
    fn test_403_needs_empty_window_to_count_as_rate_limited() {
        let mut headers = HeaderMap::new();
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert!(is_rate_limited(StatusCode::FORBIDDEN, &headers));
        headers.insert("x-ratelimit-remaining", HeaderValue::from_static("12"));
        assert!(!is_rate_limited(StatusCode::FORBIDDEN, &headers));
    }

    #[tokio::test]
    async fn test_rotation_retries_same_request_with_next_token() {
        let pool = pool(&["t1", "t2", "t3"]);
        let seen = Mutex::new(Vec::new());
        let value = with_rotation(&pool, |token| {
            seen.lock().unwrap().push(token.clone());
            async move {
                if token.as_deref() == Some("t3") {
                    Ok::<_, HostingError>(Attempt::Done(42))
                } else {
                    Ok(Attempt::RateLimited)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 42);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Some("t1".to_string()),
                Some("t2".to_string()),
                Some("t3".to_string())
            ]
        );
        assert_eq!(pool.lock().unwrap().current(), Some("t3"));
    }

    #[tokio::test]
    async fn test_rotation_fails_permanently_when_pool_exhausted() {
        let pool = pool(&["t1", "t2"]);
        let calls = AtomicUsize::new(0);
        let err = with_rotation(&pool, |_token| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<Attempt<()>, HostingError>(Attempt::RateLimited) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, HostingError::RateLimitExhausted { tried: 2 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(pool.lock().unwrap().is_exhausted());
    }

    #[tokio::test]
    async fn test_anonymous_rate_limit_is_exhausted_immediately() {
        let pool = Mutex::new(CredentialPool::default());
        let err = with_rotation(&pool, |_token| async {
            Ok::<Attempt<()>, HostingError>(Attempt::RateLimited)
        })
        .await
        .unwrap_err();
        assert!(matches!(err, HostingError::RateLimitExhausted { .. }));
    }

    #[tokio::test]
    async fn test_non_rate_limit_errors_propagate_without_rotation() {
        let pool = pool(&["t1", "t2"]);
        let err = with_rotation(&pool, |_token| async {
            Err::<Attempt<()>, _>(HostingError::Http("connection reset".to_string()))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, HostingError::Http(_)));
        assert_eq!(pool.lock().unwrap().current(), Some("t1"));
    }
}
