use std::{
    ops::Deref,
    sync::{Arc, PoisonError},
};

use reqwest::{Client, ClientBuilder, Url};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};

use crate::error::HdsResult;

#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> HdsResult<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    /// Adds cookies in `name=value` form, scoped to `url`.
    pub fn add_cookies<I, S>(&self, cookies: I, url: &Url)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut store = self
            .cookies_store
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for cookie in cookies {
            if let Err(e) = store.parse(cookie.as_ref(), url) {
                tracing::warn!("Ignoring invalid cookie {:?}: {e}", cookie.as_ref());
            }
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
