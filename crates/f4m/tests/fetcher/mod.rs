use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use bytes::Bytes;
use f4m::{
    fetch::{FetchProgress, FragmentFetcher},
    progress::FetchStatus,
    HdsError, HdsResult,
};

struct TestResponse {
    data: Bytes,
    delay: Duration,
}

/// Serves fragments from memory. Unknown urls respond with `404 Not Found`.
#[derive(Default)]
pub struct TestFetcher {
    responses: HashMap<String, TestResponse>,
    requests: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl TestFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.with_delay(url, data, Duration::ZERO)
    }

    pub fn with_delay(
        mut self,
        url: impl Into<String>,
        data: impl Into<Bytes>,
        delay: Duration,
    ) -> Self {
        self.responses.insert(
            url.into(),
            TestResponse {
                data: data.into(),
                delay,
            },
        );
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl FragmentFetcher for TestFetcher {
    async fn fetch(&self, url: &str, progress: &FetchProgress<'_>) -> HdsResult<Bytes> {
        self.requests.lock().unwrap().push(url.to_string());

        let Some(response) = self.responses.get(url) else {
            return Err(HdsError::HttpError(reqwest::StatusCode::NOT_FOUND));
        };

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(in_flight, Ordering::SeqCst);
        tokio::time::sleep(response.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let len = response.data.len() as u64;
        progress.report(len, Some(len), FetchStatus::Finished);
        Ok(response.data.clone())
    }
}
