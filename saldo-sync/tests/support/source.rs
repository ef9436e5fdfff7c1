use async_trait::async_trait;
use saldo_core::{Address, FetchError, Network};
use saldo_sync::BalanceSource;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Balance source that replays a swappable scripted response.
pub struct ScriptedSource {
    response: Mutex<Result<BTreeMap<String, String>, FetchError>>,
    delay: Duration,
    calls: AtomicU64,
}

impl ScriptedSource {
    pub fn new(response: Result<BTreeMap<String, String>, FetchError>) -> Self {
        Self {
            response: Mutex::new(response),
            delay: Duration::ZERO,
            calls: AtomicU64::new(0),
        }
    }

    pub fn succeeding(pairs: &[(&str, &str)]) -> Self {
        Self::new(Ok(table(pairs)))
    }

    pub fn failing(error: FetchError) -> Self {
        Self::new(Err(error))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_response(&self, response: Result<BTreeMap<String, String>, FetchError>) {
        *self.response.lock().expect("lock should not be poisoned") = response;
    }

    pub fn set_error(&self, error: FetchError) {
        self.set_response(Err(error));
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BalanceSource for ScriptedSource {
    async fn fetch(
        &self,
        _network: &Network,
        _address: &Address,
    ) -> Result<BTreeMap<String, String>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.response
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }
}

pub fn table(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(symbol, amount)| (symbol.to_string(), amount.to_string()))
        .collect()
}
