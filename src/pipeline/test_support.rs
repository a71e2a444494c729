//! Scripted providers and a ready-made "XYZ" fixture for pipeline tests.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use super::artifacts::ArtifactStore;
use super::checkpoint::Checkpointer;
use super::orchestrator::Orchestrator;
use super::state::AgentState;
use crate::config::Config;
use crate::constants::providers::{MACRO, MARKET, SEC};
use crate::fetch::{FetchCache, FetchRequest, Provider, RetryPolicy, RetryingFetcher};
use crate::financials::fixtures;
use crate::shutdown::ShutdownSignal;
use crate::sources::{macro_data, market, sec};
use crate::types::{Cik, ErrorCategory, FetchError, Ticker};
use crate::valuation::DefaultValuationEngine;

enum Scripted {
    Respond(Value),
    Fail(ErrorCategory),
    /// Request shutdown and fail transiently once, then respond
    InterruptOnce(ShutdownSignal, Value),
}

/// Provider answering from a table keyed by the full request URL
pub struct ScriptedProvider {
    name: &'static str,
    responses: Mutex<HashMap<String, Scripted>>,
    calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            responses: Mutex::new(HashMap::new()),
            calls: AtomicU64::new(0),
        })
    }

    fn key(request: &FetchRequest) -> String {
        request
            .to_url()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| request.url.clone())
    }

    fn script(&self, request: &FetchRequest, scripted: Scripted) {
        self.responses
            .lock()
            .unwrap()
            .insert(Self::key(request), scripted);
    }

    pub fn respond(&self, request: &FetchRequest, payload: Value) {
        self.script(request, Scripted::Respond(payload));
    }

    pub fn fail(&self, request: &FetchRequest, category: ErrorCategory) {
        self.script(request, Scripted::Fail(category));
    }

    pub fn interrupt_once(&self, request: &FetchRequest, signal: ShutdownSignal, payload: Value) {
        self.script(request, Scripted::InterruptOnce(signal, payload));
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn call(&self, request: &FetchRequest) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = Self::key(request);
        let mut responses = self.responses.lock().unwrap();

        match responses.remove(&key) {
            Some(Scripted::Respond(payload)) => {
                responses.insert(key, Scripted::Respond(payload.clone()));
                Ok(payload)
            }
            Some(Scripted::Fail(category)) => {
                responses.insert(key.clone(), Scripted::Fail(category));
                Err(FetchError::with_provider(category, format!("scripted failure for {}", key), self.name))
            }
            Some(Scripted::InterruptOnce(signal, payload)) => {
                responses.insert(key, Scripted::Respond(payload));
                signal.request_shutdown();
                Err(FetchError::with_provider(ErrorCategory::Transient, "connection reset", self.name))
            }
            None => Err(FetchError::with_provider(
                ErrorCategory::NotFound,
                format!("no scripted response for {}", key),
                self.name,
            )),
        }
    }
}

pub fn abc_quote() -> Value {
    json!({"symbol": "ABC", "market_cap": 3000.0, "trailing_pe": 18.0, "sector": "Technology", "industry": "Widgets"})
}

/// Temporary data dir, test config and one scripted provider per source
pub struct Harness {
    _temp: TempDir,
    pub subject: Ticker,
    pub config: Arc<Config>,
    pub sec: Arc<ScriptedProvider>,
    pub market: Arc<ScriptedProvider>,
    pub macro_source: Arc<ScriptedProvider>,
}

impl Harness {
    /// Every provider answers for subject XYZ with peers ABC and DEF
    pub fn xyz() -> Self {
        Self::with_config("XYZ", |_| {})
    }

    pub fn with_config(subject: &str, adjust: impl FnOnce(&mut Config)) -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp.path().join("data");
        config.sec.base_url = "https://sec.test".to_string();
        config.sec.index_url = "https://sec.test/files/company_tickers.json".to_string();
        config.market.base_url = "https://market.test".to_string();
        config.macro_data.base_url = "https://fred.test".to_string();
        config.macro_data.api_key = Some("test-key".to_string());
        config.pipeline.peer_universe.clear();
        config
            .pipeline
            .peer_universe
            .insert("Widgets".to_string(), vec!["ABC".to_string(), "DEF".to_string()]);
        adjust(&mut config);

        let harness = Self {
            _temp: temp,
            subject: Ticker::parse(subject).unwrap(),
            config: Arc::new(config),
            sec: ScriptedProvider::new(SEC),
            market: ScriptedProvider::new(MARKET),
            macro_source: ScriptedProvider::new(MACRO),
        };
        harness.script_xyz();
        harness
    }

    fn script_xyz(&self) {
        let c = &self.config;
        let cik = Cik::new(1234);

        self.sec.respond(
            &sec::ticker_index_request(&c.sec),
            json!({"0": {"cik_str": 1234, "ticker": "XYZ", "title": "XYZ Corp"}}),
        );
        self.sec.respond(
            &sec::submissions_request(&c.sec, cik),
            json!({"cik": "1234", "name": "XYZ Corp"}),
        );
        self.sec
            .respond(&sec::company_facts_request(&c.sec, cik), fixtures::company_facts());

        self.market.respond(
            &market::quote_request(&c.market, "XYZ"),
            json!({
                "symbol": "XYZ",
                "market_cap": 4000.0,
                "trailing_pe": 20.0,
                "sector": "Technology",
                "industry": "Widgets",
                "shares_outstanding": 100.0,
                "price": 40.0
            }),
        );
        self.market
            .respond(&market::quote_request(&c.market, "ABC"), abc_quote());
        self.market.respond(
            &market::quote_request(&c.market, "DEF"),
            json!({"symbol": "DEF", "marketCap": 5000.0, "trailingPE": 22.0}),
        );
        self.market.respond(
            &market::history_request(&c.market, "XLK"),
            json!({"closes": [100.0, 105.0, 110.0]}),
        );

        self.macro_source.respond(
            &macro_data::risk_free_request(&c.macro_data),
            json!({"observations": [{"date": "2026-01-02", "value": "4.25"}]}),
        );
    }

    /// A new orchestrator over the shared data dir and on-disk cache
    pub fn orchestrator(&self, shutdown: ShutdownSignal) -> Orchestrator {
        let cache = Arc::new(FetchCache::open(&self.config.cache_db_path(), 4).unwrap());
        let fetcher = RetryingFetcher::new(cache, RetryPolicy::immediate(3), shutdown.clone())
            .with_provider(self.sec.clone())
            .with_provider(self.market.clone())
            .with_provider(self.macro_source.clone());

        Orchestrator::new(
            self.subject.clone(),
            self.config.clone(),
            Arc::new(fetcher),
            Arc::new(DefaultValuationEngine::new(self.config.valuation.clone())),
            shutdown,
        )
    }

    pub fn network_calls(&self) -> u64 {
        self.sec.calls() + self.market.calls() + self.macro_source.calls()
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpointer().path_for(&self.subject)
    }

    pub fn load_state(&self) -> AgentState {
        self.checkpointer().load(&self.subject).unwrap().unwrap()
    }

    pub fn read_artifact<T: serde::de::DeserializeOwned>(&self, state: &AgentState, name: &str) -> T {
        ArtifactStore::new(&self.config.output_dir(), &self.subject)
            .read_json(state, name)
            .unwrap()
    }

    fn checkpointer(&self) -> Checkpointer {
        Checkpointer::new(self.config.state_dir(), self.config.checkpoint.save_every())
    }
}
