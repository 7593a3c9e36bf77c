//! Scripted collaborators for integration testing.
//!
//! Deterministic `ExecutionVenue`, `PriceOracle` and `SourceConnector`
//! implementations whose responses are queued from test code. All state
//! is in-memory.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sniper::types::{BuyFill, Candidate, Metrics, RawRecord, SellFill, SourceKind};
use sniper::venues::{ExecutionVenue, PriceOracle, SourceConnector};

pub fn candidate(id: &str, source: SourceKind) -> Candidate {
    Candidate {
        id: id.to_string(),
        symbol: id.to_uppercase(),
        name: format!("{id} token"),
        source,
        metrics: Metrics::new(),
    }
}

pub fn boost(addr: &str, amount: f64) -> RawRecord {
    RawRecord::Boost {
        chain_id: "solana".to_string(),
        token_address: addr.to_string(),
        amount,
        total_amount: None,
        url: None,
        description: None,
    }
}

// ---------------------------------------------------------------------------
// Venue
// ---------------------------------------------------------------------------

/// Venue that fills at a fixed entry price and follows a queued script
/// for sells. An empty sell script fills at the last price set.
pub struct ScriptedVenue {
    entry_price: Decimal,
    buy_delay: Duration,
    sell_delay: Duration,
    fail_buys: Mutex<usize>,
    sells: Mutex<VecDeque<Result<Decimal, String>>>,
    sell_price: Mutex<Decimal>,
    buy_calls: AtomicUsize,
    sell_calls: AtomicUsize,
}

impl ScriptedVenue {
    pub fn new(entry_price: Decimal) -> Self {
        Self {
            entry_price,
            buy_delay: Duration::ZERO,
            sell_delay: Duration::ZERO,
            fail_buys: Mutex::new(0),
            sells: Mutex::new(VecDeque::new()),
            sell_price: Mutex::new(entry_price),
            buy_calls: AtomicUsize::new(0),
            sell_calls: AtomicUsize::new(0),
        }
    }

    /// Make every buy and sell take `delay` before answering.
    pub fn with_latency(mut self, delay: Duration) -> Self {
        self.buy_delay = delay;
        self.sell_delay = delay;
        self
    }

    /// Fail the next `n` buys.
    pub fn fail_next_buys(&self, n: usize) {
        *self.fail_buys.lock().unwrap() = n;
    }

    /// Queue a failing sell.
    pub fn queue_sell_failure(&self, msg: &str) {
        self.sells.lock().unwrap().push_back(Err(msg.to_string()));
    }

    /// Queue a sell that fills at `price`.
    pub fn queue_sell(&self, price: Decimal) {
        self.sells.lock().unwrap().push_back(Ok(price));
    }

    pub fn set_sell_price(&self, price: Decimal) {
        *self.sell_price.lock().unwrap() = price;
    }

    pub fn buy_calls(&self) -> usize {
        self.buy_calls.load(Ordering::SeqCst)
    }

    pub fn sell_calls(&self) -> usize {
        self.sell_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExecutionVenue for ScriptedVenue {
    async fn buy(&self, id: &str, budget: Decimal) -> Result<BuyFill> {
        self.buy_calls.fetch_add(1, Ordering::SeqCst);
        if !self.buy_delay.is_zero() {
            tokio::time::sleep(self.buy_delay).await;
        }
        {
            let mut fail = self.fail_buys.lock().unwrap();
            if *fail > 0 {
                *fail -= 1;
                return Err(anyhow!("scripted buy failure for {id}"));
            }
        }
        Ok(BuyFill {
            order_id: format!("buy-{id}"),
            fill_price: self.entry_price,
            quantity: budget / self.entry_price,
        })
    }

    async fn sell(&self, id: &str, _quantity: Decimal) -> Result<SellFill> {
        self.sell_calls.fetch_add(1, Ordering::SeqCst);
        if !self.sell_delay.is_zero() {
            tokio::time::sleep(self.sell_delay).await;
        }
        let scripted = self.sells.lock().unwrap().pop_front();
        let price = match scripted {
            Some(Ok(price)) => price,
            Some(Err(msg)) => return Err(anyhow!(msg)),
            None => *self.sell_price.lock().unwrap(),
        };
        Ok(SellFill {
            order_id: format!("sell-{id}"),
            fill_price: price,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// Oracle with a settable price per identifier. Unknown ids error.
#[derive(Default)]
pub struct ScriptedOracle {
    prices: Mutex<HashMap<String, Decimal>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, id: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(id.to_string(), price);
    }
}

#[async_trait]
impl PriceOracle for ScriptedOracle {
    async fn current_price(&self, id: &str) -> Result<Decimal> {
        self.prices
            .lock()
            .unwrap()
            .get(id)
            .copied()
            .ok_or_else(|| anyhow!("no price for {id}"))
    }
}

// ---------------------------------------------------------------------------
// Sources
// ---------------------------------------------------------------------------

/// Source returning the same records every cycle, always failing, or
/// never answering.
pub struct StaticSource {
    name: String,
    records: Option<Vec<RawRecord>>,
    hangs: bool,
    calls: Arc<AtomicUsize>,
}

impl StaticSource {
    pub fn new(name: &str, records: Vec<RawRecord>) -> Self {
        Self {
            name: name.to_string(),
            records: Some(records),
            hangs: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            records: None,
            hangs: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn hanging(name: &str) -> Self {
        Self {
            hangs: true,
            ..Self::failing(name)
        }
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl SourceConnector for StaticSource {
    async fn fetch(&self) -> Result<Vec<RawRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hangs {
            std::future::pending::<()>().await;
        }
        self.records
            .clone()
            .ok_or_else(|| anyhow!("{} unavailable", self.name))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
