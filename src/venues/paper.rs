//! Paper-trading venue.
//!
//! Fills every order at the oracle's current price without touching a
//! wallet or a chain. Used for dry runs and strategy validation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::types::{short_id, BuyFill, SellFill};
use crate::venues::{ExecutionVenue, PriceOracle};

pub struct PaperVenue {
    oracle: Arc<dyn PriceOracle>,
}

impl PaperVenue {
    pub fn new(oracle: Arc<dyn PriceOracle>) -> Self {
        Self { oracle }
    }

    fn order_id() -> String {
        format!("paper-{}", uuid::Uuid::new_v4())
    }
}

#[async_trait]
impl ExecutionVenue for PaperVenue {
    async fn buy(&self, id: &str, budget: Decimal) -> Result<BuyFill> {
        if budget <= Decimal::ZERO {
            anyhow::bail!("Budget must be positive, got {budget}");
        }

        let price = self
            .oracle
            .current_price(id)
            .await
            .context("No price to fill paper buy")?;

        let quantity = budget
            .checked_div(price)
            .context("Paper buy price is zero")?;

        info!(
            id = %short_id(id),
            budget = %budget,
            price = %price,
            quantity = %quantity.round_dp(4),
            "[PAPER] Buy filled"
        );

        Ok(BuyFill {
            order_id: Self::order_id(),
            fill_price: price,
            quantity,
        })
    }

    async fn sell(&self, id: &str, quantity: Decimal) -> Result<SellFill> {
        let price = self
            .oracle
            .current_price(id)
            .await
            .context("No price to fill paper sell")?;

        info!(
            id = %short_id(id),
            quantity = %quantity.round_dp(4),
            price = %price,
            "[PAPER] Sell filled"
        );

        Ok(SellFill {
            order_id: Self::order_id(),
            fill_price: price,
        })
    }

    fn name(&self) -> &str {
        "paper"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
