use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{db_err, Result};
use crate::store::STOCK;

const STOCK_KEY: &str = "stock";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockLevel {
    pub amount_grams: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StockLevel {
    fn empty() -> Self {
        Self {
            amount_grams: 0,
            updated_at: None,
        }
    }
}

/// Remaining food in the feeder hopper.
#[derive(Clone)]
pub struct StockDb {
    db: Arc<Database>,
}

impl StockDb {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Current level; zero if never set.
    pub fn get(&self) -> Result<StockLevel> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(STOCK).map_err(db_err)?;
        match table.get(STOCK_KEY).map_err(db_err)? {
            Some(g) => Ok(serde_json::from_slice(g.value())?),
            None => Ok(StockLevel::empty()),
        }
    }

    pub fn set(&self, amount_grams: u64, now: DateTime<Utc>) -> Result<StockLevel> {
        self.update(now, |_| amount_grams)
    }

    /// Subtract `grams`, floored at zero.
    pub fn decrement(&self, grams: u64, now: DateTime<Utc>) -> Result<StockLevel> {
        let level = self.update(now, |current| current.saturating_sub(grams))?;
        info!(grams, remaining = level.amount_grams, "stock decremented");
        Ok(level)
    }

    fn update(&self, now: DateTime<Utc>, f: impl FnOnce(u64) -> u64) -> Result<StockLevel> {
        let wt = self.db.begin_write().map_err(db_err)?;
        let level = {
            let mut table = wt.open_table(STOCK).map_err(db_err)?;
            let current = match table.get(STOCK_KEY).map_err(db_err)? {
                Some(g) => serde_json::from_slice::<StockLevel>(g.value())?,
                None => StockLevel::empty(),
            };
            let next = StockLevel {
                amount_grams: f(current.amount_grams),
                updated_at: Some(now),
            };
            let bytes = serde_json::to_vec(&next)?;
            table.insert(STOCK_KEY, bytes.as_slice()).map_err(db_err)?;
            next
        };
        wt.commit().map_err(db_err)?;
        Ok(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::testing::open_tmp;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn unset_stock_reads_zero() {
        let (_dir, store) = open_tmp();
        let level = store.stock().get().unwrap();
        assert_eq!(level.amount_grams, 0);
        assert!(level.updated_at.is_none());
    }

    #[test]
    fn decrement_floors_at_zero() {
        let (_dir, store) = open_tmp();
        let stock = store.stock();
        stock.set(25, t0()).unwrap();
        assert_eq!(stock.decrement(10, t0()).unwrap().amount_grams, 15);
        assert_eq!(stock.decrement(40, t0()).unwrap().amount_grams, 0);
        assert_eq!(stock.get().unwrap().updated_at, Some(t0()));
    }
}
