//! Price bar read port.

use crate::domain::error::TacalcError;
use crate::domain::ohlcv::PriceBar;

pub trait PriceBarPort {
    /// The latest `limit` bars for `symbol` at `timeframe`, oldest first.
    fn fetch_bars(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<PriceBar>, TacalcError>;
}
