pub mod yahoo;

use error_stack::Report;
use futures::future::BoxFuture;

use crate::error::FetchError;
use crate::model::PricePoint;

/// Abstraction over an upstream price feed.
///
/// Uses `BoxFuture` instead of `async fn` in trait to keep the trait
/// object-safe (`dyn PriceSource`).
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &str;

    /// Current price as a finite positive number.
    fn fetch_price(&self) -> BoxFuture<'_, Result<f64, Report<FetchError>>>;

    /// Daily closing prices for roughly the last `days` days, oldest first.
    fn fetch_history(&self, days: u32) -> BoxFuture<'_, Result<Vec<PricePoint>, Report<FetchError>>>;
}
