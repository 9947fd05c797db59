pub mod shortener;
pub mod worker;

pub use self::shortener::{Shortener, UrlRecord};
pub use self::worker::{AnalyticsStores, AnalyticsWorker};
