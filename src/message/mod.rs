pub mod report;
pub mod unit;

pub use report::{AggregatedReport, UnitReport};
pub use unit::{CorrelationId, UnitRequest, UnitResult, WeatherPayload};
