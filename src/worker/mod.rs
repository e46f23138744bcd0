pub mod provider;
pub mod runner;

pub use provider::{OpenWeatherMapClient, ProviderError, WeatherProvider};
pub use runner::{spawn_pool, Worker};
