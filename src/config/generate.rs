pub fn generate_starter_config() -> String {
    r#"# =============================================================================
# GATHER CONFIGURATION
# =============================================================================
# A batch forecast request is fanned out as one message per city, each city is
# looked up by a worker, and the per-city results are aggregated back into a
# single report for the caller.
#
# Config file locations (in order of precedence):
#   1. Path specified via --config argument
#   2. ~/.config/gather/config.yml
#   3. /etc/gather/config.yml
#
# Values of the form $env{NAME} are replaced with environment variables.

# =============================================================================
# WEB
# =============================================================================
web:
  # POST /api/weather/forecast, GET /api/weather/health, GET /api/status
  listen: "127.0.0.1:8080"

# =============================================================================
# DISPATCHER
# =============================================================================
dispatcher:
  # How long a forecast request waits for its aggregated report before
  # failing with a timeout
  request_timeout: 60s

# =============================================================================
# COLLECTOR
# =============================================================================
collector:
  # Incomplete aggregations older than this are dropped by the sweeper
  aggregation_timeout: 120s
  sweep_interval: 30s
  # Tasks consuming per-city results
  consumers: 4
  # Independently locked partitions of the aggregation store
  shards: 16
  # 'deduplicate' ignores a repeated result for the same city slot;
  # 'count' counts every delivery (assumes at-most-once delivery)
  duplicate_policy: deduplicate

# =============================================================================
# WORKER
# =============================================================================
worker:
  concurrency: 4
  # Applied before every provider call to stay under the provider rate limit
  pacing_delay: 1s
  provider:
    url: https://api.openweathermap.org/data/2.5/weather
    api_key: $env{OPENWEATHER_API_KEY}
    units: metric
    timeout: 10s

# =============================================================================
# BROKER
# =============================================================================
broker:
  # Bound of each in-process queue
  capacity: 1024
"#
    .to_string()
}
