use chrono::{DateTime, Duration, DurationRound, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Candle granularity a submission is scored at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1h", alias = "1H")]
    OneHour,
    #[serde(rename = "4h", alias = "4H")]
    FourHours,
    #[serde(rename = "1d", alias = "1D")]
    OneDay,
}

impl Timeframe {
    /// Binance kline interval string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::OneHour => "1h",
            Timeframe::FourHours => "4h",
            Timeframe::OneDay => "1d",
        }
    }

    pub fn period(&self) -> Duration {
        match self {
            Timeframe::OneHour => Duration::hours(1),
            Timeframe::FourHours => Duration::hours(4),
            Timeframe::OneDay => Duration::days(1),
        }
    }

    /// First candle boundary at or after `ts`. Exchange candles open on multiples of the
    /// period counted from the Unix epoch (UTC).
    pub fn align_up(&self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period();
        match ts.duration_trunc(period) {
            Ok(floor) if floor == ts => ts,
            Ok(floor) => floor + period,
            Err(_) => ts,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(Timeframe::OneHour),
            "4h" => Ok(Timeframe::FourHours),
            "1d" => Ok(Timeframe::OneDay),
            _ => Err(format!("expected 1h, 4h or 1d, got {:?}", s)),
        }
    }
}

/// Number of periods every submission in a deployment predicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub enum Horizon {
    Seven,
    Fourteen,
}

impl Horizon {
    pub fn len(&self) -> usize {
        match self {
            Horizon::Seven => 7,
            Horizon::Fourteen => 14,
        }
    }

    pub fn from_len(n: usize) -> Option<Self> {
        match n {
            7 => Some(Horizon::Seven),
            14 => Some(Horizon::Fourteen),
            _ => None,
        }
    }
}

impl TryFrom<usize> for Horizon {
    type Error = String;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        Horizon::from_len(n).ok_or_else(|| format!("unsupported horizon {} (expected 7 or 14)", n))
    }
}

impl From<Horizon> for usize {
    fn from(h: Horizon) -> Self {
        h.len()
    }
}

/// Normalize a pair such as `BTC/USDT` or `btc-usdt` into an exchange symbol (`BTCUSDT`).
pub fn normalize_pair(pair: &str) -> Option<String> {
    let symbol: String = pair
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_uppercase();
    if symbol.is_empty() {
        None
    } else {
        Some(symbol)
    }
}

/// Parse an ISO-8601 timestamp into UTC.
///
/// Offsets are honoured; naive timestamps and bare dates are taken to already be UTC,
/// which is how the bot scripts and the submission form write them.
pub fn parse_utc_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// JSON document holding every submission
    #[serde(default = "default_data_path")]
    pub data_path: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Default pair for submissions that don't name one
    #[serde(default = "default_pair")]
    pub pair: String,

    #[serde(default = "default_timeframe")]
    pub timeframe: Timeframe,

    #[serde(default = "default_horizon")]
    pub horizon: Horizon,

    #[serde(default = "default_binance_base_url")]
    pub binance_base_url: String,

    /// Upper bound on a single market data fetch
    #[serde(default = "default_market_data_timeout_secs")]
    pub market_data_timeout_secs: u64,

    /// Candles requested per fetch (Binance caps this at 1000)
    #[serde(default = "default_kline_limit")]
    pub kline_limit: usize,

    /// Serve candles from this replay file instead of Binance
    #[serde(default)]
    pub replay_path: Option<String>,
}

fn default_data_path() -> String {
    "user_predictions.json".to_string()
}
fn default_bind_addr() -> String {
    "0.0.0.0:5001".to_string()
}
fn default_pair() -> String {
    "BTCUSDT".to_string()
}
fn default_timeframe() -> Timeframe {
    Timeframe::OneHour
}
fn default_horizon() -> Horizon {
    Horizon::Seven
}
fn default_binance_base_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_market_data_timeout_secs() -> u64 {
    10
}
fn default_kline_limit() -> usize {
    1000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            bind_addr: default_bind_addr(),
            pair: default_pair(),
            timeframe: default_timeframe(),
            horizon: default_horizon(),
            binance_base_url: default_binance_base_url(),
            market_data_timeout_secs: default_market_data_timeout_secs(),
            kline_limit: default_kline_limit(),
            replay_path: None,
        }
    }
}

impl Config {
    /// Load from TOML file
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// TOML file named by `POI_CONFIG_PATH` (if any), then `POI_*` environment overrides.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = match std::env::var("POI_CONFIG_PATH") {
            Ok(path) => Self::load(&path)
                .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", path, e))?,
            Err(_) => Self::default(),
        };

        if let Ok(v) = std::env::var("POI_DATA_PATH") {
            config.data_path = v;
        }
        if let Ok(v) = std::env::var("POI_BIND_ADDR") {
            config.bind_addr = v;
        } else if let Ok(port) = std::env::var("PORT") {
            let port: u16 = port.parse().unwrap_or(5001);
            config.bind_addr = format!("0.0.0.0:{}", port);
        }
        if let Ok(v) = std::env::var("POI_PAIR") {
            config.pair = normalize_pair(&v)
                .ok_or_else(|| anyhow::anyhow!("POI_PAIR is not a valid pair: {:?}", v))?;
        }
        if let Ok(v) = std::env::var("POI_TIMEFRAME") {
            config.timeframe = v
                .parse()
                .map_err(|e| anyhow::anyhow!("POI_TIMEFRAME: {}", e))?;
        }
        if let Ok(v) = std::env::var("POI_HORIZON") {
            let n: usize = v
                .parse()
                .map_err(|_| anyhow::anyhow!("POI_HORIZON must be a number, got {:?}", v))?;
            config.horizon = Horizon::try_from(n).map_err(anyhow::Error::msg)?;
        }
        if let Ok(v) = std::env::var("POI_BINANCE_BASE_URL") {
            config.binance_base_url = v;
        }
        if let Ok(v) = std::env::var("POI_REPLAY_PATH") {
            config.replay_path = Some(v).filter(|p| !p.trim().is_empty());
        }
        config.market_data_timeout_secs = std::env::var("POI_MARKET_DATA_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.market_data_timeout_secs);
        config.kline_limit = std::env::var("POI_KLINE_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(config.kline_limit)
            .min(1000);

        Ok(config)
    }
}

/// Resolve a data file location. Blank or missing values fall back to `default_filename`;
/// relative paths are anchored at the crate directory, not the caller's cwd, so the server
/// and `poi-bot` agree on the same file.
pub fn resolve_data_path(value: Option<&str>, default_filename: &str) -> PathBuf {
    let base = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return base.join(default_filename);
    };

    let p = PathBuf::from(raw);
    if p.is_absolute() {
        return p;
    }
    base.join(p)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_timeframe_parsing() {
        assert_eq!("1H".parse::<Timeframe>(), Ok(Timeframe::OneHour));
        assert_eq!("4h".parse::<Timeframe>(), Ok(Timeframe::FourHours));
        assert_eq!(" 1D ".parse::<Timeframe>(), Ok(Timeframe::OneDay));
        assert!("15m".parse::<Timeframe>().is_err());

        let tf: Timeframe = serde_json::from_str(r#""4H""#).unwrap();
        assert_eq!(tf, Timeframe::FourHours);
        assert_eq!(serde_json::to_string(&tf).unwrap(), r#""4h""#);
        assert_eq!(Timeframe::OneDay.period(), Duration::hours(24));
    }

    #[test]
    fn test_align_up_to_candle_boundary() {
        let on_hour = Utc.with_ymd_and_hms(2025, 1, 1, 5, 0, 0).unwrap();
        assert_eq!(Timeframe::OneHour.align_up(on_hour), on_hour);

        let half_past = Utc.with_ymd_and_hms(2025, 1, 1, 0, 30, 0).unwrap();
        assert_eq!(
            Timeframe::OneHour.align_up(half_past),
            Utc.with_ymd_and_hms(2025, 1, 1, 1, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::FourHours.align_up(Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap()),
            Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(
            Timeframe::OneDay.align_up(half_past),
            Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_resolve_data_path() {
        let base = Path::new(env!("CARGO_MANIFEST_DIR"));
        let default = Config::default();

        assert_eq!(
            resolve_data_path(Some(default.data_path.as_str()), "user_predictions.json"),
            base.join("user_predictions.json")
        );
        assert_eq!(
            resolve_data_path(None, "user_predictions.json"),
            base.join("user_predictions.json")
        );
        assert_eq!(
            resolve_data_path(Some("  "), "user_predictions.json"),
            base.join("user_predictions.json")
        );
        assert_eq!(
            resolve_data_path(Some("data/p.json"), "user_predictions.json"),
            base.join("data/p.json")
        );
        assert_eq!(
            resolve_data_path(Some("/var/lib/poi/p.json"), "user_predictions.json"),
            PathBuf::from("/var/lib/poi/p.json")
        );
    }

    #[test]
    fn test_horizon_conversion() {
        assert_eq!(Horizon::from_len(7), Some(Horizon::Seven));
        assert_eq!(Horizon::from_len(14), Some(Horizon::Fourteen));
        assert_eq!(Horizon::from_len(10), None);
        assert!(Horizon::try_from(3).is_err());
    }

    #[test]
    fn test_normalize_pair() {
        assert_eq!(normalize_pair("BTC/USDT").as_deref(), Some("BTCUSDT"));
        assert_eq!(normalize_pair("eth-usdt").as_deref(), Some("ETHUSDT"));
        assert_eq!(normalize_pair(" / "), None);
    }

    #[test]
    fn test_parse_utc_timestamp_forms() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        assert_eq!(parse_utc_timestamp("2025-03-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_utc_timestamp("2025-03-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_utc_timestamp("2025-03-01T12:00:00"), Some(expected));
        assert_eq!(parse_utc_timestamp("2025-03-01T12:00"), Some(expected));
        assert_eq!(parse_utc_timestamp("2025-03-01 12:00:00"), Some(expected));

        let fractional = parse_utc_timestamp("2025-03-01T12:00:00.123456").unwrap();
        assert_eq!(fractional.nanosecond(), 123_456_000);

        let midnight = parse_utc_timestamp("2025-03-01").unwrap();
        assert_eq!(midnight, Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_utc_timestamp_rejects_garbage() {
        assert_eq!(parse_utc_timestamp(""), None);
        assert_eq!(parse_utc_timestamp("tomorrow"), None);
        assert_eq!(parse_utc_timestamp("2025-13-01T00:00:00"), None);
    }

    #[test]
    fn test_config_from_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            data_path = "/tmp/poi.json"
            timeframe = "4h"
            horizon = 14
            "#,
        )
        .unwrap();

        assert_eq!(config.data_path, "/tmp/poi.json");
        assert_eq!(config.timeframe, Timeframe::FourHours);
        assert_eq!(config.horizon, Horizon::Fourteen);
        assert_eq!(config.pair, "BTCUSDT");
        assert_eq!(config.market_data_timeout_secs, 10);
    }

    #[test]
    fn test_config_rejects_bad_horizon() {
        let parsed: Result<Config, _> = toml::from_str("horizon = 10");
        assert!(parsed.is_err());
    }
}
