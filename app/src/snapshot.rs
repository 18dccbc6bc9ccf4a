//! Parsing of agent responses into snapshots and display transcripts.
//!
//! The agent's payload shape evolves, so every field except the token pair is
//! optional. Missing or unreadable fields are left out of the transcript
//! instead of failing the parse.

use crate::{
    amount,
    error::ParseError,
    protocol::RawResponse,
    tokens::{Token, TokenRegistry},
};
use chrono::DateTime;
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Line shown when the agent has not reported an opportunity yet.
pub const NO_OPPORTUNITY_LINE: &str = "No opportunity yet, agent is still searching";

/// Header preceding the per-DEX price lines.
pub const DEX_PRICES_HEADER: &str = "DEX Prices:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentStatus {
    Stopped,
    Running,
    Unknown,
}

impl AgentStatus {
    /// The agent only serves data while running, so an absent status means
    /// Running. A status that is not a string is Unknown.
    fn from_payload(raw: Option<&Value>) -> Self {
        let status = match raw {
            None | Some(Value::Null) => return AgentStatus::Running,
            Some(Value::String(s)) => s.trim().to_ascii_lowercase(),
            Some(other) => {
                warn!(status = %other, "status is not a string");
                return AgentStatus::Unknown;
            }
        };
        match status.as_str() {
            "" => AgentStatus::Running,
            "running" | "active" | "enabled" => AgentStatus::Running,
            "stopped" | "idle" | "disabled" => AgentStatus::Stopped,
            _ => AgentStatus::Unknown,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentStatus::Stopped => write!(f, "Stopped"),
            AgentStatus::Running => write!(f, "Running"),
            AgentStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A profitable trade reported by the agent. Never built locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opportunity {
    pub timestamp_seconds: i64,
    pub input_amount: i128,
    pub output_amount: i128,
    pub profit: i128,
    pub buy_dex_id: Option<String>,
    pub sell_dex_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexPrice {
    pub dex_id: String,
    pub price: String,
}

/// Normalised view of the agent. Amounts are in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSnapshot {
    pub status: AgentStatus,
    pub input_token: Token,
    pub target_token: Token,
    pub balance: Option<i128>,
    pub total_profit: Option<i128>,
    pub slippage_percent: Option<String>,
    pub min_profit_threshold: Option<i128>,
    pub dex_count: Option<u64>,
    pub last_opportunity: Option<Opportunity>,
    /// In discovery order.
    pub dex_prices: Vec<DexPrice>,
}

impl AgentSnapshot {
    pub fn total_profit_display(&self) -> Option<String> {
        self.total_profit.and_then(|p| amount::to_display(p).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSnapshot {
    pub snapshot: AgentSnapshot,
    pub transcript: Vec<String>,
}

/// Result of the one-shot `Status` probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub enabled: bool,
    pub input_token: Option<Token>,
    pub target_token: Option<Token>,
}

impl StatusReport {
    /// Interim transcript shown until the first full snapshot arrives.
    pub fn transcript(&self) -> Vec<String> {
        if !self.enabled {
            return Vec::new();
        }
        let describe = |token: &Option<Token>| match token {
            Some(t) => format!("{} ({})", t.symbol, t.address),
            None => "-".to_string(),
        };
        vec![
            format!("Status: {}", AgentStatus::Running),
            format!("Input Token: {}", describe(&self.input_token)),
            format!("Target Token: {}", describe(&self.target_token)),
            NO_OPPORTUNITY_LINE.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotParser {
    registry: TokenRegistry,
}

impl SnapshotParser {
    pub fn new(registry: TokenRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TokenRegistry {
        &self.registry
    }

    /// Interpret a `Status` response. `Enabled` must be literally true.
    pub fn parse_status(&self, raw: &RawResponse) -> StatusReport {
        let enabled = raw.tag_is_true("Enabled");
        StatusReport {
            enabled,
            input_token: raw.tag("InputToken").map(|a| self.registry.by_address(a)),
            target_token: raw.tag("TargetToken").map(|a| self.registry.by_address(a)),
        }
    }

    /// Interpret a `GetArbitrageData` response.
    pub fn parse(&self, raw: &RawResponse) -> Result<ParsedSnapshot, ParseError> {
        let data = raw.data.as_deref().ok_or(ParseError::MissingData)?;
        let payload: Value =
            serde_json::from_str(data).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
        let snapshot = self.parse_payload(&payload)?;
        let transcript = self.transcript(&snapshot);
        Ok(ParsedSnapshot { snapshot, transcript })
    }

    pub fn parse_payload(&self, payload: &Value) -> Result<AgentSnapshot, ParseError> {
        let obj = payload.as_object().ok_or_else(|| {
            ParseError::UnexpectedShape(format!("expected an object, got {}", kind_of(payload)))
        })?;

        let token = |key: &str| {
            let address = obj.get(key).and_then(text).unwrap_or_default();
            self.registry.by_address(&address)
        };

        Ok(AgentSnapshot {
            status: AgentStatus::from_payload(obj.get("status")),
            input_token: token("inputToken"),
            target_token: token("targetToken"),
            balance: optional_amount(obj, "balance"),
            total_profit: optional_amount(obj, "totalProfit"),
            slippage_percent: obj.get("slippage").and_then(text),
            min_profit_threshold: optional_amount(obj, "minProfitThreshold"),
            dex_count: optional_count(obj, "dexCount"),
            last_opportunity: obj.get("lastOpportunity").and_then(parse_opportunity),
            dex_prices: obj
                .get("dexPrices")
                .and_then(Value::as_object)
                .map(parse_dex_prices)
                .unwrap_or_default(),
        })
    }

    /// Build the display transcript. The line order is fixed.
    pub fn transcript(&self, snapshot: &AgentSnapshot) -> Vec<String> {
        let symbol = &snapshot.input_token.symbol;
        let show = |base: i128| amount::to_display(base).unwrap_or_else(|_| base.to_string());

        let mut lines = vec![
            format!("Status: {}", snapshot.status),
            format!("Input Token: {}", snapshot.input_token.symbol),
            format!("Target Token: {}", snapshot.target_token.symbol),
        ];

        if let Some(balance) = snapshot.balance {
            lines.push(format!("Current Balance: {} {}", show(balance), symbol));
        }
        if let Some(profit) = snapshot.total_profit {
            lines.push(format!("Total Profit: {} {}", show(profit), symbol));
        }
        if let Some(slippage) = &snapshot.slippage_percent {
            lines.push(format!("Slippage: {}%", slippage));
        }
        if let Some(threshold) = snapshot.min_profit_threshold {
            lines.push(format!("Min Profit Threshold: {} {}", show(threshold), symbol));
        }
        if let Some(count) = snapshot.dex_count {
            lines.push(format!("DEX Count: {}", count));
        }

        match &snapshot.last_opportunity {
            Some(o) => {
                lines.push(format!(
                    "Last Opportunity at: {}",
                    format_timestamp(o.timestamp_seconds)
                ));
                lines.push(format!("Input Amount: {} {}", show(o.input_amount), symbol));
                lines.push(format!("Output Amount: {} {}", show(o.output_amount), symbol));
                lines.push(format!("Profit: {} {}", show(o.profit), symbol));
                if let (Some(buy), Some(sell)) = (&o.buy_dex_id, &o.sell_dex_id) {
                    lines.push(format!("Buy DEX: {}...", short_id(buy)));
                    lines.push(format!("Sell DEX: {}...", short_id(sell)));
                }
            }
            None => lines.push(NO_OPPORTUNITY_LINE.to_string()),
        }

        if !snapshot.dex_prices.is_empty() {
            lines.push(DEX_PRICES_HEADER.to_string());
            for (index, dex) in snapshot.dex_prices.iter().enumerate() {
                lines.push(format!("  Dex{}: {}", index + 1, dex.price));
            }
        }

        lines
    }
}

fn parse_opportunity(value: &Value) -> Option<Opportunity> {
    let obj = value.as_object()?;
    let timestamp = obj.get("timestamp").and_then(signed);
    let input = obj.get("inputAmount").and_then(|v| amount::parse_base_units(v).ok());
    let output = obj.get("outputAmount").and_then(|v| amount::parse_base_units(v).ok());
    let profit = obj.get("profit").and_then(|v| amount::parse_base_units(v).ok());

    match (timestamp, input, output, profit) {
        (Some(timestamp_seconds), Some(input_amount), Some(output_amount), Some(profit)) => {
            Some(Opportunity {
                timestamp_seconds,
                input_amount,
                output_amount,
                profit,
                buy_dex_id: obj.get("buyDex").and_then(text),
                sell_dex_id: obj.get("sellDex").and_then(text),
            })
        }
        _ => {
            warn!(payload = %value, "dropping incomplete lastOpportunity block");
            None
        }
    }
}

fn parse_dex_prices(map: &Map<String, Value>) -> Vec<DexPrice> {
    map.iter()
        .filter_map(|(dex_id, info)| {
            let price = match info {
                Value::Object(fields) => fields.get("price").and_then(text),
                other => text(other),
            };
            match price {
                Some(price) => Some(DexPrice { dex_id: dex_id.clone(), price }),
                None => {
                    warn!(dex_id = %dex_id, "dex price entry without a price");
                    None
                }
            }
        })
        .collect()
}

fn optional_amount(obj: &Map<String, Value>, key: &str) -> Option<i128> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    match amount::parse_base_units(value) {
        Ok(v) => Some(v),
        Err(e) => {
            warn!(field = key, error = %e, "ignoring unreadable amount");
            None
        }
    }
}

fn optional_count(obj: &Map<String, Value>, key: &str) -> Option<u64> {
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    let count = match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| *f >= 0.0 && f.fract() == 0.0 && *f <= u32::MAX as f64)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if count.is_none() {
        warn!(field = key, value = %value, "ignoring unreadable count");
    }
    count
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn signed(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

fn format_timestamp(seconds: i64) -> String {
    DateTime::from_timestamp(seconds, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| seconds.to_string())
}
