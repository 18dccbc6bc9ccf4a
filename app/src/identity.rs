//! Operator identity as provided by the wallet.
//!
//! Only the wallet address comes from local configuration. The operator's
//! own process is looked up on the registry process on every start, so a
//! re-registered wallet is picked up without touching local state.

use crate::{
    client::AgentClient,
    config::AppConfig,
    error::{FetchError, ParseError},
    protocol::{Action, RawResponse, Tag},
};
use serde_json::Value;
use tracing::{debug, info};

/// Connected wallet and the operator's own process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub wallet_address: Option<String>,
    pub caller_process_id: Option<String>,
}

impl Identity {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            wallet_address: config.wallet_address.clone(),
            caller_process_id: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.wallet_address.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn active_address(&self) -> Option<&str> {
        self.wallet_address.as_deref().filter(|_| self.is_connected())
    }

    /// Connected and the caller process is known.
    pub fn has_session(&self) -> bool {
        self.is_connected() && self.caller_process_id.as_deref().is_some_and(|p| !p.is_empty())
    }

    /// Get short display version of the wallet address.
    pub fn short_address(&self) -> Option<String> {
        self.active_address().map(|addr| {
            let chars: Vec<char> = addr.chars().collect();
            if chars.len() > 16 {
                let head: String = chars[..8].iter().collect();
                let tail: String = chars[chars.len() - 6..].iter().collect();
                format!("{}...{}", head, tail)
            } else {
                addr.to_string()
            }
        })
    }

    /// Fill in the caller process from the registry unless one was given
    /// for this run.
    pub async fn discover_session(
        &mut self,
        client: &AgentClient,
        main_process_id: &str,
    ) -> Result<(), FetchError> {
        if self.has_session() {
            return Ok(());
        }
        let Some(wallet) = self.active_address().map(str::to_string) else {
            return Ok(());
        };
        self.caller_process_id = lookup_caller_process(client, main_process_id, &wallet).await?;
        Ok(())
    }
}

/// Ask the registry which process belongs to `wallet_address`.
pub async fn lookup_caller_process(
    client: &AgentClient,
    main_process_id: &str,
    wallet_address: &str,
) -> Result<Option<String>, FetchError> {
    let raw = client
        .query(
            main_process_id,
            &[
                Tag::action(Action::GetUser),
                Tag::new("Wallet_Address", wallet_address),
            ],
        )
        .await?;
    let process = parse_user_record(&raw)?;
    match &process {
        Some(pid) => info!(process_id = %pid, "caller process found"),
        None => debug!(wallet = wallet_address, "wallet has no registered process"),
    }
    Ok(process)
}

/// The registry answers with a list of user records; the first one wins.
fn parse_user_record(raw: &RawResponse) -> Result<Option<String>, ParseError> {
    let data = raw.data.as_deref().ok_or(ParseError::MissingData)?;
    let payload: Value =
        serde_json::from_str(data).map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let record = match &payload {
        Value::Array(items) => items.first(),
        Value::Object(_) => Some(&payload),
        other => {
            return Err(ParseError::UnexpectedShape(format!(
                "expected a user record, got {}",
                other
            )))
        }
    };
    Ok(record
        .and_then(|r| r.get("Process_ID"))
        .and_then(Value::as_str)
        .filter(|pid| !pid.is_empty())
        .map(str::to_string))
}
