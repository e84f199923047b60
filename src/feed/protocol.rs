//! Wire format of the upstream game feed
//!
//! Every frame is a JSON array. Outbound requests are addressed to a zone
//! and plugin; inbound pushes carry a numeric tag followed by a body whose
//! `cmd` field names the event.
//!
//! ```text
//! auth      [1, "MiniGame", "", "", {"agentId", "accessToken", "reconnect": false}]
//! request   ["6", "MiniGame", "aviatorPlugin", {"cmd": 100000, "f": true}]
//! push      [5, {"cmd": 100007, "sid": 123, "odd": 1.87, ...}]
//! ```

use crate::error::{Error, Result};
use crate::types::Outcome;
use serde_json::{json, Value};

/// Tag of the login frame
pub const TAG_AUTH: i64 = 1;
/// Tag of plugin requests (sent as a string)
pub const TAG_PLUGIN_REQUEST: &str = "6";
/// Tag of server pushes
pub const TAG_PUSH: i64 = 5;

/// Subscribe to round events
pub const CMD_SUBSCRIBE: i64 = 100000;
/// Full game state
pub const CMD_GAME_STATE: i64 = 100016;
/// Finished round result (request and push)
pub const CMD_ROUND_RESULT: i64 = 100007;

/// Where plugin requests are routed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub zone: String,
    pub plugin: String,
}

/// Frames we send
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Authenticate { agent_id: String, access_token: String },
    Subscribe,
    RequestGameState,
    RequestLatestResult,
}

impl Outbound {
    pub fn label(&self) -> &'static str {
        match self {
            Outbound::Authenticate { .. } => "authenticate",
            Outbound::Subscribe => "subscribe",
            Outbound::RequestGameState => "game state request",
            Outbound::RequestLatestResult => "latest result request",
        }
    }

    /// Serialize to the text frame the feed expects
    pub fn encode(&self, route: &Route) -> String {
        let frame = match self {
            Outbound::Authenticate {
                agent_id,
                access_token,
            } => json!([
                TAG_AUTH,
                route.zone,
                "",
                "",
                {
                    "agentId": agent_id,
                    "accessToken": access_token,
                    "reconnect": false
                }
            ]),
            Outbound::Subscribe => plugin_request(route, json!({ "cmd": CMD_SUBSCRIBE, "f": true })),
            Outbound::RequestGameState => plugin_request(route, json!({ "cmd": CMD_GAME_STATE })),
            Outbound::RequestLatestResult => {
                plugin_request(route, json!({ "cmd": CMD_ROUND_RESULT }))
            }
        };
        frame.to_string()
    }
}

fn plugin_request(route: &Route, body: Value) -> Value {
    json!([TAG_PLUGIN_REQUEST, route.zone, route.plugin, body])
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A finished round with a usable id and multiplier
    RoundResult(Outcome),
    /// Round result push with a missing or falsy `sid`/`odd`
    IncompleteResult,
    /// Push for a command we do not act on
    Push { cmd: Option<i64> },
    /// Any other array frame (login replies, acks, heartbeats)
    Other,
}

/// Decode one text payload.
///
/// Fails only when the payload is not JSON or not an array; callers drop
/// those silently.
pub fn decode(payload: &str) -> Result<Inbound> {
    let value: Value = serde_json::from_str(payload)?;
    let frame = value
        .as_array()
        .ok_or_else(|| Error::Protocol("frame is not a JSON array".to_string()))?;

    let tag = frame.first().and_then(Value::as_i64);
    match (tag, frame.get(1)) {
        (Some(TAG_PUSH), Some(body)) => Ok(decode_push(body)),
        _ => Ok(Inbound::Other),
    }
}

fn decode_push(body: &Value) -> Inbound {
    let cmd = body.get("cmd").and_then(Value::as_i64);
    match cmd {
        Some(CMD_ROUND_RESULT) => match round_result(body) {
            Some(outcome) => Inbound::RoundResult(outcome),
            None => Inbound::IncompleteResult,
        },
        _ => Inbound::Push { cmd },
    }
}

fn round_result(body: &Value) -> Option<Outcome> {
    let session_id = session_id(body.get("sid")?)?;
    let multiplier = multiplier(body.get("odd")?)?;
    Some(Outcome {
        session_id,
        multiplier,
    })
}

/// Non-empty string or non-zero number
fn session_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) if n.as_f64().is_some_and(|f| f != 0.0) => Some(n.to_string()),
        _ => None,
    }
}

/// Positive finite number, also accepted as a numeric string
fn multiplier(value: &Value) -> Option<f64> {
    let odd = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    (odd.is_finite() && odd > 0.0).then_some(odd)
}
