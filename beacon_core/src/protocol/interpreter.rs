/**
 * Response interpretation — turns a raw HTTP response into an `Outcome`
 * and pulls the server-directed fields out of a parsed body.
 *
 * Stateless: every function takes what it needs and returns a fresh value.
 */
use serde_json::{Map, Value};

use super::constants::{ASK_IN_KEY, ATTRIBUTION_KEY, DEEPLINK_KEY};
use super::types::{Attribution, DeepLink, Event, Outcome};
use crate::logger::Logger;
use crate::transport::RawResponse;

pub struct ResponseInterpreter;

impl ResponseInterpreter {
    /**
     * Builds the outcome of a completed round trip.
     *
     * - Empty body → unsuccessful outcome without JSON.
     * - Body that is not a JSON object → unsuccessful outcome without JSON,
     *   `message` explains the parse failure.
     * - JSON object → `json_response`, `message`, `timestamp`, `adid` are
     *   filled in; `success` only for HTTP 200.
     *
     * The server's `message` is logged at info level on success and at
     * error level otherwise.
     */
    pub fn interpret(response: &RawResponse, event: &Event, logger: &dyn Logger) -> Outcome {
        let mut outcome = Outcome::for_event(event);
        outcome.responded = true;
        outcome.status = Some(response.status);

        logger.verbose(&format!("Response: {}", response.body));

        if response.body.is_empty() {
            return outcome;
        }

        let json = match serde_json::from_str::<Value>(&response.body) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let message = format!(
                    "Failed to parse json response. (expected an object, got {})",
                    json_type(&other)
                );
                logger.error(&message);
                outcome.message = Some(message);
                return outcome;
            }
            Err(e) => {
                let message = format!("Failed to parse json response. ({e})");
                logger.error(&message);
                outcome.message = Some(message);
                return outcome;
            }
        };

        outcome.message = string_field(&json, "message");
        outcome.timestamp = string_field(&json, "timestamp");
        outcome.adid = string_field(&json, "adid");

        let message = outcome
            .message
            .clone()
            .unwrap_or_else(|| "No message found".to_string());

        if response.status == 200 {
            logger.info(&message);
            outcome.success = true;
        } else {
            logger.error(&message);
        }

        outcome.json_response = Some(json);
        outcome
    }

    /**
     * Server-requested delay before asking for attribution again, in ms.
     *
     * Accepts integers, floats (truncated) and numeric strings, fractional
     * ones included. Anything missing, negative or unreadable means "no
     * backoff requested".
     */
    pub fn ask_in(json: &Map<String, Value>) -> Option<u64> {
        let millis = match json.get(ASK_IN_KEY)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?,
            Value::String(s) => {
                let s = s.trim();
                let fractional = || s.parse::<f64>().ok().filter(|f| f.is_finite());
                s.parse::<i64>().ok().or_else(|| fractional().map(|f| f as i64))?
            }
            _ => return None,
        };

        u64::try_from(millis).ok()
    }

    /// Decodes the `attribution` object; `None` when absent or not an object.
    pub fn attribution(json: &Map<String, Value>) -> Option<Attribution> {
        let object = json.get(ATTRIBUTION_KEY)?.as_object()?;

        let field = |key: &str| string_field(object, key);

        Some(Attribution {
            tracker_token: field("tracker_token"),
            tracker_name: field("tracker_name"),
            network: field("network"),
            campaign: field("campaign"),
            adgroup: field("adgroup"),
            creative: field("creative"),
            click_label: field("click_label"),
        })
    }

    /**
     * `attribution.deeplink` as a URI. Any other shape (missing object,
     * missing key, null, non-string, unparseable) yields `None`.
     */
    pub fn deep_link(json: &Map<String, Value>) -> Option<DeepLink> {
        let raw = json
            .get(ATTRIBUTION_KEY)?
            .as_object()?
            .get(DEEPLINK_KEY)?
            .as_str()?;

        DeepLink::parse(raw)
    }
}

/// String value of `key`; scalars are stringified, null and containers are ignored.
fn string_field(json: &Map<String, Value>, key: &str) -> Option<String> {
    match json.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
