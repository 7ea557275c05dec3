//! Flag check results and the wire shapes they travel in.
use serde::{Deserialize, Serialize};

use crate::context::EvaluationContext;
use crate::timestamp::Timestamp;

/// The outcome of evaluating one flag key against one context.
///
/// Produced by the remote service and cached client-side keyed by
/// (canonical context key, flag key). For metered features the optional
/// usage fields carry entitlement metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagCheckResult {
    /// The flag key this result is for.
    pub flag: String,
    /// The evaluated boolean value.
    pub value: bool,
    /// Reason code explaining how the value was derived (e.g. a rule match).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Identifier of the flag definition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_id: Option<String>,
    /// Identifier of the rule that produced the value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Identifier of the company the context resolved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    /// Identifier of the user the context resolved to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Allocated quantity for a metered feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_allocation: Option<i64>,
    /// Consumed quantity for a metered feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_usage: Option<i64>,
    /// Whether usage has exceeded the allocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_usage_exceeded: Option<bool>,
    /// Metering period (e.g. monthly) for a metered feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_usage_period: Option<String>,
    /// When the current metering period resets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_usage_reset_at: Option<Timestamp>,
}

/// Message sent over the WebSocket to request flag bootstrapping for a context:
/// `{ "apiKey": ..., "data": <EvaluationContext> }`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BootstrapRequest<'a> {
    pub api_key: &'a str,
    pub data: &'a EvaluationContext,
}

/// A full set of flag values pushed by the server for one context. Replaces all
/// prior cached values for that context.
#[derive(Debug, Deserialize)]
pub(crate) struct FlagSnapshot {
    pub flags: Vec<FlagCheckResult>,
}

/// REST envelope for `POST /flags/{key}/check`.
#[derive(Debug, Deserialize)]
pub(crate) struct CheckFlagEnvelope {
    pub data: FlagCheckResult,
}

/// REST envelope for `POST /flags/check`.
#[derive(Debug, Deserialize)]
pub(crate) struct CheckFlagsEnvelope {
    pub data: FlagSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_snapshot() {
        let snapshot: FlagSnapshot =
            serde_json::from_str(r#"{"flags":[{"flag":"f1","value":true,"reason":"rule"}]}"#)
                .unwrap();

        assert_eq!(snapshot.flags.len(), 1);
        assert_eq!(snapshot.flags[0].flag, "f1");
        assert!(snapshot.flags[0].value);
        assert_eq!(snapshot.flags[0].reason.as_deref(), Some("rule"));
        assert_eq!(snapshot.flags[0].feature_usage, None);
    }

    #[test]
    fn parses_metered_metadata() {
        let result: FlagCheckResult = serde_json::from_str(
            r#"{
                "flag": "seats",
                "value": false,
                "reason": "usage exceeded",
                "featureAllocation": 5,
                "featureUsage": 7,
                "featureUsageExceeded": true,
                "featureUsagePeriod": "current_month"
            }"#,
        )
        .unwrap();

        assert_eq!(result.feature_allocation, Some(5));
        assert_eq!(result.feature_usage, Some(7));
        assert_eq!(result.feature_usage_exceeded, Some(true));
    }

    #[test]
    fn bootstrap_request_uses_camel_case() {
        let context = EvaluationContext::new();
        let request = BootstrapRequest {
            api_key: "api-key",
            data: &context,
        };

        assert_eq!(
            serde_json::to_string(&request).unwrap(),
            r#"{"apiKey":"api-key","data":{}}"#
        );
    }
}
