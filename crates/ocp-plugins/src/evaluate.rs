//! Pure evaluation of a single plugin sample into a lifecycle record.
//!
//! Evaluation never throws; unexpected/malformed samples are handled
//! by the ordered rule chain itself, falling through to `unknown`.

use chrono::Utc;
use ocp_schemas::{PluginReasonCode, PluginRecord, PluginSample, PluginStatus};

pub const DEFAULT_QUARANTINE_THRESHOLD: u32 = 2;

fn status_str(status: PluginStatus) -> &'static str {
    match status {
        PluginStatus::Healthy => "healthy",
        PluginStatus::Degraded => "degraded",
        PluginStatus::Unknown => "unknown",
    }
}

fn reason_str(reason: PluginReasonCode) -> &'static str {
    match reason {
        PluginReasonCode::Ok => "ok",
        PluginReasonCode::MissingHeartbeat => "missing-heartbeat",
        PluginReasonCode::MissingDependency => "missing-dependency",
        PluginReasonCode::CrashLoop => "crash-loop",
        PluginReasonCode::PolicyViolation => "policy-violation",
        PluginReasonCode::NotDiscovered => "not-discovered",
        PluginReasonCode::NotConfigured => "not-configured",
    }
}

/// Evaluates `sample` against the ordered rule chain, folding in
/// `previous` (if any) only to compute `transition_reason` and to
/// enforce quarantine monotonicity.
pub fn evaluate(
    sample: &PluginSample,
    previous: Option<&PluginRecord>,
    quarantine_threshold: u32,
) -> PluginRecord {
    let (status, reason_code, rule_quarantine) = if sample.crash_count >= quarantine_threshold {
        (PluginStatus::Degraded, PluginReasonCode::CrashLoop, true)
    } else if sample.policy_violation {
        (PluginStatus::Degraded, PluginReasonCode::PolicyViolation, true)
    } else if !sample.discovered {
        (PluginStatus::Unknown, PluginReasonCode::NotDiscovered, false)
    } else if !sample.configured {
        (PluginStatus::Unknown, PluginReasonCode::NotConfigured, false)
    } else if !sample.dependency_ok {
        (PluginStatus::Degraded, PluginReasonCode::MissingDependency, false)
    } else if !sample.heartbeat_ok {
        (PluginStatus::Degraded, PluginReasonCode::MissingHeartbeat, false)
    } else {
        (PluginStatus::Healthy, PluginReasonCode::Ok, false)
    };

    let was_quarantined = previous.is_some_and(|p| p.quarantine);
    let is_healthy_this_round = matches!(status, PluginStatus::Healthy);

    // Quarantine is monotonic: once set, it only clears on a healthy
    // evaluation (rules 1 and 2 both having ceased to apply).
    let quarantine = if rule_quarantine {
        true
    } else if was_quarantined {
        !is_healthy_this_round
    } else {
        false
    };

    let previous_status_str = previous.map(|p| status_str(p.status)).unwrap_or("unknown");
    let transition_reason = format!(
        "{previous_status_str}→{}:{}",
        status_str(status),
        reason_str(reason_code)
    );

    PluginRecord {
        name: sample.name.clone(),
        status,
        quarantine,
        reason_code,
        transition_reason,
        crash_count: sample.crash_count,
        last_seen: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str) -> PluginSample {
        PluginSample {
            name: name.to_string(),
            configured: true,
            discovered: true,
            heartbeat_ok: true,
            dependency_ok: true,
            policy_violation: false,
            crash_count: 0,
        }
    }

    #[test]
    fn all_true_is_healthy() {
        let record = evaluate(&sample("p"), None, DEFAULT_QUARANTINE_THRESHOLD);
        assert_eq!(record.status, PluginStatus::Healthy);
        assert_eq!(record.reason_code, PluginReasonCode::Ok);
        assert!(!record.quarantine);
    }

    #[test]
    fn missing_heartbeat_degrades() {
        let mut s = sample("p");
        s.heartbeat_ok = false;
        let record = evaluate(&s, None, DEFAULT_QUARANTINE_THRESHOLD);
        assert_eq!(record.status, PluginStatus::Degraded);
        assert_eq!(record.reason_code, PluginReasonCode::MissingHeartbeat);
    }

    #[test]
    fn crash_loop_quarantines() {
        let mut s = sample("p");
        s.crash_count = 2;
        let record = evaluate(&s, None, DEFAULT_QUARANTINE_THRESHOLD);
        assert_eq!(record.reason_code, PluginReasonCode::CrashLoop);
        assert!(record.quarantine);
        assert!(record.status == PluginStatus::Degraded);
    }

    #[test]
    fn quarantine_is_monotonic_until_healthy_observed() {
        let mut s = sample("p");
        s.crash_count = 2;
        let quarantined = evaluate(&s, None, DEFAULT_QUARANTINE_THRESHOLD);
        assert!(quarantined.quarantine);

        // crash count clears but heartbeat still missing: rules 1/2
        // no longer apply, yet quarantine must remain set because no
        // healthy evaluation has occurred yet.
        let mut s2 = sample("p");
        s2.heartbeat_ok = false;
        let still_quarantined = evaluate(&s2, Some(&quarantined), DEFAULT_QUARANTINE_THRESHOLD);
        assert!(still_quarantined.quarantine);
        assert_eq!(still_quarantined.reason_code, PluginReasonCode::MissingHeartbeat);

        // fully healthy sample clears quarantine.
        let healthy_again = evaluate(&sample("p"), Some(&still_quarantined), DEFAULT_QUARANTINE_THRESHOLD);
        assert!(!healthy_again.quarantine);
        assert_eq!(healthy_again.status, PluginStatus::Healthy);
    }

    #[test]
    fn evaluation_is_pure_given_same_sample_and_no_prior_state() {
        let a = evaluate(&sample("p"), None, DEFAULT_QUARANTINE_THRESHOLD);
        let b = evaluate(&sample("p"), None, DEFAULT_QUARANTINE_THRESHOLD);
        assert_eq!(a.status, b.status);
        assert_eq!(a.reason_code, b.reason_code);
        assert_eq!(a.quarantine, b.quarantine);
    }

    #[test]
    fn not_discovered_is_unknown_and_not_quarantined() {
        let mut s = sample("p");
        s.discovered = false;
        let record = evaluate(&s, None, DEFAULT_QUARANTINE_THRESHOLD);
        assert_eq!(record.status, PluginStatus::Unknown);
        assert_eq!(record.reason_code, PluginReasonCode::NotDiscovered);
        assert!(!record.quarantine);
    }
}
