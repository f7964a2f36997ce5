//! Key-rotator risk composition.
//!
//! `dead` keys count fully against risk; `cooldown` keys count at half
//! weight; `healthy` keys contribute nothing. The provider-level
//! percent-used and the rotator risk combine via `max`, so a healthy
//! provider percent never masks a rotator in trouble.
//!
//! The rotator's actual state (which keys exist, their status,
//! cooldown deadlines) is owned by `ocp-strategy`'s `KeyRotator`; this
//! module only scores whatever statuses the caller hands it.

use ocp_schemas::KeyStatus;

pub fn rotator_risk(key_statuses: &[KeyStatus]) -> f64 {
    if key_statuses.is_empty() {
        return 0.0;
    }
    let weighted: f64 = key_statuses
        .iter()
        .map(|s| match s {
            KeyStatus::Dead => 1.0,
            KeyStatus::Cooldown => 0.5,
            KeyStatus::Healthy => 0.0,
        })
        .sum();
    weighted / key_statuses.len() as f64
}

/// `percent_used = max(provider_percent_used, rotator_risk)`.
pub fn compose_risk(provider_percent_used: f64, key_statuses: &[KeyStatus]) -> f64 {
    provider_percent_used.max(rotator_risk(key_statuses))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_healthy_keys_contribute_no_risk() {
        let risk = rotator_risk(&[KeyStatus::Healthy, KeyStatus::Healthy]);
        assert_eq!(risk, 0.0);
    }

    #[test]
    fn dead_keys_count_fully() {
        let risk = rotator_risk(&[KeyStatus::Dead, KeyStatus::Healthy]);
        assert_eq!(risk, 0.5);
    }

    #[test]
    fn cooldown_keys_count_half() {
        let risk = rotator_risk(&[KeyStatus::Cooldown, KeyStatus::Healthy]);
        assert_eq!(risk, 0.25);
    }

    #[test]
    fn compose_takes_the_max() {
        // low provider percent, but rotator risk high
        let risk = compose_risk(0.1, &[KeyStatus::Dead, KeyStatus::Dead]);
        assert_eq!(risk, 1.0);

        // high provider percent, rotator healthy
        let risk = compose_risk(0.95, &[KeyStatus::Healthy]);
        assert_eq!(risk, 0.95);
    }

    #[test]
    fn empty_rotator_has_zero_risk() {
        assert_eq!(rotator_risk(&[]), 0.0);
    }
}
