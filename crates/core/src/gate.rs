use crate::config::{GenderThreshold, IndeterminatePolicy};
use crate::features::PitchProfile;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NonMaleVoice,
    InsufficientSignal,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonMaleVoice => f.write_str("non-male voice rejected"),
            Self::InsufficientSignal => f.write_str("no voiced speech detected"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GateDecision {
    Accept { pitch_hz: f32 },
    Reject(RejectReason),
    /// No voiced frames and the policy asks for an error rather than a
    /// rejection.
    Indeterminate,
}

/// Pitch-threshold gender gate.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct GenderGate {
    threshold: GenderThreshold,
    policy: IndeterminatePolicy,
}

impl GenderGate {
    pub fn new(threshold: GenderThreshold, policy: IndeterminatePolicy) -> Self {
        Self { threshold, policy }
    }

    pub fn threshold(&self) -> GenderThreshold {
        self.threshold
    }

    pub fn evaluate(&self, profile: &PitchProfile) -> GateDecision {
        match profile.mean_hz {
            Some(pitch_hz) if pitch_hz > self.threshold.hz() => {
                GateDecision::Reject(RejectReason::NonMaleVoice)
            }
            Some(pitch_hz) => GateDecision::Accept { pitch_hz },
            None => match self.policy {
                IndeterminatePolicy::Reject => {
                    GateDecision::Reject(RejectReason::InsufficientSignal)
                }
                IndeterminatePolicy::Error => GateDecision::Indeterminate,
            },
        }
    }
}
