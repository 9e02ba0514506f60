//! Mower state: the last-known device status assembled from decoded frames
//!
//! The wire protocol never sends a full state image; every frame carries a
//! subset of fields. [`MowerState::apply`] merges such partial updates and
//! reports which fields actually changed, so callers can suppress redundant
//! downstream notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::fault::FaultRecord;

/// Maximum number of entries retained in [`MowerState::recent_faults`].
/// Oldest records are dropped on overflow.
pub const MAX_RECENT_FAULTS: usize = 16;

/// Operational status of the mower
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MowerStatus {
    /// No successful status decode yet, or an unmapped status code
    #[default]
    Unknown,
    Idle,
    Mowing,
    Returning,
    Docked,
    Charging,
    Stopped,
    Error,
}

/// Last-known state of one mower.
///
/// Optional fields stay `None` until first observed. Identity fields
/// (`firmware_version`, `serial_number`) are set once per session and not
/// overwritten afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MowerState {
    /// Operational status
    pub status: MowerStatus,
    /// Battery charge, 0-100
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
    /// Whether the mower reports an active charge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_charging: Option<bool>,
    /// Selected boundary signal ("S1", "S2", "S3")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal_type: Option<String>,
    /// Firmware version string, set once per session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    /// Serial number string, set once per session
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// Accumulated working hours counter
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_hours: Option<u32>,
    /// Remaining rain delay in minutes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain_delay_minutes: Option<u16>,
    /// Total fault records reported by the last fault-log reply
    pub fault_count: u32,
    /// Fault records, most recent first, bounded by [`MAX_RECENT_FAULTS`]
    pub recent_faults: Vec<FaultRecord>,
    /// Boundary trimming ("cut to edge") enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub boundary_trimming_enabled: Option<bool>,
    /// Ultrasonic obstacle sensor enabled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ultrasonic_enabled: Option<bool>,
    /// Timestamp of the last decode that contributed to this state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated_at: Option<DateTime<Utc>>,
}

/// A partial state update produced by decoding one frame.
///
/// Fields the frame did not carry stay `None` and leave the corresponding
/// [`MowerState`] field untouched on merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub status: Option<MowerStatus>,
    pub battery_percent: Option<u8>,
    pub is_charging: Option<bool>,
    pub signal_type: Option<String>,
    pub firmware_version: Option<String>,
    pub serial_number: Option<String>,
    pub working_hours: Option<u32>,
    pub rain_delay_minutes: Option<u16>,
    /// Full fault list from a fault-log reply, most recent first
    pub faults: Option<Vec<FaultRecord>>,
    pub boundary_trimming_enabled: Option<bool>,
    pub ultrasonic_enabled: Option<bool>,
}

impl StateUpdate {
    /// True when the update carries no fields at all
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Identifies a [`MowerState`] field in a [`StateChangeSet`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StateField {
    Status,
    BatteryPercent,
    IsCharging,
    SignalType,
    FirmwareVersion,
    SerialNumber,
    WorkingHours,
    RainDelayMinutes,
    Faults,
    BoundaryTrimming,
    Ultrasonic,
}

/// The set of fields whose values changed during one merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateChangeSet {
    pub changed: Vec<StateField>,
}

impl StateChangeSet {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    pub fn contains(&self, field: StateField) -> bool {
        self.changed.contains(&field)
    }
}

impl MowerState {
    /// Merge a partial update into this state.
    ///
    /// Merges are all-or-nothing per frame: the update was fully decoded
    /// before this call, so no partially-applied shape can result. A known
    /// value is never regressed to unknown; in particular an `Unknown`
    /// status (unmapped code) does not overwrite a previously decoded one.
    ///
    /// `observed_at` is stamped into `last_updated_at` even when no field
    /// value changed, since the frame still confirms the link is live.
    pub fn apply(&mut self, update: StateUpdate, observed_at: DateTime<Utc>) -> StateChangeSet {
        let mut changed = Vec::new();

        if let Some(status) = update.status {
            if status != MowerStatus::Unknown && status != self.status {
                self.status = status;
                changed.push(StateField::Status);
            }
        }

        merge(
            &mut self.battery_percent,
            update.battery_percent,
            StateField::BatteryPercent,
            &mut changed,
        );
        merge(
            &mut self.is_charging,
            update.is_charging,
            StateField::IsCharging,
            &mut changed,
        );
        merge(
            &mut self.signal_type,
            update.signal_type,
            StateField::SignalType,
            &mut changed,
        );
        merge_once(
            &mut self.firmware_version,
            update.firmware_version,
            StateField::FirmwareVersion,
            &mut changed,
        );
        merge_once(
            &mut self.serial_number,
            update.serial_number,
            StateField::SerialNumber,
            &mut changed,
        );
        merge(
            &mut self.working_hours,
            update.working_hours,
            StateField::WorkingHours,
            &mut changed,
        );
        merge(
            &mut self.rain_delay_minutes,
            update.rain_delay_minutes,
            StateField::RainDelayMinutes,
            &mut changed,
        );
        merge(
            &mut self.boundary_trimming_enabled,
            update.boundary_trimming_enabled,
            StateField::BoundaryTrimming,
            &mut changed,
        );
        merge(
            &mut self.ultrasonic_enabled,
            update.ultrasonic_enabled,
            StateField::Ultrasonic,
            &mut changed,
        );

        if let Some(mut faults) = update.faults {
            let count = faults.len() as u32;
            faults.truncate(MAX_RECENT_FAULTS);
            if count != self.fault_count || faults != self.recent_faults {
                self.fault_count = count;
                self.recent_faults = faults;
                changed.push(StateField::Faults);
            }
        }

        self.last_updated_at = Some(observed_at);
        StateChangeSet { changed }
    }

    /// Clear everything back to unknown. Called once per transport-session
    /// lifetime so stale data from a prior link is never attributed to a
    /// fresh connection (possibly a different physical device).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn merge<T: PartialEq>(
    slot: &mut Option<T>,
    value: Option<T>,
    field: StateField,
    changed: &mut Vec<StateField>,
) {
    if let Some(value) = value {
        if slot.as_ref() != Some(&value) {
            *slot = Some(value);
            changed.push(field);
        }
    }
}

/// Merge for identity fields: first observation wins, later values are
/// ignored (device identity does not change mid-session).
fn merge_once<T: PartialEq>(
    slot: &mut Option<T>,
    value: Option<T>,
    field: StateField,
    changed: &mut Vec<StateField>,
) {
    if slot.is_none() {
        if let Some(value) = value {
            *slot = Some(value);
            changed.push(field);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn fresh_state_is_all_unknown() {
        let state = MowerState::default();
        assert_eq!(state.status, MowerStatus::Unknown);
        assert!(state.battery_percent.is_none());
        assert!(state.last_updated_at.is_none());
        assert!(state.recent_faults.is_empty());
        assert_eq!(state.fault_count, 0);
    }

    #[test]
    fn apply_merges_only_present_fields() {
        let mut state = MowerState::default();
        let changes = state.apply(
            StateUpdate {
                status: Some(MowerStatus::Docked),
                battery_percent: Some(87),
                ..Default::default()
            },
            at(10),
        );

        assert!(changes.contains(StateField::Status));
        assert!(changes.contains(StateField::BatteryPercent));
        assert_eq!(state.status, MowerStatus::Docked);
        assert_eq!(state.battery_percent, Some(87));
        // Untouched fields stay unknown
        assert!(state.signal_type.is_none());
        assert_eq!(state.last_updated_at, Some(at(10)));
    }

    #[test]
    fn repeated_apply_is_idempotent() {
        let mut state = MowerState::default();
        let update = StateUpdate {
            status: Some(MowerStatus::Mowing),
            battery_percent: Some(55),
            is_charging: Some(false),
            ..Default::default()
        };

        let first = state.apply(update.clone(), at(1));
        assert!(!first.is_empty());

        let second = state.apply(update, at(2));
        assert!(second.is_empty());
        // The timestamp still advances: the frame confirms liveness.
        assert_eq!(state.last_updated_at, Some(at(2)));
    }

    #[test]
    fn unknown_status_does_not_regress_a_known_one() {
        let mut state = MowerState::default();
        state.apply(
            StateUpdate {
                status: Some(MowerStatus::Idle),
                ..Default::default()
            },
            at(1),
        );

        let changes = state.apply(
            StateUpdate {
                status: Some(MowerStatus::Unknown),
                ..Default::default()
            },
            at(2),
        );

        assert!(changes.is_empty());
        assert_eq!(state.status, MowerStatus::Idle);
    }

    #[test]
    fn identity_fields_are_set_once() {
        let mut state = MowerState::default();
        state.apply(
            StateUpdate {
                serial_number: Some("SN0190104721".into()),
                ..Default::default()
            },
            at(1),
        );

        let changes = state.apply(
            StateUpdate {
                serial_number: Some("SN9999999999".into()),
                ..Default::default()
            },
            at(2),
        );

        assert!(changes.is_empty());
        assert_eq!(state.serial_number.as_deref(), Some("SN0190104721"));
    }

    #[test]
    fn fault_list_is_bounded() {
        let mut state = MowerState::default();
        let faults: Vec<FaultRecord> = (0..20)
            .map(|i| FaultRecord {
                code: i as u8,
                detail: vec![],
            })
            .collect();

        let changes = state.apply(
            StateUpdate {
                faults: Some(faults),
                ..Default::default()
            },
            at(1),
        );

        assert!(changes.contains(StateField::Faults));
        assert_eq!(state.fault_count, 20);
        assert_eq!(state.recent_faults.len(), MAX_RECENT_FAULTS);
        // Most recent first: the head of the reply list survives.
        assert_eq!(state.recent_faults[0].code, 0);
    }

    #[test]
    fn reset_clears_everything() {
        let mut state = MowerState::default();
        state.apply(
            StateUpdate {
                status: Some(MowerStatus::Charging),
                battery_percent: Some(12),
                firmware_version: Some("RM V6.01".into()),
                ..Default::default()
            },
            at(1),
        );

        state.reset();
        assert_eq!(state, MowerState::default());
    }
}
