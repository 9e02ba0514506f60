//! Inbound frame decoding
//!
//! Shapes are keyed strictly by validated length so that all three are
//! handled exhaustively and adding a fourth stays a localized change.

use cloudhawk_core::{FaultRecord, MowerStatus, StateUpdate};

use super::{checksum, opcode, status_code, CodecError, FRAME_HEADER, REPLY_MARKER};

/// Fault log records are fixed width: a timestamp-like prefix plus the
/// fault code in the last byte.
const FAULT_RECORD_LEN: usize = 7;

/// One decoded notification frame
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedFrame {
    /// 3-byte frame: status code only
    Status {
        status: MowerStatus,
        /// Raw code byte, preserved for diagnostics when unmapped
        raw_code: u8,
    },
    /// 12+ byte frame: status code plus fixed-offset payload
    Extended(ExtendedFrame),
    /// 6-11 byte command reply
    Reply {
        /// Opcode of the command this frame answers
        opcode: u8,
        body: ReplyBody,
    },
}

/// An extended (12+ byte) frame.
///
/// The extended layout was reverse-engineered; only the docked layout has
/// a confirmed field mapping. Extracted fields are therefore optional and
/// populated only for status codes whose offsets have been validated;
/// everything else stays raw in `payload` rather than being guessed into
/// a typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedFrame {
    pub status: MowerStatus,
    pub raw_code: u8,
    /// Battery charge. Confirmed offset for `Docked` only.
    pub battery_percent: Option<u8>,
    /// Charging flag. Confirmed offset for `Docked` only.
    pub is_charging: Option<bool>,
    /// Counter/timestamp-like field at bytes 6..8. Offset unconfirmed for
    /// every status, so never populated; the raw bytes are in `payload`.
    pub counter: Option<u16>,
    /// Trailing status-detail byte. Unconfirmed, never populated.
    pub status_detail: Option<u8>,
    /// Raw payload after the status code, for diagnostics
    pub payload: Vec<u8>,
    /// Typed reply body when the payload also carries reply framing
    /// (length byte, `80` marker, valid checksum)
    pub reply: Option<ReplyBody>,
}

/// Typed body of a command reply, keyed by the responding opcode
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyBody {
    Firmware(String),
    Serial(String),
    /// Detailed status report (`GET_STATUS`), mapped via its own table
    StatusDetail(MowerStatus),
    /// Boundary signal selection, "S1".."S3"
    Signal(String),
    Trimming(bool),
    Ultrasonic(bool),
    /// Remaining rain delay in minutes
    RainDelay(u16),
    WorkingHours(u32),
    FaultLog(Vec<FaultRecord>),
    /// Reply to an opcode without a validated body layout; data kept raw
    Unknown { opcode: u8, data: Vec<u8> },
}

/// Map a status code byte to [`MowerStatus`] via the fixed table.
/// Unmapped codes yield `Unknown`; the raw byte travels alongside.
pub fn status_from_code(code: u8) -> MowerStatus {
    match code {
        status_code::IDLE => MowerStatus::Idle,
        status_code::MOWING => MowerStatus::Mowing,
        status_code::CHARGING => MowerStatus::Charging,
        status_code::FAULT => MowerStatus::Error,
        status_code::DOCKED => MowerStatus::Docked,
        _ => MowerStatus::Unknown,
    }
}

/// Decode one notification frame.
///
/// The shape is re-derived from the length on every call; no state is
/// kept between frames.
pub fn decode(raw: &[u8]) -> Result<DecodedFrame, CodecError> {
    if raw.len() < 2 || raw[..2] != FRAME_HEADER {
        return Err(CodecError::MalformedFrame);
    }

    match raw.len() {
        3 => Ok(DecodedFrame::Status {
            status: status_from_code(raw[2]),
            raw_code: raw[2],
        }),
        6..=11 => {
            let (op, body) = decode_reply(raw)?;
            Ok(DecodedFrame::Reply { opcode: op, body })
        }
        len if len >= 12 => Ok(DecodedFrame::Extended(decode_extended(raw))),
        len => Err(CodecError::UnrecognizedFrameShape { len }),
    }
}

/// Parse reply framing: `55AA` + length + `80` + opcode + data + checksum.
/// Returns `UnrecognizedFrameShape` when the marker, declared length, or
/// checksum does not hold.
fn decode_reply(raw: &[u8]) -> Result<(u8, ReplyBody), CodecError> {
    let shape_err = CodecError::UnrecognizedFrameShape { len: raw.len() };

    let declared = raw[2] as usize;
    // header(2) + length byte(1) + payload(declared) + checksum(1)
    if raw.len() != declared + 4 || raw[3] != REPLY_MARKER {
        return Err(shape_err);
    }
    let (frame, sum) = raw.split_at(raw.len() - 1);
    if checksum(frame) != sum[0] {
        return Err(shape_err);
    }

    let op = raw[4];
    let data = &raw[5..raw.len() - 1];
    Ok((op, decode_reply_body(op, data)))
}

fn decode_reply_body(op: u8, data: &[u8]) -> ReplyBody {
    match (op, data) {
        (opcode::GET_FIRMWARE, _) if !data.is_empty() => {
            ReplyBody::Firmware(ascii_lossy(data))
        }
        (opcode::GET_SERIAL, _) if !data.is_empty() => ReplyBody::Serial(ascii_lossy(data)),
        (opcode::GET_STATUS, [detail, ..]) => match status_detail(*detail) {
            Some(status) => ReplyBody::StatusDetail(status),
            None => unknown(op, data),
        },
        (opcode::GET_SIGNAL, [sel @ 1..=3, ..]) => ReplyBody::Signal(format!("S{}", sel)),
        (opcode::GET_TRIMMING, [flag, ..]) => ReplyBody::Trimming(*flag == 0x01),
        (opcode::GET_ULTRASONIC, [flag, ..]) => ReplyBody::Ultrasonic(*flag == 0x01),
        (opcode::GET_RAIN_DELAY, [hi, lo, ..]) => {
            ReplyBody::RainDelay(u16::from_be_bytes([*hi, *lo]))
        }
        (opcode::GET_WORKING_HOURS, [a, b, c, d, ..]) => {
            ReplyBody::WorkingHours(u32::from_be_bytes([*a, *b, *c, *d]))
        }
        (opcode::GET_FAULT_LOG, _) => ReplyBody::FaultLog(parse_fault_log(data)),
        _ => unknown(op, data),
    }
}

fn unknown(op: u8, data: &[u8]) -> ReplyBody {
    ReplyBody::Unknown {
        opcode: op,
        data: data.to_vec(),
    }
}

/// `GET_STATUS` replies use their own code table, distinct from the
/// status byte of simple/extended frames.
fn status_detail(code: u8) -> Option<MowerStatus> {
    match code {
        0x01 => Some(MowerStatus::Returning),
        0x0B => Some(MowerStatus::Docked),
        0x0E => Some(MowerStatus::Stopped),
        0x38 => Some(MowerStatus::Mowing),
        _ => None,
    }
}

fn ascii_lossy(data: &[u8]) -> String {
    String::from_utf8_lossy(data).trim().to_string()
}

/// Fixed-width fault records, most recent first. A trailing partial
/// record is ignored rather than guessed at.
fn parse_fault_log(data: &[u8]) -> Vec<FaultRecord> {
    data.chunks_exact(FAULT_RECORD_LEN)
        .map(|chunk| FaultRecord {
            code: chunk[FAULT_RECORD_LEN - 1],
            detail: chunk[..FAULT_RECORD_LEN - 1].to_vec(),
        })
        .collect()
}

fn decode_extended(raw: &[u8]) -> ExtendedFrame {
    let raw_code = raw[2];
    let status = status_from_code(raw_code);

    // Confirmed offsets exist only for the docked layout: battery at
    // byte 8, charging flag at byte 10 (0x04 = charging).
    let (battery_percent, is_charging) = if status == MowerStatus::Docked {
        (Some(raw[8]), Some(raw[10] == 0x04))
    } else {
        (None, None)
    };

    // Long replies (firmware strings, fault logs) share the extended
    // length range; extract their typed body when the framing holds.
    let reply = decode_reply(raw).ok().map(|(_, body)| body);

    ExtendedFrame {
        status,
        raw_code,
        battery_percent,
        is_charging,
        counter: None,
        status_detail: None,
        payload: raw[3..].to_vec(),
        reply,
    }
}

impl DecodedFrame {
    /// Project this frame onto a partial state update.
    ///
    /// The projection is total: a frame that decoded successfully always
    /// yields a (possibly empty) update, so merges stay all-or-nothing
    /// per frame.
    pub fn into_update(self) -> StateUpdate {
        match self {
            DecodedFrame::Status { status, .. } => StateUpdate {
                status: Some(status),
                ..Default::default()
            },
            DecodedFrame::Extended(frame) => {
                let mut update = frame
                    .reply
                    .map(reply_update)
                    .unwrap_or_default();
                update.status = Some(frame.status);
                update.battery_percent = frame.battery_percent.or(update.battery_percent);
                update.is_charging = frame.is_charging.or(update.is_charging);
                update
            }
            DecodedFrame::Reply { body, .. } => reply_update(body),
        }
    }
}

fn reply_update(body: ReplyBody) -> StateUpdate {
    let mut update = StateUpdate::default();
    match body {
        ReplyBody::Firmware(version) => update.firmware_version = Some(version),
        ReplyBody::Serial(serial) => update.serial_number = Some(serial),
        ReplyBody::StatusDetail(status) => update.status = Some(status),
        ReplyBody::Signal(signal) => update.signal_type = Some(signal),
        ReplyBody::Trimming(enabled) => update.boundary_trimming_enabled = Some(enabled),
        ReplyBody::Ultrasonic(enabled) => update.ultrasonic_enabled = Some(enabled),
        ReplyBody::RainDelay(minutes) => update.rain_delay_minutes = Some(minutes),
        ReplyBody::WorkingHours(hours) => update.working_hours = Some(hours),
        ReplyBody::FaultLog(faults) => update.faults = Some(faults),
        ReplyBody::Unknown { .. } => {}
    }
    update
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn hex(frame: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        let mut i = 0;
        while i < frame.len() {
            bytes.push(u8::from_str_radix(&frame[i..i + 2], 16).unwrap());
            i += 2;
        }
        bytes
    }

    /// Append the sum-mod-256 checksum to a reply frame under construction
    fn with_checksum(mut frame: Vec<u8>) -> Vec<u8> {
        frame.push(checksum(&frame));
        frame
    }

    #[rstest]
    #[case(0x03, MowerStatus::Idle)]
    #[case(0x04, MowerStatus::Mowing)]
    #[case(0x06, MowerStatus::Charging)]
    #[case(0x07, MowerStatus::Error)]
    #[case(0x08, MowerStatus::Docked)]
    #[case(0x00, MowerStatus::Unknown)]
    #[case(0x42, MowerStatus::Unknown)]
    #[case(0xFF, MowerStatus::Unknown)]
    fn simple_frames_follow_the_status_table(#[case] code: u8, #[case] expected: MowerStatus) {
        let frame = decode(&[0x55, 0xAA, code]).unwrap();
        assert_eq!(
            frame,
            DecodedFrame::Status {
                status: expected,
                raw_code: code
            }
        );
    }

    #[test]
    fn simple_frame_update_carries_status_only() {
        let update = decode(&hex("55AA03")).unwrap().into_update();
        assert_eq!(update.status, Some(MowerStatus::Idle));
        assert_eq!(
            StateUpdate {
                status: None,
                ..update
            },
            StateUpdate::default()
        );
    }

    #[rstest]
    #[case(&[])]
    #[case(&[0x55])]
    #[case(&[0xAA, 0x55, 0x03])]
    #[case(&[0x00, 0x00, 0x03])]
    #[case(&[0x55, 0xAB, 0x03])]
    fn frames_without_header_are_malformed(#[case] raw: &[u8]) {
        assert_eq!(decode(raw), Err(CodecError::MalformedFrame));
    }

    #[rstest]
    #[case(2)]
    #[case(4)]
    #[case(5)]
    fn in_between_lengths_are_unrecognized(#[case] len: usize) {
        let mut raw = vec![0x55, 0xAA];
        raw.resize(len, 0x00);
        assert_eq!(
            decode(&raw),
            Err(CodecError::UnrecognizedFrameShape { len })
        );
    }

    #[test]
    fn reply_with_bad_checksum_is_unrecognized() {
        let mut frame = with_checksum(hex("55AA03800B02"));
        let last = frame.len() - 1;
        frame[last] ^= 0xFF;
        assert_eq!(
            decode(&frame),
            Err(CodecError::UnrecognizedFrameShape { len: 7 })
        );
    }

    #[test]
    fn reply_without_marker_is_unrecognized() {
        // Length and checksum hold, but the 0x80 marker is absent.
        let frame = with_checksum(hex("55AA03700B02"));
        assert_eq!(
            decode(&frame),
            Err(CodecError::UnrecognizedFrameShape { len: 7 })
        );
    }

    #[test]
    fn docked_extended_frame_yields_confirmed_fields_only() {
        // Observed on a real unit while docked and charging.
        let frame = decode(&hex("55AA0880830100CE64000441")).unwrap();
        let DecodedFrame::Extended(extended) = frame else {
            panic!("expected extended frame, got {:?}", frame);
        };

        assert_eq!(extended.status, MowerStatus::Docked);
        assert_eq!(extended.battery_percent, Some(0x64));
        assert_eq!(extended.is_charging, Some(true));
        // Unconfirmed offsets stay absent; raw bytes remain available.
        assert_eq!(extended.counter, None);
        assert_eq!(extended.status_detail, None);
        assert_eq!(extended.payload, hex("80830100CE64000441"));
    }

    #[test]
    fn docked_extended_frame_update_has_no_fabricated_fields() {
        let update = decode(&hex("55AA0880830100CE64000441"))
            .unwrap()
            .into_update();
        assert_eq!(update.status, Some(MowerStatus::Docked));
        assert_eq!(update.battery_percent, Some(100));
        assert_eq!(update.is_charging, Some(true));
        assert_eq!(update.signal_type, None);
        assert_eq!(update.rain_delay_minutes, None);
        assert_eq!(update.working_hours, None);
        assert_eq!(update.faults, None);
    }

    #[test]
    fn non_docked_extended_frame_keeps_payload_raw() {
        let mut raw = hex("55AA42");
        raw.extend_from_slice(&[0u8; 9]);
        let DecodedFrame::Extended(extended) = decode(&raw).unwrap() else {
            panic!("expected extended frame");
        };
        assert_eq!(extended.status, MowerStatus::Unknown);
        assert_eq!(extended.raw_code, 0x42);
        assert_eq!(extended.battery_percent, None);
        assert_eq!(extended.is_charging, None);
        assert_eq!(extended.payload.len(), 9);
    }

    #[rstest]
    #[case(hex("800B01"), ReplyBody::Signal("S1".into()))]
    #[case(hex("800B02"), ReplyBody::Signal("S2".into()))]
    #[case(hex("800B03"), ReplyBody::Signal("S3".into()))]
    #[case(hex("800701"), ReplyBody::Trimming(true))]
    #[case(hex("800700"), ReplyBody::Trimming(false))]
    #[case(hex("805401"), ReplyBody::Ultrasonic(true))]
    #[case(hex("808101"), ReplyBody::StatusDetail(MowerStatus::Returning))]
    #[case(hex("808138"), ReplyBody::StatusDetail(MowerStatus::Mowing))]
    #[case(hex("80810B"), ReplyBody::StatusDetail(MowerStatus::Docked))]
    #[case(hex("80810E"), ReplyBody::StatusDetail(MowerStatus::Stopped))]
    #[case(hex("80320078"), ReplyBody::RainDelay(120))]
    fn short_replies_decode_by_opcode(#[case] payload: Vec<u8>, #[case] expected: ReplyBody) {
        let mut frame = vec![0x55, 0xAA, payload.len() as u8];
        frame.extend_from_slice(&payload);
        let frame = with_checksum(frame);

        let DecodedFrame::Reply { body, .. } = decode(&frame).unwrap() else {
            panic!("expected reply frame");
        };
        assert_eq!(body, expected);
    }

    #[test]
    fn unmapped_signal_selector_stays_raw() {
        let frame = with_checksum(hex("55AA03800B09"));
        let DecodedFrame::Reply { body, .. } = decode(&frame).unwrap() else {
            panic!("expected reply frame");
        };
        assert_eq!(
            body,
            ReplyBody::Unknown {
                opcode: opcode::GET_SIGNAL,
                data: vec![0x09]
            }
        );
    }

    #[test]
    fn serial_reply_decodes_as_ascii() {
        // 2 (marker+opcode) + 12 data bytes
        let mut frame = vec![0x55, 0xAA, 14, REPLY_MARKER, opcode::GET_SERIAL];
        frame.extend_from_slice(b"SN0190104721");
        let frame = with_checksum(frame);

        let DecodedFrame::Extended(extended) = decode(&frame).unwrap() else {
            panic!("expected extended frame (length >= 12)");
        };
        assert_eq!(
            extended.reply,
            Some(ReplyBody::Serial("SN0190104721".into()))
        );
        // The length byte is an unmapped status code: status must not be
        // guessed from it.
        assert_eq!(extended.status, MowerStatus::Unknown);

        let update = DecodedFrame::Extended(extended).into_update();
        assert_eq!(update.serial_number.as_deref(), Some("SN0190104721"));
    }

    #[test]
    fn fault_log_reply_parses_fixed_width_records() {
        // Two 7-byte records plus a truncated tail that must be ignored.
        let mut data = Vec::new();
        data.extend_from_slice(&hex("07E909150B3312")); // 2025-09-21 11:51, code 0x12
        data.extend_from_slice(&hex("07E90814173007")); // 2025-08-20 23:48, code 0x07
        data.extend_from_slice(&[0xAB, 0xCD]);

        let mut frame = vec![
            0x55,
            0xAA,
            (data.len() + 2) as u8,
            REPLY_MARKER,
            opcode::GET_FAULT_LOG,
        ];
        frame.extend_from_slice(&data);
        let frame = with_checksum(frame);

        let update = decode(&frame).unwrap().into_update();
        let faults = update.faults.expect("fault log update");
        assert_eq!(faults.len(), 2);
        assert_eq!(faults[0].code, 0x12);
        assert_eq!(faults[0].detail, hex("07E909150B33"));
        assert_eq!(faults[1].code, 0x07);
    }

    #[test]
    fn working_hours_reply_decodes_big_endian() {
        let mut frame = vec![
            0x55,
            0xAA,
            6,
            REPLY_MARKER,
            opcode::GET_WORKING_HOURS,
            0x00,
            0x00,
            0x01,
            0x2C,
        ];
        frame = with_checksum(frame);
        let update = decode(&frame).unwrap().into_update();
        assert_eq!(update.working_hours, Some(300));
    }
}
