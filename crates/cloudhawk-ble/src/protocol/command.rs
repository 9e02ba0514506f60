//! Outbound command encoding

use super::{opcode, CodecError, FRAME_HEADER, WRITE_FRAME_LEN};

/// A command the mower understands.
///
/// Control commands trigger a physical action; query commands ask the
/// mower to report a piece of state through a notification reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start the regular mowing program
    StartMowing,
    /// Mow once, outside the schedule
    StartOnce,
    /// Stop the blades and hold position
    Stop,
    /// Return to the charging dock
    Dock,
    /// Spiral cutting pattern
    SpiralCut,
    /// Edge cut along the boundary wire
    EdgeCut,
    QueryFirmware,
    QuerySerial,
    QueryStatus,
    QueryBattery,
    QuerySignal,
    QueryTrimming,
    QueryRainDelay,
    QueryUltrasonic,
    QueryWorkingHours,
    QueryFaultLog,
}

impl Command {
    /// Wire opcode for this command
    pub fn opcode(self) -> u8 {
        match self {
            Command::StartMowing => opcode::START,
            Command::StartOnce => opcode::START_ONCE,
            Command::Stop => opcode::STOP,
            Command::Dock => opcode::DOCK,
            Command::SpiralCut => opcode::SPIRAL_CUT,
            Command::EdgeCut => opcode::EDGE_CUT,
            Command::QueryFirmware => opcode::GET_FIRMWARE,
            Command::QuerySerial => opcode::GET_SERIAL,
            Command::QueryStatus => opcode::GET_STATUS,
            Command::QueryBattery => opcode::GET_BATTERY,
            Command::QuerySignal => opcode::GET_SIGNAL,
            Command::QueryTrimming => opcode::GET_TRIMMING,
            Command::QueryRainDelay => opcode::GET_RAIN_DELAY,
            Command::QueryUltrasonic => opcode::GET_ULTRASONIC,
            Command::QueryWorkingHours => opcode::GET_WORKING_HOURS,
            Command::QueryFaultLog => opcode::GET_FAULT_LOG,
        }
    }

    /// Reverse lookup in the opcode table
    pub fn from_opcode(op: u8) -> Option<Command> {
        match op {
            opcode::START => Some(Command::StartMowing),
            opcode::START_ONCE => Some(Command::StartOnce),
            opcode::STOP => Some(Command::Stop),
            opcode::DOCK => Some(Command::Dock),
            opcode::SPIRAL_CUT => Some(Command::SpiralCut),
            opcode::EDGE_CUT => Some(Command::EdgeCut),
            opcode::GET_FIRMWARE => Some(Command::QueryFirmware),
            opcode::GET_SERIAL => Some(Command::QuerySerial),
            opcode::GET_STATUS => Some(Command::QueryStatus),
            opcode::GET_BATTERY => Some(Command::QueryBattery),
            opcode::GET_SIGNAL => Some(Command::QuerySignal),
            opcode::GET_TRIMMING => Some(Command::QueryTrimming),
            opcode::GET_RAIN_DELAY => Some(Command::QueryRainDelay),
            opcode::GET_ULTRASONIC => Some(Command::QueryUltrasonic),
            opcode::GET_WORKING_HOURS => Some(Command::QueryWorkingHours),
            opcode::GET_FAULT_LOG => Some(Command::QueryFaultLog),
            _ => None,
        }
    }

    /// True for commands that only ask the mower to report state
    pub fn is_query(self) -> bool {
        matches!(
            self,
            Command::QueryFirmware
                | Command::QuerySerial
                | Command::QueryStatus
                | Command::QueryBattery
                | Command::QuerySignal
                | Command::QueryTrimming
                | Command::QueryRainDelay
                | Command::QueryUltrasonic
                | Command::QueryWorkingHours
                | Command::QueryFaultLog
        )
    }
}

/// Encode a command into a write-ready frame: `55AA` + opcode, zero-padded
/// to [`WRITE_FRAME_LEN`].
pub fn encode(command: Command) -> Vec<u8> {
    // Closed enum: the opcode is always in the table, so this cannot fail.
    let mut frame = Vec::with_capacity(WRITE_FRAME_LEN);
    frame.extend_from_slice(&FRAME_HEADER);
    frame.push(command.opcode());
    frame.resize(WRITE_FRAME_LEN, 0x00);
    frame
}

/// Encode a raw opcode with an explicit payload.
///
/// Rejects opcodes outside the command table with
/// [`CodecError::InvalidCommand`] and payloads that do not fit the write
/// frame. Intended for protocol exploration tooling; normal callers go
/// through [`encode`].
pub fn encode_raw(op: u8, payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    if Command::from_opcode(op).is_none() {
        return Err(CodecError::InvalidCommand { opcode: op });
    }
    if FRAME_HEADER.len() + 1 + payload.len() > WRITE_FRAME_LEN {
        return Err(CodecError::InvalidCommand { opcode: op });
    }

    let mut frame = Vec::with_capacity(WRITE_FRAME_LEN);
    frame.extend_from_slice(&FRAME_HEADER);
    frame.push(op);
    frame.extend_from_slice(payload);
    frame.resize(WRITE_FRAME_LEN, 0x00);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const ALL_COMMANDS: [Command; 16] = [
        Command::StartMowing,
        Command::StartOnce,
        Command::Stop,
        Command::Dock,
        Command::SpiralCut,
        Command::EdgeCut,
        Command::QueryFirmware,
        Command::QuerySerial,
        Command::QueryStatus,
        Command::QueryBattery,
        Command::QuerySignal,
        Command::QueryTrimming,
        Command::QueryRainDelay,
        Command::QueryUltrasonic,
        Command::QueryWorkingHours,
        Command::QueryFaultLog,
    ];

    #[test]
    fn encode_produces_padded_header_frames() {
        let frame = encode(Command::Stop);
        assert_eq!(frame.len(), WRITE_FRAME_LEN);
        assert_eq!(&frame[..2], &FRAME_HEADER);
        assert_eq!(frame[2], 0x29);
        assert!(frame[3..].iter().all(|b| *b == 0));
    }

    #[test]
    fn encode_roundtrips_through_opcode_table() {
        for command in ALL_COMMANDS {
            let frame = encode(command);
            assert_eq!(Command::from_opcode(frame[2]), Some(command));
        }
    }

    #[test]
    fn opcodes_are_unique() {
        for a in ALL_COMMANDS {
            for b in ALL_COMMANDS {
                if a != b {
                    assert_ne!(a.opcode(), b.opcode());
                }
            }
        }
    }

    #[test]
    fn encode_raw_rejects_unknown_opcode() {
        assert_eq!(
            encode_raw(0xEE, &[]),
            Err(CodecError::InvalidCommand { opcode: 0xEE })
        );
    }

    #[test]
    fn encode_raw_rejects_oversized_payload() {
        let payload = [0u8; WRITE_FRAME_LEN];
        assert!(encode_raw(0x05, &payload).is_err());
    }
}
