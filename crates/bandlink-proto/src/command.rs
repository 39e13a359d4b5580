//! Command codes
//!
//! The command space is only partially mapped; codes below were observed in
//! captured traffic. `Command` stays an open newtype rather than a closed
//! enum so frames carrying an unmapped code still parse; interpreting a
//! command is the engine's job, not the codec's.

use std::fmt;

/// A 16-bit command code as carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Command(pub u16);

impl Command {
    /// ACK/NAK for a previously received frame.
    pub const ACK: Command = Command(0x0000);
    pub const SESSION_START: Command = Command(0x0001);
    pub const SESSION_START_RESP: Command = Command(0x0002);
    pub const GET_CONFIG: Command = Command(0x0003);
    pub const DEVICE_RESET: Command = Command(0x000B);
    pub const SET_PARAMETERS_FILE: Command = Command(0x000C);
    pub const GET_PARAMETERS_FILE: Command = Command(0x000D);
    pub const PARAMETERS_FILE: Command = Command(0x000E);
    pub const SEND_STORED_DATA: Command = Command(0x0010);
    pub const GET_TECHNICAL_STATUS: Command = Command(0x0015);
    pub const LEDS_CONTROL: Command = Command(0x0023);
    pub const IS_DEVICE_PAIRED: Command = Command(0x002A);
    pub const IS_DEVICE_PAIRED_RESP: Command = Command(0x002B);
    pub const GET_LOG_FILE: Command = Command(0x0044);
    pub const LOG_FILE_RESP: Command = Command(0x0045);

    pub fn name(self) -> Option<&'static str> {
        match self {
            Command::ACK => Some("Ack"),
            Command::SESSION_START => Some("SessionStart"),
            Command::SESSION_START_RESP => Some("SessionStartResp"),
            Command::GET_CONFIG => Some("GetConfig"),
            Command::DEVICE_RESET => Some("DeviceReset"),
            Command::SET_PARAMETERS_FILE => Some("SetParametersFile"),
            Command::GET_PARAMETERS_FILE => Some("GetParametersFile"),
            Command::PARAMETERS_FILE => Some("ParametersFile"),
            Command::SEND_STORED_DATA => Some("SendStoredData"),
            Command::GET_TECHNICAL_STATUS => Some("GetTechnicalStatus"),
            Command::LEDS_CONTROL => Some("LedsControl"),
            Command::IS_DEVICE_PAIRED => Some("IsDevicePaired"),
            Command::IS_DEVICE_PAIRED_RESP => Some("IsDevicePairedResp"),
            Command::GET_LOG_FILE => Some("GetLogFile"),
            Command::LOG_FILE_RESP => Some("LogFileResp"),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} (0x{:04X})", name, self.0),
            None => write!(f, "0x{:04X}", self.0),
        }
    }
}

impl From<u16> for Command {
    fn from(code: u16) -> Self {
        Command(code)
    }
}

impl From<Command> for u16 {
    fn from(command: Command) -> Self {
        command.0
    }
}
