use tracing::info;

use crate::{
    error::ProtocolError,
    types::HeatSetting,
    wire::{
        BODY_LEN, END_OF_RECIPE, FLAGS, FOOTER, HEADER, PACKET_LEN, TEMP_MAX_F, TEMP_MIN_F,
        TEMP_SENTINEL, TEMP_UNIT,
    },
};

const MAX_BUFFERED_BODY: usize = 32;

const MAX_DISPLAY_SECONDS: u32 = 594;

pub fn seconds_to_minutes_code(seconds: u32) -> u8 {
    if seconds >= MAX_DISPLAY_SECONDS {
        return 99;
    }
    ((seconds as f32 / 60.0) * 10.0).round() as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandFrame {
    pub header: [u8; 2],
    pub state_code: [u8; 2],
    pub fan_speed: u8,
    pub time_code: u8,
    pub heat_setting: HeatSetting,
}

impl CommandFrame {
    pub fn body(&self) -> [u8; BODY_LEN] {
        [
            TEMP_UNIT[0],
            TEMP_UNIT[1],
            FLAGS[0],
            self.state_code[0],
            self.state_code[1],
            self.fan_speed,
            self.time_code,
            self.heat_setting as u8,
            0x00,
            0x00,
        ]
    }

    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut packet = [0u8; PACKET_LEN];
        packet[..2].copy_from_slice(&self.header);
        packet[2..2 + BODY_LEN].copy_from_slice(&self.body());
        packet[2 + BODY_LEN..].copy_from_slice(&FOOTER);
        packet
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseBody([u8; BODY_LEN]);

impl ResponseBody {
    pub fn bytes(&self) -> &[u8; BODY_LEN] {
        &self.0
    }

    pub fn flags(&self) -> u8 {
        self.0[2]
    }

    pub fn is_end_of_recipe(&self) -> bool {
        END_OF_RECIPE.contains(&self.flags())
    }

    pub fn state_code(&self) -> [u8; 2] {
        [self.0[3], self.0[4]]
    }

    pub fn fan_speed(&self) -> u8 {
        self.0[5]
    }

    pub fn time_code(&self) -> u8 {
        self.0[6]
    }

    pub fn heat_setting(&self) -> Option<HeatSetting> {
        HeatSetting::try_from(self.0[7]).ok()
    }

    pub fn raw_temperature(&self) -> u16 {
        u16::from_be_bytes([self.0[8], self.0[9]])
    }

    /// The no-reading sentinel maps to 150.
    pub fn temperature(&self) -> Result<u16, ProtocolError> {
        match self.raw_temperature() {
            TEMP_SENTINEL => Ok(TEMP_MIN_F),
            temp if (TEMP_MIN_F..=TEMP_MAX_F).contains(&temp) => Ok(temp),
            temp => Err(ProtocolError::TemperatureOutOfRange(temp)),
        }
    }
}

impl TryFrom<&[u8]> for ResponseBody {
    type Error = ProtocolError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let body: [u8; BODY_LEN] = bytes
            .try_into()
            .map_err(|_| ProtocolError::InvalidBodyLength(bytes.len()))?;
        Ok(Self(body))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    LookingForHeader1,
    LookingForHeader2,
    PacketData,
    LookingForFooter2,
}

#[derive(Debug, Clone)]
pub struct PacketDecoder {
    state: DecodeState,
    body: Vec<u8>,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecodeState::LookingForHeader1,
            body: Vec::with_capacity(BODY_LEN),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = DecodeState::LookingForHeader1;
        self.body.clear();
    }

    pub fn push(&mut self, byte: u8) -> Option<Result<ResponseBody, ProtocolError>> {
        match self.state {
            DecodeState::LookingForHeader1 => {
                if byte == HEADER[0] {
                    self.state = DecodeState::LookingForHeader2;
                }
                None
            }
            DecodeState::LookingForHeader2 => {
                if byte == HEADER[1] {
                    self.state = DecodeState::PacketData;
                    self.body.clear();
                } else {
                    self.state = DecodeState::LookingForHeader1;
                }
                None
            }
            DecodeState::PacketData => self.accept_payload(byte),
            DecodeState::LookingForFooter2 => {
                if byte == FOOTER[1] {
                    return Some(self.finish());
                }
                // The held 0xAA was payload after all.
                self.body.push(FOOTER[0]);
                self.state = DecodeState::PacketData;
                self.accept_payload(byte)
            }
        }
    }

    pub fn decode_stream(&mut self, bytes: &[u8]) -> Vec<Result<ResponseBody, ProtocolError>> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn accept_payload(&mut self, byte: u8) -> Option<Result<ResponseBody, ProtocolError>> {
        if byte == FOOTER[0] {
            self.state = DecodeState::LookingForFooter2;
            return None;
        }

        self.body.push(byte);

        // At exactly 250F (0x00FA) the firmware drops the footer.
        if self.body.len() == BODY_LEN && byte == FOOTER[1] {
            info!("temperature is 250F, synthesizing footer the roaster firmware omits");
            return Some(self.finish());
        }

        if self.body.len() > MAX_BUFFERED_BODY {
            self.reset();
            return Some(Err(ProtocolError::BodyOverflow(MAX_BUFFERED_BODY)));
        }

        None
    }

    fn finish(&mut self) -> Result<ResponseBody, ProtocolError> {
        let result = ResponseBody::try_from(self.body.as_slice());
        self.reset();
        result
    }
}
