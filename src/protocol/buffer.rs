//! Wire buffers for clientbound packet bodies
//!
//! Numbers are big-endian; variable-length integers use 7-bit groups with a
//! continuation bit; strings are length-prefixed UTF-8.

use super::{ProtocolError, ProtocolResult};
use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Longest string the protocol accepts for names and property values
const MAX_STRING_LENGTH: usize = 32767;

/// Growable writer for one packet body
#[derive(Debug, Default)]
pub struct PacketWriter {
    buf: BytesMut,
}

impl PacketWriter {
    pub fn new() -> Self {
        Self { buf: BytesMut::with_capacity(64) }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn put_i16(&mut self, value: i16) {
        self.buf.put_i16(value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn put_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn put_f32(&mut self, value: f32) {
        self.buf.put_f32(value);
    }

    pub fn put_f64(&mut self, value: f64) {
        self.buf.put_f64(value);
    }

    pub fn put_var_int(&mut self, value: i32) {
        let mut remaining = value as u32;
        loop {
            if remaining & !0x7F == 0 {
                self.buf.put_u8(remaining as u8);
                return;
            }
            self.buf.put_u8((remaining & 0x7F) as u8 | 0x80);
            remaining >>= 7;
        }
    }

    /// Degrees packed into one byte
    pub fn put_angle(&mut self, degrees: f32) {
        self.buf.put_u8(angle_to_byte(degrees));
    }

    pub fn put_uuid(&mut self, id: Uuid) {
        self.buf.put_slice(id.as_bytes());
    }

    pub fn put_string(&mut self, value: &str) -> ProtocolResult<()> {
        if value.chars().count() > MAX_STRING_LENGTH {
            return Err(ProtocolError::Encode {
                reason: format!("string of {} chars exceeds protocol limit", value.chars().count()),
            });
        }
        self.put_len(value.len())?;
        self.buf.put_slice(value.as_bytes());
        Ok(())
    }

    /// Length prefix for a collection
    pub fn put_len(&mut self, len: usize) -> ProtocolResult<()> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::Encode {
            reason: format!("length {} does not fit a varint", len),
        })?;
        self.put_var_int(len);
        Ok(())
    }

    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }
}

pub fn angle_to_byte(degrees: f32) -> u8 {
    ((degrees * 256.0 / 360.0).floor() as i32) as u8
}

/// Bounds-checked reader over a packet body
pub struct PacketReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> PacketReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    fn take(&mut self, n: usize) -> ProtocolResult<&'a [u8]> {
        if self.remaining() < n {
            return Err(ProtocolError::Encode {
                reason: format!("Not enough data: need {}, have {}", n, self.remaining()),
            });
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> ProtocolResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn get_u8(&mut self) -> ProtocolResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_bool(&mut self) -> ProtocolResult<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_i16(&mut self) -> ProtocolResult<i16> {
        Ok(i16::from_be_bytes(self.take_array()?))
    }

    pub fn get_i32(&mut self) -> ProtocolResult<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub fn get_i64(&mut self) -> ProtocolResult<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub fn get_f32(&mut self) -> ProtocolResult<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub fn get_f64(&mut self) -> ProtocolResult<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub fn get_var_int(&mut self) -> ProtocolResult<i32> {
        let mut value: u32 = 0;
        for shift in (0..35).step_by(7) {
            let byte = self.get_u8()?;
            value |= ((byte & 0x7F) as u32) << shift;
            if byte & 0x80 == 0 {
                return Ok(value as i32);
            }
        }
        Err(ProtocolError::Encode {
            reason: "varint longer than 5 bytes".to_string(),
        })
    }

    pub fn get_uuid(&mut self) -> ProtocolResult<Uuid> {
        Ok(Uuid::from_bytes(self.take_array()?))
    }

    pub fn get_string(&mut self) -> ProtocolResult<String> {
        let len = self.get_var_int()?;
        let len = usize::try_from(len).map_err(|_| ProtocolError::Encode {
            reason: format!("negative string length {}", len),
        })?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|e| ProtocolError::Encode {
            reason: format!("invalid UTF-8: {}", e),
        })
    }
}
