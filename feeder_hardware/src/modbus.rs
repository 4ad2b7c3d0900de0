//! Modbus TCP framing for the "read input registers" transaction.
//!
//! Request (12 bytes, big-endian):
//! ```text
//! ┌──────────┬──────────┬────────┬──────┬──────┬───────┬───────┐
//! │ TXN ID   │ PROTO ID │ LENGTH │ UNIT │ FC   │ START │ COUNT │
//! │ 2B       │ 2B (0)   │ 2B (6) │ 1B   │ 0x04 │ 2B    │ 2B    │
//! └──────────┴──────────┴────────┴──────┴──────┴───────┴───────┘
//! ```
//! Response: the same 7-byte MBAP header, the function code, a byte count and
//! `count` big-endian registers. A function code with bit 7 set is an
//! exception; the byte after it carries the exception code.

use thiserror::Error;

/// Modbus TCP protocol identifier (always 0).
pub const PROTOCOL_ID: u16 = 0;
/// Function code 4: read input registers.
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
/// Set on the function code of an exception response.
pub const EXCEPTION_FLAG: u8 = 0x80;
/// MBAP header length (transaction, protocol, length, unit).
pub const MBAP_LEN: usize = 7;
/// Complete read request length.
pub const REQUEST_LEN: usize = 12;
/// MBAP header + function code + byte count (or exception code).
pub const RESPONSE_HEADER_LEN: usize = 9;
/// Protocol limit for a single read-input-registers request.
pub const MAX_READ_REGISTERS: u16 = 125;

/// First register of bin A; each bin occupies two consecutive registers.
pub const BIN_BASE_ADDR: u16 = 1000;
pub const REGISTERS_PER_BIN: u16 = 2;
pub const BIN_COUNT: usize = 4;
/// Raw value the indicator reports for a bin that is not enabled (0xFFFF8001).
pub const DISABLED_BIN: i32 = -32767;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    #[error("Modbus exception code {code} (function 0x{function:02x})")]
    Exception { function: u8, code: u8 },
    #[error("unexpected protocol id {0}")]
    ProtocolId(u16),
    #[error("unexpected function code 0x{0:02x}")]
    Function(u8),
    #[error("Unexpected byte count: expected {expected}, got {got}")]
    ByteCount { expected: usize, got: usize },
    #[error("response truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("register count {0} out of range (1..=125)")]
    Count(u16),
    #[error("transaction id mismatch: sent {sent}, got {got}")]
    TransactionId { sent: u16, got: u16 },
    #[error("unit id mismatch: sent {sent}, got {got}")]
    UnitId { sent: u8, got: u8 },
    #[error("MBAP length {got} does not match byte count (expected {expected})")]
    Length { expected: u16, got: u16 },
}

/// A read-input-registers request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    pub transaction_id: u16,
    pub unit_id: u8,
    pub start: u16,
    pub count: u16,
}

impl ReadRequest {
    pub fn new(transaction_id: u16, unit_id: u8, start: u16, count: u16) -> Result<Self, ModbusError> {
        if count == 0 || count > MAX_READ_REGISTERS {
            return Err(ModbusError::Count(count));
        }
        Ok(Self {
            transaction_id,
            unit_id,
            start,
            count,
        })
    }

    /// Encode into the 12-byte wire frame.
    pub fn encode(&self) -> [u8; REQUEST_LEN] {
        let mut buf = [0u8; REQUEST_LEN];
        buf[0..2].copy_from_slice(&self.transaction_id.to_be_bytes());
        buf[2..4].copy_from_slice(&PROTOCOL_ID.to_be_bytes());
        // Remaining bytes after the length field: unit + fc + start + count.
        buf[4..6].copy_from_slice(&6u16.to_be_bytes());
        buf[6] = self.unit_id;
        buf[7] = FC_READ_INPUT_REGISTERS;
        buf[8..10].copy_from_slice(&self.start.to_be_bytes());
        buf[10..12].copy_from_slice(&self.count.to_be_bytes());
        buf
    }

    /// Number of payload bytes a well-formed response carries.
    pub fn expected_byte_count(&self) -> usize {
        usize::from(self.count) * 2
    }

    /// Reject a response that answers some other request or unit.
    pub fn check_response(&self, header: &ResponseHeader) -> Result<(), ModbusError> {
        if header.transaction_id != self.transaction_id {
            return Err(ModbusError::TransactionId {
                sent: self.transaction_id,
                got: header.transaction_id,
            });
        }
        if header.unit_id != self.unit_id {
            return Err(ModbusError::UnitId {
                sent: self.unit_id,
                got: header.unit_id,
            });
        }
        let expected = self.expected_byte_count();
        if usize::from(header.byte_count) != expected {
            return Err(ModbusError::ByteCount {
                expected,
                got: usize::from(header.byte_count),
            });
        }
        // Unit, function code and byte count precede the registers.
        let length = 3 + u16::from(header.byte_count);
        if header.length != length {
            return Err(ModbusError::Length {
                expected: length,
                got: header.length,
            });
        }
        Ok(())
    }
}

/// Fixed-size prefix of a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub transaction_id: u16,
    pub length: u16,
    pub unit_id: u8,
    pub byte_count: u8,
}

/// Parse the first nine response bytes. Exception responses become
/// `ModbusError::Exception` carrying the exception code.
pub fn parse_response_header(buf: &[u8; RESPONSE_HEADER_LEN]) -> Result<ResponseHeader, ModbusError> {
    let protocol_id = u16::from_be_bytes([buf[2], buf[3]]);
    if protocol_id != PROTOCOL_ID {
        return Err(ModbusError::ProtocolId(protocol_id));
    }
    let function = buf[7];
    if function & EXCEPTION_FLAG != 0 {
        return Err(ModbusError::Exception {
            function,
            code: buf[8],
        });
    }
    if function != FC_READ_INPUT_REGISTERS {
        return Err(ModbusError::Function(function));
    }
    Ok(ResponseHeader {
        transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
        length: u16::from_be_bytes([buf[4], buf[5]]),
        unit_id: buf[6],
        byte_count: buf[8],
    })
}

/// Decode big-endian registers from the response payload.
pub fn decode_registers(payload: &[u8], count: u16) -> Result<Vec<u16>, ModbusError> {
    let expected = usize::from(count) * 2;
    if payload.len() != expected {
        return Err(ModbusError::ByteCount {
            expected,
            got: payload.len(),
        });
    }
    Ok(payload
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode a complete response frame (header and payload in one buffer).
pub fn decode_response(frame: &[u8], count: u16) -> Result<Vec<u16>, ModbusError> {
    let Some(head) = frame.first_chunk::<RESPONSE_HEADER_LEN>() else {
        return Err(ModbusError::Truncated {
            need: RESPONSE_HEADER_LEN,
            got: frame.len(),
        });
    };
    let header = parse_response_header(head)?;
    let byte_count = usize::from(header.byte_count);
    let expected = usize::from(count) * 2;
    if byte_count != expected {
        return Err(ModbusError::ByteCount {
            expected,
            got: byte_count,
        });
    }
    let payload = &frame[RESPONSE_HEADER_LEN..];
    if payload.len() < byte_count {
        return Err(ModbusError::Truncated {
            need: RESPONSE_HEADER_LEN + byte_count,
            got: frame.len(),
        });
    }
    decode_registers(&payload[..byte_count], count)
}

/// Combine a high/low register pair into a signed 32-bit value.
#[inline]
pub fn combine_registers(high: u16, low: u16) -> i32 {
    ((u32::from(high) << 16) | u32::from(low)) as i32
}

/// Weight for one bin; the disabled-bin sentinel reads as 0.
#[inline]
pub fn bin_weight(high: u16, low: u16) -> f32 {
    match combine_registers(high, low) {
        DISABLED_BIN => 0.0,
        raw => raw as f32,
    }
}

/// Register address of a bin (0 = A .. 3 = D).
#[inline]
pub fn bin_address(index: usize) -> u16 {
    BIN_BASE_ADDR + (index as u16) * REGISTERS_PER_BIN
}
