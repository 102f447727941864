//! Exp-Golomb codes on top of the staging buffer's bit cursor.

use super::CodecError;
use crate::buffer::StagingBuffer;

/// Write an unsigned Exp-Golomb code.
pub fn write_ue(buf: &mut StagingBuffer, value: u32) -> Result<(), CodecError> {
    debug_assert!(value < u32::MAX);
    let x = value as u64 + 1;
    let len = 64 - x.leading_zeros();
    if len > 1 {
        buf.write_bits(0, len - 1)?;
    }
    buf.write_bits(x as u32, len)?;
    Ok(())
}

/// Read an unsigned Exp-Golomb code.
pub fn read_ue(buf: &mut StagingBuffer) -> Result<u32, CodecError> {
    let mut zeros = 0u32;
    while !buf.read_bit()? {
        zeros += 1;
        if zeros > 31 {
            return Err(CodecError::Malformed("Exp-Golomb prefix too long".into()));
        }
    }
    let rest = if zeros > 0 { buf.read_bits(zeros)? } else { 0 };
    let x = (1u64 << zeros) | rest as u64;
    Ok((x - 1) as u32)
}

/// Write a signed Exp-Golomb code (0, 1, -1, 2, -2, ...).
pub fn write_se(buf: &mut StagingBuffer, value: i32) -> Result<(), CodecError> {
    let mapped = if value > 0 {
        (value as u32) * 2 - 1
    } else {
        value.unsigned_abs() * 2
    };
    write_ue(buf, mapped)
}

/// Read a signed Exp-Golomb code.
pub fn read_se(buf: &mut StagingBuffer) -> Result<i32, CodecError> {
    let v = read_ue(buf)? as i64;
    let signed = if v % 2 == 1 { (v + 1) / 2 } else { -(v / 2) };
    i32::try_from(signed).map_err(|_| CodecError::Malformed("signed code overflow".into()))
}
