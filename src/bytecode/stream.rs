// Tue Jan 13 2026 - Alex

use crate::bytecode::error::BytecodeError;
use bytes::Buf;

/// Little-endian cursor that reports truncation instead of panicking
pub struct ByteStream<'a> {
    data: &'a [u8],
    buf: &'a [u8],
}

impl<'a> ByteStream<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, buf: data }
    }

    pub fn offset(&self) -> usize {
        self.data.len() - self.buf.remaining()
    }

    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    fn ensure(&self, needed: usize) -> Result<(), BytecodeError> {
        if self.buf.remaining() < needed {
            return Err(BytecodeError::UnexpectedEof {
                offset: self.offset(),
                needed: needed - self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BytecodeError> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_i16(&mut self) -> Result<i16, BytecodeError> {
        self.ensure(2)?;
        Ok(self.buf.get_i16_le())
    }

    pub fn read_i32(&mut self) -> Result<i32, BytecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_i32_le())
    }

    pub fn read_u32(&mut self) -> Result<u32, BytecodeError> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    pub fn read_u64(&mut self) -> Result<u64, BytecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_u64_le())
    }

    pub fn read_f64(&mut self) -> Result<f64, BytecodeError> {
        self.ensure(8)?;
        Ok(self.buf.get_f64_le())
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], BytecodeError> {
        self.ensure(len)?;
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    /// Reads an `i32` element count, rejecting negative values
    pub fn read_count(&mut self, what: &'static str) -> Result<usize, BytecodeError> {
        let offset = self.offset();
        let count = self.read_i32()?;
        usize::try_from(count).map_err(|_| BytecodeError::NegativeCount { what, count, offset })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_little_endian_reads() {
        let data = [0x01, 0xFF, 0xFF, 0x02, 0x00, 0x00, 0x00];
        let mut stream = ByteStream::new(&data);
        assert_eq!(stream.read_u8().unwrap(), 1);
        assert_eq!(stream.read_i16().unwrap(), -1);
        assert_eq!(stream.read_i32().unwrap(), 2);
        assert_eq!(stream.remaining(), 0);
    }

    #[test]
    fn test_truncation_is_an_error() {
        let data = [0x01, 0x02];
        let mut stream = ByteStream::new(&data);
        assert_eq!(
            stream.read_i32(),
            Err(BytecodeError::UnexpectedEof { offset: 0, needed: 2 })
        );
        assert_eq!(stream.read_bytes(2).unwrap(), &[1, 2]);
    }

    #[test]
    fn test_negative_count() {
        let data = (-3i32).to_le_bytes();
        let mut stream = ByteStream::new(&data);
        assert!(matches!(
            stream.read_count("instruction"),
            Err(BytecodeError::NegativeCount { count: -3, .. })
        ));
    }
}
