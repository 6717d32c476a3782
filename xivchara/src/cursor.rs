use crate::error::XivError;
use binrw::{BinRead, Endian, NullString};
use byteorder::{ReadBytesExt, LE};
use std::io::{Cursor, Seek, SeekFrom};

/// Bounds-checked little-endian reader over an immutable byte buffer.
///
/// Every read verifies that enough bytes remain before touching the buffer, so a
/// truncated or corrupted file surfaces as [`XivError::UnexpectedEof`] rather than a
/// partially filled value.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> BinaryCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.inner.position()
    }

    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position() as usize)
    }

    fn ensure(&self, needed: usize) -> Result<(), XivError> {
        let available = self.remaining();
        if needed > available {
            return Err(XivError::UnexpectedEof {
                offset: self.position(),
                needed,
                available,
            });
        }
        Ok(())
    }

    /// Moves to an absolute offset. Seeking to the very end is allowed, past it is not.
    pub fn seek(&mut self, offset: i64) -> Result<(), XivError> {
        if offset < 0 || offset as u64 > self.len() as u64 {
            return Err(XivError::OutOfBounds {
                offset,
                len: self.len(),
            });
        }
        self.inner
            .seek(SeekFrom::Start(offset as u64))
            .map_err(XivError::Seek)?;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<(), XivError> {
        self.ensure(count)?;
        self.inner
            .seek(SeekFrom::Current(count as i64))
            .map_err(XivError::Seek)?;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, XivError> {
        self.ensure(1)?;
        self.inner.read_u8().map_err(XivError::Seek)
    }

    pub fn read_u16(&mut self) -> Result<u16, XivError> {
        self.ensure(2)?;
        self.inner.read_u16::<LE>().map_err(XivError::Seek)
    }

    pub fn read_i32(&mut self) -> Result<i32, XivError> {
        self.ensure(4)?;
        self.inner.read_i32::<LE>().map_err(XivError::Seek)
    }

    pub fn read_f32(&mut self) -> Result<f32, XivError> {
        self.ensure(4)?;
        self.inner.read_f32::<LE>().map_err(XivError::Seek)
    }

    pub fn read_i16s(&mut self, count: usize) -> Result<Vec<i16>, XivError> {
        self.ensure(count.saturating_mul(2))?;
        let mut values = vec![0i16; count];
        self.inner
            .read_i16_into::<LE>(&mut values)
            .map_err(XivError::Seek)?;
        Ok(values)
    }

    pub fn read_u16s(&mut self, count: usize) -> Result<Vec<u16>, XivError> {
        self.ensure(count.saturating_mul(2))?;
        let mut values = vec![0u16; count];
        self.inner
            .read_u16_into::<LE>(&mut values)
            .map_err(XivError::Seek)?;
        Ok(values)
    }

    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N], XivError> {
        self.ensure(N * 4)?;
        let mut values = [0f32; N];
        self.inner
            .read_f32_into::<LE>(&mut values)
            .map_err(XivError::Seek)?;
        Ok(values)
    }

    /// Reads one fixed-layout record declared with `#[binread]`.
    pub fn read<T>(&mut self) -> Result<T, XivError>
    where
        T: BinRead,
        for<'x> T::Args<'x>: Default,
    {
        let offset = self.position();
        T::read_options(&mut self.inner, Endian::Little, Default::default())
            .map_err(|source| XivError::Record { offset, source })
    }

    pub fn read_many<T>(&mut self, count: usize) -> Result<Vec<T>, XivError>
    where
        T: BinRead,
        for<'x> T::Args<'x>: Default,
    {
        // a bogus count must not turn into a huge allocation
        let mut values = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            values.push(self.read()?);
        }
        Ok(values)
    }

    /// Reads a null-terminated string at an absolute offset without moving the cursor.
    pub fn read_null_string_at(&mut self, offset: i64) -> Result<String, XivError> {
        let saved = self.position();
        self.seek(offset)?;
        let result = NullString::read_le(&mut self.inner).map_err(|source| XivError::Record {
            offset: offset as u64,
            source,
        });
        self.inner
            .seek(SeekFrom::Start(saved))
            .map_err(XivError::Seek)?;
        Ok(result?.to_string())
    }

    /// Borrows `len` bytes starting at an absolute offset without moving the cursor.
    pub fn slice_at(&self, offset: usize, len: usize) -> Result<&'a [u8], XivError> {
        let data: &'a [u8] = self.inner.get_ref();
        let end = offset.checked_add(len).filter(|end| *end <= data.len());
        match end {
            Some(end) => Ok(&data[offset..end]),
            None => Err(XivError::UnexpectedEof {
                offset: offset as u64,
                needed: len,
                available: data.len().saturating_sub(offset),
            }),
        }
    }
}
