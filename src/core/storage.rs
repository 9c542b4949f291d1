//! Chunked little-endian image format helpers.
//!
//! A saved network is a magic header, a format version, then a sequence of
//! `(tag, len, payload)` chunks. Readers skip unknown tags so older
//! binaries can open newer images.

use std::io::{self, Read, Write};

pub const MAGIC: &[u8; 8] = b"CRITTR01";
pub const VERSION_V1: u32 = 1;
pub const VERSION_CURRENT: u32 = VERSION_V1;

pub fn compress_lz4(input: &[u8]) -> Vec<u8> {
    lz4_flex::compress(input)
}

pub fn decompress_lz4(input: &[u8], expected_size: usize) -> io::Result<Vec<u8>> {
    // Strict format: raw LZ4 block with external expected size.
    lz4_flex::decompress(input, expected_size)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "lz4 decompression failed"))
}

pub fn write_u32_le<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_u64_le<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn write_f32_le<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_exact<const N: usize, R: Read>(r: &mut R) -> io::Result<[u8; N]> {
    let mut buf = [0u8; N];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    Ok(u32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    Ok(u64::from_le_bytes(read_exact::<8, _>(r)?))
}

pub fn read_f32_le<R: Read>(r: &mut R) -> io::Result<f32> {
    Ok(f32::from_le_bytes(read_exact::<4, _>(r)?))
}

pub fn write_f32_slice<W: Write>(w: &mut W, xs: &[f32]) -> io::Result<()> {
    for &x in xs {
        write_f32_le(w, x)?;
    }
    Ok(())
}

pub fn read_f32_vec<R: Read>(r: &mut R, n: usize) -> io::Result<Vec<f32>> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_f32_le(r)?);
    }
    Ok(out)
}

pub fn write_chunk<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    w.write_all(&tag)?;
    write_u32_le(
        w,
        u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    )?;
    w.write_all(payload)
}

/// Write an LZ4 chunk: payload is compressed and preceded by the
/// uncompressed length (u32).
///
/// Layout:
/// - tag: [u8;4]
/// - len: u32 (bytes following, including the 4-byte uncompressed length)
/// - uncompressed_len: u32
/// - compressed payload bytes
pub fn write_chunk_lz4<W: Write>(w: &mut W, tag: [u8; 4], payload: &[u8]) -> io::Result<()> {
    let compressed = compress_lz4(payload);
    let uncompressed_len = payload.len() as u32;
    let total_len = 4u32.saturating_add(
        u32::try_from(compressed.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "chunk too large"))?,
    );

    w.write_all(&tag)?;
    write_u32_le(w, total_len)?;
    write_u32_le(w, uncompressed_len)?;
    w.write_all(&compressed)
}

/// Read back the payload of a chunk written by [`write_chunk_lz4`].
///
/// `len` is the chunk length from its header.
pub fn read_chunk_lz4<R: Read>(r: &mut R, len: u32) -> io::Result<Vec<u8>> {
    if len < 4 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "lz4 chunk shorter than its length prefix",
        ));
    }
    let uncompressed_len = read_u32_le(r)? as usize;
    let mut compressed = vec![0u8; (len - 4) as usize];
    r.read_exact(&mut compressed)?;
    decompress_lz4(&compressed, uncompressed_len)
}

pub fn read_chunk_header<R: Read>(r: &mut R) -> io::Result<([u8; 4], u32)> {
    let tag = read_exact::<4, _>(r)?;
    let len = read_u32_le(r)?;
    Ok((tag, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn lz4_chunk_roundtrips() {
        let payload: Vec<u8> = (0..1024u32).flat_map(|v| (v as f32).to_le_bytes()).collect();

        let mut buf = Vec::new();
        write_chunk_lz4(&mut buf, *b"TEST", &payload).unwrap();

        let mut r = Cursor::new(buf);
        let (tag, len) = read_chunk_header(&mut r).unwrap();
        assert_eq!(&tag, b"TEST");
        let back = read_chunk_lz4(&mut r, len).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn f32_slice_roundtrips() {
        let xs = [0.0f32, -1.5, 3.25, f32::MAX];
        let mut buf = Vec::new();
        write_f32_slice(&mut buf, &xs).unwrap();

        let mut r = Cursor::new(buf);
        let back = read_f32_vec(&mut r, xs.len()).unwrap();
        assert_eq!(back, xs);
    }
}
