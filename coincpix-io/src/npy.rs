//! NumPy `.npy` arrays over memory-mapped files.
//!
//! Reads format versions 1.0, 2.0 and 3.0 with plain numeric dtypes in either
//! byte order and either memory order. Writes version 1.0, little-endian,
//! C order.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use byteorder::{BigEndian, ByteOrder, LittleEndian, WriteBytesExt};
use memmap2::Mmap;
use ndarray::{ArrayBase, ArrayD, Data, Dimension, IxDyn, ShapeBuilder};

use crate::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Byte order of array elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

impl Endianness {
    fn native() -> Self {
        if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        }
    }
}

/// Supported element types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    /// `f8`
    F8,
    /// `f4`
    F4,
    /// `i8`
    I8,
    /// `i4`
    I4,
    /// `i2`
    I2,
    /// `i1`
    I1,
    /// `u8`
    U8,
    /// `u4`
    U4,
    /// `u2`
    U2,
    /// `u1`
    U1,
    /// `b1`
    Bool,
}

impl Dtype {
    /// Element size in bytes.
    #[must_use]
    pub fn size(self) -> usize {
        match self {
            Dtype::F8 | Dtype::I8 | Dtype::U8 => 8,
            Dtype::F4 | Dtype::I4 | Dtype::U4 => 4,
            Dtype::I2 | Dtype::U2 => 2,
            Dtype::I1 | Dtype::U1 | Dtype::Bool => 1,
        }
    }

    fn code(self) -> &'static str {
        match self {
            Dtype::F8 => "f8",
            Dtype::F4 => "f4",
            Dtype::I8 => "i8",
            Dtype::I4 => "i4",
            Dtype::I2 => "i2",
            Dtype::I1 => "i1",
            Dtype::U8 => "u8",
            Dtype::U4 => "u4",
            Dtype::U2 => "u2",
            Dtype::U1 => "u1",
            Dtype::Bool => "b1",
        }
    }

    fn parse(descr: &str) -> Result<(Self, Endianness)> {
        let (order, code) = match descr.chars().next() {
            Some('<' | '|') => (Endianness::Little, &descr[1..]),
            Some('>') => (Endianness::Big, &descr[1..]),
            Some('=') => (Endianness::native(), &descr[1..]),
            _ => (Endianness::native(), descr),
        };
        let dtype = match code {
            "f8" | "d" => Dtype::F8,
            "f4" | "f" => Dtype::F4,
            "i8" | "q" => Dtype::I8,
            "i4" | "i" => Dtype::I4,
            "i2" | "h" => Dtype::I2,
            "i1" | "b" => Dtype::I1,
            "u8" | "Q" => Dtype::U8,
            "u4" | "I" => Dtype::U4,
            "u2" | "H" => Dtype::U2,
            "u1" | "B" => Dtype::U1,
            "b1" | "?" => Dtype::Bool,
            _ => return Err(Error::UnsupportedDtype(descr.to_string())),
        };
        Ok((dtype, order))
    }
}

/// Parsed `.npy` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NpyHeader {
    /// Element type.
    pub dtype: Dtype,
    /// Element byte order.
    pub endianness: Endianness,
    /// Column-major data when true.
    pub fortran_order: bool,
    /// Array shape.
    pub shape: Vec<usize>,
}

impl NpyHeader {
    /// Number of elements, `None` if it does not fit in `usize`.
    #[must_use]
    pub fn element_count(&self) -> Option<usize> {
        self.shape.iter().try_fold(1usize, |n, &d| n.checked_mul(d))
    }

    /// Parses the header at the start of `bytes`; returns it with the data
    /// offset.
    fn parse(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 10 || &bytes[..6] != MAGIC {
            return Err(Error::InvalidFormat("missing .npy magic".into()));
        }
        let (header_len, start) = match bytes[6] {
            1 => (usize::from(LittleEndian::read_u16(&bytes[8..10])), 10usize),
            2 | 3 if bytes.len() >= 12 => {
                let len = usize::try_from(LittleEndian::read_u32(&bytes[8..12]))
                    .map_err(|_| Error::InvalidFormat("header length overflows".into()))?;
                (len, 12)
            }
            major => {
                return Err(Error::InvalidFormat(format!(
                    "unsupported .npy version {major}.{}",
                    bytes[7]
                )))
            }
        };
        let end = start
            .checked_add(header_len)
            .filter(|&end| end <= bytes.len())
            .ok_or_else(|| Error::InvalidFormat("truncated .npy header".into()))?;
        let text = std::str::from_utf8(&bytes[start..end])
            .map_err(|_| Error::InvalidFormat("header is not UTF-8".into()))?;

        let (dtype, endianness) = Dtype::parse(quoted(dict_value(text, "descr")?)?)?;
        let fortran_order = match dict_value(text, "fortran_order")? {
            v if v.starts_with("True") => true,
            v if v.starts_with("False") => false,
            v => return Err(Error::InvalidFormat(format!("bad fortran_order '{v}'"))),
        };
        let shape = parse_shape(dict_value(text, "shape")?)?;

        let header = Self {
            dtype,
            endianness,
            fortran_order,
            shape,
        };
        if header.element_count().is_none() {
            return Err(Error::InvalidFormat(format!(
                "element count of shape {:?} overflows",
                header.shape
            )));
        }
        Ok((header, end))
    }

    fn encode(&self) -> Result<Vec<u8>> {
        let shape = match self.shape.as_slice() {
            [n] => format!("({n},)"),
            dims => {
                let dims: Vec<String> = dims.iter().map(ToString::to_string).collect();
                format!("({})", dims.join(", "))
            }
        };
        let order = match self.endianness {
            Endianness::Little => '<',
            Endianness::Big => '>',
        };
        let mut dict = format!(
            "{{'descr': '{order}{}', 'fortran_order': {}, 'shape': {shape}, }}",
            self.dtype.code(),
            if self.fortran_order { "True" } else { "False" }
        );
        let unpadded = MAGIC.len() + 4 + dict.len() + 1;
        dict.push_str(&" ".repeat((HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN));
        dict.push('\n');

        let header_len = u16::try_from(dict.len())
            .map_err(|_| Error::InvalidFormat("shape too long for a version 1.0 header".into()))?;
        let mut out = Vec::with_capacity(10 + dict.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.write_u16::<LittleEndian>(header_len)?;
        out.extend_from_slice(dict.as_bytes());
        Ok(out)
    }
}

/// Text following `'key':` in a header dict.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    let pos = text
        .find(&format!("'{key}'"))
        .or_else(|| text.find(&format!("\"{key}\"")))
        .ok_or_else(|| Error::InvalidFormat(format!("header has no '{key}'")))?;
    let rest = &text[pos + key.len() + 2..];
    let colon = rest
        .find(':')
        .ok_or_else(|| Error::InvalidFormat(format!("header key '{key}' has no value")))?;
    Ok(rest[colon + 1..].trim_start())
}

fn quoted(value: &str) -> Result<&str> {
    let quote = value
        .chars()
        .next()
        .filter(|c| matches!(c, '\'' | '"'))
        .ok_or_else(|| Error::UnsupportedDtype(value.chars().take(32).collect()))?;
    let body = &value[1..];
    let close = body
        .find(quote)
        .ok_or_else(|| Error::InvalidFormat("unterminated descr".into()))?;
    Ok(&body[..close])
}

fn parse_shape(value: &str) -> Result<Vec<usize>> {
    let inner = value
        .strip_prefix('(')
        .and_then(|v| v.find(')').map(|end| &v[..end]))
        .ok_or_else(|| Error::InvalidFormat("shape is not a tuple".into()))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| Error::InvalidFormat(format!("bad shape entry '{s}'")))
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn decode_f64<B: ByteOrder>(dtype: Dtype, b: &[u8]) -> f64 {
    match dtype {
        Dtype::F8 => B::read_f64(b),
        Dtype::F4 => f64::from(B::read_f32(b)),
        Dtype::I8 => B::read_i64(b) as f64,
        Dtype::I4 => f64::from(B::read_i32(b)),
        Dtype::I2 => f64::from(B::read_i16(b)),
        Dtype::I1 => f64::from(i8::from_ne_bytes([b[0]])),
        Dtype::U8 => B::read_u64(b) as f64,
        Dtype::U4 => f64::from(B::read_u32(b)),
        Dtype::U2 => f64::from(B::read_u16(b)),
        Dtype::U1 => f64::from(b[0]),
        Dtype::Bool => f64::from(u8::from(b[0] != 0)),
    }
}

#[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
fn float_to_i64(value: f64, index: usize) -> Result<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if value.is_finite() && value.trunc() == value && (-LIMIT..LIMIT).contains(&value) {
        Ok(value as i64)
    } else {
        Err(Error::InvalidValue {
            index,
            value,
            target: "i64",
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_i64<B: ByteOrder>(dtype: Dtype, b: &[u8], index: usize) -> Result<i64> {
    Ok(match dtype {
        Dtype::F8 | Dtype::F4 => return float_to_i64(decode_f64::<B>(dtype, b), index),
        Dtype::I8 => B::read_i64(b),
        Dtype::I4 => i64::from(B::read_i32(b)),
        Dtype::I2 => i64::from(B::read_i16(b)),
        Dtype::I1 => i64::from(i8::from_ne_bytes([b[0]])),
        Dtype::U8 => {
            let v = B::read_u64(b);
            i64::try_from(v).map_err(|_| Error::InvalidValue {
                index,
                value: v as f64,
                target: "i64",
            })?
        }
        Dtype::U4 => i64::from(B::read_u32(b)),
        Dtype::U2 => i64::from(B::read_u16(b)),
        Dtype::U1 => i64::from(b[0]),
        Dtype::Bool => i64::from(b[0] != 0),
    })
}

/// A memory-mapped `.npy` file.
pub struct NpyFile {
    mmap: Mmap,
    path: PathBuf,
    header: NpyHeader,
    data_offset: usize,
    data_len: usize,
}

impl std::fmt::Debug for NpyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NpyFile")
            .field("path", &self.path)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl NpyFile {
    /// Maps a file and parses its header.
    ///
    /// # Errors
    /// Returns an error if the file cannot be mapped, the header is invalid
    /// or the file is shorter than the header says.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        // SAFETY: The file is opened read-only and we assume it is not modified concurrently.
        // This is the standard safety contract for memory mapping.
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        let (header, data_offset) = NpyHeader::parse(&mmap)?;
        let data_len = header
            .element_count()
            .and_then(|n| n.checked_mul(header.dtype.size()))
            .ok_or_else(|| Error::InvalidFormat("array size overflows".into()))?;
        let needed = data_len
            .checked_add(data_offset)
            .ok_or_else(|| Error::InvalidFormat("array size overflows".into()))?;
        if mmap.len() < needed {
            return Err(Error::InvalidFormat(format!(
                "{}: expected {needed} bytes, found {}",
                path.as_ref().display(),
                mmap.len()
            )));
        }
        Ok(Self {
            mmap,
            path: path.as_ref().to_path_buf(),
            header,
            data_offset,
            data_len,
        })
    }

    /// Parsed header.
    #[must_use]
    pub fn header(&self) -> &NpyHeader {
        &self.header
    }

    /// Array shape.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.header.shape
    }

    /// Path the file was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn elements(&self) -> std::slice::ChunksExact<'_, u8> {
        let size = self.header.dtype.size();
        self.mmap[self.data_offset..self.data_offset + self.data_len].chunks_exact(size)
    }

    fn shaped<T>(&self, values: Vec<T>) -> Result<ArrayD<T>> {
        let shape = IxDyn(&self.header.shape);
        let array = if self.header.fortran_order {
            ArrayD::from_shape_vec(shape.f(), values)
        } else {
            ArrayD::from_shape_vec(shape, values)
        };
        array.map_err(|e| Error::InvalidFormat(e.to_string()))
    }

    /// Reads the array as `f64`.
    ///
    /// # Errors
    /// Returns an error if the data does not match the shape.
    pub fn to_f64(&self) -> Result<ArrayD<f64>> {
        let dtype = self.header.dtype;
        let values: Vec<f64> = match self.header.endianness {
            Endianness::Little => self.elements().map(|b| decode_f64::<LittleEndian>(dtype, b)).collect(),
            Endianness::Big => self.elements().map(|b| decode_f64::<BigEndian>(dtype, b)).collect(),
        };
        self.shaped(values)
    }

    /// Reads the array as `i64`.
    ///
    /// Float data must hold integral values.
    ///
    /// # Errors
    /// Returns [`Error::InvalidValue`] for a value without an exact `i64`
    /// representation.
    pub fn to_i64(&self) -> Result<ArrayD<i64>> {
        let dtype = self.header.dtype;
        let values = match self.header.endianness {
            Endianness::Little => self
                .elements()
                .enumerate()
                .map(|(i, b)| decode_i64::<LittleEndian>(dtype, b, i))
                .collect::<Result<Vec<_>>>()?,
            Endianness::Big => self
                .elements()
                .enumerate()
                .map(|(i, b)| decode_i64::<BigEndian>(dtype, b, i))
                .collect::<Result<Vec<_>>>()?,
        };
        self.shaped(values)
    }
}

/// Element types the writer can emit.
pub trait NpyElement: Copy {
    /// Dtype written to the header.
    const DTYPE: Dtype;

    /// Writes one little-endian element.
    ///
    /// # Errors
    /// Propagates write errors.
    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()>;
}

impl NpyElement for i64 {
    const DTYPE: Dtype = Dtype::I8;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<LittleEndian>(self)
    }
}

impl NpyElement for f64 {
    const DTYPE: Dtype = Dtype::F8;

    fn write_le<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        writer.write_f64::<LittleEndian>(self)
    }
}

/// Writes an array as a version 1.0 `.npy` file in C order.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_npy<P, S, D>(path: P, array: &ArrayBase<S, D>) -> Result<()>
where
    P: AsRef<Path>,
    S: Data,
    S::Elem: NpyElement,
    D: Dimension,
{
    let header = NpyHeader {
        dtype: S::Elem::DTYPE,
        endianness: Endianness::Little,
        fortran_order: false,
        shape: array.shape().to_vec(),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(&header.encode()?)?;
    for &value in array {
        value.write_le(&mut writer)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array3};
    use tempfile::NamedTempFile;

    fn raw_npy(descr: &str, fortran: bool, shape: &str, version: u8, data: &[u8]) -> Vec<u8> {
        let dict = format!(
            "{{'descr': '{descr}', 'fortran_order': {}, 'shape': {shape}, }}\n",
            if fortran { "True" } else { "False" }
        );
        let mut out = MAGIC.to_vec();
        out.extend_from_slice(&[version, 0]);
        if version == 1 {
            out.write_u16::<LittleEndian>(u16::try_from(dict.len()).unwrap())
                .unwrap();
        } else {
            out.write_u32::<LittleEndian>(u32::try_from(dict.len()).unwrap())
                .unwrap();
        }
        out.extend_from_slice(dict.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn write_temp(bytes: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_header_is_aligned() {
        let header = NpyHeader {
            dtype: Dtype::I8,
            endianness: Endianness::Little,
            fortran_order: false,
            shape: vec![2, 3, 7],
        };
        let bytes = header.encode().unwrap();
        assert_eq!(bytes.len() % HEADER_ALIGN, 0);
        let (parsed, offset) = NpyHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(offset, bytes.len());
    }

    #[test]
    fn test_one_dimensional_shape_tuple() {
        let header = NpyHeader {
            dtype: Dtype::F8,
            endianness: Endianness::Little,
            fortran_order: false,
            shape: vec![5],
        };
        let text = String::from_utf8(header.encode().unwrap()[10..].to_vec()).unwrap();
        assert!(text.contains("'shape': (5,)"));
    }

    #[test]
    fn test_big_endian_i2() {
        let mut data = Vec::new();
        for v in [1i16, -2, 300, 4] {
            data.write_i16::<BigEndian>(v).unwrap();
        }
        let file = write_temp(&raw_npy(">i2", false, "(2, 2)", 1, &data));
        let npy = NpyFile::open(file.path()).unwrap();
        assert_eq!(npy.header().endianness, Endianness::Big);
        let arr = npy.to_i64().unwrap();
        assert_eq!(arr, array![[1i64, -2], [300, 4]].into_dyn());
    }

    #[test]
    fn test_fortran_order_v2() {
        let mut data = Vec::new();
        // column-major storage of [[1, 2, 3], [4, 5, 6]]
        for v in [1.0f32, 4.0, 2.0, 5.0, 3.0, 6.0] {
            data.write_f32::<LittleEndian>(v).unwrap();
        }
        let file = write_temp(&raw_npy("<f4", true, "(2, 3)", 2, &data));
        let arr = NpyFile::open(file.path()).unwrap().to_f64().unwrap();
        assert_eq!(arr, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]].into_dyn());
    }

    #[test]
    fn test_float_to_int_requires_integral_values() {
        let mut data = Vec::new();
        for v in [1.0f64, 2.5] {
            data.write_f64::<LittleEndian>(v).unwrap();
        }
        let file = write_temp(&raw_npy("<f8", false, "(2,)", 1, &data));
        let err = NpyFile::open(file.path()).unwrap().to_i64().unwrap_err();
        assert!(matches!(err, Error::InvalidValue { index: 1, .. }));
    }

    #[test]
    fn test_rejects_bad_files() {
        let file = write_temp(b"not an npy file at all");
        assert!(matches!(
            NpyFile::open(file.path()),
            Err(Error::InvalidFormat(_))
        ));

        let truncated = write_temp(&raw_npy("<i8", false, "(4,)", 1, &[0u8; 16]));
        assert!(matches!(
            NpyFile::open(truncated.path()),
            Err(Error::InvalidFormat(_))
        ));

        let complex = write_temp(&raw_npy("<c16", false, "(1,)", 1, &[0u8; 16]));
        assert!(matches!(
            NpyFile::open(complex.path()),
            Err(Error::UnsupportedDtype(_))
        ));
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let file = write_temp(&raw_npy(
            "<i8",
            false,
            "(4294967296, 4294967296, 2)",
            1,
            &[0u8; 16],
        ));
        let err = NpyFile::open(file.path()).unwrap_err();
        assert!(matches!(err, Error::InvalidFormat(ref msg) if msg.contains("overflows")));

        let header = NpyHeader {
            dtype: Dtype::I8,
            endianness: Endianness::Little,
            fortran_order: false,
            shape: vec![usize::MAX, 2],
        };
        assert_eq!(header.element_count(), None);
    }

    #[test]
    fn test_write_then_read_events_tensor() {
        let arr = Array3::from_shape_fn((2, 3, 4), |(c, f, i)| {
            i64::try_from(c * 100 + f * 10 + i).unwrap() - 50
        });
        let file = NamedTempFile::new().unwrap();
        write_npy(file.path(), &arr).unwrap();
        let npy = NpyFile::open(file.path()).unwrap();
        assert_eq!(npy.header().dtype, Dtype::I8);
        assert_eq!(npy.shape(), &[2, 3, 4]);
        assert_eq!(npy.to_i64().unwrap(), arr.into_dyn());
    }
}
