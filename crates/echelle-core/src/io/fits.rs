use std::fs::File;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use memmap2::Mmap;
use ndarray::{Array1, Array2, Array3};

use crate::error::{EchelleError, Result};
use crate::spectrum::{MetaValue, Metadata};

pub(crate) const BLOCK_SIZE: usize = 2880;
pub(crate) const CARD_SIZE: usize = 80;
pub(crate) const KEY_SIZE: usize = 8;

/// Cards whose text accumulates rather than being assigned.
pub(crate) const COMMENTARY_KEYS: [&str; 2] = ["COMMENT", "HISTORY"];

/// Kind of header-data unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HduKind {
    Primary,
    Image,
    BinTable,
    Other(String),
}

/// N-dimensional image data in row-major order (slowest axis first).
#[derive(Clone, Debug, PartialEq)]
pub struct ImageData {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl ImageData {
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn to_array1(&self) -> Result<Array1<f64>> {
        match self.shape.as_slice() {
            [n] => Ok(Array1::from_vec(self.data[..*n].to_vec())),
            other => Err(EchelleError::StructuralRead(format!(
                "expected a 1-D image, got shape {other:?}"
            ))),
        }
    }

    /// View as (rows, columns); 1-D data becomes a single row.
    pub fn to_array2(&self) -> Result<Array2<f64>> {
        let shape = match self.shape.as_slice() {
            [n] => (1, *n),
            [r, c] => (*r, *c),
            other => {
                return Err(EchelleError::StructuralRead(format!(
                    "expected a 2-D image, got shape {other:?}"
                )))
            }
        };
        Array2::from_shape_vec(shape, self.data.clone())
            .map_err(|e| EchelleError::InvalidFits(e.to_string()))
    }

    pub fn to_array3(&self) -> Result<Array3<f64>> {
        match self.shape.as_slice() {
            [b, r, c] => Array3::from_shape_vec((*b, *r, *c), self.data.clone())
                .map_err(|e| EchelleError::InvalidFits(e.to_string())),
            other => Err(EchelleError::StructuralRead(format!(
                "expected a 3-D image, got shape {other:?}"
            ))),
        }
    }
}

/// One binary-table column, flattened row by row.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    pub repeat: usize,
    pub values: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum HduData {
    Empty,
    Image(ImageData),
    Table(Vec<Column>),
}

#[derive(Clone, Debug)]
pub struct Hdu {
    pub kind: HduKind,
    pub header: Metadata,
    pub data: HduData,
}

impl Hdu {
    pub fn has_data(&self) -> bool {
        !matches!(self.data, HduData::Empty)
    }

    pub fn image(&self) -> Option<&ImageData> {
        match &self.data {
            HduData::Image(img) => Some(img),
            _ => None,
        }
    }

    /// Column by name; names compare case-sensitively, as written.
    pub fn column(&self, name: &str) -> Option<&Column> {
        match &self.data {
            HduData::Table(cols) => cols.iter().find(|c| c.name == name),
            _ => None,
        }
    }
}

/// A parsed FITS container.
#[derive(Clone, Debug)]
pub struct FitsFile {
    pub hdus: Vec<Hdu>,
}

impl FitsFile {
    /// Memory-map and parse every HDU of a FITS file.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::parse(&mmap)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < BLOCK_SIZE || !bytes.starts_with(b"SIMPLE  =") {
            return Err(EchelleError::InvalidFits("missing SIMPLE card".into()));
        }

        let mut hdus = Vec::new();
        let mut offset = 0;
        while offset + BLOCK_SIZE <= bytes.len() {
            let (header, header_len) = parse_header(&bytes[offset..])?;
            offset += header_len;

            let kind = if hdus.is_empty() {
                HduKind::Primary
            } else {
                match header.get_str("XTENSION").map(str::trim) {
                    Some("IMAGE") => HduKind::Image,
                    Some("BINTABLE") => HduKind::BinTable,
                    Some(other) => HduKind::Other(other.to_string()),
                    None => {
                        return Err(EchelleError::InvalidFits(format!(
                            "extension {} has no XTENSION card",
                            hdus.len()
                        )))
                    }
                }
            };

            let size = data_size(&header)?;
            let end = offset + size;
            if end > bytes.len() {
                return Err(EchelleError::InvalidFits(format!(
                    "HDU {} truncated: expected {size} data bytes",
                    hdus.len()
                )));
            }
            let raw = &bytes[offset..end];

            let data = match kind {
                HduKind::Primary | HduKind::Image if size > 0 => {
                    HduData::Image(decode_image(&header, raw)?)
                }
                HduKind::BinTable => HduData::Table(decode_table(&header, raw)?),
                _ => HduData::Empty,
            };

            hdus.push(Hdu { kind, header, data });
            offset += size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        }

        Ok(Self { hdus })
    }

    pub fn primary(&self) -> &Hdu {
        &self.hdus[0]
    }

    pub fn len(&self) -> usize {
        self.hdus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hdus.is_empty()
    }
}

/// Parse header cards up to END, returning the header and its padded length.
fn parse_header(bytes: &[u8]) -> Result<(Metadata, usize)> {
    let mut header = Metadata::new();
    let mut pos = 0;
    loop {
        if pos + CARD_SIZE > bytes.len() {
            return Err(EchelleError::InvalidFits("header without END card".into()));
        }
        let card: String = bytes[pos..pos + CARD_SIZE]
            .iter()
            .map(|&b| if b.is_ascii() { b as char } else { '?' })
            .collect();
        pos += CARD_SIZE;

        let key = card[..KEY_SIZE].trim_end();
        if key == "END" {
            break;
        }
        if key.is_empty() {
            continue;
        }

        if COMMENTARY_KEYS.contains(&key) {
            let text = card[KEY_SIZE..].trim_end();
            let sep = if header.contains_key(key) { "\n" } else { "" };
            header.append(key, format!("{sep}{text}"));
        } else if &card[KEY_SIZE..KEY_SIZE + 2] == "= " {
            header.append(key, parse_value(&card[KEY_SIZE + 2..]));
        }
    }
    Ok((header, pos.div_ceil(BLOCK_SIZE) * BLOCK_SIZE))
}

/// Parse the value field of a keyword card (everything after `= `).
pub(crate) fn parse_value(field: &str) -> MetaValue {
    let field = field.trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        let mut out = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                } else {
                    break;
                }
            } else {
                out.push(c);
            }
        }
        return MetaValue::Str(out.trim_end().to_string());
    }

    let token = field.split('/').next().unwrap_or("").trim();
    match token {
        "T" => MetaValue::Bool(true),
        "F" => MetaValue::Bool(false),
        _ => {
            if let Ok(v) = token.parse::<i64>() {
                MetaValue::Int(v)
            } else if let Ok(v) = token.replace(['D', 'd'], "E").parse::<f64>() {
                MetaValue::Float(v)
            } else {
                MetaValue::Str(token.to_string())
            }
        }
    }
}

fn header_usize(header: &Metadata, key: &str) -> Result<usize> {
    header
        .get(key)
        .and_then(MetaValue::as_i64)
        .and_then(|v| usize::try_from(v).ok())
        .ok_or_else(|| EchelleError::InvalidFits(format!("missing or invalid {key}")))
}

fn axes(header: &Metadata) -> Result<Vec<usize>> {
    let naxis = header_usize(header, "NAXIS")?;
    (1..=naxis)
        .map(|i| header_usize(header, &format!("NAXIS{i}")))
        .collect()
}

fn data_size(header: &Metadata) -> Result<usize> {
    let axes = axes(header)?;
    if axes.is_empty() {
        return Ok(0);
    }
    let bitpix = header
        .get("BITPIX")
        .and_then(MetaValue::as_i64)
        .ok_or_else(|| EchelleError::InvalidFits("missing BITPIX".into()))?;
    let pcount = header.get("PCOUNT").and_then(MetaValue::as_i64).unwrap_or(0) as usize;
    let gcount = header.get("GCOUNT").and_then(MetaValue::as_i64).unwrap_or(1) as usize;
    let elements: usize = axes.iter().product();
    Ok(bitpix.unsigned_abs() as usize / 8 * gcount * (pcount + elements))
}

fn decode_image(header: &Metadata, raw: &[u8]) -> Result<ImageData> {
    let bitpix = header.get("BITPIX").and_then(MetaValue::as_i64).unwrap_or(0);
    let bscale = header.get_f64("BSCALE").unwrap_or(1.0);
    let bzero = header.get_f64("BZERO").unwrap_or(0.0);

    let mut shape = axes(header)?;
    let count: usize = shape.iter().product();
    shape.reverse();

    let width = bitpix.unsigned_abs() as usize / 8;
    if width == 0 || raw.len() < count * width {
        return Err(EchelleError::InvalidFits(format!("bad image data for BITPIX {bitpix}")));
    }

    let data = (0..count)
        .map(|i| {
            let b = &raw[i * width..(i + 1) * width];
            let v = decode_scalar(bitpix, b)?;
            Ok(v * bscale + bzero)
        })
        .collect::<Result<Vec<f64>>>()?;

    Ok(ImageData { shape, data })
}

fn decode_scalar(bitpix: i64, b: &[u8]) -> Result<f64> {
    Ok(match bitpix {
        8 => b[0] as f64,
        16 => BigEndian::read_i16(b) as f64,
        32 => BigEndian::read_i32(b) as f64,
        64 => BigEndian::read_i64(b) as f64,
        -32 => BigEndian::read_f32(b) as f64,
        -64 => BigEndian::read_f64(b),
        other => return Err(EchelleError::InvalidFits(format!("unsupported BITPIX {other}"))),
    })
}

/// Parse a TFORM value like `1D`, `E`, `20A` into (repeat, type code).
fn parse_tform(tform: &str) -> Result<(usize, char)> {
    let tform = tform.trim();
    let split = tform
        .find(|c: char| c.is_ascii_alphabetic())
        .ok_or_else(|| EchelleError::InvalidFits(format!("bad TFORM '{tform}'")))?;
    let repeat = if split == 0 {
        1
    } else {
        tform[..split]
            .parse()
            .map_err(|_| EchelleError::InvalidFits(format!("bad TFORM '{tform}'")))?
    };
    let code = tform[split..].chars().next().unwrap_or('?');
    Ok((repeat, code))
}

fn type_width(code: char) -> Result<usize> {
    match code {
        'L' | 'B' | 'A' => Ok(1),
        'I' => Ok(2),
        'J' | 'E' => Ok(4),
        'K' | 'D' => Ok(8),
        other => Err(EchelleError::InvalidFits(format!("unsupported column type '{other}'"))),
    }
}

fn decode_table(header: &Metadata, raw: &[u8]) -> Result<Vec<Column>> {
    let row_len = header_usize(header, "NAXIS1")?;
    let rows = header_usize(header, "NAXIS2")?;
    let fields = header_usize(header, "TFIELDS")?;

    let mut layout = Vec::with_capacity(fields);
    let mut col_offset = 0;
    for i in 1..=fields {
        let name = header
            .get_str(&format!("TTYPE{i}"))
            .unwrap_or_default()
            .trim()
            .to_string();
        let tform = header
            .get_str(&format!("TFORM{i}"))
            .ok_or_else(|| EchelleError::InvalidFits(format!("missing TFORM{i}")))?;
        let (repeat, code) = parse_tform(tform)?;
        let width = type_width(code)?;
        let scale = header.get_f64(&format!("TSCAL{i}")).unwrap_or(1.0);
        let zero = header.get_f64(&format!("TZERO{i}")).unwrap_or(0.0);
        layout.push((name, repeat, code, width, col_offset, scale, zero));
        col_offset += repeat * width;
    }
    if col_offset > row_len || raw.len() < rows * row_len {
        return Err(EchelleError::InvalidFits("table rows shorter than columns".into()));
    }

    layout
        .into_iter()
        .map(|(name, repeat, code, width, start, scale, zero)| {
            let mut values = Vec::new();
            if code != 'A' {
                values.reserve(rows * repeat);
                for r in 0..rows {
                    for k in 0..repeat {
                        let at = r * row_len + start + k * width;
                        let b = &raw[at..at + width];
                        let v = match code {
                            'L' => f64::from(u8::from(b[0] == b'T')),
                            'B' => b[0] as f64,
                            'I' => BigEndian::read_i16(b) as f64,
                            'J' => BigEndian::read_i32(b) as f64,
                            'K' => BigEndian::read_i64(b) as f64,
                            'E' => BigEndian::read_f32(b) as f64,
                            _ => BigEndian::read_f64(b),
                        };
                        values.push(v * scale + zero);
                    }
                }
            }
            Ok(Column { name, repeat, values })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_values_unescape_quotes_and_trim() {
        assert_eq!(parse_value(" 'O''Brien  '  / who"), MetaValue::Str("O'Brien".into()));
    }

    #[test]
    fn numeric_values_accept_fortran_exponent() {
        assert_eq!(parse_value("  1.5D2 / comment"), MetaValue::Float(150.0));
        assert_eq!(parse_value("   42"), MetaValue::Int(42));
        assert_eq!(parse_value("   T"), MetaValue::Bool(true));
    }

    #[test]
    fn tform_parses_repeat_and_code() {
        assert_eq!(parse_tform("1D").unwrap(), (1, 'D'));
        assert_eq!(parse_tform("E").unwrap(), (1, 'E'));
        assert_eq!(parse_tform("20A").unwrap(), (20, 'A'));
    }
}
