use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{EchelleError, Result};
use crate::io::fits::{BLOCK_SIZE, CARD_SIZE, COMMENTARY_KEYS, KEY_SIZE};
use crate::spectrum::{MetaValue, Metadata};

/// Keywords the writer derives from the data layout; caller values are ignored.
const STRUCTURAL_KEYS: [&str; 10] = [
    "SIMPLE", "BITPIX", "NAXIS", "EXTEND", "XTENSION", "PCOUNT", "GCOUNT", "TFIELDS", "BSCALE",
    "BZERO",
];
const STRUCTURAL_PREFIXES: [&str; 3] = ["NAXIS", "TTYPE", "TFORM"];

/// Data payload of an HDU to be written. Everything is stored as 64-bit floats.
#[derive(Clone, Debug)]
pub enum OutputData {
    /// Row-major image; `shape` lists the slowest axis first.
    Image { shape: Vec<usize>, data: Vec<f64> },
    /// Binary table of scalar `D` columns of equal length.
    Table { columns: Vec<(String, Vec<f64>)> },
}

#[derive(Clone, Debug)]
pub struct OutputHdu {
    pub header: Metadata,
    pub data: OutputData,
}

impl OutputHdu {
    pub fn image(shape: Vec<usize>, data: Vec<f64>) -> Self {
        Self {
            header: Metadata::new(),
            data: OutputData::Image { shape, data },
        }
    }

    pub fn table(columns: Vec<(String, Vec<f64>)>) -> Self {
        Self {
            header: Metadata::new(),
            data: OutputData::Table { columns },
        }
    }

    pub fn with_header(mut self, header: Metadata) -> Self {
        self.header = header;
        self
    }
}

/// Writes a FITS container at the raw byte level.
///
/// The first HDU becomes the primary array; a table given first is preceded
/// by an empty primary HDU, since tables are only legal as extensions.
pub fn write_fits(path: &Path, hdus: &[OutputHdu]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    let needs_empty_primary = !matches!(
        hdus.first(),
        Some(OutputHdu {
            data: OutputData::Image { .. },
            ..
        })
    );
    if needs_empty_primary {
        let mut block = HeaderBlock::default();
        block.card("SIMPLE", &MetaValue::Bool(true));
        block.card("BITPIX", &MetaValue::Int(8));
        block.card("NAXIS", &MetaValue::Int(0));
        block.card("EXTEND", &MetaValue::Bool(true));
        block.finish(&mut writer)?;
    }

    for (i, hdu) in hdus.iter().enumerate() {
        let primary = i == 0 && !needs_empty_primary;
        write_hdu(&mut writer, hdu, primary)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_hdu(w: &mut impl Write, hdu: &OutputHdu, primary: bool) -> Result<()> {
    let mut block = HeaderBlock::default();
    match &hdu.data {
        OutputData::Image { shape, data } => {
            let expected: usize = shape.iter().product();
            if expected != data.len() {
                return Err(EchelleError::Write(format!(
                    "image shape {shape:?} does not match {} values",
                    data.len()
                )));
            }
            if primary {
                block.card("SIMPLE", &MetaValue::Bool(true));
            } else {
                block.card("XTENSION", &MetaValue::from("IMAGE"));
            }
            block.card("BITPIX", &MetaValue::Int(-64));
            block.card("NAXIS", &MetaValue::Int(shape.len() as i64));
            for (axis, len) in shape.iter().rev().enumerate() {
                block.card(&format!("NAXIS{}", axis + 1), &MetaValue::Int(*len as i64));
            }
            if primary {
                block.card("EXTEND", &MetaValue::Bool(true));
            } else {
                block.card("PCOUNT", &MetaValue::Int(0));
                block.card("GCOUNT", &MetaValue::Int(1));
            }
            block.user_cards(&hdu.header);
            block.finish(w)?;

            let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_be_bytes()).collect();
            write_padded(w, &bytes, 0)
        }
        OutputData::Table { columns } => {
            let rows = columns.first().map_or(0, |(_, c)| c.len());
            if columns.iter().any(|(_, c)| c.len() != rows) {
                return Err(EchelleError::Write("table columns differ in length".into()));
            }
            block.card("XTENSION", &MetaValue::from("BINTABLE"));
            block.card("BITPIX", &MetaValue::Int(8));
            block.card("NAXIS", &MetaValue::Int(2));
            block.card("NAXIS1", &MetaValue::Int(8 * columns.len() as i64));
            block.card("NAXIS2", &MetaValue::Int(rows as i64));
            block.card("PCOUNT", &MetaValue::Int(0));
            block.card("GCOUNT", &MetaValue::Int(1));
            block.card("TFIELDS", &MetaValue::Int(columns.len() as i64));
            for (i, (name, _)) in columns.iter().enumerate() {
                block.card(&format!("TTYPE{}", i + 1), &MetaValue::from(name.as_str()));
                block.card(&format!("TFORM{}", i + 1), &MetaValue::from("D"));
            }
            block.user_cards(&hdu.header);
            block.finish(w)?;

            let mut bytes = Vec::with_capacity(rows * columns.len() * 8);
            for r in 0..rows {
                for (_, col) in columns {
                    bytes.extend_from_slice(&col[r].to_be_bytes());
                }
            }
            write_padded(w, &bytes, 0)
        }
    }
}

#[derive(Default)]
struct HeaderBlock {
    text: String,
}

impl HeaderBlock {
    fn card(&mut self, key: &str, value: &MetaValue) {
        let card = match value {
            MetaValue::Float(v) if !v.is_finite() => {
                tracing::warn!(key, value = %v, "Skipping non-finite header value");
                return;
            }
            MetaValue::Str(s) => {
                let quoted = quote_string(s);
                if quoted.len() - 2 < s.chars().count() + s.matches('\'').count() {
                    tracing::warn!(key, length = s.len(), "Truncating header string to one card");
                }
                format!("{key:<KEY_SIZE$}= {quoted}")
            }
            _ => format!("{key:<KEY_SIZE$}= {:>20}", format_value(value)),
        };
        self.push_line(&card);
    }

    fn push_line(&mut self, line: &str) {
        let mut line: String = line
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .take(CARD_SIZE)
            .collect();
        while line.len() < CARD_SIZE {
            line.push(' ');
        }
        self.text.push_str(&line);
    }

    /// Append caller metadata, skipping layout keys and invalid keywords.
    fn user_cards(&mut self, header: &Metadata) {
        for (key, value) in header.iter() {
            if is_structural(key) {
                continue;
            }
            if !is_valid_keyword(key) {
                tracing::warn!(key, "Skipping metadata key that is not a FITS keyword");
                continue;
            }
            if COMMENTARY_KEYS.contains(&key) {
                let text = value.to_string();
                for line in text.lines() {
                    let chars: Vec<char> = line.chars().collect();
                    for chunk in chars.chunks(CARD_SIZE - KEY_SIZE) {
                        let chunk: String = chunk.iter().collect();
                        self.push_line(&format!("{key:<KEY_SIZE$}{chunk}"));
                    }
                }
            } else {
                self.card(key, value);
            }
        }
    }

    fn finish(mut self, w: &mut impl Write) -> Result<()> {
        self.push_line("END");
        write_padded(w, self.text.as_bytes(), b' ')
    }
}

fn is_structural(key: &str) -> bool {
    STRUCTURAL_KEYS.contains(&key)
        || STRUCTURAL_PREFIXES
            .iter()
            .any(|p| key.strip_prefix(p).is_some_and(|rest| rest.chars().all(|c| c.is_ascii_digit())))
}

fn is_valid_keyword(key: &str) -> bool {
    !key.is_empty()
        && key.len() <= KEY_SIZE
        && key
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

fn format_value(value: &MetaValue) -> String {
    match value {
        MetaValue::Bool(b) => (if *b { "T" } else { "F" }).to_string(),
        MetaValue::Int(v) => v.to_string(),
        MetaValue::Float(v) => format_float(*v),
        MetaValue::Str(s) => quote_string(s),
    }
}

/// Widest quoted string that fits after `KEYWORD = `.
const MAX_QUOTED: usize = CARD_SIZE - KEY_SIZE - 2;

/// Quote and escape a string value, cutting it so the closing quote stays
/// on the card. An escaped quote pair is never split.
fn quote_string(s: &str) -> String {
    let mut quoted = String::from("'");
    for c in s.chars() {
        let c = if c.is_ascii() { c } else { '?' };
        let piece = if c == '\'' { "''".to_string() } else { c.to_string() };
        if quoted.len() + piece.len() + 1 > MAX_QUOTED {
            break;
        }
        quoted.push_str(&piece);
    }
    while quoted.len() < 9 {
        quoted.push(' ');
    }
    quoted.push('\'');
    quoted
}

fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        format!("{v:E}")
    }
}

fn write_padded(w: &mut impl Write, bytes: &[u8], fill: u8) -> Result<()> {
    w.write_all(bytes)?;
    let rem = bytes.len() % BLOCK_SIZE;
    if rem != 0 {
        w.write_all(&vec![fill; BLOCK_SIZE - rem])?;
    }
    Ok(())
}
