// ECG record ingestion
// Reads the `val` matrix from MATLAB files and pairs it with the companion header

use ndarray::{Array2, ShapeBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::signal::header::{HeaderError, RecordHeader};

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Failed to read signal file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported signal format: {0}")]
    UnsupportedFormat(String),

    #[error("Variable '{0}' not found in signal file")]
    MissingVariable(String),

    #[error("Invalid signal data: {0}")]
    InvalidData(String),

    #[error("Invalid sample rate: source {src_fs} Hz, target {tar_fs} Hz")]
    InvalidSampleRate { src_fs: f64, tar_fs: f64 },

    #[error("Failed to parse header {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: HeaderError,
    },
}

/// Name of the signal variable inside record files
pub const SIGNAL_VARIABLE: &str = "val";

/// Header file extension paired with each record
pub const HEADER_EXTENSION: &str = "hea";

/// A loaded ECG record: signal matrix plus parsed header
#[derive(Debug, Clone)]
pub struct EcgRecord {
    /// Record name (file stem)
    pub name: String,

    /// Signal, shape (channels, samples), in header lead order
    pub signal: Array2<f32>,

    /// Parsed header
    pub header: RecordHeader,
}

impl EcgRecord {
    /// Number of leads
    pub fn channels(&self) -> usize {
        self.signal.nrows()
    }

    /// Number of samples per lead
    pub fn samples(&self) -> usize {
        self.signal.ncols()
    }

    /// Duration in seconds at the header sampling frequency
    pub fn duration_secs(&self) -> f64 {
        self.samples() as f64 / self.header.sampling_frequency as f64
    }
}

/// Load a record from a `.mat` file and its `.hea` companion
pub fn load_record(mat_path: &Path) -> Result<EcgRecord, SignalError> {
    let data = fs::read(mat_path)?;
    let signal = read_mat_variable(&data, SIGNAL_VARIABLE)?;

    let header_path = mat_path.with_extension(HEADER_EXTENSION);
    let header_text = fs::read_to_string(&header_path)?;
    let header = RecordHeader::parse(&header_text).map_err(|source| SignalError::Header {
        path: header_path.clone(),
        source,
    })?;

    let name = mat_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();

    log::debug!(
        "Loaded record {}: {} leads x {} samples at {} Hz",
        name,
        signal.nrows(),
        signal.ncols(),
        header.sampling_frequency
    );

    Ok(EcgRecord {
        name,
        signal,
        header,
    })
}

/// Read a 2-D numeric variable from MATLAB file bytes
///
/// Level 5 files (compressed or not) go through `matfile`; Level 4 files,
/// which `wfdb2mat` still writes, are read directly.
pub fn read_mat_variable(data: &[u8], name: &str) -> Result<Array2<f32>, SignalError> {
    if is_level5(data) {
        read_level5(data, name)
    } else {
        read_level4(data, name)
    }
}

fn is_level5(data: &[u8]) -> bool {
    data.len() >= 128 && data.starts_with(b"MATLAB 5.0")
}

fn read_level5(data: &[u8], name: &str) -> Result<Array2<f32>, SignalError> {
    let mat = matfile::MatFile::parse(data)
        .map_err(|e| SignalError::InvalidData(format!("Level 5 MAT file: {:?}", e)))?;
    let array = mat
        .find_by_name(name)
        .ok_or_else(|| SignalError::MissingVariable(name.to_string()))?;

    let size = array.size();
    if size.len() != 2 {
        return Err(SignalError::InvalidData(format!(
            "variable '{}' must be a 2-D matrix, found dimensions {:?}",
            name, size
        )));
    }

    let values = numeric_to_f32(name, array.data())?;
    column_major_matrix(size[0], size[1], values)
}

/// Real part of a MATLAB numeric array as f32
fn numeric_to_f32(name: &str, data: &matfile::NumericData) -> Result<Vec<f32>, SignalError> {
    use matfile::NumericData;

    fn real<T: Copy, I>(real: &[T], imag: &Option<I>, cast: impl Fn(T) -> f32) -> Option<Vec<f32>> {
        match imag {
            Some(_) => None,
            None => Some(real.iter().map(|&v| cast(v)).collect()),
        }
    }

    let values = match data {
        NumericData::Int8 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::UInt8 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::Int16 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::UInt16 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::Int32 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::UInt32 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::Int64 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::UInt64 { real: r, imag } => real(r, imag, |v| v as f32),
        NumericData::Single { real: r, imag } => real(r, imag, |v| v),
        NumericData::Double { real: r, imag } => real(r, imag, |v| v as f32),
    };

    values.ok_or_else(|| SignalError::UnsupportedFormat(format!("variable '{}' is complex", name)))
}

/// Build a row-major matrix from column-major MATLAB storage
fn column_major_matrix(rows: usize, cols: usize, values: Vec<f32>) -> Result<Array2<f32>, SignalError> {
    let expected = rows
        .checked_mul(cols)
        .ok_or_else(|| SignalError::InvalidData(format!("matrix of {} x {} is too large", rows, cols)))?;
    if values.len() != expected {
        return Err(SignalError::InvalidData(format!(
            "{} x {} matrix holds {} values",
            rows,
            cols,
            values.len()
        )));
    }

    let matrix = Array2::from_shape_vec((rows, cols).f(), values)
        .map_err(|e| SignalError::InvalidData(e.to_string()))?;
    Ok(matrix.as_standard_layout().into_owned())
}

/// Byte size of a Level 4 precision digit (the P in MOPT)
fn level4_size(precision: i32) -> Option<usize> {
    match precision {
        0 => Some(8),
        1 | 2 => Some(4),
        3 | 4 => Some(2),
        5 => Some(1),
        _ => None,
    }
}

/// Decode one little-endian Level 4 value
fn decode_level4(precision: i32, b: &[u8]) -> f32 {
    match precision {
        0 => f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32,
        1 => f32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        2 => i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32,
        3 => i16::from_le_bytes([b[0], b[1]]) as f32,
        4 => u16::from_le_bytes([b[0], b[1]]) as f32,
        _ => b[0] as f32,
    }
}

/// Byte length of `rows x cols` values of `size` bytes, if it fits in `usize`
fn level4_byte_len(rows: usize, cols: usize, size: usize) -> Result<usize, SignalError> {
    rows.checked_mul(cols)
        .and_then(|count| count.checked_mul(size))
        .ok_or_else(|| SignalError::InvalidData(format!("Level 4 matrix of {} x {} is too large", rows, cols)))
}

fn take<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], SignalError> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or_else(|| {
            SignalError::InvalidData(format!(
                "unexpected end of file at byte {} (needed {} more)",
                offset, len
            ))
        })
}

fn read_level4(data: &[u8], name: &str) -> Result<Array2<f32>, SignalError> {
    let mut offset = 0;

    while offset < data.len() {
        let header = take(data, offset, 20)
            .map_err(|_| SignalError::InvalidData("truncated Level 4 matrix header".to_string()))?;

        // The type word tells us the byte order: valid MOPT values are < 5000
        let le_type = i32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let big_endian = !(0..5000).contains(&le_type);
        let word = |i: usize| {
            let bytes = [header[i * 4], header[i * 4 + 1], header[i * 4 + 2], header[i * 4 + 3]];
            if big_endian {
                i32::from_be_bytes(bytes)
            } else {
                i32::from_le_bytes(bytes)
            }
        };
        let (mopt, rows, cols, imagf, namlen) = (word(0), word(1), word(2), word(3), word(4));

        if !(0..5000).contains(&mopt) || rows < 0 || cols < 0 || namlen < 0 {
            return Err(SignalError::UnsupportedFormat(format!(
                "not a MATLAB Level 4 matrix (type word {})",
                mopt
            )));
        }

        let precision = (mopt / 10) % 10;
        let matrix_type = mopt % 10;
        let size = level4_size(precision)
            .ok_or_else(|| SignalError::UnsupportedFormat(format!("Level 4 precision {}", precision)))?;

        offset += 20;
        let var_name = take(data, offset, namlen as usize)?;
        let var_name = String::from_utf8_lossy(var_name).trim_end_matches('\0').to_string();
        offset += namlen as usize;

        let (rows, cols) = (rows as usize, cols as usize);
        let byte_len = level4_byte_len(rows, cols, size)?;
        let real = take(data, offset, byte_len)?;
        offset += byte_len;
        if imagf != 0 {
            take(data, offset, byte_len)?;
            offset += byte_len;
        }

        if var_name == name {
            if matrix_type != 0 {
                return Err(SignalError::UnsupportedFormat(format!(
                    "variable '{}' is not a full numeric matrix",
                    name
                )));
            }
            let values = real
                .chunks_exact(size)
                .map(|chunk| {
                    if big_endian {
                        let mut swapped = chunk.to_vec();
                        swapped.reverse();
                        decode_level4(precision, &swapped)
                    } else {
                        decode_level4(precision, chunk)
                    }
                })
                .collect();
            return column_major_matrix(rows, cols, values);
        }
    }

    Err(SignalError::MissingVariable(name.to_string()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    /// Encode a row-major i16 matrix as a little-endian Level 4 MAT variable
    pub(crate) fn level4_i16(name: &str, rows: usize, cols: usize, row_major: &[i16]) -> Vec<u8> {
        let mut out = Vec::new();
        let mopt: i32 = 30; // little-endian, int16, full matrix
        let namlen = name.len() as i32 + 1;
        for word in [mopt, rows as i32, cols as i32, 0, namlen] {
            out.extend_from_slice(&word.to_le_bytes());
        }
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        for c in 0..cols {
            for r in 0..rows {
                out.extend_from_slice(&row_major[r * cols + c].to_le_bytes());
            }
        }
        out
    }

    fn level5_element(mi_type: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&mi_type.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        while out.len() % 8 != 0 {
            out.push(0);
        }
        out
    }

    fn level5_file(elements: Vec<u8>) -> Vec<u8> {
        let mut out = vec![b' '; 128];
        let text = b"MATLAB 5.0 MAT-file, written by test";
        out[..text.len()].copy_from_slice(text);
        out[116..124].copy_from_slice(&[0u8; 8]);
        out[124..126].copy_from_slice(&0x0100u16.to_le_bytes());
        out[126..128].copy_from_slice(b"IM");
        out.extend(elements);
        out
    }

    /// Uncompressed Level 5 double matrix with explicit dimensions
    fn level5_f64(name: &str, dims: [i32; 2], column_major: &[f64]) -> Vec<u8> {
        let mut matrix = Vec::new();
        let mut flags = Vec::new();
        flags.extend_from_slice(&6u32.to_le_bytes()); // mxDOUBLE_CLASS
        flags.extend_from_slice(&0u32.to_le_bytes());
        matrix.extend(level5_element(6, &flags));

        let mut dim_bytes = Vec::new();
        for d in dims {
            dim_bytes.extend_from_slice(&d.to_le_bytes());
        }
        matrix.extend(level5_element(5, &dim_bytes));
        matrix.extend(level5_element(1, name.as_bytes()));

        let mut real = Vec::new();
        for v in column_major {
            real.extend_from_slice(&v.to_le_bytes());
        }
        matrix.extend(level5_element(9, &real));

        level5_file(level5_element(14, &matrix))
    }

    #[test]
    fn test_read_level4_matrix() {
        let values: Vec<i16> = vec![1, 2, 3, 4, 5, 6];
        let bytes = level4_i16("val", 2, 3, &values);

        let matrix = read_mat_variable(&bytes, "val").unwrap();
        assert_eq!(matrix.shape(), &[2, 3]);
        assert_eq!(matrix[[0, 0]], 1.0);
        assert_eq!(matrix[[0, 2]], 3.0);
        assert_eq!(matrix[[1, 0]], 4.0);
        assert_eq!(matrix[[1, 2]], 6.0);
    }

    #[test]
    fn test_read_level4_skips_other_variables() {
        let mut bytes = level4_i16("gain", 1, 2, &[7, 8]);
        bytes.extend(level4_i16("val", 1, 2, &[-3, 9]));

        let matrix = read_mat_variable(&bytes, "val").unwrap();
        assert_eq!(matrix.shape(), &[1, 2]);
        assert_eq!(matrix[[0, 0]], -3.0);
    }

    #[test]
    fn test_missing_variable() {
        let bytes = level4_i16("other", 1, 1, &[1]);
        assert!(matches!(
            read_mat_variable(&bytes, "val"),
            Err(SignalError::MissingVariable(_))
        ));
    }

    #[test]
    fn test_truncated_level4() {
        let mut bytes = level4_i16("val", 2, 2, &[1, 2, 3, 4]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            read_mat_variable(&bytes, "val"),
            Err(SignalError::InvalidData(_))
        ));
    }

    #[test]
    fn test_level4_oversized_dimensions() {
        // f64 matrix claiming i32::MAX x i32::MAX values with no data behind it
        let mut bytes = Vec::new();
        for word in [0i32, i32::MAX, i32::MAX, 0, 4] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(b"val\0");

        assert!(matches!(
            read_mat_variable(&bytes, "val"),
            Err(SignalError::InvalidData(_))
        ));

        // Same dimensions on a one-byte type fit in usize but not in the file
        let mut bytes = Vec::new();
        for word in [50i32, i32::MAX, i32::MAX, 0, 4] {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        bytes.extend_from_slice(b"val\0");
        bytes.extend_from_slice(&[1, 2, 3]);

        assert!(matches!(
            read_mat_variable(&bytes, "val"),
            Err(SignalError::InvalidData(_))
        ));
    }

    #[test]
    fn test_read_level5_matrix() {
        // Column-major storage of [[1.5, -2.0], [3.0, 4.25]]
        let bytes = level5_f64("val", [2, 2], &[1.5, 3.0, -2.0, 4.25]);

        let matrix = read_mat_variable(&bytes, "val").unwrap();
        assert_eq!(matrix.shape(), &[2, 2]);
        assert_eq!(matrix[[0, 0]], 1.5);
        assert_eq!(matrix[[0, 1]], -2.0);
        assert_eq!(matrix[[1, 0]], 3.0);
        assert_eq!(matrix[[1, 1]], 4.25);
    }

    #[test]
    fn test_level5_missing_variable() {
        let bytes = level5_f64("gain", [1, 1], &[2.0]);
        assert!(matches!(
            read_mat_variable(&bytes, "val"),
            Err(SignalError::MissingVariable(_))
        ));
    }

    #[test]
    fn test_level5_oversized_dimensions() {
        let bytes = level5_f64("val", [i32::MAX, i32::MAX], &[1.0, 2.0, 3.0, 4.0]);
        assert!(read_mat_variable(&bytes, "val").is_err());
    }

    #[test]
    fn test_level5_corrupt_compressed_element() {
        let bytes = level5_file(level5_element(15, &[0xFFu8; 16]));
        assert!(read_mat_variable(&bytes, "val").is_err());
    }

    #[test]
    fn test_load_record_with_header() {
        let temp_dir = TempDir::new().unwrap();
        let mat_path = temp_dir.path().join("A0001.mat");
        let hea_path = temp_dir.path().join("A0001.hea");

        let values: Vec<i16> = (0..24).collect();
        std::fs::write(&mat_path, level4_i16("val", 12, 2, &values)).unwrap();
        let mut hea = std::fs::File::create(&hea_path).unwrap();
        writeln!(hea, "A0001 12 500 2").unwrap();
        writeln!(hea, "#Age: 60").unwrap();
        writeln!(hea, "#Sex: Female").unwrap();

        let record = load_record(&mat_path).unwrap();
        assert_eq!(record.name, "A0001");
        assert_eq!(record.channels(), 12);
        assert_eq!(record.samples(), 2);
        assert_eq!(record.header.sampling_frequency, 500);
        assert!((record.duration_secs() - 0.004).abs() < 1e-9);
    }

    #[test]
    fn test_load_record_bad_header() {
        let temp_dir = TempDir::new().unwrap();
        let mat_path = temp_dir.path().join("A0002.mat");
        std::fs::write(&mat_path, level4_i16("val", 1, 1, &[0])).unwrap();
        std::fs::write(temp_dir.path().join("A0002.hea"), "A0002 12\n").unwrap();

        assert!(matches!(
            load_record(&mat_path),
            Err(SignalError::Header { .. })
        ));
    }
}
