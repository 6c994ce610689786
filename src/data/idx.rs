use crate::error::DatasetError;

/// Raw contents of an IDX image/label pair as used by MNIST and its
/// derivatives (Fashion-MNIST, EMNIST, …).
#[derive(Debug, Clone, PartialEq)]
pub struct IdxPair {
    pub rows: usize,
    pub cols: usize,
    /// `count * rows * cols` bytes, row-major.
    pub pixels: Vec<u8>,
    pub labels: Vec<u8>,
}

impl IdxPair {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

fn format_err(msg: String) -> DatasetError {
    DatasetError::Format(msg)
}

fn be_u32(bytes: &[u8], at: usize) -> usize {
    u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]) as usize
}

fn check_header(bytes: &[u8], kind: &str, dims: u8, header_len: usize) -> Result<(), DatasetError> {
    if bytes.len() < header_len {
        return Err(format_err(format!(
            "IDX {} file too short: expected at least {} header bytes, got {}.",
            kind, header_len, bytes.len()
        )));
    }
    if bytes[0] != 0x00 || bytes[1] != 0x00 {
        return Err(format_err(format!(
            "IDX {} file: bytes 0-1 must be 0x00 0x00 (reserved), got 0x{:02X} 0x{:02X}.",
            kind, bytes[0], bytes[1]
        )));
    }
    if bytes[2] != 0x08 {
        return Err(format_err(format!(
            "IDX {} file: byte 2 (dtype) must be 0x08 (uint8), got 0x{:02X}.",
            kind, bytes[2]
        )));
    }
    if bytes[3] != dims {
        return Err(format_err(format!(
            "IDX {} file: byte 3 (dimensions) must be {}, got {}.",
            kind, dims, bytes[3]
        )));
    }
    Ok(())
}

/// Parses and validates an IDX3 image file together with its IDX1 label file.
///
/// # IDX3 image file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x03        (number of dimensions = 3)
/// bytes  4-7:   N           (number of images, big-endian u32)
/// bytes  8-11:  rows        (image height in pixels, big-endian u32)
/// bytes 12-15:  cols        (image width in pixels, big-endian u32)
/// bytes 16..:   N * rows * cols bytes, row-major, uint8
/// ```
///
/// # IDX1 label file layout
/// ```text
/// bytes  0-1:   0x00 0x00   (reserved, must be zero)
/// byte   2:     0x08        (dtype = uint8)
/// byte   3:     0x01        (number of dimensions = 1)
/// bytes  4-7:   N           (number of labels, big-endian u32)
/// bytes  8..:   N bytes, each a class index in [0, n_classes)
/// ```
pub fn parse_idx_pair(
    image_bytes: &[u8],
    label_bytes: &[u8],
    n_classes: usize,
) -> Result<IdxPair, DatasetError> {
    // ── Image file validation ───────────────────────────────────────────────

    check_header(image_bytes, "image", 0x03, 16)?;

    let n_items = be_u32(image_bytes, 4);
    let rows = be_u32(image_bytes, 8);
    let cols = be_u32(image_bytes, 12);

    let n_pixels = rows.checked_mul(cols).ok_or_else(|| {
        format_err(format!(
            "IDX image file: rows * cols overflows usize (rows={}, cols={}).",
            rows, cols
        ))
    })?;
    let data_len = n_items.checked_mul(n_pixels).ok_or_else(|| {
        format_err(format!(
            "IDX image file: n_items * n_pixels overflows usize (n_items={}, n_pixels={}).",
            n_items, n_pixels
        ))
    })?;

    if image_bytes.len() - 16 < data_len {
        return Err(format_err(format!(
            "IDX image file too short: header declares {} items of {}×{} pixels \
             ({} data bytes needed after header), but file is only {} bytes total.",
            n_items, rows, cols, data_len, image_bytes.len()
        )));
    }

    // ── Label file validation ───────────────────────────────────────────────

    check_header(label_bytes, "label", 0x01, 8)?;

    let label_count = be_u32(label_bytes, 4);
    if label_count != n_items {
        return Err(format_err(format!(
            "IDX file mismatch: image file declares {} items but label file declares {}.",
            n_items, label_count
        )));
    }
    if label_bytes.len() - 8 < n_items {
        return Err(format_err(format!(
            "IDX label file too short: header declares {} labels but file is only {} bytes.",
            n_items, label_bytes.len()
        )));
    }

    let labels = label_bytes[8..8 + n_items].to_vec();
    if let Some(i) = labels.iter().position(|&c| c as usize >= n_classes) {
        return Err(format_err(format!(
            "IDX label at index {}: class index {} is out of range for n_classes={}.",
            i, labels[i], n_classes
        )));
    }

    Ok(IdxPair {
        rows,
        cols,
        pixels: image_bytes[16..16 + data_len].to_vec(),
        labels,
    })
}
