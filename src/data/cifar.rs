use image::imageops::{self, FilterType};
use image::GrayImage;
use rayon::prelude::*;

use crate::error::DatasetError;

const SIDE: u32 = 32;
const PLANE: usize = (SIDE * SIDE) as usize;
/// One label byte followed by the red, green and blue planes.
pub const RECORD_LEN: usize = 1 + 3 * PLANE;

/// Converts one CIFAR-10 binary batch into `(grayscale pixels, labels)`,
/// each image resized to `side × side`.
///
/// Grayscale uses the ITU-R 601 luma weights with integer rounding; the
/// 32 → `side` resize is bilinear.
pub fn parse_cifar_batch(bytes: &[u8], side: u32) -> Result<(Vec<u8>, Vec<u8>), DatasetError> {
    if bytes.is_empty() || bytes.len() % RECORD_LEN != 0 {
        return Err(DatasetError::Format(format!(
            "CIFAR-10 batch length {} is not a positive multiple of {} bytes.",
            bytes.len(),
            RECORD_LEN
        )));
    }

    let records: Vec<(u8, Vec<u8>)> = bytes
        .par_chunks_exact(RECORD_LEN)
        .map(|record| convert_record(record, side))
        .collect::<Result<_, _>>()?;

    let mut pixels = Vec::with_capacity(records.len() * (side * side) as usize);
    let mut labels = Vec::with_capacity(records.len());
    for (label, image) in records {
        labels.push(label);
        pixels.extend_from_slice(&image);
    }
    Ok((pixels, labels))
}

fn convert_record(record: &[u8], side: u32) -> Result<(u8, Vec<u8>), DatasetError> {
    let label = record[0];
    if label > 9 {
        return Err(DatasetError::Format(format!("CIFAR-10 label {} is out of range.", label)));
    }
    let (r, rest) = record[1..].split_at(PLANE);
    let (g, b) = rest.split_at(PLANE);
    let luma: Vec<u8> = (0..PLANE)
        .map(|i| {
            let y = r[i] as u32 * 299 + g[i] as u32 * 587 + b[i] as u32 * 114;
            ((y + 500) / 1000) as u8
        })
        .collect();

    let gray = GrayImage::from_raw(SIDE, SIDE, luma)
        .ok_or_else(|| DatasetError::Format("CIFAR-10 record has the wrong size.".to_owned()))?;
    let resized = if side == SIDE {
        gray
    } else {
        imageops::resize(&gray, side, side, FilterType::Triangle)
    };
    Ok((label, resized.into_raw()))
}
