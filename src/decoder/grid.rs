//! Bundled matrix-code decoder backed by rqrr
//!
//! Stands in for a PDF417 engine on machines without one; it reports the four
//! grid corners so the target-region check has real geometry to work with.

use crate::decoder::{BarcodeDecoder, BarcodeFormat, DecodeResult};
use crate::error::{Error, Result};
use crate::geometry::Point;
use image::{DynamicImage, GrayImage};

/// Grid decoder using rqrr
#[derive(Debug, Default, Clone)]
pub struct RqrrDecoder {}

impl RqrrDecoder {
    /// Create a new decoder
    pub fn new() -> Self {
        Self {}
    }

    /// Decode the first readable grid in a grayscale frame
    pub fn decode_gray(&self, img: GrayImage) -> Result<DecodeResult> {
        let mut prepared = ::rqrr::PreparedImage::prepare(img);
        let grids = prepared.detect_grids();

        if grids.is_empty() {
            return Err(Error::NoBarcodeFound);
        }

        let mut last_error = None;
        for grid in &grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    tracing::trace!(
                        version = ?meta.version,
                        ecc_level = meta.ecc_level,
                        length = content.len(),
                        "Decoded grid"
                    );
                    let points = grid
                        .bounds
                        .iter()
                        .map(|p| Point::new(p.x as f64, p.y as f64))
                        .collect();
                    return Ok(DecodeResult {
                        text: content,
                        points,
                        format: BarcodeFormat::QrCode,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        // Grids were located but none decoded; noisy frame, not fatal
        Err(Error::Decode(format!(
            "{} grid(s) found, none readable: {:?}",
            grids.len(),
            last_error
        )))
    }
}

impl BarcodeDecoder for RqrrDecoder {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn decode(&self, frame: &DynamicImage) -> Result<DecodeResult> {
        self.decode_gray(frame.to_luma8())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame_is_not_found() {
        let decoder = RqrrDecoder::new();
        let frame = DynamicImage::ImageLuma8(GrayImage::from_pixel(
            64,
            64,
            image::Luma([255u8]),
        ));
        assert!(matches!(decoder.decode(&frame), Err(Error::NoBarcodeFound)));
    }
}
