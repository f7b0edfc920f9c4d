//! Display button image preparation.
//!
//! Images are uploaded as baseline JPEG. Each upload is a `BAT` header
//! announcing the payload size and target slot, followed by the raw JPEG bytes
//! on the same endpoint.

use std::io::Cursor;

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use strmctrl_protocol::{Command, IMAGE_SIZE};

use crate::error::{StrmCtrlError, StrmCtrlResult};

pub const JPEG_QUALITY: u8 = 100;

/// Largest payload a `BAT` header can announce.
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// Validated, encoded image ready for upload to one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedImage {
    header: Command,
    payload: Vec<u8>,
}

impl PreparedImage {
    /// Check dimensions and encode `image` for display `slot` (1..=6).
    ///
    /// # Errors
    ///
    /// - [`StrmCtrlError::InvalidImageSize`] unless the image is 64×64
    /// - [`StrmCtrlError::ImageTooLarge`] if the JPEG exceeds 65535 bytes
    /// - [`StrmCtrlError::Protocol`] for an out-of-range slot
    pub fn new(slot: u8, image: &DynamicImage) -> StrmCtrlResult<Self> {
        validate_dimensions(image)?;
        let payload = encode_jpeg(image)?;
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(StrmCtrlError::ImageTooLarge {
                len: payload.len(),
            });
        }
        let header = Command::image_header(payload.len(), slot)?;
        Ok(Self { header, payload })
    }

    pub fn header(&self) -> &Command {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

pub fn validate_dimensions(image: &DynamicImage) -> StrmCtrlResult<()> {
    let (width, height) = (image.width(), image.height());
    if width != IMAGE_SIZE || height != IMAGE_SIZE {
        return Err(StrmCtrlError::InvalidImageSize { width, height });
    }
    Ok(())
}

/// Encode as RGB JPEG at [`JPEG_QUALITY`].
pub fn encode_jpeg(image: &DynamicImage) -> StrmCtrlResult<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut output = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)?;
    Ok(output.into_inner())
}
