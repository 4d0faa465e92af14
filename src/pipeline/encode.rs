//! Image encoding: validated upload → base64 `ImageData`.
//!
//! The upload is forwarded as-is. Re-encoding a phone photo of a pay stub
//! to PNG would multiply its size without adding any detail the model
//! could use. `detail: "high"` keeps fine print legible on providers that
//! tile images.

use crate::pipeline::upload::StubImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use tracing::debug;

/// Wrap a validated upload for the multimodal request body.
pub fn encode_stub_image(image: &StubImage) -> ImageData {
    let b64 = STANDARD.encode(&image.bytes);
    debug!("Encoded {} → {} bytes base64", image.mime_type, b64.len());

    ImageData::new(b64, image.mime_type).with_detail("high")
}
