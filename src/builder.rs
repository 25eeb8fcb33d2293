use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::{
    error::{FalbatchError, Result},
    models::{
        AspectRatio, GenerationSettings, ReferenceImage, RequestPayload, Resolution, SizeBucket,
        SizeStrategy,
    },
};

/// Builds the argument payload for a single generation call. Pure; performs
/// no network I/O. Byte references must already be uploaded (see
/// `GenerationBackend::upload`) before an edit-model request can be built.
pub fn build_request(prompt: &str, settings: &GenerationSettings) -> Result<RequestPayload> {
    let mut payload = RequestPayload::new();
    payload.insert("prompt".to_string(), json!(prompt));

    if settings.is_edit_model() {
        if settings.reference_images.is_empty() {
            return Err(FalbatchError::MissingReferenceImages(
                settings.model.clone(),
            ));
        }
        let urls: Vec<&str> = settings
            .reference_images
            .iter()
            .filter_map(|image| match image {
                ReferenceImage::Url(url) => Some(url.as_str()),
                ReferenceImage::Bytes(_) => None,
            })
            .collect();
        if urls.len() != settings.reference_images.len() {
            return Err(FalbatchError::Config(format!(
                "Edit model '{}' requires uploaded reference image URLs",
                settings.model
            )));
        }
        payload.insert("image_urls".to_string(), json!(urls));
        return Ok(payload);
    }

    payload.insert(
        "image_size".to_string(),
        Value::String(size_descriptor(settings)),
    );

    let mut inline: Vec<String> = Vec::new();
    let mut urls: Vec<String> = Vec::new();
    for image in &settings.reference_images {
        match image {
            ReferenceImage::Bytes(bytes) => inline.push(STANDARD.encode(bytes)),
            ReferenceImage::Url(url) => urls.push(url.clone()),
        }
    }
    if !inline.is_empty() {
        payload.insert("image_base64".to_string(), json!(inline));
    }
    if !urls.is_empty() {
        payload.insert("image_urls".to_string(), json!(urls));
    }

    Ok(payload)
}

fn size_descriptor(settings: &GenerationSettings) -> String {
    match settings.size_strategy {
        SizeStrategy::Numeric => {
            numeric_size(settings.resolution, settings.aspect_ratio)
        }
        SizeStrategy::Categorical => {
            size_bucket(settings.resolution, settings.aspect_ratio)
                .as_str()
                .to_string()
        }
    }
}

/// Explicit `"WxH"` dimensions: width is the selected resolution, height is
/// derived from the aspect ratio and floored.
pub fn numeric_size(resolution: Resolution, ratio: AspectRatio) -> String {
    let width = resolution.width();
    let (rw, rh) = ratio.ratio();
    format!("{}x{}", width, width * rh / rw)
}

/// Named bucket accepted by backends without explicit-dimension support.
/// Ratios without a dedicated bucket fall back to the square family.
pub fn size_bucket(resolution: Resolution, ratio: AspectRatio) -> SizeBucket {
    match ratio {
        AspectRatio::Landscape16x9 => SizeBucket::Landscape16x9,
        AspectRatio::Portrait9x16 => SizeBucket::Portrait16x9,
        AspectRatio::Landscape4x3 => SizeBucket::Landscape4x3,
        AspectRatio::Portrait3x4 => SizeBucket::Portrait4x3,
        _ => match resolution {
            Resolution::R512 => SizeBucket::Square,
            _ => SizeBucket::SquareHd,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_size_floors_height() {
        assert_eq!(
            numeric_size(Resolution::R1024, AspectRatio::Landscape16x9),
            "1024x576"
        );
        assert_eq!(
            numeric_size(Resolution::R512, AspectRatio::Square),
            "512x512"
        );
        assert_eq!(
            numeric_size(Resolution::R2048, AspectRatio::Portrait3x4),
            "2048x2730"
        );
    }

    #[test]
    fn every_combination_maps_to_a_named_bucket() {
        for &resolution in Resolution::all() {
            for &ratio in AspectRatio::all() {
                let bucket = size_bucket(resolution, ratio);
                assert!(matches!(
                    bucket,
                    SizeBucket::Square
                        | SizeBucket::SquareHd
                        | SizeBucket::Landscape16x9
                        | SizeBucket::Portrait16x9
                        | SizeBucket::Landscape4x3
                        | SizeBucket::Portrait4x3
                ));
            }
        }
        assert_eq!(
            size_bucket(Resolution::R512, AspectRatio::Square),
            SizeBucket::Square
        );
        assert_eq!(
            size_bucket(Resolution::R1024, AspectRatio::Square),
            SizeBucket::SquareHd
        );
        assert_eq!(
            size_bucket(Resolution::R1024, AspectRatio::Portrait9x16),
            SizeBucket::Portrait16x9
        );
    }

    #[test]
    fn edit_model_without_references_is_rejected() {
        let settings = GenerationSettings::new().with_model("fal-ai/flux/dev/image-to-image-edit");
        let err = build_request("a red fox", &settings).unwrap_err();
        assert!(matches!(err, FalbatchError::MissingReferenceImages(_)));
    }

    #[test]
    fn edit_model_attaches_uploaded_urls_without_size() {
        let settings = GenerationSettings::new()
            .with_model("fal-ai/flux-pro/kontext/edit")
            .with_reference_images(vec![ReferenceImage::Url(
                "https://fal.media/files/ref.png".to_string(),
            )]);
        let payload = build_request("make it snow", &settings).unwrap();
        assert_eq!(
            payload.get("image_urls").unwrap(),
            &json!(["https://fal.media/files/ref.png"])
        );
        assert!(payload.get("image_size").is_none());
        assert!(payload.get("image_base64").is_none());
    }

    #[test]
    fn edit_model_with_raw_bytes_is_a_config_error() {
        let settings = GenerationSettings::new()
            .with_model("fal-ai/flux-pro/kontext/edit")
            .with_reference_images(vec![ReferenceImage::Bytes(vec![1, 2, 3])]);
        let err = build_request("make it snow", &settings).unwrap_err();
        assert!(matches!(err, FalbatchError::Config(_)));
    }

    #[test]
    fn plain_model_without_references_has_no_reference_keys() {
        let settings = GenerationSettings::new();
        let payload = build_request("a lighthouse at dusk", &settings).unwrap();
        assert_eq!(payload.get("prompt").unwrap(), &json!("a lighthouse at dusk"));
        assert_eq!(payload.get("image_size").unwrap(), &json!("1024x1024"));
        assert!(payload.get("image_base64").is_none());
        assert!(payload.get("image_urls").is_none());
    }

    #[test]
    fn plain_model_inlines_byte_references_as_base64() {
        let settings = GenerationSettings::new()
            .with_reference_images(vec![ReferenceImage::Bytes(b"png-bytes".to_vec())]);
        let payload = build_request("a lighthouse", &settings).unwrap();
        assert_eq!(
            payload.get("image_base64").unwrap(),
            &json!([STANDARD.encode(b"png-bytes")])
        );
    }

    #[test]
    fn categorical_strategy_emits_bucket_name() {
        let settings = GenerationSettings::new()
            .with_size_strategy(SizeStrategy::Categorical)
            .with_aspect_ratio(AspectRatio::Landscape4x3);
        let payload = build_request("hills", &settings).unwrap();
        assert_eq!(payload.get("image_size").unwrap(), &json!("landscape_4_3"));
    }
}
