use serde_json::Value;

use crate::error::{FalbatchError, Result};

/// Cap on the diagnostic dump attached to a resolution failure.
const DUMP_LIMIT: usize = 500;

type Matcher = fn(&Value) -> Option<String>;

/// Extraction strategies in priority order. Each matcher validates the full
/// shape it expects before extracting anything; a partial match falls
/// through to the next strategy.
const MATCHERS: &[Matcher] = &[first_of_images, single_image, top_level_url];

/// Locates the generated image URL in a raw backend response. Backends
/// disagree on response shape, so the known shapes are tried in a fixed
/// order. Pure function; resolving the same response twice yields the same
/// result.
pub fn resolve_image_url(response: &Value) -> Result<String> {
    for matcher in MATCHERS {
        if let Some(url) = matcher(response) {
            return Ok(url);
        }
    }
    Err(FalbatchError::Resolution(format!(
        "No image URL found in response: {}",
        truncate(&response.to_string(), DUMP_LIMIT)
    )))
}

/// `{"images": [{"url": s}, ..]}` or `{"images": [s, ..]}`.
fn first_of_images(response: &Value) -> Option<String> {
    let first = response.get("images")?.as_array()?.first()?;
    url_of(first)
}

/// `{"image": {"url": s}}` or `{"image": s}`.
fn single_image(response: &Value) -> Option<String> {
    url_of(response.get("image")?)
}

/// `{"url": s}`.
fn top_level_url(response: &Value) -> Option<String> {
    response.get("url")?.as_str().map(str::to_owned)
}

fn url_of(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => map.get("url")?.as_str().map(str::to_owned),
        _ => None,
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
