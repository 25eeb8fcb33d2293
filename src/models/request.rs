use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::FalbatchError;

/// Key-value payload sent verbatim to the generation endpoint.
pub type RequestPayload = serde_json::Map<String, serde_json::Value>;

pub const DEFAULT_MODEL: &str = "fal-ai/flux/schnell";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    Square,
    Landscape16x9,
    Portrait9x16,
    Landscape4x3,
    Portrait3x4,
}

impl AspectRatio {
    /// Width:height pair, e.g. (16, 9).
    pub fn ratio(&self) -> (u32, u32) {
        match self {
            AspectRatio::Square => (1, 1),
            AspectRatio::Landscape16x9 => (16, 9),
            AspectRatio::Portrait9x16 => (9, 16),
            AspectRatio::Landscape4x3 => (4, 3),
            AspectRatio::Portrait3x4 => (3, 4),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape16x9 => "16:9",
            AspectRatio::Portrait9x16 => "9:16",
            AspectRatio::Landscape4x3 => "4:3",
            AspectRatio::Portrait3x4 => "3:4",
        }
    }

    pub fn all() -> &'static [AspectRatio] {
        &[
            AspectRatio::Square,
            AspectRatio::Landscape16x9,
            AspectRatio::Portrait9x16,
            AspectRatio::Landscape4x3,
            AspectRatio::Portrait3x4,
        ]
    }
}

impl FromStr for AspectRatio {
    type Err = FalbatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1:1" => Ok(AspectRatio::Square),
            "16:9" => Ok(AspectRatio::Landscape16x9),
            "9:16" => Ok(AspectRatio::Portrait9x16),
            "4:3" => Ok(AspectRatio::Landscape4x3),
            "3:4" => Ok(AspectRatio::Portrait3x4),
            other => Err(FalbatchError::Config(format!(
                "Unsupported aspect ratio '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    R512,
    R1024,
    R2048,
}

impl Resolution {
    pub fn width(&self) -> u32 {
        match self {
            Resolution::R512 => 512,
            Resolution::R1024 => 1024,
            Resolution::R2048 => 2048,
        }
    }

    pub fn all() -> &'static [Resolution] {
        &[Resolution::R512, Resolution::R1024, Resolution::R2048]
    }
}

impl FromStr for Resolution {
    type Err = FalbatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "512" => Ok(Resolution::R512),
            "1024" => Ok(Resolution::R1024),
            "2048" => Ok(Resolution::R2048),
            other => Err(FalbatchError::Config(format!(
                "Unsupported resolution '{}'",
                other
            ))),
        }
    }
}

/// How the size of the generated image is communicated to the backend.
/// Some backends accept explicit pixel dimensions, others only accept a
/// named bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SizeStrategy {
    /// Emit explicit dimensions as `"WxH"`.
    Numeric,
    /// Emit one of the named size buckets.
    Categorical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SizeBucket {
    Square,
    SquareHd,
    Landscape16x9,
    Portrait16x9,
    Landscape4x3,
    Portrait4x3,
}

impl SizeBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            SizeBucket::Square => "square",
            SizeBucket::SquareHd => "square_hd",
            SizeBucket::Landscape16x9 => "landscape_16_9",
            SizeBucket::Portrait16x9 => "portrait_16_9",
            SizeBucket::Landscape4x3 => "landscape_4_3",
            SizeBucket::Portrait4x3 => "portrait_4_3",
        }
    }
}

/// A reference image supplied alongside every prompt of a batch, either as
/// raw bytes read from disk or as an already-uploaded URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceImage {
    Bytes(Vec<u8>),
    Url(String),
}

/// Per-batch generation settings; the prompt varies per item and is passed
/// separately.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub model: String,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub size_strategy: SizeStrategy,
    pub reference_images: Vec<ReferenceImage>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        GenerationSettings {
            model: DEFAULT_MODEL.to_string(),
            aspect_ratio: AspectRatio::Square,
            resolution: Resolution::R1024,
            size_strategy: SizeStrategy::Numeric,
            reference_images: Vec::new(),
        }
    }
}

impl GenerationSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_aspect_ratio(mut self, ratio: AspectRatio) -> Self {
        self.aspect_ratio = ratio;
        self
    }

    pub fn with_resolution(mut self, resolution: Resolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_size_strategy(mut self, strategy: SizeStrategy) -> Self {
        self.size_strategy = strategy;
        self
    }

    pub fn with_reference_images(mut self, images: Vec<ReferenceImage>) -> Self {
        self.reference_images = images;
        self
    }

    /// Edit-capable backends transform reference images instead of
    /// generating from text alone; they are identified by their model id.
    pub fn is_edit_model(&self) -> bool {
        self.model.contains("edit")
    }
}
