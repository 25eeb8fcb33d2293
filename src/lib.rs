pub mod batch;
pub mod builder;
pub mod config;
pub mod error;
pub mod fal;
pub mod logger;
pub mod models;
pub mod resolver;

pub use batch::{BatchRunner, ExecutionMode, ProgressObserver};
pub use builder::build_request;
pub use config::{BatchConfig, FalConfig, KeyStore};
pub use error::{FalbatchError, Result};
pub use fal::{FalClient, GenerationBackend};
pub use models::{
    AspectRatio, BatchState, GenerationResult, GenerationSettings, Outcome, ReferenceImage,
    RequestPayload, Resolution, SizeBucket, SizeStrategy,
};
pub use resolver::resolve_image_url;
