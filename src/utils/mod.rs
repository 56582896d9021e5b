//! Utility functions: image IO, dictionary loading, perspective transforms,
//! and logging setup.

pub mod dict;
pub mod image;
pub mod transform;

pub use dict::read_character_dict;
pub use image::{dynamic_to_rgb, load_image, load_images_batch};
pub use transform::rotate_crop_quad;

/// Initializes the tracing subscriber with env-filter and a format layer.
///
/// Call once at application start; library code only emits events.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
