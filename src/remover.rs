//! The background removal capability as seen by its callers

use crate::{config::RemovalParameters, error::Result};
use async_trait::async_trait;

/// Something that turns encoded image bytes into a PNG cutout
///
/// [`crate::processor::BackgroundRemovalProcessor`] is the real
/// implementation; the shell only depends on this trait.
#[async_trait]
pub trait BackgroundRemover: Send {
    /// Remove the background from the encoded image in `data`
    ///
    /// Returns PNG bytes of an RGBA image with the input's dimensions.
    ///
    /// # Errors
    /// - Undecodable input
    /// - Model, inference or matting failures
    async fn remove(&mut self, data: &[u8], params: RemovalParameters) -> Result<Vec<u8>>;
}
