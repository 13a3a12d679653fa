use std::path::Path;

/// Read `(width, height)` from the image header without decoding pixels.
///
/// Returns `None` for unreadable, unsupported or corrupt files.
pub fn read_dimensions(path: &Path) -> Option<(u32, u32)> {
    let reader = match image::ImageReader::open(path) {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot open image");
            return None;
        }
    };

    // Sniff the content too, so a PNG saved as .jpg still resolves.
    let reader = match reader.with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Cannot read image header");
            return None;
        }
    };

    match reader.into_dimensions() {
        Ok(dims) => Some(dims),
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "No dimensions");
            None
        }
    }
}
