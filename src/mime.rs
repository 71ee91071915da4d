/// Content type for a stored image, inferred from its name's extension.
///
/// Anything that is not a known non-JPEG extension is served as JPEG, which
/// matches what the compressor writes for every lossless source.
pub fn content_type_for_name(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        _ => {
            tracing::trace!("Serving '{}' as image/jpeg", name);
            "image/jpeg"
        }
    }
}
