//! Markup sanitization for extracted fields

/// Cleans untrusted markup before it is stored
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, raw: &str) -> String;
}

/// Whitelist sanitizer backed by `ammonia`
///
/// Scripts, styles, event handlers and unknown tags are removed; formatting
/// tags and their text survive. Output is trimmed.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSanitizer;

impl Sanitizer for HtmlSanitizer {
    fn sanitize(&self, raw: &str) -> String {
        ammonia::clean(raw).trim().to_string()
    }
}

/// Passes input through untouched apart from trimming
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, raw: &str) -> String {
        raw.trim().to_string()
    }
}
