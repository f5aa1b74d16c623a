//! Request URI accumulation

use url::Url;

use crate::error::{ClientError, Result};

/// An accumulator of path segments and query parameters that builds a
/// request URI. Opaque to the rest of the client: once built into a
/// [`Url`] it is a plain value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    segments: Vec<String>,
    params: Vec<(String, String)>,
}

impl Filter {
    pub fn new(root_segment: impl Into<String>) -> Self {
        Self {
            segments: vec![root_segment.into()],
            params: Vec::new(),
        }
    }

    /// Append one path segment. Segments are percent-encoded at build
    /// time, so a slash inside a segment stays literal.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a query parameter. Repeated keys are preserved in order.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Build the request URI against the given scheme and authority.
    pub fn build_uri(&self, scheme: &str, authority: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{scheme}://{authority}"))
            .map_err(|err| ClientError::InvalidUrl(err.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ClientError::InvalidUrl(format!("{scheme}://{authority}")))?;
            for segment in &self.segments {
                segments.push(segment);
            }
        }
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}
