// Copyright 2026 Roon Labs and contributors.
// This file is dual-licensed as MIT or Apache-2.0.
// see LICENSE for license details.

//! HTTP image fetching, an external collaborator independent of the MOO/1
//! channel (spec.md §6): `GET /api/image/<imageKey>`.

use crate::error::ImageError;

/// How an image should be fit to a target size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    /// Fit within the bounds, preserving aspect ratio.
    Fit,
    /// Fill the bounds, cropping as needed.
    Fill,
    /// Stretch to exactly the given bounds.
    Stretch,
}

impl Scale {
    fn as_str(self) -> &'static str {
        match self {
            Scale::Fit => "fit",
            Scale::Fill => "fill",
            Scale::Stretch => "stretch",
        }
    }
}

/// The image encoding to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// `image/jpeg`.
    Jpeg,
    /// `image/png`.
    Png,
}

impl ImageFormat {
    fn as_str(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
        }
    }
}

/// Parameters for an image fetch. `scale` requires both `width` and `height`.
#[derive(Debug, Clone, Default)]
pub struct ImageRequest {
    /// How to fit the image to the requested dimensions.
    pub scale: Option<Scale>,
    /// Target width in pixels.
    pub width: Option<u32>,
    /// Target height in pixels.
    pub height: Option<u32>,
    /// Requested encoding.
    pub format: Option<ImageFormat>,
}

/// The result of a successful image fetch.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    /// The raw image bytes.
    pub bytes: Vec<u8>,
    /// The `Content-Type` the Core reported, if any.
    pub content_type: Option<String>,
}

/// Fetches images from a Core's HTTP image service.
pub struct ImageClient {
    client: reqwest::Client,
    base_url: String,
}

impl ImageClient {
    /// Build a client for the Core reachable at `host:port`.
    pub fn new(host: impl AsRef<str>, port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{}:{}", host.as_ref(), port),
        }
    }

    /// Fetch an image by key, applying the given request parameters.
    pub async fn fetch(&self, image_key: &str, request: &ImageRequest) -> Result<FetchedImage, ImageError> {
        if image_key.is_empty() {
            return Err(ImageError::InvalidImageKey);
        }
        if request.scale.is_some() && (request.width.is_none() || request.height.is_none()) {
            return Err(ImageError::MissingScaleDimensions);
        }

        let mut url = reqwest::Url::parse(&format!("{}/api/image/{}", self.base_url, image_key))
            .map_err(|_| ImageError::InvalidResponse)?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(scale) = request.scale {
                query.append_pair("scale", scale.as_str());
            }
            if let Some(width) = request.width {
                query.append_pair("width", &width.to_string());
            }
            if let Some(height) = request.height {
                query.append_pair("height", &height.to_string());
            }
            if let Some(format) = request.format {
                query.append_pair("format", format.as_str());
            }
        }

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ImageError::HttpError {
                status: response.status().as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();

        Ok(FetchedImage { bytes, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_image_key() {
        let client = ImageClient::new("localhost", 9100);
        let request = ImageRequest::default();
        let result = tokio_test_block_on(client.fetch("", &request));
        assert!(matches!(result, Err(ImageError::InvalidImageKey)));
    }

    #[test]
    fn scale_without_dimensions_is_rejected() {
        let client = ImageClient::new("localhost", 9100);
        let request = ImageRequest {
            scale: Some(Scale::Fit),
            ..Default::default()
        };
        let result = tokio_test_block_on(client.fetch("abc", &request));
        assert!(matches!(result, Err(ImageError::MissingScaleDimensions)));
    }

    fn tokio_test_block_on<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
