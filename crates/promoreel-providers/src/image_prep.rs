//! Image preparation for provider payload limits.
//!
//! References are fetched, decoded, bounded to a maximum frame, flattened
//! to RGB over white, and JPEG-encoded with a descending quality ladder
//! until the encoded size fits the byte ceiling.

use std::net::IpAddr;

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, RgbImage};
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::ImageConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::http::build_client;

/// How a provider wants images delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedPolicy {
    /// Always submit an embedded, size-bounded payload
    Always,
    /// Submit public URLs as-is; embed anything the provider cannot reach
    WhenPrivate,
}

/// Image reference ready to be placed in a provider request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreparedImage {
    Url(String),
    DataUri(String),
}

impl PreparedImage {
    pub fn as_str(&self) -> &str {
        match self {
            PreparedImage::Url(s) | PreparedImage::DataUri(s) => s,
        }
    }

    pub fn is_embedded(&self) -> bool {
        matches!(self, PreparedImage::DataUri(_))
    }
}

/// Encoded JPEG and the quality it was produced at.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub quality: u8,
}

/// Encode at descending qualities until the result fits `max_bytes`.
///
/// Starts at `initial_quality` and steps down by `quality_step`; qualities
/// below `min_quality` are never tried.
pub fn compress_until_fits<F>(config: &ImageConfig, mut encode: F) -> ProviderResult<EncodedImage>
where
    F: FnMut(u8) -> ProviderResult<Vec<u8>>,
{
    let mut quality = config.initial_quality.min(100);
    loop {
        let bytes = encode(quality)?;
        if bytes.len() <= config.max_bytes {
            return Ok(EncodedImage { bytes, quality });
        }

        debug!(
            quality,
            size = bytes.len(),
            max = config.max_bytes,
            "Encoded image over ceiling"
        );

        match quality.checked_sub(config.quality_step) {
            Some(next) if config.quality_step > 0 && next >= config.min_quality => quality = next,
            _ => {
                return Err(ProviderError::image(format!(
                    "image is {} bytes at quality {}, over the {} byte ceiling",
                    bytes.len(),
                    quality,
                    config.max_bytes
                )))
            }
        }
    }
}

/// Composite any alpha over a white background.
pub fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as u32;
        let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha)) / 255) as u8;
        out.put_pixel(x, y, image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}

pub fn encode_jpeg(img: &RgbImage, quality: u8) -> ProviderResult<Vec<u8>> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
        .map_err(|e| ProviderError::image(format!("JPEG encoding failed: {}", e)))?;
    Ok(buf)
}

/// Decode, bound, flatten, and compress raw image bytes.
pub fn normalize_image(bytes: &[u8], config: &ImageConfig) -> ProviderResult<EncodedImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| ProviderError::image(format!("could not decode image: {}", e)))?;

    let img = if img.width() > config.max_width || img.height() > config.max_height {
        let resized = img.thumbnail(config.max_width, config.max_height);
        debug!(
            from = ?(img.width(), img.height()),
            to = ?(resized.width(), resized.height()),
            "Resized image"
        );
        resized
    } else {
        img
    };

    let rgb = flatten_onto_white(&img);
    compress_until_fits(config, |quality| encode_jpeg(&rgb, quality))
}

/// Whether a reference points somewhere a remote provider cannot fetch.
pub fn is_private_reference(reference: &str) -> bool {
    if reference.starts_with('/') {
        return true;
    }
    let Ok(url) = Url::parse(reference) else {
        return true;
    };
    match url.host() {
        Some(url::Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
        }
        Some(url::Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(url::Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        None => true,
    }
}

fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(ip) => {
            ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
        }
        IpAddr::V6(ip) => {
            ip.is_loopback() || ip.is_unspecified() || (ip.segments()[0] & 0xfe00) == 0xfc00
        }
    }
}

/// Fetches and shapes images for providers.
#[derive(Debug, Clone)]
pub struct ImagePreparer {
    http: Client,
    config: ImageConfig,
}

impl ImagePreparer {
    pub fn new(config: ImageConfig) -> ProviderResult<Self> {
        let http = build_client(config.fetch_timeout)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// Absolute URL for a reference; relative paths resolve against the
    /// public base URL.
    pub fn resolve_reference(&self, reference: &str) -> String {
        if reference.starts_with('/') {
            format!("{}{}", self.config.public_base_url.trim_end_matches('/'), reference)
        } else {
            reference.to_string()
        }
    }

    /// Download the raw bytes behind a reference.
    pub async fn fetch(&self, reference: &str) -> ProviderResult<Vec<u8>> {
        let url = self.resolve_reference(reference);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| ProviderError::image(format!("failed to fetch {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::image(format!(
                "failed to fetch {}: HTTP {}",
                url,
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::image(format!("failed to read {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    /// Prepare a reference for submission under `policy`.
    pub async fn prepare(&self, reference: &str, policy: EmbedPolicy) -> ProviderResult<PreparedImage> {
        if reference.starts_with("data:") {
            return Ok(PreparedImage::DataUri(reference.to_string()));
        }
        if policy == EmbedPolicy::WhenPrivate && !is_private_reference(reference) {
            return Ok(PreparedImage::Url(reference.to_string()));
        }

        let raw = self.fetch(reference).await?;
        let original_size = raw.len();
        let config = self.config.clone();

        let encoded = tokio::task::spawn_blocking(move || normalize_image(&raw, &config))
            .await
            .map_err(|e| ProviderError::image(format!("image task failed: {}", e)))??;

        if encoded.quality < self.config.initial_quality {
            warn!(
                quality = encoded.quality,
                "Image needed aggressive compression to fit payload limit"
            );
        }
        crate::metrics::record_compression_quality(encoded.quality);
        info!(
            original_size,
            compressed_size = encoded.bytes.len(),
            quality = encoded.quality,
            "Prepared embedded image"
        );

        let b64 = base64::engine::general_purpose::STANDARD.encode(&encoded.bytes);
        Ok(PreparedImage::DataUri(format!("data:image/jpeg;base64,{}", b64)))
    }
}
