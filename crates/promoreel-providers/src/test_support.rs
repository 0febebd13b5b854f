use std::io::Cursor;
use std::time::Duration;

use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::config::PollConfig;

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([200, 40, 40, 255])));
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageOutputFormat::Png).unwrap();
    buf.into_inner()
}

pub fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        max_attempts: 20,
        not_found_rounds: 3,
        request_timeout: Duration::from_secs(2),
    }
}

/// Serve a small PNG at `/product.png` and return its URL.
pub async fn mount_product_image(server: &MockServer) -> String {
    Mock::given(method("GET"))
        .and(path("/product.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes(32, 32)))
        .mount(server)
        .await;
    format!("{}/product.png", server.uri())
}
