//! Asset storage for PromoReel.
//!
//! This crate provides:
//! - The `AssetStore` abstraction used for final videos, voiceovers and thumbnails
//! - A Cloudflare R2 (S3-compatible) implementation
//! - A local filesystem fallback
//! - HTTP download of generated media with retries
//! - The object key layout

pub mod client;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod local;
pub mod store;

pub use client::{R2Client, R2Config};
pub use error::{StorageError, StorageResult};
pub use fetch::MediaFetcher;
pub use local::LocalAssetStore;
pub use store::{store_from_env, AssetStore};
