#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Network operations for stackbuild
//!
//! Source archives are fetched over HTTP(S) and streamed to disk. There is
//! no retry layer: a failed download halts the stage that needed it.

mod client;
mod download;

pub use client::{NetClient, NetConfig};
pub use download::{download_file, url_filename, validate_url, DownloadResult};
