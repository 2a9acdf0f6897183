//! Thumbnail versus fullsize classification.
//!
//! The rights service grants access per presentation type, so every image
//! request is classified before the rights check. The policy only returns
//! [`PresentationClass::Thumbnail`] for plain downscaled renditions of the
//! whole image; anything else is treated as fullsize.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::ThumbnailConfig;
use crate::protocol::{IiifImageRequest, IipRequest, ProtocolRequest};

/// `w,h` with optional upscale `^` and best-fit `!` markers.
static IIIF_SIZE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\^?!?([0-9]+),([0-9]+)$").expect("valid regex"));

/// Presentation type requested from the rights service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresentationClass {
    Thumbnail,
    Fullsize,
}

impl PresentationClass {
    /// Presentation type name understood by the rights service.
    pub fn presentation_type(&self) -> &'static str {
        match self {
            PresentationClass::Thumbnail => "Thumbnails",
            PresentationClass::Fullsize => "Fullsize",
        }
    }
}

/// Classify a request. Pure; performs no I/O.
pub fn classify(request: &ProtocolRequest, limits: &ThumbnailConfig) -> PresentationClass {
    let class = match request {
        ProtocolRequest::Iip(r) => classify_iip(r, limits),
        ProtocolRequest::IiifImage(r) => classify_iiif(r, limits),
        // Tile addressing is a custom region by definition
        ProtocolRequest::DeepZoomTile(_) => PresentationClass::Fullsize,
        ProtocolRequest::IiifInfo(_) | ProtocolRequest::DeepZoomInfo(_) => PresentationClass::Fullsize,
    };
    debug!(
        identifier = request.identifier(),
        protocol = request.tag().as_str(),
        presentation = class.presentation_type(),
        "Classified request"
    );
    class
}

fn within(width: u64, height: u64, limits: &ThumbnailConfig) -> bool {
    width <= limits.max_width && height <= limits.max_height
}

fn classify_iip(req: &IipRequest, limits: &ThumbnailConfig) -> PresentationClass {
    let customised = req.rgn.is_some()
        || req.qlt.is_some()
        || req.cnt.is_some()
        || req.rot.as_deref().is_some_and(|rot| rot != "0")
        || req.gam.is_some()
        || req.cmp.is_some()
        || req.pfl.is_some()
        || req.ctw.is_some()
        || req.inv
        || req.col.is_some()
        || req.jtl.is_some()
        || req.ptl.is_some();
    if customised {
        return PresentationClass::Fullsize;
    }

    match (req.wid, req.hei) {
        (Some(width), Some(height)) if within(width, height, limits) => PresentationClass::Thumbnail,
        _ => PresentationClass::Fullsize,
    }
}

fn classify_iiif(req: &IiifImageRequest, limits: &ThumbnailConfig) -> PresentationClass {
    if req.region != "full" || req.rotation != "0" || req.quality != "default" {
        return PresentationClass::Fullsize;
    }

    let Some((width, height)) = iiif_size(&req.size) else {
        return PresentationClass::Fullsize;
    };
    if within(width, height, limits) {
        PresentationClass::Thumbnail
    } else {
        PresentationClass::Fullsize
    }
}

/// Width and height from an IIIF size of the form `[^][!]w,h`.
pub fn iiif_size(size: &str) -> Option<(u64, u64)> {
    let caps = IIIF_SIZE.captures(size)?;
    let width = caps[1].parse().ok()?;
    let height = caps[2].parse().ok()?;
    Some((width, height))
}
