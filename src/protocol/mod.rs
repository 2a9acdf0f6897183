//! Inbound image protocols.
//!
//! Each supported wire protocol is modelled as its own request struct and
//! wrapped in the [`ProtocolRequest`] tagged variant. The pipeline dispatches
//! on the tag for validation, translation and classification.
//!
//! # Protocols
//!
//! ```text
//! Iip           /iip?FIF=...&WID=...&CVT=jpeg
//! IiifImage     /iiif/{identifier}/{region}/{size}/{rotation}/{quality}.{format}
//! IiifInfo      /iiif/{identifier}/info.json
//! DeepZoomInfo  /deepzoom/{imageid}.dzi
//! DeepZoomTile  /deepzoom/{imageid}_files/{layer}/{x}_{y}.{format}?CNT=&GAM=&...
//! ```

pub mod parse;
pub mod translate;
pub mod validate;

pub use parse::{deepzoom_from_path, iiif_image_from_path, iiif_info_from_path, iip_from_query};
pub use translate::{translate, AddressingMode, BackendAddress, Backends, TranslatedUri};
pub use validate::validate;

// =============================================================================
// Request Types
// =============================================================================

/// Internet Imaging Protocol request (`FIF`, `WID`, `HEI`, ...).
///
/// Field names follow the protocol's parameter names. All fields except
/// `fif` are optional; `inv` is a bare flag.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IipRequest {
    /// Full image path
    pub fif: String,
    /// Output width in pixels, for CVT exports
    pub wid: Option<u64>,
    /// Output height in pixels, for CVT exports
    pub hei: Option<u64>,
    /// Relative region x,y,w,h
    pub rgn: Option<Vec<f32>>,
    /// Compression level
    pub qlt: Option<i64>,
    /// Contrast factor
    pub cnt: Option<f32>,
    /// Rotation, optionally mirrored with a leading `!`
    pub rot: Option<String>,
    /// Gamma correction
    pub gam: Option<f32>,
    /// Colormap scheme
    pub cmp: Option<String>,
    /// Profile `r:x1,y1-x2,y2`
    pub pfl: Option<String>,
    /// Color twist matrix `[r,g,b;r,g,b;...]`
    pub ctw: Option<String>,
    /// Invert flag
    pub inv: bool,
    /// Output color space
    pub col: Option<String>,
    /// JPEG tile `r,n`
    pub jtl: Option<Vec<i64>>,
    /// PNG tile `r,n`
    pub ptl: Option<Vec<i64>>,
    /// Full export format
    pub cvt: Option<String>,
}

impl IipRequest {
    /// Create a request for the given image path with no optional fields.
    pub fn new(fif: impl Into<String>) -> Self {
        Self {
            fif: fif.into(),
            ..Default::default()
        }
    }

    /// The output format the backend will produce for this request.
    ///
    /// An explicit `CVT` wins, then `JTL` (JPEG) and `PTL` (PNG). Without
    /// any of them the backend exports JPEG.
    pub fn effective_format(&self) -> &str {
        match self.cvt.as_deref() {
            Some("png") => "png",
            Some(_) => "jpeg",
            None if self.ptl.is_some() => "png",
            None => "jpeg",
        }
    }
}

/// IIIF Image API request.
#[derive(Debug, Clone, PartialEq)]
pub struct IiifImageRequest {
    pub identifier: String,
    pub region: String,
    pub size: String,
    pub rotation: String,
    pub quality: String,
    /// Format suffix; `jpg` when absent
    pub format: Option<String>,
}

/// IIIF image information request (`info.json`).
#[derive(Debug, Clone, PartialEq)]
pub struct IiifInfoRequest {
    pub identifier: String,
    pub extension: String,
}

/// DeepZoom descriptor request (`{imageid}.dzi`).
#[derive(Debug, Clone, PartialEq)]
pub struct DeepZoomInfoRequest {
    pub imageid: String,
}

/// DeepZoom tile request with the IIP processing options iipsrv accepts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeepZoomTileRequest {
    pub imageid: String,
    pub layer: u32,
    /// Tile coordinate `x_y`
    pub tiles: String,
    pub format: Option<String>,
    pub cnt: Option<f32>,
    pub gam: Option<f32>,
    pub cmp: Option<String>,
    pub ctw: Option<String>,
    pub inv: bool,
    pub col: Option<String>,
}

// =============================================================================
// Protocol Request
// =============================================================================

/// Protocol tag used for dispatch and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolTag {
    Iip,
    IiifImage,
    IiifInfo,
    DeepZoomInfo,
    DeepZoomTile,
}

impl ProtocolTag {
    /// Short name used in log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolTag::Iip => "iip",
            ProtocolTag::IiifImage => "iiif-image",
            ProtocolTag::IiifInfo => "iiif-info",
            ProtocolTag::DeepZoomInfo => "deepzoom-info",
            ProtocolTag::DeepZoomTile => "deepzoom-tile",
        }
    }
}

/// One inbound image request, in whichever protocol it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolRequest {
    Iip(IipRequest),
    IiifImage(IiifImageRequest),
    IiifInfo(IiifInfoRequest),
    DeepZoomInfo(DeepZoomInfoRequest),
    DeepZoomTile(DeepZoomTileRequest),
}

impl ProtocolRequest {
    pub fn tag(&self) -> ProtocolTag {
        match self {
            ProtocolRequest::Iip(_) => ProtocolTag::Iip,
            ProtocolRequest::IiifImage(_) => ProtocolTag::IiifImage,
            ProtocolRequest::IiifInfo(_) => ProtocolTag::IiifInfo,
            ProtocolRequest::DeepZoomInfo(_) => ProtocolTag::DeepZoomInfo,
            ProtocolRequest::DeepZoomTile(_) => ProtocolTag::DeepZoomTile,
        }
    }

    /// The image identifier the request addresses.
    pub fn identifier(&self) -> &str {
        match self {
            ProtocolRequest::Iip(r) => &r.fif,
            ProtocolRequest::IiifImage(r) => &r.identifier,
            ProtocolRequest::IiifInfo(r) => &r.identifier,
            ProtocolRequest::DeepZoomInfo(r) => &r.imageid,
            ProtocolRequest::DeepZoomTile(r) => &r.imageid,
        }
    }

    /// Whether the response carries pixel data and must pass the access gate.
    ///
    /// Info documents only describe image geometry and are not gated.
    pub fn is_image(&self) -> bool {
        matches!(
            self,
            ProtocolRequest::Iip(_) | ProtocolRequest::IiifImage(_) | ProtocolRequest::DeepZoomTile(_)
        )
    }

    /// Format token of the response body, used for the content type fallback
    /// and the download filename.
    pub fn response_format(&self) -> &str {
        match self {
            ProtocolRequest::Iip(r) => r.effective_format(),
            ProtocolRequest::IiifImage(r) => r.format.as_deref().unwrap_or("jpg"),
            ProtocolRequest::IiifInfo(r) => &r.extension,
            ProtocolRequest::DeepZoomInfo(_) => "dzi",
            ProtocolRequest::DeepZoomTile(r) => r.format.as_deref().unwrap_or("jpeg"),
        }
    }

    /// Inline download filename: last path segment of the identifier plus the
    /// response format. Only set for whole images and descriptors.
    pub fn download_filename(&self) -> Option<String> {
        let name = |id: &str| {
            let base = id.rsplit(['/', '\\']).next().unwrap_or(id);
            base.strip_suffix(".dzi").unwrap_or(base).to_string()
        };
        match self {
            ProtocolRequest::Iip(r) => Some(format!("{}.{}", name(&r.fif), self.response_format())),
            ProtocolRequest::IiifImage(r) => {
                Some(format!("{}.{}", name(&r.identifier), self.response_format()))
            }
            ProtocolRequest::DeepZoomInfo(r) => Some(format!("{}.dzi", name(&r.imageid))),
            _ => None,
        }
    }
}

// =============================================================================
// Content Types
// =============================================================================

/// MIME type for a format token or file extension.
pub fn content_type_for(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tif" | "tiff" => "image/tiff",
        "png" => "image/png",
        "jp2" | "jp2k" | "jpeg2k" | "jpeg2000" => "image/jp2",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" | "dzi" => "application/xml",
        _ => "application/octet-stream",
    }
}
