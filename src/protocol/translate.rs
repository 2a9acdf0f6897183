//! Translation of validated requests into backend image server URIs.
//!
//! Each protocol has a fixed template. Optional fields are emitted in a
//! protocol-defined order and omitted entirely when absent. Identifiers are
//! percent-decoded once and then encoded exactly once, so values that were
//! already encoded by an intermediate layer are not encoded twice.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::{
    DeepZoomInfoRequest, DeepZoomTileRequest, IiifImageRequest, IiifInfoRequest, IipRequest,
    ProtocolRequest,
};
use crate::error::ServiceError;

// =============================================================================
// Backend Addressing
// =============================================================================

/// How a DeepZoom backend expects the image path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    /// `{base}/{imageid}_files/{layer}/{x}_{y}.{format}`
    Path,
    /// `{base}?DeepZoom={imageid}_files/{layer}/{x}_{y}.{format}`
    Param,
}

impl AddressingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressingMode::Path => "path",
            AddressingMode::Param => "param",
        }
    }
}

/// A configured backend base URI together with its addressing mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendAddress {
    base: String,
    pub mode: AddressingMode,
}

impl BackendAddress {
    /// Create an address. A trailing `/` on the base is dropped.
    pub fn new(base: impl AsRef<str>, mode: AddressingMode) -> Self {
        Self {
            base: base.as_ref().trim_end_matches('/').to_string(),
            mode,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }
}

/// The backend servers resolved from one configuration snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Backends {
    pub iip: Option<String>,
    pub iiif: Option<String>,
    pub deepzoom: Option<BackendAddress>,
}

impl Backends {
    fn iip(&self) -> Result<&str, ServiceError> {
        self.iip
            .as_deref()
            .ok_or_else(|| ServiceError::Internal("No IIP server defined".to_string()))
    }

    fn iiif(&self) -> Result<&str, ServiceError> {
        self.iiif
            .as_deref()
            .ok_or_else(|| ServiceError::Internal("No IIIF server defined".to_string()))
    }

    fn deepzoom(&self) -> Result<&BackendAddress, ServiceError> {
        self.deepzoom
            .as_ref()
            .ok_or_else(|| ServiceError::Internal("No DeepZoom server defined".to_string()))
    }
}

/// A fully expanded backend request URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TranslatedUri(String);

impl TranslatedUri {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TranslatedUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Everything but unreserved characters is encoded, including `/`.
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Characters kept verbatim inside a path segment (RFC 3986 `pchar` minus `%`).
const SEGMENT: &AsciiSet = &COMPONENT
    .remove(b'!')
    .remove(b'$')
    .remove(b'&')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')')
    .remove(b'*')
    .remove(b'+')
    .remove(b',')
    .remove(b';')
    .remove(b'=')
    .remove(b':')
    .remove(b'@');

/// DeepZoom image path: `/` separates folders; `&` is encoded so the path
/// survives param addressing.
const IMAGE_PATH: &AsciiSet = &SEGMENT.add(b'&').remove(b'/');

fn decode_once(value: &str) -> Cow<'_, str> {
    percent_decode_str(value)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(value))
}

/// Encode every reserved character, including `/`.
fn encode_component(value: &str) -> String {
    utf8_percent_encode(&decode_once(value), COMPONENT).to_string()
}

/// Encode a DeepZoom image path, keeping folder separators.
fn encode_image_path(value: &str) -> String {
    utf8_percent_encode(&decode_once(value), IMAGE_PATH).to_string()
}

/// Encode an IIIF parameter segment, keeping the `,` `!` `:` grammar characters.
fn encode_segment(value: &str) -> String {
    utf8_percent_encode(value, SEGMENT).to_string()
}

/// Render a float the way the backend expects: always with a fractional part.
fn format_float(value: f32) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn join_floats(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| format_float(*v))
        .collect::<Vec<_>>()
        .join(",")
}

fn join_ints(values: &[i64]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

// =============================================================================
// Query Builder
// =============================================================================

/// Accumulates `key=value` tokens, choosing `?` or `&` per token.
///
/// The first token gets `first_separator`; every later token gets `&`.
struct QueryTokens {
    out: String,
    first_separator: char,
    emitted: bool,
}

impl QueryTokens {
    fn new(first_separator: char) -> Self {
        Self {
            out: String::new(),
            first_separator,
            emitted: false,
        }
    }

    fn separator(&mut self) {
        let sep = if self.emitted {
            '&'
        } else {
            self.first_separator
        };
        self.out.push(sep);
        self.emitted = true;
    }

    /// Append `key=value`, the value already encoded.
    fn raw(&mut self, key: &str, value: Option<String>) -> &mut Self {
        if let Some(value) = value {
            self.separator();
            self.out.push_str(key);
            self.out.push('=');
            self.out.push_str(&value);
        }
        self
    }

    fn text(&mut self, key: &str, value: Option<&str>) -> &mut Self {
        self.raw(key, value.map(encode_component))
    }

    fn float(&mut self, key: &str, value: Option<f32>) -> &mut Self {
        self.raw(key, value.map(format_float))
    }

    /// Append a bare flag token with no value.
    fn flag(&mut self, key: &str, set: bool) -> &mut Self {
        if set {
            self.separator();
            self.out.push_str(key);
        }
        self
    }

    fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

// =============================================================================
// Translation
// =============================================================================

/// Translate a validated request into the backend URI for its protocol.
///
/// Fails only when the backend for the protocol is not configured.
pub fn translate(request: &ProtocolRequest, backends: &Backends) -> Result<TranslatedUri, ServiceError> {
    let uri = match request {
        ProtocolRequest::Iip(r) => translate_iip(r, backends.iip()?),
        ProtocolRequest::IiifImage(r) => translate_iiif_image(r, backends.iiif()?),
        ProtocolRequest::IiifInfo(r) => translate_iiif_info(r, backends.iiif()?),
        ProtocolRequest::DeepZoomInfo(r) => translate_deepzoom_info(r, backends.deepzoom()?),
        ProtocolRequest::DeepZoomTile(r) => translate_deepzoom_tile(r, backends.deepzoom()?),
    };
    Ok(TranslatedUri(uri))
}

/// `{base}?FIF=..&WID=..&HEI=..&RGN=..&QLT=..&CNT=..&ROT=..&GAM=..&CMP=..&PFL=..&CTW=..&INV&COL=..&JTL=..&PTL=..&CVT=..`
fn translate_iip(req: &IipRequest, base: &str) -> String {
    // JTL and PTL select the output themselves; otherwise export JPEG unless told otherwise.
    let cvt = match req.cvt.as_deref() {
        Some("jpg") => Some("jpeg"),
        Some(other) => Some(other),
        None if req.jtl.is_none() && req.ptl.is_none() => Some("jpeg"),
        None => None,
    };

    let query = QueryTokens::new('?')
        .text("FIF", Some(&req.fif))
        .raw("WID", req.wid.map(|v| v.to_string()))
        .raw("HEI", req.hei.map(|v| v.to_string()))
        .raw("RGN", req.rgn.as_deref().map(join_floats))
        .raw("QLT", req.qlt.map(|v| v.to_string()))
        .float("CNT", req.cnt)
        .text("ROT", req.rot.as_deref())
        .float("GAM", req.gam)
        .text("CMP", req.cmp.as_deref())
        .text("PFL", req.pfl.as_deref())
        .text("CTW", req.ctw.as_deref())
        .flag("INV", req.inv)
        .text("COL", req.col.as_deref())
        .raw("JTL", req.jtl.as_deref().map(join_ints))
        .raw("PTL", req.ptl.as_deref().map(join_ints))
        .text("CVT", cvt)
        .finish();

    format!("{}{}", base.trim_end_matches('/'), query)
}

fn dzi_path(imageid: &str) -> String {
    if imageid.ends_with(".dzi") {
        imageid.to_string()
    } else {
        format!("{}.dzi", imageid)
    }
}

fn translate_deepzoom_info(req: &DeepZoomInfoRequest, backend: &BackendAddress) -> String {
    let path = encode_image_path(&dzi_path(&req.imageid));
    match backend.mode {
        AddressingMode::Path => format!("{}/{}", backend.base(), path),
        AddressingMode::Param => format!("{}?DeepZoom={}", backend.base(), path),
    }
}

fn translate_deepzoom_tile(req: &DeepZoomTileRequest, backend: &BackendAddress) -> String {
    let format = req.format.as_deref().unwrap_or("jpeg");
    let tile_path = format!(
        "{}_files/{}/{}.{}",
        encode_image_path(&req.imageid),
        req.layer,
        encode_component(&req.tiles),
        encode_component(format)
    );

    // Path addressing starts its own query; param addressing continues one.
    let (prefix, first_separator) = match backend.mode {
        AddressingMode::Path => (format!("{}/{}", backend.base(), tile_path), '?'),
        AddressingMode::Param => (format!("{}?DeepZoom={}", backend.base(), tile_path), '&'),
    };

    let options = QueryTokens::new(first_separator)
        .float("CNT", req.cnt)
        .float("GAM", req.gam)
        .text("CMP", req.cmp.as_deref())
        .text("CTW", req.ctw.as_deref())
        .flag("INV", req.inv)
        .text("COL", req.col.as_deref())
        .finish();

    format!("{}{}", prefix, options)
}

/// `{base}/{identifier}/{region}/{size}/{rotation}/{quality}.{format}`
fn translate_iiif_image(req: &IiifImageRequest, base: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}/{}.{}",
        base.trim_end_matches('/'),
        encode_component(&req.identifier),
        encode_segment(&req.region),
        encode_segment(&req.size),
        encode_segment(&req.rotation),
        encode_segment(&req.quality),
        encode_segment(req.format.as_deref().unwrap_or("jpg"))
    )
}

/// `{base}/{identifier}/info.{ext}`
fn translate_iiif_info(req: &IiifInfoRequest, base: &str) -> String {
    format!(
        "{}/{}/info.{}",
        base.trim_end_matches('/'),
        encode_component(&req.identifier),
        encode_segment(&req.extension)
    )
}
