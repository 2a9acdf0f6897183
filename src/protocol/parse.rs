//! Turning raw query strings and path captures into protocol requests.
//!
//! Parsing only establishes types (numbers, lists, flags). Semantic rules
//! live in [`super::validate`]. A value that cannot be parsed as its type is
//! reported as an invalid argument naming the field.

use std::collections::HashMap;
use std::str::FromStr;

use tracing::debug;

use super::{
    DeepZoomInfoRequest, DeepZoomTileRequest, IiifImageRequest, IiifInfoRequest, IipRequest,
    ProtocolRequest,
};
use crate::error::ServiceError;

// =============================================================================
// Query Parameters
// =============================================================================

/// Decoded query parameters keyed by upper-cased name.
///
/// Keys without a value (`&INV`) map to an empty string. Repeated keys keep
/// the last value.
#[derive(Debug, Default)]
struct QueryParams {
    values: HashMap<String, String>,
}

impl QueryParams {
    fn parse(query: Option<&str>) -> Self {
        let values = query
            .map(|q| {
                url::form_urlencoded::parse(q.as_bytes())
                    .map(|(k, v)| (k.to_ascii_uppercase(), v.into_owned()))
                    .collect()
            })
            .unwrap_or_default();
        Self { values }
    }

    /// Non-empty value for `key`.
    fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    fn number<T: FromStr>(&self, key: &str, kind: &str) -> Result<Option<T>, ServiceError> {
        self.get(key).map(|raw| parse_number(key, raw, kind)).transpose()
    }

    fn float(&self, key: &str) -> Result<Option<f32>, ServiceError> {
        self.get(key).map(|raw| parse_float(key, raw)).transpose()
    }

    fn list<T: FromStr>(&self, key: &str, kind: &str) -> Result<Option<Vec<T>>, ServiceError> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|part| parse_number(key, part, kind))
                    .collect::<Result<Vec<T>, _>>()
            })
            .transpose()
    }

    fn float_list(&self, key: &str) -> Result<Option<Vec<f32>>, ServiceError> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(|part| parse_float(key, part))
                    .collect::<Result<Vec<f32>, _>>()
            })
            .transpose()
    }

    /// A bare flag. Present without value or with `true` means set.
    fn flag(&self, key: &str) -> Result<bool, ServiceError> {
        match self.values.get(key).map(|v| v.trim()) {
            None => Ok(false),
            Some("") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("true") => Ok(true),
            Some(v) if v.eq_ignore_ascii_case("false") => Ok(false),
            Some(v) => Err(ServiceError::invalid(
                key,
                format!("The parameter {} takes no value or a boolean, but was: '{}'", key, v),
                v,
            )),
        }
    }

    fn log_unknown(&self, known: &[&str]) {
        for key in self.values.keys() {
            if !known.contains(&key.as_str()) {
                debug!(parameter = %key, "Ignoring unsupported query parameter");
            }
        }
    }
}

fn parse_number<T: FromStr>(field: &str, raw: &str, kind: &str) -> Result<T, ServiceError> {
    raw.trim().parse::<T>().map_err(|_| {
        ServiceError::invalid(
            field,
            format!("The parameter {} must be {}, but was: '{}'", field, kind, raw),
            raw,
        )
    })
}

fn parse_float(field: &str, raw: &str) -> Result<f32, ServiceError> {
    match raw.trim().parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ServiceError::invalid(
            field,
            format!("The parameter {} must be a number, but was: '{}'", field, raw),
            raw,
        )),
    }
}

// =============================================================================
// IIP
// =============================================================================

const IIP_PARAMS: &[&str] = &[
    "FIF", "WID", "HEI", "RGN", "QLT", "CNT", "ROT", "GAM", "CMP", "PFL", "CTW", "INV", "COL",
    "JTL", "PTL", "CVT",
];

/// Parse an IIP request from its raw query string.
pub fn iip_from_query(query: Option<&str>) -> Result<ProtocolRequest, ServiceError> {
    let params = QueryParams::parse(query);
    params.log_unknown(IIP_PARAMS);

    Ok(ProtocolRequest::Iip(IipRequest {
        fif: params.string("FIF").unwrap_or_default(),
        wid: params.number("WID", "a non-negative integer")?,
        hei: params.number("HEI", "a non-negative integer")?,
        rgn: params.float_list("RGN")?,
        qlt: params.number("QLT", "an integer")?,
        cnt: params.float("CNT")?,
        rot: params.string("ROT"),
        gam: params.float("GAM")?,
        cmp: params.string("CMP"),
        pfl: params.string("PFL"),
        ctw: params.string("CTW"),
        inv: params.flag("INV")?,
        col: params.string("COL"),
        jtl: params.list("JTL", "a list of integers")?,
        ptl: params.list("PTL", "a list of integers")?,
        cvt: params.string("CVT"),
    }))
}

// =============================================================================
// IIIF
// =============================================================================

/// Split `stem.ext` at the last dot. A name without a dot has no extension.
fn split_extension(file: &str) -> (&str, Option<&str>) {
    match file.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => (stem, Some(ext)),
        _ => (file, None),
    }
}

/// Build an IIIF image request from the path captures
/// `{identifier}/{region}/{size}/{rotation}/{quality}.{format}`.
pub fn iiif_image_from_path(
    identifier: String,
    region: String,
    size: String,
    rotation: String,
    file: &str,
) -> ProtocolRequest {
    let (quality, format) = split_extension(file);
    ProtocolRequest::IiifImage(IiifImageRequest {
        identifier,
        region,
        size,
        rotation,
        quality: quality.to_string(),
        format: format.map(str::to_string),
    })
}

/// Build an IIIF info request from `{identifier}/info.{ext}`.
pub fn iiif_info_from_path(identifier: String, file: &str) -> Result<ProtocolRequest, ServiceError> {
    match split_extension(file) {
        ("info", Some(ext)) => Ok(ProtocolRequest::IiifInfo(IiifInfoRequest {
            identifier,
            extension: ext.to_string(),
        })),
        _ => Err(ServiceError::invalid(
            "info",
            format!("IIIF information requests must be 'info.json', but was: '{}'", file),
            file,
        )),
    }
}

// =============================================================================
// DeepZoom
// =============================================================================

const DEEPZOOM_PARAMS: &[&str] = &["CNT", "GAM", "CMP", "CTW", "INV", "COL"];

const TILE_SEPARATOR: &str = "_files/";

/// Parse a DeepZoom request from the path below `/deepzoom/`.
///
/// `{imageid}.dzi` is a descriptor request. `{imageid}_files/{layer}/{x}_{y}.{format}`
/// is a tile request whose processing options come from the query string.
/// The image id may itself contain `/`.
pub fn deepzoom_from_path(path: &str, query: Option<&str>) -> Result<ProtocolRequest, ServiceError> {
    let path = path.trim_start_matches('/');

    if path.ends_with(".dzi") {
        return Ok(ProtocolRequest::DeepZoomInfo(DeepZoomInfoRequest {
            imageid: path.to_string(),
        }));
    }

    let Some(split) = path.rfind(TILE_SEPARATOR) else {
        return Err(ServiceError::invalid(
            "imageid",
            format!(
                "DeepZoom requests must be '{{imageid}}.dzi' or '{{imageid}}_files/{{layer}}/{{x}}_{{y}}.{{format}}', but was: '{}'",
                path
            ),
            path,
        ));
    };
    let imageid = &path[..split];
    let rest = &path[split + TILE_SEPARATOR.len()..];

    let Some((layer, file)) = rest.split_once('/') else {
        return Err(ServiceError::invalid(
            "tiles",
            format!("Deepzoom tile path must end in '{{layer}}/{{x}}_{{y}}.{{format}}', but was: '{}'", rest),
            rest,
        ));
    };
    let layer = parse_number::<u32>("layer", layer, "a non-negative integer")?;
    let (tiles, format) = split_extension(file);

    let params = QueryParams::parse(query);
    params.log_unknown(DEEPZOOM_PARAMS);

    Ok(ProtocolRequest::DeepZoomTile(DeepZoomTileRequest {
        imageid: imageid.to_string(),
        layer,
        tiles: tiles.to_string(),
        format: format.map(str::to_string),
        cnt: params.float("CNT")?,
        gam: params.float("GAM")?,
        cmp: params.string("CMP"),
        ctw: params.string("CTW"),
        inv: params.flag("INV")?,
        col: params.string("COL"),
    }))
}
