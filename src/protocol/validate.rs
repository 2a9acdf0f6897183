//! Parameter validation for every supported protocol.
//!
//! Rules follow the IIP protocol (<https://iipimage.sourceforge.io/documentation/protocol/>),
//! the DeepZoom tile conventions used by iipsrv and OpenSeadragon, and the
//! IIIF Image API 3.0 grammar (<https://iiif.io/api/image/3.0/>).
//!
//! Checks on a field run structural rules (presence, counts, mutual
//! exclusion) before value ranges, so the first error reported is the
//! smallest one that explains the rejection.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    DeepZoomInfoRequest, DeepZoomTileRequest, IiifImageRequest, IiifInfoRequest, IipRequest,
    ProtocolRequest,
};
use crate::error::ServiceError;

// =============================================================================
// Allowed Values
// =============================================================================

/// Export formats accepted for `CVT`. `jpg` is normalised to `jpeg` on translation.
pub const CVT_FORMATS: &[&str] = &["jpeg", "jpg", "png"];

/// Rotations accepted for `ROT`.
pub const ROTATIONS: &[&str] = &["0", "90", "180", "270", "!0", "!90", "!180", "!270"];

/// Colormap schemes accepted for `CMP`.
pub const COLORMAPS: &[&str] = &["GREY", "JET", "COLD", "HOT", "RED", "GREEN", "BLUE"];

/// Output color spaces accepted for `COL`.
pub const COLOR_SPACES: &[&str] = &["grey", "gray", "binary"];

/// DeepZoom tile formats.
pub const DEEPZOOM_FORMATS: &[&str] = &["jpg", "jpeg", "png"];

/// IIIF qualities.
pub const IIIF_QUALITIES: &[&str] = &["color", "gray", "bitonal", "default"];

/// IIIF output formats.
pub const IIIF_FORMATS: &[&str] = &["jpg", "tif", "png", "gif", "jp2", "pdf", "webp"];

/// Highest `QLT` for JPEG output.
pub const MAX_JPEG_QUALITY: i64 = 100;

/// Highest `QLT` (zlib level) for PNG output.
pub const MAX_PNG_QUALITY: i64 = 9;

const REGION_NAMES: [&str; 4] = ["x", "y", "w", "h"];
const PROFILE_NAMES: [&str; 5] = ["r", "x1", "y1", "x2", "y2"];
const TWIST_NAMES: [&str; 3] = ["r", "g", "b"];

static PROFILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:]+):([^,]+),([^,]+)-([^,]+),([^,]+)$").expect("valid regex"));

static DEEPZOOM_TILE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+_\d+$").expect("valid regex"));

static IIIF_REGION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(full|square|\d+,\d+,\d+,\d+|pct:\d+(\.\d+)?,\d+(\.\d+)?,\d+(\.\d+)?,\d+(\.\d+)?)$")
        .expect("valid regex")
});

static IIIF_SIZE_GRAMMAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\^?(max|\d+,|,\d+|pct:\d+(\.\d+)?|!?\d+,\d+)$").expect("valid regex")
});

static IIIF_ROTATION_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^!?(\d+(\.\d+)?)$").expect("valid regex"));

// =============================================================================
// Dispatch
// =============================================================================

/// Validate a request according to its protocol.
pub fn validate(request: &ProtocolRequest) -> Result<(), ServiceError> {
    match request {
        ProtocolRequest::Iip(r) => validate_iip(r),
        ProtocolRequest::IiifImage(r) => validate_iiif_image(r),
        ProtocolRequest::IiifInfo(r) => validate_iiif_info(r),
        ProtocolRequest::DeepZoomInfo(r) => validate_deepzoom_info(r),
        ProtocolRequest::DeepZoomTile(r) => validate_deepzoom_tile(r),
    }
}

// =============================================================================
// IIP
// =============================================================================

/// Validate an IIP request.
pub fn validate_iip(req: &IipRequest) -> Result<(), ServiceError> {
    require_identifier("FIF", &req.fif)?;
    check_output_modes(req)?;
    check_cvt(req.cvt.as_deref())?;
    check_tile_index("JTL", req.jtl.as_deref())?;
    check_tile_index("PTL", req.ptl.as_deref())?;

    let has_cvt = req.cvt.is_some();
    if let Some(wid) = req.wid {
        require_cvt("WID", has_cvt, wid)?;
    }
    if let Some(hei) = req.hei {
        require_cvt("HEI", has_cvt, hei)?;
    }
    if let Some(rgn) = &req.rgn {
        check_region(rgn, has_cvt)?;
    }
    if let Some(qlt) = req.qlt {
        check_quality(qlt, req.effective_format())?;
    }
    check_contrast(req.cnt)?;
    if let Some(rot) = &req.rot {
        check_one_of("ROT", rot, ROTATIONS)?;
    }
    check_colormap(req.cmp.as_deref())?;
    if let Some(pfl) = &req.pfl {
        check_profile(pfl)?;
    }
    check_color_twist(req.ctw.as_deref())?;
    check_color_space(req.col.as_deref())?;
    Ok(())
}

fn require_identifier(field: &str, value: &str) -> Result<(), ServiceError> {
    if value.trim().is_empty() {
        return Err(ServiceError::missing(
            field,
            format!("The parameter {} must be defined", field),
        ));
    }
    Ok(())
}

/// At most one of JTL, PTL and CVT.
fn check_output_modes(req: &IipRequest) -> Result<(), ServiceError> {
    let present: Vec<&str> = [
        ("JTL", req.jtl.is_some()),
        ("PTL", req.ptl.is_some()),
        ("CVT", req.cvt.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, set)| set.then_some(name))
    .collect();

    if present.len() > 1 {
        let collided = present.join(",");
        return Err(ServiceError::invalid(
            collided.clone(),
            format!(
                "More than one of the parameters JTL, PTL and CVT are set. Only one can be set at a time, but got: {}",
                present.join(" and ")
            ),
            collided,
        ));
    }
    Ok(())
}

fn check_cvt(cvt: Option<&str>) -> Result<(), ServiceError> {
    match cvt {
        Some(v) if !CVT_FORMATS.contains(&v) => Err(ServiceError::invalid(
            "CVT",
            format!("The parameter CVT must be either 'jpeg' or 'png'. It was '{}'", v),
            v,
        )),
        _ => Ok(()),
    }
}

/// JTL and PTL carry exactly two values: resolution level and tile index.
fn check_tile_index(field: &str, values: Option<&[i64]>) -> Result<(), ServiceError> {
    if let Some(values) = values {
        if values.len() != 2 {
            let input = join(values);
            return Err(ServiceError::invalid(
                field,
                format!(
                    "The parameter {} has to contain two values index x and resolution level r. Input was: '{}'",
                    field, input
                ),
                input,
            ));
        }
    }
    Ok(())
}

fn require_cvt(field: &str, has_cvt: bool, value: impl ToString) -> Result<(), ServiceError> {
    if !has_cvt {
        return Err(ServiceError::invalid(
            field,
            format!(
                "The parameter {} is only to be set, when the parameter CVT is in use",
                field
            ),
            value,
        ));
    }
    Ok(())
}

/// RGN is x,y,w,h with each component in [0.0, 1.0].
fn check_region(rgn: &[f32], has_cvt: bool) -> Result<(), ServiceError> {
    let input = join(rgn);
    if !has_cvt {
        return Err(ServiceError::invalid(
            "RGN",
            "The parameter RGN can only be used when the parameter CVT is in use",
            input,
        ));
    }
    if rgn.len() != 4 {
        return Err(ServiceError::invalid(
            "RGN",
            format!(
                "The parameter RGN has to contain four numbers x,y,w,h, all between 0.0 and 1.0. Input was: '{}'",
                input
            ),
            input,
        ));
    }
    for (name, value) in REGION_NAMES.iter().zip(rgn) {
        if !(0.0..=1.0).contains(value) {
            return Err(ServiceError::invalid(
                *name,
                format!(
                    "The value of {} in parameter RGN is out of bounds. It has to be between 0.0 and 1.0",
                    name
                ),
                value,
            ));
        }
    }
    Ok(())
}

/// QLT is bounded by the output format: 0-100 for JPEG, 0-9 for PNG.
fn check_quality(qlt: i64, format: &str) -> Result<(), ServiceError> {
    if qlt < 0 {
        return Err(ServiceError::invalid(
            "QLT",
            "QLT has to be equal to or greater than 0.",
            qlt,
        ));
    }
    if format == "png" && qlt > MAX_PNG_QUALITY {
        return Err(ServiceError::invalid(
            "QLT",
            "QLT has to be less than or equal to 9, when the output format is PNG",
            qlt,
        ));
    }
    if format != "png" && qlt > MAX_JPEG_QUALITY {
        return Err(ServiceError::invalid(
            "QLT",
            "QLT has to be less than or equal to 100, when the output format is JPEG",
            qlt,
        ));
    }
    Ok(())
}

fn check_contrast(cnt: Option<f32>) -> Result<(), ServiceError> {
    match cnt {
        Some(c) if c < 0.0 => Err(ServiceError::invalid(
            "CNT",
            "CNT has to be equal to or greater than 0",
            c,
        )),
        _ => Ok(()),
    }
}

fn check_colormap(cmp: Option<&str>) -> Result<(), ServiceError> {
    match cmp {
        Some(v) => check_one_of("CMP", v, COLORMAPS),
        None => Ok(()),
    }
}

fn check_color_space(col: Option<&str>) -> Result<(), ServiceError> {
    match col {
        Some(v) => check_one_of("COL", v, COLOR_SPACES),
        None => Ok(()),
    }
}

fn check_one_of(field: &str, value: &str, allowed: &[&str]) -> Result<(), ServiceError> {
    if !allowed.contains(&value) {
        return Err(ServiceError::invalid(
            field,
            format!(
                "{} has to be specified as one of the following values when set: {}. The provided {} was: '{}'",
                field,
                allowed.join(", "),
                field,
                value
            ),
            value,
        ));
    }
    Ok(())
}

/// PFL is `r:x1,y1-x2,y2` with five non-negative integers.
fn check_profile(pfl: &str) -> Result<(), ServiceError> {
    let Some(caps) = PROFILE_PATTERN.captures(pfl) else {
        return Err(ServiceError::invalid(
            "PFL",
            format!(
                "The value of PFL needs to be defined specifically as r:x1,y1-x2,y2 but was: '{}'",
                pfl
            ),
            pfl,
        ));
    };

    for (i, name) in PROFILE_NAMES.iter().enumerate() {
        let part = caps.get(i + 1).map_or("", |m| m.as_str());
        let digits = !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !digits || part.parse::<u32>().is_err() {
            return Err(ServiceError::invalid(
                *name,
                format!(
                    "The value of {} in PFL needs to be a non-negative integer, but was: '{}'",
                    name, part
                ),
                part,
            ));
        }
    }
    Ok(())
}

/// CTW is `[r,g,b;r,g,b;...]`: bracketed rows of exactly three numbers.
fn check_color_twist(ctw: Option<&str>) -> Result<(), ServiceError> {
    let Some(ctw) = ctw else {
        return Ok(());
    };

    let Some(inner) = ctw
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
    else {
        return Err(ServiceError::invalid(
            "CTW",
            format!(
                "CTW has to be defined as [array;array;array] using ; between arrays and , between numbers, but was: '{}'",
                ctw
            ),
            ctw,
        ));
    };

    for (i, row) in inner.split(';').enumerate() {
        let row_number = i + 1;
        let values: Vec<&str> = row.split(',').collect();
        if values.len() != TWIST_NAMES.len() {
            return Err(ServiceError::invalid(
                "CTW",
                format!(
                    "array{} in CTW has to contain exactly three comma-separated numbers, but was: '{}'",
                    row_number, row
                ),
                ctw,
            ));
        }
        for (name, value) in TWIST_NAMES.iter().zip(values) {
            let parsed = value.trim().parse::<f32>();
            if !matches!(parsed, Ok(v) if v.is_finite()) {
                return Err(ServiceError::invalid(
                    "CTW",
                    format!(
                        "The value of {} in array{} needs to be a number, but was: {}",
                        name, row_number, value
                    ),
                    ctw,
                ));
            }
        }
    }
    Ok(())
}

// =============================================================================
// DeepZoom
// =============================================================================

pub fn validate_deepzoom_info(req: &DeepZoomInfoRequest) -> Result<(), ServiceError> {
    require_identifier("imageid", &req.imageid)
}

pub fn validate_deepzoom_tile(req: &DeepZoomTileRequest) -> Result<(), ServiceError> {
    require_identifier("imageid", &req.imageid)?;

    if !DEEPZOOM_TILE_PATTERN.is_match(&req.tiles) {
        return Err(ServiceError::invalid(
            "tiles",
            format!(
                "Deepzoom parameter 'tiles' was '{}' but must be specified as x_y",
                req.tiles
            ),
            &req.tiles,
        ));
    }

    if let Some(format) = &req.format {
        if !DEEPZOOM_FORMATS.contains(&format.as_str()) {
            return Err(ServiceError::invalid(
                "format",
                "Format for Deepzoom tile has to be either 'jpg', 'jpeg' or 'png'",
                format,
            ));
        }
    }

    check_contrast(req.cnt)?;
    check_colormap(req.cmp.as_deref())?;
    check_color_twist(req.ctw.as_deref())?;
    check_color_space(req.col.as_deref())?;
    Ok(())
}

// =============================================================================
// IIIF
// =============================================================================

pub fn validate_iiif_image(req: &IiifImageRequest) -> Result<(), ServiceError> {
    require_identifier("identifier", &req.identifier)?;

    if !IIIF_REGION_PATTERN.is_match(&req.region) {
        return Err(ServiceError::invalid(
            "region",
            format!(
                "The parameter region must be 'full', 'square', 'x,y,w,h' or 'pct:x,y,w,h', but was: '{}'",
                req.region
            ),
            &req.region,
        ));
    }

    if !IIIF_SIZE_GRAMMAR.is_match(&req.size) {
        return Err(ServiceError::invalid(
            "size",
            format!(
                "The parameter size must be one of 'max', 'w,', ',h', 'pct:n', 'w,h' or '!w,h', optionally prefixed with '^', but was: '{}'",
                req.size
            ),
            &req.size,
        ));
    }

    let degrees = IIIF_ROTATION_PATTERN
        .captures(&req.rotation)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());
    match degrees {
        Some(d) if d <= 360.0 => {}
        _ => {
            return Err(ServiceError::invalid(
                "rotation",
                format!(
                    "The parameter rotation must be a number between 0 and 360, optionally prefixed with '!', but was: '{}'",
                    req.rotation
                ),
                &req.rotation,
            ));
        }
    }

    if !IIIF_QUALITIES.contains(&req.quality.as_str()) {
        return Err(ServiceError::invalid(
            "quality",
            format!(
                "The parameter quality must be one of {}, but was: '{}'",
                IIIF_QUALITIES.join(", "),
                req.quality
            ),
            &req.quality,
        ));
    }

    if let Some(format) = &req.format {
        if !IIIF_FORMATS.contains(&format.as_str()) {
            return Err(ServiceError::invalid(
                "format",
                format!(
                    "The parameter format must be one of {}, but was: '{}'",
                    IIIF_FORMATS.join(", "),
                    format
                ),
                format,
            ));
        }
    }
    Ok(())
}

pub fn validate_iiif_info(req: &IiifInfoRequest) -> Result<(), ServiceError> {
    require_identifier("identifier", &req.identifier)?;
    if req.extension != "json" {
        return Err(ServiceError::invalid(
            "format",
            format!(
                "IIIF image information is only available as 'json', but '{}' was requested",
                req.extension
            ),
            &req.extension,
        ));
    }
    Ok(())
}

fn join<T: ToString>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}
