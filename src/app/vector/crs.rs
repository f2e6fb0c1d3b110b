//! Coordinate reference system identification
//!
//! Layers are never reprojected. The only job here is to work out whether two
//! layers declare the same CRS, across the different ways a shapefile `.prj`
//! sidecar and a GeoJSON `crs` member spell it.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

/// CRS as declared by a vector layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Crs {
    /// EPSG code
    Epsg(u32),
    /// Named CRS without a recognised EPSG code (normalised name)
    Named(String),
    /// Layer declares no CRS
    Unspecified,
}

/// Well-known CRS names that map onto EPSG codes
const NAME_ALIASES: &[(&str, u32)] = &[
    ("wgs_1984_web_mercator_auxiliary_sphere", 3857),
    ("wgs_84_pseudo_mercator", 3857),
    ("wgs_1984_web_mercator", 3857),
    ("popular_visualisation_pseudo_mercator", 3857),
    ("gcs_wgs_1984", 4326),
    ("wgs_84", 4326),
    ("wgs84", 4326),
    ("crs84", 4326),
];

fn epsg_authority_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]"#)
            .expect("EPSG authority regex should be valid")
    })
}

fn wkt_name_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)^\s*(?:PROJCS|GEOGCS|PROJCRS|GEOGCRS|GEODCRS)\[\s*"([^"]+)""#)
            .expect("WKT name regex should be valid")
    })
}

fn urn_epsg_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)EPSG:{1,2}(?:[\d.]*:)?(\d+)$").expect("EPSG URN regex should be valid")
    })
}

impl Crs {
    /// Identify the CRS described by WKT text (a `.prj` sidecar)
    ///
    /// The last EPSG authority in the text belongs to the outermost CRS node, so
    /// it wins. Without an authority the CRS name is matched against known aliases.
    pub fn from_wkt(wkt: &str) -> Self {
        let wkt = wkt.trim();
        if wkt.is_empty() {
            return Crs::Unspecified;
        }

        if let Some(code) = epsg_authority_regex()
            .captures_iter(wkt)
            .last()
            .and_then(|caps| caps[1].parse().ok())
        {
            return Crs::Epsg(code);
        }

        match wkt_name_regex().captures(wkt) {
            Some(caps) => Self::from_name(&caps[1]),
            None => Crs::Named(normalize_name(wkt)),
        }
    }

    /// Identify a CRS from an identifier such as `EPSG:3857` or an OGC URN
    pub fn from_identifier(identifier: &str) -> Self {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Crs::Unspecified;
        }
        if let Some(code) = urn_epsg_regex()
            .captures(identifier)
            .and_then(|caps| caps[1].parse().ok())
        {
            return Crs::Epsg(code);
        }
        if identifier.to_ascii_uppercase().ends_with("CRS84") {
            return Crs::Epsg(4326);
        }
        Self::from_name(identifier)
    }

    /// Identify the CRS named by a legacy GeoJSON `crs` member
    pub fn from_geojson_member(member: &Value) -> Self {
        let properties = member.get("properties");
        match member.get("type").and_then(Value::as_str) {
            Some("name") => properties
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str)
                .map(Self::from_identifier)
                .unwrap_or(Crs::Unspecified),
            Some(kind) if kind.eq_ignore_ascii_case("epsg") => properties
                .and_then(|p| p.get("code"))
                .and_then(Value::as_u64)
                .and_then(|code| u32::try_from(code).ok())
                .map(Crs::Epsg)
                .unwrap_or(Crs::Unspecified),
            _ => Crs::Unspecified,
        }
    }

    fn from_name(name: &str) -> Self {
        let normalized = normalize_name(name);
        NAME_ALIASES
            .iter()
            .find(|(alias, _)| *alias == normalized)
            .map(|(_, code)| Crs::Epsg(*code))
            .unwrap_or(Crs::Named(normalized))
    }

    /// Whether two layers in these CRSs can be overlaid without reprojection
    ///
    /// Two unspecified CRSs are taken to agree; an unspecified CRS never agrees
    /// with a declared one.
    pub fn is_compatible(&self, other: &Crs) -> bool {
        self == other
    }

    /// Whether the CRS is declared at all
    pub fn is_specified(&self) -> bool {
        !matches!(self, Crs::Unspecified)
    }

    /// Legacy GeoJSON `crs` member for this CRS, if it can be named
    pub fn to_geojson_member(&self) -> Option<Value> {
        let name = match self {
            Crs::Epsg(code) => format!("urn:ogc:def:crs:EPSG::{}", code),
            Crs::Named(name) => name.clone(),
            Crs::Unspecified => return None,
        };
        Some(serde_json::json!({
            "type": "name",
            "properties": { "name": name }
        }))
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Crs::Epsg(code) => write!(f, "EPSG:{}", code),
            Crs::Named(name) => write!(f, "{}", name),
            Crs::Unspecified => write!(f, "unspecified"),
        }
    }
}

fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            normalized.push(c.to_ascii_lowercase());
        } else if !normalized.ends_with('_') {
            normalized.push('_');
        }
    }
    normalized.trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ESRI_WEB_MERCATOR: &str = r#"PROJCS["WGS_1984_Web_Mercator_Auxiliary_Sphere",GEOGCS["GCS_WGS_1984",DATUM["D_WGS_1984",SPHEROID["WGS_1984",6378137.0,298.257223563]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Mercator_Auxiliary_Sphere"],PARAMETER["False_Easting",0.0],UNIT["Meter",1.0]]"#;

    const OGC_WEB_MERCATOR: &str = r#"PROJCS["WGS 84 / Pseudo-Mercator",GEOGCS["WGS 84",DATUM["WGS_1984",SPHEROID["WGS 84",6378137,298.257223563,AUTHORITY["EPSG","7030"]],AUTHORITY["EPSG","6326"]],AUTHORITY["EPSG","4326"]],PROJECTION["Mercator_1SP"],AUTHORITY["EPSG","3857"]]"#;

    #[test]
    fn test_wkt_with_authority_uses_outermost_code() {
        assert_eq!(Crs::from_wkt(OGC_WEB_MERCATOR), Crs::Epsg(3857));
    }

    #[test]
    fn test_esri_wkt_without_authority_uses_alias() {
        assert_eq!(Crs::from_wkt(ESRI_WEB_MERCATOR), Crs::Epsg(3857));
        assert!(Crs::from_wkt(ESRI_WEB_MERCATOR).is_compatible(&Crs::from_wkt(OGC_WEB_MERCATOR)));
    }

    #[test]
    fn test_unknown_projection_is_named() {
        let crs = Crs::from_wkt(r#"PROJCS["NAD83 / Texas Centric Albers Equal Area",GEOGCS["NAD83"]]"#);
        assert_eq!(
            crs,
            Crs::Named("nad83_texas_centric_albers_equal_area".to_string())
        );
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(Crs::from_identifier("EPSG:3857"), Crs::Epsg(3857));
        assert_eq!(
            Crs::from_identifier("urn:ogc:def:crs:EPSG::2277"),
            Crs::Epsg(2277)
        );
        assert_eq!(
            Crs::from_identifier("urn:ogc:def:crs:OGC:1.3:CRS84"),
            Crs::Epsg(4326)
        );
        assert_eq!(Crs::from_identifier(""), Crs::Unspecified);
    }

    #[test]
    fn test_geojson_member_round_trip() {
        let member = Crs::Epsg(3857).to_geojson_member().unwrap();
        assert_eq!(Crs::from_geojson_member(&member), Crs::Epsg(3857));

        let legacy = serde_json::json!({"type": "EPSG", "properties": {"code": 2277}});
        assert_eq!(Crs::from_geojson_member(&legacy), Crs::Epsg(2277));
        assert!(Crs::Unspecified.to_geojson_member().is_none());
    }

    #[test]
    fn test_compatibility() {
        assert!(Crs::Unspecified.is_compatible(&Crs::Unspecified));
        assert!(!Crs::Unspecified.is_compatible(&Crs::Epsg(3857)));
        assert!(!Crs::Epsg(4326).is_compatible(&Crs::Epsg(3857)));
        assert_eq!(Crs::Epsg(3857).to_string(), "EPSG:3857");
    }
}
