use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

pub const CONTRACT_ID: &str = "overlay_forensics.report_contract";
pub const CONTRACT_VERSION: &str = "1";

const REPORT_SCHEMA_ID: &str = "overlay_forensics.report.v1";

pub const FIELD_OVERALL_PROBABILITY: &str = "probabilidad_manipulacion";
pub const FIELD_OVERALL_RISK: &str = "nivel_riesgo";
pub const FIELD_ZONES_WITH_OVERLAY: &str = "zones_with_overlay";
pub const FIELD_ZONE_PROBABILITY: &str = "probabilidad_overlay";
pub const FIELD_ZONE_DETAIL: &str = "detalles_por_pagina";

pub const ZONE_LAYERS: &str = "analisis_por_capas";
pub const ZONE_STREAM: &str = "analisis_por_stream";
pub const ZONE_ADVANCED: &str = "analisis_avanzado";
pub const ZONE_IMAGES: &str = "analisis_imagenes";

/// Fraction of differing pixels above which a comparison counts as a change.
pub const PIXEL_DIFF_THRESHOLD: f64 = 0.05;
pub const OVERALL_HIGH_THRESHOLD: f64 = 0.6;
pub const OVERALL_MEDIUM_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoneDef {
    pub id: &'static str,
    pub name: &'static str,
    /// Whether the document context factor scales this zone's probability.
    pub context_dampened: bool,
    pub high_threshold: f64,
    pub medium_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskWeightDef {
    pub check_id: &'static str,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelPenaltyDef {
    pub level: &'static str,
    pub fraction: f64,
}

pub const ZONES_V1: [ZoneDef; 4] = [
    ZoneDef {
        id: ZONE_LAYERS,
        name: "Incremental layer contribution",
        context_dampened: true,
        high_threshold: 0.6,
        medium_threshold: 0.3,
    },
    ZoneDef {
        id: ZONE_STREAM,
        name: "Stream bisection",
        context_dampened: true,
        high_threshold: 0.6,
        medium_threshold: 0.3,
    },
    ZoneDef {
        id: ZONE_ADVANCED,
        name: "Annotation and advanced overlay",
        context_dampened: false,
        high_threshold: 0.6,
        medium_threshold: 0.3,
    },
    ZoneDef {
        id: ZONE_IMAGES,
        name: "Embedded image patches",
        context_dampened: false,
        high_threshold: 0.5,
        medium_threshold: 0.2,
    },
];

pub const RISK_WEIGHTS_V1: [RiskWeightDef; 2] = [
    RiskWeightDef {
        check_id: "capas_multiples",
        weight: 30.0,
    },
    RiskWeightDef {
        check_id: "texto_superpuesto",
        weight: 25.0,
    },
];

pub const LEVEL_PENALTIES_V1: [LevelPenaltyDef; 3] = [
    LevelPenaltyDef {
        level: "HIGH",
        fraction: 1.0,
    },
    LevelPenaltyDef {
        level: "MEDIUM",
        fraction: 0.5,
    },
    LevelPenaltyDef {
        level: "LOW",
        fraction: 0.0,
    },
];

const REPORT_SCHEMA_V1_JSON: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schema/overlay_report.v1.json"
));

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportContractMetadata {
    pub contract_id: &'static str,
    pub contract_version: &'static str,
    pub contract_fingerprint_sha256: String,
    pub report_schema_id: &'static str,
    pub report_schema_hash_sha256: String,
}

fn hex_digest(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        use std::fmt::Write;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

fn hex_sha256(bytes: &[u8]) -> String {
    hex_digest(&Sha256::digest(bytes))
}

static REPORT_SCHEMA_HASH: OnceLock<String> = OnceLock::new();
static CONTRACT_FINGERPRINT: OnceLock<String> = OnceLock::new();
static REPORT_SCHEMA_VALUE: OnceLock<Value> = OnceLock::new();

pub fn report_schema_v1_json() -> &'static str {
    REPORT_SCHEMA_V1_JSON
}

pub fn report_schema_v1_hash_sha256() -> String {
    REPORT_SCHEMA_HASH
        .get_or_init(|| hex_sha256(REPORT_SCHEMA_V1_JSON.as_bytes()))
        .clone()
}

fn report_schema_value() -> &'static Value {
    REPORT_SCHEMA_VALUE
        .get_or_init(|| serde_json::from_str(REPORT_SCHEMA_V1_JSON).unwrap_or(Value::Null))
}

pub fn contract_fingerprint_sha256() -> String {
    CONTRACT_FINGERPRINT
        .get_or_init(|| {
            let mut hasher = Sha256::new();
            hasher.update(CONTRACT_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(CONTRACT_VERSION.as_bytes());
            hasher.update(b"\n");
            hasher.update(REPORT_SCHEMA_ID.as_bytes());
            hasher.update(b"\n");
            hasher.update(report_schema_v1_hash_sha256().as_bytes());
            for zone in &ZONES_V1 {
                hasher.update(b"\n");
                hasher.update(
                    format!(
                        "{}:{}:{}:{}",
                        zone.id, zone.context_dampened, zone.high_threshold, zone.medium_threshold
                    )
                    .as_bytes(),
                );
            }
            hex_digest(&hasher.finalize())
        })
        .clone()
}

pub fn zone_defs_v1() -> &'static [ZoneDef] {
    &ZONES_V1
}

pub fn zone_def(zone_id: &str) -> Option<&'static ZoneDef> {
    ZONES_V1.iter().find(|zone| zone.id == zone_id)
}

/// Unknown zone ids are never dampened.
pub fn is_context_dampened(zone_id: &str) -> bool {
    zone_def(zone_id).is_some_and(|zone| zone.context_dampened)
}

/// Count field names the schema lists for a zone.
pub fn zone_count_fields(zone_id: &str) -> Vec<&'static str> {
    let Some(zones) = report_schema_value().get("zones").and_then(Value::as_array) else {
        return Vec::new();
    };
    zones
        .iter()
        .find(|zone| zone.get("id").and_then(Value::as_str) == Some(zone_id))
        .and_then(|zone| zone.get("counts"))
        .and_then(Value::as_array)
        .map(|counts| counts.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

pub fn summary_fields() -> Vec<&'static str> {
    report_schema_value()
        .get("summary_fields")
        .and_then(Value::as_array)
        .map(|fields| fields.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

pub fn risk_weight_defs_v1() -> &'static [RiskWeightDef] {
    &RISK_WEIGHTS_V1
}

pub fn level_penalty_fraction(level: &str) -> f64 {
    LEVEL_PENALTIES_V1
        .iter()
        .find(|def| def.level == level)
        .map(|def| def.fraction)
        .unwrap_or(0.0)
}

pub fn metadata() -> ReportContractMetadata {
    ReportContractMetadata {
        contract_id: CONTRACT_ID,
        contract_version: CONTRACT_VERSION,
        contract_fingerprint_sha256: contract_fingerprint_sha256(),
        report_schema_id: REPORT_SCHEMA_ID,
        report_schema_hash_sha256: report_schema_v1_hash_sha256(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contract_fingerprint_is_stable_and_nonempty() {
        let a = contract_fingerprint_sha256();
        let b = contract_fingerprint_sha256();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, report_schema_v1_hash_sha256());
    }

    #[test]
    fn embedded_schema_parses_and_names_itself() {
        let value: Value =
            serde_json::from_str(report_schema_v1_json()).expect("embedded schema should parse");
        assert_eq!(value["schema"], REPORT_SCHEMA_ID);
    }

    #[test]
    fn every_zone_def_is_listed_in_schema() {
        for zone in zone_defs_v1() {
            assert!(
                !zone_count_fields(zone.id).is_empty(),
                "zone {} missing from schema",
                zone.id
            );
        }
        assert!(zone_count_fields("analisis_inexistente").is_empty());
    }

    #[test]
    fn summary_fields_include_interop_names() {
        let fields = summary_fields();
        for required in [
            FIELD_OVERALL_PROBABILITY,
            FIELD_OVERALL_RISK,
            FIELD_ZONES_WITH_OVERLAY,
        ] {
            assert!(fields.contains(&required), "missing {required}");
        }
    }

    #[test]
    fn zone_thresholds_are_ordered() {
        for zone in zone_defs_v1() {
            assert!(zone.medium_threshold < zone.high_threshold);
            assert!(zone.high_threshold <= 1.0);
        }
        assert!(OVERALL_MEDIUM_THRESHOLD < OVERALL_HIGH_THRESHOLD);
    }

    #[test]
    fn only_stream_based_zones_are_dampened() {
        let dampened: Vec<&str> = zone_defs_v1()
            .iter()
            .filter(|zone| zone.context_dampened)
            .map(|zone| zone.id)
            .collect();
        assert_eq!(dampened, vec![ZONE_LAYERS, ZONE_STREAM]);
        assert!(is_context_dampened(ZONE_STREAM));
        assert!(!is_context_dampened(ZONE_IMAGES));
        assert!(!is_context_dampened("analisis_inexistente"));
    }

    #[test]
    fn metadata_serializes_fingerprints() {
        let meta = metadata();
        assert_eq!(meta.contract_fingerprint_sha256, contract_fingerprint_sha256());
        assert_eq!(hex_sha256(b"").len(), 64);
        let value = serde_json::to_value(&meta).expect("metadata json");
        assert_eq!(value["contract_id"], CONTRACT_ID);
        assert_eq!(value["report_schema_hash_sha256"], report_schema_v1_hash_sha256());
    }

    #[test]
    fn level_penalties_match_known_levels() {
        assert_eq!(level_penalty_fraction("HIGH"), 1.0);
        assert_eq!(level_penalty_fraction("MEDIUM"), 0.5);
        assert_eq!(level_penalty_fraction("LOW"), 0.0);
        assert_eq!(level_penalty_fraction("UNKNOWN"), 0.0);
        let total: f64 = risk_weight_defs_v1().iter().map(|w| w.weight).sum();
        assert!((total - 55.0).abs() < f64::EPSILON);
    }
}
