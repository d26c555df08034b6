//! Data model: operator-entered patient fields, the extracted device
//! record, and the merged placeholder mapping the renderer consumes.
//!
//! The record's one invariant: **every scalar field is always present**,
//! holding either the recognised numeric string or the sentinel
//! [`SENTINEL`]. Callers never special-case missing keys, only sentinel
//! values — a deliberate "best effort with visible gaps" contract, since a
//! `---` in the finished document is something clinic staff spot and fix,
//! while a crashed upload is not.

use crate::config::CurveId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value substituted for any field the extractor could not recognise.
pub const SENTINEL: &str = "---";

// ── Operator-entered fields ──────────────────────────────────────────────

/// The flat patient-field map supplied by the form collaborator.
///
/// JSON keys use the form's Spanish field names. Every field is optional in
/// the JSON and defaults to the empty string; only `nombre` and `rut` are
/// required to generate a report (validated in [`crate::generate`]). No
/// format validation is applied — date formatting is the form's job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientFields {
    /// Given name.
    pub nombre: String,
    /// Surname(s).
    pub apellidos: String,
    /// National patient identifier, e.g. `12345678-9`.
    pub rut: String,
    /// Sex as displayed, e.g. `Femenino`.
    pub genero: String,
    /// Birth date, `DD/MM/AAAA` by convention.
    pub fecha_nacimiento: String,
    pub edad: String,
    pub altura: String,
    pub peso: String,
    /// Referring physician.
    pub medico: String,
    /// Operator who ran the measurement.
    pub operador: String,
    /// Referral origin, e.g. `Poli`.
    pub procedencia: String,
    /// Exam date, `DD/MM/AAAA` by convention.
    pub fecha_examen: String,
}

impl PatientFields {
    /// Placeholder key / value pairs in template order.
    pub fn entries(&self) -> [(&'static str, &str); 12] {
        [
            ("NOMBRE", self.nombre.as_str()),
            ("APELLIDOS", self.apellidos.as_str()),
            ("RUT", self.rut.as_str()),
            ("GENERO", self.genero.as_str()),
            ("FECHA_NACIMIENTO", self.fecha_nacimiento.as_str()),
            ("EDAD", self.edad.as_str()),
            ("ALTURA", self.altura.as_str()),
            ("PESO", self.peso.as_str()),
            ("MEDICO", self.medico.as_str()),
            ("OPERADOR", self.operador.as_str()),
            ("PROCEDENCIA", self.procedencia.as_str()),
            ("FECHA_EXAMEN", self.fecha_examen.as_str()),
        ]
    }
}

/// Patient-identifying keys affected by a layout's `uppercase_patient`
/// flag. Numeric patient fields (age, height, weight) and staff names are
/// deliberately not in this list.
const IDENTITY_KEYS: [&str; 6] = [
    "NOMBRE",
    "APELLIDOS",
    "RUT",
    "GENERO",
    "FECHA_NACIMIENTO",
    "FECHA_EXAMEN",
];

// ── Extracted record ─────────────────────────────────────────────────────

/// Everything the extractor recognised in one device PDF.
///
/// Scalars hold the normalised numeric string (comma already converted to
/// period) or [`SENTINEL`]. Curve images are PNG bytes, base64-encoded when
/// serialised to JSON (`--extract-only` dumps).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub feno50: String,
    pub feno200: String,
    pub cano: String,
    pub temperature: String,
    pub pressure: String,
    pub flow_rate: String,
    #[serde(with = "b64_opt")]
    pub exhalation_curve: Option<Vec<u8>>,
    #[serde(with = "b64_opt")]
    pub analysis_curve: Option<Vec<u8>>,
}

impl Default for ExtractedRecord {
    fn default() -> Self {
        Self::missing()
    }
}

impl ExtractedRecord {
    /// The all-sentinel record: what an unreadable PDF degrades to.
    pub fn missing() -> Self {
        Self {
            feno50: SENTINEL.to_string(),
            feno200: SENTINEL.to_string(),
            cano: SENTINEL.to_string(),
            temperature: SENTINEL.to_string(),
            pressure: SENTINEL.to_string(),
            flow_rate: SENTINEL.to_string(),
            exhalation_curve: None,
            analysis_curve: None,
        }
    }

    /// Placeholder key / value pairs for the technical fields.
    pub fn entries(&self) -> [(&'static str, &str); 6] {
        [
            ("FENO50", self.feno50.as_str()),
            ("FENO200", self.feno200.as_str()),
            ("CANO", self.cano.as_str()),
            ("TEMPERATURA", self.temperature.as_str()),
            ("PRESION", self.pressure.as_str()),
            ("TASA_FLUJO", self.flow_rate.as_str()),
        ]
    }

    /// Number of scalar fields that hold a recognised value.
    pub fn scalar_hits(&self) -> usize {
        self.entries().iter().filter(|(_, v)| *v != SENTINEL).count()
    }

    /// PNG bytes for a curve, if that panel was cropped.
    pub fn curve(&self, id: CurveId) -> Option<&[u8]> {
        match id {
            CurveId::Exhalation => self.exhalation_curve.as_deref(),
            CurveId::Analysis => self.analysis_curve.as_deref(),
        }
    }
}

/// Base64 (de)serialisation for optional PNG blobs, so `--extract-only`
/// JSON stays printable.
mod b64_opt {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(bytes) => s.serialize_some(&STANDARD.encode(bytes)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        let opt: Option<String> = Option::deserialize(d)?;
        opt.map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

// ── Merged mapping ───────────────────────────────────────────────────────

/// Merge patient and extracted fields into the placeholder → value map the
/// renderer consumes.
///
/// Both sources use disjoint key sets by naming convention; should they
/// ever collide, the extracted/technical value wins (inserted last). With
/// `uppercase_patient`, patient-identifying values are upper-cased before
/// insertion — numeric and technical values are never transformed.
///
/// A `BTreeMap` keeps substitution order deterministic, which keeps the
/// rendered document byte-identical across runs with identical inputs.
pub fn merge_mapping(
    patient: &PatientFields,
    record: &ExtractedRecord,
    uppercase_patient: bool,
) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for (key, value) in patient.entries() {
        let value = if uppercase_patient && IDENTITY_KEYS.contains(&key) {
            value.to_uppercase()
        } else {
            value.to_string()
        };
        map.insert(key.to_string(), value);
    }
    for (key, value) in record.entries() {
        map.insert(key.to_string(), value.to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_patient() -> PatientFields {
        PatientFields {
            nombre: "Juan".into(),
            apellidos: "P\u{e9}rez".into(),
            rut: "12345678-9".into(),
            genero: "Masculino".into(),
            edad: "59".into(),
            medico: "Dra. Schonffeldt".into(),
            ..PatientFields::default()
        }
    }

    #[test]
    fn missing_record_is_all_sentinel() {
        let r = ExtractedRecord::missing();
        assert!(r.entries().iter().all(|(_, v)| *v == SENTINEL));
        assert_eq!(r.scalar_hits(), 0);
        assert!(r.curve(CurveId::Exhalation).is_none());
        assert!(r.curve(CurveId::Analysis).is_none());
    }

    #[test]
    fn patient_json_accepts_partial_form() {
        let p: PatientFields =
            serde_json::from_str(r#"{"nombre":"Ana","rut":"9876543-2"}"#).unwrap();
        assert_eq!(p.nombre, "Ana");
        assert_eq!(p.apellidos, "");
        assert_eq!(p.fecha_examen, "");
    }

    #[test]
    fn merge_contains_both_sides() {
        let map = merge_mapping(&sample_patient(), &ExtractedRecord::missing(), false);
        assert_eq!(map["NOMBRE"], "Juan");
        assert_eq!(map["FENO50"], SENTINEL);
        assert_eq!(map.len(), 18);
    }

    #[test]
    fn uppercase_flag_touches_identity_fields_only() {
        let mut record = ExtractedRecord::missing();
        record.temperature = "22.4".into();
        let map = merge_mapping(&sample_patient(), &record, true);
        assert_eq!(map["NOMBRE"], "JUAN");
        assert_eq!(map["APELLIDOS"], "P\u{c9}REZ");
        assert_eq!(map["RUT"], "12345678-9");
        // Staff names and numerics stay as typed.
        assert_eq!(map["MEDICO"], "Dra. Schonffeldt");
        assert_eq!(map["EDAD"], "59");
        assert_eq!(map["TEMPERATURA"], "22.4");
    }

    #[test]
    fn record_round_trips_through_json_with_curves() {
        let record = ExtractedRecord {
            feno50: "38".into(),
            exhalation_curve: Some(vec![0x89, 0x50, 0x4E, 0x47]),
            ..ExtractedRecord::missing()
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: ExtractedRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert!(json.contains("iVBORw")); // base64 of the PNG magic
    }
}
