use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::FaqEntry;
use crate::normalize::SPANISH_FILLERS;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog has no entries")]
    Empty,
    #[error("entry #{index} has an empty intent key")]
    EmptyIntent { index: usize },
    #[error("intent `{intent}` is declared more than once")]
    DuplicateIntent { intent: String },
    #[error("intent `{intent}` has no answer")]
    MissingAnswer { intent: String },
    #[error("intent `{intent}` has no variants")]
    NoVariants { intent: String },
    #[error("variant `{variant}` of intent `{intent}` is empty after normalization")]
    EmptyVariant { intent: String, variant: String },
    #[error("failed reading catalog at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid catalog json at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Static configuration the matcher is built from. Entry order is the match priority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaqCatalog {
    pub entries: Vec<FaqEntry>,
    #[serde(default = "default_stopwords")]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub suggested_questions: Vec<String>,
}

fn default_stopwords() -> Vec<String> {
    SPANISH_FILLERS.iter().map(ToString::to_string).collect()
}

impl FaqCatalog {
    pub fn from_json_str(raw: &str, origin: &str) -> Result<Self, CatalogError> {
        serde_json::from_str(raw).map_err(|source| CatalogError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw, &path.display().to_string())
    }

    /// Alumni office (Oficina de Egresados, UNFV) questions.
    pub fn unfv_default() -> Self {
        let entries = vec![
            entry(
                "certificado de egresado",
                "Para solicitar tu certificado de egresado, debes llenar el formulario en la página web de la Oficina de Egresados y esperar 3 días hábiles para su entrega.",
                &[
                    "certificado de egresado",
                    "certificado egresado",
                    "constancia de egresado",
                ],
            ),
            entry(
                "título profesional",
                "El trámite para obtener tu título profesional se inicia en la Oficina de Egresados. Debes haber aprobado todos los cursos y presentar tu solicitud a través del sistema de la universidad.",
                &[
                    "título profesional",
                    "titulo profesional",
                    "sacar mi título",
                    "sacar mi titulo",
                    "tramitar título",
                    "tramitar titulo",
                ],
            ),
            entry(
                "constancia de estudios",
                "Puedes obtener una constancia de estudios solicitándola a través de tu cuenta en el portal de la universidad o en la Oficina de Egresados.",
                &["constancia de estudios", "constancia estudios", "certificado de estudios"],
            ),
            entry(
                "requisitos para graduarse",
                "Para graduarte, debes haber cumplido con todos los requisitos académicos establecidos en el reglamento de la universidad. Consulta el portal de graduados para más detalles.",
                &[
                    "requisitos para graduarse",
                    "requisitos para graduarme",
                    "requisitos de graduación",
                    "requisitos de graduacion",
                    "cómo me gradúo",
                    "como me graduo",
                ],
            ),
            entry(
                "certificado de notas",
                "Para obtener un certificado de notas, debes presentar una solicitud en línea a través del portal de egresados de la UNFV.",
                &[
                    "certificado de notas",
                    "certificado notas",
                    "record de notas",
                    "récord de notas",
                    "historial de notas",
                ],
            ),
            entry(
                "documentos para graduación",
                "Los documentos necesarios para graduarte incluyen tu expediente académico, tu constancia de egresado, y tu solicitud de título, los cuales debes entregar en la Oficina de Egresados.",
                &[
                    "documentos para graduación",
                    "documentos para graduacion",
                    "documentos para graduarme",
                    "papeles para graduarme",
                ],
            ),
        ];

        Self {
            entries,
            stopwords: default_stopwords(),
            suggested_questions: vec![
                "¿Cómo solicitar mi certificado de egresado?".to_string(),
                "¿Cuáles son los requisitos para graduarme?".to_string(),
            ],
        }
    }
}

fn entry(intent: &str, answer: &str, variants: &[&str]) -> FaqEntry {
    FaqEntry {
        intent: intent.to_string(),
        answer: answer.to_string(),
        variants: variants.iter().map(ToString::to_string).collect(),
    }
}
