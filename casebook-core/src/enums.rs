//! Enum types for casebook entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CASE STATUS
// ============================================================================

/// Lifecycle status of a conduct case.
///
/// The store has accumulated several spellings over time, so parsing is
/// tolerant and anything unrecognised is preserved in `Unknown` rather than
/// failing the whole row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(into = "String", from = "String")]
pub enum CaseStatus {
    /// Case has been reported but no process has started
    #[default]
    Reported,
    /// A due-process follow-up is running
    InFollowUp,
    /// Case is closed
    Closed,
    /// Status value not known to this version
    Unknown(String),
}

impl CaseStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &str {
        match self {
            CaseStatus::Reported => "reportado",
            CaseStatus::InFollowUp => "en_seguimiento",
            CaseStatus::Closed => "cerrado",
            CaseStatus::Unknown(raw) => raw.as_str(),
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Self {
        match fold_label(s).as_str() {
            "reportado" | "reported" | "abierto" | "open" => CaseStatus::Reported,
            "en_seguimiento" | "en seguimiento" | "seguimiento" | "in_follow_up"
            | "infollowup" | "in follow up" => CaseStatus::InFollowUp,
            "cerrado" | "closed" => CaseStatus::Closed,
            _ => CaseStatus::Unknown(s.to_string()),
        }
    }

    /// Statuses every tenant dashboard reports on, in display order.
    pub fn known() -> [CaseStatus; 3] {
        [CaseStatus::Reported, CaseStatus::InFollowUp, CaseStatus::Closed]
    }

    /// Check if the case still accepts follow-up work.
    pub fn is_open(&self) -> bool {
        !matches!(self, CaseStatus::Closed)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl From<String> for CaseStatus {
    fn from(value: String) -> Self {
        CaseStatus::from_db_str(&value)
    }
}

impl From<CaseStatus> for String {
    fn from(value: CaseStatus) -> Self {
        value.as_db_str().to_string()
    }
}

// ============================================================================
// PROCESS STAGE
// ============================================================================

/// Step within the fixed due-process vocabulary.
///
/// Variants are declared in workflow order, so `Ord` follows the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStage {
    Reporte,
    Investigacion,
    Resolucion,
    Apelacion,
    Cierre,
}

impl ProcessStage {
    /// All stages in workflow order.
    pub const ALL: [ProcessStage; 5] = [
        ProcessStage::Reporte,
        ProcessStage::Investigacion,
        ProcessStage::Resolucion,
        ProcessStage::Apelacion,
        ProcessStage::Cierre,
    ];

    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            ProcessStage::Reporte => "reporte",
            ProcessStage::Investigacion => "investigacion",
            ProcessStage::Resolucion => "resolucion",
            ProcessStage::Apelacion => "apelacion",
            ProcessStage::Cierre => "cierre",
        }
    }

    /// Parse from database string representation (accents and case ignored).
    pub fn from_db_str(s: &str) -> Result<Self, ProcessStageParseError> {
        match fold_label(s).as_str() {
            "reporte" => Ok(ProcessStage::Reporte),
            "investigacion" => Ok(ProcessStage::Investigacion),
            "resolucion" => Ok(ProcessStage::Resolucion),
            "apelacion" => Ok(ProcessStage::Apelacion),
            "cierre" => Ok(ProcessStage::Cierre),
            _ => Err(ProcessStageParseError(s.to_string())),
        }
    }

    /// Business days the stage may stay open before it is overdue.
    pub fn deadline_business_days(&self) -> u32 {
        match self {
            ProcessStage::Reporte => 2,
            ProcessStage::Investigacion => 10,
            ProcessStage::Resolucion => 5,
            ProcessStage::Apelacion => 5,
            ProcessStage::Cierre => 2,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(&self) -> Option<ProcessStage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for ProcessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for ProcessStage {
    type Err = ProcessStageParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid process stage string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStageParseError(pub String);

impl fmt::Display for ProcessStageParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid process stage: {}", self.0)
    }
}

impl std::error::Error for ProcessStageParseError {}

// ============================================================================
// STAGE STATUS
// ============================================================================

/// Status of the current stage of a follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pendiente,
    EnCurso,
    Completada,
    Vencida,
}

impl StageStatus {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            StageStatus::Pendiente => "pendiente",
            StageStatus::EnCurso => "en_curso",
            StageStatus::Completada => "completada",
            StageStatus::Vencida => "vencida",
        }
    }

    /// Parse from database string representation; unknown values yield `None`.
    pub fn from_db_str(s: &str) -> Option<Self> {
        match fold_label(s).replace(' ', "_").as_str() {
            "pendiente" | "pending" => Some(StageStatus::Pendiente),
            "en_curso" | "in_progress" => Some(StageStatus::EnCurso),
            "completada" | "completado" | "completed" => Some(StageStatus::Completada),
            "vencida" | "vencido" | "overdue" => Some(StageStatus::Vencida),
            _ => None,
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

/// Lowercase, trim and strip Spanish accents from a label.
fn fold_label(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'á' => 'a',
            'é' => 'e',
            'í' => 'i',
            'ó' => 'o',
            'ú' | 'ü' => 'u',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_status_tolerant_parsing() {
        assert_eq!(CaseStatus::from_db_str("Reportado"), CaseStatus::Reported);
        assert_eq!(CaseStatus::from_db_str("En Seguimiento"), CaseStatus::InFollowUp);
        assert_eq!(CaseStatus::from_db_str("closed"), CaseStatus::Closed);
        assert_eq!(
            CaseStatus::from_db_str("archivado"),
            CaseStatus::Unknown("archivado".to_string())
        );
    }

    #[test]
    fn test_case_status_serde_uses_db_strings() {
        let json = serde_json::to_string(&CaseStatus::InFollowUp).unwrap();
        assert_eq!(json, "\"en_seguimiento\"");
        let back: CaseStatus = serde_json::from_str("\"cerrado\"").unwrap();
        assert_eq!(back, CaseStatus::Closed);
    }

    #[test]
    fn test_unknown_status_round_trips_raw_value() {
        let status: CaseStatus = serde_json::from_str("\"derivado\"").unwrap();
        assert_eq!(serde_json::to_string(&status).unwrap(), "\"derivado\"");
        assert!(status.is_open());
    }

    #[test]
    fn test_stage_status_parsing() {
        assert_eq!(StageStatus::from_db_str("En curso"), Some(StageStatus::EnCurso));
        assert_eq!(StageStatus::from_db_str("completada"), Some(StageStatus::Completada));
        assert_eq!(StageStatus::from_db_str("???"), None);
    }

    #[test]
    fn test_process_stage_order_and_next() {
        assert!(ProcessStage::Reporte < ProcessStage::Cierre);
        assert_eq!(ProcessStage::Reporte.next(), Some(ProcessStage::Investigacion));
        assert_eq!(ProcessStage::Cierre.next(), None);
    }

    #[test]
    fn test_process_stage_accent_insensitive() {
        assert_eq!(
            "Investigación".parse::<ProcessStage>(),
            Ok(ProcessStage::Investigacion)
        );
        assert!("mediacion".parse::<ProcessStage>().is_err());
    }

    #[test]
    fn test_stage_status_serde() {
        let json = serde_json::to_string(&StageStatus::EnCurso).unwrap();
        assert_eq!(json, "\"en_curso\"");
    }
}
