//! Row mapping
//!
//! Store rows are loosely shaped: columns were renamed over the years,
//! embedded relations arrive as an object, a one-element array or null, and
//! dates come as plain dates or full timestamps. Everything here is lenient
//! about optional columns and strict only about identity.

use casebook_core::{
    canonical_name, Case, CaseId, CasePatch, CaseStatus, CasebookError, CasebookResult,
    CatalogEntry, Followup, FollowupId, NameSource, NewCase, NewFollowup, ProcessStage,
    StageStatus, Student, StudentId, TenantId, Timestamp,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Map, Value};

/// Case columns including the embedded student.
pub const CASE_COLUMNS: &str = "*, students(*)";

/// Collapse an embedded relation to an object, a bare string or null.
pub fn normalize_relation(value: Value) -> Value {
    match value {
        Value::Array(items) => items
            .into_iter()
            .next()
            .map(normalize_relation)
            .unwrap_or(Value::Null),
        Value::Object(_) | Value::String(_) => value,
        _ => Value::Null,
    }
}

// ============================================================================
// FIELD HELPERS
// ============================================================================

fn text(row: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn date(row: &Value, keys: &[&str]) -> Option<NaiveDate> {
    let raw = text(row, keys)?;
    // timestamps carry the date in their first ten characters
    let prefix = raw.get(..10).unwrap_or(raw.as_str());
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok()
}

fn timestamp(row: &Value, keys: &[&str]) -> Option<Timestamp> {
    let raw = text(row, keys)?;
    DateTime::parse_from_rfc3339(&raw)
        .or_else(|_| DateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f%#z"))
        .map(|t| t.with_timezone(&Utc))
        .ok()
}

fn flag(row: &Value, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|key| match row.get(*key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "t" | "1" | "si" | "sí" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|n| n != 0),
        _ => None,
    })
}

fn required(row: &Value, entity: &str, keys: &[&str]) -> CasebookResult<String> {
    text(row, keys).ok_or_else(|| {
        let field = keys.first().copied().unwrap_or("field");
        CasebookError::decode(entity, format!("missing {}", field))
    })
}

// ============================================================================
// DECODING
// ============================================================================

/// Decode a case row, including its embedded student when present.
pub fn case_from_row(row: &Value) -> CasebookResult<Case> {
    if !row.is_object() {
        return Err(CasebookError::decode("case", "row is not an object"));
    }

    let mut case = Case::new(
        CaseId::new(required(row, "case", &["id"])?),
        text(row, &["tenant_id"]).map(TenantId::from),
    );
    case.status = text(row, &["status", "estado"])
        .map(|s| CaseStatus::from_db_str(&s))
        .unwrap_or_default();
    case.incident_date = date(row, &["incident_date", "fecha_incidente"]);
    case.incident_time = text(row, &["incident_time", "hora_incidente"]);
    case.course = text(row, &["course", "curso"]);
    case.conduct_type = text(row, &["conduct_type", "tipo_conducta"]);
    case.conduct_category = text(row, &["conduct_category", "categoria_conducta"]);
    case.description = text(row, &["description", "descripcion"]);
    case.student_id = text(row, &["student_id", "estudiante_id"]).map(StudentId::from);
    case.created_at = timestamp(row, &["created_at"]);
    case.closed_at = timestamp(row, &["closed_at", "fecha_cierre"]);
    case.closed_by = text(row, &["closed_by", "cerrado_por"]);

    let relation = row
        .get("students")
        .cloned()
        .map(normalize_relation)
        .unwrap_or(Value::Null);
    case.student = student_from_value(&relation, case.student_id.as_ref());

    Ok(case)
}

/// Decode an embedded student. A bare-string relation is the student's name
/// and needs `fallback_id` to be usable. An object relation is always kept,
/// with a blank id when it names none, so its tenant is still checked.
pub fn student_from_value(value: &Value, fallback_id: Option<&StudentId>) -> Option<Student> {
    let source = NameSource::from_value(value)?;
    let name = canonical_name(source);

    let (id, tenant_id, course) = match value {
        Value::Object(_) => (
            text(value, &["id"])
                .map(StudentId::from)
                .or_else(|| fallback_id.cloned())
                .unwrap_or_else(|| StudentId::new("")),
            text(value, &["tenant_id"]).map(TenantId::from),
            text(value, &["course", "curso"]),
        ),
        _ => (fallback_id.cloned()?, None, None),
    };

    Some(Student {
        id,
        tenant_id,
        full_name: name.as_ref().map(|n| n.full_name.clone()),
        given_names: name.as_ref().and_then(|n| n.given_names.clone()),
        surnames: name.and_then(|n| n.surnames),
        course,
    })
}

pub fn followup_from_row(row: &Value) -> CasebookResult<Followup> {
    const ENTITY: &str = "followup";

    let stage_raw = required(row, ENTITY, &["process_stage", "etapa_proceso"])?;
    let process_stage = ProcessStage::from_db_str(&stage_raw)
        .map_err(|e| CasebookError::decode(ENTITY, e.to_string()))?;

    let action_date = date(row, &["action_date", "fecha"])
        .or_else(|| timestamp(row, &["created_at"]).map(|t| t.date_naive()))
        .ok_or_else(|| CasebookError::decode(ENTITY, "missing action_date"))?;

    Ok(Followup {
        id: FollowupId::new(required(row, ENTITY, &["id"])?),
        case_id: CaseId::new(required(row, ENTITY, &["case_id", "caso_id"])?),
        tenant_id: text(row, &["tenant_id"]).map(TenantId::from),
        action_date,
        action_type: text(row, &["action_type", "tipo_accion"]).unwrap_or_default(),
        process_stage,
        stage_status: text(row, &["stage_status", "estado_etapa"])
            .and_then(|s| StageStatus::from_db_str(&s))
            .unwrap_or_default(),
        detail: text(row, &["detail", "detalle"]),
        observations: text(row, &["observations", "observaciones"]),
        responsible: text(row, &["responsible", "responsable"]),
        created_at: timestamp(row, &["created_at"]),
    })
}

pub fn catalog_entry_from_row(row: &Value) -> CasebookResult<CatalogEntry> {
    const ENTITY: &str = "catalog entry";

    let code = required(row, ENTITY, &["code", "codigo", "value"])?;
    Ok(CatalogEntry {
        label: text(row, &["label", "nombre", "name"]).unwrap_or_else(|| code.clone()),
        code,
        category: text(row, &["category", "categoria"]),
        active: flag(row, &["active", "activo"]).unwrap_or(true),
    })
}

/// Decode every row, skipping and logging the ones that fail.
pub fn decode_rows<T>(
    rows: Vec<Value>,
    entity: &str,
    decode: impl Fn(&Value) -> CasebookResult<T>,
) -> Vec<T> {
    rows.iter()
        .filter_map(|row| match decode(row) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(
                    entity,
                    row_id = row.get("id").map(|v| v.to_string()).unwrap_or_default(),
                    error = %e,
                    "Skipping undecodable row"
                );
                None
            }
        })
        .collect()
}

// ============================================================================
// ENCODING
// ============================================================================

/// Insert row for a new case.
pub fn new_case_row(id: &CaseId, payload: &NewCase, tenant_id: Option<&TenantId>) -> Value {
    json!({
        "id": id,
        "tenant_id": tenant_id,
        "status": payload.status.clone().unwrap_or_default(),
        "incident_date": payload.incident_date,
        "incident_time": payload.incident_time,
        "course": payload.course,
        "conduct_type": payload.conduct_type,
        "conduct_category": payload.conduct_category,
        "description": payload.description,
        "student_id": payload.student_id,
    })
}

/// Insert row for a new follow-up; `stage` has already been validated.
pub fn new_followup_row(
    id: &FollowupId,
    case_id: &CaseId,
    stage: ProcessStage,
    payload: &NewFollowup,
    tenant_id: Option<&TenantId>,
    today: NaiveDate,
) -> Value {
    json!({
        "id": id,
        "case_id": case_id,
        "tenant_id": tenant_id,
        "process_stage": stage.as_db_str(),
        "action_date": payload.action_date.unwrap_or(today),
        "action_type": payload.action_type.clone().unwrap_or_default(),
        "stage_status": payload.stage_status.unwrap_or_default().as_db_str(),
        "detail": payload.detail,
        "observations": payload.observations,
        "responsible": payload.responsible,
    })
}

/// Update body for a patch; only set fields are present.
pub fn case_patch_row(patch: &CasePatch) -> CasebookResult<Value> {
    serde_json::to_value(patch).map_err(|e| CasebookError::decode("case patch", e.to_string()))
}

/// Update body closing a case.
pub fn close_case_row(closed_by: Option<&str>, now: Timestamp) -> Value {
    let mut body = Map::new();
    body.insert("status".to_string(), json!(CaseStatus::Closed));
    body.insert("closed_at".to_string(), json!(now.to_rfc3339()));
    body.insert("closed_by".to_string(), json!(closed_by));
    Value::Object(body)
}
