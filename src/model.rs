use crate::conflict::EngineError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassType {
    #[serde(rename = "lecture")]
    Lecture,
    #[serde(rename = "practical")]
    Practical,
    #[serde(rename = "tutorial")]
    Tutorial,
}

impl ClassType {
    pub fn parse(raw: &str) -> Option<ClassType> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lecture" => Some(ClassType::Lecture),
            "practical" => Some(ClassType::Practical),
            "tutorial" => Some(ClassType::Tutorial),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClassType::Lecture => "lecture",
            ClassType::Practical => "practical",
            ClassType::Tutorial => "tutorial",
        }
    }
}

/// Split-class group tag. A and B pair up, C and D pair up; ALL marks a
/// whole-class entry and never shares a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabGroup {
    A,
    B,
    C,
    D,
    #[serde(rename = "ALL")]
    All,
}

impl LabGroup {
    pub fn parse(raw: &str) -> Option<LabGroup> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "A" => Some(LabGroup::A),
            "B" => Some(LabGroup::B),
            "C" => Some(LabGroup::C),
            "D" => Some(LabGroup::D),
            "ALL" => Some(LabGroup::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LabGroup::A => "A",
            LabGroup::B => "B",
            LabGroup::C => "C",
            LabGroup::D => "D",
            LabGroup::All => "ALL",
        }
    }

    pub fn complement(&self) -> Option<LabGroup> {
        match self {
            LabGroup::A => Some(LabGroup::B),
            LabGroup::B => Some(LabGroup::A),
            LabGroup::C => Some(LabGroup::D),
            LabGroup::D => Some(LabGroup::C),
            LabGroup::All => None,
        }
    }

    /// Display order inside a shared cell: A/C rows first, B/D second,
    /// ALL always last.
    pub fn pair_rank(&self) -> u8 {
        match self {
            LabGroup::A | LabGroup::C => 0,
            LabGroup::B | LabGroup::D => 1,
            LabGroup::All => 2,
        }
    }
}

/// One academic scope: a section of a program's semester. Codes are folded
/// to upper case so `bct` and `BCT` cannot address two different routines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey {
    pub program_code: String,
    pub semester: i64,
    pub section: String,
}

impl ScopeKey {
    pub fn parse(params: &JsonValue) -> Result<ScopeKey, EngineError> {
        let program_code = params
            .get("programCode")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::bad_params("missing programCode"))?;
        let semester = match params.get("semester") {
            Some(JsonValue::Number(n)) => n.as_i64(),
            Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
        .filter(|s| *s >= 1)
        .ok_or_else(|| EngineError::bad_params("missing/invalid semester"))?;
        let section = params
            .get("section")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngineError::bad_params("missing section"))?;
        Ok(ScopeKey {
            program_code,
            semester,
            section,
        })
    }

    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.program_code, self.semester, self.section)
    }

    pub fn view(&self) -> JsonValue {
        json!({
            "programCode": self.program_code,
            "semester": self.semester,
            "section": self.section,
        })
    }
}

/// Second-week overrides for an alternating-week entry. Unset fields
/// inherit the base payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternateGroup {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lab_group: Option<LabGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub teacher_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AlternateGroup {
    fn parse(v: &JsonValue) -> Result<AlternateGroup, EngineError> {
        let Some(obj) = v.as_object() else {
            return Err(EngineError::bad_params("alternateGroup must be an object"));
        };
        let lab_group = match obj.get("labGroup").and_then(|v| v.as_str()) {
            Some(raw) => Some(
                LabGroup::parse(raw)
                    .ok_or_else(|| EngineError::bad_params("alternateGroup.labGroup must be A, B, C, D or ALL"))?,
            ),
            None => None,
        };
        let subject_id = opt_trimmed(obj.get("subjectId"));
        let teacher_ids = match obj.get("teacherIds") {
            Some(v) => {
                let ids = parse_teacher_ids(Some(v))?;
                Some(ids)
            }
            None => None,
        };
        let room_id = opt_trimmed(obj.get("roomId"));
        let notes = opt_trimmed(obj.get("notes"));
        if lab_group.is_none()
            && subject_id.is_none()
            && teacher_ids.is_none()
            && room_id.is_none()
            && notes.is_none()
        {
            return Err(EngineError::bad_params("alternateGroup must override at least one field"));
        }
        Ok(AlternateGroup {
            lab_group,
            subject_id,
            teacher_ids,
            room_id,
            notes,
        })
    }
}

fn opt_trimmed(v: Option<&JsonValue>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn parse_teacher_ids(v: Option<&JsonValue>) -> Result<Vec<String>, EngineError> {
    let Some(arr) = v.and_then(|v| v.as_array()) else {
        return Err(EngineError::bad_params("teacherIds must be a non-empty array"));
    };
    let mut out: Vec<String> = Vec::with_capacity(arr.len());
    for item in arr {
        let Some(id) = item.as_str().map(str::trim).filter(|s| !s.is_empty()) else {
            return Err(EngineError::bad_params("teacherIds must contain non-empty strings"));
        };
        if !out.iter().any(|t| t == id) {
            out.push(id.to_string());
        }
    }
    if out.is_empty() {
        return Err(EngineError::bad_params("teacherIds must not be empty"));
    }
    Ok(out)
}

/// The class description submitted with an assignment. Shared by every row
/// of a spanned or elective unit.
#[derive(Debug, Clone)]
pub struct ClassPayload {
    pub subject_id: String,
    pub class_type: ClassType,
    pub teacher_ids: Vec<String>,
    pub room_id: String,
    pub notes: Option<String>,
    pub lab_group: Option<LabGroup>,
    pub alternative_week: bool,
    pub alternate_group: Option<AlternateGroup>,
}

impl ClassPayload {
    pub fn parse(v: Option<&JsonValue>) -> Result<ClassPayload, EngineError> {
        let Some(payload) = v.filter(|v| v.is_object()) else {
            return Err(EngineError::bad_params("missing payload"));
        };
        let subject_id = opt_trimmed(payload.get("subjectId"))
            .ok_or_else(|| EngineError::bad_params("missing payload.subjectId"))?;
        let class_type = payload
            .get("classType")
            .and_then(|v| v.as_str())
            .and_then(ClassType::parse)
            .ok_or_else(|| {
                EngineError::bad_params("payload.classType must be lecture, practical or tutorial")
            })?;
        let teacher_ids = parse_teacher_ids(payload.get("teacherIds"))?;
        let room_id = opt_trimmed(payload.get("roomId"))
            .ok_or_else(|| EngineError::bad_params("missing payload.roomId"))?;
        let notes = opt_trimmed(payload.get("notes"));
        let lab_group = match payload.get("labGroup").and_then(|v| v.as_str()) {
            Some(raw) => Some(
                LabGroup::parse(raw)
                    .ok_or_else(|| EngineError::bad_params("payload.labGroup must be A, B, C, D or ALL"))?,
            ),
            None => None,
        };
        let alternative_week = payload
            .get("alternativeWeek")
            .map(|v| v.as_bool().ok_or_else(|| EngineError::bad_params("payload.alternativeWeek must be boolean")))
            .transpose()?
            .unwrap_or(false);
        let alternate_group = match payload.get("alternateGroup") {
            Some(v) if !v.is_null() => Some(AlternateGroup::parse(v)?),
            _ => None,
        };
        if alternative_week && alternate_group.is_none() {
            return Err(EngineError::bad_params(
                "alternativeWeek requires payload.alternateGroup",
            ));
        }
        if !alternative_week && alternate_group.is_some() {
            return Err(EngineError::bad_params(
                "payload.alternateGroup requires alternativeWeek=true",
            ));
        }
        Ok(ClassPayload {
            subject_id,
            class_type,
            teacher_ids,
            room_id,
            notes,
            lab_group,
            alternative_week,
            alternate_group,
        })
    }

    /// Teachers the class keeps busy, both weeks for alternating entries.
    pub fn claim_teachers(&self) -> Vec<String> {
        let mut out = self.teacher_ids.clone();
        if let Some(ag) = &self.alternate_group {
            for id in ag.teacher_ids.as_deref().unwrap_or(&self.teacher_ids) {
                if !out.iter().any(|t| t == id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    pub fn claim_rooms(&self) -> Vec<String> {
        let mut out = vec![self.room_id.clone()];
        if let Some(room) = self
            .alternate_group
            .as_ref()
            .and_then(|ag| ag.room_id.clone())
        {
            if !out.contains(&room) {
                out.push(room);
            }
        }
        out
    }
}

/// One committed schedule row.
#[derive(Debug, Clone)]
pub struct RoutineEntry {
    pub id: String,
    pub program_code: String,
    pub semester: i64,
    pub section: String,
    pub day_index: i64,
    pub slot_key: String,
    pub subject_id: String,
    pub class_type: ClassType,
    pub teacher_ids: Vec<String>,
    pub room_id: String,
    pub notes: Option<String>,
    pub lab_group: Option<LabGroup>,
    pub span_id: Option<String>,
    pub span_master: bool,
    pub alternative_week: bool,
    pub alternate_group: Option<AlternateGroup>,
    pub elective_class: bool,
    pub elective_group_id: Option<String>,
    pub cross_section: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// Column list matching `RoutineEntry::from_row`. Keep the two in sync.
pub const ENTRY_COLUMNS: &str = "id, program_code, semester, section, day_index, slot_key, \
     subject_id, class_type, teacher_ids_json, room_id, notes, lab_group, \
     span_id, span_master, alternative_week, alternate_group_json, \
     elective_class, elective_group_id, cross_section, created_at, updated_at";

impl RoutineEntry {
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RoutineEntry> {
        let class_type_raw: String = row.get(7)?;
        let class_type = ClassType::parse(&class_type_raw).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                7,
                rusqlite::types::Type::Text,
                format!("unknown class type: {}", class_type_raw).into(),
            )
        })?;
        let teacher_ids_json: String = row.get(8)?;
        let teacher_ids: Vec<String> =
            serde_json::from_str(&teacher_ids_json).unwrap_or_default();
        let lab_group = row
            .get::<_, Option<String>>(11)?
            .as_deref()
            .and_then(LabGroup::parse);
        let alternate_group = row
            .get::<_, Option<String>>(15)?
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Ok(RoutineEntry {
            id: row.get(0)?,
            program_code: row.get(1)?,
            semester: row.get(2)?,
            section: row.get(3)?,
            day_index: row.get(4)?,
            slot_key: row.get(5)?,
            subject_id: row.get(6)?,
            class_type,
            teacher_ids,
            room_id: row.get(9)?,
            notes: row.get(10)?,
            lab_group,
            span_id: row.get(12)?,
            span_master: row.get::<_, i64>(13)? != 0,
            alternative_week: row.get::<_, i64>(14)? != 0,
            alternate_group,
            elective_class: row.get::<_, i64>(16)? != 0,
            elective_group_id: row.get(17)?,
            cross_section: row.get::<_, i64>(18)? != 0,
            created_at: row.get(19)?,
            updated_at: row.get(20)?,
        })
    }

    pub fn scope(&self) -> ScopeKey {
        ScopeKey {
            program_code: self.program_code.clone(),
            semester: self.semester,
            section: self.section.clone(),
        }
    }

    /// The unit correlation key this row's claims are filed under.
    pub fn claim_group(&self) -> &str {
        if let Some(span_id) = self.span_id.as_deref() {
            span_id
        } else if let Some(gid) = self.elective_group_id.as_deref() {
            gid
        } else {
            &self.id
        }
    }

    /// Every teacher this row keeps busy at its slot, including the
    /// alternate week's group.
    pub fn claim_teachers(&self) -> Vec<String> {
        let mut out = self.teacher_ids.clone();
        if let Some(ag) = &self.alternate_group {
            for id in ag.teacher_ids.as_deref().unwrap_or(&self.teacher_ids) {
                if !out.iter().any(|t| t == id) {
                    out.push(id.clone());
                }
            }
        }
        out
    }

    /// Every room this row occupies at its slot (base plus alternate week).
    pub fn claim_rooms(&self) -> Vec<String> {
        let mut out = vec![self.room_id.clone()];
        if let Some(room) = self
            .alternate_group
            .as_ref()
            .and_then(|ag| ag.room_id.clone())
        {
            if !out.contains(&room) {
                out.push(room);
            }
        }
        out
    }

    pub fn view(&self) -> JsonValue {
        json!({
            "id": self.id,
            "programCode": self.program_code,
            "semester": self.semester,
            "section": self.section,
            "dayIndex": self.day_index,
            "slotId": self.slot_key,
            "subjectId": self.subject_id,
            "classType": self.class_type.as_str(),
            "teacherIds": self.teacher_ids,
            "roomId": self.room_id,
            "notes": self.notes,
            "labGroup": self.lab_group.map(|g| g.as_str()),
            "spanId": self.span_id,
            "spanMaster": self.span_master,
            "alternativeWeek": self.alternative_week,
            "alternateGroup": self.alternate_group.as_ref()
                .and_then(|ag| serde_json::to_value(ag).ok()),
            "electiveClass": self.elective_class,
            "electiveGroupId": self.elective_group_id,
            "crossSection": self.cross_section,
            "updatedAt": self.updated_at,
        })
    }

    /// Display view of the alternate week's group with base fields filled
    /// in where the override is silent. `None` for non-alternating rows.
    pub fn alternate_view(&self) -> Option<JsonValue> {
        let ag = self.alternate_group.as_ref()?;
        Some(json!({
            "id": self.id,
            "programCode": self.program_code,
            "semester": self.semester,
            "section": self.section,
            "dayIndex": self.day_index,
            "slotId": self.slot_key,
            "subjectId": ag.subject_id.as_deref().unwrap_or(&self.subject_id),
            "classType": self.class_type.as_str(),
            "teacherIds": ag.teacher_ids.as_ref().unwrap_or(&self.teacher_ids),
            "roomId": ag.room_id.as_deref().unwrap_or(&self.room_id),
            "notes": ag.notes.as_deref().or(self.notes.as_deref()),
            "labGroup": ag.lab_group.or(self.lab_group).map(|g| g.as_str()),
            "spanId": self.span_id,
            "spanMaster": self.span_master,
            "alternativeWeek": true,
            "electiveClass": self.elective_class,
            "electiveGroupId": self.elective_group_id,
            "crossSection": self.cross_section,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_payload() -> JsonValue {
        json!({
            "subjectId": "MATH101",
            "classType": "Lecture",
            "teacherIds": ["T1", "T2", "T1"],
            "roomId": " R1 ",
            "notes": "  "
        })
    }

    #[test]
    fn payload_parse_trims_and_dedupes() {
        let p = ClassPayload::parse(Some(&base_payload())).expect("parse");
        assert_eq!(p.subject_id, "MATH101");
        assert_eq!(p.class_type, ClassType::Lecture);
        assert_eq!(p.teacher_ids, vec!["T1".to_string(), "T2".to_string()]);
        assert_eq!(p.room_id, "R1");
        assert_eq!(p.notes, None);
        assert_eq!(p.lab_group, None);
        assert!(!p.alternative_week);
    }

    #[test]
    fn payload_rejects_empty_teachers() {
        let mut v = base_payload();
        v["teacherIds"] = json!([]);
        let err = ClassPayload::parse(Some(&v)).unwrap_err();
        assert_eq!(err.code, "bad_params");
    }

    #[test]
    fn alternating_requires_both_flags() {
        let mut v = base_payload();
        v["alternativeWeek"] = json!(true);
        assert_eq!(
            ClassPayload::parse(Some(&v)).unwrap_err().code,
            "bad_params"
        );

        let mut v = base_payload();
        v["alternateGroup"] = json!({ "roomId": "R2" });
        assert_eq!(
            ClassPayload::parse(Some(&v)).unwrap_err().code,
            "bad_params"
        );

        let mut v = base_payload();
        v["alternativeWeek"] = json!(true);
        v["alternateGroup"] = json!({ "labGroup": "b", "roomId": "R2" });
        let p = ClassPayload::parse(Some(&v)).expect("parse");
        let ag = p.alternate_group.expect("alternate group");
        assert_eq!(ag.lab_group, Some(LabGroup::B));
        assert_eq!(ag.room_id.as_deref(), Some("R2"));
    }

    #[test]
    fn lab_group_complement_pairs() {
        assert_eq!(LabGroup::A.complement(), Some(LabGroup::B));
        assert_eq!(LabGroup::D.complement(), Some(LabGroup::C));
        assert_eq!(LabGroup::All.complement(), None);
        assert!(LabGroup::A.pair_rank() < LabGroup::B.pair_rank());
        assert!(LabGroup::D.pair_rank() < LabGroup::All.pair_rank());
    }

    #[test]
    fn scope_parse_uppercases_codes() {
        let scope = ScopeKey::parse(&json!({
            "programCode": "bct", "semester": "3", "section": "ab"
        }))
        .expect("scope");
        assert_eq!(scope.program_code, "BCT");
        assert_eq!(scope.semester, 3);
        assert_eq!(scope.section, "AB");
        assert_eq!(scope.label(), "BCT/3/AB");
    }
}
