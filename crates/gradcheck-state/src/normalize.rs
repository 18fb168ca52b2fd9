//! Tolerant decoding of criteria payloads returned by the store.
//!
//! The store may hand back partial or hand-edited documents. Nothing here
//! fails: anything unusable is dropped or replaced by its default, and every
//! slot and rule leaves with a unique id.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::schema::{
    new_id, AuditOutcome, Rule, RuleCondition, RuleEffect, SemesterData, Slot, SlotKind,
};

/// Normalize an arbitrary decoded payload into a `SemesterData`.
pub fn normalize_semester_data(value: &Value) -> SemesterData {
    let Some(obj) = value.as_object() else {
        return SemesterData::default();
    };

    SemesterData {
        slots: normalize_slots(obj.get("slots")),
        rules: normalize_rules(obj.get("rules")),
        checkpoint_label: obj
            .get("checkpointLabel")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Normalize a slot list. Non-object entries are dropped; missing or
/// repeated ids are replaced with fresh ones.
pub fn normalize_slots(value: Option<&Value>) -> Vec<Slot> {
    let mut seen = HashSet::new();
    objects(value)
        .map(|obj| {
            let mut slot = normalize_slot(obj);
            if !seen.insert(slot.id.clone()) {
                slot.id = new_id();
                seen.insert(slot.id.clone());
            }
            slot
        })
        .collect()
}

fn normalize_rules(value: Option<&Value>) -> Vec<Rule> {
    let mut seen = HashSet::new();
    objects(value)
        .map(|obj| {
            let mut rule = normalize_rule(obj);
            if !seen.insert(rule.id.clone()) {
                rule.id = new_id();
                seen.insert(rule.id.clone());
            }
            rule
        })
        .collect()
}

fn normalize_slot(obj: &Map<String, Value>) -> Slot {
    let allowed_courses = string_list(obj.get("allowedCourses"));
    let kind = match obj.get("kind").and_then(Value::as_str) {
        Some("required") => SlotKind::Required,
        Some("elective") => SlotKind::Elective,
        _ if allowed_courses.is_some() => SlotKind::Elective,
        _ => SlotKind::Required,
    };

    Slot {
        id: id_or_fresh(obj),
        title: string_field(obj, "title").unwrap_or_default(),
        kind,
        course_name: string_field(obj, "courseName"),
        min_grade: string_field(obj, "minGrade"),
        allowed_courses,
        tag: string_field(obj, "tag"),
        priority: obj
            .get("priority")
            .and_then(Value::as_i64)
            .unwrap_or_else(|| kind.default_priority()),
    }
}

fn normalize_rule(obj: &Map<String, Value>) -> Rule {
    let when = obj.get("when").and_then(Value::as_object);
    let then = obj.get("then").and_then(Value::as_object);

    Rule {
        id: id_or_fresh(obj),
        name: string_field(obj, "name").unwrap_or_default(),
        when: RuleCondition {
            any_passed: when.and_then(|w| string_list(w.get("anyPassed"))),
            all_passed: when.and_then(|w| string_list(w.get("allPassed"))),
        },
        then: RuleEffect {
            add_slots: then
                .and_then(|t| t.get("addSlots"))
                .filter(|v| v.is_array())
                .map(|v| normalize_slots(Some(v))),
            waive_slots_by_title: then.and_then(|t| string_list(t.get("waiveSlotsByTitle"))),
            waive_courses: then.and_then(|t| string_list(t.get("waiveCourses"))),
        },
    }
}

/// Normalize an audit service response.
///
/// Accepts a bare array or an object with a `results` array; entries that do
/// not decode as an outcome are dropped.
pub fn normalize_audit_outcomes(value: &Value) -> Vec<AuditOutcome> {
    let items = match value {
        Value::Array(items) => items.as_slice(),
        Value::Object(obj) => match obj.get("results") {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        },
        _ => &[],
    };

    items
        .iter()
        .filter_map(|item| serde_json::from_value(item.clone()).ok())
        .collect()
}

fn objects(value: Option<&Value>) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn id_or_fresh(obj: &Map<String, Value>) -> String {
    match obj.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => new_id(),
    }
}

fn string_field(obj: &Map<String, Value>, field: &str) -> Option<String> {
    obj.get(field).and_then(Value::as_str).map(str::to_string)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    value.and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}
