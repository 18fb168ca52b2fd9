//! In-memory criteria under edit.
//!
//! An `EditBuffer` owns its `SemesterData` outright; nothing it holds is
//! shared with the store or with the resolution it was seeded from. Every
//! mutation returns a new snapshot and leaves the receiver untouched, and
//! every mutation is total: an unknown id is a no-op.

use gradcheck_state::{
    new_id, CriteriaDefaults, CriteriaDigest, Rule, SemesterData, Slot, SlotKind,
};
use serde::{Deserialize, Serialize};

use crate::cascade::Resolution;

/// Optional overrides for `EditBuffer::add_slot`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotDefaults {
    pub title: Option<String>,
    pub tag: Option<String>,
    pub priority: Option<i64>,
    pub course_name: Option<String>,
    pub allowed_courses: Option<Vec<String>>,
    pub min_grade: Option<String>,
}

impl SlotDefaults {
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }
}

/// Fields to merge into an existing slot. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlotPatch {
    pub title: Option<String>,
    pub kind: Option<SlotKind>,
    pub course_name: Option<String>,
    pub min_grade: Option<String>,
    pub allowed_courses: Option<Vec<String>>,
    pub tag: Option<String>,
    pub priority: Option<i64>,
}

impl SlotPatch {
    fn apply(&self, slot: &mut Slot) {
        if let Some(title) = &self.title {
            slot.title = title.clone();
        }
        if let Some(kind) = self.kind {
            slot.kind = kind;
        }
        if let Some(course_name) = &self.course_name {
            slot.course_name = Some(course_name.clone());
        }
        if let Some(min_grade) = &self.min_grade {
            slot.min_grade = Some(min_grade.clone());
        }
        if let Some(allowed) = &self.allowed_courses {
            slot.allowed_courses = Some(allowed.clone());
        }
        if let Some(tag) = &self.tag {
            slot.tag = Some(tag.clone());
        }
        if let Some(priority) = self.priority {
            slot.priority = priority;
        }
    }
}

/// Fields to merge into an existing rule. `None` leaves a field unchanged;
/// condition and effect lists merge individually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RulePatch {
    pub name: Option<String>,
    pub any_passed: Option<Vec<String>>,
    pub all_passed: Option<Vec<String>>,
    pub add_slots: Option<Vec<Slot>>,
    pub waive_slots_by_title: Option<Vec<String>>,
    pub waive_courses: Option<Vec<String>>,
}

impl RulePatch {
    fn apply(&self, rule: &mut Rule) {
        if let Some(name) = &self.name {
            rule.name = name.clone();
        }
        if let Some(list) = &self.any_passed {
            rule.when.any_passed = Some(list.clone());
        }
        if let Some(list) = &self.all_passed {
            rule.when.all_passed = Some(list.clone());
        }
        if let Some(slots) = &self.add_slots {
            rule.then.add_slots = Some(slots.clone());
        }
        if let Some(list) = &self.waive_slots_by_title {
            rule.then.waive_slots_by_title = Some(list.clone());
        }
        if let Some(list) = &self.waive_courses {
            rule.then.waive_courses = Some(list.clone());
        }
    }
}

/// Criteria being edited for one semester key.
#[derive(Debug, Clone, PartialEq)]
pub struct EditBuffer {
    data: SemesterData,
    baseline: CriteriaDigest,
    defaults: CriteriaDefaults,
}

impl EditBuffer {
    /// A buffer whose baseline is `data` itself (nothing unsaved).
    pub fn new(data: SemesterData, defaults: CriteriaDefaults) -> Self {
        let baseline = data.digest();
        Self {
            data,
            baseline,
            defaults,
        }
    }

    /// Seed from a resolution. Prefilled and empty results start dirty
    /// relative to what is stored under the target key, which is nothing.
    pub fn from_resolution(resolution: &Resolution, defaults: CriteriaDefaults) -> Self {
        let baseline = if resolution.is_prefill() {
            SemesterData::default().digest()
        } else {
            resolution.data.digest()
        };
        Self {
            data: resolution.data.clone(),
            baseline,
            defaults,
        }
    }

    pub fn data(&self) -> &SemesterData {
        &self.data
    }

    pub fn into_data(self) -> SemesterData {
        self.data
    }

    pub fn defaults(&self) -> &CriteriaDefaults {
        &self.defaults
    }

    /// True when the data differs from what was last loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.data.digest() != self.baseline
    }

    /// Record that the data with `digest` is now what the store holds.
    #[must_use]
    pub fn mark_saved(&self, digest: &CriteriaDigest) -> Self {
        Self {
            baseline: digest.clone(),
            ..self.clone()
        }
    }

    /// Slots ordered by priority (lowest first), ties in list order.
    pub fn sorted_slots(&self) -> Vec<&Slot> {
        let mut slots: Vec<&Slot> = self.data.slots.iter().collect();
        slots.sort_by_key(|s| s.priority);
        slots
    }

    fn with_data(&self, data: SemesterData) -> Self {
        Self {
            data,
            baseline: self.baseline.clone(),
            defaults: self.defaults.clone(),
        }
    }

    /// Append a new slot of `kind` with a fresh id.
    ///
    /// Electives are titled `"<tag> #<n>"`, where `n` counts existing slots
    /// with the same tag, starting at 1.
    #[must_use]
    pub fn add_slot(&self, kind: SlotKind, overrides: SlotDefaults) -> Self {
        let defaults = &self.defaults;
        let min_grade = overrides
            .min_grade
            .unwrap_or_else(|| defaults.pass_grade.clone());

        let slot = match kind {
            SlotKind::Required => Slot {
                id: new_id(),
                title: overrides.title.unwrap_or_default(),
                kind,
                course_name: Some(overrides.course_name.unwrap_or_default()),
                min_grade: Some(min_grade),
                allowed_courses: overrides.allowed_courses,
                tag: overrides.tag,
                priority: overrides.priority.unwrap_or(defaults.required_priority),
            },
            SlotKind::Elective => {
                let tag = overrides
                    .tag
                    .unwrap_or_else(|| defaults.elective_tag.clone());
                let ordinal = self
                    .data
                    .slots
                    .iter()
                    .filter(|s| s.tag.as_deref() == Some(tag.as_str()))
                    .count()
                    + 1;
                Slot {
                    id: new_id(),
                    title: overrides
                        .title
                        .unwrap_or_else(|| format!("{} #{}", tag, ordinal)),
                    kind,
                    course_name: overrides.course_name,
                    min_grade: Some(min_grade),
                    allowed_courses: Some(overrides.allowed_courses.unwrap_or_default()),
                    tag: Some(tag),
                    priority: overrides.priority.unwrap_or(defaults.elective_priority),
                }
            }
        };

        let mut data = self.data.clone();
        data.slots.push(slot);
        self.with_data(data)
    }

    /// Merge `patch` into the slot with `id`; no-op if there is none.
    #[must_use]
    pub fn update_slot(&self, id: &str, patch: &SlotPatch) -> Self {
        let mut data = self.data.clone();
        if let Some(slot) = data.slots.iter_mut().find(|s| s.id == id) {
            patch.apply(slot);
        }
        self.with_data(data)
    }

    #[must_use]
    pub fn remove_slot(&self, id: &str) -> Self {
        let mut data = self.data.clone();
        data.slots.retain(|s| s.id != id);
        self.with_data(data)
    }

    /// Append a rule with a fresh id and empty condition and effect.
    #[must_use]
    pub fn add_rule(&self) -> Self {
        let mut data = self.data.clone();
        data.rules.push(Rule::empty());
        self.with_data(data)
    }

    /// Merge `patch` into the rule with `id`; no-op if there is none.
    #[must_use]
    pub fn update_rule(&self, id: &str, patch: &RulePatch) -> Self {
        let mut data = self.data.clone();
        if let Some(rule) = data.rules.iter_mut().find(|r| r.id == id) {
            patch.apply(rule);
        }
        self.with_data(data)
    }

    #[must_use]
    pub fn remove_rule(&self, id: &str) -> Self {
        let mut data = self.data.clone();
        data.rules.retain(|r| r.id != id);
        self.with_data(data)
    }

    #[must_use]
    pub fn set_checkpoint_label(&self, label: Option<String>) -> Self {
        let mut data = self.data.clone();
        data.checkpoint_label = label.filter(|l| !l.trim().is_empty());
        self.with_data(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> CriteriaDefaults {
        CriteriaDefaults {
            pass_grade: "D".to_string(),
            required_priority: 0,
            elective_priority: 50,
            elective_tag: "Elective".to_string(),
        }
    }

    fn empty() -> EditBuffer {
        EditBuffer::new(SemesterData::default(), defaults())
    }

    #[test]
    fn add_required_slot_uses_defaults() {
        let buffer = empty().add_slot(SlotKind::Required, SlotDefaults::default());
        let slot = &buffer.data().slots[0];
        assert_eq!(slot.kind, SlotKind::Required);
        assert_eq!(slot.title, "");
        assert_eq!(slot.course_name.as_deref(), Some(""));
        assert_eq!(slot.min_grade.as_deref(), Some("D"));
        assert_eq!(slot.priority, 0);
        assert!(!slot.id.is_empty());
    }

    #[test]
    fn elective_titles_count_same_tag() {
        let buffer = empty()
            .add_slot(SlotKind::Elective, SlotDefaults::default())
            .add_slot(SlotKind::Elective, SlotDefaults::tagged("Major Elective"))
            .add_slot(SlotKind::Elective, SlotDefaults::default());
        let titles: Vec<&str> = buffer.data().slots.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Elective #1", "Major Elective #1", "Elective #2"]);
        assert_eq!(buffer.data().slots[0].priority, 50);
        assert_eq!(
            buffer.data().slots[0].allowed_courses.as_deref(),
            Some(&[][..])
        );
    }

    #[test]
    fn explicit_title_and_priority_win() {
        let buffer = empty().add_slot(
            SlotKind::Elective,
            SlotDefaults {
                title: Some("Humanities".to_string()),
                priority: Some(10),
                ..SlotDefaults::default()
            },
        );
        assert_eq!(buffer.data().slots[0].title, "Humanities");
        assert_eq!(buffer.data().slots[0].priority, 10);
    }

    #[test]
    fn mutations_leave_receiver_untouched() {
        let base = empty().add_slot(SlotKind::Required, SlotDefaults::default());
        let id = base.data().slots[0].id.clone();

        let removed = base.remove_slot(&id);
        assert!(removed.data().slots.is_empty());
        assert_eq!(base.data().slots.len(), 1);

        let renamed = base.update_slot(
            &id,
            &SlotPatch {
                title: Some("Calculus".to_string()),
                ..SlotPatch::default()
            },
        );
        assert_eq!(renamed.data().slots[0].title, "Calculus");
        assert_eq!(base.data().slots[0].title, "");
    }

    #[test]
    fn update_merges_only_present_fields() {
        let base = empty().add_slot(
            SlotKind::Required,
            SlotDefaults {
                course_name: Some("CS101".to_string()),
                ..SlotDefaults::default()
            },
        );
        let id = base.data().slots[0].id.clone();
        let updated = base.update_slot(
            &id,
            &SlotPatch {
                kind: Some(SlotKind::Elective),
                allowed_courses: Some(vec!["CS201".to_string()]),
                ..SlotPatch::default()
            },
        );
        let slot = &updated.data().slots[0];
        assert_eq!(slot.kind, SlotKind::Elective);
        assert_eq!(slot.course_name.as_deref(), Some("CS101"));
        assert_eq!(slot.id, id);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let base = empty()
            .add_slot(SlotKind::Required, SlotDefaults::default())
            .add_rule();
        let patch = SlotPatch {
            title: Some("x".to_string()),
            ..SlotPatch::default()
        };
        assert_eq!(base.update_slot("missing", &patch), base);
        assert_eq!(base.remove_slot("missing"), base);
        assert_eq!(
            base.update_rule(
                "missing",
                &RulePatch {
                    name: Some("x".to_string()),
                    ..RulePatch::default()
                }
            ),
            base
        );
        assert_eq!(base.remove_rule("missing"), base);
    }

    #[test]
    fn rule_patch_merges_condition_lists_individually() {
        let base = empty().add_rule();
        let id = base.data().rules[0].id.clone();
        let step1 = base.update_rule(
            &id,
            &RulePatch {
                any_passed: Some(vec!["CS100".to_string()]),
                ..RulePatch::default()
            },
        );
        let step2 = step1.update_rule(
            &id,
            &RulePatch {
                waive_courses: Some(vec!["CS101".to_string()]),
                ..RulePatch::default()
            },
        );
        let rule = &step2.data().rules[0];
        assert_eq!(rule.when.any_passed.as_deref(), Some(&["CS100".to_string()][..]));
        assert_eq!(rule.then.waive_courses.as_deref(), Some(&["CS101".to_string()][..]));
        assert!(rule.when.all_passed.is_none());
    }

    #[test]
    fn dirty_tracking_follows_baseline() {
        let base = empty();
        assert!(!base.is_dirty());
        let edited = base.add_rule();
        assert!(edited.is_dirty());
        let saved = edited.mark_saved(&edited.data().digest());
        assert!(!saved.is_dirty());
    }

    #[test]
    fn sorted_slots_orders_by_priority_stably() {
        let buffer = empty()
            .add_slot(SlotKind::Elective, SlotDefaults::default())
            .add_slot(SlotKind::Required, SlotDefaults::tagged("a"))
            .add_slot(SlotKind::Required, SlotDefaults::tagged("b"));
        let tags: Vec<Option<&str>> = buffer
            .sorted_slots()
            .iter()
            .map(|s| s.tag.as_deref())
            .collect();
        assert_eq!(tags, vec![Some("a"), Some("b"), Some("Elective")]);
    }

    #[test]
    fn blank_checkpoint_label_clears() {
        let buffer = empty().set_checkpoint_label(Some("Year 2".to_string()));
        assert_eq!(buffer.data().checkpoint_label.as_deref(), Some("Year 2"));
        let cleared = buffer.set_checkpoint_label(Some("  ".to_string()));
        assert!(cleared.data().checkpoint_label.is_none());
    }
}
