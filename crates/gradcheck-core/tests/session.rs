//! Editing session behaviour: stale resolutions, saves, hints.

use std::sync::Arc;
use std::time::Duration;

use gradcheck_core::{
    Applied, CascadeConfig, CascadeResolver, CriteriaSession, ResolutionSource, ResolveError,
    SaveQueue, Selection, SessionError, SlotDefaults, SAVED_ADVISORY,
};
use gradcheck_state::fakes::MemoryCriteriaStore;
use gradcheck_state::{
    CriteriaDefaults, CriteriaStore, Semester, SemesterData, SemesterKey, Slot, SlotKind,
};

fn key(year_group: i32, program: &str, semester: Semester) -> SemesterKey {
    SemesterKey::new(year_group, program, semester)
}

fn one_slot(course: &str) -> SemesterData {
    let mut data = SemesterData::new();
    data.slots.push(Slot::required(course, "D"));
    data
}

fn session(store: &Arc<MemoryCriteriaStore>, selection: Selection) -> CriteriaSession {
    let dyn_store: Arc<dyn CriteriaStore> = store.clone();
    let resolver = CascadeResolver::new(dyn_store, CascadeConfig::with_min_year_group(2025));
    CriteriaSession::new(resolver, CriteriaDefaults::from_env(), selection)
}

#[tokio::test]
async fn initial_load_fills_the_buffer() {
    let store = Arc::new(
        MemoryCriteriaStore::new().with(key(2026, "CS", Semester::Y1S1), one_slot("CS101")),
    );
    let mut s = session(&store, Selection::new(2026, "CS", Semester::Y1S1));

    let ticket = s.initial_ticket();
    let applied = s.load(ticket).await.unwrap();
    assert!(matches!(applied, Applied::Current(_)));
    assert_eq!(s.buffer().unwrap().data().slots.len(), 1);
    assert!(!s.buffer().unwrap().is_dirty());
    assert_eq!(s.advisory(), None);
}

#[tokio::test]
async fn stale_resolution_is_discarded() {
    let store = Arc::new(
        MemoryCriteriaStore::new()
            .with(key(2026, "EE", Semester::Y2S1), one_slot("EE201"))
            .with(key(2026, "ME", Semester::Y2S1), one_slot("ME201")),
    );
    let mut s = session(&store, Selection::new(2026, "CS", Semester::Y2S1));
    let resolver = s.resolver().clone();

    let first = s.select_program("EE");
    let second = s.select_program("ME");
    assert!(second.generation() > first.generation());

    let pending_first = first.resolve(&resolver).await;
    let pending_second = second.resolve(&resolver).await;

    // newer result lands first, older one arrives late
    let applied = s.apply(pending_second).unwrap();
    assert!(!applied.is_stale());
    let late = s.apply(pending_first).unwrap();
    assert!(late.is_stale());

    let buffer = s.buffer().unwrap();
    assert_eq!(buffer.data().slots[0].course_name.as_deref(), Some("ME201"));
    assert_eq!(s.loaded_key(), Some(&key(2026, "ME", Semester::Y2S1)));
}

#[tokio::test]
async fn stale_failure_does_not_clear_the_buffer() {
    let store = Arc::new(
        MemoryCriteriaStore::new().with(key(2026, "CS", Semester::Y1S1), one_slot("CS101")),
    );
    store.fail_on(key(2026, "CS", Semester::Y1S2));
    let mut s = session(&store, Selection::new(2026, "CS", Semester::Y1S1));
    let resolver = s.resolver().clone();

    let failing = s.select_semester(Semester::Y1S2);
    let current = s.select_semester(Semester::Y1S1);
    s.load(current).await.unwrap();

    let late = s.apply(failing.resolve(&resolver).await).unwrap();
    assert!(late.is_stale());
    assert!(s.buffer().is_some());
}

#[tokio::test]
async fn program_switch_passes_the_left_program_as_hint() {
    let store = Arc::new(
        MemoryCriteriaStore::new().with(key(2026, "EE", Semester::Y2S1), one_slot("EE201")),
    );
    let mut s = session(&store, Selection::new(2026, "EE", Semester::Y2S1));
    let ticket = s.initial_ticket();
    s.load(ticket).await.unwrap();

    let ticket = s.select_program("CS");
    assert_eq!(ticket.previous_program(), Some("EE"));
    let applied = s.load(ticket).await.unwrap();
    let Applied::Current(resolution) = applied else {
        panic!("expected current resolution");
    };
    assert_eq!(
        resolution.source,
        ResolutionSource::PreviousProgram {
            program: "EE".to_string(),
            semester: Semester::Y2S1
        }
    );
    assert!(s.buffer().unwrap().is_dirty());

    // semester and year-group changes carry no hint
    assert_eq!(s.select_semester(Semester::Y2S2).previous_program(), None);
    assert_eq!(s.select_year_group(2027).previous_program(), None);
}

#[tokio::test]
async fn save_writes_only_the_target_key() {
    let source = key(2026, "EE", Semester::Y2S1);
    let store = Arc::new(MemoryCriteriaStore::new().with(source.clone(), one_slot("EE201")));
    let mut s = session(&store, Selection::new(2026, "EE", Semester::Y2S1));
    let ticket = s.initial_ticket();
    s.load(ticket).await.unwrap();
    let ticket = s.select_program("CS");
    s.load(ticket).await.unwrap();

    assert!(s.edit(|b| b.add_slot(SlotKind::Elective, SlotDefaults::default())));
    let receipt = s.save().await.unwrap();

    let target = key(2026, "CS", Semester::Y2S1);
    assert_eq!(receipt.key, target);
    assert_eq!(store.save_log(), vec![target.clone()]);
    assert_eq!(store.stored(&target).unwrap().slots.len(), 2);
    assert_eq!(store.stored(&source).unwrap().slots.len(), 1);

    assert_eq!(s.advisory(), Some(SAVED_ADVISORY));
    assert!(!s.buffer().unwrap().is_dirty());
    assert_eq!(s.source(), Some(&ResolutionSource::Authored));
}

#[tokio::test]
async fn failed_save_keeps_the_buffer() {
    let target = key(2026, "CS", Semester::Y1S1);
    let store = Arc::new(MemoryCriteriaStore::new());
    let mut s = session(&store, Selection::new(2026, "CS", Semester::Y1S1));
    let ticket = s.initial_ticket();
    s.load(ticket).await.unwrap();
    s.edit(|b| b.add_rule());

    store.fail_on(target.clone());
    let err = s.save().await.unwrap_err();
    assert!(matches!(err, SessionError::Save { ref key, .. } if *key == target));
    assert!(s.advisory().unwrap().starts_with("Save failed:"));

    let buffer = s.buffer().unwrap();
    assert_eq!(buffer.data().rules.len(), 1);
    assert!(buffer.is_dirty());
    assert!(store.stored(&target).is_none());
}

#[tokio::test]
async fn failed_load_blocks_saving() {
    let target = key(2026, "CS", Semester::Y1S1);
    let store = Arc::new(MemoryCriteriaStore::new().with(target.clone(), one_slot("CS101")));
    let mut s = session(&store, Selection::new(2026, "CS", Semester::Y1S1));
    let ticket = s.initial_ticket();
    s.load(ticket).await.unwrap();

    store.fail_on(target.clone());
    let ticket = s.refresh();
    let err = s.load(ticket).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::Load(ResolveError::Store { .. })
    ));
    assert!(s.buffer().is_none());
    assert!(s
        .advisory()
        .unwrap()
        .starts_with("Failed to load semester data"));

    assert!(!s.edit(|b| b.add_rule()));
    let err = s.save().await.unwrap_err();
    assert!(matches!(err, SessionError::NothingLoaded(_)));
    assert!(store.save_log().is_empty());
}

#[tokio::test]
async fn missing_program_sets_the_select_advisory() {
    let store = Arc::new(MemoryCriteriaStore::new());
    let mut s = session(&store, Selection::new(2026, "", Semester::Y1S1));
    let ticket = s.initial_ticket();
    let err = s.load(ticket).await.unwrap_err();
    assert!(matches!(err, SessionError::Load(ResolveError::MissingProgram)));
    assert_eq!(s.advisory(), Some("Select a Program to load."));
    assert_eq!(store.fetch_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn saves_for_one_key_run_one_at_a_time() {
    let store = Arc::new(MemoryCriteriaStore::new());
    store.set_save_delay(Duration::from_millis(50));
    let queue = SaveQueue::new();

    let mut a = session(&store, Selection::new(2026, "CS", Semester::Y1S1)).with_save_queue(queue.clone());
    let mut b = session(&store, Selection::new(2026, "CS", Semester::Y1S1)).with_save_queue(queue.clone());
    let ticket = a.initial_ticket();
    a.load(ticket).await.unwrap();
    let ticket = b.initial_ticket();
    b.load(ticket).await.unwrap();

    a.edit(|buf| buf.add_slot(SlotKind::Required, SlotDefaults::default()));
    b.edit(|buf| buf.add_rule());

    let (ra, rb) = tokio::join!(a.save(), b.save());
    ra.unwrap();
    rb.unwrap();

    assert_eq!(store.max_saves_in_flight(), 1);
    assert_eq!(store.save_log().len(), 2);
    // the second save in arrival order is what remains stored
    let stored = store.stored(&key(2026, "CS", Semester::Y1S1)).unwrap();
    assert_eq!(stored.rules.len(), 1);
    assert!(stored.slots.is_empty());
}

#[tokio::test(start_paused = true)]
async fn saves_for_different_keys_overlap() {
    let store = Arc::new(MemoryCriteriaStore::new());
    store.set_save_delay(Duration::from_millis(50));
    let queue = SaveQueue::new();
    let data = one_slot("CS101");

    let k1 = key(2026, "CS", Semester::Y1S1);
    let k2 = key(2026, "CS", Semester::Y1S2);
    let (r1, r2) = tokio::join!(
        queue.save(store.as_ref(), &k1, &data),
        queue.save(store.as_ref(), &k2, &data)
    );
    r1.unwrap();
    r2.unwrap();
    assert_eq!(store.max_saves_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn save_queue_forgets_keys_once_idle() {
    let store = Arc::new(MemoryCriteriaStore::new());
    store.set_save_delay(Duration::from_millis(50));
    let queue = SaveQueue::new();
    let data = one_slot("CS101");

    let k1 = key(2026, "CS", Semester::Y1S1);
    let k2 = key(2026, "EE", Semester::Y1S1);
    let (r1, r2, r3) = tokio::join!(
        queue.save(store.as_ref(), &k1, &data),
        queue.save(store.as_ref(), &k1, &data),
        queue.save(store.as_ref(), &k2, &data)
    );
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();
    assert_eq!(store.save_log().len(), 3);
    assert_eq!(queue.active_keys().await, 0);

    for semester in [Semester::Y1S2, Semester::Y2S1, Semester::Y2S2] {
        queue
            .save(store.as_ref(), &key(2026, "CS", semester), &data)
            .await
            .unwrap();
    }
    assert_eq!(queue.active_keys().await, 0);
}

#[tokio::test]
async fn failed_save_still_releases_its_key() {
    let store = Arc::new(MemoryCriteriaStore::new());
    let queue = SaveQueue::new();
    let k = key(2026, "CS", Semester::Y1S1);
    store.fail_on(k.clone());

    assert!(queue.save(store.as_ref(), &k, &one_slot("CS101")).await.is_err());
    assert_eq!(queue.active_keys().await, 0);
}
