
use serde_json::json;
use test_support::{
    assign_params, payload, request_err, request_ok, scope, seed_catalog, select_workspace,
    spawn_sidecar, temp_dir,
};

#[test]
fn teacher_double_booking_is_rejected_across_scopes() {
    let workspace = temp_dir("routined-teacher-conflict");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!("1"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    assert_eq!(first["entry"]["teacherIds"], json!(["T1"]));

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "CD"),
            0,
            json!("1"),
            payload("PHYS101", "lecture", &["T1"], "R2"),
        ),
    );
    assert_eq!(code, "teacher_conflict");
    let hit = &error["details"]["conflictingEntry"];
    assert_eq!(hit["subjectId"], "MATH101");
    assert_eq!(hit["section"], "AB");

    // the rejected write left nothing behind
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.grid",
        scope("BCT", 1, "CD"),
    );
    assert_eq!(grid["days"][0]["cells"].as_array().map(|c| c.len()), Some(0));
}

#[test]
fn room_double_booking_is_rejected() {
    let workspace = temp_dir("routined-room-conflict");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            2,
            json!("3"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BEX", 3, "CD"),
            2,
            json!("3"),
            payload("PHYS101", "lecture", &["T2"], "R1"),
        ),
    );
    assert_eq!(code, "room_conflict");
    assert_eq!(error["details"]["resourceId"], "R1");
}

#[test]
fn break_and_unknown_slots_are_refused() {
    let workspace = temp_dir("routined-slot-guards");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!("4"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    assert_eq!(code, "break_slot");

    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!("99"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    assert_eq!(code, "invalid_slot");
}

#[test]
fn lab_pair_shares_cell_but_not_teachers() {
    let workspace = temp_dir("routined-lab-pair");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let mut group_a = payload("CHEM101", "practical", &["T1"], "LAB1");
    group_a["labGroup"] = json!("A");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(scope("BCT", 1, "AB"), 1, json!("2"), group_a),
    );

    // complementary group with a clashing teacher is still a conflict
    let mut clashing_b = payload("CHEM101", "practical", &["T1"], "LAB2");
    clashing_b["labGroup"] = json!("B");
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(scope("BCT", 1, "AB"), 1, json!("2"), clashing_b),
    );
    assert_eq!(code, "teacher_conflict");

    let mut group_b = payload("CHEM101", "practical", &["T2"], "LAB2");
    group_b["labGroup"] = json!("B");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.assign",
        assign_params(scope("BCT", 1, "AB"), 1, json!("2"), group_b),
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    let cell = &grid["days"][1]["cells"][0];
    assert_eq!(cell["kind"], "labPair");
    assert_eq!(cell["entries"][0]["labGroup"], "A");
    assert_eq!(cell["entries"][1]["labGroup"], "B");
}

#[test]
fn reassignment_replaces_and_frees_the_old_booking() {
    let workspace = temp_dir("routined-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            3,
            json!("5"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            3,
            json!("5"),
            payload("STAT201", "lecture", &["T2"], "R1"),
        ),
    );

    // T1's old claim is gone, another section may book the teacher now
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "CD"),
            3,
            json!("5"),
            payload("MATH101", "lecture", &["T1"], "R2"),
        ),
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    let cell = &grid["days"][3]["cells"][0];
    assert_eq!(cell["kind"], "single");
    assert_eq!(cell["entry"]["subjectId"], "STAT201");
}

#[test]
fn check_reports_conflicts_without_writing() {
    let workspace = temp_dir("routined-check");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let ok_result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.check",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!("1"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    assert_eq!(ok_result["ok"], true);

    // a passing check commits nothing
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    assert_eq!(grid["days"][0]["cells"].as_array().map(|c| c.len()), Some(0));

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!("1"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "routine.check",
        assign_params(
            scope("BCT", 1, "CD"),
            0,
            json!("1"),
            payload("PHYS101", "lecture", &["T1"], "R2"),
        ),
    );
    assert_eq!(code, "teacher_conflict");

    // the committed entry is untouched by the failed check
    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    assert_eq!(grid["days"][0]["cells"][0]["entry"]["subjectId"], "MATH101");
}

#[test]
fn alternating_week_claims_cover_both_groups() {
    let workspace = temp_dir("routined-alternating");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    let mut alternating = payload("CHEM101", "practical", &["T1"], "LAB1");
    alternating["labGroup"] = json!("A");
    alternating["alternativeWeek"] = json!(true);
    alternating["alternateGroup"] = json!({
        "labGroup": "B",
        "teacherIds": ["T2"],
        "roomId": "LAB2"
    });
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(scope("BCT", 1, "AB"), 2, json!("6"), alternating),
    );

    // both weeks' teachers are busy at that moment
    for (id, teacher) in [("2", "T1"), ("3", "T2")] {
        let (code, _) = request_err(
            &mut stdin,
            &mut reader,
            id,
            "routine.assign",
            assign_params(
                scope("BEX", 3, "CD"),
                2,
                json!("6"),
                payload("PHYS101", "lecture", &[teacher], "R7"),
            ),
        );
        assert_eq!(code, "teacher_conflict");
    }

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    let cell = &grid["days"][2]["cells"][0];
    assert_eq!(cell["kind"], "alternating");
    assert_eq!(cell["alternativeWeek"], true);
    assert_eq!(cell["entries"][0]["roomId"], "LAB1");
    assert_eq!(cell["entries"][1]["roomId"], "LAB2");
    assert_eq!(cell["entries"][1]["teacherIds"], json!(["T2"]));
}

#[test]
fn alternating_weeks_sharing_resources_book_them_once() {
    let workspace = temp_dir("routined-alternating-shared");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    // both weeks run with the same teacher and room
    let mut alternating = payload("BIO301", "practical", &["T4"], "LAB3");
    alternating["labGroup"] = json!("A");
    alternating["alternativeWeek"] = json!(true);
    alternating["alternateGroup"] = json!({
        "labGroup": "B",
        "teacherIds": ["T4"],
        "roomId": "LAB3"
    });
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(scope("BCT", 1, "AB"), 3, json!("6"), alternating),
    );
    assert_eq!(result["entry"]["alternativeWeek"], true);

    // the commitment still excludes everyone else
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BEX", 3, "CD"),
            3,
            json!("6"),
            payload("PHYS101", "lecture", &["T4"], "R7"),
        ),
    );
    assert_eq!(code, "teacher_conflict");

    // one claim per resource, not one per week
    let teachers = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.teacherSchedule",
        json!({ "teacherId": "T4" }),
    );
    assert_eq!(teachers["entries"].as_array().map(|e| e.len()), Some(1));
    let rooms = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "routine.roomSchedule",
        json!({ "roomId": "LAB3" }),
    );
    assert_eq!(rooms["entries"].as_array().map(|e| e.len()), Some(1));
}
