
use serde_json::json;
use test_support::{
    assign_params, payload, request_err, request_ok, scope, seed_catalog, select_workspace,
    spawn_sidecar, temp_dir,
};

fn slot(id: serde_json::Value, order: i64, start: &str, end: &str) -> serde_json::Value {
    json!({
        "slotId": id,
        "startTime": start,
        "endTime": end,
        "sortOrder": order,
    })
}

#[test]
fn replace_normalizes_ids_and_lists_in_catalog_order() {
    let workspace = temp_dir("routined-timeslots-replace");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let empty = request_ok(&mut stdin, &mut reader, "1", "timeslots.list", json!({}));
    assert_eq!(empty["slots"].as_array().map(|s| s.len()), Some(0));
    assert!(empty["replacedAt"].is_null());

    // mixed spellings land as one canonical catalog
    let result = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "timeslots.replace",
        json!({
            "slots": [
                slot(json!("02"), 2, "10:00", "10:50"),
                slot(json!(1), 1, "09:00", "09:50"),
                {
                    "slotId": "P1",
                    "startTime": "11:00",
                    "endTime": "11:45",
                    "sortOrder": 3,
                    "isBreak": true,
                },
            ]
        }),
    );
    assert_eq!(result["count"], 3);
    assert!(result["replacedAt"].is_string());

    let listed = request_ok(&mut stdin, &mut reader, "3", "timeslots.list", json!({}));
    let slots = listed["slots"].as_array().expect("slots");
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0]["slotId"], "1");
    assert_eq!(slots[1]["slotId"], "2");
    assert_eq!(slots[2]["slotId"], "P1");
    assert_eq!(slots[0]["startTime"], "09:00");
    assert_eq!(slots[2]["isBreak"], true);
    assert_eq!(slots[0]["dayType"], "ALL");
    assert_eq!(listed["replacedAt"], result["replacedAt"]);
}

#[test]
fn replace_validates_shapes_and_times() {
    let workspace = temp_dir("routined-timeslots-shapes");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let cases: &[(&str, serde_json::Value)] = &[
        ("no-slots", json!({})),
        ("not-object", json!({ "slots": [42] })),
        ("no-id", json!({ "slots": [slot(json!(null), 1, "09:00", "09:50")] })),
        (
            "bad-time",
            json!({ "slots": [slot(json!(1), 1, "aa:bb", "09:50")] }),
        ),
        (
            "hour-range",
            json!({ "slots": [slot(json!(1), 1, "09:00", "25:61")] }),
        ),
        (
            "not-after",
            json!({ "slots": [slot(json!(1), 1, "09:00", "09:00")] }),
        ),
        (
            "no-order",
            json!({ "slots": [{ "slotId": 1, "startTime": "09:00", "endTime": "09:50" }] }),
        ),
        (
            "bad-break",
            json!({ "slots": [{
                "slotId": 1, "startTime": "09:00", "endTime": "09:50",
                "sortOrder": 1, "isBreak": "yes",
            }] }),
        ),
    ];
    for (name, params) in cases {
        let (code, _) = request_err(&mut stdin, &mut reader, name, "timeslots.replace", params.clone());
        assert_eq!(&code, "bad_params", "case {}", name);
    }
}

#[test]
fn replace_rejects_duplicate_identities() {
    let workspace = temp_dir("routined-timeslots-dup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    // "01" and 1 are the same id after normalization
    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "1",
        "timeslots.replace",
        json!({ "slots": [
            slot(json!(1), 1, "09:00", "09:50"),
            slot(json!("01"), 2, "10:00", "10:50"),
        ] }),
    );
    assert_eq!(code, "bad_params");
    assert_eq!(error["details"]["slotId"], "1");

    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "timeslots.replace",
        json!({ "slots": [
            slot(json!(1), 1, "09:00", "09:50"),
            slot(json!(2), 1, "10:00", "10:50"),
        ] }),
    );
    assert_eq!(code, "bad_params");
    assert_eq!(error["details"]["sortOrder"], 1);
}

#[test]
fn replace_cannot_orphan_committed_entries() {
    let workspace = temp_dir("routined-timeslots-orphan");
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
            0,
            json!("3"),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );

    let before = request_ok(&mut stdin, &mut reader, "2", "timeslots.list", json!({}));

    // slot "3" is gone from the proposed catalog
    let shrunk = json!({ "slots": [
        slot(json!(1), 1, "09:00", "09:50"),
        slot(json!(2), 2, "10:00", "10:50"),
    ] });
    let (code, error) = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "timeslots.replace",
        shrunk.clone(),
    );
    assert_eq!(code, "invalid_slot");
    assert_eq!(error["details"]["slotIds"], json!(["3"]));

    // the refused swap rolled back whole: catalog and stamp both survive
    let listed = request_ok(&mut stdin, &mut reader, "4", "timeslots.list", json!({}));
    assert_eq!(listed["slots"].as_array().map(|s| s.len()), Some(7));
    assert_eq!(listed["replacedAt"], before["replacedAt"]);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "routine.clearScope",
        scope("BCT", 1, "AB"),
    );
    let result = request_ok(&mut stdin, &mut reader, "6", "timeslots.replace", shrunk);
    assert_eq!(result["count"], 2);
}

#[test]
fn slot_id_spellings_share_one_booking_key() {
    let workspace = temp_dir("routined-timeslots-spellings");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    seed_catalog(&mut stdin, &mut reader);

    // assigned with the numeric spelling
    let assigned = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "routine.assign",
        assign_params(
            scope("BCT", 1, "AB"),
            0,
            json!(1),
            payload("MATH101", "lecture", &["T1"], "R1"),
        ),
    );
    assert_eq!(assigned["entry"]["slotId"], "1");

    // the zero-padded spelling still hits the same claim
    let (code, _) = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "routine.assign",
        assign_params(
            scope("BEX", 3, "CD"),
            0,
            json!("01"),
            payload("PHYS101", "lecture", &["T1"], "R2"),
        ),
    );
    assert_eq!(code, "teacher_conflict");

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "routine.grid",
        scope("BCT", 1, "AB"),
    );
    assert_eq!(grid["days"][0]["cells"][0]["slotId"], "1");
}
