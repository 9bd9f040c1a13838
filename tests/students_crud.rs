
use serde_json::json;
use test_support::{
    create_student, create_teacher, error_code, request, request_ok, select_workspace,
    spawn_sidecar, temp_dir,
};

#[test]
fn create_get_update_delete_roundtrip() {
    let workspace = temp_dir("stagemanager-students-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "students.create",
        json!({
            "firstName": "Rim",
            "lastName": "Trabelsi",
            "email": "rim@iset.tn",
            "level": "2eme MDW",
            "phoneNumber": "21612345"
        }),
    );
    let student_id = created.get("studentId").and_then(|v| v.as_i64()).expect("id");

    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "students.get",
        json!({ "studentId": student_id }),
    );
    let student = fetched.get("student").expect("student");
    assert_eq!(student.get("firstName").and_then(|v| v.as_str()), Some("Rim"));
    assert_eq!(student.get("level").and_then(|v| v.as_str()), Some("2eme MDW"));
    assert_eq!(
        student.get("phoneNumber").and_then(|v| v.as_str()),
        Some("21612345")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "u1",
        "students.update",
        json!({
            "studentId": student_id,
            "patch": { "level": "3eme MDW", "phoneNumber": "21698765" }
        }),
    );
    let fetched = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(
        fetched
            .get("student")
            .and_then(|s| s.get("level"))
            .and_then(|v| v.as_str()),
        Some("3eme MDW")
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    let res = request(
        &mut stdin,
        &mut reader,
        "g3",
        "students.get",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&res), "not_found");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn create_validates_fields() {
    let workspace = temp_dir("stagemanager-students-validate");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let res = request(
        &mut stdin,
        &mut reader,
        "c1",
        "students.create",
        json!({ "firstName": "Rim", "lastName": "Trabelsi", "email": "rim@iset.tn" }),
    );
    assert_eq!(error_code(&res), "bad_params");

    let res = request(
        &mut stdin,
        &mut reader,
        "c2",
        "students.create",
        json!({
            "firstName": "Rim",
            "lastName": "Trabelsi",
            "email": "rim@iset.tn",
            "level": "4eme TI"
        }),
    );
    assert_eq!(error_code(&res), "bad_params");

    let res = request(
        &mut stdin,
        &mut reader,
        "c3",
        "students.create",
        json!({
            "firstName": "Rim",
            "lastName": "Trabelsi",
            "email": "not-an-address",
            "level": "1ere TI"
        }),
    );
    assert_eq!(error_code(&res), "bad_params");

    // Unique email is a storage constraint, surfaced as a store failure.
    create_student(&mut stdin, &mut reader, "c4", "rim@iset.tn", "1ere TI");
    let res = request(
        &mut stdin,
        &mut reader,
        "c5",
        "students.create",
        json!({
            "firstName": "Sami",
            "lastName": "Jlassi",
            "email": "rim@iset.tn",
            "level": "1ere TI"
        }),
    );
    assert_eq!(error_code(&res), "db_insert_failed");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn list_filters_by_level_and_by_internship_type() {
    let workspace = temp_dir("stagemanager-students-filters");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    create_student(&mut stdin, &mut reader, "s1", "a@iset.tn", "1ere TI");
    create_student(&mut stdin, &mut reader, "s2", "b@iset.tn", "2eme DSI");
    create_student(&mut stdin, &mut reader, "s3", "c@iset.tn", "2eme MDW");
    create_student(&mut stdin, &mut reader, "s4", "d@iset.tn", "3eme DSI");

    let all = request_ok(&mut stdin, &mut reader, "l1", "students.list", json!({}));
    assert_eq!(
        all.get("students").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(4)
    );

    let by_level = request_ok(
        &mut stdin,
        &mut reader,
        "l2",
        "students.list",
        json!({ "level": "2eme DSI" }),
    );
    let students = by_level.get("students").and_then(|v| v.as_array()).expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("email").and_then(|v| v.as_str()),
        Some("b@iset.tn")
    );

    // The picker behind the assignment form: all levels eligible for the type.
    let eligible = request_ok(
        &mut stdin,
        &mut reader,
        "l3",
        "students.listByType",
        json!({ "type": "perfectionnement" }),
    );
    let mut emails: Vec<&str> = eligible
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students")
        .iter()
        .map(|s| s.get("email").and_then(|v| v.as_str()).expect("email"))
        .collect();
    emails.sort();
    assert_eq!(emails, vec!["b@iset.tn", "c@iset.tn"]);

    let res = request(
        &mut stdin,
        &mut reader,
        "l4",
        "students.listByType",
        json!({ "type": "stage" }),
    );
    assert_eq!(error_code(&res), "bad_params");

    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn delete_is_restricted_while_internships_reference_the_student() {
    let workspace = temp_dir("stagemanager-students-restrict");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);

    let student_id = create_student(&mut stdin, &mut reader, "s1", "a@iset.tn", "1ere TI");
    create_teacher(&mut stdin, &mut reader, "t1", "t1@iset.tn");
    create_teacher(&mut stdin, &mut reader, "t2", "t2@iset.tn");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "c1",
        "internships.create",
        json!({
            "title": "Stage d'initiation",
            "company": "Sopra",
            "type": "initiation",
            "startDate": "2025-01-01",
            "endDate": "2025-03-01",
            "studentId": student_id
        }),
    );
    let internship_id = created
        .get("internship")
        .and_then(|v| v.get("id"))
        .and_then(|v| v.as_i64())
        .expect("internship id");

    let res = request(
        &mut stdin,
        &mut reader,
        "d1",
        "students.delete",
        json!({ "studentId": student_id }),
    );
    assert_eq!(error_code(&res), "conflict");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d2",
        "internships.delete",
        json!({ "internshipId": internship_id }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "d3",
        "students.delete",
        json!({ "studentId": student_id }),
    );

    let _ = std::fs::remove_dir_all(workspace);
}
