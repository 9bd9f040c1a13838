
use serde_json::json;
use test_support::{
    create_student, request_ok, select_workspace, spawn_sidecar, temp_dir,
};

#[test]
fn exported_bundle_restores_into_a_fresh_workspace() {
    let workspace = temp_dir("stagemanager-exchange-src");
    let workspace2 = temp_dir("stagemanager-exchange-dst");
    let bundle_path = workspace.join("export.smbackup.zip");

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    select_workspace(&mut stdin, &mut reader, &workspace);
    create_student(&mut stdin, &mut reader, "s1", "rim@iset.tn", "2eme DSI");

    let exported = request_ok(
        &mut stdin,
        &mut reader,
        "e1",
        "backup.exportWorkspaceBundle",
        json!({
            "workspacePath": workspace.to_string_lossy(),
            "outPath": bundle_path.to_string_lossy()
        }),
    );
    assert_eq!(
        exported.get("bundleFormat").and_then(|v| v.as_str()),
        Some("stagemanager-workspace-v1")
    );

    let imported = request_ok(
        &mut stdin,
        &mut reader,
        "i1",
        "backup.importWorkspaceBundle",
        json!({
            "inPath": bundle_path.to_string_lossy(),
            "workspacePath": workspace2.to_string_lossy()
        }),
    );
    assert_eq!(
        imported.get("bundleFormatDetected").and_then(|v| v.as_str()),
        Some("stagemanager-workspace-v1")
    );

    select_workspace(&mut stdin, &mut reader, &workspace2);
    let students = request_ok(&mut stdin, &mut reader, "l1", "students.list", json!({}));
    let students = students
        .get("students")
        .and_then(|v| v.as_array())
        .expect("students");
    assert_eq!(students.len(), 1);
    assert_eq!(
        students[0].get("email").and_then(|v| v.as_str()),
        Some("rim@iset.tn")
    );

    let _ = std::fs::remove_dir_all(workspace);
    let _ = std::fs::remove_dir_all(workspace2);
}
