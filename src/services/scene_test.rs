use super::*;
use serde_json::json;
use uuid::Uuid;

fn scratch_dir() -> PathBuf {
    std::env::temp_dir().join(format!("scenesync-scene-{}", Uuid::new_v4()))
}

#[tokio::test]
async fn load_missing_file_is_none() {
    let dir = scratch_dir();
    assert!(load_current(&dir).await.expect("missing file is not an error").is_none());
}

#[tokio::test]
async fn save_creates_directory_and_load_reads_it_back() {
    let dir = scratch_dir().join("nested");
    let scene = json!({"id": "s-1", "maps": [{"name": "cave"}], "activeMapId": "cave"});
    save_current(&dir, &scene).await.expect("save");
    assert_eq!(load_current(&dir).await.expect("load"), Some(scene));
    assert!(!current_scene_path(&dir).with_extension("json.tmp").exists());
}

#[tokio::test]
async fn save_overwrites_previous_scene() {
    let dir = scratch_dir();
    save_current(&dir, &json!({"id": "old"})).await.expect("first save");
    save_current(&dir, &json!({"id": "new"})).await.expect("second save");
    assert_eq!(load_current(&dir).await.expect("load"), Some(json!({"id": "new"})));
}

#[tokio::test]
async fn corrupt_file_is_a_json_error() {
    let dir = scratch_dir();
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(current_scene_path(&dir), b"{truncated").unwrap();
    let err = load_current(&dir).await.expect_err("corrupt file");
    assert!(matches!(err, SceneFileError::Json(_)));
}
