use super::*;

#[test]
fn endpoint_trims_trailing_slash() {
    let library = MapLibrary::new("http://localhost:8010/api/");
    assert_eq!(library.endpoint("/maps/list"), "http://localhost:8010/api/maps/list");
}

#[test]
fn parse_map_list_reads_names_and_folders() {
    let maps = parse_map_list(r#"{"maps":[{"name":"cave.png","folder":"dungeons"},{"name":"town.jpg"}]}"#)
        .expect("listing should parse");
    assert_eq!(
        maps,
        vec![
            MapListing { name: "cave.png".into(), folder: Some("dungeons".into()) },
            MapListing { name: "town.jpg".into(), folder: None },
        ]
    );
}

#[test]
fn parse_map_list_accepts_missing_maps_key() {
    assert!(parse_map_list("{}").expect("empty object").is_empty());
}

#[test]
fn parse_map_list_rejects_non_listing() {
    let err = parse_map_list("[1,2]").expect_err("array is not a listing");
    assert!(matches!(err, ApiError::Decode(_)));
}

#[test]
fn listing_serializes_without_null_folder() {
    let json = serde_json::to_string(&MapListing { name: "a".into(), folder: None }).unwrap();
    assert_eq!(json, r#"{"name":"a"}"#);
}
