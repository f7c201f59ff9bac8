use crate::sync::paths::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_explicit_data_dir_wins() {
    let dir = data_dir_from(lookup(&[
        ("ROUTINES_DATA_DIR", "/srv/routines"),
        ("XDG_DATA_HOME", "/home/a/.data"),
    ]));
    assert_eq!(dir, PathBuf::from("/srv/routines"));
}

#[test]
fn test_xdg_data_home() {
    let dir = data_dir_from(lookup(&[("XDG_DATA_HOME", "/home/a/.data"), ("HOME", "/home/a")]));
    assert_eq!(dir, PathBuf::from("/home/a/.data/routines"));
}

#[test]
fn test_home_fallback_and_empty_values_ignored() {
    let dir = data_dir_from(lookup(&[("ROUTINES_DATA_DIR", ""), ("HOME", "/home/a")]));
    assert_eq!(dir, PathBuf::from("/home/a/.local/share/routines"));
}

#[test]
fn test_nothing_set_uses_relative_dir() {
    let dir = data_dir_from(lookup(&[]));
    assert_eq!(dir, PathBuf::from("./routines"));
}

#[test]
fn test_layout_inside_data_dir() {
    let root = Path::new("/srv/routines");
    assert_eq!(get_db_path(root), PathBuf::from("/srv/routines/data.db"));
    assert_eq!(get_media_dir(root), PathBuf::from("/srv/routines/static/videos"));
    assert_eq!(
        get_thumbnail_dir(root),
        PathBuf::from("/srv/routines/static/videos/thumbnails")
    );
}
