//! End-to-end verification over real card and disk trees.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use cardcheck::config::{ExtensionSet, VerifyConfig};
use cardcheck::engine;
use cardcheck::index::{CardIndex, DiskIndex};
use cardcheck::report::{self, Reason};

struct Trees {
    _root: TempDir,
    card: PathBuf,
    disk: PathBuf,
}

fn trees() -> Trees {
    let root = tempdir().expect("tempdir");
    let card = root.path().join("card");
    let disk = root.path().join("disk");
    fs::create_dir_all(&card).expect("create card root");
    fs::create_dir_all(&disk).expect("create disk root");
    Trees {
        _root: root,
        card,
        disk,
    }
}

fn write(path: &Path, contents: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, contents).expect("write file");
}

fn config_for(trees: &Trees) -> VerifyConfig {
    let mut config = VerifyConfig::new(trees.card.clone(), trees.disk.clone());
    config.workers = 4;
    config
}

fn build_indices(trees: &Trees, config: &VerifyConfig) -> (CardIndex, DiskIndex) {
    let disk = DiskIndex::build(&trees.disk, &config.extensions).expect("disk index");
    let card = CardIndex::build(&trees.card, &config.extensions).expect("card index");
    (card, disk)
}

#[test]
fn identical_backup_produces_no_entries() {
    let trees = trees();
    write(&trees.card.join("IMG_0001.JPG"), b"identical content");
    write(&trees.disk.join("2024/IMG_0001.JPG"), b"identical content");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert!(entries.is_empty());
}

#[test]
fn missing_name_is_reported_without_hashing() {
    let trees = trees();
    write(&trees.card.join("IMG_0003.JPG"), b"only on card");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, Reason::NoNameMatch);
    assert_eq!(entries[0].path, trees.card.join("IMG_0003.JPG"));
}

#[test]
fn same_name_different_size_is_no_name_match() {
    let trees = trees();
    write(&trees.card.join("IMG_0005.JPG"), b"eight by!");
    write(&trees.disk.join("IMG_0005.JPG"), b"different length");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, Reason::NoNameMatch);
}

#[test]
fn content_mismatch_is_reported_with_card_path() {
    let trees = trees();
    write(&trees.card.join("IMG_0006.JPG"), b"card bytes!");
    write(&trees.disk.join("IMG_0006.JPG"), b"disk bytes!");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, Reason::ContentMismatch);
    assert_eq!(entries[0].path, trees.card.join("IMG_0006.JPG"));
}

#[test]
fn one_discordant_candidate_yields_one_entry() {
    // Two disk candidates share the card file's name and size; only the
    // mismatching one is reported, and with the card path.
    let trees = trees();
    write(&trees.card.join("IMG_0004.JPG"), b"good bytes");
    write(&trees.disk.join("a/IMG_0004.JPG"), b"good bytes");
    write(&trees.disk.join("b/IMG_0004.JPG"), b"evil bytes");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].reason, Reason::ContentMismatch);
    assert_eq!(entries[0].path, trees.card.join("IMG_0004.JPG"));
}

#[test]
fn matching_duplicates_on_disk_are_silent() {
    let trees = trees();
    write(&trees.card.join("IMG_0007.JPG"), b"shared");
    write(&trees.disk.join("a/IMG_0007.JPG"), b"shared");
    write(&trees.disk.join("b/IMG_0007.JPG"), b"shared");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert!(entries.is_empty());
}

#[test]
fn unmatched_files_are_copied_when_destination_is_set() {
    let trees = trees();
    write(&trees.card.join("IMG_0008.JPG"), b"no backup yet");
    let incoming = trees._root.path().join("incoming");
    fs::create_dir_all(&incoming).expect("create incoming");

    let mut config = config_for(&trees);
    config.copy_dir = Some(incoming.clone());
    config.validate().expect("valid config");
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");

    assert_eq!(entries.len(), 1);
    assert_eq!(
        fs::read(incoming.join("IMG_0008.JPG")).expect("copied file"),
        b"no backup yet"
    );
}

#[test]
fn entries_come_back_sorted_by_basename() {
    let trees = trees();
    write(&trees.card.join("z/IMG_0001.JPG"), b"a");
    write(&trees.card.join("a/IMG_0009.JPG"), b"b");
    write(&trees.card.join("m/IMG_0005.JPG"), b"c");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    let names: Vec<_> = entries
        .iter()
        .map(|entry| {
            entry
                .path
                .file_name()
                .expect("basename")
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    assert_eq!(names, ["IMG_0001.JPG", "IMG_0005.JPG", "IMG_0009.JPG"]);
}

#[test]
fn non_media_files_are_ignored_everywhere() {
    let trees = trees();
    write(&trees.card.join("notes.txt"), b"not media");
    write(&trees.card.join("IMG_0010.jpg"), b"media");
    write(&trees.disk.join("IMG_0010.jpg"), b"media");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    assert!(entries.is_empty());
}

#[test]
fn custom_extension_set_narrows_the_walk() {
    let trees = trees();
    write(&trees.card.join("IMG_0011.JPG"), b"jpeg");
    write(&trees.card.join("clip_0001.mp4"), b"video");

    let mut config = config_for(&trees);
    config.extensions = ExtensionSet::new(["mp4"]);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");
    // only the video is indexed, and it has no backup
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].path, trees.card.join("clip_0001.mp4"));
}

#[test]
fn deleted_card_file_aborts_the_run() {
    let trees = trees();
    write(&trees.card.join("IMG_0012.JPG"), b"fleeting");
    write(&trees.disk.join("IMG_0012.JPG"), b"fleeting");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    fs::remove_file(trees.card.join("IMG_0012.JPG")).expect("remove card file");

    assert!(engine::verify(card, disk, &config).is_err());
}

#[test]
fn full_pipeline_renders_sorted_report() {
    let trees = trees();
    write(&trees.card.join("IMG_0002.JPG"), b"unmatched two");
    write(&trees.card.join("IMG_0001.JPG"), b"unmatched one");

    let config = config_for(&trees);
    let (card, disk) = build_indices(&trees, &config);
    let entries = engine::verify(card, disk, &config).expect("verify");

    let out = trees._root.path().join("uncopied.html");
    report::render_html(&entries, &out).expect("render");
    let html = fs::read_to_string(&out).expect("read report");
    let first = html.find("IMG_0001.JPG").expect("first entry");
    let second = html.find("IMG_0002.JPG").expect("second entry");
    assert!(first < second);
    assert!(html.contains("no file with that name and size on disk"));
}
