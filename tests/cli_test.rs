use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use std::path::Path;

type STDRESULT = Result<(), Box<dyn std::error::Error>>;

const CATALOG_HEADER_LEN: usize = 16;
const EB_MAX_EPWING_TITLE_LENGTH: usize = 80;
const EB_MAX_DIRECTORY_NAME_LENGTH: usize = 8;

fn epwing_catalog(names: &[&str]) -> Vec<u8> {
    let mut bytes = vec![0u8; CATALOG_HEADER_LEN];
    bytes[1] = names.len() as u8;
    let record_size = 2 + EB_MAX_EPWING_TITLE_LENGTH + EB_MAX_DIRECTORY_NAME_LENGTH;
    // basic records, then EPWING's extended-information pass
    for _ in 0..2 {
        for name in names {
            let mut record = vec![0u8; record_size];
            let start = 2 + EB_MAX_EPWING_TITLE_LENGTH;
            record[start..start + name.len()].copy_from_slice(name.as_bytes());
            bytes.extend(record);
        }
    }
    bytes
}

/// Build a synthetic EPWING book with the named subbooks, each holding a
/// `data/HONMON` of the given bytes.
fn make_epwing_book(root: &Path, subbooks: &[(&str, &[u8])]) {
    let names: Vec<&str> = subbooks.iter().map(|(n, _)| *n).collect();
    std::fs::write(root.join("CATALOGS"), epwing_catalog(&names)).unwrap();
    for (name, honmon) in subbooks {
        let data_dir = root.join(name).join("data");
        std::fs::create_dir_all(&data_dir).unwrap();
        std::fs::write(data_dir.join("HONMON"), honmon).unwrap();
    }
}

#[test]
fn compress_decompress_identity() -> STDRESULT {
    let src = tempfile::tempdir()?;
    let mut honmon = vec![0u8; 10_000];
    let tail_len = honmon.len() - 5_000;
    for (i, b) in honmon[tail_len..].iter_mut().enumerate() {
        *b = ((i as u64 * 2654435761) % 256) as u8;
    }
    make_epwing_book(src.path(), &[("dict1", &honmon)]);

    let compressed = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-l").arg("3")
        .arg("-o").arg(compressed.path())
        .arg("-f")
        .arg(src.path())
        .assert()
        .success();

    let ebz = compressed.path().join("dict1").join("data").join("HONMON.ebz");
    assert!(ebz.exists(), "compressed HONMON.ebz should exist");

    let decompressed = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-u")
        .arg("-o").arg(decompressed.path())
        .arg("-f")
        .arg(compressed.path())
        .assert()
        .success();

    let roundtripped = std::fs::read(decompressed.path().join("dict1").join("data").join("HONMON"))?;
    assert_eq!(roundtripped, honmon);
    Ok(())
}

#[test]
fn level_zero_uses_slice_size_2048() -> STDRESULT {
    let src = tempfile::tempdir()?;
    let honmons = vec![0xABu8; 4096];
    let data_dir = src.path().join("dict1").join("data");
    std::fs::create_dir_all(&data_dir)?;
    std::fs::write(data_dir.join("HONMONS"), &honmons)?;
    std::fs::write(src.path().join("CATALOGS"), epwing_catalog(&["dict1"]))?;

    let out = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-l").arg("0")
        .arg("-o").arg(out.path())
        .arg("-f")
        .arg(src.path())
        .assert()
        .success();

    let bytes = std::fs::read(out.path().join("dict1").join("data").join("HONMONS.ebz"))?;
    assert_eq!(&bytes[0..5], b"EBZip");
    assert_eq!(bytes[5] >> 4, 1); // version 1
    assert_eq!(bytes[5] & 0x0f, 0); // level 0
    let index_width = 2usize; // file_size < 2^16
    let n = 2usize; // ceil(4096 / 2048)
    let index_start = 22;
    let index_end = index_start + (n + 1) * index_width;
    assert!(bytes.len() >= index_end);
    Ok(())
}

#[test]
fn overwrite_no_leaves_existing_output_untouched() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", b"hello world")]);

    let out = tempfile::tempdir()?;
    let honmon_out_dir = out.path().join("dict1").join("data");
    std::fs::create_dir_all(&honmon_out_dir)?;
    std::fs::write(honmon_out_dir.join("HONMON.ebz"), b"pre-existing")?;

    Command::cargo_bin("ebzip")?
        .arg("-w").arg("no")
        .arg("-o").arg(out.path())
        .arg(src.path())
        .assert()
        .success();

    let contents = std::fs::read(honmon_out_dir.join("HONMON.ebz"))?;
    assert_eq!(contents, b"pre-existing");
    Ok(())
}

#[test]
fn crc_corruption_is_detected() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", &vec![7u8; 5000])]);

    let compressed = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-o").arg(compressed.path())
        .arg("-f")
        .arg(src.path())
        .assert()
        .success();

    let ebz_path = compressed.path().join("dict1").join("data").join("HONMON.ebz");
    let mut bytes = std::fs::read(&ebz_path)?;
    let corrupt_at = bytes.len() - 1;
    bytes[corrupt_at] ^= 0xff;
    std::fs::File::create(&ebz_path)?.write_all(&bytes)?;

    let decompressed = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-u")
        .arg("-o").arg(decompressed.path())
        .arg("-f")
        .arg(compressed.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("CRC error"));

    let output_path = decompressed.path().join("dict1").join("data").join("HONMON");
    assert!(!output_path.exists());
    Ok(())
}

#[test]
fn subbook_filter_is_case_insensitive() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", b"one"), ("dict2", b"two")]);

    let out = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-S").arg("DICT1")
        .arg("-o").arg(out.path())
        .arg("-f")
        .arg(src.path())
        .assert()
        .success();

    assert!(out.path().join("dict1").join("data").join("HONMON.ebz").exists());
    assert!(!out.path().join("dict2").exists());
    Ok(())
}

#[test]
fn unknown_subbook_aborts_the_run() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", b"one")]);

    let out = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-S").arg("nosuch")
        .arg("-o").arg(out.path())
        .arg(src.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown subbook"));
    Ok(())
}

#[test]
fn test_mode_leaves_filesystem_unchanged() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", &vec![3u8; 6000])]);

    let out = tempfile::tempdir()?;
    Command::cargo_bin("ebzip")?
        .arg("-t")
        .arg("-o").arg(out.path())
        .arg(src.path())
        .assert()
        .success();

    assert!(!out.path().join("dict1").exists(), "test mode must not create directories");
    Ok(())
}

#[test]
fn information_mode_reports_without_modifying() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", &vec![5u8; 3000])]);
    let honmon_path = src.path().join("dict1").join("data").join("HONMON");
    let before = std::fs::metadata(&honmon_path)?.len();

    Command::cargo_bin("ebzip")?
        .arg("-i")
        .arg(src.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("HONMON"));

    let after = std::fs::metadata(&honmon_path)?.len();
    assert_eq!(before, after);
    Ok(())
}

#[test]
fn ebrefile_drops_unselected_subbooks() -> STDRESULT {
    let src = tempfile::tempdir()?;
    make_epwing_book(src.path(), &[("dict1", b"one"), ("dict2", b"two")]);

    let out = tempfile::tempdir()?;
    Command::cargo_bin("ebrefile")?
        .arg("-S").arg("dict2")
        .arg("-o").arg(out.path())
        .arg(src.path())
        .assert()
        .success();

    let written = std::fs::read(out.path().join("CATALOGS"))?;
    let count = ((written[0] as usize) << 8) | written[1] as usize;
    assert_eq!(count, 1);
    Ok(())
}
