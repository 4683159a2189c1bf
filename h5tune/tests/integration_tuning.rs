//! Integration tests for end-to-end tuning through the shim.
//!
//! Each test writes a rule document to a temporary directory, runs an
//! intercepted call against the in-memory backend and inspects what the
//! real entry point received: file names, file-access settings, MPI-IO hints
//! and dataset layouts.

use h5tune::backend::{Comm, DEFAULT_PLIST, Dataspace, Hdf5Backend, Layout};
use h5tune::hints::HintMap;
use h5tune::matcher::FileMatchPolicy;
use h5tune::memory::{DEFAULT_ALIGNMENT, DEFAULT_SIEVE_BUF_SIZE, InMemoryBackend};
use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
use h5tune::shim::Tuner;
use tempfile::{TempDir, tempdir};

/// Helper: writes `xml` as the rule document and builds a quiet tuner.
fn tuner_with(xml: &str, policy: FileMatchPolicy) -> (Tuner<InMemoryBackend>, TempDir) {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.xml");
    std::fs::write(&config, xml).unwrap();

    let settings = TunerSettings::default()
        .with_config_path(ConfigPath::Fixed(config))
        .with_verbosity(VerbositySource::Fixed(Verbosity::SILENT))
        .with_policy(policy);
    (Tuner::with_settings(InMemoryBackend::new(), settings), dir)
}

fn tuner(xml: &str) -> (Tuner<InMemoryBackend>, TempDir) {
    tuner_with(xml, FileMatchPolicy::ExactBasename)
}

#[test]
fn test_unscoped_sieve_buf_size_applies_to_any_file() {
    let (tuner, _dir) = tuner("<Parameters><sieve_buf_size>77</sieve_buf_size></Parameters>");

    for name in ["data.h5", "/scratch/run/other.h5"] {
        let file = tuner.file_open(name, 0, DEFAULT_PLIST);
        assert!(file >= 0);
        let record = tuner.backend().file(file).unwrap();
        assert_eq!(record.name, name);
        assert_eq!(record.access.sieve_buf_size, 77);
        assert_eq!(record.access.alignment, DEFAULT_ALIGNMENT);
    }
}

#[test]
fn test_file_scoped_alignment() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <High_Level_IO_Library>
               <alignment FileName="data.h5">88,44</alignment>
             </High_Level_IO_Library>
           </Parameters>"#,
    );

    let other = tuner.file_create("other.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    assert_eq!(
        tuner.backend().file(other).unwrap().access.alignment,
        DEFAULT_ALIGNMENT
    );

    let data = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    assert_eq!(tuner.backend().file(data).unwrap().access.alignment, (88, 44));

    let nested = tuner.file_open("/scratch/run/data.h5", 0, DEFAULT_PLIST);
    assert_eq!(tuner.backend().file(nested).unwrap().access.alignment, (88, 44));
}

#[test]
fn test_dataset_scoped_chunk() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <chunk FileName="data.h5" VariableName="Data1">6,5</chunk>
           </Parameters>"#,
    );

    let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    let space = tuner.backend().insert_dataspace(Dataspace::fixed(&[24, 24]));

    let data1 = tuner.dataset_create1(file, "Data1", 0, space, DEFAULT_PLIST);
    assert!(data1 >= 0);
    assert_eq!(
        tuner.backend().dataset(data1).unwrap().layout,
        Layout::Chunked(vec![6, 5])
    );

    let data2 = tuner.dataset_create2(file, "Data2", 0, space, 0, DEFAULT_PLIST, 0);
    assert!(data2 >= 0);
    assert_eq!(tuner.backend().dataset(data2).unwrap().layout, Layout::Contiguous);
}

#[test]
fn test_striping_factor_hint_set_once() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <Parallel_File_System>
               <striping_factor FileName="data.h5">7</striping_factor>
             </Parallel_File_System>
           </Parameters>"#,
    );
    let fapl = tuner.backend().mpio_file_access(Comm(1), None);

    let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, fapl);
    let hints = tuner.backend().file(file).unwrap().access.hints.unwrap();
    assert_eq!(hints.get("striping_factor"), Some("7"));
    assert_eq!(hints.iter().filter(|(k, _)| *k == "striping_factor").count(), 1);
    assert_eq!(hints.len(), 1);
}

#[test]
fn test_existing_hints_are_kept() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <cb_nodes>16</cb_nodes>
             <IBM_largeblock_io FileName="data.h5">true</IBM_largeblock_io>
             <striping_unit FileName="data.h5">1048576</striping_unit>
           </Parameters>"#,
    );
    let caller_hints: HintMap = [("romio_ds_write", "disable"), ("cb_nodes", "2")]
        .into_iter()
        .collect();
    let fapl = tuner
        .backend()
        .mpio_file_access(Comm(3), Some(caller_hints.clone()));

    let file = tuner.file_open("data.h5", 0, fapl);
    let access = tuner.backend().file(file).unwrap().access;
    let hints = access.hints.unwrap();

    assert_eq!(access.comm, Some(Comm(3)));
    assert_eq!(hints.get("romio_ds_write"), Some("disable"));
    assert_eq!(hints.get("cb_nodes"), Some("16"));
    assert_eq!(hints.get("IBM_largeblock_io"), Some("true"));
    assert_eq!(hints.get("striping_unit"), Some("1048576"));
    assert_eq!(hints.len(), 4);

    // the caller's list still carries its own map
    assert_eq!(tuner.backend().mpio(fapl).unwrap().hints, Some(caller_hints));
}

#[test]
fn test_hints_need_distributed_access() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <striping_factor>7</striping_factor>
             <IBM_lockless_io>true</IBM_lockless_io>
           </Parameters>"#,
    );

    let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    let record = tuner.backend().file(file).unwrap();
    assert_eq!(record.name, "data.h5");
    assert_eq!(record.access.hints, None);
}

#[test]
fn test_lockless_prefix_and_dataset_identity() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <IBM_lockless_io FileName="data.h5">true</IBM_lockless_io>
             <chunk FileName="data.h5" VariableName="Data1">6,5</chunk>
           </Parameters>"#,
    );
    let fapl = tuner.backend().mpio_file_access(Comm(1), None);

    let file = tuner.file_create("/gpfs/run/data.h5", 0, DEFAULT_PLIST, fapl);
    assert_eq!(
        tuner.backend().file(file).unwrap().name,
        "bglockless:/gpfs/run/data.h5"
    );

    // chunk rules still match the unprefixed file
    let space = tuner.backend().insert_dataspace(Dataspace::fixed(&[24, 24]));
    let dset = tuner.dataset_create1(file, "Data1", 0, space, DEFAULT_PLIST);
    assert_eq!(
        tuner.backend().dataset(dset).unwrap().layout,
        Layout::Chunked(vec![6, 5])
    );
}

#[test]
fn test_lockless_false_keeps_name() {
    let (tuner, _dir) = tuner("<Parameters><IBM_lockless_io>yes</IBM_lockless_io></Parameters>");
    let fapl = tuner.backend().mpio_file_access(Comm(1), None);

    let file = tuner.file_open("data.h5", 0, fapl);
    assert_eq!(tuner.backend().file(file).unwrap().name, "data.h5");
}

#[test]
fn test_unscoped_rule_is_a_fallback() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <sieve_buf_size FileName="data.h5">4096</sieve_buf_size>
             <sieve_buf_size>77</sieve_buf_size>
             <sieve_buf_size FileName="data.h5">1</sieve_buf_size>
           </Parameters>"#,
    );

    let data = tuner.file_open("data.h5", 0, DEFAULT_PLIST);
    assert_eq!(tuner.backend().file(data).unwrap().access.sieve_buf_size, 4096);

    let other = tuner.file_open("other.h5", 0, DEFAULT_PLIST);
    assert_eq!(tuner.backend().file(other).unwrap().access.sieve_buf_size, 77);
}

#[test]
fn test_invalid_rules_for_other_files_are_ignored() {
    let (tuner, _dir) = tuner(
        r#"<Parameters>
             <alignment FileName="other.h5">bogus</alignment>
             <unknown_knob>whatever</unknown_knob>
           </Parameters>"#,
    );

    let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    assert!(file >= 0);
    let access = tuner.backend().file(file).unwrap().access;
    assert_eq!(access.alignment, DEFAULT_ALIGNMENT);
    assert_eq!(access.sieve_buf_size, DEFAULT_SIEVE_BUF_SIZE);
}

#[test]
fn test_suffix_policy() {
    let xml = r#"<Parameters><sieve_buf_size FileName="A.h5">77</sieve_buf_size></Parameters>"#;

    let (basename, _dir) = tuner_with(xml, FileMatchPolicy::ExactBasename);
    let file = basename.file_open("/scratch/prefixA.h5", 0, DEFAULT_PLIST);
    assert_eq!(
        basename.backend().file(file).unwrap().access.sieve_buf_size,
        DEFAULT_SIEVE_BUF_SIZE
    );

    let (suffix, _dir) = tuner_with(xml, FileMatchPolicy::Suffix);
    let file = suffix.file_open("/scratch/prefixA.h5", 0, DEFAULT_PLIST);
    assert_eq!(suffix.backend().file(file).unwrap().access.sieve_buf_size, 77);
}

#[test]
fn test_substring_policy() {
    let xml = r#"<Parameters><alignment FileName="run42">4096,4096</alignment></Parameters>"#;
    let (tuner, _dir) = tuner_with(xml, FileMatchPolicy::Substring);

    let file = tuner.file_create("/scratch/run42/out.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    assert_eq!(tuner.backend().file(file).unwrap().access.alignment, (4096, 4096));
}

#[test]
fn test_caller_dcpl_settings_survive_in_copy() {
    let (tuner, _dir) = tuner("<Parameters><sieve_buf_size>77</sieve_buf_size></Parameters>");
    let backend = tuner.backend();
    let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
    let space = backend.insert_dataspace(Dataspace::fixed(&[100]));

    let dcpl = backend
        .create_plist(h5tune::backend::PlistClass::DatasetCreation)
        .unwrap();
    backend.set_chunk(dcpl, &[10]).unwrap();

    let dset = tuner.dataset_create1(file, "d", 0, space, dcpl);
    assert_eq!(backend.dataset(dset).unwrap().layout, Layout::Chunked(vec![10]));
    assert_eq!(backend.layout(dcpl).unwrap(), Layout::Chunked(vec![10]));
}

#[test]
fn test_commented_value_is_applied() {
    let (tuner, _dir) = tuner(
        "<Parameters><sieve_buf_size><!-- tuned -->77</sieve_buf_size></Parameters>",
    );

    let file = tuner.try_file_open("data.h5", 0, DEFAULT_PLIST).unwrap();
    assert_eq!(tuner.backend().file(file).unwrap().access.sieve_buf_size, 77);
}
