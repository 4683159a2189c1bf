//! Dry run of a parallel write job against the in-memory backend.
//!
//! Writes a small rule document, then creates a file over MPI-IO and two
//! datasets in it, printing what the real library would have been asked to
//! do.
//!
//! Run with: `cargo run -p h5tune --example dry_run`

#![allow(missing_docs)]

use h5tune::backend::{Comm, DEFAULT_PLIST, Dataspace};
use h5tune::memory::InMemoryBackend;
use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
use h5tune::Tuner;

const RULES: &str = r#"<?xml version="1.0"?>
<Parameters>
  <High_Level_IO_Library>
    <alignment FileName="snapshot.h5">1048576,1048576</alignment>
    <chunk FileName="snapshot.h5" VariableName="pressure">64,64</chunk>
  </High_Level_IO_Library>
  <Middleware_Layer>
    <cb_buffer_size>16777216</cb_buffer_size>
    <cb_nodes FileName="snapshot.h5">8</cb_nodes>
  </Middleware_Layer>
  <Parallel_File_System>
    <striping_factor FileName="snapshot.h5">32</striping_factor>
    <striping_unit FileName="snapshot.h5">1048576</striping_unit>
  </Parallel_File_System>
</Parameters>
"#;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let dir = tempfile::tempdir()?;
    let config = dir.path().join("config.xml");
    std::fs::write(&config, RULES)?;

    let settings = TunerSettings::default()
        .with_config_path(ConfigPath::Fixed(config))
        .with_verbosity(VerbositySource::Fixed(Verbosity::SETTINGS));
    let tuner = Tuner::with_settings(InMemoryBackend::new(), settings);
    let backend = tuner.backend();

    let fapl = backend.mpio_file_access(Comm(0), None);
    let file = tuner.try_file_create("/scratch/run/snapshot.h5", 0, DEFAULT_PLIST, fapl)?;

    let record = backend.file(file).ok_or("file was not recorded")?;
    println!("file: {}", record.name);
    println!("  alignment: {:?}", record.access.alignment);
    if let Some(hints) = &record.access.hints {
        for (key, value) in hints.iter() {
            println!("  hint {key}={value}");
        }
    }

    let space = backend.insert_dataspace(Dataspace::fixed(&[1024, 1024]));
    for name in ["pressure", "temperature"] {
        let dset = tuner.try_dataset_create2(file, name, 0, space, 0, DEFAULT_PLIST, 0)?;
        let layout = backend.dataset(dset).ok_or("dataset was not recorded")?.layout;
        println!("dataset {name}: {layout:?}");
    }

    Ok(())
}
