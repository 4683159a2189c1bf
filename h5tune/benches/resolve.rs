//! Microbenchmarks for rule resolution.
//!
//! Measures document parsing, rule lookup and a full tuned file create,
//! which together make up the per-call overhead the shim adds.
//!
//! Run with: `cargo bench -p h5tune -- resolve`

#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use h5tune::backend::{Comm, DEFAULT_PLIST};
use h5tune::document::RuleDocument;
use h5tune::matcher::{MatchRequest, RuleMatcher};
use h5tune::memory::InMemoryBackend;
use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
use h5tune::shim::Tuner;
use tempfile::tempdir;

/// Builds a document with `files` file-scoped blocks of the usual parameters.
fn document_xml(files: usize) -> String {
    let mut xml = String::from("<Parameters>\n  <High_Level_IO_Library>\n");
    for i in 0..files {
        xml.push_str(&format!(
            "    <alignment FileName=\"file_{i}.h5\">{},{}</alignment>\n",
            i * 1024,
            4096
        ));
        xml.push_str(&format!(
            "    <chunk FileName=\"file_{i}.h5\" VariableName=\"Data1\">64,64</chunk>\n"
        ));
    }
    xml.push_str("  </High_Level_IO_Library>\n  <Middleware_Layer>\n");
    for i in 0..files {
        xml.push_str(&format!("    <cb_nodes FileName=\"file_{i}.h5\">{}</cb_nodes>\n", i % 64 + 1));
    }
    xml.push_str("    <sieve_buf_size>262144</sieve_buf_size>\n");
    xml.push_str("  </Middleware_Layer>\n</Parameters>\n");
    xml
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_parse");
    for files in [1, 16, 256] {
        let xml = document_xml(files);
        group.bench_with_input(BenchmarkId::from_parameter(files), &xml, |b, xml| {
            b.iter(|| RuleDocument::from_xml_str(black_box(xml)).unwrap());
        });
    }
    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve_find");
    for files in [1, 16, 256] {
        let document = RuleDocument::from_xml_str(&document_xml(files)).unwrap();
        let matcher = RuleMatcher::default();
        let target = format!("/scratch/run/file_{}.h5", files - 1);

        group.bench_with_input(BenchmarkId::from_parameter(files), &target, |b, target| {
            b.iter(|| {
                let request = MatchRequest::file("alignment", black_box(target));
                black_box(matcher.find(&document, &request));
            });
        });
    }
    group.finish();
}

fn bench_file_create(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    let config = dir.path().join("config.xml");
    std::fs::write(&config, document_xml(16)).unwrap();

    let settings = TunerSettings::default()
        .with_config_path(ConfigPath::Fixed(config))
        .with_verbosity(VerbositySource::Fixed(Verbosity::SILENT));
    let tuner = Tuner::with_settings(InMemoryBackend::new(), settings);
    let fapl = tuner.backend().mpio_file_access(Comm(1), None);

    c.bench_function("resolve_file_create_mpio", |b| {
        b.iter(|| {
            let file = tuner.file_create(black_box("file_7.h5"), 0, DEFAULT_PLIST, fapl);
            assert!(file >= 0);
        });
    });
}

criterion_group!(benches, bench_parse, bench_find, bench_file_create);
criterion_main!(benches);
