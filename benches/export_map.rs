//! Benchmarks for export synthesis and graph scanning
//!
//! Bundles carry tens of thousands of modules, so per-module analysis has to
//! stay cheap enough for a full corpus scan.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use bundlescope::cache::MemoryModuleSource;
use bundlescope::graph::{CancellationToken, GraphBuilder};
use bundlescope::parser::{ModuleText, WebpackAst};

/// Create a module with `exports` descriptor exports and as many imports.
fn create_module(id: usize, exports: usize) -> String {
    let mut source = format!("// Webpack Module {id}\n0,function(e,t,n){{\n  n.d(t,{{");
    for i in 0..exports {
        source.push_str(&format!("e{i}:()=>v{i},"));
    }
    source.push_str("});\n");

    for i in 0..exports {
        let dependency = (id + i + 1) % 1000;
        source.push_str(&format!("  var r{i} = n({dependency});\n"));
        match i % 3 {
            0 => source.push_str(&format!("  const v{i} = r{i}.value + {i};\n")),
            1 => source.push_str(&format!("  function v{i}(a) {{ return r{i}.run(a); }}\n")),
            _ => source.push_str(&format!(
                "  var v{i} = class extends r{i}.Base {{ initialize() {{}} }};\n"
            )),
        }
    }
    source.push_str("}\n");
    source
}

/// Benchmark parse plus export map synthesis
fn bench_export_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("export_map");

    for exports in [10, 50, 200].iter() {
        let source = create_module(1, *exports);

        group.bench_with_input(BenchmarkId::new("exports", exports), &source, |b, source| {
            b.iter(|| {
                let ast = WebpackAst::parse(ModuleText::new(source.as_str())).unwrap();
                black_box(ast.export_map().len())
            });
        });
    }

    group.finish();
}

/// Benchmark import usage lookup in an already parsed module
fn bench_import_usages(c: &mut Criterion) {
    let mut group = c.benchmark_group("import_usages");

    for exports in [10, 50, 200].iter() {
        let ast = WebpackAst::parse(ModuleText::new(create_module(1, *exports))).unwrap();
        let key = bundlescope::analysis::ExportKey::named("value");

        group.bench_with_input(BenchmarkId::new("imports", exports), &ast, |b, ast| {
            b.iter(|| black_box(ast.import_usages("2", &key).unwrap().len()));
        });
    }

    group.finish();
}

/// Benchmark a full corpus scan
fn bench_graph_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("graph_scan");
    group.sample_size(10);

    for modules in [100, 500].iter() {
        let source: MemoryModuleSource = (0..*modules)
            .map(|id| (id.to_string(), create_module(id, 10)))
            .collect();

        group.bench_with_input(BenchmarkId::new("modules", modules), &source, |b, source| {
            b.iter(|| {
                let cache = GraphBuilder::new(source)
                    .build(&CancellationToken::new(), &mut ())
                    .unwrap();
                black_box(cache.dependency_records.edge_count())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_export_map, bench_import_usages, bench_graph_scan);
criterion_main!(benches);
