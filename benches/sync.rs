use cpgidx::indexer::go::GoExtractor;
use cpgidx::indexer::{IndexOptions, Indexer};
use cpgidx::store::SqliteGraphStore;
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use std::path::Path;

const PACKAGES: usize = 10;
const FILES_PER_PACKAGE: usize = 10;

fn write_project(root: &Path) {
    std::fs::write(root.join("go.mod"), "module example.com/bench\n").unwrap();
    for pkg in 0..PACKAGES {
        let dir = root.join(format!("pkg{pkg}"));
        std::fs::create_dir_all(&dir).unwrap();
        for file in 0..FILES_PER_PACKAGE {
            let mut source = format!("package pkg{pkg}\n\n");
            source.push_str(&format!(
                "type Item{file} struct {{\n\tID   int\n\tName string\n}}\n\n"
            ));
            source.push_str(&format!(
                "func (i *Item{file}) Label(prefix string) string {{\n\treturn prefix + i.Name\n}}\n\n"
            ));
            source.push_str(&format!(
                "func NewItem{file}(id int, name string) *Item{file} {{\n\treturn &Item{file}{{ID: id, Name: name}}\n}}\n\n"
            ));
            source.push_str(&format!("const Limit{file} = {file}\n"));
            std::fs::write(dir.join(format!("item{file}.go")), source).unwrap();
        }
    }
}

fn indexer(root: &Path) -> Indexer<SqliteGraphStore> {
    Indexer::new_with_options(
        root.to_path_buf(),
        SqliteGraphStore::open_in_memory().unwrap(),
        Box::new(GoExtractor::new().unwrap()),
        IndexOptions {
            service: Some("bench".into()),
            ..IndexOptions::default()
        },
    )
}

fn bench_sync(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());

    c.bench_function("full_sync", |b| {
        b.iter_batched(
            || indexer(dir.path()),
            |mut indexer| black_box(indexer.run().unwrap()),
            BatchSize::SmallInput,
        )
    });

    let mut warm = indexer(dir.path());
    warm.run().unwrap();
    c.bench_function("unchanged_sync", |b| {
        b.iter(|| black_box(warm.run().unwrap()))
    });

    let edited = dir.path().join("pkg0").join("item0.go");
    let original = std::fs::read_to_string(&edited).unwrap();
    let mut toggle = false;
    c.bench_function("single_file_sync", |b| {
        b.iter(|| {
            toggle = !toggle;
            let body = if toggle {
                format!("{original}\nvar Extra = 1\n")
            } else {
                original.clone()
            };
            std::fs::write(&edited, body).unwrap();
            black_box(warm.run().unwrap())
        })
    });
}

criterion_group!(benches, bench_sync);
criterion_main!(benches);
