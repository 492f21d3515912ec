//! Performance benchmarks for corpus scans
//!
//! Every graph query re-reads the vault, so these measure how scans grow with vault size:
//! - Unbounded and bounded backlink scans
//! - Orphan detection over the full adjacency
//! - Snapshot capture of a batch-sized path set
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use notegraph::{Vault, VaultConfig};
use std::path::PathBuf;
use tempfile::TempDir;

// Notes link to their two successors and to a shared hub, one in ten also to a missing note.
fn setup_vault(notes: usize) -> Result<(TempDir, PathBuf), Box<dyn std::error::Error>> {
    let tempdir = TempDir::new()?;
    let root = tempdir.path().to_path_buf();
    std::fs::write(root.join("Hub.md"), "# Hub\n")?;
    for i in 0..notes {
        let folder = root.join(format!("area{}", i % 10));
        std::fs::create_dir_all(&folder)?;
        let mut body = format!(
            "---\ntags: [bench, group{}]\n---\n# Note {i}\n\nSee [[Note {}]] and [[Note {}|next]] from [[Hub]].\n",
            i % 7,
            (i + 1) % notes,
            (i + 2) % notes
        );
        if i % 10 == 0 {
            body.push_str("Someday [[Unwritten]].\n");
        }
        std::fs::write(folder.join(format!("Note {i}.md")), body)?;
    }
    Ok((tempdir, root))
}

fn bench_backlink_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("backlink_scan");
    for size in [100usize, 500] {
        let (_tempdir, root) = setup_vault(size).unwrap();
        let vault = Vault::open(VaultConfig::new(&root)).unwrap();
        group.bench_with_input(BenchmarkId::new("unbounded", size), &size, |b, _| {
            b.iter(|| vault.backlinks("Hub.md", None).unwrap().len())
        });
        group.bench_with_input(BenchmarkId::new("scan_limit_50", size), &size, |b, _| {
            b.iter(|| vault.backlinks("Hub.md", Some(50)).unwrap().len())
        });
    }
    group.finish();
}

fn bench_orphans(c: &mut Criterion) {
    let (_tempdir, root) = setup_vault(200).unwrap();
    let vault = Vault::open(VaultConfig::new(&root)).unwrap();

    c.bench_function("orphans_200", |b| b.iter(|| vault.orphans().unwrap().len()));
}

fn bench_related(c: &mut Criterion) {
    let (_tempdir, root) = setup_vault(200).unwrap();
    let vault = Vault::open(VaultConfig::new(&root)).unwrap();

    c.bench_function("related_200", |b| {
        b.iter(|| vault.related("area0/Note 0.md", 10).unwrap().len())
    });
}

fn bench_snapshot_capture(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (_tempdir, root) = setup_vault(200).unwrap();
    let vault = Vault::open(VaultConfig::new(&root)).unwrap();
    let paths = (0..50)
        .map(|i| format!("area{}/Note {i}.md", i % 10))
        .collect::<Vec<String>>();

    c.bench_function("snapshot_50_notes", |b| {
        b.iter(|| {
            rt.block_on(async {
                let id = vault.create_batch_backup(&paths).await.unwrap();
                std::fs::remove_dir_all(root.join(".batch_backups").join(id.as_str())).unwrap();
            })
        })
    });
}

criterion_group!(
    benches,
    bench_backlink_scan,
    bench_orphans,
    bench_related,
    bench_snapshot_capture
);
criterion_main!(benches);
