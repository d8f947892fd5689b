use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use livedir::watch::TimestampMonitor;
use livedir::{
    LocalGroup, ModificationChecking, ProcessGroup, ReadOption, Registry, RegistryEntry,
};
use tempfile::TempDir;

fn watched(name: &str) -> RegistryEntry {
    RegistryEntry::new(name, "dictionary")
        .with_read_option(ReadOption::MustReadIfModified)
        .global(true)
}

#[test]
fn test_non_coordinators_adopt_coordinator_watches() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    for file in ["controlDict", "include_a", "include_b"] {
        std::fs::write(root.join(file), "1").unwrap();
    }

    let handles: Vec<_> = LocalGroup::create(3)
        .into_iter()
        .map(|group| {
            let root = root.clone();
            thread::spawn(move || {
                let group: Arc<dyn ProcessGroup> = Arc::new(group);
                let mut reg = Registry::new(
                    "run",
                    Box::new(TimestampMonitor::new()),
                    group.clone(),
                )
                .with_checking(ModificationChecking::TimestampCoordinator);
                reg.register(watched("controlDict")).unwrap();

                // Only the coordinator resolved the includes.
                if group.is_coordinator() {
                    for include in ["include_a", "include_b"] {
                        reg.watch_dependency("controlDict", &root.join(include))
                            .unwrap();
                    }
                } else {
                    let local = root.join(format!("rank{}", group.rank()));
                    reg.watch_dependency("controlDict", &local).unwrap();
                }

                reg.add_watch("controlDict", &root.join("controlDict"))
                    .unwrap();
                let paths = reg.lookup("controlDict").unwrap().watches().paths();

                // Only the coordinator looks at the files; the others
                // learn about the change from its broadcast.
                if group.is_coordinator() {
                    std::fs::write(root.join("include_b"), "12345").unwrap();
                }
                let changed = reg.refresh_modified().unwrap();
                (paths, changed)
            })
        })
        .collect();

    let expected: Vec<PathBuf> = ["include_a", "include_b", "controlDict"]
        .iter()
        .map(|f| Path::new(&root).join(f))
        .collect();
    for handle in handles {
        let (paths, changed) = handle.join().unwrap();
        assert_eq!(paths, expected);
        assert_eq!(changed, ["controlDict"]);
    }
}

#[test]
fn test_local_entries_keep_their_own_watches() {
    let handles: Vec<_> = LocalGroup::create(2)
        .into_iter()
        .map(|group| {
            thread::spawn(move || {
                let rank = group.rank();
                let group: Arc<dyn ProcessGroup> = Arc::new(group);
                let mut reg = Registry::new("run", Box::new(TimestampMonitor::new()), group)
                    .with_checking(ModificationChecking::TimestampCoordinator);
                // Not global: no collective, no adoption.
                reg.register(watched("field").global(false)).unwrap();
                let own = PathBuf::from(format!("/processor{rank}/field"));
                reg.add_watch("field", &own).unwrap();
                reg.lookup("field").unwrap().watches().paths()
            })
        })
        .collect();

    for (rank, handle) in handles.into_iter().enumerate() {
        assert_eq!(
            handle.join().unwrap(),
            [PathBuf::from(format!("/processor{rank}/field"))]
        );
    }
}

#[test]
fn test_local_file_changes_are_seen_on_every_rank() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();

    let handles: Vec<_> = LocalGroup::create(2)
        .into_iter()
        .map(|group| {
            let root = root.clone();
            thread::spawn(move || {
                let rank = group.rank();
                let group: Arc<dyn ProcessGroup> = Arc::new(group);
                let own = root.join(format!("field{rank}"));
                std::fs::write(&own, "1").unwrap();

                let mut reg = Registry::new("run", Box::new(TimestampMonitor::new()), group)
                    .with_checking(ModificationChecking::TimestampCoordinator);
                reg.register(watched("field").global(false).with_file(&own))
                    .unwrap();
                let derived = reg.new_entry("derived", "scalar");
                reg.register(derived).unwrap();
                reg.add_file_watch("field").unwrap();
                reg.set_up_to_date("derived").unwrap();

                if rank == 1 {
                    std::fs::write(&own, "12345").unwrap();
                }
                let changed = reg.refresh_modified().unwrap();
                let fresh = reg.up_to_date("derived", &["field"]).unwrap();
                (rank, changed, fresh, reg.modified())
            })
        })
        .collect();

    for handle in handles {
        let (rank, changed, fresh, modified) = handle.join().unwrap();
        assert!(!modified, "rank {rank}");
        if rank == 1 {
            assert_eq!(changed, ["field"]);
            assert!(!fresh);
        } else {
            assert!(changed.is_empty());
            assert!(fresh);
        }
    }
}
