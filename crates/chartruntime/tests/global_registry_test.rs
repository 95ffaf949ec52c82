// The global registry lives for the whole process, so this file is its own
// test binary and holds a single test.
mod common;

use chartcore::RegistryError;
use chartruntime::registry::{global, install_global};
use chartruntime::NodeRegistry;
use common::{new_log, registry};
use std::sync::Arc;

#[test]
fn test_global_registry_installs_once() {
    assert!(global().is_none(), "Nothing is installed before the first call");

    let installed = install_global(registry(&new_log())).expect("First install succeeds");
    let read_back = global().expect("Installed registry is readable");
    assert!(Arc::ptr_eq(&installed, &read_back));
    assert!(read_back.contains("loop"));

    assert!(matches!(
        install_global(NodeRegistry::new()),
        Err(RegistryError::AlreadyInstalled)
    ));
    assert_eq!(
        global().map(|r| r.len()),
        Some(installed.len()),
        "A rejected install leaves the first registry in place"
    );
}
