use chartcore::{FlowError, SpecFlow};
use std::path::{Path, PathBuf};

/// Read a persisted flow
pub fn load_flow(path: impl AsRef<Path>) -> Result<SpecFlow, FlowError> {
    let path = path.as_ref();
    tracing::debug!("Loading flow from {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Ok(SpecFlow::from_json(&content)?)
}

/// Write a flow as pretty-printed JSON
pub fn save_flow(path: impl AsRef<Path>, flow: &SpecFlow) -> Result<(), FlowError> {
    std::fs::write(path, flow.to_json_pretty()?)?;
    Ok(())
}

/// Every `*.json` flow in a directory, sorted by path
pub fn load_flow_dir(dir: impl AsRef<Path>) -> Result<Vec<(PathBuf, SpecFlow)>, FlowError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension() == Some("json".as_ref()) {
            paths.push(path);
        }
    }
    paths.sort();

    paths
        .into_iter()
        .map(|path| load_flow(&path).map(|flow| (path, flow)))
        .collect()
}
