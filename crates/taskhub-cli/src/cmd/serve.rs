use anyhow::Context;
use std::path::Path;
use taskhub_server::AppState;

pub fn run(root: &Path, port: Option<u16>) -> anyhow::Result<()> {
    let rt = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    rt.block_on(async {
        let state = AppState::open(root.to_path_buf())?;
        let port = port.unwrap_or(state.config.server.port);
        taskhub_server::serve(state, port).await
    })
}
