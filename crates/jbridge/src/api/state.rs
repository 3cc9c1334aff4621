//! Application state shared by all connections.

use std::sync::Arc;

use crate::bootstrap::BootstrapTemplate;
use crate::kernel::KernelServerClient;
use crate::workspace::WorkspaceDirectory;

/// Read-only state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Kernel server client.
    pub kernels: KernelServerClient,
    /// Preamble sent to every new kernel.
    pub bootstrap: Arc<BootstrapTemplate>,
    /// Workspace lookups.
    pub workspaces: Arc<WorkspaceDirectory>,
    /// Allowed CORS origins. Empty mirrors the request origin.
    pub cors_origins: Vec<String>,
}

impl AppState {
    pub fn new(
        kernels: KernelServerClient,
        bootstrap: BootstrapTemplate,
        workspaces: WorkspaceDirectory,
        cors_origins: Vec<String>,
    ) -> Self {
        Self {
            kernels,
            bootstrap: Arc::new(bootstrap),
            workspaces: Arc::new(workspaces),
            cors_origins,
        }
    }
}
