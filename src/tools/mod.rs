//! Code lifecycle tools.
//!
//! The model can ask for the code it just produced to be saved
//! ([`SAVE_CODE`]) or executed by the host ([`EXECUTE_CODE`]). Both tools go
//! through [`ToolRegistry`], which owns the "last saved" state for one
//! conversation and persists code through a [`CodeArtifactStore`].

mod lisp;
pub mod registry;
pub mod store;
mod types;

pub use lisp::{contains_code_block, extract_entry_point};
pub use registry::{
    CodeLifecycleState, ToolError, ToolRegistry, RAN_GENERATED, RAN_SAVED, RUN_FAILED, SAVE_FAILED,
};
pub use store::{
    CodeArtifactStore, DirectoryChooser, FileArtifactStore, PromptChooser, SaveLocationChooser,
    StoreError, TEMP_FILE_NAME,
};
pub use types::{ToolCall, ToolDefinition, ToolResult, ARG_LAST_CODE, EXECUTE_CODE, SAVE_CODE};
