//! File and search tools: Read, Write, Edit, MultiEdit, LS, Grep, Glob.
//!
//! All tools share an `Arc<PathBuf>` working directory and resolve relative
//! paths against it. Absolute paths are accepted; gating access to them is the
//! permission layer's job, not the tools'.

mod edit;
mod glob_tool;
mod grep;
mod ls;
mod multiedit;
pub(crate) mod path;
mod read;
mod write;

pub use edit::{EditTool, TOOL_EDIT};
pub use glob_tool::{GlobTool, TOOL_GLOB};
pub use grep::{GrepTool, TOOL_GREP};
pub use ls::{LsTool, TOOL_LS};
pub use multiedit::{MultiEditTool, TOOL_MULTI_EDIT};
pub use read::{ReadTool, TOOL_READ};
pub use write::{WriteTool, TOOL_WRITE};
